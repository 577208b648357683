//! Engine configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use quadsync_core::{EntityType, PresencePolicy, SourceId};

/// Configuration for the sync engine.
///
/// The presence policy is explicit per entity type; a type missing from the
/// map falls back to `AllowMissing` so that absence is never escalated to a
/// divergence by accident.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Deployment environment name, recorded on every run.
    pub environment: String,
    /// The library whose value is preferred as the reference side.
    pub primary: SourceId,
    /// Per-entity-type presence policy.
    pub policies: BTreeMap<EntityType, PresencePolicy>,
    /// Upper bound on a single per-source fetch.
    pub fetch_timeout: Duration,
    /// Pause between scheduled runs.
    pub interval: Duration,
}

impl EngineConfig {
    /// Configuration with the stock policies: items and users must exist
    /// everywhere, orders may lag on replicas.
    pub fn new(environment: impl Into<String>, primary: SourceId) -> Self {
        let mut policies = BTreeMap::new();
        policies.insert(EntityType::Item, PresencePolicy::RequireAll);
        policies.insert(EntityType::Order, PresencePolicy::AllowMissing);
        policies.insert(EntityType::User, PresencePolicy::RequireAll);

        Self {
            environment: environment.into(),
            primary,
            policies,
            fetch_timeout: Duration::from_secs(10),
            interval: Duration::from_secs(300),
        }
    }

    pub fn policy_for(&self, entity_type: EntityType) -> PresencePolicy {
        self.policies
            .get(&entity_type)
            .copied()
            .unwrap_or(PresencePolicy::AllowMissing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_policies() {
        let config = EngineConfig::new("test", SourceId::new("mysql"));
        assert_eq!(
            config.policy_for(EntityType::Item),
            PresencePolicy::RequireAll
        );
        assert_eq!(
            config.policy_for(EntityType::Order),
            PresencePolicy::AllowMissing
        );
    }
}
