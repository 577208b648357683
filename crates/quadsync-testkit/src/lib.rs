//! # Quadsync Testkit
//!
//! Testing utilities for the quadsync engine.
//!
//! This crate provides:
//!
//! - **Fixtures**: a fully wired engine over in-memory libraries, plus
//!   payload builders with sensible defaults
//! - **Generators**: proptest strategies for payloads and records
//!
//! ## Fixtures
//!
//! ```rust,ignore
//! use quadsync_testkit::fixtures::{item_payload, SyncFixture};
//! use quadsync_core::{EntityType, RunMode};
//!
//! let fx = SyncFixture::four_libraries().await;
//! fx.seed_everywhere(EntityType::Item, "item-1", item_payload("bike", 45_000)).await;
//! let report = fx.orchestrator.run_once(RunMode::Manual).await?;
//! assert_eq!(report.conflicts_found, 0);
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{item_payload, order_payload, user_payload, SyncFixture};
