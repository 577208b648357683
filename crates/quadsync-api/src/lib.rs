//! quadsync-api: the HTTP surface over the sync engine.
//!
//! Routes:
//! - `GET /health` - liveness, unauthenticated
//! - `GET /sync/status` - targets, mode, open conflicts, last run, today's stats
//! - `GET /sync/conflicts` - conflict rows, optionally filtered by status
//! - `POST /sync/run` - admit a manual run (202, admin only)
//! - `POST /sync/conflicts/{id}/resolve` - close a conflict (admin only)
//! - `GET /dashboard/daily-stats` / `GET /dashboard/sync-logs` - projections

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod router;

pub use auth::AuthTokens;
pub use config::ApiConfig;
pub use error::ApiError;
pub use router::{app_router, ApiState};
