//! Command Layer
//!
//! Sits between the wire protocol and the storage engine:
//!
//! ```text
//!  RESP array ──> CommandHandler ──> StorageEngine
//!                  │   │
//!                  │   └─ validation (key / value / member tokens)
//!                  └───── CommandMetrics (per-command and error counts)
//! ```
//!
//! Input validation and counters live here; the storage engine never
//! sees malformed input and never touches metrics.

pub mod handler;
pub mod metrics;
pub mod validation;

pub use handler::{CommandError, CommandHandler};
pub use metrics::{CommandMetrics, MetricsSnapshot};
pub use validation::is_valid_token;
