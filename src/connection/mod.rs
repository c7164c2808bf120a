//! Client Connections
//!
//! The accept loop in `main.rs` spawns one task per client:
//!
//! ```text
//!   TcpListener::accept()
//!           │ spawn
//!           ▼
//!   ┌──────────────────────────────────────────────┐
//!   │ ConnectionHandler                            │
//!   │   read ──> parse ──> CommandHandler::execute │
//!   │     ▲                         │              │
//!   │     └──────── flush replies ◄─┘              │
//!   └──────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use zsetkv::commands::{CommandHandler, CommandMetrics};
//! use zsetkv::connection::{handle_connection, ConnectionStats};
//! use zsetkv::storage::StorageEngine;
//! use std::sync::Arc;
//!
//! let handler = CommandHandler::new(
//!     Arc::new(StorageEngine::new()),
//!     Arc::new(CommandMetrics::new()),
//! );
//! let stats = Arc::new(ConnectionStats::new());
//!
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, handler.clone(), stats));
//! ```

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
