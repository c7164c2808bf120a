//! # zsetkv - An In-Memory Store for Expiring Strings and Sorted Sets
//!
//! zsetkv keeps two independent keyspaces in memory:
//!
//! - **strings**: `SET` / `GET` / `INCR` values with an optional time-to-live
//! - **sorted sets**: members ordered by `(score, member)`, queried by
//!   rank and by index window
//!
//! The engine is a plain library type, [`StorageEngine`]. The binary wraps
//! it in a small RESP server so any Redis client can talk to it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  TCP listener ──> ConnectionHandler ──> CommandHandler            │
//! │                     (RESP parse)        (validate, count) │       │
//! │                                                           ▼       │
//! │  ┌────────────────────────── StorageEngine ────────────────────┐ │
//! │  │  StringStore                 SortedSetStore                 │ │
//! │  │  64 × RwLock<HashMap>        64 × RwLock<HashMap<Arc<Mutex>>│ │
//! │  │      ▲          ▲                                           │ │
//! │  │      │          └── per-key expiry timers (compare-then-delete)│
//! │  │      └───────────── ExpirySweeper (adaptive background pass) │ │
//! │  └─────────────────────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use zsetkv::StorageEngine;
//! use std::time::Duration;
//!
//! let engine = StorageEngine::new();
//!
//! engine.set("session", "abc", Some(Duration::from_secs(30)));
//! assert_eq!(engine.get("session"), Some("abc".to_string()));
//! assert_eq!(engine.incr("visits"), Ok(1));
//!
//! engine.zadd("board", &[(20.0, "bob".to_string()), (10.0, "alice".to_string())]);
//! assert_eq!(engine.zrank("board", "bob"), Some(1));
//! assert_eq!(engine.zrange("board", 0, -1), vec!["alice", "bob"]);
//!
//! assert_eq!(engine.dbsize(), 3);
//! ```
//!
//! ## Supported Commands
//!
//! - `SET key value [EX seconds]`, `GET key`, `DEL key`, `INCR key`
//! - `ZADD key score member [score member ...]`, `ZCARD key`,
//!   `ZRANK key member`, `ZRANGE key start stop`
//! - `DBSIZE`, `PING [message]`, `INFO`, `QUIT`
//!
//! ## Module Overview
//!
//! - [`storage`]: the two stores, the engine facade and expiry
//! - [`commands`]: command dispatch, input validation, metrics
//! - [`protocol`]: RESP parser and reply types
//! - [`connection`]: per-client connection loop

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod storage;

pub use commands::{CommandHandler, CommandMetrics};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{ParseError, RespParser, RespValue};
pub use storage::{
    start_expiry_sweeper, ExpiryConfig, ExpirySweeper, StorageEngine, StorageStats, StoreError,
};

/// The default port (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host to bind to
pub const DEFAULT_HOST: &str = "127.0.0.1";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
