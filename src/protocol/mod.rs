//! RESP Protocol
//!
//! The wire format spoken on the TCP port.
//!
//! - `types`: the `RespValue` enum and its serialization
//! - `parser`: incremental parser for incoming bytes
//!
//! ## Example
//!
//! ```
//! use zsetkv::protocol::{parse_message, RespValue};
//!
//! let data = b"*3\r\n$5\r\nZRANK\r\n$5\r\nboard\r\n$5\r\nalice\r\n";
//! let (value, consumed) = parse_message(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//! assert!(matches!(value, RespValue::Array(ref args) if args.len() == 3));
//!
//! assert_eq!(RespValue::null().serialize(), b"$-1\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;
