//! Incremental RESP Parser
//!
//! The parser works on whatever bytes have arrived so far and reports one of:
//! - `Ok(Some((value, consumed)))` - a complete value; drop `consumed` bytes
//! - `Ok(None)` - the value is not complete yet, read more and retry
//! - `Err(ParseError)` - the client sent garbage and should be disconnected
//!
//! Besides framed RESP, a line that does not start with a type prefix is
//! accepted as an inline command (`SET key value\r\n`), so the server can
//! be driven from `telnet` or `nc`.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    #[error("invalid UTF-8 in protocol line")]
    InvalidUtf8,

    /// Negative lengths other than the `-1` null marker
    #[error("invalid length: {0}")]
    InvalidLength(i64),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

pub type ParseResult<T> = Result<T, ParseError>;

type Parsed = Option<(RespValue, usize)>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth
pub const MAX_NESTING_DEPTH: usize = 32;

/// A RESP parser with configurable limits.
#[derive(Debug, Clone)]
pub struct RespParser {
    max_bulk_size: usize,
    max_depth: usize,
}

impl Default for RespParser {
    fn default() -> Self {
        Self {
            max_bulk_size: MAX_BULK_SIZE,
            max_depth: MAX_NESTING_DEPTH,
        }
    }
}

impl RespParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowers the bulk string limit. Mostly useful in tests.
    pub fn with_max_bulk_size(mut self, max: usize) -> Self {
        self.max_bulk_size = max;
        self
    }

    /// Attempts to parse one value from the front of `buf`.
    pub fn parse(&self, buf: &[u8]) -> ParseResult<Parsed> {
        self.parse_value(buf, 0)
    }

    fn parse_value(&self, buf: &[u8], depth: usize) -> ParseResult<Parsed> {
        let Some(&first) = buf.first() else {
            return Ok(None);
        };
        if depth > self.max_depth {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                self.max_depth
            )));
        }

        match first {
            prefix::SIMPLE_STRING | prefix::ERROR | prefix::INTEGER => {
                let Some((line, consumed)) = read_line(&buf[1..]) else {
                    return Ok(None);
                };
                let value = match first {
                    prefix::SIMPLE_STRING => RespValue::SimpleString(utf8(line)?.to_string()),
                    prefix::ERROR => RespValue::Error(utf8(line)?.to_string()),
                    _ => RespValue::Integer(parse_int(line)?),
                };
                Ok(Some((value, 1 + consumed)))
            }
            prefix::BULK_STRING => self.parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf, depth),
            _ => parse_inline(buf),
        }
    }

    /// `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&self, buf: &[u8]) -> ParseResult<Parsed> {
        let Some((line, header)) = read_line(&buf[1..]) else {
            return Ok(None);
        };
        let header = 1 + header;

        let len = match parse_int(line)? {
            -1 => return Ok(Some((RespValue::Null, header))),
            n if n < 0 => return Err(ParseError::InvalidLength(n)),
            n => n as usize,
        };
        if len > self.max_bulk_size {
            return Err(ParseError::MessageTooLarge {
                size: len,
                max: self.max_bulk_size,
            });
        }

        let total = header + len + CRLF.len();
        if buf.len() < total {
            return Ok(None);
        }
        if &buf[header + len..total] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[header..header + len]);
        Ok(Some((RespValue::BulkString(data), total)))
    }

    /// `*<count>\r\n<elements...>`
    fn parse_array(&self, buf: &[u8], depth: usize) -> ParseResult<Parsed> {
        let Some((line, header)) = read_line(&buf[1..]) else {
            return Ok(None);
        };
        let mut consumed = 1 + header;

        let count = match parse_int(line)? {
            -1 => return Ok(Some((RespValue::Null, consumed))),
            n if n < 0 => return Err(ParseError::InvalidLength(n)),
            n => n as usize,
        };

        // A hostile count must not drive the allocation.
        let mut elements = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            match self.parse_value(&buf[consumed..], depth + 1)? {
                Some((value, used)) => {
                    elements.push(value);
                    consumed += used;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((RespValue::Array(elements), consumed)))
    }
}

/// Splits a whitespace-separated line into an array of bulk strings.
fn parse_inline(buf: &[u8]) -> ParseResult<Parsed> {
    let Some((line, consumed)) = read_line(buf) else {
        return Ok(None);
    };

    let parts: Vec<RespValue> = utf8(line)?
        .split_whitespace()
        .map(|s| RespValue::BulkString(Bytes::copy_from_slice(s.as_bytes())))
        .collect();
    if parts.is_empty() {
        return Err(ParseError::ProtocolError("empty inline command".to_string()));
    }

    Ok(Some((RespValue::Array(parts), consumed)))
}

/// Returns the bytes before the first CRLF and the length including it.
fn read_line(buf: &[u8]) -> Option<(&[u8], usize)> {
    buf.windows(CRLF.len())
        .position(|w| w == CRLF)
        .map(|pos| (&buf[..pos], pos + CRLF.len()))
}

fn utf8(line: &[u8]) -> ParseResult<&str> {
    std::str::from_utf8(line).map_err(|_| ParseError::InvalidUtf8)
}

fn parse_int(line: &[u8]) -> ParseResult<i64> {
    let s = utf8(line)?;
    s.parse()
        .map_err(|_| ParseError::InvalidInteger(s.to_string()))
}

/// Parses a single message with default limits.
pub fn parse_message(buf: &[u8]) -> ParseResult<Parsed> {
    RespParser::new().parse(buf)
}
