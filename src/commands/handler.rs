//! Command Handler Module
//!
//! This module turns parsed RESP arrays into calls on the storage engine
//! and turns the results back into RESP replies.
//!
//! ## Supported Commands
//!
//! ### String Commands
//! - `SET key value [EX seconds]` - Set a key, optionally with a TTL
//! - `GET key` - Get a key's value
//! - `DEL key` - Delete a key from both namespaces
//! - `INCR key` - Increment integer
//!
//! ### Sorted Set Commands
//! - `ZADD key score member [score member ...]` - Add or update members
//! - `ZCARD key` - Number of members
//! - `ZRANK key member` - 0-based rank of a member
//! - `ZRANGE key start stop` - Members by inclusive index window
//!
//! ### Server Commands
//! - `PING [message]` - Test connection
//! - `DBSIZE` - Number of keys across both namespaces
//! - `INFO` - Health, uptime, command counters and key count
//! - `QUIT` - Close the connection
//!
//! ## Replies
//!
//! "No such key/member" is a RESP null, which clients print as `(nil)`.
//! Every failure is an `-ERR ...` reply and bumps the error counter;
//! every success bumps the counter for its command.

use crate::commands::metrics::CommandMetrics;
use crate::commands::validation::is_valid_token;
use crate::protocol::RespValue;
use crate::storage::{StorageEngine, StoreError};
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, warn};

/// Reasons a command is rejected before or while it runs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommandError {
    #[error("invalid command format")]
    InvalidFormat,

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    #[error("syntax error")]
    Syntax,

    #[error("invalid key")]
    InvalidKey,

    #[error("invalid value")]
    InvalidValue,

    #[error("invalid member")]
    InvalidMember,

    #[error("value is not an integer or out of range")]
    NotAnInteger,

    #[error("value is not a valid float")]
    NotAFloat,

    #[error("invalid expire time in 'SET' command")]
    InvalidExpireTime,

    #[error(transparent)]
    Store(#[from] StoreError),
}

type CommandResult = Result<RespValue, CommandError>;

/// Handles commands by dispatching them to the storage engine.
#[derive(Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
    metrics: Arc<CommandMetrics>,
}

impl CommandHandler {
    /// Creates a command handler over a shared engine and shared metrics.
    pub fn new(storage: Arc<StorageEngine>, metrics: Arc<CommandMetrics>) -> Self {
        Self { storage, metrics }
    }

    /// Executes a command and returns the response.
    ///
    /// # Arguments
    ///
    /// * `command` - The parsed RESP value (should be an array)
    pub fn execute(&self, command: RespValue) -> RespValue {
        let args = match command {
            RespValue::Array(args) if !args.is_empty() => args,
            _ => return self.fail("?", CommandError::InvalidFormat),
        };

        let name = match get_string(&args[0]) {
            Some(name) => name.to_ascii_uppercase(),
            None => return self.fail("?", CommandError::InvalidFormat),
        };

        match self.dispatch(&name, &args[1..]) {
            Ok(reply) => {
                self.metrics.track(&name);
                debug!(command = %name, "Command succeeded");
                reply
            }
            Err(e) => self.fail(&name, e),
        }
    }

    fn fail(&self, name: &str, error: CommandError) -> RespValue {
        self.metrics.track_error();
        warn!(command = %name, error = %error, "Command failed");
        RespValue::error(format!("ERR {}", error))
    }

    /// Dispatches a command to its handler.
    fn dispatch(&self, cmd: &str, args: &[RespValue]) -> CommandResult {
        match cmd {
            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "DEL" => self.cmd_del(args),
            "INCR" => self.cmd_incr(args),
            "DBSIZE" => self.cmd_dbsize(args),

            "ZADD" => self.cmd_zadd(args),
            "ZCARD" => self.cmd_zcard(args),
            "ZRANK" => self.cmd_zrank(args),
            "ZRANGE" => self.cmd_zrange(args),

            "PING" => self.cmd_ping(args),
            "INFO" => self.cmd_info(args),
            "QUIT" => Ok(RespValue::ok()),

            _ => Err(CommandError::UnknownCommand(cmd.to_string())),
        }
    }

    // ========================================================================
    // String Commands
    // ========================================================================

    /// SET key value [EX seconds]
    fn cmd_set(&self, args: &[RespValue]) -> CommandResult {
        let (key, value, ttl) = match args {
            [key, value] => (key, value, None),
            [key, value, opt, secs] => {
                if !get_string(opt).is_some_and(|o| o.eq_ignore_ascii_case("EX")) {
                    return Err(CommandError::Syntax);
                }
                let ttl = match get_integer(secs) {
                    Some(s) if s > 0 => Duration::from_secs(s as u64),
                    _ => return Err(CommandError::InvalidExpireTime),
                };
                // The deadline must be representable as an Instant
                if Instant::now().checked_add(ttl).is_none() {
                    return Err(CommandError::InvalidExpireTime);
                }
                (key, value, Some(ttl))
            }
            [_, _, ..] => return Err(CommandError::Syntax),
            _ => return Err(CommandError::WrongArity("SET")),
        };

        let key = key_arg(key)?;
        let value = token_arg(value, CommandError::InvalidValue)?;

        self.storage.set(&key, value, ttl);
        Ok(RespValue::ok())
    }

    /// GET key
    fn cmd_get(&self, args: &[RespValue]) -> CommandResult {
        let [key] = args else {
            return Err(CommandError::WrongArity("GET"));
        };
        let key = key_arg(key)?;

        Ok(match self.storage.get(&key) {
            Some(value) => RespValue::bulk_string(Bytes::from(value)),
            None => RespValue::null(),
        })
    }

    /// DEL key
    fn cmd_del(&self, args: &[RespValue]) -> CommandResult {
        let [key] = args else {
            return Err(CommandError::WrongArity("DEL"));
        };
        let key = key_arg(key)?;

        Ok(if self.storage.delete(&key) {
            RespValue::ok()
        } else {
            RespValue::null()
        })
    }

    /// INCR key
    fn cmd_incr(&self, args: &[RespValue]) -> CommandResult {
        let [key] = args else {
            return Err(CommandError::WrongArity("INCR"));
        };
        let key = key_arg(key)?;

        Ok(RespValue::integer(self.storage.incr(&key)?))
    }

    // ========================================================================
    // Sorted Set Commands
    // ========================================================================

    /// ZADD key score member [score member ...]
    fn cmd_zadd(&self, args: &[RespValue]) -> CommandResult {
        let Some((key, pairs)) = args.split_first() else {
            return Err(CommandError::WrongArity("ZADD"));
        };
        if pairs.is_empty() || pairs.len() % 2 != 0 {
            return Err(CommandError::WrongArity("ZADD"));
        }
        let key = key_arg(key)?;

        let members = pairs
            .chunks_exact(2)
            .map(|pair| {
                let score = get_float(&pair[0]).ok_or(CommandError::NotAFloat)?;
                let member = token_arg(&pair[1], CommandError::InvalidMember)?;
                Ok((score, member))
            })
            .collect::<Result<Vec<_>, CommandError>>()?;

        let added = self.storage.zadd(&key, &members);
        Ok(RespValue::integer(added as i64))
    }

    /// ZCARD key
    fn cmd_zcard(&self, args: &[RespValue]) -> CommandResult {
        let [key] = args else {
            return Err(CommandError::WrongArity("ZCARD"));
        };
        let key = key_arg(key)?;

        Ok(RespValue::integer(self.storage.zcard(&key) as i64))
    }

    /// ZRANK key member
    fn cmd_zrank(&self, args: &[RespValue]) -> CommandResult {
        let [key, member] = args else {
            return Err(CommandError::WrongArity("ZRANK"));
        };
        let key = key_arg(key)?;
        let member = token_arg(member, CommandError::InvalidMember)?;

        Ok(match self.storage.zrank(&key, &member) {
            Some(rank) => RespValue::integer(rank as i64),
            None => RespValue::null(),
        })
    }

    /// ZRANGE key start stop
    fn cmd_zrange(&self, args: &[RespValue]) -> CommandResult {
        let [key, start, stop] = args else {
            return Err(CommandError::WrongArity("ZRANGE"));
        };
        let key = key_arg(key)?;
        let start = get_integer(start).ok_or(CommandError::NotAnInteger)?;
        let stop = get_integer(stop).ok_or(CommandError::NotAnInteger)?;

        let members = self
            .storage
            .zrange(&key, start, stop)
            .into_iter()
            .map(|m| RespValue::bulk_string(Bytes::from(m)))
            .collect();
        Ok(RespValue::array(members))
    }

    // ========================================================================
    // Server Commands
    // ========================================================================

    /// PING [message]
    fn cmd_ping(&self, args: &[RespValue]) -> CommandResult {
        match args {
            [] => Ok(RespValue::pong()),
            [msg] => Ok(match msg {
                RespValue::BulkString(b) => RespValue::bulk_string(b.clone()),
                RespValue::SimpleString(s) => RespValue::bulk_string(Bytes::from(s.clone())),
                _ => RespValue::pong(),
            }),
            _ => Err(CommandError::WrongArity("PING")),
        }
    }

    /// DBSIZE
    fn cmd_dbsize(&self, args: &[RespValue]) -> CommandResult {
        if !args.is_empty() {
            return Err(CommandError::WrongArity("DBSIZE"));
        }
        Ok(RespValue::integer(self.storage.dbsize() as i64))
    }

    /// INFO
    fn cmd_info(&self, args: &[RespValue]) -> CommandResult {
        if !args.is_empty() {
            return Err(CommandError::WrongArity("INFO"));
        }
        let uptime = self.metrics.uptime();
        let started_at = self
            .metrics
            .started_at()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let snapshot = self.metrics.snapshot();
        let stats = self.storage.stats();

        let mut info = format!(
            "# Server\r\n\
             zsetkv_version:{}\r\n\
             status:healthy\r\n\
             uptime:{}\r\n\
             uptime_in_seconds:{}\r\n\
             started_at_unix:{}\r\n\
             \r\n\
             # Stats\r\n\
             total_commands_processed:{}\r\n\
             total_errors:{}\r\n\
             expired_keys:{}\r\n\
             \r\n\
             # Keyspace\r\n\
             keys:{}\r\n\
             sorted_sets:{}\r\n\
             \r\n\
             # Commandstats\r\n",
            crate::VERSION,
            format_uptime(uptime),
            uptime.as_secs(),
            started_at,
            snapshot.total_commands,
            snapshot.errors,
            stats.expired,
            self.storage.total_keys(),
            stats.sorted_set_keys,
        );
        for (command, calls) in &snapshot.commands {
            info.push_str(&format!("cmdstat_{}:calls={}\r\n", command.to_lowercase(), calls));
        }

        Ok(RespValue::bulk_string(Bytes::from(info)))
    }
}

// ============================================================================
// Argument helpers
// ============================================================================

/// Extracts a string from a RespValue.
fn get_string(value: &RespValue) -> Option<String> {
    value.as_str().map(|s| s.to_string())
}

/// Extracts an integer from a RespValue.
fn get_integer(value: &RespValue) -> Option<i64> {
    match value {
        RespValue::Integer(n) => Some(*n),
        other => other.as_str().and_then(|s| s.parse().ok()),
    }
}

/// Extracts a non-NaN float from a RespValue.
fn get_float(value: &RespValue) -> Option<f64> {
    let score = match value {
        RespValue::Integer(n) => *n as f64,
        other => other.as_str()?.parse::<f64>().ok()?,
    };
    (!score.is_nan()).then_some(score)
}

fn key_arg(value: &RespValue) -> Result<String, CommandError> {
    token_arg(value, CommandError::InvalidKey)
}

fn token_arg(value: &RespValue, error: CommandError) -> Result<String, CommandError> {
    get_string(value)
        .filter(|s| is_valid_token(s))
        .ok_or(error)
}

fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    format!(
        "{}d {}h {}m {}s",
        secs / 86_400,
        (secs % 86_400) / 3_600,
        (secs % 3_600) / 60,
        secs % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_handler() -> CommandHandler {
        let storage = Arc::new(StorageEngine::new());
        CommandHandler::new(storage, Arc::new(CommandMetrics::new()))
    }

    fn make_command(args: &[&str]) -> RespValue {
        RespValue::Array(
            args.iter()
                .map(|s| RespValue::bulk_string(Bytes::from(s.to_string())))
                .collect(),
        )
    }

    fn bulk(s: &str) -> RespValue {
        RespValue::bulk_string(Bytes::from(s.to_string()))
    }

    #[test]
    fn test_ping() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["PING"]));
        assert_eq!(response, RespValue::simple_string("PONG"));

        let response = handler.execute(make_command(&["PING", "hello"]));
        assert_eq!(response, bulk("hello"));
    }

    #[test]
    fn test_set_get() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["SET", "key", "value"]));
        assert_eq!(response, RespValue::ok());

        let response = handler.execute(make_command(&["get", "key"]));
        assert_eq!(response, bulk("value"));
    }

    #[test]
    fn test_get_nonexistent_prints_nil() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["GET", "nonexistent"]));
        assert_eq!(response, RespValue::null());
        assert_eq!(response.to_string(), "(nil)");
    }

    #[test]
    fn test_set_with_ex() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["SET", "key", "value", "EX", "100"]));
        assert_eq!(response, RespValue::ok());
        assert_eq!(handler.execute(make_command(&["GET", "key"])), bulk("value"));

        let ttl = handler.storage.ttl("key").flatten().unwrap();
        assert!(ttl > Duration::from_secs(95) && ttl <= Duration::from_secs(100));
    }

    #[test]
    fn test_set_rejects_bad_expire() {
        let handler = create_handler();

        for secs in ["0", "-5", "soon"] {
            let response = handler.execute(make_command(&["SET", "key", "value", "EX", secs]));
            assert_eq!(
                response,
                RespValue::error("ERR invalid expire time in 'SET' command")
            );
        }

        let response = handler.execute(make_command(&[
            "SET",
            "key",
            "value",
            "EX",
            "9223372036854775807",
        ]));
        assert_eq!(
            response,
            RespValue::error("ERR invalid expire time in 'SET' command")
        );
        assert_eq!(handler.storage.get("key"), None);

        let response = handler.execute(make_command(&["SET", "key", "value", "PX", "10"]));
        assert_eq!(response, RespValue::error("ERR syntax error"));

        let response = handler.execute(make_command(&["SET", "key"]));
        assert!(response.is_error());
    }

    #[test]
    fn test_validation() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["SET", "bad key", "value"]));
        assert_eq!(response, RespValue::error("ERR invalid key"));

        let response = handler.execute(make_command(&["SET", "key", "bad:value"]));
        assert_eq!(response, RespValue::error("ERR invalid value"));

        let response = handler.execute(make_command(&["ZRANK", "key", "m!"]));
        assert_eq!(response, RespValue::error("ERR invalid member"));

        let response = handler.execute(make_command(&["ZADD", "key", "1", "m m"]));
        assert_eq!(response, RespValue::error("ERR invalid member"));

        assert_eq!(handler.metrics.errors(), 4);
        assert_eq!(handler.storage.dbsize(), 0);
    }

    #[test]
    fn test_del() {
        let handler = create_handler();

        handler.execute(make_command(&["SET", "key", "value"]));
        handler.execute(make_command(&["ZADD", "key", "1", "a"]));

        assert_eq!(handler.execute(make_command(&["DEL", "key"])), RespValue::ok());
        assert_eq!(handler.execute(make_command(&["DEL", "key"])), RespValue::null());
        assert_eq!(handler.execute(make_command(&["DBSIZE"])), RespValue::integer(0));
    }

    #[test]
    fn test_incr() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(make_command(&["INCR", "counter"])),
            RespValue::integer(1)
        );
        assert_eq!(
            handler.execute(make_command(&["INCR", "counter"])),
            RespValue::integer(2)
        );

        handler.execute(make_command(&["SET", "text", "hello"]));
        let response = handler.execute(make_command(&["INCR", "text"]));
        assert_eq!(
            response,
            RespValue::error("ERR value is not an integer or out of range")
        );
        assert_eq!(handler.execute(make_command(&["GET", "text"])), bulk("hello"));
    }

    #[test]
    fn test_zadd_zcard_zrank() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["ZADD", "board", "1", "b", "1", "a"]));
        assert_eq!(response, RespValue::integer(2));

        let response = handler.execute(make_command(&["ZADD", "board", "0.5", "b"]));
        assert_eq!(response, RespValue::integer(0));

        assert_eq!(
            handler.execute(make_command(&["ZCARD", "board"])),
            RespValue::integer(2)
        );
        assert_eq!(
            handler.execute(make_command(&["ZCARD", "missing"])),
            RespValue::integer(0)
        );
        assert_eq!(
            handler.execute(make_command(&["ZRANK", "board", "b"])),
            RespValue::integer(0)
        );
        assert_eq!(
            handler.execute(make_command(&["ZRANK", "board", "nobody"])),
            RespValue::null()
        );
    }

    #[test]
    fn test_zadd_argument_errors() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["ZADD", "z", "1"]));
        assert_eq!(
            response,
            RespValue::error("ERR wrong number of arguments for 'ZADD' command")
        );

        let response = handler.execute(make_command(&["ZADD", "z", "abc", "a"]));
        assert_eq!(response, RespValue::error("ERR value is not a valid float"));

        let response = handler.execute(make_command(&["ZADD", "z", "nan", "a"]));
        assert_eq!(response, RespValue::error("ERR value is not a valid float"));

        // Nothing was partially applied
        assert_eq!(handler.storage.zcard("z"), 0);
    }

    #[test]
    fn test_zrange() {
        let handler = create_handler();

        handler.execute(make_command(&[
            "ZADD", "k", "10", "a", "20", "b", "30", "c", "40", "d", "50", "e",
        ]));

        let response = handler.execute(make_command(&["ZRANGE", "k", "-2", "-1"]));
        assert_eq!(response, RespValue::array(vec![bulk("d"), bulk("e")]));

        let response = handler.execute(make_command(&["ZRANGE", "k", "2", "1"]));
        assert_eq!(response, RespValue::array(vec![]));

        let response = handler.execute(make_command(&["ZRANGE", "nope", "0", "-1"]));
        assert_eq!(response, RespValue::array(vec![]));

        let response = handler.execute(make_command(&["ZRANGE", "k", "x", "1"]));
        assert!(response.is_error());
    }

    #[test]
    fn test_unknown_command() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["FLUSHALL"]));
        assert_eq!(response, RespValue::error("ERR unknown command 'FLUSHALL'"));

        let response = handler.execute(RespValue::integer(1));
        assert_eq!(response, RespValue::error("ERR invalid command format"));
    }

    #[test]
    fn test_metrics_tracking() {
        let handler = create_handler();

        handler.execute(make_command(&["SET", "a", "1"]));
        handler.execute(make_command(&["set", "b", "2"]));
        handler.execute(make_command(&["GET", "a"]));
        handler.execute(make_command(&["GET", "bad key"]));

        let snapshot = handler.metrics.snapshot();
        assert_eq!(snapshot.commands.get("SET"), Some(&2));
        assert_eq!(snapshot.commands.get("GET"), Some(&1));
        assert_eq!(snapshot.total_commands, 3);
        assert_eq!(snapshot.errors, 1);
    }

    #[test]
    fn test_info() {
        let handler = create_handler();

        handler.execute(make_command(&["SET", "a", "1"]));
        handler.execute(make_command(&["ZADD", "a", "1", "m"]));

        let response = handler.execute(make_command(&["INFO"]));
        let text = response.as_str().unwrap().to_string();

        assert!(text.contains("status:healthy"));
        assert!(text.contains("uptime:0d 0h 0m"));
        assert!(text.contains("keys:2"));
        assert!(text.contains("sorted_sets:1"));
        assert!(text.contains("cmdstat_set:calls=1"));
        assert!(text.contains("cmdstat_zadd:calls=1"));

        let response = handler.execute(make_command(&["INFO", "server"]));
        assert_eq!(
            response,
            RespValue::error("ERR wrong number of arguments for 'INFO' command")
        );
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 0h 0m 0s");
        assert_eq!(
            format_uptime(Duration::from_secs(2 * 86_400 + 3 * 3_600 + 4 * 60 + 5)),
            "2d 3h 4m 5s"
        );
    }
}
