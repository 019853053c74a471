//! Guest logging.
//!
//! Messages a guest emits through `env::log` are kept on the invocation's
//! [`WorkerContext`] and forwarded to `tracing` under the `guest` target, so
//! `RUST_LOG=guest=debug` shows everything user code prints.

use emulator_core::store::{LogLevel, WorkerContext};
use tracing::{debug, error, info, warn};

/// Longest message kept from a single `env::log` call.
pub const MAX_MESSAGE_BYTES: usize = 16 * 1024;

/// Records guest log lines.
pub struct GuestLogger;

impl GuestLogger {
    /// Record `message` at `level` for the invocation owning `ctx`.
    ///
    /// Messages longer than [`MAX_MESSAGE_BYTES`] are truncated on a char
    /// boundary.
    pub fn record(ctx: &mut WorkerContext, level: LogLevel, message: &str) {
        let message = truncate(message, MAX_MESSAGE_BYTES);
        let request_id = ctx.request_id.as_str();

        match level {
            LogLevel::Debug => debug!(target: "guest", request_id, "{message}"),
            LogLevel::Info => info!(target: "guest", request_id, "{message}"),
            LogLevel::Warn => warn!(target: "guest", request_id, "{message}"),
            LogLevel::Error => error!(target: "guest", request_id, "{message}"),
        }

        ctx.log(level, message.to_string());
    }
}

/// Convert a numeric log level to [`LogLevel`].
///
/// 0=debug, 1=info, 2=warn, 3=error; anything else is info.
pub fn level_from_i32(level: i32) -> LogLevel {
    match level {
        0 => LogLevel::Debug,
        2 => LogLevel::Warn,
        3 => LogLevel::Error,
        _ => LogLevel::Info,
    }
}

fn truncate(message: &str, max: usize) -> &str {
    if message.len() <= max {
        return message;
    }
    let mut end = max;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    &message[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_stores_in_context() {
        let mut ctx = WorkerContext::new("req-7".into(), false);

        GuestLogger::record(&mut ctx, LogLevel::Info, "deployed");
        GuestLogger::record(&mut ctx, LogLevel::Error, "boom");

        assert_eq!(ctx.logs.len(), 2);
        assert_eq!(ctx.logs[0].message, "deployed");
        assert_eq!(ctx.logs[0].level, LogLevel::Info);
        assert_eq!(ctx.logs[1].level, LogLevel::Error);
    }

    #[test]
    fn test_record_truncates_long_messages() {
        let mut ctx = WorkerContext::new("req".into(), false);
        let long = "é".repeat(MAX_MESSAGE_BYTES);

        GuestLogger::record(&mut ctx, LogLevel::Warn, &long);

        let kept = &ctx.logs[0].message;
        assert!(kept.len() <= MAX_MESSAGE_BYTES);
        assert!(kept.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_level_from_i32() {
        assert_eq!(level_from_i32(0), LogLevel::Debug);
        assert_eq!(level_from_i32(1), LogLevel::Info);
        assert_eq!(level_from_i32(2), LogLevel::Warn);
        assert_eq!(level_from_i32(3), LogLevel::Error);
        assert_eq!(level_from_i32(-4), LogLevel::Info);
    }
}
