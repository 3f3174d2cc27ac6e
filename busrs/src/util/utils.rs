//! Small helpers shared across the crate.

/// Logs the error of a `Result` with context and turns it into an `Option`.
///
/// Used where a failure must not abort the current dispatch step.
/// Usage: `try_log!(result, "context message")`
macro_rules! try_log {
    ($result:expr, $context:expr) => {
        match $result {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("{}: {}", $context, e);
                None
            }
        }
    };
}

pub(crate) use try_log;
