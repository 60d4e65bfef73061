//! Process-wide tracing setup for ledger binaries.

pub mod subscriber;

pub use subscriber::LogFormat;

/// Initialize tracing with the format named by `LOTLEDGER_LOG_FORMAT`.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    subscriber::init(LogFormat::from_env());
}

/// Initialize tracing with an explicit format.
pub fn init_with(format: LogFormat) {
    subscriber::init(format);
}
