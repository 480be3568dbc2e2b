//! Logging macros gated by a module-level `ENABLE_LOGS` flag, plus the
//! process-wide logger setup.
//!
//! The hot loops (capture at 100 ms, analysis at 1 s) are noisy at `info`, so
//! each of those modules can silence itself without touching `RUST_LOG`:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_debug, log_info, log_warn, log_error};
//!
//! log_info!("capture loop started for {} monitors", 2);
//! ```

/// Conditional debug logging; requires `ENABLE_LOGS` in the calling module.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

/// Conditional info logging; requires `ENABLE_LOGS` in the calling module.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Conditional warn logging; requires `ENABLE_LOGS` in the calling module.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Conditional error logging; requires `ENABLE_LOGS` in the calling module.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}

/// Initializes `env_logger` from `RUST_LOG`, falling back to `info`
/// (`debug` when `SCREENGUARD_DEBUG` is set). Safe to call more than once.
pub fn init_logging() {
    let default_level = if debug_enabled() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(default_level);
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }
    let _ = builder.try_init();
}

pub fn debug_enabled() -> bool {
    std::env::var("SCREENGUARD_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
