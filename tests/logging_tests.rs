//! Unit tests for the logging functionality in the `mbus-serial` crate.

use mbus_serial::logging::{init_logger, init_logger_with_level, log_debug, log_error, log_info, log_warn};

/// Tests that the logging helpers work as expected.
#[test]
fn test_logging() {
    // Just ensure logging functions do not panic, with or without a logger.
    log_error("This is an error message");
    log_warn("This is a warning message");
    log_info("This is an info message");
    log_debug("This is a debug message");
}

/// Tests that the logger can be initialized more than once.
#[test]
fn test_init_logger() {
    init_logger();
    init_logger_with_level(log::LevelFilter::Debug);
    init_logger();
}
