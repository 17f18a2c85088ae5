//! Exit code constants for the pgit CLI.
//!
//! Every command reports a single pass/fail outcome:
//! - 0: Success
//! - 1: Failure (the error kind is carried in the command result)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// Any failure: bad input, environment problems, failed transactions.
pub const FAILURE: i32 = 1;
