//! Cooperative cancellation for pipeline runs.
//!
//! Cancellation is checked between node executions, never mid-node.

mod token;

pub use token::CancellationToken;
