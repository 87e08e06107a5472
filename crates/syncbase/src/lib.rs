//! Blocking synchronization primitives used across the frameloom pipeline.
//!
//! The cluster core schedules one thread per rendering pipe plus one network
//! receive thread per process; everything between them synchronizes through
//! the condition-variable-backed types in this crate. There is no cooperative
//! scheduling and no cancellation token; a waiter is released only by a
//! matching state change, and teardown relies on the caller guaranteeing one.

mod monitor;
mod queue;
mod request;

pub use monitor::Monitor;
pub use queue::MtQueue;
pub use request::{RequestError, RequestHandler, RequestId};
