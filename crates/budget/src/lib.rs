//! Per-user budget enforcement for expensive semantic-index calls.
//!
//! Tracks call counters per user over two rolling calendar windows (UTC day,
//! ISO week) against configured ceilings. Purely in-process: no I/O, no
//! failure mode beyond programmer error. Denial is a normal decision branch,
//! never an exception.

pub mod governor;

pub use governor::{CallGovernor, SpendDecision, Window};
