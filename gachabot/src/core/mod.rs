//! Deterministic, pure logic shared by the control loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod chore;
pub mod counter;
pub mod health;
pub mod plausibility;
pub mod readiness;
pub mod ring;
pub mod types;
