//! Unattended station scheduler for a screen-driven game agent.
//!
//! The agent repeatedly picks the most urgent ready chore (a station) from a
//! fixed priority roster, reorients itself on a ring of viewpoints, reads
//! resource amounts off the screen and reports what happened. The
//! architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (ring routing, plausibility
//!   bounding, readiness, counters, step scripts). No I/O.
//! - **[`io`]**: Boundary adapters (movement and vision collaborators, clock,
//!   config, notifications). Isolated behind traits to enable scripting in tests.
//!
//! Orchestration modules ([`navigator`], [`perception`], [`station`],
//! [`scheduler`], [`recovery`], [`looping`]) coordinate core logic with the
//! collaborators.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod navigator;
pub mod perception;
pub mod recovery;
pub mod roster;
pub mod scheduler;
pub mod station;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
