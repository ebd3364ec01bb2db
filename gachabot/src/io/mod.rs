//! Boundary adapters: collaborator traits, configuration, clocks and
//! notification delivery.

pub mod clock;
pub mod config;
pub mod dry_run;
pub mod movement;
pub mod notify;
pub mod process;
pub mod vision;
