#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod cadence;
pub mod classify;
pub mod config;
pub mod error;
pub mod gates;
pub mod intake;
pub mod metadata;
pub mod orchestrator;
pub mod plan;
pub mod planner;
pub mod providers;
pub mod resources;
pub mod safety;
pub mod scrub;
pub mod store;
pub mod telemetry;

pub use config::PolicySettings;
pub use error::{Result, SelahError};
pub use orchestrator::session::TurnSession;
pub use orchestrator::{Orchestrator, TurnOutput, TurnState};
