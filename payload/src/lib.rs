//! Speedtest payload library
//!
//! Data model for one run of the external measurement tool: the parsed
//! result document, the outcome of an invocation attempt, and the failure
//! taxonomy shared by the prober and the scheduler.

pub mod constants;
pub mod error;
pub mod outcome;
pub mod result;

pub use constants::*;
pub use error::PayloadError;
pub use outcome::{FailureKind, ProbeFailure, ProbeOutcome};
pub use result::{ClientInfo, MeasurementResult, ServerInfo};

/// Divisor from bits per second to megabits per second
pub const BITS_PER_MEGABIT: f64 = 1_000_000.0;
