//! Closed-loop stimulation control.
//!
//! A [`control::Controller`] turns a biomarker measurement and setpoint
//! into a bounded stimulation amplitude once per sample interval. The PID
//! strategy adds anti-windup, optional rate limiting, Ziegler-Nichols
//! tuning and closed-loop diagnostics; the [`sim`] driver closes the loop
//! against any [`sim::Plant`].

pub mod config;
pub mod control;
pub mod error;
pub mod sim;

pub use error::{ControlError, ControlResult};
