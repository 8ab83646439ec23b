// THEORY:
// This file is the main entry point for the `haptic_mat` library crate.
// It defines the public API exposed to the outer collaborators (the monitor
// binary, the visualizer, an actuation transport).
//
// The library is organized the same way the sensing loop runs:
// - `core_modules` holds the individual stages: the serial frame protocol, the
//   two-hand clustering, hand isolation, posture analysis and actuator selection.
// - `pipeline` chains the pure stages into a single matrix -> flags call.
// - `feedback_loop` owns the device and drives one cycle after another.
//
// Nothing in this crate keeps a pressure matrix between cycles. Each stage hands
// its output to the next by value.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod feedback_loop;
pub mod pipeline;

pub use config::MatConfig;
pub use error::{MatError, Result};
