//! Liveness supervision.
//!
//! The [`Controller`] owns the collaborators of the agent, keeps the
//! reconciliation loop alive until a shutdown signal arrives and then drains it.

pub mod controller_handler;

pub use controller_handler::{Components, Controller};
