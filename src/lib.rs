pub mod command_channel;
pub mod configuration;
pub mod controller;
pub mod data_capture;
pub mod error_handling;
pub mod reconciliation;
pub mod storage;

pub use controller::Controller;
