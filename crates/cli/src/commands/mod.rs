//! CLI Commands

pub mod config;
pub mod devices;
pub mod fleet;
pub mod onboard;
pub mod validate;
