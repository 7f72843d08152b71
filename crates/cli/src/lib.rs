//! Meshboard CLI
//!
//! Command-line interface for onboarding switches and firewalls into a
//! mesh overlay network.

pub mod commands;
pub mod context;
pub mod output;
