//! Agent Coordination Library
//!
//! Status registry, task claims and conflict ledger shared by agents working
//! on the same feature. This module exports the core components for testing
//! and integration.

pub mod cli;
pub mod config;
pub mod coord;
pub mod db;
pub mod error;
pub mod logging;
pub mod types;

pub use coord::Coordinator;
