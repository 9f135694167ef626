//! Instruction session simulator
//!
//! Drives a seeded random session against the in-memory host with injected
//! host failures and checks the lifecycle guarantees end to end.

#![allow(missing_docs)]

pub mod simulator;

pub use simulator::{run_simulator, SimConfigFile, SimulatorConfig, SimulatorReport, Violation};
