pub mod bios;
pub mod console;
pub mod decoder;
pub mod error;
pub mod flags;
pub mod format;
pub mod memory;
pub mod opcodes;
pub mod simulator;
pub mod structs;

pub use error::{DecodeError, EmulatorError};
pub use simulator::{execute, HaltReason, Simulator, SimulatorConfig, State};
