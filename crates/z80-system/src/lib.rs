//! Top-level orchestrator.
//!
//! Owns the mode state machine (`None`/`Normal`/`Test`/`Decompile`), wires
//! the signal fabric, memory controller, CPU and oscillator into a single
//! [`Machine`] aggregate, and drives it from CLI flags and a CFG file.

mod bios;
mod cli;
mod decompile;
mod machine;
mod memory_devices;
mod mode;

pub use bios::load_bios_rom;
pub use cli::{parse, parse_args, CliArgs, DEFAULT_CFG};
pub use decompile::run_decompile;
pub use machine::Machine;
pub use memory_devices::load_memory_devices;
pub use mode::Mode;
