//! 6502 CPU core for an NES emulator: opcode table and decoder, execution
//! engine, stack, interrupt controller and the CPU memory bus with its
//! picture-unit register window.

pub mod config;
pub mod cpu;
pub mod decoder;
pub mod error;
pub mod interrupt;
pub mod memory;
pub mod opcodes;
pub mod ppu;
pub mod stack;
pub mod system;

#[cfg(feature = "config")]
pub use config::ConfigError;
pub use config::CoreConfig;
pub use cpu::{Cpu, CpuBus, Flags, Step};
pub use decoder::{decode, Instruction};
pub use error::{EmuError, Result};
pub use interrupt::{Interrupt, InterruptController, InterruptState};
pub use memory::{word_from_bytes, MemoryBus};
pub use opcodes::{lookup, AddrMode, Mnemonic, OpcodeInfo, OPCODES};
pub use ppu::{PpuMemory, PpuRegisters};
pub use stack::Stack;
pub use system::Nes;
