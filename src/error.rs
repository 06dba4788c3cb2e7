use thiserror::Error;

/// Fatal conditions raised by the instruction core.
///
/// Both variants are deterministic for a given program and memory image;
/// callers decide whether to halt, log or reset.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmuError {
    #[error("Invalid opcode 0x{opcode:02X} at PC 0x{pc:04X}")]
    InvalidOpcode { opcode: u8, pc: u16 },
    #[error("Address out of range: 0x{0:05X}")]
    AddressOutOfRange(u32),
}

pub type Result<T> = std::result::Result<T, EmuError>;
