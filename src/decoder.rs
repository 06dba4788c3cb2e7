use std::fmt;

use crate::cpu::CpuBus;
use crate::error::{EmuError, Result};
use crate::memory::word_from_bytes;
use crate::opcodes::{lookup, AddrMode, Mnemonic};

/// One decoded instruction. Built per fetch, consumed once by the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Address of the opcode byte.
    pub address: u16,
    pub opcode: u8,
    pub mnemonic: Mnemonic,
    pub mode: AddrMode,
    operands: [u8; 2],
    pub cycles: u8,
    pub page_penalty: bool,
}

impl Instruction {
    pub fn operands(&self) -> &[u8] {
        &self.operands[..self.mode.operand_len() as usize]
    }

    /// Total length in bytes, opcode included.
    pub fn len(&self) -> u16 {
        1 + self.mode.operand_len() as u16
    }

    /// First operand byte (immediate value, zero-page address or branch offset).
    pub fn byte(&self) -> u8 {
        self.operands[0]
    }

    /// Both operand bytes as a little-endian address.
    pub fn word(&self) -> u16 {
        word_from_bytes(self.operands[0], self.operands[1])
    }
}

/// Decode the instruction at `pc`.
///
/// The opcode byte is checked against the table before any operand is
/// fetched, so an unknown byte costs exactly one bus read.
pub fn decode(bus: &mut dyn CpuBus, pc: u16) -> Result<Instruction> {
    let opcode = bus.load(pc);
    let info = lookup(opcode).ok_or(EmuError::InvalidOpcode { opcode, pc })?;

    let mut operands = [0u8; 2];
    match info.mode.operand_len() {
        0 => {
            // Single-byte instructions still put the next address on the bus
            let _ = bus.load(pc.wrapping_add(1));
        }
        len => {
            for (i, slot) in operands.iter_mut().take(len as usize).enumerate() {
                *slot = bus.load(pc.wrapping_add(1 + i as u16));
            }
        }
    }

    Ok(Instruction {
        address: pc,
        opcode,
        mnemonic: info.mnemonic,
        mode: info.mode,
        operands,
        cycles: info.cycles,
        page_penalty: info.page_penalty,
    })
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.mnemonic;
        match self.mode {
            AddrMode::Implied => write!(f, "{}", m),
            AddrMode::Accumulator => write!(f, "{} A", m),
            AddrMode::Immediate => write!(f, "{} #${:02X}", m, self.byte()),
            AddrMode::ZeroPage => write!(f, "{} ${:02X}", m, self.byte()),
            AddrMode::ZeroPageX => write!(f, "{} ${:02X},X", m, self.byte()),
            AddrMode::ZeroPageY => write!(f, "{} ${:02X},Y", m, self.byte()),
            AddrMode::Relative => {
                let target = self
                    .address
                    .wrapping_add(self.len())
                    .wrapping_add(self.byte() as i8 as u16);
                write!(f, "{} ${:04X}", m, target)
            }
            AddrMode::Absolute => write!(f, "{} ${:04X}", m, self.word()),
            AddrMode::AbsoluteX => write!(f, "{} ${:04X},X", m, self.word()),
            AddrMode::AbsoluteY => write!(f, "{} ${:04X},Y", m, self.word()),
            AddrMode::Indirect => write!(f, "{} (${:04X})", m, self.word()),
            AddrMode::IndexedIndirect => write!(f, "{} (${:02X},X)", m, self.byte()),
            AddrMode::IndirectIndexed => write!(f, "{} (${:02X}),Y", m, self.byte()),
        }
    }
}
