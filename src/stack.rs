use crate::cpu::{CpuBus, Flags};
use crate::memory::word_from_bytes;

pub const STACK_PAGE: u16 = 0x0100;

/// Hardware stack at $0100-$01FF. The pointer wraps modulo 256 in both
/// directions, so an exhausted stack aliases instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stack {
    pub pointer: u8,
}

impl Stack {
    pub fn new(pointer: u8) -> Self {
        Self { pointer }
    }

    /// Bus address the next push writes to.
    pub fn top_address(&self) -> u16 {
        STACK_PAGE + self.pointer as u16
    }

    pub fn push(&mut self, value: u8, bus: &mut dyn CpuBus) {
        bus.store(self.top_address(), value);
        self.pointer = self.pointer.wrapping_sub(1);
    }

    pub fn pop(&mut self, bus: &mut dyn CpuBus) -> u8 {
        self.pointer = self.pointer.wrapping_add(1);
        bus.load(self.top_address())
    }

    /// High byte first, so the low byte ends up on top.
    pub fn push_word(&mut self, value: u16, bus: &mut dyn CpuBus) {
        self.push((value >> 8) as u8, bus);
        self.push(value as u8, bus);
    }

    pub fn pop_word(&mut self, bus: &mut dyn CpuBus) -> u16 {
        let low = self.pop(bus);
        let high = self.pop(bus);
        word_from_bytes(low, high)
    }

    /// Push `flags` packed as NV1BDIZC. `break_bit` decides bit 4 of the
    /// pushed byte: set for BRK and PHP, clear for hardware interrupts.
    pub fn push_flags(&mut self, flags: Flags, break_bit: bool, bus: &mut dyn CpuBus) {
        let packed = Flags {
            break_command: break_bit,
            ..flags
        }
        .to_byte();
        self.push(packed, bus);
    }

    pub fn pop_flags(&mut self, bus: &mut dyn CpuBus) -> Flags {
        Flags::from_byte(self.pop(bus))
    }
}
