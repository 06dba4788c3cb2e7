use log::{debug, trace, warn};

use crate::config::CoreConfig;
use crate::decoder::{decode, Instruction};
use crate::error::{EmuError, Result};
use crate::interrupt::{Interrupt, InterruptController, INTERRUPT_CYCLES};
use crate::memory::word_from_bytes;
use crate::opcodes::{AddrMode, Mnemonic};
use crate::stack::Stack;

// Status flags
pub const FLAG_C: u8 = 0x01; // Carry
pub const FLAG_Z: u8 = 0x02; // Zero
pub const FLAG_I: u8 = 0x04; // Interrupt Disable
pub const FLAG_D: u8 = 0x08; // Decimal Mode (unused on NES)
pub const FLAG_B: u8 = 0x10; // Break
pub const FLAG_U: u8 = 0x20; // Unused (always 1)
pub const FLAG_V: u8 = 0x40; // Overflow
pub const FLAG_N: u8 = 0x80; // Negative

pub trait CpuBus {
    fn load(&mut self, address: u16) -> u8;
    fn store(&mut self, address: u16, value: u8);

    /// Little-endian word at `address`. Fails when the high byte would sit
    /// past the end of the address space.
    fn load_word(&mut self, address: u16) -> Result<u16> {
        let high_address = address as u32 + 1;
        if high_address > 0xFFFF {
            return Err(EmuError::AddressOutOfRange(high_address));
        }
        let low = self.load(address);
        let high = self.load(high_address as u16);
        Ok(word_from_bytes(low, high))
    }
}

/// The seven processor status flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub carry: bool,
    pub zero: bool,
    pub interrupt_disable: bool,
    pub decimal: bool,
    pub break_command: bool,
    pub overflow: bool,
    pub negative: bool,
}

impl Flags {
    /// Pack as NV1BDIZC, bit 7 down to bit 0.
    pub fn to_byte(self) -> u8 {
        let mut value = FLAG_U;
        for (set, bit) in [
            (self.carry, FLAG_C),
            (self.zero, FLAG_Z),
            (self.interrupt_disable, FLAG_I),
            (self.decimal, FLAG_D),
            (self.break_command, FLAG_B),
            (self.overflow, FLAG_V),
            (self.negative, FLAG_N),
        ] {
            if set {
                value |= bit;
            }
        }
        value
    }

    pub fn from_byte(value: u8) -> Self {
        Self {
            carry: value & FLAG_C != 0,
            zero: value & FLAG_Z != 0,
            interrupt_disable: value & FLAG_I != 0,
            decimal: value & FLAG_D != 0,
            break_command: value & FLAG_B != 0,
            overflow: value & FLAG_V != 0,
            negative: value & FLAG_N != 0,
        }
    }
}

/// Outcome of one `step`: the instruction executed, or `None` when an
/// interrupt handler was entered instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub instruction: Option<Instruction>,
    pub cycles: u64,
}

impl Step {
    pub fn is_break(&self) -> bool {
        matches!(self.instruction, Some(ins) if ins.mnemonic == Mnemonic::Brk)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operand {
    Implied,
    Accumulator,
    Immediate(u8),
    Memory { addr: u16, crossed: bool },
}

impl Operand {
    fn at(addr: u16) -> Self {
        Operand::Memory { addr, crossed: false }
    }

    fn crossed(self) -> bool {
        matches!(self, Operand::Memory { crossed: true, .. })
    }
}

#[derive(Debug, Clone)]
pub struct Cpu {
    pub pc: u16,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub stack: Stack,
    pub flags: Flags,
    pub cycles: u64,
    pub interrupts: InterruptController,
    honor_irq_mask: bool,
    busy_cycles: u64,
}

impl Cpu {
    pub fn new() -> Self {
        Self::with_config(&CoreConfig::default())
    }

    pub fn with_config(config: &CoreConfig) -> Self {
        Self {
            pc: 0,
            a: 0,
            x: 0,
            y: 0,
            stack: Stack::new(config.initial_stack_pointer),
            flags: Flags {
                interrupt_disable: true,
                ..Flags::default()
            },
            cycles: 0,
            interrupts: InterruptController::new(),
            honor_irq_mask: config.honor_irq_mask,
            busy_cycles: 0,
        }
    }

    pub fn sp(&self) -> u8 {
        self.stack.pointer
    }

    /// Status register as PHP would see it, minus the B override.
    pub fn status(&self) -> u8 {
        self.flags.to_byte()
    }

    /// Load PC from the reset vector. Nothing is pushed.
    pub fn reset(&mut self, bus: &mut dyn CpuBus) -> u64 {
        self.service_interrupt(Interrupt::Reset, bus)
    }

    /// Raise an interrupt line. It is honoured at the next instruction boundary.
    pub fn trigger_interrupt(&mut self, interrupt: Interrupt) {
        if interrupt.maskable() && self.honor_irq_mask && self.flags.interrupt_disable {
            warn!("{:?} raised while masked at PC 0x{:04X}, held pending", interrupt, self.pc);
        } else {
            debug!("{:?} requested at PC 0x{:04X}", interrupt, self.pc);
        }
        self.interrupts.trigger(interrupt);
    }

    /// Execute one instruction, or enter one pending interrupt handler, and
    /// return the cycles it took.
    pub fn step(&mut self, bus: &mut dyn CpuBus) -> Result<u64> {
        Ok(self.step_instruction(bus)?.cycles)
    }

    /// Like `step`, but also reports what ran.
    pub fn step_instruction(&mut self, bus: &mut dyn CpuBus) -> Result<Step> {
        if let Some(interrupt) = self.next_interrupt() {
            return Ok(Step {
                instruction: None,
                cycles: self.service_interrupt(interrupt, bus),
            });
        }
        let (ins, cycles) = self.execute_next(bus)?;
        Ok(Step {
            instruction: Some(ins),
            cycles,
        })
    }

    /// Advance one CPU cycle. Returns the cost of the instruction or
    /// interrupt entry started on this cycle, or 0 while one is in flight.
    pub fn tick(&mut self, bus: &mut dyn CpuBus) -> Result<u64> {
        if self.busy_cycles > 1 {
            self.busy_cycles -= 1;
            return Ok(0);
        }
        let cycles = self.step(bus)?;
        self.busy_cycles = cycles;
        Ok(cycles)
    }

    /// Run until a BRK has executed. Returns the total cycles spent,
    /// including the BRK itself.
    pub fn run_until_break(&mut self, bus: &mut dyn CpuBus) -> Result<u64> {
        let mut total = 0;
        loop {
            let step = self.step_instruction(bus)?;
            total += step.cycles;
            if step.is_break() {
                return Ok(total);
            }
        }
    }

    /// Step until at least `budget` cycles have elapsed.
    pub fn run_for_cycles(&mut self, bus: &mut dyn CpuBus, budget: u64) -> Result<u64> {
        let mut total = 0;
        while total < budget {
            total += self.step(bus)?;
        }
        Ok(total)
    }

    fn next_interrupt(&mut self) -> Option<Interrupt> {
        let masked = self.honor_irq_mask && self.flags.interrupt_disable;
        self.interrupts.take(masked)
    }

    fn service_interrupt(&mut self, interrupt: Interrupt, bus: &mut dyn CpuBus) -> u64 {
        if interrupt != Interrupt::Reset {
            self.stack.push_word(self.pc, bus);
            // Hardware interrupts push B clear
            self.stack.push_flags(self.flags, false, bus);
        }
        self.flags.interrupt_disable = true;
        let return_pc = self.pc;
        self.pc = self.read_vector(interrupt.vector(), bus);
        debug!(
            "{:?} serviced: PC 0x{:04X} -> 0x{:04X}, SP:{:02X}",
            interrupt,
            return_pc,
            self.pc,
            self.stack.pointer
        );
        self.cycles += INTERRUPT_CYCLES;
        INTERRUPT_CYCLES
    }

    fn execute_next(&mut self, bus: &mut dyn CpuBus) -> Result<(Instruction, u64)> {
        let ins = decode(bus, self.pc)?;
        trace!(
            "{:04X} {:02X} {:<14} A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X}",
            ins.address,
            ins.opcode,
            ins.to_string(),
            self.a,
            self.x,
            self.y,
            self.status(),
            self.stack.pointer
        );
        let cycles = self.execute(&ins, bus);
        self.cycles += cycles;
        Ok((ins, cycles))
    }

    fn execute(&mut self, ins: &Instruction, bus: &mut dyn CpuBus) -> u64 {
        self.pc = ins.address.wrapping_add(ins.len());
        let operand = self.resolve(ins, bus);

        let mut cycles = ins.cycles as u64;
        if ins.page_penalty && operand.crossed() {
            cycles += 1;
        }

        match ins.mnemonic {
            // Loads and stores
            Mnemonic::Lda => {
                self.a = self.read(operand, bus);
                self.update_zero_negative(self.a);
            }
            Mnemonic::Ldx => {
                self.x = self.read(operand, bus);
                self.update_zero_negative(self.x);
            }
            Mnemonic::Ldy => {
                self.y = self.read(operand, bus);
                self.update_zero_negative(self.y);
            }
            Mnemonic::Sta => self.write(operand, self.a, bus),
            Mnemonic::Stx => self.write(operand, self.x, bus),
            Mnemonic::Sty => self.write(operand, self.y, bus),

            // Arithmetic and logic
            Mnemonic::Adc => {
                let value = self.read(operand, bus);
                self.adc(value);
            }
            Mnemonic::Sbc => {
                let value = self.read(operand, bus);
                self.sbc(value);
            }
            Mnemonic::And => {
                let value = self.read(operand, bus);
                self.and(value);
            }
            Mnemonic::Ora => {
                let value = self.read(operand, bus);
                self.ora(value);
            }
            Mnemonic::Eor => {
                let value = self.read(operand, bus);
                self.eor(value);
            }
            Mnemonic::Cmp => {
                let value = self.read(operand, bus);
                self.compare(self.a, value);
            }
            Mnemonic::Cpx => {
                let value = self.read(operand, bus);
                self.compare(self.x, value);
            }
            Mnemonic::Cpy => {
                let value = self.read(operand, bus);
                self.compare(self.y, value);
            }
            Mnemonic::Bit => {
                let value = self.read(operand, bus);
                self.bit(value);
            }

            // Shifts and rotates (accumulator or memory)
            Mnemonic::Asl => {
                let value = self.read(operand, bus);
                let result = self.asl(value);
                self.write(operand, result, bus);
            }
            Mnemonic::Lsr => {
                let value = self.read(operand, bus);
                let result = self.lsr(value);
                self.write(operand, result, bus);
            }
            Mnemonic::Rol => {
                let value = self.read(operand, bus);
                let result = self.rol(value);
                self.write(operand, result, bus);
            }
            Mnemonic::Ror => {
                let value = self.read(operand, bus);
                let result = self.ror(value);
                self.write(operand, result, bus);
            }

            // Increments and decrements
            Mnemonic::Inc => {
                let result = self.read(operand, bus).wrapping_add(1);
                self.update_zero_negative(result);
                self.write(operand, result, bus);
            }
            Mnemonic::Dec => {
                let result = self.read(operand, bus).wrapping_sub(1);
                self.update_zero_negative(result);
                self.write(operand, result, bus);
            }
            Mnemonic::Inx => {
                self.x = self.x.wrapping_add(1);
                self.update_zero_negative(self.x);
            }
            Mnemonic::Iny => {
                self.y = self.y.wrapping_add(1);
                self.update_zero_negative(self.y);
            }
            Mnemonic::Dex => {
                self.x = self.x.wrapping_sub(1);
                self.update_zero_negative(self.x);
            }
            Mnemonic::Dey => {
                self.y = self.y.wrapping_sub(1);
                self.update_zero_negative(self.y);
            }

            // Branches
            Mnemonic::Bpl => cycles += self.branch(ins.address, !self.flags.negative, operand),
            Mnemonic::Bmi => cycles += self.branch(ins.address, self.flags.negative, operand),
            Mnemonic::Bvc => cycles += self.branch(ins.address, !self.flags.overflow, operand),
            Mnemonic::Bvs => cycles += self.branch(ins.address, self.flags.overflow, operand),
            Mnemonic::Bcc => cycles += self.branch(ins.address, !self.flags.carry, operand),
            Mnemonic::Bcs => cycles += self.branch(ins.address, self.flags.carry, operand),
            Mnemonic::Bne => cycles += self.branch(ins.address, !self.flags.zero, operand),
            Mnemonic::Beq => cycles += self.branch(ins.address, self.flags.zero, operand),

            // Jumps and subroutines
            Mnemonic::Jmp => {
                if let Operand::Memory { addr, .. } = operand {
                    self.pc = addr;
                }
            }
            Mnemonic::Jsr => {
                if let Operand::Memory { addr, .. } = operand {
                    self.stack.push_word(self.pc.wrapping_sub(1), bus);
                    self.pc = addr;
                }
            }
            Mnemonic::Rts => {
                self.pc = self.stack.pop_word(bus).wrapping_add(1);
            }
            Mnemonic::Rti => {
                self.flags = self.stack.pop_flags(bus);
                self.pc = self.stack.pop_word(bus);
            }
            Mnemonic::Brk => {
                // Return address skips the padding byte after BRK
                self.stack.push_word(self.pc.wrapping_add(1), bus);
                self.stack.push_flags(self.flags, true, bus);
                self.flags.break_command = true;
                self.flags.interrupt_disable = true;
                self.pc = self.read_vector(Interrupt::Irq.vector(), bus);
            }

            // Stack
            Mnemonic::Pha => self.stack.push(self.a, bus),
            Mnemonic::Php => self.stack.push_flags(self.flags, true, bus),
            Mnemonic::Pla => {
                self.a = self.stack.pop(bus);
                self.update_zero_negative(self.a);
            }
            Mnemonic::Plp => self.flags = self.stack.pop_flags(bus),

            // Transfers
            Mnemonic::Tax => {
                self.x = self.a;
                self.update_zero_negative(self.x);
            }
            Mnemonic::Tay => {
                self.y = self.a;
                self.update_zero_negative(self.y);
            }
            Mnemonic::Txa => {
                self.a = self.x;
                self.update_zero_negative(self.a);
            }
            Mnemonic::Tya => {
                self.a = self.y;
                self.update_zero_negative(self.a);
            }
            Mnemonic::Tsx => {
                self.x = self.stack.pointer;
                self.update_zero_negative(self.x);
            }
            Mnemonic::Txs => self.stack.pointer = self.x,

            // Flag operations
            Mnemonic::Clc => self.flags.carry = false,
            Mnemonic::Sec => self.flags.carry = true,
            Mnemonic::Cli => self.flags.interrupt_disable = false,
            Mnemonic::Sei => self.flags.interrupt_disable = true,
            Mnemonic::Cld => self.flags.decimal = false,
            Mnemonic::Sed => self.flags.decimal = true,
            Mnemonic::Clv => self.flags.overflow = false,

            Mnemonic::Nop => {}
        }

        cycles
    }

    // Addressing modes
    fn resolve(&self, ins: &Instruction, bus: &mut dyn CpuBus) -> Operand {
        match ins.mode {
            AddrMode::Implied => Operand::Implied,
            AddrMode::Accumulator => Operand::Accumulator,
            AddrMode::Immediate | AddrMode::Relative => Operand::Immediate(ins.byte()),
            AddrMode::ZeroPage => Operand::at(ins.byte() as u16),
            AddrMode::ZeroPageX => Operand::at(ins.byte().wrapping_add(self.x) as u16),
            AddrMode::ZeroPageY => Operand::at(ins.byte().wrapping_add(self.y) as u16),
            AddrMode::Absolute => Operand::at(ins.word()),
            AddrMode::AbsoluteX => Self::indexed(ins.word(), self.x),
            AddrMode::AbsoluteY => Self::indexed(ins.word(), self.y),
            AddrMode::Indirect => {
                // The pointer's high byte is fetched without carrying into the page
                let ptr = ins.word();
                let low = bus.load(ptr);
                let high = bus.load((ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF));
                Operand::at(word_from_bytes(low, high))
            }
            AddrMode::IndexedIndirect => {
                let ptr = ins.byte().wrapping_add(self.x);
                Operand::at(Self::zero_page_word(ptr, bus))
            }
            AddrMode::IndirectIndexed => {
                let base = Self::zero_page_word(ins.byte(), bus);
                Self::indexed(base, self.y)
            }
        }
    }

    fn indexed(base: u16, index: u8) -> Operand {
        let addr = base.wrapping_add(index as u16);
        Operand::Memory {
            addr,
            crossed: (base & 0xFF00) != (addr & 0xFF00),
        }
    }

    fn zero_page_word(ptr: u8, bus: &mut dyn CpuBus) -> u16 {
        let low = bus.load(ptr as u16);
        let high = bus.load(ptr.wrapping_add(1) as u16);
        word_from_bytes(low, high)
    }

    fn read_vector(&self, vector: u16, bus: &mut dyn CpuBus) -> u16 {
        let low = bus.load(vector);
        let high = bus.load(vector.wrapping_add(1));
        word_from_bytes(low, high)
    }

    fn read(&self, operand: Operand, bus: &mut dyn CpuBus) -> u8 {
        match operand {
            Operand::Accumulator => self.a,
            Operand::Immediate(value) => value,
            Operand::Memory { addr, .. } => bus.load(addr),
            Operand::Implied => 0,
        }
    }

    fn write(&mut self, operand: Operand, value: u8, bus: &mut dyn CpuBus) {
        match operand {
            Operand::Accumulator => self.a = value,
            Operand::Memory { addr, .. } => bus.store(addr, value),
            Operand::Implied | Operand::Immediate(_) => {}
        }
    }

    // Branch instructions
    // The page penalty compares the target with the page of the branch opcode itself
    fn branch(&mut self, origin: u16, condition: bool, operand: Operand) -> u64 {
        let Operand::Immediate(offset) = operand else {
            return 0;
        };
        if !condition {
            return 0;
        }
        self.pc = self.pc.wrapping_add(offset as i8 as u16);
        if (origin & 0xFF00) != (self.pc & 0xFF00) {
            2
        } else {
            1
        }
    }

    // ALU operations
    fn ora(&mut self, value: u8) {
        self.a |= value;
        self.update_zero_negative(self.a);
    }

    fn and(&mut self, value: u8) {
        self.a &= value;
        self.update_zero_negative(self.a);
    }

    fn eor(&mut self, value: u8) {
        self.a ^= value;
        self.update_zero_negative(self.a);
    }

    fn adc(&mut self, value: u8) {
        let carry = self.flags.carry as u16;
        let sum = self.a as u16 + value as u16 + carry;
        let result = sum as u8;

        self.flags.carry = sum > 0xFF;
        // Operands agree in sign, result does not
        self.flags.overflow = ((self.a ^ result) & (value ^ result) & 0x80) != 0;
        self.a = result;
        self.update_zero_negative(self.a);
    }

    fn sbc(&mut self, value: u8) {
        // A - M - (1 - C) == A + !M + C; carry out means no borrow
        self.adc(!value);
    }

    fn compare(&mut self, register: u8, value: u8) {
        self.flags.carry = register >= value;
        self.update_zero_negative(register.wrapping_sub(value));
    }

    fn bit(&mut self, value: u8) {
        self.flags.zero = (self.a & value) == 0;
        self.flags.negative = (value & FLAG_N) != 0;
        self.flags.overflow = (value & FLAG_V) != 0;
    }

    fn asl(&mut self, value: u8) -> u8 {
        self.flags.carry = (value & 0x80) != 0;
        let result = value << 1;
        self.update_zero_negative(result);
        result
    }

    fn lsr(&mut self, value: u8) -> u8 {
        self.flags.carry = (value & 0x01) != 0;
        let result = value >> 1;
        self.flags.zero = result == 0;
        self.flags.negative = false;
        result
    }

    fn rol(&mut self, value: u8) -> u8 {
        let carry = self.flags.carry as u8;
        self.flags.carry = (value & 0x80) != 0;
        let result = (value << 1) | carry;
        self.update_zero_negative(result);
        result
    }

    fn ror(&mut self, value: u8) -> u8 {
        let carry = if self.flags.carry { 0x80 } else { 0 };
        self.flags.carry = (value & 0x01) != 0;
        let result = (value >> 1) | carry;
        self.update_zero_negative(result);
        result
    }

    fn update_zero_negative(&mut self, value: u8) {
        self.flags.zero = value == 0;
        self.flags.negative = (value & FLAG_N) != 0;
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBus;

    const ORIGIN: u16 = 0x0600;

    fn setup(program: &[u8]) -> (Cpu, MemoryBus) {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut bus = MemoryBus::new();
        bus.write_bytes(ORIGIN, program).unwrap();
        let mut cpu = Cpu::new();
        cpu.pc = ORIGIN;
        (cpu, bus)
    }

    #[test]
    fn flags_byte_round_trip() {
        for value in [0x00u8, 0x24, 0xE6, 0x29, 0xFF] {
            let flags = Flags::from_byte(value);
            assert_eq!(flags.to_byte(), value | FLAG_U);
        }
    }

    #[test]
    fn adc_signed_overflow() {
        let (mut cpu, mut bus) = setup(&[0x69, 0x01]);
        cpu.a = 0x7F;
        cpu.flags.carry = false;
        assert_eq!(cpu.step(&mut bus).unwrap(), 2);
        assert_eq!(cpu.a, 0x80);
        assert!(cpu.flags.overflow);
        assert!(cpu.flags.negative);
        assert!(!cpu.flags.carry);
        assert!(!cpu.flags.zero);
    }

    #[test]
    fn adc_unsigned_carry() {
        let (mut cpu, mut bus) = setup(&[0x69, 0x01]);
        cpu.a = 0xFF;
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.a, 0x00);
        assert!(cpu.flags.zero);
        assert!(cpu.flags.carry);
        assert!(!cpu.flags.overflow);
        assert!(!cpu.flags.negative);
    }

    #[test]
    fn sbc_borrow_and_overflow() {
        // 0x50 - 0xB0 = 0xA0, signed 80 - (-80) overflows
        let (mut cpu, mut bus) = setup(&[0xE9, 0xB0]);
        cpu.a = 0x50;
        cpu.flags.carry = true;
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.a, 0xA0);
        assert!(cpu.flags.overflow);
        assert!(!cpu.flags.carry);

        // 0x05 - 0x03 with carry set: no borrow
        let (mut cpu, mut bus) = setup(&[0xE9, 0x03]);
        cpu.a = 0x05;
        cpu.flags.carry = true;
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.a, 0x02);
        assert!(cpu.flags.carry);
        assert!(!cpu.flags.overflow);

        // Carry clear borrows one more
        let (mut cpu, mut bus) = setup(&[0xE9, 0x05]);
        cpu.a = 0x05;
        cpu.flags.carry = false;
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.a, 0xFF);
        assert!(!cpu.flags.carry);
        assert!(cpu.flags.negative);
    }

    #[test]
    fn decimal_flag_does_not_change_adc() {
        let (mut cpu, mut bus) = setup(&[0xF8, 0x69, 0x09]);
        cpu.a = 0x09;
        cpu.flags.carry = false;
        cpu.step(&mut bus).unwrap();
        cpu.step(&mut bus).unwrap();
        assert!(cpu.flags.decimal);
        assert_eq!(cpu.a, 0x12);
    }

    #[test]
    fn bit_copies_operand_bits() {
        let (mut cpu, mut bus) = setup(&[0x24, 0x10]);
        bus.store(0x0010, 0xFE);
        cpu.a = 0x01;
        cpu.step(&mut bus).unwrap();
        assert!(cpu.flags.zero);
        assert!(cpu.flags.negative);
        assert!(cpu.flags.overflow);
        assert_eq!(cpu.a, 0x01);
    }

    #[test]
    fn compare_sets_carry_zero_negative() {
        let (mut cpu, mut bus) = setup(&[0xC9, 0x10, 0xE0, 0x20, 0xC0, 0x05]);
        cpu.a = 0x10;
        cpu.x = 0x10;
        cpu.y = 0x06;
        cpu.step(&mut bus).unwrap();
        assert!(cpu.flags.carry && cpu.flags.zero && !cpu.flags.negative);
        cpu.step(&mut bus).unwrap();
        // 0x10 - 0x20 = 0xF0
        assert!(!cpu.flags.carry && !cpu.flags.zero && cpu.flags.negative);
        cpu.step(&mut bus).unwrap();
        assert!(cpu.flags.carry && !cpu.flags.zero && !cpu.flags.negative);
    }

    #[test]
    fn shifts_and_rotates_through_carry() {
        // ASL A, ROL A, LSR A, ROR A
        let (mut cpu, mut bus) = setup(&[0x0A, 0x2A, 0x4A, 0x6A]);
        cpu.a = 0x81;
        cpu.flags.carry = false;
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.a, 0x02);
        assert!(cpu.flags.carry);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.a, 0x05);
        assert!(!cpu.flags.carry);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.a, 0x02);
        assert!(cpu.flags.carry);
        assert!(!cpu.flags.negative);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.a, 0x81);
        assert!(!cpu.flags.carry);
        assert!(cpu.flags.negative);
    }

    #[test]
    fn memory_shift_writes_back() {
        let (mut cpu, mut bus) = setup(&[0x06, 0x20, 0x46, 0x21]);
        bus.store(0x0020, 0x40);
        bus.store(0x0021, 0x01);
        cpu.step(&mut bus).unwrap();
        cpu.step(&mut bus).unwrap();
        assert_eq!(bus.load(0x0020), 0x80);
        assert_eq!(bus.load(0x0021), 0x00);
        assert!(cpu.flags.zero);
        assert!(cpu.flags.carry);
    }

    #[test]
    fn branch_forward_max_offset() {
        let (mut cpu, mut bus) = setup(&[0xF0, 0x7F]);
        cpu.flags.zero = true;
        let cycles = cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.pc, ORIGIN + 2 + 0x7F);
        assert_eq!(cycles, 3);
    }

    #[test]
    fn branch_backward() {
        let (mut cpu, mut bus) = setup(&[0xF0, 0xF6]);
        cpu.flags.zero = true;
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.pc, ORIGIN + 2 - 10);
    }

    #[test]
    fn branch_not_taken_costs_base() {
        let (mut cpu, mut bus) = setup(&[0xF0, 0x7F]);
        cpu.flags.zero = false;
        assert_eq!(cpu.step(&mut bus).unwrap(), 2);
        assert_eq!(cpu.pc, ORIGIN + 2);
    }

    #[test]
    fn branch_across_page_costs_two_more() {
        let (mut cpu, mut bus) = setup(&[0xD0, 0x80]);
        cpu.flags.zero = false;
        assert_eq!(cpu.step(&mut bus).unwrap(), 4);
        assert_eq!(cpu.pc, 0x0582);
    }

    #[test]
    fn branch_page_is_measured_from_the_opcode() {
        // BCC -2 at $06FE: the next instruction is on $07xx but the target
        // shares the opcode's page
        let (mut cpu, mut bus) = setup(&[]);
        bus.write_bytes(0x06FE, &[0x90, 0xFE]).unwrap();
        cpu.pc = 0x06FE;
        cpu.flags.carry = false;
        assert_eq!(cpu.step(&mut bus).unwrap(), 3);
        assert_eq!(cpu.pc, 0x06FE);

        // BCC +1 at $06FE: target $0701 leaves the opcode's page
        let (mut cpu, mut bus) = setup(&[]);
        bus.write_bytes(0x06FE, &[0x90, 0x01]).unwrap();
        cpu.pc = 0x06FE;
        cpu.flags.carry = false;
        assert_eq!(cpu.step(&mut bus).unwrap(), 4);
        assert_eq!(cpu.pc, 0x0701);
    }

    #[test]
    fn taken_zero_offset_costs_one_more() {
        let (mut cpu, mut bus) = setup(&[0x90, 0x00]);
        cpu.flags.carry = false;
        assert_eq!(cpu.step(&mut bus).unwrap(), 3);
        assert_eq!(cpu.pc, ORIGIN + 2);
    }

    #[test]
    fn jsr_rts_round_trip() {
        // 0600: JSR $0609 ; 0603: LDX #$01 ; 0605: BRK
        // 0609: LDA #$42 ; 060B: RTS
        let (mut cpu, mut bus) = setup(&[
            0x20, 0x09, 0x06, 0xA2, 0x01, 0x00, 0x00, 0x00, 0x00, 0xA9, 0x42, 0x60,
        ]);
        cpu.stack.pointer = 0xFF;
        assert_eq!(cpu.step(&mut bus).unwrap(), 6);
        assert_eq!(cpu.pc, 0x0609);
        assert_eq!(bus.load(0x01FF), 0x06);
        assert_eq!(bus.load(0x01FE), 0x02);
        assert_eq!(cpu.sp(), 0xFD);

        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.step(&mut bus).unwrap(), 6);
        assert_eq!(cpu.pc, 0x0603);
        assert_eq!(cpu.sp(), 0xFF);
        assert_eq!(cpu.a, 0x42);
    }

    #[test]
    fn jmp_indirect_wraps_within_page() {
        let (mut cpu, mut bus) = setup(&[0x6C, 0xFF, 0x02]);
        bus.store(0x02FF, 0x34);
        bus.store(0x0200, 0x12);
        bus.store(0x0300, 0x99);
        assert_eq!(cpu.step(&mut bus).unwrap(), 5);
        assert_eq!(cpu.pc, 0x1234);
    }

    #[test]
    fn php_sets_break_bit_plp_restores() {
        let (mut cpu, mut bus) = setup(&[0x08, 0x68, 0xA9, 0x29, 0x48, 0x28]);
        cpu.stack.pointer = 0xFF;
        cpu.flags = Flags {
            carry: false,
            zero: true,
            interrupt_disable: true,
            decimal: false,
            break_command: false,
            overflow: true,
            negative: true,
        };
        cpu.step(&mut bus).unwrap();
        assert_eq!(bus.load(0x01FF), 0xF6);
        cpu.step(&mut bus).unwrap(); // PLA
        assert_eq!(cpu.a, 0xF6);
        cpu.step(&mut bus).unwrap(); // LDA #$29
        cpu.step(&mut bus).unwrap(); // PHA
        cpu.step(&mut bus).unwrap(); // PLP
        assert!(cpu.flags.carry);
        assert!(!cpu.flags.zero);
        assert!(!cpu.flags.interrupt_disable);
        assert!(cpu.flags.decimal);
        assert!(!cpu.flags.overflow);
        assert!(!cpu.flags.negative);
    }

    #[test]
    fn transfers() {
        let (mut cpu, mut bus) = setup(&[0xAA, 0xA8, 0x9A, 0xBA, 0x8A, 0x98]);
        cpu.a = 0x80;
        cpu.step(&mut bus).unwrap(); // TAX
        assert_eq!(cpu.x, 0x80);
        assert!(cpu.flags.negative);
        cpu.step(&mut bus).unwrap(); // TAY
        assert_eq!(cpu.y, 0x80);
        cpu.x = 0x00;
        cpu.flags.zero = false;
        cpu.step(&mut bus).unwrap(); // TXS leaves flags alone
        assert_eq!(cpu.sp(), 0x00);
        assert!(!cpu.flags.zero);
        cpu.step(&mut bus).unwrap(); // TSX
        assert_eq!(cpu.x, 0x00);
        assert!(cpu.flags.zero);
        cpu.step(&mut bus).unwrap(); // TXA
        assert_eq!(cpu.a, 0x00);
        cpu.step(&mut bus).unwrap(); // TYA
        assert_eq!(cpu.a, 0x80);
        assert!(cpu.flags.negative);
    }

    #[test]
    fn indexed_indirect_wraps_in_zero_page() {
        // LDA ($FE,X) with X=1 reads pointer from $FF/$00
        let (mut cpu, mut bus) = setup(&[0xA1, 0xFE]);
        cpu.x = 0x01;
        bus.store(0x00FF, 0x00);
        bus.store(0x0000, 0x03);
        bus.store(0x0300, 0x5A);
        assert_eq!(cpu.step(&mut bus).unwrap(), 6);
        assert_eq!(cpu.a, 0x5A);
    }

    #[test]
    fn indirect_indexed_page_cross_penalty() {
        let (mut cpu, mut bus) = setup(&[0xB1, 0x10, 0xB1, 0x10]);
        bus.store(0x0010, 0xF0);
        bus.store(0x0011, 0x02);
        bus.store(0x0300, 0x77);
        bus.store(0x02F5, 0x66);
        cpu.y = 0x10;
        assert_eq!(cpu.step(&mut bus).unwrap(), 6);
        assert_eq!(cpu.a, 0x77);
        cpu.y = 0x05;
        assert_eq!(cpu.step(&mut bus).unwrap(), 5);
        assert_eq!(cpu.a, 0x66);
    }

    #[test]
    fn store_never_pays_page_penalty() {
        let (mut cpu, mut bus) = setup(&[0x9D, 0xFF, 0x02]);
        cpu.x = 0x01;
        cpu.a = 0x33;
        assert_eq!(cpu.step(&mut bus).unwrap(), 5);
        assert_eq!(bus.load(0x0300), 0x33);
    }

    #[test]
    fn zero_page_x_wraps() {
        let (mut cpu, mut bus) = setup(&[0xB5, 0xF0]);
        cpu.x = 0x20;
        bus.store(0x0010, 0xAB);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.a, 0xAB);
    }

    #[test]
    fn invalid_opcode_leaves_state_untouched() {
        let (mut cpu, mut bus) = setup(&[0xFF]);
        cpu.a = 0x12;
        let before = cpu.clone();
        let err = cpu.step(&mut bus).unwrap_err();
        assert_eq!(err, EmuError::InvalidOpcode { opcode: 0xFF, pc: ORIGIN });
        assert_eq!(cpu.pc, before.pc);
        assert_eq!(cpu.a, before.a);
        assert_eq!(cpu.flags, before.flags);
        assert_eq!(cpu.stack, before.stack);
        assert_eq!(cpu.cycles, before.cycles);
    }

    #[test]
    fn brk_and_rti() {
        let (mut cpu, mut bus) = setup(&[0x00, 0xEA, 0xE8]);
        bus.write_bytes(0xFFFE, &[0x00, 0x07]).unwrap();
        bus.write_bytes(0x0700, &[0x40]).unwrap();
        cpu.stack.pointer = 0xFF;
        cpu.flags.interrupt_disable = false;

        assert_eq!(cpu.step(&mut bus).unwrap(), 7);
        assert_eq!(cpu.pc, 0x0700);
        assert!(cpu.flags.break_command);
        assert!(cpu.flags.interrupt_disable);
        assert_eq!(bus.load(0x01FF), 0x06);
        assert_eq!(bus.load(0x01FE), 0x02);
        assert_eq!(bus.load(0x01FD) & FLAG_B, FLAG_B);

        assert_eq!(cpu.step(&mut bus).unwrap(), 6);
        assert_eq!(cpu.pc, 0x0602);
        assert_eq!(cpu.sp(), 0xFF);
        assert!(!cpu.flags.interrupt_disable);
    }

    #[test]
    fn nmi_pushes_state_and_vectors() {
        let (mut cpu, mut bus) = setup(&[0xEA]);
        bus.write_bytes(0xFFFA, &[0x00, 0x90]).unwrap();
        cpu.stack.pointer = 0xFF;
        cpu.flags.interrupt_disable = true;
        cpu.flags.carry = true;
        cpu.trigger_interrupt(Interrupt::Nmi);

        assert_eq!(cpu.step(&mut bus).unwrap(), 7);
        assert_eq!(cpu.pc, 0x9000);
        assert_eq!(bus.load(0x01FF), 0x06);
        assert_eq!(bus.load(0x01FE), 0x00);
        let pushed = bus.load(0x01FD);
        assert_eq!(pushed & FLAG_B, 0);
        assert_eq!(pushed & (FLAG_U | FLAG_C), FLAG_U | FLAG_C);
        assert_eq!(cpu.sp(), 0xFC);
    }

    #[test]
    fn masked_irq_waits_for_cli() {
        let (mut cpu, mut bus) = setup(&[0xEA, 0x58, 0xEA]);
        bus.write_bytes(0xFFFE, &[0x00, 0x80]).unwrap();
        cpu.flags.interrupt_disable = true;
        cpu.trigger_interrupt(Interrupt::Irq);

        cpu.step(&mut bus).unwrap(); // NOP
        assert_eq!(cpu.pc, ORIGIN + 1);
        cpu.step(&mut bus).unwrap(); // CLI
        assert_eq!(cpu.step(&mut bus).unwrap(), 7);
        assert_eq!(cpu.pc, 0x8000);
    }

    #[test]
    fn reset_pushes_nothing() {
        let (mut cpu, mut bus) = setup(&[0xEA]);
        bus.write_bytes(0xFFFC, &[0x34, 0x82]).unwrap();
        let sp = cpu.sp();
        cpu.trigger_interrupt(Interrupt::Reset);
        cpu.trigger_interrupt(Interrupt::Nmi);
        assert_eq!(cpu.step(&mut bus).unwrap(), 7);
        assert_eq!(cpu.pc, 0x8234);
        assert_eq!(cpu.sp(), sp);
        // NMI is still pending for the next boundary
        assert_eq!(cpu.step(&mut bus).unwrap(), 7);
        assert_eq!(cpu.sp(), sp.wrapping_sub(3));
    }

    #[test]
    fn tick_spreads_instruction_over_cycles() {
        let (mut cpu, mut bus) = setup(&[0xA9, 0x01, 0xE8]);
        assert_eq!(cpu.tick(&mut bus).unwrap(), 2);
        assert_eq!(cpu.a, 0x01);
        assert_eq!(cpu.tick(&mut bus).unwrap(), 0);
        assert_eq!(cpu.x, 0x00);
        assert_eq!(cpu.tick(&mut bus).unwrap(), 2);
        assert_eq!(cpu.x, 0x01);
    }

    #[test]
    fn run_until_break_counts_cycles() {
        // SEC, SED, SEI, BRK
        let (mut cpu, mut bus) = setup(&[0x38, 0xF8, 0x78, 0x00]);
        let cycles = cpu.run_until_break(&mut bus).unwrap();
        assert_eq!(cycles, 2 + 2 + 2 + 7);
        assert!(cpu.flags.carry && cpu.flags.decimal && cpu.flags.interrupt_disable);
        assert!(!cpu.flags.overflow);
        assert_eq!(cpu.cycles, cycles);
    }

    #[test]
    fn run_for_cycles_stops_past_budget() {
        let (mut cpu, mut bus) = setup(&[0xEA; 16]);
        assert_eq!(cpu.run_for_cycles(&mut bus, 7).unwrap(), 8);
        assert_eq!(cpu.pc, ORIGIN + 4);
    }
}
