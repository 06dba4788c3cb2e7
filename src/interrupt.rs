//! Interrupt kinds, their vectors, and the pending set the CPU polls
//! between instructions.

pub const NMI_VECTOR: u16 = 0xFFFA;
pub const RESET_VECTOR: u16 = 0xFFFC;
pub const IRQ_VECTOR: u16 = 0xFFFE;

/// Cycles spent entering any interrupt handler.
pub const INTERRUPT_CYCLES: u64 = 7;

/// Declaration order is service priority: Reset wins over NMI, NMI over IRQ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Interrupt {
    Reset,
    Nmi,
    Irq,
}

impl Interrupt {
    pub const ALL: [Interrupt; 3] = [Interrupt::Reset, Interrupt::Nmi, Interrupt::Irq];

    /// Address of the little-endian handler pointer.
    pub const fn vector(self) -> u16 {
        match self {
            Interrupt::Reset => RESET_VECTOR,
            Interrupt::Nmi => NMI_VECTOR,
            Interrupt::Irq => IRQ_VECTOR,
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Interrupt::Reset => 0x01,
            Interrupt::Nmi => 0x02,
            Interrupt::Irq => 0x04,
        }
    }

    /// Whether InterruptDisable can hold this interrupt back.
    pub const fn maskable(self) -> bool {
        matches!(self, Interrupt::Irq)
    }
}

/// What the controller would hand the CPU at the next boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptState {
    Idle,
    PendingReset,
    PendingNmi,
    PendingIrq,
}

/// Pending interrupt lines. Requests may arrive at any time; they are only
/// consumed by the CPU at an instruction boundary, one per boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterruptController {
    pending: u8,
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&mut self, interrupt: Interrupt) {
        self.pending |= interrupt.bit();
    }

    pub fn clear(&mut self, interrupt: Interrupt) {
        self.pending &= !interrupt.bit();
    }

    pub fn is_pending(&self, interrupt: Interrupt) -> bool {
        self.pending & interrupt.bit() != 0
    }

    pub fn state(&self) -> InterruptState {
        match Interrupt::ALL.into_iter().find(|i| self.is_pending(*i)) {
            None => InterruptState::Idle,
            Some(Interrupt::Reset) => InterruptState::PendingReset,
            Some(Interrupt::Nmi) => InterruptState::PendingNmi,
            Some(Interrupt::Irq) => InterruptState::PendingIrq,
        }
    }

    /// Take the highest-priority interrupt that may be serviced now. A masked
    /// IRQ stays pending until the mask is lifted.
    pub fn take(&mut self, masked: bool) -> Option<Interrupt> {
        let next = Interrupt::ALL
            .into_iter()
            .find(|i| self.is_pending(*i) && !(masked && i.maskable()))?;
        self.clear(next);
        Some(next)
    }
}
