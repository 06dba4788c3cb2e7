use crate::cpu::CpuBus;
use crate::error::{EmuError, Result};
use crate::ppu::PpuRegisters;

pub const MEMORY_SIZE: usize = 0x10000;
pub const RAM_MIRROR_SIZE: u16 = 0x0800;
pub const RAM_END: u16 = 0x1FFF;
pub const OAMDMA: u16 = 0x4014;
pub const PRG_BANK_SIZE: usize = 0x4000;
pub const PRG_BANK0_START: u16 = 0x8000;
pub const PRG_BANK1_START: u16 = 0xC000;

/// Little-endian word from two bytes. Every 16-bit address in the core is
/// assembled here.
#[inline]
pub const fn word_from_bytes(low: u8, high: u8) -> u16 {
    ((high as u16) << 8) | low as u16
}

/// CPU address space: flat 64KB with the RAM mirrors, the picture-unit
/// register window and the OAM DMA port layered on top.
pub struct MemoryBus {
    bytes: Box<[u8; MEMORY_SIZE]>,
    pub ppu: PpuRegisters,
    dma_stall: bool,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::with_fill(0x00)
    }

    /// Bus with every byte preset to `fill`.
    pub fn with_fill(fill: u8) -> Self {
        Self {
            bytes: Box::new([fill; MEMORY_SIZE]),
            ppu: PpuRegisters::new(),
            dma_stall: false,
        }
    }

    /// Map cartridge program banks: bank 0 at $8000, bank 1 at $C000, or
    /// bank 0 again when the cartridge only carries one.
    pub fn load_prg_banks(&mut self, banks: &[&[u8]]) -> Result<()> {
        let Some(first) = banks.first() else {
            log::warn!("No PRG banks supplied, $8000-$FFFF left untouched");
            return Ok(());
        };
        let second = banks.get(1).unwrap_or(first);
        self.write_bytes(PRG_BANK0_START, &first[..first.len().min(PRG_BANK_SIZE)])?;
        self.write_bytes(PRG_BANK1_START, &second[..second.len().min(PRG_BANK_SIZE)])?;
        log::info!(
            "PRG banks mapped: {} supplied, $C000 from bank {}",
            banks.len(),
            if banks.len() > 1 { 1 } else { 0 }
        );
        Ok(())
    }

    /// Raw copy into the backing array. Ignores mirroring and register
    /// dispatch, like a cartridge being plugged in.
    pub fn write_bytes(&mut self, address: u16, data: &[u8]) -> Result<()> {
        let start = address as usize;
        let end = start + data.len();
        if end > MEMORY_SIZE {
            return Err(EmuError::AddressOutOfRange(end as u32));
        }
        self.bytes[start..end].copy_from_slice(data);
        Ok(())
    }

    /// Raw copy of `[start, end)` out of the backing array.
    pub fn read_bytes(&self, start: u32, end: u32) -> Result<Vec<u8>> {
        if start as usize >= MEMORY_SIZE {
            return Err(EmuError::AddressOutOfRange(start));
        }
        if end as usize > MEMORY_SIZE {
            return Err(EmuError::AddressOutOfRange(end));
        }
        if start >= end {
            return Ok(Vec::new());
        }
        Ok(self.bytes[start as usize..end as usize].to_vec())
    }

    /// Whether an OAM DMA ran since the last call. The driver charges the
    /// stall cycles; the instruction itself keeps its table cost.
    pub fn take_dma_stall(&mut self) -> bool {
        std::mem::take(&mut self.dma_stall)
    }

    fn ram_mirrors(address: u16) -> [usize; 4] {
        let base = address % RAM_MIRROR_SIZE;
        [0u16, 1, 2, 3].map(|i| (base + i * RAM_MIRROR_SIZE) as usize)
    }

    fn oam_dma(&mut self, page: u8) {
        let start = (page as u16) << 8;
        let mut buffer = [0u8; 0x100];
        for (i, slot) in buffer.iter_mut().enumerate() {
            *slot = self.load(start.wrapping_add(i as u16));
        }
        self.ppu.write_oam_dma(&buffer);
        self.dma_stall = true;
        log::debug!("OAM DMA from page ${:02X}00", page);
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBus for MemoryBus {
    fn load(&mut self, address: u16) -> u8 {
        if PpuRegisters::in_register_window(address) {
            self.ppu.read_register(address)
        } else {
            self.bytes[address as usize]
        }
    }

    fn store(&mut self, address: u16, value: u8) {
        match address {
            0x0000..=RAM_END => {
                for index in Self::ram_mirrors(address) {
                    self.bytes[index] = value;
                }
            }
            _ if PpuRegisters::in_register_window(address) => {
                self.ppu.write_register(address, value);
            }
            OAMDMA => self.oam_dma(value),
            _ => self.bytes[address as usize] = value,
        }
    }
}
