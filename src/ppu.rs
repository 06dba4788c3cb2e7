//! CPU-visible picture-unit registers ($2000-$2007) and the memory they reach.
//!
//! Only the register file is modelled here. Turning pattern-table bytes into
//! pixels belongs to the graphics collaborator, which reads `PpuMemory`
//! and the OAM through the accessors below.

pub const PPUCTRL: u16 = 0x2000;
pub const PPUMASK: u16 = 0x2001;
pub const PPUSTATUS: u16 = 0x2002;
pub const OAMADDR: u16 = 0x2003;
pub const OAMDATA: u16 = 0x2004;
pub const PPUSCROLL: u16 = 0x2005;
pub const PPUADDR: u16 = 0x2006;
pub const PPUDATA: u16 = 0x2007;

// PPUCTRL bits
pub const CTRL_NAMETABLE: u8 = 0x03;
pub const CTRL_INCREMENT_32: u8 = 0x04;
pub const CTRL_SPRITE_TABLE: u8 = 0x08;
pub const CTRL_BACKGROUND_TABLE: u8 = 0x10;
pub const CTRL_SPRITE_HEIGHT: u8 = 0x20;
pub const CTRL_MASTER_SLAVE: u8 = 0x40;
pub const CTRL_NMI_ENABLE: u8 = 0x80;

// PPUMASK bits
pub const MASK_GREYSCALE: u8 = 0x01;
pub const MASK_SHOW_BACKGROUND_LEFT: u8 = 0x02;
pub const MASK_SHOW_SPRITES_LEFT: u8 = 0x04;
pub const MASK_SHOW_BACKGROUND: u8 = 0x08;
pub const MASK_SHOW_SPRITES: u8 = 0x10;
pub const MASK_EMPHASIS: u8 = 0xE0;

// PPUSTATUS bits
pub const STATUS_SPRITE_OVERFLOW: u8 = 0x20;
pub const STATUS_SPRITE_ZERO_HIT: u8 = 0x40;
pub const STATUS_VBLANK: u8 = 0x80;

const PALETTE_START: u16 = 0x3F00;

/// The 16KB address space seen by the picture unit.
///
/// $0000-$1FFF pattern tables (CHR), $2000-$3EFF nametables,
/// $3F00-$3FFF palette RAM with the backdrop mirrors at $3F10/$14/$18/$1C.
#[derive(Debug, Clone)]
pub struct PpuMemory {
    bytes: Box<[u8; 0x4000]>,
}

impl PpuMemory {
    pub fn new() -> Self {
        Self {
            bytes: Box::new([0; 0x4000]),
        }
    }

    fn index(addr: u16) -> usize {
        let addr = addr & 0x3FFF;
        if addr >= PALETTE_START {
            let mut palette = addr & 0x1F;
            if palette & 0x13 == 0x10 {
                palette &= !0x10;
            }
            (PALETTE_START + palette) as usize
        } else {
            addr as usize
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        self.bytes[Self::index(addr)]
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        self.bytes[Self::index(addr)] = value;
    }

    /// Install an 8KB CHR bank into both pattern tables. Shorter banks fill
    /// from $0000 and leave the rest untouched.
    pub fn load_chr(&mut self, chr: &[u8]) {
        let len = chr.len().min(0x2000);
        self.bytes[..len].copy_from_slice(&chr[..len]);
    }

    /// One 4KB pattern table (0 = $0000, 1 = $1000).
    pub fn pattern_table(&self, table: usize) -> &[u8] {
        let start = (table & 1) * 0x1000;
        &self.bytes[start..start + 0x1000]
    }
}

impl Default for PpuMemory {
    fn default() -> Self {
        Self::new()
    }
}

/// Register file reachable only through the CPU memory bus.
#[derive(Debug, Clone)]
pub struct PpuRegisters {
    pub ctrl: u8,
    pub mask: u8,
    pub status: u8,
    pub oam_addr: u8,
    pub oam: [u8; 0x100],
    pub scroll_x: u8,
    pub scroll_y: u8,
    pub vram_addr: u16,
    pub vram_read_buffer: u8,
    write_toggle: bool,
    pub memory: PpuMemory,
    io_latch: u8,
}

impl PpuRegisters {
    pub fn new() -> Self {
        Self {
            ctrl: 0,
            mask: 0,
            status: 0,
            oam_addr: 0,
            oam: [0; 0x100],
            scroll_x: 0,
            scroll_y: 0,
            vram_addr: 0,
            vram_read_buffer: 0,
            write_toggle: false,
            memory: PpuMemory::new(),
            io_latch: 0,
        }
    }

    pub fn in_register_window(addr: u16) -> bool {
        (PPUCTRL..=PPUDATA).contains(&addr)
    }

    fn increment_vram_addr(&mut self) {
        let increment = if self.ctrl & CTRL_INCREMENT_32 != 0 {
            32
        } else {
            1
        };
        self.vram_addr = self.vram_addr.wrapping_add(increment) & 0x3FFF;
    }

    pub fn read_register(&mut self, addr: u16) -> u8 {
        let value = match addr {
            PPUCTRL => self.ctrl,
            PPUMASK => self.mask,
            PPUSTATUS => {
                // Low five bits are stale bus contents
                let value = (self.status & 0xE0) | (self.io_latch & 0x1F);
                self.status &= !STATUS_VBLANK;
                self.write_toggle = false;
                value
            }
            OAMDATA => self.oam[self.oam_addr as usize],
            PPUDATA => {
                let addr = self.vram_addr & 0x3FFF;
                let result = if addr >= PALETTE_START {
                    // Palette reads bypass the buffer, which picks up the nametable byte underneath
                    self.vram_read_buffer = self.memory.read(addr & 0x2FFF);
                    self.memory.read(addr)
                } else {
                    let buffered = self.vram_read_buffer;
                    self.vram_read_buffer = self.memory.read(addr);
                    buffered
                };
                self.increment_vram_addr();
                result
            }
            // OAMADDR, PPUSCROLL and PPUADDR are write-only
            _ => self.io_latch,
        };
        self.io_latch = value;
        value
    }

    pub fn write_register(&mut self, addr: u16, value: u8) {
        self.io_latch = value;
        match addr {
            PPUCTRL => {
                let nmi = if value & CTRL_NMI_ENABLE != 0 {
                    "enabled"
                } else {
                    "disabled"
                };
                let step = if value & CTRL_INCREMENT_32 != 0 {
                    32
                } else {
                    1
                };
                log::debug!(
                    "PPUCTRL write: 0x{:02X} | NMI: {} | Increment: {} | Nametable: {}",
                    value,
                    nmi,
                    step,
                    value & CTRL_NAMETABLE
                );
                self.ctrl = value;
            }
            PPUMASK => {
                if value & MASK_EMPHASIS == 0x60 || value & MASK_EMPHASIS > 0x80 {
                    log::warn!(
                        "PPUMASK write with unusual background colour bits: 0x{:02X}",
                        value
                    );
                }
                self.mask = value;
            }
            PPUSTATUS => {
                log::warn!("Ignoring write 0x{:02X} to read-only PPUSTATUS", value);
            }
            OAMADDR => self.oam_addr = value,
            OAMDATA => {
                self.oam[self.oam_addr as usize] = value;
                self.oam_addr = self.oam_addr.wrapping_add(1);
            }
            PPUSCROLL => {
                if !self.write_toggle {
                    self.scroll_x = value;
                } else {
                    self.scroll_y = value;
                }
                self.write_toggle = !self.write_toggle;
            }
            PPUADDR => {
                if !self.write_toggle {
                    // First write: high byte
                    self.vram_addr = (self.vram_addr & 0x00FF) | (((value & 0x3F) as u16) << 8);
                } else {
                    // Second write: low byte
                    self.vram_addr = (self.vram_addr & 0xFF00) | value as u16;
                }
                self.write_toggle = !self.write_toggle;
            }
            PPUDATA => {
                let addr = self.vram_addr & 0x3FFF;
                self.memory.write(addr, value);
                self.increment_vram_addr();
            }
            _ => {}
        }
    }

    /// Bulk copy from the OAM DMA port, starting at the current OAMADDR.
    pub fn write_oam_dma(&mut self, page: &[u8; 0x100]) {
        for &byte in page.iter() {
            self.oam[self.oam_addr as usize] = byte;
            self.oam_addr = self.oam_addr.wrapping_add(1);
        }
    }

    pub fn nmi_enabled(&self) -> bool {
        self.ctrl & CTRL_NMI_ENABLE != 0
    }

    pub fn sprite_height(&self) -> u8 {
        if self.ctrl & CTRL_SPRITE_HEIGHT != 0 {
            16
        } else {
            8
        }
    }

    pub fn background_table_addr(&self) -> u16 {
        if self.ctrl & CTRL_BACKGROUND_TABLE != 0 {
            0x1000
        } else {
            0x0000
        }
    }

    pub fn sprite_table_addr(&self) -> u16 {
        if self.ctrl & CTRL_SPRITE_TABLE != 0 {
            0x1000
        } else {
            0x0000
        }
    }

    pub fn base_nametable_addr(&self) -> u16 {
        0x2000 + 0x400 * (self.ctrl & CTRL_NAMETABLE) as u16
    }

    pub fn rendering_enabled(&self) -> bool {
        self.mask & (MASK_SHOW_BACKGROUND | MASK_SHOW_SPRITES) != 0
    }

    pub fn vblank(&self) -> bool {
        self.status & STATUS_VBLANK != 0
    }

    pub fn set_vblank(&mut self, on: bool) {
        if on {
            self.status |= STATUS_VBLANK;
        } else {
            self.status &= !STATUS_VBLANK;
        }
    }

    pub fn sprite_zero_hit(&self) -> bool {
        self.status & STATUS_SPRITE_ZERO_HIT != 0
    }

    pub fn set_sprite_zero_hit(&mut self, on: bool) {
        if on {
            self.status |= STATUS_SPRITE_ZERO_HIT;
        } else {
            self.status &= !STATUS_SPRITE_ZERO_HIT;
        }
    }

    pub fn set_sprite_overflow(&mut self, on: bool) {
        if on {
            self.status |= STATUS_SPRITE_OVERFLOW;
        } else {
            self.status &= !STATUS_SPRITE_OVERFLOW;
        }
    }
}

impl Default for PpuRegisters {
    fn default() -> Self {
        Self::new()
    }
}
