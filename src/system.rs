use log::{debug, info};

use crate::config::CoreConfig;
use crate::cpu::Cpu;
use crate::error::Result;
use crate::interrupt::Interrupt;
use crate::memory::MemoryBus;

// NTSC: 262 scanlines × 341 dots, CPU runs at 1/3 of the dot clock
pub const DOTS_PER_SCANLINE: u16 = 341;
pub const SCANLINES_PER_FRAME: u16 = 262;
pub const VBLANK_SCANLINE: u16 = 241;
pub const PRE_RENDER_SCANLINE: u16 = 261;
pub const DOTS_PER_CPU_CYCLE: u8 = 3;

/// Cycles the CPU is halted while OAM DMA copies a page (one more when the
/// transfer starts on an odd cycle).
pub const OAM_DMA_CYCLES: u64 = 513;

/// A CPU wired to its bus, plus the frame clock that drives vblank.
pub struct Nes {
    cpu: Cpu,
    bus: MemoryBus,
    config: CoreConfig,
    stall_cycles: u64,
    dot_phase: u8,
    frame_count: u64,
}

impl Nes {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            cpu: Cpu::with_config(&config),
            bus: MemoryBus::with_fill(config.ram_fill),
            config,
            stall_cycles: 0,
            dot_phase: 0,
            frame_count: 0,
        }
    }

    pub fn load_prg_banks(&mut self, banks: &[&[u8]]) -> Result<()> {
        self.bus.load_prg_banks(banks)
    }

    pub fn load_chr_bank(&mut self, chr: &[u8]) {
        self.bus.ppu.memory.load_chr(chr);
        info!("CHR bank installed: {} bytes", chr.len());
    }

    /// Run the reset sequence: PC from $FFFC, InterruptDisable set.
    pub fn power_on(&mut self) -> u64 {
        let cycles = self.cpu.reset(&mut self.bus);
        info!("Power on, PC = 0x{:04X}", self.cpu.pc);
        cycles
    }

    pub fn trigger_interrupt(&mut self, interrupt: Interrupt) {
        self.cpu.trigger_interrupt(interrupt);
    }

    /// One instruction (or interrupt entry), including any OAM DMA stall it
    /// caused.
    pub fn step(&mut self) -> Result<u64> {
        let cycles = self.cpu.step(&mut self.bus)?;
        Ok(cycles + self.charge_dma_stall())
    }

    /// One CPU cycle. A DMA stall occupies ticks just like an instruction.
    pub fn tick(&mut self) -> Result<u64> {
        if self.stall_cycles > 0 {
            self.stall_cycles -= 1;
            return Ok(0);
        }
        let cycles = self.cpu.tick(&mut self.bus)?;
        if cycles > 0 {
            // The tick that started the instruction already counts as one of its cycles
            self.stall_cycles = self.charge_dma_stall();
        }
        Ok(cycles)
    }

    pub fn run_until_break(&mut self) -> Result<u64> {
        let mut total = 0;
        loop {
            let step = self.cpu.step_instruction(&mut self.bus)?;
            total += step.cycles + self.charge_dma_stall();
            if step.is_break() {
                return Ok(total);
            }
        }
    }

    /// Run one full frame of dots and return the CPU cycles that elapsed.
    /// Vblank starts on dot 1 of scanline 241 and ends on dot 1 of the
    /// pre-render line.
    pub fn run_frame(&mut self) -> Result<u64> {
        let mut cpu_cycles = 0;
        for scanline in 0..SCANLINES_PER_FRAME {
            for dot in 0..DOTS_PER_SCANLINE {
                if dot == 1 {
                    self.scanline_event(scanline);
                }
                self.dot_phase += 1;
                if self.dot_phase == DOTS_PER_CPU_CYCLE {
                    self.dot_phase = 0;
                    self.tick()?;
                    cpu_cycles += 1;
                }
            }
        }
        self.frame_count += 1;
        Ok(cpu_cycles)
    }

    fn scanline_event(&mut self, scanline: u16) {
        match scanline {
            VBLANK_SCANLINE => {
                self.bus.ppu.set_vblank(true);
                if !self.config.nmi_on_vblank || self.bus.ppu.nmi_enabled() {
                    debug!("Vblank NMI, frame {}", self.frame_count);
                    self.cpu.trigger_interrupt(Interrupt::Nmi);
                }
            }
            PRE_RENDER_SCANLINE => {
                self.bus.ppu.set_vblank(false);
                self.bus.ppu.set_sprite_zero_hit(false);
                self.bus.ppu.set_sprite_overflow(false);
            }
            _ => {}
        }
    }

    fn charge_dma_stall(&mut self) -> u64 {
        if !self.bus.take_dma_stall() || !self.config.oam_dma_stall {
            return 0;
        }
        let stall = OAM_DMA_CYCLES + self.cpu.cycles % 2;
        self.cpu.cycles += stall;
        debug!("OAM DMA stall: {} cycles", stall);
        stall
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn bus(&self) -> &MemoryBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut MemoryBus {
        &mut self.bus
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl Default for Nes {
    fn default() -> Self {
        Self::new(CoreConfig::default())
    }
}
