//! Core configuration
//!
//! Power-on state and the few behaviours a host may want to switch off.
//! Loadable from TOML when the `config` feature is enabled.

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "config")]
use std::fs;
#[cfg(feature = "config")]
use std::path::Path;
#[cfg(feature = "config")]
use thiserror::Error;

/// Main configuration structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
pub struct CoreConfig {
    /// Stack pointer at power-on
    #[cfg_attr(feature = "config", serde(default = "default_stack_pointer"))]
    pub initial_stack_pointer: u8,

    /// Byte the 64KB address space is filled with
    #[cfg_attr(feature = "config", serde(default))]
    pub ram_fill: u8,

    /// Hold IRQs back while InterruptDisable is set
    #[cfg_attr(feature = "config", serde(default = "default_true"))]
    pub honor_irq_mask: bool,

    /// Charge 513/514 CPU cycles for an OAM DMA
    #[cfg_attr(feature = "config", serde(default = "default_true"))]
    pub oam_dma_stall: bool,

    /// Raise NMI at vblank only when PPUCTRL asks for it (false: every frame)
    #[cfg_attr(feature = "config", serde(default = "default_true"))]
    pub nmi_on_vblank: bool,
}

#[cfg(feature = "config")]
fn default_stack_pointer() -> u8 {
    0xFD
}

#[cfg(feature = "config")]
fn default_true() -> bool {
    true
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            initial_stack_pointer: 0xFD,
            ram_fill: 0x00,
            honor_irq_mask: true,
            oam_dma_stall: true,
            nmi_on_vblank: true,
        }
    }
}

#[cfg(feature = "config")]
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(feature = "config")]
impl CoreConfig {
    /// Parse configuration from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        log::info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }
}
