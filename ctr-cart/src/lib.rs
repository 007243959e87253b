//! Cartridge I/O subsystem for a dual-ARM handheld SoC: the NTRCARD legacy
//! protocol used during early boot, the CTRCARD protocol for ROM reads and
//! CARD2 save writes, and the SPICARD master driving CARD1 save FLASH.
//!
//! The cartridge is a passive register-level device: the emulated CPUs poke
//! it through MMIO entry points, it posts word-ready callbacks to the shared
//! scheduler, and it paces the NDMA engine with DRQ lines. All collaborators
//! are reached through the [`CartridgeBus`] trait passed into each call.

mod bus;
mod cartridge;

pub use bus::{
    CartEvent, CartridgeBus, CpuCore, ARM11_IRQ_NTRCARD, ARM9_IRQ_CTRCARD, ARM9_IRQ_NTRCARD,
    DRQ_CTRCARD, DRQ_NTRCARD,
};
pub use cartridge::{Cartridge, CartridgeConfig, CartridgeState};
