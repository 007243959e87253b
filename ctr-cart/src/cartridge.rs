mod ctrcard;
mod ntrcard;
mod rom;
mod save;
mod spicard;

use crate::bus::CartridgeBus;
use bincode::{Decode, Encode};
use ctr_common::num::GetBit;
use ctrcard::CtrCard;
use ntrcard::NtrCard;
use rom::CartRom;
use save::SaveStore;
use spicard::SpiCard;
use std::path::{Path, PathBuf};

// Primary chip ID size codes, covering nominal ROM sizes from 128MB to 4GB
const CHIP_ID_SIZE_CODES: [u32; 6] = [0x7F, 0xFF, 0xFE, 0xFA, 0xF8, 0xF0];

/// Host-side settings for cartridge handling.
#[derive(Debug, Clone, Default)]
pub struct CartridgeConfig {
    /// Perform the AES engine's cartridge auto-boot handshake on insertion.
    pub auto_boot: bool,
    /// Directory to keep save files in, instead of next to the cartridge.
    pub save_dir: Option<PathBuf>,
}

/// The cartridge slot and everything behind it: the ROM backing store, the
/// save store, and the NTRCARD/CTRCARD/SPICARD protocol engines.
#[derive(Debug)]
pub struct Cartridge {
    rom: Option<CartRom>,
    save: SaveStore,
    cart_id_1: u32,
    cart_id_2: u32,
    ctr_mode: bool,
    cfg9_card_power: u16,
    ntr: NtrCard,
    ctr: CtrCard,
    spi: SpiCard,
}

/// Register and engine state captured in save states. The ROM handle and save
/// data are deliberately excluded; they are reloaded from disk on restore.
#[derive(Debug, Clone, Encode, Decode)]
pub struct CartridgeState {
    ctr_mode: bool,
    cfg9_card_power: u16,
    ntr: NtrCard,
    ctr: CtrCard,
    spi: SpiCard,
}

impl Cartridge {
    /// Opens the cartridge at `cart_path` and loads (or synthesizes) its save
    /// data. An unreadable or absent path yields an empty slot that still
    /// services register accesses.
    pub fn create<B: CartridgeBus>(
        cart_path: Option<&Path>,
        config: &CartridgeConfig,
        bus: &mut B,
    ) -> Self {
        let mut cartridge = Self {
            rom: None,
            save: SaveStore::none(),
            cart_id_1: 0,
            cart_id_2: 0,
            ctr_mode: false,
            cfg9_card_power: 0x1, // Slot empty
            ntr: NtrCard::new(),
            ctr: CtrCard::new(),
            spi: SpiCard::new(),
        };

        let Some(cart_path) = cart_path else { return cartridge };
        match CartRom::open(cart_path) {
            Ok(rom) => cartridge.rom = Some(rom),
            Err(err) => {
                log::error!("Unable to open cartridge file '{}': {err}", cart_path.display());
                return cartridge;
            }
        }

        if config.auto_boot {
            bus.auto_boot_aes();
        }
        cartridge.cfg9_card_power &= !0x1; // Inserted

        // The primary chip ID encodes the nominal ROM size, 128MB to 4GB
        let cart_size = cartridge.rom.as_ref().map_or(0, CartRom::size);
        let mut idx = 0;
        while (0x8000000u64 << idx) < cart_size && idx < 5 {
            idx += 1;
        }
        cartridge.cart_id_1 = 0x900000C2 | (CHIP_ID_SIZE_CODES[idx] << 8);

        // The secondary chip ID comes from comparison bits on newer carts
        let comp = cartridge.read_cart(0x1FC) >> 16;
        cartridge.cart_id_2 = if comp.bit(0) { (comp >> 1) & 0x3 } else { 0 };

        let media_type = (cartridge.read_cart(0x18C) >> 8) as u8;
        if media_type == 2 {
            cartridge.cart_id_1 |= 1 << 27;
        }
        log::info!(
            "Cartridge is type {media_type}, and its IDs are {:X} and {:X}",
            cartridge.cart_id_1,
            cartridge.cart_id_2
        );

        let save_path = save_path_for(cart_path, config.save_dir.as_deref());
        cartridge.save = match media_type {
            1 => SaveStore::card1(save_path),
            2 => {
                let base = cartridge.read_cart(0x200) << 9;
                SaveStore::card2(save_path, base)
            }
            _ => SaveStore::none(),
        };

        cartridge
    }

    pub fn is_inserted(&self) -> bool {
        self.rom.is_some()
    }

    /// Reads the 32-bit little-endian word at `address` in the ROM address
    /// space, with the CARD2 save window shadowing the underlying ROM data.
    /// Out-of-range reads return all high bits, as does an empty slot.
    pub fn read_cart(&mut self, address: u32) -> u32 {
        let Some(rom) = &mut self.rom else { return u32::MAX };
        if u64::from(address) >= rom.size() {
            return u32::MAX;
        }
        if let Some(value) = self.save.card2_read(address) {
            return value;
        }
        rom.read_word(address)
    }

    /// Flushes modified save data to disk. Dropping the cartridge does NOT
    /// flush; hosts call this periodically and before shutdown.
    pub fn update_save(&mut self) {
        self.save.update();
    }

    /// Whether save data has been modified since the last successful flush.
    pub fn save_dirty(&self) -> bool {
        self.save.dirty()
    }

    pub fn read_cfg9_card_power(&self) -> u16 {
        self.cfg9_card_power
    }

    pub fn write_cfg9_card_power(&mut self, mask: u16, value: u16) {
        let mask = mask & 0xC;
        self.cfg9_card_power = (self.cfg9_card_power & !mask) | (value & mask);

        // Requesting both power state bits at once acks straight back to the
        // off state
        if self.cfg9_card_power & 0xC == 0xC {
            self.cfg9_card_power &= !0xC;
        }
    }

    /// Captures register and engine state for a save state.
    pub fn save_state(&self) -> CartridgeState {
        CartridgeState {
            ctr_mode: self.ctr_mode,
            cfg9_card_power: self.cfg9_card_power,
            ntr: self.ntr.clone(),
            ctr: self.ctr.clone(),
            spi: self.spi.clone(),
        }
    }

    /// Restores register and engine state captured by [`Self::save_state`].
    /// The ROM and save stores keep their current (reloaded) contents.
    pub fn restore_state(&mut self, state: CartridgeState) {
        self.ctr_mode = state.ctr_mode;
        self.cfg9_card_power = state.cfg9_card_power;
        self.ntr = state.ntr;
        self.ctr = state.ctr;
        self.spi = state.spi;
    }
}

fn save_path_for(cart_path: &Path, save_dir: Option<&Path>) -> PathBuf {
    let save_path = cart_path.with_extension("sav");
    match (save_dir, save_path.file_name()) {
        (Some(dir), Some(file_name)) => dir.join(file_name),
        _ => save_path,
    }
}
