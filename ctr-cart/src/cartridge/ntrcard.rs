//! NTRCARD protocol engine, used during early boot for chip identification
//! and for the switch into CTRCARD mode.

use crate::bus::{
    CartEvent, CartridgeBus, CpuCore, ARM11_IRQ_NTRCARD, ARM9_IRQ_NTRCARD, DRQ_NTRCARD,
};
use crate::cartridge::Cartridge;
use bincode::{Decode, Encode};
use ctr_common::num::GetBit;

const ROMCNT_WRITE_MASK: u32 = 0xFF7F7FFF;
const MCNT_WRITE_MASK: u16 = 0xE043;

// Per-byte transfer rates in scheduler ticks; ROMCNT bit 27 selects the
// slower 4.2MHz clock over the 6.7MHz one
const SLOW_WORD_TICKS: u32 = 256;
const FAST_WORD_TICKS: u32 = 160;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
enum NtrReply {
    #[default]
    None,
    Chip1,
    Chip2,
}

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct NtrCard {
    cmd: [u32; 2],
    romcnt: u32,
    mcnt: u16,
    count: u32,
    reply: NtrReply,
}

impl NtrCard {
    pub(crate) fn new() -> Self {
        Self { cmd: [0; 2], romcnt: 0, mcnt: 0, count: 0, reply: NtrReply::None }
    }

    fn word_ticks(&self) -> u32 {
        if self.romcnt.bit(27) { SLOW_WORD_TICKS } else { FAST_WORD_TICKS }
    }
}

impl Cartridge {
    pub fn read_ntr_cmd(&self, index: usize) -> u32 {
        self.ntr.cmd[index]
    }

    pub fn read_ntr_mcnt(&self) -> u16 {
        self.ntr.mcnt
    }

    pub fn read_ntr_romcnt(&self) -> u32 {
        self.ntr.romcnt
    }

    pub fn write_ntr_cmd(&mut self, index: usize, mask: u32, value: u32) {
        self.ntr.cmd[index] = (self.ntr.cmd[index] & !mask) | (value & mask);
    }

    pub fn write_ntr_mcnt(&mut self, mask: u16, value: u16) {
        let mask = mask & MCNT_WRITE_MASK;
        self.ntr.mcnt = (self.ntr.mcnt & !mask) | (value & mask);
    }

    pub fn write_ntr_romcnt<B: CartridgeBus>(&mut self, bus: &mut B, mask: u32, value: u32) {
        let mask = mask & ROMCNT_WRITE_MASK;
        let transfer = !self.ntr.romcnt & value & mask & (1 << 31) != 0;
        self.ntr.romcnt = (self.ntr.romcnt & !mask) | (value & mask);
        if !transfer {
            return;
        }

        self.ntr.count = match self.ntr.romcnt.bits(24..=26) {
            0 => 0,
            7 => 4,
            size => 0x100 << size,
        };

        // The 8-byte command is big-endian on the wire
        let cmd = ((u64::from(self.ntr.cmd[1]) << 32) | u64::from(self.ntr.cmd[0])).swap_bytes();
        self.ntr.reply = NtrReply::None;

        if self.is_inserted() && !self.ctr_mode {
            match (cmd >> 56) as u8 {
                0x90 => self.ntr.reply = NtrReply::Chip1,
                0xA0 => self.ntr.reply = NtrReply::Chip2,
                0x3E => {
                    log::info!("Cartridge switching to CTRCARD mode");
                    self.ctr_mode = true;
                }
                // Reset and signal commands have no visible effect
                0x9F | 0x71 => {}
                _ => log::warn!("Unknown NTRCARD command: {cmd:016X}"),
            }
        }

        // Zero-size transfers complete instantly
        if self.ntr.count == 0 {
            self.ntr.romcnt &= !0x80800000; // Busy, word ready
            if self.ntr.mcnt.bit(14) {
                bus.send_interrupt(CpuCore::Arm9, ARM9_IRQ_NTRCARD);
                bus.send_interrupt(CpuCore::Arm11, ARM11_IRQ_NTRCARD);
            }
            return;
        }

        bus.schedule(CartEvent::NtrWordReady, self.ntr.word_ticks());
    }

    /// Scheduler callback: the next NTRCARD data word is available.
    pub fn ntr_word_ready<B: CartridgeBus>(&mut self, bus: &mut B) {
        if self.ntr.count == 0 {
            return;
        }
        self.ntr.romcnt |= 1 << 23;
        bus.set_drq(DRQ_NTRCARD);
    }

    /// Pulls the pending NTRCARD data word; all high bits when none is ready.
    pub fn read_ntr_data<B: CartridgeBus>(&mut self, bus: &mut B) -> u32 {
        if !self.ntr.romcnt.bit(23) {
            return u32::MAX;
        }
        self.ntr.romcnt &= !(1 << 23);
        bus.clear_drq(DRQ_NTRCARD);

        self.ntr.count -= 4;
        if self.ntr.count == 0 {
            // End the transfer and trigger interrupts if enabled
            self.ntr.romcnt &= !(1 << 31);
            if self.ntr.mcnt.bit(14) {
                bus.send_interrupt(CpuCore::Arm9, ARM9_IRQ_NTRCARD);
                bus.send_interrupt(CpuCore::Arm11, ARM11_IRQ_NTRCARD);
            }
        } else {
            bus.schedule(CartEvent::NtrWordReady, self.ntr.word_ticks());
        }

        match self.ntr.reply {
            NtrReply::Chip1 => self.cart_id_1,
            NtrReply::Chip2 => self.cart_id_2,
            NtrReply::None => u32::MAX,
        }
    }
}
