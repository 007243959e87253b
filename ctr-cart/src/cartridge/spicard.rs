//! SPICARD protocol engine: the MMIO-level SPI master talking to a CARD1
//! save FLASH chip.

use crate::bus::{CartridgeBus, CpuCore, ARM9_IRQ_CTRCARD};
use crate::cartridge::Cartridge;
use bincode::{Decode, Encode};
use ctr_common::num::{GetBit, U24Ext};

const FIFO_CNT_WRITE_MASK: u32 = 0xB007;
const FIFO_SELECT_WRITE_MASK: u32 = 0x1;
const FIFO_BLKLEN_WRITE_MASK: u32 = 0x1FFFFF;
const FIFO_INT_MASK_WRITE_MASK: u32 = 0xF;

// Bits 15 and 13 of SPI_FIFO_CNT together encode the transfer direction
const DIRECTION_MASK: u32 = 0xA000;
const DIRECTION_READ: u32 = 0x8000;
const DIRECTION_WRITE: u32 = 0xA000;

// Write enable latch in the FLASH status register
const STATUS_WRITE_ENABLE: u8 = 1 << 1;

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct SpiCard {
    fifo_cnt: u32,
    fifo_select: u32,
    fifo_blklen: u32,
    fifo_int_mask: u32,
    fifo_int_stat: u32,
    count: u32,
    total: u32,
    command: u8,
    address: u32,
    status: u8,
}

impl SpiCard {
    pub(crate) fn new() -> Self {
        Self {
            fifo_cnt: 0,
            fifo_select: 0,
            fifo_blklen: 0,
            fifo_int_mask: 0,
            fifo_int_stat: 0,
            count: 0,
            total: 0,
            command: 0,
            address: 0,
            status: 0,
        }
    }
}

impl Cartridge {
    pub fn read_spi_fifo_cnt(&self) -> u32 {
        self.spi.fifo_cnt
    }

    pub fn read_spi_fifo_select(&self) -> u32 {
        self.spi.fifo_select
    }

    pub fn read_spi_fifo_blklen(&self) -> u32 {
        self.spi.fifo_blklen
    }

    pub fn read_spi_fifo_int_mask(&self) -> u32 {
        self.spi.fifo_int_mask
    }

    pub fn read_spi_fifo_int_stat(&self) -> u32 {
        self.spi.fifo_int_stat
    }

    pub fn write_spi_fifo_cnt(&mut self, mask: u32, value: u32) {
        let mask = mask & FIFO_CNT_WRITE_MASK;
        let old = self.spi.fifo_cnt;
        self.spi.fifo_cnt = (old & !mask) | (value & mask);

        // A 0-to-1 edge on the start bit latches the burst length and selects
        // the chip
        if (!old & self.spi.fifo_cnt) & (1 << 15) == 0 {
            return;
        }
        self.spi.count = self.spi.fifo_blklen;
        self.spi.fifo_select |= 1;
    }

    pub fn write_spi_fifo_select(&mut self, mask: u32, value: u32) {
        let mask = mask & FIFO_SELECT_WRITE_MASK;
        self.spi.fifo_select = (self.spi.fifo_select & !mask) | (value & mask);

        // Deselecting the chip ends the current command burst
        if self.spi.fifo_select == 0 {
            self.spi.total = 0;
        }
    }

    pub fn write_spi_fifo_blklen(&mut self, mask: u32, value: u32) {
        let mask = mask & FIFO_BLKLEN_WRITE_MASK;
        self.spi.fifo_blklen = (self.spi.fifo_blklen & !mask) | (value & mask);
    }

    pub fn write_spi_fifo_int_mask(&mut self, mask: u32, value: u32) {
        let mask = mask & FIFO_INT_MASK_WRITE_MASK;
        self.spi.fifo_int_mask = (self.spi.fifo_int_mask & !mask) | (value & mask);
    }

    /// Acknowledges interrupt status bits (write 1 to clear).
    pub fn write_spi_fifo_int_stat(&mut self, mask: u32, value: u32) {
        self.spi.fifo_int_stat &= !(value & mask);
    }

    /// Reads up to 4 bytes from the FLASH chip, LSB first, while transferring
    /// in the read direction.
    pub fn read_spi_fifo_data<B: CartridgeBus>(&mut self, bus: &mut B) -> u32 {
        let mut value = 0;
        if self.spi.fifo_cnt & DIRECTION_MASK == DIRECTION_READ && self.spi.fifo_select != 0 {
            for shift in (0..32).step_by(8) {
                if self.spi.count == 0 {
                    break;
                }
                value |= u32::from(self.spi_transfer(bus, 0)) << shift;
            }
        }
        value
    }

    /// Sends up to 4 bytes to the FLASH chip, LSB first, while transferring
    /// in the write direction.
    pub fn write_spi_fifo_data<B: CartridgeBus>(&mut self, bus: &mut B, mask: u32, value: u32) {
        if self.spi.fifo_cnt & DIRECTION_MASK != DIRECTION_WRITE || self.spi.fifo_select == 0 {
            return;
        }
        let value = value & mask;
        for shift in (0..32).step_by(8) {
            if self.spi.count == 0 {
                break;
            }
            self.spi_transfer(bus, (value >> shift) as u8);
        }
    }

    /// Clocks one byte through the FLASH chip and returns the byte it drives
    /// back. Callers must ensure a burst is in progress (`spi.count > 0`).
    fn spi_transfer<B: CartridgeBus>(&mut self, bus: &mut B, value: u8) -> u8 {
        // End the burst and trigger an interrupt when its length is reached
        self.spi.count -= 1;
        if self.spi.count == 0 {
            self.spi.fifo_cnt &= !(1 << 15);
            if self.spi.fifo_int_mask.bit(0) {
                self.spi.fifo_int_stat |= 1;
                bus.send_interrupt(CpuCore::Arm9, ARM9_IRQ_CTRCARD);
            }
        }

        // The first byte after chip select latches the command
        self.spi.total += 1;
        if self.spi.total == 1 {
            self.spi.command = value;
            self.spi.address = 0;
            log::trace!("SPICARD command {value:02X}");
        }

        match self.spi.command {
            0x02 => {
                // Page program: 3 address bytes, then data while write-enabled
                if self.spi.total <= 4 {
                    if self.spi.total >= 2 {
                        self.accumulate_spi_address(value);
                    }
                    return 0;
                }
                if self.spi.status & STATUS_WRITE_ENABLE != 0
                    && self.save.flash_write(self.spi.address, value)
                {
                    self.spi.address += 1;
                }
                0
            }
            0x03 | 0xEB => {
                // Read data; the quad variant takes 3 extra dummy bytes
                let header_len = if self.spi.command == 0xEB { 7 } else { 4 };
                if self.spi.total <= header_len {
                    if (2..=4).contains(&self.spi.total) {
                        self.accumulate_spi_address(value);
                    }
                    return 0;
                }
                match self.save.flash_read(self.spi.address) {
                    Some(data) => {
                        self.spi.address += 1;
                        data
                    }
                    None => 0xFF,
                }
            }
            0x04 => {
                self.spi.status &= !STATUS_WRITE_ENABLE;
                0
            }
            0x05 => self.spi.status,
            0x06 => {
                self.spi.status |= STATUS_WRITE_ENABLE;
                0
            }
            0x20 => {
                // Sector erase: fires once the 3 address bytes are in
                if (2..=4).contains(&self.spi.total) {
                    self.accumulate_spi_address(value);
                }
                if self.spi.total == 4 && self.spi.status & STATUS_WRITE_ENABLE != 0 {
                    self.save.flash_erase_sector(self.spi.address);
                }
                0
            }
            0x9F => {
                // Read the save chip ID, low byte first
                match self.spi.total {
                    2 => self.save.flash_id().low_byte(),
                    3 => self.save.flash_id().mid_byte(),
                    4 => self.save.flash_id().high_byte(),
                    _ => 0,
                }
            }
            command => {
                log::warn!("Accessing SPICARD with unknown command: {command:02X}");
                0
            }
        }
    }

    // The 24-bit FLASH address arrives MSB first in bytes 2-4 of a burst
    fn accumulate_spi_address(&mut self, value: u8) {
        match self.spi.total {
            2 => self.spi.address.set_high_byte(value),
            3 => self.spi.address.set_mid_byte(value),
            4 => self.spi.address.set_low_byte(value),
            _ => {}
        }
    }
}
