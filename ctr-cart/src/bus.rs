use bincode::{Decode, Encode};

/// ARM9 interrupt vector raised when a CTRCARD transfer or SPICARD burst completes.
pub const ARM9_IRQ_CTRCARD: u8 = 23;
/// ARM9 interrupt vector raised when an NTRCARD transfer completes.
pub const ARM9_IRQ_NTRCARD: u8 = 27;
/// ARM11 interrupt vector raised when an NTRCARD transfer completes.
pub const ARM11_IRQ_NTRCARD: u8 = 0x44;

/// NDMA request lines asserted while CTRCARD reply words are waiting in the FIFO.
pub const DRQ_CTRCARD: u8 = 0x4;
/// NDMA request lines asserted while an NTRCARD data word is waiting.
pub const DRQ_NTRCARD: u8 = 0xC;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum CpuCore {
    Arm9,
    Arm11,
}

/// Timed callbacks the cartridge posts to the shared event scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum CartEvent {
    NtrWordReady,
    CtrWordReady,
}

/// Everything the cartridge needs from the rest of the system: the event
/// scheduler, the interrupt controllers of both CPU clusters, the NDMA request
/// lines, and the AES engine's cartridge auto-boot hook.
///
/// The cartridge holds no references to its collaborators; callers pass an
/// implementation into every MMIO access and scheduler callback.
pub trait CartridgeBus {
    /// Post a callback to fire after the given number of scheduler ticks.
    fn schedule(&mut self, event: CartEvent, ticks: u32);

    fn send_interrupt(&mut self, cpu: CpuCore, vector: u8);

    fn set_drq(&mut self, lines: u8);

    fn clear_drq(&mut self, lines: u8);

    /// One-shot AES handshake performed when a cartridge is inserted with
    /// auto-boot enabled.
    fn auto_boot_aes(&mut self);
}
