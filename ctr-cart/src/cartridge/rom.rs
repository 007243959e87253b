use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

// Cartridge reads are spatially local; a single cached 2KB block covers
// header probes and sequential ROM transfers without per-access syscalls.
const BLOCK_LEN: usize = 0x800;

/// File-backed cartridge ROM with a one-block read cache.
#[derive(Debug)]
pub(crate) struct CartRom {
    file: File,
    size: u64,
    block: Box<[u8; BLOCK_LEN]>,
    block_base: Option<u32>,
}

impl CartRom {
    pub(crate) fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        if size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "cartridge file is empty"));
        }
        Ok(Self { file, size, block: Box::new([0xFF; BLOCK_LEN]), block_base: None })
    }

    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    /// Reads the little-endian word at `address`, reloading the cached block
    /// from the file if the access falls outside it. `address` must be below
    /// the ROM size; an I/O failure returns all high bits.
    pub(crate) fn read_word(&mut self, address: u32) -> u32 {
        debug_assert!(u64::from(address) < self.size);

        let base = address & !(BLOCK_LEN as u32 - 1);
        if self.block_base != Some(base) {
            if let Err(err) = self.load_block(base) {
                log::warn!("Cartridge ROM read failed at {address:08X}: {err}");
                self.block_base = None;
                return u32::MAX;
            }
            self.block_base = Some(base);
        }

        let offset = address as usize & (BLOCK_LEN - 1) & !3;
        u32::from_le_bytes(self.block[offset..offset + 4].try_into().unwrap())
    }

    fn load_block(&mut self, base: u32) -> io::Result<()> {
        // The final block of the ROM may be short; pad it with high bits
        self.block.fill(0xFF);
        self.file.seek(SeekFrom::Start(base.into()))?;
        let in_file = (self.size - u64::from(base)).min(BLOCK_LEN as u64) as usize;
        self.file.read_exact(&mut self.block[..in_file])
    }
}
