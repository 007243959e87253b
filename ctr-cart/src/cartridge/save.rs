use std::path::{Path, PathBuf};
use std::{fs, io};
use thiserror::Error;

// CARD1 FLASH chips top out at 8MB
const CARD1_MAX_LEN_LOG2: u32 = 0x17;
// Freshly created saves: 512KB FLASH for CARD1, 1MB region for CARD2
const CARD1_NEW_LEN: usize = 0x80000;
const CARD1_NEW_ID: u32 = 0x1322C2;
const CARD2_NEW_LEN: usize = 0x100000;

const FLASH_SECTOR_LEN: u32 = 0x1000;

#[derive(Debug, Error)]
pub(crate) enum SaveWriteError {
    #[error("Error writing save bytes to '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to rename temp file '{temp_path}' to '{path}': {source}")]
    RenameFile {
        path: String,
        temp_path: String,
        #[source]
        source: io::Error,
    },
}

/// On-cart save storage. CARD1 carts address an SPI FLASH chip; CARD2 carts
/// expose a writable window inside the ROM address space. A cartridge has at
/// most one of the two.
#[derive(Debug)]
enum SaveMedia {
    None,
    Card1 { data: Box<[u8]>, id: u32 },
    Card2 { data: Box<[u8]>, base: u32 },
}

#[derive(Debug)]
pub(crate) struct SaveStore {
    media: SaveMedia,
    path: Option<PathBuf>,
    dirty: bool,
}

impl SaveStore {
    pub(crate) fn none() -> Self {
        Self { media: SaveMedia::None, path: None, dirty: false }
    }

    /// Loads (or synthesizes) a CARD1 FLASH image. The buffer is sized to the
    /// smallest power of two covering the file, capped at 8MB, with the unused
    /// tail in the erased state.
    pub(crate) fn card1(path: PathBuf) -> Self {
        let media = match fs::read(&path) {
            Ok(contents) => {
                let mut code = 0;
                while (1usize << code) < contents.len() && code < CARD1_MAX_LEN_LOG2 as usize {
                    code += 1;
                }
                let mut data = vec![0xFF; 1 << code];
                let copied = contents.len().min(data.len());
                data[..copied].copy_from_slice(&contents[..copied]);
                SaveMedia::Card1 { data: data.into_boxed_slice(), id: ((code as u32) << 16) | 0x22C2 }
            }
            Err(_) => SaveMedia::Card1 {
                data: vec![0xFF; CARD1_NEW_LEN].into_boxed_slice(),
                id: CARD1_NEW_ID,
            },
        };
        Self { media, path: Some(path), dirty: false }
    }

    /// Loads (or synthesizes) a CARD2 save region overlaid on the ROM address
    /// space starting at `base`. The file size is adopted verbatim.
    pub(crate) fn card2(path: PathBuf, base: u32) -> Self {
        let data = match fs::read(&path) {
            Ok(contents) => contents.into_boxed_slice(),
            Err(_) => vec![0xFF; CARD2_NEW_LEN].into_boxed_slice(),
        };
        Self { media: SaveMedia::Card2 { data, base }, path: Some(path), dirty: false }
    }

    pub(crate) fn dirty(&self) -> bool {
        self.dirty
    }

    /// The CARD1 save chip ID reported by the SPI `0x9F` command.
    pub(crate) fn flash_id(&self) -> u32 {
        match &self.media {
            SaveMedia::Card1 { id, .. } => *id,
            SaveMedia::None | SaveMedia::Card2 { .. } => 0,
        }
    }

    /// Reads a CARD1 FLASH byte; `None` past the end of the chip.
    pub(crate) fn flash_read(&self, address: u32) -> Option<u8> {
        match &self.media {
            SaveMedia::Card1 { data, .. } => data.get(address as usize).copied(),
            SaveMedia::None | SaveMedia::Card2 { .. } => None,
        }
    }

    /// Writes a CARD1 FLASH byte, reporting whether the address was in range.
    pub(crate) fn flash_write(&mut self, address: u32, value: u8) -> bool {
        let SaveMedia::Card1 { data, .. } = &mut self.media else { return false };
        let Some(byte) = data.get_mut(address as usize) else { return false };
        *byte = value;
        self.dirty = true;
        true
    }

    /// Returns a 4KB CARD1 FLASH sector to the erased state, clamped to the
    /// chip size.
    pub(crate) fn flash_erase_sector(&mut self, address: u32) {
        let SaveMedia::Card1 { data, .. } = &mut self.media else { return };
        let start = (address as usize).min(data.len());
        let end = (address.saturating_add(FLASH_SECTOR_LEN) as usize).min(data.len());
        if start < end {
            data[start..end].fill(0xFF);
            self.dirty = true;
        }
    }

    /// Reads the CARD2 save word shadowing `rom_address`, if the address falls
    /// inside the writable window.
    pub(crate) fn card2_read(&self, rom_address: u32) -> Option<u32> {
        let SaveMedia::Card2 { data, base } = &self.media else { return None };
        let offset = rom_address.checked_sub(*base)? as usize;
        let bytes = data.get(offset..offset + 4)?;
        Some(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    /// Stores a word into the CARD2 window; writes outside it are dropped.
    pub(crate) fn card2_write(&mut self, rom_address: u32, value: u32) {
        let SaveMedia::Card2 { data, base } = &mut self.media else { return };
        let Some(offset) = rom_address.checked_sub(*base).map(|offset| offset as usize) else {
            return;
        };
        let Some(bytes) = data.get_mut(offset..offset + 4) else { return };
        bytes.copy_from_slice(&value.to_le_bytes());
        self.dirty = true;
    }

    /// Flushes modified save data to disk. A failed write is logged and leaves
    /// the store dirty so the next call retries.
    pub(crate) fn update(&mut self) {
        if !self.dirty {
            return;
        }
        let data = match &self.media {
            SaveMedia::Card1 { data, .. } | SaveMedia::Card2 { data, .. } => data,
            SaveMedia::None => return,
        };
        let Some(path) = &self.path else { return };

        match write_save(path, data) {
            Ok(()) => {
                log::info!("Wrote updated save file to '{}'", path.display());
                self.dirty = false;
            }
            Err(err) => log::warn!("{err}"),
        }
    }
}

// Write through a temp file so an interrupted flush can't truncate an
// existing save.
fn write_save(path: &Path, data: &[u8]) -> Result<(), SaveWriteError> {
    let temp_path = path.with_extension("sav.tmp");
    fs::write(&temp_path, data).map_err(|source| SaveWriteError::WriteFile {
        path: temp_path.display().to_string(),
        source,
    })?;
    fs::rename(&temp_path, path).map_err(|source| SaveWriteError::RenameFile {
        path: path.display().to_string(),
        temp_path: temp_path.display().to_string(),
        source,
    })
}
