//! Log-partition discovery through the ESP-IDF partition table.
//!
//! The table lives at a fixed flash offset and holds 32-byte entries: a
//! magic word, type and subtype bytes, little-endian offset and size words,
//! and a null-padded 16-byte label. Scanning stops at the first erased
//! entry. Log regions use their own dedicated partition type; the subtype
//! does not matter.

use core::ops::Range;
use core::str;

use embedded_storage::nor_flash::ReadNorFlash;

use crate::error::Error;

/// Flash offset of the partition table.
pub const PARTITION_TABLE_OFFSET: u32 = 0x8000;

/// Partition type reserved for slot-log regions.
pub const LOG_PARTITION_TYPE: u8 = 0x4D;

const PARTITION_TABLE_SIZE: usize = 0x1000;
const PARTITION_ENTRY_SIZE: usize = 32;
const PARTITION_MAGIC: u16 = 0x50AA;

/// Find the flash region of the first log partition, optionally requiring an
/// exact label match. Returns [`Error::RegionNotFound`] when no entry
/// qualifies.
pub fn find_log_region<S: ReadNorFlash>(
    flash: &mut S,
    label: Option<&str>,
) -> Result<Range<u32>, Error<S::Error>> {
    let mut table = [0u8; PARTITION_TABLE_SIZE];
    flash
        .read(PARTITION_TABLE_OFFSET, &mut table)
        .map_err(Error::Read)?;

    for entry in table.chunks_exact(PARTITION_ENTRY_SIZE) {
        let magic = u16::from_le_bytes([entry[0], entry[1]]);
        if magic == 0xFFFF {
            break;
        }
        if magic != PARTITION_MAGIC {
            continue;
        }
        if entry[2] != LOG_PARTITION_TYPE {
            continue;
        }

        let offset = u32::from_le_bytes([entry[4], entry[5], entry[6], entry[7]]);
        let size = u32::from_le_bytes([entry[8], entry[9], entry[10], entry[11]]);
        if size == 0 {
            continue;
        }
        let end = match offset.checked_add(size) {
            Some(end) => end,
            None => continue,
        };

        if let Some(wanted) = label {
            let label_bytes = &entry[12..28];
            let label_end = label_bytes
                .iter()
                .position(|&byte| byte == 0)
                .unwrap_or(label_bytes.len());
            match str::from_utf8(&label_bytes[..label_end]) {
                Ok(name) if name == wanted => {}
                _ => continue,
            }
        }

        return Ok(offset..end);
    }

    Err(Error::RegionNotFound)
}
