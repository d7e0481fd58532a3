//! The circular slot log and its in-memory cursor state.

use alloc::vec::Vec;
use core::ops::Range;

use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};

use crate::error::Error;
use crate::layout::{
    self, RegionHeader, ERASE_UNIT, REGION_HEADER_SIZE, SLOT_HEADER_SIZE, SLOT0_OFFSET,
    UNUSED_SEQNO,
};
use crate::partition;
use crate::ring::Ring;

/// A circular log of fixed-size entries stored in one NOR flash region.
///
/// The value owns the cursor state and a buffer holding one full slot; the
/// payload part of that buffer is exposed through [`FlashLog::payload`] and
/// [`FlashLog::payload_mut`]. All cursor state lives only in RAM and is
/// rebuilt from the slot metadata whenever a region is reopened.
#[derive(Debug)]
pub struct FlashLog<S> {
    flash: S,
    base: u32,
    payload_size: usize,
    slot_count: u32,
    highest_seqno: u32,
    in_use: u32,
    oldest: u32,
    newest: u32,
    current: u32,
    entry: Vec<u8>,
}

impl<S: NorFlash> FlashLog<S> {
    /// Open the log stored in `region`, initializing the region first when it
    /// carries no recognizable header or a different layout.
    ///
    /// `payload_size` plus the slot metadata must be a power of two no larger
    /// than one erase unit; other sizes fail with [`Error::InvalidSlotSize`]
    /// before any flash access. Reinitialization erases every previous entry.
    /// Opening an already initialized region scans one metadata word per slot
    /// to rebuild the cursor state and leaves the cursor on the newest entry.
    ///
    /// The region is a caller contract and panics when violated: it must
    /// start on an erase-unit boundary, span whole erase units, and be large
    /// enough for the header unit plus at least one unit of slots.
    pub fn open(mut flash: S, region: Range<u32>, payload_size: usize) -> Result<Self, Error<S::Error>> {
        if !layout::is_valid_payload_size(payload_size) {
            return Err(Error::InvalidSlotSize(payload_size));
        }

        assert!(region.start < region.end, "log region is empty");
        assert_eq!(
            region.start % ERASE_UNIT,
            0,
            "log region must start on an erase-unit boundary"
        );
        assert_eq!(
            (region.end - region.start) % ERASE_UNIT,
            0,
            "log region must span whole erase units"
        );
        assert!(
            region.end - region.start >= 2 * ERASE_UNIT,
            "log region must hold the header unit and at least one slot unit"
        );

        let capacity = region.end - region.start;
        let slot_size = layout::slot_size(payload_size);
        let slot_count = (capacity - SLOT0_OFFSET) / slot_size as u32;

        let mut header_bytes = [0u8; REGION_HEADER_SIZE];
        flash
            .read(region.start, &mut header_bytes)
            .map_err(Error::Read)?;

        let mut log = Self {
            flash,
            base: region.start,
            payload_size,
            slot_count,
            highest_seqno: 0,
            in_use: 0,
            oldest: 0,
            newest: 0,
            current: 0,
            entry: Vec::new(),
        };

        match RegionHeader::from_bytes(header_bytes) {
            Some(header)
                if header.payload_size == payload_size as u32
                    && header.slot_count == slot_count =>
            {
                log.scan_slots()?;
            }
            Some(header) => {
                log::warn!(
                    "log region layout changed (stored payload size {}, requested {}); reinitializing",
                    header.payload_size,
                    payload_size
                );
                log.initialize(capacity)?;
            }
            None => {
                log::info!(
                    "initializing fresh log region: {} slots of {} payload bytes",
                    slot_count,
                    payload_size
                );
                log.initialize(capacity)?;
            }
        }

        log.current = log.newest;

        // The entry buffer is the last thing acquired, so a failed open never
        // holds on to an allocation.
        log.entry
            .try_reserve_exact(slot_size)
            .map_err(|_| Error::OutOfMemory)?;
        log.entry.resize(slot_size, 0);

        Ok(log)
    }

    /// Locate the log partition through the partition table and open it.
    ///
    /// With a label, the partition must carry that exact name; without one,
    /// the first partition of the log type is used.
    pub fn open_named(
        mut flash: S,
        label: Option<&str>,
        payload_size: usize,
    ) -> Result<Self, Error<S::Error>> {
        let region = partition::find_log_region(&mut flash, label)?;
        Self::open(flash, region, payload_size)
    }

    /// Append the bytes currently in the payload buffer as the newest entry
    /// and return the sequence number assigned to it.
    ///
    /// When the ring is full this first erases the erase unit holding the
    /// append target, which retires every entry in that unit at once, since
    /// the hardware cannot reclaim single slots.
    pub fn append(&mut self) -> Result<u32, Error<S::Error>> {
        let ring = self.ring();
        let slot_size = layout::slot_size(self.payload_size);
        let target = if self.in_use == 0 {
            self.newest
        } else {
            ring.next(self.newest)
        };
        let offset = self.base + layout::slot_offset(target, slot_size);

        if self.in_use == self.slot_count {
            let unit_start = offset & !(ERASE_UNIT - 1);
            self.flash
                .erase(unit_start, unit_start + ERASE_UNIT)
                .map_err(Error::Erase)?;

            // Those slots are gone from flash now, so the bookkeeping moves
            // with them before the new entry is written.
            let evicted = ERASE_UNIT / slot_size as u32;
            debug_assert!(evicted <= self.in_use);
            self.in_use -= evicted;
            self.oldest = ring.advance(self.oldest, evicted);
            log::debug!("log ring full; evicted the {} oldest entries", evicted);
        }

        let seqno = self.highest_seqno.wrapping_add(1);
        self.entry[..SLOT_HEADER_SIZE].copy_from_slice(&seqno.to_le_bytes());
        self.flash.write(offset, &self.entry).map_err(Error::Write)?;

        self.newest = target;
        self.highest_seqno = seqno;
        self.in_use += 1;
        Ok(seqno)
    }

    /// Read the entry under the cursor into the payload buffer and return
    /// the payload view. The cursor does not move.
    pub fn read(&mut self) -> Result<&[u8], Error<S::Error>> {
        if self.in_use == 0 || !self.ring().contains(self.oldest, self.newest, self.current) {
            return Err(Error::InvalidCursor);
        }

        let slot_size = layout::slot_size(self.payload_size);
        let offset = self.base + layout::slot_offset(self.current, slot_size);
        self.flash
            .read(offset, &mut self.entry)
            .map_err(Error::Read)?;
        Ok(&self.entry[SLOT_HEADER_SIZE..])
    }

    /// Move the cursor to the oldest entry.
    pub fn goto_oldest(&mut self) -> Result<(), Error<S::Error>> {
        if self.in_use == 0 {
            return Err(Error::InvalidCursor);
        }
        self.current = self.oldest;
        Ok(())
    }

    /// Move the cursor to the newest entry.
    pub fn goto_newest(&mut self) -> Result<(), Error<S::Error>> {
        if self.in_use == 0 {
            return Err(Error::InvalidCursor);
        }
        self.current = self.newest;
        Ok(())
    }

    /// Move the cursor one entry towards the newest; fails at the newest.
    pub fn goto_next(&mut self) -> Result<(), Error<S::Error>> {
        if self.in_use == 0 || self.current == self.newest {
            return Err(Error::InvalidCursor);
        }
        self.current = self.ring().next(self.current);
        Ok(())
    }

    /// Move the cursor one entry towards the oldest; fails at the oldest.
    pub fn goto_prev(&mut self) -> Result<(), Error<S::Error>> {
        if self.in_use == 0 || self.current == self.oldest {
            return Err(Error::InvalidCursor);
        }
        self.current = self.ring().prev(self.current);
        Ok(())
    }

    /// Close the log, dropping the entry buffer and handing the flash driver
    /// back to the caller. Reopening later rebuilds the same cursor state
    /// from the slot metadata.
    pub fn close(self) -> S {
        self.flash
    }

    /// Payload part of the entry buffer.
    pub fn payload(&self) -> &[u8] {
        &self.entry[SLOT_HEADER_SIZE..]
    }

    /// Mutable payload part of the entry buffer; fill this before
    /// [`FlashLog::append`].
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.entry[SLOT_HEADER_SIZE..]
    }

    /// Sequence number of the entry currently in the buffer, valid after a
    /// successful read or append.
    pub fn entry_seqno(&self) -> u32 {
        u32::from_le_bytes([self.entry[0], self.entry[1], self.entry[2], self.entry[3]])
    }

    /// Total number of slots in the region.
    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }

    /// Number of entries currently stored.
    pub fn entry_count(&self) -> u32 {
        self.in_use
    }

    pub fn is_empty(&self) -> bool {
        self.in_use == 0
    }

    pub fn is_full(&self) -> bool {
        self.in_use == self.slot_count
    }

    /// Payload bytes per entry.
    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    /// Highest sequence number assigned so far; zero on a fresh region.
    pub fn highest_seqno(&self) -> u32 {
        self.highest_seqno
    }

    fn ring(&self) -> Ring {
        Ring::new(self.slot_count)
    }

    /// Erase the whole region and write a fresh header, leaving the log
    /// empty.
    fn initialize(&mut self, capacity: u32) -> Result<(), Error<S::Error>> {
        self.flash
            .erase(self.base, self.base + capacity)
            .map_err(Error::Erase)?;

        let header = RegionHeader::new(self.payload_size as u32, self.slot_count);
        self.flash
            .write(self.base, &header.to_bytes())
            .map_err(Error::Write)?;

        self.highest_seqno = 0;
        self.in_use = 0;
        self.oldest = 0;
        self.newest = 0;
        Ok(())
    }

    /// Rebuild the cursor state from one metadata word per slot. Eviction
    /// never compacts, so slot positions carry no order; the sequence
    /// numbers alone decide which entries are oldest and newest.
    fn scan_slots(&mut self) -> Result<(), Error<S::Error>> {
        let slot_size = layout::slot_size(self.payload_size);
        let mut oldest_seqno = UNUSED_SEQNO;

        for slot in 0..self.slot_count {
            let mut seqno_bytes = [0u8; SLOT_HEADER_SIZE];
            self.flash
                .read(
                    self.base + layout::slot_offset(slot, slot_size),
                    &mut seqno_bytes,
                )
                .map_err(Error::Read)?;

            let seqno = u32::from_le_bytes(seqno_bytes);
            if seqno == UNUSED_SEQNO {
                continue;
            }

            self.in_use += 1;
            if seqno > self.highest_seqno {
                self.highest_seqno = seqno;
                self.newest = slot;
            }
            if seqno < oldest_seqno {
                oldest_seqno = seqno;
                self.oldest = slot;
            }
        }

        log::debug!(
            "recovered log state: {} of {} slots in use, newest seqno {}",
            self.in_use,
            self.slot_count,
            self.highest_seqno
        );
        Ok(())
    }
}
