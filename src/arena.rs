//! Segmented bump arena addressed by 32-bit virtual offsets.
//!
//! Memory is held in fixed-capacity segments. Every segment owns a window of
//! one unified address space: its base is the previous segment's base plus
//! that segment's capacity. A [`Ptr`] is a byte offset into that space and
//! never moves, so pointers stay valid for the arena's whole lifetime.
//!
//! Individual allocations are never reclaimed. An allocation that its owner
//! stops referencing (a child table replaced by a larger one, for example) is
//! simply abandoned until the whole arena is dropped.
//!
//! Offset `0` is the null pointer. The first segment starts with a
//! [`PTR_SIZE`]-byte sentinel allocation, so no caller can ever be handed
//! address `0`.

use std::fmt;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::Config;

/// Width of a stored pointer in bytes.
pub const PTR_SIZE: usize = 4;

/// Size of the virtual address space reachable with 4-byte pointers.
pub const ADDRESS_SPACE: u64 = 1 << 32;

/// Bytes claimed at the start of the first segment to keep offset 0 unused.
const NULL_RESERVATION: usize = PTR_SIZE;

// =============================================================================
// Pointer type
// =============================================================================

/// Virtual pointer: a byte offset into the arena's unified address space.
///
/// Stored little endian in 4 bytes. `Ptr::NULL` (offset 0) is never a valid
/// allocation.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Ptr(u32);

impl Ptr {
    pub const NULL: Ptr = Ptr(0);

    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Pointer `bytes` past this one.
    #[inline]
    pub fn add(self, bytes: usize) -> Self {
        debug_assert!(u64::from(self.0) + bytes as u64 <= ADDRESS_SPACE);
        Self(self.0 + bytes as u32)
    }

    #[inline]
    pub fn read(bytes: &[u8]) -> Self {
        Self(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    #[inline]
    pub fn write(self, bytes: &mut [u8]) {
        bytes[..PTR_SIZE].copy_from_slice(&self.0.to_le_bytes());
    }
}

impl fmt::Debug for Ptr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ptr({:#x})", self.0)
    }
}

impl fmt::Display for Ptr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

// =============================================================================
// Segments
// =============================================================================

/// One fixed-capacity backing buffer and its bump cursor.
pub struct Segment {
    data: Box<[u8]>,
    base: u32,
    used: usize,
}

impl Segment {
    fn new(base: u32, capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            base,
            used: 0,
        }
    }

    /// Virtual offset of this segment's first byte.
    #[inline]
    pub fn base(&self) -> u32 {
        self.base
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes already claimed by allocations.
    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.used
    }

    /// Virtual offset one past this segment's last byte.
    #[inline]
    fn end(&self) -> u64 {
        u64::from(self.base) + self.data.len() as u64
    }

    /// Claims `n` bytes, returning their local offset.
    #[inline]
    fn bump(&mut self, n: usize) -> Option<usize> {
        if self.remaining() < n {
            return None;
        }
        let local = self.used;
        self.used += n;
        Some(local)
    }
}

/// Arena allocation statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Number of segments opened so far.
    pub segments: usize,
    /// Sum of all segment capacities.
    pub reserved_bytes: u64,
    /// Bytes claimed by allocations, including the null sentinel.
    pub used_bytes: u64,
}

// =============================================================================
// Arena
// =============================================================================

/// Append-only memory manager over a growing list of segments.
pub struct SegmentedArena {
    segments: Vec<Segment>,
    /// Base offset of every segment, ascending. Searched by `locate`.
    bases: Vec<u32>,
    segment_size: usize,
    recycle_window: usize,
    max_bytes: u64,
}

impl SegmentedArena {
    /// Opens the first segment and claims the null sentinel.
    ///
    /// # Panics
    /// Panics if `config.segment_size` is zero.
    pub fn new(config: &Config) -> Result<Self> {
        assert!(config.segment_size > 0, "arena segment size must be positive");

        let mut arena = Self {
            segments: Vec::new(),
            bases: Vec::new(),
            segment_size: config.segment_size,
            recycle_window: config.recycle_window.max(1),
            max_bytes: config.max_bytes.min(ADDRESS_SPACE),
        };
        let sentinel = arena.allocate(NULL_RESERVATION)?;
        debug_assert!(sentinel.is_null());
        Ok(arena)
    }

    /// Claims `n` zeroed bytes and returns their virtual address.
    ///
    /// Only the most recent `recycle_window` segments are scanned for room, so
    /// the cost does not grow with the number of segments. When none fits, a
    /// new segment of `max(segment_size, n)` bytes is opened.
    ///
    /// # Panics
    /// Panics if `n` is zero.
    pub fn allocate(&mut self, n: usize) -> Result<Ptr> {
        assert!(n > 0, "zero-sized arena allocation");

        let window = self.segments.len().saturating_sub(self.recycle_window);
        for seg in &mut self.segments[window..] {
            if let Some(local) = seg.bump(n) {
                return Ok(Ptr(seg.base + local as u32));
            }
        }

        let seg = self.open_segment(n)?;
        seg.used = n;
        Ok(Ptr(seg.base))
    }

    /// Appends a segment able to hold at least `n` bytes.
    fn open_segment(&mut self, n: usize) -> Result<&mut Segment> {
        let base = self.segments.last().map_or(0, Segment::end);
        let room = self.max_bytes.saturating_sub(base);
        let capacity = (n.max(self.segment_size) as u64).min(room);
        if capacity < n as u64 {
            warn!(
                requested = n,
                reserved = base,
                limit = self.max_bytes,
                "arena allocation refused"
            );
            return Err(Error::ResourceExhausted {
                requested: n,
                reserved: base,
                limit: self.max_bytes,
            });
        }

        debug_assert!(base < ADDRESS_SPACE);
        let base = base as u32;
        let capacity = capacity as usize;
        debug!(
            segment = self.segments.len(),
            base,
            capacity,
            "opened arena segment"
        );
        self.bases.push(base);
        self.segments.push(Segment::new(base, capacity));
        let last = self.segments.len() - 1;
        Ok(&mut self.segments[last])
    }

    /// Maps a pointer to `(segment index, local offset)`.
    ///
    /// Returns `None` for the null pointer, for pointers past the last
    /// segment and for pointers into the unclaimed tail of a segment.
    pub fn locate(&self, ptr: Ptr) -> Option<(usize, usize)> {
        if ptr.is_null() {
            return None;
        }
        let idx = self.bases.partition_point(|&base| base <= ptr.0).checked_sub(1)?;
        let local = (ptr.0 - self.bases[idx]) as usize;
        (local < self.segments[idx].used).then_some((idx, local))
    }

    /// Borrows `len` allocated bytes starting at `ptr`, if they exist.
    pub fn try_bytes(&self, ptr: Ptr, len: usize) -> Option<&[u8]> {
        let (idx, local) = self.locate(ptr)?;
        let seg = &self.segments[idx];
        let end = local.checked_add(len)?;
        (end <= seg.used).then(|| &seg.data[local..end])
    }

    /// Borrows `len` allocated bytes starting at `ptr`.
    ///
    /// # Panics
    /// Panics if the range was never allocated. Pointers produced by this
    /// arena always satisfy that.
    pub fn bytes(&self, ptr: Ptr, len: usize) -> &[u8] {
        match self.try_bytes(ptr, len) {
            Some(bytes) => bytes,
            None => panic!("arena range {ptr}+{len} is not allocated"),
        }
    }

    /// Mutable counterpart of [`bytes`](Self::bytes).
    ///
    /// # Panics
    /// Panics if the range was never allocated.
    pub fn bytes_mut(&mut self, ptr: Ptr, len: usize) -> &mut [u8] {
        let (idx, local) = self.claimed(ptr, len);
        &mut self.segments[idx].data[local..local + len]
    }

    /// Copies `len` bytes between two allocations, possibly in different
    /// segments. The ranges must not overlap.
    ///
    /// # Panics
    /// Panics if either range was never allocated.
    pub fn copy(&mut self, src: Ptr, dst: Ptr, len: usize) {
        if len == 0 {
            return;
        }
        let (si, so) = self.claimed(src, len);
        let (di, doff) = self.claimed(dst, len);

        if si == di {
            debug_assert!(so + len <= doff || doff + len <= so);
            self.segments[si].data.copy_within(so..so + len, doff);
            return;
        }

        let (from, to) = if si < di {
            let (lo, hi) = self.segments.split_at_mut(di);
            (&lo[si], &mut hi[0])
        } else {
            let (lo, hi) = self.segments.split_at_mut(si);
            (&hi[0], &mut lo[di])
        };
        to.data[doff..doff + len].copy_from_slice(&from.data[so..so + len]);
    }

    fn claimed(&self, ptr: Ptr, len: usize) -> (usize, usize) {
        match self.locate(ptr) {
            Some((idx, local)) if local + len <= self.segments[idx].used => (idx, local),
            _ => panic!("arena range {ptr}+{len} is not allocated"),
        }
    }

    #[inline]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> + '_ {
        self.segments.iter()
    }

    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            segments: self.segments.len(),
            reserved_bytes: self.segments.iter().map(|s| s.capacity() as u64).sum(),
            used_bytes: self.segments.iter().map(|s| s.used as u64).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena(segment_size: usize) -> SegmentedArena {
        SegmentedArena::new(&Config::default().with_segment_size(segment_size)).unwrap()
    }

    #[test]
    fn test_null_is_reserved() {
        let mut a = arena(4096);
        let first = a.allocate(13).unwrap();
        assert_eq!(first.get(), NULL_RESERVATION as u32);
        assert!(a.locate(Ptr::NULL).is_none());
        assert!(a.try_bytes(Ptr::NULL, 1).is_none());
    }

    #[test]
    fn test_null_reserved_with_tiny_segments() {
        let mut a = arena(1);
        let p = a.allocate(1).unwrap();
        assert!(!p.is_null());
        assert_eq!(a.segment_count(), 2);
    }

    #[test]
    fn test_bump_within_segment() {
        let mut a = arena(64);
        let p1 = a.allocate(10).unwrap();
        let p2 = a.allocate(6).unwrap();
        assert_eq!(p2.get(), p1.get() + 10);
        assert_eq!(a.segment_count(), 1);
    }

    #[test]
    fn test_new_segment_bases() {
        let mut a = arena(16);
        a.allocate(12).unwrap(); // fills the first segment
        let p = a.allocate(8).unwrap();
        assert_eq!(p.get(), 16);
        let big = a.allocate(40).unwrap();
        assert_eq!(big.get(), 32);

        let bases: Vec<u32> = a.segments().map(Segment::base).collect();
        assert_eq!(bases, vec![0, 16, 32]);
        let caps: Vec<usize> = a.segments().map(Segment::capacity).collect();
        assert_eq!(caps, vec![16, 16, 40]);
    }

    #[test]
    fn test_recycle_window_fills_older_segment() {
        let mut a = arena(16);
        a.allocate(10).unwrap(); // first segment: 4 + 10 used
        let second = a.allocate(8).unwrap();
        assert_eq!(second.get(), 16);
        let tail = a.allocate(2).unwrap();
        assert_eq!(tail.get(), 14);
    }

    #[test]
    fn test_recycle_window_is_bounded() {
        let config = Config::default()
            .with_segment_size(16)
            .with_recycle_window(1);
        let mut a = SegmentedArena::new(&config).unwrap();
        a.allocate(10).unwrap();
        a.allocate(8).unwrap();
        // Two bytes remain in segment 0, but only segment 1 is scanned.
        let p = a.allocate(2).unwrap();
        assert_eq!(p.get(), 24);
    }

    #[test]
    fn test_locate() {
        let mut a = arena(16);
        let p1 = a.allocate(8).unwrap();
        let p2 = a.allocate(16).unwrap();
        assert_eq!(a.locate(p1), Some((0, 4)));
        assert_eq!(a.locate(p2), Some((1, 0)));
        assert_eq!(a.locate(p2.add(15)), Some((1, 15)));
        // Unclaimed tail of segment 0 and past the end.
        assert_eq!(a.locate(Ptr::new(13)), None);
        assert_eq!(a.locate(Ptr::new(32)), None);
        assert_eq!(a.try_bytes(p1, 9), None);
    }

    #[test]
    fn test_allocations_are_zeroed_and_writable() {
        let mut a = arena(32);
        let p = a.allocate(8).unwrap();
        assert_eq!(a.bytes(p, 8), &[0u8; 8]);
        a.bytes_mut(p, 4).copy_from_slice(b"abcd");
        assert_eq!(&a.bytes(p, 8)[..4], b"abcd");
    }

    #[test]
    fn test_copy_across_segments() {
        let mut a = arena(16);
        let src = a.allocate(8).unwrap();
        a.bytes_mut(src, 8).copy_from_slice(b"01234567");
        let dst = a.allocate(16).unwrap();
        assert_eq!(a.locate(dst).map(|(i, _)| i), Some(1));
        a.copy(src, dst, 8);
        assert_eq!(&a.bytes(dst, 16)[..8], b"01234567");

        let back = a.allocate(4).unwrap();
        a.copy(dst.add(4), back, 4);
        assert_eq!(a.bytes(back, 4), b"4567");
    }

    #[test]
    fn test_copy_same_segment() {
        let mut a = arena(64);
        let src = a.allocate(4).unwrap();
        let dst = a.allocate(4).unwrap();
        a.bytes_mut(src, 4).copy_from_slice(b"wxyz");
        a.copy(src, dst, 4);
        assert_eq!(a.bytes(dst, 4), b"wxyz");
    }

    #[test]
    #[should_panic(expected = "not allocated")]
    fn test_bytes_out_of_range_panics() {
        let a = arena(64);
        a.bytes(Ptr::new(60), 8);
    }

    #[test]
    fn test_resource_exhausted() {
        let config = Config::default().with_segment_size(16).with_max_bytes(40);
        let mut a = SegmentedArena::new(&config).unwrap();
        a.allocate(12).unwrap();
        a.allocate(16).unwrap();
        // Only 8 bytes of address space are left, so a smaller segment opens.
        let p = a.allocate(8).unwrap();
        assert_eq!(p.get(), 32);
        let err = a.allocate(1).unwrap_err();
        assert_eq!(
            err,
            Error::ResourceExhausted {
                requested: 1,
                reserved: 40,
                limit: 40
            }
        );
        // A failed allocation leaves earlier ones intact.
        assert_eq!(a.stats().used_bytes, 40);
    }

    #[test]
    fn test_ptr_encoding() {
        let mut buf = [0u8; 4];
        Ptr::new(0x0102_0304).write(&mut buf);
        assert_eq!(buf, [4, 3, 2, 1]);
        assert_eq!(Ptr::read(&buf), Ptr::new(0x0102_0304));
        assert_eq!(Ptr::new(0x2a).to_string(), "0x0000002a");
    }

    #[test]
    fn test_stats() {
        let mut a = arena(16);
        a.allocate(12).unwrap();
        a.allocate(3).unwrap();
        let stats = a.stats();
        assert_eq!(stats.segments, 2);
        assert_eq!(stats.reserved_bytes, 32);
        assert_eq!(stats.used_bytes, 19);
    }
}
