//! Tri-modal response buffer: `Stack → Heap → Mbuf`, promoted on demand as a
//! response grows (spec.md §3/§9, grounded on `contextMakeRoomForResp` in
//! `dnspacket.c`).
//!
//! Most answers fit in a small fixed-size inline buffer with no allocation
//! at all. A response that outgrows it is copied once into a heap buffer
//! that doubles as needed. A response built directly against a chain of
//! fixed-size segments (the `Mbuf` mode, standing in for the original's
//! DPDK mbuf chain when a caller wants bounded per-segment allocation
//! rather than one big contiguous buffer) grows by appending a new segment
//! instead of reallocating.

use thiserror::Error;

/// Inline capacity before promotion to a heap allocation. Sized to cover
/// the overwhelming majority of authoritative answers (a handful of A/AAAA
/// records plus the question and OPT) without allocating.
pub const STACK_CAPACITY: usize = 512;

/// Fixed tailroom per segment in `Mbuf` mode.
const MBUF_SEGMENT_CAPACITY: usize = 2048;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    #[error("response exceeds maximum size {0}")]
    TooLarge(usize),
}

enum Storage {
    Stack([u8; STACK_CAPACITY]),
    Heap(Vec<u8>),
    Mbuf(Vec<Vec<u8>>),
}

/// A growable, append-only response buffer. `len()` is the total number of
/// bytes written so far across all modes.
pub struct ResponseBuffer {
    storage: Storage,
    len: usize,
    max_size: usize,
}

impl ResponseBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            storage: Storage::Stack([0u8; STACK_CAPACITY]),
            len: 0,
            max_size,
        }
    }

    /// Build directly in `Mbuf` mode (used by the admin `ZONE GETALL` path
    /// and any other producer that wants bounded per-allocation size
    /// rather than one large contiguous buffer).
    pub fn new_mbuf(max_size: usize) -> Self {
        Self {
            storage: Storage::Mbuf(vec![Vec::with_capacity(MBUF_SEGMENT_CAPACITY)]),
            len: 0,
            max_size,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Ensure at least `additional` more bytes can be written without a
    /// further promotion, growing/promoting storage as needed. Mirrors
    /// `contextMakeRoomForResp`'s doubling-realloc for Stack/Heap and
    /// new-segment-on-overflow for Mbuf.
    pub fn make_room(&mut self, additional: usize) -> Result<(), BufferError> {
        let needed = self.len + additional;
        if needed > self.max_size {
            return Err(BufferError::TooLarge(needed));
        }
        match &mut self.storage {
            Storage::Stack(stack) => {
                if needed <= stack.len() {
                    return Ok(());
                }
                let mut heap = Vec::with_capacity((needed * 2).min(self.max_size).max(needed));
                heap.extend_from_slice(&stack[..self.len]);
                self.storage = Storage::Heap(heap);
                Ok(())
            }
            Storage::Heap(heap) => {
                if needed <= heap.capacity() {
                    return Ok(());
                }
                let new_cap = (needed * 2).min(self.max_size).max(needed);
                heap.reserve(new_cap - heap.len());
                Ok(())
            }
            Storage::Mbuf(segments) => {
                let last = segments.last_mut().expect("mbuf chain always has a segment");
                if last.len() + additional <= last.capacity() {
                    return Ok(());
                }
                if additional > MBUF_SEGMENT_CAPACITY {
                    return Err(BufferError::TooLarge(needed));
                }
                segments.push(Vec::with_capacity(MBUF_SEGMENT_CAPACITY));
                Ok(())
            }
        }
    }

    /// Append `bytes`, promoting storage first if necessary.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        self.make_room(bytes.len())?;
        match &mut self.storage {
            Storage::Stack(stack) => {
                stack[self.len..self.len + bytes.len()].copy_from_slice(bytes);
            }
            Storage::Heap(heap) => heap.extend_from_slice(bytes),
            Storage::Mbuf(segments) => {
                segments.last_mut().expect("mbuf chain always has a segment").extend_from_slice(bytes);
            }
        }
        self.len += bytes.len();
        Ok(())
    }

    /// Overwrite previously-written bytes at `offset` (used for rdlength
    /// backfill during record encoding). `offset + data.len()` must already
    /// have been written.
    pub fn patch(&mut self, offset: usize, data: &[u8]) {
        assert!(offset + data.len() <= self.len, "patch range out of bounds");
        match &mut self.storage {
            Storage::Stack(stack) => stack[offset..offset + data.len()].copy_from_slice(data),
            Storage::Heap(heap) => heap[offset..offset + data.len()].copy_from_slice(data),
            Storage::Mbuf(segments) => {
                let mut remaining = offset;
                for seg in segments.iter_mut() {
                    if remaining < seg.len() {
                        let n = data.len().min(seg.len() - remaining);
                        seg[remaining..remaining + n].copy_from_slice(&data[..n]);
                        if n < data.len() {
                            // patch spans a segment boundary; this never happens for the
                            // 2-byte rdlength fields this buffer backfills, since callers
                            // keep those fields within one segment by construction.
                            unreachable!("patch spanning mbuf segments is unsupported");
                        }
                        return;
                    }
                    remaining -= seg.len();
                }
            }
        }
    }

    /// A contiguous view of everything written so far. Allocates only in
    /// `Mbuf` mode, where the segments genuinely aren't contiguous.
    pub fn as_contiguous(&self) -> std::borrow::Cow<'_, [u8]> {
        match &self.storage {
            Storage::Stack(stack) => std::borrow::Cow::Borrowed(&stack[..self.len]),
            Storage::Heap(heap) => std::borrow::Cow::Borrowed(heap),
            Storage::Mbuf(segments) => {
                let mut out = Vec::with_capacity(self.len);
                for seg in segments {
                    out.extend_from_slice(seg);
                }
                std::borrow::Cow::Owned(out)
            }
        }
    }

    /// Truncate to `new_len` and set the TC bit's caller-visible flag by
    /// returning whether truncation happened (RFC 1035 §4.1.1, used by
    /// UDP responses that exceed the negotiated payload size).
    pub fn truncate(&mut self, new_len: usize) -> bool {
        if new_len >= self.len {
            return false;
        }
        match &mut self.storage {
            Storage::Stack(_) => {}
            Storage::Heap(heap) => heap.truncate(new_len),
            Storage::Mbuf(segments) => {
                let mut remaining = new_len;
                let mut keep = Vec::new();
                for mut seg in segments.drain(..) {
                    if remaining >= seg.len() {
                        remaining -= seg.len();
                        keep.push(seg);
                    } else {
                        seg.truncate(remaining);
                        keep.push(seg);
                        break;
                    }
                }
                if keep.is_empty() {
                    keep.push(Vec::with_capacity(MBUF_SEGMENT_CAPACITY));
                }
                *segments = keep;
            }
        }
        self.len = new_len;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_write_stays_on_stack() {
        let mut buf = ResponseBuffer::new(65535);
        buf.write(b"hello").unwrap();
        assert_eq!(buf.len(), 5);
        assert!(matches!(buf.storage, Storage::Stack(_)));
    }

    #[test]
    fn overflow_promotes_to_heap() {
        let mut buf = ResponseBuffer::new(65535);
        let chunk = vec![0xABu8; STACK_CAPACITY];
        buf.write(&chunk).unwrap();
        buf.write(&[1, 2, 3]).unwrap();
        assert!(matches!(buf.storage, Storage::Heap(_)));
        assert_eq!(buf.as_contiguous()[STACK_CAPACITY..], [1, 2, 3]);
    }

    #[test]
    fn rejects_writes_past_max_size() {
        let mut buf = ResponseBuffer::new(10);
        assert!(buf.write(&[0u8; 20]).is_err());
    }

    #[test]
    fn patch_backfills_rdlength_style_fields() {
        let mut buf = ResponseBuffer::new(65535);
        buf.write(&[0, 0, 9, 9, 9]).unwrap();
        buf.patch(0, &2u16.to_be_bytes());
        assert_eq!(&buf.as_contiguous()[0..2], &[0, 2]);
    }

    #[test]
    fn mbuf_mode_chains_segments_on_overflow() {
        let mut buf = ResponseBuffer::new_mbuf(1 << 20);
        let chunk = vec![0x11u8; MBUF_SEGMENT_CAPACITY];
        buf.write(&chunk).unwrap();
        buf.write(&[9, 9]).unwrap();
        match &buf.storage {
            Storage::Mbuf(segs) => assert_eq!(segs.len(), 2),
            _ => panic!("expected mbuf storage"),
        }
    }

    #[test]
    fn truncate_shrinks_len() {
        let mut buf = ResponseBuffer::new(65535);
        buf.write(b"0123456789").unwrap();
        assert!(buf.truncate(4));
        assert_eq!(buf.len(), 4);
        assert_eq!(&*buf.as_contiguous(), b"0123");
    }
}
