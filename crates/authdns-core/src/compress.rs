//! Name compression engine: a bounded dictionary of previously-emitted
//! names and the label-aligned suffix match used to turn a new name into
//! a (possibly empty) literal prefix plus a compression pointer
//! (RFC 1035 §4.1.4), grounded on `getCommonSuffixOffset`/
//! `dumpCompressedName` in `dnspacket.c`.
//!
//! [`CompressionDict::best_match`] preserves a threshold bug from the
//! original rather than fixing it: a candidate is only ever considered
//! if its resulting literal prefix is under 256 bytes — `best_offset2`
//! in `dumpCompressedName` starts at the sentinel 256 and a candidate
//! must beat it to ever be selected, so any match whose prefix lands at
//! or past byte 256 is invisible to the comparison, not merely
//! deprioritized. This under-compresses responses whose best match would
//! otherwise require a long literal prefix, which is common once a
//! message carries more than a few records. See spec.md §9 design notes.

pub const CPS_INFO_SIZE: usize = 16;
pub const MAX_POINTER_OFFSET: u16 = 0x3FFF;
const PREFIX_LEN_THRESHOLD: usize = 256;

struct DictEntry {
    name: Vec<u8>,
    offset: u16,
    /// How many leading bytes of `name` were actually written literally
    /// when this entry was recorded; a match landing past this point
    /// would point into bytes that are themselves a compression pointer,
    /// not real name data (`getCommonSuffixOffset`'s `uncompress_len`).
    uncompress_len: usize,
}

/// One name dictionary per response being encoded.
pub struct CompressionDict {
    entries: Vec<DictEntry>,
}

impl CompressionDict {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Record that `name` (len-label, uncompressed) was just written
    /// starting at `offset` in the message, with `uncompress_len` of it
    /// written out literally (the rest, if any, was a compression
    /// pointer). Once [`CPS_INFO_SIZE`] entries have been recorded,
    /// further calls are no-ops rather than evicting anything (spec.md
    /// §4.4 "exceeding the bound mid-response yields a valid (possibly
    /// less compressed) response" — not an LRU cache); names that start
    /// past the pointer's 14-bit range, or that were written as a bare
    /// pointer with no literal bytes at all, are never worth remembering
    /// either (an exact match already covers the latter case).
    pub fn remember(&mut self, name: &[u8], offset: u16, uncompress_len: usize) {
        if uncompress_len == 0 || offset > MAX_POINTER_OFFSET || self.entries.len() >= CPS_INFO_SIZE {
            return;
        }
        self.entries.push(DictEntry {
            name: name.to_vec(),
            offset,
            uncompress_len,
        });
    }

    /// Find the best way to compress `name` against everything remembered
    /// so far. Returns `(prefix_len, pointer_offset)`: emit `name[..prefix_len]`
    /// literally, then a 2-byte pointer to `pointer_offset`. `prefix_len == 0`
    /// means the whole name is already present in the message. `None` means
    /// no suffix match was found at all — emit `name` in full.
    pub fn best_match(&self, name: &[u8]) -> Option<(usize, u16)> {
        let mut best: Option<(usize, u16)> = None;

        for entry in &self.entries {
            let Some(match_len) = label_aligned_suffix_match(name, &entry.name) else {
                continue;
            };
            let offset_in_old = entry.name.len() - match_len;
            if offset_in_old > entry.uncompress_len {
                continue;
            }
            let prefix_len = name.len() - match_len;
            if prefix_len >= PREFIX_LEN_THRESHOLD {
                continue;
            }
            let pointer = entry.offset + offset_in_old as u16;
            if pointer > MAX_POINTER_OFFSET {
                continue;
            }
            let better = match best {
                Some((best_prefix, _)) => prefix_len < best_prefix,
                None => true,
            };
            if better {
                best = Some((prefix_len, pointer));
            }
        }

        best
    }
}

impl Default for CompressionDict {
    fn default() -> Self {
        Self::new()
    }
}

/// Offsets of every label start in a len-label name, including the
/// terminating zero byte's position as the final entry.
fn label_offsets(name: &[u8]) -> Vec<usize> {
    let mut offs = vec![0usize];
    let mut pos = 0;
    while pos < name.len() && name[pos] != 0 {
        pos += name[pos] as usize + 1;
        offs.push(pos);
    }
    offs
}

/// Longest common suffix between `name` and `other`, aligned to label
/// boundaries in both. Returns `None` if nothing beyond the bare
/// terminator matches (a match of just the root name is not useful).
fn label_aligned_suffix_match(name: &[u8], other: &[u8]) -> Option<usize> {
    let name_starts = label_offsets(name);
    let other_starts = label_offsets(other);
    let mut best = 0usize;
    for (&ns, &os) in name_starts.iter().rev().zip(other_starts.iter().rev()) {
        if name[ns..] == other[os..] {
            best = name.len() - ns;
        } else {
            break;
        }
    }
    if best > 1 {
        Some(best)
    } else {
        None
    }
}
