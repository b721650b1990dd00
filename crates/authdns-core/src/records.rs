//! Zone data model: record types, RRSets, and the len-label owner name type
//! records and the compression engine both key off of.
//!
//! `RRSet` storage follows spec.md §3 exactly: rdata for every record in the
//! set is concatenated into one opaque byte blob (`data`), each record's
//! rdata prefixed by its own 2-byte length, with `offsets` indexing the start
//! of each record (the length prefix) within `data`. This is what lets
//! `encode::rrset_compress_pack` iterate records without per-record
//! allocation.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use crate::wire::{check_len_label, len_label_len};

/// Resource record types this server answers authoritatively for
/// (spec.md §6). `Opt` (41) is recognized during query decode only — it is
/// never stored in a zone or returned as an answer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    Ns,
    Cname,
    Soa,
    Ptr,
    Mx,
    Txt,
    Aaaa,
    Srv,
    Opt,
    Unknown(u16),
}

impl RecordType {
    pub fn from_u16(v: u16) -> Self {
        match v {
            1 => Self::A,
            2 => Self::Ns,
            5 => Self::Cname,
            6 => Self::Soa,
            12 => Self::Ptr,
            15 => Self::Mx,
            16 => Self::Txt,
            28 => Self::Aaaa,
            33 => Self::Srv,
            41 => Self::Opt,
            other => Self::Unknown(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            Self::A => 1,
            Self::Ns => 2,
            Self::Cname => 5,
            Self::Soa => 6,
            Self::Ptr => 12,
            Self::Mx => 15,
            Self::Txt => 16,
            Self::Aaaa => 28,
            Self::Srv => 33,
            Self::Opt => 41,
            Self::Unknown(v) => v,
        }
    }

    /// `isSupportDnsType`: the exact set of types the data plane will
    /// serve an answer for. OPT is excluded — it is a pseudo-RR, not a
    /// queryable type.
    pub fn is_supported_qtype(self) -> bool {
        matches!(
            self,
            Self::A
                | Self::Ns
                | Self::Cname
                | Self::Soa
                | Self::Ptr
                | Self::Mx
                | Self::Txt
                | Self::Aaaa
                | Self::Srv
        )
    }

    /// `strToDNSType`
    pub fn from_str_ci(s: &str) -> Option<Self> {
        let ty = match s.to_ascii_uppercase().as_str() {
            "A" => Self::A,
            "AAAA" => Self::Aaaa,
            "NS" => Self::Ns,
            "CNAME" => Self::Cname,
            "MX" => Self::Mx,
            "SOA" => Self::Soa,
            "TXT" => Self::Txt,
            "SRV" => Self::Srv,
            "PTR" => Self::Ptr,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::A => "A",
            Self::Ns => "NS",
            Self::Cname => "CNAME",
            Self::Soa => "SOA",
            Self::Ptr => "PTR",
            Self::Mx => "MX",
            Self::Txt => "TXT",
            Self::Aaaa => "AAAA",
            Self::Srv => "SRV",
            Self::Opt => "OPT",
            Self::Unknown(_) => "unsupported",
        };
        f.write_str(s)
    }
}

pub const DNS_CLASS_IN: u16 = 1;

/// An owner or rdata-embedded domain name, stored in len-label wire form
/// (spec.md §3 "Name (len-label form)"). Keeping zone data in this form
/// means the compression engine in `compress.rs` can suffix-match directly
/// against zone bytes with no decode/re-encode round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabelName(Box<[u8]>);

impl LabelName {
    /// Build from an already-validated len-label byte sequence.
    pub fn from_wire(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }

    /// Encode a dotted name (`"www.example.com."` or `"www.example.com"`,
    /// trailing dot optional) into len-label wire form.
    pub fn from_dotted(name: &str) -> Self {
        let trimmed = name.trim_end_matches('.');
        let mut buf = Vec::with_capacity(trimmed.len() + 2);
        if !trimmed.is_empty() {
            for label in trimmed.split('.') {
                buf.push(label.len() as u8);
                buf.extend_from_slice(label.as_bytes());
            }
        }
        buf.push(0);
        Self(buf.into())
    }

    /// The root/apex-relative empty name: a single zero byte.
    pub fn root() -> Self {
        Self(vec![0].into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length excluding the terminating zero byte (the original's
    /// `lenlabellen`).
    pub fn label_len(&self) -> usize {
        len_label_len(&self.0)
    }

    /// Total wire length including the terminator.
    pub fn wire_len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.len() == 1 && self.0[0] == 0
    }

    /// Render back to dotted-label text for admin output and logging.
    pub fn to_dotted(&self) -> String {
        if self.is_root() {
            return ".".to_string();
        }
        let mut out = String::with_capacity(self.0.len());
        let mut pos = 0;
        while pos < self.0.len() && self.0[pos] != 0 {
            let len = self.0[pos] as usize;
            if !out.is_empty() {
                out.push('.');
            }
            out.push_str(&String::from_utf8_lossy(&self.0[pos + 1..pos + 1 + len]));
            pos += len + 1;
        }
        out.push('.');
        out
    }

    /// Validate and wrap a len-label name taken from a query buffer.
    pub fn validate(bytes: &[u8]) -> Result<Self, crate::wire::WireError> {
        let n = check_len_label(bytes, 0)?;
        Ok(Self(bytes[..n].into()))
    }
}

impl fmt::Display for LabelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_dotted())
    }
}

/// Rdata for one record, in the form used to build an [`RRSet`]. Names
/// embedded here are stored uncompressed (as they live in the zone);
/// compression only happens when a record is written into a response.
#[derive(Debug, Clone)]
pub enum RData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ns(LabelName),
    Cname(LabelName),
    Ptr(LabelName),
    Mx { preference: u16, exchange: LabelName },
    Txt(Vec<u8>),
    Soa {
        mname: LabelName,
        rname: LabelName,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: LabelName,
    },
}

impl RData {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            RData::A(ip) => buf.extend_from_slice(&ip.octets()),
            RData::Aaaa(ip) => buf.extend_from_slice(&ip.octets()),
            RData::Ns(n) | RData::Cname(n) | RData::Ptr(n) => buf.extend_from_slice(n.as_bytes()),
            RData::Mx { preference, exchange } => {
                buf.extend_from_slice(&preference.to_be_bytes());
                buf.extend_from_slice(exchange.as_bytes());
            }
            RData::Txt(chars) => buf.extend_from_slice(chars),
            RData::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                buf.extend_from_slice(mname.as_bytes());
                buf.extend_from_slice(rname.as_bytes());
                buf.extend_from_slice(&serial.to_be_bytes());
                buf.extend_from_slice(&refresh.to_be_bytes());
                buf.extend_from_slice(&retry.to_be_bytes());
                buf.extend_from_slice(&expire.to_be_bytes());
                buf.extend_from_slice(&minimum.to_be_bytes());
            }
            RData::Srv {
                priority,
                weight,
                port,
                target,
            } => {
                buf.extend_from_slice(&priority.to_be_bytes());
                buf.extend_from_slice(&weight.to_be_bytes());
                buf.extend_from_slice(&port.to_be_bytes());
                buf.extend_from_slice(target.as_bytes());
            }
        }
    }

    pub fn rtype(&self) -> RecordType {
        match self {
            RData::A(_) => RecordType::A,
            RData::Aaaa(_) => RecordType::Aaaa,
            RData::Ns(_) => RecordType::Ns,
            RData::Cname(_) => RecordType::Cname,
            RData::Ptr(_) => RecordType::Ptr,
            RData::Mx { .. } => RecordType::Mx,
            RData::Txt(_) => RecordType::Txt,
            RData::Soa { .. } => RecordType::Soa,
            RData::Srv { .. } => RecordType::Srv,
        }
    }
}

/// An ordered set of records of one type under one owner, sharing a TTL
/// (spec.md §3). `z_rr_idx` identifies this RRSet's slot in the enclosing
/// zone's per-core round-robin table (`Zone::rr_offset_array`) and is only
/// meaningful when `num() > 1`.
#[derive(Debug, Clone)]
pub struct RRSet {
    pub rtype: RecordType,
    pub ttl: u32,
    data: Vec<u8>,
    offsets: Vec<usize>,
    pub z_rr_idx: u16,
}

impl RRSet {
    pub fn build(rtype: RecordType, ttl: u32, records: Vec<RData>, z_rr_idx: u16) -> Self {
        let mut data = Vec::new();
        let mut offsets = Vec::with_capacity(records.len());
        for rec in &records {
            let start = data.len();
            offsets.push(start);
            data.extend_from_slice(&[0, 0]); // rdlength placeholder
            rec.encode_into(&mut data);
            let rdlen = (data.len() - start - 2) as u16;
            data[start..start + 2].copy_from_slice(&rdlen.to_be_bytes());
        }
        Self {
            rtype,
            ttl,
            data,
            offsets,
            z_rr_idx,
        }
    }

    pub fn num(&self) -> usize {
        self.offsets.len()
    }

    /// The 2-byte-length-prefixed record segment at `idx` (length prefix
    /// included) — what spec.md calls `rs.data + rs.offsets[idx]`.
    pub fn record_at(&self, idx: usize) -> &[u8] {
        let start = self.offsets[idx];
        let rdlength = u16::from_be_bytes([self.data[start], self.data[start + 1]]) as usize;
        &self.data[start..start + 2 + rdlength]
    }

    pub fn rdlength_at(&self, idx: usize) -> u16 {
        let start = self.offsets[idx];
        u16::from_be_bytes([self.data[start], self.data[start + 1]])
    }

    /// Just the rdata bytes (no length prefix) at `idx`.
    pub fn rdata_at(&self, idx: usize) -> &[u8] {
        let seg = self.record_at(idx);
        &seg[2..]
    }
}

/// Fixed-slot container indexed by DNS type, returning the RRSet for that
/// type or absent (spec.md §3 `DnsDictValue`).
#[derive(Debug, Clone, Default)]
pub struct DnsDictValue {
    slots: [Option<Arc<RRSet>>; DnsDictValue::NUM_SLOTS],
}

impl DnsDictValue {
    const NUM_SLOTS: usize = 9;

    fn slot(rtype: RecordType) -> Option<usize> {
        Some(match rtype {
            RecordType::A => 0,
            RecordType::Ns => 1,
            RecordType::Cname => 2,
            RecordType::Soa => 3,
            RecordType::Ptr => 4,
            RecordType::Mx => 5,
            RecordType::Txt => 6,
            RecordType::Aaaa => 7,
            RecordType::Srv => 8,
            RecordType::Opt | RecordType::Unknown(_) => return None,
        })
    }

    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, rrset: RRSet) {
        self.insert_arc(Arc::new(rrset));
    }

    pub fn insert_arc(&mut self, rrset: Arc<RRSet>) {
        if let Some(i) = Self::slot(rrset.rtype) {
            self.slots[i] = Some(rrset);
        }
    }

    pub fn get(&self, rtype: RecordType) -> Option<Arc<RRSet>> {
        Self::slot(rtype).and_then(|i| self.slots[i].clone())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RRSet>> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }
}
