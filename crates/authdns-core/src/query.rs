//! Query decode: header/question parsing, EDNS0 OPT and Client-Subnet
//! (RFC 7871) option parsing (spec.md §3/§4, grounded on `decodeQuery`,
//! `decodeOptRR`, `parseEdnsOptions` and `parseClientSubnet` in
//! `dnspacket.c`).
//!
//! Two behaviors here are preserved deliberately rather than "fixed",
//! per the design notes this crate's semantics were drawn from:
//!
//! - [`ASSUME_FIRST_AR_IS_OPT`]: a query's OPT pseudo-record, if present,
//!   is assumed to be the *first* additional record rather than found by
//!   scanning all additional records for type 41. A query with EDNS
//!   options sent after some other additional record is mishandled. This
//!   is gated behind a named constant/flag, not silently generalized.
//! - [`parse_client_subnet`]'s IPv6 path commits `family` and copies
//!   address bytes into the out-parameter before validating the source
//!   prefix, then returns an error without committing `source_prefix`,
//!   `scope_prefix`, or `mask_set` when the prefix is out of range. A
//!   caller that only checks the `Ok` path never observes the partial
//!   write; one that inspects `info` after an `Err` can.

use crate::error::DecodeError;
use crate::records::{LabelName, RecordType};
use crate::wire::{check_len_label, load16be};

pub const DNS_HEADER_SIZE: usize = 12;

/// Whether a query's OPT record is located by assuming it is the first
/// additional record, rather than scanned for by type. Preserves the
/// original decoder's behavior (see module docs); a deployment that needs
/// EDNS options to be found regardless of record order should flip this
/// off once a full AR scan is implemented, which this crate does not do.
pub const ASSUME_FIRST_AR_IS_OPT: bool = true;

pub const DNS_TYPE_OPT: u16 = 41;
const EDNS_OPT_CLIENT_SUBNET: u16 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rcode {
    Ok,
    FormErr,
    ServFail,
    NxDomain,
    NotImp,
    BadVers,
}

impl Rcode {
    /// Low 4 bits written into the header RCODE field.
    pub fn header_bits(self) -> u8 {
        match self {
            Rcode::Ok => 0,
            Rcode::FormErr => 1,
            Rcode::ServFail => 2,
            Rcode::NxDomain => 3,
            Rcode::NotImp => 4,
            Rcode::BadVers => 0, // BADVERS is rcode 16; low nibble is 0, high byte goes in OPT TTL
        }
    }

    /// Top 8 bits of the 12-bit extended rcode, carried in the OPT
    /// pseudo-record's TTL field (RFC 6891 §6.1.3).
    pub fn opt_extended(self) -> u8 {
        match self {
            Rcode::BadVers => 1,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DnsHeader {
    pub id: u16,
    pub flags: u16,
    pub qd_count: u16,
    pub an_count: u16,
    pub ns_count: u16,
    pub ar_count: u16,
}

impl DnsHeader {
    pub fn qr(&self) -> bool {
        self.flags & 0x8000 != 0
    }
    pub fn opcode(&self) -> u8 {
        ((self.flags >> 11) & 0x0F) as u8
    }
    pub fn rd(&self) -> bool {
        self.flags & 0x0100 != 0
    }

    pub fn parse(buf: &[u8]) -> Self {
        Self {
            id: load16be(&buf[0..2]),
            flags: load16be(&buf[2..4]),
            qd_count: load16be(&buf[4..6]),
            an_count: load16be(&buf[6..8]),
            ns_count: load16be(&buf[8..10]),
            ar_count: load16be(&buf[10..12]),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Question {
    pub qname: LabelName,
    pub qtype: RecordType,
    pub qclass: u16,
}

/// RFC 7871 Client-Subnet state, populated by [`parse_client_subnet`].
/// `mask_set` is the signal that the option was fully validated and can
/// be trusted for scope-matching — see the module docs for the case
/// where `family`/`addr` are set but `mask_set` is not.
#[derive(Debug, Clone, Default)]
pub struct ClientSubnetInfo {
    pub family: u16,
    pub source_prefix: u8,
    pub scope_prefix: u8,
    pub addr: [u8; 16],
    pub mask_set: bool,
}

#[derive(Debug, Clone)]
pub struct Context {
    pub header: DnsHeader,
    pub question: Question,
    pub has_edns: bool,
    pub edns_udp_size: u16,
    pub edns_version: u8,
    pub client_subnet: Option<ClientSubnetInfo>,
    /// Byte offset of the question's qname in the original packet, used
    /// by the compression engine to seed its dictionary with an
    /// `(offset, len)` entry for the query name before encoding answers.
    pub qname_offset: usize,
    /// The raw Client-Subnet option bytes (code, length, and payload) as
    /// received, echoed back verbatim into the response's OPT record
    /// (spec.md §4.3/§4.5 "copy the full option ... into opt_rr"). Empty
    /// when no ECS option was present, which the encoder reads as
    /// "rewrite the echoed OPT's rdlength to 0".
    pub ecs_option: Vec<u8>,
    /// Set once header and question decode cleanly but the query itself
    /// must be answered with an RFC 1035 error rather than a zone lookup
    /// (unsupported qtype, bad EDNS version, malformed OPT/TLV — spec.md
    /// §7). `None` means proceed to a normal zone lookup. Kept on `Context`
    /// rather than returned as a bare `Err` so the error encoder still has
    /// the id/question/OPT state it needs to build a conformant reply.
    pub reject: Option<Rcode>,
}

/// Parse `data[4..]` as a Client-Subnet option payload (family, prefixes,
/// address), writing into `info` in place. See the module docs for the
/// deliberately-preserved partial-commit behavior on the IPv6 path.
pub fn parse_client_subnet(data: &[u8], info: &mut ClientSubnetInfo) -> Result<(), DecodeError> {
    if data.len() < 4 {
        return Err(DecodeError::BadOpt);
    }
    let family = load16be(&data[0..2]);
    let source_prefix = data[2];
    let scope_prefix = data[3];
    // A query's scope prefix must always be 0 — it's the server that sets
    // scope on the way out, never the client on the way in.
    if scope_prefix != 0 {
        return Err(DecodeError::BadOpt);
    }
    info.family = family;

    match family {
        1 => {
            if source_prefix > 32 {
                return Err(DecodeError::BadOpt);
            }
            let addr_len = source_prefix.div_ceil(8) as usize;
            if data.len() < 4 + addr_len {
                return Err(DecodeError::BadOpt);
            }
            info.addr[..addr_len].copy_from_slice(&data[4..4 + addr_len]);
            info.source_prefix = source_prefix;
            info.scope_prefix = scope_prefix;
            info.mask_set = true;
            Ok(())
        }
        2 => {
            let addr_len = (source_prefix.div_ceil(8) as usize).min(16);
            if data.len() >= 4 + addr_len {
                info.addr[..addr_len].copy_from_slice(&data[4..4 + addr_len]);
            }
            if source_prefix > 128 {
                return Err(DecodeError::BadOpt);
            }
            info.source_prefix = source_prefix;
            info.scope_prefix = scope_prefix;
            info.mask_set = true;
            Ok(())
        }
        _ => Err(DecodeError::BadOpt),
    }
}

/// Walk an OPT record's rdata as a sequence of `(code: u16, len: u16,
/// data)` TLVs, populating `client_subnet` when a Client-Subnet option
/// (code 8) is found. Unrecognized options are skipped. Returns the
/// parsed info alongside the *raw* option bytes (header + payload) so the
/// encoder can echo it back byte-for-byte rather than re-serializing it.
/// A TLV whose declared length overruns `rdata`, or a Client-Subnet TLV
/// that fails to parse, is a malformed option (spec.md §4.3 "Malformed
/// TLV -> FormErr") rather than something to silently skip.
fn parse_edns_options(rdata: &[u8]) -> Result<Option<(ClientSubnetInfo, Vec<u8>)>, DecodeError> {
    let mut pos = 0;
    let mut found = None;
    while pos + 4 <= rdata.len() {
        let code = load16be(&rdata[pos..pos + 2]);
        let len = load16be(&rdata[pos + 2..pos + 4]) as usize;
        let val_start = pos + 4;
        if val_start + len > rdata.len() {
            return Err(DecodeError::BadOpt);
        }
        if code == EDNS_OPT_CLIENT_SUBNET {
            let mut info = ClientSubnetInfo::default();
            parse_client_subnet(&rdata[val_start..val_start + len], &mut info)?;
            found = Some((info, rdata[pos..val_start + len].to_vec()));
        }
        pos = val_start + len;
    }
    Ok(found)
}

/// Decode the additional-records section's OPT pseudo-record, if one is
/// present at `buf[offset..]`. `min_udp`/`max_udp` clamp the advertised
/// UDP payload size the way `decodeOptRR` clamps to `[512, sk.max_resp_size]`.
/// Returns [`DecodeError::NotOpt`] when the record at `offset` plainly
/// isn't an OPT record (caller treats that as "no EDNS attached"), or
/// [`DecodeError::BadOpt`]/[`DecodeError::BadEdnsVersion`] once the record
/// is confirmed to be OPT but fails validation (caller surfaces these as
/// real protocol errors).
fn decode_opt_rr(
    buf: &[u8],
    offset: usize,
    min_udp: u16,
    max_udp: u16,
) -> Result<(usize, u16, u8, Option<(ClientSubnetInfo, Vec<u8>)>), DecodeError> {
    if offset >= buf.len() || buf[offset] != 0 {
        return Err(DecodeError::NotOpt);
    }
    let mut pos = offset + 1;
    if pos + 10 > buf.len() {
        return Err(DecodeError::NotOpt);
    }
    let rtype = load16be(&buf[pos..pos + 2]);
    if rtype != DNS_TYPE_OPT {
        return Err(DecodeError::NotOpt);
    }
    let udp_size_raw = load16be(&buf[pos + 2..pos + 4]);
    let udp_size = udp_size_raw.clamp(min_udp, max_udp);
    let version = buf[pos + 5];
    let rdlength = load16be(&buf[pos + 8..pos + 10]) as usize;
    pos += 10;
    if pos + rdlength > buf.len() {
        return Err(DecodeError::BadOpt);
    }
    if version != 0 {
        return Err(DecodeError::BadEdnsVersion);
    }
    let client_subnet = parse_edns_options(&buf[pos..pos + rdlength])?;
    Ok((pos + rdlength, udp_size, version, client_subnet))
}

/// Decode a full query message: header, single question, and (if
/// present, per `ASSUME_FIRST_AR_IS_OPT`) its OPT pseudo-record.
pub fn decode_query(buf: &[u8], min_udp: u16, max_udp: u16) -> Result<Context, DecodeError> {
    if buf.len() < DNS_HEADER_SIZE + 5 {
        return Err(DecodeError::Truncated);
    }
    let header = DnsHeader::parse(buf);
    if header.qr() {
        return Err(DecodeError::NotAQuery);
    }
    if header.qd_count != 1 {
        return Err(DecodeError::BadQuestionCount);
    }
    if header.an_count != 0 || header.ns_count != 0 {
        return Err(DecodeError::UnexpectedRecords);
    }

    let qname_offset = DNS_HEADER_SIZE;
    let name_len = check_len_label(&buf[qname_offset..], 0)?;
    if qname_offset + name_len + 4 > buf.len() {
        return Err(DecodeError::Truncated);
    }
    let qname = LabelName::from_wire(&buf[qname_offset..qname_offset + name_len]);
    let qtype_pos = qname_offset + name_len;
    let qtype_raw = load16be(&buf[qtype_pos..qtype_pos + 2]);
    let qclass = load16be(&buf[qtype_pos + 2..qtype_pos + 4]);
    let qtype = RecordType::from_u16(qtype_raw);

    let mut ctx = Context {
        header,
        question: Question { qname, qtype, qclass },
        has_edns: false,
        edns_udp_size: min_udp,
        edns_version: 0,
        client_subnet: None,
        qname_offset,
        ecs_option: Vec::new(),
        reject: if qtype.is_supported_qtype() { None } else { Some(Rcode::NotImp) },
    };

    if header.ar_count > 0 && ASSUME_FIRST_AR_IS_OPT {
        let ar_offset = qtype_pos + 4;
        match decode_opt_rr(buf, ar_offset, min_udp, max_udp) {
            Ok((_, udp_size, version, client_subnet)) => {
                ctx.has_edns = true;
                ctx.edns_udp_size = udp_size;
                ctx.edns_version = version;
                if let Some((info, raw)) = client_subnet {
                    ctx.client_subnet = Some(info);
                    ctx.ecs_option = raw;
                }
            }
            Err(DecodeError::NotOpt) => {
                // The assumed-first additional record isn't an OPT record at
                // all; treated as "no EDNS" rather than a hard failure,
                // matching a client that simply didn't attach one (and
                // preserving the "assume first AR is OPT" behavior — see
                // module docs).
            }
            // A qtype rejection already decided on step 4 of decodeQuery
            // takes priority over an OPT/TLV problem found in step 5.
            Err(e) => {
                ctx.reject.get_or_insert(e.rcode().unwrap_or(Rcode::FormErr));
            }
        }
    }

    Ok(ctx)
}
