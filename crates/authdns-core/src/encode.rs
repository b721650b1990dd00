//! Response encoding: name-compressed answer/authority/additional sections,
//! the per-core RRSet round-robin, and EDNS0 OPT echo (spec.md §4.4/§5,
//! grounded on `RRSetCompressPack`/`dumpDnsResp`/`dumpDnsError`/
//! `encodeOptRR` in `dnspacket.c`).

use crate::buffer::ResponseBuffer;
use crate::compress::CompressionDict;
use crate::error::EncodeError;
use crate::query::{Context, Rcode, DNS_HEADER_SIZE};
use crate::records::{DnsDictValue, LabelName, RRSet, RecordType};
use crate::zone::{Zone, ZoneSet};

const CLASS_IN: u16 = 1;
const CLASS_POINTER_BIT: u16 = 0xC000;

/// Bound on additional-section glue candidates collected per response
/// (spec.md §3 `ari[AR_INFO_SIZE]`/`ari_sz`): once this many CNAME/NS/MX/SRV
/// targets have been queued for glue lookup, later ones are simply not
/// looked up rather than failing the response.
const AR_INFO_SIZE: usize = 16;

fn write_header(
    buf: &mut ResponseBuffer,
    id: u16,
    rcode: Rcode,
    aa: bool,
    rd: bool,
    qd: u16,
    an: u16,
    ns: u16,
    ar: u16,
) -> Result<(), EncodeError> {
    let mut flags: u16 = 0x8000; // QR
    if aa {
        flags |= 0x0400;
    }
    if rd {
        flags |= 0x0100;
    }
    flags |= rcode.header_bits() as u16;
    buf.write(&id.to_be_bytes())?;
    buf.write(&flags.to_be_bytes())?;
    buf.write(&qd.to_be_bytes())?;
    buf.write(&an.to_be_bytes())?;
    buf.write(&ns.to_be_bytes())?;
    buf.write(&ar.to_be_bytes())?;
    Ok(())
}

fn write_name_compressed(buf: &mut ResponseBuffer, dict: &mut CompressionDict, name: &[u8]) -> Result<(), EncodeError> {
    let name_offset = buf.len();
    let literal_len = if let Some((prefix_len, ptr)) = dict.best_match(name) {
        if prefix_len > 0 {
            buf.write(&name[..prefix_len])?;
        }
        let pointer = CLASS_POINTER_BIT | ptr;
        buf.write(&pointer.to_be_bytes())?;
        prefix_len
    } else {
        buf.write(name)?;
        name.len()
    };
    if name_offset <= u16::MAX as usize {
        dict.remember(name, name_offset as u16, literal_len);
    }
    Ok(())
}

/// Which target names written into a record's rdata need A/AAAA glue
/// records added to the additional section, if the target is in-zone.
struct GlueTarget(LabelName);

/// Write one RRSet's records (starting from the zone's current round-robin
/// offset when it has more than one record) under `owner`, applying name
/// compression to owner names and to CNAME/NS/MX rdata target names. SRV
/// targets are written uncompressed but still registered in the
/// compression dictionary for later records, and queued for glue lookup
/// alongside NS/MX/CNAME targets — matches `RRSetCompressPack`.
fn rrset_compress_pack(
    buf: &mut ResponseBuffer,
    dict: &mut CompressionDict,
    owner: &[u8],
    rrset: &RRSet,
    zone: &Zone,
    core_idx: usize,
    glue: &mut Vec<GlueTarget>,
) -> Result<u16, EncodeError> {
    let start = zone.next_rr_offset(core_idx, rrset.z_rr_idx, rrset.num());
    let mut written = 0u16;
    for i in 0..rrset.num() {
        let idx = (start + i) % rrset.num();
        write_name_compressed(buf, dict, owner)?;
        buf.write(&rrset.rtype.to_u16().to_be_bytes())?;
        buf.write(&CLASS_IN.to_be_bytes())?;
        buf.write(&rrset.ttl.to_be_bytes())?;
        let rdlen_offset = buf.len();
        buf.write(&[0u8, 0])?; // rdlength placeholder

        match rrset.rtype {
            RecordType::Cname | RecordType::Ns | RecordType::Mx => {
                let rdata = rrset.rdata_at(idx);
                let name_bytes = if rrset.rtype == RecordType::Mx {
                    buf.write(&rdata[..2])?; // preference
                    &rdata[2..]
                } else {
                    rdata
                };
                write_name_compressed(buf, dict, name_bytes)?;
                if glue.len() < AR_INFO_SIZE {
                    glue.push(GlueTarget(LabelName::from_wire(name_bytes)));
                }
            }
            RecordType::Srv => {
                let rdata = rrset.rdata_at(idx);
                buf.write(rdata)?;
                let target = &rdata[6..];
                dict.remember(target, (buf.len() - target.len()) as u16, target.len());
                if glue.len() < AR_INFO_SIZE {
                    glue.push(GlueTarget(LabelName::from_wire(target)));
                }
            }
            _ => {
                buf.write(rrset.rdata_at(idx))?;
            }
        }

        let rdlen = (buf.len() - rdlen_offset - 2) as u16;
        buf.patch(rdlen_offset, &rdlen.to_be_bytes());
        written += 1;
    }
    Ok(written)
}

pub struct EncodeOptions {
    pub max_resp_size: usize,
    /// When set, A/AAAA glue records for in-zone NS/MX/SRV/CNAME targets
    /// are omitted from the additional section (spec.md §9 minimize-resp).
    pub minimize_resp: bool,
}

/// Build a full authoritative response for `ctx`'s question, given the
/// owner's dict value (the exact-match lookup result for `ctx.question.qname`
/// relative to `zone`, already performed by the caller) and the zone's apex
/// NS RRSet. `zones` is consulted again for the CNAME-target's and any
/// glue target's own zone, which need not be `zone` itself (spec.md §4.5
/// "look up the zone owning the CNAME target (by name)" /
/// "look up its zone" for additional-section glue). `raw_query` is the
/// original message bytes, used to copy the question section byte-for-byte.
#[allow(clippy::too_many_arguments)]
pub fn dump_dns_resp(
    ctx: &Context,
    raw_query: &[u8],
    zones: &ZoneSet,
    zone: &Zone,
    owner_rel: &LabelName,
    owner_dict: Option<&DnsDictValue>,
    core_idx: usize,
    opts: &EncodeOptions,
) -> Result<Vec<u8>, EncodeError> {
    let mut buf = ResponseBuffer::new(opts.max_resp_size);
    let mut dict = CompressionDict::new();

    let question_end = ctx.qname_offset + ctx.question.qname.wire_len() + 4;

    // Section counts are backfilled once answer/authority/additional are known.
    write_header(&mut buf, ctx.header.id, Rcode::Ok, true, ctx.header.rd(), 1, 0, 0, 0)?;
    buf.write(&raw_query[ctx.qname_offset..question_end])?;
    dict.remember(
        ctx.question.qname.as_bytes(),
        DNS_HEADER_SIZE as u16,
        ctx.question.qname.wire_len(),
    );

    let mut an_count = 0u16;
    let mut ns_count = 0u16;
    let mut ar_count = 0u16;
    let mut glue: Vec<GlueTarget> = Vec::new();

    // The answer owner is always the queried name itself (that's how
    // `owner_dict` was looked up), so it's written as the question's
    // absolute name, not the zone-relative key `owner_rel` indexes
    // `entries` by. Writing it this way also lets it compress straight
    // back to the question section, which `dict` already remembers.
    let answer_owner = ctx.question.qname.as_bytes();

    // Step 3 (a CNAME at the owner) takes priority over step 4 unconditionally,
    // even when qType itself is CNAME — a CNAME can't coexist with any other
    // RRset at the same owner, so this ordering never actually competes with
    // step 4 on real zone data; it matches spec.md §4.5's literal "if/otherwise"
    // regardless.
    let Some(owner_dict) = owner_dict else {
        // The owner name itself doesn't exist in the zone at all.
        return dump_dns_error(ctx, raw_query, Rcode::NxDomain, zone.ns.is_some());
    };
    // The owner exists but doesn't carry a CNAME or the queried type: a
    // NOERROR/NoData response (zero answers, NS authority still applies),
    // not NXDOMAIN — only a genuinely absent owner is NXDOMAIN.
    let ns_zone: Option<&Zone> = if let Some(cname_rrset) = owner_dict.get(RecordType::Cname) {
        an_count += rrset_compress_pack(&mut buf, &mut dict, answer_owner, &cname_rrset, zone, core_idx, &mut glue)?;
        glue.last().and_then(|target| zones.find_for_name(&target.0))
    } else if let Some(rrset) = owner_dict.get(ctx.question.qtype) {
        an_count += rrset_compress_pack(&mut buf, &mut dict, answer_owner, &rrset, zone, core_idx, &mut glue)?;
        Some(zone)
    } else {
        Some(zone)
    };

    let owner_is_apex = owner_rel.is_root();
    let skip_duplicate_ns = ctx.question.qtype == RecordType::Ns && owner_is_apex;
    if !skip_duplicate_ns {
        if let Some(ns_zone) = ns_zone {
            if let Some(ns_rrset) = &ns_zone.ns {
                ns_count += rrset_compress_pack(&mut buf, &mut dict, ns_zone.origin.as_bytes(), ns_rrset, ns_zone, core_idx, &mut glue)?;
            }
        }
    }

    if !opts.minimize_resp {
        for target in &glue {
            if let Some(target_zone) = zones.find_for_name(&target.0) {
                if let Some(rel) = target_zone.relativize(&target.0) {
                    if let Some(dv) = target_zone.fetch(&rel) {
                        let mut scratch = Vec::new();
                        if let Some(a) = dv.get(RecordType::A) {
                            ar_count += rrset_compress_pack(&mut buf, &mut dict, target.0.as_bytes(), &a, target_zone, core_idx, &mut scratch)?;
                        }
                        if let Some(aaaa) = dv.get(RecordType::Aaaa) {
                            ar_count += rrset_compress_pack(&mut buf, &mut dict, target.0.as_bytes(), &aaaa, target_zone, core_idx, &mut scratch)?;
                        }
                    }
                }
            }
        }
    }

    if ctx.has_edns {
        ar_count += encode_opt_rr(&mut buf, ctx, Rcode::Ok)?;
    }

    let mut out = buf.as_contiguous().into_owned();
    out[6..8].copy_from_slice(&an_count.to_be_bytes());
    out[8..10].copy_from_slice(&ns_count.to_be_bytes());
    out[10..12].copy_from_slice(&ar_count.to_be_bytes());
    Ok(out)
}

/// Build a header-only error response. `AA` is set only for `NxDomain`
/// (matching `dumpDnsError`'s behavior — a `FormErr`/`NotImp`/`BadVers`
/// reply is not authoritative about anything, since the server may not
/// even have parsed the question).
pub fn dump_dns_error(ctx: &Context, raw_query: &[u8], rcode: Rcode, has_edns: bool) -> Result<Vec<u8>, EncodeError> {
    let mut buf = ResponseBuffer::new(4096);
    let aa = rcode == Rcode::NxDomain;
    write_header(&mut buf, ctx.header.id, rcode, aa, ctx.header.rd(), 1, 0, 0, 0)?;
    let question_end = ctx.qname_offset + ctx.question.qname.wire_len() + 4;
    buf.write(&raw_query[ctx.qname_offset..question_end])?;

    let mut ar_count = 0u16;
    if has_edns {
        ar_count += encode_opt_rr(&mut buf, ctx, rcode)?;
    }
    let mut out = buf.as_contiguous().into_owned();
    out[10..12].copy_from_slice(&ar_count.to_be_bytes());
    Ok(out)
}

/// Echo the OPT pseudo-record back into the response. When the query
/// carried a Client-Subnet option, its exact bytes (header + payload,
/// `scope` field unchanged) are echoed in rdata; otherwise rdlength is
/// rewritten to 0 (spec.md §4.3 "If no ECS was found, rewrite the echoed
/// OPT's rdlength to 0").
fn encode_opt_rr(buf: &mut ResponseBuffer, ctx: &Context, rcode: Rcode) -> Result<u16, EncodeError> {
    buf.write(&[0])?; // root name
    buf.write(&crate::query::DNS_TYPE_OPT.to_be_bytes())?;
    buf.write(&ctx.edns_udp_size.to_be_bytes())?;
    buf.write(&[rcode.opt_extended(), 0])?; // extended rcode, version
    buf.write(&0u16.to_be_bytes())?; // flags
    buf.write(&(ctx.ecs_option.len() as u16).to_be_bytes())?;
    if !ctx.ecs_option.is_empty() {
        buf.write(&ctx.ecs_option)?;
    }
    Ok(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::decode_query;
    use crate::records::RData;
    use std::net::Ipv4Addr;

    fn encode_name(name: &str) -> Vec<u8> {
        let mut v = Vec::new();
        for label in name.split('.') {
            v.push(label.len() as u8);
            v.extend_from_slice(label.as_bytes());
        }
        v.push(0);
        v
    }

    fn build_query(qname: &[u8], qtype: u16) -> Vec<u8> {
        let mut buf = vec![0u8; 12];
        buf[2] = 0x01;
        buf[4..6].copy_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(qname);
        buf.extend_from_slice(&qtype.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf
    }

    fn build_query_with_ecs(qname: &[u8], qtype: u16, ecs_payload: &[u8]) -> Vec<u8> {
        let mut buf = build_query(qname, qtype);
        buf[10..12].copy_from_slice(&1u16.to_be_bytes()); // ARCOUNT=1
        buf.push(0); // root name
        buf.extend_from_slice(&crate::query::DNS_TYPE_OPT.to_be_bytes());
        buf.extend_from_slice(&4096u16.to_be_bytes());
        buf.push(0); // extended rcode
        buf.push(0); // version
        buf.extend_from_slice(&0u16.to_be_bytes()); // flags
        let opt_len = 4 + ecs_payload.len();
        buf.extend_from_slice(&(opt_len as u16).to_be_bytes());
        buf.extend_from_slice(&8u16.to_be_bytes()); // option code: CLIENT-SUBNET
        buf.extend_from_slice(&(ecs_payload.len() as u16).to_be_bytes());
        buf.extend_from_slice(ecs_payload);
        buf
    }

    #[test]
    fn encodes_a_answer_for_existing_owner() {
        let origin = LabelName::from_dotted("example.com");
        let mut zone = Zone::new(origin.clone(), 1, 0);
        let www = zone.relativize(&LabelName::from_dotted("www.example.com")).unwrap();
        zone.insert(www.clone(), RecordType::A, 300, vec![RData::A(Ipv4Addr::new(1, 2, 3, 4))]);
        let mut zones = ZoneSet::new();
        zones.add(zone);
        let zone = zones.get(&origin).unwrap();

        let qname = encode_name("www.example.com");
        let raw = build_query(&qname, 1);
        let ctx = decode_query(&raw, 512, 4096).unwrap();
        let dv = zone.fetch(&www).cloned();
        let opts = EncodeOptions { max_resp_size: 65535, minimize_resp: false };
        let resp = dump_dns_resp(&ctx, &raw, &zones, zone, &www, dv.as_ref(), 0, &opts).unwrap();

        assert_eq!(u16::from_be_bytes([resp[6], resp[7]]), 1); // ANCOUNT
        assert_eq!(resp[2] & 0x80, 0x80); // QR set
    }

    /// Owner exists (it has an A record) but not the queried type (AAAA):
    /// a NOERROR/NoData response, not NXDOMAIN.
    #[test]
    fn noerror_nodata_when_owner_exists_without_queried_type() {
        let origin = LabelName::from_dotted("example.com");
        let mut zone = Zone::new(origin.clone(), 1, 0);
        let www = zone.relativize(&LabelName::from_dotted("www.example.com")).unwrap();
        zone.insert(www.clone(), RecordType::A, 300, vec![RData::A(Ipv4Addr::new(1, 2, 3, 4))]);
        let mut zones = ZoneSet::new();
        zones.add(zone);
        let zone = zones.get(&origin).unwrap();

        let qname = encode_name("www.example.com");
        let raw = build_query(&qname, 28); // AAAA
        let ctx = decode_query(&raw, 512, 4096).unwrap();
        let dv = zone.fetch(&www).cloned();
        let opts = EncodeOptions { max_resp_size: 65535, minimize_resp: false };
        let resp = dump_dns_resp(&ctx, &raw, &zones, zone, &www, dv.as_ref(), 0, &opts).unwrap();

        assert_eq!(resp[3] & 0x0F, 0); // NOERROR, not NXDOMAIN
        assert_eq!(u16::from_be_bytes([resp[6], resp[7]]), 0); // ANCOUNT
        assert_eq!(resp[2] & 0x04, 0x04); // AA still set
    }

    #[test]
    fn nxdomain_when_owner_missing() {
        let origin = LabelName::from_dotted("example.com");
        let zone = Zone::new(origin.clone(), 1, 0);
        let rel = zone.relativize(&LabelName::from_dotted("ghost.example.com")).unwrap();
        let mut zones = ZoneSet::new();
        zones.add(zone);
        let zone = zones.get(&origin).unwrap();

        let qname = encode_name("ghost.example.com");
        let raw = build_query(&qname, 1);
        let ctx = decode_query(&raw, 512, 4096).unwrap();
        let opts = EncodeOptions { max_resp_size: 65535, minimize_resp: false };
        let resp = dump_dns_resp(&ctx, &raw, &zones, zone, &rel, None, 0, &opts).unwrap();
        assert_eq!(resp[3] & 0x0F, 3); // NXDOMAIN
        assert_eq!(resp[2] & 0x04, 0x04); // AA set
    }

    /// S3: a query with EDNS and a Client-Subnet option gets the identical
    /// ECS option bytes echoed back in the response's OPT record, with
    /// `scope` unchanged.
    #[test]
    fn echoes_client_subnet_option_verbatim() {
        let origin = LabelName::from_dotted("example.com");
        let mut zone = Zone::new(origin.clone(), 1, 0);
        let www = zone.relativize(&LabelName::from_dotted("www.example.com")).unwrap();
        zone.insert(www.clone(), RecordType::A, 60, vec![RData::A(Ipv4Addr::new(1, 2, 3, 4))]);
        let mut zones = ZoneSet::new();
        zones.add(zone);
        let zone = zones.get(&origin).unwrap();

        let qname = encode_name("www.example.com");
        // family=1 (IPv4), source_prefix=24, scope=0, addr=1.2.3.0
        let ecs_payload = [0, 1, 24, 0, 1, 2, 3];
        let raw = build_query_with_ecs(&qname, 1, &ecs_payload);
        let ctx = decode_query(&raw, 512, 4096).unwrap();
        assert!(ctx.has_edns);
        assert!(ctx.client_subnet.is_some());

        let dv = zone.fetch(&www).cloned();
        let opts = EncodeOptions { max_resp_size: 65535, minimize_resp: false };
        let resp = dump_dns_resp(&ctx, &raw, &zones, zone, &www, dv.as_ref(), 0, &opts).unwrap();

        // ARCOUNT should include the echoed OPT record.
        assert_eq!(u16::from_be_bytes([resp[10], resp[11]]), 1);
        // The OPT record's rdata is the last `4 + ecs_payload.len()` bytes
        // of the message: 2-byte option code, 2-byte option length, payload.
        let opt_rdata_len = 4 + ecs_payload.len();
        let tail = &resp[resp.len() - opt_rdata_len..];
        assert_eq!(u16::from_be_bytes([tail[0], tail[1]]), 8); // CLIENT-SUBNET code
        assert_eq!(u16::from_be_bytes([tail[2], tail[3]]), ecs_payload.len() as u16);
        assert_eq!(&tail[4..], &ecs_payload[..]);
        // scope byte (4th byte of the ECS payload) is unchanged.
        assert_eq!(tail[4 + 3], 0);
    }
}
