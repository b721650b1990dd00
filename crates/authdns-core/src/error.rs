//! Per-query error taxonomy (spec.md §7). These never unwind past the
//! worker loop in `server.rs` — decode/encode/admin failures are always
//! turned into either a dropped packet, an RFC 1035 error response, or a
//! textual admin reply, never a panic or process exit.

use thiserror::Error;

use crate::wire::WireError;

/// Outcome of [`crate::query::decode_query`] beyond a clean parse.
/// `Ignore` means "no response at all" (the original silently drops
/// truncated/garbage input rather than spending cycles building an error
/// reply for something that might not even be a DNS packet).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("packet too short to contain a header and question")]
    Truncated,
    #[error("malformed name")]
    Name(#[from] WireError),
    #[error("message has the QR bit set (not a query)")]
    NotAQuery,
    #[error("question count is not exactly 1")]
    BadQuestionCount,
    #[error("query carries answer or authority records")]
    UnexpectedRecords,
    #[error("unsupported query type")]
    UnsupportedType,
    #[error("malformed OPT record")]
    BadOpt,
    /// The additional record at the assumed OPT position isn't one (wrong
    /// owner name or RRTYPE) — distinct from [`DecodeError::BadOpt`], which
    /// means a record that IS an OPT record but is internally malformed.
    /// Callers treat this the same as "no EDNS attached" rather than a
    /// protocol error, since `ASSUME_FIRST_AR_IS_OPT` means this can
    /// legitimately happen for non-malicious traffic.
    #[error("additional record is not an OPT record")]
    NotOpt,
    #[error("unsupported EDNS version")]
    BadEdnsVersion,
}

impl DecodeError {
    /// Whether this failure should produce an RFC 1035 error response
    /// (`Some`) or be dropped with no reply at all (`None`).
    pub fn rcode(&self) -> Option<crate::query::Rcode> {
        use crate::query::Rcode;
        match self {
            // Header/question invariant failures: spec.md §7 "MalformedPacket
            // ... -> Ignore, no reply" — the packet may not even be DNS.
            DecodeError::Truncated
            | DecodeError::NotAQuery
            | DecodeError::Name(_)
            | DecodeError::BadQuestionCount
            | DecodeError::UnexpectedRecords
            | DecodeError::NotOpt => None,
            // A well-formed question but a malformed OPT/TLV: spec.md §7
            // "FormErr ... malformed OPT/TLV -> FormErr reply".
            DecodeError::BadOpt => Some(Rcode::FormErr),
            DecodeError::UnsupportedType => Some(Rcode::NotImp),
            DecodeError::BadEdnsVersion => Some(Rcode::BadVers),
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    #[error(transparent)]
    Buffer(#[from] crate::buffer::BufferError),
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Admin-channel failures (spec.md §6 admin control channel). `Io` covers
/// socket-level failures the connection state machine surfaces;
/// `Protocol` covers malformed framing or command syntax and always maps
/// to a textual error reply, never a connection drop.
#[derive(Error, Debug)]
pub enum AdminError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Protocol(String),
}
