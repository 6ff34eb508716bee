//! Canonical CBOR encoding for history digests.
//!
//! Follows RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats
//!
//! The same history entry must produce identical bytes on every platform,
//! otherwise a persisted chain would fail verification after a reload.

use crate::digest::Digest;
use crate::history::HistoryAction;
use crate::types::{BlockHeight, ConsentKey};

/// Entry field keys (integer keys for compact encoding).
mod keys {
    pub const GRANTER: u64 = 0;
    pub const GRANTEE: u64 = 1;
    pub const CATEGORY: u64 = 2;
    pub const SEQ: u64 = 3;
    pub const AT: u64 = 4;
    pub const ACTION: u64 = 5;
    pub const DETAILS: u64 = 6;
    pub const PREV_DIGEST: u64 = 7;
}

/// The fields of a history entry that its digest commits to.
pub struct EntryFields<'a> {
    pub key: &'a ConsentKey,
    pub seq: u64,
    pub at: BlockHeight,
    pub action: HistoryAction,
    pub details: &'a str,
    pub prev_digest: &'a Digest,
}

/// The value shapes a history entry is made of.
#[derive(Debug, Clone, Copy)]
enum Field<'a> {
    Uint(u64),
    Text(&'a str),
    Bytes(&'a [u8]),
}

/// Encode a history entry to canonical CBOR bytes.
pub fn canonical_entry_bytes(fields: &EntryFields<'_>) -> Vec<u8> {
    let mut entries = [
        (keys::GRANTER, Field::Text(fields.key.granter.as_str())),
        (keys::GRANTEE, Field::Text(fields.key.grantee.as_str())),
        (keys::CATEGORY, Field::Text(fields.key.category.as_str())),
        (keys::SEQ, Field::Uint(fields.seq)),
        (keys::AT, Field::Uint(fields.at)),
        (keys::ACTION, Field::Uint(u64::from(fields.action.code()))),
        (keys::DETAILS, Field::Text(fields.details)),
        (keys::PREV_DIGEST, Field::Bytes(&fields.prev_digest.0)),
    ];
    let mut buf = Vec::new();
    encode_map_canonical(&mut buf, &mut entries);
    buf
}

fn encode_field(buf: &mut Vec<u8>, field: Field<'_>) {
    match field {
        Field::Uint(n) => encode_uint(buf, 0, n),
        Field::Text(s) => encode_text(buf, s),
        Field::Bytes(b) => encode_bytes(buf, b),
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode a map with unsigned keys (major type 5).
///
/// For unsigned keys numeric order is encoded byte order.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &mut [(u64, Field<'_>)]) {
    entries.sort_by_key(|(k, _)| *k);
    encode_uint(buf, 5, entries.len() as u64);
    for (key, value) in entries.iter() {
        encode_uint(buf, 0, *key);
        encode_field(buf, *value);
    }
}
