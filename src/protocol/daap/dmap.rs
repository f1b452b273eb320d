//! DMAP (Digital Media Access Protocol) decoding
//!
//! `SET_PARAMETER` with `application/x-dmap-tagged` carries one `mlit`
//! container of `[tag:4][len:4 BE][payload]` records. The container header is
//! skipped and the records are decoded flat against a fixed type table.

use std::collections::BTreeMap;
use std::fmt;

/// Size of the outer container header (`mlit` + length)
pub const CONTAINER_HEADER_SIZE: usize = 8;

const RECORD_HEADER_SIZE: usize = 8;

/// Wire type of a known tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmapType {
    U8,
    U16,
    U32,
    /// 64-bit composite (`mper` persistent id)
    U64,
    Str,
}

/// A decoded tag value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DmapValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    String(String),
}

impl DmapValue {
    /// String payload, if this is a string tag
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer payload widened to u64
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::U8(v) => Some(u64::from(v)),
            Self::U16(v) => Some(u64::from(v)),
            Self::U32(v) => Some(u64::from(v)),
            Self::U64(v) => Some(v),
            Self::String(_) => None,
        }
    }
}

impl fmt::Display for DmapValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// Flat tag -> value mapping
pub type DmapMap = BTreeMap<String, DmapValue>;

/// Type of a tag, or `None` if the tag is not in the table
#[must_use]
pub fn tag_type(tag: &[u8; 4]) -> Option<DmapType> {
    let ty = match tag {
        b"mper" => DmapType::U64,
        b"asal" | b"asar" | b"ascp" | b"asgn" | b"minm" | b"ascm" | b"asaa" => DmapType::Str,
        b"astn" | b"asdn" | b"asdc" | b"astc" | b"asyr" | b"asbr" => DmapType::U16,
        b"asdk" | b"caps" => DmapType::U8,
        b"astm" => DmapType::U32,
        _ => return None,
    };
    Some(ty)
}

/// Decode a fixed-width big-endian integer, `None` if the payload is too short
fn read_be<const N: usize>(payload: &[u8]) -> Option<[u8; N]> {
    payload.get(..N)?.try_into().ok()
}

fn decode_value(ty: DmapType, payload: &[u8]) -> Option<DmapValue> {
    Some(match ty {
        DmapType::U8 => DmapValue::U8(payload[0]),
        DmapType::U16 => DmapValue::U16(u16::from_be_bytes(read_be(payload)?)),
        DmapType::U32 => DmapValue::U32(u32::from_be_bytes(read_be(payload)?)),
        DmapType::U64 => DmapValue::U64(u64::from_be_bytes(read_be(payload)?)),
        DmapType::Str => DmapValue::String(String::from_utf8_lossy(payload).into_owned()),
    })
}

/// Decode a DMAP buffer into a flat map
///
/// Zero-length records and tags missing from the table are skipped. A record
/// whose declared length runs past the buffer ends decoding; the records
/// before it are kept.
#[must_use]
pub fn decode(data: &[u8]) -> DmapMap {
    let mut map = DmapMap::new();
    let mut pos = CONTAINER_HEADER_SIZE;

    while pos + RECORD_HEADER_SIZE <= data.len() {
        let tag: [u8; 4] = [data[pos], data[pos + 1], data[pos + 2], data[pos + 3]];
        let len = u32::from_be_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]]);
        let start = pos + RECORD_HEADER_SIZE;
        let Some(end) = usize::try_from(len).ok().and_then(|len| start.checked_add(len)) else {
            break;
        };
        if end > data.len() {
            tracing::warn!(
                tag = %String::from_utf8_lossy(&tag),
                len,
                available = data.len() - start,
                "Truncated DMAP record"
            );
            break;
        }
        pos = end;

        if len == 0 {
            continue;
        }
        let Some(ty) = tag_type(&tag) else {
            continue;
        };

        match decode_value(ty, &data[start..end]) {
            Some(value) => {
                map.insert(String::from_utf8_lossy(&tag).into_owned(), value);
            }
            None => {
                tracing::debug!(tag = %String::from_utf8_lossy(&tag), len, "Short DMAP integer, skipped");
            }
        }
    }

    map
}
