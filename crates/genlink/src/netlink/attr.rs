//! Netlink attribute (nlattr) encoding and decoding.
//!
//! Attributes are TLV records: a 4-byte header holding the length
//! (header + payload, unpadded) and the type, followed by the payload and
//! zero padding up to the next 4-byte boundary.
//!
//! ```text
//! ┌──────────┬──────────┬───────────────────┬─────────┐
//! │ len: u16 │ type: u16│ payload (len - 4) │ padding │
//! └──────────┴──────────┴───────────────────┴─────────┘
//! ```

use super::error::{Error, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Netlink attribute alignment.
pub const NLA_ALIGNTO: usize = 4;

/// Align a length to NLA_ALIGNTO boundary.
#[inline]
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Size of the attribute header.
pub const NLA_HDRLEN: usize = 4; // nla_align(size_of::<NlAttr>())

/// Netlink attribute header (mirrors struct nlattr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlAttr {
    /// Length including header.
    pub nla_len: u16,
    /// Attribute type.
    pub nla_type: u16,
}

/// Attribute type flags.
pub const NLA_F_NESTED: u16 = 1 << 15;
pub const NLA_F_NET_BYTEORDER: u16 = 1 << 14;
pub const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

impl NlAttr {
    /// Create a new attribute header.
    ///
    /// Fails if `NLA_HDRLEN + data_len` does not fit the 16-bit length field.
    pub fn new(attr_type: u16, data_len: usize) -> Result<Self> {
        let len = NLA_HDRLEN + data_len;
        let nla_len = u16::try_from(len).map_err(|_| {
            Error::InvalidAttribute(format!(
                "attribute {} payload of {} bytes exceeds the 16-bit length field",
                attr_type, data_len
            ))
        })?;
        Ok(Self {
            nla_len,
            nla_type: attr_type,
        })
    }

    /// Get the attribute type without flags.
    pub fn kind(&self) -> u16 {
        self.nla_type & NLA_TYPE_MASK
    }

    /// Check if this is a nested attribute.
    pub fn is_nested(&self) -> bool {
        self.nla_type & NLA_F_NESTED != 0
    }

    /// Get the payload length (total length minus header).
    pub fn payload_len(&self) -> usize {
        (self.nla_len as usize).saturating_sub(NLA_HDRLEN)
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse from bytes.
    ///
    /// The header is copied out, so `data` needs no particular alignment.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(attr, _)| attr)
            .map_err(|_| Error::Truncated {
                expected: NLA_HDRLEN,
                actual: data.len(),
            })
    }
}

/// An owned, decoded attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    kind: u16,
    nested: bool,
    net_byteorder: bool,
    data: Vec<u8>,
}

impl Attribute {
    /// Create an attribute with the given type and payload.
    pub fn new(kind: u16, data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: kind & NLA_TYPE_MASK,
            nested: kind & NLA_F_NESTED != 0,
            net_byteorder: kind & NLA_F_NET_BYTEORDER != 0,
            data: data.into(),
        }
    }

    /// Attribute type, without the nested/byte-order flags.
    pub fn kind(&self) -> u16 {
        self.kind
    }

    /// Whether the sender flagged the payload as nested attributes.
    pub fn is_nested(&self) -> bool {
        self.nested
    }

    /// Whether the sender flagged the payload as network byte order.
    pub fn is_net_byteorder(&self) -> bool {
        self.net_byteorder
    }

    /// Type field as sent on the wire, flags included.
    pub fn raw_kind(&self) -> u16 {
        let mut kind = self.kind;
        if self.nested {
            kind |= NLA_F_NESTED;
        }
        if self.net_byteorder {
            kind |= NLA_F_NET_BYTEORDER;
        }
        kind
    }

    /// The payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the attribute and return its payload.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Value of the wire length field: header plus payload, unpadded.
    pub fn len(&self) -> usize {
        NLA_HDRLEN + self.data.len()
    }

    /// Check if the payload is empty (a flag attribute).
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes the attribute occupies on the wire, padding included.
    pub fn wire_len(&self) -> usize {
        nla_align(self.len())
    }

    /// Encode the attribute into its padded wire form.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(self.raw_kind(), &self.data)
    }

    /// Iterate over attributes nested in the payload.
    pub fn nested(&self) -> AttrIter<'_> {
        AttrIter::new(&self.data)
    }

    pub fn as_u8(&self) -> Result<u8> {
        get::u8(&self.data)
    }

    pub fn as_u16(&self) -> Result<u16> {
        get::u16_ne(&self.data)
    }

    pub fn as_u32(&self) -> Result<u32> {
        get::u32_ne(&self.data)
    }

    pub fn as_u64(&self) -> Result<u64> {
        get::u64_ne(&self.data)
    }

    /// Payload as a string, up to the first NUL.
    pub fn as_str(&self) -> Result<&str> {
        get::string(&self.data)
    }
}

/// Encode one attribute into a new buffer.
pub fn encode(kind: u16, data: &[u8]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(nla_align(NLA_HDRLEN + data.len()));
    encode_into(&mut buf, kind, data)?;
    Ok(buf)
}

/// Append one attribute to `buf`, padding the buffer to the next
/// 4-byte boundary.
///
/// Padding is computed relative to the start of the attribute, so `buf`
/// is expected to already be 4-byte aligned (netlink messages always are).
pub fn encode_into(buf: &mut Vec<u8>, kind: u16, data: &[u8]) -> Result<()> {
    let attr = NlAttr::new(kind, data.len())?;
    let start = buf.len();
    buf.extend_from_slice(attr.as_bytes());
    buf.extend_from_slice(data);
    buf.resize(start + nla_align(attr.nla_len as usize), 0);
    Ok(())
}

/// Decode an attribute stream.
///
/// Stops when fewer than [`NLA_HDRLEN`] bytes remain. Unlike [`AttrIter`],
/// a malformed attribute is an error rather than the end of the stream:
/// a declared length beyond the buffer yields [`Error::Decode`], one
/// shorter than the header yields [`Error::InvalidAttribute`].
pub fn decode_stream(data: &[u8]) -> Result<Vec<Attribute>> {
    let mut attrs = Vec::new();
    let mut offset = 0;

    while data.len() - offset >= NLA_HDRLEN {
        let rest = &data[offset..];
        let header = NlAttr::from_bytes(rest)?;
        let len = header.nla_len as usize;

        if len < NLA_HDRLEN {
            return Err(Error::InvalidAttribute(format!(
                "attribute at offset {} has length {} (minimum {})",
                offset, len, NLA_HDRLEN
            )));
        }
        if len > rest.len() {
            return Err(Error::Decode {
                offset,
                declared: len,
                remaining: rest.len(),
            });
        }

        attrs.push(Attribute::new(header.nla_type, &rest[NLA_HDRLEN..len]));

        // The final attribute may omit its trailing padding.
        offset += nla_align(len).min(rest.len());
    }

    Ok(attrs)
}

/// Iterator over netlink attributes in a buffer.
///
/// Borrowing and lenient: iteration ends at the first malformed attribute.
pub struct AttrIter<'a> {
    data: &'a [u8],
}

impl<'a> AttrIter<'a> {
    /// Create a new attribute iterator.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Check if there are no more attributes.
    pub fn is_empty(&self) -> bool {
        self.data.len() < NLA_HDRLEN
    }
}

impl<'a> Iterator for AttrIter<'a> {
    /// Returns (attribute type, payload data).
    type Item = (u16, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < NLA_HDRLEN {
            return None;
        }

        let attr = NlAttr::from_bytes(self.data).ok()?;

        let len = attr.nla_len as usize;
        if len < NLA_HDRLEN || len > self.data.len() {
            self.data = &[];
            return None;
        }

        let payload = &self.data[NLA_HDRLEN..len];
        let aligned_len = nla_align(len);

        if aligned_len >= self.data.len() {
            self.data = &[];
        } else {
            self.data = &self.data[aligned_len..];
        }

        Some((attr.kind(), payload))
    }
}

/// Helper functions for extracting typed values from attribute payloads.
pub mod get {
    use super::*;

    fn array<const N: usize>(data: &[u8], what: &str) -> Result<[u8; N]> {
        data.get(..N)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| Error::InvalidAttribute(format!("truncated {} attribute", what)))
    }

    /// Extract a u8 value.
    pub fn u8(data: &[u8]) -> Result<u8> {
        data.first()
            .copied()
            .ok_or_else(|| Error::InvalidAttribute("empty u8 attribute".into()))
    }

    /// Extract a u16 value (native endian).
    pub fn u16_ne(data: &[u8]) -> Result<u16> {
        array(data, "u16").map(u16::from_ne_bytes)
    }

    /// Extract a u32 value (native endian).
    pub fn u32_ne(data: &[u8]) -> Result<u32> {
        array(data, "u32").map(u32::from_ne_bytes)
    }

    /// Extract a u64 value (native endian).
    pub fn u64_ne(data: &[u8]) -> Result<u64> {
        array(data, "u64").map(u64::from_ne_bytes)
    }

    /// Extract a u16 value (big endian / network order).
    pub fn u16_be(data: &[u8]) -> Result<u16> {
        array(data, "u16").map(u16::from_be_bytes)
    }

    /// Extract a u32 value (big endian / network order).
    pub fn u32_be(data: &[u8]) -> Result<u32> {
        array(data, "u32").map(u32::from_be_bytes)
    }

    /// Extract an i32 value (native endian).
    pub fn i32_ne(data: &[u8]) -> Result<i32> {
        array(data, "i32").map(i32::from_ne_bytes)
    }

    /// Extract a null-terminated string.
    pub fn string(data: &[u8]) -> Result<&str> {
        // Find null terminator or use whole buffer
        let len = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        std::str::from_utf8(&data[..len])
            .map_err(|e| Error::InvalidAttribute(format!("invalid UTF-8: {}", e)))
    }

    /// Extract bytes (no interpretation).
    pub fn bytes(data: &[u8]) -> &[u8] {
        data
    }
}
