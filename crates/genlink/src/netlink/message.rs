//! Netlink message header, framing and the [`Message`] buffer.

use super::attr::{self, NLA_F_NESTED, NlAttr, nla_align};
use super::error::{Error, Result};
use super::policy::{PolicySet, Validated};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Netlink message header alignment.
pub const NLMSG_ALIGNTO: usize = 4;

/// Align a length to NLMSG_ALIGNTO boundary.
#[inline]
pub const fn nlmsg_align(len: usize) -> usize {
    (len + NLMSG_ALIGNTO - 1) & !(NLMSG_ALIGNTO - 1)
}

/// Size of the netlink message header.
pub const NLMSG_HDRLEN: usize = nlmsg_align(std::mem::size_of::<NlMsgHdr>());

/// Netlink message header (mirrors struct nlmsghdr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlMsgHdr {
    /// Length of message including header.
    pub nlmsg_len: u32,
    /// Message type (the family id for generic netlink).
    pub nlmsg_type: u16,
    /// Additional flags.
    pub nlmsg_flags: u16,
    /// Sequence number.
    pub nlmsg_seq: u32,
    /// Sending process port ID.
    pub nlmsg_pid: u32,
}

impl NlMsgHdr {
    /// Create a new message header.
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self {
            nlmsg_len: NLMSG_HDRLEN as u32,
            nlmsg_type: msg_type,
            nlmsg_flags: flags,
            nlmsg_seq: 0,
            nlmsg_pid: 0,
        }
    }

    /// Get the payload length (total length minus header).
    pub fn payload_len(&self) -> usize {
        (self.nlmsg_len as usize).saturating_sub(NLMSG_HDRLEN)
    }

    /// Check if this is an error message (or ACK).
    pub fn is_error(&self) -> bool {
        self.nlmsg_type == NlMsgType::ERROR
    }

    /// Check if this is a done message.
    pub fn is_done(&self) -> bool {
        self.nlmsg_type == NlMsgType::DONE
    }

    /// Check if this is a control message rather than family data.
    pub fn is_control(&self) -> bool {
        self.nlmsg_type < NlMsgType::MIN_TYPE
    }

    /// Check if this message has the multi flag.
    pub fn is_multi(&self) -> bool {
        self.nlmsg_flags & NLM_F_MULTI != 0
    }

    /// Convert header to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse header from bytes.
    ///
    /// The header is copied out, so `data` needs no particular alignment.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(hdr, _)| hdr)
            .map_err(|_| Error::Truncated {
                expected: NLMSG_HDRLEN,
                actual: data.len(),
            })
    }
}

/// Standard netlink message types.
pub struct NlMsgType;

impl NlMsgType {
    /// No operation, message must be discarded.
    pub const NOOP: u16 = 1;
    /// Error message or ACK.
    pub const ERROR: u16 = 2;
    /// End of multipart message.
    pub const DONE: u16 = 3;
    /// Data lost, request resend.
    pub const OVERRUN: u16 = 4;
    /// First type available to families; lower values are reserved.
    pub const MIN_TYPE: u16 = 0x10;
}

/// Netlink message flags.
pub const NLM_F_REQUEST: u16 = 0x01;
pub const NLM_F_MULTI: u16 = 0x02;
pub const NLM_F_ACK: u16 = 0x04;
pub const NLM_F_ECHO: u16 = 0x08;

/// Iterator over netlink messages in a buffer.
pub struct MessageIter<'a> {
    data: &'a [u8],
}

impl<'a> MessageIter<'a> {
    /// Create a new message iterator.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for MessageIter<'a> {
    /// Returns (header, full frame bytes including the header).
    type Item = Result<(NlMsgHdr, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < NLMSG_HDRLEN {
            return None;
        }

        let header = match NlMsgHdr::from_bytes(self.data) {
            Ok(h) => h,
            Err(e) => return Some(Err(e)),
        };

        let msg_len = header.nlmsg_len as usize;
        if msg_len < NLMSG_HDRLEN || msg_len > self.data.len() {
            self.data = &[];
            return Some(Err(Error::InvalidMessage(format!(
                "invalid message length: {}",
                msg_len
            ))));
        }

        let frame = &self.data[..msg_len];
        let aligned_len = nlmsg_align(msg_len);

        if aligned_len >= self.data.len() {
            self.data = &[];
        } else {
            self.data = &self.data[aligned_len..];
        }

        Some(Ok((header, frame)))
    }
}

/// Netlink error message payload.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
pub struct NlMsgError {
    /// Error code (negative errno or 0 for ACK).
    pub error: i32,
    /// Original message header that caused the error.
    pub msg: NlMsgHdr,
}

impl NlMsgError {
    /// Parse error message from payload.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(err, _)| err)
            .map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<Self>(),
                actual: data.len(),
            })
    }

    /// Check if this is an ACK (no error).
    pub fn is_ack(&self) -> bool {
        self.error == 0
    }
}

/// Token returned when starting a nested attribute.
/// Used to finalize the nested attribute length.
#[derive(Debug, Clone, Copy)]
pub struct NestToken {
    /// Offset of the nested attribute header in the buffer.
    offset: usize,
}

/// A netlink message: base header, optional protocol header, attributes.
///
/// The message owns its buffer. `nlmsg_len` is kept equal to the buffer
/// length after every mutation, so [`as_bytes`](Self::as_bytes) is always
/// ready to send.
///
/// # Example
///
/// ```
/// use genlink::netlink::Message;
///
/// let mut msg = Message::new(5, 0);
/// msg.put_attr(1, b"hi").unwrap();
///
/// // 16-byte header, 4-byte attribute header, 2 bytes of data, 2 of padding.
/// assert_eq!(msg.len(), 24);
/// assert_eq!(msg.parse_header().nlmsg_len, 24);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    buf: Vec<u8>,
}

impl Message {
    /// Create a header-only message with the given type and flags.
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self::with_header(NlMsgHdr::new(msg_type, flags))
    }

    /// Create a message from an existing header.
    ///
    /// The header's length field is replaced by the real length.
    pub fn with_header(header: NlMsgHdr) -> Self {
        let mut msg = Self {
            buf: header.as_bytes().to_vec(),
        };
        msg.sync_len();
        msg
    }

    /// Rebuild a message from raw bytes (header + payload).
    ///
    /// The declared `nlmsg_len` decides where the message ends; bytes past
    /// it are ignored. A declared length shorter than the header or longer
    /// than `data` is an error.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let header = NlMsgHdr::from_bytes(data)?;
        let len = header.nlmsg_len as usize;
        if len < NLMSG_HDRLEN {
            return Err(Error::InvalidMessage(format!(
                "declared length {} shorter than the header",
                len
            )));
        }
        if len > data.len() {
            return Err(Error::Truncated {
                expected: len,
                actual: data.len(),
            });
        }
        Ok(Self {
            buf: data[..len].to_vec(),
        })
    }

    /// Parse the base header.
    pub fn parse_header(&self) -> NlMsgHdr {
        // The buffer always starts with a full header.
        NlMsgHdr::from_bytes(&self.buf).unwrap_or_default()
    }

    pub fn msg_type(&self) -> u16 {
        self.parse_header().nlmsg_type
    }

    pub fn flags(&self) -> u16 {
        self.parse_header().nlmsg_flags
    }

    pub fn seq(&self) -> u32 {
        self.parse_header().nlmsg_seq
    }

    pub fn pid(&self) -> u32 {
        self.parse_header().nlmsg_pid
    }

    /// Get the current message length.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if the message is empty (header only).
    pub fn is_empty(&self) -> bool {
        self.buf.len() == NLMSG_HDRLEN
    }

    /// Everything after the base header.
    pub fn payload(&self) -> &[u8] {
        &self.buf[NLMSG_HDRLEN..]
    }

    /// Insert raw bytes at `position`.
    ///
    /// Used to place a protocol header directly after the base header
    /// (`position == NLMSG_HDRLEN`) while attributes keep going at the end.
    /// No padding is added; callers inserting odd-sized data are
    /// responsible for alignment.
    pub fn append(&mut self, data: &[u8], position: usize) -> Result<()> {
        if position < NLMSG_HDRLEN || position > self.buf.len() {
            return Err(Error::InvalidMessage(format!(
                "insert position {} outside {}..={}",
                position,
                NLMSG_HDRLEN,
                self.buf.len()
            )));
        }
        self.buf.splice(position..position, data.iter().copied());
        self.sync_len();
        Ok(())
    }

    /// Append raw bytes at the tail, padded to alignment.
    pub fn append_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        let aligned = nlmsg_align(self.buf.len());
        self.buf.resize(aligned, 0);
        self.sync_len();
    }

    /// Reserve `len` zeroed bytes at the tail and return them for writing.
    ///
    /// The message is padded so the next write starts aligned.
    pub fn reserve(&mut self, len: usize) -> &mut [u8] {
        let start = self.buf.len();
        self.buf.resize(nlmsg_align(start + len), 0);
        self.sync_len();
        &mut self.buf[start..start + len]
    }

    /// Append an attribute with the given type and data.
    pub fn put_attr(&mut self, attr_type: u16, data: &[u8]) -> Result<()> {
        attr::encode_into(&mut self.buf, attr_type, data)?;
        self.sync_len();
        Ok(())
    }

    /// Append a u8 attribute.
    pub fn put_u8(&mut self, attr_type: u16, value: u8) -> Result<()> {
        self.put_attr(attr_type, &[value])
    }

    /// Append a u16 attribute (native endian).
    pub fn put_u16(&mut self, attr_type: u16, value: u16) -> Result<()> {
        self.put_attr(attr_type, &value.to_ne_bytes())
    }

    /// Append a u32 attribute (native endian).
    pub fn put_u32(&mut self, attr_type: u16, value: u32) -> Result<()> {
        self.put_attr(attr_type, &value.to_ne_bytes())
    }

    /// Append a u64 attribute (native endian).
    pub fn put_u64(&mut self, attr_type: u16, value: u64) -> Result<()> {
        self.put_attr(attr_type, &value.to_ne_bytes())
    }

    /// Append a null-terminated string attribute.
    pub fn put_str(&mut self, attr_type: u16, value: &str) -> Result<()> {
        let mut data = Vec::with_capacity(value.len() + 1);
        data.extend_from_slice(value.as_bytes());
        data.push(0);
        self.put_attr(attr_type, &data)
    }

    /// Append a string attribute without null terminator.
    pub fn put_string(&mut self, attr_type: u16, value: &str) -> Result<()> {
        self.put_attr(attr_type, value.as_bytes())
    }

    /// Append an empty (flag) attribute with no payload.
    pub fn put_flag(&mut self, attr_type: u16) -> Result<()> {
        self.put_attr(attr_type, &[])
    }

    /// Start a nested attribute. Returns a token to finalize it.
    pub fn nest_start(&mut self, attr_type: u16) -> NestToken {
        let offset = self.buf.len();
        // Placeholder header; nest_end fills in the length.
        let attr = NlAttr {
            nla_len: 0,
            nla_type: attr_type | NLA_F_NESTED,
        };
        self.buf.extend_from_slice(attr.as_bytes());
        self.sync_len();
        NestToken { offset }
    }

    /// End a nested attribute started with `nest_start`.
    ///
    /// If the nest is too long for its length field, it is removed from
    /// the message along with everything appended after it.
    pub fn nest_end(&mut self, token: NestToken) -> Result<()> {
        let Ok(len) = u16::try_from(self.buf.len() - token.offset) else {
            self.buf.truncate(token.offset);
            self.sync_len();
            return Err(Error::InvalidAttribute(
                "nested attribute exceeds the 16-bit length field".into(),
            ));
        };
        self.buf[token.offset..token.offset + 2].copy_from_slice(&len.to_ne_bytes());
        let aligned = nla_align(self.buf.len());
        self.buf.resize(aligned, 0);
        self.sync_len();
        Ok(())
    }

    /// Set the message type.
    pub fn set_type(&mut self, msg_type: u16) {
        self.buf[4..6].copy_from_slice(&msg_type.to_ne_bytes());
    }

    /// Set the flags.
    pub fn set_flags(&mut self, flags: u16) {
        self.buf[6..8].copy_from_slice(&flags.to_ne_bytes());
    }

    /// Set the sequence number.
    pub fn set_seq(&mut self, seq: u32) {
        self.buf[8..12].copy_from_slice(&seq.to_ne_bytes());
    }

    /// Set the port ID.
    pub fn set_pid(&mut self, pid: u32) {
        self.buf[12..16].copy_from_slice(&pid.to_ne_bytes());
    }

    /// Decode and validate the attributes that follow the base header and
    /// `hdr_len` bytes of protocol header.
    pub fn parse_attributes(&self, hdr_len: usize, policies: &PolicySet) -> Result<Validated> {
        let start = NLMSG_HDRLEN + hdr_len;
        if self.buf.len() < start {
            return Err(Error::Truncated {
                expected: start,
                actual: self.buf.len(),
            });
        }
        let attrs = attr::decode_stream(&self.buf[start..])?;
        Ok(policies.validate(attrs))
    }

    /// The whole message (header + payload).
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the message and return its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn sync_len(&mut self) {
        let len = self.buf.len() as u32;
        self.buf[0..4].copy_from_slice(&len.to_ne_bytes());
    }
}
