//! Generic netlink message: base header, generic header, attributes.

use super::header::{GENL_HDRLEN, GenlMsgHdr};
use crate::netlink::error::{Error, Result};
use crate::netlink::message::{Message, NLMSG_HDRLEN, NestToken, NlMsgHdr};
use crate::netlink::policy::{PolicySet, Validated};

/// A [`Message`] whose payload starts with a [`GenlMsgHdr`].
///
/// # Example
///
/// ```
/// use genlink::netlink::genl::GenericMessage;
///
/// let mut msg = GenericMessage::new(0x1c, 0, 1, 1);
/// msg.put_str(1, "hello").unwrap();
///
/// assert_eq!(msg.cmd(), 1);
/// assert_eq!(&msg.as_bytes()[16..20], &[1, 1, 0, 0]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericMessage {
    message: Message,
}

impl GenericMessage {
    /// Create a message for `family_id` carrying command `cmd`.
    pub fn new(family_id: u16, flags: u16, cmd: u8, version: u8) -> Self {
        let mut message = Message::new(family_id, flags);
        // Header-only message: the tail is right after the base header.
        message.append_bytes(GenlMsgHdr::new(cmd, version).as_bytes());
        Self { message }
    }

    /// View a received message as a generic one.
    ///
    /// Fails with [`Error::Truncated`] if the payload cannot hold the
    /// generic header.
    pub fn from_message(message: &Message) -> Result<Self> {
        let available = message.len();
        if available < NLMSG_HDRLEN + GENL_HDRLEN {
            return Err(Error::Truncated {
                expected: NLMSG_HDRLEN + GENL_HDRLEN,
                actual: available,
            });
        }
        Ok(Self {
            message: message.clone(),
        })
    }

    /// Rebuild a generic message from raw bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_message(&Message::from_bytes(data)?)
    }

    /// The generic header.
    pub fn genl_header(&self) -> GenlMsgHdr {
        // Checked at construction.
        GenlMsgHdr::from_bytes(self.message.payload()).unwrap_or_default()
    }

    /// The base header.
    pub fn parse_header(&self) -> NlMsgHdr {
        self.message.parse_header()
    }

    pub fn cmd(&self) -> u8 {
        self.genl_header().cmd
    }

    pub fn version(&self) -> u8 {
        self.genl_header().version
    }

    pub fn family_id(&self) -> u16 {
        self.message.msg_type()
    }

    /// Bytes after both headers.
    pub fn payload(&self) -> &[u8] {
        &self.message.payload()[GENL_HDRLEN..]
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn message_mut(&mut self) -> &mut Message {
        &mut self.message
    }

    pub fn into_message(self) -> Message {
        self.message
    }

    pub fn len(&self) -> usize {
        self.message.len()
    }

    /// Check if the message carries no attributes.
    pub fn is_empty(&self) -> bool {
        self.message.len() == NLMSG_HDRLEN + GENL_HDRLEN
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.message.as_bytes()
    }

    pub fn put_attr(&mut self, attr_type: u16, data: &[u8]) -> Result<()> {
        self.message.put_attr(attr_type, data)
    }

    pub fn put_u8(&mut self, attr_type: u16, value: u8) -> Result<()> {
        self.message.put_u8(attr_type, value)
    }

    pub fn put_u16(&mut self, attr_type: u16, value: u16) -> Result<()> {
        self.message.put_u16(attr_type, value)
    }

    pub fn put_u32(&mut self, attr_type: u16, value: u32) -> Result<()> {
        self.message.put_u32(attr_type, value)
    }

    pub fn put_u64(&mut self, attr_type: u16, value: u64) -> Result<()> {
        self.message.put_u64(attr_type, value)
    }

    /// Append a null-terminated string attribute.
    pub fn put_str(&mut self, attr_type: u16, value: &str) -> Result<()> {
        self.message.put_str(attr_type, value)
    }

    pub fn put_string(&mut self, attr_type: u16, value: &str) -> Result<()> {
        self.message.put_string(attr_type, value)
    }

    pub fn put_flag(&mut self, attr_type: u16) -> Result<()> {
        self.message.put_flag(attr_type)
    }

    pub fn nest_start(&mut self, attr_type: u16) -> NestToken {
        self.message.nest_start(attr_type)
    }

    pub fn nest_end(&mut self, token: NestToken) -> Result<()> {
        self.message.nest_end(token)
    }

    /// Decode and validate the attributes after both headers.
    pub fn parse_attributes(&self, policies: &PolicySet) -> Result<Validated> {
        self.message.parse_attributes(GENL_HDRLEN, policies)
    }
}

impl From<GenericMessage> for Message {
    fn from(msg: GenericMessage) -> Self {
        msg.message
    }
}

impl TryFrom<Message> for GenericMessage {
    type Error = Error;

    fn try_from(message: Message) -> Result<Self> {
        Self::from_message(&message)
    }
}
