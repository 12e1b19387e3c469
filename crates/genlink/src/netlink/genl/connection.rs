//! Generic Netlink connection with family resolution.

use std::collections::HashMap;

use super::header::{GENL_HDRLEN, GenlMsgHdr};
use super::message::GenericMessage;
use super::{CtrlAttr, CtrlAttrMcastGrp, CtrlCmd, GENL_ID_CTRL};
use crate::netlink::attr::{AttrIter, Attribute, get};
use crate::netlink::callback::{self, CbKind, CbType, Callbacks, Dispatch, Outcome, Received};
use crate::netlink::config::Config;
use crate::netlink::connection::NetLink;
use crate::netlink::error::{Error, Result};
use crate::netlink::message::{Message, NLM_F_REQUEST};
use crate::netlink::policy::{PolicySet, Rejection, Validated};
use crate::netlink::socket::{NetlinkSocket, SocketIo};

/// Information about a Generic Netlink family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyInfo {
    /// Family name as registered in the kernel.
    pub name: String,
    /// Dynamically assigned family ID (used as nlmsg_type).
    pub id: u16,
    /// Family version.
    pub version: u8,
    /// Header size (additional bytes after genlmsghdr).
    pub hdr_size: u32,
    /// Maximum attribute number.
    pub max_attr: u32,
    /// Multicast groups: name -> group ID.
    pub mcast_groups: HashMap<String, u32>,
}

/// A decoded generic netlink data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    pub cmd: u8,
    pub version: u8,
    /// Attributes that passed validation, in wire order.
    pub attributes: Vec<Attribute>,
    /// Attributes outside their policy bounds.
    pub rejected: Vec<Rejection>,
}

impl ParsedMessage {
    pub fn is_valid(&self) -> bool {
        self.rejected.is_empty()
    }

    /// First accepted attribute of the given type.
    pub fn attr(&self, kind: u16) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.kind() == kind)
    }
}

/// Generic Netlink connection bound to one family.
///
/// The family id is resolved once, when the connection is opened, and
/// cached for its lifetime. Handlers registered here receive the
/// connection itself along with the frame, whose generic header is
/// already parsed.
///
/// # Example
///
/// ```rust,no_run
/// use genlink::netlink::genl::GenericNetLink;
/// use genlink::netlink::{AttributePolicy, CbKind, CbType, PolicySet};
///
/// # fn example() -> genlink::Result<()> {
/// let policies = PolicySet::new().with(AttributePolicy::new(1, 0, 300));
/// let mut conn = GenericNetLink::open("custom_family", policies)?;
///
/// conn.modify_cb(CbType::Valid, CbKind::Custom, |_conn, msg| {
///     if let Some(attr) = msg.attr(1) {
///         println!("cmd {:?}: {}", msg.cmd(), attr.as_str()?);
///     }
///     Ok(())
/// });
///
/// let mut msg = conn.message(1, 0);
/// msg.put_str(1, "hello")?;
/// conn.send(&mut msg)?;
/// conn.recv()?;
/// # Ok(())
/// # }
/// ```
pub struct GenericNetLink<S: SocketIo = NetlinkSocket> {
    transport: NetLink<S>,
    family: FamilyInfo,
    callbacks: Callbacks<Self>,
}

impl GenericNetLink<NetlinkSocket> {
    /// Open a socket and bind it to the family called `family_name`.
    ///
    /// Received attributes are validated against `policies`.
    pub fn open(family_name: &str, policies: PolicySet) -> Result<Self> {
        Self::open_with_config(family_name, policies, Config::default())
    }

    /// [`open`](Self::open) with an explicit configuration.
    pub fn open_with_config(family_name: &str, policies: PolicySet, config: Config) -> Result<Self> {
        let socket = NetlinkSocket::with_config(&config)?;
        Self::from_socket(socket, family_name, policies, config)
    }
}

impl<S: SocketIo + 'static> GenericNetLink<S> {
    /// Resolve `family_name` over an already opened socket.
    ///
    /// Fails with [`Error::FamilyNotFound`] if the kernel does not know the
    /// family and with [`Error::Resolution`] for any other failure.
    pub fn from_socket(
        socket: S,
        family_name: &str,
        policies: PolicySet,
        config: Config,
    ) -> Result<Self> {
        let mut transport =
            NetLink::from_socket(socket, GENL_ID_CTRL, GENL_HDRLEN, PolicySet::new(), config);
        let family = resolve_family(&mut transport, family_name)?;

        tracing::debug!(
            family = %family.name,
            id = family.id,
            version = family.version,
            groups = family.mcast_groups.len(),
            "resolved generic netlink family"
        );

        transport.bind_family(family.id, GENL_HDRLEN + family.hdr_size as usize, policies);
        Ok(Self {
            transport,
            family,
            callbacks: Callbacks::new(),
        })
    }

    /// Register `handler` for frames of `cb_type` under `kind`.
    pub fn modify_cb<F>(&mut self, cb_type: CbType, kind: CbKind, handler: F)
    where
        F: Fn(&mut Self, &Received) -> Result<()> + 'static,
    {
        self.callbacks.set(cb_type, kind, handler);
    }

    pub fn clear_cb(&mut self, cb_type: CbType, kind: CbKind) -> bool {
        self.callbacks.clear(cb_type, kind)
    }

    /// Select which kind of handlers runs before [`CbKind::Default`].
    pub fn set_cb_kind(&mut self, kind: CbKind) {
        self.callbacks.set_active_kind(kind);
    }

    /// Receive one frame and run its handler.
    ///
    /// Data frames are decoded with [`parse_message`](Self::parse_message)
    /// and carry their generic header in [`Received::genl`]. A data frame
    /// too short for the generic header is INVALID.
    pub fn recv(&mut self) -> Result<Outcome> {
        let frame = self.transport.next_frame()?;
        let received = self.transport.classify(frame, |msg| {
            let parsed = self.parse_message(msg)?;
            Ok((
                Some(GenlMsgHdr::new(parsed.cmd, parsed.version)),
                Validated {
                    attributes: parsed.attributes,
                    rejected: parsed.rejected,
                },
            ))
        });
        callback::dispatch(self, &received)
    }
}

impl<S: SocketIo> GenericNetLink<S> {
    pub fn family(&self) -> &FamilyInfo {
        &self.family
    }

    /// Numeric id of the bound family.
    pub fn family_id(&self) -> u16 {
        self.family.id
    }

    pub fn family_name(&self) -> &str {
        &self.family.name
    }

    /// Id of one of the family's multicast groups.
    pub fn group_id(&self, group: &str) -> Result<u32> {
        self.family
            .mcast_groups
            .get(group)
            .copied()
            .ok_or_else(|| Error::GroupNotFound {
                family: self.family.name.clone(),
                group: group.to_string(),
            })
    }

    /// Create a message for command `cmd` of the bound family, using the
    /// family's version.
    pub fn message(&self, cmd: u8, flags: u16) -> GenericMessage {
        GenericMessage::new(self.family.id, flags, cmd, self.family.version)
    }

    /// Decode the headers and validate the attributes of a received frame.
    pub fn parse_message(&self, msg: &Message) -> Result<ParsedMessage> {
        let header = GenericMessage::from_message(msg)?.genl_header();
        let checked = self.transport.parse_attributes(msg)?;
        Ok(ParsedMessage {
            cmd: header.cmd,
            version: header.version,
            attributes: checked.attributes,
            rejected: checked.rejected,
        })
    }

    /// Send a message; see [`NetLink::send`].
    pub fn send(&mut self, msg: &mut GenericMessage) -> Result<u32> {
        self.transport.send(msg.message_mut())
    }

    /// Send a message and wait for its reply; see [`NetLink::request`].
    pub fn request(&mut self, msg: &mut GenericMessage) -> Result<Message> {
        self.transport.request(msg.message_mut())
    }

    /// Accept frames regardless of their sequence number.
    pub fn disable_seq_check(&mut self) {
        self.transport.disable_seq_check();
    }

    /// See [`NetLink::set_recv_timeout`].
    pub fn set_recv_timeout(&mut self, timeout: Option<std::time::Duration>) -> Result<()> {
        self.transport.set_recv_timeout(timeout)
    }

    pub fn policies(&self) -> &PolicySet {
        self.transport.policies()
    }

    /// Release the socket. Every later operation fails with
    /// [`Error::Closed`].
    pub fn close(&mut self) {
        self.transport.close();
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }

    pub fn transport(&self) -> &NetLink<S> {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut NetLink<S> {
        &mut self.transport
    }
}

impl<S: SocketIo + 'static> Dispatch for GenericNetLink<S> {
    fn callbacks(&mut self) -> &mut Callbacks<Self> {
        &mut self.callbacks
    }
}

impl<S: SocketIo> std::fmt::Debug for GenericNetLink<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericNetLink")
            .field("family", &self.family.name)
            .field("id", &self.family.id)
            .field("transport", &self.transport)
            .finish()
    }
}

/// Look up a family through `CTRL_CMD_GETFAMILY`.
fn resolve_family<S: SocketIo>(conn: &mut NetLink<S>, name: &str) -> Result<FamilyInfo> {
    let wrap = |source: Error| {
        if source.errno() == Some(libc::ENOENT) {
            Error::FamilyNotFound {
                name: name.to_string(),
            }
        } else {
            Error::Resolution {
                name: name.to_string(),
                source: Box::new(source),
            }
        }
    };

    let mut request = GenericMessage::new(GENL_ID_CTRL, NLM_F_REQUEST, CtrlCmd::GetFamily as u8, 1);
    request
        .put_str(CtrlAttr::FamilyName as u16, name)
        .map_err(wrap)?;

    tracing::trace!(family = name, "resolving generic netlink family");
    let reply = conn.request(request.message_mut()).map_err(wrap)?;
    parse_family_reply(&reply, name).map_err(wrap)
}

/// Parse a `CTRL_CMD_NEWFAMILY` reply.
fn parse_family_reply(reply: &Message, name: &str) -> Result<FamilyInfo> {
    if reply.msg_type() != GENL_ID_CTRL {
        return Err(Error::InvalidMessage(format!(
            "expected a control family reply, got message type {}",
            reply.msg_type()
        )));
    }
    let reply = GenericMessage::from_message(reply)?;

    let mut info = FamilyInfo {
        name: name.to_string(),
        id: 0,
        version: 0,
        hdr_size: 0,
        max_attr: 0,
        mcast_groups: HashMap::new(),
    };
    let mut id: Option<u16> = None;

    for (attr_type, payload) in AttrIter::new(reply.payload()) {
        match attr_type {
            t if t == CtrlAttr::FamilyId as u16 => {
                id = Some(get::u16_ne(payload)?);
            }
            t if t == CtrlAttr::FamilyName as u16 => {
                info.name = get::string(payload)?.to_string();
            }
            t if t == CtrlAttr::Version as u16 => {
                info.version = get::u32_ne(payload)? as u8;
            }
            t if t == CtrlAttr::HdrSize as u16 => {
                info.hdr_size = get::u32_ne(payload)?;
            }
            t if t == CtrlAttr::MaxAttr as u16 => {
                info.max_attr = get::u32_ne(payload)?;
            }
            t if t == CtrlAttr::McastGroups as u16 => {
                info.mcast_groups = parse_mcast_groups(payload)?;
            }
            _ => {}
        }
    }

    info.id = id.ok_or_else(|| Error::InvalidMessage("missing family ID".into()))?;
    Ok(info)
}

/// Parse multicast groups from CTRL_ATTR_MCAST_GROUPS.
fn parse_mcast_groups(data: &[u8]) -> Result<HashMap<String, u32>> {
    let mut groups = HashMap::new();

    // One nested entry per group, indexed from 1
    for (_index, entry) in AttrIter::new(data) {
        let mut name: Option<String> = None;
        let mut group_id: Option<u32> = None;

        for (attr_type, payload) in AttrIter::new(entry) {
            match attr_type {
                t if t == CtrlAttrMcastGrp::Name as u16 => {
                    name = Some(get::string(payload)?.to_string());
                }
                t if t == CtrlAttrMcastGrp::Id as u16 => {
                    group_id = Some(get::u32_ne(payload)?);
                }
                _ => {}
            }
        }

        if let (Some(name), Some(id)) = (name, group_id) {
            groups.insert(name, id);
        }
    }

    Ok(groups)
}
