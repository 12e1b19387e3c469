//! Blocking netlink transport with callback dispatch.
//!
//! [`NetLink`] owns the socket, numbers outgoing requests and turns every
//! received frame into a [`Received`] that is routed through the
//! connection's [`Callbacks`].
//!
//! # Example
//!
//! ```rust,no_run
//! use genlink::netlink::{CbKind, CbType, Message, NetLink, PolicySet};
//!
//! # fn example() -> genlink::Result<()> {
//! let mut conn = NetLink::new(0x1c, 4, PolicySet::new())?;
//!
//! conn.modify_cb(CbType::Valid, CbKind::Custom, |_conn, msg| {
//!     println!("got {} attributes", msg.attributes.len());
//!     Ok(())
//! });
//!
//! let mut msg = Message::new(0x1c, 0);
//! conn.send(&mut msg)?;
//! conn.recv()?;
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use super::callback::{self, CbKind, CbType, Callbacks, Dispatch, Invalid, Outcome, Received};
use super::config::Config;
use super::genl::GenlMsgHdr;
use super::error::{Error, Result};
use super::message::{Message, MessageIter, NLM_F_REQUEST, NLMSG_HDRLEN, NlMsgError, NlMsgType};
use super::policy::{PolicySet, Validated};
use super::socket::{NetlinkSocket, SocketIo};

/// A netlink connection bound to one family.
///
/// `hdr_len` is the size of the protocol header that sits between the base
/// header and the attributes of the family's data frames (4 for generic
/// netlink, 0 for none). Attributes of received data frames are validated
/// against `policies`.
pub struct NetLink<S: SocketIo = NetlinkSocket> {
    socket: Option<S>,
    config: Config,
    family_id: u16,
    hdr_len: usize,
    policies: PolicySet,
    /// Sequence number of the next request.
    seq: u32,
    /// Sequence number of the last request sent.
    expected_seq: Option<u32>,
    /// Frames read from the socket but not yet returned.
    pending: VecDeque<Message>,
    callbacks: Callbacks<Self>,
}

impl NetLink<NetlinkSocket> {
    /// Open a generic netlink socket with the default configuration.
    pub fn new(family_id: u16, hdr_len: usize, policies: PolicySet) -> Result<Self> {
        Self::with_config(family_id, hdr_len, policies, Config::default())
    }

    /// Open a generic netlink socket with `config`.
    pub fn with_config(
        family_id: u16,
        hdr_len: usize,
        policies: PolicySet,
        config: Config,
    ) -> Result<Self> {
        let socket = NetlinkSocket::with_config(&config)?;
        Ok(Self::from_socket(socket, family_id, hdr_len, policies, config))
    }
}

impl<S: SocketIo + 'static> NetLink<S> {
    /// Wrap an already opened socket.
    pub fn from_socket(
        socket: S,
        family_id: u16,
        hdr_len: usize,
        policies: PolicySet,
        config: Config,
    ) -> Self {
        Self {
            socket: Some(socket),
            config,
            family_id,
            hdr_len,
            policies,
            seq: 1,
            expected_seq: None,
            pending: VecDeque::new(),
            callbacks: Callbacks::new(),
        }
    }

    /// Register `handler` for frames of `cb_type` under `kind`.
    ///
    /// A previous handler under the same pair is replaced. May be called
    /// from inside a running handler.
    pub fn modify_cb<F>(&mut self, cb_type: CbType, kind: CbKind, handler: F)
    where
        F: Fn(&mut Self, &Received) -> Result<()> + 'static,
    {
        self.callbacks.set(cb_type, kind, handler);
    }

    /// Remove the handler for `cb_type` under `kind`.
    pub fn clear_cb(&mut self, cb_type: CbType, kind: CbKind) -> bool {
        self.callbacks.clear(cb_type, kind)
    }

    /// Select which kind of handlers runs before [`CbKind::Default`].
    pub fn set_cb_kind(&mut self, kind: CbKind) {
        self.callbacks.set_active_kind(kind);
    }

    /// Receive one frame and run its handler.
    ///
    /// Blocks until a frame is available. Frames left over from an earlier
    /// datagram are returned first without touching the socket. Errors
    /// returned by the handler are passed through.
    pub fn recv(&mut self) -> Result<Outcome> {
        let frame = self.next_frame()?;
        let received = self.classify(frame, |msg| Ok((None, self.parse_attributes(msg)?)));
        callback::dispatch(self, &received)
    }
}

impl<S: SocketIo> NetLink<S> {
    /// Family id used as the message type of data frames.
    pub fn family_id(&self) -> u16 {
        self.family_id
    }

    /// Size of the protocol header after the base header.
    pub fn hdr_len(&self) -> usize {
        self.hdr_len
    }

    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    pub fn policies_mut(&mut self) -> &mut PolicySet {
        &mut self.policies
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Sequence number the next [`send`](Self::send) will use.
    pub fn next_seq(&self) -> u32 {
        self.seq
    }

    /// Local port id.
    pub fn pid(&self) -> Result<u32> {
        Ok(self.socket()?.pid())
    }

    /// The underlying socket.
    pub fn socket(&self) -> Result<&S> {
        self.socket.as_ref().ok_or(Error::Closed)
    }

    pub fn socket_mut(&mut self) -> Result<&mut S> {
        self.socket.as_mut().ok_or(Error::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.socket.is_none()
    }

    /// Accept frames regardless of their sequence number.
    pub fn disable_seq_check(&mut self) {
        self.config.seq_check = false;
    }

    /// Change how long [`recv`](NetLink::recv) may block; `None` blocks
    /// until a frame arrives.
    pub fn set_recv_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        let socket = self.socket.as_mut().ok_or(Error::Closed)?;
        socket.set_recv_timeout(timeout)?;
        self.config.recv_timeout = timeout;
        Ok(())
    }

    /// Send a message to the kernel.
    ///
    /// Stamps the next sequence number, the local port id and
    /// `NLM_F_REQUEST` into the header. Returns the sequence number, which
    /// replies are then checked against.
    pub fn send(&mut self, msg: &mut Message) -> Result<u32> {
        let socket = self.socket.as_mut().ok_or(Error::Closed)?;

        let seq = self.seq;
        msg.set_seq(seq);
        msg.set_pid(socket.pid());
        msg.set_flags(msg.flags() | NLM_F_REQUEST);

        socket.send(msg.as_bytes())?;
        self.seq = self.seq.wrapping_add(1);
        self.expected_seq = Some(seq);

        tracing::trace!(
            msg_type = msg.msg_type(),
            seq,
            len = msg.len(),
            "sent netlink message"
        );
        Ok(seq)
    }

    /// Send a request and wait for the frame answering it.
    ///
    /// Frames carrying other sequence numbers are kept for later
    /// [`recv`](NetLink::recv) calls. A kernel error reply is returned as
    /// [`Error::Kernel`]. An ACK is returned like any other reply.
    pub fn request(&mut self, msg: &mut Message) -> Result<Message> {
        let seq = self.send(msg)?;
        loop {
            let mut frames = self.read_datagram()?.into_iter();
            while let Some(frame) = frames.next() {
                if frame.seq() != seq {
                    tracing::trace!(seq = frame.seq(), expected = seq, "queueing unrelated frame");
                    self.pending.push_back(frame);
                    continue;
                }
                self.pending.extend(frames);

                if frame.msg_type() == NlMsgType::ERROR {
                    let err = NlMsgError::from_bytes(frame.payload())?;
                    if !err.is_ack() {
                        return Err(Error::from_errno(err.error));
                    }
                }
                return Ok(frame);
            }
        }
    }

    /// Switch the connection to another family once it has been resolved.
    pub(crate) fn bind_family(&mut self, family_id: u16, hdr_len: usize, policies: PolicySet) {
        self.family_id = family_id;
        self.hdr_len = hdr_len;
        self.policies = policies;
        self.pending.clear();
    }

    /// Decode and validate the attributes of a frame of this family.
    pub fn parse_attributes(&self, msg: &Message) -> Result<Validated> {
        msg.parse_attributes(self.hdr_len, &self.policies)
    }

    /// Release the socket. Every later operation fails with
    /// [`Error::Closed`].
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            self.pending.clear();
            self.expected_seq = None;
            tracing::debug!(family_id = self.family_id, "closed netlink connection");
        }
    }

    /// Next frame, from the queue or from the socket.
    pub(crate) fn next_frame(&mut self) -> Result<Message> {
        if self.socket.is_none() {
            return Err(Error::Closed);
        }
        if let Some(frame) = self.pending.pop_front() {
            return Ok(frame);
        }

        let mut frames = self.read_datagram()?.into_iter();
        // read_datagram never returns an empty batch.
        let first = frames.next().ok_or(Error::Truncated {
            expected: NLMSG_HDRLEN,
            actual: 0,
        })?;
        self.pending.extend(frames);
        Ok(first)
    }

    /// Read one datagram and split it into frames.
    fn read_datagram(&mut self) -> Result<Vec<Message>> {
        let socket = self.socket.as_mut().ok_or(Error::Closed)?;
        let datagram = socket.recv()?;

        let mut frames = Vec::new();
        for result in MessageIter::new(&datagram) {
            match result {
                Ok((_, bytes)) => frames.push(Message::from_bytes(bytes)?),
                Err(e) if frames.is_empty() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "discarding malformed tail of datagram");
                    break;
                }
            }
        }
        if frames.is_empty() {
            return Err(Error::Truncated {
                expected: NLMSG_HDRLEN,
                actual: datagram.len(),
            });
        }

        tracing::trace!(len = datagram.len(), frames = frames.len(), "received datagram");
        Ok(frames)
    }

    /// Classify a frame.
    ///
    /// `parse` decodes data frames into their protocol header, if any, and
    /// validated attributes; the generic layer passes its own parser.
    pub(crate) fn classify<F>(&self, frame: Message, parse: F) -> Received
    where
        F: FnOnce(&Message) -> Result<(Option<GenlMsgHdr>, Validated)>,
    {
        let header = frame.parse_header();

        if self.config.seq_check {
            if let Some(expected) = self.expected_seq {
                if header.nlmsg_seq != expected {
                    return Received::invalid(
                        frame,
                        Invalid::Sequence {
                            expected,
                            actual: header.nlmsg_seq,
                        },
                    );
                }
            }
        }

        match header.nlmsg_type {
            NlMsgType::NOOP => Received::new(CbType::Skipped, frame),
            NlMsgType::ERROR => match NlMsgError::from_bytes(frame.payload()) {
                Ok(err) if err.is_ack() => {
                    let mut received = Received::new(CbType::Ack, frame);
                    received.error = Some(0);
                    received
                }
                Ok(err) => {
                    let mut received =
                        Received::invalid(frame, Invalid::Kernel { errno: err.error.wrapping_neg() });
                    received.error = Some(err.error);
                    received
                }
                Err(e) => Received::invalid(frame, Invalid::Decode(e.to_string())),
            },
            NlMsgType::DONE => Received::new(CbType::Finish, frame),
            NlMsgType::OVERRUN => Received::new(CbType::Overrun, frame),
            _ => match parse(&frame) {
                Ok((genl, checked)) if checked.is_valid() => {
                    let mut received = Received::new(CbType::Valid, frame);
                    received.genl = genl;
                    received.attributes = checked.attributes;
                    received
                }
                Ok((genl, checked)) => {
                    let mut received = Received::invalid(frame, Invalid::Policy(checked.rejected));
                    received.genl = genl;
                    received.attributes = checked.attributes;
                    received
                }
                Err(e) => Received::invalid(frame, Invalid::Decode(e.to_string())),
            },
        }
    }
}

impl<S: SocketIo + 'static> Dispatch for NetLink<S> {
    fn callbacks(&mut self) -> &mut Callbacks<Self> {
        &mut self.callbacks
    }
}

impl<S: SocketIo> std::fmt::Debug for NetLink<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetLink")
            .field("family_id", &self.family_id)
            .field("hdr_len", &self.hdr_len)
            .field("seq", &self.seq)
            .field("pending", &self.pending.len())
            .field("closed", &self.socket.is_none())
            .finish()
    }
}
