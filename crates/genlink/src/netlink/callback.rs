//! Callback registry and dispatch for received messages.
//!
//! Every received frame is classified into a [`CbType`]. Handlers are
//! registered per ([`CbType`], [`CbKind`]) pair; registering again for the
//! same pair replaces the previous handler.
//!
//! Dispatch looks up the frame's type under the active kind first, then
//! under [`CbKind::Default`]. `Ack`, `Finish` and `Overrun` frames nobody
//! handles fall back to the `Invalid` handlers. A frame with no handler at
//! all is dropped.
//!
//! Handlers receive the connection itself and may call back into it
//! (send, receive, re-register) while they run. A handler that receives
//! from inside itself is invoked again for the nested frame.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::attr::Attribute;
use super::error::Result;
use super::genl::GenlMsgHdr;
use super::message::{Message, NlMsgHdr};
use super::policy::Rejection;

/// Classification of a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CbType {
    /// Family data that decoded and passed every policy.
    Valid,
    /// End of a multipart message (`NLMSG_DONE`).
    Finish,
    /// Data lost (`NLMSG_OVERRUN`).
    Overrun,
    /// Frame that carries nothing (`NLMSG_NOOP`).
    Skipped,
    /// Positive acknowledgement (`NLMSG_ERROR` with error 0).
    Ack,
    /// Kernel error, malformed data, policy violation or unexpected
    /// sequence number.
    Invalid,
}

impl CbType {
    /// Type whose handlers run when this one has none.
    fn fallback(self) -> Option<CbType> {
        match self {
            CbType::Ack | CbType::Finish | CbType::Overrun => Some(CbType::Invalid),
            CbType::Valid | CbType::Skipped | CbType::Invalid => None,
        }
    }
}

/// Which handler set a registration belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CbKind {
    /// Catch-all consulted after the active kind.
    Default,
    /// Built-in handlers logging each frame.
    Verbose,
    /// Built-in handlers logging each frame with a hex dump.
    Debug,
    /// Handlers supplied by the caller.
    Custom,
}

/// Key of a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CbKey {
    pub cb_type: CbType,
    pub kind: CbKind,
}

impl CbKey {
    pub const fn new(cb_type: CbType, kind: CbKind) -> Self {
        Self { cb_type, kind }
    }
}

/// Why a frame was classified as [`CbType::Invalid`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalid {
    /// `NLMSG_ERROR` carrying a non-zero errno (positive value).
    Kernel { errno: i32 },
    /// The frame or its attribute stream could not be decoded.
    Decode(String),
    /// Attributes outside their policy bounds.
    Policy(Vec<Rejection>),
    /// Sequence number differs from the last request.
    Sequence { expected: u32, actual: u32 },
}

impl fmt::Display for Invalid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invalid::Kernel { errno } => write!(
                f,
                "kernel error: {} (errno {})",
                std::io::Error::from_raw_os_error(*errno),
                errno
            ),
            Invalid::Decode(reason) => write!(f, "malformed message: {}", reason),
            Invalid::Policy(rejected) => {
                write!(f, "{} attribute(s) rejected by policy", rejected.len())
            }
            Invalid::Sequence { expected, actual } => {
                write!(f, "sequence mismatch: expected {}, got {}", expected, actual)
            }
        }
    }
}

/// A received frame, classified and parsed, as handed to a handler.
#[derive(Debug, Clone)]
pub struct Received {
    /// How the frame was classified.
    pub cb_type: CbType,
    /// The base header.
    pub header: NlMsgHdr,
    /// The generic header, when the frame was parsed by the generic layer.
    pub genl: Option<GenlMsgHdr>,
    /// Attributes that passed validation (or had no policy), in wire order.
    pub attributes: Vec<Attribute>,
    /// Set when `cb_type` is [`CbType::Invalid`].
    pub invalid: Option<Invalid>,
    /// For `NLMSG_ERROR` frames, the error field (0 for an ACK).
    pub error: Option<i32>,
    /// The raw frame.
    pub message: Message,
}

impl Received {
    pub(crate) fn new(cb_type: CbType, message: Message) -> Self {
        Self {
            cb_type,
            header: message.parse_header(),
            genl: None,
            attributes: Vec::new(),
            invalid: None,
            error: None,
            message,
        }
    }

    pub(crate) fn invalid(message: Message, reason: Invalid) -> Self {
        let mut received = Self::new(CbType::Invalid, message);
        received.invalid = Some(reason);
        received
    }

    pub fn is_valid(&self) -> bool {
        self.cb_type == CbType::Valid
    }

    /// Positive errno of a kernel error frame.
    pub fn errno(&self) -> Option<i32> {
        match self.invalid {
            Some(Invalid::Kernel { errno }) => Some(errno),
            _ => None,
        }
    }

    /// First accepted attribute of the given type.
    pub fn attr(&self, kind: u16) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.kind() == kind)
    }

    /// Generic netlink command, if the generic header was parsed.
    pub fn cmd(&self) -> Option<u8> {
        self.genl.map(|h| h.cmd)
    }

    /// Generic netlink version, if the generic header was parsed.
    pub fn version(&self) -> Option<u8> {
        self.genl.map(|h| h.version)
    }
}

/// What [`recv`](crate::netlink::NetLink::recv) did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Classification of the frame.
    pub cb_type: CbType,
    /// Key of the handler that ran, or `None` if the frame was dropped.
    pub handled_by: Option<CbKey>,
}

impl Outcome {
    pub fn is_dropped(&self) -> bool {
        self.handled_by.is_none()
    }
}

/// A message handler. `C` is the connection the handler is registered on.
///
/// Handlers are shared so one can stay registered while it runs; state
/// they mutate lives behind a `Cell`/`RefCell` or in the connection.
pub type Handler<C> = Rc<dyn Fn(&mut C, &Received) -> Result<()>>;

/// Handler table of one connection.
pub struct Callbacks<C> {
    handlers: HashMap<CbKey, Handler<C>>,
    active: CbKind,
}

impl<C: 'static> Callbacks<C> {
    /// Create a table holding the built-in `Verbose` and `Debug` handlers,
    /// with `Custom` as the active kind.
    pub fn new() -> Self {
        let mut callbacks = Self {
            handlers: HashMap::new(),
            active: CbKind::Custom,
        };
        for cb_type in [
            CbType::Valid,
            CbType::Finish,
            CbType::Overrun,
            CbType::Skipped,
            CbType::Ack,
            CbType::Invalid,
        ] {
            callbacks.set(cb_type, CbKind::Verbose, log_verbose::<C>);
            callbacks.set(cb_type, CbKind::Debug, log_debug::<C>);
        }
        callbacks
    }
}

impl<C: 'static> Default for Callbacks<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Callbacks<C> {
    /// Register a handler, replacing any handler under the same key.
    pub fn set<F>(&mut self, cb_type: CbType, kind: CbKind, handler: F)
    where
        F: Fn(&mut C, &Received) -> Result<()> + 'static,
    {
        self.handlers
            .insert(CbKey::new(cb_type, kind), Rc::new(handler));
    }

    /// Remove the handler under a key. Returns whether one was registered.
    pub fn clear(&mut self, cb_type: CbType, kind: CbKind) -> bool {
        self.handlers.remove(&CbKey::new(cb_type, kind)).is_some()
    }

    /// Check if a handler is registered under a key.
    pub fn contains(&self, cb_type: CbType, kind: CbKind) -> bool {
        self.handlers.contains_key(&CbKey::new(cb_type, kind))
    }

    /// The kind consulted before [`CbKind::Default`].
    pub fn active_kind(&self) -> CbKind {
        self.active
    }

    pub fn set_active_kind(&mut self, kind: CbKind) {
        self.active = kind;
    }

    /// First registered handler for a frame of type `cb_type`.
    fn resolve(&self, cb_type: CbType) -> Option<(CbKey, Handler<C>)> {
        let kinds = [self.active, CbKind::Default];
        let kinds = if self.active == CbKind::Default {
            &kinds[..1]
        } else {
            &kinds[..]
        };

        std::iter::once(cb_type)
            .chain(cb_type.fallback())
            .flat_map(|t| kinds.iter().map(move |&k| CbKey::new(t, k)))
            .find_map(|key| self.handlers.get(&key).map(|h| (key, Rc::clone(h))))
    }
}

impl<C> fmt::Debug for Callbacks<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.handlers.keys().collect();
        keys.sort_by_key(|k| format!("{:?}", k));
        f.debug_struct("Callbacks")
            .field("active", &self.active)
            .field("registered", &keys)
            .finish()
    }
}

/// Connections that own a handler table.
pub trait Dispatch: Sized + 'static {
    fn callbacks(&mut self) -> &mut Callbacks<Self>;
}

/// Run the handler selected for `msg` on `ctx`.
///
/// The handler is cloned out of the table before it runs, so it can borrow
/// `ctx` mutably, replace itself, and be selected again by a nested
/// dispatch.
pub(crate) fn dispatch<C: Dispatch>(ctx: &mut C, msg: &Received) -> Result<Outcome> {
    let Some((key, handler)) = ctx.callbacks().resolve(msg.cb_type) else {
        tracing::trace!(cb_type = ?msg.cb_type, seq = msg.header.nlmsg_seq, "no handler, dropping");
        return Ok(Outcome {
            cb_type: msg.cb_type,
            handled_by: None,
        });
    };

    tracing::trace!(?key, seq = msg.header.nlmsg_seq, "dispatching");
    handler(ctx, msg).map(|()| Outcome {
        cb_type: msg.cb_type,
        handled_by: Some(key),
    })
}

fn log_verbose<C>(_: &mut C, msg: &Received) -> Result<()> {
    let h = &msg.header;
    match &msg.invalid {
        Some(reason) => tracing::warn!(
            len = h.nlmsg_len,
            msg_type = h.nlmsg_type,
            seq = h.nlmsg_seq,
            %reason,
            "invalid netlink message"
        ),
        None => tracing::info!(
            cb_type = ?msg.cb_type,
            len = h.nlmsg_len,
            msg_type = h.nlmsg_type,
            flags = h.nlmsg_flags,
            seq = h.nlmsg_seq,
            pid = h.nlmsg_pid,
            attrs = msg.attributes.len(),
            "netlink message"
        ),
    }
    Ok(())
}

fn log_debug<C>(ctx: &mut C, msg: &Received) -> Result<()> {
    log_verbose(ctx, msg)?;
    for (i, chunk) in msg.message.as_bytes().chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        tracing::debug!("{:04x}: {}", i * 16, hex.join(" "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Ctx {
        callbacks: Option<Callbacks<Ctx>>,
        seen: Vec<&'static str>,
    }

    impl Dispatch for Ctx {
        fn callbacks(&mut self) -> &mut Callbacks<Self> {
            self.callbacks.get_or_insert_with(Callbacks::new)
        }
    }

    fn frame(cb_type: CbType) -> Received {
        Received::new(cb_type, Message::new(0x20, 0))
    }

    #[test]
    fn test_custom_handler_runs() {
        let mut ctx = Ctx::default();
        ctx.callbacks().set(CbType::Valid, CbKind::Custom, |c: &mut Ctx, _| {
            c.seen.push("custom");
            Ok(())
        });

        let outcome = dispatch(&mut ctx, &frame(CbType::Valid)).unwrap();
        assert_eq!(
            outcome.handled_by,
            Some(CbKey::new(CbType::Valid, CbKind::Custom))
        );
        assert_eq!(ctx.seen, vec!["custom"]);
    }

    #[test]
    fn test_last_registration_wins() {
        let mut ctx = Ctx::default();
        ctx.callbacks().set(CbType::Valid, CbKind::Custom, |c: &mut Ctx, _| {
            c.seen.push("first");
            Ok(())
        });
        ctx.callbacks().set(CbType::Valid, CbKind::Custom, |c: &mut Ctx, _| {
            c.seen.push("second");
            Ok(())
        });

        dispatch(&mut ctx, &frame(CbType::Valid)).unwrap();
        assert_eq!(ctx.seen, vec!["second"]);
    }

    #[test]
    fn test_default_kind_is_fallback() {
        let mut ctx = Ctx::default();
        ctx.callbacks().set(CbType::Invalid, CbKind::Default, |c: &mut Ctx, _| {
            c.seen.push("default");
            Ok(())
        });

        let outcome = dispatch(&mut ctx, &frame(CbType::Invalid)).unwrap();
        assert_eq!(
            outcome.handled_by,
            Some(CbKey::new(CbType::Invalid, CbKind::Default))
        );
        assert_eq!(ctx.seen, vec!["default"]);
    }

    #[test]
    fn test_unhandled_frame_is_dropped() {
        let mut ctx = Ctx::default();
        let outcome = dispatch(&mut ctx, &frame(CbType::Valid)).unwrap();
        assert!(outcome.is_dropped());
        assert!(ctx.seen.is_empty());
    }

    #[test]
    fn test_ack_falls_back_to_invalid() {
        let mut ctx = Ctx::default();
        ctx.callbacks().set(CbType::Invalid, CbKind::Custom, |c: &mut Ctx, _| {
            c.seen.push("invalid");
            Ok(())
        });

        let outcome = dispatch(&mut ctx, &frame(CbType::Ack)).unwrap();
        assert_eq!(outcome.cb_type, CbType::Ack);
        assert_eq!(
            outcome.handled_by,
            Some(CbKey::new(CbType::Invalid, CbKind::Custom))
        );

        ctx.callbacks().set(CbType::Ack, CbKind::Custom, |c: &mut Ctx, _| {
            c.seen.push("ack");
            Ok(())
        });
        dispatch(&mut ctx, &frame(CbType::Ack)).unwrap();
        assert_eq!(ctx.seen, vec!["invalid", "ack"]);
    }

    #[test]
    fn test_valid_never_falls_back_to_invalid() {
        let mut ctx = Ctx::default();
        ctx.callbacks().set(CbType::Invalid, CbKind::Custom, |_: &mut Ctx, _| Ok(()));
        assert!(dispatch(&mut ctx, &frame(CbType::Valid)).unwrap().is_dropped());
    }

    #[test]
    fn test_builtin_kinds() {
        let mut ctx = Ctx::default();
        ctx.callbacks().set_active_kind(CbKind::Debug);
        let outcome = dispatch(&mut ctx, &frame(CbType::Valid)).unwrap();
        assert_eq!(
            outcome.handled_by,
            Some(CbKey::new(CbType::Valid, CbKind::Debug))
        );

        assert!(ctx.callbacks().clear(CbType::Valid, CbKind::Debug));
        assert!(dispatch(&mut ctx, &frame(CbType::Valid)).unwrap().is_dropped());
    }

    #[test]
    fn test_handler_can_replace_itself() {
        let mut ctx = Ctx::default();
        ctx.callbacks().set(CbType::Valid, CbKind::Custom, |c: &mut Ctx, _| {
            c.seen.push("old");
            c.callbacks().set(CbType::Valid, CbKind::Custom, |c: &mut Ctx, _| {
                c.seen.push("new");
                Ok(())
            });
            Ok(())
        });

        dispatch(&mut ctx, &frame(CbType::Valid)).unwrap();
        dispatch(&mut ctx, &frame(CbType::Valid)).unwrap();
        assert_eq!(ctx.seen, vec!["old", "new"]);
    }

    #[test]
    fn test_handler_can_clear_itself() {
        let mut ctx = Ctx::default();
        ctx.callbacks().set(CbType::Valid, CbKind::Custom, |c: &mut Ctx, _| {
            c.seen.push("once");
            c.callbacks().clear(CbType::Valid, CbKind::Custom);
            Ok(())
        });

        dispatch(&mut ctx, &frame(CbType::Valid)).unwrap();
        assert!(dispatch(&mut ctx, &frame(CbType::Valid)).unwrap().is_dropped());
        assert_eq!(ctx.seen, vec!["once"]);
    }

    #[test]
    fn test_nested_dispatch_reaches_running_handler() {
        let mut ctx = Ctx::default();
        ctx.callbacks().set(CbType::Valid, CbKind::Default, |c: &mut Ctx, _| {
            c.seen.push("default");
            Ok(())
        });
        ctx.callbacks().set(CbType::Valid, CbKind::Custom, |c: &mut Ctx, msg| {
            c.seen.push("custom");
            if c.seen.len() == 1 {
                let inner = dispatch(c, msg)?;
                assert_eq!(inner.handled_by.map(|k| k.kind), Some(CbKind::Custom));
            }
            Ok(())
        });

        dispatch(&mut ctx, &frame(CbType::Valid)).unwrap();
        assert_eq!(ctx.seen, vec!["custom", "custom"]);
    }

    #[test]
    fn test_cleared_handler_finishes_running() {
        let mut ctx = Ctx::default();
        ctx.callbacks().set(CbType::Valid, CbKind::Custom, |c: &mut Ctx, _| {
            c.callbacks().clear(CbType::Valid, CbKind::Custom);
            c.seen.push("after clear");
            Ok(())
        });

        let outcome = dispatch(&mut ctx, &frame(CbType::Valid)).unwrap();
        assert_eq!(
            outcome.handled_by,
            Some(CbKey::new(CbType::Valid, CbKind::Custom))
        );
        assert_eq!(ctx.seen, vec!["after clear"]);
    }

    #[test]
    fn test_handler_error_propagates() {
        let mut ctx = Ctx::default();
        ctx.callbacks().set(CbType::Valid, CbKind::Custom, |_: &mut Ctx, _| {
            Err(crate::netlink::Error::InvalidMessage("boom".into()))
        });
        assert!(dispatch(&mut ctx, &frame(CbType::Valid)).is_err());
        // The handler is still registered afterwards.
        assert!(ctx.callbacks().contains(CbType::Valid, CbKind::Custom));
    }

    #[test]
    fn test_invalid_display() {
        let reason = Invalid::Sequence {
            expected: 3,
            actual: 9,
        };
        assert_eq!(reason.to_string(), "sequence mismatch: expected 3, got 9");
        assert!(
            Invalid::Policy(vec![])
                .to_string()
                .contains("rejected by policy")
        );
    }
}
