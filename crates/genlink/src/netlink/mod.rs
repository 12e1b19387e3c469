//! Blocking Generic Netlink protocol engine for Linux.
//!
//! The layers, bottom up:
//!
//! - [`attr`]: TLV attribute encoding and decoding
//! - [`policy`]: length bounds checked against received attributes
//! - [`message`]: the base header and the [`Message`] buffer
//! - [`NetLink`]: socket ownership, sequence numbers, classification of
//!   received frames and callback dispatch
//! - [`genl`]: the generic header, family resolution and
//!   [`GenericNetLink`](genl::GenericNetLink)
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use genlink::netlink::genl::GenericNetLink;
//! use genlink::netlink::{AttributePolicy, CbKind, CbType, PolicySet};
//!
//! # fn example() -> genlink::Result<()> {
//! let policies = PolicySet::new().with(AttributePolicy::new(1, 0, 300));
//! let mut conn = GenericNetLink::open("custom_family", policies)?;
//!
//! conn.modify_cb(CbType::Valid, CbKind::Custom, |_conn, msg| {
//!     println!("{:?}", msg.attr(1));
//!     Ok(())
//! });
//!
//! let mut msg = conn.message(1, 0);
//! msg.put_str(1, "ping")?;
//! conn.send(&mut msg)?;
//! conn.recv()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Callbacks
//!
//! Each received frame is classified as one of [`CbType`] and handed to
//! the handler registered for that type under the active [`CbKind`], or
//! under [`CbKind::Default`]. `Verbose` and `Debug` come with built-in
//! handlers that log every frame through `tracing`:
//!
//! ```ignore
//! conn.set_cb_kind(CbKind::Debug);
//! conn.recv()?; // logs the frame and a hex dump
//! ```

pub mod attr;
pub mod callback;
pub mod config;
pub mod connection;
mod error;
#[cfg(test)]
mod fixtures;
pub mod genl;
pub mod message;
pub mod policy;
mod socket;

pub use attr::{AttrIter, Attribute, NlAttr};
pub use callback::{CbKey, CbKind, CbType, Invalid, Outcome, Received};
pub use config::Config;
pub use connection::NetLink;
pub use error::{Error, Result};
pub use message::{Message, MessageIter, NLMSG_HDRLEN, NestToken, NlMsgHdr, NlMsgType};
pub use policy::{AttributePolicy, PolicySet, Rejection, Validated};
pub use socket::{GENL_PROTOCOL, NetlinkSocket, SocketIo};
