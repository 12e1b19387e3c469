//! Blocking Generic Netlink client for Linux.
//!
//! This crate implements the client side of the generic netlink protocol:
//! message framing, attribute encoding with alignment padding, policy
//! validation of received attributes, family name resolution through the
//! kernel's control family and dispatch of received frames to registered
//! callbacks.
//!
//! Everything is synchronous. Handlers run on the caller's thread inside
//! `recv()` and may send and receive on the same connection.
//!
//! # Features
//!
//! - `serde` - Serialize/deserialize `Config` and `AttributePolicy`
//! - `integration` - Tests against the running kernel
//!
//! # Example
//!
//! ```rust,no_run
//! use genlink::netlink::genl::GenericNetLink;
//! use genlink::netlink::PolicySet;
//!
//! fn main() -> genlink::Result<()> {
//!     let conn = GenericNetLink::open("nlctrl", PolicySet::new())?;
//!     println!("nlctrl has id {}", conn.family_id());
//!     Ok(())
//! }
//! ```

pub mod netlink;

// Re-export common types at crate root for convenience
pub use netlink::{Error, Message, NetLink, Result};
pub use netlink::genl::{GenericMessage, GenericNetLink};
