//! Generic Netlink (GENL) support.
//!
//! Generic netlink multiplexes many kernel subsystems over one netlink
//! protocol. Each subsystem registers a *family* whose numeric id is
//! assigned at runtime and looked up by name through the control family
//! (`nlctrl`, id [`GENL_ID_CTRL`]).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ GenericNetLink                          │
//! │ (family binding, GENL callbacks)        │
//! └────────────────┬────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────┐
//! │ NetLink (seq numbering, classification) │
//! └────────────────┬────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────┐
//! │ NetlinkSocket (NETLINK_GENERIC)         │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use genlink::netlink::genl::GenericNetLink;
//! use genlink::netlink::PolicySet;
//!
//! # fn example() -> genlink::Result<()> {
//! let conn = GenericNetLink::open("nlctrl", PolicySet::new())?;
//! println!("nlctrl family ID: {}", conn.family_id());
//! # Ok(())
//! # }
//! ```

mod connection;
mod header;
mod message;

pub use connection::{FamilyInfo, GenericNetLink, ParsedMessage};
pub use header::{GENL_HDRLEN, GenlMsgHdr};
pub use message::GenericMessage;

// Control family constants (fixed, not dynamically assigned)
pub const GENL_ID_CTRL: u16 = 0x10;

/// Name of the control family.
pub const GENL_CTRL_NAME: &str = "nlctrl";

/// Control family commands
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlCmd {
    Unspec = 0,
    NewFamily = 1,
    DelFamily = 2,
    GetFamily = 3,
    NewOps = 4,
    DelOps = 5,
    GetOps = 6,
    NewMcastGrp = 7,
    DelMcastGrp = 8,
    GetMcastGrp = 9,
    GetPolicy = 10,
}

/// Control family attributes
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlAttr {
    Unspec = 0,
    FamilyId = 1,
    FamilyName = 2,
    Version = 3,
    HdrSize = 4,
    MaxAttr = 5,
    Ops = 6,
    McastGroups = 7,
    Policy = 8,
    OpPolicy = 9,
    Op = 10,
}

/// Control family multicast group attributes
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlAttrMcastGrp {
    Unspec = 0,
    Name = 1,
    Id = 2,
}
