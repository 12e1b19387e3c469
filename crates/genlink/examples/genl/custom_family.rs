//! Talk to a custom Generic Netlink family.
//!
//! The `custom_family` kernel module registers one attribute and two
//! commands:
//!
//! - `MSG_A` (1): a string of at most 300 bytes
//! - `SEND` (1): user space sends `MSG_A`, the kernel logs it
//! - `RECV` (2): the kernel's reply, carrying `MSG_A`
//!
//! Run with: cargo run -p genlink --example genl_custom_family -- "Just testing..."
//!
//! Note: Requires the module to be loaded.

use std::time::Duration;

use genlink::netlink::genl::GenericNetLink;
use genlink::netlink::{AttributePolicy, CbKind, CbType, Config, PolicySet};
use tracing_subscriber::EnvFilter;

const FAMILY_NAME: &str = "custom_family";

const MSG_A: u16 = 1;

const CMD_SEND: u8 = 1;
const CMD_RECV: u8 = 2;

fn main() -> genlink::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let text = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Just testing...".to_string());

    let policies = PolicySet::new().with(AttributePolicy::new(MSG_A, 0, 300));
    let config = Config::new().recv_timeout(Duration::from_secs(5));

    let mut family = match GenericNetLink::open_with_config(FAMILY_NAME, policies, config) {
        Ok(family) => family,
        Err(e) => {
            eprintln!("Failed to resolve {}: {}", FAMILY_NAME, e);
            eprintln!("Make sure the custom_family kernel module is loaded.");
            return Ok(());
        }
    };

    family.modify_cb(CbType::Valid, CbKind::Custom, |conn, msg| {
        let parsed = conn.parse_message(&msg.message)?;
        if parsed.cmd != CMD_RECV {
            return Ok(());
        }

        println!("[+] Received RECV command");
        for attr in parsed.attributes.iter().filter(|a| a.kind() == MSG_A) {
            println!("   * Received {} bytes from kernel", attr.len());
            println!("   * Data: {:?}", attr.as_str()?);
        }
        Ok(())
    });

    family.modify_cb(CbType::Invalid, CbKind::Custom, |_, msg| {
        if let Some(reason) = &msg.invalid {
            eprintln!("[-] Invalid message: {}", reason);
        }
        Ok(())
    });

    let mut msg = family.message(CMD_SEND, 0);
    msg.put_string(MSG_A, &text)?;

    println!("[+] Sending a SEND command.");
    family.send(&mut msg)?;
    family.recv()?;

    Ok(())
}
