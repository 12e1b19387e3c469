//! Resolve Generic Netlink families by name.
//!
//! Prints the id, version and multicast groups of each family named on the
//! command line (default: `nlctrl`).
//!
//! Run with: cargo run -p genlink --example genl_resolve -- nlctrl devlink ethtool
//!
//! Set `RUST_LOG=genlink=trace` to see the control family exchange.

use std::time::Duration;

use genlink::netlink::genl::GenericNetLink;
use genlink::netlink::{Config, PolicySet};
use tracing_subscriber::EnvFilter;

fn main() -> genlink::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut names: Vec<String> = std::env::args().skip(1).collect();
    if names.is_empty() {
        names.push("nlctrl".to_string());
    }

    let config = Config::new().recv_timeout(Duration::from_secs(2));

    for name in &names {
        match GenericNetLink::open_with_config(name, PolicySet::new(), config.clone()) {
            Ok(conn) => {
                let family = conn.family();
                println!("{}: id {} version {}", family.name, family.id, family.version);
                println!("  header size: {}", family.hdr_size);
                println!("  max attribute: {}", family.max_attr);

                let mut groups: Vec<_> = family.mcast_groups.iter().collect();
                groups.sort_by_key(|(_, id)| **id);
                for (group, id) in groups {
                    println!("  group {}: {}", group, id);
                }
            }
            Err(e) if e.is_not_found() => {
                println!("{}: not registered", name);
            }
            Err(e) => {
                eprintln!("{}: {}", name, e);
            }
        }
    }

    Ok(())
}
