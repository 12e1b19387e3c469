//! Common test utilities for integration tests.

use std::sync::Once;
use std::time::Duration;

use genlink::netlink::{Config, NetlinkSocket};

static TRACING: Once = Once::new();

/// Install a tracing subscriber honouring `RUST_LOG`, once per process.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Check if a generic netlink socket can be opened here.
pub fn genl_available() -> bool {
    NetlinkSocket::new().is_ok()
}

/// Configuration that never blocks a test for long.
pub fn test_config() -> Config {
    Config::new().recv_timeout(Duration::from_secs(2))
}

/// Skip the test if generic netlink sockets are unavailable.
#[macro_export]
macro_rules! require_genl {
    () => {
        crate::common::init_tracing();
        if !crate::common::genl_available() {
            eprintln!("Skipping test: generic netlink unavailable");
            return Ok(());
        }
    };
}
