//! Blocking generic netlink socket.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use bytes::BytesMut;
use netlink_sys::{Socket, SocketAddr, protocols};

use super::config::Config;
use super::error::{Error, Result};

/// Netlink protocol number of generic netlink (`NETLINK_GENERIC`).
pub const GENL_PROTOCOL: isize = protocols::NETLINK_GENERIC;

/// Datagram I/O used by a connection.
///
/// [`NetlinkSocket`] is the real implementation; anything that can move
/// whole netlink datagrams to and from the kernel can stand in for it.
pub trait SocketIo {
    /// Send one datagram to the kernel (port 0).
    fn send(&mut self, msg: &[u8]) -> Result<()>;

    /// Receive one datagram, blocking until it arrives or the receive
    /// timeout expires ([`Error::Timeout`]).
    fn recv(&mut self) -> Result<Vec<u8>>;

    /// Local port ID assigned by the kernel.
    fn pid(&self) -> u32;

    /// Bound how long [`recv`](Self::recv) may block.
    fn set_recv_timeout(&mut self, timeout: Option<Duration>) -> Result<()>;
}

/// Blocking `AF_NETLINK` / `NETLINK_GENERIC` socket.
pub struct NetlinkSocket {
    socket: Socket,
    /// Local port ID (assigned by kernel).
    pid: u32,
    recv_buffer_size: usize,
}

impl NetlinkSocket {
    /// Open a socket with the default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(&Config::default())
    }

    /// Open a socket, bind it and apply `config`.
    pub fn with_config(config: &Config) -> Result<Self> {
        let mut socket = Socket::new(GENL_PROTOCOL)?;

        // Bind to get a port ID
        let mut addr = SocketAddr::new(0, 0);
        socket.bind(&addr)?;
        socket.get_address(&mut addr)?;
        let pid = addr.port_number();

        if config.ext_ack {
            // Older kernels lack NETLINK_EXT_ACK; plain errors still work.
            socket.set_ext_ack(true).ok();
        }

        let mut this = Self {
            socket,
            pid,
            recv_buffer_size: config.recv_buffer_size,
        };
        this.set_recv_timeout(config.recv_timeout)?;

        tracing::debug!(pid, "opened generic netlink socket");
        Ok(this)
    }
}

impl SocketIo for NetlinkSocket {
    fn send(&mut self, msg: &[u8]) -> Result<()> {
        let kernel = SocketAddr::new(0, 0);
        let sent = self.socket.send_to(msg, &kernel, 0)?;
        if sent != msg.len() {
            return Err(Error::Truncated {
                expected: msg.len(),
                actual: sent,
            });
        }
        Ok(())
    }

    fn recv(&mut self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(self.recv_buffer_size);
        match self.socket.recv(&mut buf, 0) {
            Ok(_n) => Ok(buf.to_vec()),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Err(Error::Timeout)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn pid(&self) -> u32 {
        self.pid
    }

    fn set_recv_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        let tv = timeval(timeout);

        // SAFETY: the fd is owned by `self.socket` and stays open for the
        // call; `tv` is a valid timeval and the length matches its size.
        let ret = unsafe {
            libc::setsockopt(
                self.socket.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_RCVTIMEO,
                &tv as *const libc::timeval as *const libc::c_void,
                std::mem::size_of::<libc::timeval>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(())
    }
}

/// `SO_RCVTIMEO` value for a receive timeout.
///
/// A zero timeval means "block forever" to the kernel, so `None` maps to
/// zero and any `Some` timeout, however short, to at least 1 µs.
fn timeval(timeout: Option<Duration>) -> libc::timeval {
    let Some(d) = timeout else {
        return libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
    };
    let tv_sec = libc::time_t::try_from(d.as_secs()).unwrap_or(libc::time_t::MAX);
    let mut tv_usec = d.subsec_micros() as libc::suseconds_t;
    if tv_sec == 0 && tv_usec == 0 {
        tv_usec = 1;
    }
    libc::timeval { tv_sec, tv_usec }
}

impl AsRawFd for NetlinkSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

impl std::fmt::Debug for NetlinkSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetlinkSocket")
            .field("fd", &self.socket.as_raw_fd())
            .field("pid", &self.pid)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_back(socket: &NetlinkSocket) -> libc::timeval {
        let mut tv = libc::timeval {
            tv_sec: -1,
            tv_usec: -1,
        };
        let mut len = std::mem::size_of::<libc::timeval>() as libc::socklen_t;
        // SAFETY: `tv` and `len` are valid for writes and `len` holds the
        // size of `tv`.
        let ret = unsafe {
            libc::getsockopt(
                socket.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_RCVTIMEO,
                &mut tv as *mut libc::timeval as *mut libc::c_void,
                &mut len,
            )
        };
        assert_eq!(ret, 0, "getsockopt: {}", io::Error::last_os_error());
        tv
    }

    #[test]
    fn test_timeval_conversion() {
        let tv = timeval(None);
        assert_eq!((tv.tv_sec, tv.tv_usec), (0, 0));

        for short in [Duration::ZERO, Duration::from_nanos(1), Duration::from_nanos(500)] {
            let tv = timeval(Some(short));
            assert_eq!((tv.tv_sec, tv.tv_usec), (0, 1), "{:?}", short);
        }

        let tv = timeval(Some(Duration::from_millis(2500)));
        assert_eq!((tv.tv_sec, tv.tv_usec), (2, 500_000));

        // Whole seconds need no rounding.
        let tv = timeval(Some(Duration::from_secs(3)));
        assert_eq!((tv.tv_sec, tv.tv_usec), (3, 0));
    }

    #[test]
    fn test_sub_microsecond_timeout_reaches_socket() {
        let config = Config::default().recv_timeout(Duration::from_nanos(500));
        let mut socket = match NetlinkSocket::with_config(&config) {
            Ok(socket) => socket,
            Err(e) => {
                eprintln!("skipping: cannot open a generic netlink socket: {}", e);
                return;
            }
        };

        let tv = read_back(&socket);
        assert!(tv.tv_sec != 0 || tv.tv_usec != 0);
        assert!(matches!(socket.recv(), Err(Error::Timeout)));

        socket.set_recv_timeout(None).unwrap();
        let tv = read_back(&socket);
        assert_eq!((tv.tv_sec, tv.tv_usec), (0, 0));
    }
}
