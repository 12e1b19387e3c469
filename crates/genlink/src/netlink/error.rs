//! Error types for netlink operations.

use std::io;

/// Result type for netlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during netlink operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Kernel returned an error code.
    #[error("kernel error: {message} (errno {errno})")]
    Kernel {
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Message was truncated.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected message length.
        expected: usize,
        /// Actual bytes available.
        actual: usize,
    },

    /// An attribute declares more bytes than the buffer holds.
    #[error(
        "attribute at offset {offset} declares {declared} bytes but only {remaining} remain"
    )]
    Decode {
        /// Offset of the attribute header in the attribute stream.
        offset: usize,
        /// Length declared in the attribute header.
        declared: usize,
        /// Bytes left in the stream at that offset.
        remaining: usize,
    },

    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Invalid attribute format.
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    /// The kernel does not know the requested Generic Netlink family.
    #[error("generic netlink family not found: {name}")]
    FamilyNotFound {
        /// The family name that was looked up.
        name: String,
    },

    /// Family resolution failed for a reason other than an unknown name.
    #[error("failed to resolve generic netlink family {name}: {source}")]
    Resolution {
        /// The family name that was looked up.
        name: String,
        /// What went wrong while talking to the control family.
        #[source]
        source: Box<Error>,
    },

    /// The family has no multicast group with this name.
    #[error("multicast group {group} not found in family {family}")]
    GroupNotFound {
        /// The family that was searched.
        family: String,
        /// The group name that was not found.
        group: String,
    },

    /// No reply arrived before the receive timeout expired.
    #[error("timed out waiting for a netlink message")]
    Timeout,

    /// The connection was closed.
    #[error("netlink connection is closed")]
    Closed,
}

impl Error {
    /// Create a kernel error from an errno value.
    ///
    /// `errno` is the negative value carried by `NLMSG_ERROR`.
    pub fn from_errno(errno: i32) -> Self {
        let errno = errno.wrapping_neg();
        let message = io::Error::from_raw_os_error(errno).to_string();
        Self::Kernel { errno, message }
    }

    /// Check if this is a "not found" error (ENOENT, ENODEV, unknown family).
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } => {
                matches!(*errno, 2 | 19) // ENOENT=2, ENODEV=19
            }
            Self::FamilyNotFound { .. } | Self::GroupNotFound { .. } => true,
            _ => false,
        }
    }

    /// Check if this is a permission error (EPERM, EACCES).
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } => {
                matches!(*errno, 1 | 13) // EPERM=1, EACCES=13
            }
            _ => false,
        }
    }

    /// Check if the receive timeout expired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Check if this error came out of family or group resolution.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            Self::FamilyNotFound { .. } | Self::Resolution { .. } | Self::GroupNotFound { .. }
        )
    }

    /// Get the errno value if this is a kernel error.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Kernel { errno, .. } => Some(*errno),
            Self::Resolution { source, .. } => source.errno(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_errno() {
        let err = Error::from_errno(-1); // EPERM
        assert!(err.is_permission_denied());
        assert_eq!(err.errno(), Some(1));
    }

    #[test]
    fn test_from_errno_extreme_value() {
        let err = Error::from_errno(i32::MIN);
        assert_eq!(err.errno(), Some(i32::MIN));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::from_errno(-2).is_not_found()); // ENOENT
        assert!(Error::from_errno(-19).is_not_found()); // ENODEV
        assert!(
            Error::FamilyNotFound {
                name: "custom_family".into()
            }
            .is_not_found()
        );
        assert!(!Error::Timeout.is_not_found());
    }

    #[test]
    fn test_resolution_errors() {
        let err = Error::Resolution {
            name: "echo".into(),
            source: Box::new(Error::from_errno(-13)),
        };
        assert!(err.is_resolution());
        assert_eq!(err.errno(), Some(13));
        assert!(err.to_string().contains("echo"));

        assert!(Error::FamilyNotFound { name: "x".into() }.is_resolution());
        assert!(!Error::Closed.is_resolution());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::FamilyNotFound {
            name: "custom_family".into(),
        };
        assert_eq!(
            err.to_string(),
            "generic netlink family not found: custom_family"
        );

        let err = Error::Decode {
            offset: 8,
            declared: 40,
            remaining: 12,
        };
        assert_eq!(
            err.to_string(),
            "attribute at offset 8 declares 40 bytes but only 12 remain"
        );

        let err = Error::GroupNotFound {
            family: "nlctrl".into(),
            group: "events".into(),
        };
        assert_eq!(
            err.to_string(),
            "multicast group events not found in family nlctrl"
        );
    }
}
