//! Attribute policies for validating inbound messages.
//!
//! A [`PolicySet`] maps attribute types to length bounds. Received
//! attributes are checked against it before they reach a handler:
//! attributes outside their bounds are split off as [`Rejection`]s and the
//! frame is routed to the INVALID callback.
//!
//! # Example
//!
//! ```
//! use genlink::netlink::policy::{AttributePolicy, PolicySet};
//! use genlink::netlink::attr::Attribute;
//!
//! let policies: PolicySet = [AttributePolicy::new(1, 0, 100)].into_iter().collect();
//!
//! let checked = policies.validate(vec![
//!     Attribute::new(1, b"hello".to_vec()),
//!     Attribute::new(1, vec![0; 200]),
//!     Attribute::new(9, b"no policy".to_vec()),
//! ]);
//!
//! assert_eq!(checked.attributes.len(), 2);
//! assert_eq!(checked.rejected.len(), 1);
//! assert!(!checked.is_valid());
//! ```

use std::collections::HashMap;
use std::fmt;

use super::attr::Attribute;

/// Length bounds for one attribute type.
///
/// Bounds apply to the payload, not counting the 4-byte attribute header,
/// and are inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttributePolicy {
    /// Attribute type the policy applies to.
    pub kind: u16,
    /// Minimum payload length.
    pub min_len: usize,
    /// Maximum payload length.
    pub max_len: usize,
}

impl AttributePolicy {
    /// Create a policy accepting payloads of `min_len..=max_len` bytes.
    pub const fn new(kind: u16, min_len: usize, max_len: usize) -> Self {
        Self {
            kind,
            min_len,
            max_len,
        }
    }

    /// Accept exactly `len` bytes (fixed-size integers).
    pub const fn exact(kind: u16, len: usize) -> Self {
        Self::new(kind, len, len)
    }

    /// Accept up to `max_len` bytes.
    pub const fn at_most(kind: u16, max_len: usize) -> Self {
        Self::new(kind, 0, max_len)
    }

    /// Accept at least `min_len` bytes.
    pub const fn at_least(kind: u16, min_len: usize) -> Self {
        Self::new(kind, min_len, usize::MAX)
    }

    /// Check whether a payload length satisfies the bounds.
    pub fn allows(&self, len: usize) -> bool {
        self.min_len <= len && len <= self.max_len
    }

    /// Check an attribute against this policy.
    pub fn check(&self, attr: &Attribute) -> Result<(), Rejection> {
        let len = attr.data().len();
        if self.allows(len) {
            Ok(())
        } else {
            Err(Rejection {
                kind: attr.kind(),
                len,
                min_len: self.min_len,
                max_len: self.max_len,
            })
        }
    }
}

/// An attribute that failed its policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Attribute type.
    pub kind: u16,
    /// Payload length that was received.
    pub len: usize,
    /// Minimum allowed by the policy.
    pub min_len: usize,
    /// Maximum allowed by the policy.
    pub max_len: usize,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attribute {}: payload of {} bytes outside [{}, {}]",
            self.kind, self.len, self.min_len, self.max_len
        )
    }
}

/// Attributes split by the outcome of policy validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validated {
    /// Attributes that passed (or had no policy), in wire order.
    pub attributes: Vec<Attribute>,
    /// Attributes that failed their policy, in wire order.
    pub rejected: Vec<Rejection>,
}

impl Validated {
    /// Check if every attribute passed.
    pub fn is_valid(&self) -> bool {
        self.rejected.is_empty()
    }

    /// First accepted attribute of the given type.
    pub fn get(&self, kind: u16) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.kind() == kind)
    }
}

/// Policies keyed by attribute type.
///
/// Types without a policy are passed through unvalidated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySet {
    policies: HashMap<u16, AttributePolicy>,
}

impl PolicySet {
    /// Create an empty set (every attribute passes).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a policy, replacing any existing policy for the same type.
    pub fn insert(&mut self, policy: AttributePolicy) -> Option<AttributePolicy> {
        self.policies.insert(policy.kind, policy)
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, policy: AttributePolicy) -> Self {
        self.insert(policy);
        self
    }

    /// Policy for an attribute type.
    pub fn get(&self, kind: u16) -> Option<&AttributePolicy> {
        self.policies.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Iterate over the policies in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &AttributePolicy> {
        self.policies.values()
    }

    /// Split decoded attributes into accepted and rejected.
    pub fn validate(&self, attrs: Vec<Attribute>) -> Validated {
        let mut out = Validated::default();
        for attr in attrs {
            let verdict = match self.policies.get(&attr.kind()) {
                Some(policy) => policy.check(&attr),
                None => Ok(()),
            };
            match verdict {
                Ok(()) => out.attributes.push(attr),
                Err(rejection) => out.rejected.push(rejection),
            }
        }
        out
    }
}

impl FromIterator<AttributePolicy> for PolicySet {
    fn from_iter<I: IntoIterator<Item = AttributePolicy>>(iter: I) -> Self {
        let mut set = Self::new();
        for policy in iter {
            set.insert(policy);
        }
        set
    }
}

impl From<Vec<AttributePolicy>> for PolicySet {
    fn from(policies: Vec<AttributePolicy>) -> Self {
        policies.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_are_inclusive() {
        let policy = AttributePolicy::new(1, 2, 4);
        assert!(!policy.allows(1));
        assert!(policy.allows(2));
        assert!(policy.allows(4));
        assert!(!policy.allows(5));
    }

    #[test]
    fn test_exact() {
        let policy = AttributePolicy::exact(3, 4);
        assert!(policy.check(&Attribute::new(3, 1u32.to_ne_bytes().to_vec())).is_ok());
        let err = policy.check(&Attribute::new(3, vec![1, 2])).unwrap_err();
        assert_eq!(
            err,
            Rejection {
                kind: 3,
                len: 2,
                min_len: 4,
                max_len: 4
            }
        );
        assert_eq!(err.to_string(), "attribute 3: payload of 2 bytes outside [4, 4]");
    }

    #[test]
    fn test_inverted_bounds_reject_everything() {
        let policy = AttributePolicy::new(1, 10, 2);
        assert!((0..16).all(|len| !policy.allows(len)));
    }

    #[test]
    fn test_last_insert_wins() {
        let mut set = PolicySet::new();
        set.insert(AttributePolicy::at_most(1, 4));
        let old = set.insert(AttributePolicy::at_most(1, 8));
        assert_eq!(old, Some(AttributePolicy::at_most(1, 4)));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(1).unwrap().max_len, 8);
    }

    #[test]
    fn test_validate_passes_unknown_types() {
        let set = PolicySet::new().with(AttributePolicy::at_most(1, 3));
        let checked = set.validate(vec![
            Attribute::new(1, b"abcd".to_vec()),
            Attribute::new(2, vec![0; 1024]),
            Attribute::new(1, b"ok".to_vec()),
        ]);

        assert!(!checked.is_valid());
        assert_eq!(checked.rejected.len(), 1);
        assert_eq!(checked.rejected[0].len, 4);
        let kinds: Vec<u16> = checked.attributes.iter().map(|a| a.kind()).collect();
        assert_eq!(kinds, vec![2, 1]);
        assert_eq!(checked.get(1).unwrap().data(), b"ok");
    }

    #[test]
    fn test_empty_set_accepts_all() {
        let checked = PolicySet::new().validate(vec![Attribute::new(7, vec![])]);
        assert!(checked.is_valid());
        assert_eq!(checked.attributes.len(), 1);
    }
}
