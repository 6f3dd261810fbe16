//! Wire versioning for mirror envelopes.
//!
//! Every envelope carries the version its sending bridge speaks. A receiving
//! bridge accepts envelopes whose major version matches its own and drops
//! the rest; minor versions are additive and interoperate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The wire version this build speaks.
pub const WIRE_VERSION: Version = Version::new(1, 0);

/// A `major.minor` wire version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    /// Incremented on breaking changes to the envelope layout.
    pub major: u8,
    /// Incremented on additive changes.
    pub minor: u8,
}

impl Version {
    /// Create a version.
    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Whether envelopes from a peer speaking `other` can be accepted.
    #[must_use]
    pub fn is_compatible_with(&self, other: &Version) -> bool {
        self.major == other.major
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl Default for Version {
    fn default() -> Self {
        WIRE_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minor_bumps_interoperate() {
        let newer = Version::new(WIRE_VERSION.major, WIRE_VERSION.minor + 1);
        assert!(WIRE_VERSION.is_compatible_with(&newer));
        assert!(newer.is_compatible_with(&WIRE_VERSION));
    }

    #[test]
    fn test_major_bump_is_breaking() {
        let next = Version::new(WIRE_VERSION.major + 1, 0);
        assert!(!next.is_compatible_with(&WIRE_VERSION));
        assert!(!WIRE_VERSION.is_compatible_with(&next));
    }

    #[test]
    fn test_default_is_current() {
        assert_eq!(Version::default(), WIRE_VERSION);
    }

    #[test]
    fn test_display() {
        assert_eq!(Version::new(1, 4).to_string(), "1.4");
    }
}
