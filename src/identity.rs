use std::sync::atomic::{AtomicU64, Ordering};

/// A process-wide unique process identifier.
///
/// Identities are assigned monotonically from a single counter and never
/// reused, even after the process they named has terminated. Equality and
/// hashing are by this value alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Identity(u64);

static COUNTER: AtomicU64 = AtomicU64::new(1);

impl Identity {
    /// Returns a fresh, globally unique identity.
    pub(crate) fn next() -> Identity {
        Identity(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Reconstructs an identity previously handed out by [`Identity::next`].
    ///
    /// Used by an OS-backed child to recreate the identity its parent
    /// already assigned to it (carried across the re-exec boundary via an
    /// environment variable), never to mint a new one.
    pub(crate) fn from_raw(raw: u64) -> Identity {
        Identity(raw)
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::Identity;

    #[test]
    fn identities_are_distinct_and_increasing() {
        let a = Identity::next();
        let b = Identity::next();
        let c = Identity::next();
        assert!(a < b);
        assert!(b < c);
        assert_ne!(a, b);
    }
}
