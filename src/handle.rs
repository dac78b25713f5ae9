use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::identity::Identity;
use crate::term::Envelope;

/// Where an [`Handle`]'s mailbox actually lives.
///
/// `Local` is a process in this address space (the root, or a thread-backed
/// child); sending is a direct channel send. `Broker` is an OS-backed child
/// reached through the runtime's transport broker; sending writes a framed
/// message to the child's stdin pipe.
#[derive(Clone)]
pub enum Route {
    Local(crossbeam_channel::Sender<Envelope>),
    Broker(Identity),
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::Local(_) => write!(f, "Route::Local"),
            Route::Broker(id) => write!(f, "Route::Broker({:?})", id),
        }
    }
}

/// An opaque, freely copyable reference to a process.
///
/// Equality and hashing are by [`identity`](Handle::identity) alone; the
/// name, route and liveness flag are carried for convenience and do not
/// participate in comparisons.
#[derive(Clone, Debug)]
pub struct Handle {
    identity: Identity,
    name: Arc<str>,
    route: Route,
    alive: Arc<AtomicBool>,
}

impl Handle {
    pub(crate) fn new(identity: Identity, name: impl Into<Arc<str>>, route: Route) -> Handle {
        Handle {
            identity,
            name: name.into(),
            route,
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn mark_dead(&self) {
        self.alive.store(false, Ordering::Release);
    }

    pub(crate) fn liveness_flag(&self) -> Arc<AtomicBool> {
        self.alive.clone()
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for Handle {}

impl std::hash::Hash for Handle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

/// The wire form of a handle: identity and name only.
///
/// A raw in-memory `Route::Local` sender cannot cross a process boundary, so
/// serializing a handle downgrades it to a routing descriptor the receiving
/// side resolves through the broker's routing table, per the cross-process
/// payload contract.
#[derive(serde::Serialize, serde::Deserialize)]
struct WireHandle {
    identity: Identity,
    name: String,
}

impl serde::Serialize for Handle {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        WireHandle {
            identity: self.identity,
            name: self.name.to_string(),
        }
        .serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Handle {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let wire = WireHandle::deserialize(deserializer)?;
        Ok(Handle {
            identity: wire.identity,
            name: wire.name.into(),
            route: Route::Broker(wire.identity),
            alive: Arc::new(AtomicBool::new(true)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_identity_only() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let a = Handle::new(Identity::next(), "a", Route::Local(tx.clone()));
        let b = Handle::new(a.identity(), "different-name", Route::Local(tx));
        assert_eq!(a, b);
    }

    #[test]
    fn name_survives_round_trip_through_wire_form() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let original = Handle::new(Identity::next(), "ponger", Route::Local(tx));
        let encoded = bincode::serialize(&original).unwrap();
        let decoded: Handle = bincode::deserialize(&encoded).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.name(), "ponger");
        assert!(matches!(decoded.route(), Route::Broker(_)));
    }
}
