//! Compile-time registry mapping a stable string name to a process entry
//! point, so an OS-backed child (a freshly re-exec'd copy of the current
//! binary) can be told which body to run without transmitting a raw
//! function pointer across the exec boundary.

use std::collections::HashMap;

use once_cell::sync::OnceCell;
use thiserror::Error;

use crate::error::{BodyNotFound, DuplicateBodyName};
use crate::handle::Handle;

/// One registered process body: a stable name and its entry point.
///
/// Collected at link time via `inventory::submit!`; use the
/// [`crate::process_body!`] macro rather than constructing this directly.
pub struct ProcessBody {
    pub name: &'static str,
    pub entry: fn(Handle),
}

inventory::collect!(ProcessBody);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BodyLookupError {
    #[error(transparent)]
    NotFound(#[from] BodyNotFound),
    #[error(transparent)]
    Duplicate(#[from] DuplicateBodyName),
}

static REGISTRY: OnceCell<Result<HashMap<&'static str, fn(Handle)>, DuplicateBodyName>> =
    OnceCell::new();

fn registry() -> &'static Result<HashMap<&'static str, fn(Handle)>, DuplicateBodyName> {
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        for body in inventory::iter::<ProcessBody> {
            if map.insert(body.name, body.entry).is_some() {
                return Err(DuplicateBodyName(body.name.to_string()));
            }
        }
        Ok(map)
    })
}

/// Looks up the entry point registered under `name`.
pub fn lookup(name: &str) -> Result<fn(Handle), BodyLookupError> {
    match registry() {
        Err(duplicate) => Err(BodyLookupError::Duplicate(duplicate.clone())),
        Ok(map) => map
            .get(name)
            .copied()
            .ok_or_else(|| BodyLookupError::NotFound(BodyNotFound(name.to_string()))),
    }
}

/// Registers `fn_item` as an OS-backed process body under `name`.
///
/// ```ignore
/// fn pinger(handle: linkproc::Handle) { /* ... */ }
/// linkproc::process_body!("pinger" => pinger);
/// ```
#[macro_export]
macro_rules! process_body {
    ($name:expr => $entry:expr) => {
        $crate::inventory::submit! {
            $crate::ProcessBody {
                name: $name,
                entry: $entry,
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_name_is_not_found() {
        let err = lookup("definitely-not-registered-anywhere");
        assert!(matches!(err, Err(BodyLookupError::NotFound(_))));
    }
}
