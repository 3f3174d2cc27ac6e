//! Thin bindings for specific services.
//!
//! Each handle is a typed view of an element in a [`Session`]: getters read
//! the cache, setters and methods go through the session's admission control.
//! Handles hold only a path and stay cheap to clone; once the element is
//! removed every operation fails with `StaleReference`.

pub mod bluez;
pub mod connman;
pub mod nm;

use crate::Result;
use crate::Session;
use crate::api::models::BusError;
use crate::types::value::PropertyName;

/// Resolves `path` and checks that it implements `interface`.
pub(crate) fn typed_path(session: &Session, path: &str, interface: &str) -> Result<PropertyName> {
    let element = session
        .element_get(path)
        .ok_or_else(|| BusError::StaleReference(path.to_string()))?;
    if element.interface() != interface {
        return Err(BusError::TypeMismatch {
            expected: interface.to_string(),
            found: element.interface().to_string(),
        });
    }
    Ok(element.path_name().clone())
}
