//! URL-driven adaptive dispatch.
//!
//! An adaptive facade is a single instance of an extension point whose
//! methods pick a concrete implementation per call. The facade holds an
//! [`AdaptiveBinding`] and, per method, asks it to resolve the dispatch key
//! list against the request URL, falling back to the point's default name.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::contract::ExtensionPoint;
use crate::director::ExtensionAccessor;
use crate::error::{ExtensionError, Result};
use crate::url::RequestUrl;

/// Per-point dispatch handle held by an adaptive facade.
pub struct AdaptiveBinding<T: ?Sized> {
    accessor: ExtensionAccessor,
    default_name: Option<String>,
    _point: PhantomData<fn() -> Box<T>>,
}

impl<T: ?Sized> Clone for AdaptiveBinding<T> {
    fn clone(&self) -> Self {
        Self {
            accessor: self.accessor.clone(),
            default_name: self.default_name.clone(),
            _point: PhantomData,
        }
    }
}

impl<T: ExtensionPoint + ?Sized> AdaptiveBinding<T> {
    pub(crate) fn new(accessor: ExtensionAccessor, default_name: Option<String>) -> Self {
        Self {
            accessor,
            default_name,
            _point: PhantomData,
        }
    }

    /// Resolve the implementation a method call dispatches to.
    ///
    /// Walks `keys` in order, taking the first non-empty URL parameter as
    /// the extension name, then falls back to the point's default name.
    /// An empty key list uses the implicit key mangled from the point's
    /// simple name (`LoadBalance` → `load.balance`).
    pub fn select(
        &self,
        method: &str,
        keys: &[&str],
        url: Option<&RequestUrl>,
    ) -> Result<Arc<T>> {
        let url = url.ok_or_else(|| ExtensionError::MissingUrl {
            point: T::point_name().to_string(),
            method: method.to_string(),
        })?;

        let implicit: String;
        let implicit_keys: [&str; 1];
        let keys: &[&str] = if keys.is_empty() {
            implicit = default_dispatch_key(T::simple_name());
            implicit_keys = [implicit.as_str()];
            &implicit_keys
        } else {
            keys
        };

        let name = keys
            .iter()
            .find_map(|key| url.parameter(key).filter(|v| !v.is_empty()))
            .map(str::to_string)
            .or_else(|| self.default_name.clone())
            .ok_or_else(|| ExtensionError::NoDispatchName {
                point: T::point_name().to_string(),
                method: method.to_string(),
                keys: keys.iter().map(|k| k.to_string()).collect(),
            })?;

        self.accessor.loader::<T>()?.get(&name)
    }

    /// Failure for methods outside the facade's dispatch table.
    pub fn unsupported(&self, method: &str) -> ExtensionError {
        ExtensionError::Unsupported {
            point: T::point_name().to_string(),
            method: method.to_string(),
        }
    }

    /// The point's default extension name, if any.
    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }
}

/// Mangle a point's simple name into its implicit dispatch key:
/// each inner uppercase letter starts a new dot-separated segment.
pub fn default_dispatch_key(simple_name: &str) -> String {
    let mut key = String::with_capacity(simple_name.len() + 2);
    for (i, c) in simple_name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                key.push('.');
            }
            key.extend(c.to_lowercase());
        } else {
            key.push(c);
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dispatch_key_mangling() {
        assert_eq!(default_dispatch_key("LoadBalance"), "load.balance");
        assert_eq!(default_dispatch_key("Protocol"), "protocol");
        assert_eq!(default_dispatch_key("HttpBindingResolver"), "http.binding.resolver");
        assert_eq!(default_dispatch_key("codec"), "codec");
    }
}
