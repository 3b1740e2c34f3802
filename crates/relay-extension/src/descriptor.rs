//! Provider descriptors: the discovery-time record of one concrete
//! extension implementation.
//!
//! A descriptor carries a stable impl path, the declared names, a
//! classification (*named*, *adaptive* or *wrapper*) and the tagged metadata
//! the runtime consults instead of runtime reflection. Named providers may
//! additionally carry an [`ActivateMeta`] record that opts them into
//! group-based auto-selection.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::director::ExtensionAccessor;
use crate::error::Result;
use crate::model::ScopeModel;

/// Constructor for a named or adaptive provider.
pub type ExtensionCtor<T> =
    Arc<dyn Fn(&InstanceContext<'_>) -> Result<Box<T>> + Send + Sync>;

/// Constructor for a wrapper provider; receives the instance being wrapped.
pub type WrapperCtor<T> =
    Arc<dyn Fn(Arc<T>, &InstanceContext<'_>) -> Result<Box<T>> + Send + Sync>;

/// Context handed to provider constructors.
///
/// Carries the scope model of the owning director, so a provider that needs
/// scope-level collaborators takes them at construction time.
pub struct InstanceContext<'a> {
    scope_model: &'a Arc<dyn ScopeModel>,
    accessor: &'a ExtensionAccessor,
}

impl<'a> InstanceContext<'a> {
    pub(crate) fn new(
        scope_model: &'a Arc<dyn ScopeModel>,
        accessor: &'a ExtensionAccessor,
    ) -> Self {
        Self {
            scope_model,
            accessor,
        }
    }

    /// Scope model of the director building the instance.
    pub fn scope_model(&self) -> &Arc<dyn ScopeModel> {
        self.scope_model
    }

    /// Accessor of the director building the instance.
    pub fn accessor(&self) -> &ExtensionAccessor {
        self.accessor
    }
}

/// Auto-activation metadata of a named provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateMeta {
    /// Groups the provider belongs to; empty matches every group query.
    pub groups: Vec<String>,
    /// URL conditions: `(key, Some(value))` requires an exact parameter
    /// match, `(key, None)` requires the parameter to be present and
    /// non-empty. Empty list matches every URL.
    pub values: Vec<(String, Option<String>)>,
    /// Impl paths that must be resolvable for the provider to be scanned in.
    pub on: Vec<String>,
    /// Numeric ordering tiebreaker; lower sorts first.
    pub order: i32,
    /// Names this provider must precede.
    pub before: Vec<String>,
    /// Names this provider must follow.
    pub after: Vec<String>,
}

impl ActivateMeta {
    /// Create an empty activate record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    /// Require `key=value` on the URL.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.push((key.into(), Some(value.into())));
        self
    }

    /// Require `key` to be present and non-empty on the URL.
    pub fn with_flag(mut self, key: impl Into<String>) -> Self {
        self.values.push((key.into(), None));
        self
    }

    /// Require an impl path to be resolvable before activation.
    pub fn with_on(mut self, path: impl Into<String>) -> Self {
        self.on.push(path.into());
        self
    }

    /// Set the numeric order.
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Require this provider to sort before the named one.
    pub fn with_before(mut self, name: impl Into<String>) -> Self {
        self.before.push(name.into());
        self
    }

    /// Require this provider to sort after the named one.
    pub fn with_after(mut self, name: impl Into<String>) -> Self {
        self.after.push(name.into());
        self
    }
}

/// Wrapper metadata: ordering and name filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapperMeta {
    /// Higher order wraps closer to the core instance.
    pub order: i32,
    /// When non-empty, the wrapper only applies to these extension names.
    pub matches: Vec<String>,
    /// Extension names the wrapper never applies to.
    pub mismatches: Vec<String>,
}

impl WrapperMeta {
    /// True when the wrapper applies to the named extension.
    pub fn applies_to(&self, name: &str) -> bool {
        let included =
            self.matches.is_empty() || self.matches.iter().any(|m| m == name);
        included && !self.mismatches.iter().any(|m| m == name)
    }
}

/// Classification of a provider.
pub enum ProviderKind<T: ?Sized> {
    /// A named implementation of the point.
    Named { ctor: ExtensionCtor<T> },
    /// The pre-declared adaptive implementation; at most one per point.
    Adaptive { ctor: ExtensionCtor<T> },
    /// A layering implementation constructed around another instance.
    Wrapper {
        ctor: WrapperCtor<T>,
        meta: WrapperMeta,
    },
}

impl<T: ?Sized> Clone for ProviderKind<T> {
    fn clone(&self) -> Self {
        match self {
            ProviderKind::Named { ctor } => ProviderKind::Named { ctor: ctor.clone() },
            ProviderKind::Adaptive { ctor } => ProviderKind::Adaptive { ctor: ctor.clone() },
            ProviderKind::Wrapper { ctor, meta } => ProviderKind::Wrapper {
                ctor: ctor.clone(),
                meta: meta.clone(),
            },
        }
    }
}

/// Discovery record of one concrete provider of an extension point.
pub struct ProviderDescriptor<T: ?Sized> {
    path: String,
    names: Vec<String>,
    kind: ProviderKind<T>,
    activate: Option<ActivateMeta>,
}

impl<T: ?Sized> Clone for ProviderDescriptor<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            names: self.names.clone(),
            kind: self.kind.clone(),
            activate: self.activate.clone(),
        }
    }
}

impl<T: ?Sized> ProviderDescriptor<T> {
    /// Describe a named provider.
    pub fn named<F>(path: impl Into<String>, ctor: F) -> Self
    where
        F: Fn(&InstanceContext<'_>) -> Result<Box<T>> + Send + Sync + 'static,
    {
        Self {
            path: path.into(),
            names: Vec::new(),
            kind: ProviderKind::Named {
                ctor: Arc::new(ctor),
            },
            activate: None,
        }
    }

    /// Describe the adaptive provider of the point.
    pub fn adaptive<F>(path: impl Into<String>, ctor: F) -> Self
    where
        F: Fn(&InstanceContext<'_>) -> Result<Box<T>> + Send + Sync + 'static,
    {
        Self {
            path: path.into(),
            names: Vec::new(),
            kind: ProviderKind::Adaptive {
                ctor: Arc::new(ctor),
            },
            activate: None,
        }
    }

    /// Describe a wrapper provider.
    pub fn wrapper<F>(path: impl Into<String>, ctor: F) -> Self
    where
        F: Fn(Arc<T>, &InstanceContext<'_>) -> Result<Box<T>> + Send + Sync + 'static,
    {
        Self {
            path: path.into(),
            names: Vec::new(),
            kind: ProviderKind::Wrapper {
                ctor: Arc::new(ctor),
                meta: WrapperMeta::default(),
            },
            activate: None,
        }
    }

    /// Add a declared name (alias) for the provider.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into());
        self
    }

    /// Attach activate metadata; only meaningful on named providers.
    pub fn with_activate(mut self, activate: ActivateMeta) -> Self {
        self.activate = Some(activate);
        self
    }

    /// Set the wrapper order; only meaningful on wrapper providers.
    pub fn with_order(mut self, order: i32) -> Self {
        if let ProviderKind::Wrapper { meta, .. } = &mut self.kind {
            meta.order = order;
        }
        self
    }

    /// Restrict the wrapper to the given extension names.
    pub fn with_matches<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let ProviderKind::Wrapper { meta, .. } = &mut self.kind {
            meta.matches.extend(names.into_iter().map(Into::into));
        }
        self
    }

    /// Exclude the wrapper from the given extension names.
    pub fn with_mismatches<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let ProviderKind::Wrapper { meta, .. } = &mut self.kind {
            meta.mismatches.extend(names.into_iter().map(Into::into));
        }
        self
    }

    /// Stable impl path identifying the provider.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Declared names of the provider.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Classification of the provider.
    pub fn kind(&self) -> &ProviderKind<T> {
        &self.kind
    }

    /// Activate metadata, if any.
    pub fn activate(&self) -> Option<&ActivateMeta> {
        self.activate.as_ref()
    }

    /// True for wrapper providers.
    pub fn is_wrapper(&self) -> bool {
        matches!(self.kind, ProviderKind::Wrapper { .. })
    }

    /// True for the adaptive provider.
    pub fn is_adaptive(&self) -> bool {
        matches!(self.kind, ProviderKind::Adaptive { .. })
    }

    /// Constructor of a named or adaptive provider.
    pub(crate) fn extension_ctor(&self) -> Option<&ExtensionCtor<T>> {
        match &self.kind {
            ProviderKind::Named { ctor } | ProviderKind::Adaptive { ctor } => Some(ctor),
            ProviderKind::Wrapper { .. } => None,
        }
    }

    /// Constructor and metadata of a wrapper provider.
    pub(crate) fn wrapper_parts(&self) -> Option<(&WrapperCtor<T>, &WrapperMeta)> {
        match &self.kind {
            ProviderKind::Wrapper { ctor, meta } => Some((ctor, meta)),
            _ => None,
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for ProviderDescriptor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            ProviderKind::Named { .. } => "named",
            ProviderKind::Adaptive { .. } => "adaptive",
            ProviderKind::Wrapper { .. } => "wrapper",
        };
        f.debug_struct("ProviderDescriptor")
            .field("path", &self.path)
            .field("names", &self.names)
            .field("kind", &kind)
            .field("activate", &self.activate)
            .finish()
    }
}
