//! Scope model collaborator contract.
//!
//! The surrounding system hands each director an opaque scope model; the
//! runtime only asks it which provider catalogs are visible to the scope.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::catalog::ProviderCatalog;

/// The single contract the runtime consumes from a scope model.
pub trait ScopeModel: Send + Sync + 'static {
    /// Diagnostic name of the model.
    fn model_name(&self) -> &str;

    /// Provider catalogs visible to this scope, in search order.
    fn catalogs(&self) -> Vec<Arc<ProviderCatalog>>;
}

/// A scope model over a fixed catalog list.
pub struct StaticScopeModel {
    name: String,
    catalogs: RwLock<Vec<Arc<ProviderCatalog>>>,
}

impl StaticScopeModel {
    /// Create a model with no catalogs; discovery then falls back to the
    /// framework catalog.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            catalogs: RwLock::new(Vec::new()),
        }
    }

    /// Add a catalog to the model.
    pub fn add_catalog(&self, catalog: Arc<ProviderCatalog>) {
        self.catalogs.write().push(catalog);
    }

    /// Builder-style variant of [`add_catalog`](Self::add_catalog).
    pub fn with_catalog(self, catalog: Arc<ProviderCatalog>) -> Self {
        self.add_catalog(catalog);
        self
    }
}

impl ScopeModel for StaticScopeModel {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn catalogs(&self) -> Vec<Arc<ProviderCatalog>> {
        self.catalogs.read().clone()
    }
}
