//! Provider catalogs: where discovery files and impl paths resolve.
//!
//! A catalog plays the role a classloader plays in annotation-driven SPI
//! runtimes: it locates discovery resources (filesystem roots plus embedded
//! built-in resources) and resolves impl paths to registered
//! [`ProviderDescriptor`]s. The framework owns one process-wide catalog
//! carrying the runtime's own providers; scope models publish the catalogs
//! visible to their scope.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::contract::ExtensionPoint;
use crate::descriptor::ProviderDescriptor;

/// Name of the per-point scan-restriction table on the framework catalog.
pub const SPECIAL_SPI_RESOURCE: &str = "special_spi.properties";

/// Sentinel in the special SPI table matching every strategy.
pub const SPECIAL_SPI_ALL: &str = "all";

/// A discovery resource located by a catalog.
#[derive(Debug, Clone)]
pub(crate) enum CatalogResource {
    /// A file on disk under one of the catalog roots.
    File(PathBuf),
    /// An embedded resource registered in code.
    Embedded { key: String, content: Arc<str> },
}

/// A set of resource roots and provider registrations.
pub struct ProviderCatalog {
    name: String,
    roots: RwLock<Vec<PathBuf>>,
    embedded: RwLock<HashMap<String, Arc<str>>>,
    providers: RwLock<HashMap<(TypeId, String), Arc<dyn Any + Send + Sync>>>,
    paths: RwLock<HashSet<String>>,
}

impl ProviderCatalog {
    /// Create an empty catalog.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roots: RwLock::new(Vec::new()),
            embedded: RwLock::new(HashMap::new()),
            providers: RwLock::new(HashMap::new()),
            paths: RwLock::new(HashSet::new()),
        }
    }

    /// Diagnostic name of the catalog.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a filesystem root under which discovery files are looked up.
    pub fn add_root(&self, root: impl Into<PathBuf>) {
        self.roots.write().push(root.into());
    }

    /// Builder-style variant of [`add_root`](Self::add_root).
    pub fn with_root(self, root: impl Into<PathBuf>) -> Self {
        self.add_root(root);
        self
    }

    /// Register an embedded discovery resource under the given key.
    ///
    /// The key is compared against the composed discovery file name, e.g.
    /// `META-INF/relay/internal/relay.extension.ExtensionInjector`.
    pub fn add_embedded(&self, key: impl Into<String>, content: impl Into<Arc<str>>) {
        self.embedded.write().insert(key.into(), content.into());
    }

    /// Register a provider descriptor so discovery lines can resolve it.
    pub fn register<T: ExtensionPoint + ?Sized>(&self, descriptor: ProviderDescriptor<T>) {
        let path = descriptor.path().to_string();
        self.paths.write().insert(path.clone());
        self.providers
            .write()
            .insert((TypeId::of::<T>(), path), Arc::new(descriptor));
    }

    /// Resolve an impl path against the registrations for point `T`.
    pub fn resolve<T: ExtensionPoint + ?Sized>(
        &self,
        path: &str,
    ) -> Option<ProviderDescriptor<T>> {
        self.providers
            .read()
            .get(&(TypeId::of::<T>(), path.to_string()))
            .and_then(|erased| erased.downcast_ref::<ProviderDescriptor<T>>())
            .cloned()
    }

    /// True when some provider is registered under the impl path, for any
    /// point. Activation preconditions check presence this way.
    pub fn contains_path(&self, path: &str) -> bool {
        self.paths.read().contains(path)
    }

    /// Locate every resource for the composed discovery file name.
    pub(crate) fn resources(&self, file: &str) -> Vec<CatalogResource> {
        let mut found = Vec::new();
        for root in self.roots.read().iter() {
            let candidate = root.join(file);
            if candidate.is_file() {
                found.push(CatalogResource::File(candidate));
            }
        }
        if let Some(content) = self.embedded.read().get(file) {
            found.push(CatalogResource::Embedded {
                key: file.to_string(),
                content: content.clone(),
            });
        }
        found
    }
}

impl std::fmt::Debug for ProviderCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCatalog")
            .field("name", &self.name)
            .field("roots", &*self.roots.read())
            .field("providers", &self.providers.read().len())
            .finish()
    }
}

/// The framework's own catalog, shared by every director in the process.
///
/// Carries the runtime's built-in providers (injectors and loading
/// strategies) and their embedded discovery resources.
pub fn framework_catalog() -> Arc<ProviderCatalog> {
    static FRAMEWORK: Lazy<Arc<ProviderCatalog>> = Lazy::new(|| {
        let catalog = Arc::new(ProviderCatalog::new("framework"));
        crate::inject::register_framework_providers(&catalog);
        crate::strategy::register_framework_providers(&catalog);
        catalog
    });
    FRAMEWORK.clone()
}

/// The special SPI table: point name to the single strategy allowed to scan
/// it. Read once from the framework catalog's `special_spi.properties`.
pub(crate) fn special_spi_table() -> &'static HashMap<String, String> {
    static TABLE: Lazy<HashMap<String, String>> = Lazy::new(|| {
        let mut table = HashMap::new();
        for resource in framework_catalog().resources(SPECIAL_SPI_RESOURCE) {
            let content = match resource {
                CatalogResource::Embedded { content, .. } => content,
                CatalogResource::File(path) => match std::fs::read_to_string(&path) {
                    Ok(text) => Arc::from(text.as_str()),
                    Err(error) => {
                        tracing::error!(
                            path = %path.display(),
                            %error,
                            "failed to read special SPI table"
                        );
                        continue;
                    }
                },
            };
            for line in parse_properties(&content) {
                let (key, value) = line;
                table.entry(key).or_insert(value);
            }
        }
        table
    });
    &TABLE
}

fn parse_properties(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .filter_map(|line| {
            let line = match line.find('#') {
                Some(i) => &line[..i],
                None => line,
            }
            .trim();
            let (k, v) = line.split_once('=')?;
            let (k, v) = (k.trim(), v.trim());
            if k.is_empty() {
                return None;
            }
            Some((k.to_string(), v.to_string()))
        })
        .collect()
}
