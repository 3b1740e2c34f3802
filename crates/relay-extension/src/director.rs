//! Scope directors: the single entry surface of the runtime.
//!
//! Directors form a parent/child tree (framework → application → module).
//! Each director owns one loader per extension point it is responsible for;
//! a lookup walks local cache, then the parent chain, then creates locally
//! when the point's declared scope matches this director.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::contract::{Extension, ExtensionPoint, ExtensionScope};
use crate::error::{ExtensionError, Result};
use crate::inject::ErasedInstance;
use crate::loader::ExtensionLoader;
use crate::model::ScopeModel;

/// Hook invoked around instance initialisation, for every point of one
/// director.
///
/// Processors see instances through the base [`Extension`] contract and
/// mutate them in place.
pub trait ExtensionPostProcessor: Send + Sync + 'static {
    /// Called after construction, before wiring.
    fn before_init(&self, instance: &mut dyn Extension, name: Option<&str>) -> Result<()> {
        let _ = (instance, name);
        Ok(())
    }

    /// Called after wiring and accessor binding.
    fn after_init(&self, instance: &mut dyn Extension, name: Option<&str>) -> Result<()> {
        let _ = (instance, name);
        Ok(())
    }
}

/// Type-erased view of an [`ExtensionLoader`], held by the director map.
pub(crate) trait ErasedLoader: Send + Sync {
    fn destroy(&self);
    fn erased_adaptive(&self) -> Option<ErasedInstance>;
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// A node in the scope tree, owning the loaders of its scope.
pub struct ExtensionDirector {
    parent: Option<Arc<ExtensionDirector>>,
    scope: ExtensionScope,
    scope_model: Arc<dyn ScopeModel>,
    post_processors: Arc<RwLock<Vec<Arc<dyn ExtensionPostProcessor>>>>,
    loaders: RwLock<HashMap<TypeId, Arc<dyn ErasedLoader>>>,
    destroyed: AtomicBool,
}

impl ExtensionDirector {
    /// Create a director for one scope of the tree.
    pub fn new(
        parent: Option<Arc<ExtensionDirector>>,
        scope: ExtensionScope,
        scope_model: Arc<dyn ScopeModel>,
    ) -> Arc<Self> {
        Arc::new(Self {
            parent,
            scope,
            scope_model,
            post_processors: Arc::new(RwLock::new(Vec::new())),
            loaders: RwLock::new(HashMap::new()),
            destroyed: AtomicBool::new(false),
        })
    }

    /// Scope tag of this director.
    pub fn scope(&self) -> ExtensionScope {
        self.scope
    }

    /// Parent director, when this is not the root.
    pub fn parent(&self) -> Option<&Arc<ExtensionDirector>> {
        self.parent.as_ref()
    }

    /// Scope model this director reads catalogs from.
    pub fn scope_model(&self) -> &Arc<dyn ScopeModel> {
        &self.scope_model
    }

    /// Append a post-processor; the list is append-only and shared with
    /// every loader of this director.
    pub fn add_post_processor(&self, processor: Arc<dyn ExtensionPostProcessor>) {
        let mut processors = self.post_processors.write();
        if !processors.iter().any(|p| Arc::ptr_eq(p, &processor)) {
            processors.push(processor);
        }
    }

    pub(crate) fn shared_post_processors(
        &self,
    ) -> Arc<RwLock<Vec<Arc<dyn ExtensionPostProcessor>>>> {
        self.post_processors.clone()
    }

    /// A cheap, clonable handle to this director.
    pub fn accessor(self: &Arc<Self>) -> ExtensionAccessor {
        ExtensionAccessor {
            director: Arc::downgrade(self),
        }
    }

    /// The loader of point `T`, resolved through the scope rules.
    ///
    /// Self-scoped points always get a local loader. Otherwise the parent
    /// chain is consulted first, then a local loader is created when the
    /// point's declared scope equals this director's scope; a point whose
    /// scope matches nowhere fails with
    /// [`ExtensionError::ScopeMismatch`].
    pub fn loader<T: ExtensionPoint + ?Sized>(
        self: &Arc<Self>,
    ) -> Result<Arc<ExtensionLoader<T>>> {
        self.check_destroyed()?;
        let type_id = TypeId::of::<T>();

        if let Some(found) = self.loaders.read().get(&type_id) {
            return downcast_loader::<T>(found.clone());
        }

        let declared = T::scope();
        if declared == ExtensionScope::SelfScoped {
            return self.create_loader::<T>();
        }

        if let Some(parent) = &self.parent {
            match parent.loader::<T>() {
                Ok(loader) => return Ok(loader),
                Err(ExtensionError::ScopeMismatch { .. }) => {}
                Err(error) => return Err(error),
            }
        }

        if declared == self.scope {
            return self.create_loader::<T>();
        }

        Err(ExtensionError::ScopeMismatch {
            point: T::point_name().to_string(),
            declared,
            searched: self.scope,
        })
    }

    /// Shorthand: the named extension of point `T`.
    pub fn extension<T: ExtensionPoint + ?Sized>(
        self: &Arc<Self>,
        name: &str,
    ) -> Result<Arc<T>> {
        self.loader::<T>()?.get(name)
    }

    /// Shorthand: the adaptive extension of point `T`.
    pub fn adaptive_extension<T: ExtensionPoint + ?Sized>(
        self: &Arc<Self>,
    ) -> Result<Arc<T>> {
        self.loader::<T>()?.get_adaptive()
    }

    /// Shorthand: the default extension of point `T`.
    pub fn default_extension<T: ExtensionPoint + ?Sized>(
        self: &Arc<Self>,
    ) -> Result<Option<Arc<T>>> {
        self.loader::<T>()?.get_default()
    }

    /// Tear down this director and every loader it owns.
    ///
    /// Idempotent; does not touch parent or child directors.
    pub fn destroy(&self) {
        if self
            .destroyed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let loaders: Vec<Arc<dyn ErasedLoader>> =
            self.loaders.write().drain().map(|(_, l)| l).collect();
        for loader in loaders {
            loader.destroy();
        }
        self.post_processors.write().clear();
        tracing::debug!(scope = ?self.scope, "extension director destroyed");
    }

    fn create_loader<T: ExtensionPoint + ?Sized>(
        self: &Arc<Self>,
    ) -> Result<Arc<ExtensionLoader<T>>> {
        self.check_destroyed()?;
        let type_id = TypeId::of::<T>();
        let created: Arc<ExtensionLoader<T>> = Arc::new(ExtensionLoader::new(self));
        let stored = self
            .loaders
            .write()
            .entry(type_id)
            .or_insert_with(|| created as Arc<dyn ErasedLoader>)
            .clone();
        downcast_loader::<T>(stored)
    }

    fn check_destroyed(&self) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            Err(ExtensionError::Destroyed("extension director".to_string()))
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for ExtensionDirector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionDirector")
            .field("scope", &self.scope)
            .field("model", &self.scope_model.model_name())
            .field("loaders", &self.loaders.read().len())
            .field("destroyed", &self.destroyed.load(Ordering::SeqCst))
            .finish()
    }
}

fn downcast_loader<T: ExtensionPoint + ?Sized>(
    erased: Arc<dyn ErasedLoader>,
) -> Result<Arc<ExtensionLoader<T>>> {
    erased
        .as_any_arc()
        .downcast::<ExtensionLoader<T>>()
        .map_err(|_| {
            ExtensionError::Internal(format!(
                "loader registered for `{}` has a mismatched type",
                T::point_name()
            ))
        })
}

/// Uniform, weakly-held handle to a director.
///
/// Facades, injectors and wiring contexts carry an accessor instead of a
/// strong director reference, so destruction is never kept alive by the
/// instances a director built.
#[derive(Clone)]
pub struct ExtensionAccessor {
    director: Weak<ExtensionDirector>,
}

impl ExtensionAccessor {
    /// An accessor bound to no director; every lookup fails as destroyed.
    pub fn detached() -> Self {
        Self {
            director: Weak::new(),
        }
    }

    /// The director, when it is still alive.
    pub fn director(&self) -> Option<Arc<ExtensionDirector>> {
        self.director.upgrade()
    }

    /// The loader of point `T` through the underlying director.
    pub fn loader<T: ExtensionPoint + ?Sized>(&self) -> Result<Arc<ExtensionLoader<T>>> {
        self.director()
            .ok_or_else(|| ExtensionError::Destroyed("extension director".to_string()))?
            .loader::<T>()
    }

    /// The named extension of point `T`.
    pub fn extension<T: ExtensionPoint + ?Sized>(&self, name: &str) -> Result<Arc<T>> {
        self.loader::<T>()?.get(name)
    }

    /// The adaptive extension of point `T`.
    pub fn adaptive_extension<T: ExtensionPoint + ?Sized>(&self) -> Result<Arc<T>> {
        self.loader::<T>()?.get_adaptive()
    }

    /// The default extension of point `T`.
    pub fn default_extension<T: ExtensionPoint + ?Sized>(&self) -> Result<Option<Arc<T>>> {
        self.loader::<T>()?.get_default()
    }
}

impl std::fmt::Debug for ExtensionAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionAccessor")
            .field("alive", &(self.director.strong_count() > 0))
            .finish()
    }
}
