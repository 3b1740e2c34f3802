//! Dependency wiring through injectors.
//!
//! Instances declare their optional collaborators by overriding
//! [`Extension::wire`](crate::Extension::wire) and looking them up on the
//! [`WireContext`]. Lookups are served by the adaptive injector of the
//! `ExtensionInjector` point, which delegates to every discovered injector
//! and takes the first value produced. The framework ships the `spi`
//! injector, which resolves a request to the adaptive instance of the
//! requested point.

use std::any::{Any, TypeId};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::catalog::ProviderCatalog;
use crate::contract::{Extension, ExtensionPoint, ExtensionScope};
use crate::descriptor::ProviderDescriptor;
use crate::director::{ErasedLoader, ExtensionAccessor, ExtensionDirector};
use crate::error::Result;
use crate::strategy::INTERNAL_DIRECTORY;

/// A type-erased extension instance, concretely a boxed `Arc<P>`.
pub type ErasedInstance = Box<dyn Any + Send + Sync>;

/// One wiring lookup: the requested point and the property being wired.
pub struct InjectRequest<'a> {
    type_id: TypeId,
    point: &'a str,
    property: &'a str,
    make_loader: fn(&Arc<ExtensionDirector>) -> Result<Arc<dyn ErasedLoader>>,
}

impl<'a> InjectRequest<'a> {
    pub(crate) fn of<P: ExtensionPoint + ?Sized>(property: &'a str) -> Self {
        Self {
            type_id: TypeId::of::<P>(),
            point: P::point_name(),
            property,
            make_loader: loader_hook::<P>,
        }
    }

    /// Type identity of the requested extension point.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Name of the requested extension point.
    pub fn point(&self) -> &str {
        self.point
    }

    /// De-capitalised property name being wired.
    pub fn property(&self) -> &str {
        self.property
    }

    /// Resolve the adaptive instance of the requested point through the
    /// given director.
    pub fn adaptive_instance(&self, director: &Arc<ExtensionDirector>) -> Option<ErasedInstance> {
        let loader = (self.make_loader)(director).ok()?;
        loader.erased_adaptive()
    }
}

fn loader_hook<P: ExtensionPoint + ?Sized>(
    director: &Arc<ExtensionDirector>,
) -> Result<Arc<dyn ErasedLoader>> {
    director.loader::<P>().map(|l| l as Arc<dyn ErasedLoader>)
}

/// Supplies collaborator instances by `(point, property)` during wiring.
pub trait ExtensionInjector: Extension {
    /// Produce a value for the request, or `None` when this injector has
    /// nothing to offer.
    fn instance(&self, request: &InjectRequest<'_>) -> Option<ErasedInstance>;
}

crate::extension_point! {
    dyn ExtensionInjector {
        name: "relay.extension.ExtensionInjector",
        scope: ExtensionScope::Framework,
    }
}

/// Wiring context handed to [`Extension::wire`](crate::Extension::wire).
pub struct WireContext {
    accessor: ExtensionAccessor,
    injector: Option<Arc<dyn ExtensionInjector>>,
    point: &'static str,
    name: Option<String>,
}

impl WireContext {
    pub(crate) fn new(
        accessor: ExtensionAccessor,
        injector: Option<Arc<dyn ExtensionInjector>>,
        point: &'static str,
        name: Option<String>,
    ) -> Self {
        Self {
            accessor,
            injector,
            point,
            name,
        }
    }

    /// Look up a collaborator of point `P` under the given property name.
    ///
    /// Returns `None` when no injector produces a value; wiring is
    /// best-effort by contract.
    pub fn instance<P: ExtensionPoint + ?Sized>(&self, property: &str) -> Option<Arc<P>> {
        let injector = self.injector.as_ref()?;
        let request = InjectRequest::of::<P>(property);
        let erased = injector.instance(&request)?;
        match erased.downcast::<Arc<P>>() {
            Ok(boxed) => Some(*boxed),
            Err(_) => {
                tracing::warn!(
                    point = self.point,
                    requested = P::point_name(),
                    property,
                    "injector produced a value of an unexpected type"
                );
                None
            }
        }
    }

    /// Accessor of the director building the instance.
    pub fn accessor(&self) -> &ExtensionAccessor {
        &self.accessor
    }

    /// Point of the instance being wired.
    pub fn point(&self) -> &'static str {
        self.point
    }

    /// Extension name of the instance being wired; `None` for adaptive
    /// instances.
    pub fn extension_name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// The adaptive injector: collects every discovered injector at
/// `initialize` and delegates lookups to the first that produces a value.
pub(crate) struct AdaptiveInjector {
    accessor: Option<ExtensionAccessor>,
    delegates: RwLock<Vec<Arc<dyn ExtensionInjector>>>,
}

impl AdaptiveInjector {
    pub(crate) fn new() -> Self {
        Self {
            accessor: None,
            delegates: RwLock::new(Vec::new()),
        }
    }
}

impl Extension for AdaptiveInjector {
    fn bind_accessor(&mut self, accessor: &ExtensionAccessor) {
        self.accessor = Some(accessor.clone());
    }

    fn initialize(&self) -> Result<()> {
        let accessor = match &self.accessor {
            Some(accessor) => accessor,
            None => return Ok(()),
        };
        let loader = accessor.loader::<dyn ExtensionInjector>()?;
        let mut delegates = Vec::new();
        for name in loader.supported_names()? {
            match loader.get(&name) {
                Ok(injector) => delegates.push(injector),
                Err(error) => {
                    tracing::warn!(injector = %name, %error, "skipping unusable injector");
                }
            }
        }
        *self.delegates.write() = delegates;
        Ok(())
    }
}

impl ExtensionInjector for AdaptiveInjector {
    fn instance(&self, request: &InjectRequest<'_>) -> Option<ErasedInstance> {
        self.delegates
            .read()
            .iter()
            .find_map(|injector| injector.instance(request))
    }
}

/// The `spi` injector: serves a request with the adaptive instance of the
/// requested point, resolved through the owning director.
pub(crate) struct SpiInjector {
    accessor: Option<ExtensionAccessor>,
}

impl SpiInjector {
    pub(crate) fn new() -> Self {
        Self { accessor: None }
    }
}

impl Extension for SpiInjector {
    fn bind_accessor(&mut self, accessor: &ExtensionAccessor) {
        self.accessor = Some(accessor.clone());
    }
}

impl ExtensionInjector for SpiInjector {
    fn instance(&self, request: &InjectRequest<'_>) -> Option<ErasedInstance> {
        let director = self.accessor.as_ref()?.director()?;
        request.adaptive_instance(&director)
    }
}

/// Register the built-in injector providers and their discovery resource on
/// the framework catalog.
pub(crate) fn register_framework_providers(catalog: &Arc<ProviderCatalog>) {
    catalog.register::<dyn ExtensionInjector>(
        ProviderDescriptor::<dyn ExtensionInjector>::named(
            "relay::extension::inject::SpiInjector",
            |_ctx| Ok(Box::new(SpiInjector::new()) as Box<dyn ExtensionInjector>),
        )
        .with_name("spi"),
    );
    catalog.register::<dyn ExtensionInjector>(ProviderDescriptor::<dyn ExtensionInjector>::adaptive(
        "relay::extension::inject::AdaptiveInjector",
        |_ctx| Ok(Box::new(AdaptiveInjector::new()) as Box<dyn ExtensionInjector>),
    ));

    catalog.add_embedded(
        format!("{}relay.extension.ExtensionInjector", INTERNAL_DIRECTORY),
        "spi=relay::extension::inject::SpiInjector\n\
         relay::extension::inject::AdaptiveInjector\n",
    );
}
