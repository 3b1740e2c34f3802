//! Core contracts implemented by extension instances and extension points.
//!
//! An *extension point* is a trait whose implementations are discovered and
//! assembled by the runtime. The trait extends [`Extension`], which carries
//! the capability hooks the build pipeline drives; a capability is declared
//! by overriding the matching default method. The point itself is described
//! by implementing [`ExtensionPoint`] for the `dyn Trait` type, normally
//! through the [`extension_point!`](crate::extension_point) macro.

use serde::{Deserialize, Serialize};

use crate::adaptive::AdaptiveBinding;
use crate::director::ExtensionAccessor;
use crate::error::Result;
use crate::inject::WireContext;

/// Scope tag of an extension point.
///
/// The tag bounds where instances of the point live inside a director tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionScope {
    /// Every director builds and owns its own instances.
    #[serde(rename = "self")]
    SelfScoped,
    /// Instances are shared process-wide at the framework level.
    Framework,
    /// Instances are shared by every module of one application.
    Application,
    /// Instances belong to a single module.
    Module,
}

/// Base contract of every extension instance.
///
/// All hooks have no-op defaults; an instance participates in a pipeline
/// stage by overriding the matching method.
pub trait Extension: Send + Sync + 'static {
    /// Wire optional collaborators through the injector.
    ///
    /// Called after construction and before the instance is published.
    /// Failures are logged and swallowed by the builder: an implementation
    /// must tolerate un-wired optional dependencies, and should fail from
    /// [`initialize`](Extension::initialize) when a dependency is mandatory.
    fn wire(&mut self, ctx: &WireContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Receive a handle to the owning director.
    fn bind_accessor(&mut self, accessor: &ExtensionAccessor) {
        let _ = accessor;
    }

    /// Lifecycle hook, called once on the fully assembled reference.
    ///
    /// Runs after wrapping, so a wrapper that wants the hook must override
    /// it itself. The instance is already shared at this point; use interior
    /// mutability for initialisation state.
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Disposer, called exactly once per distinct instance when the owning
    /// loader is destroyed.
    fn shutdown(&self) {}
}

/// Declaration of an extension point, implemented for the `dyn Trait` type.
///
/// The receiver-less methods carry what the runtime needs to discover and
/// select providers; the receiver methods let generic code view any provider
/// through the base [`Extension`] contract. Use the
/// [`extension_point!`](crate::extension_point) macro instead of writing the
/// impl by hand.
pub trait ExtensionPoint: Extension {
    /// Stable identity of the point; also names its discovery files.
    fn point_name() -> &'static str;

    /// Last segment of the point name; seeds implicit provider names and the
    /// implicit adaptive dispatch key.
    fn simple_name() -> &'static str {
        let name = Self::point_name();
        name.rsplit(['.', ':']).next().unwrap_or(name)
    }

    /// Declared scope tag.
    fn scope() -> ExtensionScope {
        ExtensionScope::Application
    }

    /// Default extension name, if the point declares one.
    fn default_name() -> Option<&'static str> {
        None
    }

    /// Build the adaptive facade for this point.
    ///
    /// Returns `None` when the point does not support generated adaptive
    /// dispatch; a registered adaptive provider still takes precedence.
    fn adaptive(binding: AdaptiveBinding<Self>) -> Option<Box<Self>> {
        let _ = binding;
        None
    }

    /// View the instance through the base contract.
    fn as_extension(&self) -> &dyn Extension;

    /// Mutable view of the instance through the base contract.
    fn as_extension_mut(&mut self) -> &mut dyn Extension;
}
