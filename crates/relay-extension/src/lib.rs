//! Scoped extension-point runtime of the Relay RPC framework.
//!
//! The runtime discovers named implementations of a polymorphic contract
//! from discovery files, builds them lazily through a pipelined assembly
//! (construct, wire, post-process, wrap, initialise), and serves a single
//! adaptive facade per point whose target implementation is chosen per call
//! from request-URL parameters.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  ExtensionDirector                   │
//! │  - one node per scope (framework/application/module) │
//! │  - owns one ExtensionLoader per extension point      │
//! │  - walks the parent chain on lookups                 │
//! └──────────────────────────────────────────────────────┘
//!                          │
//!          ┌───────────────┼────────────────┐
//!          ▼               ▼                ▼
//!   ┌─────────────┐ ┌──────────────┐ ┌──────────────┐
//!   │   Scanner   │ │   Registry   │ │    Builder   │
//!   │ (discovery  │ │ (classify +  │ │ (pipeline +  │
//!   │   files)    │ │   override)  │ │   caches)    │
//!   └─────────────┘ └──────────────┘ └──────────────┘
//! ```
//!
//! # Declaring an extension point
//!
//! ```rust
//! use relay_extension::{extension_point, Extension, ExtensionScope};
//!
//! pub trait Codec: Extension {
//!     fn encode(&self, payload: &str) -> String;
//! }
//!
//! extension_point! {
//!     dyn Codec {
//!         name: "demo.rpc.Codec",
//!         scope: ExtensionScope::Application,
//!         default: "json",
//!     }
//! }
//! ```
//!
//! Implementations are registered in a [`ProviderCatalog`] and listed in
//! discovery files (`name=impl::path`, one per line, `#` comments) under
//! the configured roots; a [`ExtensionDirector`] obtained from a scope
//! model then serves loaders and instances:
//!
//! ```rust,ignore
//! let loader = director.loader::<dyn Codec>()?;
//! let json = loader.get("json")?;
//! let by_url = loader.get_adaptive()?;
//! ```

pub mod adaptive;
pub mod catalog;
pub mod contract;
pub mod descriptor;
pub mod director;
pub mod error;
pub mod inject;
pub mod loader;
#[macro_use]
pub mod macros;
pub mod model;
pub mod registry;
mod scanner;
pub mod strategy;
pub mod url;

pub use adaptive::{default_dispatch_key, AdaptiveBinding};
pub use catalog::{framework_catalog, ProviderCatalog};
pub use contract::{Extension, ExtensionPoint, ExtensionScope};
pub use descriptor::{
    ActivateMeta, InstanceContext, ProviderDescriptor, ProviderKind, WrapperMeta,
};
pub use director::{ExtensionAccessor, ExtensionDirector, ExtensionPostProcessor};
pub use error::{ExtensionError, Result};
pub use inject::{ErasedInstance, ExtensionInjector, InjectRequest, WireContext};
pub use loader::ExtensionLoader;
pub use model::{ScopeModel, StaticScopeModel};
pub use strategy::{
    bootstrap_strategies, loading_strategies, set_loading_strategies, LoadingStrategy,
};
pub use url::RequestUrl;

/// Re-exports commonly used when declaring and consuming extensions.
pub mod prelude {
    pub use crate::adaptive::AdaptiveBinding;
    pub use crate::catalog::{framework_catalog, ProviderCatalog};
    pub use crate::contract::{Extension, ExtensionPoint, ExtensionScope};
    pub use crate::descriptor::{ActivateMeta, InstanceContext, ProviderDescriptor};
    pub use crate::director::{ExtensionAccessor, ExtensionDirector};
    pub use crate::error::{ExtensionError, Result};
    pub use crate::inject::WireContext;
    pub use crate::loader::ExtensionLoader;
    pub use crate::model::{ScopeModel, StaticScopeModel};
    pub use crate::url::RequestUrl;
}
