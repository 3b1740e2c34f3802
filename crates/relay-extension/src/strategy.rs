//! Loading strategies: where discovery files live and how their records
//! merge.
//!
//! A strategy names a directory prefix and the merge policy for the records
//! found under it. The process-wide strategy list starts from the three
//! built-ins, is enriched by strategies discovered through the SPI surface
//! itself (bootstrapped against the built-in set), and stays sorted by
//! declared priority. The whole list is replaceable atomically with
//! [`set_loading_strategies`].

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::catalog::{ProviderCatalog, SPECIAL_SPI_RESOURCE};
use crate::contract::{Extension, ExtensionScope};
use crate::descriptor::{InstanceContext, ProviderDescriptor, ProviderKind};
use crate::director::ExtensionAccessor;
use crate::model::{ScopeModel, StaticScopeModel};

/// Directory prefix of the framework-internal strategy.
pub const INTERNAL_DIRECTORY: &str = "META-INF/relay/internal/";
/// Directory prefix of the user strategy.
pub const USER_DIRECTORY: &str = "META-INF/relay/";
/// Directory prefix of the legacy-compatibility strategy.
pub const SERVICES_DIRECTORY: &str = "META-INF/services/";

/// A discovery-root declaration.
///
/// Strategies are extensions themselves; additional roots ship as providers
/// of this point and are picked up during bootstrap.
pub trait LoadingStrategy: Extension {
    /// Name the strategy is referred to by, e.g. in the special SPI table.
    fn strategy_name(&self) -> &str;

    /// Directory prefix composed with the point name to form the file name.
    fn directory(&self) -> &str;

    /// Scan the framework catalog ahead of the scope model's catalogs.
    fn prefer_framework_catalog(&self) -> bool {
        false
    }

    /// Records from this strategy replace earlier records of the same name.
    fn overridden(&self) -> bool {
        false
    }

    /// When non-empty, only impl paths under these prefixes are accepted.
    fn included_prefixes(&self) -> &[String] {
        &[]
    }

    /// Impl paths under these prefixes are skipped.
    fn excluded_prefixes(&self) -> &[String] {
        &[]
    }

    /// Impl paths under these prefixes resolve only on the framework
    /// catalog.
    fn framework_only_prefixes(&self) -> &[String] {
        &[]
    }

    /// Scan order: higher priority scans first.
    fn priority(&self) -> i32 {
        0
    }
}

crate::extension_point! {
    dyn LoadingStrategy {
        name: "relay.extension.LoadingStrategy",
        scope: ExtensionScope::Framework,
    }
}

/// Built-in strategy for framework-internal providers.
#[derive(Debug, Default)]
pub struct InternalLoadingStrategy;

impl Extension for InternalLoadingStrategy {}

impl LoadingStrategy for InternalLoadingStrategy {
    fn strategy_name(&self) -> &str {
        "internal"
    }

    fn directory(&self) -> &str {
        INTERNAL_DIRECTORY
    }

    fn prefer_framework_catalog(&self) -> bool {
        true
    }

    fn priority(&self) -> i32 {
        i32::MAX
    }
}

/// Built-in strategy for user providers; non-overriding.
#[derive(Debug, Default)]
pub struct UserLoadingStrategy;

impl Extension for UserLoadingStrategy {}

impl LoadingStrategy for UserLoadingStrategy {
    fn strategy_name(&self) -> &str {
        "user"
    }

    fn directory(&self) -> &str {
        USER_DIRECTORY
    }
}

/// Built-in strategy kept for compatibility with plain service files.
#[derive(Debug, Default)]
pub struct ServicesLoadingStrategy;

impl Extension for ServicesLoadingStrategy {}

impl LoadingStrategy for ServicesLoadingStrategy {
    fn strategy_name(&self) -> &str {
        "services"
    }

    fn directory(&self) -> &str {
        SERVICES_DIRECTORY
    }

    fn priority(&self) -> i32 {
        i32::MIN
    }
}

static STRATEGIES: Lazy<RwLock<Arc<Vec<Arc<dyn LoadingStrategy>>>>> =
    Lazy::new(|| RwLock::new(Arc::new(load_loading_strategies())));

/// Snapshot of the process-wide strategy list, sorted by priority.
pub fn loading_strategies() -> Arc<Vec<Arc<dyn LoadingStrategy>>> {
    STRATEGIES.read().clone()
}

/// Replace the process-wide strategy list as a whole.
///
/// The list is re-sorted by priority (descending) before publication; an
/// empty list is ignored.
pub fn set_loading_strategies(strategies: Vec<Arc<dyn LoadingStrategy>>) {
    if strategies.is_empty() {
        return;
    }
    let mut strategies = strategies;
    sort_by_priority(&mut strategies);
    *STRATEGIES.write() = Arc::new(strategies);
}

/// The built-in bootstrap set, in priority order.
pub fn bootstrap_strategies() -> Vec<Arc<dyn LoadingStrategy>> {
    vec![
        Arc::new(InternalLoadingStrategy),
        Arc::new(UserLoadingStrategy),
        Arc::new(ServicesLoadingStrategy),
    ]
}

/// Discover the full strategy list: built-ins plus providers of the
/// strategy point, scanned with the built-in set.
fn load_loading_strategies() -> Vec<Arc<dyn LoadingStrategy>> {
    let bootstrap = bootstrap_strategies();
    let mut strategies = bootstrap.clone();

    let outcome = crate::scanner::scan::<dyn LoadingStrategy>(&bootstrap, &[]);
    for (line, cause) in &outcome.failures {
        tracing::error!(line = %line, cause = %cause, "failed to load a loading strategy");
    }

    let bootstrap_model: Arc<dyn ScopeModel> = Arc::new(StaticScopeModel::new("bootstrap"));
    let accessor = ExtensionAccessor::detached();
    let ctx = InstanceContext::new(&bootstrap_model, &accessor);

    for record in outcome.records {
        let ctor = match record.descriptor.kind() {
            ProviderKind::Named { ctor } => ctor.clone(),
            _ => continue,
        };
        let instance: Arc<dyn LoadingStrategy> = match ctor(&ctx) {
            Ok(boxed) => Arc::from(boxed),
            Err(error) => {
                tracing::error!(
                    path = record.descriptor.path(),
                    %error,
                    "loading strategy construction failed"
                );
                continue;
            }
        };
        if strategies
            .iter()
            .any(|s| s.strategy_name() == instance.strategy_name())
        {
            continue;
        }
        strategies.push(instance);
    }

    sort_by_priority(&mut strategies);
    strategies
}

fn sort_by_priority(strategies: &mut [Arc<dyn LoadingStrategy>]) {
    strategies.sort_by(|a, b| b.priority().cmp(&a.priority()));
}

/// Register the built-in strategy providers and their discovery resources
/// on the framework catalog.
pub(crate) fn register_framework_providers(catalog: &Arc<ProviderCatalog>) {
    catalog.register::<dyn LoadingStrategy>(
        ProviderDescriptor::<dyn LoadingStrategy>::named(
            "relay::extension::strategy::InternalLoadingStrategy",
            |_ctx| Ok(Box::new(InternalLoadingStrategy) as Box<dyn LoadingStrategy>),
        )
        .with_name("internal"),
    );
    catalog.register::<dyn LoadingStrategy>(
        ProviderDescriptor::<dyn LoadingStrategy>::named(
            "relay::extension::strategy::UserLoadingStrategy",
            |_ctx| Ok(Box::new(UserLoadingStrategy) as Box<dyn LoadingStrategy>),
        )
        .with_name("user"),
    );
    catalog.register::<dyn LoadingStrategy>(
        ProviderDescriptor::<dyn LoadingStrategy>::named(
            "relay::extension::strategy::ServicesLoadingStrategy",
            |_ctx| Ok(Box::new(ServicesLoadingStrategy) as Box<dyn LoadingStrategy>),
        )
        .with_name("services"),
    );

    catalog.add_embedded(
        format!("{}relay.extension.LoadingStrategy", INTERNAL_DIRECTORY),
        "internal=relay::extension::strategy::InternalLoadingStrategy\n\
         user=relay::extension::strategy::UserLoadingStrategy\n\
         services=relay::extension::strategy::ServicesLoadingStrategy\n",
    );

    // Restrict the runtime's own points to the internal strategy so process
    // startup never walks user roots for them.
    catalog.add_embedded(
        SPECIAL_SPI_RESOURCE,
        "relay.extension.LoadingStrategy=internal\n\
         relay.extension.ExtensionInjector=internal\n",
    );
}
