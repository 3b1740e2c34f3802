//! Discovery-file scanning.
//!
//! For one extension point, the scanner walks every loading strategy in
//! priority order, composes the discovery file name, selects the catalogs to
//! search (framework preference, special SPI restriction, scope model
//! catalogs), parses the located resources line by line and resolves each
//! line against the originating catalog. A failing line is recorded and
//! never aborts the rest of the scan.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use lru::LruCache;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::catalog::{
    framework_catalog, special_spi_table, CatalogResource, ProviderCatalog, SPECIAL_SPI_ALL,
};
use crate::contract::ExtensionPoint;
use crate::descriptor::ProviderDescriptor;
use crate::strategy::LoadingStrategy;

const RESOURCE_CACHE_CAPACITY: usize = 128;

/// One discovery record: the resolved descriptor plus how it was declared.
pub(crate) struct ScanRecord<T: ?Sized> {
    pub descriptor: ProviderDescriptor<T>,
    pub declared_name: Option<String>,
    pub overridden: bool,
}

/// Result of scanning one extension point.
pub(crate) struct ScanOutcome<T: ?Sized> {
    /// Records in strategy-priority order.
    pub records: Vec<ScanRecord<T>>,
    /// Per-line failures, keyed by the raw line text.
    pub failures: Vec<(String, String)>,
}

/// Scan the discovery files of point `T` across the given strategies and
/// scope-model catalogs.
pub(crate) fn scan<T: ExtensionPoint + ?Sized>(
    strategies: &[Arc<dyn LoadingStrategy>],
    model_catalogs: &[Arc<ProviderCatalog>],
) -> ScanOutcome<T> {
    let mut outcome = ScanOutcome {
        records: Vec::new(),
        failures: Vec::new(),
    };
    let framework = framework_catalog();
    let special = special_spi_table().get(<T as ExtensionPoint>::point_name());

    for strategy in strategies {
        if let Some(only) = special {
            if only != SPECIAL_SPI_ALL && only != strategy.strategy_name() {
                continue;
            }
        }
        let file = format!("{}{}", strategy.directory(), T::point_name());
        let catalogs = select_catalogs(strategy, special.is_some(), &framework, model_catalogs);

        for catalog in &catalogs {
            for resource in catalog.resources(&file) {
                let lines = match resource_lines(&resource) {
                    Some(lines) => lines,
                    None => continue,
                };
                for line in lines.iter() {
                    scan_line::<T>(line, strategy.as_ref(), catalog, &framework, &mut outcome);
                }
            }
        }
    }

    outcome
}

fn select_catalogs(
    strategy: &Arc<dyn LoadingStrategy>,
    restricted: bool,
    framework: &Arc<ProviderCatalog>,
    model_catalogs: &[Arc<ProviderCatalog>],
) -> Vec<Arc<ProviderCatalog>> {
    if restricted {
        return vec![framework.clone()];
    }
    let mut catalogs: Vec<Arc<ProviderCatalog>> = Vec::new();
    if strategy.prefer_framework_catalog() {
        catalogs.push(framework.clone());
    }
    for catalog in model_catalogs {
        if !catalogs.iter().any(|c| Arc::ptr_eq(c, catalog)) {
            catalogs.push(catalog.clone());
        }
    }
    if catalogs.is_empty() {
        catalogs.push(framework.clone());
    }
    catalogs
}

fn scan_line<T: ExtensionPoint + ?Sized>(
    line: &str,
    strategy: &dyn LoadingStrategy,
    catalog: &Arc<ProviderCatalog>,
    framework: &Arc<ProviderCatalog>,
    outcome: &mut ScanOutcome<T>,
) {
    let (declared_name, path) = match line.split_once('=') {
        Some((name, path)) => (Some(name.trim().to_string()), path.trim()),
        None => (None, line),
    };
    if path.is_empty() {
        return;
    }
    if is_excluded(path, strategy.excluded_prefixes())
        || !is_included(path, strategy.included_prefixes())
    {
        return;
    }
    if strategy
        .framework_only_prefixes()
        .iter()
        .any(|p| under_prefix(path, p))
        && !Arc::ptr_eq(catalog, framework)
    {
        return;
    }

    let descriptor = match catalog.resolve::<T>(path) {
        Some(descriptor) => descriptor,
        None => {
            let cause = format!(
                "no provider registered for impl path `{}` in catalog `{}`",
                path,
                catalog.name()
            );
            tracing::error!(
                point = T::point_name(),
                line = %line,
                catalog = catalog.name(),
                "failed to resolve discovery line"
            );
            outcome.failures.push((line.to_string(), cause));
            return;
        }
    };

    if let Some(activate) = descriptor.activate() {
        let present = activate
            .on
            .iter()
            .all(|p| catalog.contains_path(p) || framework.contains_path(p));
        if !present {
            tracing::debug!(
                point = T::point_name(),
                path = descriptor.path(),
                "skipping provider whose activation preconditions are absent"
            );
            return;
        }
    }

    outcome.records.push(ScanRecord {
        descriptor,
        declared_name: declared_name.filter(|n| !n.is_empty()),
        overridden: strategy.overridden(),
    });
}

fn is_included(path: &str, prefixes: &[String]) -> bool {
    prefixes.is_empty() || prefixes.iter().any(|p| under_prefix(path, p))
}

fn is_excluded(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|p| under_prefix(path, p))
}

fn under_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with("::"),
        None => false,
    }
}

/// Read the lines of one resource, comment-stripped and trimmed.
///
/// File contents are memoised in a bounded, process-wide cache; a resource
/// is immutable for the lifetime of its path.
fn resource_lines(resource: &CatalogResource) -> Option<Arc<Vec<String>>> {
    static CONTENT_CACHE: Lazy<Mutex<LruCache<PathBuf, Arc<Vec<String>>>>> = Lazy::new(|| {
        let capacity = NonZeroUsize::new(RESOURCE_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Mutex::new(LruCache::new(capacity))
    });

    match resource {
        CatalogResource::Embedded { content, .. } => Some(Arc::new(parse_lines(content))),
        CatalogResource::File(path) => {
            let mut cache = CONTENT_CACHE.lock();
            if let Some(lines) = cache.get(path) {
                return Some(lines.clone());
            }
            match std::fs::read_to_string(path) {
                Ok(content) => {
                    let lines = Arc::new(parse_lines(&content));
                    cache.put(path.clone(), lines.clone());
                    Some(lines)
                }
                Err(error) => {
                    tracing::error!(
                        path = %path.display(),
                        %error,
                        "failed to read discovery resource"
                    );
                    None
                }
            }
        }
    }
}

fn parse_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let line = match line.find('#') {
                Some(i) => &line[..i],
                None => line,
            }
            .trim();
            if line.is_empty() {
                None
            } else {
                Some(line.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Extension;
    use crate::descriptor::ActivateMeta;
    use crate::strategy::UserLoadingStrategy;

    trait Greeter: Extension {
        fn greet(&self) -> String;
    }

    crate::extension_point! {
        dyn Greeter {
            name: "relay.test.scanner.Greeter",
        }
    }

    struct Hello;
    impl Extension for Hello {}
    impl Greeter for Hello {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    fn greeter_catalog() -> Arc<ProviderCatalog> {
        let catalog = Arc::new(ProviderCatalog::new("test"));
        catalog.register::<dyn Greeter>(ProviderDescriptor::named(
            "demo::greet::Hello",
            |_ctx| Ok(Box::new(Hello)),
        ));
        catalog
    }

    #[test]
    fn test_parse_lines_strips_comments_and_blanks() {
        let lines = parse_lines("# file\nhello=demo::Hello # impl\n\n  \nplain::Path\n");
        assert_eq!(lines, vec!["hello=demo::Hello", "plain::Path"]);
    }

    #[test]
    fn test_prefix_matching_respects_segments() {
        assert!(under_prefix("demo::greet::Hello", "demo"));
        assert!(under_prefix("demo::greet::Hello", "demo::greet"));
        assert!(under_prefix("demo", "demo"));
        assert!(!under_prefix("demography::Hello", "demo"));
    }

    #[test]
    fn test_scan_embedded_resource() {
        let catalog = greeter_catalog();
        catalog.add_embedded(
            "META-INF/relay/relay.test.scanner.Greeter",
            "hello=demo::greet::Hello\nbroken=demo::greet::Missing\n",
        );

        let strategies: Vec<Arc<dyn LoadingStrategy>> = vec![Arc::new(UserLoadingStrategy)];
        let outcome = scan::<dyn Greeter>(&strategies, &[catalog]);

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(
            outcome.records[0].declared_name.as_deref(),
            Some("hello")
        );
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].0.starts_with("broken="));
    }

    #[test]
    fn test_scan_skips_absent_preconditions() {
        let catalog = Arc::new(ProviderCatalog::new("test"));
        catalog.register::<dyn Greeter>(
            ProviderDescriptor::named("demo::greet::Gated", |_ctx| Ok(Box::new(Hello)))
                .with_name("gated")
                .with_activate(ActivateMeta::new().with_on("demo::greet::Prerequisite")),
        );
        catalog.add_embedded(
            "META-INF/relay/relay.test.scanner.Greeter",
            "gated=demo::greet::Gated\n",
        );

        let strategies: Vec<Arc<dyn LoadingStrategy>> = vec![Arc::new(UserLoadingStrategy)];
        let outcome = scan::<dyn Greeter>(&strategies, &[catalog]);
        assert!(outcome.records.is_empty());
        assert!(outcome.failures.is_empty());
    }
}
