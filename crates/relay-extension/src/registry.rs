//! Per-point provider registry.
//!
//! Files every scanned [`ProviderDescriptor`] under its classification,
//! derives implicit names, applies the override policy, flags ambiguous
//! names as unacceptable and keeps the activate-metadata index used by
//! activate queries.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use crate::catalog::ProviderCatalog;
use crate::contract::ExtensionPoint;
use crate::descriptor::{ActivateMeta, ProviderDescriptor};
use crate::error::{ExtensionError, Result};
use crate::scanner;
use crate::strategy::loading_strategies;

/// Registry of the discovered providers of one extension point.
pub struct ProviderRegistry<T: ?Sized> {
    named: HashMap<String, ProviderDescriptor<T>>,
    primary_names: HashMap<String, String>,
    adaptive: Option<ProviderDescriptor<T>>,
    wrappers: Vec<ProviderDescriptor<T>>,
    activates: Vec<(String, ActivateMeta)>,
    unacceptable: HashSet<String>,
    failures: Vec<(String, String)>,
    default_name: Option<String>,
}

impl<T: ExtensionPoint + ?Sized> ProviderRegistry<T> {
    fn empty() -> Self {
        Self {
            named: HashMap::new(),
            primary_names: HashMap::new(),
            adaptive: None,
            wrappers: Vec::new(),
            activates: Vec::new(),
            unacceptable: HashSet::new(),
            failures: Vec::new(),
            default_name: None,
        }
    }

    /// Build the registry by scanning the discovery files of `T`.
    pub(crate) fn build(model_catalogs: &[Arc<ProviderCatalog>]) -> Result<Self> {
        let mut registry = Self::empty();
        registry.default_name = validated_default_name::<T>()?;

        let outcome = scanner::scan::<T>(&loading_strategies(), model_catalogs);
        registry.failures = outcome.failures;

        for record in outcome.records {
            let line_key = match &record.declared_name {
                Some(name) => format!("{}={}", name, record.descriptor.path()),
                None => record.descriptor.path().to_string(),
            };
            if let Err(error) =
                registry.register(record.descriptor, record.declared_name, record.overridden)
            {
                tracing::error!(
                    point = T::point_name(),
                    line = %line_key,
                    %error,
                    "failed to register discovered provider"
                );
                registry.failures.push((line_key, error.to_string()));
            }
        }

        Ok(registry)
    }

    /// Classify and file one provider record.
    pub(crate) fn register(
        &mut self,
        descriptor: ProviderDescriptor<T>,
        declared_name: Option<String>,
        overridden: bool,
    ) -> Result<()> {
        if descriptor.is_adaptive() {
            self.file_adaptive(descriptor, overridden)
        } else if descriptor.is_wrapper() {
            self.file_wrapper(descriptor);
            Ok(())
        } else {
            self.file_named(descriptor, declared_name, overridden)
        }
    }

    fn file_adaptive(
        &mut self,
        descriptor: ProviderDescriptor<T>,
        overridden: bool,
    ) -> Result<()> {
        let conflict = match &self.adaptive {
            Some(existing) if !overridden && existing.path() != descriptor.path() => {
                Some(existing.path().to_string())
            }
            _ => None,
        };
        match conflict {
            Some(existing) => Err(ExtensionError::AmbiguousAdaptive {
                point: T::point_name().to_string(),
                existing,
                duplicate: descriptor.path().to_string(),
            }),
            None => {
                self.adaptive = Some(descriptor);
                Ok(())
            }
        }
    }

    fn file_wrapper(&mut self, descriptor: ProviderDescriptor<T>) {
        if !self.wrappers.iter().any(|w| w.path() == descriptor.path()) {
            self.wrappers.push(descriptor);
        }
    }

    fn file_named(
        &mut self,
        descriptor: ProviderDescriptor<T>,
        declared_name: Option<String>,
        overridden: bool,
    ) -> Result<()> {
        let aliases = resolve_aliases::<T>(&descriptor, declared_name)?;

        let primary = aliases[0].clone();
        self.primary_names
            .entry(descriptor.path().to_string())
            .or_insert_with(|| primary.clone());

        if let Some(activate) = descriptor.activate() {
            if !self.activates.iter().any(|(n, _)| *n == primary) {
                self.activates.push((primary.clone(), activate.clone()));
            }
        }

        for alias in aliases {
            let conflict = match self.named.get(&alias) {
                None => None,
                Some(_) if overridden => None,
                Some(existing) if existing.path() == descriptor.path() => continue,
                Some(existing) => Some(existing.path().to_string()),
            };
            match conflict {
                None => {
                    self.named.insert(alias, descriptor.clone());
                }
                Some(existing) => {
                    self.unacceptable.insert(alias.clone());
                    return Err(ExtensionError::Ambiguous {
                        point: T::point_name().to_string(),
                        name: alias,
                        existing,
                        duplicate: descriptor.path().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Register a provider programmatically; fails on an occupied name or
    /// adaptive slot.
    pub(crate) fn add(
        &mut self,
        name: &str,
        descriptor: ProviderDescriptor<T>,
    ) -> Result<()> {
        if descriptor.is_adaptive() {
            if let Some(existing) = &self.adaptive {
                return Err(ExtensionError::AmbiguousAdaptive {
                    point: T::point_name().to_string(),
                    existing: existing.path().to_string(),
                    duplicate: descriptor.path().to_string(),
                });
            }
            self.adaptive = Some(descriptor);
            return Ok(());
        }
        if descriptor.is_wrapper() {
            self.file_wrapper(descriptor);
            return Ok(());
        }
        if name.trim().is_empty() {
            return Err(ExtensionError::InvalidArgument {
                point: T::point_name().to_string(),
                reason: "extension name must not be blank".to_string(),
            });
        }
        if let Some(existing) = self.named.get(name) {
            return Err(ExtensionError::Ambiguous {
                point: T::point_name().to_string(),
                name: name.to_string(),
                existing: existing.path().to_string(),
                duplicate: descriptor.path().to_string(),
            });
        }
        self.file_named(descriptor, Some(name.to_string()), false)
    }

    /// Replace an existing provider programmatically; fails when the name
    /// (or adaptive slot) is not occupied yet.
    pub(crate) fn replace(
        &mut self,
        name: &str,
        descriptor: ProviderDescriptor<T>,
    ) -> Result<()> {
        if descriptor.is_adaptive() {
            if self.adaptive.is_none() {
                return Err(ExtensionError::InvalidArgument {
                    point: T::point_name().to_string(),
                    reason: "no adaptive provider to replace".to_string(),
                });
            }
            self.adaptive = Some(descriptor);
            return Ok(());
        }
        if name.trim().is_empty() {
            return Err(ExtensionError::InvalidArgument {
                point: T::point_name().to_string(),
                reason: "extension name must not be blank".to_string(),
            });
        }
        if !self.named.contains_key(name) {
            return Err(ExtensionError::NotFound {
                point: T::point_name().to_string(),
                name: name.to_string(),
                causes: Vec::new(),
            });
        }
        self.primary_names
            .insert(descriptor.path().to_string(), name.to_string());
        self.named.insert(name.to_string(), descriptor);
        Ok(())
    }

    /// Descriptor bound to a name.
    pub(crate) fn get(&self, name: &str) -> Option<&ProviderDescriptor<T>> {
        self.named.get(name)
    }

    /// True when the name is bound.
    pub(crate) fn has(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    /// Sorted set of all bound names.
    pub(crate) fn names(&self) -> BTreeSet<String> {
        self.named.keys().cloned().collect()
    }

    /// The point's validated default name.
    pub(crate) fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// The adaptive descriptor, if one was registered.
    pub(crate) fn adaptive(&self) -> Option<&ProviderDescriptor<T>> {
        self.adaptive.as_ref()
    }

    /// All wrapper descriptors, in discovery order.
    pub(crate) fn wrappers(&self) -> &[ProviderDescriptor<T>] {
        &self.wrappers
    }

    /// Activate records in discovery order, keyed by primary name.
    pub(crate) fn activates(&self) -> &[(String, ActivateMeta)] {
        &self.activates
    }

    /// True when the name was flagged ambiguous during scanning.
    pub(crate) fn is_unacceptable(&self, name: &str) -> bool {
        self.unacceptable.contains(name)
    }

    /// Primary name of an impl path.
    pub(crate) fn primary_name(&self, path: &str) -> Option<&str> {
        self.primary_names.get(path).map(String::as_str)
    }

    /// Scan failures whose line key starts with the name, case-insensitive.
    pub(crate) fn failures_for(&self, name: &str) -> Vec<String> {
        let needle = name.to_lowercase();
        self.failures
            .iter()
            .filter(|(line, _)| line.to_lowercase().starts_with(&needle))
            .map(|(line, cause)| format!("{}: {}", line, cause))
            .collect()
    }
}

fn validated_default_name<T: ExtensionPoint + ?Sized>() -> Result<Option<String>> {
    let declared = match T::default_name() {
        Some(declared) => declared.trim(),
        None => return Ok(None),
    };
    if declared.is_empty() {
        return Ok(None);
    }
    let mut tokens = declared.split(',').map(str::trim).filter(|t| !t.is_empty());
    let first = tokens.next();
    if tokens.next().is_some() || first.map_or(true, |t| t.contains(char::is_whitespace)) {
        return Err(ExtensionError::InvalidDefaultName {
            point: T::point_name().to_string(),
            value: declared.to_string(),
        });
    }
    Ok(first.map(str::to_string))
}

fn resolve_aliases<T: ExtensionPoint + ?Sized>(
    descriptor: &ProviderDescriptor<T>,
    declared_name: Option<String>,
) -> Result<Vec<String>> {
    let mut aliases: Vec<String> = match declared_name {
        Some(declared) => declared
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    };
    if aliases.is_empty() {
        aliases = descriptor.names().to_vec();
    }
    if aliases.is_empty() {
        if let Some(implicit) = implicit_name(descriptor.path(), T::simple_name()) {
            aliases.push(implicit);
        }
    }
    if aliases.is_empty() {
        return Err(ExtensionError::InvalidArgument {
            point: T::point_name().to_string(),
            reason: format!(
                "no extension name declared or derivable for impl path `{}`",
                descriptor.path()
            ),
        });
    }
    Ok(aliases)
}

/// Derive the implicit name of a provider: the last path segment, stripped
/// of the point's simple name, lowercased.
fn implicit_name(path: &str, simple_name: &str) -> Option<String> {
    let tail = path.rsplit("::").next().unwrap_or(path);
    let stem = tail.strip_suffix(simple_name).unwrap_or(tail);
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_lowercase())
    }
}

/// Order activated entries: a topological pass over the `before`/`after`
/// constraints with ties broken by `order`, then name. A cycle falls back
/// to the plain `(order, name)` sort of whatever remains.
pub(crate) fn sort_activated(entries: &mut Vec<(String, ActivateMeta)>) {
    let names: Vec<String> = entries.iter().map(|(n, _)| n.clone()).collect();
    let index: HashMap<&str, usize> = names
        .iter()
        .enumerate()
        .map(|(i, n)| (n.as_str(), i))
        .collect();

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); entries.len()];
    let mut indegree: Vec<usize> = vec![0; entries.len()];
    for (i, (_, meta)) in entries.iter().enumerate() {
        for target in &meta.before {
            if let Some(&j) = index.get(target.as_str()) {
                successors[i].push(j);
                indegree[j] += 1;
            }
        }
        for source in &meta.after {
            if let Some(&j) = index.get(source.as_str()) {
                successors[j].push(i);
                indegree[i] += 1;
            }
        }
    }

    let tiebreak = |i: usize, entries: &[(String, ActivateMeta)]| {
        (entries[i].1.order, entries[i].0.clone())
    };

    let mut remaining: BTreeSet<usize> = (0..entries.len()).collect();
    let mut sequence: Vec<usize> = Vec::with_capacity(entries.len());
    while !remaining.is_empty() {
        let ready = remaining
            .iter()
            .copied()
            .filter(|&i| indegree[i] == 0)
            .min_by_key(|&i| tiebreak(i, entries));
        match ready {
            Some(i) => {
                remaining.remove(&i);
                sequence.push(i);
                for &j in &successors[i] {
                    indegree[j] = indegree[j].saturating_sub(1);
                }
            }
            None => {
                // Constraint cycle: deterministic numeric/name fallback.
                let mut rest: Vec<usize> = remaining.iter().copied().collect();
                rest.sort_by_key(|&i| tiebreak(i, entries));
                sequence.extend(rest);
                break;
            }
        }
    }

    let mut reordered = Vec::with_capacity(entries.len());
    for i in sequence {
        reordered.push(entries[i].clone());
    }
    *entries = reordered;
}
