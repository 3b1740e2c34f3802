//! Per-point instance builder and cache.
//!
//! An [`ExtensionLoader`] owns the discovered providers of one extension
//! point and lazily builds their singleton instances. The build pipeline
//! runs, in strict order: construction, post-processor `before_init`,
//! wiring, accessor binding, post-processor `after_init`, wrapper layering
//! (with wiring and `after_init` re-run per layer) and finally lifecycle
//! `initialize` on the outermost reference.

use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};

use crate::contract::ExtensionPoint;
use crate::descriptor::{
    ActivateMeta, InstanceContext, ProviderDescriptor, WrapperCtor, WrapperMeta,
};
use crate::director::{
    ErasedLoader, ExtensionAccessor, ExtensionDirector, ExtensionPostProcessor,
};
use crate::error::{ExtensionError, Result};
use crate::inject::{ErasedInstance, ExtensionInjector, WireContext};
use crate::model::ScopeModel;
use crate::registry::{sort_activated, ProviderRegistry};
use crate::url::RequestUrl;

/// Sentinel resolving to the default extension in name positions.
const DEFAULT_KEY: &str = "default";
/// Prefix removing a name from an activate query.
const REMOVE_PREFIX: char = '-';

/// Double-checked lazy cell: at most one build, then an immutable value.
pub(crate) struct Holder<V> {
    slot: RwLock<Option<V>>,
}

impl<V: Clone> Holder<V> {
    pub(crate) fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    pub(crate) fn get(&self) -> Option<V> {
        self.slot.read().clone()
    }

    /// Return the published value, building it under the cell lock when
    /// absent. The builder must not re-enter the same cell.
    pub(crate) fn get_or_try_build<F>(&self, build: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        if let Some(value) = self.get() {
            return Ok(value);
        }
        let mut slot = self.slot.write();
        if let Some(value) = slot.as_ref() {
            return Ok(value.clone());
        }
        let value = build()?;
        *slot = Some(value.clone());
        Ok(value)
    }
}

/// State of the adaptive singleton of a point.
enum AdaptiveCell<T: ?Sized> {
    Empty,
    Built(Arc<T>),
    Failed(ExtensionError),
}

/// Builder and cache of the instances of one extension point.
pub struct ExtensionLoader<T: ExtensionPoint + ?Sized> {
    director: Weak<ExtensionDirector>,
    scope_model: Arc<dyn ScopeModel>,
    post_processors: Arc<RwLock<Vec<Arc<dyn ExtensionPostProcessor>>>>,
    registry: Holder<Arc<RwLock<ProviderRegistry<T>>>>,
    instances: RwLock<HashMap<String, Arc<Holder<Arc<T>>>>>,
    raw_instances: RwLock<HashMap<String, Arc<Holder<Arc<T>>>>>,
    shared_cores: RwLock<HashMap<String, Arc<T>>>,
    adaptive_cell: Mutex<AdaptiveCell<T>>,
    injector: OnceCell<Option<Arc<dyn ExtensionInjector>>>,
    destroyed: AtomicBool,
}

impl<T: ExtensionPoint + ?Sized> std::fmt::Debug for ExtensionLoader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionLoader")
            .field("destroyed", &self.destroyed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<T: ExtensionPoint + ?Sized> ExtensionLoader<T> {
    pub(crate) fn new(director: &Arc<ExtensionDirector>) -> Self {
        Self {
            director: Arc::downgrade(director),
            scope_model: director.scope_model().clone(),
            post_processors: director.shared_post_processors(),
            registry: Holder::new(),
            instances: RwLock::new(HashMap::new()),
            raw_instances: RwLock::new(HashMap::new()),
            shared_cores: RwLock::new(HashMap::new()),
            adaptive_cell: Mutex::new(AdaptiveCell::Empty),
            injector: OnceCell::new(),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Name of the extension point this loader serves.
    pub fn point_name(&self) -> &'static str {
        T::point_name()
    }

    /// The wrapped singleton bound to `name`, building it on first access.
    pub fn get(&self, name: &str) -> Result<Arc<T>> {
        self.get_with(name, true)
    }

    /// Like [`get`](Self::get), with the wrapper chain optional.
    ///
    /// Raw (`wrap == false`) instances live in their own cache; building one
    /// never populates the wrapped cell.
    pub fn get_with(&self, name: &str, wrap: bool) -> Result<Arc<T>> {
        self.check_destroyed()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(self.invalid_argument("extension name must not be empty"));
        }
        if name == "true" {
            return self
                .get_default()?
                .ok_or_else(|| self.not_found_plain(name));
        }
        let cells = if wrap { &self.instances } else { &self.raw_instances };
        let holder = self.cell(cells, name);
        holder.get_or_try_build(|| self.create(name, wrap))
    }

    /// The instance bound to `name`, or the default extension when the name
    /// is unknown.
    pub fn get_or_default(&self, name: &str) -> Result<Arc<T>> {
        if self.has(name)? {
            self.get(name)
        } else {
            self.get_default()?
                .ok_or_else(|| self.not_found_plain(name))
        }
    }

    /// The default extension, when the point declares a default name.
    pub fn get_default(&self) -> Result<Option<Arc<T>>> {
        self.check_destroyed()?;
        let default_name = match self.default_name()? {
            Some(name) if name != "true" => name,
            _ => return Ok(None),
        };
        self.get(&default_name).map(Some)
    }

    /// The point's default extension name.
    pub fn default_name(&self) -> Result<Option<String>> {
        let registry = self.registry()?;
        let name = registry.read().default_name().map(str::to_string);
        Ok(name)
    }

    /// True when a provider is bound to `name`.
    pub fn has(&self, name: &str) -> Result<bool> {
        self.check_destroyed()?;
        if name.trim().is_empty() {
            return Err(self.invalid_argument("extension name must not be empty"));
        }
        let registry = self.registry()?;
        let present = registry.read().has(name);
        Ok(present)
    }

    /// Sorted names of every discovered provider.
    pub fn supported_names(&self) -> Result<BTreeSet<String>> {
        self.check_destroyed()?;
        let registry = self.registry()?;
        let names = registry.read().names();
        Ok(names)
    }

    /// Primary name of the provider registered under an impl path.
    pub fn extension_name(&self, path: &str) -> Result<Option<String>> {
        let registry = self.registry()?;
        let name = registry.read().primary_name(path).map(str::to_string);
        Ok(name)
    }

    /// The already-built instance bound to `name`, without triggering a
    /// build.
    pub fn get_loaded(&self, name: &str) -> Option<Arc<T>> {
        self.instances.read().get(name).and_then(|h| h.get())
    }

    /// Names whose wrapped singleton has been built.
    pub fn loaded_names(&self) -> BTreeSet<String> {
        self.instances
            .read()
            .iter()
            .filter(|(_, holder)| holder.get().is_some())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Every already-built wrapped singleton.
    pub fn loaded_instances(&self) -> Vec<Arc<T>> {
        self.instances
            .read()
            .values()
            .filter_map(|holder| holder.get())
            .collect()
    }

    /// Register a provider programmatically.
    pub fn add(&self, name: &str, descriptor: ProviderDescriptor<T>) -> Result<()> {
        self.check_destroyed()?;
        let registry = self.registry()?;
        let result = registry.write().add(name, descriptor);
        result
    }

    /// Replace a provider programmatically, dropping its cached instances.
    pub fn replace(&self, name: &str, descriptor: ProviderDescriptor<T>) -> Result<()> {
        self.check_destroyed()?;
        let adaptive = descriptor.is_adaptive();
        let registry = self.registry()?;
        {
            let mut reg = registry.write();
            let stale_path = reg.get(name).map(|d| d.path().to_string());
            reg.replace(name, descriptor)?;
            if let Some(path) = stale_path {
                self.shared_cores.write().remove(&path);
            }
        }
        self.instances.write().remove(name);
        self.raw_instances.write().remove(name);
        if adaptive {
            *self.adaptive_cell.lock() = AdaptiveCell::Empty;
        }
        Ok(())
    }

    /// The adaptive singleton of the point.
    ///
    /// A failed first build is sticky: every later call re-raises the same
    /// error without retrying.
    pub fn get_adaptive(&self) -> Result<Arc<T>> {
        self.check_destroyed()?;
        let mut cell = self.adaptive_cell.lock();
        match &*cell {
            AdaptiveCell::Built(instance) => Ok(instance.clone()),
            AdaptiveCell::Failed(error) => Err(error.clone()),
            AdaptiveCell::Empty => match self.create_adaptive() {
                Ok(instance) => {
                    *cell = AdaptiveCell::Built(instance.clone());
                    Ok(instance)
                }
                Err(error) => {
                    *cell = AdaptiveCell::Failed(error.clone());
                    Err(error)
                }
            },
        }
    }

    /// Ordered list of the extensions activated by `url` for `group`.
    ///
    /// `names` lists caller-requested tokens: plain names, `-name` removals,
    /// the `default` sentinel placing the auto-activated block, and
    /// `-default` disabling auto-activation entirely.
    pub fn get_activate(
        &self,
        url: &RequestUrl,
        names: Option<&[&str]>,
        group: Option<&str>,
    ) -> Result<Vec<Arc<T>>> {
        self.check_destroyed()?;
        let tokens: Vec<String> = names
            .unwrap_or(&[])
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(|t| t.strip_prefix('+').unwrap_or(t).to_string())
            .collect();
        let token_set: HashSet<&str> = tokens.iter().map(String::as_str).collect();
        let removed = |name: &str| token_set.contains(format!("-{}", name).as_str());

        let mut auto_names: Vec<String> = Vec::new();
        if !removed(DEFAULT_KEY) {
            let registry = self.registry()?;
            let mut candidates: Vec<(String, ActivateMeta)> = registry
                .read()
                .activates()
                .iter()
                .filter(|(name, meta)| {
                    group_matches(group, &meta.groups)
                        && !token_set.contains(name.as_str())
                        && !removed(name)
                        && url_matches(&meta.values, url)
                })
                .cloned()
                .collect();
            sort_activated(&mut candidates);
            auto_names = candidates.into_iter().map(|(name, _)| name).collect();
        }

        let mut result = Vec::new();
        let has_sentinel = token_set.contains(DEFAULT_KEY);
        for token in &tokens {
            if token.starts_with(REMOVE_PREFIX) || removed(token) {
                continue;
            }
            if token == DEFAULT_KEY {
                for name in &auto_names {
                    self.activate_into(name, &mut result);
                }
                continue;
            }
            self.activate_into(token, &mut result);
        }
        if !has_sentinel {
            for name in &auto_names {
                self.activate_into(name, &mut result);
            }
        }
        Ok(result)
    }

    /// Activated extensions with the names read from a URL parameter.
    pub fn get_activate_by_key(
        &self,
        url: &RequestUrl,
        key: &str,
        group: Option<&str>,
    ) -> Result<Vec<Arc<T>>> {
        let value = url.parameter(key).unwrap_or("");
        let names: Vec<&str> = value.split(',').map(str::trim).filter(|n| !n.is_empty()).collect();
        let names = if names.is_empty() { None } else { Some(names.as_slice()) };
        self.get_activate(url, names, group)
    }

    /// Every activate-tagged extension, ordered, regardless of URL.
    pub fn get_activate_all(&self) -> Result<Vec<Arc<T>>> {
        self.check_destroyed()?;
        let registry = self.registry()?;
        let mut entries: Vec<(String, ActivateMeta)> =
            registry.read().activates().to_vec();
        sort_activated(&mut entries);
        let mut result = Vec::new();
        for (name, _) in &entries {
            self.activate_into(name, &mut result);
        }
        Ok(result)
    }

    /// Tear down every built instance and refuse further calls.
    ///
    /// Idempotent; each distinct instance observes its disposer once.
    pub fn destroy(&self) {
        if self
            .destroyed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let mut disposed: HashSet<*const ()> = HashSet::new();
        let mut dispose = |instance: Arc<T>| {
            let key = Arc::as_ptr(&instance).cast::<()>();
            if disposed.insert(key) {
                instance.shutdown();
            }
        };

        for core in self.shared_cores.write().drain() {
            dispose(core.1);
        }
        for (_, holder) in self.instances.write().drain() {
            if let Some(instance) = holder.get() {
                dispose(instance);
            }
        }
        for (_, holder) in self.raw_instances.write().drain() {
            if let Some(instance) = holder.get() {
                dispose(instance);
            }
        }
        let mut cell = self.adaptive_cell.lock();
        if let AdaptiveCell::Built(instance) = &*cell {
            dispose(instance.clone());
        }
        *cell = AdaptiveCell::Empty;
        tracing::debug!(point = T::point_name(), "extension loader destroyed");
    }

    fn cell(
        &self,
        cells: &RwLock<HashMap<String, Arc<Holder<Arc<T>>>>>,
        name: &str,
    ) -> Arc<Holder<Arc<T>>> {
        if let Some(holder) = cells.read().get(name) {
            return holder.clone();
        }
        cells
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Holder::new()))
            .clone()
    }

    fn create(&self, name: &str, wrap: bool) -> Result<Arc<T>> {
        let registry = self.registry()?;
        let (descriptor, wrappers) = {
            let reg = registry.read();
            match reg.get(name) {
                Some(descriptor) if !reg.is_unacceptable(name) => {
                    (descriptor.clone(), reg.wrappers().to_vec())
                }
                _ => {
                    return Err(ExtensionError::NotFound {
                        point: T::point_name().to_string(),
                        name: name.to_string(),
                        causes: reg.failures_for(name),
                    })
                }
            }
        };

        let accessor = self.accessor()?;
        let mut current = self.shared_core(&descriptor, name, &accessor)?;

        if wrap {
            for (ctor, meta, path) in sorted_wrappers(&wrappers) {
                if !meta.applies_to(name) {
                    continue;
                }
                let ctx = InstanceContext::new(&self.scope_model, &accessor);
                let mut boxed = ctor(current, &ctx)
                    .map_err(|error| self.build_error(name, &error))?;
                self.wire_instance(&mut *boxed, Some(name));
                self.post_init(&mut *boxed, Some(name), &accessor)
                    .map_err(|error| self.build_error(name, &error))?;
                current = Arc::from(boxed);
                tracing::debug!(
                    point = T::point_name(),
                    extension = name,
                    wrapper = %path,
                    "applied wrapper"
                );
            }
        }

        current
            .initialize()
            .map_err(|error| self.build_error(name, &error))?;
        tracing::debug!(point = T::point_name(), extension = name, wrap, "built extension");
        Ok(current)
    }

    /// Build (or reuse) the un-wrapped core instance of a provider.
    fn shared_core(
        &self,
        descriptor: &ProviderDescriptor<T>,
        name: &str,
        accessor: &ExtensionAccessor,
    ) -> Result<Arc<T>> {
        if let Some(core) = self.shared_cores.read().get(descriptor.path()) {
            return Ok(core.clone());
        }

        let ctor = descriptor.extension_ctor().ok_or_else(|| {
            ExtensionError::Internal(format!(
                "provider `{}` is not constructible",
                descriptor.path()
            ))
        })?;
        let ctx = InstanceContext::new(&self.scope_model, accessor);
        let mut boxed = ctor(&ctx).map_err(|error| self.build_error(name, &error))?;
        self.run_before(&mut *boxed, Some(name))
            .map_err(|error| self.build_error(name, &error))?;
        self.wire_instance(&mut *boxed, Some(name));
        self.post_init(&mut *boxed, Some(name), accessor)
            .map_err(|error| self.build_error(name, &error))?;

        let core: Arc<T> = Arc::from(boxed);
        let published = self
            .shared_cores
            .write()
            .entry(descriptor.path().to_string())
            .or_insert_with(|| core.clone())
            .clone();
        Ok(published)
    }

    fn create_adaptive(&self) -> Result<Arc<T>> {
        let registry = self.registry()?;
        let (descriptor, default_name) = {
            let reg = registry.read();
            (
                reg.adaptive().cloned(),
                reg.default_name().map(str::to_string),
            )
        };
        let accessor = self.accessor()?;

        let mut boxed: Box<T> = match descriptor {
            Some(descriptor) => {
                let ctor = descriptor.extension_ctor().ok_or_else(|| {
                    ExtensionError::Internal(format!(
                        "adaptive provider `{}` is not constructible",
                        descriptor.path()
                    ))
                })?;
                let ctx = InstanceContext::new(&self.scope_model, &accessor);
                ctor(&ctx)?
            }
            None => T::adaptive(crate::adaptive::AdaptiveBinding::new(
                accessor.clone(),
                default_name,
            ))
            .ok_or_else(|| ExtensionError::AdaptiveUnavailable {
                point: T::point_name().to_string(),
                reason: "no adaptive provider is registered and the point declares no \
                         adaptive facade"
                    .to_string(),
            })?,
        };

        self.run_before(&mut *boxed, None)?;
        self.wire_instance(&mut *boxed, None);
        self.post_init(&mut *boxed, None, &accessor)?;
        let instance: Arc<T> = Arc::from(boxed);
        instance.initialize()?;
        Ok(instance)
    }

    fn run_before(&self, instance: &mut T, name: Option<&str>) -> Result<()> {
        let processors: Vec<Arc<dyn ExtensionPostProcessor>> =
            self.post_processors.read().clone();
        for processor in processors {
            processor.before_init(instance.as_extension_mut(), name)?;
        }
        Ok(())
    }

    fn post_init(
        &self,
        instance: &mut T,
        name: Option<&str>,
        accessor: &ExtensionAccessor,
    ) -> Result<()> {
        instance.bind_accessor(accessor);
        let processors: Vec<Arc<dyn ExtensionPostProcessor>> =
            self.post_processors.read().clone();
        for processor in processors {
            processor.after_init(instance.as_extension_mut(), name)?;
        }
        Ok(())
    }

    /// Wire optional collaborators; failures are logged and swallowed.
    fn wire_instance(&self, instance: &mut T, name: Option<&str>) {
        let accessor = match self.accessor() {
            Ok(accessor) => accessor,
            Err(_) => return,
        };
        let ctx = WireContext::new(
            accessor,
            self.injector(),
            T::point_name(),
            name.map(str::to_string),
        );
        if let Err(error) = instance.wire(&ctx) {
            tracing::warn!(
                point = T::point_name(),
                extension = name.unwrap_or("<adaptive>"),
                %error,
                "wiring failed; continuing with un-wired optional dependencies"
            );
        }
    }

    fn injector(&self) -> Option<Arc<dyn ExtensionInjector>> {
        self.injector
            .get_or_init(|| {
                if TypeId::of::<T>() == TypeId::of::<dyn ExtensionInjector>() {
                    return None;
                }
                let director = self.director.upgrade()?;
                director
                    .loader::<dyn ExtensionInjector>()
                    .ok()?
                    .get_adaptive()
                    .ok()
            })
            .clone()
    }

    fn activate_into(&self, name: &str, out: &mut Vec<Arc<T>>) {
        match self.get(name) {
            Ok(instance) => out.push(instance),
            Err(error) => {
                tracing::warn!(
                    point = T::point_name(),
                    extension = name,
                    %error,
                    "skipping activate candidate that cannot be built"
                );
            }
        }
    }

    fn registry(&self) -> Result<Arc<RwLock<ProviderRegistry<T>>>> {
        self.check_destroyed()?;
        self.registry.get_or_try_build(|| {
            let catalogs = self.scope_model.catalogs();
            ProviderRegistry::<T>::build(&catalogs).map(|reg| Arc::new(RwLock::new(reg)))
        })
    }

    fn accessor(&self) -> Result<ExtensionAccessor> {
        self.director
            .upgrade()
            .map(|director| director.accessor())
            .ok_or_else(|| {
                ExtensionError::Destroyed(format!(
                    "extension director of loader `{}`",
                    T::point_name()
                ))
            })
    }

    fn check_destroyed(&self) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            Err(ExtensionError::Destroyed(format!(
                "extension loader `{}`",
                T::point_name()
            )))
        } else {
            Ok(())
        }
    }

    fn invalid_argument(&self, reason: &str) -> ExtensionError {
        ExtensionError::InvalidArgument {
            point: T::point_name().to_string(),
            reason: reason.to_string(),
        }
    }

    fn not_found_plain(&self, name: &str) -> ExtensionError {
        ExtensionError::NotFound {
            point: T::point_name().to_string(),
            name: name.to_string(),
            causes: Vec::new(),
        }
    }

    fn build_error(&self, name: &str, error: &ExtensionError) -> ExtensionError {
        ExtensionError::Build {
            point: T::point_name().to_string(),
            name: name.to_string(),
            cause: error.to_string(),
        }
    }
}

impl<T: ExtensionPoint + ?Sized> ErasedLoader for ExtensionLoader<T> {
    fn destroy(&self) {
        ExtensionLoader::destroy(self);
    }

    fn erased_adaptive(&self) -> Option<ErasedInstance> {
        self.get_adaptive()
            .ok()
            .map(|instance| Box::new(instance) as ErasedInstance)
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Wrapper application order: higher `order` first, so the lowest `order`
/// ends up outermost. Filters apply after the sort.
fn sorted_wrappers<T: ?Sized>(
    wrappers: &[ProviderDescriptor<T>],
) -> Vec<(WrapperCtor<T>, WrapperMeta, String)> {
    let mut parts: Vec<(WrapperCtor<T>, WrapperMeta, String)> = wrappers
        .iter()
        .filter_map(|w| {
            w.wrapper_parts()
                .map(|(ctor, meta)| (ctor.clone(), meta.clone(), w.path().to_string()))
        })
        .collect();
    parts.sort_by(|a, b| b.1.order.cmp(&a.1.order));
    parts
}

fn group_matches(query: Option<&str>, groups: &[String]) -> bool {
    let query = match query {
        Some(q) if !q.is_empty() => q,
        _ => return true,
    };
    groups.is_empty() || groups.iter().any(|g| g == query)
}

fn url_matches(values: &[(String, Option<String>)], url: &RequestUrl) -> bool {
    if values.is_empty() {
        return true;
    }
    values.iter().any(|(key, expected)| {
        match (url.parameter(key), expected) {
            (Some(actual), Some(expected)) => actual == expected,
            (Some(actual), None) => !actual.is_empty(),
            (None, _) => false,
        }
    })
}
