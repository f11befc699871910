//! Memoizes one [`MultiNamespaceInformer`] per resource type and keeps every
//! memoized informer's children in sync with a single [`NamespaceSet`].
//!
//! Grounded on the dynamic `multiNamespaceInformerFactory` this engine
//! descends from: `set_namespaces` diffs the new membership against the old
//! one and fans `add_namespace`/`remove_namespace` out to every registered
//! informer, rather than each informer tracking membership independently.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::{error, info};

use crate::config::FactoryConfig;
use crate::error::Result;
use crate::metrics;
use crate::namespace_set::NamespaceSet;
use crate::types::{ChildInformerFactory, ListOptionsTweak, NamespaceName};
use crate::multi_namespace_informer::MultiNamespaceInformer;

/// Opaque key identifying a resource type this factory memoizes an informer
/// for. The generated adapter layer is expected to supply a stable key per
/// (group, version, resource) triple; this engine treats it as an opaque
/// string.
pub type ResourceKey = String;

trait ErasedInformer: Send + Sync {
    fn add_namespace_boxed(&self, namespace: NamespaceName) -> futures::future::BoxFuture<'_, Result<()>>;
    fn remove_namespace(&self, namespace: &NamespaceName);
    fn non_blocking_run_boxed(
        &self,
        stop: crate::types::StopSignal,
    ) -> futures::future::BoxFuture<'_, Result<()>>;
    fn has_synced(&self) -> bool;
    fn is_cluster_scoped(&self) -> bool;
}

impl<T: Send + Sync + 'static> ErasedInformer for MultiNamespaceInformer<T> {
    fn add_namespace_boxed(&self, namespace: NamespaceName) -> futures::future::BoxFuture<'_, Result<()>> {
        Box::pin(self.add_namespace(namespace))
    }

    fn remove_namespace(&self, namespace: &NamespaceName) {
        MultiNamespaceInformer::remove_namespace(self, namespace)
    }

    fn non_blocking_run_boxed(
        &self,
        stop: crate::types::StopSignal,
    ) -> futures::future::BoxFuture<'_, Result<()>> {
        use crate::types::SharedIndexInformer;
        Box::pin(self.non_blocking_run(stop))
    }

    fn has_synced(&self) -> bool {
        use crate::types::SharedIndexInformer;
        SharedIndexInformer::has_synced(self)
    }

    fn is_cluster_scoped(&self) -> bool {
        MultiNamespaceInformer::is_cluster_scoped(self)
    }
}

struct State {
    erased: HashMap<ResourceKey, Arc<dyn ErasedInformer>>,
    typed: HashMap<ResourceKey, Box<dyn Any + Send + Sync>>,
}

/// Memoizes one [`MultiNamespaceInformer`] per resource key and keeps every
/// memoized informer's namespace membership synchronized with the factory's
/// [`NamespaceSet`].
pub struct Factory {
    namespaces: NamespaceSet,
    resync_period: Duration,
    custom_resync: HashMap<ResourceKey, Duration>,
    tweak_list_options: Option<ListOptionsTweak>,
    state: Arc<Mutex<State>>,
}

impl Factory {
    pub fn new(config: FactoryConfig) -> Self {
        let namespaces = NamespaceSet::new();
        if let Some(initial) = config.namespaces {
            namespaces.set(initial);
        }
        let state = Arc::new(Mutex::new(State {
            erased: HashMap::new(),
            typed: HashMap::new(),
        }));

        {
            let state = state.clone();
            namespaces.add_observer(
                move |ns| {
                    let ns = ns.clone();
                    let informers: Vec<(ResourceKey, Arc<dyn ErasedInformer>)> = state
                        .lock()
                        .erased
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    for (key, informer) in informers {
                        if informer.is_cluster_scoped() {
                            continue;
                        }
                        let ns = ns.clone();
                        tokio::spawn(async move {
                            if let Err(e) = informer.add_namespace_boxed(ns.clone()).await {
                                error!(resource = %key, namespace = %ns, error = %e, "failed to add namespace to informer");
                            }
                        });
                    }
                },
                move |ns| {
                    let informers: Vec<Arc<dyn ErasedInformer>> =
                        state.lock().erased.values().cloned().collect();
                    for informer in informers {
                        if informer.is_cluster_scoped() {
                            continue;
                        }
                        informer.remove_namespace(ns);
                    }
                },
            );
        }

        Self {
            namespaces,
            resync_period: config.resync_period,
            custom_resync: config.custom_resync,
            tweak_list_options: config.tweak_list_options,
            state,
        }
    }

    /// The list/watch parameter transform configured at construction, if
    /// any. The generated adapter's [`ChildInformerFactory`] closure is
    /// expected to call this when it builds a namespace's real watch, since
    /// the engine itself never issues list/watch requests.
    pub fn tweak_list_options(&self) -> Option<ListOptionsTweak> {
        self.tweak_list_options.clone()
    }

    /// Replaces the current namespace membership; every memoized informer's
    /// children are brought in line via the observer registered at
    /// construction. Callers must invoke [`Self::start`] and
    /// [`Self::wait_for_cache_sync`] again after this to pick up newly added
    /// namespaces.
    pub fn set_namespaces(&self, namespaces: impl IntoIterator<Item = NamespaceName>) {
        self.namespaces.set(namespaces);
    }

    fn resync_for(&self, key: &str) -> Duration {
        self.custom_resync
            .get(key)
            .copied()
            .unwrap_or(self.resync_period)
    }

    /// Returns the existing memoized informer for `key`, or builds one via
    /// `child_factory` and seeds it with a child for every namespace
    /// currently in the set. Seeding is awaited here, synchronously with
    /// respect to the caller, so that by the time this returns the
    /// informer's child set already equals the factory's `NamespaceSet`
    /// (the §3 Factory invariant) rather than catching up some time after
    /// a fire-and-forget spawn.
    pub async fn namespaced_resource<T: Send + Sync + 'static>(
        &self,
        key: ResourceKey,
        child_factory: ChildInformerFactory<T>,
    ) -> Arc<MultiNamespaceInformer<T>> {
        if let Some(existing) = self.lookup::<T>(&key) {
            return existing;
        }
        let resync = self.resync_for(&key);
        let informer = Arc::new(MultiNamespaceInformer::namespaced(key.clone(), child_factory, resync));
        for ns in self.namespaces.list() {
            if let Err(e) = informer.add_namespace(ns.clone()).await {
                error!(resource = %key, namespace = %ns, error = %e, "failed to seed namespace on newly created informer");
            }
        }
        self.memoize(key, informer.clone());
        info!("created namespaced informer");
        informer
    }

    /// Cluster-scoped resources are not discoverable from a resource key
    /// alone without a discovery round trip, deliberately avoided here; the
    /// caller (the generated adapter) knows the scope statically and must
    /// request this entry point rather than `namespaced_resource`.
    pub async fn cluster_resource<T: Send + Sync + 'static>(
        &self,
        key: ResourceKey,
        child_factory: ChildInformerFactory<T>,
    ) -> Arc<MultiNamespaceInformer<T>> {
        if let Some(existing) = self.lookup::<T>(&key) {
            return existing;
        }
        let resync = self.resync_for(&key);
        let informer = Arc::new(MultiNamespaceInformer::cluster_scoped(key.clone(), child_factory, resync));
        self.memoize(key, informer.clone());
        info!("created cluster-scoped informer");
        informer
    }

    /// Dispatches to [`Self::namespaced_resource`] or [`Self::cluster_resource`]
    /// based on `namespaced`, for generated adapters that already know a
    /// resource's scope statically and would rather pass it as a flag than
    /// call one of two named constructors (§4.5).
    pub async fn for_resource<T: Send + Sync + 'static>(
        &self,
        key: ResourceKey,
        child_factory: ChildInformerFactory<T>,
        namespaced: bool,
    ) -> Arc<MultiNamespaceInformer<T>> {
        if namespaced {
            self.namespaced_resource(key, child_factory).await
        } else {
            self.cluster_resource(key, child_factory).await
        }
    }

    fn memoize<T: Send + Sync + 'static>(&self, key: ResourceKey, informer: Arc<MultiNamespaceInformer<T>>) {
        let mut state = self.state.lock();
        state
            .erased
            .insert(key.clone(), informer.clone() as Arc<dyn ErasedInformer>);
        state.typed.insert(key, Box::new(informer));
    }

    fn lookup<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<MultiNamespaceInformer<T>>> {
        let state = self.state.lock();
        state
            .typed
            .get(key)?
            .downcast_ref::<Arc<MultiNamespaceInformer<T>>>()
            .cloned()
    }

    /// Starts every memoized informer's child run loops. Awaited directly,
    /// per-informer, rather than fired into a detached `tokio::spawn`: by
    /// the time this returns, every child has been asked to start, instead
    /// of the caller racing its own `wait_for_cache_sync` against informers
    /// that haven't been told to run yet.
    pub async fn start(&self, stop: crate::types::StopSignal) {
        let informers: Vec<(ResourceKey, Arc<dyn ErasedInformer>)> = self
            .state
            .lock()
            .erased
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, informer) in informers {
            if let Err(e) = informer.non_blocking_run_boxed(stop.clone()).await {
                error!(resource = %key, error = %e, "failed to start informer");
            }
        }
    }

    /// Blocks until every memoized informer reports synced or `stop` fires,
    /// returning a per-resource synced/not-synced map rather than a bare
    /// bool (the original returns nothing at all).
    pub async fn wait_for_cache_sync(
        &self,
        stop: crate::types::StopSignal,
    ) -> HashMap<ResourceKey, bool> {
        let start = std::time::Instant::now();
        let snapshot: Vec<(ResourceKey, Arc<dyn ErasedInformer>)> = self
            .state
            .lock()
            .erased
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut result = HashMap::new();
        loop {
            let mut all_synced = true;
            for (key, informer) in &snapshot {
                let synced = informer.has_synced();
                result.insert(key.clone(), synced);
                all_synced &= synced;
            }
            if all_synced || stop.is_fired() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(50)) => {}
                _ = stop.wait() => break,
            }
        }
        metrics::CACHE_SYNC_LATENCY.record(start.elapsed());
        result
    }
}
