//! The core fan-out engine: one logical [`SharedIndexInformer`] backed by a
//! dynamic set of per-namespace child informers.
//!
//! Concurrency model grounded on `libsql-server`'s `SchemaLocksRegistry`: a
//! single `parking_lot::Mutex` guards the map of live entries, never held
//! across an `.await` into a child. Handler/indexer replay uses the same
//! "snapshot under lock, then act" shape as `CacheReader`'s read path.

use std::sync::Arc;
use std::time::Duration;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::{debug, error, trace};

use crate::error::{Error, Result};
use crate::metrics;
use crate::types::{
    ChildInformerFactory, EventHandler, GenericInformer, GenericLister, HandlerRegistration,
    Indexer, IndexerConfig, NamespaceLister, NamespaceName, ObjectKey, SharedIndexInformer,
    StopSignal,
};

struct ChildEntry<T> {
    informer: Arc<dyn GenericInformer<T>>,
    stop: StopSignal,
    started: bool,
}

struct Inner<T> {
    children: HashMap<NamespaceName, ChildEntry<T>>,
    handlers: Vec<HandlerRegistration<T>>,
    indexers: Vec<IndexerConfig<T>>,
    /// Set once `run`/`non_blocking_run` has been called, so namespaces
    /// added afterward are started immediately instead of waiting for a
    /// fresh call.
    running: bool,
}

/// Presents a single [`SharedIndexInformer`] over a dynamic set of
/// namespaces. Construct via [`MultiNamespaceInformer::namespaced`] or
/// [`MultiNamespaceInformer::cluster_scoped`]; wire it to a
/// [`crate::namespace_set::NamespaceSet`] via [`crate::factory::Factory`]
/// rather than calling [`Self::add_namespace`]/[`Self::remove_namespace`]
/// directly in application code.
pub struct MultiNamespaceInformer<T> {
    inner: Arc<Mutex<Inner<T>>>,
    cluster_scoped: bool,
    factory: ChildInformerFactory<T>,
    resync_period: Duration,
    resource: String,
}

impl<T: Send + Sync + 'static> MultiNamespaceInformer<T> {
    pub fn namespaced(
        resource: impl Into<String>,
        factory: ChildInformerFactory<T>,
        resync_period: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                children: HashMap::new(),
                handlers: Vec::new(),
                indexers: Vec::new(),
                running: false,
            })),
            cluster_scoped: false,
            factory,
            resync_period,
            resource: resource.into(),
        }
    }

    /// A cluster-scoped informer pins a single child keyed by
    /// [`NamespaceName::all`]; `add_namespace`/`remove_namespace` are then
    /// no-ops.
    pub fn cluster_scoped(
        resource: impl Into<String>,
        factory: ChildInformerFactory<T>,
        resync_period: Duration,
    ) -> Self {
        let this = Self {
            inner: Arc::new(Mutex::new(Inner {
                children: HashMap::new(),
                handlers: Vec::new(),
                indexers: Vec::new(),
                running: false,
            })),
            cluster_scoped: true,
            factory,
            resync_period,
            resource: resource.into(),
        };
        this.insert_child(NamespaceName::all());
        this
    }

    pub fn is_cluster_scoped(&self) -> bool {
        self.cluster_scoped
    }

    /// The base resync period new children are constructed with. Exposed so
    /// a generated adapter's `ChildInformerFactory` closure can read it back
    /// rather than hold its own separate copy.
    pub fn resync_period(&self) -> Duration {
        self.resync_period
    }

    fn insert_child(&self, namespace: NamespaceName) {
        let mut inner = self.inner.lock();
        if inner.children.contains_key(&namespace) {
            return;
        }
        let informer = (self.factory)(namespace.clone());
        inner.children.insert(
            namespace,
            ChildEntry {
                informer,
                stop: StopSignal::new(),
                started: false,
            },
        );
    }

    /// Adds a namespace's child informer, replays every previously
    /// registered indexer and handler onto it (in registration order), and
    /// - if the informer is already running - starts it. Idempotent.
    pub async fn add_namespace(&self, namespace: NamespaceName) -> Result<()> {
        if self.cluster_scoped {
            return Ok(());
        }

        let already_present = self.inner.lock().children.contains_key(&namespace);
        if already_present {
            return Ok(());
        }
        self.insert_child(namespace.clone());
        metrics::NAMESPACES_ADDED.increment(1);

        // Replay indexers then handlers, in that order, before the child is
        // allowed to start - the ordering invariant this engine exists to
        // enforce.
        let child_informer = {
            let inner = self.inner.lock();
            inner.children[&namespace].informer.informer()
        };
        let (indexers, handlers) = {
            let inner = self.inner.lock();
            (inner.indexers.clone(), snapshot_handlers(&inner.handlers))
        };
        if !indexers.is_empty() {
            child_informer.add_indexers(indexers).await?;
        }
        for (handler, resync) in handlers {
            match resync {
                Some(period) => {
                    child_informer
                        .add_event_handler_with_resync_period(handler, period)
                        .await?
                }
                None => child_informer.add_event_handler(handler).await?,
            }
        }

        let should_start = self.inner.lock().running;
        if should_start {
            self.start_child(&namespace)?;
        }

        debug!(namespace = %namespace, "added namespace to informer");
        Ok(())
    }

    /// Closes the child's private stop signal and drops it. The child's own
    /// reflector is responsible for synthesizing delete events for every
    /// object it held as it shuts down; this engine does not synthesize
    /// tombstones itself.
    pub fn remove_namespace(&self, namespace: &NamespaceName) {
        if self.cluster_scoped {
            return;
        }
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.children.remove(namespace) {
            entry.stop.fire();
            metrics::NAMESPACES_REMOVED.increment(1);
            debug!(namespace = %namespace, "removed namespace from informer");
        }
    }

    fn start_child(&self, namespace: &NamespaceName) -> Result<()> {
        let mut inner = self.inner.lock();
        let entry = match inner.children.get_mut(namespace) {
            Some(e) => e,
            None => return Ok(()),
        };
        if entry.started {
            return Ok(());
        }
        entry.started = true;
        let child_informer = entry.informer.informer();
        let stop = entry.stop.clone();
        let namespace = namespace.clone();
        tokio::spawn(async move {
            if let Err(e) = child_informer.non_blocking_run(stop).await {
                error!(namespace = %namespace, error = %e, "child informer failed to start");
            }
        });
        Ok(())
    }

    fn snapshot_children(&self) -> Vec<(NamespaceName, Arc<dyn GenericInformer<T>>)> {
        self.inner
            .lock()
            .children
            .iter()
            .map(|(ns, entry)| (ns.clone(), entry.informer.clone()))
            .collect()
    }

    pub fn namespaces(&self) -> Vec<NamespaceName> {
        self.inner.lock().children.keys().cloned().collect()
    }

    pub(crate) fn child_indexers(&self) -> Vec<(NamespaceName, Arc<dyn Indexer<T>>)> {
        self.snapshot_children()
            .into_iter()
            .map(|(ns, informer)| (ns, informer.indexer()))
            .collect()
    }

    pub(crate) fn child_lister(&self, namespace: &NamespaceName) -> Option<Arc<dyn GenericLister<T>>> {
        self.inner
            .lock()
            .children
            .get(namespace)
            .map(|entry| entry.informer.lister())
    }

    pub(crate) fn all_listers(&self) -> Vec<Arc<dyn GenericLister<T>>> {
        self.snapshot_children()
            .into_iter()
            .map(|(_, informer)| informer.lister())
            .collect()
    }
}

fn snapshot_handlers<T>(
    handlers: &[HandlerRegistration<T>],
) -> Vec<(Arc<dyn EventHandler<T>>, Option<Duration>)> {
    handlers
        .iter()
        .map(|h| (h.handler.clone(), h.resync_period))
        .collect()
}

#[async_trait::async_trait]
impl<T: Send + Sync + 'static> SharedIndexInformer<T> for MultiNamespaceInformer<T> {
    async fn add_event_handler(&self, handler: Arc<dyn EventHandler<T>>) -> Result<()> {
        self.add_event_handler_with_resync_period_opt(handler, None)
            .await
    }

    async fn add_event_handler_with_resync_period(
        &self,
        handler: Arc<dyn EventHandler<T>>,
        resync_period: Duration,
    ) -> Result<()> {
        self.add_event_handler_with_resync_period_opt(handler, Some(resync_period))
            .await
    }

    async fn add_indexers(&self, indexers: Vec<IndexerConfig<T>>) -> Result<()> {
        let children = {
            let mut inner = self.inner.lock();
            inner.indexers.extend(indexers.iter().cloned());
            inner
                .children
                .iter()
                .map(|(ns, e)| (ns.clone(), e.informer.clone()))
                .collect::<Vec<_>>()
        };
        for (_, informer) in children {
            informer.informer().add_indexers(indexers.clone()).await?;
        }
        Ok(())
    }

    fn has_synced(&self) -> bool {
        let inner = self.inner.lock();
        inner
            .children
            .values()
            .filter(|entry| entry.started)
            .all(|entry| entry.informer.informer().has_synced())
    }

    async fn run(&self, stop: StopSignal) -> Result<()> {
        self.non_blocking_run(stop.clone()).await?;
        stop.wait().await;
        Ok(())
    }

    async fn non_blocking_run(&self, stop: StopSignal) -> Result<()> {
        let namespaces: Vec<NamespaceName> = {
            let mut inner = self.inner.lock();
            inner.running = true;
            inner
                .children
                .iter()
                .filter(|(_, e)| !e.started)
                .map(|(ns, _)| ns.clone())
                .collect()
        };
        for namespace in namespaces {
            self.start_child(&namespace)?;
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            stop.wait().await;
            trace!("parent stop fired, closing all child informers");
            let mut inner = inner.lock();
            inner.running = false;
            for entry in inner.children.values_mut() {
                entry.stop.fire();
                entry.started = false;
            }
        });
        Ok(())
    }

    fn get_store(&self) -> Result<Arc<dyn Indexer<T>>> {
        Err(Error::Unsupported("get_store"))
    }

    fn get_indexer(&self) -> Result<Arc<dyn Indexer<T>>> {
        Err(Error::Unsupported("get_indexer"))
    }

    fn get_controller(&self) -> Result<()> {
        Err(Error::Unsupported("get_controller"))
    }

    fn last_sync_resource_version(&self) -> Result<String> {
        Err(Error::Unsupported("last_sync_resource_version"))
    }
}

impl<T: Send + Sync + 'static> MultiNamespaceInformer<T> {
    async fn add_event_handler_with_resync_period_opt(
        &self,
        handler: Arc<dyn EventHandler<T>>,
        resync_period: Option<Duration>,
    ) -> Result<()> {
        let children = {
            let mut inner = self.inner.lock();
            inner.handlers.push(HandlerRegistration {
                handler: handler.clone(),
                resync_period,
            });
            inner
                .children
                .iter()
                .map(|(ns, e)| (ns.clone(), e.informer.clone()))
                .collect::<Vec<_>>()
        };
        for (_, informer) in children {
            let child_informer = informer.informer();
            match resync_period {
                Some(period) => {
                    child_informer
                        .add_event_handler_with_resync_period(handler.clone(), period)
                        .await?
                }
                None => child_informer.add_event_handler(handler.clone()).await?,
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<T: Send + Sync + 'static> GenericLister<T> for MultiNamespaceInformer<T> {
    async fn get(&self, key: &ObjectKey) -> Result<Arc<T>> {
        self.by_namespace(key.namespace.clone()).get(&key.name).await
    }

    async fn list(&self) -> Result<Vec<Arc<T>>> {
        let mut out = Vec::new();
        for lister in self.all_listers() {
            out.extend(lister.list().await?);
        }
        Ok(out)
    }

    fn by_namespace(&self, namespace: NamespaceName) -> Arc<dyn NamespaceLister<T>> {
        if let Some(all) = self.child_lister(&NamespaceName::all()) {
            return all.by_namespace(namespace);
        }
        if let Some(lister) = self.child_lister(&namespace) {
            return lister.by_namespace(namespace);
        }
        Arc::new(crate::lister::NilNamespaceLister::<T>::new(namespace, self.resource.clone()))
    }
}
