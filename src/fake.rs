//! In-memory test double for a single-namespace [`GenericInformer`].
//!
//! Grounded on the `mockInformer`/`fcache.FakeControllerSource` harness the
//! original test suite drives its scenarios with: a `run` that never
//! returns until stopped, a list error that can be armed ahead of time to
//! exercise error isolation, and direct `push_*` methods standing in for a
//! real watch stream.
//!
//! Exists for this crate's own tests; not part of the public engine API
//! surface consumers build adapters against.

use std::sync::Arc;
use std::time::Duration;

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::types::{
    EventHandler, GenericInformer, GenericLister, HasObjectKey, Indexer, IndexerConfig,
    NamespaceLister, NamespaceName, ObjectKey, SharedIndexInformer, StopSignal,
};

struct FakeState<T> {
    objects: HashMap<String, Arc<T>>,
    handlers: Vec<(Arc<dyn EventHandler<T>>, Option<Duration>)>,
    indexers: Vec<IndexerConfig<T>>,
    synced: bool,
    list_error: Option<String>,
    watch_error_handler: Option<Arc<dyn Fn(Error) + Send + Sync>>,
}

/// A single-namespace fake cache. Construct one per namespace and combine
/// them behind a [`crate::types::ChildInformerFactory`] closure.
pub struct FakeChildInformer<T> {
    namespace: NamespaceName,
    state: Arc<Mutex<FakeState<T>>>,
}

impl<T: HasObjectKey + Send + Sync + 'static> FakeChildInformer<T> {
    pub fn new(namespace: NamespaceName) -> Arc<Self> {
        Arc::new(Self {
            namespace,
            state: Arc::new(Mutex::new(FakeState {
                objects: HashMap::new(),
                handlers: Vec::new(),
                indexers: Vec::new(),
                synced: false,
                list_error: None,
                watch_error_handler: None,
            })),
        })
    }

    /// Arms a list error that fires the next time `run`/`non_blocking_run`
    /// is called, simulating a permission failure on that namespace.
    pub fn set_list_error(&self, message: impl Into<String>) {
        self.state.lock().list_error = Some(message.into());
    }

    pub fn push_add(&self, obj: T) {
        let key = obj.object_key().cache_key();
        let obj = Arc::new(obj);
        let handlers = {
            let mut state = self.state.lock();
            state.objects.insert(key, obj.clone());
            state.handlers.clone_handlers()
        };
        for handler in handlers {
            handler.on_add(obj.clone());
        }
    }

    pub fn push_update(&self, new: T) {
        let key = new.object_key().cache_key();
        let new = Arc::new(new);
        let (old, handlers) = {
            let mut state = self.state.lock();
            let old = state.objects.insert(key, new.clone());
            (old, state.handlers.clone_handlers())
        };
        if let Some(old) = old {
            for handler in handlers {
                handler.on_update(old.clone(), new.clone());
            }
        }
    }

    pub fn push_delete(&self, key: &ObjectKey) {
        let (removed, handlers) = {
            let mut state = self.state.lock();
            let removed = state.objects.remove(&key.cache_key());
            (removed, state.handlers.clone_handlers())
        };
        if let Some(removed) = removed {
            for handler in handlers {
                handler.on_delete(removed.clone());
            }
        }
    }
}

trait CloneHandlers<T> {
    fn clone_handlers(&self) -> Vec<Arc<dyn EventHandler<T>>>;
}
impl<T> CloneHandlers<T> for Vec<(Arc<dyn EventHandler<T>>, Option<Duration>)> {
    fn clone_handlers(&self) -> Vec<Arc<dyn EventHandler<T>>> {
        self.iter().map(|(h, _)| h.clone()).collect()
    }
}

#[async_trait::async_trait]
impl<T: HasObjectKey + Send + Sync + 'static> SharedIndexInformer<T> for FakeChildInformer<T> {
    async fn add_event_handler(&self, handler: Arc<dyn EventHandler<T>>) -> Result<()> {
        self.state.lock().handlers.push((handler, None));
        Ok(())
    }

    async fn add_event_handler_with_resync_period(
        &self,
        handler: Arc<dyn EventHandler<T>>,
        resync_period: Duration,
    ) -> Result<()> {
        self.state.lock().handlers.push((handler, Some(resync_period)));
        Ok(())
    }

    async fn add_indexers(&self, indexers: Vec<IndexerConfig<T>>) -> Result<()> {
        self.state.lock().indexers.extend(indexers);
        Ok(())
    }

    fn has_synced(&self) -> bool {
        self.state.lock().synced
    }

    async fn run(&self, stop: StopSignal) -> Result<()> {
        self.non_blocking_run(stop.clone()).await?;
        stop.wait().await;
        Ok(())
    }

    async fn non_blocking_run(&self, stop: StopSignal) -> Result<()> {
        let (error, handler) = {
            let mut state = self.state.lock();
            let error = state.list_error.take();
            if error.is_none() {
                state.synced = true;
            }
            (error, state.watch_error_handler.clone())
        };
        if let Some(message) = error {
            let err = Error::ChildError {
                namespace: self.namespace.clone(),
                source: anyhow::anyhow!(message),
            };
            if let Some(handler) = handler {
                handler(err);
            }
        }

        // Stands in for a real reflector synthesizing delete events for
        // every object it still held as it shuts down (§4.2's
        // `removeNamespace` contract: the engine itself never synthesizes
        // tombstones, the child does).
        let state = self.state.clone();
        tokio::spawn(async move {
            stop.wait().await;
            let (objects, handlers) = {
                let mut state = state.lock();
                let objects: Vec<Arc<T>> = state.objects.drain().map(|(_, v)| v).collect();
                (objects, state.handlers.clone_handlers())
            };
            for obj in objects {
                for handler in &handlers {
                    handler.on_delete(obj.clone());
                }
            }
        });

        Ok(())
    }

    fn set_watch_error_handler(&self, handler: Arc<dyn Fn(Error) + Send + Sync>) -> Result<()> {
        self.state.lock().watch_error_handler = Some(handler);
        Ok(())
    }
}

#[async_trait::async_trait]
impl<T: HasObjectKey + Send + Sync + 'static> Indexer<T> for FakeChildInformer<T> {
    async fn add(&self, obj: Arc<T>) -> Result<()> {
        let key = obj.object_key().cache_key();
        self.state.lock().objects.insert(key, obj);
        Ok(())
    }

    async fn update(&self, obj: Arc<T>) -> Result<()> {
        self.add(obj).await
    }

    async fn delete(&self, key: &ObjectKey) -> Result<()> {
        self.state.lock().objects.remove(&key.cache_key());
        Ok(())
    }

    async fn get(&self, key: &ObjectKey) -> Result<Option<Arc<T>>> {
        Ok(self.state.lock().objects.get(&key.cache_key()).cloned())
    }

    async fn list(&self) -> Result<Vec<Arc<T>>> {
        Ok(self.state.lock().objects.values().cloned().collect())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().objects.keys().cloned().collect())
    }

    async fn add_indexers(&self, indexers: Vec<IndexerConfig<T>>) -> Result<()> {
        self.state.lock().indexers.extend(indexers);
        Ok(())
    }

    async fn index_keys(&self, index_name: &str, indexed_value: &str) -> Result<Vec<String>> {
        Ok(self
            .by_index_inner(index_name, indexed_value)
            .into_iter()
            .map(|o| o.object_key().cache_key())
            .collect())
    }

    async fn by_index(&self, index_name: &str, indexed_value: &str) -> Result<Vec<Arc<T>>> {
        Ok(self.by_index_inner(index_name, indexed_value))
    }

    async fn index(&self, index_name: &str, obj: &T) -> Result<Vec<Arc<T>>> {
        let config = {
            let state = self.state.lock();
            state.indexers.iter().find(|c| c.name == index_name).cloned()
        };
        let config = match config {
            Some(c) => c,
            None => return Ok(Vec::new()),
        };
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for value in (config.index_fn)(obj) {
            for candidate in self.by_index_inner(index_name, &value) {
                let key = candidate.object_key().cache_key();
                if seen.insert(key) {
                    out.push(candidate);
                }
            }
        }
        Ok(out)
    }

    async fn list_index_func_values(&self, index_name: &str) -> Result<Vec<String>> {
        let state = self.state.lock();
        let objects: Vec<Arc<T>> = state.objects.values().cloned().collect();
        let config = state.indexers.iter().find(|c| c.name == index_name).cloned();
        drop(state);
        match config {
            Some(config) => Ok(objects.iter().flat_map(|o| (config.index_fn)(o)).collect()),
            None => Ok(Vec::new()),
        }
    }

    fn get_indexers(&self) -> Vec<String> {
        self.state.lock().indexers.iter().map(|c| c.name.clone()).collect()
    }
}

impl<T: HasObjectKey + Send + Sync + 'static> FakeChildInformer<T> {
    fn by_index_inner(&self, index_name: &str, indexed_value: &str) -> Vec<Arc<T>> {
        let state = self.state.lock();
        let config = match state.indexers.iter().find(|c| c.name == index_name) {
            Some(c) => c.clone(),
            None => return Vec::new(),
        };
        state
            .objects
            .values()
            .filter(|o| (config.index_fn)(o).iter().any(|v| v == indexed_value))
            .cloned()
            .collect()
    }
}

struct FakeNamespaceLister<T> {
    informer: Arc<FakeChildInformer<T>>,
}

#[async_trait::async_trait]
impl<T: HasObjectKey + Send + Sync + 'static> NamespaceLister<T> for FakeNamespaceLister<T> {
    async fn get(&self, name: &str) -> Result<Arc<T>> {
        let key = ObjectKey::new(self.informer.namespace.clone(), name);
        self.informer
            .state
            .lock()
            .objects
            .get(&key.cache_key())
            .cloned()
            .ok_or_else(|| Error::NotFound {
                group: String::new(),
                resource: "fake".into(),
                name: name.to_string(),
            })
    }

    async fn list(&self) -> Result<Vec<Arc<T>>> {
        Ok(self.informer.state.lock().objects.values().cloned().collect())
    }
}

/// Wraps a [`FakeChildInformer`] to satisfy [`GenericInformer`], where both
/// `informer()` and `lister()` hand back the same underlying cache.
pub struct FakeGenericInformer<T> {
    inner: Arc<FakeChildInformer<T>>,
}

impl<T: HasObjectKey + Send + Sync + 'static> FakeGenericInformer<T> {
    pub fn new(namespace: NamespaceName) -> Arc<Self> {
        Arc::new(Self {
            inner: FakeChildInformer::new(namespace),
        })
    }

    pub fn child(&self) -> Arc<FakeChildInformer<T>> {
        self.inner.clone()
    }
}

impl<T: HasObjectKey + Send + Sync + 'static> GenericInformer<T> for FakeGenericInformer<T> {
    fn informer(&self) -> Arc<dyn SharedIndexInformer<T>> {
        self.inner.clone()
    }

    fn lister(&self) -> Arc<dyn GenericLister<T>> {
        Arc::new(FakeListerHandle {
            inner: self.inner.clone(),
        })
    }

    fn indexer(&self) -> Arc<dyn Indexer<T>> {
        self.inner.clone()
    }
}

struct FakeListerHandle<T> {
    inner: Arc<FakeChildInformer<T>>,
}

#[async_trait::async_trait]
impl<T: HasObjectKey + Send + Sync + 'static> GenericLister<T> for FakeListerHandle<T> {
    async fn get(&self, key: &ObjectKey) -> Result<Arc<T>> {
        self.inner
            .state
            .lock()
            .objects
            .get(&key.cache_key())
            .cloned()
            .ok_or_else(|| Error::NotFound {
                group: String::new(),
                resource: "fake".into(),
                name: key.name.clone(),
            })
    }

    async fn list(&self) -> Result<Vec<Arc<T>>> {
        Ok(self.inner.state.lock().objects.values().cloned().collect())
    }

    fn by_namespace(&self, _namespace: NamespaceName) -> Arc<dyn NamespaceLister<T>> {
        Arc::new(FakeNamespaceLister {
            informer: self.inner.clone(),
        })
    }
}
