//! Core types and trait surface for the multi-namespace informer engine.
//!
//! The engine itself never looks inside a cached object: it is generic over
//! `T: Send + Sync + 'static` and relies on an [`ObjectRef`] extracted by the
//! caller (or by a generated adapter) to find the owning namespace.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::error::{Error, Result};

/// Sentinel namespace meaning "every namespace."
///
/// Mirrors `metav1.NamespaceAll` (the empty string) in the source this engine
/// is modeled on: adding it to a [`crate::namespace_set::NamespaceSet`]
/// collapses every other member.
pub const ALL_NAMESPACES: &str = "";

/// A namespace name.
///
/// Cheap to clone (backed by [`Bytes`]) since it is threaded through every
/// handler invocation and indexer key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespaceName(Bytes);

impl NamespaceName {
    pub fn all() -> Self {
        Self(Bytes::from_static(ALL_NAMESPACES.as_bytes()))
    }

    pub fn new(s: impl AsRef<str>) -> Self {
        Self(Bytes::copy_from_slice(s.as_ref().as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        // Safety: only ever constructed from a valid &str.
        unsafe { std::str::from_utf8_unchecked(&self.0) }
    }

    pub fn is_all(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for NamespaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            write!(f, "<all-namespaces>")
        } else {
            write!(f, "{}", self.as_str())
        }
    }
}

impl fmt::Display for NamespaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

impl AsRef<str> for NamespaceName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for NamespaceName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NamespaceName {
    fn from(value: String) -> Self {
        Self(Bytes::from(value))
    }
}

/// A namespace/name pair identifying a cached object, independent of its
/// concrete type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub namespace: NamespaceName,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<NamespaceName>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parses a `namespace/name` cache key, the convention used throughout
    /// the engine for indexer and lister keys.
    pub fn parse(key: &str) -> Result<Self> {
        match key.split_once('/') {
            Some((ns, name)) => Ok(Self::new(ns, name)),
            None => Ok(Self::new(NamespaceName::all(), key)),
        }
    }

    pub fn cache_key(&self) -> String {
        if self.namespace.is_all() {
            self.name.clone()
        } else {
            format!("{}/{}", self.namespace, self.name)
        }
    }
}

/// Extracts the identity of a cached object. Implemented by the generated
/// per-resource adapters; the engine never constructs a `T` itself.
pub trait HasObjectKey {
    fn object_key(&self) -> ObjectKey;
}

/// A single add/update/delete notification, generic over the object type.
#[derive(Debug, Clone)]
pub enum Event<T> {
    Add(Arc<T>),
    Update { old: Arc<T>, new: Arc<T> },
    Delete(Arc<T>),
}

/// Callback surface fanned out to every child informer. Mirrors
/// `cache.ResourceEventHandler` - implementations must not block for long,
/// since they run inline with the child's delta-processing loop.
pub trait EventHandler<T>: Send + Sync {
    fn on_add(&self, obj: Arc<T>) {
        let _ = obj;
    }
    fn on_update(&self, old: Arc<T>, new: Arc<T>) {
        let _ = (old, new);
    }
    fn on_delete(&self, obj: Arc<T>) {
        let _ = obj;
    }
}

/// A registered handler plus the resync period it was installed with, kept
/// so that late-joining children can be brought up to date in order.
pub struct HandlerRegistration<T> {
    pub handler: Arc<dyn EventHandler<T>>,
    pub resync_period: Option<Duration>,
}

/// A named function used to build an auxiliary index over cached objects
/// (e.g. "by namespace"). Mirrors `cache.IndexFunc`.
pub type IndexFunc<T> = Arc<dyn Fn(&T) -> Vec<String> + Send + Sync>;

#[derive(Clone)]
pub struct IndexerConfig<T> {
    pub name: String,
    pub index_fn: IndexFunc<T>,
}

/// Read/write access to a single child's local cache. One informer owns
/// exactly one indexer; a [`crate::cache_reader::CacheReader`] presents a
/// read-only union of many.
#[async_trait::async_trait]
pub trait Indexer<T>: Send + Sync {
    async fn add(&self, obj: Arc<T>) -> Result<()>;
    async fn update(&self, obj: Arc<T>) -> Result<()>;
    async fn delete(&self, key: &ObjectKey) -> Result<()>;
    async fn get(&self, key: &ObjectKey) -> Result<Option<Arc<T>>>;
    async fn list(&self) -> Result<Vec<Arc<T>>>;
    async fn list_keys(&self) -> Result<Vec<String>>;
    async fn add_indexers(&self, indexers: Vec<IndexerConfig<T>>) -> Result<()>;
    async fn index_keys(&self, index_name: &str, indexed_value: &str) -> Result<Vec<String>>;
    async fn by_index(&self, index_name: &str, indexed_value: &str) -> Result<Vec<Arc<T>>>;
    /// Objects sharing an index value with `obj` under the named index.
    /// Mirrors `cache.Indexer.Index(indexName, obj)`: computes `obj`'s own
    /// index values via the registered index function, then unions the
    /// `by_index` results for each of them.
    async fn index(&self, index_name: &str, obj: &T) -> Result<Vec<Arc<T>>>;
    async fn list_index_func_values(&self, index_name: &str) -> Result<Vec<String>>;
    fn get_indexers(&self) -> Vec<String>;
}

/// Namespace-scoped read access, as returned by
/// [`GenericLister::by_namespace`].
#[async_trait::async_trait]
pub trait NamespaceLister<T>: Send + Sync {
    async fn get(&self, name: &str) -> Result<Arc<T>>;
    async fn list(&self) -> Result<Vec<Arc<T>>>;
}

/// Read-only query facade over an indexer.
#[async_trait::async_trait]
pub trait GenericLister<T>: Send + Sync {
    async fn get(&self, key: &ObjectKey) -> Result<Arc<T>>;
    async fn list(&self) -> Result<Vec<Arc<T>>>;
    fn by_namespace(&self, namespace: NamespaceName) -> Arc<dyn NamespaceLister<T>>;
}

/// A stop handle a single child run loop is driven by. Cloned freely; closed
/// exactly once. Grounded on `libsql-server`'s use of a single shutdown
/// `AtomicBool` plus `tokio::sync::Notify` for the namespace store's
/// shutdown signal.
#[derive(Clone)]
pub struct StopSignal {
    notify: Arc<tokio::sync::Notify>,
    fired: Arc<std::sync::atomic::AtomicBool>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            notify: Arc::new(tokio::sync::Notify::new()),
            fired: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    /// Idempotent: firing an already-fired signal is a no-op.
    pub fn fire(&self) {
        use std::sync::atomic::Ordering;
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.notify.notify_waiters();
        }
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(std::sync::atomic::Ordering::Acquire)
    }

    pub async fn wait(&self) {
        if self.is_fired() {
            return;
        }
        self.notify.notified().await;
    }
}

/// The shared-informer contract, generic over object type. Several
/// operations are intentionally unsupported on a
/// [`crate::multi_namespace_informer::MultiNamespaceInformer`] because they
/// have no cross-namespace meaning; see its trait impl for details.
#[async_trait::async_trait]
pub trait SharedIndexInformer<T>: Send + Sync {
    async fn add_event_handler(&self, handler: Arc<dyn EventHandler<T>>) -> Result<()>;
    async fn add_event_handler_with_resync_period(
        &self,
        handler: Arc<dyn EventHandler<T>>,
        resync_period: Duration,
    ) -> Result<()>;
    async fn add_indexers(&self, indexers: Vec<IndexerConfig<T>>) -> Result<()>;
    fn has_synced(&self) -> bool;
    async fn run(&self, stop: StopSignal) -> Result<()>;
    async fn non_blocking_run(&self, stop: StopSignal) -> Result<()>;

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
    fn set_watch_error_handler(&self, _handler: Arc<dyn Fn(Error) + Send + Sync>) -> Result<()> {
        Err(Error::Unsupported("set_watch_error_handler"))
    }
}

/// A single-namespace collaborator: a cache plus a lister over the same
/// population. This is the unit the engine multiplexes across namespaces;
/// callers (generated adapters) supply a factory that builds one per
/// namespace.
pub trait GenericInformer<T>: Send + Sync {
    fn informer(&self) -> Arc<dyn SharedIndexInformer<T>>;
    fn lister(&self) -> Arc<dyn GenericLister<T>>;
    /// The child's own local cache. Exposed directly here rather than via
    /// `SharedIndexInformer::get_indexer` because that method is
    /// `Unsupported` on the engine's own top-level facade (no
    /// cross-namespace indexer exists) - children still need to hand
    /// theirs to `CacheReader`.
    fn indexer(&self) -> Arc<dyn Indexer<T>>;
}

/// Builds a [`GenericInformer`] bound to a single namespace. `namespace` is
/// [`NamespaceName::all`] for cluster-scoped resources.
pub type ChildInformerFactory<T> =
    Arc<dyn Fn(NamespaceName) -> Arc<dyn GenericInformer<T>> + Send + Sync>;

/// The subset of list/watch request parameters a caller may want to adjust
/// before a child informer issues its request - label/field selectors and a
/// timeout, mirroring the handful of fields `tweakListOptions` callers in the
/// source this engine descends from actually touch (`metav1.ListOptions` has
/// many more, but nothing else in that codebase's tweak functions ever sets
/// them).
#[derive(Clone, Debug, Default)]
pub struct ListOptions {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    pub timeout_seconds: Option<i64>,
}

/// A caller-supplied transform applied to a child's list/watch parameters
/// before the request is issued. Stored on [`crate::factory::Factory`] and
/// handed to the generated adapter's [`ChildInformerFactory`] closure, which
/// applies it when it builds the real client call for a given namespace -
/// the engine itself never inspects or issues list/watch requests.
pub type ListOptionsTweak = Arc<dyn Fn(&mut ListOptions) + Send + Sync>;
