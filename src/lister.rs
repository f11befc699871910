//! Union lister across a [`MultiNamespaceInformer`]'s children.
//!
//! Grounded on `multiNamespaceLister`/`nilNamespaceLister` in the xns-informer
//! source this engine descends from: `ByNamespace` checks for an
//! all-namespaces child first, then the specific namespace, and otherwise
//! hands back a lister that reports every read as a distinguished not-found
//! error rather than panicking or returning an empty list silently.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::multi_namespace_informer::MultiNamespaceInformer;
use crate::types::{GenericLister, NamespaceLister, NamespaceName, ObjectKey};

/// Stands in for a namespace's lister when that namespace isn't part of the
/// informer's current set. Every read fails with [`Error::NamespaceUnknown`]
/// - this is a caller error (watching the wrong namespace), not a transient
/// absence, so it is reported distinctly from "namespace present but object
/// missing."
pub struct NilNamespaceLister<T> {
    namespace: NamespaceName,
    resource: String,
    _marker: PhantomData<T>,
}

impl<T> NilNamespaceLister<T> {
    pub fn new(namespace: NamespaceName, resource: String) -> Self {
        Self {
            namespace,
            resource,
            _marker: PhantomData,
        }
    }

    fn error(&self, name: &str) -> Error {
        Error::namespace_unknown(String::new(), self.resource.clone(), name, self.namespace.clone())
    }
}

#[async_trait::async_trait]
impl<T: Send + Sync + 'static> NamespaceLister<T> for NilNamespaceLister<T> {
    async fn get(&self, name: &str) -> Result<Arc<T>> {
        Err(self.error(name))
    }

    async fn list(&self) -> Result<Vec<Arc<T>>> {
        Err(self.error(""))
    }
}

/// Thin, non-owning view over a [`MultiNamespaceInformer`]'s listers. Holds
/// a cloned `Arc` to the same inner state the informer wraps rather than a
/// distinct allocation - this is always used while the owning
/// [`crate::factory::Factory`] is alive, so there is no lifetime hazard a
/// `Weak` would guard against.
pub struct MultiNamespaceLister<T> {
    informer: Arc<MultiNamespaceInformer<T>>,
}

impl<T: Send + Sync + 'static> MultiNamespaceLister<T> {
    pub fn new(informer: Arc<MultiNamespaceInformer<T>>) -> Self {
        Self { informer }
    }
}

#[async_trait::async_trait]
impl<T: Send + Sync + 'static> GenericLister<T> for MultiNamespaceLister<T> {
    async fn get(&self, key: &ObjectKey) -> Result<Arc<T>> {
        GenericLister::get(self.informer.as_ref(), key).await
    }

    async fn list(&self) -> Result<Vec<Arc<T>>> {
        GenericLister::list(self.informer.as_ref()).await
    }

    fn by_namespace(&self, namespace: NamespaceName) -> Arc<dyn NamespaceLister<T>> {
        self.informer.by_namespace(namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy;

    #[tokio::test]
    async fn nil_lister_reports_namespace_unknown() {
        let lister = NilNamespaceLister::<Dummy>::new(NamespaceName::new("ns2"), "widgets".into());
        let err = lister.get("x").await.unwrap_err();
        match err {
            Error::NamespaceUnknown { resource, name, .. } => {
                assert_eq!(resource, "widgets");
                assert_eq!(name, "x");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
