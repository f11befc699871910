//! Read-only union indexer over a [`MultiNamespaceInformer`]'s children.
//!
//! Grounded on `cacheReader` in the source this engine descends from: writes
//! fail with [`Error::ReadOnly`], reads concatenate across children, and
//! `get`/`get_by_key` report an unknown namespace as plain absence, not an
//! error - the caller asked for an object, not for that namespace to exist.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::multi_namespace_informer::MultiNamespaceInformer;
use crate::types::{Indexer, IndexerConfig, NamespaceName, ObjectKey};

pub struct CacheReader<T> {
    informer: Arc<MultiNamespaceInformer<T>>,
}

impl<T: Send + Sync + 'static> CacheReader<T> {
    pub fn new(informer: Arc<MultiNamespaceInformer<T>>) -> Self {
        Self { informer }
    }

    /// Absence of the namespace is not an error: returns `Ok(None)`.
    pub async fn get(&self, key: &ObjectKey) -> Result<Option<Arc<T>>> {
        let child = if key.namespace.is_all() {
            self.informer
                .child_indexers()
                .into_iter()
                .find(|(ns, _)| ns.is_all())
                .map(|(_, idx)| idx)
        } else {
            self.informer
                .child_indexers()
                .into_iter()
                .find(|(ns, _)| *ns == key.namespace)
                .map(|(_, idx)| idx)
        };
        match child {
            Some(idx) => idx.get(key).await,
            None => Ok(None),
        }
    }

    pub async fn resync(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl<T: Send + Sync + 'static> Indexer<T> for CacheReader<T> {
    async fn add(&self, _obj: Arc<T>) -> Result<()> {
        Err(Error::ReadOnly)
    }

    async fn update(&self, _obj: Arc<T>) -> Result<()> {
        Err(Error::ReadOnly)
    }

    async fn delete(&self, _key: &ObjectKey) -> Result<()> {
        Err(Error::ReadOnly)
    }

    async fn get(&self, key: &ObjectKey) -> Result<Option<Arc<T>>> {
        CacheReader::get(self, key).await
    }

    async fn list(&self) -> Result<Vec<Arc<T>>> {
        let mut out = Vec::new();
        for (_, idx) in self.informer.child_indexers() {
            out.extend(idx.list().await?);
        }
        Ok(out)
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for (_, idx) in self.informer.child_indexers() {
            out.extend(idx.list_keys().await?);
        }
        Ok(out)
    }

    async fn add_indexers(&self, _indexers: Vec<IndexerConfig<T>>) -> Result<()> {
        Err(Error::ReadOnly)
    }

    async fn index_keys(&self, index_name: &str, indexed_value: &str) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for (_, idx) in self.informer.child_indexers() {
            out.extend(idx.index_keys(index_name, indexed_value).await?);
        }
        Ok(out)
    }

    async fn by_index(&self, index_name: &str, indexed_value: &str) -> Result<Vec<Arc<T>>> {
        let mut out = Vec::new();
        for (_, idx) in self.informer.child_indexers() {
            out.extend(idx.by_index(index_name, indexed_value).await?);
        }
        Ok(out)
    }

    async fn index(&self, index_name: &str, obj: &T) -> Result<Vec<Arc<T>>> {
        let mut out = Vec::new();
        for (_, idx) in self.informer.child_indexers() {
            out.extend(idx.index(index_name, obj).await?);
        }
        Ok(out)
    }

    async fn list_index_func_values(&self, index_name: &str) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for (_, idx) in self.informer.child_indexers() {
            out.extend(idx.list_index_func_values(index_name).await?);
        }
        Ok(out)
    }

    fn get_indexers(&self) -> Vec<String> {
        let mut merged = std::collections::BTreeSet::new();
        for (_, idx) in self.informer.child_indexers() {
            merged.extend(idx.get_indexers());
        }
        merged.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::fake::FakeGenericInformer;
    use crate::types::{GenericInformer, HasObjectKey};

    #[derive(Clone, Debug)]
    struct Item {
        namespace: String,
        name: String,
    }

    impl HasObjectKey for Item {
        fn object_key(&self) -> ObjectKey {
            ObjectKey::new(self.namespace.as_str(), self.name.clone())
        }
    }

    async fn informer_with(namespaces: &[&str]) -> Arc<MultiNamespaceInformer<Item>> {
        let registry: Arc<parking_lot::Mutex<hashbrown::HashMap<NamespaceName, Arc<FakeGenericInformer<Item>>>>> =
            Arc::new(parking_lot::Mutex::new(hashbrown::HashMap::new()));
        let registry2 = registry.clone();
        let factory: crate::types::ChildInformerFactory<Item> = Arc::new(move |ns| {
            let informer = FakeGenericInformer::new(ns.clone());
            registry2.lock().insert(ns, informer.clone());
            informer as Arc<dyn GenericInformer<Item>>
        });
        let informer = Arc::new(MultiNamespaceInformer::namespaced("items", factory, Duration::from_secs(60)));
        for ns in namespaces {
            informer.add_namespace(NamespaceName::new(*ns)).await.unwrap();
        }
        for ns in namespaces {
            let child = registry.lock().get(&NamespaceName::new(*ns)).unwrap().clone();
            child
                .child()
                .add(Arc::new(Item {
                    namespace: ns.to_string(),
                    name: format!("obj-{ns}"),
                }))
                .await
                .unwrap();
        }
        informer
    }

    #[tokio::test]
    async fn writes_fail_read_only() {
        let informer = informer_with(&["ns1"]).await;
        let reader = CacheReader::new(informer);
        let err = Indexer::add(&reader, Arc::new(Item { namespace: "ns1".into(), name: "x".into() }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ReadOnly));
    }

    // Testable property 4: list is a permutation of the concatenation of
    // each child's list.
    #[tokio::test]
    async fn list_concatenates_children() {
        let informer = informer_with(&["ns1", "ns2"]).await;
        let reader = CacheReader::new(informer);
        let mut names: Vec<String> = Indexer::list(&reader)
            .await
            .unwrap()
            .iter()
            .map(|o| o.name.clone())
            .collect();
        names.sort();
        assert_eq!(names, vec!["obj-ns1".to_string(), "obj-ns2".to_string()]);
    }

    #[tokio::test]
    async fn get_on_unknown_namespace_is_absence_not_error() {
        let informer = informer_with(&["ns1"]).await;
        let reader = CacheReader::new(informer);
        let result = reader.get(&ObjectKey::new("ns2", "x")).await.unwrap();
        assert!(result.is_none());
    }

    // §4.3: `index` concatenates each child's `index` result across
    // namespaces, same shape as `index_keys`/`by_index`.
    #[tokio::test]
    async fn index_concatenates_children_sharing_a_value() {
        use crate::types::{IndexerConfig, SharedIndexInformer};

        let informer = informer_with(&["ns1", "ns2"]).await;
        SharedIndexInformer::add_indexers(
            informer.as_ref(),
            vec![IndexerConfig {
                name: "all".to_string(),
                index_fn: Arc::new(|_: &Item| vec!["x".to_string()]),
            }],
        )
        .await
        .unwrap();

        let reader = CacheReader::new(informer);
        let probe = Item { namespace: "ns1".into(), name: "obj-ns1".into() };
        let mut names: Vec<String> = Indexer::index(&reader, "all", &probe)
            .await
            .unwrap()
            .iter()
            .map(|o| o.name.clone())
            .collect();
        names.sort();
        assert_eq!(names, vec!["obj-ns1".to_string(), "obj-ns2".to_string()]);
    }
}
