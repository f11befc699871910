//! Construction-time configuration surface.
//!
//! Plain option structs with `Default` impls, the way `libsql-server`'s
//! `NamespaceConfig`/`MetaStoreConfig` are constructed - not a CLI parser;
//! process bootstrap and argument parsing are an external concern.

use std::time::Duration;

use hashbrown::HashMap;

use crate::factory::ResourceKey;
use crate::types::{ListOptionsTweak, NamespaceName};

/// Top-level options accepted by [`crate::factory::Factory::new`]. Covers
/// every option the engine's config surface recognizes: `namespaces` and
/// `customResync` are interpreted directly by the `Factory`; `scheme` has no
/// separate field here because the engine resolves it at the type level -
/// callers pick a [`crate::converter::Converter`] implementation (defaulting
/// to [`crate::converter::JsonConverter`]) when they wrap a resource, rather
/// than registering one globally.
#[derive(Clone)]
pub struct FactoryConfig {
    /// Default resync period applied to every informer unless overridden by
    /// `custom_resync`.
    pub resync_period: Duration,
    /// Initial namespace membership. If `None`, no informer produces data
    /// until [`crate::factory::Factory::set_namespaces`] is called.
    pub namespaces: Option<Vec<NamespaceName>>,
    /// Per-resource resync period overrides; a resource absent from this map
    /// inherits `resync_period`.
    pub custom_resync: HashMap<ResourceKey, Duration>,
    /// Transform applied to a child's list/watch parameters before the
    /// generated adapter issues the request; `None` leaves parameters
    /// untouched.
    pub tweak_list_options: Option<ListOptionsTweak>,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            resync_period: Duration::from_secs(30 * 60),
            namespaces: None,
            custom_resync: HashMap::new(),
            tweak_list_options: None,
        }
    }
}

impl FactoryConfig {
    pub fn with_namespaces(mut self, namespaces: impl IntoIterator<Item = NamespaceName>) -> Self {
        self.namespaces = Some(namespaces.into_iter().collect());
        self
    }

    pub fn with_resync_period(mut self, period: Duration) -> Self {
        self.resync_period = period;
        self
    }

    pub fn with_custom_resync(mut self, resource: ResourceKey, period: Duration) -> Self {
        self.custom_resync.insert(resource, period);
        self
    }

    pub fn with_tweak_list_options<F>(mut self, tweak: F) -> Self
    where
        F: Fn(&mut crate::types::ListOptions) + Send + Sync + 'static,
    {
        self.tweak_list_options = Some(std::sync::Arc::new(tweak));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_namespaces_and_half_hour_resync() {
        let config = FactoryConfig::default();
        assert!(config.namespaces.is_none());
        assert_eq!(config.resync_period, Duration::from_secs(1800));
        assert!(config.custom_resync.is_empty());
    }

    #[test]
    fn builder_methods_compose() {
        let config = FactoryConfig::default()
            .with_resync_period(Duration::from_secs(5))
            .with_custom_resync("widgets".to_string(), Duration::from_secs(1))
            .with_namespaces([NamespaceName::new("ns1")]);
        assert_eq!(config.resync_period, Duration::from_secs(5));
        assert_eq!(config.custom_resync.get("widgets"), Some(&Duration::from_secs(1)));
        assert_eq!(config.namespaces, Some(vec![NamespaceName::new("ns1")]));
    }
}
