//! Dynamic, observable set of namespace names.
//!
//! Modeled on the observer fan-out in `libsql-server`'s `Broadcaster`
//! (subscribe/unsubscribe against a registry of callbacks guarded by a
//! `parking_lot::Mutex`), generalized from pub/sub message delivery to
//! membership-diff delivery.

use std::sync::Arc;

use hashbrown::HashSet;
use parking_lot::Mutex;

use crate::types::NamespaceName;

type AddFn = Arc<dyn Fn(&NamespaceName) + Send + Sync>;
type RemoveFn = Arc<dyn Fn(&NamespaceName) + Send + Sync>;

struct Observer {
    on_add: AddFn,
    on_remove: RemoveFn,
}

#[derive(Default)]
struct State {
    members: HashSet<NamespaceName>,
    initialized: bool,
    observers: Vec<Observer>,
}

/// An ordered-by-insertion set of namespace names, with add/remove diffing
/// delivered to registered observers.
///
/// Adding [`crate::types::ALL_NAMESPACES`] collapses every other member:
/// watching everything subsumes any subset, so there is never a point in
/// tracking a narrower set alongside it.
#[derive(Clone, Default)]
pub struct NamespaceSet {
    inner: Arc<Mutex<State>>,
}

impl NamespaceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the set's membership, firing `on_remove` for every namespace
    /// that dropped out and `on_add` for every one that's new, in that
    /// order, for each registered observer. The set is fully updated before
    /// any callback fires, so a callback that reads the set back sees the
    /// new membership.
    pub fn set(&self, namespaces: impl IntoIterator<Item = NamespaceName>) {
        let mut incoming: HashSet<NamespaceName> = namespaces.into_iter().collect();
        if incoming.iter().any(NamespaceName::is_all) {
            incoming.clear();
            incoming.insert(NamespaceName::all());
        }

        let (removed, added, observers) = {
            let mut state = self.inner.lock();
            let removed: Vec<NamespaceName> = state
                .members
                .iter()
                .filter(|ns| !incoming.contains(*ns))
                .cloned()
                .collect();
            let added: Vec<NamespaceName> = incoming
                .iter()
                .filter(|ns| !state.members.contains(*ns))
                .cloned()
                .collect();
            state.members = incoming;
            state.initialized = true;
            (removed, added, state.observers.iter().map(|o| Observer {
                on_add: o.on_add.clone(),
                on_remove: o.on_remove.clone(),
            }).collect::<Vec<_>>())
        };

        for observer in &observers {
            for ns in &removed {
                (observer.on_remove)(ns);
            }
            for ns in &added {
                (observer.on_add)(ns);
            }
        }
    }

    pub fn contains(&self, namespace: &NamespaceName) -> bool {
        let state = self.inner.lock();
        state.members.contains(namespace)
    }

    /// Sorted list of current members, never `None` - an untouched set
    /// returns an empty vec, not a sentinel.
    pub fn list(&self) -> Vec<NamespaceName> {
        let state = self.inner.lock();
        let mut out: Vec<NamespaceName> = state.members.iter().cloned().collect();
        out.sort();
        out
    }

    pub fn initialized(&self) -> bool {
        self.inner.lock().initialized
    }

    /// Registers a pair of callbacks invoked on future `set` calls only -
    /// there is no synthetic replay of the set's current members.
    pub fn add_observer<A, R>(&self, on_add: A, on_remove: R)
    where
        A: Fn(&NamespaceName) + Send + Sync + 'static,
        R: Fn(&NamespaceName) + Send + Sync + 'static,
    {
        let mut state = self.inner.lock();
        state.observers.push(Observer {
            on_add: Arc::new(on_add),
            on_remove: Arc::new(on_remove),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as StdMutex;

    fn ns(s: &str) -> NamespaceName {
        NamespaceName::new(s)
    }

    #[test]
    fn add_remove_diffing() {
        let set = NamespaceSet::new();
        let added = Arc::new(StdMutex::new(Vec::new()));
        let removed = Arc::new(StdMutex::new(Vec::new()));
        let a2 = added.clone();
        let r2 = removed.clone();
        set.add_observer(
            move |n| a2.lock().push(n.clone()),
            move |n| r2.lock().push(n.clone()),
        );

        set.set([ns("a"), ns("b")]);
        assert_eq!(added.lock().len(), 2);
        assert!(removed.lock().is_empty());

        set.set([ns("b"), ns("c")]);
        assert_eq!(added.lock().last().unwrap(), &ns("c"));
        assert_eq!(removed.lock().last().unwrap(), &ns("a"));
    }

    #[test]
    fn all_namespaces_collapses_others() {
        let set = NamespaceSet::new();
        set.set([NamespaceName::all(), ns("ignored")]);
        assert_eq!(set.list(), vec![NamespaceName::all()]);
    }

    #[test]
    fn initialized_flag() {
        let set = NamespaceSet::new();
        assert!(!set.initialized());
        set.set([]);
        assert!(set.initialized());
        assert!(set.list().is_empty());
    }

    #[test]
    fn list_is_sorted() {
        let set = NamespaceSet::new();
        set.set([ns("zeta"), ns("alpha"), ns("mid")]);
        assert_eq!(set.list(), vec![ns("alpha"), ns("mid"), ns("zeta")]);
    }

    use proptest::prelude::*;

    proptest! {
        // Testable property (SPEC_FULL.md §8, informal restatement for
        // NamespaceSet alone): membership after `set` is deterministic with
        // respect to the last call, regardless of what came before.
        #[test]
        fn membership_matches_last_set_call(
            first in proptest::collection::vec("[a-z]{1,8}", 0..6),
            second in proptest::collection::vec("[a-z]{1,8}", 0..6),
        ) {
            let set = NamespaceSet::new();
            set.set(first.into_iter().map(NamespaceName::new));

            let second_names: Vec<NamespaceName> = second.into_iter().map(NamespaceName::new).collect();
            set.set(second_names.clone());

            let mut expected: Vec<NamespaceName> = second_names;
            expected.sort();
            expected.dedup();
            prop_assert_eq!(set.list(), expected);
        }

        // ALL_NAMESPACES collapses every other member no matter what else is
        // present in the same `set` call, or in how many previous calls.
        #[test]
        fn all_namespaces_always_collapses(
            others in proptest::collection::vec("[a-z]{1,8}", 0..6),
            prior in proptest::collection::vec("[a-z]{1,8}", 0..6),
        ) {
            let set = NamespaceSet::new();
            set.set(prior.into_iter().map(NamespaceName::new));

            let mut members: Vec<NamespaceName> = others.into_iter().map(NamespaceName::new).collect();
            members.push(NamespaceName::all());
            set.set(members);

            prop_assert_eq!(set.list(), vec![NamespaceName::all()]);
        }

        // Every observer sees a diff consistent with the before/after
        // snapshots: nothing fires for a namespace present in both.
        #[test]
        fn observers_never_fire_for_unchanged_members(
            first in proptest::collection::vec("[a-z]{1,8}", 1..6),
            second in proptest::collection::vec("[a-z]{1,8}", 1..6),
        ) {
            let set = NamespaceSet::new();
            let first_names: std::collections::BTreeSet<String> = first.iter().cloned().collect();
            set.set(first.iter().cloned().map(NamespaceName::new));

            let added = Arc::new(StdMutex::new(Vec::new()));
            let removed = Arc::new(StdMutex::new(Vec::new()));
            let a2 = added.clone();
            let r2 = removed.clone();
            set.add_observer(
                move |n| a2.lock().push(n.as_str().to_string()),
                move |n| r2.lock().push(n.as_str().to_string()),
            );

            let second_names: std::collections::BTreeSet<String> = second.iter().cloned().collect();
            set.set(second.iter().cloned().map(NamespaceName::new));

            let unchanged: Vec<&String> = first_names.intersection(&second_names).collect();
            for ns in unchanged {
                prop_assert!(!added.lock().contains(ns));
                prop_assert!(!removed.lock().contains(ns));
            }
        }
    }
}
