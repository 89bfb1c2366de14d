//! Listener registries

use crate::listener::Listener;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use tracing::error;

type Slot = Box<dyn Any + Send + Sync>;

/// Which registry a listener lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifetime {
    Persistent,
    OneShot,
}

/// Persistent and one-shot listener sequences keyed by event type.
///
/// Each slot holds a `Vec<Listener<P>>` for the payload of the event whose
/// `TypeId` keys it. Guards are never held past a single method call.
#[derive(Default)]
pub(crate) struct Registry {
    persistent: DashMap<TypeId, Slot>,
    one_shot: DashMap<TypeId, Slot>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn sequences(&self, lifetime: Lifetime) -> &DashMap<TypeId, Slot> {
        match lifetime {
            Lifetime::Persistent => &self.persistent,
            Lifetime::OneShot => &self.one_shot,
        }
    }

    /// Append a listener, creating the sequence if absent
    pub(crate) fn push<P: Send + Sync + 'static>(
        &self,
        key: TypeId,
        lifetime: Lifetime,
        listener: Listener<P>,
    ) {
        let mut slot = self
            .sequences(lifetime)
            .entry(key)
            .or_insert_with(|| Box::new(Vec::<Listener<P>>::new()));

        match slot.downcast_mut::<Vec<Listener<P>>>() {
            Some(sequence) => sequence.push(listener),
            None => mismatch(key, lifetime),
        }
    }

    /// Copy of the sequence at this instant
    pub(crate) fn snapshot<P: Send + Sync + 'static>(
        &self,
        key: TypeId,
        lifetime: Lifetime,
    ) -> Vec<Listener<P>> {
        let Some(slot) = self.sequences(lifetime).get(&key) else {
            return Vec::new();
        };

        match slot.downcast_ref::<Vec<Listener<P>>>() {
            Some(sequence) => sequence.clone(),
            None => {
                mismatch(key, lifetime);
                Vec::new()
            }
        }
    }

    /// Whether either registry holds a key for the event, even an empty one
    pub(crate) fn is_known(&self, key: TypeId) -> bool {
        self.persistent.contains_key(&key) || self.one_shot.contains_key(&key)
    }

    /// Remove every occurrence of `listener` from both registries.
    ///
    /// Both keys are left in place, empty if nothing else was registered.
    pub(crate) fn remove<P: Send + Sync + 'static>(&self, key: TypeId, listener: &Listener<P>) {
        for lifetime in [Lifetime::Persistent, Lifetime::OneShot] {
            let mut slot = self
                .sequences(lifetime)
                .entry(key)
                .or_insert_with(|| Box::new(Vec::<Listener<P>>::new()));

            match slot.downcast_mut::<Vec<Listener<P>>>() {
                Some(sequence) => sequence.retain(|registered| !registered.same_as(listener)),
                None => mismatch(key, lifetime),
            }
        }
    }

    pub(crate) fn len<P: Send + Sync + 'static>(&self, key: TypeId, lifetime: Lifetime) -> usize {
        let Some(slot) = self.sequences(lifetime).get(&key) else {
            return 0;
        };

        match slot.downcast_ref::<Vec<Listener<P>>>() {
            Some(sequence) => sequence.len(),
            None => {
                mismatch(key, lifetime);
                0
            }
        }
    }

    /// Drop the whole one-shot sequence for an event
    pub(crate) fn clear_one_shot(&self, key: TypeId) {
        self.one_shot.remove(&key);
    }

    pub(crate) fn clear(&self) {
        self.persistent.clear();
        self.one_shot.clear();
    }
}

/// A slot keyed by an event always holds that event's payload type; a
/// mismatch means two payload types share a key and the operation is skipped.
fn mismatch(key: TypeId, lifetime: Lifetime) {
    error!(
        ?key,
        ?lifetime,
        "Listener sequence holds a different payload type; operation skipped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    struct Ping;

    fn key() -> TypeId {
        TypeId::of::<Ping>()
    }

    fn listener() -> Listener<u32> {
        Listener::from_fn(|_| Ok(()))
    }

    #[test]
    fn test_push_and_len() {
        let registry = Registry::new();
        assert_eq!(registry.len::<u32>(key(), Lifetime::Persistent), 0);
        assert!(!registry.is_known(key()));

        registry.push(key(), Lifetime::Persistent, listener());
        registry.push(key(), Lifetime::OneShot, listener());
        registry.push(key(), Lifetime::OneShot, listener());

        assert!(registry.is_known(key()));
        assert_eq!(registry.len::<u32>(key(), Lifetime::Persistent), 1);
        assert_eq!(registry.len::<u32>(key(), Lifetime::OneShot), 2);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = Registry::new();
        registry.push(key(), Lifetime::Persistent, listener());

        let snapshot = registry.snapshot::<u32>(key(), Lifetime::Persistent);
        registry.push(key(), Lifetime::Persistent, listener());

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len::<u32>(key(), Lifetime::Persistent), 2);
    }

    #[test]
    fn test_remove_initializes_both_keys() {
        let registry = Registry::new();
        let registered = listener();
        registry.push(key(), Lifetime::Persistent, registered.clone());
        registry.push(key(), Lifetime::Persistent, registered.clone());

        registry.remove(key(), &registered);

        assert_eq!(registry.len::<u32>(key(), Lifetime::Persistent), 0);
        assert!(registry.persistent.contains_key(&key()));
        assert!(registry.one_shot.contains_key(&key()));
    }

    #[test]
    fn test_clear_one_shot_drops_key() {
        let registry = Registry::new();
        registry.push(key(), Lifetime::OneShot, listener());

        registry.clear_one_shot(key());

        assert!(!registry.is_known(key()));
    }

    #[test]
    fn test_mismatched_payload_leaves_sequence_intact() {
        let registry = Registry::new();
        registry.push(key(), Lifetime::Persistent, listener());

        let foreign = Listener::<String>::from_fn(|_| Ok(()));
        registry.push(key(), Lifetime::Persistent, foreign.clone());
        registry.remove(key(), &foreign);

        assert_eq!(registry.len::<u32>(key(), Lifetime::Persistent), 1);
        assert_eq!(registry.snapshot::<u32>(key(), Lifetime::Persistent).len(), 1);
        assert_eq!(registry.len::<String>(key(), Lifetime::Persistent), 0);
        assert!(registry.snapshot::<String>(key(), Lifetime::Persistent).is_empty());
    }

    #[test]
    fn test_clear() {
        let registry = Registry::new();
        registry.push(key(), Lifetime::Persistent, listener());
        registry.push(key(), Lifetime::OneShot, listener());

        registry.clear();

        assert!(!registry.is_known(key()));
    }
}
