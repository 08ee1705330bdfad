//! Typed subscription registry behind [`MessageBus`](super::MessageBus).
//!
//! Subscriptions are keyed by message [`TypeId`]; under each type there is one list per topic
//! plus one global list. Lists are kept sorted by descending priority, then registration
//! sequence, so a publish only merges two already-ordered lists.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Identifier returned by `subscribe`/`global_subscribe`.
pub type SubscriptionId = u64;

pub(crate) type ErasedHandler =
    Arc<dyn Fn(&(dyn Any + Send + Sync)) -> anyhow::Result<()> + Send + Sync>;

/// One registered handler.
#[derive(Clone)]
pub(crate) struct Subscription {
    pub(crate) id: SubscriptionId,
    pub(crate) priority: i32,
    pub(crate) handler: ErasedHandler,
}

impl Subscription {
    /// Sort key: higher priority first, then earlier registration.
    fn key(&self) -> (std::cmp::Reverse<i32>, SubscriptionId) {
        (std::cmp::Reverse(self.priority), self.id)
    }
}

#[derive(Default)]
struct TypeSubscriptions {
    topics: HashMap<String, Vec<Subscription>>,
    global: Vec<Subscription>,
}

fn insert_sorted(list: &mut Vec<Subscription>, sub: Subscription) {
    let pos = list.partition_point(|s| s.key() <= sub.key());
    list.insert(pos, sub);
}

fn remove_id(list: &mut Vec<Subscription>, id: SubscriptionId) -> bool {
    let before = list.len();
    list.retain(|s| s.id != id);
    list.len() != before
}

/// Registry of all subscriptions of one bus.
#[derive(Default)]
pub(crate) struct Registry {
    by_type: HashMap<TypeId, TypeSubscriptions>,
}

impl Registry {
    pub(crate) fn insert(&mut self, type_id: TypeId, topic: Option<String>, sub: Subscription) {
        let entry = self.by_type.entry(type_id).or_default();
        match topic {
            Some(t) => insert_sorted(entry.topics.entry(t).or_default(), sub),
            None => insert_sorted(&mut entry.global, sub),
        }
    }

    pub(crate) fn remove(
        &mut self,
        type_id: TypeId,
        topic: Option<&str>,
        id: SubscriptionId,
    ) -> bool {
        let Some(entry) = self.by_type.get_mut(&type_id) else {
            return false;
        };
        let removed = match topic {
            Some(t) => {
                let removed = entry.topics.get_mut(t).is_some_and(|l| remove_id(l, id));
                if entry.topics.get(t).is_some_and(Vec::is_empty) {
                    entry.topics.remove(t);
                }
                removed
            }
            None => remove_id(&mut entry.global, id),
        };
        if entry.topics.is_empty() && entry.global.is_empty() {
            self.by_type.remove(&type_id);
        }
        removed
    }

    /// Removes every topic-specific subscription of `topic`, across all types.
    pub(crate) fn remove_topic(&mut self, topic: &str) -> usize {
        let mut removed = 0;
        for entry in self.by_type.values_mut() {
            removed += entry.topics.remove(topic).map_or(0, |l| l.len());
        }
        self.by_type
            .retain(|_, e| !(e.topics.is_empty() && e.global.is_empty()));
        removed
    }

    pub(crate) fn clear(&mut self) {
        self.by_type.clear();
    }

    /// Ordered handlers for a message of `type_id` on `topic` (`None` = global publish).
    pub(crate) fn matching(&self, type_id: TypeId, topic: Option<&str>) -> Vec<Subscription> {
        let Some(entry) = self.by_type.get(&type_id) else {
            return Vec::new();
        };
        let scoped: &[Subscription] = topic
            .and_then(|t| entry.topics.get(t))
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut out = Vec::with_capacity(scoped.len() + entry.global.len());
        let (mut a, mut b) = (scoped.iter().peekable(), entry.global.iter().peekable());
        loop {
            let next = match (a.peek(), b.peek()) {
                (Some(x), Some(y)) if x.key() <= y.key() => a.next(),
                (Some(_), Some(_)) => b.next(),
                (Some(_), None) => a.next(),
                (None, Some(_)) => b.next(),
                (None, None) => break,
            };
            out.extend(next.cloned());
        }
        out
    }

    /// Topic-specific subscriptions on `topic`, across all types.
    pub(crate) fn topic_count(&self, topic: &str) -> usize {
        self.by_type
            .values()
            .filter_map(|e| e.topics.get(topic))
            .map(Vec::len)
            .sum()
    }

    /// Topics with at least one subscription, sorted.
    pub(crate) fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .by_type
            .values()
            .flat_map(|e| e.topics.keys().cloned())
            .collect();
        topics.sort();
        topics.dedup();
        topics
    }

    pub(crate) fn len(&self) -> usize {
        self.by_type
            .values()
            .map(|e| e.global.len() + e.topics.values().map(Vec::len).sum::<usize>())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(id: u64, priority: i32) -> Subscription {
        Subscription {
            id,
            priority,
            handler: Arc::new(|_: &(dyn Any + Send + Sync)| -> anyhow::Result<()> { Ok(()) }),
        }
    }

    fn ids(list: &[Subscription]) -> Vec<u64> {
        list.iter().map(|s| s.id).collect()
    }

    #[test]
    fn test_merge_orders_by_priority_then_sequence() {
        let t = TypeId::of::<u8>();
        let mut reg = Registry::default();
        reg.insert(t, Some("cam".into()), sub(1, 0));
        reg.insert(t, None, sub(2, 5));
        reg.insert(t, Some("cam".into()), sub(3, 5));
        reg.insert(t, None, sub(4, 0));
        reg.insert(t, Some("other".into()), sub(5, 10));

        assert_eq!(ids(&reg.matching(t, Some("cam"))), vec![2, 3, 1, 4]);
        assert_eq!(ids(&reg.matching(t, None)), vec![2, 4]);
        assert!(reg.matching(TypeId::of::<u16>(), Some("cam")).is_empty());
    }

    #[test]
    fn test_remove_prunes_empty_entries() {
        let t = TypeId::of::<u8>();
        let mut reg = Registry::default();
        reg.insert(t, Some("cam".into()), sub(1, 0));
        reg.insert(t, Some("cam".into()), sub(2, 0));
        assert_eq!(reg.topics(), vec!["cam".to_string()]);

        assert!(reg.remove(t, Some("cam"), 1));
        assert!(!reg.remove(t, Some("cam"), 1));
        assert_eq!(reg.topic_count("cam"), 1);
        assert_eq!(reg.remove_topic("cam"), 1);
        assert!(reg.topics().is_empty());
        assert_eq!(reg.len(), 0);
    }
}
