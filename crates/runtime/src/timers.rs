//! Deterministic timer queue driven by an externally supplied clock.
//!
//! Key properties:
//! - Total ordering on `(deadline, id)`.
//! - Equal deadlines fire in scheduling order.
//! - Cancellation removes the entry without perturbing the others.
//!
//! The host advances time explicitly, so tests never sleep.

use std::collections::HashMap;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Key {
    deadline_ms: u64,
    id: TimerId,
}

#[derive(Debug)]
struct Entry<T> {
    key: Key,
    payload: T,
}

#[derive(Debug)]
pub struct TimerQueue<T> {
    next_id: u64,
    entries: Vec<Entry<T>>,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn schedule(&mut self, deadline_ms: u64, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.entries.push(Entry {
            key: Key { deadline_ms, id },
            payload,
        });
        id
    }

    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        let idx = self.entries.iter().position(|e| e.key.id == id)?;
        Some(self.entries.swap_remove(idx).payload)
    }

    pub fn contains(&self, id: TimerId) -> bool {
        self.entries.iter().any(|e| e.key.id == id)
    }

    /// Pops the earliest timer whose deadline is at or before `now_ms`.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<(TimerId, T)> {
        let idx = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.key.deadline_ms <= now_ms)
            .min_by_key(|(_, e)| e.key)
            .map(|(idx, _)| idx)?;
        let entry = self.entries.swap_remove(idx);
        Some((entry.key.id, entry.payload))
    }

    /// Drops every pending timer, returning how many were cancelled.
    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }
}

/// Named single-pending-slot debouncers over a [`TimerQueue`].
///
/// Scheduling into an occupied slot cancels the previous timer first.
#[derive(Debug, Default)]
pub struct DebounceSlots {
    slots: HashMap<&'static str, TimerId>,
}

impl DebounceSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<T>(
        &mut self,
        queue: &mut TimerQueue<T>,
        slot: &'static str,
        deadline_ms: u64,
        payload: T,
    ) -> TimerId {
        if let Some(previous) = self.slots.remove(slot) {
            queue.cancel(previous);
        }
        let id = queue.schedule(deadline_ms, payload);
        self.slots.insert(slot, id);
        id
    }

    pub fn cancel<T>(&mut self, queue: &mut TimerQueue<T>, slot: &'static str) -> bool {
        match self.slots.remove(slot) {
            Some(id) => queue.cancel(id).is_some(),
            None => false,
        }
    }

    pub fn is_pending(&self, slot: &'static str) -> bool {
        self.slots.contains_key(slot)
    }

    /// Forgets the slot owning `id` once that timer has fired.
    pub fn fired(&mut self, id: TimerId) {
        self.slots.retain(|_, pending| *pending != id);
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{DebounceSlots, TimerQueue};

    #[test]
    fn fires_in_deadline_then_schedule_order() {
        let mut q = TimerQueue::new();
        q.schedule(20, "late");
        q.schedule(10, "first");
        q.schedule(10, "second");

        assert!(q.pop_due(5).is_none());

        let fired: Vec<_> = std::iter::from_fn(|| q.pop_due(20).map(|(_, v)| v)).collect();
        assert_eq!(fired, vec!["first", "second", "late"]);
    }

    #[test]
    fn cancel_removes_only_target() {
        let mut q = TimerQueue::new();
        let a = q.schedule(1, "a");
        q.schedule(1, "b");
        assert_eq!(q.cancel(a), Some("a"));
        assert_eq!(q.cancel(a), None);
        assert_eq!(q.pop_due(1).map(|(_, v)| v), Some("b"));
        assert!(q.is_empty());
    }

    #[test]
    fn debounce_keeps_single_pending_entry() {
        let mut q = TimerQueue::new();
        let mut slots = DebounceSlots::new();

        slots.schedule(&mut q, "hover", 50, 1);
        slots.schedule(&mut q, "hover", 60, 2);
        let last = slots.schedule(&mut q, "hover", 70, 3);
        slots.schedule(&mut q, "lod", 150, 9);

        assert_eq!(q.len(), 2);
        assert!(q.pop_due(65).is_none());

        let (id, v) = q.pop_due(70).unwrap();
        assert_eq!((id, v), (last, 3));
        slots.fired(id);
        assert!(!slots.is_pending("hover"));
        assert!(slots.is_pending("lod"));

        assert!(slots.cancel(&mut q, "lod"));
        assert!(!slots.cancel(&mut q, "lod"));
        assert!(q.is_empty());
    }
}
