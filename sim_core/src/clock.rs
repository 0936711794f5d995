//! Discrete-event clock
//!
//! A min-priority queue of pending actions keyed by `(due time, priority, insertion order)`.
//! Cancellation is lazy: a cancelled entry stays in the heap and is skipped when it surfaces.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Tie-break between actions due at the same instant; earlier variants fire first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPriority {
    /// Setup work that must precede everything at time zero
    PrePull,
    /// Aura expirations, so a fading effect is gone before anything reads it
    Expire,
    /// Auto attacks and charge recharges
    Auto,
    /// Periodic ticks
    Dot,
    /// Resource regeneration
    Regen,
    #[default]
    Default,
    /// Decision points of units whose global cooldown came up
    Gcd,
    Low,
}

/// Handle returned by [`Clock::schedule`], used to cancel the action
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ActionId(u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action#{}", self.0)
    }
}

struct Entry<A> {
    due: Duration,
    priority: ActionPriority,
    seq: u64,
    payload: A,
}

impl<A> Entry<A> {
    fn key(&self) -> (Duration, ActionPriority, u64) {
        (self.due, self.priority, self.seq)
    }
}

impl<A> PartialEq for Entry<A> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<A> Eq for Entry<A> {}

impl<A> PartialOrd for Entry<A> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<A> Ord for Entry<A> {
    // Reversed: BinaryHeap is a max-heap and the earliest key must surface first
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

/// A popped action together with the time it fired at
#[derive(Debug)]
pub struct Fired<A> {
    pub id: ActionId,
    pub at: Duration,
    pub priority: ActionPriority,
    pub payload: A,
}

/// Event queue and current simulated time
pub struct Clock<A> {
    now: Duration,
    queue: BinaryHeap<Entry<A>>,
    next_seq: u64,
    pending: HashSet<u64>,
    cancelled: HashSet<u64>,
}

impl<A> Default for Clock<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for Clock<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("now", &self.now)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl<A> Clock<A> {
    pub fn new() -> Self {
        Clock {
            now: Duration::ZERO,
            queue: BinaryHeap::new(),
            next_seq: 0,
            pending: HashSet::new(),
            cancelled: HashSet::new(),
        }
    }

    /// Current simulated time
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Enqueue `payload` to fire at `due`
    ///
    /// # Panics
    ///
    /// Scheduling into the past is a logic error in the caller.
    pub fn schedule(&mut self, due: Duration, priority: ActionPriority, payload: A) -> ActionId {
        assert!(
            due >= self.now,
            "cannot schedule an action in the past: due {:?}, now {:?}",
            due,
            self.now
        );
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(seq);
        self.queue.push(Entry {
            due,
            priority,
            seq,
            payload,
        });
        ActionId(seq)
    }

    /// Mark an action so it never fires; returns false if it already fired or was cancelled
    pub fn cancel(&mut self, id: ActionId) -> bool {
        if self.pending.remove(&id.0) {
            self.cancelled.insert(id.0);
            true
        } else {
            false
        }
    }

    /// Whether `id` is still waiting to fire
    pub fn is_pending(&self, id: ActionId) -> bool {
        self.pending.contains(&id.0)
    }

    /// Number of live (not cancelled) actions
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Due time of the next live action, discarding cancelled entries on top of the heap
    pub fn next_due(&mut self) -> Option<Duration> {
        self.discard_cancelled();
        self.queue.peek().map(|entry| entry.due)
    }

    /// Remove the earliest live action and move time forward to its due time
    pub fn pop(&mut self) -> Option<Fired<A>> {
        self.discard_cancelled();
        let entry = self.queue.pop()?;
        self.pending.remove(&entry.seq);
        self.now = entry.due;
        Some(Fired {
            id: ActionId(entry.seq),
            at: entry.due,
            priority: entry.priority,
            payload: entry.payload,
        })
    }

    /// Move time forward without firing anything; never moves backwards
    pub fn advance_to(&mut self, time: Duration) {
        if time > self.now {
            self.now = time;
        }
    }

    /// Drop every action and rewind to time zero
    pub fn reset(&mut self) {
        self.now = Duration::ZERO;
        self.queue.clear();
        self.pending.clear();
        self.cancelled.clear();
        self.next_seq = 0;
    }

    fn discard_cancelled(&mut self) {
        while let Some(top) = self.queue.peek() {
            if !self.cancelled.remove(&top.seq) {
                break;
            }
            self.queue.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn drain<A>(clock: &mut Clock<A>) -> Vec<A> {
        let mut out = Vec::new();
        while let Some(fired) = clock.pop() {
            out.push(fired.payload);
        }
        out
    }

    #[test]
    fn test_orders_by_time_then_priority() {
        let mut clock = Clock::new();
        clock.schedule(ms(5), ActionPriority::Gcd, "5b");
        clock.schedule(ms(5), ActionPriority::Expire, "5a");
        clock.schedule(ms(3), ActionPriority::Expire, "3a");
        clock.schedule(ms(7), ActionPriority::Expire, "7a");
        assert_eq!(drain(&mut clock), vec!["3a", "5a", "5b", "7a"]);
        assert_eq!(clock.now(), ms(7));
    }

    #[test]
    fn test_ties_fire_in_insertion_order() {
        let mut clock = Clock::new();
        for i in 0..5 {
            clock.schedule(ms(10), ActionPriority::Default, i);
        }
        assert_eq!(drain(&mut clock), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_cancelled_action_never_fires() {
        let mut clock = Clock::new();
        let a = clock.schedule(ms(1), ActionPriority::Default, "a");
        clock.schedule(ms(2), ActionPriority::Default, "b");
        assert!(clock.cancel(a));
        assert!(!clock.cancel(a));
        assert!(!clock.is_pending(a));
        assert_eq!(clock.next_due(), Some(ms(2)));
        assert_eq!(drain(&mut clock), vec!["b"]);
    }

    #[test]
    fn test_cancel_after_fire_is_noop() {
        let mut clock = Clock::new();
        let a = clock.schedule(ms(1), ActionPriority::Default, ());
        assert!(clock.pop().is_some());
        assert!(!clock.cancel(a));
        assert_eq!(clock.pending_len(), 0);
    }

    #[test]
    #[should_panic(expected = "in the past")]
    fn test_schedule_in_past_panics() {
        let mut clock = Clock::new();
        clock.schedule(ms(5), ActionPriority::Default, ());
        clock.pop();
        clock.schedule(ms(4), ActionPriority::Default, ());
    }

    #[test]
    fn test_schedule_at_now_is_allowed() {
        let mut clock = Clock::new();
        clock.advance_to(ms(10));
        clock.schedule(ms(10), ActionPriority::Default, 1);
        assert_eq!(clock.pop().map(|f| f.at), Some(ms(10)));
    }

    #[test]
    fn test_reset() {
        let mut clock = Clock::new();
        clock.schedule(ms(10), ActionPriority::Default, 1);
        clock.advance_to(ms(4));
        clock.reset();
        assert_eq!(clock.now(), Duration::ZERO);
        assert!(clock.pop().is_none());
    }

    proptest! {
        #[test]
        fn pops_are_sorted_and_skip_cancelled(
            items in prop::collection::vec((0u64..50, 0usize..8, any::<bool>()), 1..60)
        ) {
            let priorities = [
                ActionPriority::PrePull,
                ActionPriority::Expire,
                ActionPriority::Auto,
                ActionPriority::Dot,
                ActionPriority::Regen,
                ActionPriority::Default,
                ActionPriority::Gcd,
                ActionPriority::Low,
            ];
            let mut clock = Clock::new();
            let mut expected = Vec::new();
            for (i, (due, p, cancel)) in items.iter().enumerate() {
                let id = clock.schedule(ms(*due), priorities[*p], i);
                if *cancel {
                    clock.cancel(id);
                } else {
                    expected.push((*due, priorities[*p], i));
                }
            }
            expected.sort();
            let fired: Vec<usize> = drain(&mut clock);
            let expected: Vec<usize> = expected.into_iter().map(|(_, _, i)| i).collect();
            prop_assert_eq!(fired, expected);
        }
    }
}
