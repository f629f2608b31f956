//! Per-user exclusion.
//!
//! Each user id maps to one async mutex around that user's (possibly not
//! yet built) session. Holding the guard covers a whole turn or a whole
//! rebuild, so the two never interleave for the same user. Different users
//! never contend beyond the brief map lookup.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

pub type SlotGuard<T> = OwnedMutexGuard<Option<T>>;

pub struct SessionSlots<T> {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<Option<T>>>>>,
}

impl<T> Default for SessionSlots<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SessionSlots<T> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for exclusive access to the user's slot, creating an empty one
    /// on first use. The guard releases on drop.
    pub async fn acquire(&self, user_id: &str) -> SlotGuard<T> {
        let slot = {
            let mut slots = self.slots.lock();
            slots
                .entry(user_id.to_owned())
                .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
                .clone()
        };
        slot.lock_owned().await
    }

    /// Empty the user's slot once the current holder releases it. Returns
    /// whether a value was dropped.
    ///
    /// The map entry goes away only when nobody else is queued on the slot,
    /// so a waiter and a later `acquire` can never end up on two different
    /// mutexes for the same user.
    pub async fn evict(&self, user_id: &str) -> bool {
        let Some(slot) = self.slots.lock().get(user_id).cloned() else {
            return false;
        };
        let mut guard = slot.clone().lock_owned().await;
        let dropped = guard.take().is_some();

        let mut slots = self.slots.lock();
        // map entry + `slot` + `guard`
        if Arc::strong_count(&slot) == 3 {
            slots.remove(user_id);
        }
        dropped
    }

    /// Number of tracked users (for monitoring).
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn sequential_access_keeps_value() {
        let slots = SessionSlots::new();

        let mut guard = slots.acquire("u1").await;
        assert!(guard.is_none());
        *guard = Some(7);
        drop(guard);

        assert_eq!(*slots.acquire("u1").await, Some(7));
    }

    #[tokio::test]
    async fn different_users_are_independent() {
        let slots = SessionSlots::<u32>::new();

        let g1 = slots.acquire("u1").await;
        let g2 = slots.acquire("u2").await;
        assert_eq!(slots.len(), 2);

        drop(g1);
        drop(g2);
    }

    #[tokio::test]
    async fn same_user_waits() {
        let slots = Arc::new(SessionSlots::<u32>::new());
        let slots2 = slots.clone();

        let g1 = slots.acquire("u1").await;

        let handle = tokio::spawn(async move {
            let guard = slots2.acquire("u1").await;
            *guard
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        let mut g1 = g1;
        *g1 = Some(42);
        drop(g1);

        assert_eq!(handle.await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn evicted_slot_starts_empty() {
        let slots = SessionSlots::new();
        *slots.acquire("u1").await = Some(1);

        assert!(slots.evict("u1").await);
        assert!(!slots.evict("u1").await);
        assert!(slots.is_empty());
        assert!(slots.acquire("u1").await.is_none());
    }

    #[tokio::test]
    async fn evict_waits_for_the_holder() {
        let slots = Arc::new(SessionSlots::<u32>::new());
        let mut holder = slots.acquire("u1").await;
        *holder = Some(5);

        let evicting = {
            let slots = slots.clone();
            tokio::spawn(async move { slots.evict("u1").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!evicting.is_finished());

        drop(holder);
        assert!(evicting.await.unwrap());
        assert!(slots.acquire("u1").await.is_none());
    }

    #[tokio::test]
    async fn evict_keeps_the_entry_while_others_wait() {
        let slots = Arc::new(SessionSlots::<u32>::new());
        let holder = slots.acquire("u1").await;

        let evicting = {
            let slots = slots.clone();
            tokio::spawn(async move { slots.evict("u1").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let waiter = {
            let slots = slots.clone();
            tokio::spawn(async move {
                let mut guard = slots.acquire("u1").await;
                *guard = Some(9);
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(holder);
        assert!(!evicting.await.unwrap());
        waiter.await.unwrap();

        // The queued caller wrote into the slot that later callers see.
        assert_eq!(slots.len(), 1);
        assert_eq!(*slots.acquire("u1").await, Some(9));
    }
}
