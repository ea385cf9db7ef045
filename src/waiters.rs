//! Serialize requests of a single principal.
//!
//! Each principal gets a waiter record: an active flag and a count of
//! waiting requests. A request waits until the flag is clear, then
//! sets it; the [`WaiterGuard`] clears it again and wakes one waiter.
//! This is not a queue, there is no fairness between waiters.
//! Requests without a principal are not serialized.
//!
//! Records are never removed, except by `remove` (on session destroy).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Default)]
struct WaiterState {
    active: bool,
    waiting: usize,
}

#[derive(Default)]
struct Waiter {
    state: Mutex<WaiterState>,
    notify: Notify,
}

/// Registry of per-principal waiters. One per handler.
#[derive(Default)]
pub(crate) struct WaiterRegistry {
    waiters: Mutex<HashMap<String, Arc<Waiter>>>,
}

/// Holds the principal's slot until dropped.
pub(crate) struct WaiterGuard {
    waiter: Option<Arc<Waiter>>,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        if let Some(w) = self.waiter.take() {
            w.state.lock().active = false;
            w.notify.notify_one();
        }
    }
}

// A request waiting in `enter`. Uncounts itself if the wait is
// abandoned.
struct Pending<'a> {
    waiter: &'a Waiter,
    counted: bool,
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        if self.counted {
            self.waiter.state.lock().waiting -= 1;
        }
    }
}

impl WaiterRegistry {
    pub fn new() -> WaiterRegistry {
        WaiterRegistry::default()
    }

    /// Wait until no other request of `principal` is active.
    pub async fn enter(&self, principal: Option<&str>) -> WaiterGuard {
        let key = match principal {
            Some(key) => key,
            None => return WaiterGuard { waiter: None },
        };

        let waiter = {
            let mut waiters = self.waiters.lock();
            match waiters.get(key) {
                Some(w) => w.clone(),
                None => {
                    let w = Arc::new(Waiter::default());
                    w.state.lock().active = true;
                    waiters.insert(key.to_string(), w.clone());
                    return WaiterGuard { waiter: Some(w) };
                }
            }
        };

        let mut pending = Pending {
            waiter: &waiter,
            counted: false,
        };
        loop {
            let notified = waiter.notify.notified();
            {
                let mut st = waiter.state.lock();
                if !st.active {
                    st.active = true;
                    if pending.counted {
                        st.waiting -= 1;
                        pending.counted = false;
                    }
                    break;
                }
                if !pending.counted {
                    st.waiting += 1;
                    pending.counted = true;
                }
                debug!("in: waiters={}", st.waiting);
            }
            notified.await;
        }
        drop(pending);

        WaiterGuard {
            waiter: Some(waiter),
        }
    }

    /// Forget the waiter record for `key`.
    pub fn remove(&self, key: &str) {
        self.waiters.lock().remove(key);
    }

    #[cfg(test)]
    fn waiting(&self, key: &str) -> usize {
        self.waiters
            .lock()
            .get(key)
            .map(|w| w.state.lock().waiting)
            .unwrap_or_default()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.waiters.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn no_principal_is_not_serialized() {
        let reg = WaiterRegistry::new();
        let _a = reg.enter(None).await;
        let _b = reg.enter(None).await;
        assert_eq!(reg.len(), 0);
    }

    #[tokio::test]
    async fn same_principal_waits() {
        let reg = Arc::new(WaiterRegistry::new());
        let first = reg.enter(Some("bob")).await;

        let reg2 = reg.clone();
        let second = tokio::spawn(async move {
            let _g = reg2.enter(Some("bob")).await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second.is_finished());
        assert_eq!(reg.waiting("bob"), 1);

        drop(first);
        tokio::time::timeout(Duration::from_secs(5), second)
            .await
            .expect("second request never ran")
            .unwrap();
        assert_eq!(reg.waiting("bob"), 0);
    }

    #[tokio::test]
    async fn other_principal_does_not_wait() {
        let reg = WaiterRegistry::new();
        let _bob = reg.enter(Some("bob")).await;
        tokio::time::timeout(Duration::from_secs(1), reg.enter(Some("alice")))
            .await
            .expect("alice blocked on bob");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_two_active() {
        let reg = Arc::new(WaiterRegistry::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let reg = reg.clone();
            let inside = inside.clone();
            tasks.push(tokio::spawn(async move {
                let _g = reg.enter(Some("bob")).await;
                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(reg.waiting("bob"), 0);
    }

    #[tokio::test]
    async fn abandoned_wait_is_uncounted() {
        let reg = WaiterRegistry::new();
        let first = reg.enter(Some("bob")).await;

        let res = tokio::time::timeout(Duration::from_millis(20), reg.enter(Some("bob"))).await;
        assert!(res.is_err());
        assert_eq!(reg.waiting("bob"), 0);

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), reg.enter(Some("bob")))
            .await
            .expect("slot not released");
    }

    #[tokio::test]
    async fn remove_forgets_record() {
        let reg = WaiterRegistry::new();
        drop(reg.enter(Some("bob")).await);
        assert_eq!(reg.len(), 1);
        reg.remove("bob");
        assert_eq!(reg.len(), 0);
        reg.remove("no-such-session");
    }
}
