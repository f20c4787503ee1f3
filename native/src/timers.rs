//! Timers backed by tasks on the current `LocalSet`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use purejax_core::{TimerId, Timers};
use tokio::task::{self, AbortHandle};

#[derive(Debug, Default)]
struct TimersInner {
    next: u64,
    active: HashMap<u64, AbortHandle>,
}

/// Each timeout is a local task sleeping for its delay; clearing aborts it.
#[derive(Debug, Clone, Default)]
pub struct LocalTimers {
    inner: Rc<RefCell<TimersInner>>,
}

impl LocalTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> usize {
        self.inner.borrow().active.len()
    }
}

impl Timers for LocalTimers {
    /// Must be called from within a `LocalSet`.
    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId {
        let id = {
            let mut inner = self.inner.borrow_mut();
            inner.next += 1;
            inner.next
        };

        let inner = Rc::clone(&self.inner);
        let handle = task::spawn_local(async move {
            tokio::time::sleep(delay).await;

            inner.borrow_mut().active.remove(&id);
            callback();
        });

        self.inner
            .borrow_mut()
            .active
            .insert(id, handle.abort_handle());
        TimerId(id)
    }

    fn clear_timeout(&self, id: TimerId) {
        let handle = self.inner.borrow_mut().active.remove(&id.0);
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[tokio::test]
    async fn timeout_fires_after_delay() {
        let local = task::LocalSet::new();
        local
            .run_until(async {
                let timers = LocalTimers::new();
                let fired = Rc::new(Cell::new(false));
                let flag = Rc::clone(&fired);
                timers.set_timeout(Duration::from_millis(5), Box::new(move || flag.set(true)));
                assert_eq!(timers.active(), 1);

                tokio::time::sleep(Duration::from_millis(50)).await;
                assert!(fired.get());
                assert_eq!(timers.active(), 0);
            })
            .await;
    }

    #[tokio::test]
    async fn cleared_timeout_never_fires() {
        let local = task::LocalSet::new();
        local
            .run_until(async {
                let timers = LocalTimers::new();
                let id = timers.set_timeout(
                    Duration::from_millis(5),
                    Box::new(|| panic!("cleared timer fired")),
                );
                timers.clear_timeout(id);
                timers.clear_timeout(id);

                tokio::time::sleep(Duration::from_millis(50)).await;
                assert_eq!(timers.active(), 0);
            })
            .await;
    }
}
