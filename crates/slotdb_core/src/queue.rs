//! FIFO execution queues.
//!
//! A queue admits one task at a time, in arrival order. Tasks hold a
//! [`Turn`] for as long as they need exclusive use of the resource the queue
//! guards. Queues are always entered in the order
//! `update → insert/delete → index → page → write`.

use tokio::sync::{Mutex, MutexGuard};

/// Exclusive use of a queue's resource. Dropping it admits the next task.
pub(crate) type Turn<'a> = MutexGuard<'a, ()>;

#[derive(Debug)]
pub(crate) struct Queue {
    name: &'static str,
    lock: Mutex<()>,
}

impl Queue {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Waits for every earlier task to finish, then takes the turn.
    pub async fn enter(&self) -> Turn<'_> {
        self.lock.lock().await
    }

    /// Waits until every task enqueued so far has finished.
    pub async fn drain(&self) {
        drop(self.lock.lock().await);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn tasks_run_in_arrival_order() {
        let queue = Arc::new(Queue::new("test"));
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let first = queue.enter().await;
        let mut handles = Vec::new();
        for i in 0..5 {
            let queue = Arc::clone(&queue);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let _turn = queue.enter().await;
                order.lock().push(i);
                tokio::task::yield_now().await;
            }));
            // Let the task reach the queue before the next one is spawned.
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
        }
        drop(first);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn drain_waits_for_holder() {
        let queue = Arc::new(Queue::new("write"));
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let turn = queue.enter().await;

        let waiter = {
            let queue = Arc::clone(&queue);
            let done = Arc::clone(&done);
            tokio::spawn(async move {
                queue.drain().await;
                done.load(std::sync::atomic::Ordering::SeqCst)
            })
        };
        tokio::task::yield_now().await;
        done.store(true, std::sync::atomic::Ordering::SeqCst);
        drop(turn);
        assert!(waiter.await.unwrap());
        assert_eq!(queue.name(), "write");
    }
}
