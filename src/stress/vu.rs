//! Virtual-user pool.
//!
//! Long-lived workers spawned through a factory closure. Scaling up
//! spawns new workers; scaling down cancels the most recently added
//! ones and waits for them to finish their current request.

use std::sync::Mutex;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type WorkerFactory = Box<dyn Fn(CancellationToken) -> JoinHandle<()> + Send + Sync>;

/// Pool of cancellable workers.
pub struct VuPool {
    factory: WorkerFactory,
    parent: CancellationToken,
    workers: Mutex<Vec<(CancellationToken, JoinHandle<()>)>>,
}

impl VuPool {
    /// `parent` cancels every worker at once (the run deadline);
    /// `factory` spawns one worker driven by the given token.
    pub fn new<F>(parent: CancellationToken, factory: F) -> Self
    where
        F: Fn(CancellationToken) -> JoinHandle<()> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            parent,
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn active(&self) -> usize {
        self.workers.lock().unwrap().len()
    }

    /// Grows or shrinks the pool to `target` workers. Shrinking cancels
    /// the newest workers first and awaits their exit.
    pub async fn scale(&self, target: usize) {
        let mut to_join = Vec::new();
        {
            let mut workers = self.workers.lock().unwrap();
            while workers.len() < target {
                let token = self.parent.child_token();
                let handle = (self.factory)(token.clone());
                workers.push((token, handle));
            }
            while workers.len() > target {
                let (token, handle) = workers.pop().expect("len checked");
                token.cancel();
                to_join.push(handle);
            }
        }
        for handle in to_join {
            let _ = handle.await;
        }
    }

    /// Cancels everything and waits for all workers to exit.
    pub async fn shutdown(&self) {
        let drained: Vec<(CancellationToken, JoinHandle<()>)> =
            std::mem::take(&mut *self.workers.lock().unwrap());
        for (token, _) in &drained {
            token.cancel();
        }
        for (_, handle) in drained {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn counting_pool(running: Arc<AtomicUsize>) -> VuPool {
        VuPool::new(CancellationToken::new(), move |token| {
            let running = Arc::clone(&running);
            tokio::spawn(async move {
                running.fetch_add(1, Ordering::SeqCst);
                token.cancelled().await;
                running.fetch_sub(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test]
    async fn test_scale_up_and_down() {
        let running = Arc::new(AtomicUsize::new(0));
        let pool = counting_pool(Arc::clone(&running));

        pool.scale(4).await;
        assert_eq!(pool.active(), 4);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(running.load(Ordering::SeqCst), 4);

        // Shrink cancels the two most recent workers and joins them.
        pool.scale(2).await;
        assert_eq!(pool.active(), 2);
        assert_eq!(running.load(Ordering::SeqCst), 2);

        pool.shutdown().await;
        assert_eq!(pool.active(), 0);
        assert_eq!(running.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_parent_cancellation_stops_workers() {
        let parent = CancellationToken::new();
        let running = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&running);
        let pool = VuPool::new(parent.clone(), move |token| {
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                token.cancelled().await;
                counter.fetch_sub(1, Ordering::SeqCst);
            })
        });
        pool.scale(3).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        parent.cancel();
        pool.shutdown().await;
        assert_eq!(running.load(Ordering::SeqCst), 0);
    }
}
