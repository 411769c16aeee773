//! Bounded-concurrency blob transfer
//!
//! A fixed number of workers drain a shared queue of blobs. Downloads and
//! uploads are separate fan-out/fan-in stages; every storage call goes
//! through the retry manager and one blob's failure never affects another.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error};

use super::retry::RetryManager;
use crate::error::StorageError;
use crate::models::{BlobObject, DownloadedBlob};
use crate::storage::BlobStore;

/// Per-item results of one pool stage, in input order
#[derive(Debug)]
pub struct StageOutcome<T> {
    /// Items that completed
    pub completed: Vec<T>,
    /// One message per failed item
    pub errors: Vec<String>,
}

impl<T> Default for StageOutcome<T> {
    fn default() -> Self {
        Self {
            completed: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Fixed-size worker pool for blob downloads and uploads
#[derive(Debug, Clone)]
pub struct TransferPool {
    workers: usize,
    retry: RetryManager,
}

impl TransferPool {
    /// Create a pool with `workers` concurrent workers
    pub fn new(workers: usize, retry: RetryManager) -> Self {
        Self {
            workers: workers.max(1),
            retry,
        }
    }

    /// Download every blob of `blobs` from `folder` in parallel
    pub async fn download_all(
        &self,
        store: Arc<dyn BlobStore>,
        folder: &str,
        blobs: &[BlobObject],
    ) -> StageOutcome<DownloadedBlob> {
        let folder = folder.to_string();
        let retry = self.retry.clone();
        let results = self
            .run(blobs.to_vec(), move |blob: BlobObject| {
                let store = Arc::clone(&store);
                let retry = retry.clone();
                let path = blob.path(&folder);
                async move {
                    let data: Bytes = retry.execute(|| store.download(&path)).await?;
                    debug!(path = %path, size = data.len(), "Downloaded blob");
                    Ok::<_, StorageError>(DownloadedBlob {
                        path,
                        data,
                        content_type: blob.content_type,
                    })
                }
            })
            .await;

        let mut outcome = StageOutcome::default();
        for (blob, result) in blobs.iter().zip(results) {
            match result {
                Some(Ok(downloaded)) => outcome.completed.push(downloaded),
                Some(Err(e)) => outcome
                    .errors
                    .push(format!("Headshot download {}: {}", blob.name, e)),
                None => outcome
                    .errors
                    .push(format!("Headshot download {}: worker failed", blob.name)),
            }
        }
        outcome
    }

    /// Upload every downloaded blob in parallel, replacing existing objects
    ///
    /// Returns the paths that were uploaded.
    pub async fn upload_all(
        &self,
        store: Arc<dyn BlobStore>,
        blobs: Vec<DownloadedBlob>,
    ) -> StageOutcome<String> {
        let paths: Vec<String> = blobs.iter().map(|b| b.path.clone()).collect();
        let retry = self.retry.clone();
        let results = self
            .run(blobs, move |blob: DownloadedBlob| {
                let store = Arc::clone(&store);
                let retry = retry.clone();
                async move {
                    upload_replacing(store.as_ref(), &retry, &blob).await?;
                    debug!(path = %blob.path, "Uploaded blob");
                    Ok::<_, StorageError>(blob.path)
                }
            })
            .await;

        let mut outcome = StageOutcome::default();
        for (path, result) in paths.iter().zip(results) {
            match result {
                Some(Ok(uploaded)) => outcome.completed.push(uploaded),
                Some(Err(e)) => outcome.errors.push(format!("Headshot {}: {}", path, e)),
                None => outcome
                    .errors
                    .push(format!("Headshot {}: worker failed", path)),
            }
        }
        outcome
    }

    /// Run `work` over `items` on the worker pool
    ///
    /// Slot `i` of the result holds the output for `items[i]`, or `None` if
    /// the task processing it panicked. Each item runs in its own task so a
    /// panic never loses the results of other items.
    async fn run<I, R, F, Fut>(&self, items: Vec<I>, work: F) -> Vec<Option<R>>
    where
        I: Send + 'static,
        R: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let total = items.len();
        let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();
        if total == 0 {
            return slots;
        }

        let queue = Arc::new(Mutex::new(
            items.into_iter().enumerate().collect::<VecDeque<_>>(),
        ));
        let work = Arc::new(work);
        let mut join_set = JoinSet::new();

        for _ in 0..self.workers.min(total) {
            let queue = Arc::clone(&queue);
            let work = Arc::clone(&work);
            join_set.spawn(async move {
                let mut done = Vec::new();
                loop {
                    let next = queue.lock().await.pop_front();
                    let Some((index, item)) = next else {
                        break;
                    };
                    match tokio::spawn(work(item)).await {
                        Ok(result) => done.push((index, result)),
                        Err(e) => error!(index = index, error = %e, "Transfer task failed"),
                    }
                }
                done
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(done) => {
                    for (index, result) in done {
                        slots[index] = Some(result);
                    }
                }
                Err(e) => error!(error = %e, "Transfer worker failed"),
            }
        }
        slots
    }
}

/// Upload a blob; an existing object is removed and the upload repeated once
async fn upload_replacing(
    store: &dyn BlobStore,
    retry: &RetryManager,
    blob: &DownloadedBlob,
) -> Result<(), StorageError> {
    let upload = || store.upload(&blob.path, blob.data.clone(), &blob.content_type);

    match retry.execute(upload).await {
        Err(StorageError::Duplicate(_)) => {
            debug!(path = %blob.path, "Replacing existing object");
            let paths = vec![blob.path.clone()];
            retry.execute(|| store.remove(&paths)).await?;
            retry.execute(upload).await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::storage::MockBlobStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pool(workers: usize, max_attempts: u32) -> TransferPool {
        TransferPool::new(workers, RetryManager::new(RetryConfig::immediate(max_attempts)))
    }

    fn downloaded(path: &str) -> DownloadedBlob {
        DownloadedBlob {
            path: path.to_string(),
            data: Bytes::from_static(b"img"),
            content_type: "image/jpeg".to_string(),
        }
    }

    // Test 1: Upload succeeds on the third attempt after two transient failures
    #[tokio::test]
    async fn test_upload_retries_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let mut store = MockBlobStore::new();
        store.expect_upload().times(3).returning(move |_, _, _| {
            if calls_clone.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(StorageError::NetworkTimeout)
            } else {
                Ok(())
            }
        });

        let outcome = pool(8, 3)
            .upload_all(Arc::new(store), vec![downloaded("eboard/a.jpg")])
            .await;

        assert_eq!(outcome.completed, vec!["eboard/a.jpg"]);
        assert!(outcome.errors.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    // Test 2: Duplicate upload removes the existing object and uploads again
    #[tokio::test]
    async fn test_duplicate_upload_replaced() {
        let uploads = Arc::new(AtomicUsize::new(0));
        let uploads_clone = Arc::clone(&uploads);

        let mut store = MockBlobStore::new();
        store.expect_upload().times(2).returning(move |path, _, _| {
            if uploads_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(StorageError::Duplicate(path.to_string()))
            } else {
                Ok(())
            }
        });
        store
            .expect_remove()
            .withf(|paths| paths.len() == 1 && paths[0] == "eboard/a.jpg")
            .times(1)
            .returning(|_| Ok(()));

        let outcome = pool(2, 3)
            .upload_all(Arc::new(store), vec![downloaded("eboard/a.jpg")])
            .await;

        assert_eq!(outcome.completed.len(), 1);
        assert!(outcome.errors.is_empty());
    }

    // Test 3: One failed download does not affect the others
    #[tokio::test]
    async fn test_download_failure_isolated() {
        let mut store = MockBlobStore::new();
        store.expect_download().returning(|path| {
            if path == "eboard/bad.jpg" {
                Err(StorageError::NotFound(path.to_string()))
            } else {
                Ok(Bytes::from(path.to_string()))
            }
        });

        let blobs = vec![
            BlobObject::new("a.jpg", 1),
            BlobObject::new("bad.jpg", 1),
            BlobObject::new("c.jpg", 1).with_content_type("image/png"),
        ];
        let outcome = pool(2, 3)
            .download_all(Arc::new(store), "eboard", &blobs)
            .await;

        let paths: Vec<&str> = outcome.completed.iter().map(|b| b.path.as_str()).collect();
        assert_eq!(paths, vec!["eboard/a.jpg", "eboard/c.jpg"]);
        assert_eq!(outcome.completed[1].content_type, "image/png");
        assert_eq!(
            outcome.errors,
            vec!["Headshot download bad.jpg: Object not found: eboard/bad.jpg"]
        );
    }

    // Test 4: Exhausted retries are reported
    #[tokio::test]
    async fn test_upload_exhausted_reported() {
        let mut store = MockBlobStore::new();
        store
            .expect_upload()
            .times(2)
            .returning(|_, _, _| Err(StorageError::ServerError(503)));

        let outcome = pool(4, 2)
            .upload_all(Arc::new(store), vec![downloaded("eboard/a.jpg")])
            .await;

        assert!(outcome.completed.is_empty());
        assert_eq!(
            outcome.errors,
            vec!["Headshot eboard/a.jpg: Server error: HTTP 503"]
        );
    }

    // Test 5: Never more than `workers` operations in flight
    #[tokio::test]
    async fn test_concurrency_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let pool = pool(3, 1);
        let results = pool
            .run((0..20).collect::<Vec<u32>>(), {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                move |n| {
                    let in_flight = Arc::clone(&in_flight);
                    let peak = Arc::clone(&peak);
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        n * 2
                    }
                }
            })
            .await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
        let values: Vec<u32> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, (0..20).map(|n| n * 2).collect::<Vec<_>>());
    }

    // Test 6: A panicking item loses only its own result
    #[tokio::test]
    async fn test_panicking_item_isolated() {
        let results = pool(1, 1)
            .run((0..4).collect::<Vec<u32>>(), |n| async move {
                if n == 2 {
                    panic!("item {} exploded", n);
                }
                n * 10
            })
            .await;

        assert_eq!(results, vec![Some(0), Some(10), None, Some(30)]);
    }

    // Test 7: Stage outcome starts empty for any item type
    #[test]
    fn test_stage_outcome_default() {
        let outcome: StageOutcome<DownloadedBlob> = StageOutcome::default();
        assert!(outcome.completed.is_empty());
        assert!(outcome.errors.is_empty());
    }

    // Test 8: Empty input spawns nothing
    #[tokio::test]
    async fn test_empty_stage() {
        let store = MockBlobStore::new();
        let outcome = pool(8, 3).upload_all(Arc::new(store), vec![]).await;
        assert!(outcome.completed.is_empty());
        assert!(outcome.errors.is_empty());
    }
}
