//! Sync run orchestration
//!
//! A run reads everything it needs from the source, releases the source,
//! then rewrites the destination. Blob transfer needs both sides, so the
//! handles are re-resolved one at a time: never two live handles at once.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::differ::{diff, BlobDiff};
use super::retry::RetryManager;
use super::rows::{replace_tables, snapshot_tables, UrlRewrite};
use super::transfer::TransferPool;
use super::SyncPhase;
use crate::config::Config;
use crate::error::SetupError;
use crate::models::{BlobObject, Direction, Environment, SyncResult};
use crate::resolver::{Connector, EnvironmentResolver, Handle};
use crate::storage::BlobStore;

/// Runs one-way replication between the two environments
pub struct SyncEngine {
    resolver: EnvironmentResolver,
    pool: TransferPool,
    retry: RetryManager,
    folder: String,
}

impl SyncEngine {
    /// Engine talking to the configured backends
    pub fn new(config: Config) -> Self {
        Self::with_resolver(EnvironmentResolver::new(config))
    }

    /// Engine with a custom backend connector
    pub fn with_connector(config: Config, connector: Arc<dyn Connector>) -> Self {
        Self::with_resolver(EnvironmentResolver::with_connector(config, connector))
    }

    fn with_resolver(resolver: EnvironmentResolver) -> Self {
        let sync = &resolver.config().sync;
        let retry = RetryManager::new(sync.retry.clone());
        let pool = TransferPool::new(sync.workers, retry.clone());
        let folder = sync.folder.clone();
        Self {
            resolver,
            pool,
            retry,
            folder,
        }
    }

    /// Copy production into staging
    pub async fn pull(&self) -> Result<SyncResult, SetupError> {
        self.run(Direction::Pull).await
    }

    /// Copy staging into production
    pub async fn push(&self) -> Result<SyncResult, SetupError> {
        self.run(Direction::Push).await
    }

    /// Run in a fixed direction
    pub async fn run(&self, direction: Direction) -> Result<SyncResult, SetupError> {
        self.sync(direction.source(), direction.destination()).await
    }

    /// Make `dest` mirror `source`
    ///
    /// Only setup failures are returned as errors, and always before the
    /// destination is touched. Everything else is recorded in the result.
    pub async fn sync(
        &self,
        source: Environment,
        dest: Environment,
    ) -> Result<SyncResult, SetupError> {
        if source == dest {
            return Err(SetupError::SameEnvironment(source));
        }
        self.resolver.validate(source)?;
        self.resolver.validate(dest)?;

        info!(source = %source, dest = %dest, "Starting sync");
        let mut result = SyncResult::new();

        SyncPhase::ResolveSource.enter();
        let src = self.resolver.resolve(source).await?;
        let source_url = src.public_url().to_string();

        SyncPhase::ReadRows.enter();
        let snapshot = snapshot_tables(src.rows(), &mut result).await;

        SyncPhase::ReadBlobList.enter();
        let source_blobs = self.list_blobs(&src, &mut result).await;

        SyncPhase::ReleaseSource.enter();
        drop(src);

        SyncPhase::ResolveDest.enter();
        let dst = self.resolver.resolve(dest).await?;

        match snapshot {
            Some(snapshot) => {
                let rewrite = UrlRewrite::new(source_url, dst.public_url());
                replace_tables(dst.rows(), &snapshot, &rewrite, &mut result).await;
            }
            None => warn!(dest = %dest, "Source rows incomplete, destination rows left untouched"),
        }

        if let Some(source_blobs) = source_blobs {
            self.sync_blobs(source, dst, &source_blobs, &mut result).await;
        } else {
            drop(dst);
        }

        SyncPhase::Done.enter();
        info!(
            source = %source,
            dest = %dest,
            errors = result.errors.len(),
            "{}",
            result.summary()
        );
        Ok(result)
    }

    /// Delete extra destination blobs, then copy new and changed ones
    async fn sync_blobs(
        &self,
        source: Environment,
        dst: Handle,
        source_blobs: &[BlobObject],
        result: &mut SyncResult,
    ) {
        let dest = dst.environment();

        SyncPhase::ListDestBlobs.enter();
        let Some(dest_blobs) = self.list_blobs(&dst, result).await else {
            return;
        };
        let BlobDiff {
            to_transfer,
            to_delete,
            skipped,
        } = diff(source_blobs, &dest_blobs);

        SyncPhase::DeleteExtraBlobs.enter();
        if !to_delete.is_empty() {
            let paths: Vec<String> = to_delete.iter().map(|b| b.path(&self.folder)).collect();
            let blobs = dst.blobs();
            match self.retry.execute(|| blobs.remove(&paths)).await {
                Ok(()) => result.deleted_headshots = paths.len() as u64,
                Err(e) => result.record_error(format!("Headshot delete: {}", e)),
            }
        }

        SyncPhase::DiffBlobs.enter();
        result.skipped_headshots = skipped.len() as u64;
        debug!(
            transfer = to_transfer.len(),
            skipped = skipped.len(),
            deleted = to_delete.len(),
            "Compared blob listings"
        );
        drop(dst);

        if to_transfer.is_empty() {
            return;
        }

        SyncPhase::ResolveSourceAgain.enter();
        let Some(src) = self.resolve_again(source, result).await else {
            return;
        };
        let downloads = self
            .pool
            .download_all(src.blobs(), &self.folder, &to_transfer)
            .await;
        drop(src);
        result.extend_errors(downloads.errors);

        if downloads.completed.is_empty() {
            return;
        }

        SyncPhase::TransferBlobs.enter();
        let Some(dst) = self.resolve_again(dest, result).await else {
            return;
        };
        let uploads = self.pool.upload_all(dst.blobs(), downloads.completed).await;
        drop(dst);

        result.headshots = uploads.completed.len() as u64;
        result.extend_errors(uploads.errors);
    }

    /// List the blob folder of `handle`, recording a failure
    async fn list_blobs(
        &self,
        handle: &Handle,
        result: &mut SyncResult,
    ) -> Option<Vec<BlobObject>> {
        let blobs: Arc<dyn BlobStore> = handle.blobs();
        match self.retry.execute(|| blobs.list(&self.folder)).await {
            Ok(listing) => {
                debug!(
                    environment = %handle.environment(),
                    objects = listing.len(),
                    "Listed blobs"
                );
                Some(listing)
            }
            Err(e) => {
                result.record_error(format!(
                    "Storage list error ({}): {}",
                    handle.environment(),
                    e
                ));
                None
            }
        }
    }

    /// Resolve a handle mid-run; failure skips the rest of the blob phase
    async fn resolve_again(
        &self,
        env: Environment,
        result: &mut SyncResult,
    ) -> Option<Handle> {
        match self.resolver.resolve(env).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                result.record_error(format!("Resolve {} for headshot transfer: {}", env, e));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnvironmentConfig, RetryConfig, SyncConfig};
    use crate::database::MockRowStore;
    use crate::error::{DbError, StorageError};
    use crate::models::{Event, Member, MemberKey, PointsRecord};
    use crate::resolver::Stores;
    use crate::storage::MockBlobStore;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    type StoreFactory = Box<dyn Fn(usize) -> Stores + Send + Sync>;

    /// Hands out stores per environment; the factory receives the call count
    struct ScriptedConnector {
        production: StoreFactory,
        staging: StoreFactory,
        calls: Mutex<Vec<Environment>>,
        connects: AtomicUsize,
    }

    impl ScriptedConnector {
        fn new(production: StoreFactory, staging: StoreFactory) -> Arc<Self> {
            Arc::new(Self {
                production,
                staging,
                calls: Mutex::new(Vec::new()),
                connects: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> Vec<Environment> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(
            &self,
            env: Environment,
            _config: &EnvironmentConfig,
            _sync: &SyncConfig,
        ) -> Result<Stores, SetupError> {
            let n = self.connects.fetch_add(1, Ordering::SeqCst);
            self.calls.lock().unwrap().push(env);
            Ok(match env {
                Environment::Production => (self.production)(n),
                Environment::Staging => (self.staging)(n),
            })
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.environments.production =
            EnvironmentConfig::supabase("https://prod.supabase.co", "prod-key");
        config.environments.staging =
            EnvironmentConfig::supabase("https://staging.supabase.co", "staging-key");
        config.sync.retry = RetryConfig::immediate(3);
        config
    }

    fn blob(name: &str, size: u64) -> BlobObject {
        BlobObject::new(name, size)
            .with_last_modified(Utc.timestamp_opt(1_700_000_000, 0).single().unwrap())
    }

    fn stores(rows: MockRowStore, blobs: MockBlobStore) -> Stores {
        Stores {
            rows: Arc::new(rows),
            blobs: Arc::new(blobs),
        }
    }

    /// Source with one member, one event, one points row and the given blobs
    fn source_rows() -> MockRowStore {
        let mut rows = MockRowStore::new();
        rows.expect_select_members().returning(|| {
            Ok(vec![Member::new("AB123").with_id(5).with_headshot_url(
                "https://prod.supabase.co/storage/v1/object/public/headshots/eboard/ab123.jpg",
            )])
        });
        rows.expect_select_events()
            .returning(|| Ok(vec![Event::new("GBM", "2025-02-01").with_id(1)]));
        rows.expect_select_points()
            .returning(|| Ok(vec![PointsRecord::new(5, 10, "sp25").with_id(1)]));
        rows
    }

    /// Destination that accepts every write
    fn accepting_rows() -> MockRowStore {
        let mut rows = MockRowStore::new();
        rows.expect_delete_all().returning(|_| Ok(()));
        rows.expect_insert_members().returning(|m| Ok(m.len() as u64));
        rows.expect_select_event_keys().returning(|| Ok(vec![]));
        rows.expect_insert_events().returning(|e| Ok(e.len() as u64));
        rows.expect_select_member_keys()
            .returning(|| Ok(vec![MemberKey::new(41, "ab123")]));
        rows.expect_insert_points().returning(|p| Ok(p.len() as u64));
        rows
    }

    fn listing(blobs: Vec<BlobObject>) -> MockBlobStore {
        let mut store = MockBlobStore::new();
        store
            .expect_list()
            .returning(move |_| Ok(blobs.clone()));
        store
    }

    // Test 1: Fresh destination receives every row and blob (push)
    #[tokio::test]
    async fn test_fresh_destination() {
        let connector = ScriptedConnector::new(
            Box::new(|_| {
                let mut blobs = MockBlobStore::new();
                blobs.expect_list().returning(|_| Ok(vec![]));
                blobs.expect_upload().returning(|_, _, _| Ok(()));
                stores(accepting_rows(), blobs)
            }),
            Box::new(|_| {
                let mut blobs = listing(vec![blob("ab123.jpg", 4)]);
                blobs
                    .expect_download()
                    .returning(|_| Ok(Bytes::from_static(b"jpeg")));
                stores(source_rows(), blobs)
            }),
        );
        let engine = SyncEngine::with_connector(config(), connector.clone());

        let result = engine.push().await.unwrap();

        assert!(result.is_clean(), "errors: {:?}", result.errors);
        assert_eq!((result.members, result.events, result.points), (1, 1, 1));
        assert_eq!(result.headshots, 1);
        assert_eq!(result.skipped_headshots, 0);
        assert_eq!(result.deleted_headshots, 0);
        assert_eq!(
            connector.calls(),
            vec![
                Environment::Staging,
                Environment::Production,
                Environment::Staging,
                Environment::Production,
            ]
        );
    }

    // Test 2: Extra destination blob removed, unchanged one skipped, nothing transferred
    #[tokio::test]
    async fn test_blob_cleanup_without_transfer() {
        let connector = ScriptedConnector::new(
            Box::new(|_| stores(source_rows(), listing(vec![blob("a.jpg", 100)]))),
            Box::new(|_| {
                let mut blobs = listing(vec![blob("a.jpg", 100), blob("old.jpg", 50)]);
                blobs
                    .expect_remove()
                    .withf(|paths| paths.len() == 1 && paths[0] == "eboard/old.jpg")
                    .times(1)
                    .returning(|_| Ok(()));
                blobs.expect_upload().times(0);
                stores(accepting_rows(), blobs)
            }),
        );
        let engine = SyncEngine::with_connector(config(), connector.clone());

        let result = engine.pull().await.unwrap();

        assert!(result.is_clean(), "errors: {:?}", result.errors);
        assert_eq!(result.deleted_headshots, 1);
        assert_eq!(result.skipped_headshots, 1);
        assert_eq!(result.headshots, 0);
        // No re-resolution when there is nothing to copy
        assert_eq!(connector.calls().len(), 2);
    }

    // Test 3: Upload succeeds after two transient failures
    #[tokio::test]
    async fn test_transient_upload_failures_retried() {
        let uploads = Arc::new(AtomicUsize::new(0));
        let uploads_clone = Arc::clone(&uploads);
        let connector = ScriptedConnector::new(
            Box::new(|_| {
                let mut blobs = listing(vec![blob("a.jpg", 4)]);
                blobs
                    .expect_download()
                    .returning(|_| Ok(Bytes::from_static(b"jpeg")));
                stores(source_rows(), blobs)
            }),
            Box::new(move |_| {
                let uploads = Arc::clone(&uploads_clone);
                let mut blobs = listing(vec![]);
                blobs.expect_upload().returning(move |_, _, _| {
                    if uploads.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(StorageError::NetworkTimeout)
                    } else {
                        Ok(())
                    }
                });
                stores(accepting_rows(), blobs)
            }),
        );
        let engine = SyncEngine::with_connector(config(), connector);

        let result = engine.pull().await.unwrap();

        assert!(result.is_clean(), "errors: {:?}", result.errors);
        assert_eq!(result.headshots, 1);
        assert_eq!(uploads.load(Ordering::SeqCst), 3);
    }

    // Test 4: A failed member insert is reported and the run continues
    #[tokio::test]
    async fn test_member_insert_failure_reported() {
        let connector = ScriptedConnector::new(
            Box::new(|_| stores(source_rows(), listing(vec![]))),
            Box::new(|_| {
                let mut rows = MockRowStore::new();
                rows.expect_delete_all().returning(|_| Ok(()));
                rows.expect_insert_members().returning(|_| {
                    Err(DbError::Status {
                        status: 409,
                        message: "duplicate key".to_string(),
                    })
                });
                rows.expect_select_event_keys().returning(|| Ok(vec![]));
                rows.expect_insert_events().returning(|e| Ok(e.len() as u64));
                rows.expect_select_member_keys().returning(|| Ok(vec![]));
                stores(rows, listing(vec![]))
            }),
        );
        let engine = SyncEngine::with_connector(config(), connector);

        let result = engine.pull().await.unwrap();

        assert_eq!(result.members, 0);
        assert_eq!(result.events, 1);
        assert_eq!(result.points, 0);
        assert!(result.errors[0].starts_with("Bulk member insert:"));
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("could not map member_id=5")));
    }

    // Test 5: Missing credentials abort before anything is resolved
    #[tokio::test]
    async fn test_missing_credentials_abort_before_mutation() {
        let mut config = config();
        config.environments.staging.service_key = None;
        let connector = ScriptedConnector::new(
            Box::new(|_| stores(MockRowStore::new(), MockBlobStore::new())),
            Box::new(|_| stores(MockRowStore::new(), MockBlobStore::new())),
        );
        let engine = SyncEngine::with_connector(config, connector.clone());

        let err = engine.pull().await.unwrap_err();

        assert!(matches!(
            err,
            SetupError::MissingCredentials {
                environment: Environment::Staging,
                ..
            }
        ));
        assert!(connector.calls().is_empty());
    }

    // Test 6: Same source and destination is refused
    #[tokio::test]
    async fn test_same_environment_refused() {
        let connector = ScriptedConnector::new(
            Box::new(|_| stores(MockRowStore::new(), MockBlobStore::new())),
            Box::new(|_| stores(MockRowStore::new(), MockBlobStore::new())),
        );
        let engine = SyncEngine::with_connector(config(), connector.clone());

        let err = engine
            .sync(Environment::Staging, Environment::Staging)
            .await
            .unwrap_err();

        assert_eq!(err, SetupError::SameEnvironment(Environment::Staging));
        assert!(connector.calls().is_empty());
    }

    // Test 7: Failed source read leaves destination rows alone
    #[tokio::test]
    async fn test_source_read_failure_keeps_destination() {
        let connector = ScriptedConnector::new(
            Box::new(|_| {
                let mut rows = MockRowStore::new();
                rows.expect_select_members()
                    .returning(|| Err(DbError::Request("timeout".to_string())));
                rows.expect_select_events().returning(|| Ok(vec![]));
                rows.expect_select_points().returning(|| Ok(vec![]));
                stores(rows, listing(vec![]))
            }),
            Box::new(|_| {
                let mut rows = MockRowStore::new();
                rows.expect_delete_all().times(0);
                stores(rows, listing(vec![]))
            }),
        );
        let engine = SyncEngine::with_connector(config(), connector);

        let result = engine.pull().await.unwrap();

        assert_eq!(result.errors, vec!["Read members: Request failed: timeout"]);
        assert_eq!(result.members, 0);
    }

    // Test 8: A failed source listing skips the blob phase
    #[tokio::test]
    async fn test_source_listing_failure_skips_blobs() {
        let connector = ScriptedConnector::new(
            Box::new(|_| {
                let mut blobs = MockBlobStore::new();
                blobs
                    .expect_list()
                    .times(1)
                    .returning(|_| Err(StorageError::Unauthorized));
                stores(source_rows(), blobs)
            }),
            Box::new(|_| {
                let mut blobs = MockBlobStore::new();
                blobs.expect_list().times(0);
                stores(accepting_rows(), blobs)
            }),
        );
        let engine = SyncEngine::with_connector(config(), connector.clone());

        let result = engine.pull().await.unwrap();

        assert_eq!(result.members, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("Storage list error (production):"));
        assert_eq!(connector.calls().len(), 2);
    }

    // Test 9: Asset URLs point at the destination after the copy
    #[tokio::test]
    async fn test_urls_rewritten_to_destination() {
        let connector = ScriptedConnector::new(
            Box::new(|_| stores(source_rows(), listing(vec![]))),
            Box::new(|_| {
                let mut rows = MockRowStore::new();
                rows.expect_delete_all().returning(|_| Ok(()));
                rows.expect_insert_members()
                    .withf(|m| {
                        m[0].headshot_url.as_deref()
                            == Some("https://staging.supabase.co/storage/v1/object/public/headshots/eboard/ab123.jpg")
                    })
                    .times(1)
                    .returning(|m| Ok(m.len() as u64));
                rows.expect_select_event_keys().returning(|| Ok(vec![]));
                rows.expect_insert_events().returning(|e| Ok(e.len() as u64));
                rows.expect_select_member_keys()
                    .returning(|| Ok(vec![MemberKey::new(41, "ab123")]));
                rows.expect_insert_points().returning(|p| Ok(p.len() as u64));
                stores(rows, listing(vec![]))
            }),
        );
        let engine = SyncEngine::with_connector(config(), connector);

        let result = engine.pull().await.unwrap();

        assert!(result.is_clean(), "errors: {:?}", result.errors);
        assert_eq!(result.members, 1);
    }
}
