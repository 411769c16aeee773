//! Environment resolution
//!
//! Turns an environment tag into a live [`Handle`]: a row store, a blob store
//! and the environment's public URL base. Only one handle may be alive at a
//! time; a handle must be dropped before the next one is resolved.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::{BackendKind, Config, EnvironmentConfig, SyncConfig};
use crate::database::{PostgrestStore, RowStore, SqliteStore};
use crate::error::SetupError;
use crate::http_client::SupabaseClient;
use crate::models::Environment;
use crate::storage::{BlobStore, FilesystemStore, SupabaseStorage};

/// Stores freshly connected for one environment
pub struct Stores {
    /// Relational tables
    pub rows: Arc<dyn RowStore>,
    /// Headshot bucket
    pub blobs: Arc<dyn BlobStore>,
}

/// Builds backend clients for an environment
#[async_trait]
pub trait Connector: Send + Sync {
    /// Construct new stores for `env`; never reuse clients of earlier calls
    async fn connect(
        &self,
        env: Environment,
        config: &EnvironmentConfig,
        sync: &SyncConfig,
    ) -> Result<Stores, SetupError>;
}

/// Connector for the configured backend kinds
#[derive(Debug, Default, Clone, Copy)]
pub struct BackendConnector;

#[async_trait]
impl Connector for BackendConnector {
    async fn connect(
        &self,
        env: Environment,
        config: &EnvironmentConfig,
        sync: &SyncConfig,
    ) -> Result<Stores, SetupError> {
        let backend_error = |message: String| SetupError::Backend {
            environment: env,
            message,
        };

        match config.backend {
            BackendKind::Supabase => {
                let url = config.url.as_deref().unwrap_or_default();
                let key = config.service_key.as_deref().unwrap_or_default();
                let timeout = Duration::from_secs(sync.storage_timeout_secs);

                // Separate clients so row and blob traffic never share state
                let rest = SupabaseClient::new(url, key, timeout).map_err(backend_error)?;
                let storage = SupabaseClient::new(url, key, timeout).map_err(backend_error)?;

                Ok(Stores {
                    rows: Arc::new(PostgrestStore::new(
                        rest,
                        sync.tables.clone(),
                        sync.page_size,
                    )),
                    blobs: Arc::new(SupabaseStorage::new(
                        storage,
                        sync.bucket.clone(),
                        sync.page_size,
                    )),
                })
            }
            BackendKind::Local => {
                let database = config.database_path.as_deref().unwrap_or_default();
                let storage = config.storage_path.as_deref().unwrap_or_default();

                let rows = SqliteStore::new(database)
                    .await
                    .map_err(|e| backend_error(e.to_string()))?;
                let blobs = FilesystemStore::new(PathBuf::from(storage).join(&sync.bucket))
                    .await
                    .map_err(|e| backend_error(e.to_string()))?;

                Ok(Stores {
                    rows: Arc::new(rows),
                    blobs: Arc::new(blobs),
                })
            }
        }
    }
}

/// Marks the resolver as having a live handle until dropped
struct Lease {
    slot: Arc<Mutex<Option<Environment>>>,
}

impl Lease {
    fn acquire(
        slot: &Arc<Mutex<Option<Environment>>>,
        requested: Environment,
    ) -> Result<Self, SetupError> {
        let mut active = slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(active) = *active {
            return Err(SetupError::HandleInUse { active, requested });
        }
        *active = Some(requested);
        Ok(Self {
            slot: Arc::clone(slot),
        })
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut active = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *active = None;
    }
}

/// Live connection to one environment
pub struct Handle {
    environment: Environment,
    public_url: String,
    rows: Arc<dyn RowStore>,
    blobs: Arc<dyn BlobStore>,
    _lease: Lease,
}

impl Handle {
    /// Environment this handle talks to
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Base URL that this environment's asset links start with
    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    /// Row store
    pub fn rows(&self) -> &dyn RowStore {
        self.rows.as_ref()
    }

    /// Blob store, shareable with transfer workers
    pub fn blobs(&self) -> Arc<dyn BlobStore> {
        Arc::clone(&self.blobs)
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("environment", &self.environment)
            .field("public_url", &self.public_url)
            .finish_non_exhaustive()
    }
}

/// Maps environment tags to handles
pub struct EnvironmentResolver {
    config: Config,
    connector: Arc<dyn Connector>,
    active: Arc<Mutex<Option<Environment>>>,
}

impl EnvironmentResolver {
    /// Resolver using the configured backends
    pub fn new(config: Config) -> Self {
        Self::with_connector(config, Arc::new(BackendConnector))
    }

    /// Resolver with a custom connector
    pub fn with_connector(config: Config, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Engine-wide configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check that `env` is fully configured without connecting
    pub fn validate(&self, env: Environment) -> Result<(), SetupError> {
        self.config.environments.get(env).validate(env)
    }

    /// Environment of the handle currently alive, if any
    pub fn active(&self) -> Option<Environment> {
        *self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Construct a fresh handle for `env`
    ///
    /// Fails with [`SetupError::HandleInUse`] while another handle is alive.
    pub async fn resolve(&self, env: Environment) -> Result<Handle, SetupError> {
        let env_config = self.config.environments.get(env);
        env_config.validate(env)?;
        let public_url = env_config
            .public_base()
            .ok_or_else(|| SetupError::MissingCredentials {
                environment: env,
                field: "public_url".to_string(),
            })?
            .to_string();

        let lease = Lease::acquire(&self.active, env)?;
        let stores = self
            .connector
            .connect(env, env_config, &self.config.sync)
            .await?;

        debug!(environment = %env, "Resolved handle");
        Ok(Handle {
            environment: env,
            public_url,
            rows: stores.rows,
            blobs: stores.blobs,
            _lease: lease,
        })
    }
}
