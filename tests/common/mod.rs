//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::path::PathBuf;

use bytes::Bytes;
use tempfile::TempDir;

use roster_sync::config::{Config, EnvironmentConfig, RetryConfig};
use roster_sync::database::{RowStore, SqliteStore};
use roster_sync::models::{Environment, Event, Member, PointsRecord};
use roster_sync::storage::{BlobStore, FilesystemStore};

pub const PROD_URL: &str = "https://prod.example.org";
pub const STAGING_URL: &str = "https://staging.example.org";

/// Two local environments living in one temporary directory
pub struct LocalPair {
    pub dir: TempDir,
}

impl LocalPair {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    fn env_dir(&self, env: Environment) -> PathBuf {
        self.dir.path().join(env.to_string())
    }

    pub fn database_path(&self, env: Environment) -> String {
        self.env_dir(env)
            .join("roster.db")
            .to_string_lossy()
            .into_owned()
    }

    pub fn storage_path(&self, env: Environment) -> String {
        self.env_dir(env)
            .join("storage")
            .to_string_lossy()
            .into_owned()
    }

    pub fn public_url(env: Environment) -> &'static str {
        match env {
            Environment::Production => PROD_URL,
            Environment::Staging => STAGING_URL,
        }
    }

    pub fn environment_config(&self, env: Environment) -> EnvironmentConfig {
        EnvironmentConfig::local(
            self.database_path(env),
            self.storage_path(env),
            Self::public_url(env),
        )
    }

    /// Create the directories the SQLite files live in
    pub fn prepare_dirs(&self) {
        for env in Environment::ALL {
            std::fs::create_dir_all(self.env_dir(env)).expect("Failed to create env dir");
        }
    }

    /// Configuration with both environments local and no retry delays
    pub fn config(&self) -> Config {
        self.prepare_dirs();

        let mut config = Config::default();
        config.environments.production = self.environment_config(Environment::Production);
        config.environments.staging = self.environment_config(Environment::Staging);
        config.sync.workers = 4;
        config.sync.retry = RetryConfig::immediate(3);
        config
    }

    pub async fn rows(&self, env: Environment) -> SqliteStore {
        self.prepare_dirs();
        SqliteStore::new(&self.database_path(env))
            .await
            .expect("Failed to open test database")
    }

    pub async fn blobs(&self, env: Environment) -> FilesystemStore {
        FilesystemStore::new(PathBuf::from(self.storage_path(env)).join("headshots"))
            .await
            .expect("Failed to open test storage")
    }

    /// Absolute on-disk path of a blob
    pub fn blob_file(&self, env: Environment, path: &str) -> PathBuf {
        PathBuf::from(self.storage_path(env))
            .join("headshots")
            .join(path)
    }
}

pub fn headshot_url(env: Environment, netid: &str) -> String {
    format!(
        "{}/storage/v1/object/public/headshots/eboard/{}.jpg",
        LocalPair::public_url(env),
        netid
    )
}

pub fn secondary_headshot_url(env: Environment, netid: &str) -> String {
    format!(
        "{}/storage/v1/object/public/headshots/eboard/{}-alt.jpg",
        LocalPair::public_url(env),
        netid
    )
}

/// Insert members and return their assigned `(id, netid)` pairs
pub async fn seed_members(store: &SqliteStore, env: Environment, netids: &[&str]) -> Vec<(i64, String)> {
    let members: Vec<Member> = netids
        .iter()
        .map(|netid| {
            Member::new(*netid)
                .with_name("Test", netid.to_uppercase())
                .with_headshot_url(headshot_url(env, netid))
                .with_secondary_headshot_url(secondary_headshot_url(env, netid))
        })
        .collect();
    store
        .insert_members(&members)
        .await
        .expect("Failed to seed members");

    store
        .select_member_keys()
        .await
        .expect("Failed to read members")
        .into_iter()
        .map(|k| (k.id, k.netid))
        .collect()
}

pub async fn seed_events(store: &SqliteStore, events: &[(&str, &str)]) {
    let events: Vec<Event> = events
        .iter()
        .map(|(name, date)| Event::new(*name, *date).with_semester("sp25"))
        .collect();
    store
        .insert_events(&events)
        .await
        .expect("Failed to seed events");
}

pub async fn seed_points(store: &SqliteStore, points: &[(i64, i64)]) {
    let points: Vec<PointsRecord> = points
        .iter()
        .map(|(member_id, points)| PointsRecord::new(*member_id, *points, "sp25"))
        .collect();
    store
        .insert_points(&points)
        .await
        .expect("Failed to seed points");
}

pub async fn seed_blob(store: &FilesystemStore, name: &str, data: &[u8]) {
    store
        .upload(
            &format!("eboard/{}", name),
            Bytes::copy_from_slice(data),
            "image/jpeg",
        )
        .await
        .expect("Failed to seed blob");
}

/// Names of the blobs in the mirrored folder
pub async fn blob_names(store: &FilesystemStore) -> Vec<String> {
    store
        .list("eboard")
        .await
        .expect("Failed to list blobs")
        .into_iter()
        .map(|b| b.name)
        .collect()
}

/// Points as `(netid, points)`, sorted
pub async fn points_by_netid(store: &SqliteStore) -> Vec<(String, i64)> {
    let keys = store.select_member_keys().await.expect("members");
    let mut points: Vec<(String, i64)> = store
        .select_points()
        .await
        .expect("points")
        .into_iter()
        .map(|p| {
            let netid = keys
                .iter()
                .find(|k| k.id == p.member_id)
                .map(|k| k.netid.clone())
                .unwrap_or_default();
            (netid, p.points)
        })
        .collect();
    points.sort();
    points
}
