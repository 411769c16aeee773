//! roster-sync - Replicates a membership roster between production and staging
//!
//! This crate copies the members, events and points tables and the headshot
//! bucket from one deployment to the other, remapping foreign keys and
//! asset URLs on the way.

pub mod config;
pub mod database;
pub mod error;
pub mod http_client;
pub mod models;
pub mod resolver;
pub mod storage;
pub mod sync;
pub mod telemetry;
