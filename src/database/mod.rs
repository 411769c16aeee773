//! Row store layer for roster-sync
//!
//! This module defines the row store trait along with a PostgREST
//! implementation for hosted environments and a SQLite implementation for
//! local ones.

pub mod migrations;
pub mod postgrest;
pub mod sqlite;

pub use postgrest::PostgrestStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::config::TableNames;
use crate::error::DbError;
use crate::models::{Event, EventKey, Member, MemberKey, PointsRecord};

/// One of the replicated tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Members table
    Members,
    /// Events table
    Events,
    /// Points table, referencing members
    Points,
}

impl Table {
    /// Order in which tables are cleared: dependents before their parents
    pub const DELETE_ORDER: [Table; 3] = [Table::Points, Table::Events, Table::Members];

    /// Configured remote name of this table
    pub fn name(self, tables: &TableNames) -> &str {
        match self {
            Table::Members => &tables.members,
            Table::Events => &tables.events,
            Table::Points => &tables.points,
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Table::Members => write!(f, "members"),
            Table::Events => write!(f, "events"),
            Table::Points => write!(f, "points"),
        }
    }
}

/// Row store trait for the replicated tables
///
/// Selects return every row in the table. Inserts write the given rows as-is
/// (rows without an `id` get one assigned by the store) and return the number
/// of rows written.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Read all members
    async fn select_members(&self) -> Result<Vec<Member>, DbError>;

    /// Read all events
    async fn select_events(&self) -> Result<Vec<Event>, DbError>;

    /// Read all points rows
    async fn select_points(&self) -> Result<Vec<PointsRecord>, DbError>;

    /// Read the `(id, netid)` pairs of all members
    async fn select_member_keys(&self) -> Result<Vec<MemberKey>, DbError>;

    /// Read the `(name, date)` pairs of all events
    async fn select_event_keys(&self) -> Result<Vec<EventKey>, DbError>;

    /// Delete every row of a table
    async fn delete_all(&self, table: Table) -> Result<(), DbError>;

    /// Insert members
    async fn insert_members(&self, members: &[Member]) -> Result<u64, DbError>;

    /// Insert events
    async fn insert_events(&self, events: &[Event]) -> Result<u64, DbError>;

    /// Insert points rows
    async fn insert_points(&self, points: &[PointsRecord]) -> Result<u64, DbError>;
}
