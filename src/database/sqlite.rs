//! SQLite implementation of the RowStore trait
//!
//! Backs local environments. Foreign keys are enforced, so a delete or insert
//! that would leave a dangling reference fails just as it would remotely.

use async_trait::async_trait;
use tokio_rusqlite::Connection;

use super::migrations::{migration_version, CREATE_SCHEMA};
use super::{RowStore, Table};
use crate::error::DbError;
use crate::models::{Event, EventKey, Member, MemberKey, PointsRecord};

/// SQLite row store
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (and migrate) the database at `path`
    ///
    /// Use `:memory:` for an in-memory database.
    pub async fn new(path: &str) -> Result<Self, DbError> {
        let conn = Connection::open(path).await?;

        // Run migrations
        conn.call(|conn| {
            conn.execute_batch(CREATE_SCHEMA)?;
            conn.pragma_update(None, "user_version", migration_version())?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Create a new in-memory database (useful for testing)
    pub async fn in_memory() -> Result<Self, DbError> {
        Self::new(":memory:").await
    }

    fn table_name(table: Table) -> &'static str {
        match table {
            Table::Members => "members",
            Table::Events => "events",
            Table::Points => "points_tracking",
        }
    }
}

fn conversion_error(idx: usize, err: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

#[async_trait]
impl RowStore for SqliteStore {
    async fn select_members(&self) -> Result<Vec<Member>, DbError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, netid, first_name, last_name, grad_year, major, roles, bio,
                           linkedin_url, github_url, headshot_url, secondary_headshot_url
                    FROM members
                    ORDER BY id
                    "#,
                )?;

                let members = stmt
                    .query_map([], |row| {
                        let roles = match row.get::<_, Option<String>>(6)? {
                            Some(raw) => {
                                Some(serde_json::from_str(&raw).map_err(|e| conversion_error(6, e))?)
                            }
                            None => None,
                        };
                        Ok(Member {
                            id: Some(row.get(0)?),
                            netid: row.get(1)?,
                            first_name: row.get(2)?,
                            last_name: row.get(3)?,
                            grad_year: row.get(4)?,
                            major: row.get(5)?,
                            roles,
                            bio: row.get(7)?,
                            linkedin_url: row.get(8)?,
                            github_url: row.get(9)?,
                            headshot_url: row.get(10)?,
                            secondary_headshot_url: row.get(11)?,
                            extra: Default::default(),
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(members)
            })
            .await
            .map_err(Into::into)
    }

    async fn select_events(&self) -> Result<Vec<Event>, DbError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, name, date, description, flyer_url, instagram_url, semester
                    FROM events
                    ORDER BY id
                    "#,
                )?;

                let events = stmt
                    .query_map([], |row| {
                        Ok(Event {
                            id: Some(row.get(0)?),
                            name: row.get(1)?,
                            date: row.get(2)?,
                            description: row.get(3)?,
                            flyer_url: row.get(4)?,
                            instagram_url: row.get(5)?,
                            semester: row.get(6)?,
                            extra: Default::default(),
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(events)
            })
            .await
            .map_err(Into::into)
    }

    async fn select_points(&self) -> Result<Vec<PointsRecord>, DbError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, member_id, points, semester, reason FROM points_tracking ORDER BY id",
                )?;

                let points = stmt
                    .query_map([], |row| {
                        Ok(PointsRecord {
                            id: Some(row.get(0)?),
                            member_id: row.get(1)?,
                            points: row.get(2)?,
                            semester: row.get(3)?,
                            reason: row.get(4)?,
                            extra: Default::default(),
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(points)
            })
            .await
            .map_err(Into::into)
    }

    async fn select_member_keys(&self) -> Result<Vec<MemberKey>, DbError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT id, netid FROM members ORDER BY id")?;
                let keys = stmt
                    .query_map([], |row| Ok(MemberKey::new(row.get(0)?, row.get::<_, String>(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Into::into)
    }

    async fn select_event_keys(&self) -> Result<Vec<EventKey>, DbError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT name, date FROM events ORDER BY id")?;
                let keys = stmt
                    .query_map([], |row| {
                        Ok(EventKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Into::into)
    }

    async fn delete_all(&self, table: Table) -> Result<(), DbError> {
        let name = Self::table_name(table);

        self.conn
            .call(move |conn| {
                conn.execute(&format!("DELETE FROM {}", name), [])?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    async fn insert_members(&self, members: &[Member]) -> Result<u64, DbError> {
        let mut rows = Vec::with_capacity(members.len());
        for member in members {
            let roles = member
                .roles
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| DbError::Decode(e.to_string()))?;
            rows.push((member.clone(), roles));
        }

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        r#"
                        INSERT INTO members
                        (netid, first_name, last_name, grad_year, major, roles, bio,
                         linkedin_url, github_url, headshot_url, secondary_headshot_url)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                        "#,
                    )?;
                    for (m, roles) in &rows {
                        stmt.execute(rusqlite::params![
                            m.netid,
                            m.first_name,
                            m.last_name,
                            m.grad_year,
                            m.major,
                            roles,
                            m.bio,
                            m.linkedin_url,
                            m.github_url,
                            m.headshot_url,
                            m.secondary_headshot_url
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(rows.len() as u64)
            })
            .await
            .map_err(Into::into)
    }

    async fn insert_events(&self, events: &[Event]) -> Result<u64, DbError> {
        let events = events.to_vec();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        r#"
                        INSERT INTO events
                        (name, date, description, flyer_url, instagram_url, semester)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                        "#,
                    )?;
                    for e in &events {
                        stmt.execute(rusqlite::params![
                            e.name,
                            e.date,
                            e.description,
                            e.flyer_url,
                            e.instagram_url,
                            e.semester
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(events.len() as u64)
            })
            .await
            .map_err(Into::into)
    }

    async fn insert_points(&self, points: &[PointsRecord]) -> Result<u64, DbError> {
        let points = points.to_vec();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        r#"
                        INSERT INTO points_tracking (member_id, points, semester, reason)
                        VALUES (?1, ?2, ?3, ?4)
                        "#,
                    )?;
                    for p in &points {
                        stmt.execute(rusqlite::params![p.member_id, p.points, p.semester, p.reason])?;
                    }
                }
                tx.commit()?;
                Ok(points.len() as u64)
            })
            .await
            .map_err(Into::into)
    }
}
