//! PostgREST implementation of the RowStore trait
//!
//! Talks to `/rest/v1/<table>` of a Supabase project. Reads are paged by
//! `id`, deletes are table-wide and inserts are bulk JSON arrays.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::{RowStore, Table};
use crate::config::TableNames;
use crate::error::DbError;
use crate::http_client::{check_rest_response, SupabaseClient};
use crate::models::{Event, EventKey, Member, MemberKey, PointsRecord};

/// Row store backed by a Supabase PostgREST endpoint
pub struct PostgrestStore {
    client: SupabaseClient,
    tables: TableNames,
    page_size: usize,
}

impl PostgrestStore {
    /// Create a store for the given project client
    pub fn new(client: SupabaseClient, tables: TableNames, page_size: usize) -> Self {
        Self {
            client,
            tables,
            page_size: page_size.max(1),
        }
    }

    fn table_url(&self, table: Table) -> String {
        self.client
            .endpoint(&format!("rest/v1/{}", table.name(&self.tables)))
    }

    /// Read every row of `table`, `page_size` rows per request
    async fn select_all<T: DeserializeOwned + Send>(
        &self,
        table: Table,
        columns: &str,
    ) -> Result<Vec<T>, DbError> {
        let url = self.table_url(table);
        let limit = self.page_size.to_string();
        let mut rows = Vec::new();
        let mut offset = 0usize;

        loop {
            let offset_param = offset.to_string();
            let response = self
                .client
                .http()
                .get(&url)
                .query(&[
                    ("select", columns),
                    ("order", "id.asc"),
                    ("limit", limit.as_str()),
                    ("offset", offset_param.as_str()),
                ])
                .send()
                .await
                .map_err(|e| DbError::Request(e.to_string()))?;

            let page: Vec<T> = check_rest_response(response)
                .await?
                .json()
                .await
                .map_err(|e| DbError::Decode(e.to_string()))?;

            let fetched = page.len();
            rows.extend(page);
            debug!(table = %table, offset = offset, fetched = fetched, "Fetched page");

            if fetched < self.page_size {
                break;
            }
            offset += fetched;
        }

        Ok(rows)
    }

    /// Bulk insert `rows`
    ///
    /// Rows only carry the columns their source row had. The union of those
    /// is passed as `columns` so that PostgREST does not take the column set
    /// from the first row alone.
    async fn insert_rows<T: Serialize + Sync>(
        &self,
        table: Table,
        rows: &[T],
    ) -> Result<u64, DbError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let body = serde_json::to_value(rows).map_err(|e| DbError::Decode(e.to_string()))?;
        let columns = column_union(&body);

        let response = self
            .client
            .http()
            .post(self.table_url(table))
            .query(&[("columns", columns.as_str())])
            .header("Prefer", "return=minimal")
            .json(&body)
            .send()
            .await
            .map_err(|e| DbError::Request(e.to_string()))?;
        check_rest_response(response).await?;

        debug!(table = %table, rows = rows.len(), "Inserted rows");
        Ok(rows.len() as u64)
    }
}

/// Comma-separated, sorted union of the keys of every object in `rows`
fn column_union(rows: &Value) -> String {
    let columns: BTreeSet<&str> = rows
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
        .flat_map(|row| row.keys().map(String::as_str))
        .collect();
    columns.into_iter().collect::<Vec<_>>().join(",")
}

#[async_trait]
impl RowStore for PostgrestStore {
    async fn select_members(&self) -> Result<Vec<Member>, DbError> {
        self.select_all(Table::Members, "*").await
    }

    async fn select_events(&self) -> Result<Vec<Event>, DbError> {
        self.select_all(Table::Events, "*").await
    }

    async fn select_points(&self) -> Result<Vec<PointsRecord>, DbError> {
        self.select_all(Table::Points, "*").await
    }

    async fn select_member_keys(&self) -> Result<Vec<MemberKey>, DbError> {
        self.select_all(Table::Members, "id,netid").await
    }

    async fn select_event_keys(&self) -> Result<Vec<EventKey>, DbError> {
        self.select_all(Table::Events, "name,date").await
    }

    async fn delete_all(&self, table: Table) -> Result<(), DbError> {
        // PostgREST refuses unfiltered deletes; this filter matches every row
        let response = self
            .client
            .http()
            .delete(self.table_url(table))
            .query(&[("id", "not.is.null")])
            .send()
            .await
            .map_err(|e| DbError::Request(e.to_string()))?;
        check_rest_response(response).await?;

        debug!(table = %table, "Deleted all rows");
        Ok(())
    }

    async fn insert_members(&self, members: &[Member]) -> Result<u64, DbError> {
        self.insert_rows(Table::Members, members).await
    }

    async fn insert_events(&self, events: &[Event]) -> Result<u64, DbError> {
        self.insert_rows(Table::Events, events).await
    }

    async fn insert_points(&self, points: &[PointsRecord]) -> Result<u64, DbError> {
        self.insert_rows(Table::Points, points).await
    }
}
