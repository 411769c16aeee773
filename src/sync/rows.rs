//! Row transfer between environments
//!
//! Reads the three tables from the source in full, then replaces the
//! destination's contents: clear all tables, insert members, insert events,
//! and insert points with `member_id` remapped through `netid`.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use super::SyncPhase;
use crate::database::{RowStore, Table};
use crate::models::{
    normalize_netid, Event, EventKey, Member, MemberKey, PointsRecord, SyncResult,
};

/// Full contents of the replicated tables of one environment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSnapshot {
    /// All member rows
    pub members: Vec<Member>,
    /// All event rows
    pub events: Vec<Event>,
    /// All points rows
    pub points: Vec<PointsRecord>,
}

/// Substring replacement applied to asset URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRewrite {
    from: String,
    to: String,
}

impl UrlRewrite {
    /// Replace `from` with `to`; trailing slashes on either side are ignored
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into().trim_end_matches('/').to_string(),
            to: to.into().trim_end_matches('/').to_string(),
        }
    }

    /// Rewrite one URL
    pub fn apply(&self, url: &str) -> String {
        if self.from.is_empty() {
            return url.to_string();
        }
        url.replace(&self.from, &self.to)
    }
}

/// Read every table of the source
///
/// All three reads are attempted. Any failure is recorded and `None` is
/// returned so that the destination is not replaced with a partial snapshot.
pub async fn snapshot_tables(rows: &dyn RowStore, result: &mut SyncResult) -> Option<TableSnapshot> {
    let members = rows.select_members().await;
    let events = rows.select_events().await;
    let points = rows.select_points().await;

    let mut complete = true;
    let members = members.unwrap_or_else(|e| {
        result.record_error(format!("Read members: {}", e));
        complete = false;
        Vec::new()
    });
    let events = events.unwrap_or_else(|e| {
        result.record_error(format!("Read events: {}", e));
        complete = false;
        Vec::new()
    });
    let points = points.unwrap_or_else(|e| {
        result.record_error(format!("Read points: {}", e));
        complete = false;
        Vec::new()
    });

    if !complete {
        return None;
    }

    debug!(
        members = members.len(),
        events = events.len(),
        points = points.len(),
        "Read source tables"
    );
    Some(TableSnapshot {
        members,
        events,
        points,
    })
}

/// Replace the destination's rows with the snapshot
///
/// Each step runs even if an earlier one failed; failures are recorded in
/// `result`.
pub async fn replace_tables(
    rows: &dyn RowStore,
    snapshot: &TableSnapshot,
    rewrite: &UrlRewrite,
    result: &mut SyncResult,
) {
    SyncPhase::DeleteDestRows.enter();
    delete_all_rows(rows, result).await;
    SyncPhase::InsertMembers.enter();
    insert_members(rows, &snapshot.members, rewrite, result).await;
    SyncPhase::InsertEvents.enter();
    insert_events(rows, &snapshot.events, result).await;
    SyncPhase::RemapAndInsertPoints.enter();
    remap_and_insert_points(rows, snapshot, result).await;

    info!(
        members = result.members,
        events = result.events,
        points = result.points,
        "Replaced destination rows"
    );
}

/// Clear the destination, dependents first
pub async fn delete_all_rows(rows: &dyn RowStore, result: &mut SyncResult) {
    for table in Table::DELETE_ORDER {
        if let Err(e) = rows.delete_all(table).await {
            result.record_error(format!("Delete {}: {}", table, e));
        }
    }
}

/// Insert source members under fresh ids, with URLs moved to the destination
pub async fn insert_members(
    rows: &dyn RowStore,
    members: &[Member],
    rewrite: &UrlRewrite,
    result: &mut SyncResult,
) {
    let mut seen = HashSet::new();
    let mut copies = Vec::with_capacity(members.len());
    for member in members {
        let copy = prepare_member(member, rewrite);
        if !seen.insert(copy.netid.clone()) {
            result.record_error(format!("Member {}: duplicate netid skipped", copy.netid));
            continue;
        }
        copies.push(copy);
    }

    if copies.is_empty() {
        return;
    }
    match rows.insert_members(&copies).await {
        Ok(written) => result.members = written,
        Err(e) => result.record_error(format!("Bulk member insert: {}", e)),
    }
}

/// Insert source events whose `(name, date)` the destination does not have yet
pub async fn insert_events(rows: &dyn RowStore, events: &[Event], result: &mut SyncResult) {
    let mut existing: HashSet<EventKey> = match rows.select_event_keys().await {
        Ok(keys) => keys.into_iter().collect(),
        Err(e) => {
            result.record_error(format!("Read destination events: {}", e));
            HashSet::new()
        }
    };

    let new_events: Vec<Event> = events
        .iter()
        .filter(|event| existing.insert(event.key()))
        .map(|event| Event {
            id: None,
            ..event.clone()
        })
        .collect();

    let skipped = events.len() - new_events.len();
    if skipped > 0 {
        debug!(skipped = skipped, "Skipped events already present");
    }
    if new_events.is_empty() {
        return;
    }
    match rows.insert_events(&new_events).await {
        Ok(written) => result.events = written,
        Err(e) => result.record_error(format!("Bulk event insert: {}", e)),
    }
}

/// Re-read destination member ids and insert points pointing at them
pub async fn remap_and_insert_points(
    rows: &dyn RowStore,
    snapshot: &TableSnapshot,
    result: &mut SyncResult,
) {
    if snapshot.points.is_empty() {
        return;
    }

    let dest_keys = match rows.select_member_keys().await {
        Ok(keys) => keys,
        Err(e) => {
            result.record_error(format!("Read destination members: {}", e));
            Vec::new()
        }
    };

    let (remapped, errors) = remap_points(&snapshot.points, &snapshot.members, &dest_keys);
    result.extend_errors(errors);

    if remapped.is_empty() {
        return;
    }
    match rows.insert_points(&remapped).await {
        Ok(written) => result.points = written,
        Err(e) => result.record_error(format!("Bulk points insert: {}", e)),
    }
}

/// Translate `member_id` from source ids to destination ids via `netid`
///
/// Rows whose member cannot be resolved on both sides are dropped and
/// reported. Returned rows carry no `id`.
pub fn remap_points(
    points: &[PointsRecord],
    source_members: &[Member],
    dest_keys: &[MemberKey],
) -> (Vec<PointsRecord>, Vec<String>) {
    let source_netids: HashMap<i64, String> = source_members
        .iter()
        .filter_map(|m| m.id.map(|id| (id, m.normalized_netid())))
        .collect();
    let dest_ids: HashMap<String, i64> = dest_keys
        .iter()
        .map(|k| (normalize_netid(&k.netid), k.id))
        .collect();

    let mut remapped = Vec::with_capacity(points.len());
    let mut errors = Vec::new();
    for point in points {
        let dest_id = source_netids
            .get(&point.member_id)
            .and_then(|netid| dest_ids.get(netid));
        match dest_id {
            Some(&member_id) => remapped.push(PointsRecord {
                id: None,
                member_id,
                ..point.clone()
            }),
            None => errors.push(format!(
                "Points row {}: could not map member_id={}",
                point
                    .id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "?".to_string()),
                point.member_id
            )),
        }
    }
    (remapped, errors)
}

fn prepare_member(member: &Member, rewrite: &UrlRewrite) -> Member {
    Member {
        id: None,
        netid: member.normalized_netid(),
        headshot_url: member.headshot_url.as_deref().map(|u| rewrite.apply(u)),
        secondary_headshot_url: member
            .secondary_headshot_url
            .as_deref()
            .map(|u| rewrite.apply(u)),
        ..member.clone()
    }
}
