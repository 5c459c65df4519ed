// SPDX-License-Identifier: Apache-2.0

use crate::cursor::{decode_cursor, encode_cursor, CursorPayload};
use crate::error::StoreError;
use crate::ts_to_sql;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use caseline_model::{ReportKind, RequestId, RequestStatus, VerifierId};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use serde::Serialize;
use sha2::{Digest, Sha256};

const ORDER_SEARCH: &str = "search";
const ORDER_PENDING: &str = "pending";

/// Page size bounds applied to every list endpoint.
#[derive(Debug, Clone, Copy)]
pub struct QueryLimits {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_limit: 25,
            max_limit: 100,
        }
    }
}

/// Rough cost class of a search, used by the server to pick a bulkhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryClass {
    Cheap,
    Medium,
    Heavy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    pub case_number: Option<String>,
    pub employee_name_prefix: Option<String>,
    pub status: Option<RequestStatus>,
    pub verifier_id: Option<VerifierId>,
    pub report_kind: Option<ReportKind>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub filter: SearchFilter,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

/// One row of a case listing: enough to render a queue or search result
/// without a follow-up fetch per case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseSummary {
    pub id: RequestId,
    pub case_number: String,
    pub employee_name: String,
    pub status: RequestStatus,
    pub verifier_id: Option<VerifierId>,
    pub created_at: DateTime<Utc>,
    pub reports_total: u64,
    pub reports_completed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub rows: Vec<CaseSummary>,
    pub next_cursor: Option<String>,
}

/// A case-number lookup hits a unique index; indexed equality filters are
/// medium; name prefixes and date ranges scan.
#[must_use]
pub fn classify_search(filter: &SearchFilter) -> QueryClass {
    if filter.case_number.is_some() {
        return QueryClass::Cheap;
    }
    if filter.employee_name_prefix.is_some()
        || filter.report_kind.is_some()
        || filter.created_from.is_some()
        || filter.created_to.is_some()
    {
        return QueryClass::Heavy;
    }
    QueryClass::Medium
}

/// Filtered case search, newest first, keyset-paginated on (created_at, id).
pub fn search_requests(
    conn: &Connection,
    query: &SearchQuery,
    limits: QueryLimits,
    cursor_secret: &[u8],
) -> Result<SearchPage, StoreError> {
    let limit = clamp_limit(query.limit, limits);
    let hash = filter_hash(&query.filter);

    let mut sql = String::from(SUMMARY_SELECT);
    let mut args: Vec<Value> = Vec::new();
    push_filter(&mut sql, &mut args, &query.filter);

    if let Some(token) = &query.cursor {
        let pos = decode_cursor(token, cursor_secret, ORDER_SEARCH, &hash)?;
        sql.push_str(" AND (r.created_at < ? OR (r.created_at = ? AND r.id < ?))");
        args.push(Value::Text(pos.last_created_at.clone()));
        args.push(Value::Text(pos.last_created_at));
        args.push(Value::Integer(pos.last_id));
    }

    sql.push_str(" ORDER BY r.created_at DESC, r.id DESC LIMIT ?");
    args.push(Value::Integer(overfetch(limit)));

    run_page(conn, &sql, args, limit, ORDER_SEARCH, &hash, cursor_secret)
}

/// The work queue: open cases, oldest first, keyset-paginated.
pub fn list_pending(
    conn: &Connection,
    limit: Option<usize>,
    cursor: Option<&str>,
    limits: QueryLimits,
    cursor_secret: &[u8],
) -> Result<SearchPage, StoreError> {
    let limit = clamp_limit(limit, limits);
    let hash = canonical_hash("pending|v1");

    let mut sql = format!(
        "{SUMMARY_SELECT} AND r.status IN ('{}', '{}', '{}')",
        RequestStatus::Received.as_str(),
        RequestStatus::InProgress.as_str(),
        RequestStatus::OnHold.as_str(),
    );
    let mut args: Vec<Value> = Vec::new();

    if let Some(token) = cursor {
        let pos = decode_cursor(token, cursor_secret, ORDER_PENDING, &hash)?;
        sql.push_str(" AND (r.created_at > ? OR (r.created_at = ? AND r.id > ?))");
        args.push(Value::Text(pos.last_created_at.clone()));
        args.push(Value::Text(pos.last_created_at));
        args.push(Value::Integer(pos.last_id));
    }

    sql.push_str(" ORDER BY r.created_at ASC, r.id ASC LIMIT ?");
    args.push(Value::Integer(overfetch(limit)));

    run_page(conn, &sql, args, limit, ORDER_PENDING, &hash, cursor_secret)
}

const SUMMARY_SELECT: &str = "\
SELECT r.id, r.case_number, e.name, r.status, r.verifier_id, r.created_at,
       (SELECT COUNT(*) FROM reports p WHERE p.request_id = r.id),
       (SELECT COUNT(*) FROM reports p WHERE p.request_id = r.id AND p.status = 'completed')
FROM requests r
JOIN employees e ON e.id = r.employee_id
WHERE 1 = 1";

fn push_filter(sql: &mut String, args: &mut Vec<Value>, filter: &SearchFilter) {
    if let Some(case_number) = &filter.case_number {
        sql.push_str(" AND r.case_number = ?");
        args.push(Value::Text(case_number.clone()));
    }
    if let Some(prefix) = &filter.employee_name_prefix {
        // LIKE special characters in user input are escaped, not interpreted.
        let escaped = prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        sql.push_str(" AND e.name LIKE ? ESCAPE '\\'");
        args.push(Value::Text(format!("{escaped}%")));
    }
    if let Some(status) = filter.status {
        sql.push_str(" AND r.status = ?");
        args.push(Value::Text(status.as_str().to_string()));
    }
    if let Some(verifier_id) = filter.verifier_id {
        sql.push_str(" AND r.verifier_id = ?");
        args.push(Value::Integer(verifier_id.get()));
    }
    if let Some(kind) = filter.report_kind {
        // "Has an outstanding report of this kind": filed or skeleton, not done.
        sql.push_str(
            " AND EXISTS (SELECT 1 FROM reports k WHERE k.request_id = r.id \
             AND k.kind = ? AND k.status != 'completed')",
        );
        args.push(Value::Text(kind.as_str().to_string()));
    }
    if let Some(from) = filter.created_from {
        sql.push_str(" AND r.created_at >= ?");
        args.push(Value::Text(ts_to_sql(from)));
    }
    if let Some(to) = filter.created_to {
        sql.push_str(" AND r.created_at <= ?");
        args.push(Value::Text(ts_to_sql(to)));
    }
}

#[allow(clippy::too_many_arguments)]
fn run_page(
    conn: &Connection,
    sql: &str,
    args: Vec<Value>,
    limit: usize,
    order: &str,
    hash: &str,
    cursor_secret: &[u8],
) -> Result<SearchPage, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let mapped = stmt.query_map(params_from_iter(args), summary_from_row)?;
    let mut rows = Vec::with_capacity(limit + 1);
    for row in mapped {
        rows.push(row??);
    }

    let next_cursor = if rows.len() > limit {
        rows.truncate(limit);
        let last = &rows[limit - 1];
        Some(encode_cursor(
            &CursorPayload {
                order: order.to_string(),
                last_created_at: ts_to_sql(last.created_at),
                last_id: last.id.get(),
                query_hash: hash.to_string(),
            },
            cursor_secret,
        )?)
    } else {
        None
    };
    Ok(SearchPage { rows, next_cursor })
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<Result<CaseSummary, StoreError>> {
    let id: i64 = row.get(0)?;
    let case_number: String = row.get(1)?;
    let employee_name: String = row.get(2)?;
    let status: String = row.get(3)?;
    let verifier_id: Option<i64> = row.get(4)?;
    let created_at: String = row.get(5)?;
    let reports_total: i64 = row.get(6)?;
    let reports_completed: i64 = row.get(7)?;
    Ok(build_summary(
        id,
        case_number,
        employee_name,
        &status,
        verifier_id,
        &created_at,
        reports_total,
        reports_completed,
    ))
}

#[allow(clippy::too_many_arguments)]
fn build_summary(
    id: i64,
    case_number: String,
    employee_name: String,
    status: &str,
    verifier_id: Option<i64>,
    created_at: &str,
    reports_total: i64,
    reports_completed: i64,
) -> Result<CaseSummary, StoreError> {
    Ok(CaseSummary {
        id: RequestId::new(id)?,
        case_number,
        employee_name,
        status: RequestStatus::parse(status)
            .map_err(|_| StoreError::Corrupt("request status column"))?,
        verifier_id: verifier_id.map(VerifierId::new).transpose()?,
        created_at: crate::ts_from_sql(created_at)?,
        reports_total: u64::try_from(reports_total).unwrap_or(0),
        reports_completed: u64::try_from(reports_completed).unwrap_or(0),
    })
}

fn clamp_limit(requested: Option<usize>, limits: QueryLimits) -> usize {
    requested
        .unwrap_or(limits.default_limit)
        .clamp(1, limits.max_limit)
}

fn overfetch(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX).saturating_add(1)
}

/// Stable hash of the filter so a cursor minted for one search cannot be
/// replayed against another.
fn filter_hash(filter: &SearchFilter) -> String {
    let canonical = format!(
        "search|v1|cn={}|name={}|status={}|verifier={}|kind={}|from={}|to={}",
        filter.case_number.as_deref().unwrap_or(""),
        filter.employee_name_prefix.as_deref().unwrap_or(""),
        filter.status.map(RequestStatus::as_str).unwrap_or(""),
        filter.verifier_id.map_or(0, VerifierId::get),
        filter.report_kind.map(ReportKind::as_str).unwrap_or(""),
        filter.created_from.map(ts_to_sql).unwrap_or_default(),
        filter.created_to.map(ts_to_sql).unwrap_or_default(),
    );
    canonical_hash(&canonical)
}

fn canonical_hash(canonical: &str) -> String {
    let digest = Sha256::digest(canonical.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..16])
}
