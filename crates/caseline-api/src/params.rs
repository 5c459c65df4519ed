// SPDX-License-Identifier: Apache-2.0

use crate::errors::ApiError;
use caseline_model::{parse_case_number, ReportKind, RequestStatus, VerifierId, NAME_MAX_LEN};
use caseline_store::{SearchFilter, SearchQuery, MAX_CURSOR_BYTES};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub const ALLOWED_SEARCH_PARAMS: [&str; 9] = [
    "case_number",
    "name_prefix",
    "status",
    "verifier_id",
    "report_kind",
    "created_from",
    "created_to",
    "limit",
    "cursor",
];

#[derive(Debug, Clone, Default)]
pub struct PendingParams {
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

/// Parses `/v1/verifications/search` query parameters. Unknown parameter
/// names are rejected rather than ignored, so typos fail loudly.
pub fn parse_search_params(query: &BTreeMap<String, String>) -> Result<SearchQuery, ApiError> {
    for name in query.keys() {
        if !ALLOWED_SEARCH_PARAMS.contains(&name.as_str()) {
            return Err(ApiError::invalid_param(name, "unknown parameter"));
        }
    }

    let case_number = query
        .get("case_number")
        .map(|raw| {
            parse_case_number(raw).map_err(|_| ApiError::invalid_param("case_number", raw))
        })
        .transpose()?;
    let name_prefix = query.get("name_prefix").cloned();
    if let Some(prefix) = &name_prefix {
        if prefix.is_empty() || prefix.len() > NAME_MAX_LEN {
            return Err(ApiError::invalid_param("name_prefix", prefix));
        }
    }
    let status = query
        .get("status")
        .map(|raw| {
            RequestStatus::parse(raw).map_err(|_| ApiError::invalid_param("status", raw))
        })
        .transpose()?;
    let report_kind = query
        .get("report_kind")
        .map(|raw| {
            ReportKind::parse(raw).map_err(|_| ApiError::invalid_param("report_kind", raw))
        })
        .transpose()?;
    let verifier_id = query
        .get("verifier_id")
        .map(|raw| {
            VerifierId::parse(raw).map_err(|_| ApiError::invalid_param("verifier_id", raw))
        })
        .transpose()?;

    let created_from = query
        .get("created_from")
        .map(|raw| parse_timestamp("created_from", raw))
        .transpose()?;
    let created_to = query
        .get("created_to")
        .map(|raw| parse_timestamp("created_to", raw))
        .transpose()?;
    if let (Some(from), Some(to)) = (created_from, created_to) {
        if from > to {
            return Err(ApiError::invalid_param("created_to", "before created_from"));
        }
    }

    Ok(SearchQuery {
        filter: SearchFilter {
            case_number,
            employee_name_prefix: name_prefix,
            status,
            verifier_id,
            report_kind,
            created_from,
            created_to,
        },
        limit: parse_limit(query)?,
        cursor: parse_cursor(query)?,
    })
}

pub fn parse_pending_params(query: &BTreeMap<String, String>) -> Result<PendingParams, ApiError> {
    for name in query.keys() {
        if name != "limit" && name != "cursor" {
            return Err(ApiError::invalid_param(name, "unknown parameter"));
        }
    }
    Ok(PendingParams {
        limit: parse_limit(query)?,
        cursor: parse_cursor(query)?,
    })
}

fn parse_limit(query: &BTreeMap<String, String>) -> Result<Option<usize>, ApiError> {
    let Some(raw) = query.get("limit") else {
        return Ok(None);
    };
    let value = raw
        .parse::<usize>()
        .map_err(|_| ApiError::invalid_param("limit", raw))?;
    if value == 0 {
        return Err(ApiError::invalid_param("limit", raw));
    }
    Ok(Some(value))
}

fn parse_cursor(query: &BTreeMap<String, String>) -> Result<Option<String>, ApiError> {
    let cursor = query.get("cursor").cloned();
    if let Some(value) = &cursor {
        if value.is_empty() || value.len() > MAX_CURSOR_BYTES {
            return Err(ApiError::invalid_cursor());
        }
    }
    Ok(cursor)
}

fn parse_timestamp(name: &str, raw: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ApiError::invalid_param(name, raw))
}
