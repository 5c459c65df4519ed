#![forbid(unsafe_code)]
//! SQLite persistence for caseline.
//!
//! Every function here is a pure operation over a borrowed
//! [`rusqlite::Connection`]; connection lifecycle, pooling, and blocking-task
//! placement belong to the caller. All SQL is parameterized, and list
//! endpoints paginate with HMAC-signed keyset cursors so a cursor can neither
//! be forged nor replayed against a different filter set.

mod cursor;
mod error;
mod reports;
mod requests;
mod schema;
mod search;
mod verifiers;

pub use cursor::{decode_cursor, encode_cursor, CursorPayload, MAX_CURSOR_BYTES};
pub use error::StoreError;
pub use reports::{file_report, get_report, update_report_status, ReportRecord};
pub use requests::{
    assign_verifier, count_requests_by_status, create_request, get_request, update_request_status,
    CaseRecord,
};
pub use schema::{configure_connection, migrate, open_database, SCHEMA_VERSION};
pub use search::{
    classify_search, list_pending, search_requests, CaseSummary, QueryClass, QueryLimits,
    SearchFilter, SearchPage, SearchQuery,
};
pub use verifiers::{
    get_verifier, insert_verifier, list_verifiers, set_verifier_active, verifier_workload,
    VerifierWorkload,
};

pub const CRATE_NAME: &str = "caseline-store";

use chrono::{DateTime, SecondsFormat, Utc};

/// RFC 3339 UTC with fixed microsecond width so that lexicographic order in
/// SQLite TEXT columns equals chronological order.
pub(crate) fn ts_to_sql(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn ts_from_sql(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| StoreError::Corrupt("timestamp column is not RFC 3339"))
}

#[cfg(test)]
pub(crate) mod test_support {
    use rusqlite::Connection;

    pub(crate) fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        crate::configure_connection(&conn).expect("configure");
        crate::migrate(&conn).expect("migrate");
        conn
    }
}
