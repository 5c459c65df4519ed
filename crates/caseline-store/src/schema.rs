// SPDX-License-Identifier: Apache-2.0

use crate::error::StoreError;
use rusqlite::Connection;
use std::path::Path;

pub const SCHEMA_VERSION: i64 = 1;

const MIGRATION_V1: &str = "
CREATE TABLE employees (
    id          INTEGER PRIMARY KEY,
    name        TEXT NOT NULL,
    email       TEXT,
    designation TEXT
);
CREATE INDEX idx_employees_name ON employees(name);

CREATE TABLE verifiers (
    id     INTEGER PRIMARY KEY,
    name   TEXT NOT NULL,
    email  TEXT NOT NULL UNIQUE,
    active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE requests (
    id          INTEGER PRIMARY KEY,
    case_number TEXT NOT NULL UNIQUE,
    employee_id INTEGER NOT NULL REFERENCES employees(id),
    verifier_id INTEGER REFERENCES verifiers(id),
    status      TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX idx_requests_status_created ON requests(status, created_at, id);
CREATE INDEX idx_requests_created ON requests(created_at, id);
CREATE INDEX idx_requests_verifier ON requests(verifier_id);

CREATE TABLE reports (
    id           INTEGER PRIMARY KEY,
    request_id   INTEGER NOT NULL REFERENCES requests(id),
    kind         TEXT NOT NULL,
    status       TEXT NOT NULL,
    remarks      TEXT,
    completed_at TEXT,
    UNIQUE(request_id, kind)
);
CREATE INDEX idx_reports_request ON reports(request_id);

CREATE TABLE character_reports (
    report_id      INTEGER PRIMARY KEY REFERENCES reports(id),
    address        TEXT NOT NULL,
    police_station TEXT,
    remarks_source TEXT
);

CREATE TABLE education_reports (
    report_id       INTEGER PRIMARY KEY REFERENCES reports(id),
    institution     TEXT NOT NULL,
    degree          TEXT NOT NULL,
    year_of_passing INTEGER
);

CREATE TABLE employment_reports (
    report_id   INTEGER PRIMARY KEY REFERENCES reports(id),
    employer    TEXT NOT NULL,
    designation TEXT NOT NULL,
    from_date   TEXT,
    to_date     TEXT
);
";

/// Per-connection pragmas. Applied to every connection the service opens,
/// including in-memory test databases.
pub fn configure_connection(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(())
}

/// Idempotent migration driven by `PRAGMA user_version`.
pub fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    if current >= SCHEMA_VERSION {
        return Ok(());
    }
    if current < 1 {
        conn.execute_batch(MIGRATION_V1)?;
    }
    conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))?;
    Ok(())
}

/// Open (creating if absent) and migrate the database at `path`. WAL keeps
/// readers unblocked while the single writer commits.
pub fn open_database(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    let _: String = conn.query_row("PRAGMA journal_mode = WAL", [], |r| r.get(0))?;
    configure_connection(&conn)?;
    migrate(&conn)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_db;

    #[test]
    fn migrate_is_idempotent() {
        let conn = memory_db();
        migrate(&conn).expect("second run is a no-op");
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .expect("user_version");
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn open_database_migrates_and_enables_wal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("caseline.sqlite");
        {
            let conn = open_database(&path).expect("first open");
            let mode: String = conn
                .query_row("PRAGMA journal_mode", [], |r| r.get(0))
                .expect("journal_mode");
            assert_eq!(mode.to_lowercase(), "wal");
        }
        let conn = open_database(&path).expect("reopen");
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .expect("user_version");
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn foreign_keys_are_enforced() {
        let conn = memory_db();
        let err = conn.execute(
            "INSERT INTO requests(case_number, employee_id, status, created_at, updated_at)
             VALUES ('VR-000001', 999, 'received', 't', 't')",
            [],
        );
        assert!(err.is_err(), "dangling employee_id must be rejected");
    }

    #[test]
    fn report_kind_is_unique_per_request() {
        let conn = memory_db();
        conn.execute("INSERT INTO employees(name) VALUES ('E')", [])
            .expect("employee");
        conn.execute(
            "INSERT INTO requests(case_number, employee_id, status, created_at, updated_at)
             VALUES ('VR-000001', 1, 'received', 't', 't')",
            [],
        )
        .expect("request");
        conn.execute(
            "INSERT INTO reports(request_id, kind, status) VALUES (1, 'character', 'pending')",
            [],
        )
        .expect("first report");
        let dup = conn.execute(
            "INSERT INTO reports(request_id, kind, status) VALUES (1, 'character', 'pending')",
            [],
        );
        assert!(dup.is_err(), "duplicate kind for one request must fail");
    }
}
