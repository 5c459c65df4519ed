// SPDX-License-Identifier: Apache-2.0

use crate::error::StoreError;
use caseline_model::{Email, PersonName, Verifier, VerifierDraft, VerifierId};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

/// Per-status case counts for one verifier's open book of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifierWorkload {
    pub verifier: Verifier,
    pub received: u64,
    pub in_progress: u64,
    pub on_hold: u64,
    pub completed: u64,
    pub closed: u64,
}

pub fn insert_verifier(conn: &Connection, draft: &VerifierDraft) -> Result<VerifierId, StoreError> {
    conn.execute(
        "INSERT INTO verifiers(name, email, active) VALUES (?1, ?2, 1)",
        params![draft.name.as_str(), draft.email.as_str()],
    )
    .map_err(|err| StoreError::from(err).normalize())?;
    Ok(VerifierId::new(conn.last_insert_rowid())?)
}

pub fn get_verifier(conn: &Connection, id: VerifierId) -> Result<Verifier, StoreError> {
    let row = conn
        .query_row(
            "SELECT id, name, email, active FROM verifiers WHERE id = ?1",
            params![id.get()],
            verifier_from_row,
        )
        .optional()?;
    row.ok_or(StoreError::NotFound {
        entity: "verifier",
        id: id.get(),
    })?
}

/// Active verifiers first, then by name; deactivated ones stay listed so old
/// cases still resolve their assignee.
pub fn list_verifiers(conn: &Connection) -> Result<Vec<Verifier>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, email, active FROM verifiers ORDER BY active DESC, name ASC, id ASC",
    )?;
    let rows = stmt.query_map([], verifier_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row??);
    }
    Ok(out)
}

pub fn set_verifier_active(
    conn: &Connection,
    id: VerifierId,
    active: bool,
) -> Result<Verifier, StoreError> {
    let changed = conn.execute(
        "UPDATE verifiers SET active = ?1 WHERE id = ?2",
        params![i64::from(active), id.get()],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound {
            entity: "verifier",
            id: id.get(),
        });
    }
    get_verifier(conn, id)
}

pub fn verifier_workload(
    conn: &Connection,
    id: VerifierId,
) -> Result<VerifierWorkload, StoreError> {
    let verifier = get_verifier(conn, id)?;
    let mut workload = VerifierWorkload {
        verifier,
        received: 0,
        in_progress: 0,
        on_hold: 0,
        completed: 0,
        closed: 0,
    };
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) FROM requests WHERE verifier_id = ?1 GROUP BY status",
    )?;
    let rows = stmt.query_map(params![id.get()], |r| {
        Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
    })?;
    for row in rows {
        let (status, count) = row?;
        let count = u64::try_from(count).unwrap_or(0);
        match status.as_str() {
            "received" => workload.received = count,
            "in_progress" => workload.in_progress = count,
            "on_hold" => workload.on_hold = count,
            "completed" => workload.completed = count,
            "closed" => workload.closed = count,
            _ => return Err(StoreError::Corrupt("request status column")),
        }
    }
    Ok(workload)
}

fn verifier_from_row(row: &Row<'_>) -> rusqlite::Result<Result<Verifier, StoreError>> {
    let id: i64 = row.get(0)?;
    let name: String = row.get(1)?;
    let email: String = row.get(2)?;
    let active: i64 = row.get(3)?;
    Ok(build_verifier(id, &name, &email, active != 0))
}

fn build_verifier(id: i64, name: &str, email: &str, active: bool) -> Result<Verifier, StoreError> {
    Ok(Verifier {
        id: VerifierId::new(id)?,
        name: PersonName::parse(name).map_err(|_| StoreError::Corrupt("verifier name column"))?,
        email: Email::parse(email).map_err(|_| StoreError::Corrupt("verifier email column"))?,
        active,
    })
}
