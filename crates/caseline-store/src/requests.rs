// SPDX-License-Identifier: Apache-2.0

use crate::error::StoreError;
use crate::{ts_from_sql, ts_to_sql};
use caseline_model::{
    format_case_number, Email, Employee, EmployeeId, PersonName, Report, ReportId, ReportKind,
    ReportStatus, RequestDraft, RequestId, RequestStatus, VerificationRequest, Verifier,
    VerifierId,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

/// A request joined with everything the case view needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseRecord {
    pub request: VerificationRequest,
    pub employee: Employee,
    pub verifier: Option<Verifier>,
    pub reports: Vec<Report>,
}

/// Opens a new case: employee row, request row with an allocated case
/// number, and one skeleton report per requested kind, in one transaction.
pub fn create_request(
    conn: &mut Connection,
    draft: &RequestDraft,
    now: DateTime<Utc>,
) -> Result<CaseRecord, StoreError> {
    let tx = conn.transaction()?;
    let ts = ts_to_sql(now);

    tx.execute(
        "INSERT INTO employees(name, email, designation) VALUES (?1, ?2, ?3)",
        params![
            draft.employee.name.as_str(),
            draft.employee.email.as_ref().map(Email::as_str),
            draft.employee.designation.as_deref(),
        ],
    )?;
    let employee_id = EmployeeId::new(tx.last_insert_rowid())?;

    // Single-writer discipline makes MAX(id)+1 race-free inside the
    // transaction, so the case number can be derived before the insert.
    let next_id: i64 =
        tx.query_row("SELECT COALESCE(MAX(id), 0) + 1 FROM requests", [], |r| {
            r.get(0)
        })?;
    let request_id = RequestId::new(next_id)?;
    let case_number = format_case_number(request_id);

    tx.execute(
        "INSERT INTO requests(id, case_number, employee_id, verifier_id, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, NULL, ?4, ?5, ?5)",
        params![
            request_id.get(),
            case_number,
            employee_id.get(),
            RequestStatus::Received.as_str(),
            ts,
        ],
    )?;

    let mut reports = Vec::with_capacity(draft.report_kinds.len());
    for kind in &draft.report_kinds {
        tx.execute(
            "INSERT INTO reports(request_id, kind, status) VALUES (?1, ?2, ?3)",
            params![request_id.get(), kind.as_str(), ReportStatus::Pending.as_str()],
        )?;
        reports.push(Report {
            id: ReportId::new(tx.last_insert_rowid())?,
            request_id,
            kind: *kind,
            status: ReportStatus::Pending,
            remarks: None,
            completed_at: None,
        });
    }
    tx.commit()?;

    Ok(CaseRecord {
        request: VerificationRequest {
            id: request_id,
            case_number,
            employee_id,
            verifier_id: None,
            status: RequestStatus::Received,
            created_at: now,
            updated_at: now,
        },
        employee: Employee {
            id: employee_id,
            name: draft.employee.name.clone(),
            email: draft.employee.email.clone(),
            designation: draft.employee.designation.clone(),
        },
        verifier: None,
        reports,
    })
}

pub fn get_request(conn: &Connection, id: RequestId) -> Result<CaseRecord, StoreError> {
    let row = conn
        .query_row(
            "SELECT r.id, r.case_number, r.employee_id, r.verifier_id, r.status,
                    r.created_at, r.updated_at,
                    e.name, e.email, e.designation,
                    v.name, v.email, v.active
             FROM requests r
             JOIN employees e ON e.id = r.employee_id
             LEFT JOIN verifiers v ON v.id = r.verifier_id
             WHERE r.id = ?1",
            params![id.get()],
            case_head_from_row,
        )
        .optional()?;
    let (request, employee, verifier) = row.ok_or(StoreError::NotFound {
        entity: "request",
        id: id.get(),
    })??;

    let mut stmt = conn.prepare(
        "SELECT id, request_id, kind, status, remarks, completed_at
         FROM reports WHERE request_id = ?1 ORDER BY kind ASC",
    )?;
    let reports = stmt
        .query_map(params![id.get()], report_from_row)?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CaseRecord {
        request,
        employee,
        verifier,
        reports,
    })
}

/// Moves a request along its lifecycle. The guard is enforced twice: once
/// against the status read inside the transaction, and again in the UPDATE's
/// WHERE clause.
pub fn update_request_status(
    conn: &mut Connection,
    id: RequestId,
    next: RequestStatus,
    now: DateTime<Utc>,
) -> Result<VerificationRequest, StoreError> {
    let tx = conn.transaction()?;
    let current_raw: Option<String> = tx
        .query_row(
            "SELECT status FROM requests WHERE id = ?1",
            params![id.get()],
            |r| r.get(0),
        )
        .optional()?;
    let current_raw = current_raw.ok_or(StoreError::NotFound {
        entity: "request",
        id: id.get(),
    })?;
    let current = RequestStatus::parse(&current_raw)
        .map_err(|_| StoreError::Corrupt("request status column"))?;

    if !current.can_transition_to(next) {
        return Err(StoreError::IllegalTransition {
            entity: "request",
            from: current.as_str(),
            to: next.as_str(),
        });
    }
    if next == RequestStatus::Completed {
        let outstanding: i64 = tx.query_row(
            "SELECT COUNT(*) FROM reports WHERE request_id = ?1 AND status != ?2",
            params![id.get(), ReportStatus::Completed.as_str()],
            |r| r.get(0),
        )?;
        if outstanding > 0 {
            return Err(StoreError::Conflict(format!(
                "request has {outstanding} incomplete report(s)"
            )));
        }
    }

    let changed = tx.execute(
        "UPDATE requests SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
        params![next.as_str(), ts_to_sql(now), id.get(), current.as_str()],
    )?;
    if changed == 0 {
        return Err(StoreError::Conflict(
            "request status changed concurrently".to_string(),
        ));
    }
    let request = request_row(&tx, id)?;
    tx.commit()?;
    Ok(request)
}

/// Assigns an active verifier to an open case.
pub fn assign_verifier(
    conn: &mut Connection,
    id: RequestId,
    verifier_id: VerifierId,
    now: DateTime<Utc>,
) -> Result<VerificationRequest, StoreError> {
    let tx = conn.transaction()?;
    let active: Option<bool> = tx
        .query_row(
            "SELECT active FROM verifiers WHERE id = ?1",
            params![verifier_id.get()],
            |r| r.get(0),
        )
        .optional()?;
    match active {
        None => {
            return Err(StoreError::NotFound {
                entity: "verifier",
                id: verifier_id.get(),
            })
        }
        Some(false) => {
            return Err(StoreError::Conflict(format!(
                "verifier {verifier_id} is inactive"
            )))
        }
        Some(true) => {}
    }

    let current = request_row(&tx, id)?;
    if !current.status.is_open() {
        return Err(StoreError::Conflict(format!(
            "cannot assign a verifier to a {} case",
            current.status.as_str()
        )));
    }
    tx.execute(
        "UPDATE requests SET verifier_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![verifier_id.get(), ts_to_sql(now), id.get()],
    )?;
    let request = request_row(&tx, id)?;
    tx.commit()?;
    Ok(request)
}

pub fn count_requests_by_status(
    conn: &Connection,
) -> Result<Vec<(RequestStatus, u64)>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT status, COUNT(*) FROM requests GROUP BY status ORDER BY status")?;
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(raw, count)| {
            let status = RequestStatus::parse(&raw)
                .map_err(|_| StoreError::Corrupt("request status column"))?;
            Ok((status, count as u64))
        })
        .collect()
}

fn request_row(conn: &Connection, id: RequestId) -> Result<VerificationRequest, StoreError> {
    let row = conn
        .query_row(
            "SELECT id, case_number, employee_id, verifier_id, status, created_at, updated_at
             FROM requests WHERE id = ?1",
            params![id.get()],
            |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, i64>(2)?,
                    r.get::<_, Option<i64>>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                    r.get::<_, String>(6)?,
                ))
            },
        )
        .optional()?;
    let (id_raw, case_number, employee_id, verifier_id, status, created_at, updated_at) =
        row.ok_or(StoreError::NotFound {
            entity: "request",
            id: id.get(),
        })?;
    Ok(VerificationRequest {
        id: RequestId::new(id_raw)?,
        case_number,
        employee_id: EmployeeId::new(employee_id)?,
        verifier_id: verifier_id.map(VerifierId::new).transpose()?,
        status: RequestStatus::parse(&status)
            .map_err(|_| StoreError::Corrupt("request status column"))?,
        created_at: ts_from_sql(&created_at)?,
        updated_at: ts_from_sql(&updated_at)?,
    })
}

type CaseHead = (VerificationRequest, Employee, Option<Verifier>);

#[allow(clippy::type_complexity)]
fn case_head_from_row(r: &Row<'_>) -> rusqlite::Result<Result<CaseHead, StoreError>> {
    let id: i64 = r.get(0)?;
    let case_number: String = r.get(1)?;
    let employee_id: i64 = r.get(2)?;
    let verifier_id: Option<i64> = r.get(3)?;
    let status: String = r.get(4)?;
    let created_at: String = r.get(5)?;
    let updated_at: String = r.get(6)?;
    let emp_name: String = r.get(7)?;
    let emp_email: Option<String> = r.get(8)?;
    let emp_designation: Option<String> = r.get(9)?;
    let ver_name: Option<String> = r.get(10)?;
    let ver_email: Option<String> = r.get(11)?;
    let ver_active: Option<bool> = r.get(12)?;

    Ok(build_case_head(
        id,
        case_number,
        employee_id,
        verifier_id,
        status,
        created_at,
        updated_at,
        emp_name,
        emp_email,
        emp_designation,
        ver_name,
        ver_email,
        ver_active,
    ))
}

#[allow(clippy::too_many_arguments)]
fn build_case_head(
    id: i64,
    case_number: String,
    employee_id: i64,
    verifier_id: Option<i64>,
    status: String,
    created_at: String,
    updated_at: String,
    emp_name: String,
    emp_email: Option<String>,
    emp_designation: Option<String>,
    ver_name: Option<String>,
    ver_email: Option<String>,
    ver_active: Option<bool>,
) -> Result<CaseHead, StoreError> {
    let request = VerificationRequest {
        id: RequestId::new(id)?,
        case_number,
        employee_id: EmployeeId::new(employee_id)?,
        verifier_id: verifier_id.map(VerifierId::new).transpose()?,
        status: RequestStatus::parse(&status)
            .map_err(|_| StoreError::Corrupt("request status column"))?,
        created_at: ts_from_sql(&created_at)?,
        updated_at: ts_from_sql(&updated_at)?,
    };
    let employee = Employee {
        id: request.employee_id,
        name: PersonName::parse(&emp_name).map_err(|_| StoreError::Corrupt("employee name"))?,
        email: emp_email
            .as_deref()
            .map(Email::parse)
            .transpose()
            .map_err(|_| StoreError::Corrupt("employee email"))?,
        designation: emp_designation,
    };
    let verifier = match (request.verifier_id, ver_name, ver_email, ver_active) {
        (Some(vid), Some(name), Some(email), Some(active)) => Some(Verifier {
            id: vid,
            name: PersonName::parse(&name).map_err(|_| StoreError::Corrupt("verifier name"))?,
            email: Email::parse(&email).map_err(|_| StoreError::Corrupt("verifier email"))?,
            active,
        }),
        _ => None,
    };
    Ok((request, employee, verifier))
}

pub(crate) fn report_from_row(r: &Row<'_>) -> rusqlite::Result<Result<Report, StoreError>> {
    let id: i64 = r.get(0)?;
    let request_id: i64 = r.get(1)?;
    let kind: String = r.get(2)?;
    let status: String = r.get(3)?;
    let remarks: Option<String> = r.get(4)?;
    let completed_at: Option<String> = r.get(5)?;
    Ok(build_report(id, request_id, kind, status, remarks, completed_at))
}

fn build_report(
    id: i64,
    request_id: i64,
    kind: String,
    status: String,
    remarks: Option<String>,
    completed_at: Option<String>,
) -> Result<Report, StoreError> {
    Ok(Report {
        id: ReportId::new(id)?,
        request_id: RequestId::new(request_id)?,
        kind: ReportKind::parse(&kind).map_err(|_| StoreError::Corrupt("report kind column"))?,
        status: ReportStatus::parse(&status)
            .map_err(|_| StoreError::Corrupt("report status column"))?,
        remarks,
        completed_at: completed_at.as_deref().map(ts_from_sql).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_db;
    use caseline_model::EmployeeDraft;

    fn sample_draft(kinds: Vec<ReportKind>) -> RequestDraft {
        RequestDraft::new(
            EmployeeDraft::new("Asha Rao", Some("asha@example.org"), Some("Analyst"))
                .expect("employee"),
            kinds,
        )
        .expect("draft")
    }

    fn now() -> DateTime<Utc> {
        "2026-08-27T09:00:00Z".parse().expect("ts")
    }

    #[test]
    fn create_then_get_round_trips_the_case() {
        let mut conn = memory_db();
        let created = create_request(
            &mut conn,
            &sample_draft(vec![ReportKind::Character, ReportKind::Education]),
            now(),
        )
        .expect("create");
        assert_eq!(created.request.case_number, "VR-000001");
        assert_eq!(created.reports.len(), 2);

        let fetched = get_request(&conn, created.request.id).expect("get");
        assert_eq!(fetched, created);
    }

    #[test]
    fn missing_request_is_not_found() {
        let conn = memory_db();
        let err = get_request(&conn, RequestId::new(99).expect("id")).expect_err("missing");
        assert!(matches!(err, StoreError::NotFound { entity: "request", id: 99 }));
    }

    #[test]
    fn case_numbers_are_sequential_across_requests() {
        let mut conn = memory_db();
        let first = create_request(&mut conn, &sample_draft(vec![]), now()).expect("first");
        let second = create_request(&mut conn, &sample_draft(vec![]), now()).expect("second");
        assert_eq!(first.request.case_number, "VR-000001");
        assert_eq!(second.request.case_number, "VR-000002");
    }

    #[test]
    fn status_walk_respects_the_transition_table() {
        let mut conn = memory_db();
        let case = create_request(&mut conn, &sample_draft(vec![]), now()).expect("create");
        let id = case.request.id;

        let err = update_request_status(&mut conn, id, RequestStatus::Completed, now())
            .expect_err("received cannot complete directly");
        assert!(matches!(err, StoreError::IllegalTransition { .. }));

        let r = update_request_status(&mut conn, id, RequestStatus::InProgress, now())
            .expect("received -> in_progress");
        assert_eq!(r.status, RequestStatus::InProgress);
        update_request_status(&mut conn, id, RequestStatus::Completed, now())
            .expect("no reports outstanding, may complete");
    }

    #[test]
    fn completion_is_blocked_by_outstanding_reports() {
        let mut conn = memory_db();
        let case = create_request(&mut conn, &sample_draft(vec![ReportKind::Character]), now())
            .expect("create");
        let id = case.request.id;
        update_request_status(&mut conn, id, RequestStatus::InProgress, now()).expect("start");
        let err = update_request_status(&mut conn, id, RequestStatus::Completed, now())
            .expect_err("pending character report must block completion");
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn assignment_requires_an_active_verifier() {
        let mut conn = memory_db();
        let case = create_request(&mut conn, &sample_draft(vec![]), now()).expect("create");
        let vid = crate::insert_verifier(
            &conn,
            &caseline_model::VerifierDraft::new("V. Kulkarni", "vk@example.org").expect("draft"),
        )
        .expect("verifier");

        let assigned =
            assign_verifier(&mut conn, case.request.id, vid, now()).expect("assign active");
        assert_eq!(assigned.verifier_id, Some(vid));

        crate::set_verifier_active(&conn, vid, false).expect("deactivate");
        let err = assign_verifier(&mut conn, case.request.id, vid, now())
            .expect_err("inactive verifier cannot be assigned");
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn counts_group_by_status() {
        let mut conn = memory_db();
        let a = create_request(&mut conn, &sample_draft(vec![]), now()).expect("a");
        let _b = create_request(&mut conn, &sample_draft(vec![]), now()).expect("b");
        update_request_status(&mut conn, a.request.id, RequestStatus::InProgress, now())
            .expect("advance");
        let counts = count_requests_by_status(&conn).expect("counts");
        assert!(counts.contains(&(RequestStatus::Received, 1)));
        assert!(counts.contains(&(RequestStatus::InProgress, 1)));
    }
}
