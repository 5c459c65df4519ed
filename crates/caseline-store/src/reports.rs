// SPDX-License-Identifier: Apache-2.0

use crate::error::StoreError;
use crate::requests::report_from_row;
use crate::ts_to_sql;
use caseline_model::{
    Report, ReportDetail, ReportDraft, ReportId, ReportKind, ReportStatus, RequestStatus,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

/// A report row plus its kind-specific detail, when one has been filed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRecord {
    pub report: Report,
    pub detail: Option<ReportDetail>,
}

/// Files detail for a report. If the request was opened without a skeleton
/// row for this kind, filing implicitly registers one. Filing twice for the
/// same kind is a conflict.
pub fn file_report(
    conn: &mut Connection,
    draft: &ReportDraft,
    now: DateTime<Utc>,
) -> Result<ReportRecord, StoreError> {
    let kind = draft.detail.kind();
    let tx = conn.transaction()?;

    let request_status: Option<String> = tx
        .query_row(
            "SELECT status FROM requests WHERE id = ?1",
            params![draft.request_id.get()],
            |r| r.get(0),
        )
        .optional()?;
    let request_status = request_status.ok_or(StoreError::NotFound {
        entity: "request",
        id: draft.request_id.get(),
    })?;
    let request_status = RequestStatus::parse(&request_status)
        .map_err(|_| StoreError::Corrupt("request status column"))?;
    if !request_status.is_open() {
        return Err(StoreError::Conflict(format!(
            "cannot file a report against a {} case",
            request_status.as_str()
        )));
    }

    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM reports WHERE request_id = ?1 AND kind = ?2",
            params![draft.request_id.get(), kind.as_str()],
            |r| r.get(0),
        )
        .optional()?;
    let report_id = match existing {
        Some(id) => {
            let filed: i64 = tx.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE report_id = ?1",
                    detail_table(kind)
                ),
                params![id],
                |r| r.get(0),
            )?;
            if filed > 0 {
                return Err(StoreError::Conflict(format!(
                    "{} report already filed for request {}",
                    kind.as_str(),
                    draft.request_id
                )));
            }
            ReportId::new(id)?
        }
        None => {
            tx.execute(
                "INSERT INTO reports(request_id, kind, status) VALUES (?1, ?2, ?3)",
                params![
                    draft.request_id.get(),
                    kind.as_str(),
                    ReportStatus::Pending.as_str()
                ],
            )?;
            ReportId::new(tx.last_insert_rowid())?
        }
    };

    match &draft.detail {
        ReportDetail::Character {
            address,
            police_station,
            remarks_source,
        } => {
            tx.execute(
                "INSERT INTO character_reports(report_id, address, police_station, remarks_source)
                 VALUES (?1, ?2, ?3, ?4)",
                params![report_id.get(), address, police_station, remarks_source],
            )?;
        }
        ReportDetail::Education {
            institution,
            degree,
            year_of_passing,
        } => {
            tx.execute(
                "INSERT INTO education_reports(report_id, institution, degree, year_of_passing)
                 VALUES (?1, ?2, ?3, ?4)",
                params![report_id.get(), institution, degree, year_of_passing],
            )?;
        }
        ReportDetail::Employment {
            employer,
            designation,
            from_date,
            to_date,
        } => {
            tx.execute(
                "INSERT INTO employment_reports(report_id, employer, designation, from_date, to_date)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    report_id.get(),
                    employer,
                    designation,
                    from_date.map(|d| d.to_string()),
                    to_date.map(|d| d.to_string()),
                ],
            )?;
        }
    }

    if let Some(remarks) = &draft.remarks {
        tx.execute(
            "UPDATE reports SET remarks = ?1 WHERE id = ?2",
            params![remarks, report_id.get()],
        )?;
    }
    tx.execute(
        "UPDATE requests SET updated_at = ?1 WHERE id = ?2",
        params![ts_to_sql(now), draft.request_id.get()],
    )?;
    let record = report_record(&tx, report_id)?;
    tx.commit()?;
    Ok(record)
}

pub fn get_report(conn: &Connection, id: ReportId) -> Result<ReportRecord, StoreError> {
    report_record(conn, id)
}

/// Moves a report along its lifecycle; completion stamps `completed_at`.
pub fn update_report_status(
    conn: &mut Connection,
    id: ReportId,
    next: ReportStatus,
    now: DateTime<Utc>,
) -> Result<Report, StoreError> {
    let tx = conn.transaction()?;
    let current_raw: Option<String> = tx
        .query_row(
            "SELECT status FROM reports WHERE id = ?1",
            params![id.get()],
            |r| r.get(0),
        )
        .optional()?;
    let current_raw = current_raw.ok_or(StoreError::NotFound {
        entity: "report",
        id: id.get(),
    })?;
    let current = ReportStatus::parse(&current_raw)
        .map_err(|_| StoreError::Corrupt("report status column"))?;
    if !current.can_transition_to(next) {
        return Err(StoreError::IllegalTransition {
            entity: "report",
            from: current.as_str(),
            to: next.as_str(),
        });
    }

    let completed_at = (next == ReportStatus::Completed).then(|| ts_to_sql(now));
    let changed = tx.execute(
        "UPDATE reports SET status = ?1, completed_at = COALESCE(?2, completed_at)
         WHERE id = ?3 AND status = ?4",
        params![next.as_str(), completed_at, id.get(), current.as_str()],
    )?;
    if changed == 0 {
        return Err(StoreError::Conflict(
            "report status changed concurrently".to_string(),
        ));
    }
    let report = report_row(&tx, id)?;
    tx.commit()?;
    Ok(report)
}

const fn detail_table(kind: ReportKind) -> &'static str {
    match kind {
        ReportKind::Character => "character_reports",
        ReportKind::Education => "education_reports",
        ReportKind::Employment => "employment_reports",
    }
}

fn report_row(conn: &Connection, id: ReportId) -> Result<Report, StoreError> {
    let row = conn
        .query_row(
            "SELECT id, request_id, kind, status, remarks, completed_at
             FROM reports WHERE id = ?1",
            params![id.get()],
            report_from_row,
        )
        .optional()?;
    row.ok_or(StoreError::NotFound {
        entity: "report",
        id: id.get(),
    })?
}

fn report_record(conn: &Connection, id: ReportId) -> Result<ReportRecord, StoreError> {
    let report = report_row(conn, id)?;
    let detail = match report.kind {
        ReportKind::Character => conn
            .query_row(
                "SELECT address, police_station, remarks_source
                 FROM character_reports WHERE report_id = ?1",
                params![id.get()],
                |r| {
                    Ok(ReportDetail::Character {
                        address: r.get(0)?,
                        police_station: r.get(1)?,
                        remarks_source: r.get(2)?,
                    })
                },
            )
            .optional()?,
        ReportKind::Education => conn
            .query_row(
                "SELECT institution, degree, year_of_passing
                 FROM education_reports WHERE report_id = ?1",
                params![id.get()],
                |r| {
                    Ok(ReportDetail::Education {
                        institution: r.get(0)?,
                        degree: r.get(1)?,
                        year_of_passing: r.get(2)?,
                    })
                },
            )
            .optional()?,
        ReportKind::Employment => {
            let row = conn
                .query_row(
                    "SELECT employer, designation, from_date, to_date
                     FROM employment_reports WHERE report_id = ?1",
                    params![id.get()],
                    |r| {
                        Ok((
                            r.get::<_, String>(0)?,
                            r.get::<_, String>(1)?,
                            r.get::<_, Option<String>>(2)?,
                            r.get::<_, Option<String>>(3)?,
                        ))
                    },
                )
                .optional()?;
            match row {
                Some((employer, designation, from_date, to_date)) => {
                    Some(ReportDetail::Employment {
                        employer,
                        designation,
                        from_date: from_date.as_deref().map(parse_date).transpose()?,
                        to_date: to_date.as_deref().map(parse_date).transpose()?,
                    })
                }
                None => None,
            }
        }
    };
    Ok(ReportRecord { report, detail })
}

fn parse_date(raw: &str) -> Result<NaiveDate, StoreError> {
    raw.parse::<NaiveDate>()
        .map_err(|_| StoreError::Corrupt("date column is not ISO 8601"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_db;
    use caseline_model::{EmployeeDraft, RequestDraft};

    fn now() -> DateTime<Utc> {
        "2026-08-27T11:30:00Z".parse().expect("ts")
    }

    fn open_case(conn: &mut Connection, kinds: Vec<ReportKind>) -> crate::CaseRecord {
        let draft = RequestDraft::new(
            EmployeeDraft::new("M. Iyer", None, None).expect("employee"),
            kinds,
        )
        .expect("draft");
        crate::create_request(conn, &draft, now()).expect("create")
    }

    fn character_detail() -> ReportDetail {
        ReportDetail::Character {
            address: "4 Lake View".to_string(),
            police_station: Some("Kothrud".to_string()),
            remarks_source: None,
        }
    }

    #[test]
    fn filing_attaches_detail_to_the_skeleton_report() {
        let mut conn = memory_db();
        let case = open_case(&mut conn, vec![ReportKind::Character]);
        let skeleton_id = case.reports[0].id;

        let draft = ReportDraft::new(case.request.id, character_detail(), None).expect("draft");
        let filed = file_report(&mut conn, &draft, now()).expect("file");
        assert_eq!(filed.report.id, skeleton_id);
        assert_eq!(filed.detail, Some(character_detail()));
    }

    #[test]
    fn filing_an_unregistered_kind_creates_the_report() {
        let mut conn = memory_db();
        let case = open_case(&mut conn, vec![]);
        let detail = ReportDetail::Education {
            institution: "Fergusson College".to_string(),
            degree: "BSc".to_string(),
            year_of_passing: Some(2014),
        };
        let draft = ReportDraft::new(case.request.id, detail, None).expect("draft");
        let filed = file_report(&mut conn, &draft, now()).expect("file");
        assert_eq!(filed.report.kind, ReportKind::Education);
        assert_eq!(filed.report.status, ReportStatus::Pending);
    }

    #[test]
    fn double_filing_is_a_conflict() {
        let mut conn = memory_db();
        let case = open_case(&mut conn, vec![ReportKind::Character]);
        let draft = ReportDraft::new(case.request.id, character_detail(), None).expect("draft");
        file_report(&mut conn, &draft, now()).expect("first");
        let err = file_report(&mut conn, &draft, now()).expect_err("second must conflict");
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn report_completion_stamps_completed_at() {
        let mut conn = memory_db();
        let case = open_case(&mut conn, vec![ReportKind::Character]);
        let id = case.reports[0].id;
        update_report_status(&mut conn, id, ReportStatus::InProgress, now()).expect("start");
        let done =
            update_report_status(&mut conn, id, ReportStatus::Completed, now()).expect("finish");
        assert_eq!(done.status, ReportStatus::Completed);
        assert_eq!(done.completed_at, Some(now()));
    }

    #[test]
    fn hold_cannot_jump_to_completed() {
        let mut conn = memory_db();
        let case = open_case(&mut conn, vec![ReportKind::Employment]);
        let id = case.reports[0].id;
        update_report_status(&mut conn, id, ReportStatus::InProgress, now()).expect("start");
        update_report_status(&mut conn, id, ReportStatus::OnHold, now()).expect("hold");
        let err = update_report_status(&mut conn, id, ReportStatus::Completed, now())
            .expect_err("hold -> completed is illegal");
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
    }

    #[test]
    fn employment_detail_round_trips_dates() {
        let mut conn = memory_db();
        let case = open_case(&mut conn, vec![]);
        let detail = ReportDetail::Employment {
            employer: "Acme Ltd".to_string(),
            designation: "Accountant".to_string(),
            from_date: NaiveDate::from_ymd_opt(2019, 4, 1),
            to_date: NaiveDate::from_ymd_opt(2023, 3, 31),
        };
        let draft = ReportDraft::new(case.request.id, detail.clone(), Some("ok".to_string()))
            .expect("draft");
        let filed = file_report(&mut conn, &draft, now()).expect("file");
        let fetched = get_report(&conn, filed.report.id).expect("get");
        assert_eq!(fetched.detail, Some(detail));
        assert_eq!(fetched.report.remarks.as_deref(), Some("ok"));
    }
}
