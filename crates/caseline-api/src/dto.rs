// SPDX-License-Identifier: Apache-2.0

use crate::errors::ApiError;
use caseline_model::{
    Employee, EmployeeDraft, Report, ReportDetail, ReportDraft, ReportKind, ReportStatus,
    RequestDraft, RequestId, RequestStatus, Verifier, VerifierDraft, VerifierId,
};
use caseline_store::{CaseRecord, CaseSummary, ReportRecord, VerifierWorkload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const API_VERSION: &str = "v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmployeeView {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub designation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifierView {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportView {
    pub id: i64,
    pub request_id: i64,
    pub kind: ReportKind,
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// The full case view: request head, its employee, the assigned verifier when
/// one exists, and every report row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseView {
    pub id: i64,
    pub case_number: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub employee: EmployeeView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifier: Option<VerifierView>,
    pub reports: Vec<ReportView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportRecordView {
    pub report: ReportView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<ReportDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseSummaryView {
    pub id: i64,
    pub case_number: String,
    pub employee_name: String,
    pub status: RequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifier_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub reports_total: u64,
    pub reports_completed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PageCursorView {
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CasePageView {
    pub api_version: String,
    pub page: PageCursorView,
    pub rows: Vec<CaseSummaryView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkloadView {
    pub verifier: VerifierView,
    pub received: u64,
    pub in_progress: u64,
    pub on_hold: u64,
    pub completed: u64,
    pub closed: u64,
}

impl From<&Employee> for EmployeeView {
    fn from(e: &Employee) -> Self {
        Self {
            id: e.id.get(),
            name: e.name.as_str().to_string(),
            email: e.email.as_ref().map(|m| m.as_str().to_string()),
            designation: e.designation.clone(),
        }
    }
}

impl From<&Verifier> for VerifierView {
    fn from(v: &Verifier) -> Self {
        Self {
            id: v.id.get(),
            name: v.name.as_str().to_string(),
            email: v.email.as_str().to_string(),
            active: v.active,
        }
    }
}

impl From<&Report> for ReportView {
    fn from(r: &Report) -> Self {
        Self {
            id: r.id.get(),
            request_id: r.request_id.get(),
            kind: r.kind,
            status: r.status,
            remarks: r.remarks.clone(),
            completed_at: r.completed_at,
        }
    }
}

impl From<&CaseRecord> for CaseView {
    fn from(record: &CaseRecord) -> Self {
        Self {
            id: record.request.id.get(),
            case_number: record.request.case_number.clone(),
            status: record.request.status,
            created_at: record.request.created_at,
            updated_at: record.request.updated_at,
            employee: EmployeeView::from(&record.employee),
            verifier: record.verifier.as_ref().map(VerifierView::from),
            reports: record.reports.iter().map(ReportView::from).collect(),
        }
    }
}

impl From<&ReportRecord> for ReportRecordView {
    fn from(record: &ReportRecord) -> Self {
        Self {
            report: ReportView::from(&record.report),
            detail: record.detail.clone(),
        }
    }
}

impl From<&CaseSummary> for CaseSummaryView {
    fn from(s: &CaseSummary) -> Self {
        Self {
            id: s.id.get(),
            case_number: s.case_number.clone(),
            employee_name: s.employee_name.clone(),
            status: s.status,
            verifier_id: s.verifier_id.map(VerifierId::get),
            created_at: s.created_at,
            reports_total: s.reports_total,
            reports_completed: s.reports_completed,
        }
    }
}

impl From<&VerifierWorkload> for WorkloadView {
    fn from(w: &VerifierWorkload) -> Self {
        Self {
            verifier: VerifierView::from(&w.verifier),
            received: w.received,
            in_progress: w.in_progress,
            on_hold: w.on_hold,
            completed: w.completed,
            closed: w.closed,
        }
    }
}

#[must_use]
pub fn case_page_view(rows: &[CaseSummary], next_cursor: Option<String>) -> CasePageView {
    CasePageView {
        api_version: API_VERSION.to_string(),
        page: PageCursorView { next_cursor },
        rows: rows.iter().map(CaseSummaryView::from).collect(),
    }
}

// ---- request bodies -------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmployeeBody {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub designation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRequestBody {
    pub employee: EmployeeBody,
    #[serde(default)]
    pub report_kinds: Vec<ReportKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestStatusBody {
    pub status: RequestStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportStatusBody {
    pub status: ReportStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssignBody {
    pub verifier_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileReportBody {
    pub detail: ReportDetail,
    #[serde(default)]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateVerifierBody {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetActiveBody {
    pub active: bool,
}

impl CreateRequestBody {
    /// Validates into the storage draft; each field failure becomes one entry
    /// in the `field_errors` detail array.
    pub fn into_draft(self) -> Result<RequestDraft, ApiError> {
        let employee = EmployeeDraft::new(
            &self.employee.name,
            self.employee.email.as_deref(),
            self.employee.designation.as_deref(),
        )
        .map_err(|e| ApiError::validation_failed(json!([{"reason": e.to_string()}])))?;
        RequestDraft::new(employee, self.report_kinds)
            .map_err(|e| ApiError::validation_failed(json!([{"reason": e.to_string()}])))
    }
}

impl FileReportBody {
    pub fn into_draft(self, request_id: RequestId) -> Result<ReportDraft, ApiError> {
        ReportDraft::new(request_id, self.detail, self.remarks)
            .map_err(|e| ApiError::validation_failed(json!([{"reason": e.to_string()}])))
    }
}

impl CreateVerifierBody {
    pub fn into_draft(self) -> Result<VerifierDraft, ApiError> {
        VerifierDraft::new(&self.name, &self.email)
            .map_err(|e| ApiError::validation_failed(json!([{"reason": e.to_string()}])))
    }
}

impl AssignBody {
    pub fn verifier_id(self) -> Result<VerifierId, ApiError> {
        VerifierId::new(self.verifier_id)
            .map_err(|e| ApiError::validation_failed(json!([{"reason": e.to_string()}])))
    }
}

const _: fn() = || {
    fn assert_traits<T: Serialize + for<'de> Deserialize<'de>>() {}
    assert_traits::<CaseView>();
    assert_traits::<CasePageView>();
    assert_traits::<ReportRecordView>();
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ApiErrorCode;

    #[test]
    fn create_request_body_round_trips_through_json() {
        let raw = r#"{
            "employee": {"name": "S. Nair", "email": "sn@example.org"},
            "report_kinds": ["character", "education"]
        }"#;
        let body: CreateRequestBody = serde_json::from_str(raw).expect("parse");
        let draft = body.into_draft().expect("draft");
        assert_eq!(draft.report_kinds.len(), 2);
        assert_eq!(draft.employee.name.as_str(), "S. Nair");
    }

    #[test]
    fn bad_employee_name_becomes_validation_failed() {
        let body = CreateRequestBody {
            employee: EmployeeBody {
                name: "  ".to_string(),
                email: None,
                designation: None,
            },
            report_kinds: vec![],
        };
        let err = body.into_draft().expect_err("blank name");
        assert_eq!(err.code, ApiErrorCode::ValidationFailed);
    }

    #[test]
    fn unknown_body_fields_are_rejected() {
        let raw = r#"{"employee": {"name": "X"}, "extra": 1}"#;
        assert!(serde_json::from_str::<CreateRequestBody>(raw).is_err());
    }

    #[test]
    fn detail_body_uses_the_tagged_kind() {
        let raw = r#"{
            "detail": {
                "kind": "character",
                "address": "4 Lake View",
                "police_station": null,
                "remarks_source": null
            }
        }"#;
        let body: FileReportBody = serde_json::from_str(raw).expect("parse");
        assert_eq!(body.detail.kind(), ReportKind::Character);
    }
}
