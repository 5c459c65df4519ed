#![forbid(unsafe_code)]
//! The wire contract for caseline: error taxonomy, view models, and query
//! parameter parsing. Nothing in this crate touches the database or the
//! network; handlers compose these pieces.

mod dto;
mod errors;
mod params;

pub use dto::{
    case_page_view, AssignBody, CasePageView, CaseSummaryView, CaseView, CreateRequestBody,
    CreateVerifierBody, EmployeeBody, EmployeeView, FileReportBody, PageCursorView,
    ReportRecordView, ReportStatusBody, ReportView, RequestStatusBody, SetActiveBody,
    VerifierView, WorkloadView, API_VERSION,
};
pub use errors::{ApiError, ApiErrorCode};
pub use params::{
    parse_pending_params, parse_search_params, PendingParams, ALLOWED_SEARCH_PARAMS,
};

pub const CRATE_NAME: &str = "caseline-api";
