#![forbid(unsafe_code)]
//! Caseline domain model SSOT.
//!
//! Every record that crosses the store or the wire is defined here, with
//! parse-time validation so that an id, case number, or status that made it
//! into a domain value is already well-formed.

mod entity;
mod ids;
mod report;
mod status;

pub use entity::{
    Email, Employee, EmployeeDraft, PersonName, RequestDraft, VerificationRequest, Verifier,
    VerifierDraft, EMAIL_MAX_LEN, NAME_MAX_LEN,
};
pub use ids::{EmployeeId, ReportId, RequestId, ValidationError, VerifierId};
pub use report::{Report, ReportDetail, ReportDraft, REMARKS_MAX_LEN, TEXT_FIELD_MAX_LEN};
pub use status::{ReportKind, ReportStatus, RequestStatus};

pub const CRATE_NAME: &str = "caseline-model";

/// Case numbers are allocated by the store from the request primary key.
pub const CASE_NUMBER_MAX_LEN: usize = 32;

#[must_use]
pub fn format_case_number(id: RequestId) -> String {
    format!("VR-{:06}", id.get())
}

pub fn parse_case_number(input: &str) -> Result<String, ValidationError> {
    if input.is_empty() {
        return Err(ValidationError::Empty("case_number"));
    }
    if input.trim() != input {
        return Err(ValidationError::Trimmed("case_number"));
    }
    if input.len() > CASE_NUMBER_MAX_LEN {
        return Err(ValidationError::TooLong("case_number", CASE_NUMBER_MAX_LEN));
    }
    let Some(digits) = input.strip_prefix("VR-") else {
        return Err(ValidationError::InvalidFormat(
            "case_number must start with VR-",
        ));
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat(
            "case_number must be VR- followed by digits",
        ));
    }
    Ok(input.to_string())
}
