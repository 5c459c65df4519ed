// SPDX-License-Identifier: Apache-2.0

use crate::ids::{EmployeeId, RequestId, ValidationError, VerifierId};
use crate::status::{ReportKind, RequestStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const NAME_MAX_LEN: usize = 256;
pub const EMAIL_MAX_LEN: usize = 254;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
#[non_exhaustive]
pub struct PersonName(String);

impl PersonName {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        if input.is_empty() {
            return Err(ValidationError::Empty("name"));
        }
        if input.trim() != input {
            return Err(ValidationError::Trimmed("name"));
        }
        if input.len() > NAME_MAX_LEN {
            return Err(ValidationError::TooLong("name", NAME_MAX_LEN));
        }
        Ok(Self(input.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
#[non_exhaustive]
pub struct Email(String);

impl Email {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        if input.is_empty() {
            return Err(ValidationError::Empty("email"));
        }
        if input.trim() != input {
            return Err(ValidationError::Trimmed("email"));
        }
        if input.len() > EMAIL_MAX_LEN {
            return Err(ValidationError::TooLong("email", EMAIL_MAX_LEN));
        }
        let mut parts = input.split('@');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty() => {
                Ok(Self(input.to_string()))
            }
            _ => Err(ValidationError::InvalidFormat(
                "email must contain exactly one '@' with non-empty sides",
            )),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Subject of a background check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Employee {
    pub id: EmployeeId,
    pub name: PersonName,
    pub email: Option<Email>,
    pub designation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Verifier {
    pub id: VerifierId,
    pub name: PersonName,
    pub email: Email,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerificationRequest {
    pub id: RequestId,
    pub case_number: String,
    pub employee_id: EmployeeId,
    pub verifier_id: Option<VerifierId>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated payload for creating an employee row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeeDraft {
    pub name: PersonName,
    pub email: Option<Email>,
    pub designation: Option<String>,
}

impl EmployeeDraft {
    pub fn new(
        name: &str,
        email: Option<&str>,
        designation: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let designation = match designation {
            Some(d) if d.trim().is_empty() => None,
            Some(d) if d.len() > NAME_MAX_LEN => {
                return Err(ValidationError::TooLong("designation", NAME_MAX_LEN));
            }
            Some(d) => Some(d.to_string()),
            None => None,
        };
        Ok(Self {
            name: PersonName::parse(name)?,
            email: email.map(Email::parse).transpose()?,
            designation,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierDraft {
    pub name: PersonName,
    pub email: Email,
}

impl VerifierDraft {
    pub fn new(name: &str, email: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            name: PersonName::parse(name)?,
            email: Email::parse(email)?,
        })
    }
}

/// Validated payload for opening a new verification request. The employee is
/// created inline with the request; there is no separate employee
/// registration step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDraft {
    pub employee: EmployeeDraft,
    pub report_kinds: Vec<ReportKind>,
}

impl RequestDraft {
    pub fn new(employee: EmployeeDraft, report_kinds: Vec<ReportKind>) -> Result<Self, ValidationError> {
        let mut seen = Vec::with_capacity(report_kinds.len());
        for kind in &report_kinds {
            if seen.contains(kind) {
                return Err(ValidationError::InvalidFormat(
                    "report kinds must not repeat",
                ));
            }
            seen.push(*kind);
        }
        Ok(Self {
            employee,
            report_kinds,
        })
    }
}
