// SPDX-License-Identifier: Apache-2.0

use crate::ids::{ReportId, RequestId, ValidationError};
use crate::status::{ReportKind, ReportStatus};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const REMARKS_MAX_LEN: usize = 4096;
pub const TEXT_FIELD_MAX_LEN: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Report {
    pub id: ReportId,
    pub request_id: RequestId,
    pub kind: ReportKind,
    pub status: ReportStatus,
    pub remarks: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Kind-specific payload of a report. The variant always agrees with
/// [`Report::kind`]; the store enforces this when filing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportDetail {
    Character {
        address: String,
        police_station: Option<String>,
        remarks_source: Option<String>,
    },
    Education {
        institution: String,
        degree: String,
        year_of_passing: Option<u16>,
    },
    Employment {
        employer: String,
        designation: String,
        from_date: Option<NaiveDate>,
        to_date: Option<NaiveDate>,
    },
}

impl ReportDetail {
    #[must_use]
    pub const fn kind(&self) -> ReportKind {
        match self {
            Self::Character { .. } => ReportKind::Character,
            Self::Education { .. } => ReportKind::Education,
            Self::Employment { .. } => ReportKind::Employment,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Character {
                address,
                police_station,
                remarks_source,
            } => {
                required_text("address", address)?;
                optional_text("police_station", police_station.as_deref())?;
                optional_text("remarks_source", remarks_source.as_deref())
            }
            Self::Education {
                institution,
                degree,
                year_of_passing,
            } => {
                required_text("institution", institution)?;
                required_text("degree", degree)?;
                if let Some(year) = year_of_passing {
                    if *year < 1900 {
                        return Err(ValidationError::InvalidFormat(
                            "year_of_passing must be 1900 or later",
                        ));
                    }
                }
                Ok(())
            }
            Self::Employment {
                employer,
                designation,
                from_date,
                to_date,
            } => {
                required_text("employer", employer)?;
                required_text("designation", designation)?;
                if let (Some(from), Some(to)) = (from_date, to_date) {
                    if from > to {
                        return Err(ValidationError::InvalidFormat(
                            "from_date must not be after to_date",
                        ));
                    }
                }
                Ok(())
            }
        }
    }
}

/// Validated payload for filing a report against a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDraft {
    pub request_id: RequestId,
    pub detail: ReportDetail,
    pub remarks: Option<String>,
}

impl ReportDraft {
    pub fn new(
        request_id: RequestId,
        detail: ReportDetail,
        remarks: Option<String>,
    ) -> Result<Self, ValidationError> {
        detail.validate()?;
        if let Some(r) = &remarks {
            if r.len() > REMARKS_MAX_LEN {
                return Err(ValidationError::TooLong("remarks", REMARKS_MAX_LEN));
            }
        }
        Ok(Self {
            request_id,
            detail,
            remarks,
        })
    }
}

fn required_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty(field));
    }
    if value.len() > TEXT_FIELD_MAX_LEN {
        return Err(ValidationError::TooLong(field, TEXT_FIELD_MAX_LEN));
    }
    Ok(())
}

fn optional_text(field: &'static str, value: Option<&str>) -> Result<(), ValidationError> {
    match value {
        Some(v) => required_text(field, v),
        None => Ok(()),
    }
}
