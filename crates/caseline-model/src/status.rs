// SPDX-License-Identifier: Apache-2.0

use crate::ids::ValidationError;
use serde::{Deserialize, Serialize};

/// Lifecycle of a verification request. A case only moves along the edges
/// checked by [`RequestStatus::can_transition_to`]; everything else is a
/// conflict the API reports as 409.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum RequestStatus {
    Received,
    InProgress,
    OnHold,
    Completed,
    Closed,
}

impl RequestStatus {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "received" => Ok(Self::Received),
            "in_progress" => Ok(Self::InProgress),
            "on_hold" => Ok(Self::OnHold),
            "completed" => Ok(Self::Completed),
            "closed" => Ok(Self::Closed),
            _ => Err(ValidationError::InvalidFormat(
                "status must be one of received, in_progress, on_hold, completed, closed",
            )),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::InProgress => "in_progress",
            Self::OnHold => "on_hold",
            Self::Completed => "completed",
            Self::Closed => "closed",
        }
    }

    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Received, Self::InProgress)
                | (Self::InProgress, Self::OnHold)
                | (Self::OnHold, Self::InProgress)
                | (Self::InProgress, Self::Completed)
                | (Self::Completed, Self::Closed)
        )
    }

    /// Requests in these states show up in the pending work queue.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Received | Self::InProgress | Self::OnHold)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ReportStatus {
    Pending,
    InProgress,
    OnHold,
    Completed,
}

impl ReportStatus {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "on_hold" => Ok(Self::OnHold),
            "completed" => Ok(Self::Completed),
            _ => Err(ValidationError::InvalidFormat(
                "report status must be one of pending, in_progress, on_hold, completed",
            )),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::OnHold => "on_hold",
            Self::Completed => "completed",
        }
    }

    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::OnHold)
                | (Self::OnHold, Self::InProgress)
                | (Self::InProgress, Self::Completed)
        )
    }
}

/// The three sub-report flavors a case tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Character,
    Education,
    Employment,
}

impl ReportKind {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "character" => Ok(Self::Character),
            "education" => Ok(Self::Education),
            "employment" => Ok(Self::Employment),
            _ => Err(ValidationError::InvalidFormat(
                "report kind must be one of character, education, employment",
            )),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Education => "education",
            Self::Employment => "employment",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_transition_table_matches_lifecycle() {
        use RequestStatus::*;
        let legal = [
            (Received, InProgress),
            (InProgress, OnHold),
            (OnHold, InProgress),
            (InProgress, Completed),
            (Completed, Closed),
        ];
        let all = [Received, InProgress, OnHold, Completed, Closed];
        for from in all {
            for to in all {
                let expected = legal.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "{from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn report_cannot_complete_from_hold() {
        assert!(!ReportStatus::OnHold.can_transition_to(ReportStatus::Completed));
        assert!(ReportStatus::OnHold.can_transition_to(ReportStatus::InProgress));
    }

    #[test]
    fn status_strings_round_trip() {
        for s in [
            RequestStatus::Received,
            RequestStatus::InProgress,
            RequestStatus::OnHold,
            RequestStatus::Completed,
            RequestStatus::Closed,
        ] {
            assert_eq!(RequestStatus::parse(s.as_str()).expect("parse"), s);
        }
        assert!(RequestStatus::parse("Completed").is_err(), "case sensitive");
    }
}
