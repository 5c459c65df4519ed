// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    Empty(&'static str),
    Trimmed(&'static str),
    TooLong(&'static str, usize),
    NonPositive(&'static str),
    InvalidFormat(&'static str),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty(name) => write!(f, "{name} must not be empty"),
            Self::Trimmed(name) => {
                write!(f, "{name} must not contain leading/trailing whitespace")
            }
            Self::TooLong(name, max) => write!(f, "{name} exceeds max length {max}"),
            Self::NonPositive(name) => write!(f, "{name} must be a positive integer"),
            Self::InvalidFormat(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for ValidationError {}

macro_rules! row_id {
    ($name:ident, $label:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub fn new(raw: i64) -> Result<Self, ValidationError> {
                if raw < 1 {
                    return Err(ValidationError::NonPositive($label));
                }
                Ok(Self(raw))
            }

            pub fn parse(input: &str) -> Result<Self, ValidationError> {
                let raw = input
                    .parse::<i64>()
                    .map_err(|_| ValidationError::NonPositive($label))?;
                Self::new(raw)
            }

            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(RequestId, "request_id");
row_id!(ReportId, "report_id");
row_id!(VerifierId, "verifier_id");
row_id!(EmployeeId, "employee_id");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_reject_zero_negative_and_garbage() {
        assert!(RequestId::new(0).is_err());
        assert!(RequestId::new(-3).is_err());
        assert!(RequestId::parse("abc").is_err());
        assert!(RequestId::parse("007").expect("leading zeros are fine").get() == 7);
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = ReportId::new(9).expect("id");
        assert_eq!(serde_json::to_string(&id).expect("json"), "9");
    }
}
