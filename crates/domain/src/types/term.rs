//! JWXT academic terms and teaching-task ids

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{GateError, Result};

/// Academic term as JWXT forms address it
///
/// Season 1 opens the academic year starting in `year`. Season 2 and any
/// later season belong to the academic year that started in `year - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwxtTerm {
    pub year: i32,
    pub season: u8,
}

/// Term code such as `2023-20242` for `JwxtTerm { year: 2024, season: 2 }`.
pub fn jwxt_term(year: i32, season: u8) -> JwxtTerm {
    JwxtTerm { year, season }
}

impl JwxtTerm {
    /// Academic-year prefix, e.g. `2023-2024`.
    pub fn head(&self) -> String {
        let offset = i32::from(self.season.min(2));
        format!("{:04}-{:04}", self.year - offset + 1, self.year - offset + 2)
    }

    /// `pageXnxq` value: the head followed by the season digit.
    pub fn code(&self) -> String {
        format!("{}{}", self.head(), self.season)
    }

    /// Teaching-task id (`rwh`) of a course section in this term.
    pub fn task_id(&self, course_id: &str, tail: &str) -> Result<String> {
        let course_id = normalize_course_id(course_id)?;
        Ok(format!("{}-{}-{}-{}", self.head(), self.season, course_id, tail))
    }
}

impl fmt::Display for JwxtTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

/// Upper-case a 9 or 10 character course code.
pub fn normalize_course_id(course_id: &str) -> Result<String> {
    let len = course_id.chars().count();
    if !(9..=10).contains(&len) {
        return Err(GateError::config(format!("invalid course id '{course_id}'")));
    }
    Ok(course_id.to_uppercase())
}
