//! BYKC course records

use std::fmt;

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::DATETIME_FORMAT;
use crate::errors::{GateError, Result};

static SHAHE_POSITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:(?:J|S|教|实|实验楼)[0-5]|沙河|咏曼)")
        .expect("SHAHE_POSITION should compile - this is a bug")
});

/// Campus a course is held on, inferred from its classroom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampusZone {
    Shahe,
    XueyuanRoad,
}

/// One course as returned by the BYKC query endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    #[serde(rename = "courseName")]
    pub name: String,
    #[serde(rename = "courseTeacher", default)]
    pub teacher: Option<String>,
    #[serde(rename = "coursePosition", default)]
    pub position: Option<String>,
    #[serde(rename = "courseCollege", default)]
    pub college: Option<String>,
    #[serde(rename = "courseContact", default)]
    pub contact: Option<String>,
    #[serde(rename = "courseCurrentCount", default)]
    pub current: Option<u32>,
    #[serde(rename = "courseMaxCount", default)]
    pub max: Option<u32>,
    #[serde(rename = "courseCampus", default, with = "campus_list")]
    pub campus: Vec<String>,
    #[serde(rename = "courseSelectStartDate", default, with = "course_datetime")]
    pub select_start: Option<NaiveDateTime>,
    #[serde(rename = "courseSelectEndDate", default, with = "course_datetime")]
    pub select_end: Option<NaiveDateTime>,
    #[serde(rename = "courseStartDate", default, with = "course_datetime")]
    pub start: Option<NaiveDateTime>,
    #[serde(rename = "courseEndDate", default, with = "course_datetime")]
    pub end: Option<NaiveDateTime>,
    #[serde(rename = "courseDesc", default)]
    pub description: Option<String>,
}

impl Course {
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| GateError::protocol(None, format!("malformed course record: {e}")))
    }

    /// Campus inferred from the classroom; Xueyuan Road unless it looks like Shahe.
    pub fn zone(&self) -> CampusZone {
        match &self.position {
            Some(position) if SHAHE_POSITION.is_match(position) => CampusZone::Shahe,
            _ => CampusZone::XueyuanRoad,
        }
    }

    /// Seats left, when the backend reports the current count.
    pub fn remaining(&self) -> Option<u32> {
        Some(self.max?.saturating_sub(self.current?))
    }
}

fn fmt_date(date: &Option<NaiveDateTime>) -> String {
    date.map(|d| d.format(DATETIME_FORMAT).to_string()).unwrap_or_else(|| "-".to_string())
}

impl fmt::Display for Course {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dash = "-";
        writeln!(f, "{} {} {}", self.id, self.name, self.teacher.as_deref().unwrap_or(dash))?;
        writeln!(
            f,
            "{} {} {}/{}",
            self.position.as_deref().unwrap_or(dash),
            self.college.as_deref().unwrap_or(dash),
            self.current.map(|c| c.to_string()).unwrap_or_else(|| dash.to_string()),
            self.max.map(|c| c.to_string()).unwrap_or_else(|| dash.to_string()),
        )?;
        writeln!(f, "Start:  {}", fmt_date(&self.start))?;
        writeln!(f, "End:    {}", fmt_date(&self.end))?;
        writeln!(f, "Enroll: {} - {}", fmt_date(&self.select_start), fmt_date(&self.select_end))
    }
}

/// `courseCampus` arrives either as a JSON-encoded string list or as a plain
/// campus name.
mod campus_list {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(campus: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(campus)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => Vec::new(),
            Value::String(raw) => match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(list) => list,
                Err(_) => vec![raw],
            },
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect(),
            other => vec![other.to_string()],
        })
    }
}

/// `%Y-%m-%d %H:%M:%S` timestamps; `null` and empty strings are absent.
mod course_datetime {
    use chrono::NaiveDateTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    use crate::constants::DATETIME_FORMAT;

    pub fn serialize<S: Serializer>(
        date: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match date {
            Some(date) => serializer.serialize_str(&date.format(DATETIME_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => NaiveDateTime::parse_from_str(raw.trim(), DATETIME_FORMAT)
                .map(Some)
                .map_err(de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;

    fn sample() -> Value {
        json!({
            "id": 4821,
            "courseName": "博雅课程：交响乐赏析",
            "courseTeacher": "李老师",
            "coursePosition": "沙河校区J3-201",
            "courseCollege": "人文学院",
            "courseContact": "010-8231",
            "courseCurrentCount": 118,
            "courseMaxCount": 120,
            "courseCampus": "[\"沙河校区\",\"学院路校区\"]",
            "courseSelectStartDate": "2024-03-01 12:00:00",
            "courseSelectEndDate": "2024-03-05 12:00:00",
            "courseStartDate": "2024-03-10 18:30:00",
            "courseEndDate": "2024-03-10 20:30:00",
            "courseDesc": null
        })
    }

    #[test]
    fn parses_a_full_record() {
        let course = Course::from_value(sample()).unwrap();

        assert_eq!(course.id, 4821);
        assert_eq!(course.campus, ["沙河校区", "学院路校区"]);
        assert_eq!(course.remaining(), Some(2));
        assert_eq!(
            course.start,
            Some(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap().and_hms_opt(18, 30, 0).unwrap())
        );
        assert_eq!(course.description, None);
        assert_eq!(course.zone(), CampusZone::Shahe);
    }

    #[test]
    fn plain_campus_string_becomes_single_entry() {
        let mut value = sample();
        value["courseCampus"] = json!("学院路校区");
        value["coursePosition"] = json!("主M201");

        let course = Course::from_value(value).unwrap();
        assert_eq!(course.campus, ["学院路校区"]);
        assert_eq!(course.zone(), CampusZone::XueyuanRoad);
    }

    #[test]
    fn malformed_dates_are_protocol_errors() {
        let mut value = sample();
        value["courseStartDate"] = json!("next tuesday");
        assert!(matches!(Course::from_value(value), Err(GateError::Protocol { .. })));
    }

    #[test]
    fn display_matches_listing_layout() {
        let rendered = Course::from_value(sample()).unwrap().to_string();
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines[0], "4821 博雅课程：交响乐赏析 李老师");
        assert_eq!(lines[1], "沙河校区J3-201 人文学院 118/120");
        assert_eq!(lines[4], "Enroll: 2024-03-01 12:00:00 - 2024-03-05 12:00:00");
    }

    #[test]
    fn serialized_record_reads_back() {
        let course = Course::from_value(sample()).unwrap();
        let back = Course::from_value(serde_json::to_value(&course).unwrap()).unwrap();
        assert_eq!(back, course);
    }
}
