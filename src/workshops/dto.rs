use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, AppResult};
use crate::workshops::repo_types::{
    check_times, parse_clock, parse_date, NewWorkshop, Workshop, WorkshopId, WorkshopPatch,
};

const DEFAULT_DIFFICULTY: &str = "intermediate";

#[derive(Debug, Deserialize)]
pub struct CreateWorkshopRequest {
    pub title: Option<String>,
    pub city: String,
    pub location: String,
    pub date: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub style: String,
    pub difficulty: Option<String>,
    pub instructor_name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub max_participants: i32,
}

/// Absent fields are left alone. The optional text fields also accept
/// `null` or `""`, which clears the stored value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateWorkshopRequest {
    #[serde(default, deserialize_with = "clearable")]
    pub title: Option<Option<String>>,
    pub city: Option<String>,
    pub location: Option<String>,
    pub date: Option<String>,
    pub start_time: Option<String>,
    #[serde(default, deserialize_with = "clearable")]
    pub end_time: Option<Option<String>>,
    pub style: Option<String>,
    pub difficulty: Option<String>,
    #[serde(default, deserialize_with = "clearable")]
    pub instructor_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "clearable")]
    pub description: Option<Option<String>>,
    pub max_participants: Option<i32>,
}

/// Present-but-null becomes `Some(None)`; a missing key stays `None` via `default`.
fn clearable<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize)]
pub struct CreatedWorkshopResponse {
    pub id: WorkshopId,
}

#[derive(Debug, Serialize)]
pub struct WorkshopList {
    pub workshops: Vec<Workshop>,
}

fn required(field: &str, value: String) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn participants(value: i32) -> AppResult<i32> {
    if value < 0 {
        return Err(AppError::Validation(
            "max_participants must not be negative".into(),
        ));
    }
    Ok(value)
}

impl CreateWorkshopRequest {
    pub fn validate(self) -> AppResult<NewWorkshop> {
        let date = required("date", self.date)?;
        parse_date(&date)?;
        let start_time = required("start_time", self.start_time)?;
        let end_time = optional(self.end_time);
        check_times(&start_time, end_time.as_deref())?;

        Ok(NewWorkshop {
            title: optional(self.title),
            city: required("city", self.city)?,
            location: required("location", self.location)?,
            date,
            start_time,
            end_time,
            style: required("style", self.style)?,
            difficulty: optional(self.difficulty).unwrap_or_else(|| DEFAULT_DIFFICULTY.into()),
            instructor_name: optional(self.instructor_name),
            description: optional(self.description),
            max_participants: participants(self.max_participants)?,
        })
    }
}

impl UpdateWorkshopRequest {
    /// Shape checks only; consistency with the stored record is checked when
    /// the patch is applied.
    pub fn validate(self) -> AppResult<WorkshopPatch> {
        let patch = WorkshopPatch {
            title: self.title.map(optional),
            city: self.city.map(|v| required("city", v)).transpose()?,
            location: self.location.map(|v| required("location", v)).transpose()?,
            date: self.date.map(|v| required("date", v)).transpose()?,
            start_time: self.start_time.map(|v| required("start_time", v)).transpose()?,
            end_time: self.end_time.map(optional),
            style: self.style.map(|v| required("style", v)).transpose()?,
            difficulty: self.difficulty.map(|v| required("difficulty", v)).transpose()?,
            instructor_name: self.instructor_name.map(optional),
            description: self.description.map(optional),
            max_participants: self.max_participants.map(participants).transpose()?,
        };

        if patch.is_empty() {
            return Err(AppError::Validation("no fields to update".into()));
        }
        if let Some(date) = &patch.date {
            parse_date(date)?;
        }
        if let Some(start) = &patch.start_time {
            parse_clock(start)?;
        }
        if let Some(Some(end)) = &patch.end_time {
            parse_clock(end)?;
        }
        Ok(patch)
    }
}
