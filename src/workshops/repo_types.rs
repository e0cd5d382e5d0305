use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{macros::format_description, Date, OffsetDateTime, Time};

use crate::auth::repo_types::UserId;
use crate::error::{AppError, AppResult};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct WorkshopId(pub i64);

impl fmt::Display for WorkshopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Workshop record in the database. `admin_id` is fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Workshop {
    pub id: WorkshopId,
    pub admin_id: UserId,
    pub title: Option<String>,
    pub city: String,
    pub location: String,
    pub date: String,       // YYYY-MM-DD
    pub start_time: String, // HH:MM
    pub end_time: Option<String>,
    pub style: String,
    pub difficulty: String,
    pub instructor_name: Option<String>,
    pub description: Option<String>,
    pub max_participants: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Computed from the registrations table; absent on bare row reads.
    #[sqlx(default)]
    pub participant_count: i64,
}

/// Validated payload for a new workshop.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWorkshop {
    pub title: Option<String>,
    pub city: String,
    pub location: String,
    pub date: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub style: String,
    pub difficulty: String,
    pub instructor_name: Option<String>,
    pub description: Option<String>,
    pub max_participants: i32,
}

impl NewWorkshop {
    pub fn into_workshop(
        self,
        id: WorkshopId,
        owner: UserId,
        created_at: OffsetDateTime,
    ) -> Workshop {
        Workshop {
            id,
            admin_id: owner,
            title: self.title,
            city: self.city,
            location: self.location,
            date: self.date,
            start_time: self.start_time,
            end_time: self.end_time,
            style: self.style,
            difficulty: self.difficulty,
            instructor_name: self.instructor_name,
            description: self.description,
            max_participants: self.max_participants,
            created_at,
            participant_count: 0,
        }
    }
}

/// Field-wise update. `None` leaves the stored value untouched; for the
/// optional columns `Some(None)` clears them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkshopPatch {
    pub title: Option<Option<String>>,
    pub city: Option<String>,
    pub location: Option<String>,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<Option<String>>,
    pub style: Option<String>,
    pub difficulty: Option<String>,
    pub instructor_name: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub max_participants: Option<i32>,
}

impl WorkshopPatch {
    pub fn is_empty(&self) -> bool {
        *self == WorkshopPatch::default()
    }

    /// Returns `current` with the patch applied, or an error if the merged
    /// record is inconsistent. `current` itself is never touched.
    pub fn applied(&self, current: &Workshop) -> AppResult<Workshop> {
        let mut next = current.clone();
        if let Some(v) = &self.city {
            next.city = v.clone();
        }
        if let Some(v) = &self.location {
            next.location = v.clone();
        }
        if let Some(v) = &self.date {
            next.date = v.clone();
        }
        if let Some(v) = &self.start_time {
            next.start_time = v.clone();
        }
        if let Some(v) = &self.style {
            next.style = v.clone();
        }
        if let Some(v) = &self.difficulty {
            next.difficulty = v.clone();
        }
        if let Some(v) = self.max_participants {
            next.max_participants = v;
        }
        if let Some(v) = &self.title {
            next.title = v.clone();
        }
        if let Some(v) = &self.end_time {
            next.end_time = v.clone();
        }
        if let Some(v) = &self.instructor_name {
            next.instructor_name = v.clone();
        }
        if let Some(v) = &self.description {
            next.description = v.clone();
        }
        check_times(&next.start_time, next.end_time.as_deref())?;
        Ok(next)
    }
}

/// Optional narrowing of the public listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkshopFilter {
    pub style: Option<String>,
    pub city: Option<String>,
    pub difficulty: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

impl WorkshopFilter {
    /// Rejects date bounds that are not `YYYY-MM-DD`.
    pub fn validate(&self) -> AppResult<()> {
        for bound in [&self.date_from, &self.date_to].into_iter().flatten() {
            parse_date(bound)?;
        }
        Ok(())
    }

    pub fn matches(&self, w: &Workshop) -> bool {
        self.style.as_ref().map_or(true, |s| &w.style == s)
            && self
                .city
                .as_ref()
                .map_or(true, |c| w.city.to_lowercase().contains(&c.to_lowercase()))
            && self.difficulty.as_ref().map_or(true, |d| &w.difficulty == d)
            && self.date_from.as_ref().map_or(true, |from| w.date.as_str() >= from.as_str())
            && self.date_to.as_ref().map_or(true, |to| w.date.as_str() <= to.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkshopStats {
    pub total_workshops: i64,
    pub total_registrations: i64,
    pub workshops_by_style: BTreeMap<String, i64>,
}

pub(crate) fn parse_date(value: &str) -> AppResult<Date> {
    Date::parse(value, format_description!("[year]-[month]-[day]"))
        .map_err(|_| AppError::Validation(format!("date must be YYYY-MM-DD, got {value:?}")))
}

pub(crate) fn parse_clock(value: &str) -> AppResult<Time> {
    Time::parse(value, format_description!("[hour]:[minute]"))
        .map_err(|_| AppError::Validation(format!("time must be HH:MM, got {value:?}")))
}

pub(crate) fn check_times(start: &str, end: Option<&str>) -> AppResult<()> {
    let start = parse_clock(start)?;
    if let Some(end) = end {
        if parse_clock(end)? < start {
            return Err(AppError::Validation("end_time is before start_time".into()));
        }
    }
    Ok(())
}
