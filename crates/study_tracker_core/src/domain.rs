//! crates/study_tracker_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! Field names on the serialized forms follow the remote document store's
//! camelCase schema; the Rust side stays snake_case.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The opaque identity handed over by the session provider on sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            email: None,
            photo_url: None,
        }
    }
}

/// The signed-in user as the router sees it.
///
/// A `Session` is built from an [`Identity`] by the access policy and is
/// replaced wholesale on every auth-state change; nothing mutates it in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub uid: String,
    pub display_name: String,
    pub email: Option<String>,
    pub photo_url: Option<String>,
    pub is_admin: bool,
    /// Subjects this user may moderate.
    pub moderator_scopes: BTreeSet<String>,
}

impl Session {
    pub fn moderates(&self, subject: &str) -> bool {
        self.moderator_scopes.contains(subject)
    }
}

//=========================================================================================
// Stored Documents
//=========================================================================================

/// A document in the `users` collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthday: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_year: Option<String>,
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_goal: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// A user profile together with its document id, as listed on the admin page.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: String,
    pub profile: UserProfile,
}

/// The editable subset of a profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    pub first_name: String,
    pub school: String,
    pub phone: String,
    pub birthday: String,
}

/// One day of logged study time in the `studyLogs` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyLog {
    pub user_id: String,
    /// `YYYY-MM-DD`.
    pub date: String,
    pub hours: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// A weekly timetable, stored as one flat document per user.
///
/// Cells are keyed `tt_{day}_{hour}` where `day` is 0 (Monday) to 6 (Sunday).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timetable(pub BTreeMap<String, String>);

impl Timetable {
    pub const DAYS: [&'static str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    pub const FIRST_HOUR: u8 = 6;
    pub const LAST_HOUR: u8 = 21;

    pub fn cell_key(day: usize, hour: u8) -> String {
        format!("tt_{day}_{hour}")
    }

    pub fn hours() -> impl Iterator<Item = u8> {
        Self::FIRST_HOUR..=Self::LAST_HOUR
    }

    pub fn get(&self, day: usize, hour: u8) -> Option<&str> {
        self.0.get(&Self::cell_key(day, hour)).map(String::as_str)
    }

    pub fn set(&mut self, day: usize, hour: u8, value: impl Into<String>) {
        self.0.insert(Self::cell_key(day, hour), value.into());
    }

    fn is_grid_cell(key: &str) -> bool {
        (0..Self::DAYS.len()).any(|day| Self::hours().any(|hour| Self::cell_key(day, hour) == key))
    }

    /// Drops blank cells and anything outside the grid; only filled cells are persisted.
    pub fn compacted(self) -> Self {
        Self(
            self.0
                .into_iter()
                .filter(|(k, v)| !v.trim().is_empty() && Self::is_grid_cell(k))
                .collect(),
        )
    }
}

/// A titled lesson slot in the `lessons` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub subject: String,
    #[serde(rename = "type")]
    pub lesson_type: String,
    pub day: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

/// A single link card on a lesson page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonContentItem {
    /// Document id; carried outside the stored fields.
    #[serde(skip)]
    pub id: String,
    pub lesson_id: String,
    pub text: String,
    pub link: String,
    /// Dense 1..N position within `lesson_id`.
    pub order: u32,
    pub created_at: i64,
}

/// Per-day activity marker in the `userActivity` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActivity {
    pub user_id: String,
    pub date: String,
    pub last_active: i64,
}

/// Identifies the content of one lesson: `{subject}_{type}_{day}`.
pub fn lesson_id(subject: &str, lesson_type: &str, day: &str) -> String {
    format!("{subject}_{lesson_type}_{day}")
}

//=========================================================================================
// Catalogs and Preferences
//=========================================================================================

/// A lecturer card on the recordings page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Teacher {
    pub id: &'static str,
    pub name: &'static str,
    pub subject: &'static str,
}

pub const TEACHERS: [Teacher; 4] = [
    Teacher { id: "maths", name: "Ruwan Darshana", subject: "Combined Maths" },
    Teacher { id: "physics", name: "Anuradha Perera", subject: "Physics" },
    Teacher { id: "chemistry", name: "Amila Dasanayake", subject: "Chemistry" },
    Teacher { id: "physics-nilantha", name: "Nilantha Jayasooriya", subject: "Physics" },
];

/// The kinds of class offered per subject, as `(id, label)`.
pub const LESSON_TYPES: [(&str, &str); 3] = [
    ("theory", "Theory"),
    ("revision", "Revision"),
    ("paper", "Paper Class"),
];

/// Number of lesson slots listed per subject and type.
pub const LESSON_DAYS: u32 = 20;

/// Colour scheme preference, persisted client-side under [`Theme::STORAGE_KEY`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub const STORAGE_KEY: &'static str = "theme";

    pub fn parse(value: &str) -> Self {
        match value {
            "light" => Theme::Light,
            _ => Theme::Dark,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
