//! crates/study_tracker_core/src/commands.rs
//!
//! The named actions views can trigger. Views hold on to plain `Command`
//! values (or their ids) and hand them back to `Router::execute`; nothing is
//! registered per render.

use uuid::Uuid;

use crate::domain::{ProfileUpdate, Timetable};
use crate::reorder::MoveDirection;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Navigate(String),
    SignOut,
    ToggleTheme,
    /// Number of days in the home chart; one of the offered choices.
    SetChartRange(u32),
    SetDailyGoal(f64),
    LogStudy {
        date: String,
        hours: f64,
    },
    SaveTimetable(Timetable),
    UpdateProfile(ProfileUpdate),
    SetProfilePhoto(String),
    RenameLesson {
        subject: String,
        lesson_type: String,
        day: String,
        title: String,
    },
    AddContent {
        subject: String,
        lesson_type: String,
        day: String,
        text: String,
        link: String,
    },
    EditContent {
        subject: String,
        lesson_id: String,
        item_id: String,
        text: String,
        link: String,
    },
    MoveContent {
        subject: String,
        lesson_id: String,
        item_id: String,
        index: usize,
        direction: MoveDirection,
    },
    /// First step of deleting a content item; answered with a confirmation.
    RequestDeleteContent {
        subject: String,
        lesson_id: String,
        item_id: String,
    },
    /// First step of deleting a user profile; admin only.
    RequestDeleteUser {
        uid: String,
    },
    Confirm(Uuid),
    Cancel(Uuid),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Navigate(_) => "navigate",
            Command::SignOut => "sign-out",
            Command::ToggleTheme => "toggle-theme",
            Command::SetChartRange(_) => "set-chart-range",
            Command::SetDailyGoal(_) => "set-daily-goal",
            Command::LogStudy { .. } => "log-study",
            Command::SaveTimetable(_) => "save-timetable",
            Command::UpdateProfile(_) => "update-profile",
            Command::SetProfilePhoto(_) => "set-profile-photo",
            Command::RenameLesson { .. } => "rename-lesson",
            Command::AddContent { .. } => "add-content",
            Command::EditContent { .. } => "edit-content",
            Command::MoveContent { .. } => "move-content",
            Command::RequestDeleteContent { .. } => "request-delete-content",
            Command::RequestDeleteUser { .. } => "request-delete-user",
            Command::Confirm(_) => "confirm",
            Command::Cancel(_) => "cancel",
        }
    }
}

/// A destructive action parked until the user confirms it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAction {
    DeleteContent {
        subject: String,
        lesson_id: String,
        item_id: String,
    },
    DeleteUser {
        uid: String,
    },
}

impl PendingAction {
    pub fn prompt(&self) -> &'static str {
        match self {
            PendingAction::DeleteContent { .. } => "Remove this item?",
            PendingAction::DeleteUser { .. } => "Are you sure? This cannot be undone.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub id: Uuid,
    pub prompt: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Done,
    /// The command was valid but had nothing to change.
    Unchanged,
    /// Send `Command::Confirm(id)` to carry the action out.
    NeedsConfirmation(Confirmation),
}
