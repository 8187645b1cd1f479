//! crates/study_tracker_core/src/views.rs
//!
//! What the router hands to the `Shell`: a header, one page view with the
//! data it needs, and the bottom navigation state. Drawing is the shell's job.

use crate::activity::LiveStats;
use crate::domain::{
    Lesson, LessonContentItem, Session, Teacher, Theme, Timetable, UserProfile, UserRecord,
    LESSON_DAYS, LESSON_TYPES, TEACHERS,
};
use crate::route::NavSection;
use crate::stats::StudyStats;

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub display_name: String,
    pub email: Option<String>,
    pub photo_url: String,
    pub is_admin: bool,
    pub theme: Theme,
}

impl Header {
    /// Profile photo first, then the identity's own photo, then a generated avatar.
    pub fn build(session: &Session, profile: Option<&UserProfile>, theme: Theme) -> Self {
        let photo_url = profile
            .and_then(|p| p.photo_url.clone())
            .or_else(|| session.photo_url.clone())
            .unwrap_or_else(|| avatar_url(&session.display_name));
        Self {
            display_name: session.display_name.clone(),
            email: session.email.clone(),
            photo_url,
            is_admin: session.is_admin,
            theme,
        }
    }
}

fn avatar_url(name: &str) -> String {
    let encoded: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_string() } else { "+".to_string() })
        .collect();
    format!("https://ui-avatars.com/api/?name={encoded}&background=4f46e5&color=fff")
}

#[derive(Debug, Clone, PartialEq)]
pub struct LessonSummary {
    /// Two-digit day, `01`..`20`.
    pub day: String,
    pub title: String,
}

/// Lesson slots for a subject and type, titled from the stored lessons.
pub fn lesson_summaries(stored: &[Lesson]) -> Vec<LessonSummary> {
    (1..=LESSON_DAYS)
        .map(|i| {
            let day = format!("{i:02}");
            let title = stored
                .iter()
                .find(|l| l.day == day)
                .map(|l| l.title.clone())
                .unwrap_or_else(|| format!("Day {day} Lesson"));
            LessonSummary { day, title }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdminView {
    pub users: Vec<UserRecord>,
    pub total_users: usize,
    pub stats: LiveStats,
}

/// Narrows the admin user list by a search term and an exam-year batch.
pub fn filter_users<'a>(
    users: &'a [UserRecord],
    term: &str,
    exam_year: Option<&str>,
) -> Vec<&'a UserRecord> {
    let term = term.trim().to_lowercase();
    let contains = |field: &Option<String>| {
        field
            .as_deref()
            .is_some_and(|v| v.to_lowercase().contains(&term))
    };
    users
        .iter()
        .filter(|u| {
            term.is_empty()
                || contains(&u.profile.first_name)
                || contains(&u.profile.email)
                || contains(&u.profile.school)
        })
        .filter(|u| match exam_year.filter(|y| !y.is_empty()) {
            Some(year) => u.profile.exam_year.as_deref() == Some(year),
            None => true,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum View {
    Login,
    Register,
    Home(StudyStats),
    Profile(UserProfile),
    Timetable(Timetable),
    Subjects(Vec<Teacher>),
    LessonTypes {
        subject: String,
        types: Vec<(&'static str, &'static str)>,
    },
    Lessons {
        subject: String,
        lesson_type: String,
        lessons: Vec<LessonSummary>,
        can_edit: bool,
    },
    LessonContent {
        subject: String,
        lesson_type: String,
        day: String,
        lesson_id: String,
        items: Vec<LessonContentItem>,
        can_edit: bool,
    },
    Admin(AdminView),
}

impl View {
    pub fn subjects() -> Self {
        View::Subjects(TEACHERS.to_vec())
    }

    pub fn lesson_types(subject: &str) -> Self {
        View::LessonTypes {
            subject: subject.to_string(),
            types: LESSON_TYPES.to_vec(),
        }
    }
}

/// One complete screen.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub path: String,
    /// Absent while signed out.
    pub header: Option<Header>,
    pub view: View,
    /// Absent on public routes.
    pub nav: Option<NavSection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    AccessDenied,
    Error(String),
    Info(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, name: &str, school: &str, year: &str) -> UserRecord {
        UserRecord {
            id: id.into(),
            profile: UserProfile {
                first_name: Some(name.into()),
                email: Some(format!("{id}@example.com")),
                school: Some(school.into()),
                exam_year: Some(year.into()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn filters_by_term_and_batch() {
        let users = vec![
            user("a", "Nimal", "Royal College", "2026 A/L"),
            user("b", "Sunil", "Ananda College", "2027 A/L"),
            user("c", "Kamal", "Royal College", "2027 A/L"),
        ];
        let ids = |found: Vec<&UserRecord>| found.iter().map(|u| u.id.clone()).collect::<Vec<_>>();

        assert_eq!(ids(filter_users(&users, "royal", None)), vec!["a", "c"]);
        assert_eq!(ids(filter_users(&users, "ROYAL", Some("2027 A/L"))), vec!["c"]);
        assert_eq!(ids(filter_users(&users, "b@example", Some(""))), vec!["b"]);
        assert_eq!(filter_users(&users, "", None).len(), 3);
    }

    #[test]
    fn lesson_titles_fall_back_to_day_label() {
        let stored = vec![Lesson {
            subject: "physics".into(),
            lesson_type: "theory".into(),
            day: "03".into(),
            title: "Waves".into(),
            updated_at: None,
        }];
        let lessons = lesson_summaries(&stored);
        assert_eq!(lessons.len(), 20);
        assert_eq!(lessons[0].title, "Day 01 Lesson");
        assert_eq!(lessons[2].title, "Waves");
        assert_eq!(lessons[19].day, "20");
    }

    #[test]
    fn header_prefers_profile_photo() {
        let session = Session {
            uid: "u".into(),
            display_name: "Nimal Perera".into(),
            email: None,
            photo_url: Some("identity.png".into()),
            is_admin: false,
            moderator_scopes: Default::default(),
        };
        let profile = UserProfile {
            photo_url: Some("profile.png".into()),
            ..Default::default()
        };
        assert_eq!(Header::build(&session, Some(&profile), Theme::Dark).photo_url, "profile.png");
        assert_eq!(Header::build(&session, None, Theme::Dark).photo_url, "identity.png");

        let anonymous_photo = Session { photo_url: None, ..session };
        assert!(Header::build(&anonymous_photo, None, Theme::Light)
            .photo_url
            .contains("name=Nimal+Perera"));
    }
}
