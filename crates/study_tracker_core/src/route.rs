//! crates/study_tracker_core/src/route.rs
//!
//! Hash-fragment path parsing.
//!
//! Parsing never fails: malformed or partial recording paths fall back to the
//! coarsest view they still identify, and unknown paths become [`Route::Unknown`].

use std::fmt;

/// Who may see a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteCategory {
    Public,
    Protected,
    AdminOnly,
}

/// Top-level section highlighted in the bottom navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavSection {
    Home,
    Timetable,
    Recordings,
    Profile,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Landing,
    Welcome,
    Login,
    Register,
    Home,
    Profile,
    Timetable,
    /// Subject (teacher) listing.
    Recordings,
    /// Type selector for one subject.
    Subject { subject: String },
    /// Lesson listing for a subject and type.
    Lessons { subject: String, lesson_type: String },
    /// Content page for a single lesson.
    Lesson {
        subject: String,
        lesson_type: String,
        day: String,
    },
    AdminPanel,
    Unknown(String),
}

impl Route {
    /// Parses a hash fragment such as `#/recording/physics/theory/lesson07`.
    pub fn parse(fragment: &str) -> Self {
        let path = fragment.trim().trim_start_matches('#');
        let path = path.split(['?', '#']).next().unwrap_or_default();
        match path {
            "" | "/" => return Route::Landing,
            "/welcome" => return Route::Welcome,
            "/login" => return Route::Login,
            "/register" => return Route::Register,
            "/home" => return Route::Home,
            "/profile" => return Route::Profile,
            "/timetable" => return Route::Timetable,
            "/recordings" => return Route::Recordings,
            "/adminpanel" => return Route::AdminPanel,
            _ => {}
        }

        let mut segments = path.trim_start_matches('/').split('/');
        if segments.next() != Some("recording") {
            return Route::Unknown(path.to_string());
        }
        // Empty segments (`/recording//theory`) count as missing.
        let mut next = || segments.next().filter(|s| !s.is_empty()).map(str::to_string);

        let Some(subject) = next() else {
            return Route::Recordings;
        };
        let Some(lesson_type) = next() else {
            return Route::Subject { subject };
        };
        match next().as_deref().and_then(lesson_day) {
            Some(day) => Route::Lesson {
                subject,
                lesson_type,
                day: day.to_string(),
            },
            None => Route::Lessons {
                subject,
                lesson_type,
            },
        }
    }

    pub fn category(&self) -> RouteCategory {
        match self {
            Route::Landing | Route::Welcome | Route::Login | Route::Register => {
                RouteCategory::Public
            }
            Route::AdminPanel => RouteCategory::AdminOnly,
            _ => RouteCategory::Protected,
        }
    }

    /// The section shown as active in the bottom navigation; `None` on public routes.
    pub fn nav_section(&self) -> Option<NavSection> {
        match self {
            Route::Home => Some(NavSection::Home),
            Route::Timetable => Some(NavSection::Timetable),
            Route::Recordings
            | Route::Subject { .. }
            | Route::Lessons { .. }
            | Route::Lesson { .. } => Some(NavSection::Recordings),
            Route::Profile => Some(NavSection::Profile),
            Route::AdminPanel => Some(NavSection::Admin),
            Route::Landing
            | Route::Welcome
            | Route::Login
            | Route::Register
            | Route::Unknown(_) => None,
        }
    }

    /// The anonymous entry pages a fresh sign-in moves away from. The sign-in
    /// forms live on `/login` and `/register`, so those count too.
    pub fn is_landing(&self) -> bool {
        self.category() == RouteCategory::Public
    }
}

/// Extracts the trailing digits of a lesson token: `lesson07` gives `07`.
fn lesson_day(token: &str) -> Option<&str> {
    let digits_from = token
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    Some(&token[digits_from..])
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Landing => f.write_str("/"),
            Route::Welcome => f.write_str("/welcome"),
            Route::Login => f.write_str("/login"),
            Route::Register => f.write_str("/register"),
            Route::Home => f.write_str("/home"),
            Route::Profile => f.write_str("/profile"),
            Route::Timetable => f.write_str("/timetable"),
            Route::Recordings => f.write_str("/recordings"),
            Route::Subject { subject } => write!(f, "/recording/{subject}"),
            Route::Lessons {
                subject,
                lesson_type,
            } => write!(f, "/recording/{subject}/{lesson_type}"),
            Route::Lesson {
                subject,
                lesson_type,
                day,
            } => write!(f, "/recording/{subject}/{lesson_type}/lesson{day}"),
            Route::AdminPanel => f.write_str("/adminpanel"),
            Route::Unknown(path) => f.write_str(path),
        }
    }
}
