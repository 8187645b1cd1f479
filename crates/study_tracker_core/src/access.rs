//! crates/study_tracker_core/src/access.rs
//!
//! Authorization decisions. Everything here is pure and is re-evaluated on
//! every render, so a replaced session takes effect immediately.

use std::collections::BTreeSet;

use crate::domain::{Identity, Session};
use crate::route::{Route, RouteCategory};

/// Who is an admin and who moderates which subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    pub admin_uid: Option<String>,
    pub moderator_uids: Vec<String>,
    pub moderated_subject: String,
}

impl AccessPolicy {
    pub fn session_for(&self, identity: Identity) -> Session {
        let is_admin = self.admin_uid.as_deref() == Some(identity.uid.as_str());
        let mut moderator_scopes = BTreeSet::new();
        if self.moderator_uids.iter().any(|m| *m == identity.uid) {
            moderator_scopes.insert(self.moderated_subject.clone());
        }
        let display_name = if is_admin {
            "Admin".to_string()
        } else {
            identity
                .display_name
                .clone()
                .unwrap_or_else(|| "User".to_string())
        };
        Session {
            uid: identity.uid,
            display_name,
            email: identity.email,
            photo_url: identity.photo_url,
            is_admin,
            moderator_scopes,
        }
    }
}

/// Admins may edit any lesson; moderators only the subject they are scoped to.
pub fn can_edit_lesson_content(session: &Session, subject: &str) -> bool {
    session.is_admin || session.moderates(subject)
}

/// Outcome of checking a route against the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Granted,
    Redirect(Route),
    /// Signed in but not privileged enough; show a denial, then redirect.
    Denied { redirect: Route },
}

pub fn authorize(route: &Route, session: Option<&Session>) -> Access {
    match (route.category(), session) {
        (RouteCategory::Public, _) => Access::Granted,
        (_, None) => Access::Redirect(Route::Welcome),
        (RouteCategory::AdminOnly, Some(s)) if !s.is_admin => Access::Denied {
            redirect: Route::Home,
        },
        (_, Some(_)) => Access::Granted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> AccessPolicy {
        AccessPolicy {
            admin_uid: Some("root".into()),
            moderator_uids: vec!["mod-1".into(), "mod-2".into()],
            moderated_subject: "physics-nilantha".into(),
        }
    }

    fn session(uid: &str) -> Session {
        policy().session_for(Identity::new(uid))
    }

    #[test]
    fn moderators_edit_only_their_subject() {
        assert!(can_edit_lesson_content(&session("mod-1"), "physics-nilantha"));
        assert!(!can_edit_lesson_content(&session("mod-1"), "physics"));
        assert!(!can_edit_lesson_content(&session("student"), "physics-nilantha"));
    }

    #[test]
    fn admin_edits_everything() {
        let admin = session("root");
        assert_eq!(admin.display_name, "Admin");
        for subject in ["maths", "physics", "physics-nilantha"] {
            assert!(can_edit_lesson_content(&admin, subject));
        }
    }

    #[test]
    fn route_authorization() {
        let student = session("student");
        let admin = session("root");
        assert_eq!(authorize(&Route::Login, None), Access::Granted);
        assert_eq!(
            authorize(&Route::Timetable, None),
            Access::Redirect(Route::Welcome)
        );
        assert_eq!(authorize(&Route::Timetable, Some(&student)), Access::Granted);
        assert_eq!(
            authorize(&Route::AdminPanel, Some(&student)),
            Access::Denied {
                redirect: Route::Home
            }
        );
        assert_eq!(authorize(&Route::AdminPanel, Some(&admin)), Access::Granted);
    }
}
