//! crates/study_tracker_core/src/store.rs
//!
//! Typed reads and writes over the `DocumentGateway` port, one method per
//! access pattern the views need. Conversion between domain structs and raw
//! documents goes through `serde_json`.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::domain::{
    lesson_id, Identity, Lesson, LessonContentItem, ProfileUpdate, StudyLog, Timetable, UserActivity,
    UserProfile, UserRecord,
};
use crate::ports::{
    Direction, Document, DocumentGateway, DocumentSnapshot, PortError, PortResult, Query,
};

pub const USERS: &str = "users";
pub const STUDY_LOGS: &str = "studyLogs";
pub const TIMETABLE: &str = "timetable";
pub const LESSON_CONTENTS: &str = "lessonContents";
pub const LESSONS: &str = "lessons";
pub const USER_ACTIVITY: &str = "userActivity";

pub(crate) fn encode<T: Serialize>(value: &T) -> PortResult<Document> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(PortError::Unexpected(format!(
            "expected an object document, got {other}"
        ))),
        Err(e) => Err(PortError::Unexpected(e.to_string())),
    }
}

pub(crate) fn decode<T: DeserializeOwned>(data: Document) -> PortResult<T> {
    serde_json::from_value(Value::Object(data)).map_err(|e| PortError::Unexpected(e.to_string()))
}

pub(crate) fn fields(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

fn content_item(snapshot: DocumentSnapshot) -> PortResult<LessonContentItem> {
    let mut item: LessonContentItem = decode(snapshot.data)?;
    item.id = snapshot.id;
    Ok(item)
}

/// Typed access to the remote collections.
#[derive(Clone)]
pub struct StudyStore {
    gateway: Arc<dyn DocumentGateway>,
}

impl StudyStore {
    pub fn new(gateway: Arc<dyn DocumentGateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Arc<dyn DocumentGateway> {
        &self.gateway
    }

    // --- Users ---

    pub async fn profile(&self, uid: &str) -> PortResult<Option<UserProfile>> {
        match self.gateway.get(USERS, uid).await? {
            Some(data) => Ok(Some(decode(data)?)),
            None => Ok(None),
        }
    }

    /// Writes a starter profile for `identity` unless one exists already.
    /// Returns whether a document was created.
    pub async fn ensure_profile(&self, identity: &Identity, created_at: &str) -> PortResult<bool> {
        if self.gateway.get(USERS, &identity.uid).await?.is_some() {
            return Ok(false);
        }
        let profile = UserProfile {
            first_name: identity.display_name.clone(),
            email: identity.email.clone(),
            photo_url: identity.photo_url.clone(),
            created_at: Some(created_at.to_string()),
            ..UserProfile::default()
        };
        self.gateway
            .set(USERS, &identity.uid, encode(&profile)?, true)
            .await?;
        Ok(true)
    }

    pub async fn list_users(&self) -> PortResult<Vec<UserRecord>> {
        self.gateway
            .query(&Query::collection(USERS))
            .await?
            .into_iter()
            .map(|snap| {
                Ok(UserRecord {
                    id: snap.id,
                    profile: decode(snap.data)?,
                })
            })
            .collect()
    }

    pub async fn update_profile(&self, uid: &str, update: &ProfileUpdate) -> PortResult<()> {
        let data = fields(json!({
            "firstName": update.first_name,
            "school": update.school,
            "phone": update.phone,
            "birthday": update.birthday,
        }));
        self.gateway.update(USERS, uid, data).await
    }

    pub async fn set_photo_url(&self, uid: &str, photo_url: &str) -> PortResult<()> {
        self.gateway
            .update(USERS, uid, fields(json!({ "photoURL": photo_url })))
            .await
    }

    pub async fn set_daily_goal(&self, uid: &str, hours: f64) -> PortResult<()> {
        self.gateway
            .update(USERS, uid, fields(json!({ "dailyGoal": hours })))
            .await
    }

    pub async fn delete_user(&self, uid: &str) -> PortResult<()> {
        self.gateway.delete(USERS, uid).await
    }

    // --- Study logs ---

    pub async fn study_logs(&self, uid: &str) -> PortResult<Vec<StudyLog>> {
        self.gateway
            .query(&Query::collection(STUDY_LOGS).where_eq("userId", uid))
            .await?
            .into_iter()
            .map(|snap| decode(snap.data))
            .collect()
    }

    /// Records `hours` for `date`, replacing any earlier entry for that day.
    pub async fn log_study(&self, uid: &str, date: &str, hours: f64, now: &str) -> PortResult<()> {
        let existing = self
            .gateway
            .query(
                &Query::collection(STUDY_LOGS)
                    .where_eq("userId", uid)
                    .where_eq("date", date),
            )
            .await?;
        match existing.first() {
            Some(snap) => {
                self.gateway
                    .update(STUDY_LOGS, &snap.id, fields(json!({ "hours": hours })))
                    .await
            }
            None => {
                let log = StudyLog {
                    user_id: uid.to_string(),
                    date: date.to_string(),
                    hours,
                    created_at: Some(now.to_string()),
                };
                self.gateway.add(STUDY_LOGS, encode(&log)?).await.map(|_| ())
            }
        }
    }

    // --- Timetable ---

    pub async fn timetable(&self, uid: &str) -> PortResult<Timetable> {
        match self.gateway.get(TIMETABLE, uid).await? {
            Some(data) => decode(data),
            None => Ok(Timetable::default()),
        }
    }

    pub async fn save_timetable(&self, uid: &str, timetable: &Timetable) -> PortResult<()> {
        self.gateway
            .set(TIMETABLE, uid, encode(timetable)?, false)
            .await
    }

    // --- Lessons ---

    pub async fn lessons(&self, subject: &str, lesson_type: &str) -> PortResult<Vec<Lesson>> {
        self.gateway
            .query(
                &Query::collection(LESSONS)
                    .where_eq("subject", subject)
                    .where_eq("type", lesson_type),
            )
            .await?
            .into_iter()
            .map(|snap| decode(snap.data))
            .collect()
    }

    pub async fn rename_lesson(&self, lesson: &Lesson) -> PortResult<()> {
        let id = lesson_id(&lesson.subject, &lesson.lesson_type, &lesson.day);
        self.gateway.set(LESSONS, &id, encode(lesson)?, false).await
    }

    // --- Lesson content ---

    /// All items of one lesson, ordered by their `order` field.
    pub async fn lesson_contents(&self, lesson_id: &str) -> PortResult<Vec<LessonContentItem>> {
        self.gateway
            .query(
                &Query::collection(LESSON_CONTENTS)
                    .where_eq("lessonId", lesson_id)
                    .order_by("order", Direction::Ascending),
            )
            .await?
            .into_iter()
            .map(content_item)
            .collect()
    }

    /// Appends an item at the end of the lesson.
    pub async fn add_content(
        &self,
        lesson_id: &str,
        text: &str,
        link: &str,
        created_at: i64,
    ) -> PortResult<String> {
        let count = self
            .gateway
            .query(&Query::collection(LESSON_CONTENTS).where_eq("lessonId", lesson_id))
            .await?
            .len();
        let order = u32::try_from(count + 1)
            .map_err(|_| PortError::Unexpected("too many content items".to_string()))?;
        let item = LessonContentItem {
            id: String::new(),
            lesson_id: lesson_id.to_string(),
            text: text.to_string(),
            link: link.to_string(),
            order,
            created_at,
        };
        self.gateway.add(LESSON_CONTENTS, encode(&item)?).await
    }

    pub async fn edit_content(&self, id: &str, text: &str, link: &str) -> PortResult<()> {
        self.gateway
            .update(LESSON_CONTENTS, id, fields(json!({ "text": text, "link": link })))
            .await
    }

    // --- Activity ---

    /// Marks `uid` as active now, creating the day's record if needed.
    pub async fn touch_activity(&self, uid: &str, date: &str, now_ms: i64) -> PortResult<()> {
        let activity = UserActivity {
            user_id: uid.to_string(),
            date: date.to_string(),
            last_active: now_ms,
        };
        self.gateway
            .set(USER_ACTIVITY, &format!("{uid}_{date}"), encode(&activity)?, true)
            .await
    }

    pub fn activity_query(date: &str) -> Query {
        Query::collection(USER_ACTIVITY).where_eq("date", date)
    }
}
