//! crates/study_tracker_core/src/router.rs
//!
//! The hash router: resolves the current path against the session, loads the
//! page's data through the cache, and hands a complete frame to the shell.
//!
//! Everything the router touches comes in through [`AppContext`]; there is no
//! ambient state. Session, cache, and background tasks are only mutated from
//! the router's own handlers (`dispatch`, `on_auth_state_changed`, `execute`).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use futures::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::access::{authorize, can_edit_lesson_content, Access, AccessPolicy};
use crate::activity::{heartbeat_job, live_stats_task, LiveStats};
use crate::cache::{keys, Caches};
use crate::commands::{Command, CommandOutcome, Confirmation, PendingAction};
use crate::config::CoreConfig;
use crate::domain::{lesson_id, Identity, Lesson, Session, Theme, UserProfile};
use crate::error::{AppError, AppResult};
use crate::ports::{Clock, NotificationFeed, Preferences, SessionProvider, Shell};
use crate::reorder::{self, MoveOutcome};
use crate::route::Route;
use crate::stats::{
    total_hours, StudyStats, DEFAULT_DAILY_GOAL, DEFAULT_SERIES_DAYS, SERIES_DAY_CHOICES,
};
use crate::store::StudyStore;
use crate::tasks::{TaskRegistry, ACTIVITY_HEARTBEAT, ADMIN_LIVE_STATS};
use crate::views::{lesson_summaries, AdminView, Frame, Header, Notice, View};

/// Longest redirect chain a single dispatch follows (`/x` -> `/welcome` -> `/login`).
const MAX_REDIRECTS: usize = 4;

/// The collaborators a router is built from.
#[derive(Clone)]
pub struct AppContext {
    pub store: StudyStore,
    pub shell: Arc<dyn Shell>,
    pub sessions: Arc<dyn SessionProvider>,
    pub notifications: Arc<dyn NotificationFeed>,
    pub preferences: Arc<dyn Preferences>,
    pub clock: Arc<dyn Clock>,
    pub config: CoreConfig,
}

struct RouterState {
    path: String,
    session: Option<Arc<Session>>,
    theme: Theme,
    /// Bumped on every dispatch; a load finishing under an older value is stale.
    generation: u64,
    pending: HashMap<Uuid, PendingAction>,
    /// Days shown in the home chart.
    series_days: u32,
}

pub struct Router {
    ctx: AppContext,
    policy: AccessPolicy,
    caches: Caches,
    tasks: TaskRegistry,
    state: Mutex<RouterState>,
}

impl Router {
    pub fn new(ctx: AppContext) -> Self {
        let theme = ctx
            .preferences
            .get(Theme::STORAGE_KEY)
            .map(|v| Theme::parse(&v))
            .unwrap_or_default();
        Self {
            policy: ctx.config.access_policy(),
            caches: Caches::new(ctx.clock.clone(), ctx.config.cache_capacity),
            tasks: TaskRegistry::new(),
            state: Mutex::new(RouterState {
                path: String::new(),
                session: None,
                theme,
                generation: 0,
                pending: HashMap::new(),
                series_days: DEFAULT_SERIES_DAYS,
            }),
            ctx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RouterState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn current_path(&self) -> String {
        self.lock().path.clone()
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.lock().session.clone()
    }

    pub fn theme(&self) -> Theme {
        self.lock().theme
    }

    pub fn series_days(&self) -> u32 {
        self.lock().series_days
    }

    //=====================================================================================
    // Navigation
    //=====================================================================================

    /// Moves the visible location to `path` and renders it.
    pub async fn navigate(&self, path: &str) {
        self.ctx.shell.set_location(path);
        self.lock().path = path.to_string();
        self.dispatch().await;
    }

    /// Called by the host when the location changed underneath the router
    /// (back button, typed URL).
    pub async fn on_location_changed(&self, path: &str) {
        self.lock().path = path.to_string();
        self.dispatch().await;
    }

    /// Renders whatever the current path resolves to for the current session.
    pub async fn dispatch(&self) {
        let (generation, path, session) = {
            let mut state = self.lock();
            state.generation += 1;
            (state.generation, state.path.clone(), state.session.clone())
        };
        let uid = session.as_ref().map(|s| s.uid.clone());
        debug!(%path, generation, "dispatching");

        let Some(route) = self.resolve(Route::parse(&path), session.as_deref()) else {
            warn!(%path, "redirect limit reached, not rendering");
            return;
        };
        let resolved = route.to_string();
        if resolved != path {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            state.path = resolved.clone();
            drop(state);
            self.ctx.shell.set_location(&resolved);
        }

        if route != Route::AdminPanel {
            self.tasks.cancel(ADMIN_LIVE_STATS);
        }

        let loaded = self.load_view(&route, session.as_deref()).await;
        let header = match &session {
            Some(session) => Some(self.header(session).await),
            None => None,
        };

        if !self.is_current(generation, uid.as_deref()) {
            debug!(path = %resolved, generation, "discarding stale render");
            return;
        }

        match loaded {
            Ok(view) => {
                self.ctx.shell.render(Frame {
                    path: resolved,
                    header,
                    view,
                    nav: session.as_ref().and_then(|_| route.nav_section()),
                });
                if route == Route::AdminPanel {
                    self.start_live_stats();
                }
            }
            Err(e) => {
                warn!(path = %resolved, error = %e, "failed to load view");
                self.ctx.shell.notice(Notice::Error(e.to_string()));
            }
        }
    }

    /// Follows redirects until a route can be rendered as-is.
    fn resolve(&self, mut route: Route, session: Option<&Session>) -> Option<Route> {
        for _ in 0..=MAX_REDIRECTS {
            let next = match authorize(&route, session) {
                Access::Granted => match &route {
                    // `/` and `/welcome` are aliases, not pages.
                    Route::Landing | Route::Welcome => Some(Route::Login),
                    Route::Unknown(_) if session.is_some() => Some(Route::Home),
                    _ => None,
                },
                Access::Redirect(to) => Some(to),
                Access::Denied { redirect } => {
                    warn!(route = %route, "access denied");
                    self.ctx.shell.notice(Notice::AccessDenied);
                    Some(redirect)
                }
            };
            match next {
                Some(to) => {
                    debug!(from = %route, to = %to, "redirecting");
                    route = to;
                }
                None => return Some(route),
            }
        }
        None
    }

    fn is_current(&self, generation: u64, uid: Option<&str>) -> bool {
        let state = self.lock();
        state.generation == generation && state.session.as_ref().map(|s| s.uid.as_str()) == uid
    }

    async fn header(&self, session: &Session) -> Header {
        let profile = match self.cached_profile(&session.uid).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(uid = %session.uid, error = %e, "header profile unavailable");
                None
            }
        };
        Header::build(session, profile.as_ref(), self.theme())
    }

    async fn cached_profile(&self, uid: &str) -> AppResult<Option<UserProfile>> {
        let store = &self.ctx.store;
        Ok(self
            .caches
            .profile
            .get(&keys::profile(uid), self.ctx.config.profile_ttl, || {
                store.profile(uid)
            })
            .await?)
    }

    async fn load_view(&self, route: &Route, session: Option<&Session>) -> AppResult<View> {
        let store = &self.ctx.store;
        let config = &self.ctx.config;
        let session = match (route, session) {
            (Route::Login, _) => return Ok(View::Login),
            (Route::Register, _) => return Ok(View::Register),
            (_, Some(session)) => session,
            (_, None) => return Err(AppError::Forbidden("sign in required".to_string())),
        };
        let uid = session.uid.as_str();

        let view = match route {
            Route::Home => {
                let goal = self
                    .cached_profile(uid)
                    .await?
                    .and_then(|p| p.daily_goal)
                    .unwrap_or(DEFAULT_DAILY_GOAL);
                let logs = store.study_logs(uid).await?;
                View::Home(StudyStats::compute(
                    &logs,
                    self.today(),
                    self.series_days(),
                    goal,
                ))
            }
            Route::Profile => {
                // Always fresh on the profile page itself.
                let profile = store.profile(uid).await?;
                self.caches.profile.put(&keys::profile(uid), profile.clone());
                View::Profile(profile.unwrap_or_default())
            }
            Route::Timetable => View::Timetable(
                self.caches
                    .timetable
                    .get(&keys::timetable(uid), config.timetable_ttl, || {
                        store.timetable(uid)
                    })
                    .await?,
            ),
            Route::Recordings => View::subjects(),
            Route::Subject { subject } => View::lesson_types(subject),
            Route::Lessons {
                subject,
                lesson_type,
            } => View::Lessons {
                subject: subject.clone(),
                lesson_type: lesson_type.clone(),
                lessons: lesson_summaries(&store.lessons(subject, lesson_type).await?),
                can_edit: can_edit_lesson_content(session, subject),
            },
            Route::Lesson {
                subject,
                lesson_type,
                day,
            } => {
                let id = lesson_id(subject, lesson_type, day);
                let items = self
                    .caches
                    .lesson_content
                    .get(&keys::lesson_content(&id), config.lesson_content_ttl, || {
                        store.lesson_contents(&id)
                    })
                    .await?;
                View::LessonContent {
                    subject: subject.clone(),
                    lesson_type: lesson_type.clone(),
                    day: day.clone(),
                    lesson_id: id,
                    items,
                    can_edit: can_edit_lesson_content(session, subject),
                }
            }
            Route::AdminPanel => {
                let users = store.list_users().await?;
                View::Admin(AdminView {
                    total_users: users.len(),
                    users,
                    stats: LiveStats::default(),
                })
            }
            Route::Landing | Route::Welcome | Route::Login | Route::Register | Route::Unknown(_) => {
                return Err(AppError::InvalidInput(format!("{route} has no view")));
            }
        };
        Ok(view)
    }

    fn start_live_stats(&self) {
        let store = self.ctx.store.clone();
        let clock = self.ctx.clock.clone();
        let shell = self.ctx.shell.clone();
        let period = self.ctx.config.live_stats_period;
        let window = self.ctx.config.active_window;
        self.tasks.start(ADMIN_LIVE_STATS, move |cancel| {
            live_stats_task(store, clock, shell, period, window, cancel)
        });
    }

    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.ctx.clock.now_ms()).unwrap_or_default()
    }

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    //=====================================================================================
    // Session
    //=====================================================================================

    /// Consumes the session provider's change stream until it ends.
    pub async fn follow_session(self: Arc<Self>) {
        let mut changes = self.ctx.sessions.changes();
        while let Some(identity) = changes.next().await {
            self.on_auth_state_changed(identity).await;
        }
        debug!("session stream ended");
    }

    /// Replaces the session wholesale and runs the transition side effects.
    pub async fn on_auth_state_changed(&self, identity: Option<Identity>) {
        let was_landing = Route::parse(&self.current_path()).is_landing();
        let signed_in = identity.clone();
        match self.apply_session(identity) {
            Some(session) => {
                if let Some(identity) = &signed_in {
                    self.ensure_profile(identity).await;
                }
                if was_landing {
                    self.navigate("/home").await;
                } else {
                    self.dispatch().await;
                }
                debug!(uid = %session.uid, "session applied");
            }
            None => self.dispatch().await,
        }
    }

    /// Creates the `users` document on a first sign-in so profile writes have
    /// something to update. A failure is logged and the session carries on.
    async fn ensure_profile(&self, identity: &Identity) {
        let created_at = self.now().to_rfc3339();
        match self.ctx.store.ensure_profile(identity, &created_at).await {
            Ok(true) => {
                self.caches.profile.invalidate(&keys::profile(&identity.uid));
                info!(uid = %identity.uid, "profile created");
            }
            Ok(false) => {}
            Err(e) => warn!(uid = %identity.uid, error = %e, "could not create profile"),
        }
    }

    fn apply_session(&self, identity: Option<Identity>) -> Option<Arc<Session>> {
        let session = identity.map(|identity| Arc::new(self.policy.session_for(identity)));
        let previous = {
            let mut state = self.lock();
            state.pending.clear();
            std::mem::replace(&mut state.session, session.clone())
        };

        let same_user = match (&previous, &session) {
            (Some(prev), Some(next)) => prev.uid == next.uid,
            _ => false,
        };
        if let Some(prev) = previous.as_ref().filter(|_| !same_user) {
            self.tasks.cancel_all();
            self.caches.forget_user(&prev.uid);
            info!(uid = %prev.uid, "signed out, per-user state dropped");
        }

        match &session {
            Some(session) => {
                if !same_user || !self.tasks.is_running(ACTIVITY_HEARTBEAT) {
                    self.tasks.start_periodic(
                        ACTIVITY_HEARTBEAT,
                        self.ctx.config.heartbeat_period,
                        true,
                        heartbeat_job(
                            self.ctx.store.clone(),
                            self.ctx.clock.clone(),
                            session.uid.clone(),
                        ),
                    );
                }
                self.ctx.notifications.listen(Some(session));
                info!(uid = %session.uid, admin = session.is_admin, "signed in");
            }
            None => {
                self.tasks.cancel_all();
                self.ctx.notifications.listen(None);
            }
        }
        session
    }

    //=====================================================================================
    // Commands
    //=====================================================================================

    /// Runs a command. Failures are logged, shown as a notice, and returned.
    pub async fn execute(&self, command: Command) -> AppResult<CommandOutcome> {
        let name = command.name();
        debug!(command = name, "executing");
        let result = self.run(command).await;
        if let Err(e) = &result {
            warn!(command = name, error = %e, "command failed");
            self.ctx.shell.notice(Notice::Error(e.to_string()));
        }
        result
    }

    async fn run(&self, command: Command) -> AppResult<CommandOutcome> {
        let store = &self.ctx.store;
        match command {
            Command::Navigate(path) => {
                self.navigate(&path).await;
            }
            Command::SignOut => {
                self.ctx.sessions.sign_out().await?;
                self.apply_session(None);
                self.navigate("/login").await;
            }
            Command::ToggleTheme => {
                let theme = {
                    let mut state = self.lock();
                    state.theme = state.theme.toggled();
                    state.theme
                };
                self.ctx.preferences.set(Theme::STORAGE_KEY, theme.as_str());
                self.dispatch().await;
            }
            Command::SetChartRange(days) => {
                if !SERIES_DAY_CHOICES.contains(&days) {
                    return Err(AppError::InvalidInput(format!(
                        "chart range must be one of {SERIES_DAY_CHOICES:?} days, got {days}"
                    )));
                }
                let changed = std::mem::replace(&mut self.lock().series_days, days) != days;
                if !changed {
                    return Ok(CommandOutcome::Unchanged);
                }
                self.dispatch().await;
            }
            Command::SetDailyGoal(hours) => {
                let session = self.require_session()?;
                if !hours.is_finite() || hours <= 0.0 || hours > 24.0 {
                    return Err(AppError::InvalidInput(format!(
                        "daily goal must be between 0 and 24 hours, got {hours}"
                    )));
                }
                store.set_daily_goal(&session.uid, hours).await?;
                self.caches.profile.invalidate(&keys::profile(&session.uid));
                self.dispatch().await;
            }
            Command::LogStudy { date, hours } => {
                let session = self.require_session()?;
                if NaiveDate::parse_from_str(&date, "%Y-%m-%d").is_err() {
                    return Err(AppError::InvalidInput(format!("not a date: {date}")));
                }
                if !hours.is_finite() || !(0.0..=24.0).contains(&hours) {
                    return Err(AppError::InvalidInput(format!(
                        "hours must be between 0 and 24, got {hours}"
                    )));
                }
                let now = self.now().to_rfc3339();
                store.log_study(&session.uid, &date, hours, &now).await?;
                self.dispatch().await;
            }
            Command::SaveTimetable(timetable) => {
                let session = self.require_session()?;
                let timetable = timetable.compacted();
                store.save_timetable(&session.uid, &timetable).await?;
                self.caches
                    .timetable
                    .put(&keys::timetable(&session.uid), timetable);
                self.ctx
                    .shell
                    .notice(Notice::Info("Timetable saved".to_string()));
                self.dispatch().await;
            }
            Command::UpdateProfile(update) => {
                let session = self.require_session()?;
                store.update_profile(&session.uid, &update).await?;
                self.caches.profile.invalidate(&keys::profile(&session.uid));
                self.ctx
                    .shell
                    .notice(Notice::Info("Profile updated".to_string()));
                self.dispatch().await;
            }
            Command::SetProfilePhoto(url) => {
                let session = self.require_session()?;
                if url.trim().is_empty() {
                    return Err(AppError::InvalidInput("photo URL is empty".to_string()));
                }
                store.set_photo_url(&session.uid, url.trim()).await?;
                self.caches.profile.invalidate(&keys::profile(&session.uid));
                self.dispatch().await;
            }
            Command::RenameLesson {
                subject,
                lesson_type,
                day,
                title,
            } => {
                self.require_editor(&subject)?;
                let title = title.trim();
                if title.is_empty() {
                    return Err(AppError::InvalidInput("lesson title is empty".to_string()));
                }
                store
                    .rename_lesson(&Lesson {
                        subject,
                        lesson_type,
                        day,
                        title: title.to_string(),
                        updated_at: Some(self.ctx.clock.now_ms()),
                    })
                    .await?;
                self.dispatch().await;
            }
            Command::AddContent {
                subject,
                lesson_type,
                day,
                text,
                link,
            } => {
                self.require_editor(&subject)?;
                if text.trim().is_empty() || link.trim().is_empty() {
                    return Err(AppError::InvalidInput(
                        "content needs both text and a link".to_string(),
                    ));
                }
                let id = lesson_id(&subject, &lesson_type, &day);
                store
                    .add_content(&id, text.trim(), link.trim(), self.ctx.clock.now_ms())
                    .await?;
                self.caches.lesson_content.invalidate(&keys::lesson_content(&id));
                self.dispatch().await;
            }
            Command::EditContent {
                subject,
                lesson_id,
                item_id,
                text,
                link,
            } => {
                self.require_editor(&subject)?;
                if text.trim().is_empty() || link.trim().is_empty() {
                    return Err(AppError::InvalidInput(
                        "content needs both text and a link".to_string(),
                    ));
                }
                store.edit_content(&item_id, text.trim(), link.trim()).await?;
                self.caches
                    .lesson_content
                    .invalidate(&keys::lesson_content(&lesson_id));
                self.dispatch().await;
            }
            Command::MoveContent {
                subject,
                lesson_id,
                item_id,
                index,
                direction,
            } => {
                self.require_editor(&subject)?;
                let outcome =
                    reorder::move_item(store, &item_id, index, &lesson_id, direction).await?;
                if outcome == MoveOutcome::Unchanged {
                    return Ok(CommandOutcome::Unchanged);
                }
                self.caches
                    .lesson_content
                    .invalidate(&keys::lesson_content(&lesson_id));
                self.dispatch().await;
            }
            Command::RequestDeleteContent {
                subject,
                lesson_id,
                item_id,
            } => {
                self.require_editor(&subject)?;
                return Ok(self.park(PendingAction::DeleteContent {
                    subject,
                    lesson_id,
                    item_id,
                }));
            }
            Command::RequestDeleteUser { uid } => {
                self.require_admin()?;
                return Ok(self.park(PendingAction::DeleteUser { uid }));
            }
            Command::Confirm(id) => {
                let action = self
                    .lock()
                    .pending
                    .remove(&id)
                    .ok_or(AppError::UnknownConfirmation(id))?;
                self.commit(action).await?;
                self.dispatch().await;
            }
            Command::Cancel(id) => {
                self.lock()
                    .pending
                    .remove(&id)
                    .ok_or(AppError::UnknownConfirmation(id))?;
                debug!(%id, "confirmation cancelled");
                return Ok(CommandOutcome::Unchanged);
            }
        }
        Ok(CommandOutcome::Done)
    }

    fn park(&self, action: PendingAction) -> CommandOutcome {
        let id = Uuid::new_v4();
        let prompt = action.prompt();
        self.lock().pending.insert(id, action);
        debug!(%id, "awaiting confirmation");
        CommandOutcome::NeedsConfirmation(Confirmation { id, prompt })
    }

    async fn commit(&self, action: PendingAction) -> AppResult<()> {
        match action {
            PendingAction::DeleteContent {
                subject,
                lesson_id,
                item_id,
            } => {
                // Permissions may have changed since the request.
                self.require_editor(&subject)?;
                reorder::remove_item(&self.ctx.store, &item_id).await?;
                self.caches
                    .lesson_content
                    .invalidate(&keys::lesson_content(&lesson_id));
                info!(%item_id, %lesson_id, "lesson content removed");
            }
            PendingAction::DeleteUser { uid } => {
                self.require_admin()?;
                self.ctx.store.delete_user(&uid).await?;
                self.caches.forget_user(&uid);
                info!(%uid, "user deleted");
            }
        }
        Ok(())
    }

    fn require_session(&self) -> AppResult<Arc<Session>> {
        self.session()
            .ok_or_else(|| AppError::Forbidden("sign in required".to_string()))
    }

    fn require_editor(&self, subject: &str) -> AppResult<Arc<Session>> {
        let session = self.require_session()?;
        if !can_edit_lesson_content(&session, subject) {
            return Err(AppError::Forbidden(format!(
                "{} may not edit {subject}",
                session.uid
            )));
        }
        Ok(session)
    }

    fn require_admin(&self) -> AppResult<Arc<Session>> {
        let session = self.require_session()?;
        if !session.is_admin {
            return Err(AppError::Forbidden("admin only".to_string()));
        }
        Ok(session)
    }

    /// All hours a user has ever logged; shown on the admin page per user.
    pub async fn user_study_hours(&self, uid: &str) -> AppResult<f64> {
        self.require_admin()?;
        Ok(total_hours(&self.ctx.store.study_logs(uid).await?))
    }
}
