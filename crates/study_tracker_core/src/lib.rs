pub mod access;
pub mod activity;
pub mod cache;
pub mod commands;
pub mod config;
pub mod domain;
pub mod error;
pub mod memory;
pub mod ports;
pub mod reorder;
pub mod route;
pub mod router;
pub mod stats;
pub mod store;
pub mod tasks;
pub mod views;

pub use access::{can_edit_lesson_content, AccessPolicy};
pub use cache::TtlCache;
pub use commands::{Command, CommandOutcome};
pub use config::{ConfigError, CoreConfig};
pub use domain::{Identity, LessonContentItem, Session, Theme};
pub use error::{AppError, AppResult};
pub use memory::MemoryGateway;
pub use ports::{
    Clock, DocumentGateway, NotificationFeed, PortError, PortResult, Preferences,
    SessionProvider, Shell, SystemClock,
};
pub use route::Route;
pub use router::{AppContext, Router};
pub use store::StudyStore;
