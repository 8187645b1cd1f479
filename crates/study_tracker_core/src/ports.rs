//! crates/study_tracker_core/src/ports.rs
//!
//! Defines the service contracts (traits) the core talks through.
//! These traits form the boundary of the hexagonal architecture: the remote
//! document store, the session provider, and the visual host are all adapters
//! plugged in from outside.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{Map, Value};

use crate::activity::LiveStats;
use crate::domain::{Identity, Session};
use crate::views::{Frame, Notice};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., network, missing documents).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Document Gateway
//=========================================================================================

/// A stored document body.
pub type Document = Map<String, Value>;

/// A document as returned by a query: its id plus its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub id: String,
    pub data: Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Equality filters over one collection with an optional single-field ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<(String, Direction)>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }
}

/// One write inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Set {
        collection: String,
        id: String,
        data: Document,
        merge: bool,
    },
    Update {
        collection: String,
        id: String,
        data: Document,
    },
    Delete {
        collection: String,
        id: String,
    },
}

/// A group of writes committed all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    pub ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, collection: &str, id: &str, data: Document) -> &mut Self {
        self.ops.push(WriteOp::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
        });
        self
    }

    pub fn delete(&mut self, collection: &str, id: &str) -> &mut Self {
        self.ops.push(WriteOp::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        self
    }
}

/// The remote document store.
#[async_trait]
pub trait DocumentGateway: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> PortResult<Option<Document>>;

    /// Writes a document, replacing it unless `merge` is set.
    async fn set(&self, collection: &str, id: &str, data: Document, merge: bool) -> PortResult<()>;

    /// Merges fields into an existing document; fails with `NotFound` otherwise.
    async fn update(&self, collection: &str, id: &str, data: Document) -> PortResult<()>;

    /// Stores a new document under a generated id and returns that id.
    async fn add(&self, collection: &str, data: Document) -> PortResult<String>;

    async fn delete(&self, collection: &str, id: &str) -> PortResult<()>;

    async fn query(&self, query: &Query) -> PortResult<Vec<DocumentSnapshot>>;

    /// Applies every op in the batch or none of them.
    async fn commit(&self, batch: WriteBatch) -> PortResult<()>;

    /// Streams the full result set of `query`, once immediately and again after
    /// every change to the queried collection.
    fn subscribe(&self, query: Query) -> BoxStream<'static, PortResult<Vec<DocumentSnapshot>>>;
}

//=========================================================================================
// Session, Host, and Local Ports
//=========================================================================================

/// Supplies the signed-in identity and its changes.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Yields the new identity (or `None`) on every auth-state change.
    fn changes(&self) -> BoxStream<'static, Option<Identity>>;

    async fn sign_out(&self) -> PortResult<()>;
}

/// The visual host: owns the location bar and draws whatever the router hands it.
pub trait Shell: Send + Sync {
    /// Reflects a navigation in the externally observable location.
    fn set_location(&self, path: &str);

    fn render(&self, frame: Frame);

    /// Shows a transient message without replacing the current view.
    fn notice(&self, notice: Notice);

    /// Pushes refreshed admin counters into the admin view.
    fn live_stats(&self, stats: LiveStats);
}

/// Push-notification listener for the signed-in user.
pub trait NotificationFeed: Send + Sync {
    /// Starts listening for `session`, or stops when `None`.
    fn listen(&self, session: Option<&Session>);
}

/// Small client-local key/value store.
pub trait Preferences: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
}

/// Wall-clock source, in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}
