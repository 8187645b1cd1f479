//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::adapters::ImageStore;
use crate::config::Config;
use crate::error::ApiError;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub images: Arc<ImageStore>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, ApiError> {
        let images = ImageStore::from_config(&config)?;
        Ok(Self {
            config: Arc::new(config),
            images: Arc::new(images),
        })
    }
}
