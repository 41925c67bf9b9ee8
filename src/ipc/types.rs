use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::schedule::{EventZone, DEFAULT_ZONE};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub zone: EventZone,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
            zone: DEFAULT_ZONE,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
