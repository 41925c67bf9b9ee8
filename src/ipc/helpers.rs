use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::de::DeserializeOwned;

use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    let value = req
        .params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))?;
    if value.is_empty() {
        return Err(err(
            &req.id,
            "bad_params",
            format!("{} must not be empty", key),
            None,
        ));
    }
    Ok(value)
}

pub fn db_conn<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// `params.now` as RFC 3339, or the wall clock when absent.
pub fn now_param(req: &Request) -> Result<DateTime<Utc>, serde_json::Value> {
    match req.params.get("now") {
        None | Some(serde_json::Value::Null) => Ok(Utc::now()),
        Some(serde_json::Value::String(s)) => DateTime::parse_from_rfc3339(s.trim())
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| err(&req.id, "bad_params", format!("invalid now: {e}"), None)),
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            "now must be an RFC 3339 string",
            None,
        )),
    }
}

pub fn typed_param<T: DeserializeOwned>(
    req: &Request,
    key: &str,
) -> Result<T, serde_json::Value> {
    let Some(raw) = req.params.get(key) else {
        return Err(err(&req.id, "bad_params", format!("missing {}", key), None));
    };
    serde_json::from_value(raw.clone())
        .map_err(|e| err(&req.id, "bad_params", format!("invalid {}: {e}", key), None))
}
