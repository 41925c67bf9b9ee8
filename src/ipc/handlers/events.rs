use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::{db_conn, now_param, required_str};
use crate::ipc::types::{AppState, Request};
use crate::schedule::{self, EventZone, TimedEvent};
use crate::store::{self, EventKind, EventRecord};
use chrono::{DateTime, Utc};
use serde_json::json;

fn event_json(ev: &EventRecord, now: DateTime<Utc>, zone: EventZone) -> serde_json::Value {
    let window = schedule::event_window(&ev.timing, zone);
    let mut v = json!(ev);
    v["status"] = json!(schedule::resolve_status_in(&ev.timing, now, zone));
    v["startsAt"] = json!(window.map(|w| w.start.to_rfc3339()));
    v["endsAt"] = json!(window.map(|w| w.end.to_rfc3339()));
    v
}

fn handle_events_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let kind_raw = match required_str(req, "kind") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(kind) = EventKind::parse(&kind_raw) else {
        return err(
            &req.id,
            "bad_params",
            format!("unknown kind: {}", kind_raw),
            Some(json!({ "allowed": ["class", "mock_exam"] })),
        );
    };
    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let timing: TimedEvent = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", format!("invalid event fields: {e}"), None),
    };
    let now = match now_param(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    match store::insert_event(conn, kind, &title, &timing, now, state.zone) {
        Ok(ev) => ok(
            &req.id,
            json!({
                "eventId": ev.id,
                "status": ev.last_status,
                "event": event_json(&ev, now, state.zone)
            }),
        ),
        Err(e) => store_err(&req.id, e),
    }
}

fn handle_events_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let now = match now_param(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "events": [] }));
    };

    match store::list_events(conn, state.zone) {
        Ok(events) => {
            let events: Vec<_> = events
                .iter()
                .map(|ev| event_json(ev, now, state.zone))
                .collect();
            ok(&req.id, json!({ "events": events }))
        }
        Err(e) => store_err(&req.id, e),
    }
}

fn handle_events_disable(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let event_id = match required_str(req, "eventId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match store::disable_event(conn, &event_id) {
        Ok(changed) => ok(&req.id, json!({ "eventId": event_id, "changed": changed })),
        Err(e) => store_err(&req.id, e),
    }
}

fn handle_events_sweep(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match now_param(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    match store::sweep_events(conn, now, state.zone) {
        Ok(report) => ok(&req.id, json!(report)),
        Err(e) => store_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "events.create" => Some(handle_events_create(state, req)),
        "events.list" => Some(handle_events_list(state, req)),
        "events.disable" => Some(handle_events_disable(state, req)),
        "events.sweep" => Some(handle_events_sweep(state, req)),
        _ => None,
    }
}
