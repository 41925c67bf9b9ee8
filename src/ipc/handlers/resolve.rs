use crate::grading::{self, GradingPair};
use crate::ipc::error::ok;
use crate::ipc::helpers::{now_param, typed_param};
use crate::ipc::types::{AppState, Request};
use crate::schedule::{self, TimedEvent};
use crate::store::timestamp;
use serde_json::json;

fn handle_status_resolve(state: &mut AppState, req: &Request) -> serde_json::Value {
    let event: TimedEvent = match typed_param(req, "event") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match now_param(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let status = schedule::resolve_status_in(&event, now, state.zone);
    ok(&req.id, json!({ "status": status, "now": timestamp(now) }))
}

fn handle_divergence_resolve(req: &Request) -> serde_json::Value {
    let pair: GradingPair = match typed_param(req, "pair") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let report = grading::resolve_divergence(&pair);
    ok(
        &req.id,
        json!({ "evaluable": report.is_some(), "report": report }),
    )
}

fn handle_divergence_average(req: &Request) -> serde_json::Value {
    let pair: GradingPair = match typed_param(req, "pair") {
        Ok(v) => v,
        Err(e) => return e,
    };

    ok(
        &req.id,
        json!({ "finalScores": grading::average_final_scores(&pair) }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "status.resolve" => Some(handle_status_resolve(state, req)),
        "divergence.resolve" => Some(handle_divergence_resolve(req)),
        "divergence.average" => Some(handle_divergence_average(req)),
        _ => None,
    }
}
