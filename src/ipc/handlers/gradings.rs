use crate::grading::{CompetencyScores, GraderScores, COMPETENCY_COUNT};
use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::{db_conn, now_param, required_str, typed_param};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, GradingRecord, GradingState, Slot};
use serde_json::json;

fn grading_json(rec: &GradingRecord) -> serde_json::Value {
    json!({
        "grading": rec,
        "divergence": rec.divergence()
    })
}

fn scores_param(req: &Request) -> Result<CompetencyScores, serde_json::Value> {
    let raw: Vec<Option<f64>> = typed_param(req, "scores")?;
    let len = raw.len();
    raw.try_into().map_err(|_| {
        err(
            &req.id,
            "bad_params",
            format!("scores must have {} entries", COMPETENCY_COUNT),
            Some(json!({ "got": len })),
        )
    })
}

fn handle_gradings_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let essay_id = match required_str(req, "essayId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(slot) = req
        .params
        .get("slot")
        .and_then(|v| v.as_i64())
        .and_then(Slot::from_number)
    else {
        return err(&req.id, "bad_params", "slot must be 1 or 2", None);
    };
    let grader_id = match required_str(req, "graderId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let scores = match scores_param(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let total = match req.params.get("total") {
        None | Some(serde_json::Value::Null) => None,
        Some(v) => match v.as_f64() {
            Some(t) => Some(t),
            None => return err(&req.id, "bad_params", "total must be a number", None),
        },
    };
    let now = match now_param(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let submitted = GraderScores {
        grader_id: Some(grader_id),
        scores,
        total,
    };
    match store::submit_grading(conn, &essay_id, slot, submitted, now) {
        Ok(rec) => ok(&req.id, grading_json(&rec)),
        Err(e) => store_err(&req.id, e),
    }
}

fn handle_gradings_adjudicate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let essay_id = match required_str(req, "essayId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let grader_id = match required_str(req, "graderId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let scores = match scores_param(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match now_param(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    match store::adjudicate_grading(conn, &essay_id, &grader_id, &scores, now) {
        Ok(rec) => ok(&req.id, grading_json(&rec)),
        Err(e) => store_err(&req.id, e),
    }
}

fn handle_gradings_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let essay_id = match required_str(req, "essayId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match store::load_grading(conn, &essay_id) {
        Ok(Some(rec)) => ok(&req.id, grading_json(&rec)),
        Ok(None) => err(&req.id, "not_found", "grading not found", None),
        Err(e) => store_err(&req.id, e),
    }
}

fn handle_gradings_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let filter = match req.params.get("state").and_then(|v| v.as_str()) {
        None => None,
        Some(raw) => match GradingState::parse(raw) {
            Some(s) => Some(s),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("unknown state: {}", raw),
                    None,
                )
            }
        },
    };
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "gradings": [] }));
    };

    match store::list_gradings(conn, filter) {
        Ok(rows) => {
            let gradings: Vec<_> = rows.iter().map(grading_json).collect();
            ok(&req.id, json!({ "gradings": gradings }))
        }
        Err(e) => store_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "gradings.submit" => Some(handle_gradings_submit(state, req)),
        "gradings.adjudicate" => Some(handle_gradings_adjudicate(state, req)),
        "gradings.get" => Some(handle_gradings_get(state, req)),
        "gradings.list" => Some(handle_gradings_list(state, req)),
        _ => None,
    }
}
