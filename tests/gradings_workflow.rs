use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_essayd");
    let mut child = Command::new(exe)
        .env_remove("ESSAYD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn essayd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn result(v: &serde_json::Value) -> &serde_json::Value {
    assert_eq!(v["ok"].as_bool(), Some(true), "request failed: {}", v);
    &v["result"]
}

fn error_code(v: &serde_json::Value) -> Option<&str> {
    v["error"]["code"].as_str()
}

fn floats(v: &serde_json::Value) -> Vec<f64> {
    v.as_array()
        .expect("array")
        .iter()
        .map(|x| x.as_f64().expect("number"))
        .collect()
}

fn open_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
) {
    let workspace = temp_dir(prefix);
    let v = request(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    result(&v);
}

#[test]
fn close_gradings_finalize_with_rounded_averages() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace(&mut stdin, &mut reader, "essayd-grading-close");

    let first = request(
        &mut stdin,
        &mut reader,
        "1",
        "gradings.submit",
        json!({ "essayId": "essay-7", "slot": 1, "graderId": "ana", "scores": [160, 160, 160, 160, 160] }),
    );
    let r = result(&first);
    assert_eq!(r["grading"]["state"].as_str(), Some("pending"));
    assert_eq!(r["grading"]["pair"]["first"]["total"].as_f64(), Some(800.0));
    assert!(r["divergence"].is_null());

    let second = request(
        &mut stdin,
        &mut reader,
        "2",
        "gradings.submit",
        json!({ "essayId": "essay-7", "slot": 2, "graderId": "bruno", "scores": [150, 150, 150, 150, 170] }),
    );
    let r = result(&second);
    assert_eq!(r["grading"]["state"].as_str(), Some("finalized"));
    assert_eq!(
        floats(&r["grading"]["finalScores"]["competencies"]),
        vec![155.0, 155.0, 155.0, 155.0, 165.0]
    );
    assert_eq!(r["grading"]["finalScores"]["total"].as_f64(), Some(785.0));
    assert_eq!(r["divergence"]["divergent"].as_bool(), Some(false));
    assert_eq!(r["divergence"]["totalDiff"].as_f64(), Some(20.0));

    let again = request(
        &mut stdin,
        &mut reader,
        "3",
        "gradings.submit",
        json!({ "essayId": "essay-7", "slot": 2, "graderId": "bruno", "scores": [0, 0, 0, 0, 0] }),
    );
    assert_eq!(error_code(&again), Some("grading_closed"));

    let fetched = request(
        &mut stdin,
        &mut reader,
        "4",
        "gradings.get",
        json!({ "essayId": "essay-7" }),
    );
    assert_eq!(
        result(&fetched)["grading"]["finalScores"]["total"].as_f64(),
        Some(785.0)
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn divergent_gradings_wait_for_an_adjudicator() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace(&mut stdin, &mut reader, "essayd-grading-divergent");

    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "gradings.submit",
        json!({ "essayId": "essay-9", "slot": 1, "graderId": "ana", "scores": [140, 140, 140, 140, 140] }),
    );
    let second = request(
        &mut stdin,
        &mut reader,
        "2",
        "gradings.submit",
        json!({ "essayId": "essay-9", "slot": 2, "graderId": "bruno", "scores": [170, 170, 170, 170, 170] }),
    );
    let r = result(&second);
    assert_eq!(r["grading"]["state"].as_str(), Some("awaiting_adjudication"));
    assert!(r["grading"]["finalScores"].is_null());
    assert_eq!(r["divergence"]["divergent"].as_bool(), Some(true));
    assert_eq!(r["divergence"]["totalDiff"].as_f64(), Some(150.0));

    let resubmit = request(
        &mut stdin,
        &mut reader,
        "3",
        "gradings.submit",
        json!({ "essayId": "essay-9", "slot": 1, "graderId": "ana", "scores": [170, 170, 170, 170, 170] }),
    );
    assert_eq!(error_code(&resubmit), Some("grading_closed"));

    let by_grader = request(
        &mut stdin,
        &mut reader,
        "4",
        "gradings.adjudicate",
        json!({ "essayId": "essay-9", "graderId": "ana", "scores": [160, 160, 160, 160, 160] }),
    );
    assert_eq!(error_code(&by_grader), Some("conflict"));

    let short = request(
        &mut stdin,
        &mut reader,
        "5",
        "gradings.adjudicate",
        json!({ "essayId": "essay-9", "graderId": "carla", "scores": [160, 160, 160, 160] }),
    );
    assert_eq!(error_code(&short), Some("bad_params"));

    let partial = request(
        &mut stdin,
        &mut reader,
        "6",
        "gradings.adjudicate",
        json!({ "essayId": "essay-9", "graderId": "carla", "scores": [160, 160, null, 160, 160] }),
    );
    assert_eq!(error_code(&partial), Some("bad_params"));

    let awaiting = request(
        &mut stdin,
        &mut reader,
        "7",
        "gradings.list",
        json!({ "state": "awaiting_adjudication" }),
    );
    assert_eq!(
        result(&awaiting)["gradings"].as_array().map(|a| a.len()),
        Some(1)
    );

    let adjudicated = request(
        &mut stdin,
        &mut reader,
        "8",
        "gradings.adjudicate",
        json!({ "essayId": "essay-9", "graderId": "carla", "scores": [180, 160, 160, 160, 160] }),
    );
    let r = result(&adjudicated);
    assert_eq!(r["grading"]["state"].as_str(), Some("finalized"));
    assert_eq!(r["grading"]["adjudicator"].as_str(), Some("carla"));
    assert_eq!(r["grading"]["finalScores"]["total"].as_f64(), Some(820.0));

    let twice = request(
        &mut stdin,
        &mut reader,
        "9",
        "gradings.adjudicate",
        json!({ "essayId": "essay-9", "graderId": "carla", "scores": [180, 160, 160, 160, 160] }),
    );
    assert_eq!(error_code(&twice), Some("grading_closed"));

    let awaiting = request(
        &mut stdin,
        &mut reader,
        "10",
        "gradings.list",
        json!({ "state": "awaiting_adjudication" }),
    );
    assert_eq!(
        result(&awaiting)["gradings"].as_array().map(|a| a.len()),
        Some(0)
    );
    let finalized = request(
        &mut stdin,
        &mut reader,
        "11",
        "gradings.list",
        json!({ "state": "finalized" }),
    );
    assert_eq!(
        result(&finalized)["gradings"][0]["grading"]["essayId"].as_str(),
        Some("essay-9")
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn slot_guards_reject_conflicting_graders() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace(&mut stdin, &mut reader, "essayd-grading-guards");

    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "gradings.submit",
        json!({ "essayId": "essay-3", "slot": 1, "graderId": "ana", "scores": [100, 100, 100, 100, 100] }),
    );

    let same_grader = request(
        &mut stdin,
        &mut reader,
        "2",
        "gradings.submit",
        json!({ "essayId": "essay-3", "slot": 2, "graderId": "ana", "scores": [100, 100, 100, 100, 100] }),
    );
    assert_eq!(error_code(&same_grader), Some("conflict"));

    let taken = request(
        &mut stdin,
        &mut reader,
        "3",
        "gradings.submit",
        json!({ "essayId": "essay-3", "slot": 1, "graderId": "bruno", "scores": [100, 100, 100, 100, 100] }),
    );
    assert_eq!(error_code(&taken), Some("conflict"));

    // The holder may correct their own slot while the pair is still open.
    let corrected = request(
        &mut stdin,
        &mut reader,
        "4",
        "gradings.submit",
        json!({ "essayId": "essay-3", "slot": 1, "graderId": "ana", "scores": [120, 100, 100, 100, 100] }),
    );
    assert_eq!(
        result(&corrected)["grading"]["pair"]["first"]["total"].as_f64(),
        Some(520.0)
    );

    let bad_slot = request(
        &mut stdin,
        &mut reader,
        "5",
        "gradings.submit",
        json!({ "essayId": "essay-3", "slot": 3, "graderId": "carla", "scores": [100, 100, 100, 100, 100] }),
    );
    assert_eq!(error_code(&bad_slot), Some("bad_params"));

    let bad_scores = request(
        &mut stdin,
        &mut reader,
        "6",
        "gradings.submit",
        json!({ "essayId": "essay-3", "slot": 2, "graderId": "carla", "scores": [100, 100] }),
    );
    assert_eq!(error_code(&bad_scores), Some("bad_params"));

    let missing = request(
        &mut stdin,
        &mut reader,
        "7",
        "gradings.get",
        json!({ "essayId": "essay-404" }),
    );
    assert_eq!(error_code(&missing), Some("not_found"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn incomplete_sub_scores_without_total_stay_pending() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace(&mut stdin, &mut reader, "essayd-grading-incomplete");

    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "gradings.submit",
        json!({ "essayId": "essay-5", "slot": 1, "graderId": "ana", "scores": [100, 100, 100, 100, 100] }),
    );
    let second = request(
        &mut stdin,
        &mut reader,
        "2",
        "gradings.submit",
        json!({ "essayId": "essay-5", "slot": 2, "graderId": "bruno", "scores": [100, null, 100, 100, 100] }),
    );
    let r = result(&second);
    assert!(r["grading"]["pair"]["second"]["total"].is_null());
    assert_eq!(r["grading"]["state"].as_str(), Some("pending"));
    assert!(r["divergence"].is_null());

    // An explicit total makes the pair evaluable; the unscored competency counts as zero.
    let with_total = request(
        &mut stdin,
        &mut reader,
        "3",
        "gradings.submit",
        json!({ "essayId": "essay-5", "slot": 2, "graderId": "bruno", "scores": [100, null, 100, 100, 100], "total": 500 }),
    );
    let r = result(&with_total);
    assert_eq!(r["grading"]["state"].as_str(), Some("awaiting_adjudication"));
    assert_eq!(
        r["divergence"]["competencies"][1]["divergent"].as_bool(),
        Some(true)
    );
    assert_eq!(r["divergence"]["totalDiff"].as_f64(), Some(0.0));

    drop(stdin);
    let _ = child.wait();
}
