use crate::grading::{
    self, CompetencyScores, DivergenceResult, FinalScores, GraderScores, GradingPair,
};
use crate::schedule::{self, EventZone, Status, TimedEvent};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::json;
use std::cmp::Ordering;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct StoreError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl StoreError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::new("db_query_failed", e.to_string())
    }
}

pub fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Class,
    MockExam,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Class => "class",
            EventKind::MockExam => "mock_exam",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "class" => Some(EventKind::Class),
            "mock_exam" | "mockExam" => Some(EventKind::MockExam),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: String,
    pub kind: EventKind,
    pub title: String,
    #[serde(flatten)]
    pub timing: TimedEvent,
    pub last_status: Option<Status>,
    pub status_changed_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusTransition {
    pub event_id: String,
    pub title: String,
    pub from: Option<Status>,
    pub to: Status,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub checked: usize,
    pub transitions: Vec<StatusTransition>,
}

const EVENT_COLUMNS: &str = "id, kind, title, start_date, start_time, end_date, end_time,
    disabled, last_status, status_changed_at, created_at";

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<EventRecord> {
    let kind_raw: String = row.get(1)?;
    let kind = EventKind::parse(&kind_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Text,
            format!("unknown event kind {kind_raw}").into(),
        )
    })?;
    let disabled: i64 = row.get(7)?;
    let last_status: Option<String> = row.get(8)?;
    Ok(EventRecord {
        id: row.get(0)?,
        kind,
        title: row.get(2)?,
        timing: TimedEvent {
            start_date: row.get(3)?,
            start_time: row.get(4)?,
            end_date: row.get(5)?,
            end_time: row.get(6)?,
            administratively_disabled: Some(disabled != 0),
        },
        last_status: last_status.as_deref().and_then(Status::parse),
        status_changed_at: row.get(9)?,
        created_at: row.get(10)?,
    })
}

pub fn insert_event(
    conn: &Connection,
    kind: EventKind,
    title: &str,
    timing: &TimedEvent,
    now: DateTime<Utc>,
    zone: EventZone,
) -> Result<EventRecord, StoreError> {
    let id = Uuid::new_v4().to_string();
    let status = schedule::resolve_status_in(timing, now, zone);
    let created_at = timestamp(now);
    let disabled = timing.administratively_disabled == Some(true);

    conn.execute(
        "INSERT INTO events(id, kind, title, start_date, start_time, end_date, end_time,
                            disabled, last_status, status_changed_at, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            &id,
            kind.as_str(),
            title,
            &timing.start_date,
            &timing.start_time,
            &timing.end_date,
            &timing.end_time,
            disabled as i64,
            status.as_str(),
            &created_at,
            &created_at,
        ],
    )
    .map_err(|e| {
        StoreError::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "events" }))
    })?;

    Ok(EventRecord {
        id,
        kind,
        title: title.to_string(),
        timing: TimedEvent {
            administratively_disabled: Some(disabled),
            ..timing.clone()
        },
        last_status: Some(status),
        status_changed_at: Some(created_at.clone()),
        created_at,
    })
}

/// Events ordered by composed start instant; events without a valid window go last.
pub fn list_events(conn: &Connection, zone: EventZone) -> Result<Vec<EventRecord>, StoreError> {
    let mut stmt = conn.prepare(&format!("SELECT {EVENT_COLUMNS} FROM events"))?;
    let mut events = stmt
        .query_map([], event_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    events.sort_by(|a, b| {
        let sa = schedule::event_window(&a.timing, zone).map(|w| w.start);
        let sb = schedule::event_window(&b.timing, zone).map(|w| w.start);
        let by_start = match (sa, sb) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_start
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok(events)
}

/// Returns whether the flag actually changed.
pub fn disable_event(conn: &Connection, event_id: &str) -> Result<bool, StoreError> {
    let disabled: Option<i64> = conn
        .query_row(
            "SELECT disabled FROM events WHERE id = ?",
            [event_id],
            |r| r.get(0),
        )
        .optional()?;
    match disabled {
        None => Err(StoreError::new("not_found", "event not found")),
        Some(1) => Ok(false),
        Some(_) => {
            conn.execute("UPDATE events SET disabled = 1 WHERE id = ?", [event_id])?;
            Ok(true)
        }
    }
}

pub fn sweep_events(
    conn: &Connection,
    now: DateTime<Utc>,
    zone: EventZone,
) -> Result<SweepReport, StoreError> {
    let events = list_events(conn, zone)?;
    let changed_at = timestamp(now);
    let tx = conn.unchecked_transaction()?;

    let mut transitions = Vec::new();
    for ev in &events {
        let status = schedule::resolve_status_in(&ev.timing, now, zone);
        if ev.last_status == Some(status) {
            continue;
        }
        tx.execute(
            "UPDATE events SET last_status = ?, status_changed_at = ? WHERE id = ?",
            params![status.as_str(), &changed_at, &ev.id],
        )?;
        info!(
            event_id = %ev.id,
            from = ev.last_status.map(|s| s.as_str()).unwrap_or("none"),
            to = status.as_str(),
            "event status changed"
        );
        transitions.push(StatusTransition {
            event_id: ev.id.clone(),
            title: ev.title.clone(),
            from: ev.last_status,
            to: status,
        });
    }
    tx.commit()?;

    Ok(SweepReport {
        checked: events.len(),
        transitions,
    })
}

// ---------------------------------------------------------------------------
// Gradings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GradingState {
    Pending,
    AwaitingAdjudication,
    Finalized,
}

impl GradingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradingState::Pending => "pending",
            GradingState::AwaitingAdjudication => "awaiting_adjudication",
            GradingState::Finalized => "finalized",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(GradingState::Pending),
            "awaiting_adjudication" => Some(GradingState::AwaitingAdjudication),
            "finalized" => Some(GradingState::Finalized),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    First,
    Second,
}

impl Slot {
    pub fn from_number(n: i64) -> Option<Self> {
        match n {
            1 => Some(Slot::First),
            2 => Some(Slot::Second),
            _ => None,
        }
    }

    pub fn number(&self) -> i64 {
        match self {
            Slot::First => 1,
            Slot::Second => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingRecord {
    pub essay_id: String,
    pub pair: GradingPair,
    pub state: GradingState,
    pub adjudicator: Option<String>,
    pub final_scores: Option<FinalScores>,
    pub created_at: String,
    pub updated_at: String,
}

impl GradingRecord {
    fn new(essay_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            essay_id: essay_id.to_string(),
            pair: GradingPair::default(),
            state: GradingState::Pending,
            adjudicator: None,
            final_scores: None,
            created_at: timestamp(now),
            updated_at: timestamp(now),
        }
    }

    pub fn divergence(&self) -> Option<DivergenceResult> {
        grading::resolve_divergence(&self.pair)
    }

    fn slot(&self, slot: Slot) -> &GraderScores {
        match slot {
            Slot::First => &self.pair.first,
            Slot::Second => &self.pair.second,
        }
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut GraderScores {
        match slot {
            Slot::First => &mut self.pair.first,
            Slot::Second => &mut self.pair.second,
        }
    }
}

const GRADING_COLUMNS: &str = "essay_id,
    grader_1, c1_1, c2_1, c3_1, c4_1, c5_1, total_1,
    grader_2, c1_2, c2_2, c3_2, c4_2, c5_2, total_2,
    state, adjudicator,
    final_c1, final_c2, final_c3, final_c4, final_c5, final_total,
    created_at, updated_at";

fn slot_from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<GraderScores> {
    Ok(GraderScores {
        grader_id: row.get(base)?,
        scores: [
            row.get(base + 1)?,
            row.get(base + 2)?,
            row.get(base + 3)?,
            row.get(base + 4)?,
            row.get(base + 5)?,
        ],
        total: row.get(base + 6)?,
    })
}

fn grading_from_row(row: &Row<'_>) -> rusqlite::Result<GradingRecord> {
    let state_raw: String = row.get(15)?;
    let state = GradingState::parse(&state_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            15,
            Type::Text,
            format!("unknown grading state {state_raw}").into(),
        )
    })?;
    let finals: CompetencyScores = [
        row.get(17)?,
        row.get(18)?,
        row.get(19)?,
        row.get(20)?,
        row.get(21)?,
    ];
    let final_total: Option<f64> = row.get(22)?;

    Ok(GradingRecord {
        essay_id: row.get(0)?,
        pair: GradingPair {
            first: slot_from_row(row, 1)?,
            second: slot_from_row(row, 8)?,
        },
        state,
        adjudicator: row.get(16)?,
        final_scores: final_total.map(|total| FinalScores {
            competencies: finals.map(|v| v.unwrap_or(0.0)),
            total,
        }),
        created_at: row.get(23)?,
        updated_at: row.get(24)?,
    })
}

fn write_grading(conn: &Connection, rec: &GradingRecord) -> Result<(), StoreError> {
    let a = &rec.pair.first;
    let b = &rec.pair.second;
    let finals = rec.final_scores.as_ref().map(|f| f.competencies);
    let fin = |i: usize| finals.map(|c| c[i]);

    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO gradings({GRADING_COLUMNS})
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ),
        params![
            &rec.essay_id,
            &a.grader_id,
            a.scores[0],
            a.scores[1],
            a.scores[2],
            a.scores[3],
            a.scores[4],
            a.total,
            &b.grader_id,
            b.scores[0],
            b.scores[1],
            b.scores[2],
            b.scores[3],
            b.scores[4],
            b.total,
            rec.state.as_str(),
            &rec.adjudicator,
            fin(0),
            fin(1),
            fin(2),
            fin(3),
            fin(4),
            rec.final_scores.as_ref().map(|f| f.total),
            &rec.created_at,
            &rec.updated_at,
        ],
    )
    .map_err(|e| {
        StoreError::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "gradings" }))
    })?;
    Ok(())
}

pub fn load_grading(
    conn: &Connection,
    essay_id: &str,
) -> Result<Option<GradingRecord>, StoreError> {
    Ok(conn
        .query_row(
            &format!("SELECT {GRADING_COLUMNS} FROM gradings WHERE essay_id = ?"),
            [essay_id],
            grading_from_row,
        )
        .optional()?)
}

pub fn list_gradings(
    conn: &Connection,
    state: Option<GradingState>,
) -> Result<Vec<GradingRecord>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {GRADING_COLUMNS} FROM gradings
         WHERE (?1 IS NULL OR state = ?1)
         ORDER BY updated_at DESC, essay_id"
    ))?;
    let rows = stmt
        .query_map([state.map(|s| s.as_str())], grading_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Records one grader's scores. Once both totals are in, the pair either
/// finalizes with averaged scores or waits for an adjudicator.
pub fn submit_grading(
    conn: &Connection,
    essay_id: &str,
    slot: Slot,
    mut scores: GraderScores,
    now: DateTime<Utc>,
) -> Result<GradingRecord, StoreError> {
    let Some(grader_id) = scores.grader_id.clone() else {
        return Err(StoreError::new("bad_params", "missing graderId"));
    };

    let tx = conn.unchecked_transaction()?;
    let mut rec = match load_grading(&tx, essay_id)? {
        Some(r) => r,
        None => GradingRecord::new(essay_id, now),
    };

    if rec.state != GradingState::Pending {
        return Err(StoreError::new(
            "grading_closed",
            format!("essay grading is {}", rec.state.as_str()),
        )
        .with_details(json!({ "essayId": essay_id, "state": rec.state.as_str() })));
    }

    let other = match slot {
        Slot::First => Slot::Second,
        Slot::Second => Slot::First,
    };
    if rec.slot(other).grader_id.as_deref() == Some(grader_id.as_str()) {
        return Err(StoreError::new(
            "conflict",
            format!("grader already holds slot {}", other.number()),
        ));
    }
    if let Some(holder) = rec.slot(slot).grader_id.as_deref() {
        if holder != grader_id {
            return Err(StoreError::new(
                "conflict",
                format!("slot {} is held by another grader", slot.number()),
            )
            .with_details(json!({ "graderId": holder })));
        }
    }

    if scores.total.is_none() {
        scores.total = scores.summed_total();
    }
    *rec.slot_mut(slot) = scores;

    match grading::resolve_divergence(&rec.pair) {
        None => {}
        Some(report) if report.divergent => {
            rec.state = GradingState::AwaitingAdjudication;
            info!(essay_id, total_diff = report.total_diff, "grading diverged");
        }
        Some(_) => {
            rec.final_scores = Some(grading::average_final_scores(&rec.pair));
            rec.state = GradingState::Finalized;
            info!(essay_id, "grading finalized from averaged scores");
        }
    }
    rec.updated_at = timestamp(now);

    write_grading(&tx, &rec)?;
    tx.commit()?;
    Ok(rec)
}

pub fn adjudicate_grading(
    conn: &Connection,
    essay_id: &str,
    adjudicator: &str,
    scores: &CompetencyScores,
    now: DateTime<Utc>,
) -> Result<GradingRecord, StoreError> {
    let tx = conn.unchecked_transaction()?;
    let Some(mut rec) = load_grading(&tx, essay_id)? else {
        return Err(StoreError::new("not_found", "grading not found"));
    };

    match rec.state {
        GradingState::AwaitingAdjudication => {}
        GradingState::Finalized => {
            return Err(StoreError::new("grading_closed", "essay grading is finalized"))
        }
        GradingState::Pending => {
            return Err(StoreError::new(
                "conflict",
                "essay grading is not awaiting adjudication",
            ))
        }
    }

    let graders = [
        rec.pair.first.grader_id.as_deref(),
        rec.pair.second.grader_id.as_deref(),
    ];
    if graders.contains(&Some(adjudicator)) {
        return Err(StoreError::new(
            "conflict",
            "adjudicator must differ from both graders",
        ));
    }

    let Some(final_scores) = grading::adjudicated_final_scores(scores) else {
        return Err(StoreError::new(
            "bad_params",
            "adjudication requires all five competency scores",
        ));
    };

    rec.adjudicator = Some(adjudicator.to_string());
    rec.final_scores = Some(final_scores);
    rec.state = GradingState::Finalized;
    rec.updated_at = timestamp(now);

    write_grading(&tx, &rec)?;
    tx.commit()?;
    info!(essay_id, adjudicator, "grading finalized by adjudication");
    Ok(rec)
}
