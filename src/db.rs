use anyhow::Context;
use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "essayd.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("create workspace {}", workspace.display()))?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("open {}", db_path.display()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events(
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            start_date TEXT,
            start_time TEXT,
            end_date TEXT,
            end_time TEXT,
            disabled INTEGER NOT NULL DEFAULT 0,
            last_status TEXT,
            status_changed_at TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_start ON events(start_date, start_time)",
        [],
    )?;

    // One row per essay. Slot columns stay NULL until that grader submits.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS gradings(
            essay_id TEXT PRIMARY KEY,
            grader_1 TEXT,
            c1_1 REAL, c2_1 REAL, c3_1 REAL, c4_1 REAL, c5_1 REAL,
            total_1 REAL,
            grader_2 TEXT,
            c1_2 REAL, c2_2 REAL, c3_2 REAL, c4_2 REAL, c5_2 REAL,
            total_2 REAL,
            state TEXT NOT NULL,
            adjudicator TEXT,
            final_c1 REAL, final_c2 REAL, final_c3 REAL, final_c4 REAL, final_c5 REAL,
            final_total REAL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_gradings_state ON gradings(state)",
        [],
    )?;

    Ok(conn)
}
