//! SQL schema for the Tally SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Reference directory. Written only by the directory import.
CREATE TABLE IF NOT EXISTS classes (
    class_id          TEXT PRIMARY KEY,
    name              TEXT NOT NULL,
    upstream_class_id TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS class_schedule (
    class_id  TEXT    NOT NULL REFERENCES classes(class_id),
    weekday   INTEGER NOT NULL,   -- days from Monday, 0..=6
    PRIMARY KEY (class_id, weekday)
);

CREATE TABLE IF NOT EXISTS students (
    student_id  TEXT PRIMARY KEY,
    name        TEXT    NOT NULL,
    class_id    TEXT,
    upstream_id TEXT,
    active      INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS student_names (
    name_key    TEXT PRIMARY KEY,  -- whitespace-normalised student name
    upstream_id TEXT NOT NULL
);

-- One row per (student, civil date, upstream book id).
CREATE TABLE IF NOT EXISTS daily_activities (
    activity_id         TEXT PRIMARY KEY,
    student_id          TEXT    NOT NULL,
    student_upstream_id TEXT    NOT NULL,
    date                TEXT    NOT NULL,   -- YYYY-MM-DD
    book_id             TEXT    NOT NULL,
    kind                TEXT    NOT NULL,   -- 'workbook' | 'worksheet'
    category            TEXT    NOT NULL,   -- 'initial' | 'wrong_redo' | 'custom'
    title               TEXT    NOT NULL,
    chapter             TEXT,
    page                TEXT,
    progress_ids        TEXT    NOT NULL DEFAULT '[]',
    assigned_count      INTEGER NOT NULL,
    correct_count       INTEGER NOT NULL,
    wrong_count         INTEGER NOT NULL,
    correct_rate        REAL    NOT NULL,
    updated_at          TEXT    NOT NULL,
    detail_collected_at TEXT,
    UNIQUE (student_id, date, book_id)
);

-- Wrong or unknown answers only. Rows are never updated.
CREATE TABLE IF NOT EXISTS problem_results (
    result_id          TEXT PRIMARY KEY,
    activity_id        TEXT NOT NULL REFERENCES daily_activities(activity_id),
    problem_id         TEXT NOT NULL,
    progress_id        TEXT,
    concept_id         TEXT,
    topic_id           TEXT,
    sub_topic_id       TEXT,
    level              INTEGER,
    problem_type       TEXT,
    correct_answer     TEXT,
    student_answer     TEXT,
    outcome            TEXT NOT NULL,   -- 'wrong' | 'unknown'
    usage_attempts     INTEGER,
    usage_correct_rate REAL,
    media              TEXT NOT NULL DEFAULT '[]',
    recorded_at        TEXT NOT NULL,
    UNIQUE (activity_id, problem_id),
    CHECK  (outcome != 'correct')
);

CREATE TABLE IF NOT EXISTS homework (
    homework_row_id     TEXT PRIMARY KEY,
    class_id            TEXT    NOT NULL,
    student_upstream_id TEXT    NOT NULL,
    student_name        TEXT    NOT NULL,
    date                TEXT    NOT NULL,
    homework_id         TEXT    NOT NULL,
    kind                TEXT    NOT NULL,
    title               TEXT    NOT NULL,
    page_range          TEXT,
    progress_ids        TEXT    NOT NULL DEFAULT '[]',
    total_problems      INTEGER,
    completed           INTEGER NOT NULL,
    score               REAL,
    updated_at          TEXT    NOT NULL,
    UNIQUE (class_id, student_upstream_id, date, homework_id)
);

-- Durable continuation queue for the wrong-detail pass.
CREATE TABLE IF NOT EXISTS chain_jobs (
    job_id      TEXT PRIMARY KEY,
    target_date TEXT    NOT NULL,
    depth       INTEGER NOT NULL,
    status      TEXT    NOT NULL,   -- 'pending' | 'running' | 'done' | 'failed'
    attempts    INTEGER NOT NULL DEFAULT 0,
    last_error  TEXT,
    run_after   TEXT    NOT NULL,
    created_at  TEXT    NOT NULL,
    updated_at  TEXT    NOT NULL,
    UNIQUE (target_date, depth)
);

CREATE INDEX IF NOT EXISTS activities_date_wrong_idx ON daily_activities(date, wrong_count);
CREATE INDEX IF NOT EXISTS results_activity_idx      ON problem_results(activity_id);
CREATE INDEX IF NOT EXISTS homework_class_date_idx   ON homework(class_id, date);
CREATE INDEX IF NOT EXISTS chain_jobs_due_idx        ON chain_jobs(status, run_after);

PRAGMA user_version = 1;
";
