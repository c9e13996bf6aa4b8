//! SQL schemas for the two Accolade SQLite stores.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Relational store DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const RELATIONAL_SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    user_id        TEXT PRIMARY KEY,
    username       TEXT NOT NULL UNIQUE,
    password_hash  TEXT NOT NULL,           -- argon2 PHC string
    role           TEXT NOT NULL,           -- 'admin' | 'lecturer' | 'student'
    created_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS lecturers (
    lecturer_id      TEXT PRIMARY KEY,
    user_id          TEXT NOT NULL UNIQUE REFERENCES users(user_id),
    lecturer_number  TEXT NOT NULL UNIQUE,
    department       TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS students (
    student_id      TEXT PRIMARY KEY,
    user_id         TEXT NOT NULL UNIQUE REFERENCES users(user_id),
    student_number  TEXT NOT NULL UNIQUE,
    program         TEXT NOT NULL DEFAULT '',
    academic_year   TEXT NOT NULL DEFAULT '',
    advisor_id      TEXT REFERENCES lecturers(lecturer_id),
    -- Only ever changed by increments.
    total_points    INTEGER NOT NULL DEFAULT 0
);

-- Authoritative workflow state. `detail_id` points into the document store.
CREATE TABLE IF NOT EXISTS achievement_references (
    reference_id    TEXT PRIMARY KEY,
    student_id      TEXT NOT NULL REFERENCES students(student_id),
    detail_id       TEXT NOT NULL UNIQUE,
    status          TEXT NOT NULL DEFAULT 'draft'
                    CHECK (status IN ('draft', 'submitted', 'verified', 'rejected', 'deleted')),
    submitted_at    TEXT,
    verified_at     TEXT,
    verified_by     TEXT,
    rejection_note  TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

-- Append-only. One row per successful transition, including creation.
CREATE TABLE IF NOT EXISTS status_events (
    event_id      TEXT PRIMARY KEY,
    reference_id  TEXT NOT NULL REFERENCES achievement_references(reference_id),
    from_status   TEXT,
    to_status     TEXT NOT NULL,
    actor         TEXT NOT NULL,
    note          TEXT,
    recorded_at   TEXT NOT NULL
);

-- Idempotency key for the ledger: a reference is credited at most once.
CREATE TABLE IF NOT EXISTS point_awards (
    reference_id  TEXT PRIMARY KEY REFERENCES achievement_references(reference_id),
    student_id    TEXT NOT NULL REFERENCES students(student_id),
    points        INTEGER NOT NULL CHECK (points > 0),
    awarded_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS references_student_idx ON achievement_references(student_id);
CREATE INDEX IF NOT EXISTS references_status_idx  ON achievement_references(status);
CREATE INDEX IF NOT EXISTS students_advisor_idx   ON students(advisor_id);
CREATE INDEX IF NOT EXISTS events_reference_idx   ON status_events(reference_id);

PRAGMA user_version = 1;
";

/// Document store DDL. Each row is one achievement detail; `body` is the
/// full JSON document and is edited in place with SQLite's JSON functions.
pub const DOCUMENT_SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS achievement_details (
    detail_id     TEXT PRIMARY KEY,
    student_id    TEXT NOT NULL,
    body          TEXT NOT NULL CHECK (json_valid(body)),
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    discarded_at  TEXT             -- set by compensation; row is then invisible
);

CREATE INDEX IF NOT EXISTS details_student_idx ON achievement_details(student_id);

PRAGMA user_version = 1;
";
