/// Version written by [`SCHEMA`]; databases reporting anything else are refused.
pub const SCHEMA_VERSION: i32 = 1;

/// SQL schema for the day database
pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS jokes (
    id TEXT PRIMARY KEY,
    joke TEXT NOT NULL,
    page INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jokes_page ON jokes(page);

-- Remote pages ever fetched. There is no page 0.
CREATE TABLE IF NOT EXISTS joke_pages (
    id INTEGER PRIMARY KEY CHECK (id >= 1)
);

-- One row per calendar day, keyed by "YYYY-MM-DD" so text order is date order
CREATE TABLE IF NOT EXISTS days (
    date TEXT PRIMARY KEY,
    joke_id TEXT NOT NULL REFERENCES jokes(id),
    viewed INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_days_joke ON days(joke_id);

PRAGMA user_version = 1;
"#;
