//! Database migrations for the local backend
//!
//! Mirrors the columns of the hosted tables that the engine reads and writes.

/// SQL statement to create the schema
pub const CREATE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Members table
CREATE TABLE IF NOT EXISTS members (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    netid TEXT NOT NULL UNIQUE,
    first_name TEXT,
    last_name TEXT,
    grad_year INTEGER,
    major TEXT,
    roles TEXT,
    bio TEXT,
    linkedin_url TEXT,
    github_url TEXT,
    headshot_url TEXT,
    secondary_headshot_url TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

-- Events table
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    date TEXT NOT NULL,
    description TEXT,
    flyer_url TEXT,
    instagram_url TEXT,
    semester TEXT,
    UNIQUE(name, date)
);

-- Points table
CREATE TABLE IF NOT EXISTS points_tracking (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    member_id INTEGER NOT NULL REFERENCES members(id),
    points INTEGER NOT NULL,
    semester TEXT NOT NULL,
    reason TEXT
);

CREATE INDEX IF NOT EXISTS idx_points_member ON points_tracking(member_id);
CREATE INDEX IF NOT EXISTS idx_points_semester ON points_tracking(semester);
"#;

/// Get the migration version
pub fn migration_version() -> i32 {
    1
}
