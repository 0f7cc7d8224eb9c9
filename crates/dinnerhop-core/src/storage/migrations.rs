//! Database schema migrations for dinnerhop.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 3;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (fresh database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| row.get::<_, i32>(0))
        .unwrap_or_else(|e| {
            if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
                tracing::warn!(error = %e, "failed to read schema_version");
            }
            0
        })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: events, couples, assignments, plans, pairings, envelopes
/// and the derived host tables.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS events (
            id                 INTEGER PRIMARY KEY AUTOINCREMENT,
            name               TEXT NOT NULL,
            starter_at         TEXT NOT NULL,
            main_at            TEXT NOT NULL,
            dessert_at         TEXT NOT NULL,
            afterparty_at      TEXT,
            afterparty_address TEXT,
            afterparty_notes   TEXT,
            active_plan_id     INTEGER,
            created_at         TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS couples (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id          INTEGER NOT NULL REFERENCES events(id),
            name              TEXT NOT NULL,
            persons           INTEGER NOT NULL DEFAULT 2,
            address           TEXT NOT NULL,
            address_notes     TEXT,
            lat               REAL,
            lon               REAL,
            course_preference TEXT,
            allergies         TEXT NOT NULL DEFAULT '[]',
            fun_facts         TEXT NOT NULL DEFAULT '[]',
            birth_years       TEXT NOT NULL DEFAULT '[]',
            max_guests        INTEGER,
            flex_host         INTEGER NOT NULL DEFAULT 0,
            emergency_host    INTEGER NOT NULL DEFAULT 0,
            cancelled         INTEGER NOT NULL DEFAULT 0,
            created_at        TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS blocked_pairs (
            event_id INTEGER NOT NULL,
            couple_a INTEGER NOT NULL,
            couple_b INTEGER NOT NULL,
            PRIMARY KEY (event_id, couple_a, couple_b)
        );

        CREATE TABLE IF NOT EXISTS event_timing (
            event_id INTEGER PRIMARY KEY,
            timing   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS assignments (
            event_id       INTEGER NOT NULL,
            couple_id      INTEGER NOT NULL,
            course         TEXT NOT NULL,
            is_host        INTEGER NOT NULL DEFAULT 0,
            max_guests     INTEGER NOT NULL DEFAULT 0,
            flex_host      INTEGER NOT NULL DEFAULT 0,
            emergency_host INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (event_id, couple_id, course)
        );

        CREATE TABLE IF NOT EXISTS match_plans (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id   INTEGER NOT NULL,
            version    INTEGER NOT NULL,
            status     TEXT NOT NULL DEFAULT 'draft',
            revision   INTEGER NOT NULL DEFAULT 0,
            stats      TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            UNIQUE (event_id, version)
        );

        CREATE TABLE IF NOT EXISTS course_pairings (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            plan_id         INTEGER NOT NULL REFERENCES match_plans(id),
            course          TEXT NOT NULL,
            host_couple_id  INTEGER NOT NULL,
            guest_couple_id INTEGER NOT NULL,
            forced          INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS envelopes (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            plan_id             INTEGER NOT NULL REFERENCES match_plans(id),
            couple_id           INTEGER NOT NULL,
            course              TEXT NOT NULL,
            host_couple_id      INTEGER,
            destination_address TEXT NOT NULL,
            destination_notes   TEXT,
            cycling_distance_km REAL,
            teasing_at          TEXT NOT NULL,
            clue_1_at           TEXT NOT NULL,
            clue_2_at           TEXT NOT NULL,
            street_at           TEXT NOT NULL,
            number_at           TEXT NOT NULL,
            opened_at           TEXT NOT NULL,
            current_state       TEXT NOT NULL DEFAULT 'sealed',
            access_token        TEXT NOT NULL,
            cancelled           INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS course_clues (
            plan_id        INTEGER NOT NULL,
            host_couple_id INTEGER NOT NULL,
            course         TEXT NOT NULL,
            indices        TEXT NOT NULL DEFAULT '[]',
            PRIMARY KEY (plan_id, host_couple_id, course)
        );

        CREATE TABLE IF NOT EXISTS street_info (
            plan_id        INTEGER NOT NULL,
            host_couple_id INTEGER NOT NULL,
            course         TEXT NOT NULL,
            street         TEXT NOT NULL,
            house_number   TEXT,
            locality       TEXT,
            PRIMARY KEY (plan_id, host_couple_id, course)
        );

        CREATE TABLE IF NOT EXISTS audit_log (
            id          TEXT PRIMARY KEY,
            event_id    INTEGER NOT NULL,
            plan_id     INTEGER,
            action      TEXT NOT NULL,
            couple_ids  TEXT NOT NULL DEFAULT '[]',
            warnings    TEXT NOT NULL DEFAULT '[]',
            details     TEXT NOT NULL DEFAULT 'null',
            recorded_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_couples_event ON couples(event_id);
        CREATE INDEX IF NOT EXISTS idx_pairings_plan_host ON course_pairings(plan_id, host_couple_id);
        CREATE INDEX IF NOT EXISTS idx_envelopes_plan_host ON envelopes(plan_id, host_couple_id);
        CREATE INDEX IF NOT EXISTS idx_audit_event ON audit_log(event_id, recorded_at);",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: uniqueness guards.
///
/// - at most one pairing per guest and course in a plan
/// - at most one live envelope per couple and course in a plan
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_pairings_guest_course
             ON course_pairings(plan_id, course, guest_couple_id);
         CREATE UNIQUE INDEX IF NOT EXISTS idx_envelopes_live
             ON envelopes(plan_id, couple_id, course) WHERE cancelled = 0;",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()?;
    Ok(())
}

/// Migration v3: hosts that only serve themselves.
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "ALTER TABLE assignments ADD COLUMN self_serving INTEGER NOT NULL DEFAULT 0;",
    )?;

    set_schema_version(&tx, 3)?;
    tx.commit()?;
    Ok(())
}
