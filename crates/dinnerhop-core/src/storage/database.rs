//! SQLite-backed event storage.
//!
//! Provides persistent storage for:
//! - Events, couples and blocked pairs (registration data)
//! - Role assignments, versioned match plans and their pairings
//! - Envelopes with reveal schedules
//! - Derived host data (clue allocations, street fragments)
//! - The audit log

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Params, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

use crate::audit::{AuditEntry, AuditSink};
use crate::clues::{CourseClues, StreetInfo};
use crate::error::{CoreError, DatabaseError};
use crate::model::{
    Afterparty, Assignment, BlockedPair, Coordinates, Couple, CoupleId, Course, CoursePairing,
    DinnerEvent, Envelope, EnvelopeId, EnvelopeState, EventId, MatchPlan, MatchStats, NewCouple,
    NewEnvelope, NewPairing, PairingId, PlanId, PlanStatus, RevealSchedule,
};
use crate::timing::EventTiming;

use super::data_dir;
use super::migrations;
use super::store::MatchStore;

type DbResult<T> = Result<T, DatabaseError>;

const EVENT_COLUMNS: &str = "id, name, starter_at, main_at, dessert_at, afterparty_at, \
     afterparty_address, afterparty_notes, active_plan_id, created_at";

const COUPLE_COLUMNS: &str = "id, event_id, name, persons, address, address_notes, lat, lon, \
     course_preference, allergies, fun_facts, birth_years, max_guests, flex_host, \
     emergency_host, cancelled, created_at";

const ASSIGNMENT_COLUMNS: &str =
    "event_id, couple_id, course, is_host, max_guests, flex_host, emergency_host, self_serving";

const PLAN_COLUMNS: &str = "id, event_id, version, status, revision, stats, created_at";

const PAIRING_COLUMNS: &str = "id, plan_id, course, host_couple_id, guest_couple_id, forced";

const ENVELOPE_COLUMNS: &str = "id, plan_id, couple_id, course, host_couple_id, \
     destination_address, destination_notes, cycling_distance_km, teasing_at, clue_1_at, \
     clue_2_at, street_at, number_at, opened_at, current_state, access_token, cancelled";

/// SQLite database for dinner events and match plans.
pub struct DinnerDb {
    conn: Connection,
}

impl DinnerDb {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `<data dir>/dinnerhop.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the data directory is unavailable or the
    /// database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("dinnerhop.db");
        Ok(Self::open_at(path)?)
    }

    /// Open (or create) the database at `path`.
    pub fn open_at(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::init(conn)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> DbResult<Self> {
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    fn query_all<T, P: Params>(
        &self,
        sql: &str,
        params: P,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> DbResult<Vec<T>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, map)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn query_one<T, P: Params>(
        &self,
        sql: &str,
        params: P,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> DbResult<Option<T>> {
        Ok(self.conn.query_row(sql, params, map).optional()?)
    }

    // === Registration ===

    /// Create an event. Returns its id.
    pub fn create_event(
        &self,
        name: &str,
        starter_at: DateTime<Utc>,
        main_at: DateTime<Utc>,
        dessert_at: DateTime<Utc>,
        afterparty: Option<&Afterparty>,
    ) -> DbResult<EventId> {
        self.conn.execute(
            "INSERT INTO events (name, starter_at, main_at, dessert_at, afterparty_at,
                                 afterparty_address, afterparty_notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                name,
                starter_at.to_rfc3339(),
                main_at.to_rfc3339(),
                dessert_at.to_rfc3339(),
                afterparty.map(|a| a.starts_at.to_rfc3339()),
                afterparty.map(|a| a.address.as_str()),
                afterparty.and_then(|a| a.notes.as_deref()),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_events(&self) -> DbResult<Vec<DinnerEvent>> {
        self.query_all(
            &format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY starter_at, id"),
            [],
            row_to_event,
        )
    }

    /// Register a couple. Returns its id.
    pub fn add_couple(&self, couple: &NewCouple) -> DbResult<CoupleId> {
        self.conn.execute(
            "INSERT INTO couples (event_id, name, persons, address, address_notes, lat, lon,
                                  course_preference, allergies, fun_facts, birth_years,
                                  max_guests, flex_host, emergency_host, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                couple.event_id,
                couple.name,
                couple.persons,
                couple.address,
                couple.address_notes,
                couple.coordinates.map(|c| c.lat),
                couple.coordinates.map(|c| c.lon),
                couple.course_preference.map(Course::as_str),
                to_json(&couple.allergies)?,
                to_json(&couple.fun_facts)?,
                to_json(&couple.birth_years)?,
                couple.max_guests,
                couple.flex_host,
                couple.emergency_host,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Record that two couples must never meet as host and guest.
    pub fn add_blocked_pair(&self, event_id: EventId, a: CoupleId, b: CoupleId) -> DbResult<()> {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        self.conn.execute(
            "INSERT OR IGNORE INTO blocked_pairs (event_id, couple_a, couple_b) VALUES (?1, ?2, ?3)",
            params![event_id, low, high],
        )?;
        Ok(())
    }

    pub fn remove_blocked_pair(&self, event_id: EventId, a: CoupleId, b: CoupleId) -> DbResult<bool> {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let n = self.conn.execute(
            "DELETE FROM blocked_pairs WHERE event_id = ?1 AND couple_a = ?2 AND couple_b = ?3",
            params![event_id, low, high],
        )?;
        Ok(n > 0)
    }

    /// Store a per-event timing override.
    pub fn set_event_timing(&self, event_id: EventId, timing: &EventTiming) -> DbResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO event_timing (event_id, timing) VALUES (?1, ?2)",
            params![event_id, to_json(timing)?],
        )?;
        Ok(())
    }

    pub fn clear_event_timing(&self, event_id: EventId) -> DbResult<()> {
        self.conn
            .execute("DELETE FROM event_timing WHERE event_id = ?1", params![event_id])?;
        Ok(())
    }

    // === Queries outside the engine vocabulary ===

    pub fn plans_for_event(&self, event_id: EventId) -> DbResult<Vec<MatchPlan>> {
        self.query_all(
            &format!("SELECT {PLAN_COLUMNS} FROM match_plans WHERE event_id = ?1 ORDER BY version"),
            params![event_id],
            row_to_plan,
        )
    }

    /// Look up a live envelope by its access token.
    pub fn envelope_by_token(&self, token: &str) -> DbResult<Option<Envelope>> {
        self.query_one(
            &format!("SELECT {ENVELOPE_COLUMNS} FROM envelopes WHERE access_token = ?1 AND cancelled = 0"),
            params![token],
            row_to_envelope,
        )
    }

    /// Audit entries of an event, oldest first.
    pub fn audit_entries(&self, event_id: EventId) -> DbResult<Vec<AuditEntry>> {
        self.query_all(
            "SELECT id, event_id, plan_id, action, couple_ids, warnings, details, recorded_at
             FROM audit_log WHERE event_id = ?1 ORDER BY recorded_at, rowid",
            params![event_id],
            |row| {
                Ok(AuditEntry {
                    id: row.get(0)?,
                    event_id: row.get(1)?,
                    plan_id: row.get(2)?,
                    action: row.get(3)?,
                    couple_ids: get_json(row, 4)?,
                    warnings: get_json(row, 5)?,
                    details: get_json(row, 6)?,
                    recorded_at: get_datetime(row, 7)?,
                })
            },
        )
    }
}

impl AuditSink for DinnerDb {
    fn append(&self, entry: &AuditEntry) -> DbResult<()> {
        self.conn.execute(
            "INSERT INTO audit_log (id, event_id, plan_id, action, couple_ids, warnings, details, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.id,
                entry.event_id,
                entry.plan_id,
                entry.action,
                to_json(&entry.couple_ids)?,
                to_json(&entry.warnings)?,
                to_json(&entry.details)?,
                entry.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

impl MatchStore for DinnerDb {
    fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<DatabaseError>,
    {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| E::from(DatabaseError::from(e)))?;

        match f(&mut *self) {
            Ok(value) => match self.conn.execute_batch("COMMIT") {
                Ok(()) => Ok(value),
                Err(e) => {
                    self.rollback();
                    Err(E::from(DatabaseError::from(e)))
                }
            },
            Err(err) => {
                self.rollback();
                Err(err)
            }
        }
    }

    fn event(&self, id: EventId) -> DbResult<Option<DinnerEvent>> {
        self.query_one(
            &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
            params![id],
            row_to_event,
        )
    }

    fn event_timing(&self, event_id: EventId) -> DbResult<Option<EventTiming>> {
        self.query_one(
            "SELECT timing FROM event_timing WHERE event_id = ?1",
            params![event_id],
            |row| get_json(row, 0),
        )
    }

    fn couple(&self, id: CoupleId) -> DbResult<Option<Couple>> {
        self.query_one(
            &format!("SELECT {COUPLE_COLUMNS} FROM couples WHERE id = ?1"),
            params![id],
            row_to_couple,
        )
    }

    fn couples_for_event(&self, event_id: EventId) -> DbResult<Vec<Couple>> {
        self.query_all(
            &format!("SELECT {COUPLE_COLUMNS} FROM couples WHERE event_id = ?1 ORDER BY id"),
            params![event_id],
            row_to_couple,
        )
    }

    fn update_couple_address(
        &mut self,
        id: CoupleId,
        address: &str,
        notes: Option<&str>,
        coordinates: Option<Coordinates>,
    ) -> DbResult<()> {
        self.conn.execute(
            "UPDATE couples SET address = ?2, address_notes = ?3, lat = ?4, lon = ?5 WHERE id = ?1",
            params![
                id,
                address,
                notes,
                coordinates.map(|c| c.lat),
                coordinates.map(|c| c.lon)
            ],
        )?;
        Ok(())
    }

    fn set_couple_cancelled(&mut self, id: CoupleId, cancelled: bool) -> DbResult<bool> {
        let n = self.conn.execute(
            "UPDATE couples SET cancelled = ?2 WHERE id = ?1 AND cancelled != ?2",
            params![id, cancelled],
        )?;
        Ok(n > 0)
    }

    fn blocked_pairs(&self, event_id: EventId) -> DbResult<Vec<BlockedPair>> {
        self.query_all(
            "SELECT event_id, couple_a, couple_b FROM blocked_pairs WHERE event_id = ?1",
            params![event_id],
            |row| Ok(BlockedPair::new(row.get(0)?, row.get(1)?, row.get(2)?)),
        )
    }

    fn assignments_for_event(&self, event_id: EventId) -> DbResult<Vec<Assignment>> {
        self.query_all(
            &format!(
                "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE event_id = ?1
                 ORDER BY couple_id, course"
            ),
            params![event_id],
            row_to_assignment,
        )
    }

    fn assignments_for_couple(&self, event_id: EventId, couple_id: CoupleId) -> DbResult<Vec<Assignment>> {
        self.query_all(
            &format!(
                "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE event_id = ?1 AND couple_id = ?2"
            ),
            params![event_id, couple_id],
            row_to_assignment,
        )
    }

    fn upsert_assignment(&mut self, a: &Assignment) -> DbResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO assignments
                 (event_id, couple_id, course, is_host, max_guests, flex_host, emergency_host,
                  self_serving)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                a.event_id,
                a.couple_id,
                a.course.as_str(),
                a.is_host,
                a.max_guests,
                a.flex_host,
                a.emergency_host,
                a.self_serving
            ],
        )?;
        Ok(())
    }

    fn delete_assignment(&mut self, event_id: EventId, couple_id: CoupleId, course: Course) -> DbResult<usize> {
        Ok(self.conn.execute(
            "DELETE FROM assignments WHERE event_id = ?1 AND couple_id = ?2 AND course = ?3",
            params![event_id, couple_id, course.as_str()],
        )?)
    }

    fn plan(&self, id: PlanId) -> DbResult<Option<MatchPlan>> {
        self.query_one(
            &format!("SELECT {PLAN_COLUMNS} FROM match_plans WHERE id = ?1"),
            params![id],
            row_to_plan,
        )
    }

    fn latest_plan_version(&self, event_id: EventId) -> DbResult<u32> {
        Ok(self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM match_plans WHERE event_id = ?1",
            params![event_id],
            |row| row.get(0),
        )?)
    }

    fn insert_plan(&mut self, event_id: EventId, version: u32, stats: &MatchStats) -> DbResult<PlanId> {
        self.conn.execute(
            "INSERT INTO match_plans (event_id, version, status, revision, stats, created_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?5)",
            params![
                event_id,
                version,
                PlanStatus::Draft.as_str(),
                to_json(stats)?,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn activate_plan(&mut self, event_id: EventId, plan_id: PlanId) -> DbResult<()> {
        self.conn.execute(
            "UPDATE match_plans SET status = ?3
             WHERE event_id = ?1 AND status = ?4 AND id != ?2",
            params![
                event_id,
                plan_id,
                PlanStatus::Superseded.as_str(),
                PlanStatus::Active.as_str()
            ],
        )?;
        self.conn.execute(
            "UPDATE match_plans SET status = ?2 WHERE id = ?1",
            params![plan_id, PlanStatus::Active.as_str()],
        )?;
        self.conn.execute(
            "UPDATE events SET active_plan_id = ?2 WHERE id = ?1",
            params![event_id, plan_id],
        )?;
        Ok(())
    }

    fn bump_plan_revision(&mut self, plan_id: PlanId, expected: i64) -> DbResult<bool> {
        let n = self.conn.execute(
            "UPDATE match_plans SET revision = revision + 1 WHERE id = ?1 AND revision = ?2",
            params![plan_id, expected],
        )?;
        Ok(n == 1)
    }

    fn pairings_for_plan(&self, plan_id: PlanId) -> DbResult<Vec<CoursePairing>> {
        self.query_all(
            &format!("SELECT {PAIRING_COLUMNS} FROM course_pairings WHERE plan_id = ?1 ORDER BY id"),
            params![plan_id],
            row_to_pairing,
        )
    }

    fn pairings_for_host(&self, plan_id: PlanId, host: CoupleId) -> DbResult<Vec<CoursePairing>> {
        self.query_all(
            &format!(
                "SELECT {PAIRING_COLUMNS} FROM course_pairings
                 WHERE plan_id = ?1 AND host_couple_id = ?2 ORDER BY id"
            ),
            params![plan_id, host],
            row_to_pairing,
        )
    }

    fn pairings_for_guest(&self, plan_id: PlanId, guest: CoupleId) -> DbResult<Vec<CoursePairing>> {
        self.query_all(
            &format!(
                "SELECT {PAIRING_COLUMNS} FROM course_pairings
                 WHERE plan_id = ?1 AND guest_couple_id = ?2 ORDER BY id"
            ),
            params![plan_id, guest],
            row_to_pairing,
        )
    }

    fn insert_pairing(&mut self, plan_id: PlanId, p: &NewPairing) -> DbResult<PairingId> {
        self.conn.execute(
            "INSERT INTO course_pairings (plan_id, course, host_couple_id, guest_couple_id, forced)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                plan_id,
                p.course.as_str(),
                p.host_couple_id,
                p.guest_couple_id,
                p.forced
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn delete_pairings(&mut self, ids: &[PairingId]) -> DbResult<usize> {
        let mut stmt = self.conn.prepare("DELETE FROM course_pairings WHERE id = ?1")?;
        let mut removed = 0;
        for id in ids {
            removed += stmt.execute(params![id])?;
        }
        Ok(removed)
    }

    fn set_pairing_host(&mut self, id: PairingId, host: CoupleId) -> DbResult<()> {
        self.conn.execute(
            "UPDATE course_pairings SET host_couple_id = ?2 WHERE id = ?1",
            params![id, host],
        )?;
        Ok(())
    }

    fn envelopes_for_plan(&self, plan_id: PlanId) -> DbResult<Vec<Envelope>> {
        self.query_all(
            &format!("SELECT {ENVELOPE_COLUMNS} FROM envelopes WHERE plan_id = ?1 ORDER BY id"),
            params![plan_id],
            row_to_envelope,
        )
    }

    fn envelopes_for_couple(&self, plan_id: PlanId, couple_id: CoupleId) -> DbResult<Vec<Envelope>> {
        self.query_all(
            &format!(
                "SELECT {ENVELOPE_COLUMNS} FROM envelopes
                 WHERE plan_id = ?1 AND couple_id = ?2 ORDER BY id"
            ),
            params![plan_id, couple_id],
            row_to_envelope,
        )
    }

    fn envelopes_for_host(&self, plan_id: PlanId, host: CoupleId) -> DbResult<Vec<Envelope>> {
        self.query_all(
            &format!(
                "SELECT {ENVELOPE_COLUMNS} FROM envelopes
                 WHERE plan_id = ?1 AND host_couple_id = ?2 AND cancelled = 0 ORDER BY id"
            ),
            params![plan_id, host],
            row_to_envelope,
        )
    }

    fn insert_envelope(&mut self, plan_id: PlanId, e: &NewEnvelope) -> DbResult<EnvelopeId> {
        let s = &e.schedule;
        self.conn.execute(
            "INSERT INTO envelopes (plan_id, couple_id, course, host_couple_id, destination_address,
                                    destination_notes, cycling_distance_km, teasing_at, clue_1_at,
                                    clue_2_at, street_at, number_at, opened_at, current_state,
                                    access_token, cancelled)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, 0)",
            params![
                plan_id,
                e.couple_id,
                e.course.as_str(),
                e.host_couple_id,
                e.destination_address,
                e.destination_notes,
                e.cycling_distance_km,
                s.teasing_at.to_rfc3339(),
                s.clue_1_at.to_rfc3339(),
                s.clue_2_at.to_rfc3339(),
                s.street_at.to_rfc3339(),
                s.number_at.to_rfc3339(),
                s.opened_at.to_rfc3339(),
                e.current_state.as_str(),
                uuid::Uuid::new_v4().to_string(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn cancel_envelopes(&mut self, ids: &[EnvelopeId]) -> DbResult<usize> {
        let mut stmt = self
            .conn
            .prepare("UPDATE envelopes SET cancelled = 1 WHERE id = ?1 AND cancelled = 0")?;
        let mut cancelled = 0;
        for id in ids {
            cancelled += stmt.execute(params![id])?;
        }
        Ok(cancelled)
    }

    fn update_envelope_destination(
        &mut self,
        id: EnvelopeId,
        host: Option<CoupleId>,
        address: &str,
        notes: Option<&str>,
    ) -> DbResult<()> {
        self.conn.execute(
            "UPDATE envelopes SET host_couple_id = ?2, destination_address = ?3, destination_notes = ?4
             WHERE id = ?1",
            params![id, host, address, notes],
        )?;
        Ok(())
    }

    fn update_envelope_state(&mut self, id: EnvelopeId, state: EnvelopeState) -> DbResult<()> {
        self.conn.execute(
            "UPDATE envelopes SET current_state = ?2 WHERE id = ?1",
            params![id, state.as_str()],
        )?;
        Ok(())
    }

    fn course_clues(&self, plan_id: PlanId, host: CoupleId) -> DbResult<Vec<CourseClues>> {
        self.query_all(
            "SELECT plan_id, host_couple_id, course, indices FROM course_clues
             WHERE plan_id = ?1 AND host_couple_id = ?2",
            params![plan_id, host],
            |row| {
                Ok(CourseClues {
                    plan_id: row.get(0)?,
                    host_couple_id: row.get(1)?,
                    course: get_course(row, 2)?,
                    indices: get_json(row, 3)?,
                })
            },
        )
        .map(|mut clues| {
            clues.sort_by_key(|c| c.course);
            clues
        })
    }

    fn replace_course_clues(&mut self, plan_id: PlanId, host: CoupleId, clues: &[CourseClues]) -> DbResult<()> {
        self.conn.execute(
            "DELETE FROM course_clues WHERE plan_id = ?1 AND host_couple_id = ?2",
            params![plan_id, host],
        )?;
        let mut stmt = self.conn.prepare(
            "INSERT INTO course_clues (plan_id, host_couple_id, course, indices) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for c in clues {
            stmt.execute(params![plan_id, host, c.course.as_str(), to_json(&c.indices)?])?;
        }
        Ok(())
    }

    fn street_info(&self, plan_id: PlanId, host: CoupleId) -> DbResult<Vec<StreetInfo>> {
        self.query_all(
            "SELECT plan_id, host_couple_id, course, street, house_number, locality FROM street_info
             WHERE plan_id = ?1 AND host_couple_id = ?2",
            params![plan_id, host],
            |row| {
                Ok(StreetInfo {
                    plan_id: row.get(0)?,
                    host_couple_id: row.get(1)?,
                    course: get_course(row, 2)?,
                    street: row.get(3)?,
                    house_number: row.get(4)?,
                    locality: row.get(5)?,
                })
            },
        )
        .map(|mut info| {
            info.sort_by_key(|i| i.course);
            info
        })
    }

    fn replace_street_info(&mut self, plan_id: PlanId, host: CoupleId, info: &[StreetInfo]) -> DbResult<()> {
        self.conn.execute(
            "DELETE FROM street_info WHERE plan_id = ?1 AND host_couple_id = ?2",
            params![plan_id, host],
        )?;
        let mut stmt = self.conn.prepare(
            "INSERT INTO street_info (plan_id, host_couple_id, course, street, house_number, locality)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for i in info {
            stmt.execute(params![
                plan_id,
                host,
                i.course.as_str(),
                i.street,
                i.house_number,
                i.locality
            ])?;
        }
        Ok(())
    }
}

impl DinnerDb {
    fn rollback(&self) {
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            tracing::warn!(error = %e, "rollback failed");
        }
    }
}

// === Row decoding ===

fn to_json<T: Serialize + ?Sized>(value: &T) -> DbResult<String> {
    serde_json::to_string(value).map_err(|e| DatabaseError::QueryFailed(e.to_string()))
}

fn conversion_err<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

fn corrupt(idx: usize, column: &str, value: &str) -> rusqlite::Error {
    conversion_err(
        idx,
        DatabaseError::Corrupt {
            column: column.to_string(),
            message: format!("unexpected value '{value}'"),
        },
    )
}

fn get_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn get_course(row: &Row<'_>, idx: usize) -> rusqlite::Result<Course> {
    let s: String = row.get(idx)?;
    s.parse::<Course>().map_err(|e| conversion_err(idx, e))
}

fn get_json<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    serde_json::from_str(&s).map_err(|e| conversion_err(idx, e))
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<DinnerEvent> {
    let afterparty_at: Option<String> = row.get(5)?;
    let afterparty = match afterparty_at {
        Some(_) => Some(Afterparty {
            starts_at: get_datetime(row, 5)?,
            address: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            notes: row.get(7)?,
        }),
        None => None,
    };
    Ok(DinnerEvent {
        id: row.get(0)?,
        name: row.get(1)?,
        starter_at: get_datetime(row, 2)?,
        main_at: get_datetime(row, 3)?,
        dessert_at: get_datetime(row, 4)?,
        afterparty,
        active_plan_id: row.get(8)?,
        created_at: get_datetime(row, 9)?,
    })
}

fn row_to_couple(row: &Row<'_>) -> rusqlite::Result<Couple> {
    let lat: Option<f64> = row.get(6)?;
    let lon: Option<f64> = row.get(7)?;
    let preference: Option<String> = row.get(8)?;
    let course_preference = preference
        .map(|p| p.parse::<Course>().map_err(|e| conversion_err(8, e)))
        .transpose()?;
    Ok(Couple {
        id: row.get(0)?,
        event_id: row.get(1)?,
        name: row.get(2)?,
        persons: row.get(3)?,
        address: row.get(4)?,
        address_notes: row.get(5)?,
        coordinates: lat.zip(lon).map(|(lat, lon)| Coordinates::new(lat, lon)),
        course_preference,
        allergies: get_json(row, 9)?,
        fun_facts: get_json(row, 10)?,
        birth_years: get_json(row, 11)?,
        max_guests: row.get(12)?,
        flex_host: row.get(13)?,
        emergency_host: row.get(14)?,
        cancelled: row.get(15)?,
        created_at: get_datetime(row, 16)?,
    })
}

fn row_to_assignment(row: &Row<'_>) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        event_id: row.get(0)?,
        couple_id: row.get(1)?,
        course: get_course(row, 2)?,
        is_host: row.get(3)?,
        max_guests: row.get(4)?,
        flex_host: row.get(5)?,
        emergency_host: row.get(6)?,
        self_serving: row.get(7)?,
    })
}

fn row_to_plan(row: &Row<'_>) -> rusqlite::Result<MatchPlan> {
    let status: String = row.get(3)?;
    Ok(MatchPlan {
        id: row.get(0)?,
        event_id: row.get(1)?,
        version: row.get(2)?,
        status: PlanStatus::parse(&status).ok_or_else(|| corrupt(3, "status", &status))?,
        revision: row.get(4)?,
        stats: get_json(row, 5)?,
        created_at: get_datetime(row, 6)?,
    })
}

fn row_to_pairing(row: &Row<'_>) -> rusqlite::Result<CoursePairing> {
    Ok(CoursePairing {
        id: row.get(0)?,
        plan_id: row.get(1)?,
        course: get_course(row, 2)?,
        host_couple_id: row.get(3)?,
        guest_couple_id: row.get(4)?,
        forced: row.get(5)?,
    })
}

fn row_to_envelope(row: &Row<'_>) -> rusqlite::Result<Envelope> {
    let state: String = row.get(14)?;
    Ok(Envelope {
        id: row.get(0)?,
        plan_id: row.get(1)?,
        couple_id: row.get(2)?,
        course: get_course(row, 3)?,
        host_couple_id: row.get(4)?,
        destination_address: row.get(5)?,
        destination_notes: row.get(6)?,
        cycling_distance_km: row.get(7)?,
        schedule: RevealSchedule {
            teasing_at: get_datetime(row, 8)?,
            clue_1_at: get_datetime(row, 9)?,
            clue_2_at: get_datetime(row, 10)?,
            street_at: get_datetime(row, 11)?,
            number_at: get_datetime(row, 12)?,
            opened_at: get_datetime(row, 13)?,
        },
        current_state: EnvelopeState::parse(&state).ok_or_else(|| corrupt(14, "current_state", &state))?,
        access_token: row.get(15)?,
        cancelled: row.get(16)?,
    })
}
