//! SQLite implementation of the turn log.

use super::{
    Decision, SimulationRecord, TurnInputs, TurnLog, TurnRecord, STATUS_COMPLETED,
    STATUS_RUNNING,
};
use crate::model::{TurnResult, WorldState};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Turn log backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE simulations (
///     id TEXT PRIMARY KEY,
///     config_json TEXT NOT NULL,
///     created_at TEXT NOT NULL,         -- RFC 3339
///     status TEXT NOT NULL
/// );
/// CREATE TABLE turn_logs (
///     turn_id INTEGER NOT NULL,
///     simulation_id TEXT NOT NULL,
///     agents_inputs TEXT NOT NULL,      -- agent id -> action
///     referee_decision TEXT NOT NULL,   -- {narrative, changes}
///     world_state TEXT NOT NULL,
///     status TEXT NOT NULL,
///     created_at TEXT NOT NULL,
///     PRIMARY KEY (turn_id, simulation_id)
/// );
/// CREATE TABLE events (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     simulation_id TEXT NOT NULL,
///     turn_id INTEGER NOT NULL,
///     event_tag TEXT NOT NULL,
///     entity_id TEXT
/// );
/// ```
///
/// # Thread Safety
/// - Connection is wrapped in a Mutex, so reads of the max turn id and
///   appends for the same simulation are serialized
/// - A turn row and its event rows are written in one transaction
pub struct SqliteTurnLog {
    conn: Mutex<Connection>,
}

impl SqliteTurnLog {
    /// Opens (or creates) the database and ensures the schema exists.
    ///
    /// `":memory:"` gives a private in-memory log.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open turn log at {}", db_path.display()))?;

        // In-memory databases report "memory" and stay that way
        let journal_mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .context("Failed to set journal mode")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS simulations (
                id          TEXT PRIMARY KEY,
                config_json TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                status      TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS turn_logs (
                turn_id          INTEGER NOT NULL,
                simulation_id    TEXT NOT NULL,
                agents_inputs    TEXT NOT NULL,
                referee_decision TEXT NOT NULL,
                world_state      TEXT NOT NULL,
                status           TEXT NOT NULL,
                created_at       TEXT NOT NULL,
                PRIMARY KEY (turn_id, simulation_id)
            );

            CREATE TABLE IF NOT EXISTS events (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                simulation_id TEXT NOT NULL,
                turn_id       INTEGER NOT NULL,
                event_tag     TEXT NOT NULL,
                entity_id     TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_events_tag ON events(simulation_id, event_tag);
            "#,
        )
        .context("Failed to create turn log schema")?;

        info!(path = %db_path.display(), journal_mode = %journal_mode, "Turn log opened");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Turn log connection lock poisoned"))
    }

    /// Returns the simulation metadata row.
    pub fn simulation(&self, simulation_id: &str) -> Result<Option<SimulationRecord>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, config_json, status, created_at FROM simulations WHERE id = ?1",
                params![simulation_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query simulation")?;

        row.map(|(id, config_json, status, created_at)| {
            Ok(SimulationRecord {
                id,
                config: serde_json::from_str(&config_json)
                    .context("Failed to parse stored config")?,
                status,
                created_at: parse_timestamp(&created_at)?,
            })
        })
        .transpose()
    }

    /// All recorded turn ids of a simulation, ascending.
    pub fn turn_ids(&self, simulation_id: &str) -> Result<Vec<u64>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT turn_id FROM turn_logs WHERE simulation_id = ?1 ORDER BY turn_id")
            .context("Failed to prepare query")?;

        let ids = stmt
            .query_map(params![simulation_id], |row| row.get::<_, i64>(0))
            .context("Failed to execute query")?
            .collect::<Result<Vec<i64>, _>>()
            .context("Failed to read results")?;

        Ok(ids.into_iter().map(|id| id as u64).collect())
    }

    /// Full stored record of one turn.
    pub fn load_turn(&self, simulation_id: &str, turn_id: u64) -> Result<Option<TurnRecord>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT agents_inputs, referee_decision, world_state, status, created_at
                FROM turn_logs
                WHERE simulation_id = ?1 AND turn_id = ?2
                "#,
                params![simulation_id, turn_id as i64],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query turn")?;

        row.map(|(inputs, decision, world_state, status, created_at)| {
            Ok(TurnRecord {
                turn_id,
                simulation_id: simulation_id.to_string(),
                inputs: serde_json::from_str(&inputs).context("Failed to parse stored inputs")?,
                decision: serde_json::from_str(&decision)
                    .context("Failed to parse stored decision")?,
                world_state: parse_world_state(&world_state)?,
                status,
                created_at: parse_timestamp(&created_at)?,
            })
        })
        .transpose()
    }

    /// Turn ids carrying `tag`, ascending and without duplicates.
    pub fn turns_with_event(&self, simulation_id: &str, tag: &str) -> Result<Vec<u64>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT DISTINCT turn_id FROM events
                WHERE simulation_id = ?1 AND event_tag = ?2
                ORDER BY turn_id
                "#,
            )
            .context("Failed to prepare query")?;

        let ids = stmt
            .query_map(params![simulation_id, tag], |row| row.get::<_, i64>(0))
            .context("Failed to execute query")?
            .collect::<Result<Vec<i64>, _>>()
            .context("Failed to read results")?;

        Ok(ids.into_iter().map(|id| id as u64).collect())
    }
}

impl TurnLog for SqliteTurnLog {
    fn create_simulation(&self, simulation_id: &str, config: &Value) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO simulations (id, config_json, created_at, status) VALUES (?1, ?2, ?3, ?4)",
            params![
                simulation_id,
                config.to_string(),
                Utc::now().to_rfc3339(),
                STATUS_RUNNING
            ],
        )
        .context("Failed to insert simulation")?;

        info!(simulation_id = %simulation_id, "Simulation recorded");
        Ok(())
    }

    fn load_last_state(&self, simulation_id: &str) -> Result<Option<WorldState>> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row(
                r#"
                SELECT world_state FROM turn_logs
                WHERE simulation_id = ?1
                ORDER BY turn_id DESC
                LIMIT 1
                "#,
                params![simulation_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query last state")?;

        json.as_deref().map(parse_world_state).transpose()
    }

    fn next_turn_id(&self, simulation_id: &str) -> Result<u64> {
        let conn = self.conn()?;
        let max: Option<i64> = conn
            .query_row(
                "SELECT MAX(turn_id) FROM turn_logs WHERE simulation_id = ?1",
                params![simulation_id],
                |row| row.get(0),
            )
            .context("Failed to query max turn id")?;

        Ok(max.map_or(0, |m| m as u64 + 1))
    }

    fn save_turn(&self, result: &TurnResult, inputs: &TurnInputs) -> Result<()> {
        let inputs_json = serde_json::to_string(inputs).context("Failed to serialize inputs")?;
        let decision_json = serde_json::to_string(&Decision {
            narrative: result.narrative.clone(),
            changes: result.changes.clone(),
        })
        .context("Failed to serialize decision")?;
        let state_json =
            serde_json::to_string(&result.world_state).context("Failed to serialize state")?;

        let mut conn = self.conn()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;

        tx.execute(
            r#"
            INSERT INTO turn_logs
                (turn_id, simulation_id, agents_inputs, referee_decision, world_state, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                result.turn_id as i64,
                result.simulation_id,
                inputs_json,
                decision_json,
                state_json,
                STATUS_COMPLETED,
                Utc::now().to_rfc3339(),
            ],
        )
        .with_context(|| format!("Failed to append turn {}", result.turn_id))?;

        for event in &result.events {
            tx.execute(
                "INSERT INTO events (simulation_id, turn_id, event_tag) VALUES (?1, ?2, ?3)",
                params![result.simulation_id, result.turn_id as i64, event],
            )
            .context("Failed to index event")?;
        }

        tx.commit().context("Failed to commit turn")?;

        debug!(
            simulation_id = %result.simulation_id,
            turn_id = result.turn_id,
            events = result.events.len(),
            "Turn appended"
        );
        Ok(())
    }
}

fn parse_world_state(json: &str) -> Result<WorldState> {
    WorldState::from_json(json).context("Failed to parse stored world state")
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .context("Failed to parse stored timestamp")
}
