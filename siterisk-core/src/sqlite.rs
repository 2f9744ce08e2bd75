//! SQLite-backed assessment store
//!
//! Schema:
//! - `facilities`, `sections`, `questions`, `question_options`
//! - `answers` with `UNIQUE(facility_id, question_id)`
//! - `risk_scores` keyed by facility, holding the record as JSON
//!
//! Upserts are `INSERT .. ON CONFLICT .. DO UPDATE`, so concurrent writers
//! for the same key resolve last-write-wins inside SQLite. Selected options
//! are kept as raw JSON text; legacy shapes reach the normalizer untouched.

use crate::aggregates::RiskScoreRecord;
use crate::catalog::Questionnaire;
use crate::error::StoreError;
use crate::model::{
    Answer, Facility, Question, QuestionId, QuestionOption, Section, SectionId, Threshold,
};
use crate::store::{AssessmentStore, StoreResult};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS facilities (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    location TEXT NOT NULL DEFAULT '',
    assessor TEXT,
    assessment_date TEXT,
    progress INTEGER NOT NULL DEFAULT 0,
    created_at TEXT,
    updated_at TEXT
);
CREATE TABLE IF NOT EXISTS sections (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    weight REAL NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS questions (
    id INTEGER PRIMARY KEY,
    section_id INTEGER NOT NULL,
    text TEXT NOT NULL,
    input_type TEXT NOT NULL,
    required INTEGER NOT NULL DEFAULT 0,
    importance TEXT,
    risk_factor TEXT,
    scoring INTEGER NOT NULL DEFAULT 1,
    thresholds TEXT NOT NULL DEFAULT '[]'
);
CREATE TABLE IF NOT EXISTS question_options (
    question_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    value TEXT NOT NULL,
    label TEXT NOT NULL DEFAULT '',
    risk_score REAL,
    risk_level TEXT,
    risk_factor TEXT,
    weight REAL,
    PRIMARY KEY (question_id, position)
);
CREATE TABLE IF NOT EXISTS answers (
    facility_id TEXT NOT NULL,
    question_id INTEGER NOT NULL,
    value TEXT,
    numeric_value REAL,
    selected_options TEXT,
    updated_at TEXT NOT NULL,
    UNIQUE (facility_id, question_id)
);
CREATE TABLE IF NOT EXISTS risk_scores (
    facility_id TEXT PRIMARY KEY,
    record TEXT NOT NULL,
    stored_at TEXT NOT NULL
);
";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        debug!("sqlite schema ready");
        Ok(SqliteStore { conn })
    }

    /// When the score record of a facility was last written
    pub fn score_stored_at(&self, facility: &str) -> StoreResult<Option<DateTime<Utc>>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT stored_at FROM risk_scores WHERE facility_id = ?1",
                [facility],
                |r| r.get(0),
            )
            .optional()?;
        raw.map(|s| parse_timestamp("risk_scores", &s)).transpose()
    }

    fn load_questions(&self, section: Option<SectionId>) -> StoreResult<Vec<Question>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, section_id, text, input_type, required, importance, risk_factor,
                    scoring, thresholds
             FROM questions
             WHERE ?1 IS NULL OR section_id = ?1
             ORDER BY id",
        )?;
        let rows = stmt
            .query_map([section], QuestionRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(QuestionRow::into_question).collect()
    }
}

/// Enum to its serde string form
fn enum_text<T: Serialize>(value: &T) -> StoreResult<String> {
    match serde_json::to_value(value)? {
        Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

fn enum_from_text<T: DeserializeOwned>(table: &'static str, text: &str) -> StoreResult<T> {
    serde_json::from_value(Value::String(text.to_string())).map_err(|e| StoreError::Corrupt {
        table,
        detail: format!("unrecognised value {text:?}: {e}"),
    })
}

fn optional_enum<T: DeserializeOwned>(
    table: &'static str,
    text: Option<String>,
) -> StoreResult<Option<T>> {
    text.map(|t| enum_from_text(table, &t)).transpose()
}

/// Fixed-width RFC 3339 text, so stored timestamps order correctly as strings
fn timestamp_text(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(table: &'static str, text: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            table,
            detail: format!("bad timestamp {text:?}: {e}"),
        })
}

struct QuestionRow {
    id: QuestionId,
    section_id: SectionId,
    text: String,
    input_type: String,
    required: bool,
    importance: Option<String>,
    risk_factor: Option<String>,
    scoring: bool,
    thresholds: String,
}

impl QuestionRow {
    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(QuestionRow {
            id: r.get(0)?,
            section_id: r.get(1)?,
            text: r.get(2)?,
            input_type: r.get(3)?,
            required: r.get(4)?,
            importance: r.get(5)?,
            risk_factor: r.get(6)?,
            scoring: r.get(7)?,
            thresholds: r.get(8)?,
        })
    }

    fn into_question(self) -> StoreResult<Question> {
        let thresholds: Vec<Threshold> = serde_json::from_str(&self.thresholds)?;
        Ok(Question {
            id: self.id,
            section_id: self.section_id,
            text: self.text,
            input_type: enum_from_text("questions", &self.input_type)?,
            required: self.required,
            importance: optional_enum("questions", self.importance)?,
            risk_factor: optional_enum("questions", self.risk_factor)?,
            scoring: self.scoring,
            thresholds,
        })
    }
}

struct AnswerRow {
    facility_id: String,
    question_id: QuestionId,
    value: Option<String>,
    numeric_value: Option<f64>,
    selected_options: Option<String>,
    updated_at: String,
}

impl AnswerRow {
    fn into_answer(self) -> StoreResult<Answer> {
        // Unparsable text is handed on as a JSON string; the normalizer decides
        let selected_options = self.selected_options.map(|raw| {
            serde_json::from_str::<Value>(&raw).unwrap_or(Value::String(raw))
        });
        Ok(Answer {
            facility_id: self.facility_id,
            question_id: self.question_id,
            value: self.value,
            numeric_value: self.numeric_value,
            selected_options,
            updated_at: parse_timestamp("answers", &self.updated_at)?,
        })
    }
}

struct FacilityRow {
    id: String,
    name: String,
    location: String,
    assessor: Option<String>,
    assessment_date: Option<String>,
    progress: u8,
    created_at: Option<String>,
    updated_at: Option<String>,
}

impl FacilityRow {
    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(FacilityRow {
            id: r.get(0)?,
            name: r.get(1)?,
            location: r.get(2)?,
            assessor: r.get(3)?,
            assessment_date: r.get(4)?,
            progress: r.get(5)?,
            created_at: r.get(6)?,
            updated_at: r.get(7)?,
        })
    }

    fn into_facility(self) -> StoreResult<Facility> {
        let assessment_date = self
            .assessment_date
            .map(|d| {
                NaiveDate::parse_from_str(&d, "%Y-%m-%d").map_err(|e| StoreError::Corrupt {
                    table: "facilities",
                    detail: format!("bad date {d:?}: {e}"),
                })
            })
            .transpose()?;
        Ok(Facility {
            id: self.id,
            name: self.name,
            location: self.location,
            assessor: self.assessor,
            assessment_date,
            progress: self.progress,
            created_at: self
                .created_at
                .map(|t| parse_timestamp("facilities", &t))
                .transpose()?,
            updated_at: self
                .updated_at
                .map(|t| parse_timestamp("facilities", &t))
                .transpose()?,
        })
    }
}

const FACILITY_COLUMNS: &str =
    "id, name, location, assessor, assessment_date, progress, created_at, updated_at";

impl AssessmentStore for SqliteStore {
    fn facility(&self, id: &str) -> StoreResult<Option<Facility>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {FACILITY_COLUMNS} FROM facilities WHERE id = ?1"),
                [id],
                FacilityRow::from_row,
            )
            .optional()?;
        row.map(FacilityRow::into_facility).transpose()
    }

    fn facilities(&self) -> StoreResult<Vec<Facility>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {FACILITY_COLUMNS} FROM facilities ORDER BY id"))?;
        let rows = stmt
            .query_map([], FacilityRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(FacilityRow::into_facility).collect()
    }

    fn sections(&self) -> StoreResult<Vec<Section>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, weight FROM sections ORDER BY id")?;
        let sections = stmt
            .query_map([], |r| {
                Ok(Section {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    weight: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sections)
    }

    fn questions(&self, section: Option<SectionId>) -> StoreResult<Vec<Question>> {
        self.load_questions(section)
    }

    fn question_options(&self, question: QuestionId) -> StoreResult<Vec<QuestionOption>> {
        let mut stmt = self.conn.prepare(
            "SELECT value, label, risk_score, risk_level, risk_factor, weight
             FROM question_options WHERE question_id = ?1 ORDER BY position",
        )?;
        let rows = stmt
            .query_map([question], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Option<f64>>(2)?,
                    r.get::<_, Option<String>>(3)?,
                    r.get::<_, Option<String>>(4)?,
                    r.get::<_, Option<f64>>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(value, label, risk_score, risk_level, risk_factor, weight)| {
                Ok(QuestionOption {
                    question_id: question,
                    value,
                    label,
                    risk_score,
                    risk_level: optional_enum("question_options", risk_level)?,
                    risk_factor: optional_enum("question_options", risk_factor)?,
                    weight,
                })
            })
            .collect()
    }

    fn answers(&self, facility: &str) -> StoreResult<Vec<Answer>> {
        let mut stmt = self.conn.prepare(
            "SELECT facility_id, question_id, value, numeric_value, selected_options, updated_at
             FROM answers WHERE facility_id = ?1 ORDER BY question_id",
        )?;
        let rows = stmt
            .query_map([facility], |r| {
                Ok(AnswerRow {
                    facility_id: r.get(0)?,
                    question_id: r.get(1)?,
                    value: r.get(2)?,
                    numeric_value: r.get(3)?,
                    selected_options: r.get(4)?,
                    updated_at: r.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(AnswerRow::into_answer).collect()
    }

    fn upsert_answer(&mut self, answer: &Answer) -> StoreResult<()> {
        let selected = answer
            .selected_options
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn.execute(
            "INSERT INTO answers
                 (facility_id, question_id, value, numeric_value, selected_options, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (facility_id, question_id) DO UPDATE SET
                 value = excluded.value,
                 numeric_value = excluded.numeric_value,
                 selected_options = excluded.selected_options,
                 updated_at = excluded.updated_at
             WHERE excluded.updated_at >= answers.updated_at",
            params![
                answer.facility_id,
                answer.question_id,
                answer.value,
                answer.numeric_value,
                selected,
                timestamp_text(&answer.updated_at),
            ],
        )?;
        Ok(())
    }

    fn upsert_facility(&mut self, facility: &Facility) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO facilities
                 (id, name, location, assessor, assessment_date, progress, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (id) DO UPDATE SET
                 name = excluded.name,
                 location = excluded.location,
                 assessor = excluded.assessor,
                 assessment_date = excluded.assessment_date,
                 progress = excluded.progress,
                 created_at = COALESCE(facilities.created_at, excluded.created_at),
                 updated_at = excluded.updated_at",
            params![
                facility.id,
                facility.name,
                facility.location,
                facility.assessor,
                facility.assessment_date.map(|d| d.format("%Y-%m-%d").to_string()),
                facility.progress.min(100),
                facility.created_at.as_ref().map(timestamp_text),
                facility.updated_at.as_ref().map(timestamp_text),
            ],
        )?;
        Ok(())
    }

    fn load_catalog(&mut self, questionnaire: &Questionnaire) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(
            "DELETE FROM question_options;
             DELETE FROM questions;
             DELETE FROM sections;",
        )?;
        {
            let mut insert_section =
                tx.prepare("INSERT INTO sections (id, name, weight) VALUES (?1, ?2, ?3)")?;
            for s in questionnaire.sections() {
                insert_section.execute(params![s.id, s.name, s.weight])?;
            }

            let mut insert_question = tx.prepare(
                "INSERT INTO questions
                     (id, section_id, text, input_type, required, importance, risk_factor,
                      scoring, thresholds)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            let mut insert_option = tx.prepare(
                "INSERT INTO question_options
                     (question_id, position, value, label, risk_score, risk_level, risk_factor,
                      weight)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for q in questionnaire.questions() {
                insert_question.execute(params![
                    q.id,
                    q.section_id,
                    q.text,
                    enum_text(&q.input_type)?,
                    q.required,
                    q.importance.as_ref().map(enum_text).transpose()?,
                    q.risk_factor.as_ref().map(enum_text).transpose()?,
                    q.scoring,
                    serde_json::to_string(&q.thresholds)?,
                ])?;
                for (position, o) in questionnaire.options_for(q.id).iter().enumerate() {
                    insert_option.execute(params![
                        q.id,
                        position as i64,
                        o.value,
                        o.label,
                        o.risk_score,
                        o.risk_level.as_ref().map(enum_text).transpose()?,
                        o.risk_factor.as_ref().map(enum_text).transpose()?,
                        o.weight,
                    ])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn risk_score(&self, facility: &str) -> StoreResult<Option<RiskScoreRecord>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT record FROM risk_scores WHERE facility_id = ?1",
                [facility],
                |r| r.get(0),
            )
            .optional()?;
        Ok(raw.map(|r| serde_json::from_str(&r)).transpose()?)
    }

    fn upsert_risk_score(&mut self, facility: &str, record: &RiskScoreRecord) -> StoreResult<()> {
        let json = serde_json::to_string(record)?;
        self.conn.execute(
            "INSERT INTO risk_scores (facility_id, record, stored_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (facility_id) DO UPDATE SET
                 record = excluded.record,
                 stored_at = excluded.stored_at",
            params![facility, json, timestamp_text(&Utc::now())],
        )?;
        Ok(())
    }

    fn update_facility_progress(&mut self, facility: &str, progress: u8) -> StoreResult<()> {
        self.conn.execute(
            "UPDATE facilities SET progress = ?2, updated_at = ?3 WHERE id = ?1",
            params![facility, progress.min(100), timestamp_text(&Utc::now())],
        )?;
        Ok(())
    }

    fn set_question_section(
        &mut self,
        question: QuestionId,
        section: SectionId,
    ) -> StoreResult<()> {
        self.conn.execute(
            "UPDATE questions SET section_id = ?2 WHERE id = ?1",
            params![question, section],
        )?;
        Ok(())
    }
}
