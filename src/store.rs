use crate::model::{
    Answer, DeadlineKind, DeadlineRecord, Question, QuestionKind, Questionnaire, Response,
    ResponseMap, ResubmissionRecord, ScoreEntry,
};
use crate::score::ScoreError;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::path::Path;
use uuid::Uuid;

pub fn open_store(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("peerscore.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS questionnaires(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            max_question_score REAL NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS questions(
            id TEXT PRIMARY KEY,
            questionnaire_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            weight REAL NOT NULL DEFAULT 0,
            FOREIGN KEY(questionnaire_id) REFERENCES questionnaires(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_questions_questionnaire ON questions(questionnaire_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS response_maps(
            id TEXT PRIMARY KEY,
            reviewed_object_id TEXT NOT NULL,
            reviewer_id TEXT NOT NULL,
            reviewee_id TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_response_maps_reviewed_object
         ON response_maps(reviewed_object_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS responses(
            id TEXT PRIMARY KEY,
            map_id TEXT NOT NULL,
            submitted_at TEXT NOT NULL,
            FOREIGN KEY(map_id) REFERENCES response_maps(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_responses_map ON responses(map_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS answers(
            id TEXT PRIMARY KEY,
            response_id TEXT NOT NULL,
            question_id TEXT NOT NULL,
            value REAL,
            FOREIGN KEY(response_id) REFERENCES responses(id),
            FOREIGN KEY(question_id) REFERENCES questions(id),
            UNIQUE(response_id, question_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_answers_response ON answers(response_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_answers_question ON answers(question_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS deadlines(
            id TEXT PRIMARY KEY,
            assignment_id TEXT NOT NULL,
            kind INTEGER NOT NULL,
            due_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_deadlines_assignment ON deadlines(assignment_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS resubmissions(
            id TEXT PRIMARY KEY,
            participant_id TEXT NOT NULL,
            resubmitted_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_resubmissions_participant
         ON resubmissions(participant_id)",
        [],
    )?;

    // Scoring reads answered scale/criterion questions through this
    // projection; unfilled answers never appear here.
    conn.execute(
        "CREATE VIEW IF NOT EXISTS score_entries AS
         SELECT a.response_id AS response_id,
                q.id AS question_id,
                q.questionnaire_id AS questionnaire_id,
                q.weight AS weight,
                a.value AS score,
                n.max_question_score AS max_question_score
         FROM answers a
         JOIN questions q ON q.id = a.question_id
         JOIN questionnaires n ON n.id = q.questionnaire_id
         WHERE a.value IS NOT NULL
           AND q.kind IN ('scale', 'criterion')",
        [],
    )?;

    Ok(())
}

pub fn insert_questionnaire(
    conn: &Connection,
    name: &str,
    max_question_score: f64,
) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO questionnaires(id, name, max_question_score) VALUES(?, ?, ?)",
        (&id, name, max_question_score),
    )?;
    Ok(id)
}

pub fn insert_question(
    conn: &Connection,
    questionnaire_id: &str,
    kind: QuestionKind,
    weight: f64,
) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO questions(id, questionnaire_id, kind, weight) VALUES(?, ?, ?, ?)",
        (&id, questionnaire_id, kind.as_str(), weight),
    )?;
    Ok(id)
}

pub fn insert_response_map(
    conn: &Connection,
    reviewed_object_id: &str,
    reviewer_id: &str,
    reviewee_id: &str,
) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO response_maps(id, reviewed_object_id, reviewer_id, reviewee_id)
         VALUES(?, ?, ?, ?)",
        (&id, reviewed_object_id, reviewer_id, reviewee_id),
    )?;
    Ok(id)
}

pub fn insert_response(
    conn: &Connection,
    map_id: &str,
    submitted_at: DateTime<Utc>,
) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO responses(id, map_id, submitted_at) VALUES(?, ?, ?)",
        (&id, map_id, submitted_at.to_rfc3339()),
    )?;
    Ok(id)
}

pub fn insert_answer(
    conn: &Connection,
    response_id: &str,
    question_id: &str,
    value: Option<f64>,
) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO answers(id, response_id, question_id, value) VALUES(?, ?, ?, ?)",
        (&id, response_id, question_id, value),
    )?;
    Ok(id)
}

pub fn insert_deadline(
    conn: &Connection,
    assignment_id: &str,
    kind: DeadlineKind,
    due_at: DateTime<Utc>,
) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO deadlines(id, assignment_id, kind, due_at) VALUES(?, ?, ?, ?)",
        (&id, assignment_id, kind.code(), due_at.to_rfc3339()),
    )?;
    Ok(id)
}

pub fn insert_resubmission(
    conn: &Connection,
    participant_id: &str,
    resubmitted_at: DateTime<Utc>,
) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO resubmissions(id, participant_id, resubmitted_at) VALUES(?, ?, ?)",
        (&id, participant_id, resubmitted_at.to_rfc3339()),
    )?;
    Ok(id)
}

pub fn questionnaire(
    conn: &Connection,
    questionnaire_id: &str,
) -> Result<Questionnaire, ScoreError> {
    let row: Option<(String, f64)> = conn
        .query_row(
            "SELECT name, max_question_score FROM questionnaires WHERE id = ?",
            [questionnaire_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(|e| ScoreError::new("db_query_failed", e.to_string()))?;
    let Some((name, max_question_score)) = row else {
        return Err(ScoreError::new("not_found", "questionnaire not found")
            .with_details(json!({ "questionnaireId": questionnaire_id })));
    };
    Ok(Questionnaire {
        id: questionnaire_id.to_string(),
        name,
        max_question_score,
    })
}

pub fn question(conn: &Connection, question_id: &str) -> Result<Question, ScoreError> {
    let row: Option<(String, String, f64)> = conn
        .query_row(
            "SELECT questionnaire_id, kind, weight FROM questions WHERE id = ?",
            [question_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
        .map_err(|e| ScoreError::new("db_query_failed", e.to_string()))?;
    let Some((questionnaire_id, kind, weight)) = row else {
        return Err(ScoreError::new("not_found", "question not found")
            .with_details(json!({ "questionId": question_id })));
    };
    Ok(Question {
        id: question_id.to_string(),
        questionnaire_id,
        kind: QuestionKind::parse(&kind),
        weight,
    })
}

pub fn questions_by_questionnaire(
    conn: &Connection,
    questionnaire_id: &str,
) -> Result<Vec<Question>, ScoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, kind, weight
             FROM questions
             WHERE questionnaire_id = ?
             ORDER BY rowid",
        )
        .map_err(|e| ScoreError::new("db_query_failed", e.to_string()))?;
    let questions = stmt
        .query_map([questionnaire_id], |r| {
            let kind: String = r.get(1)?;
            Ok(Question {
                id: r.get(0)?,
                questionnaire_id: questionnaire_id.to_string(),
                kind: QuestionKind::parse(&kind),
                weight: r.get(2)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| ScoreError::new("db_query_failed", e.to_string()))?;
    Ok(questions)
}

pub fn response(conn: &Connection, response_id: &str) -> Result<Response, ScoreError> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT map_id, submitted_at FROM responses WHERE id = ?",
            [response_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(|e| ScoreError::new("db_query_failed", e.to_string()))?;
    let Some((map_id, submitted_at)) = row else {
        return Err(ScoreError::new("not_found", "response not found")
            .with_details(json!({ "responseId": response_id })));
    };
    Ok(Response {
        id: response_id.to_string(),
        map_id,
        submitted_at: parse_timestamp("responses.submitted_at", &submitted_at)?,
    })
}

pub fn response_map(conn: &Connection, map_id: &str) -> Result<ResponseMap, ScoreError> {
    let row: Option<(String, String, String)> = conn
        .query_row(
            "SELECT reviewed_object_id, reviewer_id, reviewee_id
             FROM response_maps
             WHERE id = ?",
            [map_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
        .map_err(|e| ScoreError::new("db_query_failed", e.to_string()))?;
    let Some((reviewed_object_id, reviewer_id, reviewee_id)) = row else {
        return Err(ScoreError::new("not_found", "response map not found")
            .with_details(json!({ "mapId": map_id })));
    };
    Ok(ResponseMap {
        id: map_id.to_string(),
        reviewed_object_id,
        reviewer_id,
        reviewee_id,
    })
}

pub fn answers(conn: &Connection, response_id: &str) -> Result<Vec<Answer>, ScoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, question_id, value
             FROM answers
             WHERE response_id = ?
             ORDER BY rowid",
        )
        .map_err(|e| ScoreError::new("db_query_failed", e.to_string()))?;
    let answers = stmt
        .query_map([response_id], |r| {
            Ok(Answer {
                id: r.get(0)?,
                response_id: response_id.to_string(),
                question_id: r.get(1)?,
                value: r.get(2)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| ScoreError::new("db_query_failed", e.to_string()))?;
    Ok(answers)
}

pub fn score_entries(
    conn: &Connection,
    response_id: &str,
    questionnaire_id: &str,
) -> Result<Vec<ScoreEntry>, ScoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT question_id, weight, score, max_question_score
             FROM score_entries
             WHERE response_id = ? AND questionnaire_id = ?
             ORDER BY question_id",
        )
        .map_err(|e| ScoreError::new("db_query_failed", e.to_string()))?;
    let entries = stmt
        .query_map([response_id, questionnaire_id], |r| {
            Ok(ScoreEntry {
                response_id: response_id.to_string(),
                question_id: r.get(0)?,
                questionnaire_id: questionnaire_id.to_string(),
                weight: r.get(1)?,
                score: r.get(2)?,
                max_question_score: r.get(3)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| ScoreError::new("db_query_failed", e.to_string()))?;
    Ok(entries)
}

/// Deadlines for one assignment, most recent first. Phase resolution
/// depends on this ordering.
pub fn deadlines_desc(
    conn: &Connection,
    assignment_id: &str,
) -> Result<Vec<DeadlineRecord>, ScoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, kind, due_at
             FROM deadlines
             WHERE assignment_id = ?
             ORDER BY due_at DESC",
        )
        .map_err(|e| ScoreError::new("db_query_failed", e.to_string()))?;
    let rows = stmt
        .query_map([assignment_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, String>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| ScoreError::new("db_query_failed", e.to_string()))?;

    let mut deadlines = Vec::with_capacity(rows.len());
    for (id, code, due_at) in rows {
        deadlines.push(DeadlineRecord {
            id,
            assignment_id: assignment_id.to_string(),
            // Unknown codes never mark a review phase; fold them in with
            // the plain submission kind.
            kind: DeadlineKind::from_code(code).unwrap_or(DeadlineKind::Submission),
            due_at: parse_timestamp("deadlines.due_at", &due_at)?,
        });
    }
    Ok(deadlines)
}

pub fn resubmissions_desc(
    conn: &Connection,
    participant_id: &str,
) -> Result<Vec<ResubmissionRecord>, ScoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, resubmitted_at
             FROM resubmissions
             WHERE participant_id = ?
             ORDER BY resubmitted_at DESC",
        )
        .map_err(|e| ScoreError::new("db_query_failed", e.to_string()))?;
    let rows = stmt
        .query_map([participant_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| ScoreError::new("db_query_failed", e.to_string()))?;

    let mut resubmissions = Vec::with_capacity(rows.len());
    for (id, resubmitted_at) in rows {
        resubmissions.push(ResubmissionRecord {
            id,
            participant_id: participant_id.to_string(),
            resubmitted_at: parse_timestamp("resubmissions.resubmitted_at", &resubmitted_at)?,
        });
    }
    Ok(resubmissions)
}

// Timestamps are stored as RFC 3339 TEXT so descending string order in SQL
// matches descending chronological order.
fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, ScoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ScoreError::new("bad_timestamp", format!("{column}: {e}")))
}
