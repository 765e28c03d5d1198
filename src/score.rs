use crate::model::{DeadlineRecord, Question, Response};
use crate::store;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use thiserror::Error;

/// Engine error with a stable machine-readable code. Codes in use:
/// `not_found`, `db_query_failed`, `bad_timestamp`.
#[derive(Debug, Clone, Serialize, Error)]
#[error("{code}: {message}")]
pub struct ScoreError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ScoreError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Outcome of scoring one response against one question set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TotalScore {
    /// Normalized weighted score, as a percentage.
    Percent(f64),
    /// No score computable: the response is absent, the effective weight
    /// sum is non-positive, or the maximum question score is undefined.
    NoScore,
}

impl TotalScore {
    pub fn percent(self) -> Option<f64> {
        match self {
            TotalScore::Percent(p) => Some(p),
            TotalScore::NoScore => None,
        }
    }

    /// Numeric form for callers still speaking the legacy convention,
    /// where -1 stands for "no score".
    pub fn legacy_value(self) -> f64 {
        match self {
            TotalScore::Percent(p) => p,
            TotalScore::NoScore => -1.0,
        }
    }

    // Aggregation folds NoScore in as 0 rather than skipping the response.
    fn aggregate_value(self) -> f64 {
        match self {
            TotalScore::Percent(p) => p,
            TotalScore::NoScore => 0.0,
        }
    }
}

/// How an invalid response affects the aggregate average.
///
/// `ZeroedButCounted` zeroes the response's contribution while leaving it
/// in the denominator, which is what the legacy engine effectively did:
/// it computed a count adjustment and then threw it away. `Excluded`
/// applies that adjustment, so invalid responses drop out of the average
/// entirely. Max and min see the raw score under either policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidResponsePolicy {
    #[default]
    ZeroedButCounted,
    Excluded,
}

/// Aggregate statistics over a response list. All fields are None when the
/// list was empty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    pub max: Option<f64>,
    pub min: Option<f64>,
    pub avg: Option<f64>,
}

impl ScoreSummary {
    pub fn empty() -> Self {
        Self {
            max: None,
            min: None,
            avg: None,
        }
    }
}

/// Shared inputs for one scoring pass: the store handle, the clock reading
/// used for deadline checks, and the invalid-response policy.
#[derive(Debug, Clone)]
pub struct ScoreContext<'a> {
    pub conn: &'a Connection,
    pub now: DateTime<Utc>,
    pub invalid_policy: InvalidResponsePolicy,
}

impl<'a> ScoreContext<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            now: Utc::now(),
            invalid_policy: InvalidResponsePolicy::default(),
        }
    }
}

/// Start of the most recently completed review phase, if any.
///
/// `deadlines` must be sorted by due time, descending; the slice is walked
/// once and never re-sorted. A Review or Rereview deadline marks a phase,
/// and the next (earlier) deadline of any kind is the candidate phase
/// start, taken only if it is already in the past. A marker whose follower
/// is still in the future is discarded, but that follower is then itself
/// considered as a fresh marker.
pub fn latest_review_phase_start(
    deadlines: &[DeadlineRecord],
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let mut saw_phase_marker = false;
    for deadline in deadlines {
        if saw_phase_marker && deadline.due_at <= now {
            return Some(deadline.due_at);
        } else {
            saw_phase_marker = false;
        }
        if deadline.kind.marks_review_phase() {
            saw_phase_marker = true;
        }
    }
    None
}

/// Whether a response may count toward aggregate statistics.
///
/// Resolves the response's map, finds the latest completed review phase of
/// the reviewed assignment, then applies the response's own staleness rule
/// against the reviewee's resubmission history.
pub fn submission_valid(ctx: &ScoreContext<'_>, response: &Response) -> Result<bool, ScoreError> {
    let map = store::response_map(ctx.conn, &response.map_id)?;
    let deadlines = store::deadlines_desc(ctx.conn, &map.reviewed_object_id)?;
    let phase_start = latest_review_phase_start(&deadlines, ctx.now);
    let resubmissions = store::resubmissions_desc(ctx.conn, &map.reviewee_id)?;
    Ok(response.is_valid_for_score_calculation(&resubmissions, phase_start))
}

/// Weighted percentage score of a single response over one questionnaire.
///
/// Answered scale/criterion questions contribute weight times score; the
/// total is normalized by the weight sum times the questionnaire's maximum
/// question score. An unfilled answer on a scored question pulls that
/// question's weight back out of the denominator. The questionnaire is the
/// one owning the first question in `questions`.
pub fn compute_total_score(
    ctx: &ScoreContext<'_>,
    response: Option<&Response>,
    questions: &[Question],
) -> Result<TotalScore, ScoreError> {
    let Some(response) = response else {
        return Ok(TotalScore::NoScore);
    };
    let Some(first) = questions.first() else {
        return Ok(TotalScore::NoScore);
    };

    let entries = store::score_entries(ctx.conn, &response.id, &first.questionnaire_id)?;

    let mut sum_of_weights = 0.0_f64;
    let mut weighted_score = 0.0_f64;
    let mut max_question_score = 0.0_f64;
    for entry in &entries {
        sum_of_weights += entry.weight;
        weighted_score += entry.weight * entry.score;
        // Shared across the questionnaire, so any entry's value serves.
        max_question_score = entry.max_question_score;
    }

    // Every unfilled answer on a scored question subtracts its weight,
    // whichever questionnaire the question belongs to.
    for answer in store::answers(ctx.conn, &response.id)? {
        let question = store::question(ctx.conn, &answer.question_id)?;
        if answer.value.is_none() && question.kind.is_scored() {
            sum_of_weights -= question.weight;
        }
    }

    if sum_of_weights > 0.0 && max_question_score > 0.0 {
        Ok(TotalScore::Percent(
            (weighted_score / (sum_of_weights * max_question_score)) * 100.0,
        ))
    } else {
        tracing::warn!(
            response_id = %response.id,
            sum_of_weights,
            max_question_score,
            "no score computable for response"
        );
        Ok(TotalScore::NoScore)
    }
}

/// Max, min and average score over responses sharing one question set.
///
/// Max and min always track the raw per-response score; the configured
/// policy decides how an invalid response affects the average.
pub fn compute_scores(
    ctx: &ScoreContext<'_>,
    responses: &[Response],
    questions: &[Question],
) -> Result<ScoreSummary, ScoreError> {
    if responses.is_empty() {
        return Ok(ScoreSummary::empty());
    }

    let mut max = f64::NEG_INFINITY;
    let mut min = f64::INFINITY;
    let mut total = 0.0_f64;
    let mut counted = responses.len();

    for response in responses {
        let score = compute_total_score(ctx, Some(response), questions)?.aggregate_value();
        if score > max {
            max = score;
        }
        if score < min {
            min = score;
        }

        if submission_valid(ctx, response)? {
            total += score;
        } else if ctx.invalid_policy == InvalidResponsePolicy::Excluded {
            counted -= 1;
        }
    }

    let avg = if counted > 0 {
        total / counted as f64
    } else {
        0.0
    };
    tracing::debug!(
        responses = responses.len(),
        counted,
        max,
        min,
        avg,
        "aggregated assessment scores"
    );
    Ok(ScoreSummary {
        max: Some(max),
        min: Some(min),
        avg: Some(avg),
    })
}

/// Max, min and average over quiz responses, each scored against its own
/// quiz questionnaire. Quiz responses are never checked for validity.
pub fn compute_quiz_scores(
    ctx: &ScoreContext<'_>,
    responses: &[Response],
) -> Result<ScoreSummary, ScoreError> {
    if responses.is_empty() {
        return Ok(ScoreSummary::empty());
    }

    let mut max = f64::NEG_INFINITY;
    let mut min = f64::INFINITY;
    let mut total = 0.0_f64;

    for response in responses {
        let map = store::response_map(ctx.conn, &response.map_id)?;
        let quiz = store::questionnaire(ctx.conn, &map.reviewed_object_id)?;
        let questions = store::questions_by_questionnaire(ctx.conn, &quiz.id)?;
        let score = compute_total_score(ctx, Some(response), &questions)?.aggregate_value();
        if score > max {
            max = score;
        }
        if score < min {
            min = score;
        }
        total += score;
    }

    let avg = total / responses.len() as f64;
    tracing::debug!(
        responses = responses.len(),
        max,
        min,
        avg,
        "aggregated quiz scores"
    );
    Ok(ScoreSummary {
        max: Some(max),
        min: Some(min),
        avg: Some(avg),
    })
}
