use chrono::{DateTime, Utc};

/// Question variants. Scale and Criterion are the scored kinds; only their
/// answers ever contribute to a weighted total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionKind {
    Scale,
    Criterion,
    Unscored,
}

impl QuestionKind {
    pub fn is_scored(self) -> bool {
        matches!(self, QuestionKind::Scale | QuestionKind::Criterion)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::Scale => "scale",
            QuestionKind::Criterion => "criterion",
            QuestionKind::Unscored => "unscored",
        }
    }

    pub fn parse(raw: &str) -> QuestionKind {
        match raw {
            "scale" => QuestionKind::Scale,
            "criterion" => QuestionKind::Criterion,
            _ => QuestionKind::Unscored,
        }
    }
}

/// Assignment deadline kinds, keeping the historical numeric codes used in
/// storage. Review and Rereview are the only kinds that mark the close of a
/// review phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineKind {
    Submission,
    Review,
    Resubmission,
    Rereview,
    Metareview,
    DropTopic,
    Signup,
    TeamFormation,
}

impl DeadlineKind {
    pub fn code(self) -> i64 {
        match self {
            DeadlineKind::Submission => 1,
            DeadlineKind::Review => 2,
            DeadlineKind::Resubmission => 3,
            DeadlineKind::Rereview => 4,
            DeadlineKind::Metareview => 5,
            DeadlineKind::DropTopic => 6,
            DeadlineKind::Signup => 7,
            DeadlineKind::TeamFormation => 8,
        }
    }

    pub fn from_code(code: i64) -> Option<DeadlineKind> {
        match code {
            1 => Some(DeadlineKind::Submission),
            2 => Some(DeadlineKind::Review),
            3 => Some(DeadlineKind::Resubmission),
            4 => Some(DeadlineKind::Rereview),
            5 => Some(DeadlineKind::Metareview),
            6 => Some(DeadlineKind::DropTopic),
            7 => Some(DeadlineKind::Signup),
            8 => Some(DeadlineKind::TeamFormation),
            _ => None,
        }
    }

    pub fn marks_review_phase(self) -> bool {
        matches!(self, DeadlineKind::Review | DeadlineKind::Rereview)
    }
}

#[derive(Debug, Clone)]
pub struct Questionnaire {
    pub id: String,
    pub name: String,
    pub max_question_score: f64,
}

#[derive(Debug, Clone)]
pub struct Question {
    pub id: String,
    pub questionnaire_id: String,
    pub kind: QuestionKind,
    pub weight: f64,
}

/// One answer per (response, question) pair. A missing value means the
/// reviewer left the question unfilled.
#[derive(Debug, Clone)]
pub struct Answer {
    pub id: String,
    pub response_id: String,
    pub question_id: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Response {
    pub id: String,
    pub map_id: String,
    pub submitted_at: DateTime<Utc>,
}

impl Response {
    /// Whether this response may still count toward aggregate statistics.
    ///
    /// A response goes stale when the reviewee resubmitted their work after
    /// the response was written and a review phase has started since: the
    /// reviewer had a window to re-review the new submission, so the old
    /// response no longer describes current work. Both comparisons are
    /// strict. With no completed review phase there is no such window and
    /// the response is always valid.
    pub fn is_valid_for_score_calculation(
        &self,
        resubmissions: &[ResubmissionRecord],
        phase_start: Option<DateTime<Utc>>,
    ) -> bool {
        let Some(phase_start) = phase_start else {
            return true;
        };
        !resubmissions
            .iter()
            .any(|r| self.submitted_at < r.resubmitted_at && r.resubmitted_at < phase_start)
    }
}

/// Link between one reviewer and one reviewed object (an assignment
/// participant's work, or a quiz questionnaire for quiz responses).
#[derive(Debug, Clone)]
pub struct ResponseMap {
    pub id: String,
    pub reviewed_object_id: String,
    pub reviewer_id: String,
    pub reviewee_id: String,
}

#[derive(Debug, Clone)]
pub struct DeadlineRecord {
    pub id: String,
    pub assignment_id: String,
    pub kind: DeadlineKind,
    pub due_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ResubmissionRecord {
    pub id: String,
    pub participant_id: String,
    pub resubmitted_at: DateTime<Utc>,
}

/// Read projection of one scored, answered question seen from a response:
/// the question's weight, the recorded score and the questionnaire's
/// per-question maximum, flattened into a single row.
#[derive(Debug, Clone)]
pub struct ScoreEntry {
    pub response_id: String,
    pub question_id: String,
    pub questionnaire_id: String,
    pub weight: f64,
    pub score: f64,
    pub max_question_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    fn response_at(hour: u32) -> Response {
        Response {
            id: "r1".to_string(),
            map_id: "m1".to_string(),
            submitted_at: t(hour),
        }
    }

    fn resubmission_at(hour: u32) -> ResubmissionRecord {
        ResubmissionRecord {
            id: "rs1".to_string(),
            participant_id: "p1".to_string(),
            resubmitted_at: t(hour),
        }
    }

    #[test]
    fn valid_without_review_phase() {
        let response = response_at(2);
        let resubs = vec![resubmission_at(3)];
        assert!(response.is_valid_for_score_calculation(&resubs, None));
    }

    #[test]
    fn valid_without_resubmissions() {
        let response = response_at(2);
        assert!(response.is_valid_for_score_calculation(&[], Some(t(6))));
    }

    #[test]
    fn invalid_when_resubmitted_inside_window() {
        let response = response_at(2);
        let resubs = vec![resubmission_at(4)];
        assert!(!response.is_valid_for_score_calculation(&resubs, Some(t(6))));
    }

    #[test]
    fn valid_when_resubmitted_before_response() {
        let response = response_at(5);
        let resubs = vec![resubmission_at(4)];
        assert!(response.is_valid_for_score_calculation(&resubs, Some(t(6))));
    }

    #[test]
    fn valid_when_resubmitted_after_phase_start() {
        let response = response_at(2);
        let resubs = vec![resubmission_at(7)];
        assert!(response.is_valid_for_score_calculation(&resubs, Some(t(6))));
    }

    #[test]
    fn window_bounds_are_strict() {
        let response = response_at(2);
        // Exactly at submission time: not after it.
        assert!(response.is_valid_for_score_calculation(&[resubmission_at(2)], Some(t(6))));
        // Exactly at phase start: not before it.
        assert!(response.is_valid_for_score_calculation(&[resubmission_at(6)], Some(t(6))));
    }

    #[test]
    fn any_resubmission_in_window_invalidates() {
        let response = response_at(2);
        let resubs = vec![resubmission_at(1), resubmission_at(4), resubmission_at(9)];
        assert!(!response.is_valid_for_score_calculation(&resubs, Some(t(6))));
    }

    #[test]
    fn scored_kinds() {
        assert!(QuestionKind::Scale.is_scored());
        assert!(QuestionKind::Criterion.is_scored());
        assert!(!QuestionKind::Unscored.is_scored());
    }

    #[test]
    fn kind_parse_round_trips_and_defaults() {
        assert_eq!(QuestionKind::parse("scale"), QuestionKind::Scale);
        assert_eq!(QuestionKind::parse("criterion"), QuestionKind::Criterion);
        assert_eq!(QuestionKind::parse("checkbox"), QuestionKind::Unscored);
    }

    #[test]
    fn deadline_codes_round_trip() {
        for kind in [
            DeadlineKind::Submission,
            DeadlineKind::Review,
            DeadlineKind::Resubmission,
            DeadlineKind::Rereview,
            DeadlineKind::Metareview,
            DeadlineKind::DropTopic,
            DeadlineKind::Signup,
            DeadlineKind::TeamFormation,
        ] {
            assert_eq!(DeadlineKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(DeadlineKind::from_code(99), None);
    }

    #[test]
    fn only_review_kinds_mark_phases() {
        assert!(DeadlineKind::Review.marks_review_phase());
        assert!(DeadlineKind::Rereview.marks_review_phase());
        assert!(!DeadlineKind::Submission.marks_review_phase());
        assert!(!DeadlineKind::Metareview.marks_review_phase());
    }
}
