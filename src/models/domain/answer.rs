use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::domain::question::{MatchPair, QuestionKind, QuestionType};
use crate::models::domain::Question;

/// A candidate's response; the variant must match the question kind.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerValue {
    MultipleChoice { selected: Vec<u32> },
    TrueFalse { value: bool },
    MatchPairs { pairs: Vec<MatchPair> },
    Descriptive { text: String },
}

impl AnswerValue {
    pub fn question_type(&self) -> QuestionType {
        match self {
            AnswerValue::MultipleChoice { .. } => QuestionType::MultipleChoice,
            AnswerValue::TrueFalse { .. } => QuestionType::TrueFalse,
            AnswerValue::MatchPairs { .. } => QuestionType::MatchPairs,
            AnswerValue::Descriptive { .. } => QuestionType::Descriptive,
        }
    }

    /// Checks the shape of this answer against the question it responds to.
    pub fn validate_for(&self, kind: &QuestionKind) -> AppResult<()> {
        if self.question_type() != kind.question_type() {
            return Err(AppError::InvalidAnswerFormat(format!(
                "expected a {:?} answer",
                kind.question_type()
            )));
        }

        match (self, kind) {
            (AnswerValue::MultipleChoice { selected }, QuestionKind::MultipleChoice { options, .. }) => {
                if selected.is_empty() {
                    return Err(AppError::InvalidAnswerFormat(
                        "select at least one option".into(),
                    ));
                }
                if selected.iter().any(|&i| i as usize >= options.len()) {
                    return Err(AppError::InvalidAnswerFormat(
                        "selected option does not exist".into(),
                    ));
                }
            }
            (AnswerValue::MatchPairs { pairs }, QuestionKind::MatchPairs { .. }) => {
                if pairs.is_empty() {
                    return Err(AppError::InvalidAnswerFormat(
                        "match at least one pair".into(),
                    ));
                }
            }
            (AnswerValue::Descriptive { text }, QuestionKind::Descriptive { .. }) => {
                if text.trim().is_empty() {
                    return Err(AppError::InvalidAnswerFormat(
                        "answer text cannot be empty".into(),
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Correctness for auto-graded kinds; `None` for descriptive answers.
    pub fn grade(&self, kind: &QuestionKind) -> Option<bool> {
        match (self, kind) {
            (
                AnswerValue::MultipleChoice { selected },
                QuestionKind::MultipleChoice { correct_answer, .. },
            ) => {
                let chosen: HashSet<u32> = selected.iter().copied().collect();
                let expected: HashSet<u32> = correct_answer.iter().copied().collect();
                Some(chosen == expected)
            }
            (AnswerValue::TrueFalse { value }, QuestionKind::TrueFalse { correct_answer }) => {
                Some(value == correct_answer)
            }
            (AnswerValue::MatchPairs { pairs }, QuestionKind::MatchPairs { pairs: expected }) => {
                let given: HashSet<&MatchPair> = pairs.iter().collect();
                let wanted: HashSet<&MatchPair> = expected.iter().collect();
                Some(pairs.len() == expected.len() && given == wanted)
            }
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Reviewed,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Answer {
    pub id: String,
    pub attempt_id: String,
    pub question_id: String,
    pub value: AnswerValue,
    pub is_correct: Option<bool>,
    pub marks: Option<f64>,
    pub review_status: ReviewStatus,
    pub feedback: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl Answer {
    /// Builds a graded answer. The value must already be validated for the question.
    pub fn graded(attempt_id: &str, question: &Question, value: AnswerValue) -> Self {
        let mut answer = Answer {
            id: Uuid::new_v4().to_string(),
            attempt_id: attempt_id.to_string(),
            question_id: question.id.clone(),
            value: value.clone(),
            is_correct: None,
            marks: None,
            review_status: ReviewStatus::Pending,
            feedback: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: Some(Utc::now()),
            modified_at: Some(Utc::now()),
        };
        answer.regrade(question, value);
        answer
    }

    /// Replaces the value and its grading, keeping identity.
    pub fn regrade(&mut self, question: &Question, value: AnswerValue) {
        match value.grade(&question.kind) {
            Some(correct) => {
                self.is_correct = Some(correct);
                self.marks = Some(if correct {
                    question.marks
                } else {
                    0.0 - question.negative_marks
                });
                self.review_status = ReviewStatus::Reviewed;
            }
            None => {
                self.is_correct = None;
                self.marks = None;
                self.review_status = ReviewStatus::Pending;
            }
        }
        self.value = value;
        self.feedback = None;
        self.reviewed_by = None;
        self.reviewed_at = None;
        self.modified_at = Some(Utc::now());
    }

    pub fn is_pending(&self) -> bool {
        self.review_status == ReviewStatus::Pending
    }

    /// Records a manual review. Marks must lie within `[0, question.marks]`.
    pub fn review(
        &mut self,
        question: &Question,
        marks: f64,
        feedback: Option<String>,
        reviewer: &str,
    ) -> AppResult<()> {
        if !marks.is_finite() || marks < 0.0 {
            return Err(AppError::ValidationError("Marks cannot be negative".into()));
        }
        if marks > question.marks {
            return Err(AppError::MarksExceedQuestion {
                awarded: marks,
                max: question.marks,
            });
        }

        let now = Utc::now();
        self.marks = Some(marks);
        self.is_correct = Some(marks > 0.0);
        self.feedback = feedback;
        self.review_status = ReviewStatus::Reviewed;
        self.reviewed_by = Some(reviewer.to_string());
        self.reviewed_at = Some(now);
        self.modified_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::domain::question::{mcq_draft, Difficulty, QuestionDraft};

    fn question(kind: QuestionKind, marks: f64, negative: f64) -> Question {
        let draft = QuestionDraft {
            text: "q".into(),
            kind,
            marks,
            negative_marks: negative,
            explanation: None,
            difficulty: Difficulty::Easy,
        };
        Question::from_draft(draft, "exam", 1, "author")
    }

    #[test]
    fn empty_selection_is_invalid() {
        let mcq = Question::from_draft(mcq_draft(5.0), "exam", 1, "author");
        let value = AnswerValue::MultipleChoice { selected: vec![] };
        let err = value.validate_for(&mcq.kind).unwrap_err();
        assert!(matches!(err, AppError::InvalidAnswerFormat(_)));
    }

    #[test]
    fn out_of_range_selection_is_invalid() {
        let mcq = Question::from_draft(mcq_draft(5.0), "exam", 1, "author");
        let value = AnswerValue::MultipleChoice { selected: vec![9] };
        assert!(value.validate_for(&mcq.kind).is_err());
    }

    #[test]
    fn mismatched_kind_is_invalid() {
        let tf = question(QuestionKind::TrueFalse { correct_answer: true }, 2.0, 0.0);
        let value = AnswerValue::Descriptive { text: "yes".into() };
        assert!(matches!(
            value.validate_for(&tf.kind),
            Err(AppError::InvalidAnswerFormat(_))
        ));
    }

    #[test]
    fn multiple_choice_is_order_insensitive() {
        let mcq = Question::from_draft(mcq_draft(5.0), "exam", 1, "author");
        let answer = Answer::graded(
            "attempt",
            &mcq,
            AnswerValue::MultipleChoice { selected: vec![2, 0] },
        );
        assert_eq!(answer.is_correct, Some(true));
        assert_eq!(answer.marks, Some(5.0));
        assert!(!answer.is_pending());
    }

    #[test]
    fn wrong_answer_applies_negative_marks() {
        let tf = question(QuestionKind::TrueFalse { correct_answer: true }, 2.0, 0.5);
        let answer = Answer::graded("attempt", &tf, AnswerValue::TrueFalse { value: false });
        assert_eq!(answer.is_correct, Some(false));
        assert_eq!(answer.marks, Some(-0.5));
    }

    #[test]
    fn wrong_answer_without_penalty_scores_positive_zero() {
        let tf = question(QuestionKind::TrueFalse { correct_answer: true }, 2.0, 0.0);
        let answer = Answer::graded("attempt", &tf, AnswerValue::TrueFalse { value: false });
        let marks = answer.marks.unwrap();
        assert_eq!(marks, 0.0);
        assert!(marks.is_sign_positive());

        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["marks"].to_string(), "0.0");
    }

    #[test]
    fn match_pairs_must_match_exactly() {
        let pairs = vec![
            MatchPair { left: "a".into(), right: "1".into() },
            MatchPair { left: "b".into(), right: "2".into() },
        ];
        let q = question(QuestionKind::MatchPairs { pairs: pairs.clone() }, 4.0, 0.0);

        let right = AnswerValue::MatchPairs { pairs: pairs.iter().rev().cloned().collect() };
        assert_eq!(right.grade(&q.kind), Some(true));

        let partial = AnswerValue::MatchPairs { pairs: vec![pairs[0].clone()] };
        assert_eq!(partial.grade(&q.kind), Some(false));
    }

    #[test]
    fn descriptive_answers_wait_for_review() {
        let q = question(QuestionKind::Descriptive { model_answer: None }, 10.0, 0.0);
        let mut answer = Answer::graded(
            "attempt",
            &q,
            AnswerValue::Descriptive { text: "An essay".into() },
        );
        assert!(answer.is_pending());
        assert!(answer.marks.is_none());
        assert!(answer.is_correct.is_none());

        let err = answer.review(&q, 11.0, None, "reviewer").unwrap_err();
        assert_eq!(err, AppError::MarksExceedQuestion { awarded: 11.0, max: 10.0 });
        assert!(answer.is_pending());

        answer.review(&q, 7.0, Some("good".into()), "reviewer").unwrap();
        assert_eq!(answer.marks, Some(7.0));
        assert_eq!(answer.reviewed_by.as_deref(), Some("reviewer"));
        assert!(!answer.is_pending());
    }
}
