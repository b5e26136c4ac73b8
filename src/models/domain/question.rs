use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct QuestionOption {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct MatchPair {
    pub left: String,
    pub right: String,
}

/// Question body; the correct answer shape is fixed by the variant.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice {
        options: Vec<QuestionOption>,
        correct_answer: Vec<u32>,
    },
    TrueFalse {
        correct_answer: bool,
    },
    MatchPairs {
        pairs: Vec<MatchPair>,
    },
    Descriptive {
        model_answer: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    MatchPairs,
    Descriptive,
}

impl QuestionKind {
    pub fn question_type(&self) -> QuestionType {
        match self {
            QuestionKind::MultipleChoice { .. } => QuestionType::MultipleChoice,
            QuestionKind::TrueFalse { .. } => QuestionType::TrueFalse,
            QuestionKind::MatchPairs { .. } => QuestionType::MatchPairs,
            QuestionKind::Descriptive { .. } => QuestionType::Descriptive,
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        match self {
            QuestionKind::MultipleChoice {
                options,
                correct_answer,
            } => {
                if options.len() < 2 {
                    return Err(AppError::ValidationError(
                        "Multiple-choice questions must have at least 2 options".into(),
                    ));
                }
                if options.iter().any(|o| o.text.trim().is_empty()) {
                    return Err(AppError::ValidationError(
                        "Option text cannot be empty".into(),
                    ));
                }
                if correct_answer.is_empty() {
                    return Err(AppError::ValidationError(
                        "Multiple-choice questions need at least one correct option".into(),
                    ));
                }
                if correct_answer.iter().any(|&i| i as usize >= options.len()) {
                    return Err(AppError::ValidationError(
                        "Correct answer refers to a missing option".into(),
                    ));
                }
            }
            QuestionKind::MatchPairs { pairs } => {
                if pairs.is_empty() {
                    return Err(AppError::ValidationError(
                        "Match questions must have at least 1 pair".into(),
                    ));
                }
                if pairs
                    .iter()
                    .any(|p| p.left.trim().is_empty() || p.right.trim().is_empty())
                {
                    return Err(AppError::ValidationError(
                        "Match pairs need both a left and a right side".into(),
                    ));
                }
            }
            QuestionKind::TrueFalse { .. } | QuestionKind::Descriptive { .. } => {}
        }
        Ok(())
    }

    /// The same question with every correct answer removed, for candidates.
    pub fn redacted(&self) -> RedactedKind {
        match self {
            QuestionKind::MultipleChoice { options, .. } => RedactedKind::MultipleChoice {
                options: options.clone(),
            },
            QuestionKind::TrueFalse { .. } => RedactedKind::TrueFalse,
            QuestionKind::MatchPairs { pairs } => {
                let mut right: Vec<String> = pairs.iter().map(|p| p.right.clone()).collect();
                right.sort();
                RedactedKind::MatchPairs {
                    left: pairs.iter().map(|p| p.left.clone()).collect(),
                    right,
                }
            }
            QuestionKind::Descriptive { .. } => RedactedKind::Descriptive,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RedactedKind {
    MultipleChoice { options: Vec<QuestionOption> },
    TrueFalse,
    MatchPairs { left: Vec<String>, right: Vec<String> },
    Descriptive,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Question {
    pub id: String,
    pub exam_id: String,
    pub text: String,
    pub kind: QuestionKind,
    pub marks: f64,
    pub negative_marks: f64,
    pub explanation: Option<String>,
    pub difficulty: Difficulty,
    pub image_url: Option<String>,
    pub order: i32,
    pub created_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

/// Authoring payload for a question, independent of its exam and position.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct QuestionDraft {
    pub text: String,
    pub kind: QuestionKind,
    pub marks: f64,
    #[serde(default)]
    pub negative_marks: f64,
    pub explanation: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
}

impl QuestionDraft {
    pub fn validate(&self) -> AppResult<()> {
        if self.text.trim().is_empty() {
            return Err(AppError::ValidationError("Question text is required".into()));
        }
        if !self.marks.is_finite() || self.marks < 0.0 {
            return Err(AppError::ValidationError("Marks cannot be negative".into()));
        }
        if !self.negative_marks.is_finite() || self.negative_marks < 0.0 {
            return Err(AppError::ValidationError(
                "Negative marks cannot be negative".into(),
            ));
        }
        self.kind.validate()
    }
}

impl Question {
    pub fn from_draft(draft: QuestionDraft, exam_id: &str, order: i32, created_by: &str) -> Self {
        Question {
            id: Uuid::new_v4().to_string(),
            exam_id: exam_id.to_string(),
            text: draft.text.trim().to_string(),
            kind: draft.kind,
            marks: draft.marks,
            negative_marks: draft.negative_marks,
            explanation: draft.explanation,
            difficulty: draft.difficulty,
            image_url: None,
            order,
            created_by: created_by.to_string(),
            created_at: Some(Utc::now()),
            modified_at: Some(Utc::now()),
        }
    }

    pub fn apply_draft(&mut self, draft: QuestionDraft) {
        self.text = draft.text.trim().to_string();
        self.kind = draft.kind;
        self.marks = draft.marks;
        self.negative_marks = draft.negative_marks;
        self.explanation = draft.explanation;
        self.difficulty = draft.difficulty;
        self.modified_at = Some(Utc::now());
    }

    /// Copy of this question attached to another exam.
    pub fn duplicate_into(&self, exam_id: &str, created_by: &str) -> Self {
        Question {
            id: Uuid::new_v4().to_string(),
            exam_id: exam_id.to_string(),
            created_by: created_by.to_string(),
            created_at: Some(Utc::now()),
            modified_at: Some(Utc::now()),
            ..self.clone()
        }
    }
}

#[cfg(test)]
pub fn mcq_draft(marks: f64) -> QuestionDraft {
    QuestionDraft {
        text: "Pick the primes".to_string(),
        kind: QuestionKind::MultipleChoice {
            options: vec![
                QuestionOption {
                    text: "2".into(),
                    image_url: None,
                },
                QuestionOption {
                    text: "4".into(),
                    image_url: None,
                },
                QuestionOption {
                    text: "5".into(),
                    image_url: None,
                },
            ],
            correct_answer: vec![0, 2],
        },
        marks,
        negative_marks: 0.0,
        explanation: None,
        difficulty: Difficulty::Medium,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_kind_serializes_with_type_tag() {
        let kind = QuestionKind::TrueFalse {
            correct_answer: true,
        };
        let json = serde_json::to_value(&kind).expect("kind should serialize");
        assert_eq!(json["type"], "true_false");
        assert_eq!(json["correct_answer"], true);
    }

    #[test]
    fn question_kind_rejects_unknown_type() {
        let parsed = serde_json::from_str::<QuestionKind>(r#"{"type":"essay"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn multiple_choice_needs_two_options_and_valid_indices() {
        let mut draft = mcq_draft(5.0);
        assert!(draft.validate().is_ok());

        if let QuestionKind::MultipleChoice { correct_answer, .. } = &mut draft.kind {
            correct_answer.push(7);
        }
        assert!(draft.validate().is_err());

        draft.kind = QuestionKind::MultipleChoice {
            options: vec![QuestionOption {
                text: "only".into(),
                image_url: None,
            }],
            correct_answer: vec![0],
        };
        assert!(draft.validate().is_err());
    }

    #[test]
    fn match_pairs_need_at_least_one_pair() {
        let kind = QuestionKind::MatchPairs { pairs: vec![] };
        assert!(kind.validate().is_err());
    }

    #[test]
    fn negative_marks_cannot_be_negative() {
        let mut draft = mcq_draft(5.0);
        draft.negative_marks = -1.0;
        assert!(draft.validate().is_err());
    }

    #[test]
    fn redacted_kind_hides_correct_answers() {
        let draft = mcq_draft(5.0);
        let json = serde_json::to_value(draft.kind.redacted()).unwrap();
        assert!(json.get("correct_answer").is_none());
        assert_eq!(json["options"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn duplicate_into_keeps_content_but_changes_identity() {
        let question = Question::from_draft(mcq_draft(5.0), "exam-1", 3, "author");
        let copy = question.duplicate_into("exam-2", "copier");
        assert_ne!(copy.id, question.id);
        assert_eq!(copy.exam_id, "exam-2");
        assert_eq!(copy.kind, question.kind);
        assert_eq!(copy.order, 3);
    }
}
