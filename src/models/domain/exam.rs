use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

pub const UNLIMITED_ATTEMPTS: i32 = -1;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ExamLogEntry {
    pub action: String,
    pub by: String,
    pub at: DateTime<Utc>,
    pub details: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishAction {
    Publish,
    Unpublish,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PublishEvent {
    pub action: PublishAction,
    pub by: String,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Exam {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub duration_minutes: i32,
    pub total_marks: f64,
    pub passing_marks: f64,
    pub question_count: i32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub unpublished_at: Option<DateTime<Utc>>,
    pub shuffle_questions: bool,
    pub show_result: bool,
    pub price: f64,
    pub attempts: i32,
    pub created_by: String,
    #[serde(default)]
    pub update_log: Vec<ExamLogEntry>,
    #[serde(default)]
    pub publish_history: Vec<PublishEvent>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

/// Authoring fields shared by create and update.
#[derive(Clone, Debug, PartialEq)]
pub struct ExamSettings {
    pub title: String,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub duration_minutes: i32,
    pub passing_marks: f64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub shuffle_questions: bool,
    pub show_result: bool,
    pub price: f64,
    pub attempts: i32,
}

impl ExamSettings {
    pub fn validate(&self) -> AppResult<()> {
        if self.title.trim().is_empty() {
            return Err(AppError::ValidationError("Exam title is required".into()));
        }
        if self.duration_minutes < 1 {
            return Err(AppError::ValidationError(
                "Duration must be at least 1 minute".into(),
            ));
        }
        if self.passing_marks < 0.0 {
            return Err(AppError::ValidationError(
                "Passing marks cannot be negative".into(),
            ));
        }
        if self.price < 0.0 {
            return Err(AppError::ValidationError("Price cannot be negative".into()));
        }
        if self.attempts != UNLIMITED_ATTEMPTS && self.attempts <= 0 {
            return Err(AppError::ValidationError(
                "Attempts must be -1 (unlimited) or greater than 0".into(),
            ));
        }
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if end <= start {
                return Err(AppError::ValidationError(
                    "End time must be after start time".into(),
                ));
            }
        }
        Ok(())
    }
}

impl Exam {
    pub fn new_draft(settings: ExamSettings, created_by: &str) -> Self {
        Exam {
            id: Uuid::new_v4().to_string(),
            title: settings.title.trim().to_string(),
            description: settings.description,
            instructions: settings.instructions,
            duration_minutes: settings.duration_minutes,
            total_marks: 0.0,
            passing_marks: settings.passing_marks,
            question_count: 0,
            start_time: settings.start_time,
            end_time: settings.end_time,
            is_published: false,
            published_at: None,
            unpublished_at: None,
            shuffle_questions: settings.shuffle_questions,
            show_result: settings.show_result,
            price: settings.price,
            attempts: settings.attempts,
            created_by: created_by.to_string(),
            update_log: Vec::new(),
            publish_history: Vec::new(),
            deleted_at: None,
            deleted_by: None,
            created_at: Some(Utc::now()),
            modified_at: Some(Utc::now()),
        }
    }

    pub fn apply_settings(&mut self, settings: ExamSettings) {
        self.title = settings.title.trim().to_string();
        self.description = settings.description;
        self.instructions = settings.instructions;
        self.duration_minutes = settings.duration_minutes;
        self.passing_marks = settings.passing_marks;
        self.start_time = settings.start_time;
        self.end_time = settings.end_time;
        self.shuffle_questions = settings.shuffle_questions;
        self.show_result = settings.show_result;
        self.price = settings.price;
        self.attempts = settings.attempts;
        self.touch();
    }

    pub fn settings(&self) -> ExamSettings {
        ExamSettings {
            title: self.title.clone(),
            description: self.description.clone(),
            instructions: self.instructions.clone(),
            duration_minutes: self.duration_minutes,
            passing_marks: self.passing_marks,
            start_time: self.start_time,
            end_time: self.end_time,
            shuffle_questions: self.shuffle_questions,
            show_result: self.show_result,
            price: self.price,
            attempts: self.attempts,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.attempts == UNLIMITED_ATTEMPTS
    }

    /// Whether a user holding `used` non-dropped attempts may start another one.
    pub fn allows_another_attempt(&self, used: u64) -> bool {
        self.is_unlimited() || used < self.attempts as u64
    }

    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        let started = self.start_time.map_or(true, |start| now >= start);
        let not_ended = self.end_time.map_or(true, |end| now <= end);
        started && not_ended
    }

    /// Checks the conditions a publish must satisfy.
    pub fn check_publishable(&self) -> AppResult<()> {
        if self.question_count < 1 {
            return Err(AppError::ValidationError(
                "Exam must have at least one question before publishing".into(),
            ));
        }
        if self.total_marks <= 0.0 {
            return Err(AppError::ValidationError(
                "Exam total marks must be greater than zero before publishing".into(),
            ));
        }
        if self.passing_marks > self.total_marks {
            return Err(AppError::ValidationError(format!(
                "Passing marks ({}) cannot be greater than total marks ({})",
                self.passing_marks, self.total_marks
            )));
        }
        Ok(())
    }

    pub fn log(&mut self, action: &str, by: &str, details: String) {
        self.update_log.push(ExamLogEntry {
            action: action.to_string(),
            by: by.to_string(),
            at: Utc::now(),
            details,
        });
        self.touch();
    }

    pub fn touch(&mut self) {
        self.modified_at = Some(Utc::now());
    }
}

#[cfg(test)]
pub fn test_settings(title: &str) -> ExamSettings {
    ExamSettings {
        title: title.to_string(),
        description: None,
        instructions: None,
        duration_minutes: 60,
        passing_marks: 40.0,
        start_time: None,
        end_time: None,
        shuffle_questions: false,
        show_result: true,
        price: 0.0,
        attempts: 1,
    }
}
