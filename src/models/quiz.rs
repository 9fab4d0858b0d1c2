// src/models/quiz.rs

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Single,
    Multiple,
}

/// One selectable answer of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub value: String,
    pub text: String,
    pub correct: bool,
}

/// A question as extracted from the part's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub name: String,
    pub question_type: QuestionType,
    pub text: String,
    pub answers: Vec<AnswerOption>,
}

impl QuizQuestion {
    /// The selection is correct when it names exactly the correct answers.
    pub fn is_correct(&self, selected: &[String]) -> bool {
        let expected: BTreeSet<&str> = self
            .answers
            .iter()
            .filter(|a| a.correct)
            .map(|a| a.value.as_str())
            .collect();
        let given: BTreeSet<&str> = selected.iter().map(String::as_str).collect();
        !expected.is_empty() && expected == given
    }
}

/// Represents the 'quizzes' table. Rebuilt whenever the part content is saved.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Quiz {
    pub id: i64,
    pub part_id: i64,
    pub name: String,
    pub title: Option<String>,
    pub questions: Json<Vec<QuizQuestion>>,
}

impl Quiz {
    pub fn question(&self, name: &str) -> Option<&QuizQuestion> {
        self.questions.0.iter().find(|q| q.name == name)
    }
}

/// Represents the 'quiz_answers' table.
/// At most one row per (user, quiz, question).
#[derive(Debug, Clone, FromRow)]
pub struct QuizAnswer {
    pub id: i64,
    pub user_id: i64,
    pub quiz_id: i64,
    pub question: String,
    pub initial_answer: Json<Vec<String>>,
    pub initial_correct: bool,
    pub final_answer: Option<Json<Vec<String>>>,
    pub final_correct: Option<bool>,
    pub attempts: i64,
}

impl QuizAnswer {
    /// Once answered correctly, further submissions are ignored.
    pub fn is_settled(&self) -> bool {
        self.initial_correct || self.final_correct == Some(true)
    }

    pub fn status(&self) -> AnswerStatus {
        if self.initial_correct {
            return AnswerStatus::answered(true, self.initial_answer.0.clone());
        }
        match (&self.final_answer, self.final_correct) {
            (Some(answer), Some(correct)) => AnswerStatus::answered(correct, answer.0.clone()),
            _ => AnswerStatus::answered(false, self.initial_answer.0.clone()),
        }
    }
}

/// DTO for submitting an answer to one question.
#[derive(Debug, Deserialize, Validate)]
pub struct SetAnswerRequest {
    #[validate(length(min = 1, max = 255))]
    pub quiz: String,
    #[validate(length(min = 1, max = 255))]
    pub question: String,
    #[serde(default)]
    pub answer: Vec<String>,
}

/// Query parameters for checking an answer.
#[derive(Debug, Deserialize)]
pub struct CheckAnswerParams {
    pub quiz: String,
    pub question: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnswerState {
    Correct,
    Incorrect,
    Unanswered,
}

/// DTO describing the learner's last answer to a question.
#[derive(Debug, Serialize)]
pub struct AnswerStatus {
    pub status: AnswerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<Vec<String>>,
}

impl AnswerStatus {
    pub fn unanswered() -> Self {
        Self {
            status: AnswerState::Unanswered,
            answer: None,
        }
    }

    fn answered(correct: bool, answer: Vec<String>) -> Self {
        Self {
            status: if correct {
                AnswerState::Correct
            } else {
                AnswerState::Incorrect
            },
            answer: Some(answer),
        }
    }
}
