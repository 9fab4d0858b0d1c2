// src/quiz.rs

//! Quizzes embedded in part content, and learners' answers to them.
//!
//! A quiz is declared in the (sanitized) content HTML:
//!
//! ```html
//! <div class="quiz" data-quiz-name="q1" data-quiz-title="Check">
//!   <div class="quiz-question" data-question-name="a" data-question-type="single">
//!     <p class="quiz-question-text">Which?</p>
//!     <ul><li data-answer="x" data-correct="true">X</li><li data-answer="y">Y</li></ul>
//!   </div>
//! </div>
//! ```
//!
//! Quizzes are re-extracted every time the content is saved.

use scraper::{ElementRef, Html, Selector};
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::models::quiz::{
    AnswerOption, AnswerStatus, QuestionType, Quiz, QuizAnswer, QuizQuestion,
};

const ANSWER_COLUMNS: &str = "id, user_id, quiz_id, question, initial_answer, initial_correct, \
                              final_answer, final_correct, attempts";

/// A quiz as found in content, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedQuiz {
    pub name: String,
    pub title: Option<String>,
    pub questions: Vec<QuizQuestion>,
}

/// Finds all quizzes in `html`. Later quizzes reusing a name are ignored.
pub fn extract_quizzes(html: &str) -> Vec<ExtractedQuiz> {
    let (Ok(quiz_sel), Ok(question_sel), Ok(text_sel), Ok(answer_sel)) = (
        Selector::parse("div.quiz[data-quiz-name]"),
        Selector::parse(".quiz-question[data-question-name]"),
        Selector::parse(".quiz-question-text"),
        Selector::parse("li[data-answer]"),
    ) else {
        return Vec::new();
    };

    let document = Html::parse_fragment(html);
    let mut quizzes: Vec<ExtractedQuiz> = Vec::new();

    for quiz in document.select(&quiz_sel) {
        let Some(name) = quiz.value().attr("data-quiz-name").map(str::trim) else {
            continue;
        };
        if name.is_empty() || quizzes.iter().any(|q| q.name == name) {
            continue;
        }

        let questions = quiz
            .select(&question_sel)
            .filter_map(|question| extract_question(question, &text_sel, &answer_sel))
            .collect();

        quizzes.push(ExtractedQuiz {
            name: name.to_string(),
            title: quiz
                .value()
                .attr("data-quiz-title")
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            questions,
        });
    }

    quizzes
}

fn extract_question(
    question: ElementRef<'_>,
    text_sel: &Selector,
    answer_sel: &Selector,
) -> Option<QuizQuestion> {
    let name = question.value().attr("data-question-name")?.trim();
    if name.is_empty() {
        return None;
    }
    let question_type = match question.value().attr("data-question-type") {
        Some("multiple") => QuestionType::Multiple,
        _ => QuestionType::Single,
    };
    let text = question
        .select(text_sel)
        .next()
        .map(|t| normalise_text(t.text()))
        .unwrap_or_default();
    let answers = question
        .select(answer_sel)
        .filter_map(|answer| {
            let value = answer.value().attr("data-answer")?;
            Some(AnswerOption {
                value: value.to_string(),
                text: normalise_text(answer.text()),
                correct: answer.value().attr("data-correct") == Some("true"),
            })
        })
        .collect();

    Some(QuizQuestion {
        name: name.to_string(),
        question_type,
        text,
        answers,
    })
}

fn normalise_text<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stores the extracted quizzes for a part and drops the ones that vanished
/// from its content (their answers go with them).
pub async fn sync_quizzes(
    conn: &mut SqliteConnection,
    part_id: i64,
    quizzes: &[ExtractedQuiz],
) -> Result<(), sqlx::Error> {
    for quiz in quizzes {
        sqlx::query(
            "INSERT INTO quizzes (part_id, name, title, questions) VALUES (?, ?, ?, ?) \
             ON CONFLICT (part_id, name) DO UPDATE SET \
                 title = excluded.title, questions = excluded.questions",
        )
        .bind(part_id)
        .bind(&quiz.name)
        .bind(&quiz.title)
        .bind(Json(&quiz.questions))
        .execute(&mut *conn)
        .await?;
    }

    let mut query_builder = QueryBuilder::<Sqlite>::new("DELETE FROM quizzes WHERE part_id = ");
    query_builder.push_bind(part_id);
    if !quizzes.is_empty() {
        query_builder.push(" AND name NOT IN (");
        let mut separated = query_builder.separated(",");
        for quiz in quizzes {
            separated.push_bind(&quiz.name);
        }
        separated.push_unseparated(")");
    }
    query_builder.build().execute(&mut *conn).await?;

    Ok(())
}

pub async fn find_quiz(
    pool: &SqlitePool,
    part_id: i64,
    name: &str,
) -> Result<Option<Quiz>, sqlx::Error> {
    sqlx::query_as::<_, Quiz>(
        "SELECT id, part_id, name, title, questions FROM quizzes WHERE part_id = ? AND name = ?",
    )
    .bind(part_id)
    .bind(name)
    .fetch_optional(pool)
    .await
}

/// Records an answer.
///
/// The first submission becomes the initial answer. Later submissions
/// replace the final answer and count an attempt, until either answer was
/// correct; after that the record no longer changes.
pub async fn set_answer(
    pool: &SqlitePool,
    user_id: i64,
    quiz: &Quiz,
    question: &QuizQuestion,
    answer: &[String],
) -> Result<AnswerStatus, sqlx::Error> {
    let correct = question.is_correct(answer);

    let query = format!(
        "INSERT INTO quiz_answers (user_id, quiz_id, question, initial_answer, initial_correct, attempts) \
         VALUES (?, ?, ?, ?, ?, 1) \
         ON CONFLICT (user_id, quiz_id, question) DO UPDATE SET \
             attempts = quiz_answers.attempts + 1, \
             final_answer = excluded.initial_answer, \
             final_correct = excluded.initial_correct \
         WHERE NOT quiz_answers.initial_correct AND COALESCE(quiz_answers.final_correct, 0) = 0 \
         RETURNING {ANSWER_COLUMNS}"
    );
    let written = sqlx::query_as::<_, QuizAnswer>(&query)
        .bind(user_id)
        .bind(quiz.id)
        .bind(&question.name)
        .bind(Json(answer))
        .bind(correct)
        .fetch_optional(pool)
        .await?;

    let record = match written {
        Some(record) => record,
        // Already settled: the upsert's WHERE skipped the update.
        None => match find_answer(pool, user_id, quiz.id, &question.name).await? {
            Some(record) => record,
            None => return Ok(AnswerStatus::unanswered()),
        },
    };

    Ok(record.status())
}

/// The learner's last answer, or `unanswered`.
pub async fn check_answer(
    pool: &SqlitePool,
    user_id: i64,
    quiz_id: i64,
    question: &str,
) -> Result<AnswerStatus, sqlx::Error> {
    Ok(find_answer(pool, user_id, quiz_id, question)
        .await?
        .map(|answer| answer.status())
        .unwrap_or_else(AnswerStatus::unanswered))
}

pub async fn find_answer(
    pool: &SqlitePool,
    user_id: i64,
    quiz_id: i64,
    question: &str,
) -> Result<Option<QuizAnswer>, sqlx::Error> {
    let query = format!(
        "SELECT {ANSWER_COLUMNS} FROM quiz_answers WHERE user_id = ? AND quiz_id = ? AND question = ?"
    );
    sqlx::query_as::<_, QuizAnswer>(&query)
        .bind(user_id)
        .bind(quiz_id)
        .bind(question)
        .fetch_optional(pool)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT: &str = r#"
        <h1>Intro</h1>
        <div class="quiz" data-quiz-name="basics" data-quiz-title="The Basics">
          <div class="quiz-question" data-question-name="q1" data-question-type="single">
            <p class="quiz-question-text">What is  <b>2 + 2</b>?</p>
            <ul>
              <li data-answer="3">Three</li>
              <li data-answer="4" data-correct="true">Four</li>
            </ul>
          </div>
          <div class="quiz-question" data-question-name="q2" data-question-type="multiple">
            <p class="quiz-question-text">Even numbers?</p>
            <ul>
              <li data-answer="2" data-correct="true">2</li>
              <li data-answer="3">3</li>
              <li data-answer="6" data-correct="true">6</li>
            </ul>
          </div>
        </div>
        <div class="quiz" data-quiz-name="basics"><div class="quiz-question" data-question-name="dup"></div></div>
        <div class="quiz" data-quiz-name="second"></div>
    "#;

    #[test]
    fn extracts_quizzes_and_questions() {
        let quizzes = extract_quizzes(CONTENT);
        assert_eq!(quizzes.len(), 2);

        let basics = &quizzes[0];
        assert_eq!(basics.name, "basics");
        assert_eq!(basics.title.as_deref(), Some("The Basics"));
        assert_eq!(basics.questions.len(), 2);

        let q1 = &basics.questions[0];
        assert_eq!(q1.name, "q1");
        assert_eq!(q1.question_type, QuestionType::Single);
        assert_eq!(q1.text, "What is 2 + 2?");
        assert_eq!(q1.answers.len(), 2);
        assert!(q1.is_correct(&["4".to_string()]));

        let q2 = &basics.questions[1];
        assert_eq!(q2.question_type, QuestionType::Multiple);
        assert!(q2.is_correct(&["6".to_string(), "2".to_string()]));

        assert_eq!(quizzes[1].name, "second");
        assert!(quizzes[1].title.is_none());
        assert!(quizzes[1].questions.is_empty());
    }

    #[test]
    fn content_without_quizzes() {
        assert!(extract_quizzes("<p>Nothing here</p>").is_empty());
        assert!(extract_quizzes("").is_empty());
    }
}
