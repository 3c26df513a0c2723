//! Stored AI summaries and practice questions for lecture files.
//!
//! Generation happens elsewhere; this module only keeps the results.

use crate::error::AcademyError;
use crate::orm::{ai_questions, ai_summaries, lecture_files};
use sea_orm::{entity::*, query::*, DatabaseConnection, DbErr};

pub struct NewQuestion {
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub explanation: Option<String>,
}

async fn ensure_file(db: &DatabaseConnection, file_id: i32) -> Result<(), AcademyError> {
    lecture_files::Entity::find_by_id(file_id)
        .one(db)
        .await?
        .ok_or(AcademyError::NotFound("File"))?;
    Ok(())
}

pub async fn summaries_for(
    db: &DatabaseConnection,
    file_id: i32,
) -> Result<Vec<ai_summaries::Model>, DbErr> {
    ai_summaries::Entity::find()
        .filter(ai_summaries::Column::LectureFileId.eq(file_id))
        .order_by_desc(ai_summaries::Column::GeneratedAt)
        .order_by_desc(ai_summaries::Column::Id)
        .all(db)
        .await
}

/// Newest summary still flagged as cached.
pub async fn cached_summary(
    db: &DatabaseConnection,
    file_id: i32,
) -> Result<Option<ai_summaries::Model>, DbErr> {
    ai_summaries::Entity::find()
        .filter(ai_summaries::Column::LectureFileId.eq(file_id))
        .filter(ai_summaries::Column::IsCached.eq(true))
        .order_by_desc(ai_summaries::Column::GeneratedAt)
        .order_by_desc(ai_summaries::Column::Id)
        .one(db)
        .await
}

pub async fn store_summary(
    db: &DatabaseConnection,
    file_id: i32,
    summary_text: &str,
    generated_by: Option<i32>,
) -> Result<ai_summaries::Model, AcademyError> {
    let text = summary_text.trim();
    if text.is_empty() {
        return Err(AcademyError::invalid("The summary is empty."));
    }
    ensure_file(db, file_id).await?;

    Ok(ai_summaries::ActiveModel {
        lecture_file_id: Set(file_id),
        summary_text: Set(text.to_owned()),
        generated_by_id: Set(generated_by),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

pub async fn questions_for(
    db: &DatabaseConnection,
    file_id: i32,
) -> Result<Vec<ai_questions::Model>, DbErr> {
    ai_questions::Entity::find()
        .filter(ai_questions::Column::LectureFileId.eq(file_id))
        .order_by_desc(ai_questions::Column::GeneratedAt)
        .order_by_desc(ai_questions::Column::Id)
        .all(db)
        .await
}

/// Checks the choices before anything touches the database.
pub fn validate_question(q: &NewQuestion) -> Result<(), AcademyError> {
    if q.question_text.trim().is_empty() {
        return Err(AcademyError::invalid("The question text is empty."));
    }
    if q.options.iter().filter(|o| !o.trim().is_empty()).count() < 2 {
        return Err(AcademyError::invalid("A question needs at least two options."));
    }
    if !q.options.iter().any(|o| o == &q.correct_answer) {
        return Err(AcademyError::invalid("The correct answer must be one of the options."));
    }
    Ok(())
}

pub async fn store_question(
    db: &DatabaseConnection,
    file_id: i32,
    question: NewQuestion,
    generated_by: Option<i32>,
) -> Result<ai_questions::Model, AcademyError> {
    validate_question(&question)?;
    ensure_file(db, file_id).await?;

    Ok(ai_questions::ActiveModel {
        lecture_file_id: Set(file_id),
        question_text: Set(question.question_text.trim().to_owned()),
        options: Set(ai_questions::Model::encode_options(&question.options)),
        correct_answer: Set(question.correct_answer),
        explanation: Set(question.explanation),
        generated_by_id: Set(generated_by),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(options: &[&str], answer: &str) -> NewQuestion {
        NewQuestion {
            question_text: "Which layer routes packets?".to_owned(),
            options: options.iter().map(|s| s.to_string()).collect(),
            correct_answer: answer.to_owned(),
            explanation: None,
        }
    }

    #[test]
    fn test_question_needs_two_options() {
        assert!(validate_question(&question(&["Network"], "Network")).is_err());
        assert!(validate_question(&question(&["Network", "Link"], "Network")).is_ok());
    }

    #[test]
    fn test_answer_must_be_an_option() {
        assert!(validate_question(&question(&["Network", "Link"], "Transport")).is_err());
    }
}
