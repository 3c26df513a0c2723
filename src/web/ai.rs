//! Stored AI summaries and questions of a lecture file.

use super::files::visible_file;
use super::{db_err, redirect};
use crate::access::can_manage_course;
use crate::ai_content::{self, NewQuestion};
use crate::error::AcademyError;
use crate::flash;
use crate::middleware::csrf::validate_csrf_token;
use crate::middleware::ClientCtx;
use crate::orm::{ai_questions, ai_summaries, courses, lecture_files};
use crate::permission::Capabilities;
use actix_web::{error, get, post, web, Error, HttpResponse};
use askama_actix::{Template, TemplateToResponse};
use sea_orm::DatabaseConnection;
use serde::Deserialize;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_ai)
        .service(post_summary)
        .service(post_question);
}

#[derive(Template)]
#[template(path = "ai.html")]
pub struct AiTemplate {
    pub client: ClientCtx,
    pub file: lecture_files::Model,
    pub course: courses::Model,
    pub cached: Option<ai_summaries::Model>,
    pub summaries: Vec<ai_summaries::Model>,
    pub questions: Vec<ai_questions::Model>,
    pub can_store: bool,
}

#[derive(Deserialize)]
pub struct SummaryForm {
    summary_text: String,
    csrf_token: String,
}

#[derive(Deserialize)]
pub struct QuestionForm {
    question_text: String,
    /// One option per line.
    options: String,
    correct_answer: String,
    #[serde(default)]
    explanation: Option<String>,
    csrf_token: String,
}

/// One option per non-blank line, trimmed, in order.
pub fn split_options(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect()
}

async fn storable_file(
    client: &ClientCtx,
    db: &DatabaseConnection,
    id: i32,
) -> Result<lecture_files::Model, Error> {
    client.require_capability(Capabilities::USE_AI)?;
    let (file, course) = visible_file(client, db, id).await?;
    let user = client.require_login()?;
    if !can_manage_course(user, &course) {
        return Err(error::ErrorForbidden("Only the course teacher can store AI content."));
    }
    Ok(file)
}

#[get("/{id}/ai/")]
pub async fn view_ai(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, Error> {
    client.require_capability(Capabilities::USE_AI)?;
    let (file, course) = visible_file(&client, &db, path.into_inner()).await?;
    let can_store = client
        .get_user()
        .map_or(false, |u| can_manage_course(u, &course));

    let cached = ai_content::cached_summary(&db, file.id).await.map_err(db_err)?;
    let summaries = ai_content::summaries_for(&db, file.id).await.map_err(db_err)?;
    let questions = ai_content::questions_for(&db, file.id).await.map_err(db_err)?;

    Ok(AiTemplate {
        client,
        file,
        course,
        cached,
        summaries,
        questions,
        can_store,
    }
    .to_response())
}

#[post("/{id}/ai/summary/")]
pub async fn post_summary(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    form: web::Form<SummaryForm>,
) -> Result<HttpResponse, Error> {
    validate_csrf_token(&cookies, &form.csrf_token)?;
    let file = storable_file(&client, &db, path.into_inner()).await?;

    match ai_content::store_summary(&db, file.id, &form.summary_text, client.get_id()).await {
        Ok(_) => flash::success(&cookies, "Summary saved."),
        Err(AcademyError::Invalid(msg)) => flash::error(&cookies, msg),
        Err(e) => return Err(e.into()),
    }
    Ok(redirect(&format!("/files/{}/ai/", file.id)))
}

#[post("/{id}/ai/question/")]
pub async fn post_question(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    form: web::Form<QuestionForm>,
) -> Result<HttpResponse, Error> {
    validate_csrf_token(&cookies, &form.csrf_token)?;
    let file = storable_file(&client, &db, path.into_inner()).await?;
    let form = form.into_inner();

    let question = NewQuestion {
        question_text: form.question_text,
        options: split_options(&form.options),
        correct_answer: form.correct_answer.trim().to_owned(),
        explanation: crate::forms::non_empty(&form.explanation),
    };
    match ai_content::store_question(&db, file.id, question, client.get_id()).await {
        Ok(_) => flash::success(&cookies, "Question saved."),
        Err(AcademyError::Invalid(msg)) => flash::error(&cookies, msg),
        Err(e) => return Err(e.into()),
    }
    Ok(redirect(&format!("/files/{}/ai/", file.id)))
}
