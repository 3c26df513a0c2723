use super::redirect;
use crate::middleware::ClientCtx;
use actix_web::{get, HttpResponse};
use askama_actix::{Template, TemplateToResponse};

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_index);
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub client: ClientCtx,
    pub description: String,
}

#[get("/")]
pub async fn view_index(client: ClientCtx) -> HttpResponse {
    if client.is_user() {
        return redirect("/dashboard/");
    }
    IndexTemplate {
        client,
        description: crate::app_config::site().description,
    }
    .to_response()
}
