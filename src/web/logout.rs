use super::redirect;
use crate::flash;
use crate::middleware::ClientCtx;
use crate::session::end_session;
use actix_web::{get, HttpResponse};

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_logout);
}

#[get("/logout/")]
pub async fn view_logout(client: ClientCtx, cookies: actix_session::Session) -> HttpResponse {
    if let Some(id) = client.get_id() {
        log::info!("User {} logged out", id);
    }
    end_session(&cookies);
    flash::info(&cookies, "You have been logged out.");
    redirect("/login/")
}
