//! HTML error pages installed through `ErrorHandlers`.

use crate::middleware::ClientCtx;
use crate::permission::RolePermissions;
use actix_web::dev::ServiceResponse;
use actix_web::http::header;
use actix_web::middleware::ErrorHandlerResponse;
use actix_web::web::Data;
use actix_web::{HttpMessage, HttpResponse, Result};
use askama_actix::Template;

#[derive(Template)]
#[template(path = "error.html")]
struct ErrorTemplate<'a> {
    client: ClientCtx,
    status: u16,
    title: &'a str,
    message: &'a str,
}

pub fn render_400<B>(res: ServiceResponse<B>) -> Result<ErrorHandlerResponse<B>> {
    render_error(
        res,
        "Bad request",
        "The request could not be understood. Please check the form and try again.",
    )
}

pub fn render_403<B>(res: ServiceResponse<B>) -> Result<ErrorHandlerResponse<B>> {
    render_error(res, "Access denied", "You do not have access to this page.")
}

pub fn render_404<B>(res: ServiceResponse<B>) -> Result<ErrorHandlerResponse<B>> {
    render_error(res, "Not found", "The page you are looking for does not exist.")
}

pub fn render_500<B>(res: ServiceResponse<B>) -> Result<ErrorHandlerResponse<B>> {
    render_error(
        res,
        "Server error",
        "Something went wrong on our side. Please try again later.",
    )
}

fn render_error<B>(
    res: ServiceResponse<B>,
    title: &str,
    message: &str,
) -> Result<ErrorHandlerResponse<B>> {
    let (req, res) = res.into_parts();
    let status = res.status();

    let client = match req.app_data::<Data<RolePermissions>>() {
        Some(perms) => ClientCtx::get_or_default_from_extensions(&mut req.extensions_mut(), perms.clone()),
        None => ClientCtx::default(),
    };

    let body = ErrorTemplate {
        client,
        status: status.as_u16(),
        title,
        message,
    }
    .render()
    .unwrap_or_else(|e| {
        log::error!("render_error: {}", e);
        message.to_owned()
    });

    let page = HttpResponse::build(status)
        .insert_header((header::CONTENT_TYPE, "text/html; charset=utf-8"))
        .body(body);

    Ok(ErrorHandlerResponse::Response(
        ServiceResponse::new(req, page).map_into_right_body(),
    ))
}
