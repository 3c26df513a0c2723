use crate::flash;
use crate::middleware::csrf::validate_form_token;
use crate::middleware::ClientCtx;
use crate::orm::users::Role;
use crate::permission::{self, Capabilities, RolePermissions, CAPABILITY_FIELDS};
use crate::web::redirect;
use actix_web::{error, get, post, web, Error, HttpResponse};
use askama_actix::{Template, TemplateToResponse};
use sea_orm::DatabaseConnection;
use std::collections::HashMap;
use std::str::FromStr;

pub(super) fn configure(conf: &mut web::ServiceConfig) {
    conf.service(view_permissions).service(post_permissions);
}

pub struct CapabilityBox {
    pub field: &'static str,
    pub label: &'static str,
    pub checked: bool,
}

pub struct RoleRow {
    pub role: Role,
    pub boxes: Vec<CapabilityBox>,
}

impl RoleRow {
    fn new(role: Role, caps: Capabilities) -> Self {
        Self {
            role,
            boxes: CAPABILITY_FIELDS
                .iter()
                .map(|(flag, field, label)| CapabilityBox {
                    field: *field,
                    label: *label,
                    checked: caps.contains(*flag),
                })
                .collect(),
        }
    }
}

#[derive(Template)]
#[template(path = "admin/permissions.html")]
pub struct PermissionsTemplate {
    pub client: ClientCtx,
    pub rows: Vec<RoleRow>,
}

/// Not capability gated; an admin must always be able to restore access.
#[get("/permissions/")]
pub async fn view_permissions(
    client: ClientCtx,
    perms: web::Data<RolePermissions>,
) -> Result<HttpResponse, Error> {
    let rows = Role::ALL
        .iter()
        .map(|role| RoleRow::new(*role, perms.get(*role)))
        .collect();
    Ok(PermissionsTemplate { client, rows }.to_response())
}

#[post("/permissions/{role}/")]
pub async fn post_permissions(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    perms: web::Data<RolePermissions>,
    path: web::Path<String>,
    form: web::Form<HashMap<String, String>>,
) -> Result<HttpResponse, Error> {
    validate_form_token(&cookies, &form)?;
    let role = Role::from_str(&path.into_inner()).map_err(error::ErrorNotFound)?;

    let caps = Capabilities::from_field_names(form.keys().map(String::as_str));
    permission::update_role(&db, &perms, role, caps).await?;
    log::info!(
        "User {} updated permissions of role '{}'",
        client.get_id().unwrap_or_default(),
        role.as_str()
    );

    flash::success(&cookies, format!("Permissions for {} updated.", role.label()));
    Ok(redirect("/admin/permissions/"))
}
