//! Own profile: view, edit (multipart, with image) and password change.

use super::{db_err, redirect};
use crate::accounts::{self, ProfileUpdate};
use crate::constants::{ALLOWED_PROFILE_IMAGE_EXTENSIONS, MIN_PASSWORD_LENGTH};
use crate::flash;
use crate::forms::{non_empty, read_multipart, FormErrors, PHONE_RE};
use crate::middleware::csrf::validate_csrf_token;
use crate::middleware::ClientCtx;
use crate::orm::{departments, specializations, users};
use crate::session;
use crate::storage::{extension_of, profile_key, StorageBackend};
use actix_multipart::Multipart;
use actix_web::{get, post, web, Error, HttpResponse};
use askama_actix::{Template, TemplateToResponse};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::Deserialize;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_profile)
        .service(view_edit_profile)
        .service(post_edit_profile)
        .service(view_change_password)
        .service(post_change_password);
}

#[derive(Template)]
#[template(path = "profile/view.html")]
pub struct ProfileTemplate {
    pub client: ClientCtx,
    pub user: users::Model,
    pub department: Option<String>,
    pub specialization: Option<String>,
}

#[derive(Default)]
pub struct ProfileValues {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Template)]
#[template(path = "profile/edit.html")]
pub struct EditProfileTemplate {
    pub client: ClientCtx,
    pub values: ProfileValues,
    pub profile_image: Option<String>,
    pub errors: FormErrors,
}

#[derive(Template)]
#[template(path = "profile/change_password.html")]
pub struct ChangePasswordTemplate {
    pub client: ClientCtx,
    pub errors: FormErrors,
}

#[derive(Deserialize)]
pub struct ChangePasswordForm {
    old_password: String,
    new_password1: String,
    new_password2: String,
    csrf_token: String,
}

#[get("/")]
pub async fn view_profile(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, Error> {
    let user = client.require_login()?.clone();

    let department = match user.department_id {
        Some(id) => departments::Entity::find_by_id(id)
            .one(db.get_ref())
            .await
            .map_err(db_err)?
            .map(|d| d.name),
        None => None,
    };
    let specialization = match user.specialization_id {
        Some(id) => specializations::Entity::find_by_id(id)
            .one(db.get_ref())
            .await
            .map_err(db_err)?
            .map(|s| s.name),
        None => None,
    };

    Ok(ProfileTemplate {
        client,
        user,
        department,
        specialization,
    }
    .to_response())
}

#[get("/edit/")]
pub async fn view_edit_profile(client: ClientCtx) -> Result<HttpResponse, Error> {
    let user = client.require_login()?;
    let values = ProfileValues {
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        email: user.email.clone(),
        phone: user.phone.clone().unwrap_or_default(),
    };
    let profile_image = user.profile_image.clone();

    Ok(EditProfileTemplate {
        client,
        values,
        profile_image,
        errors: FormErrors::new(),
    }
    .to_response())
}

#[post("/edit/")]
pub async fn post_edit_profile(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    storage: web::Data<dyn StorageBackend>,
    payload: Multipart,
) -> Result<HttpResponse, Error> {
    let user = client.require_login()?.clone();
    let limit = crate::app_config::limits().max_profile_image_bytes();
    let mut form = read_multipart(payload, limit).await?;
    validate_csrf_token(&cookies, form.text("csrf_token").unwrap_or_default())?;

    let values = ProfileValues {
        first_name: form.text("first_name").unwrap_or_default().to_owned(),
        last_name: form.text("last_name").unwrap_or_default().to_owned(),
        email: form.text("email").unwrap_or_default().to_owned(),
        phone: form.text("phone").unwrap_or_default().to_owned(),
    };

    let mut errors = FormErrors::new();
    if values.first_name.is_empty() {
        errors.add("first_name", "This field is required.");
    }
    if values.last_name.is_empty() {
        errors.add("last_name", "This field is required.");
    }
    if !validator::validate_email(values.email.as_str()) {
        errors.add("email", "Enter a valid email address.");
    }
    if !values.phone.is_empty() && !PHONE_RE.is_match(&values.phone) {
        errors.add("phone", "Enter a valid phone number.");
    }

    let image = form.take_file("profile_image");
    let image_ext = match image {
        Some(ref file) => match extension_of(&file.filename) {
            Some(ext) if ALLOWED_PROFILE_IMAGE_EXTENSIONS.contains(&ext.as_str()) => Some(ext),
            _ => {
                errors.add(
                    "profile_image",
                    format!(
                        "Allowed image types: {}",
                        ALLOWED_PROFILE_IMAGE_EXTENSIONS.join(", ")
                    ),
                );
                None
            }
        },
        None => None,
    };

    if !errors.is_empty() {
        return Ok(EditProfileTemplate {
            client,
            values,
            profile_image: user.profile_image,
            errors,
        }
        .to_response());
    }

    let new_key = match (image, image_ext) {
        (Some(file), Some(ext)) => {
            let key = profile_key(&ext);
            storage
                .put_object(file.data, &key)
                .await
                .map_err(crate::error::AcademyError::from)?;
            Some(key)
        }
        _ => None,
    };

    let old_image = user.profile_image.clone();
    let update = ProfileUpdate {
        first_name: values.first_name,
        last_name: values.last_name,
        email: values.email,
        phone: non_empty(&Some(values.phone)),
        profile_image: new_key.clone(),
    };
    accounts::update_profile(&db, user, update).await?;

    if let (Some(_), Some(old)) = (new_key, old_image) {
        if let Err(e) = storage.delete(&old).await {
            log::warn!("Unable to remove old profile image {}: {}", old, e);
        }
    }

    flash::success(&cookies, "Your profile has been updated.");
    Ok(redirect("/profile/"))
}

#[get("/change-password/")]
pub async fn view_change_password(client: ClientCtx) -> HttpResponse {
    ChangePasswordTemplate {
        client,
        errors: FormErrors::new(),
    }
    .to_response()
}

#[post("/change-password/")]
pub async fn post_change_password(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    form: web::Form<ChangePasswordForm>,
) -> Result<HttpResponse, Error> {
    validate_csrf_token(&cookies, &form.csrf_token)?;
    let user = client.require_login()?.clone();

    let mut errors = FormErrors::new();
    if form.new_password1.chars().count() < MIN_PASSWORD_LENGTH {
        errors.add(
            "new_password1",
            format!("Password must be at least {} characters.", MIN_PASSWORD_LENGTH),
        );
    }
    if form.new_password1 != form.new_password2 {
        errors.add("new_password2", "The two password fields didn't match.");
    }
    if !errors.is_empty() {
        return Ok(ChangePasswordTemplate { client, errors }.to_response());
    }

    match accounts::change_password(&db, user, &form.old_password, &form.new_password1).await {
        Ok(user) => {
            session::refresh_auth_hash(&cookies, &user)?;
            flash::success(&cookies, "Your password has been changed.");
            Ok(redirect("/profile/"))
        }
        Err(crate::error::AcademyError::Invalid(msg)) => {
            flash::error(&cookies, msg);
            Ok(redirect("/profile/change-password/"))
        }
        Err(e) => Err(e.into()),
    }
}
