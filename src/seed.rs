//! Initial reference data: departments, IT specializations, permission rows.

use crate::accounts::{create_user, NewUser};
use crate::error::AcademyError;
use crate::orm::users::{self, Role};
use crate::orm::{departments, specializations};
use crate::permission::ensure_role_rows;
use sea_orm::{entity::*, query::*, ActiveValue::Set, DatabaseConnection, DbErr};

pub const SEED_DEPARTMENTS: [&str; 3] = [
    "Information Technology",
    "Computer Science",
    "Information Systems",
];

/// Specializations created under the first seeded department.
pub const SEED_IT_SPECIALIZATIONS: [&str; 3] = [
    "Computer Networks",
    "Software Development",
    "Databases",
];

#[derive(Debug, Default)]
pub struct SeedReport {
    pub departments: Vec<String>,
    pub specializations: Vec<String>,
    pub roles: Vec<Role>,
}

async fn get_or_create_department(
    db: &DatabaseConnection,
    name: &str,
) -> Result<(departments::Model, bool), DbErr> {
    if let Some(existing) = departments::Entity::find()
        .filter(departments::Column::Name.eq(name))
        .one(db)
        .await?
    {
        return Ok((existing, false));
    }
    let created = departments::ActiveModel {
        name: Set(name.to_owned()),
        description: Set(Some(name.to_owned())),
        head_id: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok((created, true))
}

async fn get_or_create_specialization(
    db: &DatabaseConnection,
    name: &str,
    department_id: i32,
) -> Result<bool, DbErr> {
    let existing = specializations::Entity::find()
        .filter(specializations::Column::Name.eq(name))
        .filter(specializations::Column::DepartmentId.eq(department_id))
        .one(db)
        .await?;
    if existing.is_some() {
        return Ok(false);
    }
    specializations::ActiveModel {
        name: Set(name.to_owned()),
        department_id: Set(department_id),
        description: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(true)
}

/// Safe to run repeatedly; only missing rows are created.
pub async fn seed_initial_data(db: &DatabaseConnection) -> Result<SeedReport, DbErr> {
    let mut report = SeedReport::default();

    let mut it_department = None;
    for name in SEED_DEPARTMENTS {
        let (dep, created) = get_or_create_department(db, name).await?;
        if created {
            log::info!("Created department: {}", dep.name);
            report.departments.push(dep.name.clone());
        }
        if it_department.is_none() {
            it_department = Some(dep);
        }
    }

    if let Some(it) = it_department {
        for name in SEED_IT_SPECIALIZATIONS {
            if get_or_create_specialization(db, name, it.id).await? {
                log::info!("Created specialization: {}", name);
                report.specializations.push(name.to_owned());
            }
        }
    }

    report.roles = ensure_role_rows(db).await?;
    Ok(report)
}

/// Creates an administrator account unless the username already exists.
pub async fn create_admin(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
) -> Result<Option<users::Model>, AcademyError> {
    if password.chars().count() < crate::constants::MIN_PASSWORD_LENGTH {
        return Err(AcademyError::invalid(format!(
            "Password must be at least {} characters.",
            crate::constants::MIN_PASSWORD_LENGTH
        )));
    }
    if crate::accounts::username_taken(db, username).await? {
        log::info!("Admin account '{}' already exists", username);
        return Ok(None);
    }

    let user = create_user(
        db,
        NewUser {
            username: username.to_owned(),
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            password: password.to_owned(),
            role: Role::Admin,
            academic_id: None,
            phone: None,
            department_id: None,
            specialization_id: None,
            level: None,
        },
    )
    .await?;
    Ok(Some(user))
}
