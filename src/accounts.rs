//! User accounts: creation, authentication and profile maintenance.

use crate::error::AcademyError;
use crate::orm::users::{self, Role};
use crate::orm::{departments, specializations};
use crate::session::{hash_password, verify_password};
use chrono::Utc;
use sea_orm::{
    entity::*, query::*, ActiveValue::Set, ConnectionTrait, DatabaseConnection, DbErr,
    TransactionTrait,
};

/// Everything needed to create an account. `password` is plain text.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub role: Role,
    pub academic_id: Option<String>,
    pub phone: Option<String>,
    pub department_id: Option<i32>,
    pub specialization_id: Option<i32>,
    pub level: Option<i32>,
}

#[derive(Debug)]
pub enum LoginOutcome {
    Success(users::Model),
    BadCredentials,
    Inactive,
}

pub async fn find_user<C: ConnectionTrait>(db: &C, id: i32) -> Result<users::Model, AcademyError> {
    users::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AcademyError::NotFound("User"))
}

pub async fn username_taken<C: ConnectionTrait>(db: &C, username: &str) -> Result<bool, DbErr> {
    Ok(users::Entity::find()
        .filter(users::Column::Username.eq(username))
        .one(db)
        .await?
        .is_some())
}

pub async fn academic_id_taken<C: ConnectionTrait>(
    db: &C,
    academic_id: &str,
    except_user: Option<i32>,
) -> Result<bool, DbErr> {
    let mut q = users::Entity::find().filter(users::Column::AcademicId.eq(academic_id));
    if let Some(id) = except_user {
        q = q.filter(users::Column::Id.ne(id));
    }
    Ok(q.one(db).await?.is_some())
}

/// Checks the department/specialization pair. A specialization needs a
/// department and must belong to it.
pub async fn check_placement<C: ConnectionTrait>(
    db: &C,
    department_id: Option<i32>,
    specialization_id: Option<i32>,
) -> Result<(), AcademyError> {
    if let Some(dep) = department_id {
        departments::Entity::find_by_id(dep)
            .one(db)
            .await?
            .ok_or(AcademyError::NotFound("Department"))?;
    }
    if let Some(spec) = specialization_id {
        let spec = specializations::Entity::find_by_id(spec)
            .one(db)
            .await?
            .ok_or(AcademyError::NotFound("Specialization"))?;
        match department_id {
            None => {
                return Err(AcademyError::invalid(
                    "Select a department before choosing a specialization.",
                ))
            }
            Some(dep) if spec.department_id != dep => {
                return Err(AcademyError::invalid(
                    "The specialization does not belong to the selected department.",
                ))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Creates an account. Unique values are pre-checked so the caller gets the
/// offending field; the constraint remains the backstop.
pub async fn create_user<C: ConnectionTrait>(
    db: &C,
    new: NewUser,
) -> Result<users::Model, AcademyError> {
    if username_taken(db, &new.username).await? {
        return Err(AcademyError::Duplicate("username"));
    }
    if let Some(ref academic_id) = new.academic_id {
        if academic_id_taken(db, academic_id, None).await? {
            return Err(AcademyError::Duplicate("academic_id"));
        }
    }
    if let Some(level) = new.level {
        if !crate::constants::LEVELS.contains(&level) {
            return Err(AcademyError::invalid("Level must be between 1 and 4."));
        }
    }
    check_placement(db, new.department_id, new.specialization_id).await?;

    let password = hash_password(&new.password).map_err(|e| {
        log::error!("create_user: hashing failed: {}", e);
        AcademyError::invalid("Unable to store this password.")
    })?;

    let level = if new.role == Role::Student {
        new.level
    } else {
        None
    };

    let user = users::ActiveModel {
        username: Set(new.username),
        email: Set(new.email),
        first_name: Set(new.first_name),
        last_name: Set(new.last_name),
        password: Set(password),
        role: Set(new.role),
        academic_id: Set(new.academic_id),
        phone: Set(new.phone),
        profile_image: Set(None),
        department_id: Set(new.department_id),
        specialization_id: Set(new.specialization_id),
        level: Set(level),
        is_active: Set(true),
        last_login: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(|e| AcademyError::unique_among(e, &["username", "academic_id"]))?;

    log::info!("Created {} account '{}'", user.role.as_str(), user.username);
    Ok(user)
}

/// Self registration. Role is always student; runs in one transaction.
pub async fn register_student(
    db: &DatabaseConnection,
    mut new: NewUser,
) -> Result<users::Model, AcademyError> {
    new.role = Role::Student;
    if new.academic_id.is_none() {
        return Err(AcademyError::invalid("Academic ID is required."));
    }
    if new.level.is_none() {
        return Err(AcademyError::invalid("Level is required."));
    }

    let txn = db.begin().await?;
    let user = create_user(&txn, new).await?;
    txn.commit().await?;
    Ok(user)
}

pub async fn authenticate(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
) -> Result<LoginOutcome, DbErr> {
    let user = users::Entity::find()
        .filter(users::Column::Username.eq(username))
        .one(db)
        .await?;

    let user = match user {
        Some(user) => user,
        None => {
            // Burn comparable time so unknown names are not distinguishable.
            let _ = verify_password(password, &crate::session::DUMMY_HASH);
            return Ok(LoginOutcome::BadCredentials);
        }
    };

    if !verify_password(password, &user.password) {
        return Ok(LoginOutcome::BadCredentials);
    }
    if !user.is_active {
        return Ok(LoginOutcome::Inactive);
    }

    Ok(LoginOutcome::Success(user))
}

pub async fn record_login(
    db: &DatabaseConnection,
    user: users::Model,
) -> Result<users::Model, DbErr> {
    let mut active: users::ActiveModel = user.into();
    active.last_login = Set(Some(Utc::now().naive_utc()));
    active.update(db).await
}

#[derive(Clone, Debug)]
pub struct ProfileUpdate {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    /// New profile image key, if one was uploaded.
    pub profile_image: Option<String>,
}

pub async fn update_profile(
    db: &DatabaseConnection,
    user: users::Model,
    update: ProfileUpdate,
) -> Result<users::Model, AcademyError> {
    let mut active: users::ActiveModel = user.into();
    active.first_name = Set(update.first_name);
    active.last_name = Set(update.last_name);
    active.email = Set(update.email);
    active.phone = Set(update.phone);
    if let Some(key) = update.profile_image {
        active.profile_image = Set(Some(key));
    }
    Ok(active.update(db).await?)
}

pub async fn set_password(
    db: &DatabaseConnection,
    user: users::Model,
    new_password: &str,
) -> Result<users::Model, AcademyError> {
    let hash = hash_password(new_password).map_err(|e| {
        log::error!("set_password: hashing failed: {}", e);
        AcademyError::invalid("Unable to store this password.")
    })?;
    let mut active: users::ActiveModel = user.into();
    active.password = Set(hash);
    Ok(active.update(db).await?)
}

/// Verifies `old_password` before storing `new_password`.
pub async fn change_password(
    db: &DatabaseConnection,
    user: users::Model,
    old_password: &str,
    new_password: &str,
) -> Result<users::Model, AcademyError> {
    if !verify_password(old_password, &user.password) {
        return Err(AcademyError::invalid("Your current password is incorrect."));
    }
    let user = set_password(db, user, new_password).await?;
    log::info!("User {} changed their password", user.id);
    Ok(user)
}

pub async fn set_active(
    db: &DatabaseConnection,
    user_id: i32,
    is_active: bool,
) -> Result<users::Model, AcademyError> {
    let user = find_user(db, user_id).await?;
    let mut active: users::ActiveModel = user.into();
    active.is_active = Set(is_active);
    Ok(active.update(db).await?)
}

/// Deletes a user. Historical references are nulled by the schema;
/// the department head column is cleared here.
pub async fn delete_user(db: &DatabaseConnection, user_id: i32) -> Result<(), AcademyError> {
    let user = find_user(db, user_id).await?;

    let txn = db.begin().await?;
    departments::Entity::update_many()
        .col_expr(
            departments::Column::HeadId,
            sea_orm::sea_query::Expr::value(Option::<i32>::None),
        )
        .filter(departments::Column::HeadId.eq(user.id))
        .exec(&txn)
        .await?;
    users::Entity::delete_many()
        .filter(users::Column::Id.eq(user.id))
        .exec(&txn)
        .await?;
    txn.commit().await?;

    log::info!("Deleted user {} ('{}')", user.id, user.username);
    Ok(())
}

#[derive(Clone, Debug, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    /// Matches username, names, email or academic id.
    pub q: Option<String>,
}

/// Newest-joined first. Returns the page and the page count.
pub async fn list_users(
    db: &DatabaseConnection,
    filter: &UserFilter,
    page: u64,
    per_page: u64,
) -> Result<(Vec<users::Model>, u64), DbErr> {
    let mut query = users::Entity::find().order_by_desc(users::Column::DateJoined);
    if let Some(role) = filter.role {
        query = query.filter(users::Column::Role.eq(role));
    }
    if let Some(ref q) = filter.q {
        let pattern = format!("%{}%", q);
        query = query.filter(Condition::all().add(
            Condition::any()
                .add(users::Column::Username.like(&pattern))
                .add(users::Column::FirstName.like(&pattern))
                .add(users::Column::LastName.like(&pattern))
                .add(users::Column::Email.like(&pattern))
                .add(users::Column::AcademicId.like(&pattern)),
        ));
    }

    let paginator = query.paginate(db, per_page.max(1) as usize);
    let pages = paginator.num_pages().await? as u64;
    let rows = paginator.fetch_page(page.saturating_sub(1) as usize).await?;
    Ok((rows, pages))
}

/// Active teachers by name, for course assignment.
pub async fn teachers(db: &DatabaseConnection) -> Result<Vec<users::Model>, DbErr> {
    users::Entity::find()
        .filter(users::Column::Role.eq(Role::Teacher))
        .filter(users::Column::IsActive.eq(true))
        .order_by_asc(users::Column::FirstName)
        .order_by_asc(users::Column::LastName)
        .all(db)
        .await
}

pub async fn students(db: &DatabaseConnection) -> Result<Vec<users::Model>, DbErr> {
    users::Entity::find()
        .filter(users::Column::Role.eq(Role::Student))
        .order_by_asc(users::Column::Username)
        .all(db)
        .await
}

/// Active accounts by username, for picking a recipient.
pub async fn active_users(db: &DatabaseConnection) -> Result<Vec<users::Model>, DbErr> {
    users::Entity::find()
        .filter(users::Column::IsActive.eq(true))
        .order_by_asc(users::Column::Username)
        .all(db)
        .await
}
