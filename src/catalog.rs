//! Departments, specializations and courses.

use crate::db::count_grouped;
use crate::error::AcademyError;
use crate::orm::courses::{self, Semester};
use crate::orm::users::{self, Role};
use crate::orm::{departments, enrollments, lecture_files, specializations};
use sea_orm::{
    entity::*, query::*, ActiveValue::Set, DatabaseConnection, DbErr, FromQueryResult,
};
use serde::Serialize;

// Departments

#[derive(Clone, Debug)]
pub struct DepartmentInput {
    pub name: String,
    pub description: Option<String>,
    pub head_id: Option<i32>,
}

pub struct DepartmentRow {
    pub department: departments::Model,
    pub head: Option<users::Model>,
    pub specialization_count: i64,
    pub user_count: i64,
}

pub async fn find_department(
    db: &DatabaseConnection,
    id: i32,
) -> Result<departments::Model, AcademyError> {
    departments::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AcademyError::NotFound("Department"))
}

/// All departments by name.
pub async fn all_departments(db: &DatabaseConnection) -> Result<Vec<departments::Model>, DbErr> {
    departments::Entity::find()
        .order_by_asc(departments::Column::Name)
        .all(db)
        .await
}

pub async fn list_departments(db: &DatabaseConnection) -> Result<Vec<DepartmentRow>, DbErr> {
    let deps = all_departments(db).await?;

    let spec_counts = count_grouped(
        db,
        specializations::Entity::find(),
        specializations::Column::DepartmentId,
        "COUNT(*)",
    )
    .await?;
    let user_counts = count_grouped(
        db,
        users::Entity::find().filter(users::Column::DepartmentId.is_not_null()),
        users::Column::DepartmentId,
        "COUNT(*)",
    )
    .await?;

    let head_ids: Vec<i32> = deps.iter().filter_map(|d| d.head_id).collect();
    let heads = if head_ids.is_empty() {
        Vec::new()
    } else {
        users::Entity::find()
            .filter(users::Column::Id.is_in(head_ids))
            .all(db)
            .await?
    };

    Ok(deps
        .into_iter()
        .map(|d| DepartmentRow {
            head: d
                .head_id
                .and_then(|id| heads.iter().find(|u| u.id == id).cloned()),
            specialization_count: spec_counts.get(&d.id).copied().unwrap_or(0),
            user_count: user_counts.get(&d.id).copied().unwrap_or(0),
            department: d,
        })
        .collect())
}

async fn check_head(db: &DatabaseConnection, head_id: Option<i32>) -> Result<(), AcademyError> {
    if let Some(id) = head_id {
        let head = users::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or(AcademyError::NotFound("User"))?;
        if head.role == Role::Student {
            return Err(AcademyError::invalid("A student cannot head a department."));
        }
    }
    Ok(())
}

async fn department_name_taken(
    db: &DatabaseConnection,
    name: &str,
    except: Option<i32>,
) -> Result<bool, DbErr> {
    let mut q = departments::Entity::find().filter(departments::Column::Name.eq(name));
    if let Some(id) = except {
        q = q.filter(departments::Column::Id.ne(id));
    }
    Ok(q.one(db).await?.is_some())
}

pub async fn create_department(
    db: &DatabaseConnection,
    input: DepartmentInput,
) -> Result<departments::Model, AcademyError> {
    if department_name_taken(db, &input.name, None).await? {
        return Err(AcademyError::Duplicate("name"));
    }
    check_head(db, input.head_id).await?;

    let model = departments::ActiveModel {
        name: Set(input.name),
        description: Set(input.description),
        head_id: Set(input.head_id),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(|e| AcademyError::unique_or_db(e, "name"))?;

    log::info!("Created department '{}'", model.name);
    Ok(model)
}

pub async fn update_department(
    db: &DatabaseConnection,
    id: i32,
    input: DepartmentInput,
) -> Result<departments::Model, AcademyError> {
    let existing = find_department(db, id).await?;
    if department_name_taken(db, &input.name, Some(id)).await? {
        return Err(AcademyError::Duplicate("name"));
    }
    check_head(db, input.head_id).await?;

    let mut active: departments::ActiveModel = existing.into();
    active.name = Set(input.name);
    active.description = Set(input.description);
    active.head_id = Set(input.head_id);
    active
        .update(db)
        .await
        .map_err(|e| AcademyError::unique_or_db(e, "name"))
}

/// Deletes the department with its specializations, their courses, and
/// everything hanging off those courses.
pub async fn delete_department(db: &DatabaseConnection, id: i32) -> Result<(), AcademyError> {
    let dep = find_department(db, id).await?;
    departments::Entity::delete_many()
        .filter(departments::Column::Id.eq(dep.id))
        .exec(db)
        .await?;
    log::info!("Deleted department {} ('{}')", dep.id, dep.name);
    Ok(())
}

// Specializations

#[derive(Clone, Debug)]
pub struct SpecializationInput {
    pub name: String,
    pub department_id: i32,
    pub description: Option<String>,
}

pub struct SpecializationRow {
    pub specialization: specializations::Model,
    pub department_name: String,
    pub course_count: i64,
}

/// `{id, name}` pairs for the specialization picker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, FromQueryResult)]
pub struct SpecializationOption {
    pub id: i32,
    pub name: String,
}

pub async fn find_specialization(
    db: &DatabaseConnection,
    id: i32,
) -> Result<specializations::Model, AcademyError> {
    specializations::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AcademyError::NotFound("Specialization"))
}

pub async fn specializations_for_department(
    db: &DatabaseConnection,
    department_id: i32,
) -> Result<Vec<SpecializationOption>, DbErr> {
    specializations::Entity::find()
        .select_only()
        .column(specializations::Column::Id)
        .column(specializations::Column::Name)
        .filter(specializations::Column::DepartmentId.eq(department_id))
        .order_by_asc(specializations::Column::Name)
        .into_model::<SpecializationOption>()
        .all(db)
        .await
}

/// Ordered by department name, then specialization name.
pub async fn list_specializations(
    db: &DatabaseConnection,
    department_id: Option<i32>,
) -> Result<Vec<SpecializationRow>, DbErr> {
    let mut query = specializations::Entity::find().find_also_related(departments::Entity);
    if let Some(dep) = department_id {
        query = query.filter(specializations::Column::DepartmentId.eq(dep));
    }
    let rows = query
        .order_by_asc(departments::Column::Name)
        .order_by_asc(specializations::Column::Name)
        .all(db)
        .await?;

    let course_counts = count_grouped(
        db,
        courses::Entity::find(),
        courses::Column::SpecializationId,
        "COUNT(*)",
    )
    .await?;

    Ok(rows
        .into_iter()
        .map(|(spec, dep)| SpecializationRow {
            department_name: dep.map(|d| d.name).unwrap_or_default(),
            course_count: course_counts.get(&spec.id).copied().unwrap_or(0),
            specialization: spec,
        })
        .collect())
}

async fn specialization_name_taken(
    db: &DatabaseConnection,
    input: &SpecializationInput,
    except: Option<i32>,
) -> Result<bool, DbErr> {
    let mut q = specializations::Entity::find()
        .filter(specializations::Column::Name.eq(input.name.as_str()))
        .filter(specializations::Column::DepartmentId.eq(input.department_id));
    if let Some(id) = except {
        q = q.filter(specializations::Column::Id.ne(id));
    }
    Ok(q.one(db).await?.is_some())
}

pub async fn create_specialization(
    db: &DatabaseConnection,
    input: SpecializationInput,
) -> Result<specializations::Model, AcademyError> {
    find_department(db, input.department_id).await?;
    if specialization_name_taken(db, &input, None).await? {
        return Err(AcademyError::Duplicate("name"));
    }

    let model = specializations::ActiveModel {
        name: Set(input.name),
        department_id: Set(input.department_id),
        description: Set(input.description),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(|e| AcademyError::unique_or_db(e, "name"))?;

    log::info!("Created specialization '{}'", model.name);
    Ok(model)
}

pub async fn update_specialization(
    db: &DatabaseConnection,
    id: i32,
    input: SpecializationInput,
) -> Result<specializations::Model, AcademyError> {
    let existing = find_specialization(db, id).await?;
    find_department(db, input.department_id).await?;
    if specialization_name_taken(db, &input, Some(id)).await? {
        return Err(AcademyError::Duplicate("name"));
    }

    let mut active: specializations::ActiveModel = existing.into();
    active.name = Set(input.name);
    active.department_id = Set(input.department_id);
    active.description = Set(input.description);
    active
        .update(db)
        .await
        .map_err(|e| AcademyError::unique_or_db(e, "name"))
}

pub async fn delete_specialization(db: &DatabaseConnection, id: i32) -> Result<(), AcademyError> {
    let spec = find_specialization(db, id).await?;
    specializations::Entity::delete_many()
        .filter(specializations::Column::Id.eq(spec.id))
        .exec(db)
        .await?;
    log::info!("Deleted specialization {} ('{}')", spec.id, spec.name);
    Ok(())
}

// Courses

#[derive(Clone, Debug)]
pub struct CourseInput {
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub specialization_id: i32,
    pub level: i32,
    pub semester: Semester,
    pub academic_year: String,
    pub credit_hours: i32,
    pub teacher_id: Option<i32>,
    pub is_active: bool,
}

impl CourseInput {
    /// Input with the usual defaults filled in.
    pub fn new(name: &str, code: &str, specialization_id: i32, level: i32) -> Self {
        Self {
            name: name.to_owned(),
            code: code.to_owned(),
            description: None,
            specialization_id,
            level,
            semester: Semester::default(),
            academic_year: crate::constants::DEFAULT_ACADEMIC_YEAR.to_owned(),
            credit_hours: crate::constants::DEFAULT_CREDIT_HOURS,
            teacher_id: None,
            is_active: true,
        }
    }
}

pub struct CourseRow {
    pub course: courses::Model,
    pub specialization_name: String,
    pub teacher: Option<users::Model>,
    pub enrolled_count: i64,
    pub file_count: i64,
}

#[derive(Clone, Debug, Default)]
pub struct CourseFilter {
    pub specialization_id: Option<i32>,
    pub level: Option<i32>,
    pub semester: Option<Semester>,
    pub is_active: Option<bool>,
    /// Matches name or code.
    pub q: Option<String>,
}

pub async fn find_course(db: &DatabaseConnection, id: i32) -> Result<courses::Model, AcademyError> {
    courses::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AcademyError::NotFound("Course"))
}

async fn check_course_input(
    db: &DatabaseConnection,
    input: &CourseInput,
    except: Option<i32>,
) -> Result<(), AcademyError> {
    if !crate::constants::LEVELS.contains(&input.level) {
        return Err(AcademyError::invalid("Level must be between 1 and 4."));
    }
    if input.credit_hours < 0 {
        return Err(AcademyError::invalid("Credit hours cannot be negative."));
    }
    find_specialization(db, input.specialization_id).await?;

    if let Some(teacher_id) = input.teacher_id {
        let teacher = users::Entity::find_by_id(teacher_id)
            .one(db)
            .await?
            .ok_or(AcademyError::NotFound("Teacher"))?;
        if teacher.role != Role::Teacher {
            return Err(AcademyError::invalid("Only a teacher can be assigned to a course."));
        }
    }

    let mut q = courses::Entity::find().filter(courses::Column::Code.eq(input.code.as_str()));
    if let Some(id) = except {
        q = q.filter(courses::Column::Id.ne(id));
    }
    if q.one(db).await?.is_some() {
        return Err(AcademyError::Duplicate("code"));
    }
    Ok(())
}

pub async fn create_course(
    db: &DatabaseConnection,
    input: CourseInput,
) -> Result<courses::Model, AcademyError> {
    check_course_input(db, &input, None).await?;

    let model = courses::ActiveModel {
        name: Set(input.name),
        code: Set(input.code),
        description: Set(input.description),
        specialization_id: Set(input.specialization_id),
        level: Set(input.level),
        semester: Set(input.semester),
        academic_year: Set(input.academic_year),
        credit_hours: Set(input.credit_hours),
        teacher_id: Set(input.teacher_id),
        is_active: Set(input.is_active),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(|e| AcademyError::unique_or_db(e, "code"))?;

    log::info!("Created course {} '{}'", model.code, model.name);
    Ok(model)
}

pub async fn update_course(
    db: &DatabaseConnection,
    id: i32,
    input: CourseInput,
) -> Result<courses::Model, AcademyError> {
    let existing = find_course(db, id).await?;
    check_course_input(db, &input, Some(id)).await?;

    let mut active: courses::ActiveModel = existing.into();
    active.name = Set(input.name);
    active.code = Set(input.code);
    active.description = Set(input.description);
    active.specialization_id = Set(input.specialization_id);
    active.level = Set(input.level);
    active.semester = Set(input.semester);
    active.academic_year = Set(input.academic_year);
    active.credit_hours = Set(input.credit_hours);
    active.teacher_id = Set(input.teacher_id);
    active.is_active = Set(input.is_active);
    active
        .update(db)
        .await
        .map_err(|e| AcademyError::unique_or_db(e, "code"))
}

/// Removes the course row. Enrollments, files and notifications cascade;
/// stored bytes are the caller's to remove.
pub async fn delete_course(db: &DatabaseConnection, id: i32) -> Result<courses::Model, AcademyError> {
    let course = find_course(db, id).await?;
    courses::Entity::delete_many()
        .filter(courses::Column::Id.eq(course.id))
        .exec(db)
        .await?;
    log::info!("Deleted course {} '{}'", course.code, course.name);
    Ok(course)
}

/// Ordered by specialization, level, then name.
pub async fn list_courses(
    db: &DatabaseConnection,
    filter: &CourseFilter,
) -> Result<Vec<CourseRow>, DbErr> {
    let mut query = courses::Entity::find().find_also_related(specializations::Entity);
    if let Some(spec) = filter.specialization_id {
        query = query.filter(courses::Column::SpecializationId.eq(spec));
    }
    if let Some(level) = filter.level {
        query = query.filter(courses::Column::Level.eq(level));
    }
    if let Some(semester) = filter.semester {
        query = query.filter(courses::Column::Semester.eq(semester));
    }
    if let Some(active) = filter.is_active {
        query = query.filter(courses::Column::IsActive.eq(active));
    }
    if let Some(ref q) = filter.q {
        let pattern = format!("%{}%", q);
        query = query.filter(Condition::all().add(
            Condition::any()
                .add(courses::Column::Name.like(&pattern))
                .add(courses::Column::Code.like(&pattern)),
        ));
    }

    let rows = query
        .order_by_asc(specializations::Column::Name)
        .order_by_asc(courses::Column::Level)
        .order_by_asc(courses::Column::Name)
        .all(db)
        .await?;

    let enrolled = count_grouped(
        db,
        enrollments::Entity::find(),
        enrollments::Column::CourseId,
        "COUNT(*)",
    )
    .await?;
    let files = count_grouped(
        db,
        lecture_files::Entity::find(),
        lecture_files::Column::CourseId,
        "COUNT(*)",
    )
    .await?;

    let teacher_ids: Vec<i32> = rows.iter().filter_map(|(c, _)| c.teacher_id).collect();
    let teachers = if teacher_ids.is_empty() {
        Vec::new()
    } else {
        users::Entity::find()
            .filter(users::Column::Id.is_in(teacher_ids))
            .all(db)
            .await?
    };

    Ok(rows
        .into_iter()
        .map(|(course, spec)| CourseRow {
            specialization_name: spec.map(|s| s.name).unwrap_or_default(),
            teacher: course
                .teacher_id
                .and_then(|id| teachers.iter().find(|t| t.id == id).cloned()),
            enrolled_count: enrolled.get(&course.id).copied().unwrap_or(0),
            file_count: files.get(&course.id).copied().unwrap_or(0),
            course,
        })
        .collect())
}

/// Ids of every course under a department.
pub async fn course_ids_in_department(db: &DatabaseConnection, department_id: i32) -> Result<Vec<i32>, DbErr> {
    let spec_ids: Vec<i32> = specializations::Entity::find()
        .filter(specializations::Column::DepartmentId.eq(department_id))
        .all(db)
        .await?
        .into_iter()
        .map(|s| s.id)
        .collect();
    if spec_ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(courses::Entity::find()
        .filter(courses::Column::SpecializationId.is_in(spec_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|c| c.id)
        .collect())
}

pub async fn course_ids_in_specialization(
    db: &DatabaseConnection,
    specialization_id: i32,
) -> Result<Vec<i32>, DbErr> {
    Ok(courses::Entity::find()
        .filter(courses::Column::SpecializationId.eq(specialization_id))
        .all(db)
        .await?
        .into_iter()
        .map(|c| c.id)
        .collect())
}

/// All courses by code, for select boxes.
pub async fn all_courses(db: &DatabaseConnection) -> Result<Vec<courses::Model>, DbErr> {
    courses::Entity::find()
        .order_by_asc(courses::Column::Code)
        .all(db)
        .await
}

/// Courses a teacher is assigned to, by code.
pub async fn courses_taught_by(
    db: &DatabaseConnection,
    teacher_id: i32,
) -> Result<Vec<courses::Model>, DbErr> {
    courses::Entity::find()
        .filter(courses::Column::TeacherId.eq(teacher_id))
        .order_by_asc(courses::Column::Code)
        .all(db)
        .await
}
