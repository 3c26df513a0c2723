//! Student to course enrollment ledger.

use crate::error::AcademyError;
use crate::orm::users::{self, Role};
use crate::orm::{courses, enrollments};
use sea_orm::{entity::*, query::*, ActiveValue::Set, DatabaseConnection, DbErr};

/// An active enrollment with its course and the course teacher.
pub struct EnrolledCourse {
    pub enrollment: enrollments::Model,
    pub course: courses::Model,
    pub teacher: Option<users::Model>,
}

pub struct EnrollmentRow {
    pub enrollment: enrollments::Model,
    pub student: users::Model,
    pub course: courses::Model,
}

pub async fn find_enrollment(
    db: &DatabaseConnection,
    id: i32,
) -> Result<enrollments::Model, AcademyError> {
    enrollments::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AcademyError::NotFound("Enrollment"))
}

/// Links a student to a course once. A second link for the same pair is
/// `Duplicate("enrollment")`, whether caught here or by the unique index.
pub async fn enroll(
    db: &DatabaseConnection,
    student_id: i32,
    course_id: i32,
) -> Result<enrollments::Model, AcademyError> {
    let student = users::Entity::find_by_id(student_id)
        .one(db)
        .await?
        .ok_or(AcademyError::NotFound("Student"))?;
    if student.role != Role::Student {
        return Err(AcademyError::invalid("Only students can be enrolled in courses."));
    }
    courses::Entity::find_by_id(course_id)
        .one(db)
        .await?
        .ok_or(AcademyError::NotFound("Course"))?;

    let existing = enrollments::Entity::find()
        .filter(enrollments::Column::StudentId.eq(student_id))
        .filter(enrollments::Column::CourseId.eq(course_id))
        .one(db)
        .await?;
    if existing.is_some() {
        return Err(AcademyError::Duplicate("enrollment"));
    }

    insert_enrollment(db, student_id, course_id).await
}

/// Bare insert; the unique index has the final word.
pub async fn insert_enrollment(
    db: &DatabaseConnection,
    student_id: i32,
    course_id: i32,
) -> Result<enrollments::Model, AcademyError> {
    let model = enrollments::ActiveModel {
        student_id: Set(student_id),
        course_id: Set(course_id),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(|e| AcademyError::unique_or_db(e, "enrollment"))?;

    log::info!("Enrolled student {} in course {}", student_id, course_id);
    Ok(model)
}

/// Flips the active flag. Enrollments are never removed by deactivation.
pub async fn set_enrollment_active(
    db: &DatabaseConnection,
    id: i32,
    is_active: bool,
) -> Result<enrollments::Model, AcademyError> {
    let existing = find_enrollment(db, id).await?;
    let mut active: enrollments::ActiveModel = existing.into();
    active.is_active = Set(is_active);
    Ok(active.update(db).await?)
}

pub async fn delete_enrollment(db: &DatabaseConnection, id: i32) -> Result<(), AcademyError> {
    let existing = find_enrollment(db, id).await?;
    enrollments::Entity::delete_many()
        .filter(enrollments::Column::Id.eq(existing.id))
        .exec(db)
        .await?;
    Ok(())
}

pub async fn is_actively_enrolled(
    db: &DatabaseConnection,
    student_id: i32,
    course_id: i32,
) -> Result<bool, DbErr> {
    Ok(enrollments::Entity::find()
        .filter(enrollments::Column::StudentId.eq(student_id))
        .filter(enrollments::Column::CourseId.eq(course_id))
        .filter(enrollments::Column::IsActive.eq(true))
        .one(db)
        .await?
        .is_some())
}

/// Ids of courses the student is actively enrolled in.
pub async fn active_course_ids(db: &DatabaseConnection, student_id: i32) -> Result<Vec<i32>, DbErr> {
    Ok(enrollments::Entity::find()
        .filter(enrollments::Column::StudentId.eq(student_id))
        .filter(enrollments::Column::IsActive.eq(true))
        .all(db)
        .await?
        .into_iter()
        .map(|e| e.course_id)
        .collect())
}

/// Active enrollments, newest first, with course and teacher.
pub async fn active_enrollments_for(
    db: &DatabaseConnection,
    student_id: i32,
) -> Result<Vec<EnrolledCourse>, DbErr> {
    let rows = enrollments::Entity::find()
        .find_also_related(courses::Entity)
        .filter(enrollments::Column::StudentId.eq(student_id))
        .filter(enrollments::Column::IsActive.eq(true))
        .order_by_desc(enrollments::Column::EnrolledAt)
        .order_by_desc(enrollments::Column::Id)
        .all(db)
        .await?;

    let teacher_ids: Vec<i32> = rows
        .iter()
        .filter_map(|(_, c)| c.as_ref().and_then(|c| c.teacher_id))
        .collect();
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
        .filter_map(|(enrollment, course)| {
            let course = course?;
            let teacher = course
                .teacher_id
                .and_then(|id| teachers.iter().find(|t| t.id == id).cloned());
            Some(EnrolledCourse {
                enrollment,
                course,
                teacher,
            })
        })
        .collect())
}

/// Every enrollment, newest first, optionally for one course.
pub async fn list_enrollments(
    db: &DatabaseConnection,
    course_id: Option<i32>,
) -> Result<Vec<EnrollmentRow>, DbErr> {
    let mut query = enrollments::Entity::find().find_also_related(courses::Entity);
    if let Some(course_id) = course_id {
        query = query.filter(enrollments::Column::CourseId.eq(course_id));
    }
    let rows = query
        .order_by_desc(enrollments::Column::EnrolledAt)
        .order_by_desc(enrollments::Column::Id)
        .all(db)
        .await?;

    let student_ids: Vec<i32> = rows.iter().map(|(e, _)| e.student_id).collect();
    let students = if student_ids.is_empty() {
        Vec::new()
    } else {
        users::Entity::find()
            .filter(users::Column::Id.is_in(student_ids))
            .all(db)
            .await?
    };

    Ok(rows
        .into_iter()
        .filter_map(|(enrollment, course)| {
            let course = course?;
            let student = students
                .iter()
                .find(|s| s.id == enrollment.student_id)
                .cloned()?;
            Some(EnrollmentRow {
                enrollment,
                student,
                course,
            })
        })
        .collect())
}

/// Enrolled students of a course, active only, by name.
pub async fn students_of_course(
    db: &DatabaseConnection,
    course_id: i32,
) -> Result<Vec<users::Model>, DbErr> {
    let ids: Vec<i32> = enrollments::Entity::find()
        .filter(enrollments::Column::CourseId.eq(course_id))
        .filter(enrollments::Column::IsActive.eq(true))
        .all(db)
        .await?
        .into_iter()
        .map(|e| e.student_id)
        .collect();
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    users::Entity::find()
        .filter(users::Column::Id.is_in(ids))
        .order_by_asc(users::Column::FirstName)
        .order_by_asc(users::Column::LastName)
        .all(db)
        .await
}
