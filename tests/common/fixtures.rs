//! Test fixtures for creating test data
#![allow(dead_code)]

use sacm::accounts::{create_user, NewUser};
use sacm::catalog::{self, CourseInput, DepartmentInput, SpecializationInput};
use sacm::orm::users::Role;
use sacm::orm::{courses, departments, specializations, users};
use sacm::AcademyError;
use sea_orm::DatabaseConnection;

pub const TEST_PASSWORD: &str = "correct-horse-battery";

/// Account with a known password. Students get level 1.
pub fn new_user(username: &str, role: Role) -> NewUser {
    NewUser {
        username: username.to_owned(),
        email: format!("{}@test.edu", username),
        first_name: "Test".to_owned(),
        last_name: username.to_owned(),
        password: TEST_PASSWORD.to_owned(),
        role,
        academic_id: None,
        phone: None,
        department_id: None,
        specialization_id: None,
        level: if role == Role::Student { Some(1) } else { None },
    }
}

pub async fn create_test_user(
    db: &DatabaseConnection,
    username: &str,
    role: Role,
) -> Result<users::Model, AcademyError> {
    create_user(db, new_user(username, role)).await
}

pub async fn create_test_student(
    db: &DatabaseConnection,
    username: &str,
) -> Result<users::Model, AcademyError> {
    create_test_user(db, username, Role::Student).await
}

pub async fn create_test_teacher(
    db: &DatabaseConnection,
    username: &str,
) -> Result<users::Model, AcademyError> {
    create_test_user(db, username, Role::Teacher).await
}

pub async fn create_test_admin(
    db: &DatabaseConnection,
    username: &str,
) -> Result<users::Model, AcademyError> {
    create_test_user(db, username, Role::Admin).await
}

pub async fn create_test_department(
    db: &DatabaseConnection,
    name: &str,
) -> Result<departments::Model, AcademyError> {
    catalog::create_department(
        db,
        DepartmentInput {
            name: name.to_owned(),
            description: None,
            head_id: None,
        },
    )
    .await
}

pub async fn create_test_specialization(
    db: &DatabaseConnection,
    name: &str,
    department_id: i32,
) -> Result<specializations::Model, AcademyError> {
    catalog::create_specialization(
        db,
        SpecializationInput {
            name: name.to_owned(),
            department_id,
            description: None,
        },
    )
    .await
}

/// A department, a specialization under it, and one level 1 course.
pub struct TestCatalog {
    pub department: departments::Model,
    pub specialization: specializations::Model,
    pub course: courses::Model,
}

pub async fn create_test_catalog(
    db: &DatabaseConnection,
    teacher_id: Option<i32>,
) -> Result<TestCatalog, AcademyError> {
    let department = create_test_department(db, "Information Technology").await?;
    let specialization =
        create_test_specialization(db, "Software Development", department.id).await?;
    let course = create_test_course(db, "NET101", specialization.id, teacher_id).await?;
    Ok(TestCatalog {
        department,
        specialization,
        course,
    })
}

pub async fn create_test_course(
    db: &DatabaseConnection,
    code: &str,
    specialization_id: i32,
    teacher_id: Option<i32>,
) -> Result<courses::Model, AcademyError> {
    let mut input = CourseInput::new(&format!("Course {}", code), code, specialization_id, 1);
    input.teacher_id = teacher_id;
    catalog::create_course(db, input).await
}
