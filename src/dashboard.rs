//! Role specific dashboard assembly.

use crate::db::count_grouped;
use crate::enrollment::{active_enrollments_for, EnrolledCourse};
use crate::lectures::{self, FileWithCourse};
use crate::orm::users::{self, Role};
use crate::orm::{courses, departments, enrollments, lecture_files, notifications};
use sea_orm::{entity::*, query::*, DatabaseConnection, DbErr};

pub struct StudentDashboard {
    pub enrollments: Vec<EnrolledCourse>,
    pub notifications: Vec<notifications::Model>,
    pub notifications_count: u64,
    pub recent_files: Vec<FileWithCourse>,
}

pub struct TaughtCourse {
    pub course: courses::Model,
    pub students_count: i64,
    pub files_count: i64,
}

pub struct TeacherDashboard {
    pub courses: Vec<TaughtCourse>,
    pub total_students: u64,
    pub total_files: u64,
    pub recent_files: Vec<FileWithCourse>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct AdminStats {
    pub total_users: u64,
    pub total_students: u64,
    pub total_teachers: u64,
    pub total_courses: u64,
    pub total_departments: u64,
    pub total_files: u64,
}

pub struct AdminDashboard {
    pub stats: AdminStats,
    pub recent_users: Vec<users::Model>,
    pub recent_files: Vec<FileWithCourse>,
}

pub enum Dashboard {
    Student(StudentDashboard),
    Teacher(TeacherDashboard),
    Admin(AdminDashboard),
}

/// Picks the assembly path from the user's role. `recent` caps every
/// "latest" list.
pub async fn build(db: &DatabaseConnection, user: &users::Model, recent: u64) -> Result<Dashboard, DbErr> {
    Ok(match user.role {
        Role::Student => Dashboard::Student(student_dashboard(db, user, recent).await?),
        Role::Teacher => Dashboard::Teacher(teacher_dashboard(db, user, recent).await?),
        Role::Admin => Dashboard::Admin(admin_dashboard(db, recent).await?),
    })
}

pub async fn student_dashboard(
    db: &DatabaseConnection,
    student: &users::Model,
    recent: u64,
) -> Result<StudentDashboard, DbErr> {
    let enrollments = active_enrollments_for(db, student.id).await?;
    let course_ids: Vec<i32> = enrollments.iter().map(|e| e.course.id).collect();

    let (notifications, notifications_count) =
        crate::notifications::unread_for_user(db, student, recent).await?;
    let recent_files = lectures::recent_files_in_courses(db, &course_ids, recent).await?;

    Ok(StudentDashboard {
        enrollments,
        notifications,
        notifications_count,
        recent_files,
    })
}

pub async fn teacher_dashboard(
    db: &DatabaseConnection,
    teacher: &users::Model,
    recent: u64,
) -> Result<TeacherDashboard, DbErr> {
    let owned = courses::Entity::find()
        .filter(courses::Column::TeacherId.eq(teacher.id))
        .filter(courses::Column::IsActive.eq(true))
        .order_by_asc(courses::Column::Code)
        .all(db)
        .await?;
    let owned_ids: Vec<i32> = owned.iter().map(|c| c.id).collect();

    let (students, files, total_students) = if owned_ids.is_empty() {
        Default::default()
    } else {
        let active_enrollments = enrollments::Entity::find()
            .filter(enrollments::Column::CourseId.is_in(owned_ids.clone()))
            .filter(enrollments::Column::IsActive.eq(true));

        let students = count_grouped(
            db,
            active_enrollments.clone(),
            enrollments::Column::CourseId,
            "COUNT(DISTINCT student_id)",
        )
        .await?;
        let files = count_grouped(
            db,
            lecture_files::Entity::find().filter(lecture_files::Column::CourseId.is_in(owned_ids)),
            lecture_files::Column::CourseId,
            "COUNT(*)",
        )
        .await?;

        let mut distinct: Vec<i32> = active_enrollments
            .all(db)
            .await?
            .into_iter()
            .map(|e| e.student_id)
            .collect();
        distinct.sort_unstable();
        distinct.dedup();

        (students, files, distinct.len() as u64)
    };

    let courses = owned
        .into_iter()
        .map(|course| TaughtCourse {
            students_count: students.get(&course.id).copied().unwrap_or(0),
            files_count: files.get(&course.id).copied().unwrap_or(0),
            course,
        })
        .collect();

    Ok(TeacherDashboard {
        courses,
        total_students,
        total_files: lectures::count_uploads_by(db, teacher.id).await?,
        recent_files: lectures::recent_uploads_by(db, teacher.id, recent).await?,
    })
}

pub async fn admin_stats(db: &DatabaseConnection) -> Result<AdminStats, DbErr> {
    Ok(AdminStats {
        total_users: users::Entity::find().count(db).await? as u64,
        total_students: users::Entity::find()
            .filter(users::Column::Role.eq(Role::Student))
            .count(db)
            .await? as u64,
        total_teachers: users::Entity::find()
            .filter(users::Column::Role.eq(Role::Teacher))
            .count(db)
            .await? as u64,
        total_courses: courses::Entity::find()
            .filter(courses::Column::IsActive.eq(true))
            .count(db)
            .await? as u64,
        total_departments: departments::Entity::find().count(db).await? as u64,
        total_files: lecture_files::Entity::find().count(db).await? as u64,
    })
}

pub async fn admin_dashboard(db: &DatabaseConnection, recent: u64) -> Result<AdminDashboard, DbErr> {
    let recent_users = users::Entity::find()
        .order_by_desc(users::Column::DateJoined)
        .order_by_desc(users::Column::Id)
        .limit(recent)
        .all(db)
        .await?;

    Ok(AdminDashboard {
        stats: admin_stats(db).await?,
        recent_users,
        recent_files: lectures::recent_files(db, recent).await?,
    })
}
