/// Integration tests for routing, role guards and the login flow
mod common;
use serial_test::serial;

use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::cookie::{Cookie, Key};
use actix_web::dev::ServiceResponse;
use actix_web::http::{header, StatusCode};
use actix_web::web::Data;
use actix_web::{test, App};
use common::{database::*, fixtures::*};
use sacm::enrollment;
use sacm::lectures::{self, NewLectureFile};
use sacm::middleware::ClientCtx;
use sacm::orm::{lecture_files, users::Role};
use sacm::permission::{self, Capabilities};
use sacm::storage::{LocalStorage, StorageBackend};
use sea_orm::DatabaseConnection;
use std::path::Path;
use std::sync::Arc;

/// Same middleware order as the server binary, minus logging and error pages.
macro_rules! test_app {
    ($db:expr, $perms:expr, $media:expr) => {{
        let storage: Arc<dyn StorageBackend> =
            Arc::new(LocalStorage::new($media).expect("Failed to open media root"));
        test::init_service(
            App::new()
                .app_data($db.clone())
                .app_data($perms.clone())
                .app_data(Data::from(storage))
                .wrap(ClientCtx::default())
                .wrap(
                    SessionMiddleware::builder(CookieSessionStore::default(), Key::generate())
                        .cookie_secure(false)
                        .build(),
                )
                .configure(sacm::web::configure),
        )
        .await
    }};
}

fn session_cookie<B>(resp: &ServiceResponse<B>) -> Option<Cookie<'static>> {
    resp.response()
        .cookies()
        .find(|c| c.name() == "id")
        .map(|c| c.into_owned())
}

fn location<B>(resp: &ServiceResponse<B>) -> String {
    resp.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned()
}

/// Stores a 64 byte PDF in the course through the same media root the app uses.
async fn upload_notes(db: &DatabaseConnection, media: &Path, course_id: i32) -> lecture_files::Model {
    let storage = LocalStorage::new(media).expect("Failed to open media root");
    lectures::upload(
        db,
        &storage,
        NewLectureFile {
            title: "Week 1".to_owned(),
            description: None,
            chapter: None,
            course_id,
            file_type: None,
            uploaded_by_id: None,
            filename: "notes.pdf".to_owned(),
            data: (0u8..64).collect(),
        },
    )
    .await
    .expect("Upload should succeed")
}

async fn download_count(db: &DatabaseConnection, id: i32) -> i32 {
    lectures::find_file(db, id).await.unwrap().download_count
}

/// Pulls the hidden `csrf_token` value out of a rendered form.
fn csrf_from_body(body: &str) -> String {
    let marker = "name=\"csrf_token\" value=\"";
    let start = body.find(marker).expect("Form should carry a CSRF token") + marker.len();
    let end = body[start..].find('"').expect("Unterminated CSRF value");
    body[start..start + end].to_owned()
}

/// Logs in through the real form and returns the authenticated cookie.
macro_rules! login_as {
    ($app:expr, $username:expr) => {{
        let resp = test::call_service(&$app, test::TestRequest::get().uri("/login/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = session_cookie(&resp).expect("Login page should start a session");
        let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
        let token = csrf_from_body(&body);

        let resp = test::call_service(
            &$app,
            test::TestRequest::post()
                .uri("/login/")
                .cookie(cookie)
                .set_form(&[
                    ("username", $username),
                    ("password", TEST_PASSWORD),
                    ("csrf_token", token.as_str()),
                ])
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER, "Login should redirect");
        assert_eq!(location(&resp), "/dashboard/");
        session_cookie(&resp).expect("Login should refresh the session cookie")
    }};
}

#[actix_rt::test]
#[serial]
async fn test_guest_redirected_to_login() {
    let (db, perms) = setup_with_permissions().await.unwrap();
    let (db, perms) = (Data::new(db), Data::new(perms));
    let media = tempfile::tempdir().unwrap();
    let app = test_app!(db, perms, media.path());

    let resp = test::call_service(&app, test::TestRequest::get().uri("/admin/users/").to_request()).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/login/?next=%2Fadmin%2Fusers%2F");

    let resp = test::call_service(&app, test::TestRequest::get().uri("/dashboard/").to_request()).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert!(location(&resp).starts_with("/login/"));
}

#[actix_rt::test]
#[serial]
async fn test_student_forbidden_from_admin() {
    let (db, perms) = setup_with_permissions().await.unwrap();
    create_test_student(&db, "web_student").await.unwrap();
    let (db, perms) = (Data::new(db), Data::new(perms));
    let media = tempfile::tempdir().unwrap();
    let app = test_app!(db, perms, media.path());

    let cookie = login_as!(app, "web_student");

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/admin/")
            .cookie(cookie.clone())
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/dashboard/")
            .cookie(cookie)
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_rt::test]
#[serial]
async fn test_admin_reaches_admin_pages() {
    let (db, perms) = setup_with_permissions().await.unwrap();
    create_test_admin(&db, "web_admin").await.unwrap();
    let (db, perms) = (Data::new(db), Data::new(perms));
    let media = tempfile::tempdir().unwrap();
    let app = test_app!(db, perms, media.path());

    let cookie = login_as!(app, "web_admin");

    for uri in ["/admin/", "/admin/users/", "/admin/departments/", "/admin/permissions/"] {
        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri(uri).cookie(cookie.clone()).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK, "{} should render for an admin", uri);
    }
}

#[actix_rt::test]
#[serial]
async fn test_login_rejects_missing_csrf() {
    let (db, perms) = setup_with_permissions().await.unwrap();
    create_test_student(&db, "web_csrf").await.unwrap();
    let (db, perms) = (Data::new(db), Data::new(perms));
    let media = tempfile::tempdir().unwrap();
    let app = test_app!(db, perms, media.path());

    let resp = test::call_service(&app, test::TestRequest::get().uri("/login/").to_request()).await;
    let cookie = session_cookie(&resp).unwrap();

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/login/")
            .cookie(cookie)
            .set_form(&[
                ("username", "web_csrf"),
                ("password", TEST_PASSWORD),
                ("csrf_token", "forged"),
            ])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_rt::test]
#[serial]
async fn test_bad_password_rerenders_form() {
    let (db, perms) = setup_with_permissions().await.unwrap();
    create_test_student(&db, "web_badpw").await.unwrap();
    let (db, perms) = (Data::new(db), Data::new(perms));
    let media = tempfile::tempdir().unwrap();
    let app = test_app!(db, perms, media.path());

    let resp = test::call_service(&app, test::TestRequest::get().uri("/login/").to_request()).await;
    let cookie = session_cookie(&resp).unwrap();
    let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    let token = csrf_from_body(&body);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/login/")
            .cookie(cookie)
            .set_form(&[
                ("username", "web_badpw"),
                ("password", "nope-nope-nope"),
                ("csrf_token", token.as_str()),
            ])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(body.contains("Invalid username or password."));
}

#[actix_rt::test]
#[serial]
async fn test_api_specializations() {
    let (db, perms) = setup_with_permissions().await.unwrap();
    let dep = create_test_department(&db, "Information Technology").await.unwrap();
    let spec = create_test_specialization(&db, "Databases", dep.id).await.unwrap();
    let (db, perms) = (Data::new(db), Data::new(perms));
    let media = tempfile::tempdir().unwrap();
    let app = test_app!(db, perms, media.path());

    let uri = format!("/api/specializations/?department_id={}", dep.id);
    let items: serde_json::Value =
        test::call_and_read_body_json(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    assert_eq!(items, serde_json::json!([{ "id": spec.id, "name": "Databases" }]));

    // Malformed or missing ids yield an empty list, not an error
    for uri in ["/api/specializations/?department_id=abc", "/api/specializations/"] {
        let items: serde_json::Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(items, serde_json::json!([]));
    }
}

#[actix_rt::test]
#[serial]
async fn test_revoked_capability_blocks_course_teacher() {
    let (db, perms) = setup_with_permissions().await.unwrap();
    let teacher = create_test_teacher(&db, "web_teacher").await.unwrap();
    let cat = create_test_catalog(&db, Some(teacher.id)).await.unwrap();
    let (db, perms) = (Data::new(db), Data::new(perms));
    let media = tempfile::tempdir().unwrap();
    let app = test_app!(db, perms, media.path());

    let cookie = login_as!(app, "web_teacher");
    let uri = format!("/courses/{}/upload/", cat.course.id);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri(&uri).cookie(cookie.clone()).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let remaining = Capabilities::defaults_for(Role::Teacher) - Capabilities::UPLOAD_FILES;
    permission::update_role(&db, &perms, Role::Teacher, remaining)
        .await
        .unwrap();

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri(&uri).cookie(cookie).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_rt::test]
#[serial]
async fn test_download_requires_enrollment() {
    let (db, perms) = setup_with_permissions().await.unwrap();
    let cat = create_test_catalog(&db, None).await.unwrap();
    let enrolled = create_test_student(&db, "web_enrolled").await.unwrap();
    create_test_student(&db, "web_outsider").await.unwrap();
    enrollment::enroll(&db, enrolled.id, cat.course.id).await.unwrap();
    let media = tempfile::tempdir().unwrap();
    let file = upload_notes(&db, media.path(), cat.course.id).await;
    let (db, perms) = (Data::new(db), Data::new(perms));
    let app = test_app!(db, perms, media.path());
    let uri = format!("/files/{}/download/", file.id);

    let cookie = login_as!(app, "web_outsider");
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri(&uri).cookie(cookie).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let cookie = login_as!(app, "web_enrolled");
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri(&uri).cookie(cookie).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(test::read_body(resp).await.len(), 64);
}

#[actix_rt::test]
#[serial]
async fn test_download_count_ignores_resumed_ranges() {
    let (db, perms) = setup_with_permissions().await.unwrap();
    let cat = create_test_catalog(&db, None).await.unwrap();
    let student = create_test_student(&db, "web_downloader").await.unwrap();
    enrollment::enroll(&db, student.id, cat.course.id).await.unwrap();
    let media = tempfile::tempdir().unwrap();
    let file = upload_notes(&db, media.path(), cat.course.id).await;
    let (db, perms) = (Data::new(db), Data::new(perms));
    let app = test_app!(db, perms, media.path());
    let uri = format!("/files/{}/download/", file.id);
    let cookie = login_as!(app, "web_downloader");

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri(&uri).cookie(cookie.clone()).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(download_count(&db, file.id).await, 1);

    // Resuming part way through is the same download
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&uri)
            .cookie(cookie.clone())
            .insert_header((header::RANGE, "bytes=32-63"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(test::read_body(resp).await.len(), 32);
    assert_eq!(download_count(&db, file.id).await, 1);

    // Media players open with a range from zero
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&uri)
            .cookie(cookie)
            .insert_header((header::RANGE, "bytes=0-"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(download_count(&db, file.id).await, 2);
}
