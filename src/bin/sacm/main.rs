use actix_session::{config::PersistentSession, storage::CookieSessionStore, SessionMiddleware};
use actix_web::cookie::{time::Duration, Key, SameSite};
use actix_web::http::header;
use actix_web::http::StatusCode;
use actix_web::middleware::{DefaultHeaders, ErrorHandlers, Logger};
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use env_logger::Env;
use rand::{distributions::Alphanumeric, Rng};
use sacm::middleware::ClientCtx;
use sacm::permission::RolePermissions;
use sacm::storage::{LocalStorage, StorageBackend};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_lib_mods();
    sacm::app_config::init();

    let url = sacm::db::database_url().expect("DATABASE_URL or DB_NAME must be set.");
    let db = sacm::db::connect(&url)
        .await
        .expect("Failed to connect to the database.");
    sacm::db::create_schema(&db)
        .await
        .expect("Failed to create the database schema.");

    let permissions = Data::new(
        RolePermissions::load(&db)
            .await
            .expect("Permission matrix failed to load."),
    );

    let config = sacm::app_config::get_config();
    let storage: Arc<dyn StorageBackend> = Arc::new(
        LocalStorage::new(&config.storage.media_root).expect("Media root is not usable."),
    );
    let storage = Data::from(storage);

    let secret_key = match std::env::var("SECRET_KEY") {
        Ok(key) if key.len() >= 64 => Key::from(key.as_bytes()),
        other => {
            let random_string: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(128)
                .map(char::from)
                .collect();
            log::warn!("SECRET_KEY was invalid ({:?}).\r\nSession cookies will be invalidated every time the application is restarted. A secret key must be at least 64 bytes to be accepted.\r\n\r\nNeed a key? How about:\r\n{}", other.map(|k| format!("{} bytes", k.len())), random_string);
            Key::from(random_string.as_bytes())
        }
    };

    let db = Data::new(db);
    let session_ttl = Duration::days(i64::from(config.security.remember_me_days));
    let secure_cookies = config.security.secure_cookies;
    let media_root = config.storage.media_root.clone();

    log::info!("Listening on {}", config.site.bind_address);
    HttpServer::new(move || {
        // Order of middleware IS IMPORTANT and is in REVERSE EXECUTION ORDER.
        App::new()
            .app_data(db.clone())
            .app_data(permissions.clone())
            .app_data(storage.clone())
            .wrap(
                DefaultHeaders::new()
                    .add((header::X_FRAME_OPTIONS, "DENY"))
                    .add((header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
                    .add(("Referrer-Policy", "strict-origin-when-cross-origin")),
            )
            .wrap(
                ErrorHandlers::new()
                    .handler(StatusCode::BAD_REQUEST, sacm::web::error::render_400)
                    .handler(StatusCode::FORBIDDEN, sacm::web::error::render_403)
                    .handler(StatusCode::NOT_FOUND, sacm::web::error::render_404)
                    .handler(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        sacm::web::error::render_500,
                    ),
            )
            .wrap(ClientCtx::default())
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), secret_key.clone())
                    .cookie_same_site(SameSite::Lax)
                    .cookie_secure(secure_cookies)
                    .session_lifecycle(PersistentSession::default().session_ttl(session_ttl))
                    .build(),
            )
            .wrap(Logger::new("%a %r %s %Dms"))
            .service(actix_files::Files::new("/static", "./static"))
            .service(actix_files::Files::new("/media", media_root.clone()))
            .configure(sacm::web::configure)
    })
    .bind(config.site.bind_address.as_str())?
    .run()
    .await
}

/// Initialize third party crates we rely on but don't have control over.
pub fn init_lib_mods() {
    if let Err(e) = dotenv::dotenv() {
        eprintln!("No .env loaded: {}", e);
    }
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
}
