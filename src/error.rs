//! Domain error type shared by the data access modules.

use crate::storage::StorageError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use sea_orm::DbErr;

#[derive(Debug)]
pub enum AcademyError {
    /// Unexpected database failure.
    Db(DbErr),
    /// A unique value is already taken. Carries the field name.
    Duplicate(&'static str),
    /// Referenced row does not exist. Carries the entity name.
    NotFound(&'static str),
    /// Input rejected by a business rule.
    Invalid(String),
    Storage(StorageError),
}

impl AcademyError {
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        AcademyError::Invalid(msg.into())
    }

    /// Maps a unique constraint failure onto `Duplicate(field)`.
    pub fn unique_or_db(err: DbErr, field: &'static str) -> Self {
        if crate::db::is_unique_violation(&err) {
            AcademyError::Duplicate(field)
        } else {
            AcademyError::Db(err)
        }
    }

    /// Like `unique_or_db` for tables with several unique columns. The
    /// field is taken from the constraint named in the error; the first
    /// entry is the fallback.
    pub fn unique_among(err: DbErr, fields: &[&'static str]) -> Self {
        if !crate::db::is_unique_violation(&err) {
            return AcademyError::Db(err);
        }
        let msg = err.to_string();
        let field = fields
            .iter()
            .copied()
            .find(|f| msg.contains(f))
            .or_else(|| fields.first().copied())
            .unwrap_or("value");
        AcademyError::Duplicate(field)
    }
}

impl std::fmt::Display for AcademyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcademyError::Db(e) => write!(f, "Database error: {}", e),
            AcademyError::Duplicate(field) => write!(f, "A record with this {} already exists.", field),
            AcademyError::NotFound(entity) => write!(f, "{} not found.", entity),
            AcademyError::Invalid(msg) => f.write_str(msg),
            AcademyError::Storage(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for AcademyError {}

impl From<DbErr> for AcademyError {
    fn from(e: DbErr) -> Self {
        AcademyError::Db(e)
    }
}

impl From<StorageError> for AcademyError {
    fn from(e: StorageError) -> Self {
        AcademyError::Storage(e)
    }
}

impl ResponseError for AcademyError {
    fn status_code(&self) -> StatusCode {
        match self {
            AcademyError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AcademyError::Duplicate(_) => StatusCode::CONFLICT,
            AcademyError::NotFound(_) => StatusCode::NOT_FOUND,
            AcademyError::Invalid(_) => StatusCode::BAD_REQUEST,
            AcademyError::Storage(StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            AcademyError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = if status.is_server_error() {
            log::error!("{}", self);
            "Internal server error.".to_owned()
        } else {
            self.to_string()
        };
        HttpResponse::build(status)
            .content_type("text/plain; charset=utf-8")
            .body(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AcademyError::Duplicate("code").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AcademyError::NotFound("Course").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AcademyError::invalid("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AcademyError::Db(DbErr::Custom("boom".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_unique_violation_maps_to_duplicate() {
        let err = DbErr::Exec("UNIQUE constraint failed: courses.code".into());
        assert!(matches!(
            AcademyError::unique_or_db(err, "code"),
            AcademyError::Duplicate("code")
        ));
        let err = DbErr::Exec("disk I/O error".into());
        assert!(matches!(
            AcademyError::unique_or_db(err, "code"),
            AcademyError::Db(_)
        ));
    }

    #[test]
    fn test_unique_violation_names_the_column() {
        let fields = ["username", "academic_id"];
        let err = DbErr::Exec("UNIQUE constraint failed: users.academic_id".into());
        assert!(matches!(
            AcademyError::unique_among(err, &fields),
            AcademyError::Duplicate("academic_id")
        ));
        let err = DbErr::Query(
            "duplicate key value violates unique constraint \"users_username_key\"".into(),
        );
        assert!(matches!(
            AcademyError::unique_among(err, &fields),
            AcademyError::Duplicate("username")
        ));
        let err = DbErr::Exec("UNIQUE constraint failed: idx_unnamed".into());
        assert!(matches!(
            AcademyError::unique_among(err, &fields),
            AcademyError::Duplicate("username")
        ));
        let err = DbErr::Conn("refused".into());
        assert!(matches!(
            AcademyError::unique_among(err, &fields),
            AcademyError::Db(_)
        ));
    }
}
