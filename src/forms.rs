//! Shared form plumbing: error collection, field formats and multipart reading.

use crate::error::AcademyError;
use actix_multipart::Multipart;
use actix_web::{error, Error};
use futures::{StreamExt, TryStreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use validator::ValidationErrors;

pub static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w.@+-]{1,150}$").unwrap());
pub static ACADEMIC_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9-]{3,20}$").unwrap());
pub static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[0-9][0-9 -]{5,14}$").unwrap());

/// Field and non-field errors for re-rendering a form.
#[derive(Clone, Debug, Default)]
pub struct FormErrors {
    fields: BTreeMap<String, Vec<String>>,
    non_field: Vec<String>,
}

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<S: Into<String>>(&mut self, field: &str, message: S) {
        self.fields
            .entry(field.to_owned())
            .or_default()
            .push(message.into());
    }

    pub fn add_non_field<S: Into<String>>(&mut self, message: S) {
        self.non_field.push(message.into());
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has(&self, field: &str) -> bool {
        !self.get(field).is_empty()
    }

    pub fn non_field(&self) -> &[String] {
        &self.non_field
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.non_field.is_empty()
    }

    pub fn from_validation(errs: &ValidationErrors) -> Self {
        let mut out = Self::new();
        out.merge_validation(errs);
        out
    }

    pub fn merge_validation(&mut self, errs: &ValidationErrors) {
        for (field, list) in errs.field_errors() {
            for e in list {
                let msg = match &e.message {
                    Some(m) => m.to_string(),
                    None => format!("Invalid value ({}).", e.code),
                };
                self.add(field, msg);
            }
        }
    }

    /// Converts a domain error into form errors. Errors that are not the
    /// user's fault are handed back.
    pub fn absorb(&mut self, err: AcademyError) -> Result<(), AcademyError> {
        match err {
            AcademyError::Duplicate(field) => {
                self.add(field, format!("This {} is already in use.", field.replace('_', " ")));
                Ok(())
            }
            AcademyError::Invalid(msg) => {
                self.add_non_field(msg);
                Ok(())
            }
            AcademyError::NotFound(entity) => {
                self.add_non_field(format!("{} does not exist.", entity));
                Ok(())
            }
            other => Err(other),
        }
    }
}

/// Empty strings from optional inputs become None.
pub fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Parses an optional select box value. Empty and malformed values are None.
pub fn parse_id(value: Option<&str>) -> Option<i32> {
    value.and_then(|v| v.trim().parse().ok())
}

/// Parses an `<input type="datetime-local">` value.
pub fn parse_datetime_local(value: Option<&str>) -> Option<chrono::NaiveDateTime> {
    let value = value?.trim();
    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

/// One `<option>` of a select box.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

/// Options for an id-valued select box.
pub fn id_options<I>(items: I, selected: Option<i32>) -> Vec<SelectOption>
where
    I: IntoIterator<Item = (i32, String)>,
{
    items
        .into_iter()
        .map(|(id, label)| SelectOption {
            value: id.to_string(),
            label,
            selected: selected == Some(id),
        })
        .collect()
}

/// Options for a select box over string keys, e.g. enum values.
pub fn str_options<'a, I>(items: I, selected: &str) -> Vec<SelectOption>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    items
        .into_iter()
        .map(|(value, label)| SelectOption {
            value: value.to_owned(),
            label: label.to_owned(),
            selected: value == selected,
        })
        .collect()
}

/// Level 1..4 choices.
pub fn level_options(selected: Option<i32>) -> Vec<SelectOption> {
    id_options(
        crate::constants::LEVELS
            .iter()
            .map(|l| (*l, crate::constants::level_label(Some(*l)).to_owned())),
        selected,
    )
}

pub struct UploadedFile {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Text fields and files of a multipart submission.
#[derive(Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, UploadedFile>,
}

impl MultipartForm {
    /// Trimmed text value; None when missing or blank.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }
}

/// Reads the whole submission into memory. A file larger than
/// `max_file_bytes` aborts with 413. File inputs left empty are skipped.
pub async fn read_multipart(
    mut payload: Multipart,
    max_file_bytes: usize,
) -> Result<MultipartForm, Error> {
    let mut form = MultipartForm::default();

    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        log::debug!("read_multipart: {}", e);
        error::ErrorBadRequest("Error interpreting user input.")
    })? {
        let disposition = field.content_disposition();
        let name = match disposition.get_name() {
            Some(name) => name.to_owned(),
            None => continue,
        };
        let filename = disposition.get_filename().map(str::to_owned);

        let limit = if filename.is_some() {
            max_file_bytes
        } else {
            64 * 1024
        };

        let mut buf: Vec<u8> = Vec::new();
        while let Some(chunk) = field.next().await {
            let bytes = chunk.map_err(|e| {
                log::debug!("read_multipart: chunk error: {}", e);
                error::ErrorBadRequest("Error interpreting user input.")
            })?;
            if buf.len() + bytes.len() > limit {
                return Err(error::ErrorPayloadTooLarge("Upload is too large."));
            }
            buf.extend_from_slice(&bytes);
        }

        match filename {
            Some(filename) if !filename.is_empty() => {
                form.files.insert(name, UploadedFile { filename, data: buf });
            }
            Some(_) => {}
            None => {
                let value = String::from_utf8(buf)
                    .map_err(|_| error::ErrorBadRequest("Form fields must be UTF-8."))?;
                form.fields.insert(name, value);
            }
        }
    }

    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_options_marks_selection() {
        let opts = id_options(vec![(1, "IT".to_owned()), (2, "CS".to_owned())], Some(2));
        assert!(!opts[0].selected);
        assert!(opts[1].selected);
        assert_eq!(opts[1].value, "2");
        assert_eq!(level_options(None).len(), 4);
    }

    #[test]
    fn test_parse_datetime_local() {
        let dt = parse_datetime_local(Some("2025-11-02T08:30")).unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M").to_string(), "2025-11-02 08:30");
        assert!(parse_datetime_local(Some("")).is_none());
        assert!(parse_datetime_local(None).is_none());
    }

    #[test]
    fn test_formats() {
        assert!(USERNAME_RE.is_match("s.ali+1@uni"));
        assert!(!USERNAME_RE.is_match("has space"));
        assert!(ACADEMIC_ID_RE.is_match("2024-IT-001"));
        assert!(!ACADEMIC_ID_RE.is_match("ab"));
        assert!(PHONE_RE.is_match("+967 777 123 456"));
        assert!(!PHONE_RE.is_match("call me"));
    }

    #[test]
    fn test_absorb_domain_errors() {
        let mut errors = FormErrors::new();
        errors.absorb(AcademyError::Duplicate("academic_id")).unwrap();
        errors.absorb(AcademyError::invalid("Passwords do not match.")).unwrap();
        assert_eq!(errors.get("academic_id"), ["This academic id is already in use."]);
        assert_eq!(errors.non_field(), ["Passwords do not match."]);
        assert!(errors
            .absorb(AcademyError::Db(sea_orm::DbErr::Custom("x".into())))
            .is_err());
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_id(Some(" 4 ")), Some(4));
        assert_eq!(parse_id(Some("")), None);
        assert_eq!(parse_id(None), None);
        assert_eq!(non_empty(&Some("  ".into())), None);
        assert_eq!(non_empty(&Some(" x ".into())), Some("x".into()));
    }
}
