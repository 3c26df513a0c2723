pub mod access;
pub mod accounts;
pub mod ai_content;
pub mod app_config;
pub mod catalog;
pub mod constants;
pub mod dashboard;
pub mod db;
pub mod enrollment;
pub mod error;
pub mod flash;
pub mod forms;
pub mod lectures;
pub mod middleware;
pub mod notifications;
pub mod orm;
pub mod permission;
pub mod seed;
pub mod session;
pub mod storage;
pub mod template;
pub mod web;

pub use error::AcademyError;
