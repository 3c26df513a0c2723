pub mod client_ctx;
pub mod csrf;
pub mod role_guard;

pub use client_ctx::ClientCtx;
pub use role_guard::RoleGuard;
