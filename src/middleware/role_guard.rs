//! Route-scope guard allowing only some roles through.
//!
//! Must run inside `ClientCtx`, which resolves the user. Guests are sent to
//! the login page with `next` set to the requested path. Logged in users with
//! the wrong role get 403.

use super::client_ctx::ClientCtxInner;
use crate::orm::users::Role;
use actix_session::SessionExt;
use actix_web::body::EitherBody;
use actix_web::dev::{self, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header;
use actix_web::web::Data;
use actix_web::{error, Error, HttpMessage, HttpResponse};
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;

#[derive(Clone, Debug)]
pub struct RoleGuard {
    /// None admits any authenticated user.
    allowed: Option<Rc<[Role]>>,
}

impl RoleGuard {
    pub fn any_of(roles: &[Role]) -> Self {
        Self {
            allowed: Some(Rc::from(roles)),
        }
    }

    pub fn authenticated() -> Self {
        Self { allowed: None }
    }

    pub fn student_only() -> Self {
        Self::any_of(&[Role::Student])
    }

    pub fn teacher_only() -> Self {
        Self::any_of(&[Role::Teacher])
    }

    pub fn admin_only() -> Self {
        Self::any_of(&[Role::Admin])
    }

    pub fn teacher_or_admin() -> Self {
        Self::any_of(&[Role::Teacher, Role::Admin])
    }

    fn admits(&self, role: Role) -> bool {
        match &self.allowed {
            Some(roles) => roles.contains(&role),
            None => true,
        }
    }
}

/// `/login/?next=<path and query>`
pub fn login_redirect_location(path_and_query: &str) -> String {
    let next: String = url::form_urlencoded::byte_serialize(path_and_query.as_bytes()).collect();
    format!("/login/?next={}", next)
}

impl<S, B> Transform<S, ServiceRequest> for RoleGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RoleGuardMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RoleGuardMiddleware {
            service: Rc::new(service),
            guard: self.clone(),
        }))
    }
}

pub struct RoleGuardMiddleware<S> {
    service: Rc<S>,
    guard: RoleGuard,
}

enum Verdict {
    Allow,
    Login,
    Forbidden,
}

impl<S, B> Service<ServiceRequest> for RoleGuardMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    dev::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let role = req
            .extensions()
            .get::<Data<ClientCtxInner>>()
            .and_then(|ctx| ctx.client.as_ref().map(|u| u.role));

        let verdict = match role {
            None => Verdict::Login,
            Some(role) if self.guard.admits(role) => Verdict::Allow,
            Some(_) => Verdict::Forbidden,
        };

        match verdict {
            Verdict::Allow => {
                let fut = self.service.call(req);
                Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
            }
            Verdict::Login => {
                let target = req
                    .uri()
                    .path_and_query()
                    .map(|pq| pq.as_str().to_owned())
                    .unwrap_or_else(|| req.path().to_owned());
                crate::flash::warning(&req.get_session(), "Please log in to view this page.");

                let response = HttpResponse::Found()
                    .append_header((header::LOCATION, login_redirect_location(&target)))
                    .finish();
                Box::pin(async move { Ok(req.into_response(response).map_into_right_body()) })
            }
            Verdict::Forbidden => {
                log::info!("RoleGuard: role {:?} refused for {}", role, req.path());
                let response =
                    req.error_response(error::ErrorForbidden("You do not have access to this page."));
                Box::pin(async move { Ok(response.map_into_right_body()) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_redirect_encodes_next() {
        assert_eq!(
            login_redirect_location("/admin/courses/?q=net"),
            "/login/?next=%2Fadmin%2Fcourses%2F%3Fq%3Dnet"
        );
    }

    #[test]
    fn test_admits() {
        assert!(RoleGuard::teacher_or_admin().admits(Role::Admin));
        assert!(!RoleGuard::teacher_or_admin().admits(Role::Student));
        assert!(RoleGuard::authenticated().admits(Role::Student));
        assert!(!RoleGuard::admin_only().admits(Role::Teacher));
    }
}
