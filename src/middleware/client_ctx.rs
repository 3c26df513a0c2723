use crate::flash::FlashMessage;
use crate::orm::users::{self, Role};
use crate::permission::{Capabilities, RolePermissions};
use actix_session::Session;
use actix_web::dev::{
    self, Extensions, Payload, Service, ServiceRequest, ServiceResponse, Transform,
};
use actix_web::{web::Data, Error, FromRequest, HttpMessage, HttpRequest};
use futures::future::{err, ready, LocalBoxFuture, Ready};
use sea_orm::DatabaseConnection;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Client data stored for a single request cycle.
/// Distinct from ClientCtx because it is defined through request data.
#[derive(Clone, Debug)]
pub struct ClientCtxInner {
    /// User data. Optional. None is a guest user.
    pub client: Option<users::Model>,
    /// Role capability cache.
    pub permissions: Data<RolePermissions>,
    /// Randomly generated string for CSP.
    pub nonce: String,
    /// CSRF token for form protection
    pub csrf_token: String,
    /// Unread notifications addressed to the user
    pub unread_notifications: u64,
    /// Flash messages taken from the session for this page
    pub flashes: Vec<FlashMessage>,
    /// Time the request started for page load statistics.
    pub request_start: Instant,
}

impl Default for ClientCtxInner {
    fn default() -> Self {
        Self {
            permissions: Data::new(RolePermissions::default()),
            client: None,
            nonce: Self::nonce(),
            csrf_token: String::new(),
            unread_notifications: 0,
            flashes: Vec::new(),
            request_start: Instant::now(),
        }
    }
}

impl ClientCtxInner {
    pub async fn from_session(
        session: &Session,
        db: &DatabaseConnection,
        permissions: Data<RolePermissions>,
        take_flashes: bool,
    ) -> Self {
        use crate::middleware::csrf::get_or_create_csrf_token;
        use crate::session::authenticate_client_by_session;

        let client = authenticate_client_by_session(session, db).await;
        let csrf_token = get_or_create_csrf_token(session).unwrap_or_else(|_| String::new());

        let unread_notifications = match client {
            Some(ref user) => crate::notifications::count_unread_for_user(db, user)
                .await
                .unwrap_or_else(|e| {
                    log::error!("ClientCtx: unread notification count: {}", e);
                    0
                }),
            None => 0,
        };

        let flashes = if take_flashes {
            crate::flash::take(session)
        } else {
            Vec::new()
        };

        ClientCtxInner {
            client,
            permissions,
            csrf_token,
            unread_notifications,
            flashes,
            ..Default::default()
        }
    }

    /// Returns a hash unique to each request used for CSP.
    /// See: <https://developer.mozilla.org/en-US/docs/Web/HTML/Global_attributes/nonce>
    pub fn nonce() -> String {
        let mut hasher = blake3::Hasher::new();

        match std::env::var("SALT") {
            Ok(v) => hasher.update(v.as_bytes()),
            Err(_) => hasher.update("NO_SALT_FOR_NONCE".as_bytes()),
        };

        hasher.update(&rand::random::<[u8; 16]>());
        hasher.update(
            &chrono::Utc::now()
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .to_ne_bytes(),
        );
        hasher.finalize().to_string()
    }
}

/// Client context passed to routes.
/// Wraps ClientCtxInner, which is set at the beginning of the request.
#[derive(Clone, Debug)]
pub struct ClientCtx(Data<ClientCtxInner>);

impl Default for ClientCtx {
    fn default() -> Self {
        Self(Data::new(ClientCtxInner::default()))
    }
}

impl ClientCtx {
    /// Rebuilds the context after the session changed mid-request, e.g. on login.
    pub async fn from_session(
        session: &Session,
        db: &DatabaseConnection,
        permissions: Data<RolePermissions>,
    ) -> Self {
        Self(Data::new(
            ClientCtxInner::from_session(session, db, permissions, true).await,
        ))
    }

    pub fn get_or_default_from_extensions(
        extensions: &mut Extensions,
        permissions: Data<RolePermissions>,
    ) -> Self {
        match extensions.get::<Data<ClientCtxInner>>() {
            Some(cbox) => Self(cbox.clone()),
            None => {
                let cbox = Data::new(ClientCtxInner {
                    permissions,
                    ..Default::default()
                });
                extensions.insert(cbox.clone());
                Self(cbox)
            }
        }
    }

    /// Returns either the user's id or None.
    pub fn get_id(&self) -> Option<i32> {
        self.0.client.as_ref().map(|u| u.id)
    }

    /// Returns either the user's full name or the word for guest.
    pub fn get_name(&self) -> String {
        match &self.0.client {
            Some(user) => user.full_name(),
            None => crate::constants::GUEST_USERNAME.to_owned(),
        }
    }

    pub fn get_user(&self) -> Option<&users::Model> {
        self.0.client.as_ref()
    }

    pub fn get_role(&self) -> Option<Role> {
        self.0.client.as_ref().map(|u| u.role)
    }

    pub fn get_csrf_token(&self) -> &str {
        &self.0.csrf_token
    }

    pub fn get_unread_notifications(&self) -> u64 {
        self.0.unread_notifications
    }

    pub fn get_flashes(&self) -> &[FlashMessage] {
        &self.0.flashes
    }

    pub fn is_user(&self) -> bool {
        self.0.client.is_some()
    }

    pub fn is_student(&self) -> bool {
        self.get_role() == Some(Role::Student)
    }

    pub fn is_teacher(&self) -> bool {
        self.get_role() == Some(Role::Teacher)
    }

    pub fn is_admin(&self) -> bool {
        self.get_role() == Some(Role::Admin)
    }

    pub fn has_role(&self, roles: &[Role]) -> bool {
        self.get_role().map_or(false, |r| roles.contains(&r))
    }

    /// Capability check against the role matrix. Guests have none.
    pub fn can(&self, cap: Capabilities) -> bool {
        match self.get_role() {
            Some(role) => self.0.permissions.can(role, cap),
            None => false,
        }
    }

    pub fn get_nonce(&self) -> &String {
        &self.0.nonce
    }

    pub fn get_permissions(&self) -> &Data<RolePermissions> {
        &self.0.permissions
    }

    pub fn site_name(&self) -> String {
        crate::app_config::site().name
    }

    /// Returns Duration representing request time.
    pub fn request_time(&self) -> Duration {
        Instant::now() - self.0.request_start
    }

    /// Returns human readable representing request time.
    pub fn request_time_as_string(&self) -> String {
        let us = self.request_time().as_micros();
        if us > 5000 {
            format!("{}ms", us / 1000)
        } else {
            format!("{}μs", us)
        }
    }

    /// Require user to be logged in. Returns the user or ErrorUnauthorized.
    pub fn require_login(&self) -> Result<&users::Model, actix_web::Error> {
        self.get_user()
            .ok_or_else(|| actix_web::error::ErrorUnauthorized("Login required"))
    }

    /// Require one of `roles`. Returns the user, ErrorUnauthorized or ErrorForbidden.
    pub fn require_role(&self, roles: &[Role]) -> Result<&users::Model, actix_web::Error> {
        let user = self.require_login()?;
        if !roles.contains(&user.role) {
            return Err(actix_web::error::ErrorForbidden(
                "You do not have access to this page.",
            ));
        }
        Ok(user)
    }

    /// Require a capability. Returns () or ErrorForbidden.
    pub fn require_capability(&self, cap: Capabilities) -> Result<(), actix_web::Error> {
        if !self.can(cap) {
            return Err(actix_web::error::ErrorForbidden("Insufficient permissions"));
        }
        Ok(())
    }
}

/// This implementation is what actually provides the `client: ClientCtx` in the parameters of route functions.
impl FromRequest for ClientCtx {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        if let Some(perm_arc) = req.app_data::<Data<RolePermissions>>() {
            ready(Ok(ClientCtx::get_or_default_from_extensions(
                &mut req.extensions_mut(),
                perm_arc.clone(),
            )))
        } else {
            err(actix_web::error::ErrorServiceUnavailable(
                "Permission data is not loaded.",
            ))
        }
    }
}

/// Requests that render no page must not swallow pending flash messages.
fn consumes_flashes(req: &ServiceRequest) -> bool {
    let path = req.path();
    req.method() == actix_web::http::Method::GET
        && !path.starts_with("/api/")
        && !path.starts_with("/media/")
        && !path.ends_with("/download/")
}

impl<S: 'static, B> Transform<S, ServiceRequest> for ClientCtx
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = ClientCtxMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ClientCtxMiddleware {
            service: Rc::new(service),
        }))
    }
}

/// Client context middleware
pub struct ClientCtxMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for ClientCtxMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    dev::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();

        // Borrows of `req` must be done in a precise way to avoid conflicts. This order is important.
        let take_flashes = consumes_flashes(&req);
        let (httpreq, payload) = req.into_parts();
        let session = Session::extract(&httpreq).into_inner();
        let req = ServiceRequest::from_parts(httpreq, payload);

        Box::pin(async move {
            let perm_arc = req.app_data::<Data<RolePermissions>>().cloned();
            let db = req.app_data::<Data<DatabaseConnection>>().cloned();

            if let (Some(perm_arc), Some(db)) = (perm_arc, db) {
                match session {
                    Ok(session) => {
                        let inner = ClientCtxInner::from_session(
                            &session,
                            db.get_ref(),
                            perm_arc,
                            take_flashes,
                        )
                        .await;
                        req.extensions_mut().insert(Data::new(inner));
                    }
                    Err(err) => {
                        log::error!("Unable to extract Session data in middleware: {}", err);
                    }
                };
            };

            svc.call(req).await
        })
    }
}
