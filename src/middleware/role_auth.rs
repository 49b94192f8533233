use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use log::warn;

use crate::errors::BookingError;
use crate::middleware::auth::Claims;
use crate::models::account::UserRole;

/// Must sit inside [`crate::middleware::auth::AuthMiddleware`], which puts
/// the claims on the request.
pub struct RequireRole {
    required_role: UserRole,
}

impl RequireRole {
    pub fn new(role: UserRole) -> Self {
        RequireRole {
            required_role: role,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireRole
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RequireRoleService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequireRoleService {
            service,
            required_role: self.required_role.clone(),
        }))
    }
}

pub struct RequireRoleService<S> {
    service: S,
    required_role: UserRole,
}

impl<S, B> Service<ServiceRequest> for RequireRoleService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let claims = req.extensions().get::<Claims>().cloned();

        let Some(claims) = claims else {
            return Box::pin(ready(Err(
                BookingError::Unauthorized("No authorization".to_string()).into()
            )));
        };

        let user_role = UserRole::from_claim(claims.role.as_deref());
        if user_role == self.required_role || user_role == UserRole::Admin {
            return Box::pin(self.service.call(req));
        }

        warn!(
            "User {} denied {} {}: requires {} role",
            claims.user_id,
            req.method(),
            req.path(),
            self.required_role.as_str()
        );
        Box::pin(ready(Err(BookingError::Forbidden(
            "Insufficient permissions".to_string(),
        )
        .into())))
    }
}
