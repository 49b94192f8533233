use std::future::{ready, Ready};

use actix_web::{dev::Payload, Error, FromRequest, HttpMessage, HttpRequest};

use crate::errors::BookingError;
use crate::middleware::auth::Claims;
use crate::models::account::UserRole;

#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: String,
    pub role: UserRole,
}

impl AuthenticatedUser {
    /// Recorded as `changed_by` on status history entries.
    pub fn actor(&self) -> Option<String> {
        Some(self.user_id.clone())
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        if let Some(claims) = req.extensions().get::<Claims>() {
            ready(Ok(AuthenticatedUser {
                user_id: claims.user_id.clone(),
                email: claims.sub.clone(),
                role: UserRole::from_claim(claims.role.as_deref()),
            }))
        } else {
            ready(Err(
                BookingError::Unauthorized("User not authenticated".to_string()).into(),
            ))
        }
    }
}
