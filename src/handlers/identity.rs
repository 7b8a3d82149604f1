//! handlers/identity.rs
//! Identidad del llamador, inyectada por el proxy del proveedor de identidad.

use actix_web::{dev::Payload, FromRequest, HttpRequest};
use futures::future::{ready, Ready};

use crate::errors::ServiceError;

pub const USER_ID_HEADER: &str = "X-User-Id";

#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub user_id: String,
}

impl FromRequest for CallerIdentity {
    type Error = ServiceError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let user_id = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        ready(match user_id {
            Some(user_id) => Ok(CallerIdentity { user_id }),
            None => Err(ServiceError::Unauthorized),
        })
    }
}
