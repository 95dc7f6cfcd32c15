use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

use crate::errors::ServiceError;

/// Username of the acting operator, set by the upstream access-control layer.
pub const ACTOR_HEADER: &str = "x-actor";
/// Role of the acting operator; `admin` selects the admin audit fields.
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

const ADMIN_ROLE: &str = "admin";

/// The operator performing a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub username: String,
    pub is_admin: bool,
}

impl Actor {
    pub fn new(username: impl Into<String>, is_admin: bool) -> Self {
        Self {
            username: username.into(),
            is_admin,
        }
    }

    pub fn branch(username: impl Into<String>) -> Self {
        Self::new(username, false)
    }

    pub fn admin(username: impl Into<String>) -> Self {
        Self::new(username, true)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let username = parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ServiceError::validation(ACTOR_HEADER, "acting user is required"))?;

        let is_admin = parts
            .headers
            .get(ACTOR_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|role| role.trim().eq_ignore_ascii_case(ADMIN_ROLE))
            .unwrap_or(false);

        Ok(Actor::new(username, is_admin))
    }
}
