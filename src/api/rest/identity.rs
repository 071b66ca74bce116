//! Pre-validated caller identity. Authentication happens upstream; the
//! gateway forwards the verified id and role as headers.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;

pub const CALLER_ID_HEADER: &str = "x-caller-id";
pub const CALLER_ROLE_HEADER: &str = "x-caller-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Passenger,
    Driver,
    Admin,
}

impl Role {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "passenger" => Some(Role::Passenger),
            "driver" => Some(Role::Driver),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn require(&self, role: Role) -> Result<Uuid, AppError> {
        if self.role == role {
            Ok(self.id)
        } else {
            Err(AppError::Permission(format!(
                "{role:?} role required for this action"
            )))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| AppError::Unauthenticated(format!("missing {name} header")))
        };

        let id = header(CALLER_ID_HEADER)?
            .parse::<Uuid>()
            .map_err(|err| AppError::Unauthenticated(format!("invalid caller id: {err}")))?;
        let role = Role::parse(&header(CALLER_ROLE_HEADER)?)
            .ok_or_else(|| AppError::Unauthenticated("unknown caller role".to_string()))?;

        Ok(Caller { id, role })
    }
}
