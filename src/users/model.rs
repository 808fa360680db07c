use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef};
use sqlx::{FromRow, Postgres};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

pub const DEFAULT_PROFILE_PICTURE: &str = "default_profile_picture.png";

/// Access level, stored as TEXT in the `role` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Superadmin,
    Admin,
    User,
    Client,
}

#[derive(Debug, Error)]
#[error("invalid role: {0}")]
pub struct InvalidRole(String);

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Superadmin => "SUPERADMIN",
            Role::Admin => "ADMIN",
            Role::User => "USER",
            Role::Client => "CLIENT",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::Superadmin)
    }
}

impl FromStr for Role {
    type Err = InvalidRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUPERADMIN" => Ok(Role::Superadmin),
            "ADMIN" => Ok(Role::Admin),
            "USER" => Ok(Role::User),
            "CLIENT" => Ok(Role::Client),
            other => Err(InvalidRole(other.to_string())),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// The column is plain TEXT, so encoding/decoding delegates to &str.

impl sqlx::Type<Postgres> for Role {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <&str as sqlx::Type<Postgres>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, Postgres> for Role {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as sqlx::Encode<Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}

impl<'r> sqlx::Decode<'r, Postgres> for Role {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<Postgres>>::decode(value)?;
        Ok(s.parse::<Role>()?)
    }
}

/// User record. The password hash never serializes, so no response body can
/// leak it regardless of which handler built the response.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    #[serde(rename = "profilePicture")]
    pub profile_picture: String,
    pub created_at: OffsetDateTime,
}

/// Path segment of `GET /:role` mapped to a listing filter. Anything
/// unrecognized means "no filter", matching the original route's fallthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleSelector {
    All,
    User,
    Client,
    Admin,
}

impl RoleSelector {
    pub fn from_segment(segment: &str) -> Self {
        match segment {
            "users" => RoleSelector::User,
            "client" => RoleSelector::Client,
            "admin" => RoleSelector::Admin,
            _ => RoleSelector::All,
        }
    }

    pub fn filter(self) -> Option<Role> {
        match self {
            RoleSelector::All => None,
            RoleSelector::User => Some(Role::User),
            RoleSelector::Client => Some(Role::Client),
            RoleSelector::Admin => Some(Role::Admin),
        }
    }
}
