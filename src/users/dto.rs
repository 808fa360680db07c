use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiError;
use crate::users::model::{Role, User, DEFAULT_PROFILE_PICTURE};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < 6 {
        return Err(ApiError::Validation(
            "Password must be at least 6 characters long".into(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    let len = name.chars().count();
    if len < 3 {
        return Err(ApiError::Validation(
            "Name must be at least 3 characters long".into(),
        ));
    }
    if len > 50 {
        return Err(ApiError::Validation(
            "Name must be less than 50 characters".into(),
        ));
    }
    Ok(name.to_string())
}

/// Body of `POST /signup`. Fields arrive optional so the handler can answer
/// with the precise 400 instead of a deserializer rejection.
#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "profilePicture")]
    pub profile_picture: Option<String>,
}

/// Validated signup data, ready for hashing and insertion.
#[derive(Debug)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: Role,
    pub profile_picture: String,
}

impl SignUpRequest {
    pub fn validate(self) -> Result<NewUser, ApiError> {
        let (Some(email), Some(password), Some(role)) = (self.email, self.password, self.role)
        else {
            return Err(ApiError::Validation(
                "Email, password, and role are required".into(),
            ));
        };

        let role: Role = role
            .parse()
            .map_err(|_| ApiError::Validation("Invalid role".into()))?;

        let email = email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return Err(ApiError::Validation("Email is invalid".into()));
        }

        validate_password(&password)?;

        let name = self
            .name
            .ok_or_else(|| ApiError::Validation("Name is required".into()))?;
        let name = validate_name(&name)?;

        Ok(NewUser {
            email,
            password,
            name,
            role,
            profile_picture: self
                .profile_picture
                .unwrap_or_else(|| DEFAULT_PROFILE_PICTURE.into()),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Redacted user view returned by login.
#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SignUpResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserView,
    pub token: String,
}

/// Whitelisted partial update for `PUT /users/:id`. Any field outside
/// {name, password, profilePicture} rejects the whole payload.
#[derive(Debug, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub password: Option<String>,
    pub profile_picture: Option<String>,
}

impl UserPatch {
    pub fn from_json(map: serde_json::Map<String, Value>) -> Result<Self, ApiError> {
        let mut patch = UserPatch::default();
        for (key, value) in map {
            let Value::String(value) = value else {
                return Err(ApiError::Validation("Invalid updates".into()));
            };
            patch.set(&key, value)?;
        }
        Ok(patch)
    }

    pub fn set(&mut self, key: &str, value: String) -> Result<(), ApiError> {
        match key {
            "name" => self.name = Some(value),
            "password" => self.password = Some(value),
            "profilePicture" => self.profile_picture = Some(value),
            _ => return Err(ApiError::Validation("Invalid updates".into())),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request() -> SignUpRequest {
        SignUpRequest {
            email: Some("Alice@Example.COM ".into()),
            password: Some("secret6".into()),
            role: Some("USER".into()),
            name: Some("  Alice  ".into()),
            profile_picture: None,
        }
    }

    #[test]
    fn valid_signup_normalizes_email_and_name() {
        let new_user = base_request().validate().expect("valid");
        assert_eq!(new_user.email, "alice@example.com");
        assert_eq!(new_user.name, "Alice");
        assert_eq!(new_user.role, Role::User);
        assert_eq!(new_user.profile_picture, DEFAULT_PROFILE_PICTURE);
    }

    #[test]
    fn missing_required_fields_rejected() {
        for field in ["email", "password", "role"] {
            let mut req = base_request();
            match field {
                "email" => req.email = None,
                "password" => req.password = None,
                _ => req.role = None,
            }
            let err = req.validate().unwrap_err();
            assert_eq!(err.to_string(), "Email, password, and role are required");
        }
    }

    #[test]
    fn unknown_role_rejected() {
        let mut req = base_request();
        req.role = Some("ROOT".into());
        assert_eq!(req.validate().unwrap_err().to_string(), "Invalid role");
    }

    #[test]
    fn bad_email_rejected() {
        for email in ["not-an-email", "a@b", "a b@c.com", "@c.com"] {
            let mut req = base_request();
            req.email = Some(email.into());
            assert_eq!(req.validate().unwrap_err().to_string(), "Email is invalid");
        }
    }

    #[test]
    fn short_password_rejected() {
        let mut req = base_request();
        req.password = Some("12345".into());
        assert!(req.validate().is_err());
    }

    #[test]
    fn name_bounds_enforced() {
        let mut req = base_request();
        req.name = Some("ab".into());
        assert!(req.validate().is_err());

        let mut req = base_request();
        req.name = Some("x".repeat(51));
        assert!(req.validate().is_err());

        let mut req = base_request();
        req.name = Some("x".repeat(50));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn missing_name_rejected() {
        let mut req = base_request();
        req.name = None;
        assert_eq!(req.validate().unwrap_err().to_string(), "Name is required");
    }

    #[test]
    fn patch_accepts_only_whitelisted_fields() {
        let map = serde_json::from_str::<serde_json::Map<_, _>>(
            r#"{"name": "Bob", "password": "hunter2", "profilePicture": "pic.png"}"#,
        )
        .unwrap();
        let patch = UserPatch::from_json(map).expect("whitelisted");
        assert_eq!(patch.name.as_deref(), Some("Bob"));
        assert_eq!(patch.password.as_deref(), Some("hunter2"));
        assert_eq!(patch.profile_picture.as_deref(), Some("pic.png"));
    }

    #[test]
    fn patch_rejects_unlisted_field_even_with_valid_ones() {
        let map = serde_json::from_str::<serde_json::Map<_, _>>(
            r#"{"name": "Bob", "role": "ADMIN"}"#,
        )
        .unwrap();
        let err = UserPatch::from_json(map).unwrap_err();
        assert_eq!(err.to_string(), "Invalid updates");
    }

    #[test]
    fn patch_rejects_non_string_values() {
        let map =
            serde_json::from_str::<serde_json::Map<_, _>>(r#"{"name": 42}"#).unwrap();
        assert!(UserPatch::from_json(map).is_err());
    }
}
