use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, DefaultBodyLimit, FromRef, FromRequest, Multipart, Path, Request, State},
    http::{header, StatusCode},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::extractors::{AdminUser, AuthUser};
use crate::auth::jwt::JwtKeys;
use crate::auth::password;
use crate::error::ApiError;
use crate::state::AppState;
use crate::storage;
use crate::users::dto::{
    validate_name, validate_password, LoginRequest, LoginResponse, NewUser, SignUpRequest,
    SignUpResponse, UserPatch, UserView,
};
use crate::users::model::{RoleSelector, User};
use crate::users::repo;

const MAX_UPLOAD_BYTES: usize = 1_000_000;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(sign_up))
        .route("/login", post(login))
        .route("/users/:id", get(get_one_user).put(update_user))
        .route("/:role", get(get_all_users))
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
}

#[instrument(skip(state, payload))]
pub async fn sign_up(
    State(state): State<AppState>,
    Json(payload): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<SignUpResponse>), ApiError> {
    let NewUser {
        email,
        password,
        name,
        role,
        profile_picture,
    } = payload.validate()?;

    // Courtesy check for a friendlier 409; the UNIQUE constraint below is
    // the authority when two signups race.
    if User::find_by_email(&state.db, &email).await?.is_some() {
        warn!(email = %email, "signup with taken email");
        return Err(ApiError::Conflict("Email already in use".into()));
    }

    let hash = password::hash_password(password)
        .await
        .map_err(ApiError::Internal)?;

    let user = match User::create(&state.db, &email, &hash, &name, role, &profile_picture).await {
        Ok(user) => user,
        Err(e) if repo::is_unique_violation(&e) => {
            warn!(email = %email, "signup lost uniqueness race");
            return Err(ApiError::Conflict(format!(
                "Duplicate key error: email {email}"
            )));
        }
        Err(e) => return Err(e.into()),
    };

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id, user.role).map_err(ApiError::Internal)?;

    info!(user_id = %user.id, email = %user.email, role = %user.role, "user signed up");
    Ok((StatusCode::CREATED, Json(SignUpResponse { user, token })))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    if !state.login_limiter.check(addr.ip()) {
        warn!(ip = %addr.ip(), "login rate limit exceeded");
        return Err(ApiError::RateLimited);
    }

    let (Some(email), Some(password)) = (payload.email, payload.password) else {
        return Err(ApiError::Validation("Email and password are required".into()));
    };
    let email = email.trim().to_lowercase();

    // Unknown email and wrong password produce the same response so the
    // endpoint cannot be used to enumerate accounts.
    let Some(user) = User::find_by_email(&state.db, &email).await? else {
        warn!(email = %email, "login with unknown email");
        return Err(ApiError::Unauthorized("Invalid email or password"));
    };

    let ok = password::verify_password(password, user.password_hash.clone())
        .await
        .map_err(ApiError::Internal)?;
    if !ok {
        warn!(user_id = %user.id, "login with wrong password");
        return Err(ApiError::Unauthorized("Invalid email or password"));
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id, user.role).map_err(ApiError::Internal)?;

    info!(user_id = %user.id, "user logged in");
    Ok(Json(LoginResponse {
        user: UserView::from(&user),
        token,
    }))
}

#[instrument(skip(state, _actor))]
pub async fn get_one_user(
    State(state): State<AppState>,
    AuthUser(_actor): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, ApiError> {
    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    Ok(Json(user))
}

#[instrument(skip(state, _actor))]
pub async fn get_all_users(
    State(state): State<AppState>,
    AdminUser(_actor): AdminUser,
    Path(segment): Path<String>,
) -> Result<Json<Vec<User>>, ApiError> {
    let selector = RoleSelector::from_segment(&segment);
    let users = User::list(&state.db, selector.filter()).await?;
    Ok(Json(users))
}

#[instrument(skip(state, actor, req))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    req: Request,
) -> Result<Json<User>, ApiError> {
    if actor.id != id && !actor.role.is_admin() {
        return Err(ApiError::Forbidden("Access denied"));
    }

    let patch = extract_patch(&state, req).await?;

    let mut user = User::find_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    if let Some(name) = patch.name {
        user.name = validate_name(&name)?;
    }
    if let Some(picture) = patch.profile_picture {
        user.profile_picture = picture;
    }
    if let Some(password) = patch.password {
        validate_password(&password)?;
        user.password_hash = password::hash_password(password)
            .await
            .map_err(ApiError::Internal)?;
    }

    let updated = user.update(&state.db).await?;
    info!(user_id = %updated.id, "user updated");
    Ok(Json(updated))
}

/// `PUT /users/:id` accepts either a JSON object of whitelisted fields or a
/// multipart form carrying the same fields plus the profile picture file.
async fn extract_patch(state: &AppState, req: Request) -> Result<UserPatch, ApiError> {
    let is_multipart = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("multipart/form-data"))
        .unwrap_or(false);

    if is_multipart {
        let multipart = Multipart::from_request(req, state)
            .await
            .map_err(|_| ApiError::Validation("Invalid updates".into()))?;
        patch_from_multipart(state, multipart).await
    } else {
        let Json(map) = Json::<serde_json::Map<String, Value>>::from_request(req, state)
            .await
            .map_err(|_| ApiError::Validation("Invalid updates".into()))?;
        UserPatch::from_json(map)
    }
}

async fn patch_from_multipart(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<UserPatch, ApiError> {
    let mut patch = UserPatch::default();
    let mut upload: Option<(String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::Validation("Invalid updates".into()))?
    {
        let Some(name) = field.name().map(|s| s.to_string()) else {
            return Err(ApiError::Validation("Invalid updates".into()));
        };

        if field.file_name().is_some() {
            if name != "profilePicture" {
                return Err(ApiError::Validation("Invalid updates".into()));
            }
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let content_type = field.content_type().unwrap_or("").to_string();
            if content_type != "image/jpeg" && content_type != "image/png" {
                return Err(ApiError::Validation(
                    "Please upload an image in JPG or PNG format".into(),
                ));
            }
            let data = field
                .bytes()
                .await
                .map_err(|_| ApiError::Validation("Upload too large".into()))?;
            if data.len() > MAX_UPLOAD_BYTES {
                return Err(ApiError::Validation("Upload too large".into()));
            }
            upload = Some((file_name, data));
        } else {
            let value = field
                .text()
                .await
                .map_err(|_| ApiError::Validation("Invalid updates".into()))?;
            patch.set(&name, value)?;
        }
    }

    // The stored upload path wins over any profilePicture text field sent
    // in the same request.
    if let Some((file_name, data)) = upload {
        let key = storage::unique_key(&file_name);
        let path = state
            .storage
            .put_object(&key, data)
            .await
            .map_err(ApiError::Internal)?;
        patch.profile_picture = Some(path);
    }

    Ok(patch)
}
