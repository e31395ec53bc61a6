use actix_web::{get, post, web, HttpRequest, HttpResponse};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::schemas::{normalize_username, Credentials, Registration, TokenResponse, User};
use crate::server::auth::{hash_password, is_valid_password, verify_password};
use crate::server::error::{ApiError, ApiResult};
use crate::server::store::UserDocument;
use crate::server::AppState;

#[post("/register")]
pub async fn register(
    state: web::Data<AppState>,
    json: web::Json<Registration>,
) -> ApiResult<HttpResponse> {
    let Registration {
        username,
        email,
        password,
    } = json.into_inner();
    let email = email.trim().to_string();
    if username.trim().is_empty() || email.is_empty() || password.is_empty() {
        return Err(ApiError::BadRequest(
            "Username, email, and password are mandatory.".to_string(),
        ));
    }
    if state.store.user_by_email(&email).await?.is_some() {
        return Err(ApiError::BadRequest("Email already registered.".to_string()));
    }
    let normalized = normalize_username(&username);
    if state.store.user_by_username(&normalized).await?.is_some() {
        return Err(ApiError::BadRequest("Username already taken.".to_string()));
    }
    if !is_valid_password(&password) {
        return Err(ApiError::BadRequest(
            "Password must be 6-16 characters, include at least 1 uppercase letter and 1 number."
                .to_string(),
        ));
    }

    let user = UserDocument {
        id: Uuid::new_v4().to_string(),
        email,
        username: normalized,
        name: Some(username.trim().to_string()),
        password_hash: hash_password(&password)?,
        created_at: Utc::now(),
    };
    state.store.insert_user(&user).await?;
    info!(username = %user.username, "user registered");

    let token = state.tokens.issue(&user.id)?;
    Ok(HttpResponse::Ok().json(TokenResponse { token }))
}

#[post("/login")]
pub async fn login(
    state: web::Data<AppState>,
    json: web::Json<Credentials>,
) -> ApiResult<HttpResponse> {
    let Credentials { email, password } = json.into_inner();
    if email.trim().is_empty() || password.is_empty() {
        return Err(ApiError::BadRequest("Email and password are mandatory.".to_string()));
    }
    let user = state.store.user_by_email(email.trim()).await?.ok_or_else(|| {
        ApiError::Unauthorized(
            "User not found. Check provided data again or SignUp if new.".to_string(),
        )
    })?;
    if !verify_password(&password, &user.password_hash) {
        return Err(ApiError::Unauthorized("Invalid password.".to_string()));
    }
    info!(username = %user.username, "user logged in");

    let token = state.tokens.issue(&user.id)?;
    Ok(HttpResponse::Ok().json(TokenResponse { token }))
}

#[get("/u")]
pub async fn current_user(
    request: HttpRequest,
    state: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    let user = super::current_user(&request, &state).await?;
    Ok(HttpResponse::Ok().json(User::from(&user)))
}
