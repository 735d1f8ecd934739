use crate::errors::{AppError, AppResult};
use crate::handlers::auth::{AuthUser, TokenService};
use crate::handlers::password::{hash_password, verify_password};
use crate::handlers::user_store::{NewUser, UserChanges, UserStore};
use crate::middleware::auth_middleware::{
    AuthMiddleware, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE,
};
use crate::models::all_models::{UserResponse, UserRole};
use actix_web::{
    cookie::{time, Cookie},
    web, HttpResponse,
};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;

const MIN_PASSWORD_LEN: usize = 6;

//Register Request
#[derive(Deserialize, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: UserRole,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub company_name: Option<String>,
}

//Login Request
#[derive(Deserialize, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

//Login Response
#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserResponse,
    pub message: String,
}

//Settings Request
#[derive(Deserialize, Serialize, Default)]
pub struct SettingsRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub password: Option<String>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> AppResult<()> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(AppError::bad_request("A valid email address is required")),
    }
}

fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

// Blank strings in a partial update mean "leave unchanged".
fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn token_cookie(name: &'static str, value: String, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build(name, value)
        .path("/")
        .http_only(true)
        .max_age(time::Duration::seconds(max_age_secs))
        .finish()
}

//Register
//Register Input: RegisterRequest
//Register Output: 201 message
pub async fn register(
    store: web::Data<dyn UserStore>,
    payload: web::Json<RegisterRequest>,
) -> AppResult<HttpResponse> {
    let payload = payload.into_inner();
    let email = normalize_email(&payload.email);

    if payload.name.trim().is_empty() {
        return Err(AppError::bad_request("Name cannot be empty"));
    }
    validate_email(&email)?;
    validate_password(&payload.password)?;

    // Best-effort pre-check; the unique index on users.email settles races.
    if store.find_by_email(&email).await?.is_some() {
        return Err(AppError::conflict("Email already registered"));
    }

    let password_hash = hash_password(&payload.password)?;

    let user = store
        .insert(NewUser {
            name: payload.name.trim().to_string(),
            email,
            password_hash,
            role: payload.role,
            phone: non_blank(payload.phone),
            address: non_blank(payload.address),
            company_name: non_blank(payload.company_name),
        })
        .await?;

    info!("Registered user {} with role {}", user.user_id, user.role);
    Ok(HttpResponse::Created().json(json!({ "message": "User created successfully" })))
}

//Login
//Login Input: LoginRequest
//Login Output: LoginResponse
pub async fn login(
    store: web::Data<dyn UserStore>,
    tokens: web::Data<TokenService>,
    payload: web::Json<LoginRequest>,
) -> AppResult<HttpResponse> {
    let email = normalize_email(&payload.email);

    let invalid = || AppError::unauthorized("Invalid credentials");

    let user = store.find_by_email(&email).await?.ok_or_else(invalid)?;
    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(invalid());
    }

    let pair = tokens.issue(user.user_id, &user.name, &user.email, user.role)?;

    let access_cookie = token_cookie(
        ACCESS_TOKEN_COOKIE,
        pair.access_token.clone(),
        tokens.access_ttl().num_seconds(),
    );
    let refresh_cookie = token_cookie(
        REFRESH_TOKEN_COOKIE,
        pair.refresh_token.clone(),
        tokens.refresh_ttl().num_seconds(),
    );

    info!("User {} logged in", user.user_id);
    Ok(HttpResponse::Ok()
        .cookie(access_cookie)
        .cookie(refresh_cookie)
        .json(LoginResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            user: UserResponse::from(&user),
            message: "Login successful".to_string(),
        }))
}

// Logout endpoint
pub async fn logout() -> HttpResponse {
    let mut access = token_cookie(ACCESS_TOKEN_COOKIE, String::new(), 0);
    access.make_removal();
    let mut refresh = token_cookie(REFRESH_TOKEN_COOKIE, String::new(), 0);
    refresh.make_removal();

    HttpResponse::Ok()
        .cookie(access)
        .cookie(refresh)
        .json(json!({ "message": "Logged out successfully" }))
}

//Current User
//Current User Output: identity carried by the access token
pub async fn current_user(user: AuthUser) -> HttpResponse {
    HttpResponse::Ok().json(user)
}

//Update Settings
//Update Settings Input: HttpRequest(JWT Token), SettingsRequest
//Update Settings Output: message
pub async fn update_settings(
    store: web::Data<dyn UserStore>,
    user: AuthUser,
    payload: web::Json<SettingsRequest>,
) -> AppResult<HttpResponse> {
    let payload = payload.into_inner();

    let email = non_blank(payload.email).map(|e| normalize_email(&e));
    if let Some(email) = &email {
        validate_email(email)?;
    }

    let password_hash = match non_blank(payload.password) {
        Some(password) => {
            validate_password(&password)?;
            Some(hash_password(&password)?)
        }
        None => None,
    };

    let changes = UserChanges {
        name: non_blank(payload.name),
        email,
        phone: non_blank(payload.phone),
        address: non_blank(payload.address),
        password_hash,
    };

    if changes.is_empty() {
        return Err(AppError::bad_request("No fields to update"));
    }

    store
        .update(user.id, changes)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    Ok(HttpResponse::Ok().json(json!({ "message": "User updated successfully" })))
}

//Config User Auth Routes
// POST /users/register
// POST /users/login
// POST /users/logout
// GET  /users/me        (authenticated)
// PUT  /users/settings  (authenticated)
pub fn config_user_auth_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/users")
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .route("/logout", web::post().to(logout))
            .service(
                web::scope("")
                    .wrap(AuthMiddleware)
                    .route("/me", web::get().to(current_user))
                    .route("/settings", web::put().to(update_settings)),
            ),
    );
}
