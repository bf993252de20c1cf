//! Accounts, password hashing and cookie sessions.

use anyhow::anyhow;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{Form, FromRequestParts, State},
    http::request::Parts,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use rand_core::OsRng;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::Database;
use crate::error::AppError;
use crate::models::{Role, User};
use crate::notice::{set_flash, take_flash, Notice};
use crate::views;
use crate::AppState;

pub const SESSION_COOKIE: &str = "session";

const MIN_PASSWORD_LEN: usize = 6;
const MAX_USERNAME_LEN: usize = 32;

/// The signed-in user of the current request. Requests without a live
/// session are turned away to `/login`.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .ok_or(AppError::Unauthenticated)?;

        let db = Database::connect(&state.db_path)?;
        db.session_user(&token, Utc::now())?
            .map(CurrentUser)
            .ok_or(AppError::Unauthenticated)
    }
}

#[derive(Deserialize)]
pub struct Credentials {
    username: String,
    password: String,
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("hashing password: {err}"))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

pub fn register(db: &Database, username: &str, password: &str) -> Result<User, AppError> {
    let username = username.trim();
    if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
        return Err(AppError::Validation(format!(
            "username must be 1 to {MAX_USERNAME_LEN} characters"
        )));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if db.find_credentials(username)?.is_some() {
        return Err(AppError::Validation(format!("username {username} is taken")));
    }

    let user = db.create_user(username, &hash_password(password)?, Role::Student)?;
    info!(user_id = user.id, username = %user.username, "registered user");
    Ok(user)
}

/// Checks the password and opens a session. Returns the session token.
pub fn login(db: &Database, username: &str, password: &str, lifetime: Duration) -> Result<(User, String), AppError> {
    let (user, hash) = db
        .find_credentials(username.trim())?
        .ok_or(AppError::Unauthenticated)?;
    if !verify_password(password, &hash) {
        return Err(AppError::Unauthenticated);
    }

    let token = Uuid::new_v4().to_string();
    db.create_session(&token, user.id, Utc::now() + lifetime)?;
    info!(user_id = user.id, "session opened");
    Ok((user, token))
}

/// Creates the configured admin, or promotes and re-keys an existing account.
pub fn ensure_admin(db: &Database, username: &str, password: &str) -> anyhow::Result<User> {
    let hash = hash_password(password)?;
    match db.find_credentials(username)? {
        Some((mut user, _)) => {
            db.set_role(user.id, Role::Admin)?;
            db.set_password_hash(user.id, &hash)?;
            user.role = Role::Admin;
            info!(user_id = user.id, username, "promoted admin");
            Ok(user)
        }
        None => {
            let user = db.create_user(username, &hash, Role::Admin)?;
            info!(user_id = user.id, username, "created admin");
            Ok(user)
        }
    }
}

pub async fn login_page(jar: CookieJar) -> impl IntoResponse {
    let (jar, notice) = take_flash(jar);
    (jar, Html(views::auth_page(views::AuthMode::Login, notice)))
}

pub async fn register_page(jar: CookieJar) -> impl IntoResponse {
    let (jar, notice) = take_flash(jar);
    (jar, Html(views::auth_page(views::AuthMode::Register, notice)))
}

pub async fn handle_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<Credentials>,
) -> Result<Response, AppError> {
    let db = Database::connect(&state.db_path)?;
    match login(&db, &form.username, &form.password, Duration::hours(state.session_hours)) {
        Ok((_, token)) => {
            let cookie = Cookie::build((SESSION_COOKIE, token))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax);
            Ok((jar.add(cookie), Redirect::to("/")).into_response())
        }
        Err(AppError::Unauthenticated) => {
            warn!(username = %form.username.trim(), "login rejected");
            Ok((set_flash(jar, Notice::LoginFailed), Redirect::to("/login")).into_response())
        }
        Err(err) => Err(err),
    }
}

pub async fn handle_register(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<Credentials>,
) -> Result<Response, AppError> {
    let db = Database::connect(&state.db_path)?;
    match register(&db, &form.username, &form.password) {
        Ok(_) => Ok((set_flash(jar, Notice::Registered), Redirect::to("/login")).into_response()),
        Err(AppError::Validation(reason)) => {
            warn!(%reason, "registration rejected");
            Ok((set_flash(jar, Notice::RegisterFailed), Redirect::to("/register")).into_response())
        }
        Err(err) => Err(err),
    }
}

pub async fn handle_logout(State(state): State<AppState>, jar: CookieJar) -> Result<Response, AppError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let db = Database::connect(&state.db_path)?;
        db.delete_session(cookie.value())?;
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Ok((set_flash(jar, Notice::LoggedOut), Redirect::to("/login")).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::connect(":memory:").unwrap()
    }

    #[test]
    fn register_then_login() {
        let db = db();
        let user = register(&db, "  sari ", "rahasia123").unwrap();
        assert_eq!(user.username, "sari");
        assert_eq!(user.role, Role::Student);

        let (logged_in, token) = login(&db, "sari", "rahasia123", Duration::hours(1)).unwrap();
        assert_eq!(logged_in.id, user.id);
        assert_eq!(db.session_user(&token, Utc::now()).unwrap().map(|u| u.id), Some(user.id));
    }

    #[test]
    fn wrong_password_is_unauthenticated() {
        let db = db();
        register(&db, "sari", "rahasia123").unwrap();
        assert!(matches!(
            login(&db, "sari", "salah", Duration::hours(1)),
            Err(AppError::Unauthenticated)
        ));
        assert!(matches!(
            login(&db, "budi", "rahasia123", Duration::hours(1)),
            Err(AppError::Unauthenticated)
        ));
    }

    #[test]
    fn registration_validates_input() {
        let db = db();
        assert!(matches!(register(&db, "   ", "rahasia123"), Err(AppError::Validation(_))));
        assert!(matches!(register(&db, "sari", "123"), Err(AppError::Validation(_))));
        register(&db, "sari", "rahasia123").unwrap();
        assert!(matches!(register(&db, "sari", "rahasia456"), Err(AppError::Validation(_))));
    }

    #[test]
    fn ensure_admin_promotes_existing_account() {
        let db = db();
        let student = register(&db, "dosen", "rahasia123").unwrap();
        let admin = ensure_admin(&db, "dosen", "baru12345").unwrap();
        assert_eq!(admin.id, student.id);
        assert!(admin.is_admin());
        assert!(login(&db, "dosen", "baru12345", Duration::hours(1)).is_ok());
        assert!(login(&db, "dosen", "rahasia123", Duration::hours(1)).is_err());
    }
}
