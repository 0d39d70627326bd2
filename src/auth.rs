// Session-cookie resolution. Sessions are minted by the platform's auth
// system, which is outside this service; we only read them.

use axum::http::{header, HeaderMap};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{AppError, AppResult};
use crate::models::Organizer;

pub const SESSION_COOKIE: &str = "session";

/// Pulls the session token out of the Cookie header, if present.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}

pub async fn require_user(db: &Database, headers: &HeaderMap) -> AppResult<Uuid> {
    let token = session_token(headers).ok_or_else(|| {
        AppError::Unauthorized("You must be logged in to access this resource".to_string())
    })?;
    db.session_user(&token)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired session".to_string()))
}

pub async fn require_organizer(db: &Database, headers: &HeaderMap) -> AppResult<Organizer> {
    let user_id = require_user(db, headers).await?;
    db.organizer_for_user(user_id)
        .await?
        .ok_or_else(|| AppError::Forbidden("Organizer account required".to_string()))
}
