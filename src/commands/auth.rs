use serde_json::Value;

use crate::auth::{self, AuthState};
use crate::db;

#[tauri::command]
pub async fn auth_sign_up(
    email: String,
    password: String,
    display_name: Option<String>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    auth::sign_up(&db, &email, &password, display_name.as_deref())
}

#[tauri::command]
pub async fn auth_login(
    email: String,
    password: String,
    db: tauri::State<'_, db::DbState>,
    auth: tauri::State<'_, AuthState>,
) -> Result<Value, String> {
    auth::login(&db, &auth, &email, &password)
}

#[tauri::command]
pub async fn auth_logout(auth: tauri::State<'_, AuthState>) -> Result<(), String> {
    auth::logout(&auth);
    Ok(())
}

#[tauri::command]
pub async fn auth_get_current_session(
    auth: tauri::State<'_, AuthState>,
) -> Result<Value, String> {
    Ok(auth::get_session_json(&auth))
}

#[tauri::command]
pub async fn auth_validate_session(auth: tauri::State<'_, AuthState>) -> Result<Value, String> {
    Ok(auth::validate_session(&auth))
}

#[tauri::command]
pub async fn auth_track_activity(auth: tauri::State<'_, AuthState>) -> Result<(), String> {
    auth::track_activity(&auth);
    Ok(())
}

#[tauri::command]
pub async fn auth_get_session_stats(
    auth: tauri::State<'_, AuthState>,
) -> Result<Value, String> {
    Ok(auth::get_session_stats(&auth))
}
