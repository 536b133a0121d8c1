use serde_json::Value;

use crate::{db, storage};

#[tauri::command]
pub async fn settings_get_all(db: tauri::State<'_, db::DbState>) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    Ok(db::get_all_settings(&conn))
}

#[tauri::command]
pub async fn settings_get(
    category: String,
    key: String,
    db: tauri::State<'_, db::DbState>,
) -> Result<Option<String>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    Ok(db::get_setting(&conn, &category, &key))
}

#[tauri::command]
pub async fn settings_set(
    category: String,
    key: String,
    value: String,
    db: tauri::State<'_, db::DbState>,
) -> Result<(), String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    db::set_setting(&conn, &category, &key, &value)
}

#[tauri::command]
pub async fn settings_clear_category(
    category: String,
    db: tauri::State<'_, db::DbState>,
) -> Result<(), String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    db::delete_all_settings(&conn, &category)
}

// -- AI service credentials --------------------------------------------------

#[tauri::command]
pub async fn ai_get_config() -> Result<Value, String> {
    Ok(storage::ai_config_summary())
}

#[tauri::command]
pub async fn ai_set_config(
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
) -> Result<Value, String> {
    storage::store_ai_config(base_url.as_deref(), api_key.as_deref(), model.as_deref())?;
    Ok(storage::ai_config_summary())
}

#[tauri::command]
pub async fn ai_clear_config() -> Result<(), String> {
    storage::clear_all()
}
