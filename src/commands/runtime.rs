use serde_json::Value;
use std::sync::atomic::Ordering;

use crate::db;
use crate::APP_START_EPOCH;

#[tauri::command]
pub async fn app_get_version() -> Result<String, String> {
    Ok(env!("CARGO_PKG_VERSION").to_string())
}

#[tauri::command]
pub async fn system_get_info(db: tauri::State<'_, db::DbState>) -> Result<Value, String> {
    let start = APP_START_EPOCH.load(Ordering::Relaxed);
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let uptime_secs = now.saturating_sub(start);

    Ok(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "buildTimestamp": env!("BUILD_TIMESTAMP"),
        "gitSha": env!("BUILD_GIT_SHA"),
        "uptimeSecs": uptime_secs,
        "dbPath": db.db_path.display().to_string(),
        "platform": std::env::consts::OS,
    }))
}
