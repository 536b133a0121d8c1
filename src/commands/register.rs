use tauri::Emitter;

use crate::db;
use crate::register::{self, CashSession, CloseOutcome, SessionReport};

#[tauri::command]
pub async fn register_open(
    responsible: String,
    opening_float: f64,
    db: tauri::State<'_, db::DbState>,
    app: tauri::AppHandle,
) -> Result<CashSession, String> {
    let session = register::open_session(&db, &responsible, opening_float)?;
    let _ = app.emit("register_opened", &session);
    Ok(session)
}

#[tauri::command]
pub async fn register_get_active(
    db: tauri::State<'_, db::DbState>,
) -> Result<Option<CashSession>, String> {
    register::active_session(&db)
}

#[tauri::command]
pub async fn register_get_report(
    db: tauri::State<'_, db::DbState>,
) -> Result<SessionReport, String> {
    register::session_report(&db)
}

/// Close against the counted cash. A divergent close comes back
/// `closed: false` until the frontend confirms and retries with `force`.
#[tauri::command]
pub async fn register_close(
    counted_cash: f64,
    force: Option<bool>,
    db: tauri::State<'_, db::DbState>,
    app: tauri::AppHandle,
) -> Result<CloseOutcome, String> {
    let outcome = register::close_session(&db, counted_cash, force.unwrap_or(false))?;
    if outcome.closed {
        let _ = app.emit("register_closed", &outcome);
    }
    Ok(outcome)
}

#[tauri::command]
pub async fn register_get_history(
    limit: Option<i64>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Vec<CashSession>, String> {
    register::session_history(&db, limit.unwrap_or(30))
}
