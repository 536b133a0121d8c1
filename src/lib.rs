#![recursion_limit = "256"]

//! Forno Back-Office - Tauri v2 Backend
//!
//! This module registers the IPC command handlers the webview frontend
//! calls via `@tauri-apps/api/core::invoke()`. Every screen (order board,
//! POS, inventory, menu editor, ledger, payroll, cash register, settings)
//! is a thin view over these commands; the SQLite database is the system
//! of record.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// App start time for uptime calculation (epoch seconds).
pub(crate) static APP_START_EPOCH: AtomicU64 = AtomicU64::new(0);

mod ai;
mod auth;
mod commands;
mod costing;
mod db;
mod finance;
mod inventory;
mod menu;
mod orders;
mod payroll;
mod receipt;
mod register;
mod storage;

/// Keep the most recent daily log files, drop the rest.
const MAX_LOG_FILES: usize = 14;

/// Log directory next to the platform's local app data.
fn log_dir() -> PathBuf {
    let base = std::env::var("LOCALAPPDATA")
        .or_else(|_| std::env::var("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            #[cfg(target_os = "windows")]
            {
                PathBuf::from(std::env::var("USERPROFILE").unwrap_or_else(|_| ".".into()))
                    .join("AppData")
                    .join("Local")
            }
            #[cfg(not(target_os = "windows"))]
            {
                PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                    .join(".local")
                    .join("share")
            }
        });
    base.join("pizza.forno.backoffice").join("logs")
}

/// Prune old log files, keeping only the most recent `MAX_LOG_FILES`.
fn prune_old_logs(dir: &PathBuf) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let name = path.file_name()?.to_str()?.to_string();
            if path.is_file() && name.starts_with("backoffice.") {
                let modified = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .unwrap_or(std::time::UNIX_EPOCH);
                Some((path, modified))
            } else {
                None
            }
        })
        .collect();

    // Newest first; everything past the cap is removed
    log_files.sort_by(|a, b| b.1.cmp(&a.1));
    for (path, _) in log_files.into_iter().skip(MAX_LOG_FILES) {
        let _ = fs::remove_file(path);
    }
}

// ============================================================================
// App entry point
// ============================================================================

pub fn run() {
    // Record start time for uptime tracking
    let epoch = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    APP_START_EPOCH.store(epoch, Ordering::Relaxed);

    // Initialize structured logging (console + rolling file)
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,forno_backoffice_lib=debug"));

    let log_dir = log_dir();
    fs::create_dir_all(&log_dir).ok();
    prune_old_logs(&log_dir);

    let file_appender = tracing_appender::rolling::daily(&log_dir, "backoffice");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    // Keep the guard alive for the lifetime of the app — dropping it flushes logs.
    // We leak it intentionally since the app runs until process exit.
    std::mem::forget(_guard);

    info!("Starting Forno Back-Office v{}", env!("CARGO_PKG_VERSION"));

    tauri::Builder::default()
        .setup(|app| {
            use tauri::Manager;

            let app_data_dir = app
                .path()
                .app_data_dir()
                .expect("Failed to get app data dir");

            // Main DB connection for Tauri commands
            let db_state = db::init(&app_data_dir).expect("Failed to initialize database");
            app.manage(db_state);

            // Auth state
            app.manage(auth::AuthState::new());

            info!("Database and auth state registered");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // App lifecycle
            commands::runtime::app_get_version,
            commands::runtime::system_get_info,
            // Auth
            commands::auth::auth_sign_up,
            commands::auth::auth_login,
            commands::auth::auth_logout,
            commands::auth::auth_get_current_session,
            commands::auth::auth_validate_session,
            commands::auth::auth_track_activity,
            commands::auth::auth_get_session_stats,
            // Settings
            commands::settings::settings_get_all,
            commands::settings::settings_get,
            commands::settings::settings_set,
            commands::settings::settings_clear_category,
            commands::settings::ai_get_config,
            commands::settings::ai_set_config,
            commands::settings::ai_clear_config,
            // Orders
            commands::orders::order_create,
            commands::orders::order_get_all,
            commands::orders::order_get_history,
            commands::orders::order_advance_status,
            commands::orders::order_cancel,
            commands::orders::order_delete,
            // Inventory
            commands::inventory::inventory_get_all,
            commands::inventory::inventory_get_low_stock,
            commands::inventory::inventory_save_item,
            commands::inventory::inventory_delete_item,
            commands::inventory::inventory_scan_document,
            commands::inventory::ai_is_configured,
            // Menu / recipes
            commands::menu::menu_get_products,
            commands::menu::menu_get_products_with_costing,
            commands::menu::menu_save_product,
            commands::menu::menu_delete_product,
            commands::menu::menu_set_availability,
            commands::menu::menu_set_ingredients,
            commands::menu::menu_get_recipe,
            // Ledger
            commands::finance::finance_get_all,
            commands::finance::finance_add,
            commands::finance::finance_delete,
            commands::finance::finance_get_today_stats,
            commands::finance::finance_scan_document,
            commands::finance::finance_get_advice,
            // Payroll
            commands::payroll::payroll_get_employees,
            commands::payroll::payroll_save_employee,
            commands::payroll::payroll_deactivate_employee,
            commands::payroll::payroll_save_event,
            commands::payroll::payroll_get_month_summary,
            commands::payroll::payroll_consolidate,
            // Cash register
            commands::register::register_open,
            commands::register::register_get_active,
            commands::register::register_get_report,
            commands::register::register_close,
            commands::register::register_get_history,
            // Print
            commands::print::order_get_receipt_html,
        ])
        .run(tauri::generate_context!())
        .expect("error while running Forno Back-Office");
}
