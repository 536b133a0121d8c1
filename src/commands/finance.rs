use tauri::Emitter;

use crate::ai::{self, ScannedExpense};
use crate::db;
use crate::finance::{self, TodayStats, Transaction, TransactionInput};

#[tauri::command]
pub async fn finance_get_all(
    db: tauri::State<'_, db::DbState>,
) -> Result<Vec<Transaction>, String> {
    finance::list_transactions(&db)
}

#[tauri::command]
pub async fn finance_add(
    input: TransactionInput,
    db: tauri::State<'_, db::DbState>,
    app: tauri::AppHandle,
) -> Result<Transaction, String> {
    let tx = finance::add_transaction(&db, &input)?;
    let _ = app.emit("transaction_added", &tx);
    Ok(tx)
}

#[tauri::command]
pub async fn finance_delete(
    transaction_id: String,
    db: tauri::State<'_, db::DbState>,
    app: tauri::AppHandle,
) -> Result<(), String> {
    finance::delete_transaction(&db, &transaction_id)?;
    let _ = app.emit(
        "transaction_deleted",
        serde_json::json!({ "transactionId": transaction_id }),
    );
    Ok(())
}

#[tauri::command]
pub async fn finance_get_today_stats(
    db: tauri::State<'_, db::DbState>,
) -> Result<TodayStats, String> {
    finance::today_stats(&db)
}

/// Scan a financial document (bill, invoice, receipt) into form prefill
/// values. Nothing is written; the user reviews before submitting.
#[tauri::command]
pub async fn finance_scan_document(
    base64_data: String,
    mime_type: Option<String>,
    db: tauri::State<'_, db::DbState>,
) -> Result<ScannedExpense, String> {
    ai::scan_expense_document(&db, &base64_data, mime_type.as_deref().unwrap_or(""))
        .await
        .map_err(|e| e.to_string())
}

/// Free-text consultant answer over the given margin highlights.
#[tauri::command]
pub async fn finance_get_advice(
    highlights: Vec<String>,
    db: tauri::State<'_, db::DbState>,
) -> Result<String, String> {
    ai::financial_advice(&db, &highlights)
        .await
        .map_err(|e| e.to_string())
}
