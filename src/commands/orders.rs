use tauri::Emitter;

use crate::db;
use crate::orders::{self, AdvanceOutcome, Order, OrderInput};

#[tauri::command]
pub async fn order_create(
    input: OrderInput,
    db: tauri::State<'_, db::DbState>,
    app: tauri::AppHandle,
) -> Result<Order, String> {
    let order = orders::create_order(&db, &input)?;
    let _ = app.emit("order_created", &order);
    Ok(order)
}

#[tauri::command]
pub async fn order_get_all(db: tauri::State<'_, db::DbState>) -> Result<Vec<Order>, String> {
    orders::list_active(&db)
}

#[tauri::command]
pub async fn order_get_history(db: tauri::State<'_, db::DbState>) -> Result<Vec<Order>, String> {
    orders::list_all(&db)
}

#[tauri::command]
pub async fn order_advance_status(
    order_id: String,
    db: tauri::State<'_, db::DbState>,
    app: tauri::AppHandle,
) -> Result<AdvanceOutcome, String> {
    let outcome = orders::advance_status(&db, &order_id)?;
    let _ = app.emit("order_status_updated", &outcome.order);
    if outcome.completed {
        // Stock and ledger changed as well
        let _ = app.emit("order_completed", &outcome.order);
        let _ = app.emit("stock_updated", serde_json::json!({ "orderId": order_id }));
    }
    Ok(outcome)
}

#[tauri::command]
pub async fn order_cancel(
    order_id: String,
    db: tauri::State<'_, db::DbState>,
    app: tauri::AppHandle,
) -> Result<Order, String> {
    let order = orders::cancel_order(&db, &order_id)?;
    let _ = app.emit("order_status_updated", &order);
    Ok(order)
}

#[tauri::command]
pub async fn order_delete(
    order_id: String,
    db: tauri::State<'_, db::DbState>,
    app: tauri::AppHandle,
) -> Result<(), String> {
    orders::delete_order(&db, &order_id)?;
    let _ = app.emit("order_deleted", serde_json::json!({ "orderId": order_id }));
    Ok(())
}
