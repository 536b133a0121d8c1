use serde::Serialize;
use tauri::Emitter;

use crate::db;
use crate::inventory::{self, StockItem, StockItemInput};
use crate::{ai, storage};

#[tauri::command]
pub async fn inventory_get_all(
    db: tauri::State<'_, db::DbState>,
) -> Result<Vec<StockItem>, String> {
    inventory::list_items(&db)
}

#[tauri::command]
pub async fn inventory_get_low_stock(
    db: tauri::State<'_, db::DbState>,
) -> Result<Vec<StockItem>, String> {
    inventory::low_stock(&db)
}

#[tauri::command]
pub async fn inventory_save_item(
    input: StockItemInput,
    db: tauri::State<'_, db::DbState>,
    app: tauri::AppHandle,
) -> Result<StockItem, String> {
    let item = inventory::save_item(&db, &input)?;
    let _ = app.emit("stock_updated", &item);
    Ok(item)
}

#[tauri::command]
pub async fn inventory_delete_item(
    item_id: String,
    db: tauri::State<'_, db::DbState>,
    app: tauri::AppHandle,
) -> Result<(), String> {
    inventory::delete_item(&db, &item_id)?;
    let _ = app.emit("stock_updated", serde_json::json!({ "deleted": item_id }));
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub merged: usize,
    pub created: usize,
    pub lines: Vec<inventory::ScannedStockLine>,
}

/// Scan a photographed purchase document and merge its lines into stock.
#[tauri::command]
pub async fn inventory_scan_document(
    base64_data: String,
    mime_type: Option<String>,
    db: tauri::State<'_, db::DbState>,
    app: tauri::AppHandle,
) -> Result<ScanResult, String> {
    let lines = ai::scan_purchase_document(&db, &base64_data, mime_type.as_deref().unwrap_or(""))
        .await
        .map_err(|e| e.to_string())?;
    let (merged, created) = inventory::apply_scanned_lines(&db, &lines)?;
    let _ = app.emit(
        "stock_updated",
        serde_json::json!({ "merged": merged, "created": created }),
    );
    Ok(ScanResult {
        merged,
        created,
        lines,
    })
}

#[tauri::command]
pub async fn ai_is_configured() -> Result<bool, String> {
    Ok(storage::ai_is_configured())
}
