use crate::db;
use crate::orders;
use crate::receipt;

/// The printable HTML document for one order. The webview opens it in a
/// print window and triggers the OS print dialog.
#[tauri::command]
pub async fn order_get_receipt_html(
    order_id: String,
    db: tauri::State<'_, db::DbState>,
) -> Result<String, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let order = orders::get_order(&conn, &order_id)?.ok_or("Order not found")?;
    Ok(receipt::build_receipt_html(&order))
}
