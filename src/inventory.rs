//! Stock items: manual CRUD, low-stock alerts, and additive ingestion of
//! AI-scanned purchase documents.
//!
//! Quantities are decremented by order completion (see `orders`), always
//! floored at zero.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::db::DbState;

/// Minimum-stock threshold applied to items created by document ingestion.
const SCANNED_ITEM_DEFAULT_MIN_STOCK: f64 = 10.0;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockItem {
    pub id: String,
    pub code: Option<String>,
    pub name: String,
    pub unit: String,
    pub category: Option<String>,
    pub stock_quantity: f64,
    pub cost_per_unit: f64,
    pub min_stock: f64,
    pub supplier: Option<String>,
    pub last_buy: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockItemInput {
    pub id: Option<String>,
    pub code: Option<String>,
    pub name: String,
    pub unit: String,
    pub category: Option<String>,
    #[serde(default)]
    pub stock_quantity: f64,
    #[serde(default)]
    pub cost_per_unit: f64,
    #[serde(default)]
    pub min_stock: f64,
    pub supplier: Option<String>,
}

/// One line extracted from a scanned purchase document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannedStockLine {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub cost_per_unit: f64,
    #[serde(default)]
    pub category: String,
}

fn item_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StockItem> {
    Ok(StockItem {
        id: row.get("id")?,
        code: row.get("code")?,
        name: row.get("name")?,
        unit: row.get("unit")?,
        category: row.get("category")?,
        stock_quantity: row.get("stock_quantity")?,
        cost_per_unit: row.get("cost_per_unit")?,
        min_stock: row.get("min_stock")?,
        supplier: row.get("supplier")?,
        last_buy: row.get("last_buy")?,
    })
}

/// All stock items ordered by name.
pub fn list_items(db: &DbState) -> Result<Vec<StockItem>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare("SELECT * FROM stock_items ORDER BY name COLLATE NOCASE")
        .map_err(|e| e.to_string())?;
    let rows = stmt.query_map([], item_from_row).map_err(|e| e.to_string())?;
    rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
}

/// Items at or below their minimum threshold.
pub fn low_stock(db: &DbState) -> Result<Vec<StockItem>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare(
            "SELECT * FROM stock_items
             WHERE stock_quantity <= min_stock
             ORDER BY stock_quantity / MAX(min_stock, 0.0001)",
        )
        .map_err(|e| e.to_string())?;
    let rows = stmt.query_map([], item_from_row).map_err(|e| e.to_string())?;
    rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
}

/// Insert or overwrite a stock item from the form.
pub fn save_item(db: &DbState, input: &StockItemInput) -> Result<StockItem, String> {
    if input.name.trim().is_empty() {
        return Err("Item name is required".into());
    }
    if input.stock_quantity < 0.0 || input.cost_per_unit < 0.0 || input.min_stock < 0.0 {
        return Err("Quantities and costs cannot be negative".into());
    }

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let now = Utc::now().to_rfc3339();
    let id = input
        .id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    conn.execute(
        "INSERT INTO stock_items (
            id, code, name, unit, category, stock_quantity, cost_per_unit,
            min_stock, supplier, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
        ON CONFLICT(id) DO UPDATE SET
            code = ?2, name = ?3, unit = ?4, category = ?5,
            stock_quantity = ?6, cost_per_unit = ?7, min_stock = ?8,
            supplier = ?9, updated_at = ?10",
        params![
            id,
            input.code,
            input.name.trim(),
            input.unit,
            input.category,
            input.stock_quantity,
            input.cost_per_unit,
            input.min_stock,
            input.supplier,
            now,
        ],
    )
    .map_err(|e| format!("save stock item: {e}"))?;

    info!(stock_item_id = %id, name = %input.name.trim(), "stock item saved");

    get_item(&conn, &id)?.ok_or_else(|| "Stock item vanished after save".into())
}

pub fn get_item(conn: &Connection, id: &str) -> Result<Option<StockItem>, String> {
    conn.query_row(
        "SELECT * FROM stock_items WHERE id = ?1",
        params![id],
        item_from_row,
    )
    .optional()
    .map_err(|e| e.to_string())
}

/// Delete one item. Recipe links cascade.
pub fn delete_item(db: &DbState, item_id: &str) -> Result<(), String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let changed = conn
        .execute("DELETE FROM stock_items WHERE id = ?1", params![item_id])
        .map_err(|e| format!("delete stock item: {e}"))?;
    if changed == 0 {
        return Err("Stock item not found".into());
    }
    info!(stock_item_id = %item_id, "stock item deleted");
    Ok(())
}

/// Decrement an item's quantity on an already-held connection, flooring
/// at zero. Used inside the order-completion transaction.
pub fn decrement_with_conn(
    conn: &Connection,
    stock_item_id: &str,
    amount: f64,
    now: &str,
) -> Result<(), String> {
    conn.execute(
        "UPDATE stock_items
         SET stock_quantity = MAX(0, stock_quantity - ?1), updated_at = ?2
         WHERE id = ?3",
        params![amount, now, stock_item_id],
    )
    .map_err(|e| format!("decrement stock {stock_item_id}: {e}"))?;
    Ok(())
}

/// Merge scanned purchase lines into the stock (additive).
///
/// A line matching an existing item by code (else by case-insensitive
/// name) adds to its quantity and refreshes cost and last-buy date;
/// anything else becomes a new item. Returns (merged, created).
pub fn apply_scanned_lines(
    db: &DbState,
    lines: &[ScannedStockLine],
) -> Result<(usize, usize), String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let now = Utc::now();
    let today = now.format("%Y-%m-%d").to_string();
    let now_str = now.to_rfc3339();

    let mut merged = 0usize;
    let mut created = 0usize;

    for line in lines {
        let name = line.name.trim();
        if name.is_empty() || line.quantity <= 0.0 {
            continue;
        }

        let code = line.code.trim();
        let existing: Option<String> = if !code.is_empty() {
            conn.query_row(
                "SELECT id FROM stock_items WHERE code = ?1",
                params![code],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| e.to_string())?
        } else {
            None
        };
        let existing = match existing {
            Some(id) => Some(id),
            None => conn
                .query_row(
                    "SELECT id FROM stock_items WHERE name = ?1 COLLATE NOCASE",
                    params![name],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| e.to_string())?,
        };

        match existing {
            Some(id) => {
                conn.execute(
                    "UPDATE stock_items
                     SET stock_quantity = stock_quantity + ?1,
                         cost_per_unit = CASE WHEN ?2 > 0 THEN ?2 ELSE cost_per_unit END,
                         last_buy = ?3,
                         updated_at = ?4
                     WHERE id = ?5",
                    params![line.quantity, line.cost_per_unit, today, now_str, id],
                )
                .map_err(|e| format!("merge scanned line: {e}"))?;
                merged += 1;
            }
            None => {
                let unit = if line.unit.trim().is_empty() {
                    "un"
                } else {
                    line.unit.trim()
                };
                conn.execute(
                    "INSERT INTO stock_items (
                        id, code, name, unit, category, stock_quantity,
                        cost_per_unit, min_stock, last_buy, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                    params![
                        Uuid::new_v4().to_string(),
                        if code.is_empty() { None } else { Some(code) },
                        name,
                        unit,
                        if line.category.trim().is_empty() {
                            None
                        } else {
                            Some(line.category.trim())
                        },
                        line.quantity,
                        line.cost_per_unit,
                        SCANNED_ITEM_DEFAULT_MIN_STOCK,
                        today,
                        now_str,
                    ],
                )
                .map_err(|e| format!("insert scanned line: {e}"))?;
                created += 1;
            }
        }
    }

    info!(merged, created, "scanned purchase document applied");
    Ok((merged, created))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn test_db() -> DbState {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        crate::db::run_migrations_for_test(&conn);
        DbState {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        }
    }

    fn item(name: &str, qty: f64, min: f64) -> StockItemInput {
        StockItemInput {
            id: None,
            code: None,
            name: name.into(),
            unit: "kg".into(),
            category: None,
            stock_quantity: qty,
            cost_per_unit: 10.0,
            min_stock: min,
            supplier: None,
        }
    }

    #[test]
    fn save_then_edit_overwrites_fields() {
        let db = test_db();
        let saved = save_item(&db, &item("Flour", 20.0, 5.0)).expect("save");

        let mut edited = item("Flour 00", 18.0, 5.0);
        edited.id = Some(saved.id.clone());
        let updated = save_item(&db, &edited).expect("update");
        assert_eq!(updated.id, saved.id);
        assert_eq!(updated.name, "Flour 00");
        assert_eq!(list_items(&db).unwrap().len(), 1);
    }

    #[test]
    fn low_stock_lists_items_at_threshold() {
        let db = test_db();
        save_item(&db, &item("Flour", 4.0, 5.0)).unwrap();
        save_item(&db, &item("Tomato", 50.0, 5.0)).unwrap();

        let low = low_stock(&db).expect("low stock");
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].name, "Flour");
    }

    #[test]
    fn scanned_lines_merge_by_name_and_create_unknowns() {
        let db = test_db();
        save_item(&db, &item("Mozzarella", 5.0, 2.0)).unwrap();

        let lines = vec![
            ScannedStockLine {
                name: "mozzarella".into(),
                code: String::new(),
                unit: "kg".into(),
                quantity: 10.0,
                cost_per_unit: 39.9,
                category: "Dairy".into(),
            },
            ScannedStockLine {
                name: "Olive Oil".into(),
                code: "789100".into(),
                unit: "lt".into(),
                quantity: 6.0,
                cost_per_unit: 28.0,
                category: "Pantry".into(),
            },
        ];

        let (merged, created) = apply_scanned_lines(&db, &lines).expect("apply");
        assert_eq!((merged, created), (1, 1));

        let items = list_items(&db).unwrap();
        let mozz = items.iter().find(|i| i.name == "Mozzarella").unwrap();
        assert!((mozz.stock_quantity - 15.0).abs() < 1e-9);
        assert!((mozz.cost_per_unit - 39.9).abs() < 1e-9);

        let oil = items.iter().find(|i| i.name == "Olive Oil").unwrap();
        assert_eq!(oil.min_stock, SCANNED_ITEM_DEFAULT_MIN_STOCK);
        assert_eq!(oil.code.as_deref(), Some("789100"));
    }

    #[test]
    fn scanned_lines_skip_empty_and_zero_quantity() {
        let db = test_db();
        let lines = vec![
            ScannedStockLine {
                name: "".into(),
                code: String::new(),
                unit: String::new(),
                quantity: 3.0,
                cost_per_unit: 1.0,
                category: String::new(),
            },
            ScannedStockLine {
                name: "Basil".into(),
                code: String::new(),
                unit: String::new(),
                quantity: 0.0,
                cost_per_unit: 1.0,
                category: String::new(),
            },
        ];
        let (merged, created) = apply_scanned_lines(&db, &lines).expect("apply");
        assert_eq!((merged, created), (0, 0));
        assert!(list_items(&db).unwrap().is_empty());
    }

    #[test]
    fn decrement_floors_at_zero() {
        let db = test_db();
        let saved = save_item(&db, &item("Flour", 3.0, 1.0)).unwrap();
        {
            let conn = db.conn.lock().unwrap();
            decrement_with_conn(&conn, &saved.id, 10.0, "2025-06-01T00:00:00Z").unwrap();
        }
        let items = list_items(&db).unwrap();
        assert_eq!(items[0].stock_quantity, 0.0);
    }
}
