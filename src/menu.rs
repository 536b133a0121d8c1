//! Menu products and their recipe links.
//!
//! A product's cost of goods is never stored; it is recomputed on read
//! from the current `recipe_ingredients × stock_items` rows so that a
//! supplier price change is reflected everywhere immediately.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::costing::{self, CostBreakdown};
use crate::db::DbState;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuProduct {
    pub id: String,
    pub code: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub sale_price: f64,
    pub available: bool,
    pub image_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuProductInput {
    pub id: Option<String>,
    pub code: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub sale_price: f64,
    #[serde(default = "default_true")]
    pub available: bool,
    pub image_path: Option<String>,
}

fn default_true() -> bool {
    true
}

/// One recipe line as edited on the menu screen. The quantity field is a
/// text input there, so comma decimals and garbage are tolerated.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientLinkInput {
    pub stock_item_id: String,
    #[serde(deserialize_with = "crate::costing::de_flexible_number")]
    pub quantity: f64,
}

/// A recipe line joined with its stock item, as displayed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeLine {
    pub stock_item_id: String,
    pub stock_item_name: String,
    pub unit: String,
    pub quantity: f64,
    pub cost_per_unit: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCosting {
    pub product: MenuProduct,
    pub ingredients: Vec<RecipeLine>,
    pub costing: CostBreakdown,
}

fn product_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MenuProduct> {
    Ok(MenuProduct {
        id: row.get("id")?,
        code: row.get("code")?,
        name: row.get("name")?,
        description: row.get("description")?,
        category: row.get("category")?,
        sale_price: row.get("sale_price")?,
        available: row.get::<_, i64>("available")? != 0,
        image_path: row.get("image_path")?,
    })
}

/// All products ordered by category then name.
pub fn list_products(db: &DbState) -> Result<Vec<MenuProduct>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare("SELECT * FROM menu_products ORDER BY category, name COLLATE NOCASE")
        .map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map([], product_from_row)
        .map_err(|e| e.to_string())?;
    rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
}

/// Insert or overwrite a product from the editor form.
pub fn save_product(db: &DbState, input: &MenuProductInput) -> Result<MenuProduct, String> {
    if input.name.trim().is_empty() {
        return Err("Product name is required".into());
    }
    if input.sale_price < 0.0 {
        return Err("Sale price cannot be negative".into());
    }

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let now = Utc::now().to_rfc3339();
    let id = input
        .id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    conn.execute(
        "INSERT INTO menu_products (
            id, code, name, description, category, sale_price, available,
            image_path, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
        ON CONFLICT(id) DO UPDATE SET
            code = ?2, name = ?3, description = ?4, category = ?5,
            sale_price = ?6, available = ?7, image_path = ?8, updated_at = ?9",
        params![
            id,
            input.code,
            input.name.trim(),
            input.description,
            input.category,
            input.sale_price,
            input.available as i64,
            input.image_path,
            now,
        ],
    )
    .map_err(|e| format!("save product: {e}"))?;

    info!(product_id = %id, name = %input.name.trim(), "menu product saved");

    conn.query_row(
        "SELECT * FROM menu_products WHERE id = ?1",
        params![id],
        product_from_row,
    )
    .map_err(|e| e.to_string())
}

/// Delete a product. Recipe links cascade.
pub fn delete_product(db: &DbState, product_id: &str) -> Result<(), String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let changed = conn
        .execute(
            "DELETE FROM menu_products WHERE id = ?1",
            params![product_id],
        )
        .map_err(|e| format!("delete product: {e}"))?;
    if changed == 0 {
        return Err("Product not found".into());
    }
    info!(product_id = %product_id, "menu product deleted");
    Ok(())
}

/// Toggle menu availability without touching the rest of the row.
pub fn set_availability(db: &DbState, product_id: &str, available: bool) -> Result<(), String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let changed = conn
        .execute(
            "UPDATE menu_products SET available = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![available as i64, product_id],
        )
        .map_err(|e| format!("set availability: {e}"))?;
    if changed == 0 {
        return Err("Product not found".into());
    }
    Ok(())
}

/// Replace the product's recipe wholesale. Edits are destructive: the
/// previous links are dropped, there is no versioning.
pub fn set_ingredients(
    db: &DbState,
    product_id: &str,
    links: &[IngredientLinkInput],
) -> Result<(), String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let exists: Option<String> = conn
        .query_row(
            "SELECT id FROM menu_products WHERE id = ?1",
            params![product_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| e.to_string())?;
    if exists.is_none() {
        return Err("Product not found".into());
    }

    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(|e| format!("begin transaction: {e}"))?;

    let result = (|| -> Result<(), String> {
        conn.execute(
            "DELETE FROM recipe_ingredients WHERE product_id = ?1",
            params![product_id],
        )
        .map_err(|e| format!("clear recipe: {e}"))?;

        for link in links {
            if link.quantity <= 0.0 {
                continue;
            }
            conn.execute(
                "INSERT INTO recipe_ingredients (product_id, stock_item_id, quantity)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(product_id, stock_item_id)
                 DO UPDATE SET quantity = quantity + ?3",
                params![product_id, link.stock_item_id, link.quantity],
            )
            .map_err(|e| format!("insert recipe line: {e}"))?;
        }
        Ok(())
    })();

    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT")
                .map_err(|e| format!("commit: {e}"))?;
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            return Err(e);
        }
    }

    info!(product_id = %product_id, lines = links.len(), "recipe replaced");
    Ok(())
}

/// The product's recipe joined with current stock costs.
pub fn recipe_lines(conn: &Connection, product_id: &str) -> Result<Vec<RecipeLine>, String> {
    let mut stmt = conn
        .prepare(
            "SELECT ri.stock_item_id, si.name, si.unit, ri.quantity, si.cost_per_unit
             FROM recipe_ingredients ri
             JOIN stock_items si ON si.id = ri.stock_item_id
             WHERE ri.product_id = ?1
             ORDER BY si.name COLLATE NOCASE",
        )
        .map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map(params![product_id], |row| {
            Ok(RecipeLine {
                stock_item_id: row.get(0)?,
                stock_item_name: row.get(1)?,
                unit: row.get(2)?,
                quantity: row.get(3)?,
                cost_per_unit: row.get(4)?,
            })
        })
        .map_err(|e| e.to_string())?;
    rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
}

/// Every product with its recipe and freshly computed cost/margin/markup.
pub fn list_products_with_costing(db: &DbState) -> Result<Vec<ProductCosting>, String> {
    let products = list_products(db)?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let mut out = Vec::with_capacity(products.len());
    for product in products {
        let ingredients = recipe_lines(&conn, &product.id)?;
        let pairs: Vec<(f64, f64)> = ingredients
            .iter()
            .map(|l| (l.quantity, l.cost_per_unit))
            .collect();
        let costing = costing::cost_breakdown(product.sale_price, &pairs);
        out.push(ProductCosting {
            product,
            ingredients,
            costing,
        });
    }
    Ok(out)
}

/// Resolve the menu product behind an order line item: by id when the
/// line carries one, else by exact name (hand-typed counter sales).
pub fn resolve_product_id(
    conn: &Connection,
    product_id: Option<&str>,
    name: &str,
) -> Result<Option<String>, String> {
    if let Some(id) = product_id {
        let found: Option<String> = conn
            .query_row(
                "SELECT id FROM menu_products WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| e.to_string())?;
        if found.is_some() {
            return Ok(found);
        }
    }
    conn.query_row(
        "SELECT id FROM menu_products WHERE name = ?1 COLLATE NOCASE",
        params![name],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{self, StockItemInput};
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

    fn stock(db: &DbState, name: &str, cost: f64) -> String {
        inventory::save_item(
            db,
            &StockItemInput {
                id: None,
                code: None,
                name: name.into(),
                unit: "kg".into(),
                category: None,
                stock_quantity: 10.0,
                cost_per_unit: cost,
                min_stock: 1.0,
                supplier: None,
            },
        )
        .expect("save stock item")
        .id
    }

    fn product(db: &DbState, name: &str, price: f64) -> MenuProduct {
        save_product(
            db,
            &MenuProductInput {
                id: None,
                code: None,
                name: name.into(),
                description: None,
                category: Some("Pizzas".into()),
                sale_price: price,
                available: true,
                image_path: None,
            },
        )
        .expect("save product")
    }

    #[test]
    fn costing_is_recomputed_from_current_stock_costs() {
        let db = test_db();
        let mozz = stock(&db, "Mozzarella", 45.0);
        let basil = stock(&db, "Basil", 2.5);
        let prd = product(&db, "Margherita", 45.90);

        set_ingredients(
            &db,
            &prd.id,
            &[
                IngredientLinkInput {
                    stock_item_id: mozz.clone(),
                    quantity: 0.35,
                },
                IngredientLinkInput {
                    stock_item_id: basil,
                    quantity: 2.0,
                },
            ],
        )
        .expect("set recipe");

        let costed = list_products_with_costing(&db).expect("costing");
        assert_eq!(costed.len(), 1);
        assert!((costed[0].costing.cost - 20.75).abs() < 1e-9);
        assert!(!costed[0].costing.uncosted);

        // Supplier price change is visible on the next read
        inventory::save_item(
            &db,
            &StockItemInput {
                id: Some(mozz),
                code: None,
                name: "Mozzarella".into(),
                unit: "kg".into(),
                category: None,
                stock_quantity: 10.0,
                cost_per_unit: 50.0,
                min_stock: 1.0,
                supplier: None,
            },
        )
        .expect("update cost");
        let costed = list_products_with_costing(&db).expect("costing again");
        assert!((costed[0].costing.cost - 22.5).abs() < 1e-9);
    }

    #[test]
    fn product_without_recipe_is_flagged_uncosted() {
        let db = test_db();
        product(&db, "Soda Can", 6.0);
        let costed = list_products_with_costing(&db).expect("costing");
        assert!(costed[0].costing.uncosted);
        assert_eq!(costed[0].costing.margin_percent, 100.0);
    }

    #[test]
    fn set_ingredients_is_destructive_replace() {
        let db = test_db();
        let mozz = stock(&db, "Mozzarella", 45.0);
        let flour = stock(&db, "Flour", 4.0);
        let prd = product(&db, "Margherita", 45.90);

        set_ingredients(
            &db,
            &prd.id,
            &[IngredientLinkInput {
                stock_item_id: mozz,
                quantity: 0.35,
            }],
        )
        .unwrap();
        set_ingredients(
            &db,
            &prd.id,
            &[IngredientLinkInput {
                stock_item_id: flour.clone(),
                quantity: 0.5,
            }],
        )
        .unwrap();

        let conn = db.conn.lock().unwrap();
        let lines = recipe_lines(&conn, &prd.id).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].stock_item_id, flour);
    }

    #[test]
    fn resolve_product_falls_back_to_name() {
        let db = test_db();
        let prd = product(&db, "Margherita", 45.90);
        let conn = db.conn.lock().unwrap();

        let by_id = resolve_product_id(&conn, Some(&prd.id), "whatever").unwrap();
        assert_eq!(by_id, Some(prd.id.clone()));

        let by_name = resolve_product_id(&conn, None, "margherita").unwrap();
        assert_eq!(by_name, Some(prd.id.clone()));

        let missing = resolve_product_id(&conn, Some("ghost"), "ghost").unwrap();
        assert_eq!(missing, None);
    }
}
