use tauri::Emitter;

use crate::db;
use crate::menu::{
    self, IngredientLinkInput, MenuProduct, MenuProductInput, ProductCosting, RecipeLine,
};

#[tauri::command]
pub async fn menu_get_products(
    db: tauri::State<'_, db::DbState>,
) -> Result<Vec<MenuProduct>, String> {
    menu::list_products(&db)
}

#[tauri::command]
pub async fn menu_get_products_with_costing(
    db: tauri::State<'_, db::DbState>,
) -> Result<Vec<ProductCosting>, String> {
    menu::list_products_with_costing(&db)
}

#[tauri::command]
pub async fn menu_save_product(
    input: MenuProductInput,
    db: tauri::State<'_, db::DbState>,
    app: tauri::AppHandle,
) -> Result<MenuProduct, String> {
    let product = menu::save_product(&db, &input)?;
    let _ = app.emit("menu_updated", &product);
    Ok(product)
}

#[tauri::command]
pub async fn menu_delete_product(
    product_id: String,
    db: tauri::State<'_, db::DbState>,
    app: tauri::AppHandle,
) -> Result<(), String> {
    menu::delete_product(&db, &product_id)?;
    let _ = app.emit("menu_updated", serde_json::json!({ "deleted": product_id }));
    Ok(())
}

#[tauri::command]
pub async fn menu_set_availability(
    product_id: String,
    available: bool,
    db: tauri::State<'_, db::DbState>,
    app: tauri::AppHandle,
) -> Result<(), String> {
    menu::set_availability(&db, &product_id, available)?;
    let _ = app.emit(
        "menu_updated",
        serde_json::json!({ "productId": product_id, "available": available }),
    );
    Ok(())
}

#[tauri::command]
pub async fn menu_set_ingredients(
    product_id: String,
    links: Vec<IngredientLinkInput>,
    db: tauri::State<'_, db::DbState>,
    app: tauri::AppHandle,
) -> Result<(), String> {
    menu::set_ingredients(&db, &product_id, &links)?;
    let _ = app.emit("menu_updated", serde_json::json!({ "productId": product_id }));
    Ok(())
}

#[tauri::command]
pub async fn menu_get_recipe(
    product_id: String,
    db: tauri::State<'_, db::DbState>,
) -> Result<Vec<RecipeLine>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    menu::recipe_lines(&conn, &product_id)
}
