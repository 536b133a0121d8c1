//! Order board: intake, kitchen flow, and completion side effects.
//!
//! An order moves forward through a fixed stage sequence, one stage per
//! call, never backwards. Reaching the terminal stage records the sale in
//! the ledger and consumes recipe ingredients from stock. Both effects run
//! in the same transaction as the status change and are guarded by the
//! order's `completed_at` stamp, so a duplicate trigger (double click,
//! replayed event) cannot double-post revenue or double-decrement stock.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::DbState;
use crate::finance::{self, EntryType, TransactionInput};
use crate::inventory;
use crate::menu;

// ---------------------------------------------------------------------------
// Status machine
// ---------------------------------------------------------------------------

/// Fulfillment stages, in board order. `Cancelled` sits outside the
/// forward flow and never appears on the active board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    Preparing,
    Ready,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "new" => Ok(OrderStatus::New),
            "preparing" => Ok(OrderStatus::Preparing),
            "ready" => Ok(OrderStatus::Ready),
            "out_for_delivery" => Ok(OrderStatus::OutForDelivery),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("Unknown order status: {other}")),
        }
    }

    /// The following stage, or `None` at `Delivered`/`Cancelled`.
    pub fn next(&self) -> Option<OrderStatus> {
        match self {
            OrderStatus::New => Some(OrderStatus::Preparing),
            OrderStatus::Preparing => Some(OrderStatus::Ready),
            OrderStatus::Ready => Some(OrderStatus::OutForDelivery),
            OrderStatus::OutForDelivery => Some(OrderStatus::Delivered),
            OrderStatus::Delivered | OrderStatus::Cancelled => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One line item. `product_id` is present when the line was picked from
/// the menu; hand-typed counter lines fall back to name matching when the
/// recipe is resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[serde(default)]
    pub product_id: Option<String>,
    pub name: String,
    pub quantity: f64,
    pub unit_price: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub order_number: i64,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub customer_address: Option<String>,
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
    pub delivery_fee: f64,
    pub change_for: Option<f64>,
    pub payment_method: Option<String>,
    pub status: OrderStatus,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderInput {
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_address: Option<String>,
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub delivery_fee: f64,
    pub change_for: Option<f64>,
    pub payment_method: Option<String>,
    /// Counter sales are created directly in `Delivered`; the board
    /// default is `New`.
    pub status: Option<OrderStatus>,
}

/// Result of an `advance_status` call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceOutcome {
    pub order: Order,
    /// True when this call applied the completion side effects.
    pub completed: bool,
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn order_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Order, String, String)> {
    let raw_status: String = row.get("status")?;
    let raw_items: String = row.get("items")?;
    let order = Order {
        id: row.get("id")?,
        order_number: row.get("order_number")?,
        customer_name: row.get("customer_name")?,
        customer_phone: row.get("customer_phone")?,
        customer_address: row.get("customer_address")?,
        items: Vec::new(), // fixed up by the caller
        total_amount: row.get("total_amount")?,
        delivery_fee: row.get("delivery_fee")?,
        change_for: row.get("change_for")?,
        payment_method: row.get("payment_method")?,
        status: OrderStatus::New, // fixed up by the caller
        completed_at: row.get("completed_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    Ok((order, raw_status, raw_items))
}

fn finish_order(triple: (Order, String, String)) -> Result<Order, String> {
    let (mut order, raw_status, raw_items) = triple;
    order.status = OrderStatus::parse(&raw_status)?;
    order.items = serde_json::from_str(&raw_items)
        .map_err(|e| format!("corrupt items payload on order {}: {e}", order.id))?;
    Ok(order)
}

pub fn get_order(conn: &Connection, order_id: &str) -> Result<Option<Order>, String> {
    let row = conn
        .query_row(
            "SELECT * FROM orders WHERE id = ?1",
            params![order_id],
            order_from_row,
        )
        .optional()
        .map_err(|e| e.to_string())?;
    row.map(finish_order).transpose()
}

// ---------------------------------------------------------------------------
// CRUD
// ---------------------------------------------------------------------------

/// Create an order. The total is computed server-side from the line items
/// plus the delivery fee; a counter sale created directly in `Delivered`
/// gets its completion effects applied in the same transaction.
pub fn create_order(db: &DbState, input: &OrderInput) -> Result<Order, String> {
    if input.items.is_empty() {
        return Err("Order has no items".into());
    }
    for item in &input.items {
        if item.name.trim().is_empty() {
            return Err("Order item is missing a name".into());
        }
        if item.quantity <= 0.0 {
            return Err(format!("Invalid quantity for item {}", item.name));
        }
    }
    let status = input.status.unwrap_or(OrderStatus::New);
    if status == OrderStatus::Cancelled {
        return Err("Cannot create an order as cancelled".into());
    }

    let customer_name = input
        .customer_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("Walk-in customer")
        .to_string();

    let items_total: f64 = input
        .items
        .iter()
        .map(|i| i.quantity * i.unit_price)
        .sum();
    let total_amount = items_total + input.delivery_fee;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    let items_json =
        serde_json::to_string(&input.items).map_err(|e| format!("serialize items: {e}"))?;

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(|e| format!("begin transaction: {e}"))?;

    let result = (|| -> Result<Order, String> {
        let order_number: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(order_number), 0) + 1 FROM orders",
                [],
                |row| row.get(0),
            )
            .map_err(|e| e.to_string())?;

        conn.execute(
            "INSERT INTO orders (
                id, order_number, customer_name, customer_phone, customer_address,
                items, total_amount, delivery_fee, change_for, payment_method,
                status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            params![
                id,
                order_number,
                customer_name,
                input.customer_phone,
                input.customer_address,
                items_json,
                total_amount,
                input.delivery_fee,
                input.change_for,
                input.payment_method,
                status.as_str(),
                now,
            ],
        )
        .map_err(|e| format!("insert order: {e}"))?;

        let mut order = get_order(&conn, &id)?.ok_or("Order vanished after insert")?;

        if status == OrderStatus::Delivered {
            apply_completion_effects(&conn, &order, &now)?;
            order.completed_at = Some(now.clone());
        }

        Ok(order)
    })();

    match result {
        Ok(order) => {
            conn.execute_batch("COMMIT")
                .map_err(|e| format!("commit: {e}"))?;
            info!(
                order_id = %order.id,
                order_number = order.order_number,
                total = %order.total_amount,
                status = %order.status.as_str(),
                "order created"
            );
            Ok(order)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

/// The active board: everything except cancelled, newest first.
pub fn list_active(db: &DbState) -> Result<Vec<Order>, String> {
    list_filtered(db, "WHERE status != 'cancelled'")
}

/// Every order, including cancelled, newest first.
pub fn list_all(db: &DbState) -> Result<Vec<Order>, String> {
    list_filtered(db, "")
}

fn list_filtered(db: &DbState, where_clause: &str) -> Result<Vec<Order>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let sql = format!("SELECT * FROM orders {where_clause} ORDER BY created_at DESC");
    let mut stmt = conn.prepare(&sql).map_err(|e| e.to_string())?;
    let rows = stmt.query_map([], order_from_row).map_err(|e| e.to_string())?;

    let mut orders = Vec::new();
    for row in rows {
        orders.push(finish_order(row.map_err(|e| e.to_string())?)?);
    }
    Ok(orders)
}

/// Advance one stage. At the terminal stage this is a no-op returning the
/// unchanged order; on the `OutForDelivery → Delivered` transition the
/// completion effects are applied (at most once, ever).
pub fn advance_status(db: &DbState, order_id: &str) -> Result<AdvanceOutcome, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(|e| format!("begin transaction: {e}"))?;

    let result = (|| -> Result<AdvanceOutcome, String> {
        let order = get_order(&conn, order_id)?.ok_or("Order not found")?;

        if order.status == OrderStatus::Cancelled {
            return Err("Cancelled orders cannot advance".into());
        }
        let next = match order.status.next() {
            Some(next) => next,
            // Terminal stage: stay put.
            None => {
                return Ok(AdvanceOutcome {
                    order,
                    completed: false,
                })
            }
        };

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![next.as_str(), now, order_id],
        )
        .map_err(|e| format!("update status: {e}"))?;

        let mut completed = false;
        if next == OrderStatus::Delivered && order.completed_at.is_none() {
            apply_completion_effects(&conn, &order, &now)?;
            completed = true;
        }

        let order = get_order(&conn, order_id)?.ok_or("Order vanished during advance")?;
        Ok(AdvanceOutcome { order, completed })
    })();

    match result {
        Ok(outcome) => {
            conn.execute_batch("COMMIT")
                .map_err(|e| format!("commit: {e}"))?;
            info!(
                order_id = %order_id,
                status = %outcome.order.status.as_str(),
                completed = outcome.completed,
                "order advanced"
            );
            Ok(outcome)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

/// Move a not-yet-delivered order off the board.
pub fn cancel_order(db: &DbState, order_id: &str) -> Result<Order, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let order = get_order(&conn, order_id)?.ok_or("Order not found")?;
    if order.status == OrderStatus::Delivered {
        return Err("Delivered orders cannot be cancelled".into());
    }

    conn.execute(
        "UPDATE orders SET status = 'cancelled', updated_at = ?1 WHERE id = ?2",
        params![Utc::now().to_rfc3339(), order_id],
    )
    .map_err(|e| format!("cancel order: {e}"))?;

    info!(order_id = %order_id, "order cancelled");
    get_order(&conn, order_id)?.ok_or_else(|| "Order vanished during cancel".into())
}

/// Delete an order at any stage. Already-applied completion effects are
/// not reversed; the ledger backlink is nulled by the FK.
pub fn delete_order(db: &DbState, order_id: &str) -> Result<(), String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let changed = conn
        .execute("DELETE FROM orders WHERE id = ?1", params![order_id])
        .map_err(|e| format!("delete order: {e}"))?;
    if changed == 0 {
        return Err("Order not found".into());
    }
    info!(order_id = %order_id, "order deleted");
    Ok(())
}

// ---------------------------------------------------------------------------
// Completion side effects
// ---------------------------------------------------------------------------

/// Record the sale and consume stock. Runs on an already-held connection
/// inside the caller's transaction; callers guarantee `completed_at` was
/// NULL before invoking and stamp it here.
fn apply_completion_effects(conn: &Connection, order: &Order, now: &str) -> Result<(), String> {
    finance::insert_with_conn(
        conn,
        &TransactionInput {
            description: format!("Sale: {} (#{})", order.customer_name, order.order_number),
            amount: order.total_amount,
            entry_type: EntryType::Income,
            category: "Sales".into(),
            entry_date: None,
            due_date: None,
            payment_method: order.payment_method.clone(),
            attachment_name: None,
            attachment_path: None,
        },
        Some(&order.id),
    )?;

    for item in &order.items {
        let product_id = menu::resolve_product_id(conn, item.product_id.as_deref(), &item.name)?;
        let product_id = match product_id {
            Some(id) => id,
            None => {
                // Hand-typed line with no menu counterpart: nothing to consume.
                warn!(order_id = %order.id, item = %item.name, "no menu product for order line");
                continue;
            }
        };

        for line in menu::recipe_lines(conn, &product_id)? {
            inventory::decrement_with_conn(
                conn,
                &line.stock_item_id,
                line.quantity * item.quantity,
                now,
            )?;
        }
    }

    conn.execute(
        "UPDATE orders SET completed_at = ?1 WHERE id = ?2",
        params![now, order.id],
    )
    .map_err(|e| format!("stamp completion: {e}"))?;

    Ok(())
}
