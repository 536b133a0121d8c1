//! Financial ledger: income and expense entries.
//!
//! Entries come from four places: the manual form, AI-scanned documents,
//! order completion (income), and payroll consolidation (expense). The
//! register module reads period totals from here when reconciling a cash
//! session.

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::db::DbState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Income,
    Expense,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Income => "income",
            EntryType::Expense => "expense",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "income" => Ok(EntryType::Income),
            "expense" => Ok(EntryType::Expense),
            other => Err(format!("Unknown entry type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub description: String,
    pub amount: f64,
    pub entry_type: EntryType,
    pub category: String,
    pub entry_date: String,
    pub due_date: Option<String>,
    pub payment_method: Option<String>,
    pub attachment_name: Option<String>,
    pub attachment_path: Option<String>,
    pub order_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInput {
    pub description: String,
    pub amount: f64,
    pub entry_type: EntryType,
    pub category: String,
    /// Defaults to today when omitted.
    pub entry_date: Option<String>,
    pub due_date: Option<String>,
    pub payment_method: Option<String>,
    pub attachment_name: Option<String>,
    pub attachment_path: Option<String>,
}

fn transaction_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Transaction, String)> {
    let raw_type: String = row.get("entry_type")?;
    let tx = Transaction {
        id: row.get("id")?,
        description: row.get("description")?,
        amount: row.get("amount")?,
        entry_type: EntryType::Income, // fixed up by the caller
        category: row.get("category")?,
        entry_date: row.get("entry_date")?,
        due_date: row.get("due_date")?,
        payment_method: row.get("payment_method")?,
        attachment_name: row.get("attachment_name")?,
        attachment_path: row.get("attachment_path")?,
        order_id: row.get("order_id")?,
        created_at: row.get("created_at")?,
    };
    Ok((tx, raw_type))
}

fn finish_transaction(pair: (Transaction, String)) -> Result<Transaction, String> {
    let (mut tx, raw) = pair;
    tx.entry_type = EntryType::parse(&raw)?;
    Ok(tx)
}

/// Insert a ledger row on an already-held connection. Used by order
/// completion so the entry lands inside the same transaction as the
/// status change.
pub fn insert_with_conn(
    conn: &Connection,
    input: &TransactionInput,
    order_id: Option<&str>,
) -> Result<Transaction, String> {
    if input.description.trim().is_empty() {
        return Err("Description is required".into());
    }
    if input.amount <= 0.0 {
        return Err("Amount must be greater than zero".into());
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let entry_date = input
        .entry_date
        .clone()
        .unwrap_or_else(|| now.format("%Y-%m-%d").to_string());

    conn.execute(
        "INSERT INTO transactions (
            id, description, amount, entry_type, category, entry_date,
            due_date, payment_method, attachment_name, attachment_path,
            order_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            id,
            input.description.trim(),
            input.amount,
            input.entry_type.as_str(),
            input.category,
            entry_date,
            input.due_date,
            input.payment_method,
            input.attachment_name,
            input.attachment_path,
            order_id,
            now.to_rfc3339(),
        ],
    )
    .map_err(|e| format!("insert transaction: {e}"))?;

    Ok(Transaction {
        id,
        description: input.description.trim().to_string(),
        amount: input.amount,
        entry_type: input.entry_type,
        category: input.category.clone(),
        entry_date,
        due_date: input.due_date.clone(),
        payment_method: input.payment_method.clone(),
        attachment_name: input.attachment_name.clone(),
        attachment_path: input.attachment_path.clone(),
        order_id: order_id.map(|s| s.to_string()),
        created_at: now.to_rfc3339(),
    })
}

/// Create a ledger entry from the form (or a scanned document).
pub fn add_transaction(db: &DbState, input: &TransactionInput) -> Result<Transaction, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let tx = insert_with_conn(&conn, input, None)?;
    info!(
        transaction_id = %tx.id,
        entry_type = %tx.entry_type.as_str(),
        amount = %tx.amount,
        "ledger entry created"
    );
    Ok(tx)
}

/// Every ledger entry, newest entry date first.
pub fn list_transactions(db: &DbState) -> Result<Vec<Transaction>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare("SELECT * FROM transactions ORDER BY entry_date DESC, created_at DESC")
        .map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map([], transaction_from_row)
        .map_err(|e| e.to_string())?;

    let mut out = Vec::new();
    for row in rows {
        out.push(finish_transaction(row.map_err(|e| e.to_string())?)?);
    }
    Ok(out)
}

/// Delete one entry. Confirmation is a frontend concern.
pub fn delete_transaction(db: &DbState, transaction_id: &str) -> Result<(), String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let changed = conn
        .execute(
            "DELETE FROM transactions WHERE id = ?1",
            params![transaction_id],
        )
        .map_err(|e| format!("delete transaction: {e}"))?;
    if changed == 0 {
        return Err("Transaction not found".into());
    }
    info!(transaction_id = %transaction_id, "ledger entry deleted");
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayStats {
    pub income: f64,
    pub expense: f64,
    pub balance: f64,
    pub due_today: f64,
}

/// Dashboard numbers: lifetime income/expense/balance plus the expenses
/// whose due date is today.
pub fn today_stats(db: &DbState) -> Result<TodayStats, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let today = Utc::now().format("%Y-%m-%d").to_string();

    let sum = |sql: &str, args: &[&dyn rusqlite::ToSql]| -> Result<f64, String> {
        conn.query_row(sql, args, |row| row.get::<_, f64>(0))
            .map_err(|e| e.to_string())
    };

    let income = sum(
        "SELECT COALESCE(SUM(amount), 0) FROM transactions WHERE entry_type = 'income'",
        &[],
    )?;
    let expense = sum(
        "SELECT COALESCE(SUM(amount), 0) FROM transactions WHERE entry_type = 'expense'",
        &[],
    )?;
    let due_today = sum(
        "SELECT COALESCE(SUM(amount), 0) FROM transactions
         WHERE entry_type = 'expense' AND due_date = ?1",
        &[&today],
    )?;

    Ok(TodayStats {
        income,
        expense,
        balance: income - expense,
        due_today,
    })
}

/// Income and expense totals for entries dated on/after `from_date`
/// (YYYY-MM-DD). Used for cash-session reconciliation.
pub fn period_totals(conn: &Connection, from_date: &str) -> Result<(f64, f64), String> {
    let income: f64 = conn
        .query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM transactions
             WHERE entry_type = 'income' AND entry_date >= ?1",
            params![from_date],
            |row| row.get(0),
        )
        .map_err(|e| e.to_string())?;
    let expense: f64 = conn
        .query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM transactions
             WHERE entry_type = 'expense' AND entry_date >= ?1",
            params![from_date],
            |row| row.get(0),
        )
        .map_err(|e| e.to_string())?;
    Ok((income, expense))
}

/// Today's income grouped by category: (category, entry count, total).
pub fn income_by_category(
    conn: &Connection,
    from_date: &str,
) -> Result<Vec<(String, i64, f64)>, String> {
    let mut stmt = conn
        .prepare(
            "SELECT category, COUNT(*), COALESCE(SUM(amount), 0)
             FROM transactions
             WHERE entry_type = 'income' AND entry_date >= ?1
             GROUP BY category ORDER BY category",
        )
        .map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map(params![from_date], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .map_err(|e| e.to_string())?;
    rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
}
