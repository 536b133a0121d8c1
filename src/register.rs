//! Cash register sessions.
//!
//! A session is one shift's opening-to-closing period. Sessions are rows
//! in the database (not frontend-local storage), so every window sees the
//! same register and closed sessions remain auditable. Reconciliation
//! compares the physically counted cash against the expected balance
//! derived from the ledger.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::DbState;
use crate::finance;

/// Variances below one cent are rounding noise, not divergence.
pub const DIVERGENCE_THRESHOLD: f64 = 0.01;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashSession {
    pub id: String,
    pub responsible: String,
    pub opening_float: f64,
    pub status: String,
    pub opened_at: String,
    pub closed_at: Option<String>,
    pub counted_cash: Option<f64>,
    pub expected_balance: Option<f64>,
    pub variance: Option<f64>,
}

/// Live numbers for the open session.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session: CashSession,
    pub income_total: f64,
    pub expense_total: f64,
    pub expected_balance: f64,
    pub income_by_category: Vec<CategorySummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub category: String,
    pub entries: i64,
    pub total: f64,
}

/// Outcome of a close attempt.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseOutcome {
    pub session: Option<CashSession>,
    pub expected_balance: f64,
    pub variance: f64,
    pub divergent: bool,
    /// False when a divergent close was refused pending confirmation.
    pub closed: bool,
}

fn session_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CashSession> {
    Ok(CashSession {
        id: row.get("id")?,
        responsible: row.get("responsible")?,
        opening_float: row.get("opening_float")?,
        status: row.get("status")?,
        opened_at: row.get("opened_at")?,
        closed_at: row.get("closed_at")?,
        counted_cash: row.get("counted_cash")?,
        expected_balance: row.get("expected_balance")?,
        variance: row.get("variance")?,
    })
}

fn open_session_row(conn: &Connection) -> Result<Option<CashSession>, String> {
    conn.query_row(
        "SELECT * FROM cash_sessions WHERE status = 'open'",
        [],
        session_from_row,
    )
    .optional()
    .map_err(|e| e.to_string())
}

/// The date (YYYY-MM-DD) the session's ledger window starts at.
fn session_period_start(session: &CashSession) -> String {
    session.opened_at.chars().take(10).collect()
}

/// Open the register. Fails when a session is already open.
pub fn open_session(
    db: &DbState,
    responsible: &str,
    opening_float: f64,
) -> Result<CashSession, String> {
    if responsible.trim().is_empty() {
        return Err("Responsible party is required".into());
    }
    if opening_float < 0.0 {
        return Err("Opening float cannot be negative".into());
    }

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    if open_session_row(&conn)?.is_some() {
        return Err("The register is already open".into());
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO cash_sessions (
            id, responsible, opening_float, status, opened_at, created_at, updated_at
        ) VALUES (?1, ?2, ?3, 'open', ?4, ?4, ?4)",
        params![id, responsible.trim(), opening_float, now],
    )
    .map_err(|e| format!("open cash session: {e}"))?;

    info!(session_id = %id, responsible = %responsible.trim(), opening_float, "register opened");

    conn.query_row(
        "SELECT * FROM cash_sessions WHERE id = ?1",
        params![id],
        session_from_row,
    )
    .map_err(|e| e.to_string())
}

/// The open session, if any.
pub fn active_session(db: &DbState) -> Result<Option<CashSession>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    open_session_row(&conn)
}

/// Live report for the open session.
pub fn session_report(db: &DbState) -> Result<SessionReport, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let session = open_session_row(&conn)?.ok_or("The register is not open")?;

    let from = session_period_start(&session);
    let (income_total, expense_total) = finance::period_totals(&conn, &from)?;
    let expected_balance = session.opening_float + income_total - expense_total;
    let income_by_category = finance::income_by_category(&conn, &from)?
        .into_iter()
        .map(|(category, entries, total)| CategorySummary {
            category,
            entries,
            total,
        })
        .collect();

    Ok(SessionReport {
        session,
        income_total,
        expense_total,
        expected_balance,
        income_by_category,
    })
}

/// Close the register against a physically counted amount.
///
/// `expected = opening_float + income − expense` over ledger entries dated
/// on/after the session's opening date; `variance = counted − expected`.
/// A divergent close (|variance| ≥ 0.01) needs `force = true`: the first
/// attempt comes back `closed: false` so the frontend can ask for the
/// extra confirmation, but a confirmed close is never blocked.
pub fn close_session(db: &DbState, counted_cash: f64, force: bool) -> Result<CloseOutcome, String> {
    if counted_cash < 0.0 {
        return Err("Counted cash cannot be negative".into());
    }

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let session = open_session_row(&conn)?.ok_or("The register is not open")?;

    let from = session_period_start(&session);
    let (income, expense) = finance::period_totals(&conn, &from)?;
    let expected_balance = session.opening_float + income - expense;
    let variance = counted_cash - expected_balance;
    let divergent = variance.abs() >= DIVERGENCE_THRESHOLD;

    if divergent && !force {
        warn!(
            session_id = %session.id,
            variance,
            "divergent close refused pending confirmation"
        );
        return Ok(CloseOutcome {
            session: None,
            expected_balance,
            variance,
            divergent,
            closed: false,
        });
    }

    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE cash_sessions
         SET status = 'closed', closed_at = ?1, counted_cash = ?2,
             expected_balance = ?3, variance = ?4, updated_at = ?1
         WHERE id = ?5",
        params![now, counted_cash, expected_balance, variance, session.id],
    )
    .map_err(|e| format!("close cash session: {e}"))?;

    info!(
        session_id = %session.id,
        expected = expected_balance,
        counted = counted_cash,
        variance,
        divergent,
        "register closed"
    );

    let session = conn
        .query_row(
            "SELECT * FROM cash_sessions WHERE id = ?1",
            params![session.id],
            session_from_row,
        )
        .map_err(|e| e.to_string())?;

    Ok(CloseOutcome {
        session: Some(session),
        expected_balance,
        variance,
        divergent,
        closed: true,
    })
}

/// Closed sessions, most recent first.
pub fn session_history(db: &DbState, limit: i64) -> Result<Vec<CashSession>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare(
            "SELECT * FROM cash_sessions WHERE status = 'closed'
             ORDER BY closed_at DESC LIMIT ?1",
        )
        .map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map(params![limit.max(1)], session_from_row)
        .map_err(|e| e.to_string())?;
    rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finance::{EntryType, TransactionInput};
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

    fn today_entry(db: &DbState, entry_type: EntryType, amount: f64) {
        finance::add_transaction(
            db,
            &TransactionInput {
                description: "entry".into(),
                amount,
                entry_type,
                category: "Sales".into(),
                entry_date: None, // today
                due_date: None,
                payment_method: None,
                attachment_name: None,
                attachment_path: None,
            },
        )
        .expect("add entry");
    }

    #[test]
    fn only_one_open_session() {
        let db = test_db();
        open_session(&db, "ana", 100.0).expect("open");
        let second = open_session(&db, "rui", 50.0);
        assert!(second.is_err());
    }

    #[test]
    fn expected_balance_and_divergence() {
        let db = test_db();
        open_session(&db, "ana", 100.0).expect("open");
        today_entry(&db, EntryType::Income, 500.0);
        today_entry(&db, EntryType::Expense, 200.0);

        // counted 395 against expected 400: variance -5, divergent
        let out = close_session(&db, 395.0, false).expect("close attempt");
        assert!((out.expected_balance - 400.0).abs() < 1e-9);
        assert!((out.variance + 5.0).abs() < 1e-9);
        assert!(out.divergent);
        assert!(!out.closed, "divergent close needs confirmation");

        // still open; confirmed close goes through
        assert!(active_session(&db).unwrap().is_some());
        let out = close_session(&db, 395.0, true).expect("forced close");
        assert!(out.closed);
        let session = out.session.expect("closed session");
        assert_eq!(session.status, "closed");
        assert!((session.variance.unwrap() + 5.0).abs() < 1e-9);
        assert!(active_session(&db).unwrap().is_none());
    }

    #[test]
    fn exact_count_closes_without_force() {
        let db = test_db();
        open_session(&db, "ana", 100.0).expect("open");
        today_entry(&db, EntryType::Income, 500.0);
        today_entry(&db, EntryType::Expense, 200.0);

        let out = close_session(&db, 400.0, false).expect("close");
        assert!(!out.divergent);
        assert!(out.closed);
        assert_eq!(out.variance, 0.0);
    }

    #[test]
    fn sub_cent_variance_is_not_divergent() {
        let db = test_db();
        open_session(&db, "ana", 100.0).expect("open");
        let out = close_session(&db, 100.005, false).expect("close");
        assert!(!out.divergent);
        assert!(out.closed);
    }

    #[test]
    fn report_requires_an_open_session() {
        let db = test_db();
        assert!(session_report(&db).is_err());

        open_session(&db, "ana", 50.0).expect("open");
        today_entry(&db, EntryType::Income, 120.0);
        let report = session_report(&db).expect("report");
        assert!((report.expected_balance - 170.0).abs() < 1e-9);
        assert_eq!(report.income_by_category.len(), 1);
        assert_eq!(report.income_by_category[0].category, "Sales");
    }

    #[test]
    fn closed_sessions_appear_in_history() {
        let db = test_db();
        open_session(&db, "ana", 10.0).expect("open");
        close_session(&db, 10.0, false).expect("close");
        open_session(&db, "rui", 20.0).expect("reopen");

        let history = session_history(&db, 10).expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].responsible, "ana");
    }
}
