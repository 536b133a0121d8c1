//! Local SQLite database layer for Forno Back-Office.
//!
//! Uses rusqlite with WAL mode. Provides schema migrations, settings
//! helpers, and managed state for use across Tauri commands. The database
//! is the system of record: orders, stock, menu, ledger, payroll, and cash
//! sessions all live here under one canonical schema.

use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

/// Tauri managed state holding the database connection.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 6;

/// Initialize the database at `{app_data_dir}/backoffice.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. On corruption or open failure,
/// deletes the file and retries once.
pub fn init(app_data_dir: &Path) -> Result<DbState, String> {
    fs::create_dir_all(app_data_dir).map_err(|e| format!("Failed to create data dir: {e}"))?;

    let db_path = app_data_dir.join("backoffice.db");
    info!("Opening database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(
                "Database open failed ({}), deleting and retrying once",
                first_err
            );
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                // Also remove WAL/SHM files if present
                let wal = db_path.with_extension("db-wal");
                let shm = db_path.with_extension("db-shm");
                let _ = fs::remove_file(&wal);
                let _ = fs::remove_file(&shm);
            }
            open_and_configure(&db_path)
                .map_err(|e| format!("Database open failed after retry: {e}"))?
        }
    };

    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection, String> {
    let conn = Connection::open(path).map_err(|e| format!("sqlite open: {e}"))?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(|e| format!("pragma setup: {e}"))?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<(), String> {
    // Ensure schema_version table exists first
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("create schema_version: {e}"))?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }
    if current < 3 {
        migrate_v3(conn)?;
    }
    if current < 4 {
        migrate_v4(conn)?;
    }
    if current < 5 {
        migrate_v5(conn)?;
    }
    if current < 6 {
        migrate_v6(conn)?;
    }

    Ok(())
}

/// Migration v1: settings, users, and the order board.
fn migrate_v1(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        -- local_settings (category/key/value store)
        CREATE TABLE IF NOT EXISTS local_settings (
            id TEXT PRIMARY KEY DEFAULT (lower(hex(randomblob(16)))),
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(setting_category, setting_key)
        );

        -- local user accounts (bcrypt password hashes)
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            display_name TEXT,
            role TEXT NOT NULL DEFAULT 'staff'
                CHECK (role IN ('admin', 'staff')),
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );

        -- orders (line items as a JSON array in `items`)
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            order_number INTEGER NOT NULL,
            customer_name TEXT NOT NULL,
            customer_phone TEXT,
            customer_address TEXT,
            items TEXT NOT NULL DEFAULT '[]',
            total_amount REAL NOT NULL DEFAULT 0,
            delivery_fee REAL NOT NULL DEFAULT 0,
            change_for REAL,
            payment_method TEXT,
            status TEXT NOT NULL DEFAULT 'new'
                CHECK (status IN ('new', 'preparing', 'ready',
                                  'out_for_delivery', 'delivered', 'cancelled')),
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| format!("migration v1: {e}"))?;
    Ok(())
}

/// Migration v2: inventory and menu (products + recipe links).
fn migrate_v2(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS stock_items (
            id TEXT PRIMARY KEY,
            code TEXT,
            name TEXT NOT NULL,
            unit TEXT NOT NULL DEFAULT 'un',
            category TEXT,
            stock_quantity REAL NOT NULL DEFAULT 0,
            cost_per_unit REAL NOT NULL DEFAULT 0,
            min_stock REAL NOT NULL DEFAULT 0,
            supplier TEXT,
            last_buy TEXT,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS menu_products (
            id TEXT PRIMARY KEY,
            code TEXT,
            name TEXT NOT NULL,
            description TEXT,
            category TEXT,
            sale_price REAL NOT NULL DEFAULT 0,
            available INTEGER NOT NULL DEFAULT 1,
            image_path TEXT,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );

        -- many-to-many: product consumes stock item
        CREATE TABLE IF NOT EXISTS recipe_ingredients (
            product_id TEXT NOT NULL
                REFERENCES menu_products(id) ON DELETE CASCADE,
            stock_item_id TEXT NOT NULL
                REFERENCES stock_items(id) ON DELETE CASCADE,
            quantity REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (product_id, stock_item_id)
        );

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| format!("migration v2: {e}"))?;
    Ok(())
}

/// Migration v3: financial ledger.
fn migrate_v3(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            description TEXT NOT NULL,
            amount REAL NOT NULL DEFAULT 0,
            entry_type TEXT NOT NULL
                CHECK (entry_type IN ('income', 'expense')),
            category TEXT NOT NULL DEFAULT 'General',
            entry_date TEXT NOT NULL,
            due_date TEXT,
            payment_method TEXT,
            attachment_name TEXT,
            attachment_path TEXT,
            order_id TEXT REFERENCES orders(id) ON DELETE SET NULL,
            created_at TEXT DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_transactions_entry_date
            ON transactions(entry_date);
        CREATE INDEX IF NOT EXISTS idx_transactions_type
            ON transactions(entry_type);

        INSERT INTO schema_version (version) VALUES (3);
        ",
    )
    .map_err(|e| format!("migration v3: {e}"))?;
    Ok(())
}

/// Migration v4: employees and monthly payroll events.
fn migrate_v4(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS employees (
            id TEXT PRIMARY KEY,
            code TEXT,
            name TEXT NOT NULL,
            position TEXT,
            contract_type TEXT NOT NULL DEFAULT 'salaried'
                CHECK (contract_type IN ('salaried', 'daily', 'hourly')),
            base_salary REAL NOT NULL DEFAULT 0,
            commission_rate REAL NOT NULL DEFAULT 0,
            admission_date TEXT,
            phone TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );

        -- one row per employee per reference month (YYYY-MM)
        CREATE TABLE IF NOT EXISTS payroll_events (
            id TEXT PRIMARY KEY,
            employee_id TEXT NOT NULL
                REFERENCES employees(id) ON DELETE CASCADE,
            month TEXT NOT NULL,
            worked_days REAL NOT NULL DEFAULT 30,
            worked_hours REAL NOT NULL DEFAULT 220,
            custom_rate REAL NOT NULL DEFAULT 0,
            extra_hours REAL NOT NULL DEFAULT 0,
            sales_amount REAL NOT NULL DEFAULT 0,
            bonus REAL NOT NULL DEFAULT 0,
            discounts REAL NOT NULL DEFAULT 0,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE (employee_id, month)
        );

        INSERT INTO schema_version (version) VALUES (4);
        ",
    )
    .map_err(|e| format!("migration v4: {e}"))?;
    Ok(())
}

/// Migration v5: cash register sessions (moved out of frontend storage).
fn migrate_v5(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS cash_sessions (
            id TEXT PRIMARY KEY,
            responsible TEXT NOT NULL,
            opening_float REAL NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'open'
                CHECK (status IN ('open', 'closed')),
            opened_at TEXT NOT NULL,
            closed_at TEXT,
            counted_cash REAL,
            expected_balance REAL,
            variance REAL,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );

        -- at most one open session at a time
        CREATE UNIQUE INDEX IF NOT EXISTS idx_cash_sessions_single_open
            ON cash_sessions(status) WHERE status = 'open';

        INSERT INTO schema_version (version) VALUES (5);
        ",
    )
    .map_err(|e| format!("migration v5: {e}"))?;
    Ok(())
}

/// Migration v6: completion stamp on orders.
///
/// `completed_at` is the idempotence guard for delivery side effects: the
/// ledger entry and stock decrements are applied only while it is NULL.
fn migrate_v6(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        ALTER TABLE orders ADD COLUMN completed_at TEXT;

        CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);
        CREATE INDEX IF NOT EXISTS idx_orders_created_at ON orders(created_at);

        INSERT INTO schema_version (version) VALUES (6);
        ",
    )
    .map_err(|e| format!("migration v6: {e}"))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

/// Read a single setting value, or `None` when absent.
pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .ok()
}

/// Upsert a single setting value.
pub fn set_setting(
    conn: &Connection,
    category: &str,
    key: &str,
    value: &str,
) -> Result<(), String> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key)
         DO UPDATE SET setting_value = ?3, updated_at = datetime('now')",
        params![category, key, value],
    )
    .map_err(|e| format!("set setting {category}/{key}: {e}"))?;
    Ok(())
}

/// Return every setting grouped by category as a JSON object.
pub fn get_all_settings(conn: &Connection) -> serde_json::Value {
    let mut result = serde_json::Map::new();

    let mut stmt = match conn.prepare(
        "SELECT setting_category, setting_key, setting_value FROM local_settings
         ORDER BY setting_category, setting_key",
    ) {
        Ok(s) => s,
        Err(_) => return serde_json::Value::Object(result),
    };

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    });

    if let Ok(rows) = rows {
        for row in rows.flatten() {
            let (category, key, value) = row;
            let entry = result
                .entry(category)
                .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
            if let Some(obj) = entry.as_object_mut() {
                obj.insert(key, serde_json::Value::String(value));
            }
        }
    }

    serde_json::Value::Object(result)
}

/// Delete every setting in a category.
pub fn delete_all_settings(conn: &Connection, category: &str) -> Result<(), String> {
    conn.execute(
        "DELETE FROM local_settings WHERE setting_category = ?1",
        params![category],
    )
    .map_err(|e| format!("delete settings {category}: {e}"))?;
    Ok(())
}

/// Test hook: run migrations on an arbitrary (usually in-memory) connection.
pub fn run_migrations_for_test(conn: &Connection) {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .expect("enable foreign keys");
    run_migrations(conn).expect("run_migrations should succeed in test");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .expect("pragma");
        conn
    }

    #[test]
    fn init_creates_database_file_and_survives_reopen() {
        let dir = tempfile::tempdir().expect("temp dir");

        let db_state = init(dir.path()).expect("first init");
        assert!(db_state.db_path.exists());
        {
            let conn = db_state.conn.lock().unwrap();
            set_setting(&conn, "app", "theme", "dark").expect("set");
        }
        drop(db_state);

        // Re-opening runs no migrations and keeps the data
        let db_state = init(dir.path()).expect("second init");
        let conn = db_state.conn.lock().unwrap();
        assert_eq!(get_setting(&conn, "app", "theme"), Some("dark".into()));
    }

    #[test]
    fn migrations_reach_current_version() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .expect("read version");
        assert_eq!(version, CURRENT_SCHEMA_VERSION);

        // Re-running is a no-op
        run_migrations(&conn).expect("idempotent migrations");
    }

    #[test]
    fn orders_status_check_constraint() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        conn.execute(
            "INSERT INTO orders (id, order_number, customer_name, items, status, created_at, updated_at)
             VALUES ('ord-1', 1, 'Maria', '[]', 'new', datetime('now'), datetime('now'))",
            [],
        )
        .expect("insert order");

        let bad = conn.execute(
            "INSERT INTO orders (id, order_number, customer_name, items, status, created_at, updated_at)
             VALUES ('ord-bad', 2, 'Maria', '[]', 'INVALID', datetime('now'), datetime('now'))",
            [],
        );
        assert!(bad.is_err(), "invalid status should be rejected");
    }

    #[test]
    fn recipe_links_cascade_with_product() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        conn.execute(
            "INSERT INTO stock_items (id, name, unit, stock_quantity, cost_per_unit)
             VALUES ('stk-1', 'Mozzarella', 'kg', 10, 42.0)",
            [],
        )
        .expect("insert stock item");
        conn.execute(
            "INSERT INTO menu_products (id, name, sale_price) VALUES ('prd-1', 'Margherita', 45.9)",
            [],
        )
        .expect("insert product");
        conn.execute(
            "INSERT INTO recipe_ingredients (product_id, stock_item_id, quantity)
             VALUES ('prd-1', 'stk-1', 0.3)",
            [],
        )
        .expect("insert link");

        conn.execute("DELETE FROM menu_products WHERE id = 'prd-1'", [])
            .expect("delete product");

        let count: i32 = conn
            .query_row("SELECT COUNT(*) FROM recipe_ingredients", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(count, 0, "links should cascade-delete with the product");
    }

    #[test]
    fn payroll_event_unique_per_employee_month() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        conn.execute(
            "INSERT INTO employees (id, name, contract_type, base_salary)
             VALUES ('emp-1', 'João', 'salaried', 3000)",
            [],
        )
        .expect("insert employee");
        conn.execute(
            "INSERT INTO payroll_events (id, employee_id, month) VALUES ('ev-1', 'emp-1', '2025-06')",
            [],
        )
        .expect("insert event");

        let dup = conn.execute(
            "INSERT INTO payroll_events (id, employee_id, month) VALUES ('ev-2', 'emp-1', '2025-06')",
            [],
        );
        assert!(dup.is_err(), "duplicate employee+month should be rejected");
    }

    #[test]
    fn at_most_one_open_cash_session() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        conn.execute(
            "INSERT INTO cash_sessions (id, responsible, opening_float, status, opened_at)
             VALUES ('cs-1', 'ana', 100, 'open', datetime('now'))",
            [],
        )
        .expect("open first session");

        let second = conn.execute(
            "INSERT INTO cash_sessions (id, responsible, opening_float, status, opened_at)
             VALUES ('cs-2', 'ana', 50, 'open', datetime('now'))",
            [],
        );
        assert!(second.is_err(), "second open session should be rejected");

        // Closing the first frees the slot
        conn.execute(
            "UPDATE cash_sessions SET status = 'closed', closed_at = datetime('now') WHERE id = 'cs-1'",
            [],
        )
        .expect("close first session");
        conn.execute(
            "INSERT INTO cash_sessions (id, responsible, opening_float, status, opened_at)
             VALUES ('cs-3', 'ana', 80, 'open', datetime('now'))",
            [],
        )
        .expect("open after close");
    }

    #[test]
    fn settings_crud() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        set_setting(&conn, "app", "theme", "dark").expect("set");
        assert_eq!(get_setting(&conn, "app", "theme"), Some("dark".into()));

        set_setting(&conn, "app", "theme", "light").expect("update");
        assert_eq!(get_setting(&conn, "app", "theme"), Some("light".into()));

        delete_all_settings(&conn, "app").expect("delete");
        assert!(get_setting(&conn, "app", "theme").is_none());
    }
}
