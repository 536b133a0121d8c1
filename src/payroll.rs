//! Payroll for the reference month.
//!
//! Pay is derived from the employee's contract type plus that month's
//! recorded event (worked units, extras, bonus, discounts, commission
//! basis). An employee without an event row for the month is assumed to
//! have worked the full month (30 days / 220 hours) with no extras.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::db::DbState;
use crate::finance;

/// Hours a salaried month is divided into when deriving an hourly rate.
const SALARIED_MONTH_HOURS: f64 = 220.0;
/// Hours assumed per daily-rate shift when deriving an hourly rate.
const DAILY_SHIFT_HOURS: f64 = 8.0;
/// Overtime multiplier. Single tier.
const OVERTIME_MULTIPLIER: f64 = 1.5;
/// Illustrative employer-burden rate over the taxable gross. Shown
/// separately and labelled non-authoritative; daily contracts are exempt
/// in this projection.
const EMPLOYER_BURDEN_RATE: f64 = 0.40;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Employee pay basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractType {
    /// Fixed monthly salary, prorated by worked days.
    Salaried,
    /// Paid per day worked.
    Daily,
    /// Paid per hour worked.
    Hourly,
}

impl ContractType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractType::Salaried => "salaried",
            ContractType::Daily => "daily",
            ContractType::Hourly => "hourly",
        }
    }

    /// Parse the DB representation. Unknown tags are an error rather than
    /// a silently zero-paying fallback.
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "salaried" => Ok(ContractType::Salaried),
            "daily" => Ok(ContractType::Daily),
            "hourly" => Ok(ContractType::Hourly),
            other => Err(format!("Unknown contract type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: String,
    pub code: Option<String>,
    pub name: String,
    pub position: Option<String>,
    pub contract_type: ContractType,
    pub base_salary: f64,
    pub commission_rate: f64,
    pub admission_date: Option<String>,
    pub phone: Option<String>,
    pub active: bool,
}

/// One employee's recorded numbers for a reference month (YYYY-MM).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayrollEvent {
    pub employee_id: String,
    pub month: String,
    pub worked_days: f64,
    pub worked_hours: f64,
    pub custom_rate: f64,
    pub extra_hours: f64,
    pub sales_amount: f64,
    pub bonus: f64,
    pub discounts: f64,
}

impl PayrollEvent {
    /// Defaults used when no event was recorded: a full month, no extras.
    pub fn full_month(employee_id: &str, month: &str) -> Self {
        PayrollEvent {
            employee_id: employee_id.to_string(),
            month: month.to_string(),
            worked_days: 30.0,
            worked_hours: 220.0,
            custom_rate: 0.0,
            extra_hours: 0.0,
            sales_amount: 0.0,
            bonus: 0.0,
            discounts: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayrollTotals {
    pub base_pay: f64,
    pub base_rate_used: f64,
    pub hourly_rate: f64,
    pub overtime_value: f64,
    pub commission_value: f64,
    pub gross_total: f64,
    pub net_total: f64,
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Compute one employee's pay for the month.
pub fn calculate(employee: &Employee, event: &PayrollEvent) -> PayrollTotals {
    let custom_rate = if event.custom_rate > 0.0 {
        event.custom_rate
    } else {
        0.0
    };

    let (base_pay, base_rate_used, hourly_rate) = match employee.contract_type {
        ContractType::Salaried => {
            let hourly = if custom_rate > 0.0 {
                custom_rate
            } else {
                employee.base_salary / SALARIED_MONTH_HOURS
            };
            let base = (employee.base_salary / 30.0) * event.worked_days;
            (base, employee.base_salary, hourly)
        }
        ContractType::Daily => {
            let rate = if custom_rate > 0.0 {
                custom_rate
            } else {
                employee.base_salary
            };
            (rate * event.worked_days, rate, rate / DAILY_SHIFT_HOURS)
        }
        ContractType::Hourly => {
            let rate = if custom_rate > 0.0 {
                custom_rate
            } else {
                employee.base_salary
            };
            (rate * event.worked_hours, rate, rate)
        }
    };

    let overtime_value = event.extra_hours * hourly_rate * OVERTIME_MULTIPLIER;
    let commission_value = event.sales_amount * (employee.commission_rate / 100.0);
    let gross_total = base_pay + overtime_value + commission_value + event.bonus;
    let net_total = gross_total - event.discounts;

    PayrollTotals {
        base_pay,
        base_rate_used,
        hourly_rate,
        overtime_value,
        commission_value,
        gross_total,
        net_total,
    }
}

// ---------------------------------------------------------------------------
// Employee CRUD
// ---------------------------------------------------------------------------

fn employee_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Employee, String)> {
    let raw_contract: String = row.get("contract_type")?;
    let employee = Employee {
        id: row.get("id")?,
        code: row.get("code")?,
        name: row.get("name")?,
        position: row.get("position")?,
        // placeholder, fixed up by the caller once parse errors are handled
        contract_type: ContractType::Salaried,
        base_salary: row.get("base_salary")?,
        commission_rate: row.get("commission_rate")?,
        admission_date: row.get("admission_date")?,
        phone: row.get("phone")?,
        active: row.get::<_, i64>("active")? != 0,
    };
    Ok((employee, raw_contract))
}

fn finish_employee(pair: (Employee, String)) -> Result<Employee, String> {
    let (mut employee, raw) = pair;
    employee.contract_type = ContractType::parse(&raw)?;
    Ok(employee)
}

/// All active employees, ordered by name.
pub fn list_employees(db: &DbState) -> Result<Vec<Employee>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare("SELECT * FROM employees WHERE active = 1 ORDER BY name")
        .map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map([], employee_from_row)
        .map_err(|e| e.to_string())?;

    let mut employees = Vec::new();
    for row in rows {
        employees.push(finish_employee(row.map_err(|e| e.to_string())?)?);
    }
    Ok(employees)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeInput {
    pub id: Option<String>,
    pub code: Option<String>,
    pub name: String,
    pub position: Option<String>,
    pub contract_type: ContractType,
    pub base_salary: f64,
    #[serde(default)]
    pub commission_rate: f64,
    pub admission_date: Option<String>,
    pub phone: Option<String>,
}

/// Insert or overwrite an employee from the registration form.
pub fn save_employee(db: &DbState, input: &EmployeeInput) -> Result<Employee, String> {
    if input.name.trim().is_empty() {
        return Err("Employee name is required".into());
    }
    if input.base_salary < 0.0 {
        return Err("Base salary cannot be negative".into());
    }

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let now = Utc::now().to_rfc3339();
    let id = input
        .id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    conn.execute(
        "INSERT INTO employees (
            id, code, name, position, contract_type, base_salary,
            commission_rate, admission_date, phone, active, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10, ?10)
        ON CONFLICT(id) DO UPDATE SET
            code = ?2, name = ?3, position = ?4, contract_type = ?5,
            base_salary = ?6, commission_rate = ?7, admission_date = ?8,
            phone = ?9, updated_at = ?10",
        params![
            id,
            input.code,
            input.name.trim(),
            input.position,
            input.contract_type.as_str(),
            input.base_salary,
            input.commission_rate,
            input.admission_date,
            input.phone,
            now,
        ],
    )
    .map_err(|e| format!("save employee: {e}"))?;

    info!(employee_id = %id, "employee saved");

    Ok(Employee {
        id,
        code: input.code.clone(),
        name: input.name.trim().to_string(),
        position: input.position.clone(),
        contract_type: input.contract_type,
        base_salary: input.base_salary,
        commission_rate: input.commission_rate,
        admission_date: input.admission_date.clone(),
        phone: input.phone.clone(),
        active: true,
    })
}

/// Deactivate an employee. Payroll history is kept; the employee simply
/// stops appearing in active lists.
pub fn deactivate_employee(db: &DbState, employee_id: &str) -> Result<(), String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let changed = conn
        .execute(
            "UPDATE employees SET active = 0, updated_at = datetime('now') WHERE id = ?1",
            params![employee_id],
        )
        .map_err(|e| format!("deactivate employee: {e}"))?;
    if changed == 0 {
        return Err("Employee not found".into());
    }
    info!(employee_id = %employee_id, "employee deactivated");
    Ok(())
}

// ---------------------------------------------------------------------------
// Payroll events
// ---------------------------------------------------------------------------

/// Upsert the month's event for one employee.
pub fn save_event(db: &DbState, event: &PayrollEvent) -> Result<(), String> {
    if event.month.len() != 7 || event.month.as_bytes()[4] != b'-' {
        return Err(format!("Invalid reference month: {}", event.month));
    }

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO payroll_events (
            id, employee_id, month, worked_days, worked_hours, custom_rate,
            extra_hours, sales_amount, bonus, discounts, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
        ON CONFLICT(employee_id, month) DO UPDATE SET
            worked_days = ?4, worked_hours = ?5, custom_rate = ?6,
            extra_hours = ?7, sales_amount = ?8, bonus = ?9, discounts = ?10,
            updated_at = ?11",
        params![
            Uuid::new_v4().to_string(),
            event.employee_id,
            event.month,
            event.worked_days,
            event.worked_hours,
            event.custom_rate,
            event.extra_hours,
            event.sales_amount,
            event.bonus,
            event.discounts,
            now,
        ],
    )
    .map_err(|e| format!("save payroll event: {e}"))?;
    Ok(())
}

fn event_for(
    conn: &Connection,
    employee_id: &str,
    month: &str,
) -> Result<Option<PayrollEvent>, String> {
    conn.query_row(
        "SELECT worked_days, worked_hours, custom_rate, extra_hours,
                sales_amount, bonus, discounts
         FROM payroll_events WHERE employee_id = ?1 AND month = ?2",
        params![employee_id, month],
        |row| {
            Ok(PayrollEvent {
                employee_id: employee_id.to_string(),
                month: month.to_string(),
                worked_days: row.get(0)?,
                worked_hours: row.get(1)?,
                custom_rate: row.get(2)?,
                extra_hours: row.get(3)?,
                sales_amount: row.get(4)?,
                bonus: row.get(5)?,
                discounts: row.get(6)?,
            })
        },
    )
    .optional()
    .map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Month summary and consolidation
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeePayrollLine {
    pub employee: Employee,
    pub event: PayrollEvent,
    pub totals: PayrollTotals,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthSummary {
    pub month: String,
    pub lines: Vec<EmployeePayrollLine>,
    pub gross_total: f64,
    pub net_total: f64,
    /// Illustrative ~40% employer burden over the salaried+hourly gross.
    /// Not a statutory computation; daily contracts are excluded.
    pub burden_estimate: f64,
}

/// Compute the full payroll table for one month.
pub fn month_summary(db: &DbState, month: &str) -> Result<MonthSummary, String> {
    let employees = list_employees(db)?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let mut lines = Vec::with_capacity(employees.len());
    let mut gross_total = 0.0;
    let mut net_total = 0.0;
    let mut taxable_gross = 0.0;

    for employee in employees {
        let event = event_for(&conn, &employee.id, month)?
            .unwrap_or_else(|| PayrollEvent::full_month(&employee.id, month));
        let totals = calculate(&employee, &event);

        gross_total += totals.gross_total;
        net_total += totals.net_total;
        if employee.contract_type != ContractType::Daily {
            taxable_gross += totals.gross_total;
        }

        lines.push(EmployeePayrollLine {
            employee,
            event,
            totals,
        });
    }

    Ok(MonthSummary {
        month: month.to_string(),
        lines,
        gross_total,
        net_total,
        burden_estimate: taxable_gross * EMPLOYER_BURDEN_RATE,
    })
}

/// Post the month's net payroll to the ledger as one expense entry.
///
/// Rejected when the total is zero or when the month was already posted
/// (matched by the generated description).
pub fn consolidate(db: &DbState, month: &str) -> Result<finance::Transaction, String> {
    let summary = month_summary(db, month)?;
    if summary.net_total <= 0.0 {
        return Err("Payroll total for the month is zero".into());
    }

    let description = format!("Payroll {month}");
    {
        let conn = db.conn.lock().map_err(|e| e.to_string())?;
        let already: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM transactions
                 WHERE entry_type = 'expense' AND description = ?1",
                params![description],
                |row| row.get(0),
            )
            .map_err(|e| e.to_string())?;
        if already > 0 {
            return Err(format!("Payroll for {month} was already posted"));
        }
    }

    let entry = finance::add_transaction(
        db,
        &finance::TransactionInput {
            description,
            amount: summary.net_total,
            entry_type: finance::EntryType::Expense,
            category: "Payroll".into(),
            entry_date: None,
            due_date: None,
            payment_method: None,
            attachment_name: None,
            attachment_path: None,
        },
    )?;

    info!(month = %month, amount = %summary.net_total, "payroll posted to ledger");
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn salaried(base: f64, commission: f64) -> Employee {
        Employee {
            id: "emp-1".into(),
            code: None,
            name: "João".into(),
            position: Some("Cook".into()),
            contract_type: ContractType::Salaried,
            base_salary: base,
            commission_rate: commission,
            admission_date: None,
            phone: None,
            active: true,
        }
    }

    #[test]
    fn salaried_full_month_pays_full_salary() {
        let emp = salaried(3000.0, 0.0);
        let event = PayrollEvent::full_month("emp-1", "2025-06");
        let totals = calculate(&emp, &event);
        assert!((totals.base_pay - 3000.0).abs() < 1e-9);
        assert!((totals.hourly_rate - 3000.0 / 220.0).abs() < 1e-9);
        assert_eq!(totals.net_total, totals.gross_total);
    }

    #[test]
    fn salaried_overtime_uses_derived_hourly_rate() {
        let emp = salaried(3000.0, 0.0);
        let mut event = PayrollEvent::full_month("emp-1", "2025-06");
        event.extra_hours = 10.0;
        let totals = calculate(&emp, &event);
        // 10h × (3000/220) × 1.5 ≈ 204.55
        assert!((totals.overtime_value - 204.5454545).abs() < 1e-3);
        assert!((totals.gross_total - 3204.5454545).abs() < 1e-3);
    }

    #[test]
    fn custom_rate_overrides_derived_hourly_rate() {
        let emp = salaried(3000.0, 0.0);
        let mut event = PayrollEvent::full_month("emp-1", "2025-06");
        event.custom_rate = 20.0;
        event.extra_hours = 2.0;
        let totals = calculate(&emp, &event);
        assert!((totals.overtime_value - 2.0 * 20.0 * 1.5).abs() < 1e-9);
    }

    #[test]
    fn daily_contract_pays_per_day() {
        let mut emp = salaried(180.0, 0.0);
        emp.contract_type = ContractType::Daily;
        let mut event = PayrollEvent::full_month("emp-1", "2025-06");
        event.worked_days = 12.0;
        let totals = calculate(&emp, &event);
        assert!((totals.base_pay - 2160.0).abs() < 1e-9);
        assert!((totals.hourly_rate - 22.5).abs() < 1e-9);
    }

    #[test]
    fn hourly_contract_pays_per_hour_with_commission() {
        let mut emp = salaried(25.0, 5.0);
        emp.contract_type = ContractType::Hourly;
        let mut event = PayrollEvent::full_month("emp-1", "2025-06");
        event.worked_hours = 100.0;
        event.sales_amount = 2000.0;
        let totals = calculate(&emp, &event);
        assert!((totals.base_pay - 2500.0).abs() < 1e-9);
        assert!((totals.commission_value - 100.0).abs() < 1e-9);
    }

    #[test]
    fn discounts_reduce_net_only() {
        let emp = salaried(3000.0, 0.0);
        let mut event = PayrollEvent::full_month("emp-1", "2025-06");
        event.discounts = 150.0;
        event.bonus = 50.0;
        let totals = calculate(&emp, &event);
        assert!((totals.gross_total - 3050.0).abs() < 1e-9);
        assert!((totals.net_total - 2900.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_contract_tag_is_an_error() {
        assert!(ContractType::parse("freelancer").is_err());
        assert_eq!(
            ContractType::parse("daily").unwrap(),
            ContractType::Daily
        );
    }

    #[test]
    fn month_summary_defaults_missing_events_to_full_month() {
        let db = test_db();
        save_employee(
            &db,
            &EmployeeInput {
                id: None,
                code: None,
                name: "João".into(),
                position: None,
                contract_type: ContractType::Salaried,
                base_salary: 3000.0,
                commission_rate: 0.0,
                admission_date: None,
                phone: None,
            },
        )
        .expect("save employee");

        let summary = month_summary(&db, "2025-06").expect("summary");
        assert_eq!(summary.lines.len(), 1);
        assert!((summary.net_total - 3000.0).abs() < 1e-9);
        assert_eq!(summary.lines[0].event.worked_days, 30.0);
        // Salaried gross is taxable: burden = 40%
        assert!((summary.burden_estimate - 1200.0).abs() < 1e-9);
    }

    #[test]
    fn daily_contracts_are_excluded_from_burden() {
        let db = test_db();
        save_employee(
            &db,
            &EmployeeInput {
                id: None,
                code: None,
                name: "Ana".into(),
                position: None,
                contract_type: ContractType::Daily,
                base_salary: 180.0,
                commission_rate: 0.0,
                admission_date: None,
                phone: None,
            },
        )
        .expect("save employee");

        let summary = month_summary(&db, "2025-06").expect("summary");
        assert!(summary.net_total > 0.0);
        assert_eq!(summary.burden_estimate, 0.0);
    }

    #[test]
    fn consolidation_posts_once_per_month() {
        let db = test_db();
        save_employee(
            &db,
            &EmployeeInput {
                id: None,
                code: None,
                name: "João".into(),
                position: None,
                contract_type: ContractType::Salaried,
                base_salary: 3000.0,
                commission_rate: 0.0,
                admission_date: None,
                phone: None,
            },
        )
        .expect("save employee");

        let entry = consolidate(&db, "2025-06").expect("first consolidation");
        assert_eq!(entry.category, "Payroll");
        assert!((entry.amount - 3000.0).abs() < 1e-9);

        let dup = consolidate(&db, "2025-06");
        assert!(dup.is_err(), "second consolidation must be rejected");
    }
}
