use tauri::Emitter;

use crate::db;
use crate::finance::Transaction;
use crate::payroll::{self, Employee, EmployeeInput, MonthSummary, PayrollEvent};

#[tauri::command]
pub async fn payroll_get_employees(
    db: tauri::State<'_, db::DbState>,
) -> Result<Vec<Employee>, String> {
    payroll::list_employees(&db)
}

#[tauri::command]
pub async fn payroll_save_employee(
    input: EmployeeInput,
    db: tauri::State<'_, db::DbState>,
) -> Result<Employee, String> {
    payroll::save_employee(&db, &input)
}

#[tauri::command]
pub async fn payroll_deactivate_employee(
    employee_id: String,
    db: tauri::State<'_, db::DbState>,
) -> Result<(), String> {
    payroll::deactivate_employee(&db, &employee_id)
}

#[tauri::command]
pub async fn payroll_save_event(
    event: PayrollEvent,
    db: tauri::State<'_, db::DbState>,
) -> Result<(), String> {
    payroll::save_event(&db, &event)
}

#[tauri::command]
pub async fn payroll_get_month_summary(
    month: String,
    db: tauri::State<'_, db::DbState>,
) -> Result<MonthSummary, String> {
    payroll::month_summary(&db, &month)
}

/// Post the month's net payroll to the ledger as one expense entry.
#[tauri::command]
pub async fn payroll_consolidate(
    month: String,
    db: tauri::State<'_, db::DbState>,
    app: tauri::AppHandle,
) -> Result<Transaction, String> {
    let tx = payroll::consolidate(&db, &month)?;
    let _ = app.emit("transaction_added", &tx);
    Ok(tx)
}
