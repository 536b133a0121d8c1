//! Local authentication with bcrypt.
//!
//! Accounts live in the SQLite `users` table; sessions are kept in-memory
//! in managed state. Failed-attempt lockout counters are persisted in
//! `local_settings` so restarting the app does not reset them. A demo
//! mode flag short-circuits login with a fixed read-only identity for
//! showcasing the app without a database of real accounts.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{self, DbState};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const MAX_FAILED_ATTEMPTS: u32 = 5;
const LOCKOUT_MINUTES: i64 = 15;
const SESSION_INACTIVITY_MINUTES: i64 = 30;
const SESSION_MAX_DURATION_HOURS: i64 = 12;
const LOCKOUT_ATTEMPTS_KEY: &str = "lockout_attempts";
const LOCKOUT_LAST_ATTEMPT_KEY: &str = "lockout_last_attempt";

pub const DEMO_USER_ID: &str = "demo-user";
const DEMO_EMAIL: &str = "visitor@forno.pizza";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// An active session.
#[derive(Clone)]
struct UserSession {
    session_id: String,
    user_id: String,
    email: String,
    display_name: String,
    role: String,
    demo: bool,
    login_time: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl UserSession {
    /// Check whether this session has expired (inactivity or max duration).
    fn is_expired(&self) -> bool {
        let now = Utc::now();
        if now >= self.expires_at {
            return true;
        }
        if now - self.last_activity > Duration::minutes(SESSION_INACTIVITY_MINUTES) {
            return true;
        }
        false
    }

    /// Convert to the JSON shape the frontend expects.
    fn to_user_json(&self) -> Value {
        serde_json::json!({
            "userId": self.user_id,
            "email": self.email,
            "displayName": self.display_name,
            "role": self.role,
            "demo": self.demo,
            "sessionId": self.session_id,
        })
    }
}

/// Lockout tracking entry.
struct LockoutEntry {
    attempts: u32,
    last_attempt: DateTime<Utc>,
}

/// Tauri managed state for authentication.
pub struct AuthState {
    sessions: Mutex<HashMap<String, UserSession>>,
    current_session_id: Mutex<Option<String>>,
    lockout: Mutex<LockoutEntry>,
}

impl AuthState {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            current_session_id: Mutex::new(None),
            lockout: Mutex::new(LockoutEntry {
                attempts: 0,
                last_attempt: Utc::now(),
            }),
        }
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Lockout helpers
// ---------------------------------------------------------------------------

/// Check whether login is currently locked out.
fn check_lockout(lockout: &LockoutEntry) -> Result<(), String> {
    if lockout.attempts >= MAX_FAILED_ATTEMPTS {
        let elapsed = Utc::now() - lockout.last_attempt;
        if elapsed < Duration::minutes(LOCKOUT_MINUTES) {
            let remaining = LOCKOUT_MINUTES - elapsed.num_minutes();
            return Err(format!(
                "Too many failed attempts. Try again in {remaining} minute(s)."
            ));
        }
        // Lockout period has elapsed — will be reset on next successful login
    }
    Ok(())
}

fn record_failure(lockout: &mut LockoutEntry) {
    lockout.attempts += 1;
    lockout.last_attempt = Utc::now();
    warn!(attempts = lockout.attempts, "failed login attempt");
}

fn reset_lockout(lockout: &mut LockoutEntry) {
    lockout.attempts = 0;
    lockout.last_attempt = Utc::now();
}

/// Load persisted lockout state from local_settings.
fn load_lockout_from_db(conn: &rusqlite::Connection) -> LockoutEntry {
    let attempts = db::get_setting(conn, "auth", LOCKOUT_ATTEMPTS_KEY)
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0);
    let last_attempt = db::get_setting(conn, "auth", LOCKOUT_LAST_ATTEMPT_KEY)
        .and_then(|v| chrono::DateTime::parse_from_rfc3339(&v).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    LockoutEntry {
        attempts,
        last_attempt,
    }
}

/// Persist lockout state in local_settings.
fn persist_lockout_to_db(conn: &rusqlite::Connection, lockout: &LockoutEntry) {
    let _ = db::set_setting(
        conn,
        "auth",
        LOCKOUT_ATTEMPTS_KEY,
        &lockout.attempts.to_string(),
    );
    let _ = db::set_setting(
        conn,
        "auth",
        LOCKOUT_LAST_ATTEMPT_KEY,
        &lockout.last_attempt.to_rfc3339(),
    );
}

// ---------------------------------------------------------------------------
// Session helpers
// ---------------------------------------------------------------------------

fn create_session(
    auth: &AuthState,
    user_id: &str,
    email: &str,
    display_name: &str,
    role: &str,
    demo: bool,
) -> Value {
    let now = Utc::now();
    let session = UserSession {
        session_id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        email: email.to_string(),
        display_name: display_name.to_string(),
        role: role.to_string(),
        demo,
        login_time: now,
        last_activity: now,
        expires_at: now + Duration::hours(SESSION_MAX_DURATION_HOURS),
    };

    let user_json = session.to_user_json();
    let sid = session.session_id.clone();

    {
        let mut sessions = auth.sessions.lock().unwrap();
        sessions.insert(sid.clone(), session);
    }
    {
        let mut current = auth.current_session_id.lock().unwrap();
        *current = Some(sid);
    }

    serde_json::json!({
        "success": true,
        "user": user_json,
    })
}

/// Get the current active session (if it exists and is not expired).
fn get_current_session(auth: &AuthState) -> Option<UserSession> {
    let current_id = auth.current_session_id.lock().unwrap().clone()?;
    let sessions = auth.sessions.lock().unwrap();
    let session = sessions.get(&current_id)?.clone();
    if session.is_expired() {
        return None;
    }
    Some(session)
}

// ---------------------------------------------------------------------------
// Public command implementations
// ---------------------------------------------------------------------------

/// Create an account. The first account on a fresh database becomes the
/// admin; everyone after that is staff.
pub fn sign_up(
    db: &DbState,
    email: &str,
    password: &str,
    display_name: Option<&str>,
) -> Result<Value, String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err("A valid email is required".into());
    }
    if password.len() < 6 {
        return Err("Password must be at least 6 characters".into());
    }

    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM users WHERE email = ?1",
            params![email],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| e.to_string())?;
    if existing.is_some() {
        return Err("An account with this email already exists".into());
    }

    let user_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
        .map_err(|e| e.to_string())?;
    let role = if user_count == 0 { "admin" } else { "staff" };

    let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| format!("Failed to hash password: {e}"))?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users (id, email, password_hash, display_name, role, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'), datetime('now'))",
        params![id, email, hash, display_name, role],
    )
    .map_err(|e| format!("create account: {e}"))?;

    info!(user_id = %id, role = %role, "account created");
    Ok(serde_json::json!({ "success": true, "userId": id, "role": role }))
}

/// Verify credentials and open a session.
pub fn login(
    db: &DbState,
    auth: &AuthState,
    email: &str,
    password: &str,
) -> Result<Value, String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || password.is_empty() {
        return Err("Email and password are required".into());
    }

    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    // Demo mode bypasses real accounts entirely
    if db::get_setting(&conn, "app", "demo_mode").as_deref() == Some("true") {
        info!("demo mode login");
        return Ok(create_session(
            auth,
            DEMO_USER_ID,
            DEMO_EMAIL,
            "Visitor",
            "staff",
            true,
        ));
    }

    // Synchronize lockout state from durable storage
    let persisted_lockout = load_lockout_from_db(&conn);
    {
        let mut lockout = auth.lockout.lock().unwrap();
        *lockout = persisted_lockout;
        check_lockout(&lockout)?;
    }

    let row: Option<(String, String, Option<String>, String)> = conn
        .query_row(
            "SELECT id, password_hash, display_name, role FROM users WHERE email = ?1",
            params![email],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                ))
            },
        )
        .optional()
        .map_err(|e| e.to_string())?;

    if let Some((user_id, hash, display_name, role)) = row {
        if bcrypt::verify(password, &hash).unwrap_or(false) {
            let mut lockout = auth.lockout.lock().unwrap();
            reset_lockout(&mut lockout);
            persist_lockout_to_db(&conn, &lockout);
            info!(user_id = %user_id, "login successful");
            let name = display_name.unwrap_or_else(|| email.clone());
            return Ok(create_session(auth, &user_id, &email, &name, &role, false));
        }
    }

    // Unknown account or wrong password: one failure, one message
    let mut lockout = auth.lockout.lock().unwrap();
    record_failure(&mut lockout);
    persist_lockout_to_db(&conn, &lockout);
    Err("Invalid email or password".into())
}

/// Invalidate the current session.
pub fn logout(auth: &AuthState) {
    let mut current = auth.current_session_id.lock().unwrap();
    if let Some(sid) = current.take() {
        let mut sessions = auth.sessions.lock().unwrap();
        sessions.remove(&sid);
        info!(session_id = %sid, "session logged out");
    }
}

/// Return the current session user or null.
pub fn get_session_json(auth: &AuthState) -> Value {
    match get_current_session(auth) {
        Some(s) => s.to_user_json(),
        None => Value::Null,
    }
}

/// Validate the current session, cleaning it up when expired.
pub fn validate_session(auth: &AuthState) -> Value {
    match get_current_session(auth) {
        Some(_) => serde_json::json!({ "valid": true }),
        None => {
            let mut current = auth.current_session_id.lock().unwrap();
            if let Some(sid) = current.take() {
                let mut sessions = auth.sessions.lock().unwrap();
                sessions.remove(&sid);
            }
            serde_json::json!({ "valid": false, "reason": "Session expired or not found" })
        }
    }
}

/// Refresh the inactivity timer.
pub fn track_activity(auth: &AuthState) {
    let current_id = auth.current_session_id.lock().unwrap().clone();
    if let Some(sid) = current_id {
        let mut sessions = auth.sessions.lock().unwrap();
        if let Some(session) = sessions.get_mut(&sid) {
            session.last_activity = Utc::now();
        }
    }
}

/// Session metadata for the diagnostics screen.
pub fn get_session_stats(auth: &AuthState) -> Value {
    match get_current_session(auth) {
        Some(s) => serde_json::json!({
            "sessionId": s.session_id,
            "role": s.role,
            "loginTime": s.login_time.to_rfc3339(),
            "lastActivity": s.last_activity.to_rfc3339(),
            "expiresAt": s.expires_at.to_rfc3339(),
        }),
        None => serde_json::json!({}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn test_db_state() -> DbState {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::run_migrations_for_test(&conn);
        DbState {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        }
    }

    fn lockout_attempts(db_state: &DbState) -> u32 {
        let conn = db_state.conn.lock().expect("db lock");
        db::get_setting(&conn, "auth", LOCKOUT_ATTEMPTS_KEY)
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0)
    }

    #[test]
    fn first_account_is_admin_then_staff() {
        let db_state = test_db_state();
        let first = sign_up(&db_state, "owner@forno.pizza", "secret1", Some("Owner"))
            .expect("first sign-up");
        assert_eq!(first.get("role").and_then(Value::as_str), Some("admin"));

        let second =
            sign_up(&db_state, "cook@forno.pizza", "secret2", None).expect("second sign-up");
        assert_eq!(second.get("role").and_then(Value::as_str), Some("staff"));

        let dup = sign_up(&db_state, "owner@forno.pizza", "secret3", None);
        assert!(dup.is_err(), "duplicate email must be rejected");
    }

    #[test]
    fn login_round_trip_and_logout() {
        let db_state = test_db_state();
        let auth = AuthState::new();
        sign_up(&db_state, "owner@forno.pizza", "secret1", Some("Owner")).expect("sign-up");

        let result =
            login(&db_state, &auth, "Owner@Forno.Pizza", "secret1").expect("login succeeds");
        assert_eq!(result.get("success").and_then(Value::as_bool), Some(true));
        let user = get_session_json(&auth);
        assert_eq!(
            user.get("email").and_then(Value::as_str),
            Some("owner@forno.pizza")
        );

        logout(&auth);
        assert!(get_session_json(&auth).is_null());
    }

    #[test]
    fn lockout_persists_across_auth_state_restart() {
        let db_state = test_db_state();
        let auth_before_restart = AuthState::new();

        for _ in 0..MAX_FAILED_ATTEMPTS {
            let err = login(&db_state, &auth_before_restart, "ghost@forno.pizza", "nope")
                .expect_err("invalid login should fail");
            assert_eq!(err, "Invalid email or password");
        }

        assert_eq!(lockout_attempts(&db_state), MAX_FAILED_ATTEMPTS);

        let auth_after_restart = AuthState::new();
        let err = login(&db_state, &auth_after_restart, "ghost@forno.pizza", "nope")
            .expect_err("lockout should remain active after restart");

        assert!(
            err.contains("Too many failed attempts"),
            "unexpected lockout error message: {err}"
        );
        assert_eq!(
            lockout_attempts(&db_state),
            MAX_FAILED_ATTEMPTS,
            "blocked attempt should not increment counter while lockout is active"
        );
    }

    #[test]
    fn successful_login_resets_persisted_lockout() {
        let db_state = test_db_state();
        sign_up(&db_state, "owner@forno.pizza", "secret1", None).expect("sign-up");

        let auth = AuthState::new();
        for _ in 0..2 {
            let _ = login(&db_state, &auth, "owner@forno.pizza", "wrong")
                .expect_err("invalid login should fail");
        }
        assert_eq!(lockout_attempts(&db_state), 2);

        login(&db_state, &auth, "owner@forno.pizza", "secret1").expect("valid login");
        assert_eq!(lockout_attempts(&db_state), 0);
    }

    #[test]
    fn demo_mode_bypasses_accounts() {
        let db_state = test_db_state();
        {
            let conn = db_state.conn.lock().unwrap();
            db::set_setting(&conn, "app", "demo_mode", "true").expect("enable demo");
        }
        let auth = AuthState::new();
        let result =
            login(&db_state, &auth, "anyone@anywhere", "whatever").expect("demo login");
        let user = result.get("user").expect("user payload");
        assert_eq!(
            user.get("userId").and_then(Value::as_str),
            Some(DEMO_USER_ID)
        );
        assert_eq!(user.get("demo").and_then(Value::as_bool), Some(true));
    }
}
