//! Secure config storage using the OS credential store.
//!
//! On Windows this uses DPAPI (via the `keyring` crate), on macOS Keychain,
//! and on Linux the Secret Service API. Holds the generative-AI document
//! service credentials so the API key never lands in the SQLite file.

use keyring::Entry;
use serde_json::Value;
use tracing::{info, warn};

const SERVICE_NAME: &str = "forno-backoffice";

// Credential keys
pub const KEY_AI_BASE_URL: &str = "ai_base_url";
pub const KEY_AI_API_KEY: &str = "ai_api_key";
pub const KEY_AI_MODEL: &str = "ai_model";

/// All credential keys managed by this module.
const ALL_KEYS: &[&str] = &[KEY_AI_BASE_URL, KEY_AI_API_KEY, KEY_AI_MODEL];

// ---------------------------------------------------------------------------
// Low-level helpers
// ---------------------------------------------------------------------------

/// Retrieve a single credential from the OS keyring. Returns `None` when the
/// entry does not exist (or the platform returns a "not found" error).
pub fn get_credential(key: &str) -> Option<String> {
    let entry = match Entry::new(SERVICE_NAME, key) {
        Ok(e) => e,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to create entry");
            return None;
        }
    };
    match entry.get_password() {
        Ok(pw) => Some(pw),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to read credential");
            None
        }
    }
}

/// Store a credential in the OS keyring.
pub fn set_credential(key: &str, value: &str) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| e.to_string())?;
    entry.set_password(value).map_err(|e| e.to_string())?;
    Ok(())
}

/// Delete a credential from the OS keyring. Silently succeeds if the entry
/// does not exist.
pub fn delete_credential(key: &str) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| e.to_string())?;
    match entry.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

pub fn has_credential(key: &str) -> bool {
    get_credential(key).is_some()
}

// ---------------------------------------------------------------------------
// High-level API
// ---------------------------------------------------------------------------

/// The AI document service is usable when an API key is present.
pub fn ai_is_configured() -> bool {
    has_credential(KEY_AI_API_KEY)
}

/// Return the stored AI service config (key masked) for the settings screen.
pub fn ai_config_summary() -> Value {
    let masked_key = get_credential(KEY_AI_API_KEY).map(|k| {
        if k.len() > 6 {
            format!("{}***", &k[..6])
        } else {
            "***".to_string()
        }
    });
    serde_json::json!({
        "baseUrl": get_credential(KEY_AI_BASE_URL),
        "apiKey": masked_key,
        "model": get_credential(KEY_AI_MODEL),
        "configured": ai_is_configured(),
    })
}

/// Store AI service credentials. Empty strings delete the entry.
pub fn store_ai_config(
    base_url: Option<&str>,
    api_key: Option<&str>,
    model: Option<&str>,
) -> Result<(), String> {
    for (key, value) in [
        (KEY_AI_BASE_URL, base_url),
        (KEY_AI_API_KEY, api_key),
        (KEY_AI_MODEL, model),
    ] {
        if let Some(v) = value {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                delete_credential(key)?;
            } else {
                set_credential(key, trimmed)?;
            }
        }
    }
    info!("AI service credentials updated");
    Ok(())
}

/// Remove every credential this module manages.
pub fn clear_all() -> Result<(), String> {
    for key in ALL_KEYS {
        delete_credential(key)?;
    }
    info!("credential store cleared");
    Ok(())
}
