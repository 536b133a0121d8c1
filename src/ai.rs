//! Generative AI document service client.
//!
//! The service parses photographed purchase receipts into stock lines,
//! prefills ledger entries from financial documents (invoices, bills),
//! and answers a free-text margin-consulting question. It is consumed as
//! an opaque request/response API: one prompt, optional inline document
//! bytes, text back. Replies are expected to contain JSON which is
//! extracted with a tolerant first-bracket/last-bracket scan, since
//! models routinely wrap it in prose or code fences.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::costing::parse_flexible_number;
use crate::db::{self, DbState};
use crate::inventory::ScannedStockLine;
use crate::storage;

/// Document scans can be slow; generation gets a generous timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI service is not configured: missing API key")]
    NotConfigured,
    #[error("Cannot reach the AI service at {0}")]
    Connect(String),
    #[error("AI service request timed out")]
    Timeout,
    #[error("AI service rejected the request (HTTP {0})")]
    Status(u16),
    #[error("AI reply contained no usable text")]
    EmptyReply,
    #[error("No {0} found in the AI reply")]
    MissingJson(&'static str),
    #[error("Invalid JSON in AI reply: {0}")]
    BadJson(String),
    #[error("Invalid document payload: {0}")]
    BadDocument(String),
    #[error("{0}")]
    Other(String),
}

/// Resolved service configuration.
pub struct AiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

/// Resolve credentials from the OS keyring, falling back to
/// `local_settings` (category "ai") for machines without a keyring.
pub fn service_config(db: &DbState) -> Result<AiConfig, AiError> {
    let from_settings = |key: &str| -> Option<String> {
        let conn = db.conn.lock().ok()?;
        db::get_setting(&conn, "ai", key)
    };

    let api_key = storage::get_credential(storage::KEY_AI_API_KEY)
        .or_else(|| from_settings("api_key"))
        .filter(|k| !k.trim().is_empty())
        .ok_or(AiError::NotConfigured)?;
    let base_url = storage::get_credential(storage::KEY_AI_BASE_URL)
        .or_else(|| from_settings("base_url"))
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let model = storage::get_credential(storage::KEY_AI_MODEL)
        .or_else(|| from_settings("model"))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    Ok(AiConfig {
        base_url: base_url.trim_end_matches('/').to_string(),
        api_key,
        model,
    })
}

fn request_error(base_url: &str, err: &reqwest::Error) -> AiError {
    if err.is_timeout() {
        return AiError::Timeout;
    }
    if err.is_connect() {
        return AiError::Connect(base_url.to_string());
    }
    AiError::Other(format!("AI service request failed: {err}"))
}

// ---------------------------------------------------------------------------
// Generation call
// ---------------------------------------------------------------------------

/// One prompt, optional inline document, text reply.
pub async fn generate(
    config: &AiConfig,
    prompt: &str,
    inline: Option<(&str, &str)>, // (mime_type, base64 data)
) -> Result<String, AiError> {
    let mut parts = vec![serde_json::json!({ "text": prompt })];
    if let Some((mime, data)) = inline {
        // Reject garbage before shipping it to the service
        BASE64_STANDARD
            .decode(data.trim())
            .map_err(|e| AiError::BadDocument(format!("not valid base64: {e}")))?;
        parts.push(serde_json::json!({
            "inline_data": { "mime_type": mime, "data": data.trim() }
        }));
    }
    let body = serde_json::json!({ "contents": [{ "parts": parts }] });

    let url = format!(
        "{}/v1beta/models/{}:generateContent",
        config.base_url, config.model
    );

    let client = Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| AiError::Other(format!("Failed to create HTTP client: {e}")))?;

    let resp = client
        .post(&url)
        .header("x-goog-api-key", &config.api_key)
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| request_error(&config.base_url, &e))?;

    let status = resp.status();
    if !status.is_success() {
        let body_text = resp.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), body = %body_text, "AI service error response");
        return Err(AiError::Status(status.as_u16()));
    }

    let reply: Value = resp
        .json()
        .await
        .map_err(|e| AiError::BadJson(e.to_string()))?;
    let text = collect_reply_text(&reply);
    if text.trim().is_empty() {
        return Err(AiError::EmptyReply);
    }
    Ok(text)
}

/// Concatenate every text part of the first candidate.
fn collect_reply_text(reply: &Value) -> String {
    reply
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// JSON extraction
// ---------------------------------------------------------------------------

/// The first `[` through the last `]` of the reply, parsed as JSON.
pub fn extract_json_array(text: &str) -> Result<Value, AiError> {
    let start = text.find('[').ok_or(AiError::MissingJson("JSON array"))?;
    let end = text.rfind(']').ok_or(AiError::MissingJson("JSON array"))?;
    if end < start {
        return Err(AiError::MissingJson("JSON array"));
    }
    serde_json::from_str(&text[start..=end]).map_err(|e| AiError::BadJson(e.to_string()))
}

/// The first `{` through the last `}` of the reply, parsed as JSON.
pub fn extract_json_object(text: &str) -> Result<Value, AiError> {
    let start = text.find('{').ok_or(AiError::MissingJson("JSON object"))?;
    let end = text.rfind('}').ok_or(AiError::MissingJson("JSON object"))?;
    if end < start {
        return Err(AiError::MissingJson("JSON object"));
    }
    serde_json::from_str(&text[start..=end]).map_err(|e| AiError::BadJson(e.to_string()))
}

/// Number fields in model output arrive as numbers or quoted strings
/// (sometimes with comma decimals); coerce either, defaulting to zero.
fn lenient_number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => parse_flexible_number(s),
        _ => 0.0,
    }
}

fn lenient_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Document flows
// ---------------------------------------------------------------------------

const PURCHASE_PROMPT: &str = "Analyze this purchase document (invoice or packing slip). \
Extract the supply line items. Return ONLY a JSON array: \
[{\"name\": \"ITEM NAME\", \"code\": \"EAN OR CODE\", \"unit\": \"KG/UN/LT\", \
\"quantity\": 0, \"cost_per_unit\": 0, \"category\": \"Suggested category\"}]";

/// Parse the model reply for a purchase scan into stock lines.
pub fn parse_purchase_reply(text: &str) -> Result<Vec<ScannedStockLine>, AiError> {
    let array = extract_json_array(text)?;
    let rows = array.as_array().ok_or(AiError::MissingJson("JSON array"))?;

    let lines = rows
        .iter()
        .map(|row| ScannedStockLine {
            name: lenient_string(row.get("name")),
            code: lenient_string(row.get("code")),
            unit: lenient_string(row.get("unit")),
            quantity: lenient_number(row.get("quantity").or_else(|| row.get("stock_quantity"))),
            cost_per_unit: lenient_number(row.get("cost_per_unit")),
            category: lenient_string(row.get("category")),
        })
        .collect();
    Ok(lines)
}

/// Scan a photographed purchase document into stock lines.
pub async fn scan_purchase_document(
    db: &DbState,
    base64_data: &str,
    mime_type: &str,
) -> Result<Vec<ScannedStockLine>, AiError> {
    let config = service_config(db)?;
    let mime = if mime_type.trim().is_empty() {
        "image/jpeg"
    } else {
        mime_type
    };
    let reply = generate(&config, PURCHASE_PROMPT, Some((mime, base64_data))).await?;
    let lines = parse_purchase_reply(&reply)?;
    info!(lines = lines.len(), "purchase document scanned");
    Ok(lines)
}

const EXPENSE_PROMPT: &str = "Analyze this financial document (bill, invoice or receipt). \
Extract the following fields: \
1. Description or payee (description). \
2. Total amount (amount). \
3. Due date (due_date, format YYYY-MM-DD). \
4. Suggested payment method (payment_method). \
Return ONLY a pure JSON object: \
{\"description\": \"string\", \"amount\": 0.00, \"due_date\": \"YYYY-MM-DD\", \
\"payment_method\": \"string\"}";

/// Prefill values extracted from a scanned financial document.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannedExpense {
    pub description: String,
    pub amount: f64,
    pub due_date: Option<String>,
    pub payment_method: Option<String>,
}

/// Parse the model reply for an expense scan.
pub fn parse_expense_reply(text: &str) -> Result<ScannedExpense, AiError> {
    let obj = extract_json_object(text)?;
    let due_date = lenient_string(obj.get("due_date").or_else(|| obj.get("dueDate")));
    let payment_method =
        lenient_string(obj.get("payment_method").or_else(|| obj.get("paymentMethod")));
    Ok(ScannedExpense {
        description: lenient_string(obj.get("description")),
        amount: lenient_number(obj.get("amount")),
        due_date: (!due_date.is_empty()).then_some(due_date),
        payment_method: (!payment_method.is_empty()).then_some(payment_method),
    })
}

/// Scan a financial document into ledger-form prefill values.
pub async fn scan_expense_document(
    db: &DbState,
    base64_data: &str,
    mime_type: &str,
) -> Result<ScannedExpense, AiError> {
    let config = service_config(db)?;
    let mime = if mime_type.trim().is_empty() {
        "image/jpeg"
    } else {
        mime_type
    };
    let reply = generate(&config, EXPENSE_PROMPT, Some((mime, base64_data))).await?;
    let scanned = parse_expense_reply(&reply)?;
    info!(amount = scanned.amount, "expense document scanned");
    Ok(scanned)
}

/// Free-text consultant answer over product margins.
pub async fn financial_advice(db: &DbState, highlights: &[String]) -> Result<String, AiError> {
    let config = service_config(db)?;
    let prompt = format!(
        "As a senior financial consultant for pizzerias, analyze the following \
         dishes and margins: {}. Give three short, practical suggestions to \
         improve profitability. Answer in plain text.",
        highlights.join("; ")
    );
    generate(&config, &prompt, None).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_array_wrapped_in_prose_and_fences() {
        let reply = "Sure! Here are the items:\n```json\n[{\"name\": \"Flour\", \
                     \"quantity\": 2}]\n```\nLet me know if you need more.";
        let lines = parse_purchase_reply(reply).expect("parse");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].name, "Flour");
        assert_eq!(lines[0].quantity, 2.0);
    }

    #[test]
    fn purchase_numbers_tolerate_strings_and_commas() {
        let reply = r#"[{"name": "Mozzarella", "quantity": "0,35", "cost_per_unit": "45.00"},
                        {"name": "Basil", "quantity": 2, "cost_per_unit": 2.5}]"#;
        let lines = parse_purchase_reply(reply).expect("parse");
        assert!((lines[0].quantity - 0.35).abs() < 1e-9);
        assert!((lines[0].cost_per_unit - 45.0).abs() < 1e-9);
        assert_eq!(lines[1].quantity, 2.0);
    }

    #[test]
    fn missing_array_is_reported() {
        let err = parse_purchase_reply("no items in this document").unwrap_err();
        assert!(matches!(err, AiError::MissingJson(_)));
    }

    #[test]
    fn expense_reply_accepts_both_key_spellings() {
        let snake = r#"{"description": "Energy bill", "amount": 412.77,
                        "due_date": "2025-07-10", "payment_method": "PIX"}"#;
        let scanned = parse_expense_reply(snake).expect("parse snake");
        assert_eq!(scanned.description, "Energy bill");
        assert_eq!(scanned.due_date.as_deref(), Some("2025-07-10"));

        let camel = r#"The extracted data: {"description": "Flour supplier",
                       "amount": "1.200,50 is not parseable", "dueDate": "2025-07-01"}"#;
        let scanned = parse_expense_reply(camel).expect("parse camel");
        assert_eq!(scanned.due_date.as_deref(), Some("2025-07-01"));
        // Unparseable amount coerces to zero rather than failing the scan
        assert_eq!(scanned.amount, 0.0);
    }

    #[test]
    fn reply_text_is_concatenated_from_parts() {
        let reply = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "[1," }, { "text": " 2]" }] }
            }]
        });
        assert_eq!(collect_reply_text(&reply), "[1, 2]");
        assert_eq!(collect_reply_text(&serde_json::json!({})), "");
    }
}
