// Logging utilities
// Structured logging with JSON and human-readable formats

use log::Level;
use regex::Regex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Form fields whose values must never reach a log file in clear text.
const SENSITIVE_FIELDS: &[&str] = &[
    "account_number",
    "aadhaar_number",
    "pan_number",
    "auth_token",
    "token",
    "key_secret",
    "password",
];

/// Mask sensitive data in logs
pub fn mask_sensitive(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }

    let visible = 4;
    let start: String = chars[..visible].iter().collect();
    let end: String = chars[chars.len() - visible..].iter().collect();

    format!("{}...{}", start, end)
}

/// Bank account numbers keep only the last four digits.
pub fn mask_account_number(account_number: &str) -> String {
    let digits: Vec<char> = account_number.trim().chars().collect();
    if digits.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = digits[digits.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(digits.len() - 4), tail)
}

/// Mask a form value by field name. Non-sensitive fields pass through unchanged.
pub fn mask_field_value(field: &str, value: &str) -> String {
    let norm = field.to_ascii_lowercase();
    if norm == "account_number" {
        return mask_account_number(value);
    }
    if SENSITIVE_FIELDS.iter().any(|f| *f == norm) {
        return mask_sensitive(value);
    }
    value.to_string()
}

static PHASE_TAG: OnceLock<Option<Regex>> = OnceLock::new();
static STEP_TAG: OnceLock<Option<Regex>> = OnceLock::new();

fn take_tag(
    message: &str,
    cell: &'static OnceLock<Option<Regex>>,
    tag: &str,
) -> (Option<String>, String) {
    let pattern = cell.get_or_init(|| Regex::new(&format!(r"\[{}:\s*([^\]]*?)\s*\]", tag)).ok());
    let Some(re) = pattern else {
        return (None, message.to_string());
    };
    match re.captures(message) {
        Some(caps) => {
            let value = caps.get(1).map(|m| m.as_str().to_string());
            let rest = re.replacen(message, 1, "");
            (value, rest.trim().to_string())
        }
        None => (None, message.to_string()),
    }
}

/// Split `[PHASE: x] [STEP: y] text` into its tags and the remaining text.
pub fn parse_log_metadata(message: &str) -> (Option<String>, Option<String>, String) {
    let (phase, rest) = take_tag(message, &PHASE_TAG, "PHASE");
    let (step, rest) = take_tag(&rest, &STEP_TAG, "STEP");
    (phase, step, rest)
}

/// Format log entry as JSON for structured logging
pub fn format_json_log(
    timestamp: &str,
    level: Level,
    target: &str,
    message: &str,
    phase: Option<&str>,
    step: Option<&str>,
    details: Option<&HashMap<String, serde_json::Value>>,
) -> String {
    let mut log_entry = json!({
        "timestamp": timestamp,
        "level": level.as_str(),
        "target": target,
        "message": message,
    });

    if let Some(phase) = phase {
        log_entry["phase"] = json!(phase);
    }

    if let Some(step) = step {
        log_entry["step"] = json!(step);
    }

    if let Some(details) = details {
        log_entry["details"] = json!(details);
    }

    serde_json::to_string(&log_entry).unwrap_or_else(|_| "{}".to_string())
}

/// Format log entry as human-readable text
pub fn format_human_readable_log(
    timestamp: &str,
    level: Level,
    target: &str,
    message: &str,
    phase: Option<&str>,
    step: Option<&str>,
) -> String {
    let tags = [("PHASE", phase), ("STEP", step)]
        .iter()
        .filter_map(|(name, value)| value.map(|v| format!(" [{}: {}]", name, v)))
        .collect::<String>();
    format!(
        "[{}] [{:<5}]{} [{}] {}",
        timestamp,
        level.as_str(),
        tags,
        target,
        message
    )
}
