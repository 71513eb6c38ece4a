// Input validation utilities
//
// Two kinds of checks live here: presence-independent format predicates used by the bank step
// (`is_valid_ifsc`, `is_valid_account_number`) and submit-time format checks that produce
// validation errors. Tab gating never calls the latter.

use crate::error::{ClientError, ClientResult};
use chrono::{NaiveDate, Utc};
use log::error;
use regex::Regex;

const IFSC_PATTERN: &str = r"^[A-Z]{4}0[A-Z0-9]{6}$";
const PAN_PATTERN: &str = r"^[A-Z]{5}[0-9]{4}[A-Z]$";

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            error!(
                "[PHASE: validation] Internal error compiling regex '{}': {}",
                pattern, e
            );
            None
        }
    }
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// IFSC: four letters, a literal zero, six alphanumerics. Exactly 11 characters.
pub fn is_valid_ifsc(ifsc: &str) -> bool {
    if ifsc.len() != 11 {
        return false;
    }
    compile(IFSC_PATTERN)
        .map(|re| re.is_match(ifsc))
        .unwrap_or(false)
}

/// Account numbers are digits only, at least nine of them.
pub fn is_valid_account_number(account_number: &str) -> bool {
    account_number.len() >= 9 && all_digits(account_number)
}

pub fn validate_mobile(mobile: &str) -> ClientResult<()> {
    let m = mobile.trim();
    if m.len() != 10 || !all_digits(m) {
        return Err(ClientError::validation(
            "mobile",
            "Mobile number must be exactly 10 digits",
        ));
    }
    Ok(())
}

pub fn validate_pincode(pincode: &str) -> ClientResult<()> {
    let p = pincode.trim();
    if p.len() != 6 || !all_digits(p) {
        return Err(ClientError::validation(
            "pincode",
            "Pincode must be exactly 6 digits",
        ));
    }
    Ok(())
}

pub fn validate_aadhaar(aadhaar: &str) -> ClientResult<()> {
    let a: String = aadhaar.chars().filter(|c| !c.is_whitespace()).collect();
    if a.len() != 12 || !all_digits(&a) {
        return Err(ClientError::validation(
            "aadhaar_number",
            "Aadhaar number must be 12 digits",
        ));
    }
    Ok(())
}

pub fn validate_pan(pan: &str) -> ClientResult<()> {
    let p = pan.trim().to_ascii_uppercase();
    let ok = compile(PAN_PATTERN)
        .map(|re| re.is_match(&p))
        .unwrap_or(false);
    if !ok {
        return Err(ClientError::validation(
            "pan_number",
            "Invalid PAN format. Expected format: ABCDE1234F",
        ));
    }
    Ok(())
}

/// Date of birth as `YYYY-MM-DD`, strictly in the past.
pub fn validate_dob(dob: &str) -> ClientResult<NaiveDate> {
    let date = NaiveDate::parse_from_str(dob.trim(), "%Y-%m-%d").map_err(|_| {
        ClientError::validation("dob", "Date of birth must be in YYYY-MM-DD format")
    })?;
    if date >= Utc::now().date_naive() {
        return Err(ClientError::validation(
            "dob",
            "Date of birth must be in the past",
        ));
    }
    Ok(date)
}

/// Positive decimal amount (land area, investment).
pub fn validate_positive_number(field: &str, value: &str) -> ClientResult<f64> {
    let n = value
        .trim()
        .parse::<f64>()
        .map_err(|_| ClientError::validation(field, "Must be a number"))?;
    if !n.is_finite() || n <= 0.0 {
        return Err(ClientError::validation(field, "Must be greater than zero"));
    }
    Ok(n)
}
