// API response models
//
// The backend wraps most payloads in `{ status | success, message, data }` but not all of
// them (location lists come back bare). Everything goes through `normalize` once, right after
// the HTTP call, so call sites only ever see typed values or a `ClientError`.

use crate::error::{ClientError, ClientResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEnvelope {
    status: Option<String>,
    success: Option<bool>,
    message: Option<String>,
    error: Option<String>,
    data: Option<Value>,
}

/// Turn an HTTP status + body into the payload value or a typed error.
pub fn normalize(http_status: u16, body: &str) -> ClientResult<Value> {
    let parsed: Value = if body.trim().is_empty() {
        Value::Null
    } else {
        match serde_json::from_str(body) {
            Ok(v) => v,
            Err(e) if (200..300).contains(&http_status) => return Err(e.into()),
            Err(_) => Value::Null,
        }
    };

    let envelope = match &parsed {
        Value::Object(map)
            if map.contains_key("status")
                || map.contains_key("success")
                || map.contains_key("data") =>
        {
            serde_json::from_value::<ApiEnvelope>(parsed.clone()).ok()
        }
        _ => None,
    };

    let server_message = envelope
        .as_ref()
        .and_then(|e| e.message.clone().or_else(|| e.error.clone()));

    if !(200..300).contains(&http_status) {
        return Err(ClientError::Api {
            status: http_status,
            message: server_message
                .unwrap_or_else(|| format!("Request failed with status {}", http_status)),
        });
    }

    let Some(envelope) = envelope else {
        return Ok(parsed);
    };

    let status_failed = envelope
        .status
        .as_deref()
        .map(|s| !s.eq_ignore_ascii_case("success"))
        .unwrap_or(false);
    if envelope.success == Some(false) || status_failed {
        return Err(ClientError::Api {
            status: http_status,
            message: server_message.unwrap_or_else(|| "Request was not successful".to_string()),
        });
    }

    Ok(envelope.data.unwrap_or(parsed))
}

/// Normalize, then decode into the endpoint's schema.
pub fn decode<T: DeserializeOwned>(http_status: u16, body: &str) -> ClientResult<T> {
    let value = normalize(http_status, body)?;
    serde_json::from_value(value).map_err(ClientError::from)
}

/// Ids arrive as numbers from some endpoints and strings from others.
fn id_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Num(i64),
        Text(String),
    }
    Ok(match IdRepr::deserialize(deserializer)? {
        IdRepr::Num(n) => n.to_string(),
        IdRepr::Text(s) => s,
    })
}

fn amount_from_any<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum AmountRepr {
        Num(f64),
        Text(String),
        Missing(Option<()>),
    }
    Ok(match AmountRepr::deserialize(deserializer)? {
        AmountRepr::Num(n) => n,
        AmountRepr::Text(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        AmountRepr::Missing(_) => 0.0,
    })
}

// =========================
// Locations
// =========================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationOption {
    #[serde(deserialize_with = "id_from_any", alias = "_id")]
    pub id: String,
    pub name: String,
}

impl LocationOption {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

// =========================
// Registration
// =========================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResult {
    #[serde(deserialize_with = "id_from_any", alias = "id", alias = "_id")]
    pub user_id: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(
        default,
        deserialize_with = "amount_from_any",
        alias = "fee",
        alias = "registration_fee"
    )]
    pub registration_fee: f64,
    #[serde(default)]
    pub user: Value,
}

// =========================
// Bank / land
// =========================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankInfo {
    pub bank_name: String,
    pub account_holder_name: String,
    pub account_number: String,
    pub ifsc_code: String,
    #[serde(default)]
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandDetails {
    #[serde(default, deserialize_with = "id_from_any", alias = "_id")]
    pub id: String,
    pub survey_number: String,
    #[serde(deserialize_with = "amount_from_any")]
    pub land_area: f64,
    pub land_type: String,
    #[serde(default, deserialize_with = "amount_from_any")]
    pub investment_amount: f64,
    #[serde(default)]
    pub village: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_array_passes_through() {
        let body = r#"[{"id":1,"name":"Tamil Nadu"},{"id":"2","name":"Kerala"}]"#;
        let list: Vec<LocationOption> = decode(200, body).unwrap();
        assert_eq!(list[0], LocationOption::new("1", "Tamil Nadu"));
        assert_eq!(list[1].id, "2");
    }

    #[test]
    fn envelope_data_is_unwrapped() {
        let body = r#"{"status":"success","data":[{"_id":5,"name":"Madurai"}]}"#;
        let list: Vec<LocationOption> = decode(200, body).unwrap();
        assert_eq!(list, vec![LocationOption::new("5", "Madurai")]);
    }

    #[test]
    fn envelope_failure_status_becomes_api_error() {
        let body = r#"{"status":"error","message":"Mobile already registered"}"#;
        let err = normalize(200, body).unwrap_err();
        match err {
            ClientError::Api { status, message } => {
                assert_eq!(status, 200);
                assert_eq!(message, "Mobile already registered");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn non_2xx_uses_server_message_when_present() {
        let err = normalize(422, r#"{"success":false,"error":"IFSC invalid"}"#).unwrap_err();
        assert_eq!(err.to_string(), "IFSC invalid");

        let err = normalize(502, "<html>bad gateway</html>").unwrap_err();
        assert_eq!(err.to_string(), "Request failed with status 502");
    }

    #[test]
    fn unparseable_success_body_is_network_error() {
        let err = normalize(200, "not json").unwrap_err();
        assert!(matches!(err, ClientError::Network { .. }));
    }

    #[test]
    fn registration_result_accepts_field_aliases() {
        let body = r#"{"status":"success","data":{"id":42,"token":"t","fee":"500"}}"#;
        let r: RegistrationResult = decode(201, body).unwrap();
        assert_eq!(r.user_id, "42");
        assert_eq!(r.registration_fee, 500.0);
        assert_eq!(r.token.as_deref(), Some("t"));

        let body = r#"{"status":"success","data":{"userId":"u-1"}}"#;
        let r: RegistrationResult = decode(200, body).unwrap();
        assert_eq!(r.registration_fee, 0.0);
    }
}
