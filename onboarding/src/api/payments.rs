// Payment processor client
//
// Basic auth with the key pair from `[payments]`. Used for two things:
// - penny-drop bank validation: contacts -> fund_accounts -> fund_accounts/validations
// - the registration fee, as a hosted payment link that is polled for its final state

use crate::config::PaymentSettings;
use crate::error::{ClientError, ClientResult};
use crate::utils::logging::mask_account_number;
use crate::wizard::submission::{CheckoutGateway, CheckoutHandle, CheckoutOrder, PaymentOutcome};
use crate::wizard::verification::{
    BankDetails, BankValidationGateway, ContactRef, FundAccountRef, ValidationRef,
};
use async_trait::async_trait;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

const SERVICE: &str = "payments";
/// Amount (paise) moved by the penny-drop validation.
const VALIDATION_AMOUNT: u64 = 100;

pub struct PaymentProcessor {
    client: reqwest::Client,
    settings: PaymentSettings,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ValidationResponse {
    id: String,
    status: String,
    #[serde(default)]
    results: Option<ValidationResults>,
}

#[derive(Debug, Deserialize)]
struct ValidationResults {
    #[serde(default)]
    registered_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentLinkResponse {
    id: String,
    #[serde(default)]
    short_url: String,
    status: String,
    #[serde(default)]
    payments: Option<Vec<LinkPayment>>,
}

#[derive(Debug, Deserialize)]
struct LinkPayment {
    payment_id: String,
}

#[derive(Debug, Serialize)]
struct PaymentLinkCustomer<'a> {
    name: &'a str,
    contact: &'a str,
}

#[derive(Debug, Serialize)]
struct PaymentLinkRequest<'a> {
    amount: u64,
    currency: &'a str,
    description: &'a str,
    reference_id: &'a str,
    customer: PaymentLinkCustomer<'a>,
}

/// `{"error":{"code":"BAD_REQUEST_ERROR","description":"..."}}`
fn error_description(body: &str) -> Option<String> {
    let v: Value = serde_json::from_str(body).ok()?;
    v.get("error")?
        .get("description")?
        .as_str()
        .map(str::to_string)
}

impl PaymentProcessor {
    pub fn new(settings: &PaymentSettings, timeout_secs: u64) -> ClientResult<Self> {
        if settings.key_id.trim().is_empty() || settings.key_secret.trim().is_empty() {
            return Err(ClientError::Config(
                "Payment processor credentials are not configured".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            settings: settings.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.settings.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn send<T: DeserializeOwned>(
        &self,
        step: &str,
        request: reqwest::RequestBuilder,
    ) -> ClientResult<T> {
        let resp = request
            .basic_auth(&self.settings.key_id, Some(&self.settings.key_secret))
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            let message = error_description(&body)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            warn!(
                "[PHASE: payments] [STEP: {}] HTTP {}: {}",
                step,
                status.as_u16(),
                message
            );
            return Err(ClientError::external(SERVICE, message));
        }
        debug!("[PHASE: payments] [STEP: {}] HTTP {}", step, status.as_u16());
        serde_json::from_str(&body).map_err(|e| {
            ClientError::external(SERVICE, format!("Unexpected response: {}", e))
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        step: &str,
        path: &str,
        body: &Value,
    ) -> ClientResult<T> {
        self.send(step, self.client.post(self.url(path)).json(body)).await
    }
}

#[async_trait]
impl BankValidationGateway for PaymentProcessor {
    async fn create_contact(&self, details: &BankDetails) -> Result<ContactRef, ClientError> {
        let mut body = json!({
            "name": details.contact_name,
            "type": "customer",
            "reference_id": details.reference_id,
        });
        if let Some(mobile) = &details.contact_mobile {
            body["contact"] = json!(mobile);
        }
        if let Some(email) = &details.contact_email {
            body["email"] = json!(email);
        }
        let r: IdResponse = self.post("create_contact", "contacts", &body).await?;
        Ok(ContactRef { id: r.id })
    }

    async fn create_fund_account(
        &self,
        contact: &ContactRef,
        details: &BankDetails,
    ) -> Result<FundAccountRef, ClientError> {
        debug!(
            "[PHASE: payments] [STEP: create_fund_account] contact={} account={}",
            contact.id,
            mask_account_number(&details.account_number)
        );
        let body = json!({
            "contact_id": contact.id,
            "account_type": "bank_account",
            "bank_account": {
                "name": details.account_holder_name,
                "ifsc": details.ifsc_code,
                "account_number": details.account_number,
            }
        });
        let r: IdResponse = self
            .post("create_fund_account", "fund_accounts", &body)
            .await?;
        Ok(FundAccountRef { id: r.id })
    }

    async fn validate_fund_account(
        &self,
        fund_account: &FundAccountRef,
    ) -> Result<ValidationRef, ClientError> {
        let body = json!({
            "account_number": self.settings.source_account_number,
            "fund_account": { "id": fund_account.id },
            "amount": VALIDATION_AMOUNT,
            "currency": self.settings.currency,
        });
        let r: ValidationResponse = self
            .post("validate_fund_account", "fund_accounts/validations", &body)
            .await?;
        Ok(ValidationRef {
            id: r.id,
            status: r.status,
            registered_name: r.results.and_then(|res| res.registered_name),
        })
    }
}

#[async_trait]
impl CheckoutGateway for PaymentProcessor {
    async fn open_checkout(&self, order: &CheckoutOrder) -> ClientResult<CheckoutHandle> {
        let request = PaymentLinkRequest {
            amount: order.amount_minor,
            currency: &order.currency,
            description: &order.description,
            reference_id: &order.reference_id,
            customer: PaymentLinkCustomer {
                name: &order.customer_name,
                contact: &order.customer_mobile,
            },
        };
        let link: PaymentLinkResponse = self
            .send(
                "open_checkout",
                self.client.post(self.url("payment_links")).json(&request),
            )
            .await?;
        Ok(CheckoutHandle {
            id: link.id,
            url: link.short_url,
        })
    }

    async fn checkout_result(&self, handle: &CheckoutHandle) -> ClientResult<PaymentOutcome> {
        let link: PaymentLinkResponse = self
            .send(
                "checkout_result",
                self.client
                    .get(self.url(&format!("payment_links/{}", handle.id))),
            )
            .await?;
        Ok(match link.status.as_str() {
            "paid" => PaymentOutcome::Paid {
                payment_id: link
                    .payments
                    .and_then(|p| p.into_iter().next())
                    .map(|p| p.payment_id)
                    .unwrap_or(link.id),
            },
            "created" | "partially_paid" => PaymentOutcome::Pending,
            other => PaymentOutcome::Failed {
                reason: format!("Payment link {}", other),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const AUTH: &str = "Basic cnpwX3Rlc3Rfa2V5OnNlY3JldA==";

    fn processor(url: String) -> PaymentProcessor {
        let settings = PaymentSettings {
            base_url: url,
            key_id: "rzp_test_key".to_string(),
            key_secret: "secret".to_string(),
            source_account_number: "7878780080316316".to_string(),
            ..PaymentSettings::default()
        };
        PaymentProcessor::new(&settings, 5).unwrap()
    }

    fn details() -> BankDetails {
        BankDetails {
            account_holder_name: "Ravi Kumar".to_string(),
            account_number: "123456789".to_string(),
            ifsc_code: "HDFC0001234".to_string(),
            contact_name: "Ravi Kumar".to_string(),
            contact_mobile: Some("9876543210".to_string()),
            contact_email: None,
            reference_id: "9876543210".to_string(),
        }
    }

    #[test]
    fn missing_credentials_are_a_config_error() {
        let err = PaymentProcessor::new(&PaymentSettings::default(), 5).err();
        assert!(matches!(err, Some(ClientError::Config(_))));
    }

    #[tokio::test]
    async fn validation_chain_against_processor() {
        let mut server = Server::new_async().await;
        let contact = server
            .mock("POST", "/contacts")
            .match_header("authorization", AUTH)
            .match_body(Matcher::PartialJson(json!({
                "name": "Ravi Kumar",
                "contact": "9876543210",
                "type": "customer"
            })))
            .with_status(200)
            .with_body(r#"{"id":"cont_1","entity":"contact"}"#)
            .create_async()
            .await;
        let fund = server
            .mock("POST", "/fund_accounts")
            .match_body(Matcher::PartialJson(json!({
                "contact_id": "cont_1",
                "bank_account": {"ifsc": "HDFC0001234", "account_number": "123456789"}
            })))
            .with_status(200)
            .with_body(r#"{"id":"fa_1","entity":"fund_account"}"#)
            .create_async()
            .await;
        let validation = server
            .mock("POST", "/fund_accounts/validations")
            .match_body(Matcher::PartialJson(json!({
                "account_number": "7878780080316316",
                "fund_account": {"id": "fa_1"},
                "amount": 100
            })))
            .with_status(200)
            .with_body(
                r#"{"id":"fav_1","status":"created","results":{"account_status":null,"registered_name":null}}"#,
            )
            .create_async()
            .await;

        let p = processor(server.url());
        let d = details();
        let c = p.create_contact(&d).await.unwrap();
        let fa = p.create_fund_account(&c, &d).await.unwrap();
        let v = p.validate_fund_account(&fa).await.unwrap();
        assert_eq!(v.status, "created");
        assert_eq!(v.registered_name, None);
        contact.assert_async().await;
        fund.assert_async().await;
        validation.assert_async().await;
    }

    #[tokio::test]
    async fn processor_error_description_is_surfaced() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/contacts")
            .with_status(400)
            .with_body(
                r#"{"error":{"code":"BAD_REQUEST_ERROR","description":"The contact field is invalid"}}"#,
            )
            .create_async()
            .await;
        let err = processor(server.url())
            .create_contact(&details())
            .await
            .unwrap_err();
        match err {
            ClientError::ExternalService { service, message } => {
                assert_eq!(service, "payments");
                assert_eq!(message, "The contact field is invalid");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn payment_link_lifecycle() {
        let mut server = Server::new_async().await;
        let create = server
            .mock("POST", "/payment_links")
            .match_body(Matcher::PartialJson(json!({
                "amount": 50000,
                "currency": "INR",
                "reference_id": "42",
                "customer": {"contact": "9876543210"}
            })))
            .with_status(200)
            .with_body(r#"{"id":"plink_1","short_url":"https://rzp.io/i/abc","status":"created"}"#)
            .create_async()
            .await;
        let paid = server
            .mock("GET", "/payment_links/plink_1")
            .with_status(200)
            .with_body(
                r#"{"id":"plink_1","status":"paid","payments":[{"payment_id":"pay_9","status":"captured"}]}"#,
            )
            .create_async()
            .await;

        let p = processor(server.url());
        let order = CheckoutOrder {
            amount_minor: 50_000,
            currency: "INR".to_string(),
            description: "Cooperative registration fee".to_string(),
            reference_id: "42".to_string(),
            customer_name: "Ravi Kumar".to_string(),
            customer_mobile: "9876543210".to_string(),
        };
        let handle = p.open_checkout(&order).await.unwrap();
        assert_eq!(handle.url, "https://rzp.io/i/abc");
        let outcome = p.checkout_result(&handle).await.unwrap();
        assert_eq!(
            outcome,
            PaymentOutcome::Paid {
                payment_id: "pay_9".to_string()
            }
        );
        create.assert_async().await;
        paid.assert_async().await;
    }

    #[tokio::test]
    async fn expired_link_is_a_failed_payment() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/payment_links/plink_2")
            .with_status(200)
            .with_body(r#"{"id":"plink_2","status":"expired"}"#)
            .create_async()
            .await;
        let handle = CheckoutHandle {
            id: "plink_2".to_string(),
            url: String::new(),
        };
        let outcome = processor(server.url())
            .checkout_result(&handle)
            .await
            .unwrap();
        assert!(matches!(outcome, PaymentOutcome::Failed { .. }));
    }
}
