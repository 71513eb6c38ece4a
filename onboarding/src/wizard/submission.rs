// Submission assembler
//
// register (multipart) -> [investor] land details -> fee > 0 ? checkout : persist session
//
// The land-details request is independent of the registration: if it fails the user still
// exists server-side and the receipt records the failure. The session is written only once the
// registration is fully settled (zero fee, or checkout reported paid).

use super::cascade::{CascadeLevel, LocationCascade};
use super::form::{fields, RegistrationForm};
use crate::error::{ClientError, ClientResult};
use crate::models::requests::{LandDetailsRequest, LandLocation, RegistrationRole};
use crate::models::responses::RegistrationResult;
use crate::session::{SessionContext, SessionData};
use crate::utils::validation;
use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::json;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentAttachment {
    pub field: String,
    pub path: PathBuf,
}

/// Everything the register call sends: text parts and file parts.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationPayload {
    pub role: RegistrationRole,
    pub fields: Vec<(String, String)>,
    pub documents: Vec<DocumentAttachment>,
}

impl RegistrationPayload {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Backend calls made by the submission step.
#[async_trait]
pub trait RegistrationApi: Send + Sync {
    async fn register(&self, payload: &RegistrationPayload) -> ClientResult<RegistrationResult>;

    async fn submit_land_details(
        &self,
        auth_token: &str,
        request: &LandDetailsRequest,
    ) -> ClientResult<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutOrder {
    /// Smallest currency unit (paise for INR).
    pub amount_minor: u64,
    pub currency: String,
    pub description: String,
    pub reference_id: String,
    pub customer_name: String,
    pub customer_mobile: String,
}

impl CheckoutOrder {
    pub fn display_amount(&self) -> String {
        format!(
            "{} {}.{:02}",
            self.currency,
            self.amount_minor / 100,
            self.amount_minor % 100
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutHandle {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Paid { payment_id: String },
    Pending,
    Failed { reason: String },
}

/// Hosted checkout: open a payment page, later ask how it ended.
#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    async fn open_checkout(&self, order: &CheckoutOrder) -> ClientResult<CheckoutHandle>;

    async fn checkout_result(&self, handle: &CheckoutHandle) -> ClientResult<PaymentOutcome>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecondaryOutcome {
    NotApplicable,
    Submitted,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NextStep {
    Checkout(CheckoutOrder),
    Complete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationReceipt {
    pub result: RegistrationResult,
    pub session: SessionData,
    pub land_details: SecondaryOutcome,
    pub next: NextStep,
}

/// Checkout wording comes from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutDefaults {
    pub currency: String,
    pub description: String,
}

fn required<'a>(form: &'a RegistrationForm, field: &str) -> ClientResult<&'a str> {
    form.value(field)
        .ok_or_else(|| ClientError::validation(field, "This field is required"))
}

/// Submit-time format checks. Presence is the tab gate's job; this only looks at shape.
pub fn validate_formats(role: RegistrationRole, form: &RegistrationForm) -> ClientResult<()> {
    validation::validate_mobile(required(form, fields::MOBILE)?)?;
    validation::validate_pincode(required(form, fields::PINCODE)?)?;
    validation::validate_dob(required(form, fields::DOB)?)?;
    validation::validate_aadhaar(required(form, fields::AADHAAR_NUMBER)?)?;
    validation::validate_pan(required(form, fields::PAN_NUMBER)?)?;
    if !validation::is_valid_ifsc(required(form, fields::IFSC_CODE)?) {
        return Err(ClientError::validation(fields::IFSC_CODE, "Invalid IFSC code"));
    }
    if !validation::is_valid_account_number(required(form, fields::ACCOUNT_NUMBER)?) {
        return Err(ClientError::validation(
            fields::ACCOUNT_NUMBER,
            "Account number must be at least 9 digits",
        ));
    }
    match role {
        RegistrationRole::Investor => {
            validation::validate_positive_number(
                fields::LAND_AREA,
                required(form, fields::LAND_AREA)?,
            )?;
            validation::validate_positive_number(
                fields::INVESTMENT_AMOUNT,
                required(form, fields::INVESTMENT_AMOUNT)?,
            )?;
        }
        RegistrationRole::ServiceProvider => {
            required(form, fields::EXPERIENCE_YEARS)?
                .parse::<u32>()
                .map_err(|_| {
                    ClientError::validation(fields::EXPERIENCE_YEARS, "Must be a whole number")
                })?;
        }
    }
    Ok(())
}

fn is_remote_uri(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Build the multipart payload from the form and the cascade's selected names.
pub fn assemble(
    role: RegistrationRole,
    form: &RegistrationForm,
    cascade: &LocationCascade,
) -> ClientResult<RegistrationPayload> {
    validate_formats(role, form)?;

    let mut out_fields = vec![("role".to_string(), role.as_str().to_string())];
    let mut documents = Vec::new();

    for (name, value) in form.filled() {
        if fields::DOCUMENT_FIELDS.contains(&name) && !is_remote_uri(value) {
            let path = PathBuf::from(value);
            if !path.is_file() {
                return Err(ClientError::validation(
                    name,
                    format!("File not found: {}", value),
                ));
            }
            documents.push(DocumentAttachment {
                field: name.to_string(),
                path,
            });
            continue;
        }
        let value = match name {
            fields::IFSC_CODE | fields::PAN_NUMBER => value.to_ascii_uppercase(),
            fields::AADHAAR_NUMBER => value.chars().filter(|c| !c.is_whitespace()).collect(),
            _ => value.to_string(),
        };
        out_fields.push((name.to_string(), value));
    }

    for level in CascadeLevel::ALL {
        if let Some(opt) = cascade.selected(level) {
            out_fields.push((format!("{}_name", level.as_str()), opt.name.clone()));
        }
    }

    Ok(RegistrationPayload {
        role,
        fields: out_fields,
        documents,
    })
}

pub fn land_details_request(
    user_id: &str,
    form: &RegistrationForm,
) -> ClientResult<LandDetailsRequest> {
    Ok(LandDetailsRequest {
        user_id: user_id.to_string(),
        survey_number: required(form, fields::SURVEY_NUMBER)?.to_string(),
        land_area: validation::validate_positive_number(
            fields::LAND_AREA,
            required(form, fields::LAND_AREA)?,
        )?,
        land_type: required(form, fields::LAND_TYPE)?.to_string(),
        investment_amount: validation::validate_positive_number(
            fields::INVESTMENT_AMOUNT,
            required(form, fields::INVESTMENT_AMOUNT)?,
        )?,
        location: LandLocation {
            state: required(form, fields::STATE)?.to_string(),
            district: required(form, fields::DISTRICT)?.to_string(),
            taluk: required(form, fields::TALUK)?.to_string(),
            village: required(form, fields::VILLAGE)?.to_string(),
        },
    })
}

fn session_from(
    role: RegistrationRole,
    form: &RegistrationForm,
    result: &RegistrationResult,
) -> SessionData {
    let auth_token = match &result.token {
        Some(t) => t.clone(),
        None => {
            warn!(
                "[PHASE: submission] [STEP: session] Registration response for user {} carried no token",
                result.user_id
            );
            String::new()
        }
    };
    let user_data = if result.user.is_null() {
        json!({
            "id": result.user_id,
            "name": form.value(fields::NAME),
            "mobile": form.value(fields::MOBILE),
            "role": role.as_str(),
        })
    } else {
        result.user.clone()
    };
    SessionData {
        auth_token,
        user_id: result.user_id.clone(),
        user_role: result
            .role
            .clone()
            .unwrap_or_else(|| role.as_str().to_string()),
        user_data,
    }
}

fn fee_to_minor(fee: f64) -> u64 {
    if !fee.is_finite() || fee <= 0.0 {
        return 0;
    }
    (fee * 100.0).round() as u64
}

/// Create the user, then (investors) the land details, and decide what comes next.
pub async fn submit_registration<A: RegistrationApi + ?Sized>(
    api: &A,
    role: RegistrationRole,
    form: &RegistrationForm,
    cascade: &LocationCascade,
    checkout: &CheckoutDefaults,
) -> ClientResult<RegistrationReceipt> {
    let payload = assemble(role, form, cascade)?;
    info!(
        "[PHASE: submission] [STEP: register] Submitting {} registration ({} fields, {} documents)",
        role.as_str(),
        payload.fields.len(),
        payload.documents.len()
    );
    debug!(
        "[PHASE: submission] [STEP: register] Form: {}",
        form.masked_summary()
    );

    let result = api.register(&payload).await?;
    info!(
        "[PHASE: submission] [STEP: register] Registered user {} (fee={})",
        result.user_id, result.registration_fee
    );
    let session = session_from(role, form, &result);

    let land_details = match role {
        RegistrationRole::ServiceProvider => SecondaryOutcome::NotApplicable,
        RegistrationRole::Investor => {
            let outcome = match land_details_request(&result.user_id, form) {
                Ok(req) => api.submit_land_details(&session.auth_token, &req).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => SecondaryOutcome::Submitted,
                Err(e) => {
                    warn!(
                        "[PHASE: submission] [STEP: land_details] Land details failed for user {}: {}",
                        result.user_id,
                        e.log_details()
                    );
                    SecondaryOutcome::Failed(e.to_string())
                }
            }
        }
    };

    let amount_minor = fee_to_minor(result.registration_fee);
    let next = if amount_minor > 0 {
        NextStep::Checkout(CheckoutOrder {
            amount_minor,
            currency: checkout.currency.clone(),
            description: checkout.description.clone(),
            reference_id: result.user_id.clone(),
            customer_name: form.value(fields::NAME).unwrap_or_default().to_string(),
            customer_mobile: form.value(fields::MOBILE).unwrap_or_default().to_string(),
        })
    } else {
        NextStep::Complete
    };

    Ok(RegistrationReceipt {
        result,
        session,
        land_details,
        next,
    })
}

/// Zero-fee path: persist right away.
pub async fn finish_registration(
    sessions: &SessionContext,
    receipt: &RegistrationReceipt,
) -> ClientResult<()> {
    sessions.persist(receipt.session.clone()).await
}

/// Ask the checkout how it ended. Only a paid checkout persists the session.
pub async fn settle_checkout<G: CheckoutGateway + ?Sized>(
    gateway: &G,
    sessions: &SessionContext,
    receipt: &RegistrationReceipt,
    handle: &CheckoutHandle,
) -> ClientResult<PaymentOutcome> {
    let outcome = gateway.checkout_result(handle).await?;
    match &outcome {
        PaymentOutcome::Paid { payment_id } => {
            info!(
                "[PHASE: submission] [STEP: payment] Payment {} captured for user {}",
                payment_id, receipt.result.user_id
            );
            sessions.persist(receipt.session.clone()).await?;
        }
        PaymentOutcome::Pending => {
            info!(
                "[PHASE: submission] [STEP: payment] Checkout {} not completed yet",
                handle.id
            );
        }
        PaymentOutcome::Failed { reason } => {
            warn!(
                "[PHASE: submission] [STEP: payment] Checkout {} failed: {}",
                handle.id, reason
            );
        }
    }
    Ok(outcome)
}
