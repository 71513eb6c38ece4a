// Bank account verification
//
// Two layers:
// - format flags recomputed on every edit (IFSC shape, account number shape)
// - the remote penny-drop chain: contact -> fund account -> fund account validation
//
// The chain is strictly sequential and stops at the first failure. Remote objects created
// before the failure are not deleted; the error carries their ids so the caller (and the log)
// know what was left behind.

use crate::error::ClientError;
use crate::utils::logging::mask_account_number;
use crate::utils::validation::{is_valid_account_number, is_valid_ifsc};
use async_trait::async_trait;
use log::{info, warn};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerificationStatus {
    pub ifsc_verified: bool,
    pub account_verified: bool,
    pub account_validated: bool,
}

impl VerificationStatus {
    pub fn on_ifsc_changed(&mut self, ifsc: &str) {
        self.ifsc_verified = is_valid_ifsc(ifsc);
        self.account_validated = false;
    }

    pub fn on_account_number_changed(&mut self, account_number: &str) {
        self.account_verified = is_valid_account_number(account_number);
        self.account_validated = false;
    }

    /// Any other bank field edit invalidates a previous remote validation.
    pub fn on_bank_field_changed(&mut self) {
        self.account_validated = false;
    }

    /// Both format checks passed; the remote chain may be started.
    pub fn ready_for_validation(&self) -> bool {
        self.ifsc_verified && self.account_verified
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankDetails {
    pub account_holder_name: String,
    pub account_number: String,
    pub ifsc_code: String,
    pub contact_name: String,
    pub contact_mobile: Option<String>,
    pub contact_email: Option<String>,
    /// Our own reference (mobile number or pending user id) attached to the remote contact.
    pub reference_id: String,
}

/// Processor responses, reduced to what the chain needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundAccountRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRef {
    pub id: String,
    pub status: String,
    pub registered_name: Option<String>,
}

/// Third-party payment processor operations used by the verification chain.
#[async_trait]
pub trait BankValidationGateway: Send + Sync {
    async fn create_contact(&self, details: &BankDetails) -> Result<ContactRef, ClientError>;

    async fn create_fund_account(
        &self,
        contact: &ContactRef,
        details: &BankDetails,
    ) -> Result<FundAccountRef, ClientError>;

    async fn validate_fund_account(
        &self,
        fund_account: &FundAccountRef,
    ) -> Result<ValidationRef, ClientError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStage {
    Precheck,
    CreateContact,
    CreateFundAccount,
    ValidateFundAccount,
}

impl fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Precheck => "precheck",
            Self::CreateContact => "create_contact",
            Self::CreateFundAccount => "create_fund_account",
            Self::ValidateFundAccount => "validate_fund_account",
        };
        f.write_str(s)
    }
}

/// Remote objects that exist after a partial failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteResources {
    pub contact_id: Option<String>,
    pub fund_account_id: Option<String>,
}

impl RemoteResources {
    pub fn is_empty(&self) -> bool {
        self.contact_id.is_none() && self.fund_account_id.is_none()
    }
}

#[derive(Debug, Clone, Error)]
#[error("Bank account validation failed at {stage}: {source}")]
pub struct BankValidationError {
    pub stage: ValidationStage,
    pub orphaned: RemoteResources,
    #[source]
    pub source: ClientError,
}

impl BankValidationError {
    /// Single generic alert text regardless of the stage.
    pub fn user_message(&self) -> String {
        match &self.source {
            ClientError::Validation { message, .. } => message.clone(),
            _ => "Unable to validate bank account. Please check the details and try again."
                .to_string(),
        }
    }
}

impl From<BankValidationError> for ClientError {
    fn from(e: BankValidationError) -> Self {
        match e.source {
            ClientError::Validation { .. } => e.source,
            _ => ClientError::external("bank_validation", e.user_message()),
        }
    }
}

/// Proof of a successful chain, tied to the details that were sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankValidationReceipt {
    pub contact_id: String,
    pub fund_account_id: String,
    pub validation_id: String,
    pub registered_name: Option<String>,
    pub details: BankDetails,
}

const VALIDATION_CREATED: &str = "created";

/// Run the three-call chain. Each step uses the id returned by the previous one.
pub async fn validate_bank_account<G: BankValidationGateway + ?Sized>(
    gateway: &G,
    status: &VerificationStatus,
    details: &BankDetails,
) -> Result<BankValidationReceipt, BankValidationError> {
    let mut created = RemoteResources::default();

    if !status.ready_for_validation() {
        return Err(BankValidationError {
            stage: ValidationStage::Precheck,
            orphaned: created,
            source: ClientError::validation(
                "bank",
                "Enter a valid IFSC code and account number before validating",
            ),
        });
    }

    let fail = |stage: ValidationStage, orphaned: &RemoteResources, source: ClientError| {
        if !orphaned.is_empty() {
            warn!(
                "[PHASE: wizard] [STEP: bank_validation] Chain aborted at {}; leaving remote contact={:?} fund_account={:?}",
                stage, orphaned.contact_id, orphaned.fund_account_id
            );
        }
        BankValidationError {
            stage,
            orphaned: orphaned.clone(),
            source,
        }
    };

    info!(
        "[PHASE: wizard] [STEP: bank_validation] Validating account {} / {}",
        mask_account_number(&details.account_number),
        details.ifsc_code
    );

    let contact = gateway
        .create_contact(details)
        .await
        .map_err(|e| fail(ValidationStage::CreateContact, &created, e))?;
    created.contact_id = Some(contact.id.clone());

    let fund_account = gateway
        .create_fund_account(&contact, details)
        .await
        .map_err(|e| fail(ValidationStage::CreateFundAccount, &created, e))?;
    created.fund_account_id = Some(fund_account.id.clone());

    let validation = gateway
        .validate_fund_account(&fund_account)
        .await
        .map_err(|e| fail(ValidationStage::ValidateFundAccount, &created, e))?;

    if validation.status != VALIDATION_CREATED {
        return Err(fail(
            ValidationStage::ValidateFundAccount,
            &created,
            ClientError::external(
                "bank_validation",
                format!("Unexpected validation status '{}'", validation.status),
            ),
        ));
    }

    info!(
        "[PHASE: wizard] [STEP: bank_validation] Account validated (validation_id={})",
        validation.id
    );

    Ok(BankValidationReceipt {
        contact_id: contact.id,
        fund_account_id: fund_account.id,
        validation_id: validation.id,
        registered_name: validation.registered_name,
        details: details.clone(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scripted gateway: records call order, fails at a chosen stage, returns a chosen status.
    pub struct StubGateway {
        pub fail_at: Option<ValidationStage>,
        pub validation_status: String,
        pub calls: Mutex<Vec<String>>,
    }

    impl StubGateway {
        pub fn ok() -> Self {
            Self {
                fail_at: None,
                validation_status: "created".to_string(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String, stage: ValidationStage) -> Result<(), ClientError> {
            self.calls.lock().unwrap().push(call);
            if self.fail_at == Some(stage) {
                return Err(ClientError::external("payments", "HTTP 400"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl BankValidationGateway for StubGateway {
        async fn create_contact(&self, _d: &BankDetails) -> Result<ContactRef, ClientError> {
            self.record("contact".to_string(), ValidationStage::CreateContact)?;
            Ok(ContactRef {
                id: "cont_1".to_string(),
            })
        }

        async fn create_fund_account(
            &self,
            contact: &ContactRef,
            _d: &BankDetails,
        ) -> Result<FundAccountRef, ClientError> {
            self.record(
                format!("fund_account:{}", contact.id),
                ValidationStage::CreateFundAccount,
            )?;
            Ok(FundAccountRef {
                id: "fa_1".to_string(),
            })
        }

        async fn validate_fund_account(
            &self,
            fa: &FundAccountRef,
        ) -> Result<ValidationRef, ClientError> {
            self.record(
                format!("validate:{}", fa.id),
                ValidationStage::ValidateFundAccount,
            )?;
            Ok(ValidationRef {
                id: "fav_1".to_string(),
                status: self.validation_status.clone(),
                registered_name: Some("RAVI KUMAR".to_string()),
            })
        }
    }

    pub fn sample_details() -> BankDetails {
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

    fn verified(details: &BankDetails) -> VerificationStatus {
        let mut s = VerificationStatus::default();
        s.on_ifsc_changed(&details.ifsc_code);
        s.on_account_number_changed(&details.account_number);
        s
    }

    #[test]
    fn format_flags_follow_edits() {
        let mut s = VerificationStatus::default();
        s.on_ifsc_changed("HDFC0001234");
        s.on_account_number_changed("123456789");
        assert!(s.ready_for_validation());
        s.account_validated = true;

        s.on_ifsc_changed("HDFC000123");
        assert!(!s.ifsc_verified);
        assert!(!s.account_validated);

        s.on_account_number_changed("12345678");
        assert!(!s.account_verified);
    }

    #[tokio::test]
    async fn chain_runs_in_order_with_previous_ids() {
        let gw = StubGateway::ok();
        let d = sample_details();
        let receipt = validate_bank_account(&gw, &verified(&d), &d).await.unwrap();
        assert_eq!(
            gw.calls(),
            vec!["contact", "fund_account:cont_1", "validate:fa_1"]
        );
        assert_eq!(receipt.validation_id, "fav_1");
        assert_eq!(receipt.details, d);
    }

    #[tokio::test]
    async fn non_created_status_fails_with_orphans_recorded() {
        let mut gw = StubGateway::ok();
        gw.validation_status = "failed".to_string();
        let d = sample_details();
        let err = validate_bank_account(&gw, &verified(&d), &d)
            .await
            .unwrap_err();
        assert_eq!(err.stage, ValidationStage::ValidateFundAccount);
        assert_eq!(err.orphaned.contact_id.as_deref(), Some("cont_1"));
        assert_eq!(err.orphaned.fund_account_id.as_deref(), Some("fa_1"));
        assert_eq!(gw.calls().len(), 3);
    }

    #[tokio::test]
    async fn failure_aborts_remaining_calls() {
        let mut gw = StubGateway::ok();
        gw.fail_at = Some(ValidationStage::CreateFundAccount);
        let d = sample_details();
        let err = validate_bank_account(&gw, &verified(&d), &d)
            .await
            .unwrap_err();
        assert_eq!(err.stage, ValidationStage::CreateFundAccount);
        assert_eq!(err.orphaned.fund_account_id, None);
        assert_eq!(gw.calls().len(), 2);
        let client: ClientError = err.into();
        assert!(client.is_retryable_by_user());
    }

    #[tokio::test]
    async fn invalid_format_never_calls_gateway() {
        let gw = StubGateway::ok();
        let d = sample_details();
        let err = validate_bank_account(&gw, &VerificationStatus::default(), &d)
            .await
            .unwrap_err();
        assert_eq!(err.stage, ValidationStage::Precheck);
        assert!(gw.calls().is_empty());
        assert!(err.orphaned.is_empty());
    }
}
