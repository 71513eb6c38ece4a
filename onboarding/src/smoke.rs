// Deterministic in-process pipeline run (`--submit-smoke`)
//
// Drives the wizard end to end against scripted collaborators (no network) and writes a
// transcript under the log folder. The same collaborators seed `--tui-smoke` frames.

use crate::error::{ClientError, ClientResult};
use crate::models::requests::{LandDetailsRequest, RegistrationRole};
use crate::models::responses::{LocationOption, RegistrationResult};
use crate::session::SessionContext;
use crate::wizard::cascade::{CascadeLevel, LocationDirectory};
use crate::wizard::form::fields;
use crate::wizard::gate::WizardTab;
use crate::wizard::submission::{
    self, CheckoutDefaults, CheckoutGateway, CheckoutHandle, CheckoutOrder, NextStep,
    PaymentOutcome, RegistrationApi, RegistrationPayload,
};
use crate::wizard::verification::{
    self, BankDetails, BankValidationGateway, ContactRef, FundAccountRef, ValidationRef,
};
use crate::wizard::Wizard;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const TRANSCRIPT_FILE_NAME: &str = "submit_smoke_transcript.log";

/// Fixed location tree: two states, a few districts, one taluk and village under Madurai.
pub struct SampleDirectory {
    states: Vec<LocationOption>,
    children: HashMap<(CascadeLevel, String), Vec<LocationOption>>,
}

impl SampleDirectory {
    pub fn new() -> Self {
        let mut children = HashMap::new();
        children.insert(
            (CascadeLevel::District, "33".to_string()),
            vec![
                LocationOption::new("3301", "Madurai"),
                LocationOption::new("3302", "Theni"),
                LocationOption::new("3303", "Dindigul"),
            ],
        );
        children.insert(
            (CascadeLevel::District, "32".to_string()),
            vec![LocationOption::new("3201", "Ernakulam")],
        );
        children.insert(
            (CascadeLevel::Taluk, "3301".to_string()),
            vec![
                LocationOption::new("330101", "Melur"),
                LocationOption::new("330102", "Vadipatti"),
            ],
        );
        children.insert(
            (CascadeLevel::Village, "330101".to_string()),
            vec![
                LocationOption::new("33010101", "Kottampatti"),
                LocationOption::new("33010102", "Keelavalavu"),
            ],
        );
        Self {
            states: vec![
                LocationOption::new("32", "Kerala"),
                LocationOption::new("33", "Tamil Nadu"),
            ],
            children,
        }
    }
}

impl Default for SampleDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocationDirectory for SampleDirectory {
    async fn states(&self) -> ClientResult<Vec<LocationOption>> {
        Ok(self.states.clone())
    }

    async fn children(
        &self,
        level: CascadeLevel,
        parent_id: &str,
    ) -> ClientResult<Vec<LocationOption>> {
        Ok(self
            .children
            .get(&(level, parent_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

/// Backend that accepts every registration with a fixed fee.
pub struct ScriptedBackend {
    pub fee: f64,
    next_id: Mutex<u32>,
}

impl ScriptedBackend {
    pub fn with_fee(fee: f64) -> Self {
        Self {
            fee,
            next_id: Mutex::new(1000),
        }
    }
}

#[async_trait]
impl RegistrationApi for ScriptedBackend {
    async fn register(&self, payload: &RegistrationPayload) -> ClientResult<RegistrationResult> {
        let id = {
            let mut guard = self
                .next_id
                .lock()
                .map_err(|_| ClientError::network("scripted backend poisoned"))?;
            *guard += 1;
            *guard
        };
        Ok(RegistrationResult {
            user_id: id.to_string(),
            token: Some(format!("smoke-token-{}", id)),
            role: Some(payload.role.as_str().to_string()),
            registration_fee: self.fee,
            user: serde_json::Value::Null,
        })
    }

    async fn submit_land_details(
        &self,
        _auth_token: &str,
        _request: &LandDetailsRequest,
    ) -> ClientResult<()> {
        Ok(())
    }
}

/// Processor double: validation statuses and payment outcomes are consumed in order.
pub struct ScriptedProcessor {
    validation_statuses: Mutex<VecDeque<String>>,
    payment_outcomes: Mutex<VecDeque<PaymentOutcome>>,
    counter: Mutex<u32>,
}

impl ScriptedProcessor {
    pub fn new(validation_statuses: &[&str], payment_outcomes: Vec<PaymentOutcome>) -> Self {
        Self {
            validation_statuses: Mutex::new(
                validation_statuses.iter().map(|s| s.to_string()).collect(),
            ),
            payment_outcomes: Mutex::new(payment_outcomes.into()),
            counter: Mutex::new(0),
        }
    }

    /// Always validates, always pays.
    pub fn approving() -> Self {
        Self::new(&[], Vec::new())
    }

    fn next_id(&self, prefix: &str) -> ClientResult<String> {
        let mut guard = self
            .counter
            .lock()
            .map_err(|_| ClientError::external("payments", "scripted processor poisoned"))?;
        *guard += 1;
        Ok(format!("{}_{:04}", prefix, *guard))
    }
}

#[async_trait]
impl BankValidationGateway for ScriptedProcessor {
    async fn create_contact(&self, _details: &BankDetails) -> Result<ContactRef, ClientError> {
        Ok(ContactRef {
            id: self.next_id("cont")?,
        })
    }

    async fn create_fund_account(
        &self,
        _contact: &ContactRef,
        _details: &BankDetails,
    ) -> Result<FundAccountRef, ClientError> {
        Ok(FundAccountRef {
            id: self.next_id("fa")?,
        })
    }

    async fn validate_fund_account(
        &self,
        _fund_account: &FundAccountRef,
    ) -> Result<ValidationRef, ClientError> {
        let status = self
            .validation_statuses
            .lock()
            .map_err(|_| ClientError::external("payments", "scripted processor poisoned"))?
            .pop_front()
            .unwrap_or_else(|| "created".to_string());
        Ok(ValidationRef {
            id: self.next_id("fav")?,
            status,
            registered_name: None,
        })
    }
}

#[async_trait]
impl CheckoutGateway for ScriptedProcessor {
    async fn open_checkout(&self, _order: &CheckoutOrder) -> ClientResult<CheckoutHandle> {
        let id = self.next_id("plink")?;
        Ok(CheckoutHandle {
            url: format!("https://pay.invalid/{}", id),
            id,
        })
    }

    async fn checkout_result(&self, handle: &CheckoutHandle) -> ClientResult<PaymentOutcome> {
        let next = self
            .payment_outcomes
            .lock()
            .map_err(|_| ClientError::external("payments", "scripted processor poisoned"))?
            .pop_front();
        Ok(next.unwrap_or_else(|| PaymentOutcome::Paid {
            payment_id: format!("pay_{}", handle.id),
        }))
    }
}

/// Sample values for every text field of `role`. Document fields are left to the caller.
pub fn sample_values(role: RegistrationRole) -> Vec<(&'static str, &'static str)> {
    let mut v = vec![
        (fields::NAME, "Lakshmi Narayanan"),
        (fields::MOBILE, "9443012345"),
        (fields::ADDRESS, "4 North Car Street"),
        (fields::PINCODE, "625106"),
        (fields::GENDER, "female"),
        (fields::DOB, "1984-11-02"),
        (fields::AADHAAR_NUMBER, "4321 8765 1098"),
        (fields::PAN_NUMBER, "AKLPN4521Q"),
        (fields::BANK_NAME, "Indian Bank"),
        (fields::ACCOUNT_HOLDER_NAME, "Lakshmi Narayanan"),
        (fields::ACCOUNT_NUMBER, "6012345678"),
        (fields::IFSC_CODE, "IDIB000M012"),
    ];
    match role {
        RegistrationRole::Investor => v.extend([
            (fields::SURVEY_NUMBER, "214/2B"),
            (fields::LAND_AREA, "3.75"),
            (fields::LAND_TYPE, "dryland"),
            (fields::INVESTMENT_AMOUNT, "250000"),
        ]),
        RegistrationRole::ServiceProvider => v.extend([
            (fields::SERVICE_CATEGORY, "harvester_hire"),
            (fields::EXPERIENCE_YEARS, "9"),
            (fields::SERVICE_AREA, "Melur taluk"),
        ]),
    }
    v
}

/// Fill every field of `tab` from the sample values.
pub fn fill_tab(wizard: &mut Wizard, tab: WizardTab) {
    let role = wizard.role();
    for (field, value) in sample_values(role) {
        if crate::wizard::gate::required_fields(role, tab).contains(&field) {
            wizard.set_field(field, value);
        }
    }
}

/// Walk the cascade down to Melur / Kottampatti.
pub async fn select_sample_location<D: LocationDirectory + ?Sized>(
    wizard: &mut Wizard,
    directory: &D,
) {
    crate::wizard::cascade::load_states(wizard.cascade_mut(), directory).await;
    let path = [
        (CascadeLevel::State, LocationOption::new("33", "Tamil Nadu")),
        (CascadeLevel::District, LocationOption::new("3301", "Madurai")),
        (CascadeLevel::Taluk, LocationOption::new("330101", "Melur")),
        (
            CascadeLevel::Village,
            LocationOption::new("33010101", "Kottampatti"),
        ),
    ];
    for (level, option) in path {
        if let Some(fetch) = wizard.select_location(level, option) {
            let result = directory.children(fetch.level, &fetch.parent_id).await;
            wizard.apply_location_fetch(&fetch, result);
        }
    }
}

struct Transcript {
    lines: Vec<String>,
}

impl Transcript {
    fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }
}

fn write_documents(dir: &Path) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir)?;
    let photo = dir.join("photo.jpg");
    let id_proof = dir.join("id_proof.pdf");
    std::fs::write(&photo, b"\xFF\xD8\xFF\xE0smoke")?;
    std::fs::write(&id_proof, b"%PDF-1.4 smoke")?;
    Ok((photo, id_proof))
}

async fn investor_run(t: &mut Transcript, work_dir: &Path) -> Result<()> {
    let directory = SampleDirectory::new();
    let processor = ScriptedProcessor::new(
        &["failed"],
        vec![PaymentOutcome::Failed {
            reason: "Payment link cancelled".to_string(),
        }],
    );
    let backend = ScriptedBackend::with_fee(500.0);
    let sessions = SessionContext::new(&work_dir.join("session"));
    let defaults = CheckoutDefaults {
        currency: "INR".to_string(),
        description: "Cooperative registration fee".to_string(),
    };

    t.push("");
    t.push("=== A: investor with registration fee ===");
    let mut w = Wizard::new(RegistrationRole::Investor);
    t.push(format!("next_on_empty_form={}", w.next()));

    select_sample_location(&mut w, &directory).await;
    t.push(format!(
        "cascade state={} district={} taluk={} village={}",
        w.form().value(fields::STATE).unwrap_or("-"),
        w.form().value(fields::DISTRICT).unwrap_or("-"),
        w.form().value(fields::TALUK).unwrap_or("-"),
        w.form().value(fields::VILLAGE).unwrap_or("-"),
    ));
    fill_tab(&mut w, WizardTab::Personal);
    t.push(format!("personal_complete next={} tab={:?}", w.next(), w.tab()));

    let (photo, id_proof) = write_documents(&work_dir.join("documents"))?;
    fill_tab(&mut w, WizardTab::Documents);
    w.set_field(fields::PHOTO, photo.to_string_lossy().to_string());
    w.set_field(fields::ID_PROOF, id_proof.to_string_lossy().to_string());
    t.push(format!("documents_complete next={} tab={:?}", w.next(), w.tab()));

    fill_tab(&mut w, WizardTab::Bank);
    let advanced = w.next();
    let flags = *w.verification();
    t.push(format!(
        "bank_filled ifsc_verified={} account_verified={} next_before_validation={}",
        flags.ifsc_verified, flags.account_verified, advanced
    ));

    let details = w.bank_details();
    match verification::validate_bank_account(&processor, w.verification(), &details).await {
        Ok(_) => t.push("bank_validation_1 unexpected success"),
        Err(e) => t.push(format!(
            "bank_validation_1 failed stage={} alert=\"{}\" orphaned_contact={:?}",
            e.stage,
            e.user_message(),
            e.orphaned.contact_id
        )),
    }
    let receipt = verification::validate_bank_account(&processor, w.verification(), &details)
        .await
        .context("second bank validation should succeed")?;
    t.push(format!(
        "bank_validation_2 ok fund_account={} advanced={} tab={:?}",
        receipt.fund_account_id,
        w.mark_account_validated(&receipt),
        w.tab()
    ));

    fill_tab(&mut w, WizardTab::Details);
    t.push(format!("can_submit={}", w.can_submit()));

    let reg = submission::submit_registration(
        &backend,
        w.role(),
        w.form(),
        w.cascade(),
        &defaults,
    )
    .await
    .context("registration should succeed")?;
    t.push(format!(
        "registered user_id={} land_details={:?}",
        reg.result.user_id, reg.land_details
    ));

    let NextStep::Checkout(order) = &reg.next else {
        anyhow::bail!("expected a checkout for a non-zero fee");
    };
    t.push(format!("checkout amount={}", order.display_amount()));

    let handle = processor.open_checkout(order).await?;
    let outcome = submission::settle_checkout(&processor, &sessions, &reg, &handle).await?;
    t.push(format!(
        "payment_1 outcome={:?} session_persisted={}",
        outcome,
        sessions.current().await.is_some()
    ));

    let handle = processor.open_checkout(order).await?;
    let outcome = submission::settle_checkout(&processor, &sessions, &reg, &handle).await?;
    let session = sessions.current().await;
    t.push(format!(
        "payment_2 outcome={:?} session_user={}",
        outcome,
        session.as_ref().map(|s| s.user_id.as_str()).unwrap_or("-")
    ));
    sessions.teardown().await?;
    Ok(())
}

async fn provider_run(t: &mut Transcript, work_dir: &Path) -> Result<()> {
    let directory = SampleDirectory::new();
    let processor = ScriptedProcessor::approving();
    let backend = ScriptedBackend::with_fee(0.0);
    let sessions = SessionContext::new(&work_dir.join("session"));
    let defaults = CheckoutDefaults {
        currency: "INR".to_string(),
        description: "Cooperative registration fee".to_string(),
    };

    t.push("");
    t.push("=== B: service provider, zero fee ===");
    let mut w = Wizard::new(RegistrationRole::ServiceProvider);
    select_sample_location(&mut w, &directory).await;

    // Changing the state drops everything below it
    w.select_location(CascadeLevel::State, LocationOption::new("32", "Kerala"));
    t.push(format!(
        "reselect_state district={:?} taluk={:?} village={:?}",
        w.form().get(fields::DISTRICT),
        w.form().get(fields::TALUK),
        w.form().get(fields::VILLAGE)
    ));
    select_sample_location(&mut w, &directory).await;

    let (photo, id_proof) = write_documents(&work_dir.join("documents"))?;
    fill_tab(&mut w, WizardTab::Personal);
    w.next();
    fill_tab(&mut w, WizardTab::Documents);
    w.set_field(fields::PHOTO, photo.to_string_lossy().to_string());
    w.set_field(fields::ID_PROOF, id_proof.to_string_lossy().to_string());
    w.next();
    fill_tab(&mut w, WizardTab::Bank);
    let details = w.bank_details();
    let receipt = verification::validate_bank_account(&processor, w.verification(), &details)
        .await
        .context("bank validation should succeed")?;
    w.mark_account_validated(&receipt);
    fill_tab(&mut w, WizardTab::Details);

    let reg = submission::submit_registration(
        &backend,
        w.role(),
        w.form(),
        w.cascade(),
        &defaults,
    )
    .await?;
    t.push(format!(
        "registered user_id={} next={:?} land_details={:?}",
        reg.result.user_id, reg.next, reg.land_details
    ));
    submission::finish_registration(&sessions, &reg).await?;
    t.push(format!(
        "session_persisted role={}",
        sessions
            .current()
            .await
            .map(|s| s.user_role)
            .unwrap_or_default()
    ));
    sessions.teardown().await?;
    Ok(())
}

/// Run both scenarios and write the transcript. Returns the transcript path.
pub async fn submit_smoke(log_dir: &Path) -> Result<PathBuf> {
    let transcript_path = log_dir.join(TRANSCRIPT_FILE_NAME);
    let work_dir = log_dir.join("submit_smoke");
    let mut t = Transcript { lines: Vec::new() };
    t.push("SUBMIT_SMOKE begin");
    t.push(format!("run_id={}", uuid::Uuid::new_v4()));
    t.push(format!("log_dir={}", log_dir.display()));

    let result = async {
        investor_run(&mut t, &work_dir).await?;
        provider_run(&mut t, &work_dir).await
    }
    .await;

    match &result {
        Ok(()) => t.push("SUBMIT_SMOKE ok"),
        Err(e) => t.push(format!("SUBMIT_SMOKE failed error=\"{:#}\"", e)),
    }
    let _ = std::fs::remove_dir_all(&work_dir);

    std::fs::write(&transcript_path, t.lines.join("\n") + "\n")
        .with_context(|| format!("Failed to write transcript {:?}", transcript_path))?;
    info!(
        "[PHASE: smoke] [STEP: submit] Transcript written to {:?}",
        transcript_path
    );
    result.map(|_| transcript_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transcript_covers_both_roles() {
        let tmp = tempfile::tempdir().unwrap();
        let path = submit_smoke(tmp.path()).await.unwrap();
        let body = std::fs::read_to_string(path).unwrap();
        assert!(body.contains("next_on_empty_form=false"));
        assert!(body.contains("bank_validation_1 failed stage=validate_fund_account"));
        assert!(body.contains("checkout amount=INR 500.00"));
        assert!(body.contains("payment_1 outcome=Failed"));
        assert!(body.contains("session_persisted=false"));
        assert!(body.contains("session_user=1001"));
        assert!(body.contains("reselect_state district=None taluk=None village=None"));
        assert!(body.contains("session_persisted role=service_provider"));
        assert!(body.trim_end().ends_with("SUBMIT_SMOKE ok"));
        assert!(!tmp.path().join("submit_smoke").exists());
    }

    #[tokio::test]
    async fn sample_directory_has_no_children_for_unknown_parent() {
        let d = SampleDirectory::new();
        let list = d.children(CascadeLevel::Taluk, "9999").await.unwrap();
        assert!(list.is_empty());
    }
}
