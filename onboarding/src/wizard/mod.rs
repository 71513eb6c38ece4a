//! Registration wizard controller.
//!
//! Four tabs (personal, documents, bank, role details), a linear gate between them, the
//! location cascade feeding the personal tab, and bank verification gating the bank tab.
//! The controller owns only transient view state; it is dropped after a successful submit.

pub mod cascade;
pub mod form;
pub mod gate;
pub mod submission;
pub mod verification;

use crate::models::requests::RegistrationRole;
use crate::models::responses::LocationOption;
use cascade::{CascadeLevel, LocationCascade, PendingFetch};
use form::{fields, RegistrationForm};
use gate::{WizardTab, LAST_STEP};
use log::{debug, info, warn};
use verification::{BankDetails, BankValidationReceipt, VerificationStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct Wizard {
    role: RegistrationRole,
    form: RegistrationForm,
    cascade: LocationCascade,
    verification: VerificationStatus,
    step: usize,
}

impl Wizard {
    pub fn new(role: RegistrationRole) -> Self {
        Self {
            role,
            form: RegistrationForm::new(),
            cascade: LocationCascade::new(),
            verification: VerificationStatus::default(),
            step: 0,
        }
    }

    pub fn role(&self) -> RegistrationRole {
        self.role
    }

    pub fn form(&self) -> &RegistrationForm {
        &self.form
    }

    pub fn cascade(&self) -> &LocationCascade {
        &self.cascade
    }

    pub fn cascade_mut(&mut self) -> &mut LocationCascade {
        &mut self.cascade
    }

    pub fn verification(&self) -> &VerificationStatus {
        &self.verification
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn tab(&self) -> WizardTab {
        WizardTab::from_index(self.step).unwrap_or(WizardTab::Personal)
    }

    pub fn is_last_step(&self) -> bool {
        self.step == LAST_STEP
    }

    /// Update a text field. Bank fields keep the verification flags in sync; location
    /// fields are owned by the cascade and must go through `select_location`.
    pub fn set_field(&mut self, field: &str, value: impl Into<String>) {
        if let Some(level) = CascadeLevel::for_field(field) {
            warn!(
                "[PHASE: wizard] [STEP: form] Ignoring direct write to {}; use select_location",
                level.as_str()
            );
            return;
        }
        let value = value.into();
        match field {
            fields::IFSC_CODE => {
                let normalized = value.trim().to_ascii_uppercase();
                self.verification.on_ifsc_changed(&normalized);
                self.form.set(field, normalized);
                return;
            }
            fields::ACCOUNT_NUMBER => self.verification.on_account_number_changed(value.trim()),
            fields::BANK_NAME | fields::ACCOUNT_HOLDER_NAME => {
                self.verification.on_bank_field_changed()
            }
            _ => {}
        }
        self.form.set(field, value);
    }

    /// Select a location at `level`. Descendant selections are cleared from both the
    /// cascade and the form. Returns the child fetch to issue, if any.
    pub fn select_location(
        &mut self,
        level: CascadeLevel,
        option: LocationOption,
    ) -> Option<PendingFetch> {
        let fetch = self.cascade.select(level, option);
        self.cascade.write_into(&mut self.form);
        fetch
    }

    /// Apply a child list fetched for `fetch`. Stale results are dropped.
    pub fn apply_location_fetch(
        &mut self,
        fetch: &PendingFetch,
        result: crate::error::ClientResult<Vec<LocationOption>>,
    ) -> bool {
        self.cascade.apply_fetch(fetch, result)
    }

    pub fn is_step_valid(&self, step: usize) -> bool {
        gate::is_step_valid(self.role, &self.form, &self.verification, step)
    }

    pub fn can_reach(&self, target: usize) -> bool {
        gate::can_reach(self.role, &self.form, &self.verification, target)
    }

    pub fn can_go_next(&self) -> bool {
        self.step < LAST_STEP && self.can_reach(self.step + 1)
    }

    /// Ready to submit: every tab including the last is valid.
    pub fn can_submit(&self) -> bool {
        self.is_last_step() && (0..=LAST_STEP).all(|i| self.is_step_valid(i))
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        gate::missing_fields(self.role, &self.form, self.tab())
    }

    /// Forward one tab. A no-op when the current tab is incomplete.
    pub fn next(&mut self) -> bool {
        if !self.can_go_next() {
            debug!(
                "[PHASE: wizard] [STEP: navigate] Next blocked on tab {} (missing: {:?})",
                self.step,
                self.missing_fields()
            );
            return false;
        }
        self.step += 1;
        info!("[PHASE: wizard] [STEP: navigate] Advanced to tab {}", self.step);
        true
    }

    /// Back one tab. Always allowed.
    pub fn previous(&mut self) {
        self.step = self.step.saturating_sub(1);
    }

    /// Jump to `target` when every tab before it is valid.
    pub fn go_to(&mut self, target: usize) -> bool {
        if target > LAST_STEP {
            return false;
        }
        if target <= self.step || self.can_reach(target) {
            self.step = target;
            return true;
        }
        false
    }

    /// Bank fields as the verification chain needs them.
    pub fn bank_details(&self) -> BankDetails {
        let v = |f: &str| self.form.value(f).unwrap_or_default().to_string();
        BankDetails {
            account_holder_name: v(fields::ACCOUNT_HOLDER_NAME),
            account_number: v(fields::ACCOUNT_NUMBER),
            ifsc_code: v(fields::IFSC_CODE),
            contact_name: v(fields::NAME),
            contact_mobile: self.form.value(fields::MOBILE).map(str::to_string),
            contact_email: self.form.value(fields::EMAIL).map(str::to_string),
            reference_id: v(fields::MOBILE),
        }
    }

    /// Record a successful bank validation and move past the bank tab. A receipt for
    /// details that were edited while the chain ran is ignored.
    pub fn mark_account_validated(&mut self, receipt: &BankValidationReceipt) -> bool {
        if receipt.details != self.bank_details() {
            warn!(
                "[PHASE: wizard] [STEP: bank_validation] Discarding validation {}; bank details changed",
                receipt.validation_id
            );
            return false;
        }
        info!(
            "[PHASE: wizard] [STEP: bank_validation] Fund account {} validated",
            receipt.fund_account_id
        );
        self.verification.account_validated = true;
        if self.tab() == WizardTab::Bank {
            return self.next();
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::cascade::tests::StubDirectory;
    use super::submission::tests::complete_form;
    use super::verification::tests::StubGateway;
    use super::*;

    fn opt(id: &str, name: &str) -> LocationOption {
        LocationOption::new(id, name)
    }

    fn fill_from(w: &mut Wizard, form: &RegistrationForm, tab: WizardTab) {
        for f in gate::required_fields(w.role(), tab) {
            let Some(v) = form.get(f) else { continue };
            match CascadeLevel::for_field(f) {
                Some(level) => {
                    w.select_location(level, opt(v, v));
                }
                None => w.set_field(f, v.to_string()),
            }
        }
    }

    fn wizard_on_bank_tab(tmp: &std::path::Path) -> Wizard {
        let source = complete_form(RegistrationRole::Investor, tmp);
        let mut w = Wizard::new(RegistrationRole::Investor);
        fill_from(&mut w, &source, WizardTab::Personal);
        assert!(w.next());
        fill_from(&mut w, &source, WizardTab::Documents);
        assert!(w.next());
        fill_from(&mut w, &source, WizardTab::Bank);
        w
    }

    #[test]
    fn next_is_noop_on_incomplete_tab_and_back_always_works() {
        let mut w = Wizard::new(RegistrationRole::Investor);
        assert!(!w.next());
        assert_eq!(w.step(), 0);
        w.previous();
        assert_eq!(w.step(), 0);
    }

    #[tokio::test]
    async fn cascade_scenario_drives_form_fields() {
        let dir = StubDirectory::tamil_nadu();
        let mut w = Wizard::new(RegistrationRole::Investor);

        let fetch = w
            .select_location(CascadeLevel::State, opt("1", "Tamil Nadu"))
            .unwrap();
        let result =
            cascade::LocationDirectory::children(&dir, fetch.level, &fetch.parent_id).await;
        w.apply_location_fetch(&fetch, result);
        assert_eq!(w.cascade().options(CascadeLevel::District).len(), 2);

        let fetch = w
            .select_location(CascadeLevel::District, opt("5", "Madurai"))
            .unwrap();
        let result =
            cascade::LocationDirectory::children(&dir, fetch.level, &fetch.parent_id).await;
        w.apply_location_fetch(&fetch, result);
        assert_eq!(w.form().value(fields::DISTRICT), Some("5"));
        assert_eq!(w.cascade().options(CascadeLevel::Taluk).len(), 1);

        w.select_location(CascadeLevel::State, opt("2", "Kerala"));
        assert_eq!(w.form().get(fields::DISTRICT), None);
        assert_eq!(w.form().get(fields::TALUK), None);
        assert!(w.cascade().options(CascadeLevel::District).is_empty());
        assert!(w.cascade().options(CascadeLevel::Taluk).is_empty());
    }

    #[tokio::test]
    async fn bank_validation_advances_only_on_created_status() {
        let tmp = tempfile::tempdir().unwrap();
        let mut w = wizard_on_bank_tab(tmp.path());
        assert!(w.verification().ready_for_validation());
        assert!(!w.next(), "bank tab must wait for validation");

        let mut gw = StubGateway::ok();
        gw.validation_status = "failed".to_string();
        let details = w.bank_details();
        let r = verification::validate_bank_account(&gw, w.verification(), &details).await;
        assert!(r.is_err());
        assert!(!w.verification().account_validated);
        assert_eq!(w.tab(), WizardTab::Bank);

        let gw = StubGateway::ok();
        let details = w.bank_details();
        let receipt = verification::validate_bank_account(&gw, w.verification(), &details)
            .await
            .unwrap();
        assert!(w.mark_account_validated(&receipt));
        assert_eq!(w.tab(), WizardTab::Details);

        // Editing the account afterwards closes the gate again
        w.set_field(fields::ACCOUNT_NUMBER, "987654321");
        assert!(!w.can_reach(3));
    }

    #[tokio::test]
    async fn validation_for_edited_account_is_discarded() {
        let tmp = tempfile::tempdir().unwrap();
        let mut w = wizard_on_bank_tab(tmp.path());
        let details = w.bank_details();
        let gw = StubGateway::ok();
        let receipt = verification::validate_bank_account(&gw, w.verification(), &details)
            .await
            .unwrap();

        // The account number changes while the chain is in flight
        let edited = format!("{}9", details.account_number);
        w.set_field(fields::ACCOUNT_NUMBER, edited.clone());

        assert!(!w.mark_account_validated(&receipt));
        assert!(!w.verification().account_validated);
        assert_eq!(w.tab(), WizardTab::Bank);
        assert_eq!(w.form().value(fields::ACCOUNT_NUMBER), Some(edited.as_str()));
        assert!(!w.can_reach(3));
    }

    #[test]
    fn location_fields_only_change_through_the_cascade() {
        let mut w = Wizard::new(RegistrationRole::Investor);
        w.select_location(CascadeLevel::State, opt("1", "Tamil Nadu"));
        w.select_location(CascadeLevel::District, opt("5", "Madurai"));

        w.set_field(fields::STATE, "2");
        assert_eq!(w.form().value(fields::STATE), Some("1"));
        assert_eq!(w.form().value(fields::DISTRICT), Some("5"));

        w.set_field(fields::VILLAGE, "512");
        assert_eq!(w.form().get(fields::VILLAGE), None);
    }

    #[test]
    fn go_to_respects_gate_but_allows_going_back() {
        let tmp = tempfile::tempdir().unwrap();
        let source = complete_form(RegistrationRole::ServiceProvider, tmp.path());
        let mut w = Wizard::new(RegistrationRole::ServiceProvider);
        assert!(!w.go_to(2));
        fill_from(&mut w, &source, WizardTab::Personal);
        fill_from(&mut w, &source, WizardTab::Documents);
        assert!(w.go_to(2));
        assert!(!w.go_to(3));
        assert!(w.go_to(0));
        assert!(!w.go_to(9));
    }

    #[test]
    fn ifsc_is_normalized_to_uppercase() {
        let mut w = Wizard::new(RegistrationRole::Investor);
        w.set_field(fields::IFSC_CODE, " hdfc0001234 ");
        assert_eq!(w.form().value(fields::IFSC_CODE), Some("HDFC0001234"));
        assert!(w.verification().ifsc_verified);
    }
}
