// Tab gate
//
// Pure functions of (role, form, verification). A step is valid when every required field is
// present; the bank step also needs a successful remote validation. Format checks are not part
// of gating and run at submit time instead.

use super::form::{fields, RegistrationForm};
use super::verification::VerificationStatus;
use crate::models::requests::RegistrationRole;

pub const STEP_COUNT: usize = 4;
pub const LAST_STEP: usize = STEP_COUNT - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardTab {
    Personal,
    Documents,
    Bank,
    Details,
}

impl WizardTab {
    pub const ALL: [WizardTab; STEP_COUNT] = [
        WizardTab::Personal,
        WizardTab::Documents,
        WizardTab::Bank,
        WizardTab::Details,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        match self {
            Self::Personal => 0,
            Self::Documents => 1,
            Self::Bank => 2,
            Self::Details => 3,
        }
    }

    pub fn title(self, role: RegistrationRole) -> &'static str {
        match (self, role) {
            (Self::Personal, _) => "Personal Details",
            (Self::Documents, _) => "Identity Documents",
            (Self::Bank, _) => "Bank Details",
            (Self::Details, RegistrationRole::Investor) => "Land Details",
            (Self::Details, RegistrationRole::ServiceProvider) => "Service Details",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "personal" => Some(Self::Personal),
            "documents" | "docs" => Some(Self::Documents),
            "bank" => Some(Self::Bank),
            "details" | "land" | "service" => Some(Self::Details),
            _ => None,
        }
    }
}

const PERSONAL_REQUIRED: &[&str] = &[
    fields::NAME,
    fields::MOBILE,
    fields::ADDRESS,
    fields::STATE,
    fields::DISTRICT,
    fields::TALUK,
    fields::VILLAGE,
    fields::PINCODE,
    fields::GENDER,
    fields::DOB,
];

const DOCUMENTS_REQUIRED: &[&str] = &[
    fields::AADHAAR_NUMBER,
    fields::PAN_NUMBER,
    fields::PHOTO,
    fields::ID_PROOF,
];

const BANK_REQUIRED: &[&str] = &[
    fields::BANK_NAME,
    fields::ACCOUNT_HOLDER_NAME,
    fields::ACCOUNT_NUMBER,
    fields::IFSC_CODE,
];

const INVESTOR_DETAILS_REQUIRED: &[&str] = &[
    fields::SURVEY_NUMBER,
    fields::LAND_AREA,
    fields::LAND_TYPE,
    fields::INVESTMENT_AMOUNT,
];

const PROVIDER_DETAILS_REQUIRED: &[&str] = &[
    fields::SERVICE_CATEGORY,
    fields::EXPERIENCE_YEARS,
    fields::SERVICE_AREA,
];

pub fn required_fields(role: RegistrationRole, tab: WizardTab) -> &'static [&'static str] {
    match tab {
        WizardTab::Personal => PERSONAL_REQUIRED,
        WizardTab::Documents => DOCUMENTS_REQUIRED,
        WizardTab::Bank => BANK_REQUIRED,
        WizardTab::Details => match role {
            RegistrationRole::Investor => INVESTOR_DETAILS_REQUIRED,
            RegistrationRole::ServiceProvider => PROVIDER_DETAILS_REQUIRED,
        },
    }
}

/// Required fields of `tab` that are still empty.
pub fn missing_fields(
    role: RegistrationRole,
    form: &RegistrationForm,
    tab: WizardTab,
) -> Vec<&'static str> {
    required_fields(role, tab)
        .iter()
        .copied()
        .filter(|f| !form.is_filled(f))
        .collect()
}

pub fn is_step_valid(
    role: RegistrationRole,
    form: &RegistrationForm,
    verification: &VerificationStatus,
    step: usize,
) -> bool {
    let Some(tab) = WizardTab::from_index(step) else {
        return false;
    };
    if !missing_fields(role, form, tab).is_empty() {
        return false;
    }
    match tab {
        WizardTab::Bank => verification.account_validated,
        _ => true,
    }
}

/// `target` is reachable when every step before it is valid.
pub fn can_reach(
    role: RegistrationRole,
    form: &RegistrationForm,
    verification: &VerificationStatus,
    target: usize,
) -> bool {
    if target >= STEP_COUNT {
        return false;
    }
    (0..target).all(|i| is_step_valid(role, form, verification, i))
}
