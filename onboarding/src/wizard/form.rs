// Registration form state
//
// A flat field-name -> value map. A field that was never set and a field explicitly cleared
// are both "null"; blank strings count as empty for gating.

use crate::utils::logging::mask_field_value;
use std::collections::BTreeMap;

pub mod fields {
    // Personal
    pub const NAME: &str = "name";
    pub const MOBILE: &str = "mobile";
    pub const EMAIL: &str = "email";
    pub const ADDRESS: &str = "address";
    pub const STATE: &str = "state";
    pub const DISTRICT: &str = "district";
    pub const TALUK: &str = "taluk";
    pub const VILLAGE: &str = "village";
    pub const PINCODE: &str = "pincode";
    pub const GENDER: &str = "gender";
    pub const DOB: &str = "dob";

    // Documents
    pub const AADHAAR_NUMBER: &str = "aadhaar_number";
    pub const PAN_NUMBER: &str = "pan_number";
    pub const PHOTO: &str = "photo";
    pub const ID_PROOF: &str = "id_proof";

    // Bank
    pub const BANK_NAME: &str = "bank_name";
    pub const ACCOUNT_HOLDER_NAME: &str = "account_holder_name";
    pub const ACCOUNT_NUMBER: &str = "account_number";
    pub const IFSC_CODE: &str = "ifsc_code";

    // Investor land details
    pub const SURVEY_NUMBER: &str = "survey_number";
    pub const LAND_AREA: &str = "land_area";
    pub const LAND_TYPE: &str = "land_type";
    pub const INVESTMENT_AMOUNT: &str = "investment_amount";

    // Service provider details
    pub const SERVICE_CATEGORY: &str = "service_category";
    pub const EXPERIENCE_YEARS: &str = "experience_years";
    pub const SERVICE_AREA: &str = "service_area";

    /// Fields whose values are local file paths uploaded as multipart file parts.
    pub const DOCUMENT_FIELDS: &[&str] = &[PHOTO, ID_PROOF];
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrationForm {
    values: BTreeMap<String, Option<String>>,
}

impl RegistrationForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        self.values.insert(field.to_string(), Some(value.into()));
    }

    pub fn clear(&mut self, field: &str) {
        self.values.insert(field.to_string(), None);
    }

    /// Raw value, including blank strings.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).and_then(|v| v.as_deref())
    }

    /// Trimmed value, `None` when missing or blank.
    pub fn value(&self, field: &str) -> Option<&str> {
        self.get(field).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn is_filled(&self, field: &str) -> bool {
        self.value(field).is_some()
    }

    /// Filled fields in name order.
    pub fn filled(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().filter_map(|(k, v)| {
            v.as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (k.as_str(), v))
        })
    }

    /// Log-safe rendering of the form.
    pub fn masked_summary(&self) -> String {
        self.filled()
            .map(|(k, v)| format!("{}={}", k, mask_field_value(k, v)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::fields::*;
    use super::*;

    #[test]
    fn blank_values_count_as_empty() {
        let mut form = RegistrationForm::new();
        form.set(NAME, "   ");
        assert!(!form.is_filled(NAME));
        assert_eq!(form.get(NAME), Some("   "));
        form.set(NAME, " Ravi ");
        assert_eq!(form.value(NAME), Some("Ravi"));
    }

    #[test]
    fn cleared_field_reads_as_null() {
        let mut form = RegistrationForm::new();
        form.set(DISTRICT, "5");
        form.clear(DISTRICT);
        assert_eq!(form.get(DISTRICT), None);
    }

    #[test]
    fn masked_summary_hides_bank_account() {
        let mut form = RegistrationForm::new();
        form.set(NAME, "Ravi");
        form.set(ACCOUNT_NUMBER, "123456789012");
        let summary = form.masked_summary();
        assert!(summary.contains("name=Ravi"));
        assert!(!summary.contains("123456789012"));
    }
}
