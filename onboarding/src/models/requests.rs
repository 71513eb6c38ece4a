// API request models

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationRole {
    Investor,
    ServiceProvider,
}

impl RegistrationRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Investor => "investor",
            Self::ServiceProvider => "service_provider",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Investor => "Investor",
            Self::ServiceProvider => "Service Provider",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "investor" => Some(Self::Investor),
            "service_provider" | "serviceprovider" | "provider" => Some(Self::ServiceProvider),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandLocation {
    pub state: String,
    pub district: String,
    pub taluk: String,
    pub village: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandDetailsRequest {
    pub user_id: String,
    pub survey_number: String,
    pub land_area: f64,
    pub land_type: String,
    pub investment_amount: f64,
    pub location: LandLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankInfoUpdateRequest {
    pub bank_name: String,
    pub account_holder_name: String,
    pub account_number: String,
    pub ifsc_code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parse_accepts_common_spellings() {
        assert_eq!(
            RegistrationRole::parse("Service-Provider"),
            Some(RegistrationRole::ServiceProvider)
        );
        assert_eq!(
            RegistrationRole::parse("investor"),
            Some(RegistrationRole::Investor)
        );
        assert_eq!(RegistrationRole::parse("admin"), None);
    }

    #[test]
    fn land_details_request_uses_camel_case() {
        let req = LandDetailsRequest {
            user_id: "42".to_string(),
            survey_number: "112/3A".to_string(),
            land_area: 2.5,
            land_type: "wetland".to_string(),
            investment_amount: 150000.0,
            location: LandLocation {
                state: "1".to_string(),
                district: "5".to_string(),
                taluk: "51".to_string(),
                village: "512".to_string(),
            },
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["userId"], "42");
        assert_eq!(v["surveyNumber"], "112/3A");
        assert_eq!(v["location"]["taluk"], "51");
    }
}
