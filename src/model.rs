use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Original columns of one input row, in file order.
pub type Metadata = IndexMap<String, String>;

/// One row of the upload that carries a usable business number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputEntry {
    pub id: Uuid,
    /// Digits only, at least nine of them.
    pub identifier: String,
    /// Label used when the registry has no name for the entity.
    pub display_name: String,
    pub metadata: Metadata,
}

impl InputEntry {
    pub fn new(identifier: String, display_name: String, metadata: Metadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            identifier,
            display_name,
            metadata,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    Active,
    Cancelled,
}

impl RegistrationStatus {
    /// The registry marks live entities with exactly `Active`.
    pub fn from_registry(status: Option<&str>) -> Self {
        match status {
            Some("Active") => Self::Active,
            _ => Self::Cancelled,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Cancelled => "Cancelled",
        }
    }
}

/// Reconciled output for one [`InputEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRecord {
    pub id: Uuid,
    pub business_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_number: Option<String>,

    pub legal_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_trading_name: Option<String>,
    pub other_trading_names: Vec<String>,

    pub registration_status: RegistrationStatus,
    pub status_effective_date: NaiveDate,

    pub entity_type_name: String,
    pub entity_type_code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_last_updated: Option<NaiveDate>,

    pub tax_registered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_registration_date: Option<NaiveDate>,
    pub gift_recipient_status: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gift_recipient_since: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charity_categories: Option<Vec<String>>,

    pub metadata: Metadata,
}

impl EnrichedRecord {
    /// Record for an entry the registry could not confirm.
    pub fn placeholder(entry: &InputEntry, today: NaiveDate) -> Self {
        Self {
            id: entry.id,
            business_number: entry.identifier.clone(),
            company_number: None,
            legal_name: entry.display_name.clone(),
            primary_trading_name: None,
            other_trading_names: Vec::new(),
            registration_status: RegistrationStatus::Cancelled,
            status_effective_date: today,
            entity_type_name: String::new(),
            entity_type_code: String::new(),
            state: None,
            postcode: None,
            address_last_updated: None,
            tax_registered: false,
            tax_registration_date: None,
            gift_recipient_status: false,
            gift_recipient_since: None,
            charity_categories: None,
            metadata: entry.metadata.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.registration_status == RegistrationStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_is_case_sensitive() {
        assert_eq!(
            RegistrationStatus::from_registry(Some("Active")),
            RegistrationStatus::Active
        );
        assert_eq!(
            RegistrationStatus::from_registry(Some("active")),
            RegistrationStatus::Cancelled
        );
        assert_eq!(
            RegistrationStatus::from_registry(None),
            RegistrationStatus::Cancelled
        );
    }

    #[test]
    fn record_serializes_in_camel_case() {
        let mut metadata = Metadata::new();
        metadata.insert("ABN".into(), "51824753556".into());
        let entry = InputEntry::new("51824753556".into(), "Acme".into(), metadata);
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let json = serde_json::to_value(EnrichedRecord::placeholder(&entry, today)).unwrap();

        assert_eq!(json["businessNumber"], "51824753556");
        assert_eq!(json["registrationStatus"], "Cancelled");
        assert_eq!(json["statusEffectiveDate"], "2024-03-01");
        assert_eq!(json["metadata"]["ABN"], "51824753556");
        assert!(json.get("charityCategories").is_none());
    }
}
