//! ABN registry access.
//!
//! The registry answers with loosely shaped JSON: field casing drifts between
//! service versions, list fields collapse to a scalar when they hold one
//! value, and date ranges arrive as objects, one-element lists or bare dates.
//! [`RegistryRecord::from_value`] folds all of that into one fixed shape at
//! this boundary.

use crate::config::VerifyConfig;
use crate::{VerifyError, VerifyResult};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;

/// Look up a single business number.
///
/// Implementations resolve to `None` for anything that is not a usable
/// answer: unknown numbers, registry error messages, transport failures.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn lookup(&self, identifier: &str) -> Option<RegistryRecord>;
}

/// A `{from, to}` registration period; `to` is absent while still in effect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateRange {
    pub effective_from: Option<String>,
    pub effective_to: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryRecord {
    pub abn: String,
    pub abn_status: Option<String>,
    pub abn_status_effective_from: Option<String>,
    pub acn: Option<String>,
    pub entity_name: Option<String>,
    pub entity_type_name: Option<String>,
    pub entity_type_code: Option<String>,
    pub address_state: Option<String>,
    pub address_postcode: Option<String>,
    pub address_date: Option<String>,
    /// Current registered business names.
    pub business_names: Vec<String>,
    /// Trading names, including historical ones.
    pub trading_names: Vec<String>,
    pub gst: Option<DateRange>,
    pub dgr: Option<DateRange>,
    pub charity_types: Option<Vec<String>>,
}

fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| {
        obj.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
            .filter(|value| !value.is_null())
    })
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text(obj: &Map<String, Value>, names: &[&str]) -> Option<String> {
    field(obj, names).and_then(scalar)
}

/// Strings of a value that may be a single string or a list; other entries are dropped.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// First object of a value that may be an object or a list of objects.
fn first_object(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Object(obj) => Some(obj),
        Value::Array(items) => items.first().and_then(Value::as_object),
        _ => None,
    }
}

fn date_range(value: Option<&Value>) -> Option<DateRange> {
    let value = value?;
    if let Some(from) = scalar(value) {
        return Some(DateRange {
            effective_from: Some(from),
            effective_to: None,
        });
    }
    let obj = first_object(value)?;
    Some(DateRange {
        effective_from: text(obj, &["effectiveFrom", "endorsedFrom"]),
        effective_to: text(obj, &["effectiveTo", "endorsedTo"]),
    })
}

fn charity_types(value: Option<&Value>) -> Option<Vec<String>> {
    let items = match value? {
        Value::Array(items) => items.iter().collect::<Vec<_>>(),
        other => vec![other],
    };
    let categories: Vec<String> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(obj) => text(
                obj,
                &["charityTypeDescription", "charityTypeName", "description", "type"],
            ),
            other => scalar(other),
        })
        .collect();
    (!categories.is_empty()).then_some(categories)
}

impl RegistryRecord {
    /// Normalize a raw registry payload.
    ///
    /// Returns `None` when the payload is not an object or carries a registry
    /// error message.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if let Some(message) = text(obj, &["Message", "exception"]) {
            log::debug!("registry message: {message}");
            return None;
        }

        Some(Self {
            abn: text(obj, &["Abn", "identifierValue"]).unwrap_or_default(),
            abn_status: text(obj, &["AbnStatus", "entityStatusCode"]),
            abn_status_effective_from: text(
                obj,
                &["AbnStatusEffectiveFrom", "statusEffectiveFrom"],
            ),
            acn: text(obj, &["Acn", "asicNumber"]),
            entity_name: text(obj, &["EntityName", "organisationName"]),
            entity_type_name: text(obj, &["EntityTypeName", "entityDescription"]),
            entity_type_code: text(obj, &["EntityTypeCode", "entityTypeCode"]),
            address_state: text(obj, &["AddressState", "stateCode"]),
            address_postcode: text(obj, &["AddressPostcode", "postcode"]),
            address_date: text(obj, &["AddressDate", "addressEffectiveFrom"]),
            business_names: string_list(field(obj, &["BusinessName", "businessNames"])),
            trading_names: string_list(field(
                obj,
                &["TradingName", "tradingNames", "otherTradingName"],
            )),
            gst: date_range(field(obj, &["Gst", "goodsAndServicesTax"])),
            dgr: date_range(field(obj, &["Dgr", "dgrEndorsement"])),
            charity_types: charity_types(field(obj, &["CharityTypes", "charityType"])),
        })
    }
}

/// Remove a JSONP `callback(...)` wrapper if the registry added one.
pub fn strip_jsonp(body: &str) -> &str {
    let body = body.trim();
    if body.starts_with('{') || body.starts_with('[') {
        return body;
    }
    match (body.find('('), body.rfind(')')) {
        (Some(open), Some(close)) if open < close => body[open + 1..close].trim(),
        _ => body,
    }
}

/// HTTP client for the ABR JSON lookup service.
pub struct AbrClient {
    client: reqwest::Client,
    endpoint: String,
    guid: String,
}

impl AbrClient {
    /// Fails when no registry GUID is configured.
    pub fn from_config(config: &VerifyConfig) -> VerifyResult<Self> {
        let guid = config
            .guid
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .ok_or(VerifyError::MissingCredential)?
            .to_string();
        let client = reqwest::Client::builder()
            .timeout(config.lookup_timeout)
            .connect_timeout(config.lookup_timeout.min(Duration::from_secs(10)))
            .user_agent(concat!("abn-verify/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            guid,
        })
    }

    async fn fetch(&self, identifier: &str) -> Result<Value, String> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("abn", identifier), ("guid", self.guid.as_str())])
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }
        let body = response.text().await.map_err(|e| e.to_string())?;
        serde_json::from_str(strip_jsonp(&body)).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl Registry for AbrClient {
    async fn lookup(&self, identifier: &str) -> Option<RegistryRecord> {
        match self.fetch(identifier).await {
            Ok(value) => RegistryRecord::from_value(&value),
            Err(err) => {
                log::debug!("lookup {identifier} failed: {err}");
                None
            }
        }
    }
}
