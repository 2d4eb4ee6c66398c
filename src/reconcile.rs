//! Mapping of normalized registry answers onto [`EnrichedRecord`].

use crate::model::{EnrichedRecord, InputEntry, RegistrationStatus};
use crate::registry::{DateRange, RegistryRecord};
use chrono::NaiveDate;

/// The registry's "no end date" marker for registration periods.
pub const NEVER_DATE: &str = "0001-01-01";

/// Source of "today" for status defaults and period checks.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Parse the date part of a registry timestamp (`2000-07-01` or `2000-07-01T00:00:00`).
pub fn parse_registry_date(value: &str) -> Option<NaiveDate> {
    let date = value.trim().get(..10)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Whether a registration period is in effect on `today`, and since when.
///
/// A missing, sentinel or unreadable end date means the period is open. An
/// end date strictly before `today` means it has lapsed; the start date is
/// still reported.
pub fn period_status(range: Option<&DateRange>, today: NaiveDate) -> (bool, Option<NaiveDate>) {
    let Some(range) = range else {
        return (false, None);
    };
    let since = range.effective_from.as_deref().and_then(parse_registry_date);
    let active = match range.effective_to.as_deref() {
        None => true,
        Some(to) if to.trim().starts_with(NEVER_DATE) => true,
        Some(to) => parse_registry_date(to).map_or(true, |end| end >= today),
    };
    (active, since)
}

/// Union of business and trading names: first-seen order, no blanks, no repeats.
pub fn merge_names(business: &[String], trading: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for name in business.iter().chain(trading) {
        if name.trim().is_empty() || merged.contains(name) {
            continue;
        }
        merged.push(name.clone());
    }
    merged
}

/// Build the output record for `entry` from its lookup result.
///
/// A missing result, or one without a business number, yields a Cancelled
/// placeholder labelled with the entry's display name.
pub fn reconcile(
    entry: &InputEntry,
    found: Option<&RegistryRecord>,
    today: NaiveDate,
) -> EnrichedRecord {
    let Some(found) = found.filter(|r| !r.abn.trim().is_empty()) else {
        return EnrichedRecord::placeholder(entry, today);
    };

    let mut names = merge_names(&found.business_names, &found.trading_names).into_iter();
    let primary_trading_name = names.next();
    let other_trading_names: Vec<String> = names.collect();

    let (tax_registered, tax_registration_date) = period_status(found.gst.as_ref(), today);
    let (gift_recipient_status, gift_recipient_since) = period_status(found.dgr.as_ref(), today);

    EnrichedRecord {
        id: entry.id,
        business_number: found.abn.clone(),
        company_number: found.acn.clone(),
        legal_name: found
            .entity_name
            .clone()
            .unwrap_or_else(|| entry.display_name.clone()),
        primary_trading_name,
        other_trading_names,
        registration_status: RegistrationStatus::from_registry(found.abn_status.as_deref()),
        status_effective_date: found
            .abn_status_effective_from
            .as_deref()
            .and_then(parse_registry_date)
            .unwrap_or(today),
        entity_type_name: found.entity_type_name.clone().unwrap_or_default(),
        entity_type_code: found.entity_type_code.clone().unwrap_or_default(),
        state: found.address_state.clone(),
        postcode: found.address_postcode.clone(),
        address_last_updated: found.address_date.as_deref().and_then(parse_registry_date),
        tax_registered,
        tax_registration_date,
        gift_recipient_status,
        gift_recipient_since,
        charity_categories: found.charity_types.clone(),
        metadata: entry.metadata.clone(),
    }
}
