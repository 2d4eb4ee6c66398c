use crate::model::EnrichedRecord;
use crate::VerifyResult;
use csv_async::AsyncWriterBuilder;
use indexmap::IndexSet;
use tokio::io::AsyncWrite;

/// Columns appended after the original ones, in this order.
pub const VERIFICATION_COLUMNS: &[&str] = &[
    "Verified ABN",
    "ACN",
    "ABN Status",
    "Status From",
    "Legal Name",
    "Trading Name",
    "Other Trading Names",
    "Entity Type",
    "Entity Type Code",
    "State",
    "Postcode",
    "Address Updated",
    "GST Registered",
    "GST From",
    "DGR Endorsed",
    "DGR From",
    "Charity Types",
];

fn yes_no(flag: bool) -> String {
    let text = if flag { "Yes" } else { "No" };
    text.to_string()
}

fn date<T: ToString>(value: Option<T>) -> String {
    value.map(|d| d.to_string()).unwrap_or_default()
}

fn verification_cells(record: &EnrichedRecord) -> Vec<String> {
    vec![
        record.business_number.clone(),
        record.company_number.clone().unwrap_or_default(),
        record.registration_status.as_str().to_string(),
        record.status_effective_date.to_string(),
        record.legal_name.clone(),
        record.primary_trading_name.clone().unwrap_or_default(),
        record.other_trading_names.join("; "),
        record.entity_type_name.clone(),
        record.entity_type_code.clone(),
        record.state.clone().unwrap_or_default(),
        record.postcode.clone().unwrap_or_default(),
        date(record.address_last_updated),
        yes_no(record.tax_registered),
        date(record.tax_registration_date),
        yes_no(record.gift_recipient_status),
        date(record.gift_recipient_since),
        record
            .charity_categories
            .as_ref()
            .map(|c| c.join("; "))
            .unwrap_or_default(),
    ]
}

/// Write records as CSV: every original column, then [`VERIFICATION_COLUMNS`].
///
/// Original columns are the union of every record's metadata keys in
/// first-seen order. Values are looked up by key, so a record without one of
/// the columns gets an empty cell.
pub async fn write_export<W>(writer: W, records: &[EnrichedRecord]) -> VerifyResult<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut wtr = AsyncWriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .create_writer(writer);

    let original: IndexSet<&str> = records
        .iter()
        .flat_map(|r| r.metadata.keys().map(String::as_str))
        .collect();

    let header = original
        .iter()
        .copied()
        .chain(VERIFICATION_COLUMNS.iter().copied());
    wtr.write_record(header).await?;

    for record in records {
        let row: Vec<String> = original
            .iter()
            .map(|key| record.metadata.get(*key).cloned().unwrap_or_default())
            .chain(verification_cells(record))
            .collect();
        wtr.write_record(&row).await?;
    }
    wtr.flush().await?;
    Ok(())
}
