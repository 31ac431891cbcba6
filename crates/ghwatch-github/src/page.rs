//! Paginated list envelopes: `{"total_count": N, "<field>": [...]}`.

use ghwatch_core::{FetchError, Listing};
use serde::de::DeserializeOwned;

/// One decoded page. `raw_len` counts records before malformed ones were
/// dropped, so pagination does not stop early on a bad record.
#[derive(Debug)]
pub struct Page<T> {
    /// Absent when the envelope carries no usable `total_count`.
    pub total_count: Option<u64>,
    pub raw_len: usize,
    pub items: Vec<T>,
    /// Ids of records that failed to decode.
    pub skipped: Vec<u64>,
}

/// Decode a list page, keeping every record that parses on its own.
pub fn decode_page<T: DeserializeOwned>(
    body: &str,
    field: &str,
    url: &str,
) -> Result<Page<T>, FetchError> {
    let decode_err = |source| FetchError::Decode {
        url: url.to_string(),
        source,
    };
    let mut envelope: serde_json::Value = serde_json::from_str(body).map_err(decode_err)?;

    let total_count = envelope.get("total_count").and_then(|v| v.as_u64());
    let records = match envelope.get_mut(field).map(serde_json::Value::take) {
        Some(serde_json::Value::Array(records)) => records,
        _ => {
            return Err(decode_err(<serde_json::Error as serde::de::Error>::custom(
                format!("missing `{field}` array"),
            )))
        }
    };

    let raw_len = records.len();
    let mut items = Vec::with_capacity(raw_len);
    let mut skipped = Vec::new();
    for record in records {
        let id = record.get("id").and_then(|v| v.as_u64());
        match serde_json::from_value::<T>(record) {
            Ok(item) => items.push(item),
            Err(e) => {
                tracing::warn!(url, field, id, error = %e, "skipping malformed record");
                skipped.extend(id);
            }
        }
    }

    Ok(Page {
        total_count,
        raw_len,
        items,
        skipped,
    })
}

/// Fetch pages starting at 1 until a short page, or until `total_count`
/// records were seen when the server reports one.
pub fn collect_pages<T, F>(per_page: u32, mut fetch_page: F) -> Result<Listing<T>, FetchError>
where
    F: FnMut(u32) -> Result<Page<T>, FetchError>,
{
    let mut page_no = 1u32;
    let mut seen = 0u64;
    let mut all = Listing::default();

    loop {
        let page = fetch_page(page_no)?;
        seen += page.raw_len as u64;
        all.items.extend(page.items);
        all.skipped.extend(page.skipped);

        let short = page.raw_len < per_page as usize;
        let exhausted = page.total_count.is_some_and(|total| seen >= total);
        if short || exhausted {
            break;
        }
        page_no += 1;
    }
    Ok(all)
}
