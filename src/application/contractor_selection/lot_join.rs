//! Phase 3: lots left-joined with bid-opening submissions on lot number.

use indexmap::IndexMap;
use serde_json::{Value, json};

use crate::domain::formatting::{format_money, group_thousands, value_number};
use crate::domain::{LotRow, json_text_any};

/// Request body shared by the lot and bid-opening endpoints
pub fn bid_request(bid_id: &str) -> Value {
    json!({ "bidId": bid_id })
}

/// Entries of a list-returning endpoint: bare array, or the first array
/// found under the usual envelope keys.
pub fn list_entries(response: &Value) -> &[Value] {
    if let Some(items) = response.as_array() {
        return items;
    }
    ["content", "data", "lots", "bidOpenList", "items"]
        .iter()
        .find_map(|key| response.get(*key).and_then(Value::as_array))
        .map_or(&[][..], Vec::as_slice)
}

fn lot_no(entry: &Value) -> String {
    json_text_any(entry, &["lotNo", "lotNumber"]).unwrap_or_default()
}

#[derive(Default)]
struct Submissions {
    names: Vec<String>,
    lowest: Option<f64>,
}

/// One row per lot; lots nobody bid on keep zero bidders
pub fn join_lots(notify_no: &str, lots: &Value, openings: &Value) -> Vec<LotRow> {
    let mut by_lot: IndexMap<String, Submissions> = IndexMap::new();
    for opening in list_entries(openings) {
        let entry = by_lot.entry(lot_no(opening)).or_default();
        if let Some(name) = json_text_any(opening, &["contractorName", "orgFullname", "bidderName"]) {
            entry.names.push(name);
        }
        let price = ["bidPrice", "bidPriceAfterDiscount"]
            .iter()
            .find_map(|key| opening.get(*key).and_then(value_number));
        if let Some(price) = price {
            entry.lowest = Some(entry.lowest.map_or(price, |low| low.min(price)));
        }
    }

    list_entries(lots)
        .iter()
        .map(|lot| {
            let lot_no = lot_no(lot);
            let submissions = by_lot.get(&lot_no);
            LotRow {
                notify_no: notify_no.to_string(),
                lot_name: json_text_any(lot, &["lotName", "name"]).unwrap_or_default(),
                lot_price: lot.get("lotPrice").map(format_money).unwrap_or_default(),
                bidder_count: submissions.map_or(0, |s| s.names.len()),
                bidders: submissions.map(|s| s.names.join("; ")).unwrap_or_default(),
                lowest_bid: submissions
                    .and_then(|s| s.lowest)
                    .map(|low| format!("{} VND", group_thousands(low)))
                    .unwrap_or_default(),
                lot_no,
            }
        })
        .collect()
}
