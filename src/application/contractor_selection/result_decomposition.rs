//! Phase 4: contractor results with their JSON-in-string lists.
//!
//! Each lot result carries `contractorList` and `goodsList`, usually as JSON
//! encoded into a string. Contractors point at goods lines through a
//! 0-based `goodsIndex` array.

use serde_json::{Value, json};
use tracing::debug;

use super::lot_join::list_entries;
use crate::domain::formatting::{format_money, value_number, value_text};
use crate::domain::{AwardOutcome, ContractorResultRow, GoodsLineRow, json_text_any};

/// Envelope keys holding the per-lot results
const LOT_RESULT_KEYS: &[&str] = &["lotResultDTO", "lotResults", "bideContractorInputResultDTOs"];

pub fn result_request(input_result_id: &str) -> Value {
    json!({ "id": input_result_id })
}

#[derive(Debug, Default, PartialEq)]
pub struct Decomposed {
    pub contractors: Vec<ContractorResultRow>,
    pub goods: Vec<GoodsLineRow>,
}

impl Decomposed {
    pub fn is_empty(&self) -> bool {
        self.contractors.is_empty() && self.goods.is_empty()
    }
}

/// Array field that may arrive as a real array or as JSON text.
/// Unparseable text counts as empty.
pub fn embedded_list(entry: &Value, key: &str) -> Vec<Value> {
    match entry.get(key) {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(text)) if !text.trim().is_empty() => {
            match serde_json::from_str::<Value>(text) {
                Ok(Value::Array(items)) => items,
                Ok(other) => list_entries(&other).to_vec(),
                Err(e) => {
                    debug!("{} is not valid JSON: {}", key, e);
                    Vec::new()
                }
            }
        }
        _ => Vec::new(),
    }
}

fn lot_results(response: &Value) -> Vec<&Value> {
    if let Some(items) = response.as_array() {
        return items.iter().collect();
    }
    if let Some(items) = LOT_RESULT_KEYS
        .iter()
        .find_map(|key| response.get(*key).and_then(Value::as_array))
    {
        return items.iter().collect();
    }
    if response.get("contractorList").is_some() || response.get("goodsList").is_some() {
        return vec![response];
    }
    list_entries(response).iter().collect()
}

fn goods_indexes(contractor: &Value) -> Vec<usize> {
    contractor
        .get("goodsIndex")
        .and_then(Value::as_array)
        .map(|indexes| {
            indexes
                .iter()
                .filter_map(value_number)
                .filter(|n| *n >= 0.0)
                .map(|n| {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let index = n as usize;
                    index
                })
                .collect()
        })
        .unwrap_or_default()
}

fn price_text(entry: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| entry.get(*key))
        .map(format_money)
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

pub fn decompose(notify_no: &str, response: &Value) -> Decomposed {
    let mut out = Decomposed::default();

    for lot in lot_results(response) {
        let lot_no = json_text_any(lot, &["lotNo", "lotNumber"]).unwrap_or_default();
        let lot_name = json_text_any(lot, &["lotName", "name"]).unwrap_or_default();
        let contractors = embedded_list(lot, "contractorList");
        let goods = embedded_list(lot, "goodsList");

        let mut goods_rows: Vec<GoodsLineRow> = goods
            .iter()
            .enumerate()
            .map(|(i, line)| GoodsLineRow {
                notify_no: notify_no.to_string(),
                lot_no: lot_no.clone(),
                line_index: i + 1,
                name: json_text_any(line, &["goodsName", "name"]).unwrap_or_default(),
                unit: json_text_any(line, &["uom", "unit"]).unwrap_or_default(),
                quantity: line.get("qty").or_else(|| line.get("quantity")).map(value_text).unwrap_or_default(),
                unit_price: price_text(line, &["unitPrice", "bidUnitPrice"]),
                origin: json_text_any(line, &["origin", "manufacturer"]).unwrap_or_default(),
                contractor_code: json_text_any(line, &["orgCode", "contractorCode"]).unwrap_or_default(),
            })
            .collect();

        for contractor in &contractors {
            let code = json_text_any(contractor, &["orgCode", "contractorCode"]).unwrap_or_default();
            let linked: Vec<usize> = goods_indexes(contractor)
                .into_iter()
                .filter(|i| *i < goods_rows.len())
                .collect();
            for i in &linked {
                if goods_rows[*i].contractor_code.is_empty() {
                    goods_rows[*i].contractor_code.clone_from(&code);
                }
            }

            let unit_price = price_text(contractor, &["unitPrice", "bidUnitPrice"]);
            let effective_unit_price = if unit_price.is_empty() {
                linked
                    .first()
                    .map(|i| goods_rows[*i].unit_price.clone())
                    .unwrap_or_default()
            } else {
                unit_price.clone()
            };

            out.contractors.push(ContractorResultRow {
                notify_no: notify_no.to_string(),
                lot_no: lot_no.clone(),
                lot_name: lot_name.clone(),
                contractor_name: json_text_any(contractor, &["orgFullname", "contractorName", "orgName"])
                    .unwrap_or_default(),
                bid_price: price_text(contractor, &["bidPrice", "bidPriceAfterDiscount"]),
                winning_price: price_text(contractor, &["bidWiningPrice", "winningPrice", "lotFinalPrice"]),
                unit_price,
                outcome: AwardOutcome::from_unit_price(Some(&effective_unit_price)),
                goods_refs: linked
                    .iter()
                    .map(|i| (i + 1).to_string())
                    .collect::<Vec<_>>()
                    .join(";"),
                contractor_code: code,
            });
        }
        out.goods.append(&mut goods_rows);
    }
    out
}
