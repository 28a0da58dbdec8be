//! Typed records of the contractor-selection join pipeline.
//!
//! Phase 1 yields `NoticeSummary`, phase 2 `NoticeDetail` (flat row plus
//! `JoinKeys`), phase 3 `LotRow`, phase 4 `ContractorResultRow` and
//! `GoodsLineRow`. Every record renders itself into a flat `Row`.

use serde_json::Value;

use super::formatting::{format_date_value, value_text};
use super::record::Row;

/// Output column names shared by all artifacts
pub mod columns {
    pub const NOTIFY_NO: &str = "Số TBMT";
    pub const BID_NAME: &str = "Tên gói thầu";
    pub const INVESTOR: &str = "Chủ đầu tư";
    pub const PUBLIC_DATE: &str = "Ngày đăng tải";
    pub const STATUS: &str = "Trạng thái";
    pub const NOTIFY_ID: &str = "notifyId";
    pub const BID_ID: &str = "bidId";
    pub const INPUT_RESULT_ID: &str = "inputResultId";

    pub const LOT_NO: &str = "Mã phần/lô";
    pub const LOT_NAME: &str = "Tên phần/lô";
    pub const LOT_PRICE: &str = "Giá phần/lô";
    pub const BIDDER_COUNT: &str = "Số nhà thầu tham dự";
    pub const BIDDERS: &str = "Nhà thầu tham dự";
    pub const LOWEST_BID: &str = "Giá dự thầu thấp nhất";

    pub const CONTRACTOR_CODE: &str = "Mã nhà thầu";
    pub const CONTRACTOR_NAME: &str = "Tên nhà thầu";
    pub const BID_PRICE: &str = "Giá dự thầu";
    pub const WINNING_PRICE: &str = "Giá trúng thầu";
    pub const UNIT_PRICE: &str = "Đơn giá trúng thầu";
    pub const OUTCOME: &str = "Kết quả";
    pub const GOODS_REFS: &str = "Hàng hóa liên kết";

    pub const LINE_INDEX: &str = "STT hàng hóa";
    pub const GOODS_NAME: &str = "Tên hàng hóa";
    pub const GOODS_UNIT: &str = "Đơn vị tính";
    pub const QUANTITY: &str = "Khối lượng";
    pub const ORIGIN: &str = "Xuất xứ";
}

/// Keys discovered in phases 1–2 and consumed by phases 3–4
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinKeys {
    pub notify_no: String,
    pub notify_id: Option<String>,
    pub bid_id: Option<String>,
    pub input_result_id: Option<String>,
}

impl JoinKeys {
    /// Rebuilds a bundle from a persisted primary row
    pub fn from_row(row: &Row) -> Option<Self> {
        let get = |column: &str| {
            row.get(column)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Some(Self {
            notify_no: get(columns::NOTIFY_NO)?,
            notify_id: get(columns::NOTIFY_ID),
            bid_id: get(columns::BID_ID),
            input_result_id: get(columns::INPUT_RESULT_ID),
        })
    }

    pub fn write_into(&self, row: &mut Row) {
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();
        row.insert(columns::NOTIFY_ID.into(), opt(&self.notify_id));
        row.insert(columns::BID_ID.into(), opt(&self.bid_id));
        row.insert(columns::INPUT_RESULT_ID.into(), opt(&self.input_result_id));
    }
}

/// Non-empty trimmed text of `value[key]`
pub fn json_text(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .map(value_text)
        .filter(|s| !s.is_empty())
}

/// First non-empty `json_text` among `keys`, in order
pub fn json_text_any(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| json_text(value, key))
}

/// One entry of the catalog scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeSummary {
    pub notify_no: String,
    pub notify_id: Option<String>,
    pub input_result_id: Option<String>,
    pub bid_name: String,
    pub investor_name: String,
    pub public_date: String,
    pub status: String,
}

impl NoticeSummary {
    /// `None` when the entry carries no notice number
    pub fn from_json(entry: &Value) -> Option<Self> {
        let notify_no = json_text(entry, "notifyNo")?;
        let bid_name = json_text(entry, "bidName")
            .or_else(|| entry.get("bidName").and_then(Value::as_array).and_then(|a| a.first()).map(value_text))
            .unwrap_or_default();
        Some(Self {
            notify_no,
            notify_id: json_text(entry, "id").or_else(|| json_text(entry, "notifyId")),
            input_result_id: json_text(entry, "inputResultId"),
            bid_name,
            investor_name: json_text(entry, "investorName")
                .or_else(|| json_text(entry, "procuringEntityName"))
                .unwrap_or_default(),
            public_date: entry.get("publicDate").map(format_date_value).unwrap_or_default(),
            status: json_text(entry, "statusForNotify")
                .or_else(|| json_text(entry, "status"))
                .unwrap_or_default(),
        })
    }

    /// Join keys known from the catalog alone
    pub fn keys(&self) -> JoinKeys {
        JoinKeys {
            notify_no: self.notify_no.clone(),
            notify_id: self.notify_id.clone(),
            bid_id: None,
            input_result_id: self.input_result_id.clone(),
        }
    }
}

/// Flat primary row plus the join keys it carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeDetail {
    pub row: Row,
    pub keys: JoinKeys,
}

impl NoticeDetail {
    /// Final primary row with key columns appended
    pub fn into_row(self) -> Row {
        let mut row = self.row;
        self.keys.write_into(&mut row);
        row
    }
}

/// One lot of a notice joined with its bid-opening submissions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LotRow {
    pub notify_no: String,
    pub lot_no: String,
    pub lot_name: String,
    pub lot_price: String,
    pub bidder_count: usize,
    pub bidders: String,
    pub lowest_bid: String,
}

impl LotRow {
    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert(columns::NOTIFY_NO.into(), self.notify_no.clone());
        row.insert(columns::LOT_NO.into(), self.lot_no.clone());
        row.insert(columns::LOT_NAME.into(), self.lot_name.clone());
        row.insert(columns::LOT_PRICE.into(), self.lot_price.clone());
        row.insert(columns::BIDDER_COUNT.into(), self.bidder_count.to_string());
        row.insert(columns::BIDDERS.into(), self.bidders.clone());
        row.insert(columns::LOWEST_BID.into(), self.lowest_bid.clone());
        row
    }
}

/// Won/lost classification of a contractor entry.
///
/// The result payload has no explicit flag; a contractor counts as a winner
/// when an awarded unit price is present for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwardOutcome {
    Won,
    NotWon,
}

impl AwardOutcome {
    pub fn from_unit_price(unit_price: Option<&str>) -> Self {
        match unit_price {
            Some(price) if !price.trim().is_empty() => Self::Won,
            _ => Self::NotWon,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Won => "Trúng thầu",
            Self::NotWon => "Không trúng thầu",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractorResultRow {
    pub notify_no: String,
    pub lot_no: String,
    pub lot_name: String,
    pub contractor_code: String,
    pub contractor_name: String,
    pub bid_price: String,
    pub winning_price: String,
    pub unit_price: String,
    pub outcome: AwardOutcome,
    /// Positions (1-based) of linked goods lines, `;`-separated
    pub goods_refs: String,
}

impl ContractorResultRow {
    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert(columns::NOTIFY_NO.into(), self.notify_no.clone());
        row.insert(columns::LOT_NO.into(), self.lot_no.clone());
        row.insert(columns::LOT_NAME.into(), self.lot_name.clone());
        row.insert(columns::CONTRACTOR_CODE.into(), self.contractor_code.clone());
        row.insert(columns::CONTRACTOR_NAME.into(), self.contractor_name.clone());
        row.insert(columns::BID_PRICE.into(), self.bid_price.clone());
        row.insert(columns::WINNING_PRICE.into(), self.winning_price.clone());
        row.insert(columns::UNIT_PRICE.into(), self.unit_price.clone());
        row.insert(columns::OUTCOME.into(), self.outcome.label().into());
        row.insert(columns::GOODS_REFS.into(), self.goods_refs.clone());
        row
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoodsLineRow {
    pub notify_no: String,
    pub lot_no: String,
    /// 1-based position inside the lot's goods list
    pub line_index: usize,
    pub name: String,
    pub unit: String,
    pub quantity: String,
    pub unit_price: String,
    pub origin: String,
    pub contractor_code: String,
}

impl GoodsLineRow {
    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert(columns::NOTIFY_NO.into(), self.notify_no.clone());
        row.insert(columns::LOT_NO.into(), self.lot_no.clone());
        row.insert(columns::LINE_INDEX.into(), self.line_index.to_string());
        row.insert(columns::GOODS_NAME.into(), self.name.clone());
        row.insert(columns::GOODS_UNIT.into(), self.unit.clone());
        row.insert(columns::QUANTITY.into(), self.quantity.clone());
        row.insert(columns::UNIT_PRICE.into(), self.unit_price.clone());
        row.insert(columns::ORIGIN.into(), self.origin.clone());
        row.insert(columns::CONTRACTOR_CODE.into(), self.contractor_code.clone());
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summary_requires_a_notice_number() {
        assert!(NoticeSummary::from_json(&json!({"bidName": "x"})).is_none());

        let summary = NoticeSummary::from_json(&json!({
            "notifyNo": "IB2400012345",
            "id": "a1b2",
            "bidName": ["Mua sắm thuốc generic"],
            "investorName": "Bệnh viện Bạch Mai",
            "publicDate": "2024-03-05T08:30:00"
        }))
        .unwrap();
        assert_eq!(summary.notify_id.as_deref(), Some("a1b2"));
        assert_eq!(summary.bid_name, "Mua sắm thuốc generic");
        assert_eq!(summary.public_date, "05/03/2024 08:30");
    }

    #[test]
    fn keys_survive_a_persisted_row() {
        let keys = JoinKeys {
            notify_no: "IB1".into(),
            notify_id: Some("n-1".into()),
            bid_id: None,
            input_result_id: Some("r-9".into()),
        };
        let mut row = Row::new();
        row.insert(columns::NOTIFY_NO.into(), "IB1".into());
        keys.write_into(&mut row);

        assert_eq!(JoinKeys::from_row(&row), Some(keys));
        assert_eq!(row.get(columns::BID_ID).map(String::as_str), Some(""));
    }

    #[test]
    fn outcome_follows_unit_price_presence() {
        assert_eq!(AwardOutcome::from_unit_price(Some("12.000 VND")), AwardOutcome::Won);
        assert_eq!(AwardOutcome::from_unit_price(Some("  ")), AwardOutcome::NotWon);
        assert_eq!(AwardOutcome::from_unit_price(None).label(), "Không trúng thầu");
    }
}
