//! Phase 2: notice detail payload → flat primary row.

use serde_json::{Value, json};

use crate::domain::formatting::{format_date_value, format_money, format_period, value_text};
use crate::domain::lookups::{
    BID_FORM, BID_MODE, CONTRACT_TYPE, DOMESTIC, INVEST_FIELD, LookupTable, ONLINE,
};
use crate::domain::notice::columns;
use crate::domain::{JoinKeys, NoticeDetail, NoticeSummary, Row, json_text, json_text_any};

/// Wrapper objects the detail endpoint has been seen to nest the notice in
const NOTICE_WRAPPERS: &[&str] = &["bidoNotifyContractorViewDTO", "bidNotification", "notify"];

#[derive(Clone, Copy)]
enum Render {
    Text,
    Lookup(LookupTable),
    Money,
    Date,
}

/// Output label, source keys in preference order, rendering
const FIELDS: &[(&str, &[&str], Render)] = &[
    (columns::BID_NAME, &["bidName"], Render::Text),
    (columns::INVESTOR, &["investorName", "procuringEntityName"], Render::Text),
    (columns::PUBLIC_DATE, &["publicDate"], Render::Date),
    (columns::STATUS, &["statusForNotify", "status"], Render::Text),
    ("Hình thức lựa chọn nhà thầu", &["bidForm"], Render::Lookup(BID_FORM)),
    ("Phương thức lựa chọn nhà thầu", &["bidMode"], Render::Lookup(BID_MODE)),
    ("Lĩnh vực", &["investField"], Render::Lookup(INVEST_FIELD)),
    ("Loại hợp đồng", &["contractType"], Render::Lookup(CONTRACT_TYPE)),
    ("Trong nước/Quốc tế", &["isDomestic"], Render::Lookup(DOMESTIC)),
    ("Hình thức dự thầu", &["isInternet"], Render::Lookup(ONLINE)),
    ("Giá gói thầu", &["bidPrice"], Render::Money),
    ("Dự toán gói thầu", &["bidEstimatePrice"], Render::Money),
    ("Nguồn vốn", &["capitalDetail", "capitalSource"], Render::Text),
    ("Tên dự án", &["projectName", "planName"], Render::Text),
    ("Địa điểm thực hiện", &["locations", "bidLocation"], Render::Text),
    ("Thời điểm đóng thầu", &["bidCloseDate"], Render::Date),
    ("Thời điểm mở thầu", &["bidOpenDate"], Render::Date),
    ("Bảo đảm dự thầu", &["guaranteeValue"], Render::Money),
];

/// Request body of the detail endpoint
pub fn detail_request(notify_id: &str) -> Value {
    json!({ "id": notify_id })
}

fn notice_object(response: &Value) -> &Value {
    NOTICE_WRAPPERS
        .iter()
        .find_map(|key| response.get(*key).filter(|v| v.is_object()))
        .unwrap_or(response)
}

fn render(value: &Value, how: Render) -> String {
    match how {
        Render::Text => value_text(value),
        Render::Lookup(table) => table.translate(&value_text(value)),
        Render::Money => format_money(value),
        Render::Date => format_date_value(value),
    }
}

/// Flattens a detail response, falling back to the summary for fields the
/// detail leaves empty.
pub fn map_detail(summary: &NoticeSummary, response: &Value) -> NoticeDetail {
    let notice = notice_object(response);
    let mut row = Row::new();
    row.insert(columns::NOTIFY_NO.into(), summary.notify_no.clone());

    for (label, keys, how) in FIELDS {
        let value = keys
            .iter()
            .filter_map(|key| notice.get(*key))
            .map(|v| render(v, *how))
            .find(|text| !text.is_empty())
            .unwrap_or_default();
        row.insert((*label).to_string(), value);
    }

    let period = format_period(
        notice.get("contractPeriod").unwrap_or(&Value::Null),
        notice.get("contractPeriodUnit").unwrap_or(&Value::Null),
    );
    row.insert("Thời gian thực hiện hợp đồng".into(), period);

    for (column, fallback) in [
        (columns::BID_NAME, &summary.bid_name),
        (columns::INVESTOR, &summary.investor_name),
        (columns::PUBLIC_DATE, &summary.public_date),
        (columns::STATUS, &summary.status),
    ] {
        if let Some(cell) = row.get_mut(column) {
            if cell.is_empty() {
                cell.clone_from(fallback);
            }
        }
    }

    let keys = JoinKeys {
        notify_no: summary.notify_no.clone(),
        notify_id: summary.notify_id.clone(),
        bid_id: bid_id(notice, response),
        input_result_id: summary
            .input_result_id
            .clone()
            .or_else(|| json_text(notice, "inputResultId")),
    };
    NoticeDetail { row, keys }
}

/// `bidId` on the notice, else on the response root, else the id of the
/// embedded bid package
fn bid_id(notice: &Value, response: &Value) -> Option<String> {
    json_text(notice, "bidId")
        .or_else(|| json_text(response, "bidId"))
        .or_else(|| notice.get("bidPo").and_then(|po| json_text_any(po, &["id", "bidId"])))
}
