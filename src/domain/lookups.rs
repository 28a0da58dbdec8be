//! Code → label tables for the contractor-selection API payloads.
//!
//! Unknown codes are passed through unchanged so no value is ever lost.

/// Static code/label table
#[derive(Debug, Clone, Copy)]
pub struct LookupTable {
    pub name: &'static str,
    entries: &'static [(&'static str, &'static str)],
}

impl LookupTable {
    pub fn label(&self, code: &str) -> Option<&'static str> {
        let code = code.trim();
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(code))
            .map(|(_, label)| *label)
    }

    /// Label for `code`, or the code itself when the table has no entry
    pub fn translate(&self, code: &str) -> String {
        self.label(code).map_or_else(|| code.trim().to_string(), str::to_string)
    }
}

pub const BID_FORM: LookupTable = LookupTable {
    name: "bid_form",
    entries: &[
        ("DTRR", "Đấu thầu rộng rãi"),
        ("DTHC", "Đấu thầu hạn chế"),
        ("CHCT", "Chào hàng cạnh tranh"),
        ("CHCTRG", "Chào hàng cạnh tranh rút gọn"),
        ("CDT", "Chỉ định thầu"),
        ("CDTRG", "Chỉ định thầu rút gọn"),
        ("MSTT", "Mua sắm trực tiếp"),
        ("TTH", "Tự thực hiện"),
        ("DPCT", "Đàm phán giá"),
        ("LCNT_DB", "Lựa chọn nhà thầu trong trường hợp đặc biệt"),
    ],
};

pub const BID_MODE: LookupTable = LookupTable {
    name: "bid_mode",
    entries: &[
        ("1_MTHS", "Một giai đoạn một túi hồ sơ"),
        ("1_HTHS", "Một giai đoạn hai túi hồ sơ"),
        ("2_MTHS", "Hai giai đoạn một túi hồ sơ"),
        ("2_HTHS", "Hai giai đoạn hai túi hồ sơ"),
    ],
};

pub const INVEST_FIELD: LookupTable = LookupTable {
    name: "invest_field",
    entries: &[
        ("HH", "Hàng hóa"),
        ("XL", "Xây lắp"),
        ("TV", "Tư vấn"),
        ("PTV", "Phi tư vấn"),
        ("HON_HOP", "Hỗn hợp"),
    ],
};

pub const CONTRACT_TYPE: LookupTable = LookupTable {
    name: "contract_type",
    entries: &[
        ("TG", "Trọn gói"),
        ("DGCD", "Đơn giá cố định"),
        ("DGDC", "Đơn giá điều chỉnh"),
        ("TTG", "Theo thời gian"),
        ("HH", "Hỗn hợp"),
    ],
};

pub const DOMESTIC: LookupTable = LookupTable {
    name: "is_domestic",
    entries: &[("1", "Trong nước"), ("true", "Trong nước"), ("0", "Quốc tế"), ("false", "Quốc tế")],
};

pub const ONLINE: LookupTable = LookupTable {
    name: "is_internet",
    entries: &[
        ("1", "Qua mạng"),
        ("true", "Qua mạng"),
        ("0", "Không qua mạng"),
        ("false", "Không qua mạng"),
    ],
};

pub const PERIOD_UNIT: LookupTable = LookupTable {
    name: "period_unit",
    entries: &[("D", "ngày"), ("W", "tuần"), ("M", "tháng"), ("Q", "quý"), ("Y", "năm")],
};
