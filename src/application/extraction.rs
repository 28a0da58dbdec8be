//! HTML snapshot parsing for the registry modes
//!
//! Detail views are read with a cascade, first non-empty value per field wins:
//! 1. Row strategies in configured order (primary structural selector first)
//! 2. Raw "Label: value" lines of the page text
//!
//! Missing elements never raise; they only leave fields empty.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::domain::formatting::clean_text;
use crate::domain::record::UNKNOWN_TITLE;
use crate::domain::{CatalogItem, DetailRecord, ENTITY_NAME, HarvestError, HarvestResult};
use crate::infrastructure::config::{RegistryProfile, RowStrategy};

static LABELED_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<label>[^:]{1,80}?)\s*:\s*(?P<value>.*)$").expect("labeled line pattern")
});

fn compile(selector: &str) -> HarvestResult<Selector> {
    Selector::parse(selector)
        .map_err(|e| HarvestError::Config(format!("invalid selector '{selector}': {e}")))
}

fn compile_all(selectors: &[String]) -> HarvestResult<Vec<Selector>> {
    selectors.iter().map(|s| compile(s)).collect()
}

fn element_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

fn clean_label(raw: &str) -> String {
    clean_text(raw).trim_end_matches(':').trim().to_string()
}

struct CompiledRowStrategy {
    row: Selector,
    label: Option<Selector>,
    cells: Selector,
    value_index: usize,
}

impl CompiledRowStrategy {
    fn compile(strategy: &RowStrategy) -> HarvestResult<Self> {
        Ok(Self {
            row: compile(&strategy.row)?,
            label: strategy.label.as_deref().map(compile).transpose()?,
            cells: compile(&strategy.cells)?,
            value_index: strategy.value_index,
        })
    }

    fn pairs(&self, document: &Html) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for row in document.select(&self.row) {
            let cells: Vec<ElementRef<'_>> = row.select(&self.cells).collect();
            let label = match &self.label {
                Some(label) => row.select(label).next().map(element_text),
                None => cells.first().map(|c| element_text(*c)),
            };
            let value = cells.get(self.value_index).map(|c| element_text(*c));
            if let (Some(label), Some(value)) = (label, value) {
                let label = clean_label(&label);
                if !label.is_empty() && !value.is_empty() {
                    pairs.push((label, value));
                }
            }
        }
        pairs
    }
}

/// Reads a rendered detail view into a `DetailRecord`
pub struct DetailExtractor {
    title_selectors: Vec<Selector>,
    strategies: Vec<CompiledRowStrategy>,
    raw_container: Option<Selector>,
}

impl DetailExtractor {
    pub fn from_profile(profile: &RegistryProfile) -> HarvestResult<Self> {
        let raw_container = if profile.raw_text_container.trim().is_empty() {
            None
        } else {
            Some(compile(&profile.raw_text_container)?)
        };
        Ok(Self {
            title_selectors: compile_all(&profile.title_selectors)?,
            strategies: profile
                .row_strategies
                .iter()
                .map(CompiledRowStrategy::compile)
                .collect::<HarvestResult<_>>()?,
            raw_container,
        })
    }

    pub fn extract(&self, html: &str) -> DetailRecord {
        let document = Html::parse_document(html);
        let mut record = DetailRecord::new();
        record.insert(ENTITY_NAME, self.extract_title(&document).unwrap_or_default());

        let mut structural = 0;
        for (position, strategy) in self.strategies.iter().enumerate() {
            let mut filled = 0;
            for (label, value) in strategy.pairs(&document) {
                if record.fill(&label, &value) {
                    filled += 1;
                }
            }
            debug!("Row strategy {} filled {} fields", position + 1, filled);
            structural += filled;
        }

        if let Some(container) = &self.raw_container {
            let pairs = raw_text_pairs(&document, container);
            let mut filled = 0;
            for (label, value) in pairs {
                let wanted = structural == 0 || record.get(&label).is_some();
                if wanted && record.fill(&label, &value) {
                    filled += 1;
                }
            }
            if filled > 0 {
                debug!("Raw text split filled {} fields", filled);
            }
        }
        record
    }

    fn extract_title(&self, document: &Html) -> Option<String> {
        self.title_selectors.iter().find_map(|selector| {
            document
                .select(selector)
                .map(element_text)
                .find(|text| !text.is_empty())
        })
    }
}

/// "Label: value" pairs from the text nodes of `container`; a label whose
/// value sits in the following text node is joined with it.
fn raw_text_pairs(document: &Html, container: &Selector) -> Vec<(String, String)> {
    let Some(root) = document.select(container).next() else {
        return Vec::new();
    };
    let nodes: Vec<String> = root
        .text()
        .map(clean_text)
        .filter(|t| !t.is_empty())
        .collect();

    let mut pairs = Vec::new();
    let mut i = 0;
    while i < nodes.len() {
        if let Some(caps) = LABELED_LINE.captures(&nodes[i]) {
            let label = clean_label(&caps["label"]);
            let value = caps["value"].trim().to_string();
            if value.starts_with("//") {
                i += 1;
                continue;
            }
            if !value.is_empty() {
                pairs.push((label, value));
            } else if let Some(next) = nodes.get(i + 1).filter(|n| !LABELED_LINE.is_match(n)) {
                pairs.push((label, next.clone()));
                i += 1;
            }
        }
        i += 1;
    }
    pairs
}

/// Title ↔ well-known field recovery
#[derive(Debug, Clone)]
pub struct CrossFill {
    labels: Vec<String>,
}

impl CrossFill {
    pub fn new(labels: &[String]) -> Self {
        Self {
            labels: labels.to_vec(),
        }
    }

    /// Missing title ← first populated well-known field; then every empty
    /// well-known field ← title. A title that stays unknown is marked.
    pub fn apply(&self, record: &mut DetailRecord) {
        if record.title().is_none() {
            let recovered = self
                .labels
                .iter()
                .find_map(|label| record.get(label).filter(|v| !v.trim().is_empty()))
                .map(str::to_string);
            if let Some(title) = recovered {
                record.insert(ENTITY_NAME, title);
            }
        }

        match record.title().map(str::to_string) {
            Some(title) => {
                for label in &self.labels {
                    record.fill(label, &title);
                }
            }
            None => record.insert(ENTITY_NAME, UNKNOWN_TITLE),
        }
    }
}

/// Reads listing entries (title + list-level identifier) from a snapshot
pub struct ListingParser {
    title: Selector,
    card: Selector,
    id: Selector,
}

impl ListingParser {
    pub fn from_profile(profile: &RegistryProfile) -> HarvestResult<Self> {
        Ok(Self {
            title: compile(&profile.item_title)?,
            card: compile(&profile.item_card)?,
            id: compile(&profile.item_id)?,
        })
    }

    /// Positions follow the order of title matches, which is the order the
    /// titles are clicked in.
    pub fn parse(&self, html: &str) -> Vec<CatalogItem> {
        let document = Html::parse_document(html);
        let cards: Vec<ElementRef<'_>> = document.select(&self.card).collect();
        document
            .select(&self.title)
            .enumerate()
            .map(|(position, title)| {
                let list_id = cards
                    .get(position)
                    .and_then(|card| card.select(&self.id).next())
                    .map(element_text);
                CatalogItem::new(position, list_id, element_text(title))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> DetailExtractor {
        DetailExtractor::from_profile(&RegistryProfile::investors()).unwrap()
    }

    fn cross_fill() -> CrossFill {
        CrossFill::new(&RegistryProfile::investors().cross_fill_labels)
    }

    #[test]
    fn primary_rows_and_title() {
        let html = r#"<html><body>
            <div class="content-body__header">  CÔNG TY CỔ PHẦN ALPHA </div>
            <div class="infomation-course__content">
                <div class="infomation-course__content__title">Mã định danh:</div>
                <div>vn0101234567</div>
            </div>
            <div class="infomation-course__content">
                <div class="infomation-course__content__title">Địa chỉ</div>
                <div>Số 1
                     Tràng Tiền, Hà Nội</div>
            </div>
        </body></html>"#;

        let record = extractor().extract(html);
        assert_eq!(record.get(ENTITY_NAME), Some("CÔNG TY CỔ PHẦN ALPHA"));
        assert_eq!(record.get("Mã định danh"), Some("vn0101234567"));
        assert_eq!(record.get("Địa chỉ"), Some("Số 1 Tràng Tiền, Hà Nội"));
    }

    #[test]
    fn secondary_rows_fill_when_primary_is_absent() {
        let html = r#"<html><body>
            <h3 class="font-weight-bold">Bệnh viện Beta</h3>
            <div class="row"><div>Mã định danh</div><div>vn0200000001</div></div>
            <div class="row"><div>Số điện thoại</div><div>024 3869 3731</div></div>
        </body></html>"#;

        let record = extractor().extract(html);
        assert_eq!(record.get(ENTITY_NAME), Some("Bệnh viện Beta"));
        assert_eq!(record.get("Mã định danh"), Some("vn0200000001"));
        assert_eq!(record.get("Số điện thoại"), Some("024 3869 3731"));
    }

    #[test]
    fn earlier_strategy_wins_per_field() {
        let html = r#"<html><body>
            <div class="infomation-course__content">
                <div class="infomation-course__content__title">Địa chỉ</div><div>Huế</div>
            </div>
            <div class="row"><div>Địa chỉ</div><div>Đà Nẵng</div></div>
            <div class="row"><div>Fax</div><div>0234 382</div></div>
        </body></html>"#;

        let record = extractor().extract(html);
        assert_eq!(record.get("Địa chỉ"), Some("Huế"));
        assert_eq!(record.get("Fax"), Some("0234 382"));
    }

    #[test]
    fn raw_text_is_the_last_resort() {
        let html = r#"<html><body><section>
            <p>Tên chủ đầu tư: Ban QLDA Gamma</p>
            <p>Mã định danh:</p><p>vn0300000003</p>
            <p>Website: https://gamma.vn</p>
        </section></body></html>"#;

        let mut record = extractor().extract(html);
        assert_eq!(record.get("Tên chủ đầu tư"), Some("Ban QLDA Gamma"));
        assert_eq!(record.get("Mã định danh"), Some("vn0300000003"));
        assert_eq!(record.get("Website"), Some("https://gamma.vn"));

        cross_fill().apply(&mut record);
        assert_eq!(record.get(ENTITY_NAME), Some("Ban QLDA Gamma"));
    }

    #[test]
    fn title_is_copied_into_empty_well_known_fields() {
        let mut record = DetailRecord::new();
        record.insert(ENTITY_NAME, "Công ty Delta");
        record.insert("Tên chủ đầu tư", "");
        cross_fill().apply(&mut record);
        assert_eq!(record.get("Tên chủ đầu tư"), Some("Công ty Delta"));
    }

    #[test]
    fn unrecoverable_title_is_marked_unknown() {
        let mut record = extractor().extract("<html><body><p>Không có dữ liệu</p></body></html>");
        cross_fill().apply(&mut record);
        assert_eq!(record.get(ENTITY_NAME), Some(UNKNOWN_TITLE));
    }

    #[test]
    fn listing_pairs_titles_with_card_identifiers() {
        let html = r#"<html><body>
            <div class="content__body__item">
                <h4 class="content__body__item__heading__text">vn001</h4>
                <h2 class="content__body__item__title">Alpha</h2>
            </div>
            <div class="content__body__item">
                <h2 class="content__body__item__title">Beta</h2>
            </div>
        </body></html>"#;

        let parser = ListingParser::from_profile(&RegistryProfile::investors()).unwrap();
        let items = parser.parse(html);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].item_id().as_deref(), Some("vn001"));
        assert_eq!(items[1].list_id, None);
        assert_eq!(items[1].item_id().as_deref(), Some("Beta"));
    }

    #[test]
    fn invalid_selector_is_a_config_error() {
        let profile = RegistryProfile {
            item_title: "h2[".into(),
            ..RegistryProfile::investors()
        };
        assert!(matches!(
            ListingParser::from_profile(&profile),
            Err(HarvestError::Config(_))
        ));
    }
}
