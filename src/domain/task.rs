//! Run inputs: harvest mode, the task queue and the optional date window.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HarvestMode {
    /// Approved-investor registry, browsed through the UI
    Investors,
    /// Declared drug price registry, browsed through the UI
    DrugPrices,
    /// Contractor-selection notices, harvested through the JSON APIs
    ContractorSelection,
}

impl HarvestMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Investors => "investors",
            Self::DrugPrices => "drug-prices",
            Self::ContractorSelection => "contractor-selection",
        }
    }

    /// Modes whose details are read from rendered pages
    pub fn is_registry(self) -> bool {
        !matches!(self, Self::ContractorSelection)
    }
}

impl fmt::Display for HarvestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HarvestMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "investors" => Ok(Self::Investors),
            "drug-prices" => Ok(Self::DrugPrices),
            "contractor-selection" => Ok(Self::ContractorSelection),
            other => Err(format!("unknown harvest mode '{other}'")),
        }
    }
}

/// One (scope filter, keyword) pair of the task queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineTask {
    pub scope: Option<String>,
    pub keyword: String,
}

impl PipelineTask {
    pub fn new(scope: Option<String>, keyword: impl Into<String>) -> Self {
        Self {
            scope: scope.filter(|s| !s.trim().is_empty()),
            keyword: keyword.into().trim().to_string(),
        }
    }

    /// Cartesian product of scopes and keywords, scope-major.
    /// An empty side contributes a single "no filter" entry.
    pub fn expand(scopes: &[String], keywords: &[String]) -> Vec<Self> {
        let scopes: Vec<Option<String>> = if scopes.is_empty() {
            vec![None]
        } else {
            scopes.iter().cloned().map(Some).collect()
        };
        let keywords: Vec<String> = if keywords.is_empty() {
            vec![String::new()]
        } else {
            keywords.to_vec()
        };

        scopes
            .iter()
            .flat_map(|scope| {
                keywords
                    .iter()
                    .map(move |keyword| Self::new(scope.clone(), keyword.clone()))
            })
            .collect()
    }
}

impl fmt::Display for PipelineTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = if self.keyword.is_empty() { "*" } else { &self.keyword };
        match &self.scope {
            Some(scope) => write!(f, "[{scope}] {keyword}"),
            None => write!(f, "{keyword}"),
        }
    }
}

/// Inclusive publication-date window applied to every task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    pub fn is_valid(&self) -> bool {
        match (self.from, self.to) {
            (Some(from), Some(to)) => from <= to,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expansion_is_scope_major() {
        let tasks = PipelineTask::expand(
            &["BYT".to_string(), "BGD".to_string()],
            &["thuốc".to_string(), "vắc xin".to_string()],
        );
        let rendered: Vec<String> = tasks.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec!["[BYT] thuốc", "[BYT] vắc xin", "[BGD] thuốc", "[BGD] vắc xin"]
        );
    }

    #[test]
    fn empty_inputs_yield_one_unfiltered_task() {
        let tasks = PipelineTask::expand(&[], &[]);
        assert_eq!(tasks, vec![PipelineTask::default()]);
    }

    #[test]
    fn mode_parsing_accepts_both_separators() {
        assert_eq!("drug_prices".parse::<HarvestMode>(), Ok(HarvestMode::DrugPrices));
        assert_eq!(
            "Contractor-Selection".parse::<HarvestMode>(),
            Ok(HarvestMode::ContractorSelection)
        );
        assert!("tenders".parse::<HarvestMode>().is_err());
    }

    #[test]
    fn reversed_date_range_is_invalid() {
        let range = DateRange {
            from: NaiveDate::from_ymd_opt(2024, 5, 1),
            to: NaiveDate::from_ymd_opt(2024, 1, 1),
        };
        assert!(!range.is_valid());
    }
}
