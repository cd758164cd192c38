//! Financial metric normalization (§4.H).

use crate::ids::{DealId, DocumentId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    IncomeStatement,
    BalanceSheet,
    CashFlow,
    Ratio,
}

impl MetricCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IncomeStatement => "income_statement",
            Self::BalanceSheet => "balance_sheet",
            Self::CashFlow => "cash_flow",
            Self::Ratio => "ratio",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Annual,
    Quarterly,
    Monthly,
    Ytd,
}

/// A normalized financial metric extracted from a spreadsheet document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialMetric {
    pub id: uuid::Uuid,
    pub deal_id: DealId,
    pub document_id: DocumentId,
    pub name: String,
    pub category: MetricCategory,
    pub value: Decimal,
    pub period_type: Option<PeriodType>,
    /// False when the source cell carries a projection marker (`…E`,
    /// `…F`, `…P`, or the word "Forecast").
    pub is_actual: bool,
}

/// Raw phrase → (normalized name, category), subset per §4.H (English + German).
const NORMALIZATION_TABLE: &[(&str, &str, MetricCategory)] = &[
    ("revenue", "revenue", MetricCategory::IncomeStatement),
    ("sales", "revenue", MetricCategory::IncomeStatement),
    ("net sales", "revenue", MetricCategory::IncomeStatement),
    ("umsatz", "revenue", MetricCategory::IncomeStatement),
    ("erlöse", "revenue", MetricCategory::IncomeStatement),
    ("ebitda", "ebitda", MetricCategory::IncomeStatement),
    ("operating profit", "ebitda", MetricCategory::IncomeStatement),
    ("betriebsergebnis", "ebitda", MetricCategory::IncomeStatement),
    ("gross profit", "gross_profit", MetricCategory::IncomeStatement),
    ("bruttogewinn", "gross_profit", MetricCategory::IncomeStatement),
    ("net income", "net_income", MetricCategory::IncomeStatement),
    ("net profit", "net_income", MetricCategory::IncomeStatement),
    (
        "jahresüberschuss",
        "net_income",
        MetricCategory::IncomeStatement,
    ),
    ("total assets", "total_assets", MetricCategory::BalanceSheet),
    ("bilanzsumme", "total_assets", MetricCategory::BalanceSheet),
    ("equity", "equity", MetricCategory::BalanceSheet),
    ("eigenkapital", "equity", MetricCategory::BalanceSheet),
    (
        "operating cash flow",
        "operating_cash_flow",
        MetricCategory::CashFlow,
    ),
    (
        "operativer cashflow",
        "operating_cash_flow",
        MetricCategory::CashFlow,
    ),
    ("free cash flow", "free_cash_flow", MetricCategory::CashFlow),
    ("fcf", "free_cash_flow", MetricCategory::CashFlow),
    ("gross margin", "gross_margin", MetricCategory::Ratio),
    ("bruttomarge", "gross_margin", MetricCategory::Ratio),
    ("debt to equity", "debt_to_equity", MetricCategory::Ratio),
];

/// Projection markers that flip `is_actual` to false (§4.H).
const PROJECTION_MARKERS: &[&str] = &["…e", "…f", "…p", "forecast"];

/// Minimum detection confidence (keyword coverage + numeric-ratio boost +
/// formula boost) for a document to be treated as financial (§4.H).
pub const DETECTION_CONFIDENCE_THRESHOLD: u32 = 30;

/// Normalize a raw phrase against the lookup table, falling back to
/// snake-casing and keyword-based category guessing (§4.H).
pub fn normalize_metric_name(raw: &str) -> (String, MetricCategory) {
    let lower = raw.trim().to_lowercase();
    for (phrase, normalized, category) in NORMALIZATION_TABLE {
        if lower == *phrase {
            return (normalized.to_string(), *category);
        }
    }
    let snake = snake_case(&lower);
    (snake, guess_category(&lower))
}

fn snake_case(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn guess_category(lower: &str) -> MetricCategory {
    if ["margin", "ratio", "multiple", "rate"]
        .iter()
        .any(|k| lower.contains(k))
    {
        MetricCategory::Ratio
    } else if ["cash", "flow"].iter().any(|k| lower.contains(k)) {
        MetricCategory::CashFlow
    } else if ["asset", "liability", "equity", "debt"]
        .iter()
        .any(|k| lower.contains(k))
    {
        MetricCategory::BalanceSheet
    } else {
        MetricCategory::IncomeStatement
    }
}

/// Whether a raw label carries a projection marker, flipping `is_actual`
/// to false (§4.H).
pub fn is_projection(label: &str) -> bool {
    let lower = label.to_lowercase();
    PROJECTION_MARKERS.iter().any(|m| lower.ends_with(m)) || lower.contains("forecast")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_known_english_phrases() {
        assert_eq!(
            normalize_metric_name("Revenue"),
            ("revenue".to_string(), MetricCategory::IncomeStatement)
        );
        assert_eq!(
            normalize_metric_name("EBITDA"),
            ("ebitda".to_string(), MetricCategory::IncomeStatement)
        );
        assert_eq!(
            normalize_metric_name("Free Cash Flow"),
            ("free_cash_flow".to_string(), MetricCategory::CashFlow)
        );
    }

    #[test]
    fn normalizes_known_german_phrases() {
        assert_eq!(
            normalize_metric_name("Umsatz"),
            ("revenue".to_string(), MetricCategory::IncomeStatement)
        );
        assert_eq!(
            normalize_metric_name("Eigenkapital"),
            ("equity".to_string(), MetricCategory::BalanceSheet)
        );
    }

    #[test]
    fn falls_back_to_snake_case_and_keyword_category() {
        let (name, category) = normalize_metric_name("Quick Ratio");
        assert_eq!(name, "quick_ratio");
        assert_eq!(category, MetricCategory::Ratio);

        let (name, category) = normalize_metric_name("Inventory Turnover");
        assert_eq!(name, "inventory_turnover");
        assert_eq!(category, MetricCategory::IncomeStatement);
    }

    #[test]
    fn detects_projection_markers() {
        assert!(is_projection("FY24…E"));
        assert!(is_projection("FY25…F"));
        assert!(is_projection("2026 Forecast"));
        assert!(!is_projection("FY23 Actual"));
    }
}
