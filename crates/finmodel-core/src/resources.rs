// Backend resources: finance models, periods, scenarios and line items.
//
// Shapes follow the backend serializers. Every resource keeps fields it does
// not know about in `extra` so records survive a read-modify-write cycle.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Kind of financial analysis a finance model represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelType {
    #[serde(rename = "DCF")]
    Dcf,
    Forecast,
    Budget,
    Scenario,
    CashFlow,
    Valuation,
    #[serde(rename = "LBO")]
    Lbo,
    #[serde(rename = "M&A")]
    MergersAcquisitions,
    Sensitivity,
    BreakEven,
    #[serde(rename = "KPI")]
    Kpi,
    #[serde(rename = "3Statement")]
    ThreeStatement,
    Rolling,
    CapTable,
    MonteCarlo,
    #[serde(rename = "IRR")]
    Irr,
}

impl ModelType {
    pub const ALL: [ModelType; 16] = [
        ModelType::Dcf,
        ModelType::Forecast,
        ModelType::Budget,
        ModelType::Scenario,
        ModelType::CashFlow,
        ModelType::Valuation,
        ModelType::Lbo,
        ModelType::MergersAcquisitions,
        ModelType::Sensitivity,
        ModelType::BreakEven,
        ModelType::Kpi,
        ModelType::ThreeStatement,
        ModelType::Rolling,
        ModelType::CapTable,
        ModelType::MonteCarlo,
        ModelType::Irr,
    ];

    /// Wire code, e.g. `"DCF"` or `"M&A"`.
    pub fn code(self) -> &'static str {
        match self {
            ModelType::Dcf => "DCF",
            ModelType::Forecast => "Forecast",
            ModelType::Budget => "Budget",
            ModelType::Scenario => "Scenario",
            ModelType::CashFlow => "CashFlow",
            ModelType::Valuation => "Valuation",
            ModelType::Lbo => "LBO",
            ModelType::MergersAcquisitions => "M&A",
            ModelType::Sensitivity => "Sensitivity",
            ModelType::BreakEven => "BreakEven",
            ModelType::Kpi => "KPI",
            ModelType::ThreeStatement => "3Statement",
            ModelType::Rolling => "Rolling",
            ModelType::CapTable => "CapTable",
            ModelType::MonteCarlo => "MonteCarlo",
            ModelType::Irr => "IRR",
        }
    }

    /// Human-readable name shown next to the code.
    pub fn label(self) -> &'static str {
        match self {
            ModelType::Dcf => "Discounted Cash Flow",
            ModelType::Forecast => "Forecast Model",
            ModelType::Budget => "Budgeting Model",
            ModelType::Scenario => "Scenario Analysis",
            ModelType::CashFlow => "Cash Flow Model",
            ModelType::Valuation => "Valuation Model",
            ModelType::Lbo => "Leveraged Buyout Model",
            ModelType::MergersAcquisitions => "M&A Model",
            ModelType::Sensitivity => "Sensitivity Analysis",
            ModelType::BreakEven => "Break-Even Model",
            ModelType::Kpi => "KPI Dashboard",
            ModelType::ThreeStatement => "3-Statement Model",
            ModelType::Rolling => "Rolling Forecast",
            ModelType::CapTable => "Capitalization Table",
            ModelType::MonteCarlo => "Monte Carlo Simulation",
            ModelType::Irr => "Internal Rate of Return Model",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ModelType {
    type Err = String;

    /// Case-insensitive match on the wire code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelType::ALL
            .into_iter()
            .find(|t| t.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown model type `{s}`"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Monthly,
    Quarterly,
    Yearly,
}

impl PeriodType {
    pub fn code(self) -> &'static str {
        match self {
            PeriodType::Monthly => "monthly",
            PeriodType::Quarterly => "quarterly",
            PeriodType::Yearly => "yearly",
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for PeriodType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(PeriodType::Monthly),
            "quarterly" => Ok(PeriodType::Quarterly),
            "yearly" | "annual" => Ok(PeriodType::Yearly),
            other => Err(format!("unknown period type `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineItemCategory {
    Revenue,
    Expense,
    Asset,
    Liability,
    Equity,
    Other,
}

impl fmt::Display for LineItemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LineItemCategory::Revenue => "Revenue",
            LineItemCategory::Expense => "Expense",
            LineItemCategory::Asset => "Asset",
            LineItemCategory::Liability => "Liability",
            LineItemCategory::Equity => "Equity",
            LineItemCategory::Other => "Other",
        };
        f.write_str(s)
    }
}

impl FromStr for LineItemCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "revenue" => Ok(LineItemCategory::Revenue),
            "expense" => Ok(LineItemCategory::Expense),
            "asset" => Ok(LineItemCategory::Asset),
            "liability" => Ok(LineItemCategory::Liability),
            "equity" => Ok(LineItemCategory::Equity),
            "other" => Ok(LineItemCategory::Other),
            other => Err(format!("unknown line item category `{other}`")),
        }
    }
}

// ---------------------------------------------------------------------------
// Finance models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinanceModel {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub model_type: ModelType,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body for creating or replacing a finance model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinanceModelDraft {
    pub name: String,
    pub version: String,
    pub model_type: ModelType,
}

impl From<&FinanceModel> for FinanceModelDraft {
    fn from(model: &FinanceModel) -> Self {
        Self {
            name: model.name.clone(),
            version: model.version.clone(),
            model_type: model.model_type,
        }
    }
}

// ---------------------------------------------------------------------------
// Periods
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub id: i64,
    pub label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub period_type: PeriodType,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Period {
    /// `"Jan 01, 2025 - Mar 31, 2025"`
    pub fn date_range(&self) -> String {
        format!(
            "{} - {}",
            self.start_date.format("%b %d, %Y"),
            self.end_date.format("%b %d, %Y")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodDraft {
    pub label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub period_type: PeriodType,
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "model")]
    pub model_id: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub model_id: i64,
}

// ---------------------------------------------------------------------------
// Line items
// ---------------------------------------------------------------------------

/// A reference to a related record, sent either as a bare id or as a nested
/// object such as `{"id": 3, "name": "Base Case"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelatedRef {
    Id(i64),
    Object {
        #[serde(default)]
        id: Option<i64>,
        #[serde(default, alias = "label")]
        name: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    pub category: LineItemCategory,
    #[serde(deserialize_with = "amount_from_string_or_number")]
    pub amount: f64,
    #[serde(default)]
    pub scenario: Option<RelatedRef>,
    #[serde(default)]
    pub period: Option<RelatedRef>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Decimal fields arrive as strings (`"1500.00"`); older payloads use plain
/// numbers.
fn amount_from_string_or_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| D::Error::custom("amount is not a finite number")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| D::Error::custom(format!("invalid amount `{s}`: {e}"))),
        other => Err(D::Error::custom(format!("invalid amount: {other}"))),
    }
}
