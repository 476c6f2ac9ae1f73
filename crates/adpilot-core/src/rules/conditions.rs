use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use super::lenient;
use super::{Level, RuleDocumentError};

// ---------------------------------------------------------------------------
// Time ranges
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Today,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    fn parse(raw: &str) -> Result<Self, RuleDocumentError> {
        match raw.trim() {
            "today" => Ok(TimeUnit::Today),
            "minutes" | "minute" => Ok(TimeUnit::Minutes),
            "hours" | "hour" => Ok(TimeUnit::Hours),
            "days" | "day" => Ok(TimeUnit::Days),
            other => Err(RuleDocumentError::InvalidTimeRange(format!(
                "unknown unit '{other}'"
            ))),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Today => "today",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        }
    }
}

/// Window over which insights are aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeRange {
    pub unit: TimeUnit,
    pub amount: u32,
    /// Only meaningful for [`TimeUnit::Days`]: end the window yesterday.
    pub exclude_today: bool,
}

impl Default for TimeRange {
    fn default() -> Self {
        Self {
            unit: TimeUnit::Days,
            amount: 1,
            exclude_today: true,
        }
    }
}

impl TimeRange {
    /// Parses `{unit, amount, exclude_today}`; missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RuleDocumentError::InvalidTimeRange`] for an unknown unit or
    /// an amount that is not a positive whole number.
    pub fn from_value(value: &Value) -> Result<Self, RuleDocumentError> {
        let Some(obj) = value.as_object() else {
            return Err(RuleDocumentError::InvalidTimeRange(
                "time range must be an object".to_string(),
            ));
        };

        let unit = match obj.get("unit").and_then(Value::as_str) {
            Some(raw) => TimeUnit::parse(raw)?,
            None => TimeUnit::Days,
        };

        let amount = match obj.get("amount") {
            None | Some(Value::Null) => 1,
            Some(raw) => whole_amount(raw)?,
        };

        let exclude_today = lenient::flag(obj.get("exclude_today"), true);

        Ok(Self {
            unit,
            amount: if unit == TimeUnit::Today { 1 } else { amount },
            exclude_today,
        })
    }
}

/// Upper bound on a window's `amount`, whatever the unit. 36500 days is a
/// century; minute and hour windows stay far inside it too.
pub const MAX_TIME_RANGE_AMOUNT: u32 = 36_500;

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_amount(raw: &Value) -> Result<u32, RuleDocumentError> {
    let n = lenient::number(raw).ok_or_else(|| {
        RuleDocumentError::InvalidTimeRange(format!("amount {raw} is not a number"))
    })?;
    if n < 1.0 || n.fract().abs() > f64::EPSILON {
        return Err(RuleDocumentError::InvalidTimeRange(format!(
            "amount must be a positive whole number, got {n}"
        )));
    }
    if n > f64::from(MAX_TIME_RANGE_AMOUNT) {
        return Err(RuleDocumentError::InvalidTimeRange(format!(
            "amount {n} exceeds the maximum of {MAX_TIME_RANGE_AMOUNT}"
        )));
    }
    Ok(n as u32)
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            TimeUnit::Today => f.write_str("today"),
            TimeUnit::Days if self.exclude_today => {
                write!(f, "{} days (excluding today)", self.amount)
            }
            unit => write!(f, "{} {}", self.amount, unit.as_str()),
        }
    }
}

// ---------------------------------------------------------------------------
// Operators and fields
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Operator {
    /// # Errors
    ///
    /// Returns [`RuleDocumentError::UnknownOperator`] for anything outside
    /// `=`, `!=`, `>`, `>=`, `<`, `<=`.
    pub fn parse(raw: &str) -> Result<Self, RuleDocumentError> {
        match raw.trim() {
            "=" => Ok(Operator::Eq),
            "!=" => Ok(Operator::Ne),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            other => Err(RuleDocumentError::UnknownOperator(other.to_string())),
        }
    }

    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
        }
    }

    #[must_use]
    pub fn is_equality(self) -> bool {
        matches!(self, Operator::Eq | Operator::Ne)
    }
}

impl Serialize for Operator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.symbol())
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Insight-derived metrics a condition may compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Spend,
    Impressions,
    Clicks,
    Ctr,
    Cpc,
    Cpm,
    Cpp,
    Roas,
    Conversions,
    PurchaseCount,
    PurchaseValue,
    MediaMarginVolume,
}

impl Metric {
    pub const ALL: [Metric; 12] = [
        Metric::Spend,
        Metric::Impressions,
        Metric::Clicks,
        Metric::Ctr,
        Metric::Cpc,
        Metric::Cpm,
        Metric::Cpp,
        Metric::Roas,
        Metric::Conversions,
        Metric::PurchaseCount,
        Metric::PurchaseValue,
        Metric::MediaMarginVolume,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Spend => "spend",
            Metric::Impressions => "impressions",
            Metric::Clicks => "clicks",
            Metric::Ctr => "ctr",
            Metric::Cpc => "cpc",
            Metric::Cpm => "cpm",
            Metric::Cpp => "cpp",
            Metric::Roas => "roas",
            Metric::Conversions => "conversions",
            Metric::PurchaseCount => "purchase_count",
            Metric::PurchaseValue => "purchase_value",
            Metric::MediaMarginVolume => "media_margin_volume",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConditionField {
    Status,
    CampaignStatus,
    NameContains,
    DailyBudget,
    /// Days in the window where the item bought at a CPP below `threshold`.
    CppWinningDays {
        threshold: f64,
    },
    AmountOfActiveAds,
    Metric(Metric),
}

impl ConditionField {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ConditionField::Status => "status",
            ConditionField::CampaignStatus => "campaign_status",
            ConditionField::NameContains => "name_contains",
            ConditionField::DailyBudget => "daily_budget",
            ConditionField::CppWinningDays { .. } => "cpp_winning_days",
            ConditionField::AmountOfActiveAds => "amount_of_active_ads",
            ConditionField::Metric(m) => m.as_str(),
        }
    }

    /// String-compared fields; these only accept `=` and `!=`.
    #[must_use]
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            ConditionField::Status | ConditionField::CampaignStatus | ConditionField::NameContains
        )
    }
}

// ---------------------------------------------------------------------------
// Expected values
// ---------------------------------------------------------------------------

/// Item- or insight-relative values usable as an expression base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialToken {
    DailyBudget,
    LifetimeBudget,
    CurrentSpend,
}

impl SpecialToken {
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            SpecialToken::DailyBudget => "__daily_budget__",
            SpecialToken::LifetimeBudget => "__lifetime_budget__",
            SpecialToken::CurrentSpend => "__current_spend__",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "__daily_budget__" => Some(SpecialToken::DailyBudget),
            "__lifetime_budget__" => Some(SpecialToken::LifetimeBudget),
            "__current_spend__" => Some(SpecialToken::CurrentSpend),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueBase {
    Literal(f64),
    Token(SpecialToken),
}

impl fmt::Display for ValueBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueBase::Literal(n) => write!(f, "{n}"),
            ValueBase::Token(t) => f.write_str(t.token()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpectedValue {
    Number(f64),
    Text(String),
    /// `(base × mul) + add`
    Expression {
        base: ValueBase,
        mul: f64,
        add: f64,
    },
}

impl ExpectedValue {
    /// Human-readable form used in audit output, e.g. `__daily_budget__ × 1.2 + 5`.
    #[must_use]
    pub fn expression_text(&self) -> String {
        match self {
            ExpectedValue::Number(n) => n.to_string(),
            ExpectedValue::Text(s) => s.clone(),
            ExpectedValue::Expression { base, mul, add } => {
                let mut out = base.to_string();
                if (mul - 1.0).abs() > f64::EPSILON {
                    out.push_str(&format!(" × {mul}"));
                }
                if add.abs() > f64::EPSILON {
                    if *add > 0.0 {
                        out.push_str(&format!(" + {add}"));
                    } else {
                        out.push_str(&format!(" - {}", add.abs()));
                    }
                }
                out
            }
        }
    }

    #[must_use]
    pub fn references(&self, token: SpecialToken) -> bool {
        matches!(self, ExpectedValue::Expression { base: ValueBase::Token(t), .. } if *t == token)
    }
}

// ---------------------------------------------------------------------------
// Clauses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionClause {
    pub field: ConditionField,
    pub operator: Operator,
    pub value: ExpectedValue,
    /// Overrides the rule's default window for this clause only.
    pub time_range: Option<TimeRange>,
}

impl ConditionClause {
    /// Parses one `{field, operator, value, threshold?, time_range?}` entry.
    ///
    /// # Errors
    ///
    /// Returns a [`RuleDocumentError`] describing the first problem found.
    pub fn from_value(value: &Value) -> Result<Self, RuleDocumentError> {
        let Some(obj) = value.as_object() else {
            return Err(RuleDocumentError::InvalidDocument(
                "each condition must be an object".to_string(),
            ));
        };

        let field_name = obj
            .get("field")
            .and_then(Value::as_str)
            .map(str::trim)
            .ok_or_else(|| {
                RuleDocumentError::InvalidDocument("condition is missing 'field'".to_string())
            })?;

        let operator = obj
            .get("operator")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RuleDocumentError::InvalidDocument(format!(
                    "condition on '{field_name}' is missing 'operator'"
                ))
            })
            .and_then(Operator::parse)?;

        let field = match field_name {
            "status" => ConditionField::Status,
            "campaign_status" => ConditionField::CampaignStatus,
            "name_contains" => ConditionField::NameContains,
            "daily_budget" => ConditionField::DailyBudget,
            "amount_of_active_ads" => ConditionField::AmountOfActiveAds,
            "cpp_winning_days" => ConditionField::CppWinningDays {
                threshold: obj
                    .get("threshold")
                    .and_then(lenient::number)
                    .ok_or(RuleDocumentError::MissingThreshold)?,
            },
            other => ConditionField::Metric(
                Metric::parse(other)
                    .ok_or_else(|| RuleDocumentError::UnknownField(other.to_string()))?,
            ),
        };

        if field.is_textual() && !operator.is_equality() {
            return Err(RuleDocumentError::UnsupportedOperator {
                field: field.name().to_string(),
                operator: operator.symbol().to_string(),
            });
        }

        let expected = if field.is_textual() {
            parse_text_value(field.name(), obj.get("value"))?
        } else {
            parse_numeric_value(field.name(), obj.get("value"))?
        };

        let time_range = match obj.get("time_range") {
            None | Some(Value::Null) => None,
            Some(Value::Object(tr)) if tr.is_empty() => None,
            Some(tr) => Some(TimeRange::from_value(tr)?),
        };

        Ok(Self {
            field,
            operator,
            value: expected,
            time_range,
        })
    }

    #[must_use]
    pub fn effective_time_range(&self, default: TimeRange) -> TimeRange {
        self.time_range.unwrap_or(default)
    }

    /// Whether evaluating this clause needs the aggregate insight row.
    #[must_use]
    pub fn needs_insights(&self) -> bool {
        matches!(self.field, ConditionField::Metric(_))
            || self.value.references(SpecialToken::CurrentSpend)
    }

    /// Whether evaluating this clause needs one insight row per day.
    #[must_use]
    pub fn needs_daily_insights(&self) -> bool {
        matches!(self.field, ConditionField::CppWinningDays { .. })
    }
}

fn parse_text_value(field: &str, raw: Option<&Value>) -> Result<ExpectedValue, RuleDocumentError> {
    match raw.and_then(lenient::scalar_to_string) {
        Some(s) if !s.trim().is_empty() => Ok(ExpectedValue::Text(s.trim().to_string())),
        _ => Err(RuleDocumentError::InvalidValue {
            field: field.to_string(),
            reason: "a non-empty string value is required".to_string(),
        }),
    }
}

fn parse_numeric_value(
    field: &str,
    raw: Option<&Value>,
) -> Result<ExpectedValue, RuleDocumentError> {
    let invalid = |reason: String| RuleDocumentError::InvalidValue {
        field: field.to_string(),
        reason,
    };

    match raw {
        None | Some(Value::Null) => Err(invalid("a value is required".to_string())),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(ExpectedValue::Number)
            .ok_or_else(|| invalid(format!("{n} is not representable"))),
        Some(Value::String(s)) => {
            if let Some(token) = SpecialToken::parse(s) {
                return Ok(ExpectedValue::Expression {
                    base: ValueBase::Token(token),
                    mul: 1.0,
                    add: 0.0,
                });
            }
            lenient::number_str(s)
                .map(ExpectedValue::Number)
                .ok_or_else(|| invalid(format!("'{s}' is neither a number nor a known token")))
        }
        Some(Value::Object(expr)) => parse_expression(expr).map_err(invalid),
        Some(other) => Err(invalid(format!("unsupported value {other}"))),
    }
}

fn parse_expression(expr: &Map<String, Value>) -> Result<ExpectedValue, String> {
    let base = match expr.get("base") {
        Some(Value::String(s)) => match SpecialToken::parse(s) {
            Some(token) => ValueBase::Token(token),
            None => ValueBase::Literal(
                lenient::number_str(s)
                    .ok_or_else(|| format!("expression base '{s}' is not a number or token"))?,
            ),
        },
        Some(v @ Value::Number(_)) => {
            ValueBase::Literal(lenient::number(v).ok_or("expression base is not finite")?)
        }
        _ => return Err("expression requires a 'base'".to_string()),
    };

    let factor = |key: &str, default: f64| -> Result<f64, String> {
        match expr.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(v) => lenient::number(v).ok_or_else(|| format!("'{key}' must be numeric")),
        }
    };

    Ok(ExpectedValue::Expression {
        base,
        mul: factor("mul", 1.0)?,
        add: factor("add", 0.0)?,
    })
}

// ---------------------------------------------------------------------------
// Scope and the full conditions document
// ---------------------------------------------------------------------------

/// Client-side narrowing of the fetched collection. All non-empty filters apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScopeFilters {
    pub name_contains: Vec<String>,
    pub ids: Vec<String>,
    pub campaign_ids: Vec<String>,
    pub campaign_name_contains: Vec<String>,
}

impl ScopeFilters {
    fn from_document(obj: &Map<String, Value>) -> Self {
        Self {
            name_contains: lenient::keyword_list(obj.get("name_contains")),
            ids: lenient::id_list(obj.get("ids")),
            campaign_ids: lenient::id_list(obj.get("campaign_ids")),
            campaign_name_contains: lenient::keyword_list(obj.get("campaign_name_contains")),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name_contains.is_empty()
            && self.ids.is_empty()
            && self.campaign_ids.is_empty()
            && self.campaign_name_contains.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleConditions {
    pub level: Level,
    pub scope: ScopeFilters,
    pub time_range: TimeRange,
    pub clauses: Vec<ConditionClause>,
}

impl RuleConditions {
    /// Parses the stored conditions document.
    ///
    /// Recognised keys: `rule_level` (default `ad`), the scope filter keys,
    /// `time_range`, and `conditions`.
    ///
    /// # Errors
    ///
    /// Returns a [`RuleDocumentError`] for a malformed document, an unknown
    /// level, an invalid clause, or an empty clause list.
    pub fn from_value(doc: &Value) -> Result<Self, RuleDocumentError> {
        let Some(obj) = doc.as_object() else {
            return Err(RuleDocumentError::InvalidDocument(
                "conditions must be a JSON object".to_string(),
            ));
        };

        let level = match obj.get("rule_level").and_then(Value::as_str) {
            Some(raw) => Level::parse(raw)?,
            None => Level::Ad,
        };

        let time_range = match obj.get("time_range") {
            None | Some(Value::Null) => TimeRange::default(),
            Some(tr) => TimeRange::from_value(tr)?,
        };

        let clauses = match obj.get("conditions") {
            Some(Value::Array(items)) => items
                .iter()
                .map(ConditionClause::from_value)
                .collect::<Result<Vec<_>, _>>()?,
            None | Some(Value::Null) => Vec::new(),
            Some(_) => {
                return Err(RuleDocumentError::InvalidDocument(
                    "'conditions' must be a list".to_string(),
                ))
            }
        };

        if clauses.is_empty() {
            return Err(RuleDocumentError::NoConditions);
        }

        Ok(Self {
            level,
            scope: ScopeFilters::from_document(obj),
            time_range,
            clauses,
        })
    }

    /// Statuses named by `status = X` clauses, sorted and deduplicated.
    ///
    /// Pushed to the platform as an `effective_status IN` filter. Values are
    /// passed as written; status matching is case-sensitive.
    #[must_use]
    pub fn status_allowlist(&self) -> Vec<String> {
        let mut statuses: Vec<String> = self
            .clauses
            .iter()
            .filter(|c| c.field == ConditionField::Status && c.operator == Operator::Eq)
            .filter_map(|c| match &c.value {
                ExpectedValue::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                _ => None,
            })
            .collect();
        statuses.sort();
        statuses.dedup();
        statuses
    }

    #[must_use]
    pub fn needs_campaign_statuses(&self) -> bool {
        self.clauses
            .iter()
            .any(|c| c.field == ConditionField::CampaignStatus)
    }

    #[must_use]
    pub fn needs_active_ads(&self) -> bool {
        self.clauses
            .iter()
            .any(|c| c.field == ConditionField::AmountOfActiveAds)
    }
}
