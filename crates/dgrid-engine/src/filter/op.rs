//! Filter operators and the kind rules derived from them

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Declared filter capability of a column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FilterType {
    String,
    Number,
    Date,
    Timestamp,
    /// Closed set of members, compared as strings
    Enum { values: Vec<String> },
    ForeignKey,
    Bool,
    /// A two-valued column exposed as a yes/no filter
    EnumLikeBool {
        true_value: String,
        false_value: String,
    },
    /// Seconds, entered with a unit in `value_2`
    Duration,
    /// Only the column's custom filter function applies
    Custom,
}

/// Every supported filter operator, persisted by its snake_case name
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FilterOp {
    Empty,
    NotEmpty,
    Custom,

    StrEq,
    StrNe,
    StrContains,
    StrNotContains,
    StrStartsWith,
    StrEndsWith,

    NumEq,
    NumNe,
    NumLt,
    NumLte,
    NumGt,
    NumGte,
    NumBetween,

    DateEq,
    DateNe,
    DateLt,
    DateLte,
    DateGt,
    DateGte,
    DateWithin,

    TimestampEq,
    TimestampLt,
    TimestampLte,
    TimestampGt,
    TimestampGte,
    TimestampWithin,

    EnumEq,
    EnumNe,
    EnumAnyOf,
    EnumNoneOf,

    FkEq,
    FkNe,

    BoolIsTrue,
    BoolIsFalse,

    EnumLikeBoolEq,
    EnumLikeBoolNe,

    DurationEq,
    DurationLt,
    DurationGt,
}

/// What the leaf's `value_1` holds for relative date operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateValueFamily {
    /// A single point: `today`, `one_week_ago`, `exact_date`, ...
    Keyword,
    /// A range: `past_week`, `next_number_of_days`, ...
    Within,
}

/// What `value_2` holds once `value_1` is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondValueShape {
    Nothing,
    DayCount,
    ExactDate,
}

pub const DATE_KEYWORDS: &[&str] = &[
    "today",
    "tomorrow",
    "yesterday",
    "one_week_ago",
    "one_week_from_now",
    "one_month_ago",
    "one_month_from_now",
    "number_of_days_ago",
    "number_of_days_from_now",
    "exact_date",
];

pub const WITHIN_KEYWORDS: &[&str] = &[
    "past_week",
    "past_month",
    "past_year",
    "next_week",
    "next_month",
    "next_year",
    "past_number_of_days",
    "next_number_of_days",
];

pub fn is_string_op(op: FilterOp) -> bool {
    use FilterOp::*;
    matches!(
        op,
        StrEq | StrNe | StrContains | StrNotContains | StrStartsWith | StrEndsWith
    )
}

pub fn is_number_op(op: FilterOp) -> bool {
    use FilterOp::*;
    matches!(op, NumEq | NumNe | NumLt | NumLte | NumGt | NumGte | NumBetween)
}

pub fn is_date_op(op: FilterOp) -> bool {
    use FilterOp::*;
    matches!(
        op,
        DateEq | DateNe | DateLt | DateLte | DateGt | DateGte | DateWithin
    )
}

pub fn is_timestamp_op(op: FilterOp) -> bool {
    use FilterOp::*;
    matches!(
        op,
        TimestampEq | TimestampLt | TimestampLte | TimestampGt | TimestampGte | TimestampWithin
    )
}

pub fn is_enum_op(op: FilterOp) -> bool {
    use FilterOp::*;
    matches!(op, EnumEq | EnumNe | EnumAnyOf | EnumNoneOf)
}

pub fn is_fk_op(op: FilterOp) -> bool {
    matches!(op, FilterOp::FkEq | FilterOp::FkNe)
}

pub fn is_bool_op(op: FilterOp) -> bool {
    matches!(op, FilterOp::BoolIsTrue | FilterOp::BoolIsFalse)
}

pub fn is_enum_like_bool_op(op: FilterOp) -> bool {
    matches!(op, FilterOp::EnumLikeBoolEq | FilterOp::EnumLikeBoolNe)
}

pub fn is_duration_op(op: FilterOp) -> bool {
    use FilterOp::*;
    matches!(op, DurationEq | DurationLt | DurationGt)
}

/// Date and timestamp operators, whose `value_1` is a keyword rather than a literal
pub fn is_relative_date_op(op: FilterOp) -> bool {
    is_date_op(op) || is_timestamp_op(op)
}

pub fn date_value_family(op: FilterOp) -> Option<DateValueFamily> {
    match op {
        FilterOp::DateWithin | FilterOp::TimestampWithin => Some(DateValueFamily::Within),
        op if is_relative_date_op(op) => Some(DateValueFamily::Keyword),
        _ => None,
    }
}

impl DateValueFamily {
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Keyword => DATE_KEYWORDS,
            Self::Within => WITHIN_KEYWORDS,
        }
    }

    /// The keyword a value picker preselects for this family
    pub fn default_keyword(self) -> &'static str {
        match self {
            Self::Keyword => "today",
            Self::Within => "past_week",
        }
    }

    pub fn accepts(self, keyword: &str) -> bool {
        self.keywords().contains(&keyword)
    }
}

pub fn second_value_shape(keyword: Option<&str>) -> SecondValueShape {
    match keyword {
        Some(
            "number_of_days_ago"
            | "number_of_days_from_now"
            | "past_number_of_days"
            | "next_number_of_days",
        ) => SecondValueShape::DayCount,
        Some("exact_date") => SecondValueShape::ExactDate,
        _ => SecondValueShape::Nothing,
    }
}

/// Whether the operator reads `value_1` at all
pub fn requires_value(op: FilterOp) -> bool {
    !matches!(
        op,
        FilterOp::Empty | FilterOp::NotEmpty | FilterOp::BoolIsTrue | FilterOp::BoolIsFalse
    )
}

/// Operators offered for a filter type, in display order
pub fn ops_for(filter_type: &FilterType) -> Vec<FilterOp> {
    let kind: fn(FilterOp) -> bool = match filter_type {
        FilterType::String => is_string_op,
        FilterType::Number => is_number_op,
        FilterType::Date => is_date_op,
        FilterType::Timestamp => is_timestamp_op,
        FilterType::Enum { .. } => is_enum_op,
        FilterType::ForeignKey => is_fk_op,
        FilterType::Bool => is_bool_op,
        FilterType::EnumLikeBool { .. } => is_enum_like_bool_op,
        FilterType::Duration => is_duration_op,
        FilterType::Custom => return vec![FilterOp::Custom],
    };

    let mut ops: Vec<FilterOp> = FilterOp::iter().filter(|op| kind(*op)).collect();
    if !matches!(filter_type, FilterType::Bool | FilterType::EnumLikeBool { .. }) {
        ops.push(FilterOp::Empty);
        ops.push(FilterOp::NotEmpty);
    }
    ops
}

pub fn default_for(filter_type: &FilterType) -> FilterOp {
    match filter_type {
        FilterType::String => FilterOp::StrContains,
        FilterType::Number => FilterOp::NumEq,
        FilterType::Date => FilterOp::DateEq,
        FilterType::Timestamp => FilterOp::TimestampEq,
        FilterType::Enum { .. } => FilterOp::EnumEq,
        FilterType::ForeignKey => FilterOp::FkEq,
        FilterType::Bool => FilterOp::BoolIsTrue,
        FilterType::EnumLikeBool { .. } => FilterOp::EnumLikeBoolEq,
        FilterType::Duration => FilterOp::DurationGt,
        FilterType::Custom => FilterOp::Custom,
    }
}
