//! Per-operator predicate encoders
//!
//! Every encoder fails open: a missing or unparseable value produces the
//! literal `true`, so a half-typed filter never hides rows.

use std::sync::Arc;

use chrono::{Days, Local, Months, NaiveDate};

use super::op::{FilterOp, FilterType};

/// Predicate used when a leaf cannot be encoded
pub const FAIL_OPEN: &str = "true";

/// Raw values of a filter leaf as handed to encoders
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterValues<'a> {
    pub value_1: Option<&'a str>,
    pub value_2: Option<&'a str>,
    pub value_3: Option<&'a str>,
}

/// Column-provided predicate builder for `FilterOp::Custom`; `None` fails open
pub type CustomFilter = Arc<dyn Fn(&str, FilterValues<'_>) -> Option<String> + Send + Sync>;

/// Clock used to resolve relative date keywords
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeContext {
    pub today: NaiveDate,
}

impl EncodeContext {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    pub fn local() -> Self {
        Self::new(Local::now().date_naive())
    }
}

impl Default for EncodeContext {
    fn default() -> Self {
        Self::local()
    }
}

/// Everything needed to encode one leaf
pub struct LeafInput<'a> {
    pub op: FilterOp,
    pub expr: &'a str,
    pub filter_type: &'a FilterType,
    pub values: FilterValues<'a>,
    pub custom: Option<&'a CustomFilter>,
}

pub fn encode_leaf(input: &LeafInput<'_>, ctx: &EncodeContext) -> String {
    let encoded = match input.op {
        FilterOp::Empty => Some(encode_empty(input.expr, input.filter_type, true)),
        FilterOp::NotEmpty => Some(encode_empty(input.expr, input.filter_type, false)),
        FilterOp::Custom => input
            .custom
            .and_then(|custom| custom(input.expr, input.values)),
        op if super::op::is_string_op(op) => encode_string(op, input.expr, input.values),
        op if super::op::is_number_op(op) => encode_number(op, input.expr, input.values),
        op if super::op::is_date_op(op) => encode_date(op, input.expr, input.values, ctx),
        op if super::op::is_timestamp_op(op) => {
            encode_timestamp(op, input.expr, input.values, ctx)
        }
        op if super::op::is_enum_op(op) => {
            encode_enum(op, input.expr, input.filter_type, input.values)
        }
        op if super::op::is_fk_op(op) => encode_fk(op, input.expr, input.values),
        FilterOp::BoolIsTrue => Some(format!("{} = true", input.expr)),
        FilterOp::BoolIsFalse => Some(format!("{} = false", input.expr)),
        op if super::op::is_enum_like_bool_op(op) => {
            encode_enum_like_bool(op, input.expr, input.filter_type, input.values)
        }
        op if super::op::is_duration_op(op) => encode_duration(op, input.expr, input.values),
        _ => None,
    };

    encoded.unwrap_or_else(|| FAIL_OPEN.to_string())
}

/// Single-quoted literal with embedded quotes doubled
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn like_escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
        .replace('\'', "''")
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn number_literal(value: Option<&str>) -> Option<String> {
    let value = present(value)?;
    if let Ok(int) = value.parse::<i64>() {
        return Some(int.to_string());
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(|f| f.to_string())
}

fn encode_empty(expr: &str, filter_type: &FilterType, empty: bool) -> String {
    let textual = matches!(filter_type, FilterType::String | FilterType::Enum { .. });
    match (empty, textual) {
        (true, true) => format!("({expr} is null or {expr} = '')"),
        (true, false) => format!("{expr} is null"),
        (false, true) => format!("({expr} is not null and {expr} <> '')"),
        (false, false) => format!("{expr} is not null"),
    }
}

fn encode_string(op: FilterOp, expr: &str, values: FilterValues<'_>) -> Option<String> {
    // Whitespace is significant in string comparisons, only emptiness fails open
    let value = values.value_1.filter(|v| !v.is_empty())?;
    let sql = match op {
        FilterOp::StrEq => format!("{} = {}", expr, quote_literal(value)),
        FilterOp::StrNe => format!("{} <> {}", expr, quote_literal(value)),
        FilterOp::StrContains => format!("{} like '%{}%' escape '\\'", expr, like_escape(value)),
        FilterOp::StrNotContains => {
            format!("{} not like '%{}%' escape '\\'", expr, like_escape(value))
        }
        FilterOp::StrStartsWith => format!("{} like '{}%' escape '\\'", expr, like_escape(value)),
        FilterOp::StrEndsWith => format!("{} like '%{}' escape '\\'", expr, like_escape(value)),
        _ => return None,
    };
    Some(sql)
}

fn encode_number(op: FilterOp, expr: &str, values: FilterValues<'_>) -> Option<String> {
    let value = number_literal(values.value_1)?;
    let sql = match op {
        FilterOp::NumEq => format!("{expr} = {value}"),
        FilterOp::NumNe => format!("{expr} <> {value}"),
        FilterOp::NumLt => format!("{expr} < {value}"),
        FilterOp::NumLte => format!("{expr} <= {value}"),
        FilterOp::NumGt => format!("{expr} > {value}"),
        FilterOp::NumGte => format!("{expr} >= {value}"),
        FilterOp::NumBetween => {
            let upper = number_literal(values.value_2)?;
            format!("{expr} between {value} and {upper}")
        }
        _ => return None,
    };
    Some(sql)
}

fn parse_day_count(value: Option<&str>) -> Option<u64> {
    present(value)?.parse::<u64>().ok()
}

fn parse_date(value: Option<&str>) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(present(value)?, "%Y-%m-%d").ok()
}

/// Resolve a point keyword (`today`, `exact_date`, ...) to a calendar day
pub fn resolve_date_keyword(
    keyword: Option<&str>,
    second: Option<&str>,
    ctx: &EncodeContext,
) -> Option<NaiveDate> {
    let today = ctx.today;
    match present(keyword)? {
        "today" => Some(today),
        "tomorrow" => today.checked_add_days(Days::new(1)),
        "yesterday" => today.checked_sub_days(Days::new(1)),
        "one_week_ago" => today.checked_sub_days(Days::new(7)),
        "one_week_from_now" => today.checked_add_days(Days::new(7)),
        "one_month_ago" => today.checked_sub_months(Months::new(1)),
        "one_month_from_now" => today.checked_add_months(Months::new(1)),
        "number_of_days_ago" => today.checked_sub_days(Days::new(parse_day_count(second)?)),
        "number_of_days_from_now" => {
            today.checked_add_days(Days::new(parse_day_count(second)?))
        }
        "exact_date" => parse_date(second),
        _ => None,
    }
}

/// Resolve a within keyword to an inclusive day range
pub fn resolve_within_keyword(
    keyword: Option<&str>,
    second: Option<&str>,
    ctx: &EncodeContext,
) -> Option<(NaiveDate, NaiveDate)> {
    let today = ctx.today;
    let (from, to) = match present(keyword)? {
        "past_week" => (today.checked_sub_days(Days::new(7))?, today),
        "past_month" => (today.checked_sub_months(Months::new(1))?, today),
        "past_year" => (today.checked_sub_months(Months::new(12))?, today),
        "next_week" => (today, today.checked_add_days(Days::new(7))?),
        "next_month" => (today, today.checked_add_months(Months::new(1))?),
        "next_year" => (today, today.checked_add_months(Months::new(12))?),
        "past_number_of_days" => (
            today.checked_sub_days(Days::new(parse_day_count(second)?))?,
            today,
        ),
        "next_number_of_days" => (
            today,
            today.checked_add_days(Days::new(parse_day_count(second)?))?,
        ),
        _ => return None,
    };
    Some((from, to))
}

fn day_literal(day: NaiveDate) -> String {
    format!("'{}'", day.format("%Y-%m-%d"))
}

fn encode_date(
    op: FilterOp,
    expr: &str,
    values: FilterValues<'_>,
    ctx: &EncodeContext,
) -> Option<String> {
    if op == FilterOp::DateWithin {
        let (from, to) = resolve_within_keyword(values.value_1, values.value_2, ctx)?;
        return Some(format!(
            "({expr} >= {} and {expr} <= {})",
            day_literal(from),
            day_literal(to)
        ));
    }

    let day = day_literal(resolve_date_keyword(values.value_1, values.value_2, ctx)?);
    let sql = match op {
        FilterOp::DateEq => format!("{expr} = {day}"),
        FilterOp::DateNe => format!("{expr} <> {day}"),
        FilterOp::DateLt => format!("{expr} < {day}"),
        FilterOp::DateLte => format!("{expr} <= {day}"),
        FilterOp::DateGt => format!("{expr} > {day}"),
        FilterOp::DateGte => format!("{expr} >= {day}"),
        _ => return None,
    };
    Some(sql)
}

/// Timestamps compare against half-open day boundaries `[day, day + 1)`
fn encode_timestamp(
    op: FilterOp,
    expr: &str,
    values: FilterValues<'_>,
    ctx: &EncodeContext,
) -> Option<String> {
    let (start, end) = if op == FilterOp::TimestampWithin {
        resolve_within_keyword(values.value_1, values.value_2, ctx)?
    } else {
        let day = resolve_date_keyword(values.value_1, values.value_2, ctx)?;
        (day, day)
    };
    let start = day_literal(start);
    let end = day_literal(end.checked_add_days(Days::new(1))?);

    let sql = match op {
        FilterOp::TimestampEq | FilterOp::TimestampWithin => {
            format!("({expr} >= {start} and {expr} < {end})")
        }
        FilterOp::TimestampLt => format!("{expr} < {start}"),
        FilterOp::TimestampLte => format!("{expr} < {end}"),
        FilterOp::TimestampGt => format!("{expr} >= {end}"),
        FilterOp::TimestampGte => format!("{expr} >= {start}"),
        _ => return None,
    };
    Some(sql)
}

fn encode_enum(
    op: FilterOp,
    expr: &str,
    filter_type: &FilterType,
    values: FilterValues<'_>,
) -> Option<String> {
    let members: &[String] = match filter_type {
        FilterType::Enum { values } => values,
        _ => &[],
    };
    let is_member = |v: &str| members.is_empty() || members.iter().any(|m| m == v);

    match op {
        FilterOp::EnumEq | FilterOp::EnumNe => {
            let value = present(values.value_1).filter(|v| is_member(*v))?;
            let cmp = if op == FilterOp::EnumEq { "=" } else { "<>" };
            Some(format!("{} {} {}", expr, cmp, quote_literal(value)))
        }
        FilterOp::EnumAnyOf | FilterOp::EnumNoneOf => {
            let picked: Vec<String> = serde_json::from_str(present(values.value_1)?).ok()?;
            let picked: Vec<String> = picked
                .iter()
                .filter(|v| is_member(v.as_str()))
                .map(|v| quote_literal(v))
                .collect();
            if picked.is_empty() {
                return None;
            }
            let keyword = if op == FilterOp::EnumAnyOf { "in" } else { "not in" };
            Some(format!("{} {} ({})", expr, keyword, picked.join(", ")))
        }
        _ => None,
    }
}

fn encode_fk(op: FilterOp, expr: &str, values: FilterValues<'_>) -> Option<String> {
    let raw = present(values.value_1)?;
    let literal = match raw.parse::<i64>() {
        Ok(id) => id.to_string(),
        Err(_) => quote_literal(raw),
    };
    let cmp = if op == FilterOp::FkEq { "=" } else { "<>" };
    Some(format!("{expr} {cmp} {literal}"))
}

fn encode_enum_like_bool(
    op: FilterOp,
    expr: &str,
    filter_type: &FilterType,
    values: FilterValues<'_>,
) -> Option<String> {
    let FilterType::EnumLikeBool {
        true_value,
        false_value,
    } = filter_type
    else {
        return None;
    };
    let wanted = match present(values.value_1)? {
        "true" => true_value,
        "false" => false_value,
        _ => return None,
    };
    let cmp = if op == FilterOp::EnumLikeBoolEq { "=" } else { "<>" };
    Some(format!("{} {} {}", expr, cmp, quote_literal(wanted)))
}

fn duration_factor(unit: Option<&str>) -> Option<i64> {
    match present(unit).unwrap_or("seconds") {
        "seconds" => Some(1),
        "minutes" => Some(60),
        "hours" => Some(3_600),
        "days" => Some(86_400),
        _ => None,
    }
}

fn encode_duration(op: FilterOp, expr: &str, values: FilterValues<'_>) -> Option<String> {
    let amount = number_literal(values.value_1)?;
    let factor = duration_factor(values.value_2)?;
    let scaled = if factor == 1 {
        amount
    } else {
        format!("{amount} * {factor}")
    };
    let cmp = match op {
        FilterOp::DurationEq => "=",
        FilterOp::DurationLt => "<",
        FilterOp::DurationGt => ">",
        _ => return None,
    };
    Some(format!("{expr} {cmp} {scaled}"))
}
