//! Operator semantics and result ordering
//!
//! Equality comes in two strengths. Loose equality coerces between numbers,
//! numeric strings and booleans and treats a missing field as equal to null.
//! Strict equality requires the same kind of value. Relational operators
//! only hold between comparable values.

use super::ast::{Direction, OrderBy};
use super::QueryError;
use crate::record::{RecordRef, Value};
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;

pub const DEFAULT_LOCALE: &str = "en";

/// Numeric view used by loose comparisons
fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(f) => Some(*f),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Some(0.0)
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        _ => None,
    }
}

fn numbers_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => a == b,
        _ => a.as_f64() == b.as_f64(),
    }
}

/// `==`
pub fn loose_eq(value: Option<&Value>, predicate: &Value) -> bool {
    let value = match value {
        None | Some(Value::Null) => return predicate.is_null(),
        Some(v) => v,
    };
    match (value, predicate) {
        (_, Value::Null) => false,
        (a, b) if a.is_number() && b.is_number() => numbers_equal(a, b),
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (
            Value::Int(_) | Value::Float(_) | Value::Bool(_) | Value::String(_),
            Value::Int(_) | Value::Float(_) | Value::Bool(_) | Value::String(_),
        ) => match (coerce_number(value), coerce_number(predicate)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        (a, b) => a == b,
    }
}

/// `===`
pub fn strict_eq(value: Option<&Value>, predicate: &Value) -> bool {
    match value {
        None => false,
        Some(v) if v.is_number() && predicate.is_number() => numbers_equal(v, predicate),
        Some(v) => v == predicate,
    }
}

/// Order used by `>`, `>=`, `<`, `<=`; `None` when the values are not comparable
pub fn loose_cmp(value: Option<&Value>, predicate: &Value) -> Option<Ordering> {
    let value = value?;
    match (value, predicate) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => None,
        (Value::DateTime(_), _) | (_, Value::DateTime(_)) => None,
        (a, b) => coerce_number(a)?.partial_cmp(&coerce_number(b)?),
    }
}

/// `in`: membership in a predicate list, or substring of a predicate string
pub fn is_in(value: Option<&Value>, predicate: &Value) -> bool {
    match predicate {
        Value::Array(items) => items.iter().any(|item| strict_eq(value, item)),
        Value::String(haystack) => match value {
            Some(Value::String(needle)) => haystack.contains(needle.as_str()),
            _ => false,
        },
        _ => false,
    }
}

/// `contains`: the field (a list or a string) holds the predicate
pub fn contains(value: Option<&Value>, predicate: &Value) -> bool {
    match value {
        Some(Value::Array(items)) => items.iter().any(|item| strict_eq(Some(item), predicate)),
        Some(Value::String(haystack)) => match predicate {
            Value::String(needle) => haystack.contains(needle.as_str()),
            _ => false,
        },
        _ => false,
    }
}

/// Whether the field list and the predicate list share an element
pub fn intersects(value: Option<&Value>, predicate: &Value) -> bool {
    match (value, predicate) {
        (Some(Value::Array(left)), Value::Array(right)) => left
            .iter()
            .any(|item| right.iter().any(|other| strict_eq(Some(item), other))),
        _ => false,
    }
}

/// Text matched by LIKE; non-scalar values never match
pub fn like_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Int(n) => Some(n.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Compile a LIKE pattern: `%` matches any run, `_` one character, the rest is literal
pub fn compile_like(pattern: &str, flags: &str) -> Result<Regex, QueryError> {
    let mut source = String::with_capacity(pattern.len() + 2);
    source.push('^');
    let mut buf = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            c => source.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
    }
    source.push('$');

    let mut builder = RegexBuilder::new(&source);
    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            // Global, unicode and sticky have no effect on a whole-string test
            'g' | 'u' | 'y' => {}
            other => {
                return Err(QueryError::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: format!("unsupported flag '{other}'"),
                })
            }
        }
    }

    builder.build().map_err(|e| QueryError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Sort order for query results
///
/// Missing and null values sort first, then booleans, numbers, strings,
/// datetimes, lists and objects. Strings compare case-insensitively with
/// embedded digit runs compared by numeric value, so `"item2"` sorts before
/// `"item10"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collator {
    locale: String,
}

impl Default for Collator {
    fn default() -> Self {
        Self::new(DEFAULT_LOCALE)
    }
}

impl Collator {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
        }
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        match (a, b) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
                a.total_cmp(&b)
            }
            (Value::String(a), Value::String(b)) => natural_compare(a, b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            _ => crate::index::compare_keys(a, b),
        }
    }

    /// Stable multi-key sort
    pub fn sort(&self, records: &mut Vec<RecordRef>, order: &[OrderBy]) {
        if order.is_empty() || records.len() < 2 {
            return;
        }

        // Read every sort key once instead of locking per comparison
        let mut keyed: Vec<(Vec<Value>, RecordRef)> = records
            .drain(..)
            .map(|record| {
                let keys = {
                    let guard = record.read();
                    order
                        .iter()
                        .map(|o| guard.get_by_path(&o.field).cloned().unwrap_or(Value::Null))
                        .collect()
                };
                (keys, record)
            })
            .collect();

        keyed.sort_by(|(a, _), (b, _)| {
            for ((x, y), o) in a.iter().zip(b.iter()).zip(order) {
                let ord = match o.direction {
                    Direction::Asc => self.compare(x, y),
                    Direction::Desc => self.compare(y, x),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });

        records.extend(keyed.into_iter().map(|(_, record)| record));
    }
}

/// Case-insensitive comparison with digit runs compared numerically
pub fn natural_compare(a: &str, b: &str) -> Ordering {
    let mut x = a.chars().peekable();
    let mut y = b.chars().peekable();

    loop {
        match (x.peek().copied(), y.peek().copied()) {
            (None, None) => break,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(c), Some(d)) if c.is_ascii_digit() && d.is_ascii_digit() => {
                let n = take_digits(&mut x);
                let m = take_digits(&mut y);
                let ord = compare_digit_runs(&n, &m);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(c), Some(d)) => {
                let ord = c.to_lowercase().cmp(d.to_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                x.next();
                y.next();
            }
        }
    }

    case_tiebreak(a, b)
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
        run.push(c);
        chars.next();
    }
    run
}

fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

// Strings equal up to case and zero padding: lowercase sorts first
fn case_tiebreak(a: &str, b: &str) -> Ordering {
    for (c, d) in a.chars().zip(b.chars()) {
        if c == d {
            continue;
        }
        return match (c.is_lowercase(), d.is_lowercase()) {
            (true, false) if d.is_uppercase() => Ordering::Less,
            (false, true) if c.is_uppercase() => Ordering::Greater,
            _ => c.cmp(&d),
        };
    }
    a.len().cmp(&b.len())
}
