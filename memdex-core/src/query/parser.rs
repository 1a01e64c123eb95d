//! Query parser for converting JSON query objects to a [`QuerySpec`]
//!
//! Accepted shape:
//!
//! ```json
//! {
//!   "where": { "age": { ">": 30, "|<": 5 } },
//!   "orderBy": [["age", "DESC"], "name"],
//!   "offset": 10,
//!   "limit": 5,
//!   "locale": "en"
//! }
//! ```
//!
//! `where` may also be a list of groups joined by the strings `"and"`/`"or"`.
//! Any top-level key that is not reserved becomes an implicit `==` clause.

use super::ast::{Clause, Combinator, Direction, Group, OrderBy, QuerySpec, Where};
use super::QueryError;
use crate::record::Value;
use serde_json::{Map, Value as JsonValue};

const RESERVED: &[&str] = &["where", "orderBy", "sort", "limit", "offset", "skip", "locale"];

/// Query parser for JSON queries
pub struct QueryParser;

impl QueryParser {
    /// Parse a query from JSON text
    pub fn parse(json: &str) -> Result<QuerySpec, QueryError> {
        let value: JsonValue =
            serde_json::from_str(json).map_err(|e| QueryError::InvalidJson(e.to_string()))?;

        Self::parse_from_value(&value)
    }

    /// Parse a query from a JSON value
    pub fn parse_from_value(value: &JsonValue) -> Result<QuerySpec, QueryError> {
        let obj = value
            .as_object()
            .ok_or_else(|| QueryError::InvalidQuery("query must be an object".to_string()))?;

        let mut spec = QuerySpec::new();

        let mut filter = match obj.get("where") {
            Some(JsonValue::Object(clauses)) => Some(Where::Clauses(Self::parse_clauses(clauses)?)),
            Some(JsonValue::Array(groups)) => Some(Where::Groups(Self::parse_groups(groups)?)),
            Some(JsonValue::Null) | None => None,
            Some(other) => {
                return Err(QueryError::InvalidQuery(format!(
                    "where must be an object or an array, got {}",
                    json_type(other)
                )))
            }
        };

        // Implicit equality clauses
        let implicit: Vec<Clause> = obj
            .iter()
            .filter(|(key, _)| !RESERVED.contains(&key.as_str()))
            .map(|(key, value)| Self::parse_condition(key, value))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect();

        if !implicit.is_empty() {
            filter = Some(match filter {
                None => Where::Clauses(implicit),
                Some(Where::Clauses(mut clauses)) => {
                    for clause in implicit {
                        if !clauses.iter().any(|c| c.field == clause.field) {
                            clauses.push(clause);
                        }
                    }
                    Where::Clauses(clauses)
                }
                Some(Where::Groups(mut groups)) => {
                    groups.push(Group {
                        combinator: Combinator::And,
                        node: Where::Clauses(implicit),
                    });
                    Where::Groups(groups)
                }
            });
        }
        spec.filter = filter;

        if let Some(order) = obj.get("orderBy").or_else(|| obj.get("sort")) {
            spec.order_by = Self::parse_order_by(order)?;
        }

        if let Some(offset) = obj.get("offset").or_else(|| obj.get("skip")) {
            spec.offset = Self::parse_count("offset", offset)?;
        }

        if let Some(limit) = obj.get("limit") {
            spec.limit = Self::parse_count("limit", limit)?;
        }

        match obj.get("locale") {
            Some(JsonValue::String(locale)) => spec.locale = Some(locale.clone()),
            Some(JsonValue::Null) | None => {}
            Some(other) => {
                return Err(QueryError::InvalidQuery(format!(
                    "locale must be a string, got {}",
                    json_type(other)
                )))
            }
        }

        Ok(spec)
    }

    /// Parse one where object: `{ field: { op: predicate, ... }, field: value }`
    pub fn parse_clauses(obj: &Map<String, JsonValue>) -> Result<Vec<Clause>, QueryError> {
        let mut clauses = Vec::new();
        for (field, condition) in obj {
            clauses.extend(Self::parse_condition(field, condition)?);
        }
        Ok(clauses)
    }

    fn parse_condition(field: &str, condition: &JsonValue) -> Result<Vec<Clause>, QueryError> {
        match condition {
            JsonValue::Object(ops) => ops
                .iter()
                .map(|(op, predicate)| Clause::new(field, op, Value::from(predicate.clone())))
                .collect(),
            value => Ok(vec![Clause::new(field, "==", Value::from(value.clone()))?]),
        }
    }

    /// Parse a where list: objects or nested lists separated by optional "and"/"or"
    pub fn parse_groups(items: &[JsonValue]) -> Result<Vec<Group>, QueryError> {
        let mut groups = Vec::new();
        let mut pending = Combinator::And;

        for item in items {
            let node = match item {
                JsonValue::String(word) => {
                    pending = match word.as_str() {
                        "or" => Combinator::Or,
                        "and" => Combinator::And,
                        other => {
                            return Err(QueryError::InvalidQuery(format!(
                                "expected 'and' or 'or' between where groups, got '{other}'"
                            )))
                        }
                    };
                    continue;
                }
                JsonValue::Object(obj) => Where::Clauses(Self::parse_clauses(obj)?),
                JsonValue::Array(nested) => Where::Groups(Self::parse_groups(nested)?),
                other => {
                    return Err(QueryError::InvalidQuery(format!(
                        "where group must be an object or an array, got {}",
                        json_type(other)
                    )))
                }
            };
            groups.push(Group {
                combinator: pending,
                node,
            });
            pending = Combinator::And;
        }

        Ok(groups)
    }

    /// Parse `orderBy`: `"field"`, `["a", "b"]` or `[["a", "DESC"], ["b"]]`
    pub fn parse_order_by(value: &JsonValue) -> Result<Vec<OrderBy>, QueryError> {
        match value {
            JsonValue::String(field) => Ok(vec![OrderBy::asc(field.clone())]),
            JsonValue::Array(items) => {
                // A bare ["field", "DESC"] pair is one key, not two fields
                if let [JsonValue::String(field), JsonValue::String(dir)] = items.as_slice() {
                    if let Ok(direction) = Direction::parse(dir) {
                        return Ok(vec![OrderBy {
                            field: field.clone(),
                            direction,
                        }]);
                    }
                }
                items.iter().map(Self::parse_order_key).collect()
            }
            other => Err(QueryError::InvalidQuery(format!(
                "orderBy must be a string or an array, got {}",
                json_type(other)
            ))),
        }
    }

    fn parse_order_key(item: &JsonValue) -> Result<OrderBy, QueryError> {
        match item {
            JsonValue::String(field) => Ok(OrderBy::asc(field.clone())),
            JsonValue::Array(pair) => match pair.as_slice() {
                [JsonValue::String(field)] => Ok(OrderBy::asc(field.clone())),
                [JsonValue::String(field), JsonValue::String(dir)] => Ok(OrderBy {
                    field: field.clone(),
                    direction: Direction::parse(dir)?,
                }),
                _ => Err(QueryError::InvalidQuery(
                    "orderBy entry must be [field] or [field, direction]".to_string(),
                )),
            },
            other => Err(QueryError::InvalidQuery(format!(
                "orderBy entry must be a string or an array, got {}",
                json_type(other)
            ))),
        }
    }

    fn parse_count(name: &'static str, value: &JsonValue) -> Result<Option<usize>, QueryError> {
        if value.is_null() {
            return Ok(None);
        }
        if let Some(n) = value.as_u64() {
            return Ok(Some(n as usize));
        }
        match value.as_f64() {
            Some(n) if n.is_finite() && n >= 0.0 => Ok(Some(n.trunc() as usize)),
            _ => Err(QueryError::InvalidNumber {
                name,
                value: value.to_string(),
            }),
        }
    }
}

fn json_type(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use serde_json::json;

    fn record(json: JsonValue) -> Record {
        Record::from_json(json).unwrap()
    }

    #[test]
    fn test_parse_where_object() {
        let spec = QueryParser::parse(r#"{"where": {"age": {">": 30}, "name": "bob"}}"#).unwrap();

        assert!(spec.matches(&record(json!({"age": 40, "name": "bob"}))));
        assert!(!spec.matches(&record(json!({"age": 20, "name": "bob"}))));
        assert!(!spec.matches(&record(json!({"age": 40, "name": "ann"}))));
    }

    #[test]
    fn test_parse_or_prefix() {
        let spec = QueryParser::parse_from_value(&json!({
            "where": {"age": {">": 60, "|<": 18}}
        }))
        .unwrap();

        assert!(spec.matches(&record(json!({"age": 70}))));
        assert!(spec.matches(&record(json!({"age": 10}))));
        assert!(!spec.matches(&record(json!({"age": 30}))));
    }

    #[test]
    fn test_parse_where_groups() {
        let spec = QueryParser::parse_from_value(&json!({
            "where": [
                {"role": {"==": "admin"}},
                "or",
                {"age": {">=": 18}, "active": {"==": true}}
            ]
        }))
        .unwrap();

        assert!(spec.matches(&record(json!({"role": "admin", "age": 5}))));
        assert!(spec.matches(&record(json!({"role": "user", "age": 20, "active": true}))));
        assert!(!spec.matches(&record(json!({"role": "user", "age": 20, "active": false}))));
    }

    #[test]
    fn test_implicit_equality() {
        let spec = QueryParser::parse_from_value(&json!({"status": "open", "limit": 2})).unwrap();

        assert!(spec.matches(&record(json!({"status": "open"}))));
        assert!(!spec.matches(&record(json!({"status": "closed"}))));
        assert_eq!(spec.limit, Some(2));
    }

    #[test]
    fn test_implicit_equality_does_not_shadow_where() {
        let spec = QueryParser::parse_from_value(&json!({
            "where": {"age": {">": 10}},
            "age": 99
        }))
        .unwrap();

        assert!(spec.matches(&record(json!({"age": 20}))));
    }

    #[test]
    fn test_implicit_equality_with_group_list() {
        let spec = QueryParser::parse_from_value(&json!({
            "where": [{"age": {">": 10}}],
            "status": "open"
        }))
        .unwrap();

        assert!(spec.matches(&record(json!({"age": 20, "status": "open"}))));
        assert!(!spec.matches(&record(json!({"age": 20, "status": "closed"}))));
    }

    #[test]
    fn test_parse_order_by_forms() {
        let single = QueryParser::parse_order_by(&json!("name")).unwrap();
        assert_eq!(single, vec![OrderBy::asc("name")]);

        let pair = QueryParser::parse_order_by(&json!(["age", "DESC"])).unwrap();
        assert_eq!(pair, vec![OrderBy::desc("age")]);

        let fields = QueryParser::parse_order_by(&json!(["age", "name"])).unwrap();
        assert_eq!(fields, vec![OrderBy::asc("age"), OrderBy::asc("name")]);

        let nested = QueryParser::parse_order_by(&json!([["age", "desc"], ["name"]])).unwrap();
        assert_eq!(nested, vec![OrderBy::desc("age"), OrderBy::asc("name")]);

        assert!(QueryParser::parse_order_by(&json!(5)).is_err());
        assert!(QueryParser::parse_order_by(&json!([["age", "sideways"]])).is_err());
    }

    #[test]
    fn test_sort_and_skip_aliases() {
        let spec = QueryParser::parse_from_value(&json!({"sort": "age", "skip": 3})).unwrap();
        assert_eq!(spec.order_by, vec![OrderBy::asc("age")]);
        assert_eq!(spec.offset, Some(3));
    }

    #[test]
    fn test_invalid_counts() {
        for bad in [json!({"limit": "ten"}), json!({"offset": -1}), json!({"limit": true})] {
            let err = QueryParser::parse_from_value(&bad).unwrap_err();
            assert!(matches!(err, QueryError::InvalidNumber { .. }), "{bad}");
        }
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let err = QueryParser::parse_from_value(&json!({"where": {"a": {"~": 1}}})).unwrap_err();
        assert!(matches!(err, QueryError::UnknownOperator(op) if op == "~"));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(QueryParser::parse("{nope"), Err(QueryError::InvalidJson(_))));
        assert!(matches!(QueryParser::parse("[]"), Err(QueryError::InvalidQuery(_))));
    }
}
