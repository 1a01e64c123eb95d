//! Query Abstract Syntax Tree (AST) definitions
//!
//! A [`QuerySpec`] is the compiled form of the declarative query object:
//! a where-tree folded strictly left to right, a multi-key sort, pagination
//! and the collation locale.

use super::eval::{self, compile_like};
use super::QueryError;
use crate::record::{Record, Value};
use regex::Regex;

/// How a clause or group joins the result accumulated before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Combinator {
    #[default]
    And,
    Or,
}

/// Comparison operator of a where clause
#[derive(Debug, Clone)]
pub enum Operator {
    /// `=` / `==`: loose equality
    Eq,
    /// `===`
    StrictEq,
    /// `!=`
    Ne,
    /// `!==`
    StrictNe,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Contains,
    NotContains,
    IsectEmpty,
    IsectNotEmpty,
    /// `like[flags]` with the pattern compiled up front
    Like(Regex),
    /// `notLike[flags]`
    NotLike(Regex),
}

impl Operator {
    /// Resolve an operator name; LIKE operators compile `predicate` as their pattern
    pub fn parse(name: &str, predicate: &Value) -> Result<Self, QueryError> {
        let op = match name {
            "=" | "==" => Operator::Eq,
            "===" => Operator::StrictEq,
            "!=" => Operator::Ne,
            "!==" => Operator::StrictNe,
            ">" => Operator::Gt,
            ">=" => Operator::Gte,
            "<" => Operator::Lt,
            "<=" => Operator::Lte,
            "in" => Operator::In,
            "notIn" => Operator::NotIn,
            "contains" => Operator::Contains,
            "notContains" => Operator::NotContains,
            "isectEmpty" => Operator::IsectEmpty,
            "isectNotEmpty" => Operator::IsectNotEmpty,
            _ => {
                if let Some(flags) = name.strip_prefix("notLike") {
                    Operator::NotLike(compile_like(like_pattern(predicate)?, flags)?)
                } else if let Some(flags) = name.strip_prefix("like") {
                    Operator::Like(compile_like(like_pattern(predicate)?, flags)?)
                } else {
                    return Err(QueryError::UnknownOperator(name.to_string()));
                }
            }
        };
        Ok(op)
    }

    /// Apply the operator to a field value (None when the field is missing)
    pub fn evaluate(&self, value: Option<&Value>, predicate: &Value) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Operator::Eq => eval::loose_eq(value, predicate),
            Operator::StrictEq => eval::strict_eq(value, predicate),
            Operator::Ne => !eval::loose_eq(value, predicate),
            Operator::StrictNe => !eval::strict_eq(value, predicate),
            Operator::Gt => matches!(eval::loose_cmp(value, predicate), Some(Greater)),
            Operator::Gte => matches!(eval::loose_cmp(value, predicate), Some(Greater | Equal)),
            Operator::Lt => matches!(eval::loose_cmp(value, predicate), Some(Less)),
            Operator::Lte => matches!(eval::loose_cmp(value, predicate), Some(Less | Equal)),
            Operator::In => eval::is_in(value, predicate),
            Operator::NotIn => !eval::is_in(value, predicate),
            Operator::Contains => eval::contains(value, predicate),
            Operator::NotContains => !eval::contains(value, predicate),
            Operator::IsectEmpty => !eval::intersects(value, predicate),
            Operator::IsectNotEmpty => eval::intersects(value, predicate),
            Operator::Like(re) => eval::like_text(value).is_some_and(|s| re.is_match(&s)),
            Operator::NotLike(re) => !eval::like_text(value).is_some_and(|s| re.is_match(&s)),
        }
    }
}

fn like_pattern(predicate: &Value) -> Result<&str, QueryError> {
    predicate.as_str().ok_or_else(|| {
        QueryError::InvalidQuery(format!(
            "like pattern must be a string, got {}",
            predicate.type_name()
        ))
    })
}

/// One `field op predicate` test
#[derive(Debug, Clone)]
pub struct Clause {
    pub field: String,
    pub op: Operator,
    pub predicate: Value,
    pub combinator: Combinator,
}

impl Clause {
    /// Build a clause from an operator name; a leading `|` makes it OR with the clause before it
    pub fn new(field: impl Into<String>, op: &str, predicate: impl Into<Value>) -> Result<Self, QueryError> {
        let predicate = predicate.into();
        let (combinator, name) = match op.strip_prefix('|') {
            Some(name) => (Combinator::Or, name),
            None => (Combinator::And, op),
        };
        Ok(Self {
            field: field.into(),
            op: Operator::parse(name, &predicate)?,
            predicate,
            combinator,
        })
    }

    pub fn test(&self, record: &Record) -> bool {
        self.op.evaluate(record.get_by_path(&self.field), &self.predicate)
    }
}

/// A nested where-tree entry
#[derive(Debug, Clone)]
pub struct Group {
    pub combinator: Combinator,
    pub node: Where,
}

/// Filter tree
///
/// Evaluation is a strict left-to-right fold: the first entry seeds the
/// result, every later entry is AND-ed or OR-ed into it according to its own
/// combinator. There is no precedence between AND and OR.
#[derive(Debug, Clone)]
pub enum Where {
    /// Clauses of one object
    Clauses(Vec<Clause>),
    /// Groups of a list, each evaluated on its own before being folded in
    Groups(Vec<Group>),
}

impl Where {
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Where::Clauses(clauses) => fold(clauses.iter().map(|c| (c.combinator, c.test(record)))),
            Where::Groups(groups) => fold(groups.iter().map(|g| (g.combinator, g.node.matches(record)))),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Where::Clauses(clauses) => clauses.is_empty(),
            Where::Groups(groups) => groups.is_empty(),
        }
    }
}

fn fold(results: impl Iterator<Item = (Combinator, bool)>) -> bool {
    let mut keep = true;
    for (i, (combinator, result)) in results.enumerate() {
        keep = if i == 0 {
            result
        } else {
            match combinator {
                Combinator::And => keep && result,
                Combinator::Or => keep || result,
            }
        };
    }
    keep
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn parse(s: &str) -> Result<Self, QueryError> {
        match s.to_ascii_uppercase().as_str() {
            "ASC" => Ok(Direction::Asc),
            "DESC" => Ok(Direction::Desc),
            _ => Err(QueryError::InvalidQuery(format!("unknown sort direction '{s}'"))),
        }
    }
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

/// Compiled query: filter, sort, skip, limit
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    pub filter: Option<Where>,
    pub order_by: Vec<OrderBy>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
    pub locale: Option<String>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a clause AND-ed onto the filter
    pub fn and(self, field: &str, op: &str, predicate: impl Into<Value>) -> Result<Self, QueryError> {
        Ok(self.push_clause(Clause::new(field, op, predicate)?))
    }

    /// Append a clause OR-ed onto the filter
    pub fn or(self, field: &str, op: &str, predicate: impl Into<Value>) -> Result<Self, QueryError> {
        let mut clause = Clause::new(field, op, predicate)?;
        clause.combinator = Combinator::Or;
        Ok(self.push_clause(clause))
    }

    /// Shorthand for an `==` clause
    pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
        let clause = Clause {
            field: field.to_string(),
            op: Operator::Eq,
            predicate: value.into(),
            combinator: Combinator::And,
        };
        self.push_clause(clause)
    }

    fn push_clause(mut self, clause: Clause) -> Self {
        match &mut self.filter {
            None => self.filter = Some(Where::Clauses(vec![clause])),
            Some(Where::Clauses(clauses)) => clauses.push(clause),
            Some(Where::Groups(groups)) => groups.push(Group {
                combinator: clause.combinator,
                node: Where::Clauses(vec![clause]),
            }),
        }
        self
    }

    pub fn filter(mut self, filter: Where) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Check whether a record passes the filter
    pub fn matches(&self, record: &Record) -> bool {
        self.filter.as_ref().map_or(true, |w| w.matches(record))
    }
}
