//! Compiler for the `where` / `where_document` filter language.
//!
//! An expression is parsed once into a [`Filter`] tree, with regex operands
//! compiled up front, and then evaluated against each candidate record.
//! Evaluation is fail-closed: an unknown operator, a missing field or an
//! operand of an incomparable type excludes the record instead of raising.
//! Use [`Filter::validate`] to surface those problems to a caller.
//!
//! ```text
//! {"lang": "en"}                               equality
//! {"year": {"$gte": 2020, "$lt": 2024}}        every operator must hold
//! {"tag": {"$in": ["a", "b"]}}                 membership
//! {"$or": [{"lang": "en"}, {"lang": "de"}]}    composition, nests freely
//! ```
//!
//! `where_document` expressions apply the same operators to the chunk text,
//! exposed as a single synthetic field named `document`.

use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;
use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::types::{Chunk, MetaValue, Metadata};

/// Name of the synthetic field `where_document` expressions are evaluated on.
pub const DOCUMENT_FIELD: &str = "document";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    fn holds(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Gte => ord != Ordering::Less,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Lte => ord != Ordering::Greater,
        }
    }
}

/// A single test applied to one field value.
#[derive(Debug, Clone)]
pub enum Condition {
    Eq(Value),
    In(Vec<Value>),
    Compare(CompareOp, Value),
    /// Searched (unanchored) in the stringified field value.
    Regex(Regex),
    /// Substring of the stringified field value.
    Contains(String),
    /// Unknown operator or malformed operand; never holds.
    Invalid(String),
}

/// A compiled filter expression.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Absent or empty expression.
    All,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Field { name: String, conditions: Vec<Condition> },
    /// Unrecognized expression shape; never matches.
    Invalid(String),
}

impl Filter {
    /// Compile a metadata (`where`) expression.
    pub fn compile(expr: Option<&Value>) -> Self {
        match expr {
            None | Some(Value::Null) => Filter::All,
            Some(expr) => Self::parse(expr),
        }
    }

    /// Compile a document-text (`where_document`) expression.
    pub fn compile_document(expr: Option<&Value>) -> Self {
        match expr {
            None | Some(Value::Null) => Filter::All,
            Some(expr) => Self::parse_document(expr),
        }
    }

    fn parse(expr: &Value) -> Self {
        let Value::Object(map) = expr else {
            return Filter::Invalid(format!("expected an object, got {expr}"));
        };
        if map.is_empty() {
            return Filter::All;
        }
        if let Some(branches) = map.get("$and") {
            return combine(branches, "$and", Self::parse, Filter::And);
        }
        if let Some(branches) = map.get("$or") {
            return combine(branches, "$or", Self::parse, Filter::Or);
        }
        let mut fields: Vec<Filter> = map
            .iter()
            .map(|(key, cond)| {
                if key.starts_with('$') {
                    Filter::Invalid(format!("unknown operator '{key}'"))
                } else {
                    Filter::Field { name: key.clone(), conditions: parse_conditions(cond) }
                }
            })
            .collect();
        if fields.len() == 1 { fields.remove(0) } else { Filter::And(fields) }
    }

    fn parse_document(expr: &Value) -> Self {
        let Value::Object(map) = expr else {
            return Filter::Invalid(format!("expected an object, got {expr}"));
        };
        if map.is_empty() {
            return Filter::All;
        }
        if let Some(branches) = map.get("$and") {
            return combine(branches, "$and", Self::parse_document, Filter::And);
        }
        if let Some(branches) = map.get("$or") {
            return combine(branches, "$or", Self::parse_document, Filter::Or);
        }
        Filter::Field { name: DOCUMENT_FIELD.to_string(), conditions: parse_conditions(expr) }
    }

    pub fn matches(&self, metadata: &Metadata) -> bool { self.eval(metadata) }

    pub fn matches_document(&self, text: &str) -> bool { self.eval(&DocumentText(text)) }

    fn eval<F: Fields + ?Sized>(&self, record: &F) -> bool {
        match self {
            Filter::All => true,
            Filter::Invalid(_) => false,
            Filter::And(filters) => filters.iter().all(|f| f.eval(record)),
            Filter::Or(filters) => filters.iter().any(|f| f.eval(record)),
            Filter::Field { name, conditions } => match record.field(name) {
                Some(value) => conditions.iter().all(|c| c.test(value)),
                None => false,
            },
        }
    }

    /// Human-readable descriptions of every part that can never match.
    pub fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_problems(&mut out);
        out
    }

    fn collect_problems(&self, out: &mut Vec<String>) {
        match self {
            Filter::All => {}
            Filter::Invalid(msg) => out.push(msg.clone()),
            Filter::And(filters) | Filter::Or(filters) => filters.iter().for_each(|f| f.collect_problems(out)),
            Filter::Field { name, conditions } => {
                for c in conditions {
                    if let Condition::Invalid(msg) = c {
                        out.push(format!("{name}: {msg}"));
                    }
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let problems = self.problems();
        if problems.is_empty() { Ok(()) } else { Err(Error::InvalidQuery(problems.join("; "))) }
    }
}

fn combine(branches: &Value, op: &str, parse: fn(&Value) -> Filter, build: fn(Vec<Filter>) -> Filter) -> Filter {
    match branches {
        Value::Array(items) => build(items.iter().map(parse).collect()),
        _ => Filter::Invalid(format!("'{op}' expects an array")),
    }
}

fn parse_conditions(cond: &Value) -> Vec<Condition> {
    match cond {
        Value::Object(ops) => ops.iter().map(|(op, operand)| parse_operator(op, operand)).collect(),
        other => vec![Condition::Eq(other.clone())],
    }
}

fn parse_operator(op: &str, operand: &Value) -> Condition {
    match op {
        "$in" => match operand {
            Value::Array(items) => Condition::In(items.clone()),
            _ => Condition::Invalid("'$in' expects an array".to_string()),
        },
        "$gt" => Condition::Compare(CompareOp::Gt, operand.clone()),
        "$gte" => Condition::Compare(CompareOp::Gte, operand.clone()),
        "$lt" => Condition::Compare(CompareOp::Lt, operand.clone()),
        "$lte" => Condition::Compare(CompareOp::Lte, operand.clone()),
        "$regex" => {
            let pattern = operand_text(operand);
            match Regex::new(&pattern) {
                Ok(re) => Condition::Regex(re),
                Err(e) => Condition::Invalid(format!("bad '$regex' pattern '{pattern}': {e}")),
            }
        }
        "$contains" => Condition::Contains(operand_text(operand).into_owned()),
        other => Condition::Invalid(format!("unknown operator '{other}'")),
    }
}

fn operand_text(operand: &Value) -> Cow<'_, str> {
    match operand {
        Value::String(s) => Cow::Borrowed(s),
        other => Cow::Owned(other.to_string()),
    }
}

impl Condition {
    fn test(&self, field: FieldRef<'_>) -> bool {
        match self {
            Condition::Eq(operand) => field.equals(operand),
            Condition::In(options) => options.iter().any(|o| field.equals(o)),
            Condition::Compare(op, operand) => field.compare(operand).is_some_and(|ord| op.holds(ord)),
            Condition::Regex(re) => re.is_match(&field.text()),
            Condition::Contains(needle) => field.text().contains(needle.as_str()),
            Condition::Invalid(_) => false,
        }
    }
}

#[derive(Clone, Copy)]
enum FieldRef<'a> {
    Meta(&'a MetaValue),
    Text(&'a str),
}

impl<'a> FieldRef<'a> {
    fn text(self) -> Cow<'a, str> {
        match self {
            FieldRef::Meta(MetaValue::Str(s)) => Cow::Borrowed(s.as_str()),
            FieldRef::Meta(other) => Cow::Owned(other.to_string()),
            FieldRef::Text(s) => Cow::Borrowed(s),
        }
    }

    fn equals(self, operand: &Value) -> bool {
        match self {
            FieldRef::Meta(v) => meta_eq(v, operand),
            FieldRef::Text(s) => operand.as_str() == Some(s),
        }
    }

    fn compare(self, operand: &Value) -> Option<Ordering> {
        match self {
            FieldRef::Meta(v) => meta_cmp(v, operand),
            FieldRef::Text(s) => operand.as_str().map(|o| s.cmp(o)),
        }
    }
}

trait Fields {
    fn field(&self, name: &str) -> Option<FieldRef<'_>>;
}

impl Fields for Metadata {
    fn field(&self, name: &str) -> Option<FieldRef<'_>> {
        self.get(name).filter(|v| !matches!(v, MetaValue::Null)).map(FieldRef::Meta)
    }
}

struct DocumentText<'a>(&'a str);

impl Fields for DocumentText<'_> {
    fn field(&self, name: &str) -> Option<FieldRef<'_>> { (name == DOCUMENT_FIELD).then_some(FieldRef::Text(self.0)) }
}

fn meta_eq(value: &MetaValue, operand: &Value) -> bool {
    match (value, operand) {
        (MetaValue::Bool(a), Value::Bool(b)) => a == b,
        (MetaValue::Int(a), Value::Number(n)) => match n.as_i64() {
            Some(b) => *a == b,
            None => n.as_f64() == Some(*a as f64),
        },
        (MetaValue::Float(a), Value::Number(n)) => n.as_f64() == Some(*a),
        (MetaValue::Str(a), Value::String(b)) => a == b,
        (MetaValue::List(items), Value::Array(others)) => {
            items.len() == others.len() && items.iter().zip(others).all(|(a, b)| meta_eq(a, b))
        }
        _ => false,
    }
}

fn meta_cmp(value: &MetaValue, operand: &Value) -> Option<Ordering> {
    match (value, operand) {
        (MetaValue::Int(a), Value::Number(n)) if n.is_i64() => n.as_i64().map(|b| a.cmp(&b)),
        (MetaValue::Int(_) | MetaValue::Float(_), Value::Number(n)) => value.as_f64()?.partial_cmp(&n.as_f64()?),
        (MetaValue::Str(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
        (MetaValue::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// The `where` and `where_document` predicates of one query, compiled once
/// and shared by every backend the query fans out to.
#[derive(Debug, Clone)]
pub struct QueryFilter {
    pub metadata: Filter,
    pub document: Filter,
}

impl Default for QueryFilter {
    fn default() -> Self { Self { metadata: Filter::All, document: Filter::All } }
}

impl QueryFilter {
    pub fn compile(where_filter: Option<&Value>, where_document: Option<&Value>) -> Self {
        Self { metadata: Filter::compile(where_filter), document: Filter::compile_document(where_document) }
    }

    pub fn accepts(&self, chunk: &Chunk) -> bool {
        self.metadata.matches(&chunk.metadata) && self.document.matches_document(&chunk.text)
    }

    pub fn validate(&self) -> Result<()> {
        let mut problems = self.metadata.problems();
        problems.extend(self.document.problems().into_iter().map(|p| format!("where_document: {p}")));
        if problems.is_empty() { Ok(()) } else { Err(Error::InvalidQuery(problems.join("; "))) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: Value) -> Metadata { serde_json::from_value(value).unwrap() }

    fn matches(expr: Value, record: Value) -> bool { Filter::compile(Some(&expr)).matches(&meta(record)) }

    #[test]
    fn absent_or_empty_expression_matches_everything() {
        assert!(Filter::compile(None).matches(&Metadata::new()));
        assert!(Filter::compile(Some(&Value::Null)).matches(&Metadata::new()));
        assert!(matches(json!({}), json!({"a": 1})));
    }

    #[test]
    fn equality_on_scalars() {
        assert!(matches(json!({"lang": "en"}), json!({"lang": "en"})));
        assert!(!matches(json!({"lang": "en"}), json!({"lang": "de"})));
        assert!(matches(json!({"n": 2}), json!({"n": 2})));
        assert!(matches(json!({"n": 2.0}), json!({"n": 2})));
        assert!(matches(json!({"ok": true}), json!({"ok": true})));
        assert!(!matches(json!({"n": "2"}), json!({"n": 2})));
    }

    #[test]
    fn multiple_fields_are_conjunctive() {
        let expr = json!({"lang": "en", "year": 2020});
        assert!(matches(expr.clone(), json!({"lang": "en", "year": 2020})));
        assert!(!matches(expr, json!({"lang": "en", "year": 2021})));
    }

    #[test]
    fn ordering_operators() {
        let rec = json!({"year": 2021, "score": 0.5, "name": "m"});
        assert!(matches(json!({"year": {"$gt": 2020}}), rec.clone()));
        assert!(matches(json!({"year": {"$gte": 2021, "$lte": 2021}}), rec.clone()));
        assert!(!matches(json!({"year": {"$lt": 2021}}), rec.clone()));
        assert!(matches(json!({"score": {"$lt": 0.75}}), rec.clone()));
        assert!(matches(json!({"name": {"$gt": "a", "$lt": "z"}}), rec));
    }

    #[test]
    fn membership_regex_and_contains() {
        let rec = json!({"tag": "b", "path": "docs/2024/report.pdf", "year": 2024});
        assert!(matches(json!({"tag": {"$in": ["a", "b"]}}), rec.clone()));
        assert!(!matches(json!({"tag": {"$in": ["x"]}}), rec.clone()));
        assert!(matches(json!({"path": {"$regex": r"\d{4}/report"}}), rec.clone()));
        assert!(matches(json!({"path": {"$contains": ".pdf"}}), rec.clone()));
        assert!(matches(json!({"year": {"$contains": 202}}), rec));
    }

    #[test]
    fn null_fields_never_match() {
        let rec = json!({"author": null});
        assert!(!matches(json!({"author": null}), rec.clone()));
        assert!(!matches(json!({"author": {"$regex": ".*"}}), rec.clone()));
        assert!(!matches(json!({"author": {"$contains": ""}}), rec.clone()));
        assert!(!matches(json!({"author": {}}), rec));
    }

    #[test]
    fn composites_nest() {
        let expr = json!({"$or": [
            {"$and": [{"lang": "en"}, {"year": {"$gte": 2020}}]},
            {"tag": "pinned"}
        ]});
        assert!(matches(expr.clone(), json!({"lang": "en", "year": 2022})));
        assert!(matches(expr.clone(), json!({"tag": "pinned"})));
        assert!(!matches(expr, json!({"lang": "en", "year": 2019})));
        assert!(matches(json!({"$and": []}), json!({})));
        assert!(!matches(json!({"$or": []}), json!({})));
    }

    #[test]
    fn fails_closed_instead_of_raising() {
        let rec = json!({"year": 2021, "lang": "en"});
        assert!(!matches(json!({"year": {"$near": 2021}}), rec.clone()));
        assert!(!matches(json!({"missing": "x"}), rec.clone()));
        assert!(!matches(json!({"missing": {"$contains": "x"}}), rec.clone()));
        assert!(!matches(json!({"lang": {"$gt": 3}}), rec.clone()));
        assert!(!matches(json!({"$not": {"lang": "en"}}), rec.clone()));
        assert!(!matches(json!({"lang": {"$regex": "("}}), rec.clone()));
        assert!(!matches(json!({"$and": {"lang": "en"}}), rec.clone()));
        assert!(!matches(json!(["lang"]), rec));
    }

    #[test]
    fn validate_reports_what_fails_closed() {
        let filter = Filter::compile(Some(&json!({"$or": [{"a": {"$near": 1}}, {"b": {"$regex": "("}}]})));
        let problems = filter.problems();
        assert_eq!(problems.len(), 2, "{problems:?}");
        assert!(problems[0].contains("$near"));
        assert!(filter.validate().is_err());
        assert!(Filter::compile(Some(&json!({"a": {"$in": [1, 2]}}))).validate().is_ok());
    }

    #[test]
    fn document_filters_see_text_as_document_field() {
        let contains = Filter::compile_document(Some(&json!({"$contains": "banana"})));
        assert!(contains.matches_document("apple banana"));
        assert!(!contains.matches_document("apple cherry"));

        let regex = Filter::compile_document(Some(&json!({"$regex": "^apple"})));
        assert!(regex.matches_document("apple pie"));
        assert!(!regex.matches_document("big apple"));

        let both = Filter::compile_document(Some(&json!({"$and": [{"$contains": "a"}, {"$contains": "z"}]})));
        assert!(both.matches_document("a to z"));
        assert!(!both.matches_document("a to b"));

        assert!(!Filter::compile_document(Some(&json!({"$near": "x"}))).matches_document("x"));
    }

    #[test]
    fn query_filter_applies_both_predicates() {
        let filter = QueryFilter::compile(Some(&json!({"lang": "en"})), Some(&json!({"$contains": "fire"})));
        let yes = Chunk::new("1", "d", "campfire basics").with_meta("lang", "en");
        let wrong_lang = Chunk::new("2", "d", "campfire basics").with_meta("lang", "de");
        let wrong_text = Chunk::new("3", "d", "water").with_meta("lang", "en");
        assert!(filter.accepts(&yes));
        assert!(!filter.accepts(&wrong_lang));
        assert!(!filter.accepts(&wrong_text));
        assert!(QueryFilter::default().accepts(&wrong_text));
    }
}
