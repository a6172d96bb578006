// src/backend/query.rs

//! Table query builder.
//!
//! A [`Query`] describes one table read (or the row set targeted by an update
//! or delete). The REST backend renders it to PostgREST query parameters; the
//! memory backend evaluates the same filters directly against JSON rows.

use std::cmp::Ordering;

use serde_json::Value;

/// A row predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `column = value`
    Eq(String, Value),
    /// `column IN (values)`
    In(String, Vec<Value>),
    /// `column >= value`
    Gte(String, Value),
    /// Case-insensitive substring match
    ILike(String, String),
    /// Array column contains every listed element
    ContainsAll(String, Vec<String>),
    /// Array column shares at least one element with the list
    Overlaps(String, Vec<String>),
    /// Any of the nested filters holds
    Or(Vec<Filter>),
}

impl Filter {
    /// Render as a `(name, value)` query parameter.
    fn to_param(&self) -> (String, String) {
        match self {
            Filter::Or(filters) => {
                let inner: Vec<String> = filters.iter().map(Filter::to_nested).collect();
                ("or".to_string(), format!("({})", inner.join(",")))
            }
            other => {
                let (column, op) = other.column_and_operator(false);
                (column.to_string(), op)
            }
        }
    }

    /// Render inside an `or=(...)` group: `column.op.value`.
    fn to_nested(&self) -> String {
        match self {
            Filter::Or(filters) => {
                let inner: Vec<String> = filters.iter().map(Filter::to_nested).collect();
                format!("or({})", inner.join(","))
            }
            other => {
                let (column, op) = other.column_and_operator(true);
                format!("{column}.{op}")
            }
        }
    }

    /// Column name and `op.value` text. Inside an `or` group scalar values
    /// must be quoted too, since the group itself is comma separated.
    fn column_and_operator(&self, nested: bool) -> (&str, String) {
        let scalar = |value: String| if nested { quote(&value) } else { value };
        match self {
            Filter::Eq(column, value) => (
                column.as_str(),
                format!("eq.{}", scalar(value_text(value))),
            ),
            Filter::Gte(column, value) => (
                column.as_str(),
                format!("gte.{}", scalar(value_text(value))),
            ),
            Filter::ILike(column, term) => (
                column.as_str(),
                format!("ilike.{}", scalar(format!("*{term}*"))),
            ),
            Filter::In(column, values) => {
                let items: Vec<String> = values.iter().map(|v| quote(&value_text(v))).collect();
                (column.as_str(), format!("in.({})", items.join(",")))
            }
            Filter::ContainsAll(column, items) => {
                (column.as_str(), format!("cs.{}", array_literal(items)))
            }
            Filter::Overlaps(column, items) => {
                (column.as_str(), format!("ov.{}", array_literal(items)))
            }
            Filter::Or(_) => ("or", String::new()),
        }
    }

    /// Evaluate against a JSON row.
    pub fn matches(&self, row: &Value) -> bool {
        let field = |column: &str| row.get(column).unwrap_or(&Value::Null);
        match self {
            Filter::Eq(column, value) => loosely_equal(field(column), value),
            Filter::In(column, values) => {
                let actual = field(column);
                values.iter().any(|v| loosely_equal(actual, v))
            }
            Filter::Gte(column, value) => {
                let actual = field(column);
                !actual.is_null() && compare_values(actual, value) != Ordering::Less
            }
            Filter::ILike(column, term) => field(column)
                .as_str()
                .is_some_and(|text| text.to_lowercase().contains(&term.to_lowercase())),
            Filter::ContainsAll(column, items) => {
                let present = string_array(field(column));
                items.iter().all(|item| present.contains(&item.as_str()))
            }
            Filter::Overlaps(column, items) => {
                let present = string_array(field(column));
                items.iter().any(|item| present.contains(&item.as_str()))
            }
            Filter::Or(filters) => filters.iter().any(|f| f.matches(row)),
        }
    }
}

/// One ordering term. Nulls always sort last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// A table query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub table: String,
    /// Comma separated projection; `None` selects every column
    pub columns: Option<String>,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Query {
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            table: name.into(),
            ..Self::default()
        }
    }

    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.columns = Some(columns.into());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(column.into(), value.into()))
    }

    pub fn in_list<V: Into<Value>>(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.filter(Filter::In(column.into(), values))
    }

    pub fn gte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Gte(column.into(), value.into()))
    }

    pub fn ilike(self, column: impl Into<String>, term: impl Into<String>) -> Self {
        self.filter(Filter::ILike(column.into(), term.into()))
    }

    pub fn contains_all(self, column: impl Into<String>, items: &[String]) -> Self {
        self.filter(Filter::ContainsAll(column.into(), items.to_vec()))
    }

    pub fn overlaps(self, column: impl Into<String>, items: &[String]) -> Self {
        self.filter(Filter::Overlaps(column.into(), items.to_vec()))
    }

    pub fn or(self, filters: Vec<Filter>) -> Self {
        self.filter(Filter::Or(filters))
    }

    pub fn order_desc(mut self, column: impl Into<String>) -> Self {
        self.order.push(Order {
            column: column.into(),
            ascending: false,
        });
        self
    }

    pub fn order_asc(mut self, column: impl Into<String>) -> Self {
        self.order.push(Order {
            column: column.into(),
            ascending: true,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Render as PostgREST query parameters.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(columns) = &self.columns {
            params.push(("select".to_string(), columns.clone()));
        }
        params.extend(self.filters.iter().map(Filter::to_param));
        if !self.order.is_empty() {
            let terms: Vec<String> = self
                .order
                .iter()
                .map(|o| {
                    let direction = if o.ascending { "asc" } else { "desc" };
                    format!("{}.{direction}.nullslast", o.column)
                })
                .collect();
            params.push(("order".to_string(), terms.join(",")));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            params.push(("offset".to_string(), offset.to_string()));
        }
        params
    }

    /// Whether a row satisfies every filter.
    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// Compare two rows by the ordering terms, nulls last.
    pub fn compare_rows(&self, a: &Value, b: &Value) -> Ordering {
        for term in &self.order {
            let left = a.get(&term.column).unwrap_or(&Value::Null);
            let right = b.get(&term.column).unwrap_or(&Value::Null);
            let ordering = match (left.is_null(), right.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => {
                    let ord = compare_values(left, right);
                    if term.ascending { ord } else { ord.reverse() }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

/// Plain text form of a scalar value.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Double-quote values that contain PostgREST reserved characters.
fn quote(value: &str) -> String {
    if value.contains([',', '.', ':', '(', ')', '"', '\\', '{', '}']) || value.contains(' ') {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\"")
    } else {
        value.to_string()
    }
}

/// Postgres array literal: `{a,"b c"}`.
fn array_literal(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|item| quote(item)).collect();
    format!("{{{}}}", quoted.join(","))
}

fn string_array(value: &Value) -> Vec<&str> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

/// Equality that tolerates `"3"` vs `3`, matching how filter values travel
/// as text in a query string.
fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (a, b) if a == b => true,
        (a, b) => value_text(a) == value_text(b),
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => match (a, b) {
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => value_text(a).cmp(&value_text(b)),
        },
    }
}
