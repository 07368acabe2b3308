//! Filtering, sorting and pagination over search results.

use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::ops::ControlFlow;

/// Multi-field sort order.
///
/// Fields are compared in the order they were added. A weight of -1 or
/// lower sorts that field descending; anything else ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    fields: Vec<(String, i32)>,
}

impl SortSpec {
    /// Creates an empty sort order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorts by `field` ascending.
    #[must_use]
    pub fn asc(self, field: impl Into<String>) -> Self {
        self.by(field, 1)
    }

    /// Sorts by `field` descending.
    #[must_use]
    pub fn desc(self, field: impl Into<String>) -> Self {
        self.by(field, -1)
    }

    /// Sorts by `field` with an explicit weight.
    #[must_use]
    pub fn by(mut self, field: impl Into<String>, weight: i32) -> Self {
        self.fields.push((field.into(), weight));
        self
    }

    /// The fields and weights, in comparison order.
    #[must_use]
    pub fn fields(&self) -> &[(String, i32)] {
        &self.fields
    }

    /// Compares two records field by field.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        for (field, weight) in &self.fields {
            let ord = compare_values(a.get(field), b.get(field));
            let ord = if *weight <= -1 { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// Skip, limit and sort applied by `filter` and `filter_by_index`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    /// Maximum number of results; `None` returns everything.
    pub limit: Option<usize>,
    /// Number of leading results to drop.
    pub skip: usize,
    /// Result order; `None` keeps scan order.
    pub sort: Option<SortSpec>,
}

impl FilterOptions {
    /// Creates options that return every match in scan order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the number of results.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Drops the first `skip` results.
    #[must_use]
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Sorts the results.
    #[must_use]
    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }
}

fn kind_rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Bool(_)) => 2,
        Some(Value::Number(_)) => 3,
        Some(Value::String(_)) => 4,
        Some(Value::Array(_)) => 5,
        Some(Value::Object(_)) => 6,
    }
}

/// Orders two field values. Missing sorts first, then null, booleans,
/// numbers, strings, arrays and objects; arrays and objects compare by
/// their JSON text.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .unwrap_or(0.0)
                .total_cmp(&y.as_f64().unwrap_or(0.0)),
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x @ (Value::Array(_) | Value::Object(_))), Some(y))
            if kind_rank(Some(x)) == kind_rank(Some(y)) =>
        {
            x.to_string().cmp(&y.to_string())
        }
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

/// Collects matches under skip/limit/sort.
///
/// Unsorted, it counts past `skip` and stops once `limit` results are in.
/// Sorted, it keeps a buffer ordered by insertion, bounded by
/// `skip + limit`, and slices it at the end. Equal keys keep scan order.
#[derive(Debug)]
pub(crate) struct Collector {
    options: FilterOptions,
    seen: usize,
    results: Vec<Value>,
}

impl Collector {
    pub fn new(options: FilterOptions) -> Self {
        Self {
            options,
            seen: 0,
            results: Vec::new(),
        }
    }

    pub fn offer(&mut self, value: &Value) -> ControlFlow<()> {
        let limit = self.options.limit.unwrap_or(usize::MAX);
        if limit == 0 {
            return ControlFlow::Break(());
        }
        match &self.options.sort {
            None => {
                self.seen += 1;
                if self.seen <= self.options.skip {
                    return ControlFlow::Continue(());
                }
                self.results.push(value.clone());
                if self.results.len() >= limit {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
            Some(sort) => {
                let at = self
                    .results
                    .partition_point(|r| sort.compare(r, value) != Ordering::Greater);
                let cap = self.options.skip.saturating_add(limit);
                if at < cap {
                    self.results.insert(at, value.clone());
                    self.results.truncate(cap);
                }
                ControlFlow::Continue(())
            }
        }
    }

    pub fn finish(self) -> Vec<Value> {
        match self.options.sort {
            None => self.results,
            Some(_) => {
                let limit = self.options.limit.unwrap_or(usize::MAX);
                self.results
                    .into_iter()
                    .skip(self.options.skip)
                    .take(limit)
                    .collect()
            }
        }
    }
}

/// Shallow merge of `patch` into `record`; patch fields win.
pub(crate) fn merge(record: &Value, patch: &Map<String, Value>) -> Value {
    let mut merged = match record {
        Value::Object(fields) => fields.clone(),
        _ => Map::new(),
    };
    for (key, value) in patch {
        merged.insert(key.clone(), value.clone());
    }
    Value::Object(merged)
}
