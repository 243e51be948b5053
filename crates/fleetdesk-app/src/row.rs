// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use time::Date;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

use crate::{Collection, ColumnSpec, DocumentId, Fallback, FieldKind, MutationKey, RowId};

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Date(Date),
    Placeholder(&'static str),
}

impl CellValue {
    pub fn display(&self) -> String {
        match self {
            Self::Text(value) => value.clone(),
            Self::Number(value) => format_number(*value),
            Self::Bool(true) => "yes".to_owned(),
            Self::Bool(false) => "no".to_owned(),
            Self::Date(value) => value.to_string(),
            Self::Placeholder(text) => (*text).to_owned(),
        }
    }

    pub const fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder(_))
    }

    pub fn cmp_value(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(left), Self::Number(right)) => left.total_cmp(right),
            (Self::Date(left), Self::Date(right)) => left.cmp(right),
            (Self::Bool(left), Self::Bool(right)) => left.cmp(right),
            (Self::Text(left), Self::Text(right)) => left.to_lowercase().cmp(&right.to_lowercase()),
            _ => self
                .display()
                .to_lowercase()
                .cmp(&other.display().to_lowercase()),
        }
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowRecord {
    pub id: RowId,
    pub document_id: Option<DocumentId>,
    pub fields: BTreeMap<String, CellValue>,
    pub source: Map<String, Value>,
}

impl RowRecord {
    pub fn field(&self, key: &str) -> Option<&CellValue> {
        self.fields.get(key)
    }

    pub fn display(&self, key: &str) -> String {
        self.fields
            .get(key)
            .map(CellValue::display)
            .unwrap_or_default()
    }

    pub fn remote_key(&self, collection: Collection) -> String {
        match (collection.mutation_key(), &self.document_id) {
            (MutationKey::DocumentId, Some(document_id)) => document_id.to_string(),
            _ => self.id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizeIssue {
    #[error("record #{index} is not a JSON object; skipped")]
    NotAnObject { index: usize },
    #[error("record #{index} has no usable id; skipped")]
    MissingId { index: usize },
    #[error("record #{index} repeats id {id}; kept the first occurrence")]
    DuplicateId { index: usize, id: RowId },
    #[error("record {id} field {column}: cannot read {raw} as {expected}")]
    Coerced {
        id: RowId,
        column: &'static str,
        raw: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedBatch {
    pub rows: Vec<RowRecord>,
    pub issues: Vec<NormalizeIssue>,
}

// Malformed records are skipped; they never fail the batch.
pub fn normalize_rows(collection: Collection, records: Vec<Value>) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();
    let mut seen = BTreeSet::new();

    for (index, record) in records.into_iter().enumerate() {
        match normalize_record(collection, index, record) {
            Ok((row, issues)) => {
                batch.issues.extend(issues);
                if !seen.insert(row.id) {
                    batch.issues.push(NormalizeIssue::DuplicateId { index, id: row.id });
                    continue;
                }
                batch.rows.push(row);
            }
            Err(issue) => batch.issues.push(issue),
        }
    }

    for issue in &batch.issues {
        tracing::warn!(collection = collection.as_str(), "{issue}");
    }
    batch
}

pub fn normalize_record(
    collection: Collection,
    index: usize,
    record: Value,
) -> Result<(RowRecord, Vec<NormalizeIssue>), NormalizeIssue> {
    let Value::Object(source) = record else {
        return Err(NormalizeIssue::NotAnObject { index });
    };
    let id = source
        .get("id")
        .and_then(read_id)
        .ok_or(NormalizeIssue::MissingId { index })?;
    let document_id = source.get("documentId").and_then(read_document_id);

    let mut issues = Vec::new();
    let fields = collection
        .columns()
        .iter()
        .map(|column| {
            let value = normalize_field(column, &source, id, &mut issues);
            (column.key.to_owned(), value)
        })
        .collect();

    Ok((
        RowRecord {
            id,
            document_id,
            fields,
            source,
        },
        issues,
    ))
}

fn read_id(value: &Value) -> Option<RowId> {
    match value {
        Value::Number(number) => number.as_i64().map(RowId::new),
        Value::String(text) => text.trim().parse::<i64>().ok().map(RowId::new),
        _ => None,
    }
}

fn read_document_id(value: &Value) -> Option<DocumentId> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(DocumentId::new(text.trim())),
        Value::Number(number) => Some(DocumentId::new(number.to_string())),
        _ => None,
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

fn fallback_value(column: &ColumnSpec) -> CellValue {
    match column.fallback {
        Fallback::Placeholder(text) => CellValue::Placeholder(text),
        Fallback::Zero => CellValue::Number(0.0),
    }
}

fn normalize_field(
    column: &ColumnSpec,
    source: &Map<String, Value>,
    id: RowId,
    issues: &mut Vec<NormalizeIssue>,
) -> CellValue {
    let Some(raw) = column
        .sources
        .iter()
        .filter_map(|name| source.get(*name))
        .find(|value| !is_blank(value))
    else {
        return fallback_value(column);
    };

    let mut coerced = |expected: &'static str| {
        issues.push(NormalizeIssue::Coerced {
            id,
            column: column.key,
            raw: raw.to_string(),
            expected,
        });
    };

    match column.kind {
        FieldKind::Text => CellValue::Text(match raw {
            Value::String(text) => text.trim().to_owned(),
            other => other.to_string(),
        }),
        FieldKind::Number => match parse_number(raw) {
            Some(number) => CellValue::Number(number),
            None => {
                coerced("number");
                fallback_value(column)
            }
        },
        FieldKind::Bool => match raw {
            Value::Bool(value) => CellValue::Bool(*value),
            Value::String(text) if text.trim().eq_ignore_ascii_case("true") => {
                CellValue::Bool(true)
            }
            Value::String(text) if text.trim().eq_ignore_ascii_case("false") => {
                CellValue::Bool(false)
            }
            _ => {
                coerced("boolean");
                fallback_value(column)
            }
        },
        FieldKind::Date => match raw {
            Value::String(text) => match parse_date(text.trim()) {
                Some(date) => CellValue::Date(date),
                None => {
                    coerced("date");
                    CellValue::Text(text.trim().to_owned())
                }
            },
            _ => {
                coerced("date");
                fallback_value(column)
            }
        },
    }
}

fn parse_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

pub fn parse_date(text: &str) -> Option<Date> {
    if let Ok(timestamp) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(timestamp.date());
    }
    Date::parse(text, format_description!("[year]-[month]-[day]")).ok()
}
