// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

use crate::{Collection, FieldKind, parse_date};

// Server-owned; never sent in a write body.
const SYSTEM_FIELDS: &[&str] = &["id", "documentId", "createdAt", "updatedAt", "publishedAt"];

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowPatch {
    fields: BTreeMap<String, Value>,
}

impl RowPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    // Column keys resolve to their first backend field.
    pub fn parse(collection: Collection, input: &str) -> Result<Self> {
        let mut patch = Self::new();
        for pair in input
            .split([';', '\n'])
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
        {
            let Some((key, raw)) = pair.split_once('=') else {
                bail!("expected field=value, got {pair:?} -- separate pairs with ';'");
            };
            let key = key.trim();
            if key.is_empty() {
                bail!("missing field name in {pair:?}");
            }
            let raw = raw.trim();

            let (field, value) = match collection.column(key) {
                Some(column) => {
                    let field = column.sources.first().copied().unwrap_or(column.key);
                    (field.to_owned(), typed_value(key, column.kind, raw)?)
                }
                None => (key.to_owned(), Value::String(raw.to_owned())),
            };
            if SYSTEM_FIELDS.contains(&field.as_str()) {
                bail!("{field} is managed by the server and cannot be edited");
            }
            patch.fields.insert(field, value);
        }
        Ok(patch)
    }

    pub fn validate(&self, collection: Collection) -> Result<()> {
        if self.is_empty() {
            bail!("nothing to change -- enter at least one field=value pair");
        }
        for field in collection.required_fields() {
            if self.fields.get(*field).is_some_and(is_blank) {
                bail!(
                    "{} {field} cannot be empty -- enter a value and retry",
                    collection.label()
                );
            }
        }
        Ok(())
    }

    pub fn validate_for_create(&self, collection: Collection) -> Result<()> {
        self.validate(collection)?;
        for field in collection.required_fields() {
            if !self.fields.contains_key(*field) {
                bail!(
                    "{} {field} is required -- add {field}=<value> and retry",
                    collection.label()
                );
            }
        }
        Ok(())
    }

    pub fn merged_into(&self, source: &Map<String, Value>) -> Map<String, Value> {
        let mut merged = source.clone();
        for (field, value) in &self.fields {
            merged.insert(field.clone(), value.clone());
        }
        merged
    }

    pub fn to_record(&self) -> Map<String, Value> {
        self.merged_into(&Map::new())
    }
}

pub fn writable_fields(record: &Map<String, Value>) -> Map<String, Value> {
    record
        .iter()
        .filter(|(key, _)| !SYSTEM_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

fn typed_value(key: &str, kind: FieldKind, raw: &str) -> Result<Value> {
    if raw.is_empty() {
        return Ok(Value::String(String::new()));
    }
    match kind {
        FieldKind::Text => Ok(Value::String(raw.to_owned())),
        FieldKind::Number => {
            if let Ok(integer) = raw.parse::<i64>() {
                return Ok(Value::from(integer));
            }
            match raw.parse::<f64>().ok().and_then(Number::from_f64) {
                Some(number) => Ok(Value::Number(number)),
                None => bail!("{key} must be a number, got {raw:?}"),
            }
        }
        FieldKind::Bool => match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Ok(Value::Bool(true)),
            "false" | "no" | "n" | "0" => Ok(Value::Bool(false)),
            _ => bail!("{key} must be yes or no, got {raw:?}"),
        },
        FieldKind::Date => {
            if parse_date(raw).is_none() {
                bail!("{key} must be a date like 2025-03-04, got {raw:?}");
            }
            Ok(Value::String(raw.to_owned()))
        }
    }
}
