// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::{CellValue, Collection, ColumnSpec, RowId, RowRecord, SortDirection};

pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub column: &'static str,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    pub page_index: usize,
    pub page_size: usize,
    pub sort: Option<SortSpec>,
    pub filter: String,
    pub selected: BTreeSet<RowId>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            page_index: 0,
            page_size: DEFAULT_PAGE_SIZE,
            sort: None,
            filter: String::new(),
            selected: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableController {
    collection: Collection,
    rows: Vec<RowRecord>,
    view: ViewState,
}

impl TableController {
    pub fn new(collection: Collection, page_size: usize) -> Self {
        Self {
            collection,
            rows: Vec::new(),
            view: ViewState {
                page_size: page_size.max(1),
                ..ViewState::default()
            },
        }
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn columns(&self) -> &'static [ColumnSpec] {
        self.collection.columns()
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn rows(&self) -> &[RowRecord] {
        &self.rows
    }

    pub fn row(&self, id: RowId) -> Option<&RowRecord> {
        self.rows.iter().find(|row| row.id == id)
    }

    pub fn total_count(&self) -> usize {
        self.rows.len()
    }

    pub fn filtered_count(&self) -> usize {
        self.filtered_indices().len()
    }

    pub fn page_count(&self) -> usize {
        self.filtered_count().div_ceil(self.view.page_size)
    }

    pub fn selected_ids(&self) -> &BTreeSet<RowId> {
        &self.view.selected
    }

    pub fn selected_rows(&self) -> Vec<&RowRecord> {
        self.rows
            .iter()
            .filter(|row| self.view.selected.contains(&row.id))
            .collect()
    }

    pub fn page_rows(&self) -> Vec<&RowRecord> {
        let start = self.view.page_index * self.view.page_size;
        self.derived_indices()
            .into_iter()
            .skip(start)
            .take(self.view.page_size)
            .map(|index| &self.rows[index])
            .collect()
    }

    pub fn load(&mut self, rows: Vec<RowRecord>) {
        self.rows = rows;
        let rows = &self.rows;
        self.view
            .selected
            .retain(|id| rows.iter().any(|row| row.id == *id));
        self.clamp_page();
    }

    pub fn set_filter(&mut self, text: &str) {
        self.view.filter = text.to_owned();
        self.view.page_index = 0;
    }

    pub fn set_sort(&mut self, column_key: &str, direction: SortDirection) {
        let Some(column) = self.collection.column(column_key) else {
            return;
        };
        self.view.sort = match direction {
            SortDirection::Unsorted => None,
            direction => Some(SortSpec {
                column: column.key,
                direction,
            }),
        };
    }

    pub fn cycle_sort(&mut self, column_key: &str) -> SortDirection {
        let next = match &self.view.sort {
            Some(sort) if sort.column == column_key => match sort.direction {
                SortDirection::Asc => SortDirection::Desc,
                SortDirection::Desc | SortDirection::Unsorted => SortDirection::Unsorted,
            },
            _ => SortDirection::Asc,
        };
        self.set_sort(column_key, next);
        next
    }

    pub fn clear_sort(&mut self) {
        self.view.sort = None;
    }

    pub fn set_page(&mut self, index: usize) {
        self.view.page_index = index;
        self.clamp_page();
    }

    pub fn set_page_size(&mut self, size: usize) {
        let first_visible = self.view.page_index * self.view.page_size;
        self.view.page_size = size.max(1);
        self.view.page_index = first_visible / self.view.page_size;
        self.clamp_page();
    }

    pub fn toggle_row_selected(&mut self, id: RowId) -> bool {
        if !self.rows.iter().any(|row| row.id == id) {
            return false;
        }
        if self.view.selected.remove(&id) {
            false
        } else {
            self.view.selected.insert(id);
            true
        }
    }

    pub fn toggle_all_on_page(&mut self, selected: bool) {
        let ids = self.page_rows().iter().map(|row| row.id).collect::<Vec<_>>();
        for id in ids {
            if selected {
                self.view.selected.insert(id);
            } else {
                self.view.selected.remove(&id);
            }
        }
    }

    pub fn remove_rows(&mut self, ids: &[RowId]) {
        if ids.is_empty() {
            return;
        }
        self.rows.retain(|row| !ids.contains(&row.id));
        self.view.selected.clear();
        self.clamp_page();
    }

    pub fn replace_row(&mut self, row: RowRecord) -> bool {
        match self.rows.iter_mut().find(|existing| existing.id == row.id) {
            Some(existing) => {
                *existing = row;
                true
            }
            None => false,
        }
    }

    pub fn insert_row(&mut self, row: RowRecord) {
        if !self.replace_row(row.clone()) {
            self.rows.push(row);
        }
    }

    fn clamp_page(&mut self) {
        let last = self.page_count().saturating_sub(1);
        self.view.page_index = self.view.page_index.min(last);
    }

    fn matches_filter(&self, row: &RowRecord, needle: &str) -> bool {
        self.columns()
            .iter()
            .filter(|column| column.searchable)
            .filter_map(|column| row.field(column.key))
            .any(|value| value.display().to_lowercase().contains(needle))
    }

    fn filtered_indices(&self) -> Vec<usize> {
        let needle = self.view.filter.trim().to_lowercase();
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| needle.is_empty() || self.matches_filter(row, &needle))
            .map(|(index, _)| index)
            .collect()
    }

    fn derived_indices(&self) -> Vec<usize> {
        let mut indices = self.filtered_indices();
        let Some(sort) = &self.view.sort else {
            return indices;
        };

        // sort_by is stable, so ties keep load order.
        indices.sort_by(|left, right| {
            compare_cells(
                self.rows[*left].field(sort.column),
                self.rows[*right].field(sort.column),
                sort.direction,
            )
        });
        indices
    }
}

fn compare_cells(
    left: Option<&CellValue>,
    right: Option<&CellValue>,
    direction: SortDirection,
) -> Ordering {
    let left_missing = left.is_none_or(CellValue::is_placeholder);
    let right_missing = right.is_none_or(CellValue::is_placeholder);
    match (left_missing, right_missing) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let (Some(left), Some(right)) = (left, right) else {
                return Ordering::Equal;
            };
            match direction {
                SortDirection::Asc => left.cmp_value(right),
                SortDirection::Desc => left.cmp_value(right).reverse(),
                SortDirection::Unsorted => Ordering::Equal,
            }
        }
    }
}
