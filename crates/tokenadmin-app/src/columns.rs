// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::model::ViewKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowClass {
    Normal,
    Muted,
    Alert,
}

impl RowClass {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Muted => "muted",
            Self::Alert => "alert",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionMethod {
    Post,
    Delete,
}

impl ActionMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

/// What the list does once a cell action succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionCompletion {
    Refresh,
    FireAndForget,
}

/// A backend call triggered from a table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellAction {
    pub description: String,
    pub method: ActionMethod,
    pub path: String,
    pub body: serde_json::Value,
    pub completion: ActionCompletion,
}

pub enum ColumnBehavior<T> {
    Simple,
    Clickable(fn(&T) -> Option<CellAction>),
    RouterLink(fn(&T) -> Option<String>),
}

impl<T> ColumnBehavior<T> {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Clickable(_) => "clickable",
            Self::RouterLink(_) => "link",
        }
    }
}

/// Column metadata for a list table. Cells render as zero or more display
/// lines; multi-value fields such as realms get one line each.
pub struct TableColumn<T> {
    pub key: &'static str,
    pub label: &'static str,
    pub sortable: bool,
    display: fn(&T) -> Vec<String>,
    class: Option<fn(&T) -> RowClass>,
    behavior: ColumnBehavior<T>,
}

impl<T> TableColumn<T> {
    pub fn new(key: &'static str, label: &'static str, display: fn(&T) -> Vec<String>) -> Self {
        Self {
            key,
            label,
            sortable: false,
            display,
            class: None,
            behavior: ColumnBehavior::Simple,
        }
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn classed(mut self, class: fn(&T) -> RowClass) -> Self {
        self.class = Some(class);
        self
    }

    pub fn clickable(mut self, action: fn(&T) -> Option<CellAction>) -> Self {
        self.behavior = ColumnBehavior::Clickable(action);
        self
    }

    pub fn router_link(mut self, route: fn(&T) -> Option<String>) -> Self {
        self.behavior = ColumnBehavior::RouterLink(route);
        self
    }

    pub fn behavior(&self) -> &ColumnBehavior<T> {
        &self.behavior
    }

    pub fn display_items(&self, row: &T) -> Vec<String> {
        (self.display)(row)
    }

    pub fn row_class(&self, row: &T) -> RowClass {
        self.class.map_or(RowClass::Normal, |class| class(row))
    }

    /// The action a click on this cell triggers, if any.
    pub fn activate(&self, row: &T) -> Option<CellAction> {
        match &self.behavior {
            ColumnBehavior::Clickable(action) => action(row),
            _ => None,
        }
    }

    pub fn route(&self, row: &T) -> Option<String> {
        match &self.behavior {
            ColumnBehavior::RouterLink(route) => route(row),
            _ => None,
        }
    }
}

/// A row type backing one list view.
pub trait ListRow: DeserializeOwned {
    const VIEW: ViewKind;

    fn columns() -> Vec<TableColumn<Self>>;

    fn sortable_keys() -> Vec<&'static str> {
        Self::columns()
            .into_iter()
            .filter(|column| column.sortable)
            .map(|column| column.key)
            .collect()
    }

    fn find_column(key: &str) -> Option<TableColumn<Self>> {
        Self::columns().into_iter().find(|column| column.key == key)
    }
}

pub fn single(value: &str) -> Vec<String> {
    if value.is_empty() {
        Vec::new()
    } else {
        vec![value.to_owned()]
    }
}
