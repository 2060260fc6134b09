// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::filter::FilterValue;
use crate::list::ListRequest;

/// Backend query parameters, keyed by parameter name.
pub type QueryParams = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchMode {
    /// Sent unchanged: identifiers, booleans, enumerations.
    Exact,
    /// Sent as `*value*` for substring search.
    Wildcard,
}

impl MatchMode {
    pub fn apply(self, value: &str) -> String {
        match self {
            Self::Exact => value.to_owned(),
            Self::Wildcard => format!("*{value}*"),
        }
    }
}

/// The filter keys one list endpoint understands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldClassification {
    fields: BTreeMap<String, MatchMode>,
}

impl FieldClassification {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exact(mut self, key: &str) -> Self {
        self.fields.insert(key.to_owned(), MatchMode::Exact);
        self
    }

    pub fn wildcard(mut self, key: &str) -> Self {
        self.fields.insert(key.to_owned(), MatchMode::Wildcard);
        self
    }

    pub fn mode(&self, key: &str) -> Option<MatchMode> {
        self.fields.get(key).copied()
    }
}

impl<'a> FromIterator<(&'a str, MatchMode)> for FieldClassification {
    fn from_iter<I: IntoIterator<Item = (&'a str, MatchMode)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(key, mode)| (key.to_owned(), mode))
                .collect(),
        }
    }
}

/// Turns parsed filter terms into endpoint parameters.
///
/// Unclassified keys and empty values are dropped. The remainder is never
/// sent: the list endpoints have no free-text search parameter.
pub fn compile(filter: &FilterValue, classification: &FieldClassification) -> QueryParams {
    let mut params = QueryParams::new();
    for term in filter.terms() {
        let Some(mode) = classification.mode(&term.key) else {
            debug!(key = %term.key, "dropping filter key the endpoint does not accept");
            continue;
        };
        if term.value.is_empty() {
            continue;
        }
        params.insert(term.key.clone(), mode.apply(&term.value));
    }
    if !filter.remainder().is_empty() {
        debug!(
            remainder = filter.remainder(),
            "free text outside recognized keys is not sent"
        );
    }
    params
}

impl ListRequest {
    /// Full parameter set for the list endpoint: paging, sort and filter.
    pub fn to_query(&self, classification: &FieldClassification) -> QueryParams {
        let mut params = compile(&self.filter, classification);
        params.insert("page".to_owned(), (self.page_index + 1).to_string());
        params.insert("pagesize".to_owned(), self.page_size.to_string());
        if self.sort.is_active() {
            params.insert("sortby".to_owned(), self.sort.column.clone());
            params.insert("sortdir".to_owned(), self.sort.direction.as_str().to_owned());
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldClassification, MatchMode, QueryParams, compile};
    use crate::{FilterValue, ListRequest, SortDirection, SortSpec, ViewKind, Vocabulary};

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect()
    }

    #[test]
    fn exact_passes_through_and_wildcard_wraps() {
        let filter = FilterValue::new()
            .with("user", "bob")
            .with("description", "vpn");
        let classification = FieldClassification::new()
            .exact("user")
            .wildcard("description");

        assert_eq!(
            compile(&filter, &classification),
            params(&[("user", "bob"), ("description", "*vpn*")])
        );
    }

    #[test]
    fn unclassified_keys_and_remainder_are_dropped() {
        let mut filter = FilterValue::new().with("serial", "oath").with("color", "red");
        filter.set_remainder("anything else");
        let classification = FieldClassification::new().exact("serial");

        assert_eq!(
            compile(&filter, &classification),
            params(&[("serial", "oath")])
        );
    }

    #[test]
    fn empty_values_do_not_constrain_the_list() {
        let filter = FilterValue::new().with("serial", "").with("type", "hotp");
        assert_eq!(
            compile(&filter, &ViewKind::Tokens.classification()),
            params(&[("type", "hotp")])
        );
    }

    #[test]
    fn match_mode_apply() {
        assert_eq!(MatchMode::Exact.apply("x"), "x");
        assert_eq!(MatchMode::Wildcard.apply("x"), "*x*");
    }

    #[test]
    fn list_request_adds_one_based_page_and_sort() {
        let vocabulary = Vocabulary::new(&ViewKind::Tokens.keywords());
        let request = ListRequest {
            page_index: 2,
            page_size: 25,
            sort: SortSpec::new("serial", SortDirection::Desc),
            filter: vocabulary.parse("serial: oath active: true"),
        };

        assert_eq!(
            request.to_query(&ViewKind::Tokens.classification()),
            params(&[
                ("active", "true"),
                ("page", "3"),
                ("pagesize", "25"),
                ("serial", "*oath*"),
                ("sortby", "serial"),
                ("sortdir", "desc"),
            ])
        );
    }

    #[test]
    fn unsorted_request_omits_sort_params() {
        let request = ListRequest {
            page_index: 0,
            page_size: 15,
            sort: SortSpec::unsorted(),
            filter: FilterValue::new(),
        };
        let query = request.to_query(&ViewKind::Tokens.classification());
        assert!(!query.contains_key("sortby"));
        assert!(!query.contains_key("sortdir"));
        assert_eq!(query.get("page").map(String::as_str), Some("1"));
    }
}
