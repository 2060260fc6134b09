// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};

use crate::query::{FieldClassification, MatchMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewKind {
    Tokens,
    Containers,
    MachineTokens,
    Challenges,
}

impl ViewKind {
    pub const ALL: [Self; 4] = [
        Self::Tokens,
        Self::Containers,
        Self::MachineTokens,
        Self::Challenges,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tokens => "tokens",
            Self::Containers => "containers",
            Self::MachineTokens => "machines",
            Self::Challenges => "challenges",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tokens" | "token" => Some(Self::Tokens),
            "containers" | "container" => Some(Self::Containers),
            "machines" | "machine" | "applications" => Some(Self::MachineTokens),
            "challenges" | "challenge" => Some(Self::Challenges),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Tokens => "tokens",
            Self::Containers => "containers",
            Self::MachineTokens => "machine tokens",
            Self::Challenges => "challenges",
        }
    }

    /// List endpoint path relative to the server base URL.
    pub const fn endpoint(self) -> &'static str {
        match self {
            Self::Tokens => "/token/",
            Self::Containers => "/container/",
            Self::MachineTokens => "/machine/token",
            Self::Challenges => "/token/challenges/",
        }
    }

    /// Key of the item array inside the response `value` object.
    pub const fn items_key(self) -> &'static str {
        match self {
            Self::Tokens | Self::MachineTokens => "tokens",
            Self::Containers => "containers",
            Self::Challenges => "challenges",
        }
    }

    pub fn keywords(self) -> Vec<KeywordDescriptor> {
        match self {
            Self::Tokens => vec![
                KeywordDescriptor::free_text("serial"),
                KeywordDescriptor::free_text("type"),
                KeywordDescriptor::free_text("tokenrealm"),
                KeywordDescriptor::free_text("description"),
                KeywordDescriptor::free_text("user"),
                KeywordDescriptor::free_text("rollout_state"),
                KeywordDescriptor::free_text("userid"),
                KeywordDescriptor::free_text("resolver"),
                KeywordDescriptor::boolean("active"),
                KeywordDescriptor::boolean("assigned"),
                KeywordDescriptor::composite_alias("infokey & infovalue", &["infokey", "infovalue"]),
                KeywordDescriptor::free_text("container_serial"),
            ],
            Self::Containers => vec![
                KeywordDescriptor::free_text("container_serial"),
                KeywordDescriptor::free_text("type"),
                KeywordDescriptor::free_text("token_serial"),
                KeywordDescriptor::free_text("realm"),
                KeywordDescriptor::free_text("description"),
                KeywordDescriptor::free_text("user"),
                KeywordDescriptor::free_text("state"),
            ],
            Self::MachineTokens => vec![
                KeywordDescriptor::free_text("serial"),
                KeywordDescriptor::free_text("service_id"),
                KeywordDescriptor::free_text("hostname"),
                KeywordDescriptor::free_text("machineid"),
                KeywordDescriptor::free_text("resolver"),
                KeywordDescriptor::free_text("count"),
                KeywordDescriptor::free_text("rounds"),
            ],
            Self::Challenges => vec![
                KeywordDescriptor::free_text("serial"),
                KeywordDescriptor::labeled("transaction_id", "transaction id"),
            ],
        }
    }

    /// Which filter keys the list endpoint accepts, and how each is matched.
    pub fn classification(self) -> FieldClassification {
        use MatchMode::{Exact, Wildcard};

        let fields: &[(&str, MatchMode)] = match self {
            Self::Tokens => &[
                ("serial", Wildcard),
                ("type", Exact),
                ("tokenrealm", Exact),
                ("description", Wildcard),
                ("user", Exact),
                ("rollout_state", Exact),
                ("userid", Exact),
                ("resolver", Exact),
                ("active", Exact),
                ("assigned", Exact),
                ("infokey", Exact),
                ("infovalue", Wildcard),
                ("container_serial", Exact),
            ],
            Self::Containers => &[
                ("container_serial", Wildcard),
                ("type", Exact),
                ("token_serial", Exact),
                ("realm", Exact),
                ("description", Wildcard),
                ("user", Exact),
                ("state", Exact),
            ],
            Self::MachineTokens => &[
                ("serial", Wildcard),
                ("service_id", Exact),
                ("hostname", Wildcard),
                ("machineid", Exact),
                ("resolver", Exact),
                ("count", Exact),
                ("rounds", Exact),
            ],
            Self::Challenges => &[("serial", Wildcard), ("transaction_id", Exact)],
        };
        fields.iter().copied().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    FreeText,
    Boolean,
    /// One UI-facing term standing for several concrete keys.
    CompositeAlias(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordDescriptor {
    pub key: String,
    pub label: String,
    pub kind: ValueKind,
}

impl KeywordDescriptor {
    pub fn free_text(key: &str) -> Self {
        Self::labeled(key, key)
    }

    pub fn labeled(key: &str, label: &str) -> Self {
        Self {
            key: key.to_owned(),
            label: label.to_owned(),
            kind: ValueKind::FreeText,
        }
    }

    pub fn boolean(key: &str) -> Self {
        Self {
            key: key.to_owned(),
            label: key.to_owned(),
            kind: ValueKind::Boolean,
        }
    }

    pub fn composite_alias(key: &str, keys: &[&str]) -> Self {
        Self {
            key: key.to_owned(),
            label: key.to_owned(),
            kind: ValueKind::CompositeAlias(keys.iter().map(|key| (*key).to_owned()).collect()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
    None,
}

impl SortDirection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
            Self::None => "none",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            "none" | "" => Some(Self::None),
            _ => None,
        }
    }

    /// asc -> desc -> none -> asc
    pub const fn cycle(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::None,
            Self::None => Self::Asc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        let column = column.into();
        if direction == SortDirection::None || column.is_empty() {
            return Self::unsorted();
        }
        Self { column, direction }
    }

    pub fn unsorted() -> Self {
        Self {
            column: String::new(),
            direction: SortDirection::None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.direction != SortDirection::None
    }

    /// Parses `column`, `column:asc` or `column:desc`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Some(Self::unsorted());
        }
        match value.split_once(':') {
            Some((column, direction)) => {
                Some(Self::new(column.trim(), SortDirection::parse(direction)?))
            }
            None => Some(Self::new(value, SortDirection::Asc)),
        }
    }
}

impl Default for SortSpec {
    fn default() -> Self {
        Self::unsorted()
    }
}

/// One page of rows as returned by a list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub count: usize,
}

impl<T> Page<T> {
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        let items = self.items.into_iter().map(f).collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            items,
            count: self.count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{KeywordDescriptor, SortDirection, SortSpec, ValueKind, ViewKind};
    use crate::MatchMode;

    #[test]
    fn view_names_parse_with_aliases() {
        for view in ViewKind::ALL {
            assert_eq!(ViewKind::parse(view.as_str()), Some(view));
        }
        assert_eq!(ViewKind::parse("Machine"), Some(ViewKind::MachineTokens));
        assert_eq!(ViewKind::parse("realms"), None);
    }

    #[test]
    fn every_classified_key_is_reachable_from_the_vocabulary() {
        for view in ViewKind::ALL {
            let keywords = view.keywords();
            let mut concrete = Vec::new();
            for keyword in &keywords {
                match &keyword.kind {
                    ValueKind::CompositeAlias(keys) => concrete.extend(keys.iter().cloned()),
                    _ => concrete.push(keyword.key.clone()),
                }
            }
            for key in concrete {
                assert!(
                    view.classification().mode(&key).is_some(),
                    "{} key {key} has no classification",
                    view.as_str()
                );
            }
        }
    }

    #[test]
    fn token_identifiers_are_exact_and_descriptions_wildcard() {
        let classification = ViewKind::Tokens.classification();
        assert_eq!(classification.mode("user"), Some(MatchMode::Exact));
        assert_eq!(classification.mode("active"), Some(MatchMode::Exact));
        assert_eq!(
            classification.mode("description"),
            Some(MatchMode::Wildcard)
        );
    }

    #[test]
    fn challenge_vocabulary_has_multi_word_label() {
        let keywords = ViewKind::Challenges.keywords();
        assert!(keywords.contains(&KeywordDescriptor::labeled(
            "transaction_id",
            "transaction id"
        )));
    }

    #[test]
    fn sort_spec_parses_column_and_direction() {
        assert_eq!(
            SortSpec::parse("serial:desc"),
            Some(SortSpec::new("serial", SortDirection::Desc))
        );
        assert_eq!(
            SortSpec::parse("serial"),
            Some(SortSpec::new("serial", SortDirection::Asc))
        );
        assert_eq!(SortSpec::parse("serial:none"), Some(SortSpec::unsorted()));
        assert_eq!(SortSpec::parse("serial:sideways"), None);
    }

    #[test]
    fn sort_direction_cycles_through_none() {
        assert_eq!(SortDirection::Asc.cycle(), SortDirection::Desc);
        assert_eq!(SortDirection::Desc.cycle(), SortDirection::None);
        assert_eq!(SortDirection::None.cycle(), SortDirection::Asc);
    }
}
