// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! The `key: value key2: value2 ...` filter language.
//!
//! Text is split into a flat whitespace token stream first; a boundary scan
//! then walks the stream looking for recognized labels. Everything between two
//! labels is the value of the first one. Parsing never fails: text that does not
//! fit ends up in the remainder.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::model::{KeywordDescriptor, ValueKind};

/// A whitespace-delimited word and its byte span in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Token<'a> {
    pub(crate) text: &'a str,
    pub(crate) start: usize,
    pub(crate) end: usize,
}

pub(crate) fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (index, ch) in input.char_indices() {
        if ch.is_whitespace() {
            if let Some(begin) = start.take() {
                tokens.push(Token {
                    text: &input[begin..index],
                    start: begin,
                    end: index,
                });
            }
        } else if start.is_none() {
            start = Some(index);
        }
    }
    if let Some(begin) = start {
        tokens.push(Token {
            text: &input[begin..],
            start: begin,
            end: input.len(),
        });
    }
    tokens
}

/// Collapses whitespace runs to a single space and trims both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterTerm {
    pub key: String,
    pub label: String,
    pub value: String,
}

/// Parsed form of the filter text: ordered terms plus unattributed words.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterValue {
    terms: Vec<FilterTerm>,
    remainder: String,
}

impl FilterValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`; an existing key keeps its position and takes the new value.
    pub fn insert(&mut self, key: &str, label: &str, value: &str) {
        if let Some(term) = self.terms.iter_mut().find(|term| term.key == key) {
            term.value = value.to_owned();
            return;
        }
        self.terms.push(FilterTerm {
            key: key.to_owned(),
            label: label.to_owned(),
            value: value.to_owned(),
        });
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.insert(key, key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<FilterTerm> {
        let index = self.terms.iter().position(|term| term.key == key)?;
        Some(self.terms.remove(index))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.terms
            .iter()
            .find(|term| term.key == key)
            .map(|term| term.value.as_str())
    }

    pub fn terms(&self) -> &[FilterTerm] {
        &self.terms
    }

    pub fn remainder(&self) -> &str {
        &self.remainder
    }

    pub fn set_remainder(&mut self, remainder: &str) {
        self.remainder = normalize_whitespace(remainder);
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.remainder.is_empty()
    }

    /// Text form that parses back to `self`: the remainder leads, since only
    /// words before the first label are unattributed.
    pub fn compose(&self) -> String {
        let mut parts = Vec::with_capacity(self.terms.len() + 1);
        if !self.remainder.is_empty() {
            parts.push(self.remainder.clone());
        }
        for term in &self.terms {
            if term.value.is_empty() {
                parts.push(format!("{}:", term.label));
            } else {
                parts.push(format!("{}: {}", term.label, term.value));
            }
        }
        parts.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LabelEntry {
    pub(crate) key: String,
    pub(crate) label: String,
    pub(crate) kind: ValueKind,
    /// Lowercased label words; the last one carries the trailing colon.
    words: Vec<String>,
}

impl LabelEntry {
    fn new(key: &str, label: &str, kind: ValueKind) -> Self {
        let label = label.trim().trim_end_matches(':').trim_end();
        let mut words: Vec<String> = label.split_whitespace().map(str::to_lowercase).collect();
        if let Some(last) = words.last_mut() {
            last.push(':');
        }
        Self {
            key: key.to_owned(),
            label: label.to_owned(),
            kind,
            words,
        }
    }
}

/// A `label: value` region found by the boundary scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Region {
    pub(crate) entry: usize,
    /// Byte offset of the first label word.
    pub(crate) start: usize,
    /// Byte offset of the next label, or the end of the text.
    pub(crate) end: usize,
    pub(crate) value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct Scan {
    pub(crate) regions: Vec<Region>,
    pub(crate) remainder: String,
}

/// The recognized keys of one view, with composite aliases expanded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Vocabulary {
    entries: Vec<LabelEntry>,
    aliases: Vec<(String, Vec<String>)>,
    max_words: usize,
}

impl Vocabulary {
    pub fn new(keywords: &[KeywordDescriptor]) -> Self {
        let mut vocabulary = Self::default();
        for keyword in keywords {
            match &keyword.kind {
                ValueKind::CompositeAlias(keys) => {
                    for key in keys {
                        vocabulary.push_entry(LabelEntry::new(key, key, ValueKind::FreeText));
                    }
                    vocabulary
                        .aliases
                        .push((keyword.key.clone(), keys.clone()));
                }
                kind => {
                    vocabulary.push_entry(LabelEntry::new(&keyword.key, &keyword.label, kind.clone()))
                }
            }
        }
        vocabulary
    }

    fn push_entry(&mut self, entry: LabelEntry) {
        if entry.words.is_empty() || self.entries.iter().any(|known| known.key == entry.key) {
            return;
        }
        self.max_words = self.max_words.max(entry.words.len());
        self.entries.push(entry);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.key.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entry_index(key).is_some()
    }

    pub fn label_for(&self, key: &str) -> Option<&str> {
        self.entry_index(key)
            .map(|index| self.entries[index].label.as_str())
    }

    pub fn kind_for(&self, key: &str) -> Option<&ValueKind> {
        self.entry_index(key).map(|index| &self.entries[index].kind)
    }

    /// Concrete keys behind a composite alias such as `infokey & infovalue`.
    pub fn alias_keys(&self, alias: &str) -> Option<&[String]> {
        self.aliases
            .iter()
            .find(|(key, _)| key == alias)
            .map(|(_, keys)| keys.as_slice())
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.aliases.iter().map(|(alias, _)| alias.as_str())
    }

    /// Whether `key` names a label or a composite alias.
    pub fn accepts(&self, key: &str) -> bool {
        self.contains(key) || self.alias_keys(key).is_some()
    }

    pub(crate) fn entry_index(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.key == key)
    }

    pub(crate) fn entry(&self, index: usize) -> &LabelEntry {
        &self.entries[index]
    }

    /// Vocabulary that also recognizes `key`, treating an unknown key as a
    /// single free-text label.
    pub(crate) fn including(&self, key: &str) -> Cow<'_, Self> {
        if self.contains(key) {
            return Cow::Borrowed(self);
        }
        let mut extended = self.clone();
        extended.push_entry(LabelEntry::new(key, key, ValueKind::FreeText));
        Cow::Owned(extended)
    }

    pub fn parse(&self, text: &str) -> FilterValue {
        let scan = self.scan(text);
        let mut filter = FilterValue::new();
        for region in &scan.regions {
            let entry = self.entry(region.entry);
            filter.insert(&entry.key, &entry.label, &region.value.to_lowercase());
        }
        filter.remainder = scan.remainder;
        filter
    }

    pub(crate) fn scan(&self, text: &str) -> Scan {
        let tokens = tokenize(text);
        let folded: Vec<String> = tokens.iter().map(|token| token.text.to_lowercase()).collect();

        let mut scan = Scan::default();
        let mut leading: Vec<&str> = Vec::new();
        let mut open: Option<Region> = None;
        let mut index = 0;
        while index < tokens.len() {
            if let Some((entry, width)) = self.match_label(&folded[index..]) {
                if let Some(mut region) = open.take() {
                    region.end = tokens[index].start;
                    scan.regions.push(region);
                }
                open = Some(Region {
                    entry,
                    start: tokens[index].start,
                    end: text.len(),
                    value: String::new(),
                });
                index += width;
                continue;
            }

            match open.as_mut() {
                Some(region) => {
                    if !region.value.is_empty() {
                        region.value.push(' ');
                    }
                    region.value.push_str(tokens[index].text);
                }
                None => leading.push(tokens[index].text),
            }
            index += 1;
        }
        if let Some(region) = open {
            scan.regions.push(region);
        }
        scan.remainder = leading.join(" ");
        scan
    }

    /// Longest label starting at the head of `folded`, as (entry, word count).
    fn match_label(&self, folded: &[String]) -> Option<(usize, usize)> {
        let longest = self.max_words.min(folded.len());
        for width in (1..=longest).rev() {
            let window = &folded[..width];
            let found = self.entries.iter().position(|entry| {
                entry.words.len() == width
                    && entry.words.iter().zip(window).all(|(word, token)| word == token)
            });
            if let Some(entry) = found {
                return Some((entry, width));
            }
        }
        None
    }
}

/// Parses `text` against a one-off vocabulary built from `keywords`.
pub fn parse(text: &str, keywords: &[KeywordDescriptor]) -> FilterValue {
    Vocabulary::new(keywords).parse(text)
}
