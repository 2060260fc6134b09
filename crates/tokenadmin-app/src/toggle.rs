// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::borrow::Cow;
use tracing::debug;

use crate::filter::{FilterValue, Region, Scan, Vocabulary, normalize_whitespace};
use crate::model::{KeywordDescriptor, ValueKind};

impl Vocabulary {
    /// Removes every `key: value` region from `text`, or adds `key: ` when
    /// there is none.
    pub fn toggle_keyword(&self, text: &str, key: &str) -> String {
        if let Some(keys) = self.alias_keys(key) {
            let keys = keys.to_vec();
            return self.toggle_group(text, &keys);
        }
        self.toggle_group(text, &[key.to_owned()])
    }

    fn toggle_group(&self, text: &str, keys: &[String]) -> String {
        let mut vocabulary = Cow::Borrowed(self);
        for key in keys {
            if !vocabulary.contains(key) {
                vocabulary = Cow::Owned(vocabulary.including(key).into_owned());
            }
        }

        let scan = vocabulary.scan(text);
        let regions: Vec<&Region> = scan
            .regions
            .iter()
            .filter(|region| keys.contains(&vocabulary.entry(region.entry).key))
            .collect();

        if !regions.is_empty() {
            return remove_regions(text, &regions);
        }

        let vocabulary: &Vocabulary = &vocabulary;
        let terms: Vec<NewTerm<'_>> = keys
            .iter()
            .map(|key| NewTerm {
                key: key.as_str(),
                label: vocabulary.label_for(key).unwrap_or(key.as_str()),
                value: "",
            })
            .collect();
        vocabulary.place_terms(text, &scan, &terms)
    }

    /// Cycles `key` through absent -> `true` -> `false` -> absent. A value that
    /// is neither `true` nor `false` counts as absent.
    pub fn toggle_boolean(&self, text: &str, key: &str) -> String {
        let vocabulary = self.including(key);
        let label = vocabulary.label_for(key).unwrap_or(key).to_owned();
        let scan = vocabulary.scan(text);
        let regions: Vec<&Region> = scan
            .regions
            .iter()
            .filter(|region| vocabulary.entry(region.entry).key == key)
            .collect();

        let Some(first) = regions.first() else {
            let term = NewTerm {
                key,
                label: &label,
                value: "true",
            };
            return vocabulary.place_terms(text, &scan, &[term]);
        };

        let next = match first.value.to_lowercase().as_str() {
            "true" => Some("false"),
            "false" => None,
            other => {
                debug!(key, value = other, "resetting malformed boolean filter");
                Some("true")
            }
        };

        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for (index, region) in regions.iter().enumerate() {
            out.push_str(&text[cursor..region.start]);
            if index == 0
                && let Some(value) = next
            {
                out.push_str(&label);
                out.push_str(": ");
                out.push_str(value);
                out.push(' ');
            }
            cursor = region.end;
        }
        out.push_str(&text[cursor..]);
        normalize_whitespace(&out)
    }

    /// Writes `terms` into `text` so that a rescan reads each of them back
    /// under its own key and leaves the existing regions alone. Appending can
    /// fail when the text ends with the leading words of a longer label
    /// (`transaction` followed by `id:`), so the term then goes in front of
    /// an existing label, or the leading words are rotated until the word
    /// before the new term no longer starts a label.
    fn place_terms(&self, text: &str, before: &Scan, terms: &[NewTerm<'_>]) -> String {
        let fragment = terms
            .iter()
            .map(|term| format!("{}: {}", term.label, term.value))
            .collect::<Vec<_>>()
            .join(" ");
        let reads_back = |candidate: &str| self.reads_back(before, candidate, terms);

        let appended = append_terms(text, terms);
        if reads_back(&appended) {
            return appended;
        }

        for region in before.regions.iter().rev() {
            let candidate = normalize_whitespace(&format!(
                "{} {fragment} {}",
                &text[..region.start],
                &text[region.start..]
            ));
            if reads_back(&candidate) {
                return candidate;
            }
        }

        let leading: Vec<&str> = before.remainder.split_whitespace().collect();
        let rest = before.regions.first().map_or("", |region| &text[region.start..]);
        for shift in 1..leading.len() {
            let (head, tail) = leading.split_at(leading.len() - shift);
            let rotated = format!("{} {}", tail.join(" "), head.join(" "));
            let candidate = if rest.is_empty() {
                append_terms(&rotated, terms)
            } else {
                normalize_whitespace(&format!("{rotated} {fragment} {rest}"))
            };
            if reads_back(&candidate) {
                return candidate;
            }
        }

        debug!(text, "every placement merges the new filter term into another label");
        appended
    }

    /// Whether `candidate` holds the regions of `before` plus `terms`, and the
    /// same leading words.
    fn reads_back(&self, before: &Scan, candidate: &str, terms: &[NewTerm<'_>]) -> bool {
        let after = self.scan(candidate);
        let mut expected: Vec<(&str, &str)> = before
            .regions
            .iter()
            .map(|region| (self.entry(region.entry).key.as_str(), region.value.as_str()))
            .chain(terms.iter().map(|term| (term.key, term.value)))
            .collect();
        let mut found: Vec<(&str, &str)> = after
            .regions
            .iter()
            .map(|region| (self.entry(region.entry).key.as_str(), region.value.as_str()))
            .collect();
        expected.sort_unstable();
        found.sort_unstable();

        let mut words_before: Vec<&str> = before.remainder.split_whitespace().collect();
        let mut words_after: Vec<&str> = after.remainder.split_whitespace().collect();
        words_before.sort_unstable();
        words_after.sort_unstable();
        expected == found && words_before == words_after
    }
}

struct NewTerm<'a> {
    key: &'a str,
    label: &'a str,
    value: &'a str,
}

fn remove_regions(text: &str, regions: &[&Region]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for region in regions {
        out.push_str(&text[cursor..region.start]);
        out.push(' ');
        cursor = region.end;
    }
    out.push_str(&text[cursor..]);
    normalize_whitespace(&out)
}

fn append_terms(text: &str, terms: &[NewTerm<'_>]) -> String {
    let mut out = text.to_owned();
    for term in terms {
        if !out.is_empty() && !out.ends_with(char::is_whitespace) {
            out.push(' ');
        }
        out.push_str(term.label);
        out.push_str(": ");
        out.push_str(term.value);
    }
    out
}

pub fn toggle_keyword(text: &str, key: &str, keywords: &[KeywordDescriptor]) -> String {
    Vocabulary::new(keywords).toggle_keyword(text, key)
}

pub fn toggle_boolean(text: &str, key: &str, keywords: &[KeywordDescriptor]) -> String {
    Vocabulary::new(keywords).toggle_boolean(text, key)
}

/// A filter text field: the text is the source of truth, everything else is
/// derived from it on demand.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterInput {
    text: String,
    vocabulary: Vocabulary,
}

impl FilterInput {
    pub fn new(keywords: &[KeywordDescriptor]) -> Self {
        Self {
            text: String::new(),
            vocabulary: Vocabulary::new(keywords),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn set_text(&mut self, text: &str) {
        self.text = text.to_owned();
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Toggles `key` with the cycling rule that fits its kind.
    pub fn toggle(&mut self, key: &str) -> &str {
        self.text = match self.vocabulary.kind_for(key) {
            Some(ValueKind::Boolean) => self.vocabulary.toggle_boolean(&self.text, key),
            _ => self.vocabulary.toggle_keyword(&self.text, key),
        };
        &self.text
    }

    pub fn value(&self) -> FilterValue {
        self.vocabulary.parse(&self.text)
    }
}
