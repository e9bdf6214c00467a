//! Cookie jar
//!
//! Parses the `Cookie` request header defensively and accumulates
//! mutations that must go out as `Set-Cookie` values.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Value of a single cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieValue {
    Text(String),
    /// Cookie sent as a bare name (`name` or `name=`)
    Flag,
}

impl CookieValue {
    /// Text value, `None` for a bare flag
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            Self::Flag => None,
        }
    }
}

impl fmt::Display for CookieValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => f.write_str(value),
            Self::Flag => f.write_str("true"),
        }
    }
}

/// Per-request cookie set
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    values: BTreeMap<String, CookieValue>,
    pending: BTreeSet<String>,
}

impl CookieJar {
    /// Parse one or more `Cookie` header values
    ///
    /// Pairs are split on `;`, then on the first `=`. Anything unparsable
    /// is skipped; no header yields an empty jar.
    pub fn parse<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut jar = Self::default();
        for header in headers {
            for pair in header.split(';') {
                let (name, value) = match pair.split_once('=') {
                    Some((name, value)) => (name.trim(), value.trim()),
                    None => (pair.trim(), ""),
                };
                if name.is_empty() {
                    continue;
                }
                let value = if value.is_empty() {
                    CookieValue::Flag
                } else {
                    CookieValue::Text(value.to_string())
                };
                jar.values.insert(name.to_string(), value);
            }
        }
        jar
    }

    pub fn get(&self, name: &str) -> Option<&CookieValue> {
        self.values.get(name)
    }

    /// Set a cookie and queue it for the next `Set-Cookie` flush
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.values
            .insert(name.clone(), CookieValue::Text(value.into()));
        self.pending.insert(name);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CookieValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Serialize back into `Cookie` header form; flags are written bare
    pub fn to_header(&self) -> String {
        self.values
            .iter()
            .map(|(name, value)| match value {
                CookieValue::Text(text) => format!("{name}={text}"),
                CookieValue::Flag => name.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Drain pending mutations as `Set-Cookie` values, one per cookie
    pub fn take_set_cookie_values(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .filter_map(|name| {
                self.values
                    .get(&name)
                    .map(|value| format!("{name}={value}; path=/"))
            })
            .collect()
    }
}
