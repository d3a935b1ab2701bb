//! Sort and index key specifications
//!
//! Sort orders and index keys can be written as compact strings:
//!
//! ```text
//! "created_at desc"                 one key, descending
//! "tenant_id, created_at desc"      compound key, order preserved
//! "email; location geosphere"       two independent key groups (indexes)
//! ```
//!
//! Groups are separated by `;`, keys inside a group by `,`, and a key's field
//! and direction by whitespace. A key without a direction is ascending.

use bson::{Bson, Document};
use mongorm_common::{MongormError, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;

/// Direction or index type of a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Ascending,
    Descending,
    Geo2D,
    GeoSphere,
    Hashed,
    Text,
}

/// Tokens accepted for sorting.
static SORT_NAMES: Lazy<HashMap<&'static str, Direction>> = Lazy::new(|| {
    HashMap::from([
        ("asc", Direction::Ascending),
        ("ascending", Direction::Ascending),
        ("desc", Direction::Descending),
        ("descending", Direction::Descending),
    ])
});

/// Tokens accepted for index creation.
static INDEX_NAMES: Lazy<HashMap<&'static str, Direction>> = Lazy::new(|| {
    let mut names = SORT_NAMES.clone();
    names.extend([
        ("geo2d", Direction::Geo2D),
        ("geosphere", Direction::GeoSphere),
        ("hashed", Direction::Hashed),
        ("text", Direction::Text),
    ]);
    names
});

impl Direction {
    /// Look up a direction token, case-insensitively.
    ///
    /// Sorting only knows `asc`/`ascending`/`desc`/`descending`; index
    /// creation additionally accepts `geo2d`, `geosphere`, `hashed` and `text`.
    pub fn resolve(token: &str, for_index: bool) -> Result<Self> {
        let names = if for_index { &INDEX_NAMES } else { &SORT_NAMES };
        names
            .get(token.to_lowercase().as_str())
            .copied()
            .ok_or_else(|| MongormError::unknown_direction(token, for_index))
    }

    /// The value MongoDB expects in a sort or index key document.
    pub fn to_bson(self) -> Bson {
        match self {
            Direction::Ascending => Bson::Int32(1),
            Direction::Descending => Bson::Int32(-1),
            Direction::Geo2D => Bson::String("2d".to_string()),
            Direction::GeoSphere => Bson::String("2dsphere".to_string()),
            Direction::Hashed => Bson::String("hashed".to_string()),
            Direction::Text => Bson::String("text".to_string()),
        }
    }

    pub fn is_index_only(self) -> bool {
        !matches!(self, Direction::Ascending | Direction::Descending)
    }
}

impl From<Direction> for Bson {
    fn from(direction: Direction) -> Self {
        direction.to_bson()
    }
}

/// One ordered sort order or index key list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    keys: Vec<(String, Direction)>,
}

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a key, keeping insertion order.
    pub fn key(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.keys.push((field.into(), direction));
        self
    }

    pub fn keys(&self) -> &[(String, Direction)] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|(field, _)| field.as_str())
    }

    /// Key document in field order, e.g. `{ "a": -1, "b": 1 }`.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        for (field, direction) in &self.keys {
            doc.insert(field.clone(), direction.to_bson());
        }
        doc
    }
}

impl From<Vec<(String, Direction)>> for SortSpec {
    fn from(keys: Vec<(String, Direction)>) -> Self {
        Self { keys }
    }
}

impl From<Vec<(&str, Direction)>> for SortSpec {
    fn from(keys: Vec<(&str, Direction)>) -> Self {
        Self {
            keys: keys
                .into_iter()
                .map(|(field, direction)| (field.to_string(), direction))
                .collect(),
        }
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .keys
            .iter()
            .map(|(field, direction)| {
                format!("{} {}", field, format!("{:?}", direction).to_lowercase())
            })
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Parser output.
///
/// A specification with exactly one group parses to `Single`; anything else
/// parses to `Many`. Use [`SortKeys::into_specs`] when a uniform list is
/// preferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKeys {
    Single(SortSpec),
    Many(Vec<SortSpec>),
}

impl SortKeys {
    fn from_groups(mut groups: Vec<SortSpec>) -> Self {
        if groups.len() == 1 {
            SortKeys::Single(groups.remove(0))
        } else {
            SortKeys::Many(groups)
        }
    }

    pub fn into_specs(self) -> Vec<SortSpec> {
        match self {
            SortKeys::Single(spec) => vec![spec],
            SortKeys::Many(specs) => specs,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            SortKeys::Single(spec) => spec.is_empty(),
            SortKeys::Many(specs) => specs.is_empty(),
        }
    }

    /// Driver sort document. Sorting takes exactly one key group.
    pub fn to_sort_document(&self) -> Result<Document> {
        match self {
            SortKeys::Single(spec) => Ok(spec.to_document()),
            SortKeys::Many(specs) => Err(MongormError::Query(format!(
                "a sort takes one key group, got {}",
                specs.len()
            ))),
        }
    }
}

/// A sort argument: either a string to parse or an already built key list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortInput {
    Text(String),
    Keys(SortSpec),
}

impl From<&str> for SortInput {
    fn from(value: &str) -> Self {
        SortInput::Text(value.to_string())
    }
}

impl From<String> for SortInput {
    fn from(value: String) -> Self {
        SortInput::Text(value)
    }
}

impl From<SortSpec> for SortInput {
    fn from(value: SortSpec) -> Self {
        SortInput::Keys(value)
    }
}

impl From<Vec<(&str, Direction)>> for SortInput {
    fn from(value: Vec<(&str, Direction)>) -> Self {
        SortInput::Keys(value.into())
    }
}

/// Parse a sort argument.
///
/// `None` passes through as `None`, and a prebuilt key list is returned as is.
pub fn get_sort(input: Option<SortInput>, for_index: bool) -> Result<Option<SortKeys>> {
    match input {
        None => Ok(None),
        Some(SortInput::Keys(spec)) => Ok(Some(SortKeys::Single(spec))),
        Some(SortInput::Text(text)) => parse(Some(&text), for_index),
    }
}

/// Parse a specification string.
pub fn parse(spec: Option<&str>, for_index: bool) -> Result<Option<SortKeys>> {
    match spec {
        None => Ok(None),
        Some(text) => {
            parse_groups(text, for_index).map(|groups| Some(SortKeys::from_groups(groups)))
        }
    }
}

/// Parse a specification string into one [`SortSpec`] per non-empty group.
pub fn parse_groups(spec: &str, for_index: bool) -> Result<Vec<SortSpec>> {
    let mut groups = Vec::new();

    for group in spec.split(';').map(str::trim).filter(|g| !g.is_empty()) {
        let mut keys = Vec::new();
        for item in group.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            keys.push(parse_item(item, for_index)?);
        }

        if !keys.is_empty() {
            groups.push(SortSpec { keys });
        }
    }

    Ok(groups)
}

/// `field [direction [ignored...]]`
fn parse_item(item: &str, for_index: bool) -> Result<(String, Direction)> {
    let mut tokens = item.split_whitespace();
    // item is trimmed and non-empty, so there is always a first token
    let field = tokens.next().unwrap_or(item).to_string();
    let direction = match tokens.next() {
        Some(token) => Direction::resolve(token, for_index)?,
        None => Direction::Ascending,
    };
    Ok((field, direction))
}
