//! Page-number pagination
//!
//! [`PageArgs`] turns request parameters into `(page, per_page, skip)`.
//! [`Page`] is the result of a paginated `find`: the page's objects plus the
//! total number of matching documents.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_PER_PAGE: u64 = 10;
/// Largest skip or limit the server accepts
pub const MAX_OFFSET: u64 = i64::MAX as u64;

/// Request parameter lookup.
pub trait PageSource {
    fn param(&self, name: &str) -> Option<&str>;
}

impl PageSource for HashMap<String, String> {
    fn param(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl PageSource for BTreeMap<String, String> {
    fn param(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

/// Decoded query string pairs, first occurrence wins.
impl PageSource for [(String, String)] {
    fn param(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Explicit values that take precedence over request parameters.
/// Zero counts as unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageOverrides {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

/// `(page, per_page, skip)`; all zero means no pagination.
///
/// `per_page` and `skip` never exceed [`MAX_OFFSET`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PageArgs {
    pub page: u64,
    pub per_page: u64,
    pub skip: u64,
}

impl PageArgs {
    /// A page past the server's offset range gets `skip = MAX_OFFSET`,
    /// which matches nothing.
    pub fn new(page: u64, per_page: u64) -> Self {
        if page == 0 || per_page == 0 {
            return Self::default();
        }
        let per_page = per_page.min(MAX_OFFSET);
        let skip = per_page
            .checked_mul(page - 1)
            .map_or(MAX_OFFSET, |skip| skip.min(MAX_OFFSET));
        Self {
            page,
            per_page,
            skip,
        }
    }

    /// Resolve page arguments from overrides and request parameters.
    ///
    /// Both parameter names are required, otherwise there is no pagination.
    /// Missing or non-numeric request values fall back to page 1 and
    /// 10 per page.
    pub fn from_params<S: PageSource + ?Sized>(
        page_name: Option<&str>,
        per_page_name: Option<&str>,
        overrides: PageOverrides,
        request: &S,
    ) -> Self {
        let (Some(page_name), Some(per_page_name)) = (page_name, per_page_name) else {
            return Self::default();
        };

        let page = non_zero(overrides.page)
            .unwrap_or_else(|| request_value(request, page_name, DEFAULT_PAGE));
        let per_page = non_zero(overrides.per_page)
            .unwrap_or_else(|| request_value(request, per_page_name, DEFAULT_PER_PAGE));

        Self::new(page, per_page)
    }

    pub fn is_paginated(&self) -> bool {
        self.per_page > 0
    }
}

fn non_zero(value: Option<u64>) -> Option<u64> {
    value.filter(|v| *v > 0)
}

fn request_value<S: PageSource + ?Sized>(request: &S, name: &str, default: u64) -> u64 {
    request
        .param(name)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub objects: Vec<T>,
    /// Documents matching the filter, ignoring limit and skip
    pub total: u64,
    /// 1-indexed, 0 when the query was not paginated
    pub page: u64,
    pub per_page: u64,
}

impl<T> Page<T> {
    pub fn new(objects: Vec<T>, total: u64, args: PageArgs) -> Self {
        Self {
            objects,
            total,
            page: args.page,
            per_page: args.per_page,
        }
    }

    pub fn num_pages(&self) -> u64 {
        if self.per_page == 0 {
            return if self.total == 0 { 0 } else { 1 };
        }
        self.total.div_ceil(self.per_page)
    }

    pub fn has_next(&self) -> bool {
        self.page > 0 && self.page < self.num_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.objects.iter()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            objects: self.objects.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

impl<T> IntoIterator for Page<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Page<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.iter()
    }
}
