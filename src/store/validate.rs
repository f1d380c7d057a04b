//! Input validation for the write path

use super::error::{StoreError, StoreResult};
use crate::model::{CharacterDynamic, PageSpan};
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

/// Publication years accepted for an edition
pub const YEAR_RANGE: RangeInclusive<i32> = 1450..=2100;

pub fn non_empty(field: &'static str, value: &str) -> StoreResult<()> {
    if value.trim().is_empty() {
        return Err(StoreError::validation(field, "must not be empty"));
    }
    Ok(())
}

pub fn positive(field: &'static str, value: u32) -> StoreResult<()> {
    if value == 0 {
        return Err(StoreError::validation(field, "must be greater than 0"));
    }
    Ok(())
}

/// Two ASCII letters; returned lowercased
pub fn language(code: &str) -> StoreResult<String> {
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(StoreError::validation(
            "language",
            format!("'{code}' is not a two-letter code"),
        ));
    }
    Ok(code.to_ascii_lowercase())
}

pub fn year(year: Option<i32>) -> StoreResult<()> {
    match year {
        Some(y) if !YEAR_RANGE.contains(&y) => Err(StoreError::validation(
            "year",
            format!(
                "{y} outside {}..={}",
                YEAR_RANGE.start(),
                YEAR_RANGE.end()
            ),
        )),
        _ => Ok(()),
    }
}

pub fn page_span(pages: PageSpan) -> StoreResult<()> {
    if let Some(start) = pages.start {
        positive("page_start", start)?;
    }
    if let Some(end) = pages.end {
        positive("page_end", end)?;
    }
    if let (Some(start), Some(end)) = (pages.start, pages.end) {
        if start > end {
            return Err(StoreError::validation(
                "page_start",
                format!("page_start {start} > page_end {end}"),
            ));
        }
    }
    Ok(())
}

/// Deduplicate and sort tags, rejecting blank ones
pub fn story_threads(tags: Vec<String>) -> StoreResult<BTreeSet<String>> {
    tags.into_iter()
        .map(|tag| {
            non_empty("story_threads", &tag)?;
            Ok::<_, StoreError>(tag)
        })
        .collect()
}

pub fn character_dynamics(dynamics: &[CharacterDynamic]) -> StoreResult<()> {
    for dynamic in dynamics {
        non_empty("character_dynamics.from", &dynamic.from)?;
        non_empty("character_dynamics.to", &dynamic.to)?;
    }
    Ok(())
}
