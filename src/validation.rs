//! Validation engine: pure functions from [`InputState`] to field errors.
//!
//! Three independent rules are evaluated in a fixed order, document →
//! model → pages. Every rule's outcome is recorded in [`ValidationState`]
//! for field-level display, but only the first failure becomes the single
//! user-visible message ([`ValidationState::first_error`]).
//!
//! Nothing here has side effects. Whether the errors are *shown* is decided
//! by the controller's arming flag, not by this module.

use crate::config::PageSelection;
use std::cmp::Ordering;
use crate::error::ValidationError;
use crate::input::{Document, InputState};

/// Derived validation result. Recomputed on demand, never edited directly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationState {
    pub document: Option<ValidationError>,
    pub model: Option<ValidationError>,
    pub pages: Option<ValidationError>,
}

impl ValidationState {
    pub fn has_errors(&self) -> bool {
        self.document.is_some() || self.model.is_some() || self.pages.is_some()
    }

    /// The first failing rule in document → model → pages order.
    pub fn first_error(&self) -> Option<&ValidationError> {
        self.document
            .as_ref()
            .or(self.model.as_ref())
            .or(self.pages.as_ref())
    }
}

/// Evaluate all three rules against `input`.
pub fn validate(input: &InputState, max_document_bytes: u64) -> ValidationState {
    ValidationState {
        document: check_document(input.document.as_ref(), max_document_bytes).err(),
        model: check_model(&input.model_id).err(),
        pages: parse_page_selector(&input.page_selector).err(),
    }
}

/// Whether a submission may be issued right now.
pub fn can_submit(
    input: &InputState,
    validation: &ValidationState,
    request_in_flight: bool,
    max_document_bytes: u64,
) -> bool {
    let Some(document) = input.document.as_ref() else {
        return false;
    };
    !input.model_id.is_empty()
        && !request_in_flight
        && document.size() <= max_document_bytes
        && !validation.has_errors()
}

fn check_document(document: Option<&Document>, max_bytes: u64) -> Result<(), ValidationError> {
    let document = document.ok_or(ValidationError::MissingDocument)?;
    if document.size() > max_bytes {
        return Err(ValidationError::DocumentTooLarge {
            size: document.size(),
            max_bytes,
        });
    }
    Ok(())
}

fn check_model(model_id: &str) -> Result<(), ValidationError> {
    if model_id.is_empty() {
        return Err(ValidationError::MissingModel);
    }
    Ok(())
}

/// Parse a raw page selector.
///
/// * `""`      → [`PageSelection::All`]
/// * `"3-15"`  → [`PageSelection::Range`]; both ends integers, `1 ≤ start ≤ end`
/// * `"1,3,5"` → [`PageSelection::Set`]; every entry an integer `≥ 1`
///
/// Whitespace around numbers is ignored. Page numbers too large for `usize`
/// are still valid and saturate to `usize::MAX`.
pub fn parse_page_selector(selector: &str) -> Result<PageSelection, ValidationError> {
    if selector.is_empty() {
        return Ok(PageSelection::All);
    }

    if let Some((start, end)) = selector.split_once('-') {
        let start = page_digits(start).ok_or(ValidationError::InvalidPageRange)?;
        let end = page_digits(end).ok_or(ValidationError::InvalidPageRange)?;
        if compare_digits(end, start) == Ordering::Less {
            return Err(ValidationError::InvalidPageRange);
        }
        return Ok(PageSelection::Range(page_number(start), page_number(end)));
    }

    selector
        .split(',')
        .map(|p| {
            page_digits(p)
                .map(page_number)
                .ok_or(ValidationError::InvalidPageList)
        })
        .collect::<Result<Vec<_>, _>>()
        .map(PageSelection::Set)
}

/// The digits of a positive integer, without sign or leading zeros.
fn page_digits(s: &str) -> Option<&str> {
    let s = s.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits = s.trim_start_matches('0');
    (!digits.is_empty()).then_some(digits)
}

/// Numeric order of two normalised digit strings of any length.
fn compare_digits(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn page_number(digits: &str) -> usize {
    digits.parse().unwrap_or(usize::MAX)
}
