//! Keeps identifier comparisons consistent across the two sides of a join.

use std::borrow::Cow;

use tracing::warn;

/// How identifiers are compared for one join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdRepr {
    /// Every id on both sides is integer-like; compare canonical integers.
    Integer,
    /// Compare trimmed strings.
    Text,
}

/// Returns the canonical integer form of `id` when it looks like an integer
/// (`"12"`, `"012"`, `"12.0"`).
pub fn integer_form(id: &str) -> Option<i64> {
    let trimmed = id.trim();
    let digits = trimmed.strip_suffix(".0").unwrap_or(trimmed);
    digits.parse::<i64>().ok()
}

fn all_integer<'a>(ids: impl IntoIterator<Item = &'a str>) -> bool {
    ids.into_iter().all(|id| integer_form(id).is_some())
}

/// Picks the representation for a join between `left` and `right` ids.
///
/// If only one side is integer-like the comparison falls back to strings on
/// both sides and the mismatch is logged under `context`.
pub fn reconcile<'a, 'b>(
    context: &str,
    left: impl IntoIterator<Item = &'a str>,
    right: impl IntoIterator<Item = &'b str>,
) -> IdRepr {
    let left_integer = all_integer(left);
    let right_integer = all_integer(right);
    match (left_integer, right_integer) {
        (true, true) => IdRepr::Integer,
        (false, false) => IdRepr::Text,
        (left_integer, right_integer) => {
            warn!(
                context,
                left_integer, right_integer, "identifier types differ across join, comparing both sides as text"
            );
            IdRepr::Text
        }
    }
}

/// Canonical join key for `id` under `repr`.
pub fn canonical(id: &str, repr: IdRepr) -> Cow<'_, str> {
    match repr {
        IdRepr::Integer => match integer_form(id) {
            Some(value) => Cow::Owned(value.to_string()),
            None => Cow::Borrowed(id.trim()),
        },
        IdRepr::Text => Cow::Borrowed(id.trim()),
    }
}
