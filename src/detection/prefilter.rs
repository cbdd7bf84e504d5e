//! Cheap checks on a candidate's type string, applied before any fetch.

use crate::types::type_tag::normalize_type;

const SWAP_MARKER: &str = "::swap";

/// True when the type names a swap struct with generic arguments,
/// e.g. `0x..::pool::SwapEvent<A, B>` or `0x..::router::Swapped<T>`.
pub fn is_swap_like(event_type: &str) -> bool {
    let lower = event_type.to_ascii_lowercase();
    let mut rest = lower.as_str();

    while let Some(idx) = rest.find(SWAP_MARKER) {
        let tail = &rest[idx + SWAP_MARKER.len()..];
        let name_end = tail
            .find(|c: char| !(c.is_ascii_alphabetic() || c == '_'))
            .unwrap_or(tail.len());
        if tail[name_end..].starts_with('<') {
            return true;
        }
        rest = tail;
    }
    false
}

/// Textual reference to the tracked coin type, in either its configured
/// spelling or its fully padded form
pub fn references_token(event_type: &str, tracked_type: &str) -> bool {
    if event_type.contains(tracked_type) {
        return true;
    }
    let full = normalize_type(tracked_type);
    full != tracked_type && event_type.contains(&full)
}

/// The fast-reject rule: swap-shaped and parameterized by the tracked token
pub fn type_matches(event_type: &str, tracked_type: &str) -> bool {
    is_swap_like(event_type) && references_token(event_type, tracked_type)
}
