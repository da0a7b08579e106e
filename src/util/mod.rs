pub(crate) const TRUNCATE_AT: usize = 25;

/// Shortens `text` to `max_chars` characters, marking the cut with "...".
pub(crate) fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Index at which an undone deletion goes back into the live list.
///
/// `original` is the restored entry's pinned index; `others` are the pinned
/// indices of every other deletion still waiting for confirmation. Each one
/// pinned strictly before `original` is absent from the live list, so it
/// shifts the target left by one. Ties do not shift.
pub(crate) fn calculate_index_to_restore(original: usize, others: &[usize]) -> usize {
    let shift = others.iter().filter(|&&k| k < original).count();
    original - shift
}

#[cfg(target_arch = "wasm32")]
pub(crate) fn now_ms() -> i64 {
    js_sys::Date::now().round() as i64
}

#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
