//! Detection label lists as carried in a prediction payload.
//!
//! A payload is the comma-joined list of labels detected in one frame,
//! e.g. `mask,no-mask`.

/// Separator between labels in a payload.
pub const LABEL_SEPARATOR: char = ',';

/// Join labels into a single payload, skipping blank entries.
pub fn join_labels<S: AsRef<str>>(labels: &[S]) -> String {
    labels
        .iter()
        .map(|label| label.as_ref().trim())
        .filter(|label| !label.is_empty())
        .collect::<Vec<_>>()
        .join(&LABEL_SEPARATOR.to_string())
}

/// Split a payload into its trimmed, non-empty labels.
pub fn split_labels(payload: &str) -> impl Iterator<Item = &str> {
    payload
        .split(LABEL_SEPARATOR)
        .map(str::trim)
        .filter(|label| !label.is_empty())
}
