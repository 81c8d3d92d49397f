//! Cancellation-reason vocabulary and legacy label canonicalization.

pub const NOT_GETTING_ENOUGH_REVIEWS: &str = "Not Getting Enough Reviews";
pub const TOO_EXPENSIVE: &str = "Too Expensive";
pub const NOT_SEEING_ENOUGH_VALUE: &str = "Not Seeing Enough Value";
pub const MISSING_FEATURES: &str = "Missing Features";
pub const TECHNICAL_ISSUES: &str = "Technical Issues";
pub const POOR_EXPERIENCE: &str = "Poor Experience";
pub const ONLY_NEEDED_TEMPORARILY: &str = "Only Needed Temporarily";
pub const SOMETHING_ELSE: &str = "Something Else";

/// The canonical reasons, in the order the form presents them.
pub const CANONICAL_REASONS: [&str; 8] = [
    NOT_GETTING_ENOUGH_REVIEWS,
    TOO_EXPENSIVE,
    NOT_SEEING_ENOUGH_VALUE,
    MISSING_FEATURES,
    TECHNICAL_ISSUES,
    POOR_EXPERIENCE,
    ONLY_NEEDED_TEMPORARILY,
    SOMETHING_ELSE,
];

/// Labels older clients still send. Keys are lowercase.
const LEGACY_LABELS: [(&str, &str); 3] = [
    ("found better alternative", NOT_SEEING_ENOUGH_VALUE),
    ("no longer needed", ONLY_NEEDED_TEMPORARILY),
    ("other", SOMETHING_ELSE),
];

/// Map a raw reason label to its canonical form.
///
/// Matching is case-insensitive and ignores surrounding whitespace. Labels
/// outside the table come back unchanged.
pub fn canonicalize(raw: &str) -> String {
    let key = raw.trim().to_lowercase();
    if let Some((_, canonical)) = LEGACY_LABELS.iter().find(|(legacy, _)| *legacy == key) {
        return (*canonical).to_string();
    }
    if let Some(canonical) = CANONICAL_REASONS.iter().find(|c| c.to_lowercase() == key) {
        return (*canonical).to_string();
    }
    raw.to_string()
}

/// Canonicalize every reason, dropping blanks and repeats while keeping order.
pub fn canonicalize_all<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for r in raw {
        if r.as_ref().trim().is_empty() {
            continue;
        }
        let c = canonicalize(r.as_ref());
        if !out.contains(&c) {
            out.push(c);
        }
    }
    out
}

/// Whether `reasons` (raw or canonical) contains the canonical `reason`.
pub fn contains<S: AsRef<str>>(reasons: &[S], reason: &str) -> bool {
    reasons.iter().any(|r| canonicalize(r.as_ref()) == reason)
}
