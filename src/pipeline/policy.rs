//! Field policy - classifies raw fields as leakage or usable
//!
//! Assessed-value, taxable-base and special-assessment fields are computed
//! from the current assessment, which tracks the sale price almost exactly
//! and does not exist at true prediction time. Any field whose name contains
//! one of these tokens must never reach a feature table.

/// Name tokens that mark a field as leakage (matched case-insensitively as substrings)
pub const LEAKAGE_TOKENS: &[&str] = &[
    "APRTOT", "APRLAND", "APRBLDG", "STXBL", "NSTXBL", "COTXBL", "CITXBL", "SASD", "NSASD",
    "MSASD", "MSTXBL", "OITXBL",
];

/// Returns true if the field must never be used as a feature
pub fn is_leakage(field_name: &str) -> bool {
    let upper = field_name.to_uppercase();
    LEAKAGE_TOKENS.iter().any(|token| upper.contains(token))
}

/// Get the leakage fields from a list of column names, preserving order
pub fn leakage_fields<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    names
        .iter()
        .map(|n| n.as_ref())
        .filter(|n| is_leakage(n))
        .map(|n| n.to_string())
        .collect()
}
