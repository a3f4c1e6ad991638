//! Credential value normalization.
//!
//! Every layer treats a string that is empty after trimming as absent.

/// Trim a credential value, mapping blank input to `None`.
pub fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
}

/// Returns the first present (non-blank) value, trimmed.
pub fn first_present<'a, I>(values: I) -> Option<String>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    values.into_iter().find_map(normalize)
}
