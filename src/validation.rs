use unicode_properties::{GeneralCategory, GeneralCategoryGroup, UnicodeGeneralCategory};

/// Validate free-text user input against a length cap and character rules.
///
/// Returns `None` when the value is acceptable, or a user-readable message
/// naming the field. Length is counted in Unicode scalar values, not bytes.
pub fn validate_user_text(value: &str, max_length: usize, field_label: &str) -> Option<String> {
    if value.chars().count() > max_length {
        return Some(format!(
            "{field_label} must be {max_length} characters or fewer."
        ));
    }

    if !value.chars().all(permitted) {
        return Some(format!("{field_label} contains unsupported characters."));
    }

    None
}

/// Letters, numbers, space separators and punctuation, plus the whitespace
/// controls multi-line captions need. Everything else is rejected, notably
/// symbols, format characters (zero-width spaces, bidi overrides) and
/// line/paragraph separators.
fn permitted(c: char) -> bool {
    matches!(c, '\t' | '\r' | '\n')
        || c.general_category() == GeneralCategory::SpaceSeparator
        || matches!(
            c.general_category_group(),
            GeneralCategoryGroup::Letter
                | GeneralCategoryGroup::Number
                | GeneralCategoryGroup::Punctuation
        )
}

/// Field length caps used across the application.
pub mod limits {
    pub const ALBUM_NAME: usize = 120;
    pub const CAPTION_CREATE: usize = 500;
    pub const CAPTION_EDIT: usize = 5000;
    pub const NAME: usize = 100;
    pub const BIO: usize = 1000;
}
