//! Knowledge-base article rules.

use crate::error::CoreError;
use crate::update::is_blank_html;

pub use crate::ticket::validate_title;

/// Maximum content length in bytes.
pub const MAX_CONTENT_LEN: usize = 100_000;

/// Article bodies are rich text and must contain something besides markup.
pub fn validate_content(content: &str) -> Result<String, CoreError> {
    if is_blank_html(content) {
        return Err(CoreError::Validation("Content is required".into()));
    }
    let content = content.trim();
    if content.len() > MAX_CONTENT_LEN {
        return Err(CoreError::Validation(format!(
            "Content must be at most {MAX_CONTENT_LEN} characters"
        )));
    }
    Ok(content.to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn markup_only_content_is_rejected() {
        assert_matches!(validate_content(""), Err(CoreError::Validation(_)));
        assert_matches!(validate_content("<p> </p><br/>"), Err(CoreError::Validation(_)));
    }

    #[test]
    fn oversized_content_is_rejected() {
        let long = "a".repeat(MAX_CONTENT_LEN + 1);
        assert_matches!(validate_content(&long), Err(CoreError::Validation(_)));
    }

    #[test]
    fn content_keeps_its_markup() {
        assert_eq!(
            validate_content("  <p>Reset your <b>password</b></p>\n").unwrap(),
            "<p>Reset your <b>password</b></p>"
        );
    }
}
