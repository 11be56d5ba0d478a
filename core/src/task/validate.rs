//! Synchronous request validation, run before a task id is allocated.

use crate::error::ValidationError;

use super::types::TaskRequest;

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_CONTEXT_CHARS: usize = 4000;
pub const MAX_OPTIONS: usize = 32;
pub const MAX_OPTION_KEY_CHARS: usize = 64;

pub fn validate_request(request: &TaskRequest) -> Result<(), ValidationError> {
    let title = request.subject_title.trim();
    if title.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    let len = title.chars().count();
    if len > MAX_TITLE_CHARS {
        return Err(ValidationError::TitleTooLong {
            len,
            max: MAX_TITLE_CHARS,
        });
    }
    if title.chars().any(char::is_control) {
        return Err(ValidationError::TitleControlChars);
    }

    if let Some(ctx) = request.additional_context.as_deref() {
        let len = ctx.chars().count();
        if len > MAX_CONTEXT_CHARS {
            return Err(ValidationError::ContextTooLong {
                len,
                max: MAX_CONTEXT_CHARS,
            });
        }
    }

    if request.options.len() > MAX_OPTIONS {
        return Err(ValidationError::TooManyOptions {
            count: request.options.len(),
            max: MAX_OPTIONS,
        });
    }
    for key in request.options.keys() {
        let valid = !key.is_empty()
            && key.chars().count() <= MAX_OPTION_KEY_CHARS
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(ValidationError::InvalidOptionKey(key.clone()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::SubjectType;

    fn req(title: &str) -> TaskRequest {
        TaskRequest::new(title, SubjectType::Quest)
    }

    #[test]
    fn accepts_plain_request() {
        assert!(validate_request(&req("The Sunken Crown")).is_ok());
    }

    #[test]
    fn rejects_blank_title() {
        assert_eq!(validate_request(&req("   ")), Err(ValidationError::EmptyTitle));
    }

    #[test]
    fn title_length_boundary() {
        assert!(validate_request(&req(&"a".repeat(MAX_TITLE_CHARS))).is_ok());
        assert!(matches!(
            validate_request(&req(&"a".repeat(MAX_TITLE_CHARS + 1))),
            Err(ValidationError::TitleTooLong { .. })
        ));
    }

    #[test]
    fn rejects_control_characters() {
        assert_eq!(
            validate_request(&req("bad\u{7}title")),
            Err(ValidationError::TitleControlChars)
        );
    }

    #[test]
    fn rejects_long_context() {
        let r = req("ok").with_context("x".repeat(MAX_CONTEXT_CHARS + 1));
        assert!(matches!(
            validate_request(&r),
            Err(ValidationError::ContextTooLong { .. })
        ));
    }

    #[test]
    fn option_keys_are_checked() {
        let ok = req("ok").with_option("tone-level_2", serde_json::json!("dark"));
        assert!(validate_request(&ok).is_ok());

        let bad = req("ok").with_option("has space", serde_json::json!(1));
        assert_eq!(
            validate_request(&bad),
            Err(ValidationError::InvalidOptionKey("has space".into()))
        );
    }

    #[test]
    fn too_many_options() {
        let mut r = req("ok");
        for i in 0..=MAX_OPTIONS {
            r = r.with_option(format!("k{i}"), serde_json::json!(i));
        }
        assert!(matches!(
            validate_request(&r),
            Err(ValidationError::TooManyOptions { .. })
        ));
    }
}
