//! Common validation utilities.

use validator::ValidationError;

/// Maximum length of a role slug.
const MAX_ROLE_LENGTH: usize = 64;

/// Maximum length of a class/group name.
const MAX_GROUP_NAME_LENGTH: usize = 200;

lazy_static::lazy_static! {
    static ref ROLE_REGEX: regex::Regex = regex::Regex::new(r"^[a-z0-9_\-]+$").unwrap();
    static ref CODE_INPUT_REGEX: regex::Regex =
        regex::Regex::new(r"^\s*[A-Za-z0-9][A-Za-z0-9\-]{2,63}\s*$").unwrap();
}

/// Validates a role slug (lowercase letters, digits, `_` and `-`).
pub fn validate_role(role: &str) -> Result<(), ValidationError> {
    if role.len() > MAX_ROLE_LENGTH || !ROLE_REGEX.is_match(role) {
        let mut err = ValidationError::new("role_format");
        err.message =
            Some("Role must be a lowercase slug of letters, digits, '_' or '-'".into());
        return Err(err);
    }
    Ok(())
}

/// Validates a class/group name. Blank names are allowed and mean "unrestricted".
pub fn validate_group_name(name: &str) -> Result<(), ValidationError> {
    if name.chars().count() > MAX_GROUP_NAME_LENGTH {
        let mut err = ValidationError::new("group_name_length");
        err.message = Some("Group name must be at most 200 characters".into());
        return Err(err);
    }
    if name.chars().any(char::is_control) {
        let mut err = ValidationError::new("group_name_format");
        err.message = Some("Group name must not contain control characters".into());
        return Err(err);
    }
    Ok(())
}

/// Validates a user-submitted code string before lookup.
///
/// Surrounding whitespace and lowercase letters are accepted; the service
/// normalizes them away.
pub fn validate_code_input(code: &str) -> Result<(), ValidationError> {
    if !CODE_INPUT_REGEX.is_match(code) {
        let mut err = ValidationError::new("code_format");
        err.message = Some("Code must be 3-64 letters, digits or '-'".into());
        return Err(err);
    }
    Ok(())
}

/// Validates a CSV delimiter: a single printable, non-alphanumeric character
/// that is not a quote, or a tab.
pub fn validate_delimiter(delimiter: char) -> Result<(), ValidationError> {
    let ok = delimiter == '\t'
        || (delimiter.is_ascii_punctuation() && delimiter != '"')
        || delimiter == ' ';
    if !ok {
        let mut err = ValidationError::new("delimiter");
        err.message = Some("Delimiter must be a punctuation character or a tab".into());
        return Err(err);
    }
    Ok(())
}
