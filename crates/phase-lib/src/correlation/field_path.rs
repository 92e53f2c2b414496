//! Container name extraction from involved-object field paths

use crate::error::FieldPathError;

/// Extract the container name from a field path such as `spec.containers{web}`
///
/// The name is the text after the first `{`, up to the next brace.
pub fn container_name(field_path: &str) -> Result<&str, FieldPathError> {
    let (_, rest) = field_path
        .split_once('{')
        .ok_or_else(|| FieldPathError::MissingDelimiter(field_path.to_string()))?;

    let name = rest.split(['{', '}']).next().unwrap_or_default();
    if name.is_empty() {
        return Err(FieldPathError::EmptyContainerName(field_path.to_string()));
    }

    Ok(name)
}
