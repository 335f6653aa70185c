//! Canonical message names.
//!
//! A message type identifier such as `Foo::Bar::MyMessage` maps to the
//! transition key `my_message`: only the last `::` segment is kept, a word
//! break goes before every uppercase letter that follows a letter or digit,
//! and the result is lowercased.
//!
//! Adjacent capitals are split one by one, so `MyTLA` becomes `my_t_l_a`.
//! Existing names rely on this, so acronyms are not kept together.

use crate::error::CoreError;

/// Separator between namespace segments of a type identifier.
pub const SCOPE_SEPARATOR: &str = "::";

/// Derives the canonical message name for a type identifier.
pub fn derive_message_name(type_name: &str) -> Result<String, CoreError> {
    let segment = type_name
        .rsplit(SCOPE_SEPARATOR)
        .next()
        .unwrap_or_default()
        .trim();

    if segment.is_empty() {
        return Err(CoreError::InvalidIdentifier {
            identifier: type_name.to_string(),
        });
    }

    let mut name = String::with_capacity(segment.len() + 4);
    let mut prev: Option<char> = None;
    for c in segment.chars() {
        if c.is_uppercase() && prev.is_some_and(|p| p.is_alphanumeric()) {
            name.push('_');
        }
        name.extend(c.to_lowercase());
        prev = Some(c);
    }

    Ok(name)
}

/// Validates a bare message name supplied directly as a transition key.
pub fn validate_message_name(name: &str) -> Result<&str, CoreError> {
    if name.trim().is_empty() || name.contains(SCOPE_SEPARATOR) {
        return Err(CoreError::InvalidIdentifier {
            identifier: name.to_string(),
        });
    }
    Ok(name)
}
