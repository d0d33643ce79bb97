//! Input validation run before any backend call. Keep logic minimal and
//! deterministic.

use crate::{Attributes, NewTag, StoreError};

/// Longest id or name accepted from callers.
pub const MAX_KEY_LEN: usize = 255;

/// Validate a caller-supplied identifier (record id, organization id, upgrade name).
pub fn validate_key(field: &str, value: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::Validation(format!("{field} must not be blank")));
    }
    if value.len() > MAX_KEY_LEN {
        return Err(StoreError::Validation(format!(
            "{field} exceeds {MAX_KEY_LEN} bytes"
        )));
    }
    Ok(())
}

/// Validate an optional id: absent is fine, present must be a valid key.
pub fn validate_optional_id(id: Option<&str>) -> Result<(), StoreError> {
    match id {
        Some(id) => validate_key("id", id),
        None => Ok(()),
    }
}

/// Attribute keys must be non-blank; values are free-form.
pub fn validate_attributes(attrs: &Attributes) -> Result<(), StoreError> {
    if attrs.keys().any(|k| k.trim().is_empty()) {
        return Err(StoreError::Validation(
            "additional information keys must not be blank".into(),
        ));
    }
    Ok(())
}

/// Tags need a name and an owning organization.
pub fn validate_new_tag(tag: &NewTag) -> Result<(), StoreError> {
    validate_optional_id(tag.id.as_deref())?;
    validate_tag_fields(&tag.name, &tag.organization_id)
}

pub fn validate_tag_fields(name: &str, organization_id: &str) -> Result<(), StoreError> {
    if name.trim().is_empty() {
        return Err(StoreError::Validation("tag name must not be blank".into()));
    }
    validate_key("organization_id", organization_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_reject_blank_and_oversized() {
        assert!(validate_key("id", "abc").is_ok());
        assert!(validate_key("id", "   ").is_err());
        assert!(validate_key("id", &"x".repeat(MAX_KEY_LEN + 1)).is_err());
    }

    #[test]
    fn attribute_keys_must_not_be_blank() {
        let mut attrs = Attributes::new();
        attrs.insert("key1".into(), String::new());
        assert!(validate_attributes(&attrs).is_ok());
        attrs.insert(" ".into(), "v".into());
        assert!(matches!(
            validate_attributes(&attrs),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn new_tag_requires_name_and_organization() {
        let ok = NewTag {
            name: "prod".into(),
            organization_id: "DEFAULT".into(),
            ..Default::default()
        };
        assert!(validate_new_tag(&ok).is_ok());

        let no_name = NewTag {
            name: "".into(),
            ..ok.clone()
        };
        assert!(validate_new_tag(&no_name).is_err());

        let no_org = NewTag {
            organization_id: "".into(),
            ..ok.clone()
        };
        assert!(validate_new_tag(&no_org).is_err());

        let blank_id = NewTag {
            id: Some("".into()),
            ..ok
        };
        assert!(validate_new_tag(&blank_id).is_err());
    }
}
