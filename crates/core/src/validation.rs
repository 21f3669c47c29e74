//! Field-level validation.
//!
//! Request payloads are checked field by field and every failure is collected
//! into a [`FieldErrors`] map keyed by the JSON field name, so a client gets
//! all problems in one response.

use std::collections::BTreeMap;

use serde::Serialize;

pub const MSG_REQUIRED: &str = "Field is required";
pub const MSG_EMAIL: &str = "Invalid email format";
pub const MSG_NO_SPACE: &str = "Field should not contain spaces";

/// Collected `field -> message` failures.
///
/// Only the first failure per field is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-entry map, handy for storage-level conflicts.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn merge(&mut self, other: FieldErrors) {
        for (field, message) in other.0 {
            self.add(field, message);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Start checking a text field.
    pub fn text<'a>(&'a mut self, field: &'static str, value: &'a str) -> TextCheck<'a> {
        TextCheck {
            errors: self,
            field,
            value,
            failed: false,
        }
    }

    /// Record "Field is required" when an optional value is absent.
    pub fn require<T>(&mut self, field: &'static str, value: Option<&T>) -> bool {
        if value.is_none() {
            self.add(field, MSG_REQUIRED);
            return false;
        }
        true
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl core::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

/// Chained checks over one text field. Stops at the first failure.
pub struct TextCheck<'a> {
    errors: &'a mut FieldErrors,
    field: &'static str,
    value: &'a str,
    failed: bool,
}

impl<'a> TextCheck<'a> {
    fn fail(&mut self, message: impl Into<String>) {
        self.errors.add(self.field, message);
        self.failed = true;
    }

    pub fn required(mut self) -> Self {
        if !self.failed && self.value.trim().is_empty() {
            self.fail(MSG_REQUIRED);
        }
        self
    }

    pub fn min_chars(mut self, min: usize) -> Self {
        if !self.failed && self.value.chars().count() < min {
            self.fail(format!("Field require minimum of {min} size/length/unit"));
        }
        self
    }

    pub fn max_chars(mut self, max: usize) -> Self {
        if !self.failed && self.value.chars().count() > max {
            self.fail(format!("Field require maximum of {max} size/length/unit"));
        }
        self
    }

    pub fn no_space(mut self) -> Self {
        if !self.failed && self.value.chars().any(char::is_whitespace) {
            self.fail(MSG_NO_SPACE);
        }
        self
    }

    pub fn email(mut self) -> Self {
        if !self.failed && !looks_like_email(self.value) {
            self.fail(MSG_EMAIL);
        }
        self
    }

    /// Whether every check so far passed.
    pub fn ok(self) -> bool {
        !self.failed
    }
}

fn looks_like_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty() && !tld.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_first_failure_per_field() {
        let mut errors = FieldErrors::new();
        errors.text("name", "").required().min_chars(3);
        errors.text("email", "nope").required().email();
        errors.text("username", "has space").no_space();

        assert_eq!(errors.get("name"), Some(MSG_REQUIRED));
        assert_eq!(errors.get("email"), Some(MSG_EMAIL));
        assert_eq!(errors.get("username"), Some(MSG_NO_SPACE));
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn length_bounds_count_chars() {
        let mut errors = FieldErrors::new();
        assert!(!errors.text("name", "ab").min_chars(3).ok());
        assert_eq!(
            errors.get("name"),
            Some("Field require minimum of 3 size/length/unit")
        );

        let mut errors = FieldErrors::new();
        assert!(errors.text("name", "äöü").min_chars(3).max_chars(3).ok());
        assert!(errors.is_empty());
    }

    #[test]
    fn email_shape() {
        assert!(looks_like_email("admin@example.com"));
        assert!(!looks_like_email("admin@example"));
        assert!(!looks_like_email("@example.com"));
        assert!(!looks_like_email("a@b@c.com"));
        assert!(!looks_like_email("a b@c.com"));
    }

    #[test]
    fn require_and_into_result() {
        let mut errors = FieldErrors::new();
        assert!(!errors.require::<i64>("role_id", None));
        assert_eq!(errors.get("role_id"), Some(MSG_REQUIRED));
        assert!(errors.into_result().is_err());

        let mut errors = FieldErrors::new();
        assert!(errors.require("role_id", Some(&1_i64)));
        assert!(errors.into_result().is_ok());
    }

    #[test]
    fn serializes_as_flat_map() {
        let errors = FieldErrors::single("name", "Role name Admin already exist");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json["name"], "Role name Admin already exist");
    }
}
