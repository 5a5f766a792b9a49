//! Per-field validation errors.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Field name → messages, in the order problems were found.
///
/// Validation accumulates into one of these instead of stopping at the
/// first problem, so a form can show every error at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(IndexMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn extend(&mut self, field: &str, messages: impl IntoIterator<Item = String>) {
        for message in messages {
            self.add(field, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// `Ok(())` when empty, otherwise the errors themselves.
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, messages) in self.iter() {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                first = false;
                write!(f, "{field}: {message}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_in_order() {
        let mut errors = FieldErrors::new();
        errors.add("name", "cannot end in dot");
        errors.add("parent", "folder does not exist");
        errors.add("name", "forbidden name");

        assert_eq!(errors.get("name"), ["cannot end in dot", "forbidden name"]);
        assert!(errors.get("missing").is_empty());
        assert_eq!(
            serde_json::to_string(&errors).unwrap(),
            r#"{"name":["cannot end in dot","forbidden name"],"parent":["folder does not exist"]}"#
        );
        assert_eq!(
            errors.to_string(),
            "name: cannot end in dot; name: forbidden name; parent: folder does not exist"
        );
    }

    #[test]
    fn test_into_result() {
        assert!(FieldErrors::new().into_result().is_ok());
        let mut errors = FieldErrors::new();
        errors.add("password", "too short");
        assert!(errors.into_result().is_err());
    }
}
