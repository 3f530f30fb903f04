//! Operation signatures
//!
//! These structs map directly onto the catalog payload served by the
//! processing backend: one entry per operation, with a return type and an
//! ordered parameter list. Type names may carry generic annotations
//! (`List<Number>`); those are stripped at catalog-storage time because
//! member binding compares base type names only.

use serde::{Deserialize, Serialize};

// =============================================================================
// SIGNATURE TYPES
// =============================================================================

/// Declared signature of one catalog operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationSignature {
    /// Fully qualified operation name, e.g. "Image.constant"
    #[serde(default)]
    pub name: String,

    /// Return type name
    pub returns: String,

    /// Ordered parameter descriptors
    #[serde(default)]
    pub args: Vec<ParameterSpec>,

    #[serde(default)]
    pub description: String,

    /// Hidden operations are catalogued but never bound as members
    #[serde(default)]
    pub hidden: bool,

    /// Preview operations are bound but flagged in their documentation
    #[serde(default)]
    pub preview: bool,

    /// Deprecation reason; calling a deprecated member warns but executes
    #[serde(default)]
    pub deprecated: Option<String>,
}

/// One declared parameter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub type_name: String,

    #[serde(default)]
    pub optional: bool,

    /// Server-side default; absent optional arguments are simply omitted
    /// from the invocation and the server fills this in.
    #[serde(default)]
    pub default: Option<serde_json::Value>,

    #[serde(default)]
    pub description: String,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    pub fn optional(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            optional: true,
            ..Default::default()
        }
    }

    /// A parameter is required when it is not optional and carries no
    /// server-side default.
    pub fn is_required(&self) -> bool {
        !self.optional && self.default.is_none()
    }
}

impl OperationSignature {
    /// Check if the signature declares a parameter with the given name
    pub fn accepts_arg(&self, key: &str) -> bool {
        self.args.iter().any(|a| a.name == key)
    }

    /// Get required parameter names in declared order
    pub fn required_arg_names(&self) -> Vec<&str> {
        self.args
            .iter()
            .filter(|a| a.is_required())
            .map(|a| a.name.as_str())
            .collect()
    }

    /// Normalize all type names by stripping generic annotations, and fill
    /// in the operation name when the catalog payload keys it externally.
    pub(crate) fn normalize(&mut self, name: &str) {
        if self.name.is_empty() {
            self.name = name.to_string();
        }
        self.returns = strip_generic(&self.returns);
        for arg in &mut self.args {
            arg.type_name = strip_generic(&arg.type_name);
        }
    }

    /// Assemble the human-readable description attached to a bound member:
    /// the operation description followed by one line per argument.
    pub fn docstring(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.name);
        if !self.description.is_empty() {
            out.push('\n');
            out.push_str(&self.description);
        }
        if self.preview {
            out.push_str("\n\nPREVIEW: this operation may change or be removed.");
        }
        if let Some(reason) = &self.deprecated {
            out.push_str("\n\nDEPRECATED: ");
            out.push_str(reason);
        }
        if !self.args.is_empty() {
            out.push_str("\n\nArgs:");
            for arg in &self.args {
                out.push_str("\n  ");
                out.push_str(&arg.name);
                out.push_str(" (");
                out.push_str(&arg.type_name);
                if arg.optional || arg.default.is_some() {
                    out.push_str(", optional");
                }
                out.push(')');
                if !arg.description.is_empty() {
                    out.push_str(": ");
                    out.push_str(&arg.description);
                }
            }
        }
        out
    }
}

/// Strip an embedded generic-parameter annotation from a type name:
/// `List<Number>` becomes `List`. Member binding and promotion operate on
/// base type names only.
pub fn strip_generic(type_name: &str) -> String {
    match type_name.find('<') {
        Some(idx) => type_name[..idx].trim().to_string(),
        None => type_name.trim().to_string(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_generic() {
        assert_eq!(strip_generic("List<Number>"), "List");
        assert_eq!(strip_generic("Dictionary<Object>"), "Dictionary");
        assert_eq!(strip_generic("Image"), "Image");
        assert_eq!(strip_generic("Array<Number, 2>"), "Array");
    }

    #[test]
    fn test_deserialize_catalog_payload() {
        let json = r#"{
            "returns": "Image",
            "description": "Creates a constant image.",
            "args": [
                {"name": "value", "type": "Object", "description": "The value."}
            ]
        }"#;
        let mut sig: OperationSignature = serde_json::from_str(json).unwrap();
        sig.normalize("Image.constant");
        assert_eq!(sig.name, "Image.constant");
        assert_eq!(sig.returns, "Image");
        assert_eq!(sig.args.len(), 1);
        assert!(sig.args[0].is_required());
    }

    #[test]
    fn test_normalize_strips_generics() {
        let mut sig = OperationSignature {
            returns: "List<Image>".to_string(),
            args: vec![ParameterSpec::new("values", "List<Number>")],
            ..Default::default()
        };
        sig.normalize("Test.op");
        assert_eq!(sig.returns, "List");
        assert_eq!(sig.args[0].type_name, "List");
    }

    #[test]
    fn test_required_arg_names() {
        let sig = OperationSignature {
            name: "Test.op".to_string(),
            returns: "Image".to_string(),
            args: vec![
                ParameterSpec::new("a", "Image"),
                ParameterSpec::optional("b", "Number"),
            ],
            ..Default::default()
        };
        assert_eq!(sig.required_arg_names(), vec!["a"]);
        assert!(sig.accepts_arg("b"));
        assert!(!sig.accepts_arg("c"));
    }

    #[test]
    fn test_docstring_mentions_deprecation_and_args() {
        let sig = OperationSignature {
            name: "Image.clip".to_string(),
            returns: "Image".to_string(),
            description: "Clips an image to a geometry.".to_string(),
            deprecated: Some("Use clipToCollection.".to_string()),
            args: vec![ParameterSpec::new("geometry", "Geometry")],
            ..Default::default()
        };
        let doc = sig.docstring();
        assert!(doc.contains("Image.clip"));
        assert!(doc.contains("DEPRECATED: Use clipToCollection."));
        assert!(doc.contains("geometry (Geometry)"));
    }
}
