//! Member binding
//!
//! Exposes catalog namespaces as callable members of domain types. Rather
//! than injecting members into types at runtime, each domain type owns a
//! `MemberTable` populated by an explicit `bind` call at startup: every
//! catalog entry `"<prefix>.<suffix>"` becomes a member named
//! `<member_prefix><suffix>`, dispatched as an instance operation when its
//! first declared parameter is type-compatible with the table's type, and as
//! a static operation otherwise.
//!
//! Hand-written members are registered up front with `register_manual` and
//! always win: `bind` never overwrites them and `unbind` never removes them.
//! Bound members carry their catalog signature, which is what makes `unbind`
//! an exact inverse of `bind`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::catalog::AlgorithmCatalog;
use crate::error::{ExprError, Result};
use crate::ops::{CatalogOperation, OpRef};
use crate::value::Value;

// =============================================================================
// MEMBER TYPES
// =============================================================================

/// Whether a member dispatches on a receiver or stands alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// First declared parameter is the receiver; callers pass it as the
    /// leading positional argument.
    Instance,
    Static,
}

/// A catalog operation installed as a member
#[derive(Debug, Clone)]
pub struct BoundMember {
    pub name: String,
    pub kind: MemberKind,
    pub operation: Arc<CatalogOperation>,
    /// Human-readable description assembled from the signature
    pub docs: String,
}

/// Handler attached to a hand-written member so it can still be invoked
/// through the table.
pub type ManualFn = dyn Fn(Vec<Value>, Vec<(String, Value)>) -> Result<Value> + Send + Sync;

/// A member table entry: catalog-bound, or hand-written (which may or may
/// not carry an invocable handler).
pub enum Member {
    Bound(BoundMember),
    Manual(Option<Arc<ManualFn>>),
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::Bound(b) => f.debug_tuple("Bound").field(b).finish(),
            Member::Manual(handler) => f
                .debug_tuple("Manual")
                .field(&handler.is_some())
                .finish(),
        }
    }
}

// =============================================================================
// MEMBER TABLE
// =============================================================================

/// The callable members of one domain type
#[derive(Debug, Default)]
pub struct MemberTable {
    type_name: String,
    members: BTreeMap<String, Member>,
}

impl MemberTable {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            members: BTreeMap::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Reserve a member name for a hand-written implementation; `bind` will
    /// not overwrite it.
    pub fn register_manual(&mut self, name: impl Into<String>) {
        self.members.insert(name.into(), Member::Manual(None));
    }

    /// Reserve a member name for a hand-written implementation that can also
    /// be invoked through the table.
    pub fn register_manual_with(&mut self, name: impl Into<String>, handler: Arc<ManualFn>) {
        self.members.insert(name.into(), Member::Manual(Some(handler)));
    }

    /// Install every catalog entry under `"<prefix>."` as a member. Returns
    /// the number of members installed. Safe to call repeatedly; hidden
    /// operations and deeper namespaces are skipped, hand-written members
    /// are left alone (the operation still counts as exposed).
    pub fn bind(
        &mut self,
        catalog: &AlgorithmCatalog,
        prefix: &str,
        member_prefix: &str,
    ) -> Result<usize> {
        let namespace = format!("{}.", prefix);
        let mut installed = 0;

        for full_name in catalog.names_with_prefix(&namespace) {
            let suffix = &full_name[namespace.len()..];
            if suffix.is_empty() || suffix.contains('.') {
                continue;
            }
            let signature = catalog.lookup(&full_name)?;
            if signature.hidden {
                continue;
            }

            let member_name = escape_reserved(format!("{}{}", member_prefix, suffix));
            if matches!(self.members.get(&member_name), Some(Member::Manual(_))) {
                catalog.mark_bound(&full_name);
                continue;
            }

            let kind = match signature.args.first() {
                Some(first) if is_compatible(&first.type_name, &self.type_name) => {
                    MemberKind::Instance
                }
                _ => MemberKind::Static,
            };
            let docs = signature.docstring();
            self.members.insert(
                member_name.clone(),
                Member::Bound(BoundMember {
                    name: member_name,
                    kind,
                    operation: Arc::new(CatalogOperation::from_signature(signature)),
                    docs,
                }),
            );
            catalog.mark_bound(&full_name);
            installed += 1;
        }

        Ok(installed)
    }

    /// Remove every bound member, leaving hand-written ones in place, and
    /// release their bound-name records. Exact inverse of `bind`.
    pub fn unbind(&mut self, catalog: &AlgorithmCatalog) {
        self.members.retain(|_, member| match member {
            Member::Bound(bound) => {
                catalog.unmark_bound(bound.operation.name());
                false
            }
            Member::Manual(_) => true,
        });
    }

    pub fn get(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    /// Get a bound member (hand-written members return None)
    pub fn bound(&self, name: &str) -> Option<&BoundMember> {
        match self.members.get(name) {
            Some(Member::Bound(b)) => Some(b),
            _ => None,
        }
    }

    /// Member names in deterministic order
    pub fn member_names(&self) -> Vec<&str> {
        self.members.keys().map(|k| k.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Description of a bound member
    pub fn docs(&self, name: &str) -> Option<&str> {
        self.bound(name).map(|b| b.docs.as_str())
    }

    /// Invoke a member. Instance members expect their receiver as the first
    /// positional argument. Deprecated operations warn but still execute.
    pub fn invoke(
        &self,
        name: &str,
        positional: Vec<Value>,
        named: Vec<(String, Value)>,
    ) -> Result<Value> {
        match self.members.get(name) {
            Some(Member::Bound(bound)) => {
                if let Some(reason) = &bound.operation.signature().deprecated {
                    warn!(
                        operation = bound.operation.name(),
                        reason = reason.as_str(),
                        "deprecated operation invoked"
                    );
                }
                OpRef::Catalog(bound.operation.clone()).invoke(positional, named)
            }
            Some(Member::Manual(Some(handler))) => handler(positional, named),
            Some(Member::Manual(None)) => Err(ExprError::ManualMember {
                type_name: self.type_name.clone(),
                name: name.to_string(),
            }),
            None => Err(ExprError::UnknownMember {
                type_name: self.type_name.clone(),
                name: name.to_string(),
            }),
        }
    }
}

// =============================================================================
// TYPE COMPATIBILITY
// =============================================================================

/// First-parameter type compatibility: decides instance vs static dispatch.
/// `Element` covers the element-like types, collection types cover each
/// other, and the wildcard accepts anything.
fn is_compatible(param_type: &str, declared_type: &str) -> bool {
    if param_type == declared_type {
        return true;
    }
    match param_type {
        "Any" | "?" => true,
        "Element" => matches!(
            declared_type,
            "Element" | "Image" | "Feature" | "Collection" | "ImageCollection"
                | "FeatureCollection"
        ),
        "Collection" | "FeatureCollection" => matches!(
            declared_type,
            "Collection" | "ImageCollection" | "FeatureCollection"
        ),
        _ => false,
    }
}

// =============================================================================
// RESERVED MEMBER NAMES
// =============================================================================

const RESERVED: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "static", "struct", "super", "trait", "true", "type",
    "unsafe", "use", "where", "while",
];

/// Escape a member name that collides with a reserved word by title-casing
/// its first character, deterministically.
fn escape_reserved(name: String) -> String {
    if !RESERVED.contains(&name.as_str()) {
        return name;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => name,
    }
}

// =============================================================================
// TESTS
// =============================================================================
