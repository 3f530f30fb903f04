//! Operations and the argument promotion gate
//!
//! An operation is anything invocable with named arguments against a
//! declared signature. There are two variants: a catalog operation (declared
//! by the processing backend) and a captured callback (a client-defined
//! function literal). Both funnel every invocation through the same
//! promotion gate, which converts positional arguments to named ones,
//! applies the process-wide type-promotion hook, and rejects malformed
//! argument sets.
//!
//! The promotion hook is how the typed-wrapper layer upgrades plain nodes
//! into richer types (a raw number supplied where an "Image" is expected,
//! say). It defaults to the identity function.

use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::capture::CapturedCallback;
use crate::catalog::AlgorithmCatalog;
use crate::error::{ExprError, Result};
use crate::node::ExprNode;
use crate::signature::OperationSignature;
use crate::value::Value;

// =============================================================================
// PROMOTION HOOK
// =============================================================================

/// Process-wide type-promotion hook: `(value, declared type name) -> value`
pub type PromoteFn = dyn Fn(Value, &str) -> Value + Send + Sync;

static PROMOTER: Lazy<RwLock<Option<Arc<PromoteFn>>>> = Lazy::new(|| RwLock::new(None));

/// Install the process-wide promotion hook, replacing any previous one
pub fn install_promoter(hook: Arc<PromoteFn>) {
    let mut slot = match PROMOTER.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    *slot = Some(hook);
}

/// Remove the promotion hook, restoring identity behavior
pub fn clear_promoter() {
    let mut slot = match PROMOTER.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    *slot = None;
}

/// Run a value through the promotion hook for the given declared type
pub fn promote(value: Value, type_name: &str) -> Value {
    let hook = match PROMOTER.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    match hook {
        Some(f) => f(value, type_name),
        None => value,
    }
}

// =============================================================================
// CATALOG OPERATION
// =============================================================================

/// A server-declared operation, invoked by name
#[derive(Debug, Clone)]
pub struct CatalogOperation {
    signature: OperationSignature,
}

impl CatalogOperation {
    /// Look the signature up in a catalog
    pub fn lookup(catalog: &AlgorithmCatalog, name: &str) -> Result<Arc<Self>> {
        let signature = catalog.lookup(name)?;
        Ok(Arc::new(Self { signature }))
    }

    /// Build from an already-known signature (e.g. a cached catalog entry)
    pub fn from_signature(signature: OperationSignature) -> Self {
        Self { signature }
    }

    pub fn name(&self) -> &str {
        &self.signature.name
    }

    pub fn signature(&self) -> &OperationSignature {
        &self.signature
    }
}

/// Catalog operations are identified by their declared name
impl PartialEq for CatalogOperation {
    fn eq(&self, other: &Self) -> bool {
        self.signature.name == other.signature.name
    }
}

// =============================================================================
// OPERATION REFERENCE
// =============================================================================

/// Reference to an invocable operation: catalog-declared or callback-captured
#[derive(Debug, Clone)]
pub enum OpRef {
    Catalog(Arc<CatalogOperation>),
    Callback(Arc<CapturedCallback>),
}

impl PartialEq for OpRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (OpRef::Catalog(a), OpRef::Catalog(b)) => a == b,
            (OpRef::Callback(a), OpRef::Callback(b)) => a == b,
            _ => false,
        }
    }
}

impl OpRef {
    /// The declared signature of this operation
    pub fn signature(&self) -> &OperationSignature {
        match self {
            OpRef::Catalog(op) => op.signature(),
            OpRef::Callback(cb) => cb.signature(),
        }
    }

    /// Declared name; empty for anonymous callbacks
    pub fn name(&self) -> &str {
        &self.signature().name
    }

    fn display_name(&self) -> String {
        let name = self.name();
        if name.is_empty() {
            "<anonymous>".to_string()
        } else {
            name.to_string()
        }
    }

    /// Invoke the operation, producing an invocation node promoted to the
    /// declared return type.
    ///
    /// Positional arguments are matched to the leading declared parameters;
    /// a parameter supplied both ways is an error, as is any surplus.
    pub fn invoke(&self, positional: Vec<Value>, named: Vec<(String, Value)>) -> Result<Value> {
        let signature = self.signature();
        if positional.len() > signature.args.len() {
            return Err(ExprError::TooManyArguments {
                operation: self.display_name(),
                declared: signature.args.len(),
                supplied: positional.len(),
            });
        }

        let mut merged: Vec<(String, Value)> = signature
            .args
            .iter()
            .zip(positional)
            .map(|(spec, value)| (spec.name.clone(), value))
            .collect();

        for (key, value) in named {
            if merged.iter().any(|(name, _)| *name == key) {
                return Err(ExprError::DuplicateArgument {
                    operation: self.display_name(),
                    name: key,
                });
            }
            merged.push((key, value));
        }

        let promoted = self.promote_args(merged)?;
        let returns = signature.returns.clone();
        let node = ExprNode::invocation(self.clone(), promoted);
        Ok(promote(Value::Node(node), &returns))
    }

    /// The single validation gate every invocation passes through: promote
    /// each supplied argument to its declared type, reject missing required
    /// parameters, then reject any argument name the signature does not
    /// declare. Output order is the signature's declared parameter order.
    pub fn promote_args(&self, supplied: Vec<(String, Value)>) -> Result<Vec<(String, Value)>> {
        let signature = self.signature();
        let mut remaining: Vec<(String, Option<Value>)> = supplied
            .into_iter()
            .map(|(k, v)| (k, Some(v)))
            .collect();

        let mut promoted = Vec::with_capacity(signature.args.len());
        for spec in &signature.args {
            match remaining
                .iter_mut()
                .find(|(key, value)| *key == spec.name && value.is_some())
            {
                Some((_, value)) => {
                    let taken = value.take().unwrap_or(Value::Null);
                    promoted.push((spec.name.clone(), promote(taken, &spec.type_name)));
                }
                None => {
                    if spec.is_required() {
                        return Err(ExprError::MissingArgument {
                            operation: self.display_name(),
                            name: spec.name.clone(),
                        });
                    }
                }
            }
        }

        if let Some((key, _)) = remaining.iter().find(|(_, value)| value.is_some()) {
            return Err(ExprError::UnrecognizedArgument {
                operation: self.display_name(),
                name: key.clone(),
            });
        }

        Ok(promoted)
    }
}

/// Look an operation up in the catalog and invoke it in one step
pub fn invoke_operation(
    catalog: &AlgorithmCatalog,
    name: &str,
    positional: Vec<Value>,
    named: Vec<(String, Value)>,
) -> Result<Value> {
    let op = CatalogOperation::lookup(catalog, name)?;
    OpRef::Catalog(op).invoke(positional, named)
}

// =============================================================================
// TESTS
// =============================================================================
