//! Callback capture
//!
//! Turns a native closure into a reusable graph fragment: the closure is
//! invoked exactly once against placeholder variable nodes, and its return
//! value becomes the function body. The result is the only operation variant
//! that serializes as a self-contained definition (argument names plus body)
//! rather than a name reference, which is what map/iterate-style operations
//! ship to the server.
//!
//! Unnamed parameters are assigned names of the form
//! `_MAPPING_VAR_<base>_<index>`, where `<base>` is the number of distinct
//! function literals already nested inside the body. A capture nested inside
//! another capture's evaluation therefore always sees a smaller base than
//! its host, so generated names cannot collide even for a map within a map;
//! two independent captures of the same shape get identical names.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Result;
use crate::node::ExprNode;
use crate::ops::promote;
use crate::signature::{OperationSignature, ParameterSpec};
use crate::value::Value;

/// Prefix for generated parameter names
pub(crate) const VAR_NAME_PREFIX: &str = "_MAPPING_VAR";

/// A client-defined function literal: resolved parameter list plus body
#[derive(Debug)]
pub struct CapturedCallback {
    signature: OperationSignature,
    params: Vec<Arc<ExprNode>>,
    body: Value,
}

impl CapturedCallback {
    /// Capture a closure against an explicit signature. The closure receives
    /// one placeholder per declared parameter, each promoted to the
    /// parameter's declared type, and is called exactly once, here. Errors
    /// raised by the closure propagate unchanged.
    pub fn capture_with_signature<F>(mut signature: OperationSignature, f: F) -> Result<Arc<Self>>
    where
        F: FnOnce(&[Value]) -> Result<Value>,
    {
        let params: Vec<Arc<ExprNode>> = signature
            .args
            .iter()
            .map(|spec| {
                if spec.name.is_empty() {
                    ExprNode::placeholder()
                } else {
                    ExprNode::variable(spec.name.clone())
                }
            })
            .collect();

        let placeholders: Vec<Value> = params
            .iter()
            .zip(&signature.args)
            .map(|(node, spec)| promote(Value::Node(node.clone()), &spec.type_name))
            .collect();

        let body = f(&placeholders)?;
        resolve_nameless(&mut signature, &params, &body);

        Ok(Arc::new(Self {
            signature,
            params,
            body,
        }))
    }

    /// Capture a closure given only declared return and argument type names;
    /// parameters are created unnamed and resolved deterministically.
    pub fn capture<F>(f: F, returns: &str, arg_types: &[&str]) -> Result<Arc<Self>>
    where
        F: FnOnce(&[Value]) -> Result<Value>,
    {
        let signature = OperationSignature {
            returns: returns.to_string(),
            args: arg_types
                .iter()
                .map(|type_name| ParameterSpec::new("", *type_name))
                .collect(),
            ..Default::default()
        };
        Self::capture_with_signature(signature, f)
    }

    pub fn signature(&self) -> &OperationSignature {
        &self.signature
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Placeholder nodes in parameter order
    pub fn params(&self) -> &[Arc<ExprNode>] {
        &self.params
    }

    /// Resolved parameter names in declared order
    pub fn param_names(&self) -> Vec<&str> {
        self.params
            .iter()
            .map(|p| p.var_name().unwrap_or(""))
            .collect()
    }
}

impl PartialEq for CapturedCallback {
    fn eq(&self, other: &Self) -> bool {
        self.param_names() == other.param_names() && self.body == other.body
    }
}

/// Assign generated names to any unnamed placeholders, writing them into
/// both the placeholder nodes and the signature.
fn resolve_nameless(signature: &mut OperationSignature, params: &[Arc<ExprNode>], body: &Value) {
    if params.iter().all(|p| p.var_name().is_some()) {
        return;
    }
    let base = count_function_literals(body);
    let mut index = 0;
    for (node, spec) in params.iter().zip(signature.args.iter_mut()) {
        if node.var_name().is_none() {
            let name = format!("{}_{}_{}", VAR_NAME_PREFIX, base, index);
            node.assign_name(name.clone());
            spec.name = name;
            index += 1;
        }
    }
}

// =============================================================================
// FUNCTION-LITERAL COUNTING
// =============================================================================

/// Count the distinct function literals reachable from a value. The walk is
/// identity-deduplicated: a literal shared through several references counts
/// once, matching what a deduplicating serialization of the body would
/// contain.
pub fn count_function_literals(value: &Value) -> usize {
    let mut seen_nodes: HashSet<*const ExprNode> = HashSet::new();
    let mut seen_callbacks: HashSet<*const CapturedCallback> = HashSet::new();
    let mut count = 0;
    walk_value(value, &mut seen_nodes, &mut seen_callbacks, &mut count);
    count
}

fn walk_value(
    value: &Value,
    seen_nodes: &mut HashSet<*const ExprNode>,
    seen_callbacks: &mut HashSet<*const CapturedCallback>,
    count: &mut usize,
) {
    match value {
        Value::List(items) => {
            for item in items {
                walk_value(item, seen_nodes, seen_callbacks, count);
            }
        }
        Value::Dict(entries) => {
            for (_, v) in entries {
                walk_value(v, seen_nodes, seen_callbacks, count);
            }
        }
        Value::Node(node) => {
            if !seen_nodes.insert(Arc::as_ptr(node)) {
                return;
            }
            if let ExprNode::Invocation { op, args } = node.as_ref() {
                if let crate::ops::OpRef::Callback(cb) = op {
                    walk_callback(cb, seen_nodes, seen_callbacks, count);
                }
                for (_, v) in args {
                    walk_value(v, seen_nodes, seen_callbacks, count);
                }
            }
        }
        Value::Callback(cb) => walk_callback(cb, seen_nodes, seen_callbacks, count),
        _ => {}
    }
}

fn walk_callback(
    cb: &Arc<CapturedCallback>,
    seen_nodes: &mut HashSet<*const ExprNode>,
    seen_callbacks: &mut HashSet<*const CapturedCallback>,
    count: &mut usize,
) {
    if !seen_callbacks.insert(Arc::as_ptr(cb)) {
        return;
    }
    *count += 1;
    walk_value(cb.body(), seen_nodes, seen_callbacks, count);
}

// =============================================================================
// TESTS
// =============================================================================
