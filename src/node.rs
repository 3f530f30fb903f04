//! Expression node - the unit of the computation graph
//!
//! A node is either an *invocation* (an operation reference plus named
//! arguments) or a *variable* (a named placeholder inside a function body).
//! Nodes are immutable and shared through `Arc`; because a node can only
//! reference nodes that already exist, the graph is acyclic by construction.
//!
//! Equality is structural: two invocations are equal when their operations
//! and argument mappings are deeply equal (argument order is irrelevant), and
//! a variable is equal only to a variable with the same name. The structural
//! digest is the SHA-256 of a canonical byte stream over the same structure,
//! with argument maps visited in sorted key order; the serializer uses it to
//! deduplicate repeated subtrees.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use sha2::{Digest, Sha256};

use crate::capture::CapturedCallback;
use crate::ops::OpRef;
use crate::value::Value;

/// A node of the computation graph
#[derive(Debug)]
pub enum ExprNode {
    /// A deferred operation call with a named-argument mapping.
    /// Keys are unique; their stored order matters only for rendering.
    Invocation {
        op: OpRef,
        args: Vec<(String, Value)>,
    },

    /// A named placeholder. Placeholders may start unnamed and are assigned
    /// a name exactly once, before serialization.
    Variable { name: OnceLock<String> },
}

impl ExprNode {
    // =========================================================================
    // CONSTRUCTORS
    // =========================================================================

    /// Create an invocation node. Argument keys must be unique; the
    /// promotion gate in [`crate::ops`] guarantees this for all invocations
    /// it builds.
    pub fn invocation(op: OpRef, args: Vec<(String, Value)>) -> Arc<Self> {
        Arc::new(ExprNode::Invocation { op, args })
    }

    /// Create a named variable node
    pub fn variable(name: impl Into<String>) -> Arc<Self> {
        let cell = OnceLock::new();
        let _ = cell.set(name.into());
        Arc::new(ExprNode::Variable { name: cell })
    }

    /// Create an unnamed placeholder variable; callback capture assigns its
    /// name before the node can reach the serializer.
    pub fn placeholder() -> Arc<Self> {
        Arc::new(ExprNode::Variable {
            name: OnceLock::new(),
        })
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// True iff the node has no operation and no arguments
    pub fn is_variable(&self) -> bool {
        matches!(self, ExprNode::Variable { .. })
    }

    /// The variable's name, if this is a variable and one has been assigned
    pub fn var_name(&self) -> Option<&str> {
        match self {
            ExprNode::Variable { name } => name.get().map(|s| s.as_str()),
            ExprNode::Invocation { .. } => None,
        }
    }

    /// The invocation's operation, if this is an invocation
    pub fn op(&self) -> Option<&OpRef> {
        match self {
            ExprNode::Invocation { op, .. } => Some(op),
            ExprNode::Variable { .. } => None,
        }
    }

    /// The invocation's arguments in stored order
    pub fn args(&self) -> &[(String, Value)] {
        match self {
            ExprNode::Invocation { args, .. } => args,
            ExprNode::Variable { .. } => &[],
        }
    }

    /// Assign a name to an unnamed placeholder. Names are written at most
    /// once; a second assignment is ignored.
    pub(crate) fn assign_name(&self, name: String) {
        if let ExprNode::Variable { name: cell } = self {
            let _ = cell.set(name);
        }
    }

    /// Structural digest of this node (hex-encoded SHA-256)
    pub fn structural_digest(self: &Arc<Self>) -> String {
        let mut cache = DigestCache::default();
        digest_node(self, &mut cache)
    }
}

// =============================================================================
// EQUALITY
// =============================================================================

impl PartialEq for ExprNode {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ExprNode::Variable { name: a }, ExprNode::Variable { name: b }) => a.get() == b.get(),
            (
                ExprNode::Invocation { op: a, args: x },
                ExprNode::Invocation { op: b, args: y },
            ) => a == b && args_equal(x, y),
            _ => false,
        }
    }
}

/// Order-insensitive comparison of argument mappings
fn args_equal(a: &[(String, Value)], b: &[(String, Value)]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a_sorted: Vec<&(String, Value)> = a.iter().collect();
    let mut b_sorted: Vec<&(String, Value)> = b.iter().collect();
    a_sorted.sort_by(|x, y| x.0.cmp(&y.0));
    b_sorted.sort_by(|x, y| x.0.cmp(&y.0));
    a_sorted
        .iter()
        .zip(b_sorted.iter())
        .all(|(x, y)| x.0 == y.0 && x.1 == y.1)
}

// =============================================================================
// STRUCTURAL DIGEST
// =============================================================================

/// Identity-keyed digest memo, local to one serialization (or one digest
/// computation). Shared nodes are hashed once and looked up by pointer.
#[derive(Default)]
pub(crate) struct DigestCache {
    nodes: HashMap<*const ExprNode, String>,
    callbacks: HashMap<*const CapturedCallback, String>,
}

/// Digest a value into a canonical hex SHA-256 string
pub(crate) fn digest_value(value: &Value, cache: &mut DigestCache) -> String {
    let mut hasher = Sha256::new();
    feed_value(&mut hasher, value, cache);
    hex::encode(hasher.finalize())
}

/// Digest a node, memoized by node identity
pub(crate) fn digest_node(node: &Arc<ExprNode>, cache: &mut DigestCache) -> String {
    let key = Arc::as_ptr(node);
    if let Some(hit) = cache.nodes.get(&key) {
        return hit.clone();
    }
    let mut hasher = Sha256::new();
    feed_node(&mut hasher, node, cache);
    let digest = hex::encode(hasher.finalize());
    cache.nodes.insert(key, digest.clone());
    digest
}

/// Digest a function literal, memoized by callback identity
pub(crate) fn digest_callback(cb: &Arc<CapturedCallback>, cache: &mut DigestCache) -> String {
    let key = Arc::as_ptr(cb);
    if let Some(hit) = cache.callbacks.get(&key) {
        return hit.clone();
    }
    let mut hasher = Sha256::new();
    feed_callback(&mut hasher, cb, cache);
    let digest = hex::encode(hasher.finalize());
    cache.callbacks.insert(key, digest.clone());
    digest
}

fn feed_value(hasher: &mut Sha256, value: &Value, cache: &mut DigestCache) {
    match value {
        Value::Null => hasher.update(b"z"),
        Value::Bool(b) => hasher.update(if *b { b"b1" } else { b"b0" }),
        Value::Integer(i) => {
            hasher.update(b"i");
            hasher.update(i.to_be_bytes());
        }
        Value::Float(f) => {
            hasher.update(b"f");
            hasher.update(f.to_bits().to_be_bytes());
        }
        Value::String(s) => {
            hasher.update(b"s");
            hasher.update((s.len() as u64).to_be_bytes());
            hasher.update(s.as_bytes());
        }
        Value::Date(d) => {
            hasher.update(b"d");
            hasher.update(d.timestamp_micros().to_be_bytes());
        }
        Value::Bytes(b) => {
            hasher.update(b"y");
            hasher.update((b.len() as u64).to_be_bytes());
            hasher.update(b);
        }
        Value::List(items) => {
            hasher.update(b"[");
            for item in items {
                hasher.update(digest_subvalue(item, cache));
            }
            hasher.update(b"]");
        }
        Value::Dict(entries) => {
            let mut sorted: Vec<&(String, Value)> = entries.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            hasher.update(b"{");
            for (k, v) in sorted {
                hasher.update((k.len() as u64).to_be_bytes());
                hasher.update(k.as_bytes());
                hasher.update(digest_subvalue(v, cache));
            }
            hasher.update(b"}");
        }
        Value::Node(n) => {
            hasher.update(b"n");
            hasher.update(digest_node(n, cache));
        }
        Value::Callback(c) => {
            hasher.update(b"c");
            hasher.update(digest_callback(c, cache));
        }
    }
}

fn feed_node(hasher: &mut Sha256, node: &Arc<ExprNode>, cache: &mut DigestCache) {
    match node.as_ref() {
        ExprNode::Variable { name } => {
            hasher.update(b"v");
            // An unresolved placeholder digests under a reserved marker; the
            // serializer rejects it before the digest is ever emitted.
            hasher.update(name.get().map(|s| s.as_str()).unwrap_or("\0").as_bytes());
        }
        ExprNode::Invocation { op, args } => {
            hasher.update(b"(");
            match op {
                OpRef::Catalog(catalog_op) => {
                    hasher.update(b"op:");
                    hasher.update(catalog_op.name().as_bytes());
                }
                OpRef::Callback(cb) => {
                    hasher.update(b"fn:");
                    hasher.update(digest_callback(cb, cache));
                }
            }
            let mut sorted: Vec<&(String, Value)> = args.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            for (k, v) in sorted {
                hasher.update((k.len() as u64).to_be_bytes());
                hasher.update(k.as_bytes());
                hasher.update(digest_subvalue(v, cache));
            }
            hasher.update(b")");
        }
    }
}

fn feed_callback(hasher: &mut Sha256, cb: &Arc<CapturedCallback>, cache: &mut DigestCache) {
    hasher.update(b"fn[");
    for name in cb.param_names() {
        hasher.update((name.len() as u64).to_be_bytes());
        hasher.update(name.as_bytes());
    }
    hasher.update(b"]");
    hasher.update(digest_subvalue(cb.body(), cache));
}

fn digest_subvalue(value: &Value, cache: &mut DigestCache) -> String {
    let mut hasher = Sha256::new();
    feed_value(&mut hasher, value, cache);
    hex::encode(hasher.finalize())
}

// =============================================================================
// TESTS
// =============================================================================
