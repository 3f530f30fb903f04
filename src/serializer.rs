//! Wire serialization
//!
//! Flattens a value graph into the JSON payload shipped to the processing
//! backend. One traversal drives both supported tag vocabularies: the legacy
//! DAG format (`Invocation`/`ArgumentRef`/`CompoundValue`, dictionaries
//! rendered with sorted keys) and the newer value-graph format
//! (`functionInvocationValue`/`argumentReference`/`constantValue`,
//! dictionaries in insertion order).
//!
//! In compound mode every invocation and function literal is content-hashed
//! and hoisted into an ordered scope; a structurally repeated subtree is
//! emitted once and referenced by index thereafter. Scope order is the order
//! subtrees finish encoding during traversal, which makes repeated
//! serialization of the same graph byte-identical. All bookkeeping (scope,
//! dedup table, identity-keyed digest memo) lives on the stack of a single
//! `serialize` call and never leaks between calls.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Map, Value as Json};

use crate::capture::CapturedCallback;
use crate::error::{ExprError, Result};
use crate::node::{digest_callback, digest_node, DigestCache, ExprNode};
use crate::ops::OpRef;
use crate::value::Value;
use std::sync::Arc;

/// Largest integer magnitude a double represents exactly
const MAX_SAFE_INTEGER: i64 = 1 << 53;

/// Output tag vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// Original DAG format: `Invocation`, `ArgumentRef`, `CompoundValue`
    Legacy,
    /// Value-graph format: `functionInvocationValue`, `constantValue`, ...
    Cloud,
}

/// Graph serializer. `new` produces the deduplicated compound payload;
/// `inlined` produces the fully expanded tree used for debug output.
#[derive(Debug, Clone, Copy)]
pub struct Serializer {
    format: WireFormat,
    compound: bool,
}

#[derive(Default)]
struct EncodeState {
    /// Ordered (index, encoded subtree) pairs
    scope: Vec<(String, Json)>,
    /// Structural digest -> scope index
    dedup: HashMap<String, usize>,
    /// Identity-keyed digest memo for nodes visited through sharing
    digests: DigestCache,
}

impl Serializer {
    pub fn new(format: WireFormat) -> Self {
        Self {
            format,
            compound: true,
        }
    }

    pub fn inlined(format: WireFormat) -> Self {
        Self {
            format,
            compound: false,
        }
    }

    /// Serialize a value into a JSON payload
    pub fn serialize(&self, value: &Value) -> Result<Json> {
        let mut state = EncodeState::default();
        let root = self.encode(value, &mut state)?;

        if !self.compound {
            return Ok(root);
        }

        // A single hoisted value needs no compound wrapper.
        if state.scope.len() == 1 && self.ref_index(&root).is_some() {
            let (_, encoded) = state.scope.remove(0);
            return Ok(encoded);
        }

        match self.format {
            WireFormat::Legacy => {
                let scope: Vec<Json> = state
                    .scope
                    .into_iter()
                    .map(|(index, encoded)| json!([index, encoded]))
                    .collect();
                Ok(json!({
                    "type": "CompoundValue",
                    "scope": scope,
                    "value": root,
                }))
            }
            WireFormat::Cloud => {
                let mut values = Map::new();
                for (index, encoded) in state.scope {
                    values.insert(index, encoded);
                }
                let result = match self.ref_index(&root) {
                    Some(index) => index,
                    None => {
                        let index = values.len().to_string();
                        values.insert(index.clone(), root);
                        index
                    }
                };
                Ok(json!({ "values": values, "result": result }))
            }
        }
    }

    /// Serialize to a compact JSON string
    pub fn to_json_string(&self, value: &Value) -> Result<String> {
        Ok(serde_json::to_string(&self.serialize(value)?)?)
    }

    /// Serialize to an indented JSON string for human-readable output
    pub fn to_json_string_pretty(&self, value: &Value) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.serialize(value)?)?)
    }

    // =========================================================================
    // RECURSIVE ENCODING
    // =========================================================================

    fn encode(&self, value: &Value, state: &mut EncodeState) -> Result<Json> {
        match value {
            Value::Null => Ok(self.constant(Json::Null)),
            Value::Bool(b) => Ok(self.constant(json!(b))),
            Value::Integer(i) => Ok(self.integer(*i)),
            Value::Float(f) => {
                if !f.is_finite() {
                    return Err(ExprError::NonFiniteNumber(*f));
                }
                Ok(self.constant(json!(f)))
            }
            Value::String(s) => Ok(self.constant(json!(s))),
            Value::Date(d) => Ok(self.date_invocation(d.timestamp_micros())),
            Value::Bytes(b) => {
                let encoded = BASE64.encode(b);
                Ok(match self.format {
                    WireFormat::Legacy => json!({ "type": "Bytes", "value": encoded }),
                    WireFormat::Cloud => json!({ "bytesValue": encoded }),
                })
            }
            Value::List(items) => {
                let mut encoded = Vec::with_capacity(items.len());
                for item in items {
                    encoded.push(self.encode(item, state)?);
                }
                Ok(match self.format {
                    WireFormat::Legacy => Json::Array(encoded),
                    WireFormat::Cloud => json!({ "arrayValue": { "values": encoded } }),
                })
            }
            Value::Dict(entries) => {
                let map = self.encode_entries(entries, state)?;
                Ok(match self.format {
                    WireFormat::Legacy => json!({ "type": "Dictionary", "value": map }),
                    WireFormat::Cloud => json!({ "dictionaryValue": { "values": map } }),
                })
            }
            Value::Node(node) => self.encode_node(node, state),
            Value::Callback(cb) => self.encode_callback(cb, state),
        }
    }

    fn encode_node(&self, node: &Arc<ExprNode>, state: &mut EncodeState) -> Result<Json> {
        match node.as_ref() {
            // Variables are cheap and self-contained: always inline.
            ExprNode::Variable { .. } => {
                let name = node.var_name().ok_or(ExprError::UnresolvedVariable)?;
                Ok(match self.format {
                    WireFormat::Legacy => json!({ "type": "ArgumentRef", "value": name }),
                    WireFormat::Cloud => json!({ "argumentReference": name }),
                })
            }
            ExprNode::Invocation { op, args } => {
                let digest = digest_node(node, &mut state.digests);
                self.hoist(digest, state, |this, state| {
                    let arguments = this.encode_entries(args, state)?;
                    match op {
                        OpRef::Catalog(catalog_op) => Ok(match this.format {
                            WireFormat::Legacy => json!({
                                "type": "Invocation",
                                "functionName": catalog_op.name(),
                                "arguments": arguments,
                            }),
                            WireFormat::Cloud => json!({
                                "functionInvocationValue": {
                                    "functionName": catalog_op.name(),
                                    "arguments": arguments,
                                }
                            }),
                        }),
                        OpRef::Callback(cb) => {
                            let function = this.encode_callback(cb, state)?;
                            Ok(match this.format {
                                WireFormat::Legacy => json!({
                                    "type": "Invocation",
                                    "function": function,
                                    "arguments": arguments,
                                }),
                                WireFormat::Cloud => match this.ref_index(&function) {
                                    Some(index) => json!({
                                        "functionInvocationValue": {
                                            "functionReference": index,
                                            "arguments": arguments,
                                        }
                                    }),
                                    None => json!({
                                        "functionInvocationValue": {
                                            "function": function,
                                            "arguments": arguments,
                                        }
                                    }),
                                },
                            })
                        }
                    }
                })
            }
        }
    }

    fn encode_callback(
        &self,
        cb: &Arc<CapturedCallback>,
        state: &mut EncodeState,
    ) -> Result<Json> {
        let digest = digest_callback(cb, &mut state.digests);
        self.hoist(digest, state, |this, state| {
            let names: Vec<Json> = cb
                .param_names()
                .into_iter()
                .map(|n| json!(n))
                .collect();
            let body = this.encode(cb.body(), state)?;
            Ok(match this.format {
                WireFormat::Legacy => json!({
                    "type": "Function",
                    "argumentNames": names,
                    "body": body,
                }),
                WireFormat::Cloud => {
                    let body = match this.ref_index(&body) {
                        Some(index) => json!(index),
                        None => body,
                    };
                    json!({
                        "functionDefinitionValue": {
                            "argumentNames": names,
                            "body": body,
                        }
                    })
                }
            })
        })
    }

    /// Encode a named-argument mapping. The legacy format renders keys
    /// sorted; the newer format keeps insertion order.
    fn encode_entries(
        &self,
        entries: &[(String, Value)],
        state: &mut EncodeState,
    ) -> Result<Map<String, Json>> {
        let mut ordered: Vec<&(String, Value)> = entries.iter().collect();
        if self.format == WireFormat::Legacy {
            ordered.sort_by(|a, b| a.0.cmp(&b.0));
        }
        let mut map = Map::new();
        for (key, value) in ordered {
            map.insert(key.clone(), self.encode(value, state)?);
        }
        Ok(map)
    }

    /// Dedup-and-hoist: in compound mode a repeated digest becomes a
    /// reference to the existing scope entry; a fresh subtree is encoded,
    /// appended to the scope, and referenced. Inline mode encodes in place.
    fn hoist<F>(&self, digest: String, state: &mut EncodeState, build: F) -> Result<Json>
    where
        F: FnOnce(&Self, &mut EncodeState) -> Result<Json>,
    {
        if !self.compound {
            return build(self, state);
        }
        if let Some(&index) = state.dedup.get(&digest) {
            return Ok(self.value_ref(index));
        }
        let encoded = build(self, state)?;
        let index = state.scope.len();
        state.scope.push((index.to_string(), encoded));
        state.dedup.insert(digest, index);
        Ok(self.value_ref(index))
    }

    // =========================================================================
    // PRIMITIVE ENCODINGS
    // =========================================================================

    fn constant(&self, value: Json) -> Json {
        match self.format {
            WireFormat::Legacy => value,
            WireFormat::Cloud => json!({ "constantValue": value }),
        }
    }

    /// Integers beyond exact double range are carried as decimal strings in
    /// the value-graph format; the legacy format embeds the number directly.
    fn integer(&self, value: i64) -> Json {
        match self.format {
            WireFormat::Legacy => json!(value),
            WireFormat::Cloud => {
                if (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&value) {
                    json!({ "constantValue": value })
                } else {
                    json!({ "integerValue": value.to_string() })
                }
            }
        }
    }

    /// Dates wrap as an inline invocation of the date constructor with a
    /// microsecond timestamp.
    fn date_invocation(&self, micros: i64) -> Json {
        match self.format {
            WireFormat::Legacy => json!({
                "type": "Invocation",
                "functionName": "Date",
                "arguments": { "value": micros },
            }),
            WireFormat::Cloud => json!({
                "functionInvocationValue": {
                    "functionName": "Date",
                    "arguments": { "value": self.integer(micros) },
                }
            }),
        }
    }

    fn value_ref(&self, index: usize) -> Json {
        match self.format {
            WireFormat::Legacy => json!({ "type": "ValueRef", "value": index.to_string() }),
            WireFormat::Cloud => json!({ "valueReference": index.to_string() }),
        }
    }

    /// If the encoding is a scope reference, return its index string
    fn ref_index(&self, encoded: &Json) -> Option<String> {
        let obj = encoded.as_object()?;
        match self.format {
            WireFormat::Legacy => {
                if obj.get("type")?.as_str()? == "ValueRef" {
                    obj.get("value")?.as_str().map(|s| s.to_string())
                } else {
                    None
                }
            }
            WireFormat::Cloud => {
                if obj.len() == 1 {
                    obj.get("valueReference")?.as_str().map(|s| s.to_string())
                } else {
                    None
                }
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
