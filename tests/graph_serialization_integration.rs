//! End-to-end graph construction and serialization tests
//!
//! These tests verify that:
//! 1. A catalog-driven invocation produces the expected wire payload
//! 2. Structurally repeated subtrees collapse to a single scope entry
//! 3. The scope entry count equals the number of distinct subtrees
//! 4. Repeated serialization of the same graph is byte-identical

use std::collections::HashMap;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use geoflux_core::{
    invoke_operation, AlgorithmCatalog, ExprNode, OperationSignature, ParameterSpec, Serializer,
    StaticCatalog, Value, WireFormat,
};

// =============================================================================
// FIXTURES
// =============================================================================

fn image_ops() -> HashMap<String, OperationSignature> {
    let mut ops = HashMap::new();
    ops.insert(
        "Image.constant".to_string(),
        OperationSignature {
            returns: "Image".to_string(),
            args: vec![ParameterSpec::new("value", "Object")],
            ..Default::default()
        },
    );
    ops.insert(
        "Image.add".to_string(),
        OperationSignature {
            returns: "Image".to_string(),
            args: vec![
                ParameterSpec::new("image1", "Image"),
                ParameterSpec::new("image2", "Image"),
            ],
            ..Default::default()
        },
    );
    ops.insert(
        "Image.negate".to_string(),
        OperationSignature {
            returns: "Image".to_string(),
            args: vec![ParameterSpec::new("image", "Image")],
            ..Default::default()
        },
    );
    ops
}

fn test_catalog() -> AlgorithmCatalog {
    let catalog = AlgorithmCatalog::new();
    catalog
        .initialize(&StaticCatalog::new(image_ops()))
        .expect("catalog init");
    catalog
}

// =============================================================================
// WIRE PAYLOAD SHAPE
// =============================================================================

#[test]
fn test_constant_invocation_payload() {
    let catalog = test_catalog();
    let result = invoke_operation(&catalog, "Image.constant", vec![Value::from(5i64)], vec![])
        .expect("invoke");

    let node = result.as_node().expect("node result");
    assert_eq!(node.op().unwrap().name(), "Image.constant");
    assert_eq!(node.args().len(), 1);
    assert_eq!(node.args()[0].0, "value");
    assert_eq!(node.args()[0].1.as_integer(), Some(5));

    // A single-subtree graph unwraps: the payload is the one scope entry.
    let payload = Serializer::new(WireFormat::Legacy).serialize(&result).unwrap();
    assert_eq!(
        payload,
        json!({
            "type": "Invocation",
            "functionName": "Image.constant",
            "arguments": { "value": 5 },
        })
    );
}

#[test]
fn test_cloud_payload_for_composite_graph() {
    let catalog = test_catalog();
    let five = invoke_operation(&catalog, "Image.constant", vec![Value::from(5i64)], vec![])
        .unwrap();
    let sum = invoke_operation(&catalog, "Image.add", vec![five.clone(), five], vec![]).unwrap();

    let payload = Serializer::new(WireFormat::Cloud).serialize(&sum).unwrap();
    assert_eq!(
        payload,
        json!({
            "values": {
                "0": {
                    "functionInvocationValue": {
                        "functionName": "Image.constant",
                        "arguments": { "value": { "constantValue": 5 } },
                    }
                },
                "1": {
                    "functionInvocationValue": {
                        "functionName": "Image.add",
                        "arguments": {
                            "image1": { "valueReference": "0" },
                            "image2": { "valueReference": "0" },
                        },
                    }
                },
            },
            "result": "1",
        })
    );
}

// =============================================================================
// DEDUPLICATION PROPERTIES
// =============================================================================

#[test]
fn test_dedup_emits_one_entry_and_two_backrefs() {
    let catalog = test_catalog();
    let x = invoke_operation(&catalog, "Image.constant", vec![Value::from(9i64)], vec![])
        .unwrap();
    let doubled = invoke_operation(&catalog, "Image.add", vec![x.clone(), x], vec![]).unwrap();

    let payload = Serializer::new(WireFormat::Legacy).serialize(&doubled).unwrap();
    let scope = payload["scope"].as_array().unwrap();
    assert_eq!(scope.len(), 2, "shared subtree must appear once");

    let args = &scope[1][1]["arguments"];
    assert_eq!(args["image1"], json!({ "type": "ValueRef", "value": "0" }));
    assert_eq!(args["image2"], json!({ "type": "ValueRef", "value": "0" }));
}

#[test]
fn test_scope_size_equals_distinct_subtree_count() {
    let catalog = test_catalog();
    let five = invoke_operation(&catalog, "Image.constant", vec![Value::from(5i64)], vec![])
        .unwrap();
    let six = invoke_operation(&catalog, "Image.constant", vec![Value::from(6i64)], vec![])
        .unwrap();
    let neg_five =
        invoke_operation(&catalog, "Image.negate", vec![five.clone()], vec![]).unwrap();
    let sum = invoke_operation(&catalog, "Image.add", vec![neg_five, six], vec![]).unwrap();
    // Distinct subtrees: constant(5), constant(6), negate, add.
    let outer = invoke_operation(&catalog, "Image.add", vec![sum, five], vec![]).unwrap();

    let payload = Serializer::new(WireFormat::Legacy).serialize(&outer).unwrap();
    assert_eq!(payload["scope"].as_array().unwrap().len(), 5);
}

#[test]
fn test_serialization_is_deterministic() {
    let catalog = test_catalog();
    let five = invoke_operation(&catalog, "Image.constant", vec![Value::from(5i64)], vec![])
        .unwrap();
    let sum = invoke_operation(&catalog, "Image.add", vec![five.clone(), five], vec![]).unwrap();

    for format in [WireFormat::Legacy, WireFormat::Cloud] {
        let serializer = Serializer::new(format);
        let first = serializer.to_json_string(&sum).unwrap();
        let second = serializer.to_json_string(&sum).unwrap();
        assert_eq!(first, second);
    }
}

// =============================================================================
// STRUCTURAL EQUALITY
// =============================================================================

#[test]
fn test_equal_graphs_share_digest() {
    let catalog = test_catalog();
    let a = invoke_operation(&catalog, "Image.constant", vec![Value::from(5i64)], vec![])
        .unwrap();
    let b = invoke_operation(
        &catalog,
        "Image.constant",
        vec![],
        vec![("value".to_string(), Value::from(5i64))],
    )
    .unwrap();

    let a_node = a.as_node().unwrap();
    let b_node = b.as_node().unwrap();
    assert_eq!(a_node.as_ref(), b_node.as_ref());
    assert_eq!(a_node.structural_digest(), b_node.structural_digest());
}

#[test]
fn test_self_reference_is_unconstructible() {
    // A node argument must exist before the node that consumes it, so the
    // only way to "close a cycle" is to build a new node, which has a new
    // identity. The original is untouched.
    let leaf = ExprNode::variable("x");
    let consumer = {
        let catalog = test_catalog();
        invoke_operation(
            &catalog,
            "Image.negate",
            vec![Value::Node(Arc::clone(&leaf))],
            vec![],
        )
        .unwrap()
    };
    let consumer_node = consumer.as_node().unwrap();
    assert!(consumer_node.args()[0].1.as_node().unwrap().is_variable());
    assert_eq!(Arc::strong_count(&leaf), 2);
}
