//! Tree Equality Oracle
//!
//! Structural comparison between replicated nodes and local content. Null
//! attribute values count as absent, and the diff annotation attribute/mark
//! is ignored on both sides.

use super::mapping::{normalize, LocalContent};
use crate::crdt::{text_runs, Attrs, Container, YNode};
use crate::local::{LocalNode, Mark};
use serde_json::Value;
use std::sync::Arc;
use yrs::{ReadTxn, XmlTextRef};

/// Attribute maps equal key for key, skipping nulls and `ignore`
pub fn attrs_equal(a: &Attrs, b: &Attrs, ignore: &str) -> bool {
    let relevant = |attrs: &Attrs| {
        attrs
            .iter()
            .filter(|(k, v)| k.as_str() != ignore && !v.is_null())
            .count()
    };
    relevant(a) == relevant(b)
        && a.iter()
            .filter(|(k, v)| k.as_str() != ignore && !v.is_null())
            .all(|(k, v)| b.get(k).is_some_and(|other| values_equal(v, other)))
}

/// Value equality, comparing nested objects the way attribute maps are
/// compared and numbers by magnitude
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Object(x), Value::Object(y)) => {
            let count = |m: &serde_json::Map<String, Value>| m.values().filter(|v| !v.is_null()).count();
            count(x) == count(y)
                && x.iter()
                    .filter(|(_, v)| !v.is_null())
                    .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => a == b,
    }
}

/// Local marks as a replicated attribute map
pub fn marks_to_attrs(marks: &[Mark], ignore: &str) -> Attrs {
    marks
        .iter()
        .filter(|m| m.name != ignore)
        .map(|m| (m.name.clone(), m.to_value()))
        .collect()
}

/// A replicated Text node against a group of local text runs, run for run
pub fn text_equal<T: ReadTxn>(txn: &T, text: &XmlTextRef, runs: &[Arc<LocalNode>], ignore: &str) -> bool {
    let delta = text_runs(text, txn);
    delta.len() == runs.len()
        && delta.iter().zip(runs).all(|(d, run)| {
            run.text_content() == Some(d.insert.as_str())
                && attrs_equal(&d.marks, &marks_to_attrs(run.marks(), ignore), ignore)
        })
}

/// A replicated Element against a local element, recursively
pub fn element_equal<T: ReadTxn>(txn: &T, node: &Container, local: &LocalNode, ignore: &str) -> bool {
    if node.tag().as_deref() != Some(local.kind()) || local.is_text() {
        return false;
    }
    let children = node.children(txn);
    let units = normalize(local.children());
    children.len() == units.len()
        && attrs_equal(&node.attributes(txn), local.attrs(), ignore)
        && children
            .iter()
            .zip(&units)
            .all(|(child, unit)| content_equal(txn, child, unit, ignore))
}

/// Dispatch on the kind of both sides; mismatched kinds are never equal
pub fn content_equal<T: ReadTxn>(txn: &T, node: &YNode, unit: &LocalContent, ignore: &str) -> bool {
    match (node, unit) {
        (YNode::Element(element), LocalContent::Element(local)) => {
            element_equal(txn, &Container::Element(element.clone()), local, ignore)
        }
        (YNode::Text(text), LocalContent::Text(runs)) => text_equal(txn, text, runs, ignore),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::{new_doc, to_format};
    use serde_json::json;
    use yrs::{Text, Transact};

    fn attrs(pairs: &[(&str, Value)]) -> Attrs {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_attrs_ignore_nulls_and_annotation() {
        let a = attrs(&[("level", json!(1)), ("id", Value::Null)]);
        let b = attrs(&[("level", json!(1)), ("change", json!({ "type": "added" }))]);
        assert!(attrs_equal(&a, &b, "change"));
        assert!(!attrs_equal(&a, &b, "other"));
        assert!(!attrs_equal(&a, &attrs(&[("level", json!(2))]), "change"));
    }

    #[test]
    fn test_nested_values() {
        let a = json!({ "href": "x", "title": null });
        let b = json!({ "href": "x" });
        assert!(values_equal(&a, &b));
        assert!(!values_equal(&a, &json!({ "href": "y" })));
        assert!(values_equal(&json!(1), &json!(1.0)));
    }

    fn paragraph(doc: &yrs::Doc) -> Container {
        let root = Container::Fragment(doc.get_or_insert_xml_fragment("doc"));
        let mut txn = doc.transact_mut();
        let p = Container::Element(root.insert_element(&mut txn, 0, "paragraph"));
        p.set_attribute(&mut txn, "align", &json!("left"));
        let t = p.insert_text(&mut txn, 0);
        t.insert(&mut txn, 0, "ab");
        t.insert_with_attributes(&mut txn, 2, "cd", to_format(&attrs(&[("em", json!({}))])));
        p
    }

    #[test]
    fn test_paragraph_equality() {
        let doc = new_doc(1);
        let p = paragraph(&doc);
        let align = attrs(&[("align", json!("left"))]);
        let txn = doc.transact();

        let local = LocalNode::element(
            "paragraph",
            align.clone(),
            vec![
                LocalNode::text("ab", vec![]),
                LocalNode::text("cd", vec![Mark::new("em")]),
            ],
        );
        assert!(element_equal(&txn, &p, &local, "change"));

        // Same text, one run: not equal run for run
        let merged = LocalNode::element("paragraph", align.clone(), vec![LocalNode::text("abcd", vec![])]);
        assert!(!element_equal(&txn, &p, &merged, "change"));

        let renamed = LocalNode::element("heading", align, local.children().to_vec());
        assert!(!element_equal(&txn, &p, &renamed, "change"));
    }

    #[test]
    fn test_kind_mismatch() {
        let doc = new_doc(1);
        let p = paragraph(&doc);
        let txn = doc.transact();
        let text = p.children(&txn).remove(0);

        let element = LocalContent::Element(LocalNode::leaf("image", Attrs::new()));
        assert!(!content_equal(&txn, &text, &element, "change"));
        assert!(!content_equal(&txn, &text, &LocalContent::Text(vec![]), "change"));
        let runs = vec![LocalNode::text("ab", vec![]), LocalNode::text("cd", vec![Mark::new("em")])];
        assert!(content_equal(&txn, &text, &LocalContent::Text(runs), "change"));
    }
}
