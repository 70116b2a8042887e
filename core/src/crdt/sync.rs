//! Update exchange between replicas
//!
//! Transport is the host's concern; these helpers produce and consume the
//! v1 update encoding so two documents can be brought in sync.

use super::DocError;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, Origin, ReadTxn, StateVector, Transact, Update};

pub fn encode_state_vector(doc: &Doc) -> Vec<u8> {
    doc.transact().state_vector().encode_v1()
}

/// Everything `doc` knows that the peer with `remote_state_vector` does not
pub fn encode_diff(doc: &Doc, remote_state_vector: &[u8]) -> Result<Vec<u8>, DocError> {
    let sv = StateVector::decode_v1(remote_state_vector).map_err(|e| DocError::Decode(e.to_string()))?;
    Ok(doc.transact().encode_state_as_update_v1(&sv))
}

/// Apply a peer's update in one transaction tagged with `origin`
pub fn apply_update(doc: &Doc, update: &[u8], origin: Option<Origin>) -> Result<(), DocError> {
    let update = Update::decode_v1(update).map_err(|e| DocError::Decode(e.to_string()))?;
    let mut txn = match origin {
        Some(origin) => doc.transact_mut_with(origin),
        None => doc.transact_mut(),
    };
    txn.apply_update(update)
        .map_err(|e| DocError::Apply(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::new_doc;
    use yrs::{GetString, Text};

    #[test]
    fn test_peers_converge() {
        let (a, b) = (new_doc(1), new_doc(2));
        let (ta, tb) = (a.get_or_insert_text("t"), b.get_or_insert_text("t"));
        ta.insert(&mut a.transact_mut(), 0, "left");
        tb.insert(&mut b.transact_mut(), 0, "right");

        let to_b = encode_diff(&a, &encode_state_vector(&b)).unwrap();
        let to_a = encode_diff(&b, &encode_state_vector(&a)).unwrap();
        apply_update(&b, &to_b, None).unwrap();
        apply_update(&a, &to_a, Some(Origin::from("peer"))).unwrap();

        assert_eq!(ta.get_string(&a.transact()), tb.get_string(&b.transact()));
        assert_eq!(ta.len(&a.transact()), 9);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let doc = new_doc(1);
        assert!(matches!(encode_diff(&doc, &[0xff, 0xff]), Err(DocError::Decode(_))));
        assert!(apply_update(&doc, &[0xff, 0xff, 0xff], None).is_err());
    }
}
