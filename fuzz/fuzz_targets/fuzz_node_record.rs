#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use unitrie::data::PathArity;
use unitrie::model::MerkleProof;
use unitrie::trie::NodeData;

#[derive(Arbitrary, Debug)]
struct RecordInput {
    bytes: Vec<u8>,
    arity_tag: u8,
}

fuzz_target!(|input: RecordInput| {
    if input.bytes.len() > 8192 {
        return;
    }
    let arity = match input.arity_tag % 3 {
        0 => PathArity::Arity2,
        1 => PathArity::Arity16,
        _ => PathArity::Arity256,
    };

    // arbitrary bytes never panic the decoders, and whatever decodes
    // re-encodes to the exact same bytes
    if let Ok(node) = NodeData::from_bytes(&input.bytes, arity) {
        assert_eq!(node.to_bytes(arity), input.bytes);
    }
    if let Ok(proof) = MerkleProof::from_bytes(&input.bytes) {
        assert_eq!(proof.to_bytes(), input.bytes);
    }
});
