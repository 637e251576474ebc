#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use unitrie::data::{
    common_prefix_len, decode_digits, encode_digits, pack_key, unpack_key, PathArity,
};

#[derive(Arbitrary, Debug)]
struct KeyPathInput {
    bytes: Vec<u8>,
    arity_tag: u8,
    garbage: Vec<u8>,
}

fn pick_arity(tag: u8) -> PathArity {
    match tag % 3 {
        0 => PathArity::Arity2,
        1 => PathArity::Arity16,
        _ => PathArity::Arity256,
    }
}

fuzz_target!(|input: KeyPathInput| {
    if input.bytes.len() > 4096 || input.garbage.len() > 4096 {
        return;
    }
    let arity = pick_arity(input.arity_tag);

    // packed keys round-trip through their digit paths
    let digits = unpack_key(&input.bytes, arity);
    assert!(digits.iter().all(|d| (*d as usize) < arity.num_children()));
    assert_eq!(pack_key(&digits, arity).unwrap(), input.bytes);

    // digit strings of any length round-trip through the codec
    for cut in [0, digits.len() / 2, digits.len()] {
        let fragment = &digits[..cut];
        let encoded = encode_digits(fragment, arity);
        assert_eq!(decode_digits(&encoded, arity).unwrap(), fragment);
    }

    assert_eq!(common_prefix_len(&digits, &digits), digits.len());

    // arbitrary bytes never panic the digit decoder
    let _ = decode_digits(&input.garbage, arity);
});
