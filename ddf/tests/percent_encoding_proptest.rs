use ddf::wire::{decode_bytes, encode_bytes};
use proptest::prelude::*;

proptest! {
    /// Property 7 in spec.md §8: for every byte sequence, the encoded
    /// form is pure ASCII and decoding it recovers the original bytes.
    #[test]
    fn percent_encoding_is_total_and_invertible(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let encoded = encode_bytes(&bytes);
        prop_assert!(encoded.is_ascii());
        let decoded = decode_bytes(&encoded).unwrap();
        prop_assert_eq!(decoded, bytes);
    }

    #[test]
    fn string_nodes_roundtrip_through_the_wire(s in "\\PC*") {
        let mut tree = ddf::Ddf::new();
        let node = tree.string(s.clone());
        let bytes = ddf::wire::encode(&tree, node);
        let decoded = ddf::wire::decode(&mut tree, &bytes).unwrap();
        prop_assert!(tree.structural_eq(node, decoded));
        prop_assert_eq!(tree.as_str(decoded).unwrap(), s.as_str());
    }

    #[test]
    fn int_nodes_roundtrip_through_the_wire(n in any::<i32>()) {
        let mut tree = ddf::Ddf::new();
        let node = tree.integer(n);
        let bytes = ddf::wire::encode(&tree, node);
        let decoded = ddf::wire::decode(&mut tree, &bytes).unwrap();
        prop_assert_eq!(tree.as_int(decoded), Some(n));
    }
}
