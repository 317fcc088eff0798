use proptest::prelude::*;

use quire_types::{Etag, Timestamp};

proptest! {
    /// Big-endian encoding keeps byte order equal to numeric order.
    #[test]
    fn etag_byte_order_matches_numeric_order(a in any::<u64>(), b in any::<u64>()) {
        let (ea, eb) = (Etag::new(a), Etag::new(b));
        prop_assert_eq!(ea.to_be_bytes().cmp(&eb.to_be_bytes()), ea.cmp(&eb));
    }

    #[test]
    fn etag_bytes_roundtrip(v in any::<u64>()) {
        let etag = Etag::new(v);
        prop_assert_eq!(Etag::from_be_bytes(etag.to_be_bytes()), etag);
    }

    /// Etag bincode serialization roundtrip.
    #[test]
    fn etag_bincode_roundtrip(v in any::<u64>()) {
        let etag = Etag::new(v);
        let encoded = bincode::serialize(&etag).unwrap();
        let decoded: Etag = bincode::deserialize(&encoded).unwrap();
        prop_assert_eq!(decoded, etag);
    }

    /// Timestamp ordering: new(a) <= new(b) iff a <= b.
    #[test]
    fn timestamp_ordering(a in 0u64..u64::MAX, b in 0u64..u64::MAX) {
        let ta = Timestamp::new(a);
        let tb = Timestamp::new(b);
        prop_assert_eq!(ta <= tb, a <= b);
        prop_assert_eq!(ta == tb, a == b);
    }
}
