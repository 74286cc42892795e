// Codec behaviour checked against an independent CBOR implementation
use ciborium::value::{Integer, Value as Reference};
use webauthn_mfa::cbor::{
    decode, decode_prefix, decode_with, encode, DecodeErrorKind, DecodeOptions, Map, Value,
};

fn to_reference(value: &Value) -> Reference {
    match value {
        Value::Unsigned(n) => Reference::Integer(Integer::from(*n)),
        Value::Negative(n) => {
            Reference::Integer(Integer::try_from(-1 - i128::from(*n)).expect("in CBOR range"))
        }
        Value::Bytes(b) => Reference::Bytes(b.clone()),
        Value::Text(t) => Reference::Text(t.clone()),
        Value::Array(items) => Reference::Array(items.iter().map(to_reference).collect()),
        Value::Map(map) => Reference::Map(
            map.iter()
                .map(|(k, v)| (to_reference(k), to_reference(v)))
                .collect(),
        ),
        Value::Tag(tag, inner) => Reference::Tag(*tag, Box::new(to_reference(inner))),
        Value::Bool(b) => Reference::Bool(*b),
        Value::Null => Reference::Null,
        other => panic!("no reference mapping for {other}"),
    }
}

fn reference_bytes(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(&to_reference(value), &mut out).expect("reference encoding");
    out
}

fn samples() -> Vec<Value> {
    vec![
        Value::Unsigned(0),
        Value::Unsigned(23),
        Value::Unsigned(24),
        Value::Unsigned(255),
        Value::Unsigned(256),
        Value::Unsigned(65_536),
        Value::Unsigned(u64::MAX),
        Value::integer(-1),
        Value::integer(-7),
        Value::integer(-257),
        Value::Negative(u64::MAX),
        Value::Bytes(vec![0xde, 0xad, 0xbe, 0xef]),
        Value::Bytes(vec![0x5a; 300]),
        Value::Text("webauthn.create".to_string()),
        Value::Text("ünïcödé".to_string()),
        Value::Array(vec![Value::Null, Value::Bool(true), Value::Bool(false)]),
        Value::Map(
            Map::new()
                .entry("fmt", "packed")
                .entry("attStmt", Map::new().entry("alg", -7i64))
                .entry("authData", vec![0u8; 37]),
        ),
        Value::Map(
            Map::new()
                .entry(1i64, 2i64)
                .entry(3i64, -7i64)
                .entry(-1i64, 1i64)
                .entry(-2i64, vec![0x11u8; 32])
                .entry(-3i64, vec![0x22u8; 32]),
        ),
        Value::Tag(1, Box::new(Value::Unsigned(1_700_000_000))),
        Value::Tag(0, Box::new(Value::Text("2024-01-01T00:00:00Z".to_string()))),
    ]
}

#[test]
fn test_encoding_matches_reference() {
    for value in samples() {
        assert_eq!(encode(&value), reference_bytes(&value), "encoding of {value}");
    }
}

#[test]
fn test_decodes_reference_output() {
    for value in samples() {
        let decoded = decode(&reference_bytes(&value)).expect("decodes");
        assert_eq!(decoded, value);
    }
}

#[test]
fn test_reference_reads_our_output() {
    for value in samples() {
        let bytes = encode(&value);
        let reference: Reference = ciborium::de::from_reader(bytes.as_slice()).expect("reference decoding");
        assert_eq!(reference, to_reference(&value));
    }
}

#[test]
fn test_indefinite_lengths() {
    // [_ 1, [2, 3], [_ 4, 5]]
    let bytes = [0x9f, 0x01, 0x82, 0x02, 0x03, 0x9f, 0x04, 0x05, 0xff, 0xff];
    let expected = Value::Array(vec![
        Value::Unsigned(1),
        Value::Array(vec![Value::Unsigned(2), Value::Unsigned(3)]),
        Value::Array(vec![Value::Unsigned(4), Value::Unsigned(5)]),
    ]);
    assert_eq!(decode(&bytes).unwrap(), expected);

    // (_ h'0102', h'03')
    let chunked = [0x5f, 0x42, 0x01, 0x02, 0x41, 0x03, 0xff];
    assert_eq!(decode(&chunked).unwrap(), Value::Bytes(vec![1, 2, 3]));
}

#[test]
fn test_map_equality_ignores_order() {
    let a = decode(&[0xa2, 0x01, 0x02, 0x03, 0x04]).unwrap();
    let b = decode(&[0xa2, 0x03, 0x04, 0x01, 0x02]).unwrap();
    assert_eq!(a, b);
    // Re-encoding keeps the received order
    assert_eq!(encode(&b), vec![0xa2, 0x03, 0x04, 0x01, 0x02]);
}

#[test]
fn test_rejects_malformed_input() {
    let cases: &[(&[u8], &str)] = &[
        (&[0x1c], "reserved additional information"),
        (&[0xff], "stray break"),
        (&[0x5a, 0xff, 0xff, 0xff, 0xff, 0x00], "length beyond input"),
        (&[0x62, 0xc3, 0x28], "invalid UTF-8"),
        (&[0xf8, 0x10], "two-byte simple below 32"),
        (&[0x5f, 0x61, 0x61, 0xff], "text chunk in byte string"),
        (&[0x01, 0x02], "trailing bytes"),
        (&[0x82, 0x01], "truncated array"),
    ];
    for (bytes, label) in cases {
        assert!(decode(bytes).is_err(), "{label} should be rejected");
    }
}

#[test]
fn test_trailing_bytes_with_prefix_decode() {
    let (value, used) = decode_prefix(&[0x18, 0x64, 0xaa, 0xbb]).unwrap();
    assert_eq!(value, Value::Unsigned(100));
    assert_eq!(used, 2);
}

#[test]
fn test_depth_limit() {
    let mut nested = vec![0x81; 20];
    nested.push(0x00);
    let err = decode(&nested).unwrap_err();
    assert!(matches!(err.kind, DecodeErrorKind::DepthExceeded(_)));
    assert!(decode_with(&nested, DecodeOptions::default().with_max_depth(32)).is_ok());
}

#[test]
fn test_bignums_are_preserved() {
    // 2(h'010000000000000000') is 2^64
    let bytes = [0xc2, 0x49, 0x01, 0, 0, 0, 0, 0, 0, 0, 0];
    let value = decode(&bytes).unwrap();
    let (tag, inner) = value.as_tag().unwrap();
    assert_eq!(tag, 2);
    assert_eq!(inner.as_bytes().unwrap().len(), 9);
    assert_eq!(value.as_i128(), None);
    assert_eq!(encode(&value), bytes);
}

/// xorshift64 byte strings, seeded so a failing input can be replayed
struct Xorshift(u64);

impl Xorshift {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn bytes(&mut self, max_len: u64) -> Vec<u8> {
        let len = self.next() % (max_len + 1);
        (0..len).map(|_| self.next().to_le_bytes()[0]).collect()
    }
}

fn generated_inputs() -> Vec<Vec<u8>> {
    let mut inputs = Vec::new();
    for value in samples() {
        let bytes = encode(&value);
        for end in 0..=bytes.len() {
            inputs.push(bytes[..end].to_vec());
        }
    }
    let mut rng = Xorshift(0x2545_f491_4f6c_dd1d);
    for _ in 0..5000 {
        inputs.push(rng.bytes(24));
    }
    // Byte-level damage to well-formed items reaches deeper decoder states
    for value in samples() {
        let bytes = encode(&value);
        for _ in 0..200 {
            let mut damaged = bytes.clone();
            let at = usize::try_from(rng.next() % bytes.len() as u64).expect("index fits");
            damaged[at] = rng.next().to_le_bytes()[0];
            inputs.push(damaged);
        }
    }
    inputs
}

#[test]
fn test_decode_is_total_and_reencodes_identically() {
    for input in generated_inputs() {
        if let Ok(value) = decode(&input) {
            assert_eq!(
                decode(&encode(&value)).as_ref(),
                Ok(&value),
                "input {input:02x?}"
            );
        }
    }
}

#[test]
fn test_prefix_decode_consumes_within_bounds() {
    for input in generated_inputs() {
        if let Ok((value, used)) = decode_prefix(&input) {
            assert!(used > 0 && used <= input.len(), "input {input:02x?}");
            assert_eq!(decode(&input[..used]), Ok(value), "input {input:02x?}");
        }
    }
}

