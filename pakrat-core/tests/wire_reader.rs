use pakrat_core::error::ExtractError;
use pakrat_core::wire::Reader;

#[test]
fn primitive_reads_and_positions() {
    let buf = [
        0x01, // u8
        0x02, 0x03, // u16 le
        0xDE, 0xAD, 0xBE, 0xEF, // u32 le
        0xFF, 0xFF, 0xFF, 0xFF, // i32 -1
        0x12, 0x34, 0x56, // u24 be
    ];
    let mut r = Reader::new(&buf);
    assert_eq!(r.u8("a").unwrap(), 1);
    assert_eq!(r.u16_le("b").unwrap(), 0x0302);
    assert_eq!(r.u32_le("c").unwrap(), 0xEFBE_ADDE);
    assert_eq!(r.i32_le("d").unwrap(), -1);
    assert_eq!(r.u24_be("e").unwrap(), 0x123456);
    assert_eq!(r.pos(), buf.len() as u64);
    assert_eq!(r.remaining(), 0);
}

#[test]
fn big_endian_reads() {
    let buf = [0x12, 0x34, 0xAB, 0xCD, 0xEF, 0x01];
    let mut r = Reader::new(&buf);
    assert_eq!(r.u16_be("a").unwrap(), 0x1234);
    assert_eq!(r.u32_be("b").unwrap(), 0xABCD_EF01);
}

#[test]
fn short_reads_name_the_field() {
    let mut r = Reader::new(&[0x01]);
    let err = r.u32_le("chunkCount").unwrap_err();
    let kind = err.downcast_ref::<ExtractError>().unwrap();
    match kind {
        ExtractError::TruncatedInput(msg) => assert!(msg.contains("chunkCount")),
        other => panic!("wrong kind: {:?}", other),
    }
}

#[test]
fn length_prefixed_strings() {
    let mut buf = vec![5, 0];
    buf.extend_from_slice(b"hello");
    buf.push(3); // u8-prefixed follows
    buf.extend_from_slice(b"abc");
    let mut r = Reader::new(&buf);
    assert_eq!(r.lp_utf8("s").unwrap(), "hello");
    assert_eq!(r.lp8_utf8("t").unwrap(), "abc");
}

#[test]
fn declared_length_past_end_is_truncated() {
    let buf = [0xFF, 0x7F, b'x'];
    let mut r = Reader::new(&buf);
    let err = r.lp_utf8("name").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ExtractError>(),
        Some(ExtractError::TruncatedInput(_))
    ));
}

#[test]
fn invalid_utf8_is_not_a_short_read() {
    let buf = [2, 0, 0xC3, 0x28];
    let mut r = Reader::new(&buf);
    let err = r.lp_utf8("name").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ExtractError>(),
        Some(ExtractError::CorruptOrWrongKey(_))
    ));
}

#[test]
fn alignment_is_relative_to_buffer_start() {
    let buf = [0u8; 32];
    let mut r = Reader::new(&buf);
    r.u8("x").unwrap();
    r.align(4);
    assert_eq!(r.pos(), 4);
    r.align(4); // already aligned: no movement
    assert_eq!(r.pos(), 4);
    r.u8("y").unwrap();
    r.align(8);
    assert_eq!(r.pos(), 8);
}

#[test]
fn seek_and_slice() {
    let buf: Vec<u8> = (0..16).collect();
    let mut r = Reader::new(&buf);
    r.seek(10);
    assert_eq!(r.bytes(3, "s").unwrap(), &[10, 11, 12]);
    assert!(r.bytes(9, "s").is_err());
}
