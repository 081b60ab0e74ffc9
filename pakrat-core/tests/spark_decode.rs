use pakrat_core::error::ExtractError;
use pakrat_core::spark;

// Wire tags used by the table format.
const TAG_BOOL: u8 = 1;
const TAG_BYTE: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_LONG: u8 = 4;
const TAG_FLOAT: u8 = 5;
const TAG_STR: u8 = 7;
const TAG_ENUM: u8 = 8;
const TAG_BEAN: u8 = 9;
const TAG_ARRAY: u8 = 10;
const TAG_MAP: u8 = 11;

/// Position-aware writer so absolute alignment matches what the reader does.
struct W(Vec<u8>);

impl W {
    fn new() -> Self {
        W(Vec::new())
    }
    fn pos(&self) -> u32 {
        self.0.len() as u32
    }
    fn align(&mut self, n: usize) {
        while self.0.len() % n != 0 {
            self.0.push(0);
        }
    }
    fn u8(&mut self, v: u8) {
        self.0.push(v);
    }
    fn i32(&mut self, v: i32) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn u32(&mut self, v: u32) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn i64(&mut self, v: i64) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn f32(&mut self, v: f32) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn lp(&mut self, s: &str) {
        self.0.extend_from_slice(&(s.len() as u16).to_le_bytes());
        self.0.extend_from_slice(s.as_bytes());
    }
    fn patch_u32(&mut self, at: usize, v: u32) {
        self.0[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }
}

#[test]
fn map_of_int_to_int() {
    let mut w = W::new();
    w.u32(0); // type-def offset, patched below
    w.u32(0); // root-def offset
    w.u32(0); // data offset

    let type_off = w.pos();
    w.u32(0); // no registered types

    let root_off = w.pos();
    w.u8(TAG_MAP);
    w.lp("root");
    w.u8(TAG_INT);
    w.u8(TAG_INT);

    let data_off = w.pos();
    w.u32(2); // entry count
    w.0.extend_from_slice(&[0u8; 16]); // index bookkeeping
    w.i32(1);
    w.i32(10);
    w.i32(2);
    w.i32(20);

    w.patch_u32(0, type_off);
    w.patch_u32(4, root_off);
    w.patch_u32(8, data_off);

    let json = spark::decode_to_json(&w.0).unwrap();
    assert_eq!(json, "{\n  \"1\": 10,\n  \"2\": 20\n}");
}

#[test]
fn decode_is_deterministic() {
    let buf = bean_fixture();
    let a = spark::decode_to_json(&buf).unwrap();
    let b = spark::decode_to_json(&buf).unwrap();
    assert_eq!(a, b);
}

const CFG_HASH: u32 = 0xAAAA0001;
const CHILD_HASH: u32 = 0xCCCC0003;
const MODE_HASH: u32 = 0xBBBB0002;

/// A bean exercising bool packing, 8-byte alignment, the string pool, enum
/// names, nested pointers and nulls.
fn bean_fixture() -> Vec<u8> {
    let mut w = W::new();
    w.u32(0);
    w.u32(0);
    w.u32(0);

    // type definitions
    let type_off = w.pos();
    w.u32(3);

    w.u8(TAG_BEAN);
    w.align(4);
    w.u32(CFG_HASH);
    w.lp("Cfg");
    w.u32(11); // field count
    w.lp("enabled");
    w.u8(TAG_BOOL);
    w.lp("visible");
    w.u8(TAG_BOOL);
    w.lp("count");
    w.u8(TAG_INT);
    w.lp("big");
    w.u8(TAG_LONG);
    w.lp("ratio");
    w.u8(TAG_FLOAT);
    w.lp("name");
    w.u8(TAG_STR);
    w.lp("mode");
    w.u8(TAG_ENUM);
    w.align(4);
    w.u32(MODE_HASH);
    w.lp("child");
    w.u8(TAG_BEAN);
    w.align(4);
    w.u32(CHILD_HASH);
    w.lp("nums");
    w.u8(TAG_ARRAY);
    w.u8(TAG_INT);
    w.lp("lookup");
    w.u8(TAG_MAP);
    w.u8(TAG_INT);
    w.u8(TAG_STR);
    w.lp("nothing");
    w.u8(TAG_BEAN);
    w.align(4);
    w.u32(CHILD_HASH);

    w.u8(TAG_BEAN);
    w.align(4);
    w.u32(CHILD_HASH);
    w.lp("Child");
    w.u32(1);
    w.lp("x");
    w.u8(TAG_INT);

    w.u8(TAG_ENUM);
    w.align(4);
    w.u32(MODE_HASH);
    w.lp("Mode");
    w.u32(3);
    w.lp("Off");
    w.i32(0);
    w.lp("On");
    w.i32(1);
    w.lp("Turbo");
    w.i32(7);

    // root descriptor
    let root_off = w.pos();
    w.u8(TAG_BEAN);
    w.lp("root");
    w.align(4);
    w.u32(CFG_HASH);

    // string pool
    let s_widget = w.pos();
    w.lp("Widget");
    let s_ten = w.pos();
    w.lp("ten");
    let s_twenty = w.pos();
    w.lp("twenty");

    // nested bodies
    let child_body = w.pos();
    w.i32(5);

    let array_body = w.pos();
    w.u32(3);
    w.i32(1);
    w.i32(2);
    w.i32(3);

    let map_body = w.pos();
    w.u32(2);
    w.0.extend_from_slice(&[0u8; 16]);
    w.i32(1);
    w.i32(s_ten as i32);
    w.i32(2);
    w.i32(s_twenty as i32);

    // main bean body
    w.align(8); // keep the fixture's long field cheap to reason about
    let data_off = w.pos();
    w.u8(1); // enabled
    w.u8(0); // visible; run ends, pad to word
    w.align(4);
    w.i32(7); // count
    w.align(8);
    w.i64(0x1_0000_0000); // big
    w.f32(0.5); // ratio
    w.i32(s_widget as i32); // name
    w.i32(7); // mode = Turbo
    w.i32(child_body as i32);
    w.i32(array_body as i32);
    w.i32(map_body as i32);
    w.i32(-1); // nothing

    w.patch_u32(0, type_off);
    w.patch_u32(4, root_off);
    w.patch_u32(8, data_off);
    w.0
}

#[test]
fn bean_decodes_with_alignment_pointers_and_nulls() {
    let buf = bean_fixture();
    let v = spark::decode_value(&buf).unwrap();
    let obj = v.as_object().unwrap();

    assert_eq!(obj["enabled"], serde_json::json!(true));
    assert_eq!(obj["visible"], serde_json::json!(false));
    assert_eq!(obj["count"], serde_json::json!(7));
    assert_eq!(obj["big"], serde_json::json!(4294967296i64));
    assert_eq!(obj["ratio"], serde_json::json!(0.5));
    assert_eq!(obj["name"], serde_json::json!("Widget"));
    assert_eq!(obj["mode"], serde_json::json!("Turbo"));
    assert_eq!(obj["child"], serde_json::json!({ "x": 5 }));
    assert_eq!(obj["nums"], serde_json::json!([1, 2, 3]));
    assert_eq!(obj["lookup"], serde_json::json!({ "1": "ten", "2": "twenty" }));
    assert_eq!(obj["nothing"], serde_json::Value::Null);

    // declared field order survives into the document
    let keys: Vec<&String> = obj.keys().collect();
    assert_eq!(keys.first().unwrap().as_str(), "enabled");
    assert_eq!(keys.last().unwrap().as_str(), "nothing");
}

#[test]
fn byte_field_tag_is_unsupported() {
    let mut w = W::new();
    w.u32(0);
    w.u32(0);
    w.u32(0);
    let type_off = w.pos();
    w.u32(0);
    let root_off = w.pos();
    w.u8(TAG_BYTE);
    w.lp("root");
    let data_off = w.pos();
    w.patch_u32(0, type_off);
    w.patch_u32(4, root_off);
    w.patch_u32(8, data_off);

    let err = spark::decode_value(&w.0).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ExtractError>(),
        Some(ExtractError::UnsupportedField { tag: 2, .. })
    ));
}

#[test]
fn nested_aggregate_element_is_unsupported() {
    let mut w = W::new();
    w.u32(0);
    w.u32(0);
    w.u32(0);
    let type_off = w.pos();
    w.u32(0);
    let root_off = w.pos();
    w.u8(TAG_ARRAY);
    w.lp("root");
    w.u8(TAG_MAP); // array of maps: outside the implemented set
    let data_off = w.pos();
    w.patch_u32(0, type_off);
    w.patch_u32(4, root_off);
    w.patch_u32(8, data_off);

    let err = spark::decode_value(&w.0).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ExtractError>(),
        Some(ExtractError::UnsupportedField { tag: 11, .. })
    ));
}

#[test]
fn array_of_beans_follows_pointers() {
    let mut w = W::new();
    w.u32(0);
    w.u32(0);
    w.u32(0);

    let type_off = w.pos();
    w.u32(1);
    w.u8(TAG_BEAN);
    w.align(4);
    w.u32(CHILD_HASH);
    w.lp("Child");
    w.u32(1);
    w.lp("x");
    w.u8(TAG_INT);

    let root_off = w.pos();
    w.u8(TAG_ARRAY);
    w.lp("root");
    w.u8(TAG_BEAN);
    w.align(4);
    w.u32(CHILD_HASH);

    // element bodies first, then the array of pointers
    let b0 = w.pos();
    w.i32(100);
    let b1 = w.pos();
    w.i32(200);

    let data_off = w.pos();
    w.u32(3);
    w.i32(b0 as i32);
    w.i32(-1); // null element
    w.i32(b1 as i32);

    w.patch_u32(0, type_off);
    w.patch_u32(4, root_off);
    w.patch_u32(8, data_off);

    let v = spark::decode_value(&w.0).unwrap();
    assert_eq!(
        v,
        serde_json::json!([{ "x": 100 }, null, { "x": 200 }])
    );
}

#[test]
fn array_of_longs_aligns_each_element() {
    let mut w = W::new();
    w.u32(0);
    w.u32(0);
    w.u32(0);
    let type_off = w.pos();
    w.u32(0);
    let root_off = w.pos();
    w.u8(TAG_ARRAY);
    w.lp("root");
    w.u8(TAG_LONG);

    w.align(4);
    let data_off = w.pos();
    w.u32(2); // count, leaving the cursor 4 past an 8-byte boundary
    w.align(8);
    w.i64(-1);
    w.i64(i64::MAX);

    w.patch_u32(0, type_off);
    w.patch_u32(4, root_off);
    w.patch_u32(8, data_off);

    let v = spark::decode_value(&w.0).unwrap();
    assert_eq!(v, serde_json::json!([-1i64, i64::MAX]));
}

#[test]
fn unregistered_enum_value_degrades_to_number() {
    let mut w = W::new();
    w.u32(0);
    w.u32(0);
    w.u32(0);
    let type_off = w.pos();
    w.u32(1);
    w.u8(TAG_ENUM);
    w.align(4);
    w.u32(MODE_HASH);
    w.lp("Mode");
    w.u32(1);
    w.lp("Off");
    w.i32(0);

    let root_off = w.pos();
    w.u8(TAG_ENUM);
    w.lp("root");
    w.align(4);
    w.u32(MODE_HASH);

    let data_off = w.pos();
    w.i32(99); // no such entry

    w.patch_u32(0, type_off);
    w.patch_u32(4, root_off);
    w.patch_u32(8, data_off);

    let v = spark::decode_value(&w.0).unwrap();
    assert_eq!(v, serde_json::json!(99));
}

#[test]
fn null_string_offset_is_empty_and_null_array_is_null() {
    let mut w = W::new();
    w.u32(0);
    w.u32(0);
    w.u32(0);
    let type_off = w.pos();
    w.u32(1);
    w.u8(TAG_BEAN);
    w.align(4);
    w.u32(0x51);
    w.lp("S");
    w.u32(2);
    w.lp("text");
    w.u8(TAG_STR);
    w.lp("items");
    w.u8(TAG_ARRAY);
    w.u8(TAG_INT);

    let root_off = w.pos();
    w.u8(TAG_BEAN);
    w.lp("root");
    w.align(4);
    w.u32(0x51);

    let data_off = w.pos();
    w.i32(-1); // text
    w.i32(-1); // items

    w.patch_u32(0, type_off);
    w.patch_u32(4, root_off);
    w.patch_u32(8, data_off);

    let v = spark::decode_value(&w.0).unwrap();
    assert_eq!(v, serde_json::json!({ "text": "", "items": null }));
}
