//! SparkBuffer: typed binary table data to JSON.
//!
//! A buffer carries three sectors addressed from a 12-byte header: type
//! definitions, the root-value descriptor, and the data itself. Aggregates
//! (beans, enums) are registered by 32-bit hash; beans, arrays and maps are
//! pointer-referenced through absolute 32-bit offsets with −1 for null.
//!
//! The registry lives on the decoder instance and dies with it, so decoding
//! two files never shares type state.

use crate::error::ExtractError;
use crate::wire::Reader;
use anyhow::{Context, Result};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tag {
    Bool = 1,
    Byte = 2,
    Int = 3,
    Long = 4,
    Float = 5,
    Double = 6,
    Str = 7,
    Enum = 8,
    Bean = 9,
    Array = 10,
    Map = 11,
}

impl Tag {
    fn from_u8(b: u8, context: &str) -> Result<Tag> {
        Ok(match b {
            1 => Tag::Bool,
            2 => Tag::Byte,
            3 => Tag::Int,
            4 => Tag::Long,
            5 => Tag::Float,
            6 => Tag::Double,
            7 => Tag::Str,
            8 => Tag::Enum,
            9 => Tag::Bean,
            10 => Tag::Array,
            11 => Tag::Map,
            other => {
                return Err(ExtractError::UnsupportedField {
                    tag: other,
                    context: context.to_string(),
                }
                .into())
            }
        })
    }
}

/// Shape of one decodable value. Array elements and map keys/values are
/// restricted to scalars, strings, enums and beans; deeper nesting and the
/// `byte` tag are outside the implemented set.
#[derive(Clone, Debug)]
struct ValueDesc {
    tag: Tag,
    /// Registered type hash for enum/bean.
    type_hash: u32,
    elem: Option<Box<ValueDesc>>,
    entry: Option<Box<(ValueDesc, ValueDesc)>>,
}

impl ValueDesc {
    fn scalar(tag: Tag) -> Self {
        Self { tag, type_hash: 0, elem: None, entry: None }
    }
}

#[derive(Debug)]
struct FieldDef {
    name: String,
    desc: ValueDesc,
}

#[derive(Debug)]
struct BeanDef {
    #[allow(dead_code)]
    name: String,
    fields: Vec<FieldDef>,
}

#[derive(Debug)]
struct EnumDef {
    #[allow(dead_code)]
    name: String,
    entries: Vec<(String, i32)>,
}

#[derive(Default)]
struct Registry {
    beans: HashMap<u32, BeanDef>,
    enums: HashMap<u32, EnumDef>,
}

/// Decode a buffer and pretty-print it: two-space indent, object keys in
/// insertion order. Byte-identical across runs for the same input.
pub fn decode_to_json(data: &[u8]) -> Result<String> {
    let value = decode_value(data)?;
    Ok(serde_json::to_string_pretty(&value)?)
}

pub fn decode_value(data: &[u8]) -> Result<Value> {
    let mut hdr = Reader::new(data);
    let type_off = hdr.u32_le("type-def sector offset")?;
    let root_off = hdr.u32_le("root-def offset")?;
    let data_off = hdr.u32_le("data sector offset")?;

    let registry = parse_type_defs(data, type_off).context("type-definition sector")?;
    let root = parse_root_desc(data, root_off).context("root descriptor")?;

    let decoder = Decoder { data, registry };
    let mut r = Reader::new(data);
    r.seek(data_off as u64);
    decoder.read_root(&mut r, &root)
}

fn parse_type_defs(data: &[u8], offset: u32) -> Result<Registry> {
    let mut r = Reader::new(data);
    r.seek(offset as u64);
    let count = r.u32_le("type count")?;
    let mut reg = Registry::default();
    for i in 0..count {
        let tag = Tag::from_u8(r.u8("type tag")?, "type definition")?;
        r.align(4);
        match tag {
            Tag::Bean => {
                let hash = r.u32_le("bean hash")?;
                let name = r.lp_utf8("bean name")?;
                let field_count = r.u32_le("field count")?;
                let mut fields = Vec::with_capacity(field_count.min(0x10000) as usize);
                for _ in 0..field_count {
                    fields.push(parse_field(&mut r)?);
                }
                reg.beans.insert(hash, BeanDef { name, fields });
            }
            Tag::Enum => {
                let hash = r.u32_le("enum hash")?;
                let name = r.lp_utf8("enum name")?;
                let entry_count = r.u32_le("enum entry count")?;
                let mut entries = Vec::with_capacity(entry_count.min(0x10000) as usize);
                for _ in 0..entry_count {
                    let ename = r.lp_utf8("enum entry name")?;
                    let value = r.i32_le("enum entry value")?;
                    entries.push((ename, value));
                }
                reg.enums.insert(hash, EnumDef { name, entries });
            }
            other => {
                return Err(ExtractError::UnsupportedField {
                    tag: other as u8,
                    context: format!("type definition {}", i),
                }
                .into())
            }
        }
    }
    Ok(reg)
}

fn parse_field(r: &mut Reader<'_>) -> Result<FieldDef> {
    let name = r.lp_utf8("field name")?;
    let tag = Tag::from_u8(r.u8("field tag")?, &name)?;
    let desc = parse_desc(r, tag, &name, true)?;
    Ok(FieldDef { name, desc })
}

fn parse_root_desc(data: &[u8], offset: u32) -> Result<ValueDesc> {
    let mut r = Reader::new(data);
    r.seek(offset as u64);
    let tag = Tag::from_u8(r.u8("root tag")?, "root")?;
    let _name = r.lp_utf8("root name")?;
    parse_desc(&mut r, tag, "root", true)
}

/// Read the aggregate trailer of a descriptor: type hashes for enum/bean
/// (4-byte aligned), subtype tags and hashes for array/map.
fn parse_desc(r: &mut Reader<'_>, tag: Tag, context: &str, top: bool) -> Result<ValueDesc> {
    match tag {
        Tag::Bool | Tag::Int | Tag::Long | Tag::Float | Tag::Double | Tag::Str => {
            Ok(ValueDesc::scalar(tag))
        }
        Tag::Enum | Tag::Bean => {
            r.align(4);
            let hash = r.u32_le("type hash")?;
            Ok(ValueDesc { tag, type_hash: hash, elem: None, entry: None })
        }
        Tag::Array if top => {
            let elem_tag = Tag::from_u8(r.u8("element tag")?, context)?;
            let elem = parse_desc(r, elem_tag, context, false)?;
            Ok(ValueDesc { tag, type_hash: 0, elem: Some(Box::new(elem)), entry: None })
        }
        Tag::Map if top => {
            let key_tag = Tag::from_u8(r.u8("key tag")?, context)?;
            let val_tag = Tag::from_u8(r.u8("value tag")?, context)?;
            let key = parse_desc(r, key_tag, context, false)?;
            let value = parse_desc(r, val_tag, context, false)?;
            Ok(ValueDesc { tag, type_hash: 0, elem: None, entry: Some(Box::new((key, value))) })
        }
        // Byte anywhere, or array/map nested inside an element slot.
        other => Err(ExtractError::UnsupportedField {
            tag: other as u8,
            context: context.to_string(),
        }
        .into()),
    }
}

struct Decoder<'a> {
    data: &'a [u8],
    registry: Registry,
}

impl<'a> Decoder<'a> {
    /// The root aggregate sits directly at the data offset; nested aggregates
    /// are reached through pointers.
    fn read_root(&self, r: &mut Reader<'_>, desc: &ValueDesc) -> Result<Value> {
        match desc.tag {
            Tag::Bean => self.read_bean_body(r, desc.type_hash),
            Tag::Array => self.read_array_body(r, desc.elem.as_deref().unwrap()),
            Tag::Map => {
                let (k, v) = desc.entry.as_deref().unwrap();
                self.read_map_body(r, k, v)
            }
            _ => self.read_inline(r, desc),
        }
    }

    /// Decode a field or element at the cursor. Pointer shapes consume a
    /// 32-bit offset; everything else is inline.
    fn read_field(&self, r: &mut Reader<'_>, desc: &ValueDesc) -> Result<Value> {
        match desc.tag {
            Tag::Bean => {
                let off = r.i32_le("bean offset")?;
                if off < 0 {
                    return Ok(Value::Null);
                }
                let mut sub = Reader::new(self.data);
                sub.seek(off as u64);
                self.read_bean_body(&mut sub, desc.type_hash)
            }
            Tag::Array => {
                let off = r.i32_le("array offset")?;
                if off < 0 {
                    return Ok(Value::Null);
                }
                let mut sub = Reader::new(self.data);
                sub.seek(off as u64);
                self.read_array_body(&mut sub, desc.elem.as_deref().unwrap())
            }
            Tag::Map => {
                let off = r.i32_le("map offset")?;
                if off < 0 {
                    return Ok(Value::Null);
                }
                let (k, v) = desc.entry.as_deref().unwrap();
                let mut sub = Reader::new(self.data);
                sub.seek(off as u64);
                self.read_map_body(&mut sub, k, v)
            }
            _ => self.read_inline(r, desc),
        }
    }

    fn read_inline(&self, r: &mut Reader<'_>, desc: &ValueDesc) -> Result<Value> {
        Ok(match desc.tag {
            Tag::Bool => Value::Bool(r.u8("bool")? != 0),
            Tag::Int => Value::from(r.i32_le("int")?),
            Tag::Long => {
                r.align(8);
                Value::from(r.i64_le("long")?)
            }
            Tag::Float => json_f64(r.f32_le("float")? as f64),
            Tag::Double => {
                r.align(8);
                json_f64(r.f64_le("double")?)
            }
            Tag::Str => {
                let off = r.i32_le("string offset")?;
                Value::String(self.string_at(off)?)
            }
            Tag::Enum => {
                let raw = r.i32_le("enum value")?;
                self.enum_value(desc.type_hash, raw)
            }
            other => {
                return Err(ExtractError::UnsupportedField {
                    tag: other as u8,
                    context: "inline value".to_string(),
                }
                .into())
            }
        })
    }

    fn read_bean_body(&self, r: &mut Reader<'_>, hash: u32) -> Result<Value> {
        let def = self.registry.beans.get(&hash).ok_or_else(|| {
            ExtractError::CorruptOrWrongKey(format!("unregistered bean hash {:#010X}", hash))
        })?;
        let mut obj = Map::with_capacity(def.fields.len());
        for (i, field) in def.fields.iter().enumerate() {
            let value = self
                .read_field(r, &field.desc)
                .with_context(|| format!("field {:?}", field.name))?;
            // Bool runs pack; the last bool of a run pads to the next word.
            if field.desc.tag == Tag::Bool {
                let next_is_bool =
                    def.fields.get(i + 1).map(|f| f.desc.tag == Tag::Bool).unwrap_or(false);
                if !next_is_bool {
                    r.align(4);
                }
            }
            obj.insert(field.name.clone(), value);
        }
        Ok(Value::Object(obj))
    }

    fn read_array_body(&self, r: &mut Reader<'_>, elem: &ValueDesc) -> Result<Value> {
        let count = r.u32_le("array count")?;
        let mut out = Vec::with_capacity(count.min(0x100000) as usize);
        for _ in 0..count {
            out.push(self.read_field(r, elem)?);
        }
        Ok(Value::Array(out))
    }

    fn read_map_body(&self, r: &mut Reader<'_>, key: &ValueDesc, value: &ValueDesc) -> Result<Value> {
        let count = r.u32_le("map count")?;
        // Index bookkeeping the runtime uses for lookups; nothing we need.
        let skip = count as u64 * 8;
        r.seek(r.pos() + skip);
        let mut obj = Map::with_capacity(count.min(0x100000) as usize);
        for _ in 0..count {
            let k = self.read_field(r, key)?;
            let v = self.read_field(r, value)?;
            obj.insert(json_key(&k), v);
        }
        Ok(Value::Object(obj))
    }

    /// Shared string pool. Offset −1 is the empty string.
    fn string_at(&self, offset: i32) -> Result<String> {
        if offset < 0 {
            return Ok(String::new());
        }
        let mut r = Reader::new(self.data);
        r.seek(offset as u64);
        r.lp_utf8("pooled string")
    }

    fn enum_value(&self, hash: u32, raw: i32) -> Value {
        if let Some(def) = self.registry.enums.get(&hash) {
            if let Some((name, _)) = def.entries.iter().find(|(_, v)| *v == raw) {
                return Value::String(name.clone());
            }
        }
        Value::from(raw)
    }
}

fn json_key(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Non-finite floats have no JSON representation; they degrade to null the
/// same way `serde_json::Number::from_f64` would.
fn json_f64(f: f64) -> Value {
    match Number::from_f64(f) {
        Some(n) => Value::Number(n),
        None => Value::Null,
    }
}
