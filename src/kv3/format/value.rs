//! Recursive-descent decoding of the KV3 value tree.
//!
//! Both revisions end up here once their assembler has produced a flat buffer
//! and worked out where each lane lives. The decoder only sees cursors:
//!
//! ```text
//! main     structural data: names, counts, string refs, int32, booleans
//! types    optional out-of-band type bytes (current revision)
//! wide     8-byte scalars: lane (current) or inline (legacy)
//! blobs    blob bytes: lane (current, when present) or inline
//! ```
//!
//! All mutable state for one decode lives in [`DecodeContext`].

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::kv3::types::error::{Kv3Error, Result};
use crate::kv3::types::models::{KvFlag, KvType, DEFAULT_MAX_VALUES, UNNAMED_KEY};
use crate::kv3::types::node::{Node, Object, Value};
use crate::kv3::utils::ByteCursor;

/// High bit of a type byte: a resource flag byte follows.
const FLAG_BIT: u8 = 0x80;

/// Upper bound on speculative pre-allocation for wire counts.
const MAX_PREALLOC: usize = 4096;

/// Where a category of scalar is read from.
#[derive(Debug, Clone)]
pub enum ScalarSource<'a> {
    /// Read from the main cursor, advancing it.
    Inline,
    /// Read from a dedicated lane; the main cursor does not move.
    Lane(ByteCursor<'a>),
}

/// Cursor and lane state for decoding one block.
pub struct DecodeContext<'a> {
    main: ByteCursor<'a>,
    strings: &'a [String],
    types: Option<ByteCursor<'a>>,
    wide: ScalarSource<'a>,
    blobs: ScalarSource<'a>,
    max_depth: usize,
    depth: usize,
    max_values: usize,
    values: usize,
}

impl<'a> DecodeContext<'a> {
    pub fn new(main: ByteCursor<'a>, strings: &'a [String], max_depth: usize) -> Self {
        Self {
            main,
            strings,
            types: None,
            wide: ScalarSource::Inline,
            blobs: ScalarSource::Inline,
            max_depth,
            depth: 0,
            max_values: DEFAULT_MAX_VALUES,
            values: 0,
        }
    }

    /// Reads type bytes from `lane` instead of the main cursor.
    pub fn with_type_lane(mut self, lane: ByteCursor<'a>) -> Self {
        self.types = Some(lane);
        self
    }

    pub fn with_wide_source(mut self, source: ScalarSource<'a>) -> Self {
        self.wide = source;
        self
    }

    pub fn with_blob_source(mut self, source: ScalarSource<'a>) -> Self {
        self.blobs = source;
        self
    }

    /// Caps the number of values the document may hold.
    pub fn with_max_values(mut self, max_values: usize) -> Self {
        self.max_values = max_values;
        self
    }

    /// Decodes the root value.
    ///
    /// With no structural bytes and no type bytes left, the root is an empty
    /// object.
    pub fn parse_root(&mut self) -> Result<Node> {
        let types_empty = self.types.as_ref().map_or(true, ByteCursor::is_empty);
        if self.main.is_empty() && types_empty {
            debug!("Structural region is empty, returning an empty root object");
            return Ok(Node::new(Value::Object(Object::new())));
        }

        let (kv_type, flag) = self.read_type()?;
        let root = self.read_value(kv_type, flag)?;

        if !self.main.is_empty() {
            debug!("{} structural bytes left after the root value", self.main.remaining());
        }
        if let Some(types) = &self.types {
            if !types.is_empty() {
                debug!("{} type bytes left after the root value", types.remaining());
            }
        }
        Ok(root)
    }

    /// Reads a type byte and, if its high bit is set, the flag byte after it.
    ///
    /// Both bytes come from the type lane when there is one.
    fn read_type(&mut self) -> Result<(KvType, KvFlag)> {
        let raw = self.next_type_byte()?;
        let (raw_type, flag) = if raw & FLAG_BIT != 0 {
            (raw & !FLAG_BIT, KvFlag::try_from(self.next_type_byte()?)?)
        } else {
            (raw, KvFlag::Nothing)
        };
        Ok((KvType::try_from(raw_type)?, flag))
    }

    fn next_type_byte(&mut self) -> Result<u8> {
        match &mut self.types {
            Some(lane) => lane.read_u8(),
            None => self.main.read_u8(),
        }
    }

    fn read_value(&mut self, kv_type: KvType, flag: KvFlag) -> Result<Node> {
        self.claim_values(1)?;
        self.values += 1;
        let value = match kv_type {
            KvType::Null => Value::Null,
            KvType::Boolean => Value::Bool(self.main.read_u8()? != 0),
            KvType::Int64 => Value::Int64(LittleEndian::read_i64(&self.read_wide()?)),
            KvType::UInt64 => Value::UInt64(LittleEndian::read_u64(&self.read_wide()?)),
            KvType::Double => Value::Double(LittleEndian::read_f64(&self.read_wide()?)),
            KvType::DoubleZero => Value::Double(0.0),
            KvType::DoubleOne => Value::Double(1.0),
            KvType::Int32 => Value::Int32(self.main.read_i32()?),
            KvType::String => Value::String(self.read_string_ref()?),
            KvType::BinaryBlob => Value::Blob(self.read_blob()?),
            KvType::Array => Value::Array(self.read_array()?),
            KvType::Object => Value::Object(self.read_object()?),
            KvType::ArrayTyped => self.read_typed_array()?,
            KvType::StringMulti
            | KvType::UInt32
            | KvType::BooleanTrue
            | KvType::BooleanFalse
            | KvType::Int64Zero
            | KvType::Int64One => return Err(Kv3Error::UnsupportedType(kv_type as u8)),
        };
        Ok(Node::with_flag(value, flag))
    }

    fn read_wide(&mut self) -> Result<[u8; 8]> {
        let source = match &mut self.wide {
            ScalarSource::Lane(lane) => lane,
            ScalarSource::Inline => &mut self.main,
        };
        source.read_array::<8>()
    }

    fn read_blob(&mut self) -> Result<Vec<u8>> {
        let len = self.main.read_u32()? as usize;
        let source = match &mut self.blobs {
            ScalarSource::Lane(lane) => lane,
            ScalarSource::Inline => &mut self.main,
        };
        Ok(source.take(len)?.to_vec())
    }

    /// `-1` is a null string; anything else must index the string table.
    fn read_string_ref(&mut self) -> Result<Option<String>> {
        match self.main.read_i32()? {
            -1 => Ok(None),
            index => self.lookup_string(index).map(|s| Some(s.to_owned())),
        }
    }

    fn read_name(&mut self) -> Result<String> {
        match self.main.read_i32()? {
            -1 => Ok(UNNAMED_KEY.to_owned()),
            index => self.lookup_string(index).map(str::to_owned),
        }
    }

    fn lookup_string(&self, index: i32) -> Result<&'a str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.strings.get(i))
            .map(String::as_str)
            .ok_or(Kv3Error::StringIndexOutOfRange {
                index,
                len: self.strings.len(),
            })
    }

    fn read_array(&mut self) -> Result<Vec<Node>> {
        let count = self.main.read_u32()? as usize;
        self.claim_values(count)?;
        self.enter()?;
        let mut items = Vec::with_capacity(count.min(MAX_PREALLOC));
        for _ in 0..count {
            let (kv_type, flag) = self.read_type()?;
            items.push(self.read_value(kv_type, flag)?);
        }
        self.leave();
        Ok(items)
    }

    fn read_object(&mut self) -> Result<Object> {
        let count = self.main.read_u32()? as usize;
        self.claim_values(count)?;
        self.enter()?;
        let mut object = Object::with_capacity(count.min(MAX_PREALLOC));
        for _ in 0..count {
            let name = self.read_name()?;
            let (kv_type, flag) = self.read_type()?;
            let node = self.read_value(kv_type, flag)?;
            object.insert(name, node);
        }
        self.leave();
        Ok(object)
    }

    /// Homogeneous array: one shared type, no per-element type bytes.
    ///
    /// Two to four doubles become a fixed vector.
    fn read_typed_array(&mut self) -> Result<Value> {
        let count = self.main.read_u32()? as usize;
        let (element_type, element_flag) = self.read_type()?;
        self.claim_values(count)?;
        self.enter()?;

        let value = if element_type == KvType::Double && (2..=4).contains(&count) {
            let mut v = [0f64; 4];
            for slot in v.iter_mut().take(count) {
                *slot = LittleEndian::read_f64(&self.read_wide()?);
            }
            match count {
                2 => Value::Vector2([v[0], v[1]]),
                3 => Value::Vector3([v[0], v[1], v[2]]),
                _ => Value::Vector4(v),
            }
        } else {
            let mut items = Vec::with_capacity(count.min(MAX_PREALLOC));
            for _ in 0..count {
                items.push(self.read_value(element_type, element_flag)?);
            }
            Value::Array(items)
        };

        self.leave();
        Ok(value)
    }

    /// Fails if `count` more values would exceed the document's value limit.
    ///
    /// Null and the constant doubles take no input bytes, so a typed array
    /// count is the only thing bounding how many of them get built.
    fn claim_values(&self, count: usize) -> Result<()> {
        if count > self.max_values.saturating_sub(self.values) {
            return Err(Kv3Error::TooManyValues(self.max_values));
        }
        Ok(())
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(Kv3Error::NestingTooDeep(self.max_depth));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv3::types::models::DEFAULT_MAX_DEPTH;

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn decode(data: &[u8], table: &[String]) -> Result<Node> {
        DecodeContext::new(ByteCursor::new(data, "test"), table, DEFAULT_MAX_DEPTH).parse_root()
    }

    fn object_header(count: u32) -> Vec<u8> {
        let mut out = vec![KvType::Object as u8];
        out.extend_from_slice(&count.to_le_bytes());
        out
    }

    #[test]
    fn empty_region_is_empty_object() {
        let root = decode(&[], &[]).unwrap();
        assert_eq!(root.as_object().map(Object::len), Some(0));
    }

    #[test]
    fn scalars_inline() {
        let table = strings(&["b", "i", "s", "d"]);
        let mut data = object_header(4);
        data.extend_from_slice(&0i32.to_le_bytes());
        data.extend_from_slice(&[KvType::Boolean as u8, 1]);
        data.extend_from_slice(&1i32.to_le_bytes());
        data.push(KvType::Int32 as u8);
        data.extend_from_slice(&(-7i32).to_le_bytes());
        data.extend_from_slice(&2i32.to_le_bytes());
        data.push(KvType::String as u8);
        data.extend_from_slice(&(-1i32).to_le_bytes());
        data.extend_from_slice(&3i32.to_le_bytes());
        data.push(KvType::Double as u8);
        data.extend_from_slice(&2.5f64.to_le_bytes());

        let root = decode(&data, &table).unwrap();
        assert_eq!(root.get("b").map(|n| &n.value), Some(&Value::Bool(true)));
        assert_eq!(root.get("i").and_then(Node::as_i64), Some(-7));
        assert_eq!(root.get("s").map(|n| &n.value), Some(&Value::String(None)));
        assert_eq!(root.get("d").and_then(Node::as_f64), Some(2.5));
    }

    #[test]
    fn flag_byte_follows_high_bit() {
        let table = strings(&["model", "models/a.vmdl"]);
        let mut data = object_header(1);
        data.extend_from_slice(&0i32.to_le_bytes());
        data.extend_from_slice(&[KvType::String as u8 | FLAG_BIT, 1]);
        data.extend_from_slice(&1i32.to_le_bytes());

        let root = decode(&data, &table).unwrap();
        let model = root.get("model").unwrap();
        assert_eq!(model.flag, KvFlag::Resource);
        assert_eq!(model.as_str(), Some("models/a.vmdl"));
    }

    #[test]
    fn minus_one_name_is_error_key() {
        let mut data = object_header(1);
        data.extend_from_slice(&(-1i32).to_le_bytes());
        data.push(KvType::Null as u8);
        let root = decode(&data, &[]).unwrap();
        assert_eq!(root.get(UNNAMED_KEY).map(|n| &n.value), Some(&Value::Null));
    }

    #[test]
    fn out_of_range_indices_fail() {
        let table = strings(&["only"]);
        let mut data = object_header(1);
        data.extend_from_slice(&1i32.to_le_bytes());
        data.push(KvType::Null as u8);
        assert!(matches!(
            decode(&data, &table),
            Err(Kv3Error::StringIndexOutOfRange { index: 1, len: 1 })
        ));

        let mut data = vec![KvType::String as u8];
        data.extend_from_slice(&(-2i32).to_le_bytes());
        assert!(matches!(
            decode(&data, &table),
            Err(Kv3Error::StringIndexOutOfRange { index: -2, .. })
        ));
    }

    fn typed_doubles(values: &[f64]) -> Vec<u8> {
        let mut data = vec![KvType::ArrayTyped as u8];
        data.extend_from_slice(&(values.len() as u32).to_le_bytes());
        data.push(KvType::Double as u8);
        for d in values {
            data.extend_from_slice(&d.to_le_bytes());
        }
        data
    }

    #[test]
    fn typed_array_of_three_doubles_is_vector3() {
        let root = decode(&typed_doubles(&[1.5, -2.0, 3.25]), &[]).unwrap();
        assert_eq!(root.value, Value::Vector3([1.5, -2.0, 3.25]));
    }

    #[test]
    fn typed_array_of_two_or_four_doubles_is_a_vector() {
        let root = decode(&typed_doubles(&[0.5, 8.0]), &[]).unwrap();
        assert_eq!(root.value, Value::Vector2([0.5, 8.0]));

        let root = decode(&typed_doubles(&[1.0, 0.0, 0.0, -1.0]), &[]).unwrap();
        assert_eq!(root.value, Value::Vector4([1.0, 0.0, 0.0, -1.0]));
    }

    #[test]
    fn typed_array_of_one_double_stays_array() {
        let root = decode(&typed_doubles(&[6.0]), &[]).unwrap();
        let items = root.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_f64(), Some(6.0));
    }

    #[test]
    fn typed_array_of_five_doubles_stays_array() {
        let root = decode(&typed_doubles(&[0.0, 1.0, 2.0, 3.0, 4.0]), &[]).unwrap();
        let items = root.as_array().unwrap();
        assert_eq!(items.len(), 5);
        assert_eq!(items[4].as_f64(), Some(4.0));
    }

    #[test]
    fn typed_array_elements_share_flag() {
        let table = strings(&["a.vmat", "b.vmat"]);
        let mut data = vec![KvType::ArrayTyped as u8];
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&[KvType::String as u8 | FLAG_BIT, 2]);
        data.extend_from_slice(&0i32.to_le_bytes());
        data.extend_from_slice(&1i32.to_le_bytes());

        let root = decode(&data, &table).unwrap();
        let items = root.as_array().unwrap();
        assert_eq!(root.flag, KvFlag::Nothing);
        assert!(items.iter().all(|n| n.flag == KvFlag::DeferredResource));
        assert_eq!(items[1].as_str(), Some("b.vmat"));
    }

    #[test]
    fn wide_lane_leaves_main_cursor_alone() {
        let wide_bytes: Vec<u8> = [42i64.to_le_bytes(), 7u64.to_le_bytes()].concat();
        let table = strings(&["a", "b"]);
        let mut data = object_header(2);
        data.extend_from_slice(&0i32.to_le_bytes());
        data.push(KvType::Int64 as u8);
        data.extend_from_slice(&1i32.to_le_bytes());
        data.push(KvType::UInt64 as u8);

        let lane = ByteCursor::new(&wide_bytes, "wide lane");
        let root = DecodeContext::new(ByteCursor::new(&data, "test"), &table, DEFAULT_MAX_DEPTH)
            .with_wide_source(ScalarSource::Lane(lane))
            .parse_root()
            .unwrap();
        assert_eq!(root.get("a").and_then(Node::as_i64), Some(42));
        assert_eq!(root.get("b").map(|n| &n.value), Some(&Value::UInt64(7)));
    }

    #[test]
    fn type_lane_supplies_type_and_flag_bytes() {
        let types = [KvType::Array as u8, KvType::Int32 as u8 | FLAG_BIT, 1, KvType::Null as u8];
        let mut data = 2u32.to_le_bytes().to_vec();
        data.extend_from_slice(&9i32.to_le_bytes());

        let root = DecodeContext::new(ByteCursor::new(&data, "test"), &[], DEFAULT_MAX_DEPTH)
            .with_type_lane(ByteCursor::new(&types, "type lane"))
            .parse_root()
            .unwrap();
        let items = root.as_array().unwrap();
        assert_eq!(items[0].as_i64(), Some(9));
        assert_eq!(items[0].flag, KvFlag::Resource);
        assert_eq!(items[1].value, Value::Null);
    }

    #[test]
    fn blob_from_lane_or_inline() {
        let mut data = vec![KvType::BinaryBlob as u8];
        data.extend_from_slice(&3u32.to_le_bytes());
        data.extend_from_slice(&[9, 8, 7]);
        let root = decode(&data, &[]).unwrap();
        assert_eq!(root.value, Value::Blob(vec![9, 8, 7]));

        let lane_bytes = [1u8, 2, 3];
        let root = DecodeContext::new(ByteCursor::new(&data[..5], "test"), &[], DEFAULT_MAX_DEPTH)
            .with_blob_source(ScalarSource::Lane(ByteCursor::new(&lane_bytes, "blob lane")))
            .parse_root()
            .unwrap();
        assert_eq!(root.value, Value::Blob(vec![1, 2, 3]));
    }

    #[test]
    fn constant_doubles_consume_nothing() {
        let mut data = vec![KvType::Array as u8];
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&[KvType::DoubleZero as u8, KvType::DoubleOne as u8]);
        let root = decode(&data, &[]).unwrap();
        let items = root.as_array().unwrap();
        assert_eq!(items[0].as_f64(), Some(0.0));
        assert_eq!(items[1].as_f64(), Some(1.0));
    }

    #[test]
    fn compact_constants_without_rule_fail() {
        let unsupported = [
            KvType::BooleanTrue,
            KvType::Int64Zero,
            KvType::StringMulti,
            KvType::UInt32,
        ];
        for kv_type in unsupported {
            assert!(matches!(
                decode(&[kv_type as u8], &[]),
                Err(Kv3Error::UnsupportedType(t)) if t == kv_type as u8
            ));
        }
    }

    #[test]
    fn huge_typed_array_of_nulls_is_rejected() {
        let mut data = vec![KvType::ArrayTyped as u8];
        data.extend_from_slice(&u32::MAX.to_le_bytes());
        data.push(KvType::Null as u8);
        assert!(matches!(
            decode(&data, &[]),
            Err(Kv3Error::TooManyValues(DEFAULT_MAX_VALUES))
        ));
    }

    #[test]
    fn value_limit_counts_the_whole_document() {
        // [ [0.0 x3], [0.0 x3] ] holds 9 values
        let mut data = vec![KvType::Array as u8];
        data.extend_from_slice(&2u32.to_le_bytes());
        for _ in 0..2 {
            data.push(KvType::ArrayTyped as u8);
            data.extend_from_slice(&3u32.to_le_bytes());
            data.push(KvType::DoubleZero as u8);
        }

        let decode_limited = |limit| {
            DecodeContext::new(ByteCursor::new(&data, "test"), &[], DEFAULT_MAX_DEPTH)
                .with_max_values(limit)
                .parse_root()
        };
        assert_eq!(decode_limited(9).unwrap().as_array().map(<[Node]>::len), Some(2));
        assert!(matches!(decode_limited(8), Err(Kv3Error::TooManyValues(8))));
    }

    #[test]
    fn root_held_entirely_in_lanes_is_decoded() {
        let types = [KvType::Double as u8];
        let doubles = 7.5f64.to_le_bytes();
        let root = DecodeContext::new(ByteCursor::new(&[], "test"), &[], DEFAULT_MAX_DEPTH)
            .with_type_lane(ByteCursor::new(&types, "type lane"))
            .with_wide_source(ScalarSource::Lane(ByteCursor::new(&doubles, "double lane")))
            .parse_root()
            .unwrap();
        assert_eq!(root.value, Value::Double(7.5));
    }

    #[test]
    fn nesting_is_bounded() {
        let mut data = Vec::new();
        for _ in 0..10 {
            data.push(KvType::Array as u8);
            data.extend_from_slice(&1u32.to_le_bytes());
        }
        data.push(KvType::Null as u8);

        let ok = DecodeContext::new(ByteCursor::new(&data, "test"), &[], 10).parse_root();
        assert!(ok.is_ok());
        let deep = DecodeContext::new(ByteCursor::new(&data, "test"), &[], 9).parse_root();
        assert!(matches!(deep, Err(Kv3Error::NestingTooDeep(9))));
    }
}
