//! Typed field bags.
//!
//! A field bag stores named value sequences in ten fixed buckets, one per
//! supported value type. The wire layout always carries all ten buckets in
//! this order: bool, f32, f64, i32, Point2i, Point2f, Point3i, Point3f,
//! Color4f, String. Each bucket is a `u32` key count followed by, per key,
//! the key string, a `u32` value count and the values.

use bytes::{Buf, BufMut};
use pathscope_protocol::{
    CodecError, Color4f, Point2f, Point2i, Point3f, Point3i, WireRead, WireValue, WireWrite,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Values of one bucket, keyed by field name.
pub type Bucket<T> = BTreeMap<String, Vec<T>>;

/// A single value of any supported field type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Bool(bool),
    Float(f32),
    Double(f64),
    Int(i32),
    Point2i(Point2i),
    Point2f(Point2f),
    Point3i(Point3i),
    Point3f(Point3f),
    Color(Color4f),
    String(String),
}

/// Named value sequences, one bucket per value type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldBag {
    pub bools: Bucket<bool>,
    pub floats: Bucket<f32>,
    pub doubles: Bucket<f64>,
    pub ints: Bucket<i32>,
    pub point2i: Bucket<Point2i>,
    pub point2f: Bucket<Point2f>,
    pub point3i: Bucket<Point3i>,
    pub point3f: Bucket<Point3f>,
    pub colors: Bucket<Color4f>,
    pub strings: Bucket<String>,
}

/// A value type with its own bucket in a [`FieldBag`].
pub trait FieldType: WireValue + Clone {
    fn bucket(bag: &FieldBag) -> &Bucket<Self>;
    fn bucket_mut(bag: &mut FieldBag) -> &mut Bucket<Self>;
}

macro_rules! field_types {
    ($($ty:ty => $bucket:ident, $variant:ident;)*) => {
        $(
            impl FieldType for $ty {
                fn bucket(bag: &FieldBag) -> &Bucket<Self> {
                    &bag.$bucket
                }

                fn bucket_mut(bag: &mut FieldBag) -> &mut Bucket<Self> {
                    &mut bag.$bucket
                }
            }

            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    FieldValue::$variant(value)
                }
            }
        )*
    };
}

field_types! {
    bool => bools, Bool;
    f32 => floats, Float;
    f64 => doubles, Double;
    i32 => ints, Int;
    Point2i => point2i, Point2i;
    Point2f => point2f, Point2f;
    Point3i => point3i, Point3i;
    Point3f => point3f, Point3f;
    Color4f => colors, Color;
    String => strings, String;
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl FieldBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value` to the sequence stored under `name` in the bucket
    /// matching its type. The first append creates the key.
    pub fn add(&mut self, name: &str, value: impl Into<FieldValue>) {
        match value.into() {
            FieldValue::Bool(v) => self.push(name, v),
            FieldValue::Float(v) => self.push(name, v),
            FieldValue::Double(v) => self.push(name, v),
            FieldValue::Int(v) => self.push(name, v),
            FieldValue::Point2i(v) => self.push(name, v),
            FieldValue::Point2f(v) => self.push(name, v),
            FieldValue::Point3i(v) => self.push(name, v),
            FieldValue::Point3f(v) => self.push(name, v),
            FieldValue::Color(v) => self.push(name, v),
            FieldValue::String(v) => self.push(name, v),
        }
    }

    /// Appends a value of a statically known type.
    pub fn push<T: FieldType>(&mut self, name: &str, value: T) {
        let bucket = T::bucket_mut(self);
        match bucket.get_mut(name) {
            Some(values) => values.push(value),
            None => {
                bucket.insert(name.to_string(), vec![value]);
            }
        }
    }

    /// Returns the values stored under `name` in the bucket for `T`.
    pub fn get<T: FieldType>(&self, name: &str) -> Option<&[T]> {
        T::bucket(self).get(name).map(Vec::as_slice)
    }

    /// Number of keys across all buckets.
    pub fn key_count(&self) -> usize {
        self.bools.len()
            + self.floats.len()
            + self.doubles.len()
            + self.ints.len()
            + self.point2i.len()
            + self.point2f.len()
            + self.point3i.len()
            + self.point3f.len()
            + self.colors.len()
            + self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key_count() == 0
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn encode<B: BufMut + ?Sized>(&self, buf: &mut B) {
        encode_bucket(&self.bools, buf);
        encode_bucket(&self.floats, buf);
        encode_bucket(&self.doubles, buf);
        encode_bucket(&self.ints, buf);
        encode_bucket(&self.point2i, buf);
        encode_bucket(&self.point2f, buf);
        encode_bucket(&self.point3i, buf);
        encode_bucket(&self.point3f, buf);
        encode_bucket(&self.colors, buf);
        encode_bucket(&self.strings, buf);
    }

    pub fn decode<B: Buf + ?Sized>(buf: &mut B) -> Result<Self, CodecError> {
        Ok(Self {
            bools: decode_bucket(buf)?,
            floats: decode_bucket(buf)?,
            doubles: decode_bucket(buf)?,
            ints: decode_bucket(buf)?,
            point2i: decode_bucket(buf)?,
            point2f: decode_bucket(buf)?,
            point3i: decode_bucket(buf)?,
            point3f: decode_bucket(buf)?,
            colors: decode_bucket(buf)?,
            strings: decode_bucket(buf)?,
        })
    }
}

fn encode_bucket<T: WireValue, B: BufMut + ?Sized>(bucket: &Bucket<T>, buf: &mut B) {
    buf.put_u32_le(bucket.len() as u32);
    for (name, values) in bucket {
        buf.put_string(name);
        buf.put_u32_le(values.len() as u32);
        buf.put_array(values);
    }
}

fn decode_bucket<T: WireValue, B: Buf + ?Sized>(buf: &mut B) -> Result<Bucket<T>, CodecError> {
    let keys: u32 = buf.get_wire()?;
    let mut bucket = Bucket::new();
    for _ in 0..keys {
        let name: String = buf.get_wire()?;
        let count: u32 = buf.get_wire()?;
        let values = buf.get_array(count as usize)?;
        bucket.insert(name, values);
    }
    Ok(bucket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use proptest::prelude::*;

    /// Byte size of a bag with no keys: ten zero counts.
    const EMPTY_BAG_SIZE: usize = 10 * 4;

    #[test]
    fn test_empty_bag_writes_all_buckets() {
        let mut buf = BytesMut::new();
        FieldBag::new().encode(&mut buf);
        assert_eq!(buf.len(), EMPTY_BAG_SIZE);
        assert!(buf.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_add_appends_to_existing_key() {
        let mut bag = FieldBag::new();
        bag.add("bounce", 1i32);
        bag.add("bounce", 2i32);
        bag.add("bounce", 0.5f32);
        assert_eq!(bag.get::<i32>("bounce"), Some(&[1, 2][..]));
        assert_eq!(bag.get::<f32>("bounce"), Some(&[0.5][..]));
        assert_eq!(bag.get::<f64>("bounce"), None);
        assert_eq!(bag.key_count(), 2);
    }

    #[test]
    fn test_bucket_order_on_wire() {
        let mut bag = FieldBag::new();
        bag.add("s", "text");
        bag.add("b", true);

        let mut buf = BytesMut::new();
        bag.encode(&mut buf);

        let mut rd = &buf[..];
        // bool bucket first
        assert_eq!(rd.get_wire::<u32>().unwrap(), 1);
        assert_eq!(rd.get_wire::<String>().unwrap(), "b");
        assert_eq!(rd.get_wire::<u32>().unwrap(), 1);
        assert!(rd.get_wire::<bool>().unwrap());
        // eight empty buckets
        for _ in 0..8 {
            assert_eq!(rd.get_wire::<u32>().unwrap(), 0);
        }
        // string bucket last
        assert_eq!(rd.get_wire::<u32>().unwrap(), 1);
        assert_eq!(rd.get_wire::<String>().unwrap(), "s");
        assert_eq!(rd.get_wire::<u32>().unwrap(), 1);
        assert_eq!(rd.get_wire::<String>().unwrap(), "text");
        assert!(rd.is_empty());
    }

    #[test]
    fn test_keys_sorted() {
        let mut bag = FieldBag::new();
        bag.add("zeta", 1i32);
        bag.add("alpha", 2i32);
        let keys: Vec<_> = bag.ints.keys().cloned().collect();
        assert_eq!(keys, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_clear() {
        let mut bag = FieldBag::new();
        bag.add("c", Color4f::rgb(1.0, 0.0, 0.0));
        assert!(!bag.is_empty());
        bag.clear();
        assert!(bag.is_empty());
    }

    #[test]
    fn test_json_export() {
        let value = FieldValue::from(Point2i::new(3, 4));
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["type"], "point2i");
        assert_eq!(json["value"]["x"], 3);
    }

    fn finite_f32() -> impl Strategy<Value = f32> {
        -1.0e6f32..1.0e6f32
    }

    fn field_value() -> impl Strategy<Value = FieldValue> {
        prop_oneof![
            any::<bool>().prop_map(FieldValue::Bool),
            finite_f32().prop_map(FieldValue::Float),
            (-1.0e12f64..1.0e12f64).prop_map(FieldValue::Double),
            any::<i32>().prop_map(FieldValue::Int),
            (any::<i32>(), any::<i32>()).prop_map(|(x, y)| FieldValue::Point2i(Point2i::new(x, y))),
            (finite_f32(), finite_f32())
                .prop_map(|(x, y)| FieldValue::Point2f(Point2f::new(x, y))),
            (any::<i32>(), any::<i32>(), any::<i32>())
                .prop_map(|(x, y, z)| FieldValue::Point3i(Point3i::new(x, y, z))),
            (finite_f32(), finite_f32(), finite_f32())
                .prop_map(|(x, y, z)| FieldValue::Point3f(Point3f::new(x, y, z))),
            (finite_f32(), finite_f32(), finite_f32(), finite_f32())
                .prop_map(|(r, g, b, a)| FieldValue::Color(Color4f::new(r, g, b, a))),
            "[a-zA-Z0-9 _]{0,24}".prop_map(FieldValue::String),
        ]
    }

    proptest! {
        #[test]
        fn test_field_bag_roundtrip(
            entries in prop::collection::vec(("[a-z]{1,8}", field_value()), 0..32)
        ) {
            let mut bag = FieldBag::new();
            for (name, value) in entries {
                bag.add(&name, value);
            }

            let mut buf = BytesMut::new();
            bag.encode(&mut buf);
            let mut rd = &buf[..];
            let decoded = FieldBag::decode(&mut rd).unwrap();

            prop_assert_eq!(decoded, bag);
            prop_assert!(rd.is_empty());
        }

        #[test]
        fn test_truncated_bag_is_incomplete(
            entries in prop::collection::vec(("[a-z]{1,8}", field_value()), 1..8),
            cut in 1usize..64
        ) {
            let mut bag = FieldBag::new();
            for (name, value) in entries {
                bag.add(&name, value);
            }
            let mut buf = BytesMut::new();
            bag.encode(&mut buf);
            let keep = buf.len().saturating_sub(cut);

            let mut rd = &buf[..keep];
            let err = FieldBag::decode(&mut rd).unwrap_err();
            let is_incomplete = matches!(err, CodecError::Incomplete { .. });
            prop_assert!(is_incomplete, "expected Incomplete, got {:?}", err);
        }
    }
}
