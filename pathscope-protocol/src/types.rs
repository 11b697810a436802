//! Geometric value types carried on the wire.
//!
//! Each type is a raw run of its components with no header: points are
//! `x, y[, z]` and colours are `r, g, b, a`.

use crate::codec::WireValue;
use crate::error::CodecError;
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Neg, Sub};

macro_rules! wire_struct {
    ($name:ident { $($field:ident),+ }) => {
        impl WireValue for $name {
            fn encode<B: BufMut + ?Sized>(&self, buf: &mut B) {
                $( self.$field.encode(buf); )+
            }

            fn decode<B: Buf + ?Sized>(buf: &mut B) -> Result<Self, CodecError> {
                crate::codec::ensure(buf, std::mem::size_of::<$name>())?;
                Ok(Self {
                    $( $field: WireValue::decode(buf)?, )+
                })
            }
        }
    };
}

/// Integer 2D point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point2i {
    pub x: i32,
    pub y: i32,
}

/// Float 2D point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2f {
    pub x: f32,
    pub y: f32,
}

/// Integer 3D point. Also used for triangle vertex indices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point3i {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// Float 3D point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3f {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Directions share the point layout on the wire.
pub type Vec3f = Point3f;

/// RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color4f {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

wire_struct!(Point2i { x, y });
wire_struct!(Point2f { x, y });
wire_struct!(Point3i { x, y, z });
wire_struct!(Point3f { x, y, z });
wire_struct!(Color4f { r, g, b, a });

impl Point2i {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Point2f {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Point3i {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl Point3f {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Returns the unit vector, or zero for a zero-length input.
    pub fn normalized(self) -> Self {
        let len = self.length();
        if len > 0.0 {
            self * (1.0 / len)
        } else {
            self
        }
    }
}

impl Add for Point3f {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Point3f {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Point3f {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Point3f {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl Color4f {
    pub const BLACK: Color4f = Color4f::rgb(0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque colour.
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Component-wise product of the colour channels. Alpha is kept from `self`.
    pub fn modulate(self, other: Self) -> Self {
        Self::new(self.r * other.r, self.g * other.g, self.b * other.b, self.a)
    }

    pub fn scale(self, factor: f32) -> Self {
        Self::new(self.r * factor, self.g * factor, self.b * factor, self.a)
    }

    pub fn add_rgb(self, other: Self) -> Self {
        Self::new(self.r + other.r, self.g + other.g, self.b + other.b, self.a)
    }

    pub fn max_component(self) -> f32 {
        self.r.max(self.g).max(self.b)
    }
}

impl Default for Color4f {
    fn default() -> Self {
        Self::BLACK
    }
}
