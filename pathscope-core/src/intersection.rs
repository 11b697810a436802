//! Per-bounce trace record.

use crate::fields::{FieldBag, FieldValue};
use bytes::{Buf, BufMut};
use pathscope_protocol::{CodecError, Color4f, Point3f, WireRead, WireWrite};
use serde::{Deserialize, Serialize};

/// Data recorded for one depth along a sample path.
///
/// The four optional fields are written as a presence flag followed by the
/// value when present, in this order: intersection position, next-event
/// position (with its occlusion flag), environment-map hit, radiance estimate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntersectionRecord {
    pub fields: FieldBag,
    pub depth_idx: i32,
    pub position: Option<Point3f>,
    pub next_event: Option<NextEventSample>,
    pub envmap_position: Option<Point3f>,
    pub estimate: Option<Color4f>,
}

/// A next-event-estimation (shadow ray) endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NextEventSample {
    pub position: Point3f,
    pub occluded: bool,
}

impl IntersectionRecord {
    pub fn new(depth_idx: i32) -> Self {
        Self {
            depth_idx,
            ..Default::default()
        }
    }

    pub fn set_position(&mut self, position: Point3f) {
        self.position = Some(position);
    }

    pub fn set_next_event(&mut self, position: Point3f, occluded: bool) {
        self.next_event = Some(NextEventSample { position, occluded });
    }

    pub fn set_envmap_position(&mut self, position: Point3f) {
        self.envmap_position = Some(position);
    }

    pub fn set_estimate(&mut self, estimate: Color4f) {
        self.estimate = Some(estimate);
    }

    pub fn add_field(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.fields.add(name, value);
    }

    pub fn encode<B: BufMut + ?Sized>(&self, buf: &mut B) {
        self.fields.encode(buf);
        buf.put_wire(&self.depth_idx);

        buf.put_wire(&self.position.is_some());
        if let Some(pos) = &self.position {
            buf.put_wire(pos);
        }

        buf.put_wire(&self.next_event.is_some());
        if let Some(ne) = &self.next_event {
            buf.put_wire(&ne.position);
            buf.put_wire(&ne.occluded);
        }

        buf.put_wire(&self.envmap_position.is_some());
        if let Some(pos) = &self.envmap_position {
            buf.put_wire(pos);
        }

        buf.put_wire(&self.estimate.is_some());
        if let Some(estimate) = &self.estimate {
            buf.put_wire(estimate);
        }
    }

    pub fn decode<B: Buf + ?Sized>(buf: &mut B) -> Result<Self, CodecError> {
        let fields = FieldBag::decode(buf)?;
        let depth_idx = buf.get_wire()?;

        let position = if buf.get_wire::<bool>()? {
            Some(buf.get_wire()?)
        } else {
            None
        };

        let next_event = if buf.get_wire::<bool>()? {
            Some(NextEventSample {
                position: buf.get_wire()?,
                occluded: buf.get_wire()?,
            })
        } else {
            None
        };

        let envmap_position = if buf.get_wire::<bool>()? {
            Some(buf.get_wire()?)
        } else {
            None
        };

        let estimate = if buf.get_wire::<bool>()? {
            Some(buf.get_wire()?)
        } else {
            None
        };

        Ok(Self {
            fields,
            depth_idx,
            position,
            next_event,
            envmap_position,
            estimate,
        })
    }
}
