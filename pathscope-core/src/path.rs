//! Per-sample trace record.

use crate::fields::{FieldBag, FieldValue};
use crate::intersection::IntersectionRecord;
use bytes::{Buf, BufMut};
use pathscope_protocol::{CodecError, Color4f, Point3f, WireRead, WireWrite};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything recorded for one Monte Carlo sample path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathRecord {
    pub fields: FieldBag,
    pub sample_idx: i32,
    /// Number of intersection records.
    pub path_length: i32,
    pub origin: Point3f,
    pub final_estimate: Option<Color4f>,
    /// Set once any intersection position has been recorded.
    pub visualize_path: bool,
    /// Set once any next-event position has been recorded.
    pub visualize_next_event: bool,
    pub segments: BTreeMap<i32, IntersectionRecord>,
}

impl PathRecord {
    pub fn new(sample_idx: i32) -> Self {
        Self {
            sample_idx,
            ..Default::default()
        }
    }

    /// Starts a fresh intersection record at `depth_idx`, replacing any
    /// existing one, and updates the path length.
    pub fn set_depth_idx(&mut self, depth_idx: i32) {
        self.segments
            .insert(depth_idx, IntersectionRecord::new(depth_idx));
        self.path_length = self.segments.len() as i32;
    }

    pub fn set_origin(&mut self, origin: Point3f) {
        self.origin = origin;
    }

    pub fn set_final_estimate(&mut self, estimate: Color4f) {
        self.final_estimate = Some(estimate);
    }

    pub fn set_intersection_pos(&mut self, depth_idx: i32, position: Point3f) {
        if let Some(segment) = self.segments.get_mut(&depth_idx) {
            segment.set_position(position);
            self.visualize_path = true;
        }
    }

    pub fn set_next_event_pos(&mut self, depth_idx: i32, position: Point3f, occluded: bool) {
        if let Some(segment) = self.segments.get_mut(&depth_idx) {
            segment.set_next_event(position, occluded);
            self.visualize_next_event = true;
        }
    }

    pub fn set_envmap_pos(&mut self, depth_idx: i32, position: Point3f) {
        if let Some(segment) = self.segments.get_mut(&depth_idx) {
            segment.set_envmap_position(position);
        }
    }

    pub fn set_intersection_estimate(&mut self, depth_idx: i32, estimate: Color4f) {
        if let Some(segment) = self.segments.get_mut(&depth_idx) {
            segment.set_estimate(estimate);
        }
    }

    pub fn add_field(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.fields.add(name, value);
    }

    pub fn add_intersection_field(
        &mut self,
        depth_idx: i32,
        name: &str,
        value: impl Into<FieldValue>,
    ) {
        if let Some(segment) = self.segments.get_mut(&depth_idx) {
            segment.add_field(name, value);
        }
    }

    pub fn segment(&self, depth_idx: i32) -> Option<&IntersectionRecord> {
        self.segments.get(&depth_idx)
    }

    pub fn encode<B: BufMut + ?Sized>(&self, buf: &mut B) {
        self.fields.encode(buf);
        buf.put_wire(&self.sample_idx);
        buf.put_wire(&self.path_length);
        buf.put_wire(&self.origin);

        buf.put_wire(&self.final_estimate.is_some());
        if let Some(estimate) = &self.final_estimate {
            buf.put_wire(estimate);
        }

        buf.put_wire(&self.visualize_path);
        buf.put_wire(&self.visualize_next_event);

        buf.put_u32_le(self.segments.len() as u32);
        for (depth_idx, segment) in &self.segments {
            buf.put_wire(depth_idx);
            segment.encode(buf);
        }
    }

    pub fn decode<B: Buf + ?Sized>(buf: &mut B) -> Result<Self, CodecError> {
        let fields = FieldBag::decode(buf)?;
        let sample_idx = buf.get_wire()?;
        let path_length = buf.get_wire()?;
        let origin = buf.get_wire()?;
        let final_estimate = if buf.get_wire::<bool>()? {
            Some(buf.get_wire()?)
        } else {
            None
        };
        let visualize_path = buf.get_wire()?;
        let visualize_next_event = buf.get_wire()?;

        let count: u32 = buf.get_wire()?;
        let mut segments = BTreeMap::new();
        for _ in 0..count {
            let depth_idx: i32 = buf.get_wire()?;
            segments.insert(depth_idx, IntersectionRecord::decode(buf)?);
        }

        Ok(Self {
            fields,
            sample_idx,
            path_length,
            origin,
            final_estimate,
            visualize_path,
            visualize_next_event,
            segments,
        })
    }
}
