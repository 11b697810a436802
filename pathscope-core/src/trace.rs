//! Trace session recorded during one render-pixel request.
//!
//! A renderer drives the session through two cursors: the sample cursor
//! selects the active [`PathRecord`] and the depth cursor selects the active
//! [`IntersectionRecord`] within it. Both start unset.
//!
//! Every mutator is a no-op while capture is disabled. Path-scoped writers
//! also need the sample cursor, and intersection-scoped writers additionally
//! need the depth cursor; without them the call is dropped silently.
//!
//! [`IntersectionRecord`]: crate::intersection::IntersectionRecord

use crate::fields::FieldValue;
use crate::path::PathRecord;
use bytes::{Buf, BufMut};
use pathscope_protocol::{CodecError, Color4f, Opcode, Point3f, WireRead, WireWrite};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct TraceSession {
    paths: BTreeMap<i32, PathRecord>,
    capturing: bool,
    sample_idx: Option<i32>,
    depth_idx: Option<i32>,
}

impl TraceSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&mut self) {
        self.capturing = true;
    }

    pub fn disable(&mut self) {
        self.capturing = false;
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    /// Drops all recorded paths and unsets both cursors.
    pub fn clear(&mut self) {
        self.paths.clear();
        self.sample_idx = None;
        self.depth_idx = None;
    }

    pub fn sample_idx(&self) -> Option<i32> {
        self.sample_idx
    }

    pub fn depth_idx(&self) -> Option<i32> {
        self.depth_idx
    }

    /// Starts a fresh path at `sample_idx`, replacing any earlier record
    /// there. The depth cursor is unset until the next `set_depth_idx`.
    pub fn set_sample_idx(&mut self, sample_idx: i32) {
        if !self.capturing {
            return;
        }
        self.paths.insert(sample_idx, PathRecord::new(sample_idx));
        self.sample_idx = Some(sample_idx);
        self.depth_idx = None;
    }

    /// Starts a fresh intersection record at `depth_idx` on the current path.
    pub fn set_depth_idx(&mut self, depth_idx: i32) {
        if let Some(path) = self.current_path() {
            path.set_depth_idx(depth_idx);
            self.depth_idx = Some(depth_idx);
        }
    }

    pub fn set_path_origin(&mut self, origin: Point3f) {
        if let Some(path) = self.current_path() {
            path.set_origin(origin);
        }
    }

    pub fn set_final_estimate(&mut self, estimate: Color4f) {
        if let Some(path) = self.current_path() {
            path.set_final_estimate(estimate);
        }
    }

    pub fn add_path_data(&mut self, name: &str, value: impl Into<FieldValue>) {
        if let Some(path) = self.current_path() {
            path.add_field(name, value);
        }
    }

    pub fn set_intersection_pos(&mut self, position: Point3f) {
        if let Some((path, depth)) = self.current_depth() {
            path.set_intersection_pos(depth, position);
        }
    }

    pub fn set_next_event_estimation_pos(&mut self, position: Point3f, occluded: bool) {
        if let Some((path, depth)) = self.current_depth() {
            path.set_next_event_pos(depth, position, occluded);
        }
    }

    pub fn set_intersection_pos_envmap(&mut self, position: Point3f) {
        if let Some((path, depth)) = self.current_depth() {
            path.set_envmap_pos(depth, position);
        }
    }

    pub fn set_intersection_estimate(&mut self, estimate: Color4f) {
        if let Some((path, depth)) = self.current_depth() {
            path.set_intersection_estimate(depth, estimate);
        }
    }

    pub fn add_intersection_data(&mut self, name: &str, value: impl Into<FieldValue>) {
        if let Some((path, depth)) = self.current_depth() {
            path.add_intersection_field(depth, name, value);
        }
    }

    fn current_path(&mut self) -> Option<&mut PathRecord> {
        if !self.capturing {
            return None;
        }
        let sample_idx = self.sample_idx?;
        self.paths.get_mut(&sample_idx)
    }

    fn current_depth(&mut self) -> Option<(&mut PathRecord, i32)> {
        let depth_idx = self.depth_idx?;
        self.current_path().map(|path| (path, depth_idx))
    }

    pub fn path(&self, sample_idx: i32) -> Option<&PathRecord> {
        self.paths.get(&sample_idx)
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathRecord> {
        self.paths.values()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Writes the render-pixel response: opcode, path count, then every path
    /// in ascending sample order.
    pub fn serialize<B: BufMut + ?Sized>(&self, buf: &mut B) {
        buf.put_opcode(Opcode::RenderPixel);
        buf.put_u32_le(self.paths.len() as u32);
        for path in self.paths.values() {
            path.encode(buf);
        }
    }

    /// Reads the body of a render-pixel response, after its opcode.
    pub fn decode_paths<B: Buf + ?Sized>(buf: &mut B) -> Result<BTreeMap<i32, PathRecord>, CodecError> {
        let count: u32 = buf.get_wire()?;
        let mut paths = BTreeMap::new();
        for _ in 0..count {
            let path = PathRecord::decode(buf)?;
            paths.insert(path.sample_idx, path);
        }
        Ok(paths)
    }
}
