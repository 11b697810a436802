//! Decoded render-pixel responses.

use crate::error::ClientError;
use bytes::Buf;
use pathscope_core::{PathRecord, TraceSession};
use pathscope_protocol::{CodecError, Point3f};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// All paths recorded for one render-pixel request, keyed by sample index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PixelTrace {
    pub paths: BTreeMap<i32, PathRecord>,
}

impl PixelTrace {
    /// Decodes the body of a render-pixel response (after its opcode).
    pub fn decode<B: Buf + ?Sized>(buf: &mut B) -> Result<Self, CodecError> {
        Ok(Self {
            paths: TraceSession::decode_paths(buf)?,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn path(&self, sample_idx: i32) -> Option<&PathRecord> {
        self.paths.get(&sample_idx)
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathRecord> {
        self.paths.values()
    }

    /// Total number of intersection records across all paths.
    pub fn segment_count(&self) -> usize {
        self.paths.values().map(|p| p.segments.len()).sum()
    }

    /// Intersection positions of one path, in depth order.
    pub fn vertices(&self, sample_idx: i32) -> Vec<Point3f> {
        self.path(sample_idx)
            .map(|path| {
                std::iter::once(path.origin)
                    .chain(path.segments.values().filter_map(|s| s.position))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn to_json(&self) -> Result<String, ClientError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
