//! Renderer contract consumed by the session controller.

use crate::error::RenderError;
use crate::trace::TraceSession;
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A renderer driven over the protocol.
///
/// The `send_*` methods append complete records, opcode headers included,
/// to `buf`; the controller flushes them to the client afterwards.
pub trait Renderer: Send {
    /// Renders the full image to the renderer's configured output.
    fn render_image(&mut self) -> Result<(), RenderError>;

    /// Renders `sample_count` samples for one pixel, recording into `trace`.
    ///
    /// Capture is already enabled when this is called. Worker threads that
    /// share `trace` must serialise their writes.
    fn render_pixel(
        &mut self,
        x: i32,
        y: i32,
        sample_count: i32,
        trace: &mut TraceSession,
    ) -> Result<(), RenderError>;

    fn send_render_information(&self, buf: &mut BytesMut) -> Result<(), RenderError>;

    fn send_camera_data(&self, buf: &mut BytesMut) -> Result<(), RenderError>;

    fn send_mesh_data(&self, buf: &mut BytesMut) -> Result<(), RenderError>;

    fn update_sample_count(&mut self, sample_count: i32);
}

/// Identifies the renderer backend bound to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RenderSystem {
    Mitsuba,
    #[default]
    Custom,
    Other(u16),
}

impl RenderSystem {
    pub fn id(self) -> u16 {
        match self {
            RenderSystem::Mitsuba => 0x0000,
            RenderSystem::Custom => 0x0001,
            RenderSystem::Other(id) => id,
        }
    }

    pub fn from_id(id: u16) -> Self {
        match id {
            0x0000 => RenderSystem::Mitsuba,
            0x0001 => RenderSystem::Custom,
            other => RenderSystem::Other(other),
        }
    }
}

impl fmt::Display for RenderSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderSystem::Mitsuba => write!(f, "mitsuba"),
            RenderSystem::Custom => write!(f, "custom"),
            RenderSystem::Other(id) => write!(f, "{:#06x}", id),
        }
    }
}

impl FromStr for RenderSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "mitsuba" => return Ok(RenderSystem::Mitsuba),
            "custom" => return Ok(RenderSystem::Custom),
            _ => {}
        }
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u16::from_str_radix(hex, 16),
            None => s.parse::<u16>(),
        };
        parsed
            .map(RenderSystem::from_id)
            .map_err(|_| format!("unknown render system '{}'", s))
    }
}

impl TryFrom<String> for RenderSystem {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RenderSystem> for String {
    fn from(system: RenderSystem) -> String {
        system.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_system_ids() {
        assert_eq!(RenderSystem::Mitsuba.id(), 0);
        assert_eq!(RenderSystem::Custom.id(), 1);
        assert_eq!(RenderSystem::from_id(1), RenderSystem::Custom);
        assert_eq!(RenderSystem::from_id(9), RenderSystem::Other(9));
        assert_eq!(RenderSystem::default(), RenderSystem::Custom);
    }

    #[test]
    fn test_render_system_parse() {
        assert_eq!("Custom".parse::<RenderSystem>().unwrap(), RenderSystem::Custom);
        assert_eq!("mitsuba".parse::<RenderSystem>().unwrap(), RenderSystem::Mitsuba);
        assert_eq!("0x0001".parse::<RenderSystem>().unwrap(), RenderSystem::Custom);
        assert_eq!("7".parse::<RenderSystem>().unwrap(), RenderSystem::Other(7));
        assert!("pbrt".parse::<RenderSystem>().is_err());
    }

    #[test]
    fn test_render_system_serde() {
        let json = serde_json::to_string(&RenderSystem::Custom).unwrap();
        assert_eq!(json, "\"custom\"");
        let parsed: RenderSystem = serde_json::from_str("\"0x0042\"").unwrap();
        assert_eq!(parsed, RenderSystem::Other(0x42));
        assert_eq!(parsed.to_string(), "0x0042");
    }
}
