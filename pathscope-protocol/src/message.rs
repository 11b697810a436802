//! Opcode table for the pathscope protocol.
//!
//! Every message starts with a 16-bit opcode. Plugin ids share the same
//! space, so a plugin may use any value that is not listed here.

use crate::error::CodecError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Builtin message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum Opcode {
    // Session management
    Hello = 0x0001,

    // Render control
    RenderInfoQuery = 0x000A,
    RenderInfoSet = 0x000B,
    RenderImage = 0x000D,
    RenderPixel = 0x000E,

    // Scene streaming
    SceneData = 0x000F,
    Camera = 0x0010,

    // Capabilities
    SupportedPlugins = 0x0011,

    // Teardown
    Disconnect = 0x1bcc,
    Quit = 0x1bcd,
}

impl Opcode {
    /// All builtin opcodes.
    pub const ALL: [Opcode; 10] = [
        Opcode::Hello,
        Opcode::RenderInfoQuery,
        Opcode::RenderInfoSet,
        Opcode::RenderImage,
        Opcode::RenderPixel,
        Opcode::SceneData,
        Opcode::Camera,
        Opcode::SupportedPlugins,
        Opcode::Disconnect,
        Opcode::Quit,
    ];

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.code() == code)
    }

    /// Returns true if `code` belongs to the builtin table and therefore
    /// cannot be used as a plugin id.
    pub fn is_reserved(code: u16) -> bool {
        Self::from_code(code).is_some()
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Hello => "HELLO",
            Opcode::RenderInfoQuery => "RENDER_INFO_QUERY",
            Opcode::RenderInfoSet => "RENDER_INFO_SET",
            Opcode::RenderImage => "RENDER_IMAGE",
            Opcode::RenderPixel => "RENDER_PIXEL",
            Opcode::SceneData => "SCENE_DATA",
            Opcode::Camera => "CAMERA",
            Opcode::SupportedPlugins => "SUPPORTED_PLUGINS",
            Opcode::Disconnect => "DISCONNECT",
            Opcode::Quit => "QUIT",
        }
    }
}

impl TryFrom<u16> for Opcode {
    type Error = CodecError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(CodecError::UnknownOpcode(code))
    }
}

impl From<Opcode> for u16 {
    fn from(op: Opcode) -> u16 {
        op.code()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Geometry kind carried after a SCENE_DATA opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u16)]
pub enum MeshType {
    TriangleMesh = 0,
    Sphere = 1,
}

impl TryFrom<u16> for MeshType {
    type Error = CodecError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(MeshType::TriangleMesh),
            1 => Ok(MeshType::Sphere),
            other => Err(CodecError::UnknownMeshType(other)),
        }
    }
}
