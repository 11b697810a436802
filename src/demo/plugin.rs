use bytes::{Buf, BytesMut};
use pathscope_core::{Plugin, PluginError};
use pathscope_protocol::{WireRead, WireWrite};

/// Upper-cases a string sent by the client and reports how often it ran.
///
/// Request payload: one string. Response payload: the upper-cased string
/// followed by the invocation count as a u32.
#[derive(Debug, Default)]
pub struct EchoPlugin {
    input: String,
    output: String,
    invocations: u32,
}

impl EchoPlugin {
    pub const ID: u16 = 0x0100;

    pub fn new() -> Self {
        Self::default()
    }
}

impl Plugin for EchoPlugin {
    fn id(&self) -> u16 {
        Self::ID
    }

    fn name(&self) -> &str {
        "echo"
    }

    fn run(&mut self) -> Result<(), PluginError> {
        self.output = self.input.to_uppercase();
        self.invocations += 1;
        Ok(())
    }

    fn serialize(&self, buf: &mut BytesMut) -> Result<(), PluginError> {
        buf.put_string(&self.output);
        buf.put_wire(&self.invocations);
        Ok(())
    }

    fn deserialize(&mut self, buf: &mut dyn Buf) -> Result<(), PluginError> {
        self.input = buf.get_wire()?;
        Ok(())
    }
}
