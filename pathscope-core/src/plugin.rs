//! Plugin extension point and registry.
//!
//! A plugin claims one 16-bit id from the opcode space. When a client sends
//! that id as an opcode, the plugin reads its own request payload, runs, and
//! writes its own response payload.

use crate::error::{CoreError, PluginError};
use bytes::{Buf, BytesMut};
use pathscope_protocol::Opcode;
use std::collections::HashMap;

/// A server-side request handler addressed by id.
pub trait Plugin: Send {
    fn id(&self) -> u16;

    fn name(&self) -> &str;

    /// Executes the request decoded by the last `deserialize`.
    fn run(&mut self) -> Result<(), PluginError>;

    /// Writes the response payload. The caller has already written the
    /// plugin id as the response opcode.
    fn serialize(&self, buf: &mut BytesMut) -> Result<(), PluginError>;

    /// Reads the request payload.
    ///
    /// May be called again on the same request with more bytes available if
    /// an earlier attempt returned an incomplete codec error, so it must not
    /// rely on state left by a failed attempt.
    fn deserialize(&mut self, buf: &mut dyn Buf) -> Result<(), PluginError>;
}

/// Owns all registered plugins, keyed by id.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<u16, Box<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plugin. Ids must be unique and must not shadow a builtin opcode.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) -> Result<(), CoreError> {
        let id = plugin.id();
        if Opcode::is_reserved(id) {
            return Err(CoreError::ReservedPluginId {
                id,
                name: plugin.name().to_string(),
            });
        }
        if let Some(existing) = self.plugins.get(&id) {
            return Err(CoreError::DuplicatePluginId {
                id,
                name: plugin.name().to_string(),
                existing: existing.name().to_string(),
            });
        }
        tracing::debug!("registered plugin '{}' as {:#06x}", plugin.name(), id);
        self.plugins.insert(id, plugin);
        Ok(())
    }

    pub fn get(&self, id: u16) -> Option<&dyn Plugin> {
        self.plugins.get(&id).map(|p| p.as_ref())
    }

    pub fn get_mut(&mut self, id: u16) -> Option<&mut dyn Plugin> {
        match self.plugins.get_mut(&id) {
            Some(plugin) => Some(plugin.as_mut()),
            None => None,
        }
    }

    pub fn get_by_name(&self, name: &str) -> Option<&dyn Plugin> {
        self.plugins
            .values()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }

    pub fn contains(&self, id: u16) -> bool {
        self.plugins.contains_key(&id)
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.plugins.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<(u16, &str)> = self
            .plugins
            .iter()
            .map(|(id, p)| (*id, p.name()))
            .collect();
        names.sort_unstable();
        f.debug_struct("PluginRegistry")
            .field("plugins", &names)
            .finish()
    }
}
