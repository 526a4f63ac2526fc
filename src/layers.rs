use heapless::Vec;
use log::warn;

use crate::MAX_ACTIVE_LAYERS;

/// Stack of active layers over a default layer. The last entry wins
/// lookups; the default layer can never be deactivated.
#[derive(Clone, Debug)]
pub struct LayerManager {
    default_layer: u8,
    active: Vec<u8, MAX_ACTIVE_LAYERS>,
}

impl LayerManager {
    pub fn new(default_layer: u8) -> Self {
        let mut active = Vec::new();
        // MAX_ACTIVE_LAYERS is at least 1
        active.push(default_layer).unwrap();
        Self {
            default_layer,
            active,
        }
    }

    pub fn default_layer(&self) -> u8 {
        self.default_layer
    }

    pub fn active_layers(&self) -> &[u8] {
        &self.active
    }

    pub fn top_layer(&self) -> u8 {
        self.active.last().copied().unwrap_or(self.default_layer)
    }

    /// Pushes the layer onto the stack. An already-active layer is left
    /// in place unless `prioritize` moves it to the top.
    pub fn activate_layer(&mut self, layer: u8, prioritize: bool) {
        if let Some(pos) = self.active.iter().position(|&l| l == layer) {
            if prioritize {
                self.active.remove(pos);
                // removal just freed a slot
                self.active.push(layer).unwrap();
            }
        } else if self.active.push(layer).is_err() {
            warn!("layer stack full, dropping activation of layer {layer}");
        }
    }

    pub fn deactivate_layer(&mut self, layer: u8) {
        if layer == self.default_layer {
            return;
        }
        if let Some(pos) = self.active.iter().position(|&l| l == layer) {
            self.active.remove(pos);
        }
    }

    /// Makes `layer` the sole active layer.
    pub fn set_active_layer(&mut self, layer: u8) {
        self.active.clear();
        self.active.push(layer).unwrap();
    }

    /// Changes the default layer, inserting it at the bottom of the
    /// stack if it is not active yet.
    pub fn set_default_layer(&mut self, layer: u8) {
        self.default_layer = layer;
        if !self.active.contains(&layer) {
            if self.active.is_full() {
                self.active.pop();
            }
            self.active.insert(0, layer).unwrap();
        }
    }

    pub fn toggle_layer(&mut self, layer: u8, prioritize: bool) {
        if self.active.contains(&layer) {
            self.deactivate_layer(layer);
        } else {
            self.activate_layer(layer, prioritize);
        }
    }

    /// Replaces the top of the stack, or pushes when only the default
    /// layer is active.
    pub fn replace_top_layer(&mut self, layer: u8) {
        if self.active.len() > 1 {
            let top = self.active.len() - 1;
            self.active[top] = layer;
        } else {
            self.activate_layer(layer, false);
        }
    }
}

impl Default for LayerManager {
    fn default() -> Self {
        Self::new(0)
    }
}
