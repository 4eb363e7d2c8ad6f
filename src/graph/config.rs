use crate::placeholder::Placeholder;
use crate::value::CallArgs;
use serde::{Deserialize, Serialize};

/// One layer, stored once however many nodes apply it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerEntry {
    pub class_name: String,
    pub config: serde_json::Value,
}

/// One recorded call: which layer, on what, producing which placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub layer: String,
    pub inputs: CallArgs,
    pub output: Placeholder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    pub layers: Vec<LayerEntry>,
    pub nodes: Vec<NodeEntry>,
    pub inputs: Vec<Placeholder>,
    pub outputs: Vec<Placeholder>,
}

impl GraphConfig {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn layer(&self, name: &str) -> Option<&LayerEntry> {
        self.layers
            .iter()
            .find(|x| x.config.get("name").and_then(|n| n.as_str()) == Some(name))
    }
}
