use crate::graph::NodeId;
use crate::placeholder::PlaceholderId;
use crate::value::Value;
use std::time::Instant;

pub trait GraphObserver {
    fn on_value_assigned(&mut self, placeholder: PlaceholderId, value: &Value);
    fn on_node_executed(&mut self, node: NodeId, layer_name: &str, start: Instant, end: Instant);
}

impl GraphObserver for () {
    fn on_value_assigned(&mut self, _placeholder: PlaceholderId, _value: &Value) {}
    fn on_node_executed(&mut self, _node: NodeId, _layer_name: &str, _start: Instant, _end: Instant) {
    }
}
