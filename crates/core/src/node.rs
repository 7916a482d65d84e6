use crate::{op::Op, tensor::Tensor};
use id_arena::{Arena, Id};
use rustc_hash::FxHashMap;

pub type NodeId = Id<Node>;
pub type NodeArena = Arena<Node>;

#[derive(Debug, Clone)]
pub struct Node {
    pub op: Op,
    pub name: Option<String>,
    /// Argument nodes, in argument order. Fixed once the node is added to a graph.
    pub(crate) inbound: Vec<NodeId>,
    /// Consumers of this node. Each consumer appears once.
    pub(crate) outbound: Vec<NodeId>,
    pub value: Option<Tensor>,
    /// Partial derivatives of the loss, valid after a backward pass. Keyed by the node
    /// itself for inputs and by each inbound node for operations.
    pub gradients: FxHashMap<NodeId, Tensor>,
}

impl Node {
    pub fn new(op: Op) -> Self {
        Self {
            op,
            name: None,
            inbound: Vec::new(),
            outbound: Vec::new(),
            value: None,
            gradients: FxHashMap::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<Option<String>>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_in(mut self, id: NodeId) -> Self {
        self.inbound.push(id);
        self
    }

    pub fn with_ins(mut self, mut ids: Vec<NodeId>) -> Self {
        self.inbound.append(&mut ids);
        self
    }

    pub fn inbound(&self) -> &[NodeId] {
        &self.inbound
    }

    pub fn outbound(&self) -> &[NodeId] {
        &self.outbound
    }

    /// Name used in logs and error messages.
    pub fn label(&self, id: NodeId) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}#{}", self.op.name(), id.index()),
        }
    }
}
