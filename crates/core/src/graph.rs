use thiserror::Error;

use crate::{
    node::{Node, NodeArena, NodeId},
    op::{Mse, Op},
    tensor::Tensor,
};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GraphError {
    /// Sorting stopped before every reachable node was emitted: there is a cycle, or some
    /// node depends on a node that cannot be reached from the feed roots.
    #[error("Dependency: emitted {emitted} of {discovered} reachable nodes, unresolved: {unresolved:?}")]
    Dependency {
        discovered: usize,
        emitted: usize,
        unresolved: Vec<String>,
    },

    #[error("Not an input node: {0}")]
    NotAnInput(String),

    /// The node exists but was not reached by the sort, so it is never evaluated.
    #[error("Not in the evaluation order: {0}")]
    NotInOrder(String),
}

/// Owns every node. Nodes are only ever added, so a `NodeId` stays valid for the
/// lifetime of the graph.
#[derive(Debug, Default, Clone)]
pub struct Graph {
    pub(crate) nodes: NodeArena,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates `node` and registers it as a consumer of each of its inbound nodes.
    pub fn add_node(&mut self, mut node: Node) -> NodeId {
        node.outbound.clear();
        let inbound = node.inbound.clone();
        let id = self.nodes.alloc(node);
        for producer in inbound {
            self.register_consumer(producer, id);
        }
        id
    }

    fn register_consumer(&mut self, producer: NodeId, consumer: NodeId) {
        let outbound = &mut self.nodes[producer].outbound;
        if !outbound.contains(&consumer) {
            outbound.push(consumer);
        }
    }

    pub fn new_input(&mut self, name: impl Into<String>) -> NodeId {
        self.add_node(Node::new(Op::Input).with_name(name.into()))
    }

    pub fn new_add(&mut self, inputs: Vec<NodeId>) -> NodeId {
        self.add_node(Node::new(Op::Add).with_ins(inputs))
    }

    pub fn new_mul(&mut self, inputs: Vec<NodeId>) -> NodeId {
        self.add_node(Node::new(Op::Mul).with_ins(inputs))
    }

    pub fn new_linear(&mut self, x: NodeId, w: NodeId, b: NodeId) -> NodeId {
        self.add_node(Node::new(Op::Linear).with_ins(vec![x, w, b]))
    }

    pub fn new_sigmoid(&mut self, input: NodeId) -> NodeId {
        self.add_node(Node::new(Op::Sigmoid).with_in(input))
    }

    pub fn new_mse(&mut self, y: NodeId, a: NodeId) -> NodeId {
        self.add_node(Node::new(Op::Mse(Mse::default())).with_ins(vec![y, a]))
    }

    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) {
        self.nodes[id].name = Some(name.into());
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn nodes(&self) -> &NodeArena {
        &self.nodes
    }

    pub fn label(&self, id: NodeId) -> String {
        self.nodes[id].label(id)
    }

    pub fn value(&self, id: NodeId) -> Option<&Tensor> {
        self.nodes[id].value.as_ref()
    }

    /// Gradient that `id` recorded for `wrt` in the last backward pass.
    pub fn gradient(&self, id: NodeId, wrt: NodeId) -> Option<&Tensor> {
        self.nodes[id].gradients.get(&wrt)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn connect(&mut self, producer: NodeId, consumer: NodeId) {
        self.nodes[consumer].inbound.push(producer);
        self.register_consumer(producer, consumer);
    }
}

#[test]
fn construction_registers_consumers() {
    let mut g = Graph::new();
    let x = g.new_input("x");
    let w = g.new_input("w");
    let b = g.new_input("b");
    let l = g.new_linear(x, w, b);
    let s = g.new_sigmoid(l);

    assert_eq!(g.node(l).inbound(), vec![x, w, b]);
    assert_eq!(g.node(x).outbound(), vec![l]);
    assert_eq!(g.node(w).outbound(), vec![l]);
    assert_eq!(g.node(l).outbound(), vec![s]);
    assert!(g.node(s).outbound().is_empty());
    assert!(g.node(x).inbound().is_empty());
    assert_eq!(g.len(), 5);
}

#[test]
fn repeated_argument_registers_consumer_once() {
    let mut g = Graph::new();
    let x = g.new_input("x");
    let sum = g.new_add(vec![x, x]);

    assert_eq!(g.node(sum).inbound(), vec![x, x]);
    assert_eq!(g.node(x).outbound(), vec![sum]);
}

#[test]
fn added_copy_starts_without_consumers() {
    let mut g = Graph::new();
    let x = g.new_input("x");
    let _ = g.new_sigmoid(x);
    let node = g.node(x).clone();
    let copy = g.add_node(node);

    assert_eq!(g.node(x).outbound().len(), 1);
    assert!(g.node(copy).outbound().is_empty());
}

#[test]
fn unnamed_nodes_get_op_labels() {
    let mut g = Graph::new();
    let x = g.new_input("x");
    let s = g.new_sigmoid(x);

    assert_eq!(g.label(x), "x");
    assert_eq!(g.label(s), format!("Sigmoid#{}", s.index()));
}
