use std::{
    collections::hash_map::Entry,
    time::{Duration, Instant},
};

use rustc_hash::FxHashMap;
use tinyflow_core::{
    graph::{Graph, GraphError},
    node::{Node, NodeId},
    op::Op,
    tensor::Tensor,
};

use super::{backward, forward};
use crate::{optim, SessionError};

/// Runs a sorted graph. The session owns the graph, so forward, backward and update for
/// a step can only happen one after another.
pub struct Session {
    pub(super) graph: Graph,
    pub(super) order: Vec<NodeId>,
    /// Node that `forward_pass` returns and `loss` reads.
    pub(super) output: NodeId,
    /// Input values to apply on the next forward pass.
    pub(super) staged: FxHashMap<NodeId, Tensor>,
    pub(super) enable_tracing: bool,
    pub(super) enable_profiling: bool,
}

impl Session {
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn into_graph(self) -> Graph {
        self.graph
    }

    /// Nodes in evaluation order.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn value(&self, id: NodeId) -> Option<&Tensor> {
        self.graph.value(id)
    }

    pub fn gradient(&self, id: NodeId, wrt: NodeId) -> Option<&Tensor> {
        self.graph.gradient(id, wrt)
    }

    pub fn output(&self) -> NodeId {
        self.output
    }

    /// Stages `value` for input `id`. It replaces the input's value when the next forward
    /// pass reaches it.
    pub fn feed(&mut self, id: NodeId, value: Tensor) -> Result<(), SessionError> {
        if !self.graph.node(id).op.is_input() {
            return Err(GraphError::NotAnInput(self.graph.label(id)).into());
        }
        if !self.order.contains(&id) {
            return Err(GraphError::NotInOrder(self.graph.label(id)).into());
        }
        self.staged.insert(id, value);
        Ok(())
    }

    /// Evaluates every node in order and returns the value of the output node.
    pub fn forward_pass(&mut self) -> Result<&Tensor, SessionError> {
        let mut profile = FxHashMap::default();
        let start = Instant::now();

        for i in 0..self.order.len() {
            self.run_forward(&mut profile, self.order[i])?;
        }

        if self.enable_profiling {
            log::info!("Forward: {:#?} total, {:#?}", start.elapsed(), profile);
        }

        self.output_value()
    }

    /// Computes every node's gradients, visiting nodes in reverse order so that each node
    /// runs after all of its consumers.
    pub fn backward_pass(&mut self) -> Result<(), SessionError> {
        let mut profile = FxHashMap::default();
        let start = Instant::now();

        for i in (0..self.order.len()).rev() {
            self.run_backward(&mut profile, self.order[i])?;
        }

        if self.enable_profiling {
            log::info!("Backward: {:#?} total, {:#?}", start.elapsed(), profile);
        }

        Ok(())
    }

    pub fn forward_and_backward(&mut self) -> Result<(), SessionError> {
        self.forward_pass()?;
        self.backward_pass()
    }

    pub fn sgd_update(
        &mut self,
        trainables: &[NodeId],
        learning_rate: f64,
    ) -> Result<(), SessionError> {
        optim::sgd_update(&mut self.graph, trainables, learning_rate)
    }

    /// Scalar value of the output node.
    pub fn loss(&self) -> Result<f64, SessionError> {
        let value = self.output_value()?;
        match value.iter().next() {
            Some(&loss) if value.len() == 1 => Ok(loss),
            _ => Err(SessionError::Message(
                format!("Output value is not a scalar: {:?}", value.shape()).into(),
            )),
        }
    }

    fn output_value(&self) -> Result<&Tensor, SessionError> {
        self.graph
            .value(self.output)
            .ok_or_else(|| SessionError::MissingValue(self.graph.label(self.output)))
    }

    fn run_forward(
        &mut self,
        profile: &mut FxHashMap<&'static str, Duration>,
        id: NodeId,
    ) -> Result<(), SessionError> {
        let start = Instant::now();
        let node = self.graph.node(id);

        let (value, mse) = match &node.op {
            Op::Input => {
                let staged = self.staged.remove(&id);
                if staged.is_none() && node.value.is_none() {
                    return Err(SessionError::MissingValue(node.label(id)));
                }
                (staged, None)
            }
            Op::Add => (
                Some(forward::compute_add(&inbound_values(&self.graph, node)?)?),
                None,
            ),
            Op::Mul => (
                Some(forward::compute_mul(&inbound_values(&self.graph, node)?)?),
                None,
            ),
            Op::Linear => (
                Some(forward::compute_linear(&inbound_values(
                    &self.graph,
                    node,
                )?)?),
                None,
            ),
            Op::Sigmoid => (
                Some(forward::compute_sigmoid(&inbound_values(
                    &self.graph,
                    node,
                )?)),
                None,
            ),
            Op::Mse(_) => {
                let (loss, state) = forward::compute_mse(&inbound_values(&self.graph, node)?)?;
                (Some(loss), Some(state))
            }
        };
        let op_name = node.op.name();

        let node = self.graph.node_mut(id);
        if let Some(value) = value {
            node.value = Some(value);
        }
        if let (Op::Mse(slot), Some(state)) = (&mut node.op, mse) {
            *slot = state;
        }

        if self.enable_profiling {
            *profile.entry(op_name).or_insert(Duration::ZERO) += start.elapsed();
        }
        if self.enable_tracing {
            log::debug!(
                "forward {}: {:?}",
                self.graph.label(id),
                self.graph.value(id)
            );
        }

        Ok(())
    }

    fn run_backward(
        &mut self,
        profile: &mut FxHashMap<&'static str, Duration>,
        id: NodeId,
    ) -> Result<(), SessionError> {
        let start = Instant::now();
        let graph = &self.graph;
        let node = graph.node(id);
        let value = node
            .value
            .as_ref()
            .ok_or_else(|| SessionError::MissingValue(node.label(id)))?;
        let upstream = node
            .outbound()
            .iter()
            .map(|&consumer| {
                graph
                    .gradient(consumer, id)
                    .ok_or_else(|| SessionError::MissingGradient {
                        node: graph.label(consumer),
                        wrt: node.label(id),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let grads = match &node.op {
            Op::Input => vec![(id, backward::compute_input_grad(value, &upstream)?)],
            Op::Add => keyed(
                node,
                backward::compute_add_grad(&upstream, &inbound_values(graph, node)?)?,
            ),
            Op::Mul => keyed(
                node,
                backward::compute_mul_grad(&upstream, &inbound_values(graph, node)?)?,
            ),
            Op::Linear => keyed(
                node,
                backward::compute_linear_grad(&upstream, &inbound_values(graph, node)?)?,
            ),
            Op::Sigmoid => keyed(node, backward::compute_sigmoid_grad(value, &upstream)?),
            Op::Mse(mse) => keyed(
                node,
                backward::compute_mse_grad(mse, &inbound_values(graph, node)?)?,
            ),
        };
        let op_name = node.op.name();

        // An inbound node used in several argument positions collects all of them.
        let mut gradients = FxHashMap::<NodeId, Tensor>::default();
        for (wrt, grad) in grads {
            match gradients.entry(wrt) {
                Entry::Occupied(mut e) => *e.get_mut() += &grad,
                Entry::Vacant(e) => {
                    e.insert(grad);
                }
            }
        }

        if self.enable_tracing {
            for (wrt, grad) in &gradients {
                log::debug!(
                    "backward {} w.r.t. {}: {:?}",
                    self.graph.label(id),
                    self.graph.label(*wrt),
                    grad
                );
            }
        }
        self.graph.node_mut(id).gradients = gradients;

        if self.enable_profiling {
            *profile.entry(op_name).or_insert(Duration::ZERO) += start.elapsed();
        }

        Ok(())
    }
}

/// Values of the inbound nodes of `node`, in argument order.
fn inbound_values<'a>(graph: &'a Graph, node: &Node) -> Result<Vec<&'a Tensor>, SessionError> {
    if let Some(expected) = node.op.arity() {
        if node.inbound().len() != expected {
            return Err(SessionError::Arity {
                op: node.op.name(),
                expected: expected.to_string(),
                actual: node.inbound().len(),
            });
        }
    }
    node.inbound()
        .iter()
        .map(|&input| {
            graph
                .value(input)
                .ok_or_else(|| SessionError::MissingValue(graph.label(input)))
        })
        .collect()
}

fn keyed(node: &Node, grads: Vec<Tensor>) -> Vec<(NodeId, Tensor)> {
    node.inbound().iter().copied().zip(grads).collect()
}
