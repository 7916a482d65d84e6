use rustc_hash::FxHashMap;
use tinyflow_core::{
    graph::{Graph, GraphError},
    node::NodeId,
    op::Op,
    sort::FeedDict,
};

use super::session::Session;
use crate::SessionError;

pub struct SessionBuilder {
    graph: Graph,
    feed: FeedDict,
    output: Option<NodeId>,
    enable_tracing: bool,
    enable_profiling: bool,
}

impl SessionBuilder {
    /// `feed` names the roots to sort from, and the values they start with.
    pub fn new(graph: Graph, feed: FeedDict) -> Self {
        Self {
            graph,
            feed,
            output: None,
            enable_tracing: false,
            enable_profiling: false,
        }
    }

    /// Node whose value `forward_pass` returns and `loss` reads. Defaults to the last
    /// `Mse` node in evaluation order, or the last node if there is none.
    pub fn with_output(mut self, output: NodeId) -> Self {
        self.output = Some(output);
        self
    }

    /// Logs every node's value and gradients at debug level.
    pub fn with_tracing_enabled(mut self, enable_tracing: bool) -> Self {
        self.enable_tracing = enable_tracing;
        self
    }

    pub fn with_profiling_enabled(mut self, enable_profiling: bool) -> Self {
        self.enable_profiling = enable_profiling;
        self
    }

    pub fn build(self) -> Result<Session, SessionError> {
        let mut graph = self.graph;
        let order = graph.topo_sort(self.feed)?;

        let output = match self.output {
            Some(id) if order.contains(&id) => id,
            Some(id) => return Err(GraphError::NotInOrder(graph.label(id)).into()),
            None => order
                .iter()
                .rev()
                .copied()
                .find(|&id| matches!(graph.node(id).op, Op::Mse(_)))
                .or_else(|| order.last().copied())
                .ok_or_else(|| SessionError::Message("Empty evaluation order".into()))?,
        };
        log::debug!("output: {}", graph.label(output));

        Ok(Session {
            graph,
            order,
            output,
            staged: FxHashMap::default(),
            enable_tracing: self.enable_tracing,
            enable_profiling: self.enable_profiling,
        })
    }
}
