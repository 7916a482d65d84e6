use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    graph::{Graph, GraphError},
    node::NodeId,
    tensor::Tensor,
};

/// Values to feed into input nodes, kept in insertion order. Sorting starts from the
/// roots in this order, which makes the resulting node order reproducible.
#[derive(Debug, Default, Clone)]
pub struct FeedDict(Vec<(NodeId, Tensor)>);

impl FeedDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing (in place) any value already fed to `id`.
    pub fn insert(&mut self, id: NodeId, value: Tensor) {
        match self.0.iter_mut().find(|(k, _)| *k == id) {
            Some((_, v)) => *v = value,
            None => self.0.push((id, value)),
        }
    }

    pub fn with(mut self, id: NodeId, value: Tensor) -> Self {
        self.insert(id, value);
        self
    }

    pub fn get(&self, id: NodeId) -> Option<&Tensor> {
        self.0.iter().find(|(k, _)| *k == id).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.0.iter().map(|(k, _)| *k)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(NodeId, Tensor)> for FeedDict {
    fn from_iter<I: IntoIterator<Item = (NodeId, Tensor)>>(iter: I) -> Self {
        let mut feed = FeedDict::new();
        for (id, value) in iter {
            feed.insert(id, value);
        }
        feed
    }
}

impl IntoIterator for FeedDict {
    type Item = (NodeId, Tensor);
    type IntoIter = std::vec::IntoIter<(NodeId, Tensor)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Graph {
    /// Orders every node reachable from the roots of `feed` so that each node comes after
    /// all of its inbound nodes (Kahn's algorithm), and assigns the fed values to the
    /// input nodes as they are emitted.
    pub fn topo_sort(&mut self, feed: FeedDict) -> Result<Vec<NodeId>, GraphError> {
        let roots = feed.keys().collect::<Vec<_>>();
        for &root in &roots {
            if !self.nodes[root].op.is_input() {
                return Err(GraphError::NotAnInput(self.label(root)));
            }
        }

        // Discover the forward-reachable set.
        let mut discovered = vec![];
        let mut num_node_inputs = FxHashMap::default();
        let mut que = roots.iter().copied().collect::<VecDeque<_>>();
        while let Some(id) = que.pop_front() {
            if num_node_inputs.contains_key(&id) {
                continue;
            }
            let node = &self.nodes[id];
            let distinct_inputs = node.inbound.iter().collect::<FxHashSet<_>>().len();
            log::trace!("discovered {} ({} inputs)", node.label(id), distinct_inputs);
            num_node_inputs.insert(id, distinct_inputs);
            discovered.push(id);
            que.extend(node.outbound.iter().copied());
        }

        let mut fed = feed.into_iter().collect::<FxHashMap<_, _>>();
        let mut nodes = Vec::with_capacity(discovered.len());
        let mut que = roots.into_iter().collect::<VecDeque<_>>();
        while let Some(id) = que.pop_front() {
            if let Some(value) = fed.remove(&id) {
                self.nodes[id].value = Some(value);
            }
            log::trace!("emit {}", self.label(id));
            nodes.push(id);
            for &consumer in &self.nodes[id].outbound {
                let remaining = num_node_inputs
                    .get_mut(&consumer)
                    .expect("consumers of discovered nodes are discovered");
                *remaining -= 1;
                if *remaining == 0 {
                    que.push_back(consumer);
                }
            }
        }

        if nodes.len() < discovered.len() {
            let unresolved = discovered
                .iter()
                .filter(|&id| num_node_inputs[id] > 0)
                .map(|&id| self.label(id))
                .collect();
            return Err(GraphError::Dependency {
                discovered: discovered.len(),
                emitted: nodes.len(),
                unresolved,
            });
        }

        log::debug!(
            "sorted: {:?}",
            nodes.iter().map(|&id| self.label(id)).collect::<Vec<_>>()
        );

        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{from_vec, scalar};

    fn position(order: &[NodeId], id: NodeId) -> usize {
        order.iter().position(|&n| n == id).unwrap()
    }

    fn assert_dependencies_first(g: &Graph, order: &[NodeId]) {
        for &id in order {
            for &input in &g.node(id).inbound {
                assert!(position(order, input) < position(order, id));
            }
        }
    }

    #[test]
    fn sigmoid_regression_order() {
        let mut g = Graph::new();
        let x = g.new_input("X");
        let y = g.new_input("y");
        let w1 = g.new_input("W1");
        let b = g.new_input("b");
        let f1 = g.new_linear(x, w1, b);
        let act = g.new_sigmoid(f1);
        let cost = g.new_mse(y, act);
        g.set_name(f1, "f1");
        g.set_name(act, "act");
        g.set_name(cost, "cost");

        let feed = FeedDict::new()
            .with(x, from_vec(&[2, 2], vec![-1., -2., -1., -2.]).unwrap())
            .with(y, from_vec(&[2], vec![1., 2.]).unwrap())
            .with(w1, from_vec(&[2, 1], vec![2., 3.]).unwrap())
            .with(b, from_vec(&[1], vec![-3.]).unwrap());
        let order = g.topo_sort(feed).unwrap();
        let names = order.iter().map(|&id| g.label(id)).collect::<Vec<_>>();

        insta::assert_snapshot!(names.join(" -> "), @"X -> y -> W1 -> b -> f1 -> act -> cost");
        assert_dependencies_first(&g, &order);
        assert_eq!(g.value(w1).unwrap().shape(), &[2, 1]);
    }

    #[test]
    fn diamond_dependencies_come_first() {
        let mut g = Graph::new();
        let a = g.new_input("a");
        let b = g.new_input("b");
        let s = g.new_sigmoid(a);
        let p = g.new_mul(vec![s, b]);
        let q = g.new_add(vec![a, s]);
        let top = g.new_add(vec![q, p, s]);
        let cost = g.new_mse(b, top);

        let order = g
            .topo_sort(FeedDict::new().with(a, scalar(1.)).with(b, scalar(2.)))
            .unwrap();

        assert_eq!(order.len(), 7);
        assert_eq!(*order.last().unwrap(), cost);
        assert_dependencies_first(&g, &order);
    }

    #[test]
    fn emits_every_discovered_node_once() {
        let mut g = Graph::new();
        let a = g.new_input("a");
        let b = g.new_input("b");
        let s = g.new_add(vec![a, b, a]);
        let m = g.new_mul(vec![s, s]);
        let _ = g.new_sigmoid(m);
        let _ = g.new_sigmoid(a);

        let order = g
            .topo_sort(FeedDict::new().with(a, scalar(1.)).with(b, scalar(2.)))
            .unwrap();

        let distinct = order.iter().collect::<FxHashSet<_>>();
        assert_eq!(order.len(), 6);
        assert_eq!(distinct.len(), 6);
        assert_dependencies_first(&g, &order);
    }

    #[test]
    fn sort_is_reproducible() {
        let mut g = Graph::new();
        let inputs = (0..4).map(|i| g.new_input(format!("x{i}"))).collect::<Vec<_>>();
        let sum = g.new_add(inputs.clone());
        let prod = g.new_mul(inputs.clone());
        let _ = g.new_add(vec![sum, prod]);
        let feed = inputs
            .iter()
            .map(|&id| (id, scalar(1.)))
            .collect::<FeedDict>();

        let first = g.topo_sort(feed.clone()).unwrap();
        let second = g.topo_sort(feed).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn cycle_is_a_dependency_error() {
        let mut g = Graph::new();
        let x = g.new_input("x");
        let a = g.new_sigmoid(x);
        let b = g.new_sigmoid(a);
        g.connect(b, a);

        let err = g.topo_sort(FeedDict::new().with(x, scalar(0.))).unwrap_err();
        match err {
            GraphError::Dependency {
                discovered,
                emitted,
                unresolved,
            } => {
                assert_eq!(discovered, 3);
                assert_eq!(emitted, 1);
                assert_eq!(unresolved.len(), 2);
            }
            e => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn unfed_input_is_a_dependency_error() {
        let mut g = Graph::new();
        let x = g.new_input("x");
        let w = g.new_input("w");
        let b = g.new_input("b");
        let _ = g.new_linear(x, w, b);

        let err = g
            .topo_sort(FeedDict::new().with(x, scalar(0.)).with(w, scalar(0.)))
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::Dependency {
                discovered: 3,
                emitted: 2,
                unresolved: vec!["Linear#3".to_string()],
            }
        );
    }

    #[test]
    fn feeding_an_operation_is_rejected() {
        let mut g = Graph::new();
        let x = g.new_input("x");
        let s = g.new_sigmoid(x);

        let err = g.topo_sort(FeedDict::new().with(s, scalar(0.))).unwrap_err();
        assert_eq!(err, GraphError::NotAnInput(format!("Sigmoid#{}", s.index())));
    }

    #[test]
    fn feed_insert_replaces_in_place() {
        let mut g = Graph::new();
        let x = g.new_input("x");
        let y = g.new_input("y");
        let mut feed = FeedDict::new().with(x, scalar(1.)).with(y, scalar(2.));
        feed.insert(x, scalar(3.));

        assert_eq!(feed.len(), 2);
        assert_eq!(feed.keys().collect::<Vec<_>>(), vec![x, y]);
        assert_eq!(feed.get(x), Some(&scalar(3.)));
    }
}
