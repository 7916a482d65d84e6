use tinyflow_core::{
    graph::{Graph, GraphError},
    node::NodeId,
};

use crate::SessionError;

/// Applies one step of gradient descent to each trainable input:
/// `value = value - learning_rate * gradient`. The gradient is consumed.
///
/// Must run after the backward pass of a step and before the next forward pass.
pub fn sgd_update(
    graph: &mut Graph,
    trainables: &[NodeId],
    learning_rate: f64,
) -> Result<(), SessionError> {
    for &t in trainables {
        let label = graph.label(t);
        let node = graph.node_mut(t);
        if !node.op.is_input() {
            return Err(GraphError::NotAnInput(label).into());
        }

        let partial = node
            .gradients
            .get(&t)
            .ok_or_else(|| SessionError::MissingGradient {
                node: label.clone(),
                wrt: label.clone(),
            })?;
        let value = node
            .value
            .as_mut()
            .ok_or_else(|| SessionError::MissingValue(label.clone()))?;
        if value.shape() != partial.shape() {
            return Err(SessionError::ShapeMismatch {
                op: "Sgd",
                expected: value.shape().to_vec(),
                actual: partial.shape().to_vec(),
            });
        }

        value.zip_mut_with(partial, |v, &g| *v -= learning_rate * g);
        node.gradients.remove(&t);
    }

    Ok(())
}
