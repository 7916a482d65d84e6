//! Local gradient rules. Each function receives the gradients the consumers of a node
//! attribute to it (`upstream`) and returns one gradient per inbound position, in
//! inbound order.

use ndarray::{Array1, Array2, Axis};
use tinyflow_core::{
    op::{Mse, Op},
    tensor::{self, Tensor},
};

use super::forward::{as_matrix, check_same_shape, linear_operands};
use crate::SessionError;

/// Gradient of an input w.r.t. itself: the sum of what every consumer attributes to it.
pub(super) fn compute_input_grad(
    value: &Tensor,
    upstream: &[&Tensor],
) -> Result<Tensor, SessionError> {
    let mut grad = Tensor::zeros(value.raw_dim());
    for g in upstream {
        check_same_shape("Input", value, g)?;
        grad += *g;
    }
    Ok(grad)
}

pub(super) fn compute_add_grad(
    upstream: &[&Tensor],
    inputs: &[&Tensor],
) -> Result<Vec<Tensor>, SessionError> {
    let mut grads = zeros_like_all(inputs);
    for g in upstream {
        for (grad, input) in grads.iter_mut().zip(inputs) {
            check_same_shape("Add", input, g)?;
            *grad += *g;
        }
    }
    Ok(grads)
}

pub(super) fn compute_mul_grad(
    upstream: &[&Tensor],
    inputs: &[&Tensor],
) -> Result<Vec<Tensor>, SessionError> {
    let mut grads = zeros_like_all(inputs);
    for g in upstream {
        for (k, grad) in grads.iter_mut().enumerate() {
            check_same_shape("Mul", inputs[k], g)?;
            let mut partial = (*g).clone();
            for (l, other) in inputs.iter().enumerate() {
                if l != k {
                    partial *= *other;
                }
            }
            *grad += &partial;
        }
    }
    Ok(grads)
}

pub(super) fn compute_linear_grad(
    upstream: &[&Tensor],
    inputs: &[&Tensor],
) -> Result<Vec<Tensor>, SessionError> {
    let (x, w, b) = linear_operands(inputs)?;
    let mut grad_x = Array2::<f64>::zeros(x.raw_dim());
    let mut grad_w = Array2::<f64>::zeros(w.raw_dim());
    let mut grad_b = Array1::<f64>::zeros(b.raw_dim());

    for g in upstream {
        let g = as_matrix("Linear", g)?;
        if g.dim() != (x.nrows(), w.ncols()) {
            return Err(SessionError::ShapeMismatch {
                op: "Linear",
                expected: vec![x.nrows(), w.ncols()],
                actual: g.shape().to_vec(),
            });
        }
        grad_x += &g.dot(&w.t());
        grad_w += &x.t().dot(&g);
        grad_b += &g.sum_axis(Axis(0));
    }

    Ok(vec![grad_x.into_dyn(), grad_w.into_dyn(), grad_b.into_dyn()])
}

pub(super) fn compute_sigmoid_grad(
    value: &Tensor,
    upstream: &[&Tensor],
) -> Result<Vec<Tensor>, SessionError> {
    let local = value.mapv(|s| s * (1. - s));
    let mut grad = Tensor::zeros(value.raw_dim());
    for g in upstream {
        check_same_shape("Sigmoid", value, g)?;
        grad += &(&local * *g);
    }
    Ok(vec![grad])
}

/// The loss is the terminal node, so its gradients do not depend on any consumer. Each
/// gradient takes the shape of the value it differentiates.
pub(super) fn compute_mse_grad(mse: &Mse, inputs: &[&Tensor]) -> Result<Vec<Tensor>, SessionError> {
    let diff = mse
        .diff
        .as_ref()
        .ok_or_else(|| SessionError::MissingValue("Mse (forward has not run)".into()))?;
    let batch = mse.batch as f64;

    let grad_y = diff.mapv(|d| (2. / batch) * d);
    let grad_a = diff.mapv(|d| (-2. / batch) * d);

    Ok(vec![
        tensor::reshape(&grad_y, inputs[Op::MSE_Y].shape())?,
        tensor::reshape(&grad_a, inputs[Op::MSE_A].shape())?,
    ])
}

fn zeros_like_all(inputs: &[&Tensor]) -> Vec<Tensor> {
    inputs
        .iter()
        .map(|input| Tensor::zeros(input.raw_dim()))
        .collect()
}
