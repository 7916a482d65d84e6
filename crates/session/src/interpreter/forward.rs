use ndarray::{ArrayView1, ArrayView2, Ix1, Ix2};
use tinyflow_core::{
    op::{Mse, Op},
    tensor::{self, Tensor},
};

use crate::SessionError;

pub(super) fn sigmoid(x: f64) -> f64 {
    1. / (1. + (-x).exp())
}

pub(super) fn check_same_shape(
    op: &'static str,
    expected: &Tensor,
    actual: &Tensor,
) -> Result<(), SessionError> {
    if expected.shape() != actual.shape() {
        return Err(SessionError::ShapeMismatch {
            op,
            expected: expected.shape().to_vec(),
            actual: actual.shape().to_vec(),
        });
    }
    Ok(())
}

pub(super) fn as_matrix<'a>(
    op: &'static str,
    t: &'a Tensor,
) -> Result<ArrayView2<'a, f64>, SessionError> {
    t.view()
        .into_dimensionality::<Ix2>()
        .map_err(|_| SessionError::Rank {
            op,
            expected: 2,
            actual: t.shape().to_vec(),
        })
}

fn as_vector<'a>(op: &'static str, t: &'a Tensor) -> Result<ArrayView1<'a, f64>, SessionError> {
    t.view()
        .into_dimensionality::<Ix1>()
        .map_err(|_| SessionError::Rank {
            op,
            expected: 1,
            actual: t.shape().to_vec(),
        })
}

pub(super) fn compute_add(inputs: &[&Tensor]) -> Result<Tensor, SessionError> {
    let (first, rest) = split_first(&Op::Add, inputs)?;
    let mut output = first.clone();
    for input in rest {
        check_same_shape("Add", first, input)?;
        output += *input;
    }
    Ok(output)
}

pub(super) fn compute_mul(inputs: &[&Tensor]) -> Result<Tensor, SessionError> {
    let (first, rest) = split_first(&Op::Mul, inputs)?;
    let mut output = first.clone();
    for input in rest {
        check_same_shape("Mul", first, input)?;
        output *= *input;
    }
    Ok(output)
}

fn split_first<'a>(
    op: &Op,
    inputs: &'a [&'a Tensor],
) -> Result<(&'a Tensor, &'a [&'a Tensor]), SessionError> {
    match inputs.split_first() {
        Some((&first, rest)) => Ok((first, rest)),
        None => Err(SessionError::Arity {
            op: op.name(),
            expected: "at least 1".into(),
            actual: 0,
        }),
    }
}

/// Checks `X (batch, in)`, `W (in, out)` and `b (out,)` against each other.
pub(super) fn linear_operands<'a>(
    inputs: &[&'a Tensor],
) -> Result<
    (
        ArrayView2<'a, f64>,
        ArrayView2<'a, f64>,
        ArrayView1<'a, f64>,
    ),
    SessionError,
> {
    let x = as_matrix("Linear", inputs[Op::LINEAR_X])?;
    let w = as_matrix("Linear", inputs[Op::LINEAR_W])?;
    let b = as_vector("Linear", inputs[Op::LINEAR_B])?;

    if x.ncols() != w.nrows() {
        return Err(SessionError::ShapeMismatch {
            op: "Linear",
            expected: vec![x.ncols(), w.ncols()],
            actual: w.shape().to_vec(),
        });
    }
    if b.len() != w.ncols() {
        return Err(SessionError::ShapeMismatch {
            op: "Linear",
            expected: vec![w.ncols()],
            actual: b.shape().to_vec(),
        });
    }

    Ok((x, w, b))
}

pub(super) fn compute_linear(inputs: &[&Tensor]) -> Result<Tensor, SessionError> {
    let (x, w, b) = linear_operands(inputs)?;
    Ok((x.dot(&w) + &b).into_dyn())
}

pub(super) fn compute_sigmoid(inputs: &[&Tensor]) -> Tensor {
    inputs[Op::SIGMOID_IN].mapv(sigmoid)
}

/// Returns the loss and the state its backward pass needs.
pub(super) fn compute_mse(inputs: &[&Tensor]) -> Result<(Tensor, Mse), SessionError> {
    let y = inputs[Op::MSE_Y];
    let a = inputs[Op::MSE_A];

    let batch = y.shape().first().copied().unwrap_or(0);
    if batch == 0 || y.is_empty() {
        return Err(SessionError::EmptyBatch("Mse".into()));
    }
    if y.len() != a.len() {
        return Err(SessionError::ShapeMismatch {
            op: "Mse",
            expected: vec![y.len(), 1],
            actual: vec![a.len(), 1],
        });
    }

    let y = tensor::reshape(y, &[y.len(), 1])?;
    let a = tensor::reshape(a, &[a.len(), 1])?;
    let diff = &y - &a;
    let loss = diff.mapv(|d| d * d).mean().unwrap_or_default();

    Ok((
        tensor::scalar(loss),
        Mse {
            batch,
            diff: Some(diff),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinyflow_core::tensor::{from_vec, scalar};

    #[test]
    fn add_requires_equal_shapes() {
        let a = from_vec(&[2], vec![1., 2.]).unwrap();
        let b = from_vec(&[3], vec![1., 2., 3.]).unwrap();
        assert!(matches!(
            compute_add(&[&a, &b]),
            Err(SessionError::ShapeMismatch { op: "Add", .. })
        ));
    }

    #[test]
    fn empty_add_is_an_arity_error() {
        assert!(matches!(
            compute_add(&[]),
            Err(SessionError::Arity { op: "Add", actual: 0, .. })
        ));
        assert!(matches!(
            compute_mul(&[]),
            Err(SessionError::Arity { op: "Mul", actual: 0, .. })
        ));
    }

    #[test]
    fn linear_rejects_inner_dimension_mismatch() {
        let x = from_vec(&[2, 3], vec![0.; 6]).unwrap();
        let w = from_vec(&[2, 2], vec![0.; 4]).unwrap();
        let b = from_vec(&[2], vec![0.; 2]).unwrap();
        assert!(matches!(
            compute_linear(&[&x, &w, &b]),
            Err(SessionError::ShapeMismatch { op: "Linear", .. })
        ));
    }

    #[test]
    fn linear_rejects_bias_mismatch_and_bad_rank() {
        let x = from_vec(&[2, 2], vec![0.; 4]).unwrap();
        let w = from_vec(&[2, 2], vec![0.; 4]).unwrap();
        let b = from_vec(&[3], vec![0.; 3]).unwrap();
        assert!(matches!(
            compute_linear(&[&x, &w, &b]),
            Err(SessionError::ShapeMismatch { op: "Linear", .. })
        ));

        let v = from_vec(&[4], vec![0.; 4]).unwrap();
        let b = from_vec(&[2], vec![0.; 2]).unwrap();
        assert!(matches!(
            compute_linear(&[&v, &w, &b]),
            Err(SessionError::Rank { op: "Linear", expected: 2, .. })
        ));
    }

    #[test]
    fn mse_rejects_empty_and_mismatched_batches() {
        let empty = from_vec(&[0], vec![]).unwrap();
        assert!(matches!(
            compute_mse(&[&empty, &empty]),
            Err(SessionError::EmptyBatch(_))
        ));
        assert!(matches!(
            compute_mse(&[&scalar(1.), &scalar(1.)]),
            Err(SessionError::EmptyBatch(_))
        ));

        let y = from_vec(&[3], vec![1., 2., 3.]).unwrap();
        let a = from_vec(&[2], vec![1., 2.]).unwrap();
        assert!(matches!(
            compute_mse(&[&y, &a]),
            Err(SessionError::ShapeMismatch { op: "Mse", .. })
        ));
    }

    #[test]
    fn mse_caches_batch_and_column_diff() {
        let y = from_vec(&[2], vec![1., 2.]).unwrap();
        let a = from_vec(&[2, 1], vec![0.5, 2.5]).unwrap();
        let (loss, state) = compute_mse(&[&y, &a]).unwrap();

        assert_eq!(loss.ndim(), 0);
        assert!((loss.sum() - 0.25).abs() < 1e-12);
        assert_eq!(state.batch, 2);
        let diff = state.diff.unwrap();
        assert_eq!(diff.shape(), &[2, 1]);
        assert_eq!(diff.iter().copied().collect::<Vec<_>>(), vec![0.5, -0.5]);
    }
}
