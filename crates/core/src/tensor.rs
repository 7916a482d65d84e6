use ndarray::{ArrayD, IxDyn, ShapeError};
use rand::Rng;
use rand_distr::StandardNormal;

/// Dense `f64` tensor of dynamic rank. Scalars are rank-0 arrays.
pub type Tensor = ArrayD<f64>;

pub fn scalar(value: f64) -> Tensor {
    ArrayD::from_elem(IxDyn(&[]), value)
}

pub fn from_vec(dims: &[usize], data: Vec<f64>) -> Result<Tensor, ShapeError> {
    ArrayD::from_shape_vec(IxDyn(dims), data)
}

/// Reshapes `tensor` to `dims`, reading elements in logical (row-major) order
/// regardless of the memory layout of `tensor`.
pub fn reshape(tensor: &Tensor, dims: &[usize]) -> Result<Tensor, ShapeError> {
    from_vec(dims, tensor.iter().copied().collect())
}

/// Samples every element from the standard normal distribution.
pub fn randn<R: Rng>(dims: &[usize], rng: &mut R) -> Tensor {
    ArrayD::from_shape_simple_fn(IxDyn(dims), || rng.sample(StandardNormal))
}

#[test]
fn reshape_reads_logical_order() {
    let t = from_vec(&[2, 2], vec![1., 2., 3., 4.]).unwrap();
    let transposed = t.t().to_owned();
    let col = reshape(&transposed, &[4, 1]).unwrap();
    assert_eq!(col.iter().copied().collect::<Vec<_>>(), vec![1., 3., 2., 4.]);
    assert_eq!(col.shape(), &[4, 1]);
}

#[test]
fn reshape_rejects_wrong_count() {
    let t = from_vec(&[3], vec![1., 2., 3.]).unwrap();
    assert!(reshape(&t, &[2, 2]).is_err());
}

#[test]
fn randn_is_seedable() {
    use rand::{rngs::StdRng, SeedableRng};

    let a = randn(&[3, 2], &mut StdRng::seed_from_u64(7));
    let b = randn(&[3, 2], &mut StdRng::seed_from_u64(7));
    assert_eq!(a.shape(), &[3, 2]);
    assert_eq!(a, b);
}
