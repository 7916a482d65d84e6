#![allow(dead_code)]

use tinyflow_core::tensor::Tensor;

pub const TOLERANCE: f64 = 1e-6;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Compares element by element in logical order. Shapes may differ as long as the element
/// counts agree.
pub fn assert_close(actual: &Tensor, expected: &[f64]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "element count of {:?} differs from {:?}",
        actual,
        expected
    );
    actual
        .iter()
        .zip(expected)
        .for_each(|(actual, expected)| {
            assert!(
                (actual - expected).abs() < TOLERANCE,
                "{} is not close to {}",
                actual,
                expected
            );
        });
}
