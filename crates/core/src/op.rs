use crate::tensor::Tensor;

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Graph entry point: fixed data or a trainable parameter.
    Input,
    Add,
    Mul,
    Linear,
    Sigmoid,
    Mse(Mse),
}

/// State captured by the forward pass of the mean squared error, read back by the
/// backward pass of the same step.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mse {
    /// Row count of the target fed in the last forward pass.
    pub batch: usize,
    /// `y - a`, as a column vector.
    pub diff: Option<Tensor>,
}

impl Op {
    pub const LINEAR_X: usize = 0;
    pub const LINEAR_W: usize = 1;
    pub const LINEAR_B: usize = 2;
    pub const SIGMOID_IN: usize = 0;
    pub const MSE_Y: usize = 0;
    pub const MSE_A: usize = 1;

    pub fn name(&self) -> &'static str {
        match self {
            Op::Input => "Input",
            Op::Add => "Add",
            Op::Mul => "Mul",
            Op::Linear => "Linear",
            Op::Sigmoid => "Sigmoid",
            Op::Mse(_) => "Mse",
        }
    }

    /// Number of inbound nodes the op takes. `None` for variadic ops, which take at
    /// least one.
    pub fn arity(&self) -> Option<usize> {
        match self {
            Op::Input => Some(0),
            Op::Add | Op::Mul => None,
            Op::Linear => Some(3),
            Op::Sigmoid => Some(1),
            Op::Mse(_) => Some(2),
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self, Op::Input)
    }
}
