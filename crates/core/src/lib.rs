pub mod graph;
pub mod node;
pub mod op;
pub mod sort;
pub mod tensor;
