pub mod datasets;
pub mod tree;
