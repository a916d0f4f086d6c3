#![deny(dead_code)]
#![deny(unused_imports)]

pub mod matrix;
pub mod model;
pub mod relation;
pub mod sampler;
pub mod types;
