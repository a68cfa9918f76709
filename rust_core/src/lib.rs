pub mod distributions;
pub mod error;
pub mod gradient;
pub mod hessian;
pub mod hmc;
pub mod likelihood;
pub mod linalg;
pub mod parameter;
pub mod preconditioner;
pub mod transform;
pub mod tree;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
