mod backend;
mod bridge;
mod compiler;
mod executor;

pub use backend::*;
pub use bridge::*;
pub use compiler::*;
pub use executor::*;
