pub use orca_core::*;
pub use orca_macros::Model;
