mod compiler;
mod sql_writer;
mod tables;

pub use compiler::*;
pub use sql_writer::*;
pub use tables::*;
