mod connection;
mod executor;

pub use connection::*;
