mod alias;
mod as_value;
mod backend;
mod condition;
mod connection;
mod document;
mod error;
mod executor;
mod marshal;
mod model;
mod orm;
mod params;
mod query;
mod query_set;
mod registry;
mod sql;
mod sql_backend;
mod transaction;
mod util;
mod value;

pub use ::anyhow::Context;
pub use alias::*;
pub use as_value::*;
pub use backend::*;
pub use condition::*;
pub use connection::*;
pub use document::*;
pub use error::*;
pub use executor::*;
pub use marshal::*;
pub use model::*;
pub use orm::*;
pub use params::*;
pub use query::*;
pub use query_set::*;
pub use registry::*;
pub use sql::*;
pub use sql_backend::*;
pub use transaction::*;
pub use util::*;
pub use value::*;
pub mod stream {
    pub use ::futures::stream::*;
}
pub use ::bson;
pub use ::futures::future;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
