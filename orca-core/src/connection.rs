use crate::{Executor, Result, Transaction};
use std::future::Future;

pub trait Connection: Executor + Sized {
    /// Open a connection to the given URL.
    fn connect(url: &str) -> impl Future<Output = Result<Self>> + Send;

    /// Start a transaction borrowing this connection until it is committed or rolled back.
    fn begin(&mut self) -> impl Future<Output = Result<impl Transaction<'_>>> + Send;
}
