use bson::{Document, doc};
use mongodb::{
    Client, Collection, Database,
    options::{ClientOptions, ServerApi, ServerApiVersion},
};
use orca_core::{Context, OrmError, Result};
use std::time::Duration;

/// Client pool settings applied over the ones parsed from the connection url.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_pool_size: Option<u32>,
    pub max_pool_size: Option<u32>,
    /// Idle connections older than this are closed.
    pub max_idle_time: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub server_selection_timeout: Option<Duration>,
    /// Reported in the server logs.
    pub app_name: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_pool_size: None,
            max_pool_size: Some(10),
            max_idle_time: None,
            connect_timeout: Some(Duration::from_secs(10)),
            server_selection_timeout: Some(Duration::from_secs(30)),
            app_name: Some("orca".into()),
        }
    }
}

impl PoolConfig {
    fn apply(self, options: &mut ClientOptions) {
        if let Some(v) = self.min_pool_size {
            options.min_pool_size = Some(v);
        }
        if let Some(v) = self.max_pool_size {
            options.max_pool_size = Some(v);
        }
        if let Some(v) = self.max_idle_time {
            options.max_idle_time = Some(v);
        }
        if let Some(v) = self.connect_timeout {
            options.connect_timeout = Some(v);
        }
        if let Some(v) = self.server_selection_timeout {
            options.server_selection_timeout = Some(v);
        }
        if let Some(v) = self.app_name {
            options.app_name = Some(v);
        }
    }
}

/// A pooled client bound to the database named in the connection url. It is the
/// [`DocumentExecutor`](orca_core::DocumentExecutor) of the document backend.
#[derive(Debug, Clone)]
pub struct MongoConnection {
    client: Client,
    database: Database,
}

impl MongoConnection {
    /// Connect to `mongodb://host/database` with the default pool settings. No round trip
    /// is made until the first operation.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::with_config(url, PoolConfig::default()).await
    }

    pub async fn with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let context = || format!("Error while decoding connection URL: `{}`", url);
        let mut options = ClientOptions::parse(url).await.with_context(context)?;
        config.apply(&mut options);
        options.server_api = Some(ServerApi::builder().version(ServerApiVersion::V1).build());
        let client = Client::with_options(options).with_context(context)?;
        let Some(database) = client.default_database() else {
            let error = OrmError::config(format!(
                "The connection url `{}` does not name a database",
                url
            ));
            log::error!("{:#}", error);
            return Err(error);
        };
        log::debug!("Connected to mongodb database `{}`", database.name());
        Ok(Self { client, database })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub(crate) fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection(name)
    }

    /// Round trip to the server.
    pub async fn ping(&self) -> Result<()> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .context("Ping failed")?;
        Ok(())
    }

    /// Drop the database the connection is bound to.
    pub async fn drop_database(&self) -> Result<()> {
        self.database
            .drop()
            .await
            .with_context(|| format!("Cannot drop the database `{}`", self.database.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orca_core::ErrorKind;

    #[test]
    fn pool_settings_override_the_url() {
        let mut options = ClientOptions::default();
        options.max_pool_size = Some(3);
        PoolConfig {
            max_pool_size: Some(50),
            max_idle_time: Some(Duration::from_secs(300)),
            app_name: None,
            ..Default::default()
        }
        .apply(&mut options);
        assert_eq!(options.max_pool_size, Some(50));
        assert_eq!(options.max_idle_time, Some(Duration::from_secs(300)));
        assert_eq!(options.connect_timeout, Some(Duration::from_secs(10)));
        assert_eq!(options.app_name, None);
    }

    #[tokio::test]
    async fn database_from_url() {
        let connection = MongoConnection::connect("mongodb://localhost:27017/orca_test")
            .await
            .expect("Could not build the client");
        assert_eq!(connection.database().name(), "orca_test");

        let error = MongoConnection::connect("mongodb://localhost:27017")
            .await
            .unwrap_err();
        assert_eq!(OrmError::kind_of(&error), ErrorKind::Config);
        assert!(MongoConnection::connect("postgres://localhost").await.is_err());
    }
}
