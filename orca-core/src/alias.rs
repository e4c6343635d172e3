use crate::{Dialect, OrmError, Result};
use std::{
    collections::HashMap,
    fmt::{self, Display},
    sync::{Arc, RwLock},
};
use time::{UtcOffset, format_description::FormatItem, macros::format_description};
use url::Url;

/// Driver families known to the core. Closed: each one resolves to a dialect or to the
/// document backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    Sqlite,
    Postgres,
    MySql,
    ClickHouse,
    Mongo,
}

impl DriverKind {
    pub fn from_scheme(scheme: &str) -> Option<DriverKind> {
        Some(match scheme {
            "sqlite" => DriverKind::Sqlite,
            "postgres" | "postgresql" => DriverKind::Postgres,
            "mysql" => DriverKind::MySql,
            "clickhouse" => DriverKind::ClickHouse,
            "mongodb" | "mongodb+srv" => DriverKind::Mongo,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            DriverKind::Sqlite => "sqlite",
            DriverKind::Postgres => "postgres",
            DriverKind::MySql => "mysql",
            DriverKind::ClickHouse => "clickhouse",
            DriverKind::Mongo => "mongodb",
        }
    }

    /// The SQL dialect of this family, `None` for document backends.
    pub fn dialect(&self) -> Option<Dialect> {
        match self {
            DriverKind::Sqlite => Some(Dialect::Sqlite),
            DriverKind::Postgres => Some(Dialect::Postgres),
            DriverKind::MySql => Some(Dialect::MySql),
            DriverKind::ClickHouse => Some(Dialect::ClickHouse),
            DriverKind::Mongo => None,
        }
    }

    pub fn is_document(&self) -> bool {
        self.dialect().is_none()
    }
}

impl Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const OFFSET_FORMAT: &[FormatItem<'static>] =
    format_description!("[offset_hour sign:mandatory]:[offset_minute]");

/// Everything the core needs to know about a named database.
#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    pub name: String,
    pub driver: DriverKind,
    /// Offset stored times are written in and read back from.
    pub time_zone: UtcOffset,
    pub database: Option<String>,
}

impl Alias {
    pub fn new(name: impl Into<String>, driver: DriverKind) -> Self {
        Self {
            name: name.into(),
            driver,
            time_zone: UtcOffset::UTC,
            database: None,
        }
    }

    /// Build from a connection url, `sqlite://data.db?tz=+08:00`. The scheme selects the driver
    /// and the path names the database.
    pub fn from_url(name: impl Into<String>, url: &str) -> Result<Self> {
        let name = name.into();
        let parsed = Url::parse(url).map_err(|e| {
            let error = OrmError::config(format!("Alias `{}`: invalid url `{}`: {}", name, url, e));
            log::error!("{:#}", error);
            error
        })?;
        let Some(driver) = DriverKind::from_scheme(parsed.scheme()) else {
            let error = OrmError::config(format!(
                "Alias `{}`: unknown driver `{}`",
                name,
                parsed.scheme()
            ));
            log::error!("{:#}", error);
            return Err(error);
        };
        let mut alias = Alias::new(name, driver);
        let database = match driver {
            DriverKind::Sqlite => format!(
                "{}{}",
                parsed.host_str().unwrap_or_default(),
                parsed.path()
            ),
            _ => parsed.path().trim_start_matches('/').to_string(),
        };
        if !database.is_empty() {
            alias.database = Some(database);
        }
        if let Some((_, tz)) = parsed.query_pairs().find(|(k, _)| k == "tz") {
            alias.time_zone = parse_offset(&tz).map_err(|e| {
                let error = OrmError::config(format!("Alias `{}`: {}", alias.name, e));
                log::error!("{:#}", error);
                error
            })?;
        }
        Ok(alias)
    }

    pub fn with_time_zone(mut self, time_zone: UtcOffset) -> Self {
        self.time_zone = time_zone;
        self
    }
}

/// Parse `+08:00`, `-05:30`, `Z` or `UTC`.
pub fn parse_offset(value: &str) -> std::result::Result<UtcOffset, String> {
    match value.trim() {
        "Z" | "UTC" | "utc" => Ok(UtcOffset::UTC),
        v => UtcOffset::parse(v, OFFSET_FORMAT)
            .map_err(|e| format!("invalid time zone offset `{}`: {}", v, e)),
    }
}

/// The aliases an application works with, created explicitly and owned by the caller.
#[derive(Default)]
pub struct Databases {
    aliases: RwLock<HashMap<String, Arc<Alias>>>,
}

impl Databases {
    pub fn new() -> Self {
        Default::default()
    }

    /// Add an alias, replacing an existing one with the same name only when `force` is set.
    pub fn add(&self, alias: Alias, force: bool) -> Result<Arc<Alias>> {
        let mut aliases = self
            .aliases
            .write()
            .map_err(|_| OrmError::config("The alias registry lock is poisoned"))?;
        if !force && aliases.contains_key(&alias.name) {
            let error = OrmError::config(format!("Alias `{}` is already registered", alias.name));
            log::error!("{:#}", error);
            return Err(error);
        }
        let alias = Arc::new(alias);
        aliases.insert(alias.name.clone(), alias.clone());
        Ok(alias)
    }

    pub fn get(&self, name: &str) -> Result<Arc<Alias>> {
        self.aliases
            .read()
            .ok()
            .and_then(|v| v.get(name).cloned())
            .ok_or_else(|| {
                let error = OrmError::config(format!("Unknown database alias `{}`", name));
                log::error!("{:#}", error);
                error
            })
    }

    /// Handles already built keep the previous offset, new ones pick up this one.
    pub fn set_time_zone(&self, name: &str, time_zone: UtcOffset) -> Result<Arc<Alias>> {
        let current = self.get(name)?;
        self.add(current.as_ref().clone().with_time_zone(time_zone), true)
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Alias>> {
        self.aliases.write().ok()?.remove(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use time::macros::offset;

    #[test]
    fn from_url() {
        let alias = Alias::from_url("default", "sqlite://data/app.db?tz=%2B08:00").unwrap();
        assert_eq!(alias.driver, DriverKind::Sqlite);
        assert_eq!(alias.time_zone, offset!(+8));
        assert_eq!(alias.database.as_deref(), Some("data/app.db"));
        let alias = Alias::from_url("logs", "mongodb://localhost:27017/logs").unwrap();
        assert!(alias.driver.is_document());
        assert_eq!(alias.database.as_deref(), Some("logs"));
        let error = Alias::from_url("x", "oracle://host/db").unwrap_err();
        assert_eq!(OrmError::kind_of(&error), ErrorKind::Config);
        assert!(Alias::from_url("x", "mysql://host/db?tz=soon").is_err());
    }

    #[test]
    fn databases() {
        let databases = Databases::new();
        databases
            .add(Alias::new("default", DriverKind::Postgres), false)
            .unwrap();
        assert!(
            databases
                .add(Alias::new("default", DriverKind::MySql), false)
                .is_err()
        );
        databases.set_time_zone("default", offset!(-5)).unwrap();
        assert_eq!(databases.get("default").unwrap().time_zone, offset!(-5));
        assert!(databases.get("missing").is_err());
    }
}
