//! MongoDB connection management

use crate::config::{MongormConfig, PoolConfig};
use crate::model::Model;
use crate::schema::{parse_timezone, Schema};
use crate::Result;
use bson::doc;
use chrono_tz::Tz;
use mongodb::{
    options::{ClientOptions, ServerApi, ServerApiVersion},
    Client, Database,
};
use mongorm_common::MongormError;
use std::sync::Arc;
use tracing::{debug, info};

/// Driver client plus the database binding rules of a [`MongormConfig`].
///
/// Connecting is lazy: the driver opens sockets on first use.
#[derive(Debug, Clone)]
pub struct Connection {
    client: Client,
    database: Option<Database>,
    config: Arc<MongormConfig>,
}

impl Connection {
    /// Connect with default pool settings
    pub async fn new(uri: &str) -> Result<Self> {
        Self::with_config(MongormConfig::new(uri)).await
    }

    pub async fn with_config(config: MongormConfig) -> Result<Self> {
        let mut client_options = ClientOptions::parse(&config.uri).await?;
        apply_pool_config(&mut client_options, &config.pool);

        let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
        client_options.server_api = Some(server_api);

        let client = Client::with_options(client_options)?;
        let database = client.default_database();

        info!(
            database = database.as_ref().map(|db| db.name()),
            dbname = config.dbname.as_deref(),
            "MongoDB client created"
        );

        Ok(Self {
            client,
            database,
            config: Arc::new(config),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn config(&self) -> &MongormConfig {
        &self.config
    }

    /// Database named in the connection string, if any
    pub fn default_database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    /// Database for a schema: the URI's database, then the configured
    /// `dbname`, then the schema's inherited `dbname`.
    pub fn database_for(&self, schema: &Schema) -> Result<Database> {
        if let Some(db) = &self.database {
            return Ok(db.clone());
        }

        self.config
            .dbname
            .as_deref()
            .or_else(|| schema.dbname())
            .map(|name| self.client.database(name))
            .ok_or_else(|| {
                MongormError::Configuration(format!(
                    "No database for schema '{}': set one in the URI, the config or the schema",
                    schema.name()
                ))
            })
    }

    /// Effective timezone for a schema; the configured one wins.
    pub fn timezone_for(&self, schema: &Schema) -> Result<Option<Tz>> {
        match self.config.timezone.as_deref() {
            Some(name) => parse_timezone(name).map(Some),
            None => Ok(schema.timezone()),
        }
    }

    /// Bind a schema to this connection.
    pub fn model(&self, schema: Arc<Schema>) -> Model {
        Model::new(schema, self.clone())
    }

    /// Check if the connection is healthy by pinging the server
    pub async fn ping(&self) -> Result<bool> {
        let admin = self.client.database("admin");
        match admin.run_command(doc! { "ping": 1 }).await {
            Ok(_) => Ok(true),
            Err(e) => Err(MongormError::Connection(format!("Ping failed: {}", e))),
        }
    }

    /// List all database names on the server
    pub async fn list_database_names(&self) -> Result<Vec<String>> {
        let names = self.client.list_database_names().await?;
        debug!(count = names.len(), "listed databases");
        Ok(names)
    }
}

fn apply_pool_config(client_options: &mut ClientOptions, pool: &PoolConfig) {
    if let Some(min) = pool.min_pool_size {
        client_options.min_pool_size = Some(min);
    }
    if let Some(max) = pool.max_pool_size {
        client_options.max_pool_size = Some(max);
    }
    if let Some(idle) = pool.max_idle_time {
        client_options.max_idle_time = Some(idle);
    }
    if let Some(connect) = pool.connect_timeout {
        client_options.connect_timeout = Some(connect);
    }
    if let Some(server_sel) = pool.server_selection_timeout {
        client_options.server_selection_timeout = Some(server_sel);
    }
    if let Some(app) = &pool.app_name {
        client_options.app_name = Some(app.clone());
    }
}
