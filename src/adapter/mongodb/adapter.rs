//! MongoDB客户端核心模块
//!
//! 客户端构建参数和工厂实现

use async_trait::async_trait;
use mongodb::bson::{Document, doc};
use mongodb::options::{ClientOptions, ReadPreference, SelectionCriteria};
use mongodb::{Client, Collection};
use rat_logger::{debug, info};
use std::time::Duration;

use super::utils::prepare_uri;
use crate::adapter::{ClientFactory, Namespace};
use crate::error::QuickDbResult;

/// 客户端连接参数
#[derive(Debug, Clone)]
pub struct MongoClientSettings {
    pub min_pool_size: u32,
    pub max_pool_size: u32,
    pub max_idle_time: Duration,
    pub connect_timeout: Duration,
    pub server_selection_timeout: Duration,
    pub heartbeat_freq: Duration,
    pub retry_writes: bool,
    pub retry_reads: bool,
    /// 连接后是否立即 ping 验证
    pub ping_on_connect: bool,
}

impl Default for MongoClientSettings {
    fn default() -> Self {
        Self {
            min_pool_size: 20,
            max_pool_size: 200,
            max_idle_time: Duration::from_secs(5 * 60),
            connect_timeout: Duration::from_secs(10),
            server_selection_timeout: Duration::from_secs(15),
            heartbeat_freq: Duration::from_secs(5),
            retry_writes: true,
            retry_reads: true,
            ping_on_connect: true,
        }
    }
}

/// MongoDB客户端
#[derive(Debug, Clone)]
pub struct MongoStoreClient {
    pub(crate) client: Client,
}

impl MongoStoreClient {
    /// 按连接参数创建客户端
    pub async fn connect(uri: &str, settings: &MongoClientSettings) -> QuickDbResult<Self> {
        let prepared = prepare_uri(uri);
        let mut options = ClientOptions::parse(&prepared.uri).await?;

        options.min_pool_size = Some(settings.min_pool_size);
        options.max_pool_size = Some(settings.max_pool_size);
        options.max_idle_time = Some(settings.max_idle_time);
        options.connect_timeout = Some(settings.connect_timeout);
        options.server_selection_timeout = Some(settings.server_selection_timeout);
        options.heartbeat_freq = Some(settings.heartbeat_freq);
        options.retry_writes = Some(settings.retry_writes);
        options.retry_reads = Some(settings.retry_reads);
        options.selection_criteria = Some(SelectionCriteria::ReadPreference(ReadPreference::Primary));
        if let Some(direct) = prepared.direct_connection {
            options.direct_connection = Some(direct);
        }

        debug!(
            "创建MongoDB客户端: hosts={:?}, direct={:?}",
            options.hosts, options.direct_connection
        );

        let client = Client::with_options(options)?;
        let store = Self { client };

        if settings.ping_on_connect {
            store
                .client
                .database("admin")
                .run_command(doc! { "ping": 1 }, None)
                .await?;
            info!("MongoDB连接成功");
        }

        Ok(store)
    }

    /// 原始驱动客户端
    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub(crate) fn collection(&self, ns: &Namespace) -> Collection<Document> {
        self.client.database(&ns.database).collection(&ns.collection)
    }
}

/// MongoDB客户端工厂
#[derive(Debug, Clone, Default)]
pub struct MongoClientFactory {
    settings: MongoClientSettings,
}

impl MongoClientFactory {
    pub fn new(settings: MongoClientSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &MongoClientSettings {
        &self.settings
    }
}

#[async_trait]
impl ClientFactory for MongoClientFactory {
    type Client = MongoStoreClient;

    async fn connect(&self, uri: &str) -> QuickDbResult<Self::Client> {
        MongoStoreClient::connect(uri, &self.settings).await
    }
}
