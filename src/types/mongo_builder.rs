//! MongoDB 连接地址构建器

use std::collections::BTreeMap;

use crate::error::QuickDbResult;

/// MongoDB 连接构建器
#[derive(Debug, Clone)]
pub struct MongoDbConnectionBuilder {
    hosts: Vec<(String, u16)>,
    database: Option<String>,
    username: Option<String>,
    password: Option<String>,
    auth_source: Option<String>,
    replica_set: Option<String>,
    direct_connection: Option<bool>,
    tls: bool,
    zstd: bool,
    options: BTreeMap<String, String>,
}

impl MongoDbConnectionBuilder {
    /// 创建新的MongoDB连接构建器
    pub fn new<H: Into<String>>(host: H, port: u16) -> Self {
        Self {
            hosts: vec![(host.into(), port)],
            database: None,
            username: None,
            password: None,
            auth_source: None,
            replica_set: None,
            direct_connection: None,
            tls: false,
            zstd: false,
            options: BTreeMap::new(),
        }
    }

    /// 追加副本集成员
    pub fn with_host<H: Into<String>>(mut self, host: H, port: u16) -> Self {
        self.hosts.push((host.into(), port));
        self
    }

    /// 设置默认数据库
    pub fn with_database<D: Into<String>>(mut self, database: D) -> Self {
        self.database = Some(database.into());
        self
    }

    /// 设置用户名和密码
    pub fn with_auth<U: Into<String>, P: Into<String>>(mut self, username: U, password: P) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// 设置认证数据库
    pub fn with_auth_source<A: Into<String>>(mut self, auth_source: A) -> Self {
        self.auth_source = Some(auth_source.into());
        self
    }

    /// 设置副本集名称
    pub fn with_replica_set<R: Into<String>>(mut self, replica_set: R) -> Self {
        self.replica_set = Some(replica_set.into());
        self
    }

    /// 显式指定是否直连，不指定时按主机数量自动判断
    pub fn with_direct_connection(mut self, direct: bool) -> Self {
        self.direct_connection = Some(direct);
        self
    }

    /// 启用TLS
    pub fn with_tls(mut self, enabled: bool) -> Self {
        self.tls = enabled;
        self
    }

    /// 启用ZSTD压缩
    pub fn with_zstd(mut self, enabled: bool) -> Self {
        self.zstd = enabled;
        self
    }

    /// 添加自定义选项
    pub fn with_option<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// 生成MongoDB连接URI
    pub fn build(&self) -> QuickDbResult<String> {
        if self.hosts.iter().any(|(h, _)| h.trim().is_empty()) {
            return Err(crate::quick_error!(config, "MongoDB主机地址不能为空"));
        }
        if self.username.as_deref().is_some_and(str::is_empty) {
            return Err(crate::quick_error!(config, "MongoDB用户名不能为空"));
        }

        let mut uri = String::from("mongodb://");

        // 添加认证信息
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            uri.push_str(&urlencoding::encode(username));
            uri.push(':');
            uri.push_str(&urlencoding::encode(password));
            uri.push('@');
        }

        // 添加主机和端口
        let hosts: Vec<String> = self
            .hosts
            .iter()
            .map(|(host, port)| format!("{}:{}", host, port))
            .collect();
        uri.push_str(&hosts.join(","));

        uri.push('/');
        if let Some(database) = &self.database {
            uri.push_str(&urlencoding::encode(database));
        }

        // 构建查询参数
        let mut params = Vec::new();

        if let Some(auth_source) = &self.auth_source {
            params.push(format!("authSource={}", urlencoding::encode(auth_source)));
        }

        if let Some(replica_set) = &self.replica_set {
            params.push(format!("replicaSet={}", urlencoding::encode(replica_set)));
        }

        if let Some(direct) = self.direct_connection {
            params.push(format!("directConnection={}", direct));
        }

        if self.tls {
            params.push("tls=true".to_string());
        }

        if self.zstd {
            params.push("compressors=zstd".to_string());
        }

        for (key, value) in &self.options {
            params.push(format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            ));
        }

        if !params.is_empty() {
            uri.push('?');
            uri.push_str(&params.join("&"));
        }

        Ok(uri)
    }
}
