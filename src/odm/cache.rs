//! # 模型内存缓存
//!
//! 把一个集合的记录整体加载到内存，按最后更新时间增量重新加载。
//! 读取不加锁，重新加载和删除都以整体替换数据集的方式生效。

use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::Bson;
use parking_lot::Mutex;
use rat_logger::{debug, error};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use super::db::Db;
use crate::adapter::ClientFactory;
use crate::error::{QuickDbError, QuickDbResult};
use crate::model::Model;
use crate::types::Paging;

/// 缓存分页的每页上限
pub const CACHE_MAX_PAGE_SIZE: usize = 300;

/// 可缓存的模型
pub trait CacheModel: Send + Sync + 'static {
    /// 最后更新时间
    fn update_time(&self) -> i64;
}

/// 数据变更事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    Create,
    Update,
    Delete,
}

/// 缓存数据来源
#[async_trait]
pub trait CacheHandle<T>: Send + Sync {
    /// 加载更新时间不早于 `since` 的记录，`since` 为0时加载全部
    async fn reload(&self, since: i64) -> QuickDbResult<Vec<(String, T)>>;
}

/// 主键转换为缓存键
pub fn cache_key(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::ObjectId(oid) => oid.to_hex(),
        other => other.to_string(),
    }
}

type Dataset<T> = HashMap<String, Arc<T>>;

/// 模型内存缓存
pub struct ModelCache<T: CacheModel> {
    time: AtomicI64,
    handle: Arc<dyn CacheHandle<T>>,
    dataset: ArcSwap<Dataset<T>>,
    /// 按更新时间升序排列的记录，数据集变化后失效
    cursor: Mutex<Option<Arc<Vec<Arc<T>>>>>,
    reloading: tokio::sync::Mutex<()>,
}

impl<T: CacheModel> ModelCache<T> {
    pub fn new(handle: impl CacheHandle<T> + 'static) -> Self {
        Self {
            time: AtomicI64::new(Utc::now().timestamp()),
            handle: Arc::new(handle),
            dataset: ArcSwap::from_pointee(HashMap::new()),
            cursor: Mutex::new(None),
            reloading: tokio::sync::Mutex::new(()),
        }
    }

    /// 最近一次增量加载的时间点
    pub fn time(&self) -> i64 {
        self.time.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.dataset.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.load().is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Arc<T>> {
        self.dataset.load().get(id).cloned()
    }

    pub fn has(&self, id: &str) -> bool {
        self.dataset.load().contains_key(id)
    }

    /// 遍历全部记录，回调返回 false 时停止
    pub fn range(&self, mut f: impl FnMut(&Arc<T>) -> bool) {
        for value in self.dataset.load().values() {
            if !f(value) {
                return;
            }
        }
    }

    fn sorted(&self) -> Arc<Vec<Arc<T>>> {
        let mut cursor = self.cursor.lock();
        if let Some(sorted) = cursor.as_ref() {
            return sorted.clone();
        }
        let mut rows: Vec<Arc<T>> = self.dataset.load().values().cloned().collect();
        rows.sort_by_key(|v| v.update_time());
        let rows = Arc::new(rows);
        *cursor = Some(rows.clone());
        rows
    }

    /// 按更新时间升序返回晚于 `update` 且通过过滤的记录
    pub fn cursor(&self, update: i64, filter: impl Fn(&T) -> bool) -> Vec<Arc<T>> {
        self.sorted()
            .iter()
            .filter(|v| {
                let item: &T = v;
                item.update_time() > update && filter(item)
            })
            .cloned()
            .collect()
    }

    /// 在缓存中分页，`paging.update` 大于0时只返回更新时间更晚的记录
    pub fn page(&self, mut paging: Paging<Arc<T>>, filter: impl Fn(&T) -> bool) -> Paging<Arc<T>> {
        let rows = self.cursor(paging.update, filter);
        paging.init(CACHE_MAX_PAGE_SIZE);
        paging.result(rows.len());
        paging.rows = if paging.page > paging.total {
            Vec::new()
        } else {
            let offset = paging.offset();
            let end = offset.saturating_add(paging.size).min(paging.record);
            rows[offset..end].to_vec()
        };
        paging
    }

    /// 从缓存中移除一条记录
    pub fn delete(&self, id: &str) {
        let mut cursor = self.cursor.lock();
        self.dataset.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.remove(id);
            next
        });
        *cursor = None;
    }

    /// 重新加载
    ///
    /// `ts` 为0时全量加载；`ts` 不晚于上一次加载的时间点时跳过
    pub async fn reload(&self, ts: i64) -> QuickDbResult<()> {
        let handle = self.handle.clone();
        self.reload_with(ts, handle.as_ref()).await
    }

    /// 使用指定的数据来源重新加载
    pub async fn reload_with(&self, ts: i64, handle: &dyn CacheHandle<T>) -> QuickDbResult<()> {
        if ts > 0 && ts <= self.time() {
            return Ok(());
        }
        let _reloading = self.reloading.lock().await;
        let rows: Vec<(String, Arc<T>)> = handle
            .reload(ts)
            .await?
            .into_iter()
            .map(|(k, v)| (k, Arc::new(v)))
            .collect();
        let loaded = rows.len();

        let mut cursor = self.cursor.lock();
        self.dataset.rcu(|current| {
            let mut next = HashMap::clone(current);
            for (k, v) in &rows {
                next.insert(k.clone(), v.clone());
            }
            next
        });
        *cursor = None;
        drop(cursor);

        if ts > 0 {
            self.time.fetch_max(ts, Ordering::SeqCst);
        }
        debug!("缓存重新加载: since={} 加载{}条 共{}条", ts, loaded, self.len());
        Ok(())
    }

    /// 处理数据变更通知
    pub async fn listener(&self, event: CacheEvent, id: &str, update: i64) {
        match event {
            CacheEvent::Delete => self.delete(id),
            CacheEvent::Create | CacheEvent::Update => {
                if let Err(e) = self.reload(update).await {
                    error!("缓存重新加载失败[{}]: {}", id, e);
                }
            }
        }
    }
}

/// 从数据库加载模型的缓存数据来源
///
/// 增量加载按配置的 `page_update_field` 字段过滤
pub struct DbCacheHandle<T, F: ClientFactory> {
    db: Db<F>,
    _model: PhantomData<fn() -> T>,
}

impl<T, F: ClientFactory> DbCacheHandle<T, F> {
    pub fn new(db: Db<F>) -> Self {
        Self {
            db,
            _model: PhantomData,
        }
    }
}

#[async_trait]
impl<T, F> CacheHandle<T> for DbCacheHandle<T, F>
where
    T: Model + CacheModel,
    F: ClientFactory,
{
    async fn reload(&self, since: i64) -> QuickDbResult<Vec<(String, T)>> {
        let mut db = self.db.model::<T>();
        if since > 0 {
            db = db.gte(self.db.config().page_update_field.clone(), since);
        }
        let rows: Vec<T> = db.find().await?;
        rows.into_iter()
            .map(|model| {
                let key = model.primary_key()?.ok_or_else(|| QuickDbError::InvalidValue {
                    message: format!("缓存模型 {} 缺少主键", T::collection_name()),
                })?;
                Ok((cache_key(&key), model))
            })
            .collect()
    }
}

impl<F: ClientFactory> Db<F> {
    /// 创建以当前数据库为来源的模型缓存，需要再调用 `reload(0)` 加载数据
    pub fn model_cache<T: Model + CacheModel>(&self) -> ModelCache<T> {
        ModelCache::new(DbCacheHandle::<T, F>::new(self.session()))
    }
}
