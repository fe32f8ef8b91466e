//! 集成测试公共设施：内存存储客户端
//!
//! 支持顶层字段的相等和比较条件、`$set`/`$inc`/`$unset`/`$setOnInsert`、
//! 排序、分页和批量写入，足以驱动ODM层的完整调用链

#![allow(dead_code)]

use async_trait::async_trait;
use mongodb::bson::{Bson, Document, doc, oid::ObjectId};
use parking_lot::Mutex;
use rat_quickmongo::{
    BulkWriteOutcome, ClientFactory, Db, DbConfig, FindSpec, IndexSpec, Namespace, PoolConfig,
    QuickDbError, QuickDbResult, StoreClient, UpdateOutcome, WriteModel, quick_error,
};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

/// 多个客户端共享的存储状态，重连后数据仍在
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Document>>>,
    pub indexes: Mutex<Vec<(String, IndexSpec)>>,
    /// 为 true 时所有操作返回网络错误
    pub offline: AtomicBool,
    /// 创建索引时返回的错误码
    pub index_error_code: Mutex<Option<i32>>,
    pub connects: AtomicU64,
    pub operations: AtomicU64,
}

impl MemoryStore {
    pub fn documents(&self, ns: &str) -> Vec<Document> {
        self.collections.lock().get(ns).cloned().unwrap_or_default()
    }
}

#[derive(Debug)]
pub struct MemoryClient {
    store: Arc<MemoryStore>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryFactory {
    pub store: Arc<MemoryStore>,
}

#[async_trait]
impl ClientFactory for MemoryFactory {
    type Client = MemoryClient;

    async fn connect(&self, _uri: &str) -> QuickDbResult<MemoryClient> {
        self.store.connects.fetch_add(1, AtomicOrdering::SeqCst);
        if self.store.offline.load(AtomicOrdering::SeqCst) {
            return Err(quick_error!(store, Network, "connection refused"));
        }
        Ok(MemoryClient {
            store: self.store.clone(),
        })
    }
}

fn number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    match (number(a), number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => match (a, b) {
            (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
            (Bson::Null, Bson::Null) => Some(Ordering::Equal),
            (Bson::Null, _) => Some(Ordering::Less),
            (_, Bson::Null) => Some(Ordering::Greater),
            _ => None,
        },
    }
}

fn equals(a: &Bson, b: &Bson) -> bool {
    compare(a, b) == Some(Ordering::Equal) || a == b
}

fn contains(list: &Bson, value: &Bson) -> bool {
    match list {
        Bson::Array(items) => items.iter().any(|item| equals(item, value)),
        other => equals(other, value),
    }
}

fn match_operator(op: &str, actual: Option<&Bson>, expected: &Bson) -> bool {
    let value = actual.cloned().unwrap_or(Bson::Null);
    match op {
        "$gt" => compare(&value, expected) == Some(Ordering::Greater),
        "$gte" => matches!(compare(&value, expected), Some(Ordering::Greater | Ordering::Equal)),
        "$lt" => compare(&value, expected) == Some(Ordering::Less),
        "$lte" => matches!(compare(&value, expected), Some(Ordering::Less | Ordering::Equal)),
        "$ne" => !equals(&value, expected),
        "$in" => contains(expected, &value),
        "$nin" => !contains(expected, &value),
        "$eq" => equals(&value, expected),
        _ => false,
    }
}

fn matches_filter(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, expected)| match key.as_str() {
        "$or" => match expected {
            Bson::Array(items) => items.iter().any(|item| match item {
                Bson::Document(sub) => matches_filter(doc, sub),
                _ => false,
            }),
            _ => false,
        },
        "$and" => match expected {
            Bson::Array(items) => items.iter().all(|item| match item {
                Bson::Document(sub) => matches_filter(doc, sub),
                _ => false,
            }),
            Bson::Document(sub) => matches_filter(doc, sub),
            _ => false,
        },
        _ => match expected {
            Bson::Document(ops) if ops.keys().all(|k| k.starts_with('$')) && !ops.is_empty() => ops
                .iter()
                .all(|(op, v)| match_operator(op, doc.get(key), v)),
            other => doc.get(key).is_some_and(|actual| equals(actual, other)),
        },
    })
}

fn increment(current: Option<&Bson>, by: &Bson) -> Bson {
    match (current.cloned().unwrap_or(Bson::Int32(0)), by) {
        (Bson::Int32(a), Bson::Int32(b)) => a
            .checked_add(*b)
            .map(Bson::Int32)
            .unwrap_or(Bson::Int64(i64::from(a) + i64::from(*b))),
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(a) + b),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a + i64::from(*b)),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a + b),
        (a, b) => Bson::Double(number(&a).unwrap_or(0.0) + number(b).unwrap_or(0.0)),
    }
}

fn apply_update(doc: &mut Document, update: &Document, inserting: bool) {
    for (op, fields) in update {
        let Bson::Document(fields) = fields else {
            continue;
        };
        for (key, value) in fields {
            match op.as_str() {
                "$set" => {
                    doc.insert(key, value.clone());
                }
                "$setOnInsert" if inserting => {
                    doc.insert(key, value.clone());
                }
                "$inc" => {
                    let next = increment(doc.get(key), value);
                    doc.insert(key, next);
                }
                "$unset" => {
                    doc.remove(key);
                }
                _ => {}
            }
        }
    }
}

fn project(doc: Document, projection: &Option<Document>) -> Document {
    let Some(projection) = projection else {
        return doc;
    };
    let include = projection.values().any(|v| number(v) == Some(1.0));
    doc.into_iter()
        .filter(|(k, _)| {
            let flag = projection.get(k).and_then(number);
            if include {
                flag == Some(1.0) || (k == "_id" && flag != Some(0.0))
            } else {
                flag != Some(0.0)
            }
        })
        .collect()
}

fn sort_documents(docs: &mut [Document], sort: &Option<Document>) {
    let Some(sort) = sort else {
        return;
    };
    docs.sort_by(|a, b| {
        for (key, dir) in sort {
            let ord = compare(
                a.get(key).unwrap_or(&Bson::Null),
                b.get(key).unwrap_or(&Bson::Null),
            )
            .unwrap_or(Ordering::Equal);
            let ord = if number(dir) == Some(-1.0) { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn seed_from_filter(filter: &Document) -> Document {
    filter
        .iter()
        .filter(|(k, v)| !k.starts_with('$') && !matches!(v, Bson::Document(_)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

impl MemoryClient {
    fn check(&self) -> QuickDbResult<()> {
        self.store.operations.fetch_add(1, AtomicOrdering::SeqCst);
        if self.store.offline.load(AtomicOrdering::SeqCst) {
            return Err(quick_error!(store, Network, "connection reset by peer"));
        }
        Ok(())
    }

    fn with_collection<T>(&self, ns: &Namespace, f: impl FnOnce(&mut Vec<Document>) -> T) -> T {
        let mut collections = self.store.collections.lock();
        f(collections.entry(ns.to_string()).or_default())
    }

    fn insert(docs: &mut Vec<Document>, mut document: Document) -> QuickDbResult<Bson> {
        let id = match document.get("_id") {
            Some(id) => id.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                document.insert("_id", id.clone());
                id
            }
        };
        if docs.iter().any(|d| d.get("_id").is_some_and(|v| equals(v, &id))) {
            return Err(QuickDbError::StoreError {
                kind: rat_quickmongo::StoreErrorKind::DuplicateKey,
                code: Some(11000),
                message: format!("E11000 duplicate key error: {}", id),
            });
        }
        docs.push(document);
        Ok(id)
    }

    fn update(
        docs: &mut Vec<Document>,
        filter: &Document,
        update: &Document,
        upsert: bool,
        many: bool,
    ) -> QuickDbResult<UpdateOutcome> {
        let mut outcome = UpdateOutcome::default();
        for doc in docs.iter_mut().filter(|d| matches_filter(d, filter)) {
            outcome.matched_count += 1;
            let before = doc.clone();
            apply_update(doc, update, false);
            if *doc != before {
                outcome.modified_count += 1;
            }
            if !many {
                break;
            }
        }
        if outcome.matched_count == 0 && upsert {
            let mut doc = seed_from_filter(filter);
            apply_update(&mut doc, update, true);
            outcome.upserted_id = Some(Self::insert(docs, doc)?);
        }
        Ok(outcome)
    }

    fn delete(docs: &mut Vec<Document>, filter: &Document, many: bool) -> u64 {
        let mut deleted = 0;
        docs.retain(|d| {
            if (many || deleted == 0) && matches_filter(d, filter) {
                deleted += 1;
                false
            } else {
                true
            }
        });
        deleted
    }

    fn select(&self, ns: &Namespace, filter: &Document, spec: &FindSpec) -> Vec<Document> {
        let mut docs: Vec<Document> = self.with_collection(ns, |docs| {
            docs.iter().filter(|d| matches_filter(d, filter)).cloned().collect()
        });
        sort_documents(&mut docs, &spec.sort);
        let skip = spec.skip.unwrap_or(0) as usize;
        let limit = match spec.limit {
            Some(n) if n > 0 => n as usize,
            _ => usize::MAX,
        };
        docs.into_iter()
            .skip(skip)
            .take(limit)
            .map(|d| project(d, &spec.projection))
            .collect()
    }
}

#[async_trait]
impl StoreClient for MemoryClient {
    async fn ping(&self) -> QuickDbResult<()> {
        self.check()
    }

    async fn run_command(&self, _database: &str, _command: Document) -> QuickDbResult<Document> {
        self.check()?;
        Ok(doc! { "ok": 1 })
    }

    async fn insert_one(&self, ns: &Namespace, document: Document) -> QuickDbResult<Bson> {
        self.check()?;
        self.with_collection(ns, |docs| Self::insert(docs, document))
    }

    async fn insert_many(&self, ns: &Namespace, documents: Vec<Document>) -> QuickDbResult<u64> {
        self.check()?;
        self.with_collection(ns, |docs| {
            let mut inserted = 0;
            for document in documents {
                Self::insert(docs, document)?;
                inserted += 1;
            }
            Ok(inserted)
        })
    }

    async fn update_one(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> QuickDbResult<UpdateOutcome> {
        self.check()?;
        self.with_collection(ns, |docs| Self::update(docs, &filter, &update, upsert, false))
    }

    async fn update_many(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> QuickDbResult<UpdateOutcome> {
        self.check()?;
        self.with_collection(ns, |docs| Self::update(docs, &filter, &update, upsert, true))
    }

    async fn find_one_and_update(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        upsert: bool,
        projection: Option<Document>,
    ) -> QuickDbResult<Option<Document>> {
        self.check()?;
        self.with_collection(ns, |docs| {
            if let Some(doc) = docs.iter_mut().find(|d| matches_filter(d, &filter)) {
                apply_update(doc, &update, false);
                return Ok(Some(project(doc.clone(), &projection)));
            }
            if upsert {
                let mut doc = seed_from_filter(&filter);
                apply_update(&mut doc, &update, true);
                let id = Self::insert(docs, doc)?;
                let stored = docs.iter().find(|d| d.get("_id") == Some(&id)).cloned();
                return Ok(stored.map(|d| project(d, &projection)));
            }
            Ok(None)
        })
    }

    async fn delete_one(&self, ns: &Namespace, filter: Document) -> QuickDbResult<u64> {
        self.check()?;
        Ok(self.with_collection(ns, |docs| Self::delete(docs, &filter, false)))
    }

    async fn delete_many(&self, ns: &Namespace, filter: Document) -> QuickDbResult<u64> {
        self.check()?;
        Ok(self.with_collection(ns, |docs| Self::delete(docs, &filter, true)))
    }

    async fn find(&self, ns: &Namespace, filter: Document, spec: FindSpec) -> QuickDbResult<Vec<Document>> {
        self.check()?;
        Ok(self.select(ns, &filter, &spec))
    }

    async fn find_one(
        &self,
        ns: &Namespace,
        filter: Document,
        mut spec: FindSpec,
    ) -> QuickDbResult<Option<Document>> {
        self.check()?;
        spec.limit = Some(1);
        Ok(self.select(ns, &filter, &spec).into_iter().next())
    }

    async fn find_each(
        &self,
        ns: &Namespace,
        filter: Document,
        spec: FindSpec,
        handle: &mut (dyn FnMut(Document) -> QuickDbResult<bool> + Send),
    ) -> QuickDbResult<u64> {
        self.check()?;
        let mut seen = 0;
        for doc in self.select(ns, &filter, &spec) {
            seen += 1;
            if !handle(doc)? {
                break;
            }
        }
        Ok(seen)
    }

    async fn count_documents(&self, ns: &Namespace, filter: Document) -> QuickDbResult<u64> {
        self.check()?;
        Ok(self.with_collection(ns, |docs| {
            docs.iter().filter(|d| matches_filter(d, &filter)).count() as u64
        }))
    }

    async fn create_index(&self, ns: &Namespace, index: IndexSpec) -> QuickDbResult<()> {
        self.check()?;
        if let Some(code) = *self.store.index_error_code.lock() {
            return Err(QuickDbError::StoreError {
                kind: rat_quickmongo::StoreErrorKind::Command,
                code: Some(code),
                message: format!("index error {}", code),
            });
        }
        self.store.indexes.lock().push((ns.to_string(), index));
        Ok(())
    }

    async fn bulk_write(
        &self,
        ns: &Namespace,
        models: Vec<WriteModel>,
        ordered: bool,
    ) -> QuickDbResult<BulkWriteOutcome> {
        self.check()?;
        self.with_collection(ns, |docs| {
            let mut outcome = BulkWriteOutcome::default();
            let mut first_error = None;
            for model in models {
                let result = match model {
                    WriteModel::InsertOne { document } => {
                        Self::insert(docs, document).map(|_| outcome.inserted_count += 1)
                    }
                    WriteModel::UpdateOne { filter, update, upsert } => {
                        Self::update(docs, &filter, &update, upsert, false).map(|o| {
                            outcome.matched_count += o.matched_count;
                            outcome.modified_count += o.modified_count;
                            outcome.upserted_count += u64::from(o.upserted_id.is_some());
                        })
                    }
                    WriteModel::UpdateMany { filter, update, upsert } => {
                        Self::update(docs, &filter, &update, upsert, true).map(|o| {
                            outcome.matched_count += o.matched_count;
                            outcome.modified_count += o.modified_count;
                            outcome.upserted_count += u64::from(o.upserted_id.is_some());
                        })
                    }
                    WriteModel::DeleteOne { filter } => {
                        outcome.deleted_count += Self::delete(docs, &filter, false);
                        Ok(())
                    }
                    WriteModel::DeleteMany { filter } => {
                        outcome.deleted_count += Self::delete(docs, &filter, true);
                        Ok(())
                    }
                };
                if let Err(e) = result {
                    if ordered {
                        return Err(e);
                    }
                    first_error.get_or_insert(e);
                }
            }
            match first_error {
                Some(e) => Err(e),
                None => Ok(outcome),
            }
        })
    }

    async fn disconnect(&self) -> QuickDbResult<()> {
        Ok(())
    }
}

/// 测试用连接池配置：缓存关闭、间隔缩短
pub fn test_pool_config() -> PoolConfig {
    PoolConfig::builder()
        .check_interval(Duration::from_secs(3600))
        .retry_delay(Duration::from_millis(10))
        .max_backoff(Duration::from_millis(50))
        .stabilization_delay(Duration::from_millis(10))
        .close_delay(Duration::from_millis(10))
        .wait_interval(Duration::from_millis(10))
        .warmup(2, Duration::from_millis(1))
        .execute_wait_timeout(Duration::from_secs(1))
        .health_cache_ttl(Duration::ZERO)
        .build()
        .expect("测试连接池配置")
}

pub fn test_config() -> DbConfig {
    DbConfig::builder()
        .uri("mongodb://memory")
        .database("game")
        .max_page_size(50)
        .pool(test_pool_config())
        .build()
        .expect("测试数据库配置")
}

pub async fn open_db() -> (Db<MemoryFactory>, Arc<MemoryStore>) {
    let factory = MemoryFactory::default();
    let store = factory.store.clone();
    let db = Db::open(factory, test_config()).await.expect("打开数据库");
    (db, store)
}
