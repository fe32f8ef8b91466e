//! ODM层集成测试
//!
//! 使用内存存储客户端走完 链式调用 -> 语句解析 -> 命令分发 -> 守护执行 的完整路径

mod common;

use common::open_db;
use mongodb::bson::{Bson, doc};
use rat_quickmongo::{
    CacheEvent, CacheModel, IndexDefinition, Model, Paging, QuickDbError, Update, UpdateInput,
    args, define_model,
};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use tokio_test::assert_ok;

define_model! {
    /// 角色
    struct Role {
        id: String => "_id" @primary,
        level: i64 => "lv",
        name: String => "name",
        update: i64 => "update",
    }
    collection = "role",
    indexes = [
        { fields: ["name"], unique: true },
        { fields: ["-level"], partial: "level > int(0)" },
    ],
}

impl CacheModel for Role {
    fn update_time(&self) -> i64 {
        self.update
    }
}

fn role(id: &str, level: i64, name: &str, update: i64) -> Role {
    Role {
        id: id.to_string(),
        level,
        name: name.to_string(),
        update,
    }
}

#[tokio::test]
async fn test_update_inc_and_set_end_to_end() {
    let (db, store) = open_db().await;
    assert_ok!(
        db.table("role")
            .create_document(doc! { "_id": "r1", "lv": 0, "name": "x" })
            .await
    );

    let mut update = Update::new();
    update.inc("lv", 1).set("name", "y");
    let result = db
        .table("role")
        .where_clause("_id = ?", args!["r1"])
        .update(update)
        .await
        .expect("更新");
    assert_eq!(result.rows_affected, 1);

    let docs = store.documents("game.role");
    assert_eq!(docs, vec![doc! { "_id": "r1", "lv": 1, "name": "y" }]);
}

#[tokio::test]
async fn test_model_roundtrip_with_field_translation() {
    let (db, store) = open_db().await;
    let id = db.create(&role("r1", 3, "alice", 0)).await.expect("插入");
    assert_eq!(id, Bson::String("r1".to_string()));

    let stored = store.documents("game.role");
    assert_eq!(stored[0].get_i64("lv").expect("lv"), 3);

    let found: Vec<Role> = db.model::<Role>().gte("level", 3).find().await.expect("查询");
    assert_eq!(found, vec![role("r1", 3, "alice", 0)]);

    let first: Option<Role> = db.eq("name", "nobody").first().await.expect("查询单条");
    assert!(first.is_none());
}

#[tokio::test]
async fn test_update_model_skips_zero_fields() {
    let (db, store) = open_db().await;
    db.create(&role("r1", 5, "alice", 0)).await.expect("插入");

    let patch = role("r1", 0, "bob", 0);
    let result = db
        .model::<Role>()
        .where_clause("r1", args![])
        .update_model(&patch)
        .await
        .expect("更新");
    assert_eq!(result.rows_affected, 1);
    let stored = &store.documents("game.role")[0];
    assert_eq!(stored.get_i64("lv").expect("lv"), 5);
    assert_eq!(stored.get_str("name").expect("name"), "bob");

    db.model::<Role>()
        .include_zero_value()
        .where_clause("r1", args![])
        .update_model(&patch)
        .await
        .expect("更新零值");
    let stored = &store.documents("game.role")[0];
    assert_eq!(stored.get_i64("lv").expect("lv"), 0);
}

#[tokio::test]
async fn test_select_limits_updated_fields() {
    let (db, store) = open_db().await;
    db.create(&role("r1", 1, "alice", 0)).await.expect("插入");

    db.model::<Role>()
        .select(["level"])
        .where_clause("r1", args![])
        .update_model(&role("r1", 9, "bob", 0))
        .await
        .expect("更新");
    let stored = &store.documents("game.role")[0];
    assert_eq!(stored.get_i64("lv").expect("lv"), 9);
    assert_eq!(stored.get_str("name").expect("name"), "alice");
}

#[tokio::test]
async fn test_select_after_omit_is_reported_at_terminal_call() {
    let (db, _store) = open_db().await;
    let chained = db.model::<Role>().omit(["name"]).select(["level"]);
    assert!(matches!(chained.error(), Some(QuickDbError::SelectOnOmitsExist)));
    let err = chained.find::<Role>().await.expect_err("应当返回链式错误");
    assert!(matches!(err, QuickDbError::SelectOnOmitsExist));

    // 原实例不受影响
    assert!(db.error().is_none());
}

#[tokio::test]
async fn test_delete_without_where_is_rejected() {
    let (db, store) = open_db().await;
    db.create(&role("r1", 1, "alice", 0)).await.expect("插入");

    let err = db.model::<Role>().delete().await.expect_err("应当拒绝");
    assert!(matches!(err, QuickDbError::MissingWhereClause));
    assert_eq!(store.documents("game.role").len(), 1);
}

#[tokio::test]
async fn test_delete_single_and_multiple() {
    let (db, store) = open_db().await;
    db.create_many(&[
        role("r1", 1, "a", 0),
        role("r2", 2, "b", 0),
        role("r3", 3, "c", 0),
    ])
    .await
    .expect("批量插入");

    let deleted = db.delete_model(&role("r1", 0, "", 0)).await.expect("按主键删除");
    assert_eq!(deleted, 1);

    let deleted = db
        .model::<Role>()
        .where_clause("level >= ?", args![2])
        .delete()
        .await
        .expect("按条件删除");
    assert_eq!(deleted, 2);
    assert!(store.documents("game.role").is_empty());
}

#[tokio::test]
async fn test_update_without_match_reports_zero_rows() {
    let (db, _store) = open_db().await;
    let mut values = HashMap::new();
    values.insert("name".to_string(), "ghost");
    let result = db
        .model::<Role>()
        .where_clause("missing", args![])
        .update(values)
        .await
        .expect("更新");
    assert_eq!(result.rows_affected, 0);
}

#[tokio::test]
async fn test_upsert_counts_inserted_row() {
    let (db, store) = open_db().await;
    let result = db
        .model::<Role>()
        .upsert()
        .where_clause("r9", args![])
        .update(UpdateInput::from(doc! { "name": "new" }))
        .await
        .expect("upsert");
    assert_eq!(result.rows_affected, 1);
    assert_eq!(store.documents("game.role"), vec![doc! { "_id": "r9", "name": "new" }]);
}

#[tokio::test]
async fn test_multiple_update_ignores_set_on_insert_upsert() {
    let (db, store) = open_db().await;
    let mut update = Update::new();
    update.set("name", "y").set_on_insert("level", 5);
    let result = db
        .model::<Role>()
        .multiple()
        .where_clause("name = ?", args!["nobody"])
        .update(update)
        .await
        .expect("批量更新");
    assert_eq!(result.rows_affected, 0);
    assert!(store.documents("game.role").is_empty());
}

#[tokio::test]
async fn test_update_and_fetch_returns_new_document() {
    let (db, _store) = open_db().await;
    db.create(&role("r1", 1, "alice", 0)).await.expect("插入");

    let mut update = Update::new();
    update.inc("lv", 10);
    let fetched: Option<Role> = db
        .where_clause("r1", args![])
        .update_and_fetch(update)
        .await
        .expect("更新并返回");
    assert_eq!(fetched, Some(role("r1", 11, "alice", 0)));

    let mut update = Update::new();
    update.inc("lv", 1);
    let missing: Option<Role> = db
        .where_clause("r404", args![])
        .update_and_fetch(update)
        .await
        .expect("没有匹配记录");
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_save_requires_primary_key() {
    let (db, store) = open_db().await;
    db.create(&role("r1", 1, "alice", 0)).await.expect("插入");

    let result = db.save(&role("r1", 2, "alice", 0)).await.expect("保存");
    assert_eq!(result.rows_affected, 1);
    assert_eq!(store.documents("game.role")[0].get_i64("lv").expect("lv"), 2);

    let err = db.save(&role("", 2, "alice", 0)).await.expect_err("主键为空");
    assert!(matches!(err, QuickDbError::InvalidValue { .. }));
}

#[tokio::test]
async fn test_count_and_page() {
    let (db, _store) = open_db().await;
    let roles: Vec<Role> = (1..=25)
        .map(|i| role(&format!("r{:02}", i), i, &format!("n{}", i), i * 10))
        .collect();
    db.create_many(&roles).await.expect("批量插入");

    assert_eq!(db.model::<Role>().count().await.expect("统计"), 25);

    let page = db
        .model::<Role>()
        .order("level")
        .page(Paging::<Role>::new(3, 10))
        .await
        .expect("分页");
    assert_eq!(page.record, 25);
    assert_eq!(page.total, 3);
    assert_eq!(page.rows.len(), 5);
    assert_eq!(page.rows[0].level, 21);

    // 每页数量被限制在配置的上限内
    let page = db
        .model::<Role>()
        .page(Paging::<Role>::new(1, 500))
        .await
        .expect("分页");
    assert_eq!(page.size, 50);

    // 增量分页只返回更新时间更晚的记录，按更新时间降序
    let mut incremental = Paging::<Role>::new(1, 10);
    incremental.update = 200;
    let page = db.model::<Role>().page(incremental).await.expect("增量分页");
    assert_eq!(page.record, 5);
    assert_eq!(page.rows.first().map(|r| r.update), Some(250));
}

#[tokio::test]
async fn test_range_stops_early() {
    let (db, _store) = open_db().await;
    let roles: Vec<Role> = (1..=5)
        .map(|i| role(&format!("r{}", i), i, &format!("n{}", i), 0))
        .collect();
    db.create_many(&roles).await.expect("批量插入");

    let mut seen = Vec::new();
    let visited = db
        .model::<Role>()
        .order("-level")
        .range(|r: Role| {
            seen.push(r.level);
            seen.len() < 2
        })
        .await
        .expect("遍历");
    assert_eq!(visited, 2);
    assert_eq!(seen, vec![5, 4]);
}

#[tokio::test]
async fn test_bulk_write_queue_and_submit() {
    let (db, store) = open_db().await;
    db.create(&role("r1", 1, "alice", 0)).await.expect("插入");

    let mut bulk = db.model::<Role>().bulk_write();
    bulk.insert(&role("r2", 2, "bob", 0)).expect("排队插入");
    bulk.update(&role("r1", 7, "", 0)).expect("排队更新");
    bulk.delete_where("name = ?", args!["bob"]).expect("排队删除");
    assert_eq!(bulk.size(), 3);
    assert!(bulk.describe().contains("\"size\":3"));

    let outcome = bulk.submit().await.expect("提交");
    assert_eq!(outcome.inserted_count, 1);
    assert_eq!(outcome.matched_count, 1);
    assert_eq!(outcome.deleted_count, 1);
    assert_eq!(bulk.size(), 0);
    assert_eq!(bulk.result(), Some(&outcome));

    let stored = store.documents("game.role");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].get_i64("lv").expect("lv"), 7);
    assert_eq!(stored[0].get_str("name").expect("name"), "alice");
}

#[tokio::test]
async fn test_bulk_write_update_filter_and_save() {
    let (db, store) = open_db().await;
    let mut bulk = db.bulk_write();
    bulk.warmup(true).set_update_filter(|mut update| {
        update.insert("$inc", doc! { "version": 1 });
        update
    });
    bulk.save(&role("r1", 0, "zero", 0)).expect("排队保存");
    bulk.submit().await.expect("提交");

    let stored = store.documents("game.role");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].get_i64("lv").expect("lv"), 0);
    assert_eq!(stored[0].get_i32("version").expect("version"), 1);
}

#[tokio::test]
async fn test_bulk_write_requires_where() {
    let (db, _store) = open_db().await;
    let mut bulk = db.model::<Role>().bulk_write();
    let err = bulk
        .delete_where(HashMap::<String, Bson>::new(), args![])
        .err()
        .expect("应当拒绝");
    assert!(matches!(err, QuickDbError::MissingWhereClause));
}

#[tokio::test]
async fn test_migrate_creates_declared_indexes() {
    let (db, store) = open_db().await;
    db.register::<Role>().expect("登记");
    db.register::<Role>().expect("重复登记");
    db.start().await.expect("迁移");

    let indexes = store.indexes.lock().clone();
    assert_eq!(indexes.len(), Role::meta().indexes.len());
    assert_eq!(indexes[0].0, "game.role");
    assert_eq!(indexes[1].1.keys, doc! { "lv": -1 });
    assert_eq!(indexes[1].1.partial_filter, Some(doc! { "lv": { "$gt": 0 } }));
}

#[tokio::test]
async fn test_migrate_ignores_existing_index_conflicts() {
    let (db, store) = open_db().await;
    *store.index_error_code.lock() = Some(85);
    db.auto_migrate::<Role>().await.expect("冲突被忽略");

    *store.index_error_code.lock() = Some(13);
    assert!(db.auto_migrate::<Role>().await.is_err());
}

#[tokio::test]
async fn test_duplicate_key_is_returned_without_recovery() {
    let (db, store) = open_db().await;
    db.create(&role("r1", 1, "alice", 0)).await.expect("插入");
    let connects = store.connects.load(Ordering::SeqCst);

    let err = db.create(&role("r1", 1, "alice", 0)).await.expect_err("主键重复");
    assert!(err.is_business_error());
    assert_eq!(store.connects.load(Ordering::SeqCst), connects);
    assert_eq!(db.pool().metrics().recovery_attempts, 0);
}

#[tokio::test]
async fn test_table_must_be_resolvable() {
    let (db, _store) = open_db().await;
    let err = db.find_documents().await.expect_err("没有集合名");
    assert!(matches!(err, QuickDbError::TableNotSet));
}

#[tokio::test]
async fn test_chained_handles_are_independent() {
    let (db, _store) = open_db().await;
    let base = db.model::<Role>();
    let narrowed = base.eq("name", "alice");
    assert!(base.statement().query.is_empty());
    assert_eq!(narrowed.statement().query.len(), 1);

    let other = base.database("archive");
    assert_eq!(other.statement().database, "archive");
    assert_eq!(base.statement().database, "game");
}

#[test]
fn test_index_declarations() {
    let meta = Role::meta();
    assert_eq!(meta.indexes[0], IndexDefinition::new(["name"]).unique(true));
    assert_eq!(meta.collection_name, "role");
}

#[tokio::test]
async fn test_model_cache_follows_store_changes() {
    let (db, _store) = open_db().await;
    assert_ok!(db.create(&role("r1", 1, "alice", 10)).await);
    assert_ok!(db.create(&role("r2", 2, "bob", 20)).await);

    let cache = db.model_cache::<Role>();
    assert_ok!(cache.reload(0).await);
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get("r2").map(|r| r.name.clone()), Some("bob".to_string()));

    let later = cache.time() + 100;
    assert_ok!(db.create(&role("r3", 3, "carol", later)).await);
    cache.listener(CacheEvent::Create, "r3", later).await;
    assert_eq!(cache.get("r3").map(|r| r.level), Some(3));
    assert_eq!(cache.time(), later);

    cache.listener(CacheEvent::Delete, "r1", 0).await;
    assert!(!cache.has("r1"));
    assert_eq!(cache.len(), 2);
}
