//! MongoDB存储操作实现

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::{
    FindOneAndUpdateOptions, FindOneOptions, FindOptions, IndexOptions, ReturnDocument,
    UpdateOptions,
};
use mongodb::IndexModel;
use rat_logger::{debug, warn};

use super::adapter::MongoStoreClient;
use crate::adapter::{
    BulkWriteOutcome, FindSpec, IndexSpec, Namespace, StoreClient, UpdateOutcome, WriteModel,
};
use crate::error::{QuickDbError, QuickDbResult};

fn find_options(spec: FindSpec) -> FindOptions {
    let mut options = FindOptions::default();
    options.limit = spec.limit;
    options.skip = spec.skip;
    options.sort = spec.sort;
    options.projection = spec.projection;
    options
}

fn update_options(upsert: bool) -> Option<UpdateOptions> {
    if !upsert {
        return None;
    }
    let mut options = UpdateOptions::default();
    options.upsert = Some(true);
    Some(options)
}

#[async_trait]
impl StoreClient for MongoStoreClient {
    async fn ping(&self) -> QuickDbResult<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await?;
        Ok(())
    }

    async fn run_command(&self, database: &str, command: Document) -> QuickDbResult<Document> {
        Ok(self.client.database(database).run_command(command, None).await?)
    }

    async fn insert_one(&self, ns: &Namespace, document: Document) -> QuickDbResult<Bson> {
        debug!("执行MongoDB插入: {}", ns);
        let result = self.collection(ns).insert_one(document, None).await?;
        Ok(result.inserted_id)
    }

    async fn insert_many(&self, ns: &Namespace, documents: Vec<Document>) -> QuickDbResult<u64> {
        if documents.is_empty() {
            return Ok(0);
        }
        debug!("执行MongoDB批量插入: {} x{}", ns, documents.len());
        let result = self.collection(ns).insert_many(documents, None).await?;
        Ok(result.inserted_ids.len() as u64)
    }

    async fn update_one(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> QuickDbResult<UpdateOutcome> {
        debug!("执行MongoDB更新: {} 查询={:?}, 更新={:?}", ns, filter, update);
        let result = self
            .collection(ns)
            .update_one(filter, update, update_options(upsert))
            .await?;
        Ok(UpdateOutcome {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn update_many(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> QuickDbResult<UpdateOutcome> {
        debug!("执行MongoDB批量更新: {} 查询={:?}, 更新={:?}", ns, filter, update);
        let result = self
            .collection(ns)
            .update_many(filter, update, update_options(upsert))
            .await?;
        Ok(UpdateOutcome {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn find_one_and_update(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
        upsert: bool,
        projection: Option<Document>,
    ) -> QuickDbResult<Option<Document>> {
        let mut options = FindOneAndUpdateOptions::default();
        options.upsert = Some(upsert);
        options.projection = projection;
        options.return_document = Some(ReturnDocument::After);
        Ok(self
            .collection(ns)
            .find_one_and_update(filter, update, options)
            .await?)
    }

    async fn delete_one(&self, ns: &Namespace, filter: Document) -> QuickDbResult<u64> {
        let result = self.collection(ns).delete_one(filter, None).await?;
        Ok(result.deleted_count)
    }

    async fn delete_many(&self, ns: &Namespace, filter: Document) -> QuickDbResult<u64> {
        let result = self.collection(ns).delete_many(filter, None).await?;
        Ok(result.deleted_count)
    }

    async fn find(&self, ns: &Namespace, filter: Document, spec: FindSpec) -> QuickDbResult<Vec<Document>> {
        let cursor = self.collection(ns).find(filter, find_options(spec)).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_one(
        &self,
        ns: &Namespace,
        filter: Document,
        spec: FindSpec,
    ) -> QuickDbResult<Option<Document>> {
        let mut options = FindOneOptions::default();
        options.skip = spec.skip;
        options.sort = spec.sort;
        options.projection = spec.projection;
        Ok(self.collection(ns).find_one(filter, options).await?)
    }

    async fn find_each(
        &self,
        ns: &Namespace,
        filter: Document,
        spec: FindSpec,
        handle: &mut (dyn FnMut(Document) -> QuickDbResult<bool> + Send),
    ) -> QuickDbResult<u64> {
        let mut cursor = self.collection(ns).find(filter, find_options(spec)).await?;
        let mut visited = 0;
        while let Some(document) = cursor.try_next().await? {
            visited += 1;
            if !handle(document)? {
                break;
            }
        }
        Ok(visited)
    }

    async fn count_documents(&self, ns: &Namespace, filter: Document) -> QuickDbResult<u64> {
        Ok(self.collection(ns).count_documents(filter, None).await?)
    }

    async fn create_index(&self, ns: &Namespace, index: IndexSpec) -> QuickDbResult<()> {
        let mut index_options = IndexOptions::default();
        index_options.name = index.name.clone();
        index_options.unique = Some(index.unique);
        if index.sparse {
            index_options.sparse = Some(true);
        }
        index_options.partial_filter_expression = index.partial_filter;
        index_options.expire_after = index.expire_after;

        let index_model = IndexModel::builder()
            .keys(index.keys)
            .options(index_options)
            .build();

        debug!("创建MongoDB索引: {:?} 在集合 {}", index.name, ns);
        self.collection(ns).create_index(index_model, None).await?;
        Ok(())
    }

    async fn bulk_write(
        &self,
        ns: &Namespace,
        models: Vec<WriteModel>,
        ordered: bool,
    ) -> QuickDbResult<BulkWriteOutcome> {
        let collection = self.collection(ns);
        let mut outcome = BulkWriteOutcome::default();
        let mut first_error: Option<QuickDbError> = None;

        for model in models {
            let result = async {
                match model {
                    WriteModel::InsertOne { document } => {
                        collection.insert_one(document, None).await?;
                        outcome.inserted_count += 1;
                    }
                    WriteModel::UpdateOne { filter, update, upsert } => {
                        let r = collection.update_one(filter, update, update_options(upsert)).await?;
                        outcome.matched_count += r.matched_count;
                        outcome.modified_count += r.modified_count;
                        if r.upserted_id.is_some() {
                            outcome.upserted_count += 1;
                        }
                    }
                    WriteModel::UpdateMany { filter, update, upsert } => {
                        let r = collection.update_many(filter, update, update_options(upsert)).await?;
                        outcome.matched_count += r.matched_count;
                        outcome.modified_count += r.modified_count;
                        if r.upserted_id.is_some() {
                            outcome.upserted_count += 1;
                        }
                    }
                    WriteModel::DeleteOne { filter } => {
                        outcome.deleted_count += collection.delete_one(filter, None).await?.deleted_count;
                    }
                    WriteModel::DeleteMany { filter } => {
                        outcome.deleted_count += collection.delete_many(filter, None).await?.deleted_count;
                    }
                }
                Ok::<(), QuickDbError>(())
            }
            .await;

            if let Err(e) = result {
                if ordered {
                    return Err(e);
                }
                warn!("批量写入中的单个操作失败，继续执行: {}", e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }

    async fn disconnect(&self) -> QuickDbResult<()> {
        self.client.clone().shutdown().await;
        Ok(())
    }
}
