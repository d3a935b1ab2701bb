//! Collection actions
//!
//! Every driver call a [`Model`](crate::Model) makes is a value implementing
//! [`CollectionAction`]. The model decides whether the action runs inside a
//! session and transaction; the action only has to forward the optional
//! session to the driver.
//!
//! Applications can implement [`CollectionAction`] for calls the model does
//! not wrap and run them with [`Model::run_for`](crate::Model::run_for).

use async_trait::async_trait;
use bson::{doc, Bson, Document, RawDocumentBuf};
use futures::TryStreamExt;
use mongodb::error::Result as DriverResult;
use mongodb::options::{
    AggregateOptions, CountOptions, CreateIndexOptions, DeleteOptions, DistinctOptions,
    DropCollectionOptions, DropIndexOptions, FindOneAndDeleteOptions, FindOneAndReplaceOptions,
    FindOneAndUpdateOptions, FindOneOptions, FindOptions, InsertManyOptions, InsertOneOptions,
    ListIndexesOptions, ReplaceOptions, UpdateModifications, UpdateOptions,
};
use mongodb::results::{DeleteResult, InsertManyResult, InsertOneResult, UpdateResult};
use mongodb::{ClientSession, Collection, IndexModel};

/// A single driver operation against one collection.
#[async_trait]
pub trait CollectionAction: Send + Sized {
    type Output: Send;

    /// Operation name used in logs
    const NAME: &'static str;

    async fn run(
        self,
        coll: &Collection<Document>,
        session: Option<&mut ClientSession>,
    ) -> DriverResult<Self::Output>;
}

/// Await a driver action, attaching the session when there is one.
macro_rules! with_session {
    ($session:expr, $action:expr) => {
        match $session {
            Some(session) => $action.session(session).await,
            None => $action.await,
        }
    };
}

/// Await a cursor-returning driver action and collect every item.
macro_rules! collect_with_session {
    ($session:expr, $action:expr) => {
        match $session {
            Some(session) => {
                let mut cursor = $action.session(&mut *session).await?;
                cursor.stream(session).try_collect().await
            }
            None => $action.await?.try_collect().await,
        }
    };
}

#[derive(Debug, Clone)]
pub struct InsertOne {
    pub doc: Document,
    pub options: Option<InsertOneOptions>,
}

#[async_trait]
impl CollectionAction for InsertOne {
    type Output = InsertOneResult;
    const NAME: &'static str = "insert_one";

    async fn run(
        self,
        coll: &Collection<Document>,
        session: Option<&mut ClientSession>,
    ) -> DriverResult<Self::Output> {
        with_session!(session, coll.insert_one(self.doc).with_options(self.options))
    }
}

#[derive(Debug, Clone)]
pub struct InsertMany {
    pub docs: Vec<Document>,
    pub options: Option<InsertManyOptions>,
}

#[async_trait]
impl CollectionAction for InsertMany {
    type Output = InsertManyResult;
    const NAME: &'static str = "insert_many";

    async fn run(
        self,
        coll: &Collection<Document>,
        session: Option<&mut ClientSession>,
    ) -> DriverResult<Self::Output> {
        with_session!(session, coll.insert_many(self.docs).with_options(self.options))
    }
}

#[derive(Debug, Clone)]
pub struct UpdateOne {
    pub filter: Document,
    pub update: UpdateModifications,
    pub options: Option<UpdateOptions>,
}

#[async_trait]
impl CollectionAction for UpdateOne {
    type Output = UpdateResult;
    const NAME: &'static str = "update_one";

    async fn run(
        self,
        coll: &Collection<Document>,
        session: Option<&mut ClientSession>,
    ) -> DriverResult<Self::Output> {
        with_session!(
            session,
            coll.update_one(self.filter, self.update).with_options(self.options)
        )
    }
}

#[derive(Debug, Clone)]
pub struct UpdateMany {
    pub filter: Document,
    pub update: UpdateModifications,
    pub options: Option<UpdateOptions>,
}

#[async_trait]
impl CollectionAction for UpdateMany {
    type Output = UpdateResult;
    const NAME: &'static str = "update_many";

    async fn run(
        self,
        coll: &Collection<Document>,
        session: Option<&mut ClientSession>,
    ) -> DriverResult<Self::Output> {
        with_session!(
            session,
            coll.update_many(self.filter, self.update).with_options(self.options)
        )
    }
}

#[derive(Debug, Clone)]
pub struct ReplaceOne {
    pub filter: Document,
    pub replacement: Document,
    pub options: Option<ReplaceOptions>,
}

#[async_trait]
impl CollectionAction for ReplaceOne {
    type Output = UpdateResult;
    const NAME: &'static str = "replace_one";

    async fn run(
        self,
        coll: &Collection<Document>,
        session: Option<&mut ClientSession>,
    ) -> DriverResult<Self::Output> {
        with_session!(
            session,
            coll.replace_one(self.filter, self.replacement)
                .with_options(self.options)
        )
    }
}

#[derive(Debug, Clone)]
pub struct DeleteOne {
    pub filter: Document,
    pub options: Option<DeleteOptions>,
}

#[async_trait]
impl CollectionAction for DeleteOne {
    type Output = DeleteResult;
    const NAME: &'static str = "delete_one";

    async fn run(
        self,
        coll: &Collection<Document>,
        session: Option<&mut ClientSession>,
    ) -> DriverResult<Self::Output> {
        with_session!(session, coll.delete_one(self.filter).with_options(self.options))
    }
}

#[derive(Debug, Clone)]
pub struct DeleteMany {
    pub filter: Document,
    pub options: Option<DeleteOptions>,
}

#[async_trait]
impl CollectionAction for DeleteMany {
    type Output = DeleteResult;
    const NAME: &'static str = "delete_many";

    async fn run(
        self,
        coll: &Collection<Document>,
        session: Option<&mut ClientSession>,
    ) -> DriverResult<Self::Output> {
        with_session!(session, coll.delete_many(self.filter).with_options(self.options))
    }
}

/// `find`, collected into memory.
#[derive(Debug, Clone, Default)]
pub struct Find {
    pub filter: Document,
    pub options: Option<FindOptions>,
}

#[async_trait]
impl CollectionAction for Find {
    type Output = Vec<Document>;
    const NAME: &'static str = "find";

    async fn run(
        self,
        coll: &Collection<Document>,
        session: Option<&mut ClientSession>,
    ) -> DriverResult<Self::Output> {
        collect_with_session!(session, coll.find(self.filter).with_options(self.options))
    }
}

/// `find` returning undecoded BSON documents.
#[derive(Debug, Clone, Default)]
pub struct FindRaw {
    pub filter: Document,
    pub options: Option<FindOptions>,
}

#[async_trait]
impl CollectionAction for FindRaw {
    type Output = Vec<RawDocumentBuf>;
    const NAME: &'static str = "find_raw_batches";

    async fn run(
        self,
        coll: &Collection<Document>,
        session: Option<&mut ClientSession>,
    ) -> DriverResult<Self::Output> {
        let raw = coll.clone_with_type::<RawDocumentBuf>();
        collect_with_session!(session, raw.find(self.filter).with_options(self.options))
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindOne {
    pub filter: Document,
    pub options: Option<FindOneOptions>,
}

#[async_trait]
impl CollectionAction for FindOne {
    type Output = Option<Document>;
    const NAME: &'static str = "find_one";

    async fn run(
        self,
        coll: &Collection<Document>,
        session: Option<&mut ClientSession>,
    ) -> DriverResult<Self::Output> {
        with_session!(session, coll.find_one(self.filter).with_options(self.options))
    }
}

#[derive(Debug, Clone)]
pub struct FindOneAndUpdate {
    pub filter: Document,
    pub update: UpdateModifications,
    pub options: Option<FindOneAndUpdateOptions>,
}

#[async_trait]
impl CollectionAction for FindOneAndUpdate {
    type Output = Option<Document>;
    const NAME: &'static str = "find_one_and_update";

    async fn run(
        self,
        coll: &Collection<Document>,
        session: Option<&mut ClientSession>,
    ) -> DriverResult<Self::Output> {
        with_session!(
            session,
            coll.find_one_and_update(self.filter, self.update)
                .with_options(self.options)
        )
    }
}

#[derive(Debug, Clone)]
pub struct FindOneAndReplace {
    pub filter: Document,
    pub replacement: Document,
    pub options: Option<FindOneAndReplaceOptions>,
}

#[async_trait]
impl CollectionAction for FindOneAndReplace {
    type Output = Option<Document>;
    const NAME: &'static str = "find_one_and_replace";

    async fn run(
        self,
        coll: &Collection<Document>,
        session: Option<&mut ClientSession>,
    ) -> DriverResult<Self::Output> {
        with_session!(
            session,
            coll.find_one_and_replace(self.filter, self.replacement)
                .with_options(self.options)
        )
    }
}

#[derive(Debug, Clone)]
pub struct FindOneAndDelete {
    pub filter: Document,
    pub options: Option<FindOneAndDeleteOptions>,
}

#[async_trait]
impl CollectionAction for FindOneAndDelete {
    type Output = Option<Document>;
    const NAME: &'static str = "find_one_and_delete";

    async fn run(
        self,
        coll: &Collection<Document>,
        session: Option<&mut ClientSession>,
    ) -> DriverResult<Self::Output> {
        with_session!(
            session,
            coll.find_one_and_delete(self.filter).with_options(self.options)
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct CountDocuments {
    pub filter: Document,
    pub options: Option<CountOptions>,
}

#[async_trait]
impl CollectionAction for CountDocuments {
    type Output = u64;
    const NAME: &'static str = "count_documents";

    async fn run(
        self,
        coll: &Collection<Document>,
        session: Option<&mut ClientSession>,
    ) -> DriverResult<Self::Output> {
        with_session!(
            session,
            coll.count_documents(self.filter).with_options(self.options)
        )
    }
}

#[derive(Debug, Clone)]
pub struct Distinct {
    pub field: String,
    pub filter: Document,
    pub options: Option<DistinctOptions>,
}

#[async_trait]
impl CollectionAction for Distinct {
    type Output = Vec<Bson>;
    const NAME: &'static str = "distinct";

    async fn run(
        self,
        coll: &Collection<Document>,
        session: Option<&mut ClientSession>,
    ) -> DriverResult<Self::Output> {
        with_session!(
            session,
            coll.distinct(&self.field, self.filter).with_options(self.options)
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct Aggregate {
    pub pipeline: Vec<Document>,
    pub options: Option<AggregateOptions>,
}

#[async_trait]
impl CollectionAction for Aggregate {
    type Output = Vec<Document>;
    const NAME: &'static str = "aggregate";

    async fn run(
        self,
        coll: &Collection<Document>,
        session: Option<&mut ClientSession>,
    ) -> DriverResult<Self::Output> {
        collect_with_session!(
            session,
            coll.aggregate(self.pipeline).with_options(self.options)
        )
    }
}

/// `aggregate` returning undecoded BSON documents.
#[derive(Debug, Clone, Default)]
pub struct AggregateRaw {
    pub pipeline: Vec<Document>,
    pub options: Option<AggregateOptions>,
}

#[async_trait]
impl CollectionAction for AggregateRaw {
    type Output = Vec<RawDocumentBuf>;
    const NAME: &'static str = "aggregate_raw_batches";

    async fn run(
        self,
        coll: &Collection<Document>,
        session: Option<&mut ClientSession>,
    ) -> DriverResult<Self::Output> {
        collect_with_session!(
            session,
            coll.aggregate(self.pipeline)
                .with_options(self.options)
                .with_type::<RawDocumentBuf>()
        )
    }
}

#[derive(Debug, Clone)]
pub struct CreateIndex {
    pub model: IndexModel,
    pub options: Option<CreateIndexOptions>,
}

#[async_trait]
impl CollectionAction for CreateIndex {
    /// Name of the created index
    type Output = String;
    const NAME: &'static str = "create_index";

    async fn run(
        self,
        coll: &Collection<Document>,
        session: Option<&mut ClientSession>,
    ) -> DriverResult<Self::Output> {
        let result = with_session!(
            session,
            coll.create_index(self.model).with_options(self.options)
        )?;
        Ok(result.index_name)
    }
}

#[derive(Debug, Clone)]
pub struct CreateIndexes {
    pub models: Vec<IndexModel>,
    pub options: Option<CreateIndexOptions>,
}

#[async_trait]
impl CollectionAction for CreateIndexes {
    type Output = Vec<String>;
    const NAME: &'static str = "create_indexes";

    async fn run(
        self,
        coll: &Collection<Document>,
        session: Option<&mut ClientSession>,
    ) -> DriverResult<Self::Output> {
        let result = with_session!(
            session,
            coll.create_indexes(self.models).with_options(self.options)
        )?;
        Ok(result.index_names)
    }
}

#[derive(Debug, Clone)]
pub struct DropIndex {
    pub name: String,
    pub options: Option<DropIndexOptions>,
}

#[async_trait]
impl CollectionAction for DropIndex {
    type Output = ();
    const NAME: &'static str = "drop_index";

    async fn run(
        self,
        coll: &Collection<Document>,
        session: Option<&mut ClientSession>,
    ) -> DriverResult<Self::Output> {
        with_session!(session, coll.drop_index(&self.name).with_options(self.options))
    }
}

#[derive(Debug, Clone, Default)]
pub struct DropIndexes {
    pub options: Option<DropIndexOptions>,
}

#[async_trait]
impl CollectionAction for DropIndexes {
    type Output = ();
    const NAME: &'static str = "drop_indexes";

    async fn run(
        self,
        coll: &Collection<Document>,
        session: Option<&mut ClientSession>,
    ) -> DriverResult<Self::Output> {
        with_session!(session, coll.drop_indexes().with_options(self.options))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListIndexes {
    pub options: Option<ListIndexesOptions>,
}

#[async_trait]
impl CollectionAction for ListIndexes {
    type Output = Vec<IndexModel>;
    const NAME: &'static str = "list_indexes";

    async fn run(
        self,
        coll: &Collection<Document>,
        session: Option<&mut ClientSession>,
    ) -> DriverResult<Self::Output> {
        collect_with_session!(session, coll.list_indexes().with_options(self.options))
    }
}

/// Drop the whole collection.
#[derive(Debug, Clone, Default)]
pub struct DropCollection {
    pub options: Option<DropCollectionOptions>,
}

#[async_trait]
impl CollectionAction for DropCollection {
    type Output = ();
    const NAME: &'static str = "drop";

    async fn run(
        self,
        coll: &Collection<Document>,
        session: Option<&mut ClientSession>,
    ) -> DriverResult<Self::Output> {
        with_session!(session, coll.drop().with_options(self.options))
    }
}

/// Rename the collection inside its database (`renameCollection`).
#[derive(Debug, Clone)]
pub struct Rename {
    pub to: String,
    pub drop_target: bool,
}

#[async_trait]
impl CollectionAction for Rename {
    type Output = ();
    const NAME: &'static str = "rename";

    async fn run(
        self,
        coll: &Collection<Document>,
        session: Option<&mut ClientSession>,
    ) -> DriverResult<Self::Output> {
        let namespace = coll.namespace();
        let command = doc! {
            "renameCollection": namespace.to_string(),
            "to": format!("{}.{}", namespace.db, self.to),
            "dropTarget": self.drop_target,
        };
        let admin = coll.client().database("admin");
        with_session!(session, admin.run_command(command))?;
        Ok(())
    }
}
