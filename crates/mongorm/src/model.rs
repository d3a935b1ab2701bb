//! Model handle
//!
//! A [`Model`] binds a [`Schema`] to a [`Connection`] and exposes the
//! collection operations for it. Every operation is a
//! [`CollectionAction`](crate::action::CollectionAction) run through
//! [`Model::run_for`], so schemas that use transactions get them everywhere.
//!
//! # Example
//! ```rust,ignore
//! let users = conn.model(user_schema);
//!
//! users.create_indexes(&[]).await?;
//! let page = users
//!     .find(FindArgs::new(doc! { "active": true }).sort("created_at desc").paginate(args))
//!     .await?;
//! ```

use crate::action::{
    Aggregate, AggregateRaw, CollectionAction, CountDocuments, CreateIndex, CreateIndexes,
    DeleteMany, DeleteOne, Distinct, DropCollection, DropIndex, DropIndexes, Find, FindOne,
    FindOneAndDelete, FindOneAndReplace, FindOneAndUpdate, FindRaw, InsertMany, InsertOne,
    ListIndexes, Rename, ReplaceOne, UpdateMany, UpdateOne,
};
use crate::connection::Connection;
use crate::pagination::{Page, PageArgs, PageOverrides, PageSource, MAX_OFFSET};
use crate::record::Record;
use crate::schema::{IndexDeclaration, Schema};
use crate::sort::{self, SortInput, SortKeys};
use crate::unique::{build_unique_filter, UniqueCheck};
use crate::validation::{get_oid, ValidatedCollectionName};
use crate::Result;
use bson::oid::ObjectId;
use bson::{doc, Bson, Document, RawDocumentBuf};
use chrono_tz::Tz;
use mongodb::change_stream::event::ChangeStreamEvent;
use mongodb::change_stream::ChangeStream;
use mongodb::options::{
    CollectionOptions, FindOneAndDeleteOptions, FindOneAndReplaceOptions,
    FindOneAndUpdateOptions, FindOptions, IndexOptions, UpdateModifications,
};
use mongodb::results::{DeleteResult, InsertManyResult, InsertOneResult, UpdateResult};
use mongodb::{Client, Collection, Database, IndexModel};
use mongorm_common::MongormError;
use std::sync::Arc;
use tracing::{debug, warn};

/// Write error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Turn driver failures into [`WriteOutcome::Failed`] instead of `Err`
    pub capture_errors: bool,
    /// Run outside any session even when the schema uses transactions
    pub no_session: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            capture_errors: true,
            no_session: false,
        }
    }
}

impl WriteOptions {
    /// Propagate failures as `Err`.
    pub fn propagate() -> Self {
        Self {
            capture_errors: false,
            ..Self::default()
        }
    }

    pub fn no_session(mut self) -> Self {
        self.no_session = true;
        self
    }
}

/// Result of a write whose errors may have been captured.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
    Done(T),
    /// Display string of the captured error
    Failed(String),
}

impl<T> WriteOutcome<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, WriteOutcome::Done(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            WriteOutcome::Done(value) => Some(value),
            WriteOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            WriteOutcome::Done(_) => None,
            WriteOutcome::Failed(message) => Some(message),
        }
    }

    pub fn into_result(self) -> std::result::Result<T, String> {
        match self {
            WriteOutcome::Done(value) => Ok(value),
            WriteOutcome::Failed(message) => Err(message),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WriteOutcome<U> {
        match self {
            WriteOutcome::Done(value) => WriteOutcome::Done(f(value)),
            WriteOutcome::Failed(message) => WriteOutcome::Failed(message),
        }
    }
}

/// Arguments of [`Model::find`].
#[derive(Debug, Clone, Default)]
pub struct FindArgs {
    pub filter: Document,
    pub sort: Option<SortInput>,
    pub projection: Option<Document>,
    pub limit: Option<i64>,
    pub skip: Option<u64>,
    pub page: PageArgs,
    pub no_session: bool,
}

impl FindArgs {
    pub fn new(filter: Document) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn sort(mut self, sort: impl Into<SortInput>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn no_session(mut self) -> Self {
        self.no_session = true;
        self
    }

    /// Apply page arguments. Limit and skip already set explicitly are kept,
    /// and zero values change nothing. Both are capped at [`MAX_OFFSET`].
    pub fn paginate(mut self, page: PageArgs) -> Self {
        if page.per_page > 0 && self.limit.is_none() {
            self.limit = Some(i64::try_from(page.per_page).unwrap_or(i64::MAX));
        }
        if page.skip > 0 && self.skip.is_none() {
            self.skip = Some(page.skip.min(MAX_OFFSET));
        }
        self.page = page;
        self
    }

    /// Paginate from request parameters named `page` and `per_page`.
    pub fn paginate_request<S: PageSource + ?Sized>(self, request: &S) -> Self {
        let page = PageArgs::from_params(
            Some("page"),
            Some("per_page"),
            PageOverrides::default(),
            request,
        );
        self.paginate(page)
    }

    fn find_options(&self) -> Result<FindOptions> {
        let mut options = FindOptions::default();
        options.sort = sort_document(self.sort.clone())?;
        options.projection = self.projection.clone();
        options.limit = self.limit;
        options.skip = self.skip;
        Ok(options)
    }
}

/// A `find_one` filter: a document, or an id matched against `_id`.
#[derive(Debug, Clone, PartialEq)]
pub enum FindOneFilter {
    Filter(Document),
    Id(Bson),
}

impl FindOneFilter {
    /// String ids that look like ObjectIds are converted, others are kept.
    pub fn into_document(self) -> Document {
        match self {
            FindOneFilter::Filter(filter) => filter,
            FindOneFilter::Id(id) => doc! { "_id": get_oid(id.clone(), true).unwrap_or(id) },
        }
    }
}

impl From<Document> for FindOneFilter {
    fn from(filter: Document) -> Self {
        FindOneFilter::Filter(filter)
    }
}

impl From<ObjectId> for FindOneFilter {
    fn from(id: ObjectId) -> Self {
        FindOneFilter::Id(Bson::ObjectId(id))
    }
}

impl From<&str> for FindOneFilter {
    fn from(id: &str) -> Self {
        FindOneFilter::Id(Bson::String(id.to_string()))
    }
}

impl From<String> for FindOneFilter {
    fn from(id: String) -> Self {
        FindOneFilter::Id(Bson::String(id))
    }
}

fn sort_document(sort: Option<SortInput>) -> Result<Option<Document>> {
    sort::get_sort(sort, false)?
        .as_ref()
        .map(SortKeys::to_sort_document)
        .transpose()
}

/// Schema bound to a connection.
#[derive(Debug, Clone)]
pub struct Model {
    schema: Arc<Schema>,
    connection: Connection,
}

impl Model {
    pub fn new(schema: Arc<Schema>, connection: Connection) -> Self {
        Self { schema, connection }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn client(&self) -> &Client {
        self.connection.client()
    }

    pub fn database(&self) -> Result<Database> {
        self.connection.database_for(&self.schema)
    }

    /// The schema's own collection.
    pub fn collection(&self) -> Result<Collection<Document>> {
        let name = self.schema.require_collection()?;
        Ok(self.database()?.collection(name))
    }

    pub fn collection_with_options(
        &self,
        options: CollectionOptions,
    ) -> Result<Collection<Document>> {
        let name = self.schema.require_collection()?;
        Ok(self.database()?.collection_with_options(name, options))
    }

    pub fn get_tzinfo(&self) -> Result<Option<Tz>> {
        self.connection.timezone_for(&self.schema)
    }

    pub fn get_all_defaults(&self) -> Document {
        self.schema.collect_all_defaults()
    }

    pub fn get_sort(&self, sort: Option<SortInput>) -> Result<Option<SortKeys>> {
        sort::get_sort(sort, false)
    }

    /// Uniqueness filter over `fields`, or over the schema's own unique
    /// field groups when `fields` is empty.
    pub fn get_uniq_spec<S: AsRef<str>>(&self, fields: &[S], doc: &Document) -> Option<Document> {
        if fields.is_empty() {
            build_unique_filter(self.schema.unique_fields(), doc)
        } else {
            build_unique_filter(fields, doc)
        }
    }

    /// Empty record carrying this model's schema and timezone.
    pub fn new_record(&self) -> Result<Record> {
        self.record(Document::new())
    }

    pub fn record(&self, doc: Document) -> Result<Record> {
        Ok(Record::from_document(self.schema.clone(), doc).with_timezone(self.get_tzinfo()?))
    }

    /// Whether [`Model::run_for`] opens a transaction.
    pub fn is_transactional(&self, no_session: bool) -> bool {
        !no_session && self.schema.uses_transactions()
    }

    /// Run an action against the collection, inside a transaction when the
    /// schema supports and uses transactions and `no_session` is not set.
    pub async fn run_for<A: CollectionAction>(
        &self,
        action: A,
        no_session: bool,
    ) -> Result<A::Output> {
        let coll = self.collection()?;
        let transactional = self.is_transactional(no_session);
        debug!(
            action = A::NAME,
            collection = %coll.namespace(),
            transactional,
            "running collection action"
        );

        if !transactional {
            return Ok(action.run(&coll, None).await?);
        }

        let mut session = self.client().start_session().await?;
        session.start_transaction().await?;

        match action.run(&coll, Some(&mut session)).await {
            Ok(output) => {
                session.commit_transaction().await?;
                Ok(output)
            }
            Err(err) => {
                if let Err(abort_err) = session.abort_transaction().await {
                    warn!(
                        action = A::NAME,
                        error = %abort_err,
                        "failed to abort transaction"
                    );
                }
                Err(err.into())
            }
        }
    }

    /// Run a write, turning its failure into [`WriteOutcome::Failed`] when
    /// `write.capture_errors` is set.
    pub async fn capture_errors<A: CollectionAction>(
        &self,
        action: A,
        write: WriteOptions,
    ) -> Result<WriteOutcome<A::Output>> {
        match self.run_for(action, write.no_session).await {
            Ok(output) => Ok(WriteOutcome::Done(output)),
            Err(err) if write.capture_errors => {
                warn!(
                    action = A::NAME,
                    schema = self.schema.name(),
                    error = %err,
                    "write failed"
                );
                Ok(WriteOutcome::Failed(err.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    // Reads

    pub async fn find(&self, args: FindArgs) -> Result<Page<Record>> {
        let tz = self.get_tzinfo()?;
        let page = self.find_raw(args).await?;
        Ok(page.map(|doc| Record::from_document(self.schema.clone(), doc).with_timezone(tz)))
    }

    /// Like [`Model::find`], keeping plain documents.
    pub async fn find_raw(&self, args: FindArgs) -> Result<Page<Document>> {
        let options = args.find_options()?;
        let action = Find {
            filter: args.filter.clone(),
            options: Some(options),
        };
        let docs = self.run_for(action, args.no_session).await?;
        let count = CountDocuments {
            filter: args.filter,
            options: None,
        };
        let total = self.run_for(count, args.no_session).await?;
        Ok(Page::new(docs, total, args.page))
    }

    pub async fn find_raw_batches(&self, args: FindArgs) -> Result<Vec<RawDocumentBuf>> {
        let action = FindRaw {
            options: Some(args.find_options()?),
            filter: args.filter,
        };
        self.run_for(action, args.no_session).await
    }

    pub async fn find_one(&self, filter: impl Into<FindOneFilter>) -> Result<Option<Record>> {
        match self.find_one_raw(filter).await? {
            Some(doc) => self.record(doc).map(Some),
            None => Ok(None),
        }
    }

    pub async fn find_one_raw(&self, filter: impl Into<FindOneFilter>) -> Result<Option<Document>> {
        let action = FindOne {
            filter: filter.into().into_document(),
            options: None,
        };
        self.run_for(action, false).await
    }

    pub async fn find_one_and_update(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
        sort: Option<SortInput>,
        options: Option<FindOneAndUpdateOptions>,
    ) -> Result<Option<Document>> {
        let mut options = options.unwrap_or_default();
        if let Some(sort) = sort_document(sort)? {
            options.sort = Some(sort);
        }
        let action = FindOneAndUpdate {
            filter,
            update: update.into(),
            options: Some(options),
        };
        self.run_for(action, false).await
    }

    pub async fn find_one_and_replace(
        &self,
        filter: Document,
        replacement: Document,
        sort: Option<SortInput>,
        options: Option<FindOneAndReplaceOptions>,
    ) -> Result<Option<Document>> {
        let mut options = options.unwrap_or_default();
        if let Some(sort) = sort_document(sort)? {
            options.sort = Some(sort);
        }
        let action = FindOneAndReplace {
            filter,
            replacement,
            options: Some(options),
        };
        self.run_for(action, false).await
    }

    pub async fn find_one_and_delete(
        &self,
        filter: Document,
        sort: Option<SortInput>,
        options: Option<FindOneAndDeleteOptions>,
    ) -> Result<Option<Document>> {
        let mut options = options.unwrap_or_default();
        if let Some(sort) = sort_document(sort)? {
            options.sort = Some(sort);
        }
        let action = FindOneAndDelete {
            filter,
            options: Some(options),
        };
        self.run_for(action, false).await
    }

    pub async fn count_documents(&self, filter: Document) -> Result<u64> {
        self.run_for(CountDocuments { filter, options: None }, false)
            .await
    }

    pub async fn distinct(&self, field: &str, filter: Document) -> Result<Vec<Bson>> {
        let action = Distinct {
            field: field.to_string(),
            filter,
            options: None,
        };
        self.run_for(action, false).await
    }

    pub async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        self.run_for(Aggregate { pipeline, options: None }, false)
            .await
    }

    pub async fn aggregate_raw_batches(
        &self,
        pipeline: Vec<Document>,
    ) -> Result<Vec<RawDocumentBuf>> {
        self.run_for(AggregateRaw { pipeline, options: None }, false)
            .await
    }

    /// Uniqueness check against stored documents.
    ///
    /// Uses the schema's own unique field groups when `fields` is empty.
    /// `exclude_id` skips the document being updated.
    pub async fn is_unique<S: AsRef<str>>(
        &self,
        fields: &[S],
        doc: &Document,
        exclude_id: Option<Bson>,
    ) -> Result<UniqueCheck> {
        let Some(mut filter) = self.get_uniq_spec(fields, doc) else {
            return Ok(UniqueCheck::Unique);
        };
        if let Some(id) = exclude_id {
            filter.insert("_id", doc! { "$ne": id });
        }

        Ok(match self.find_one_raw(filter).await? {
            Some(found) => UniqueCheck::Conflict(found),
            None => UniqueCheck::Unique,
        })
    }

    /// Open a change stream on the collection.
    ///
    /// Change streams are long-lived and never join a transaction.
    pub async fn watch(
        &self,
        pipeline: Vec<Document>,
    ) -> Result<ChangeStream<ChangeStreamEvent<Document>>> {
        let coll = self.collection()?;
        debug!(collection = %coll.namespace(), "opening change stream");
        Ok(coll.watch().pipeline(pipeline).await?)
    }

    // Writes

    pub async fn insert_one(
        &self,
        doc: Document,
        write: WriteOptions,
    ) -> Result<WriteOutcome<InsertOneResult>> {
        self.capture_errors(InsertOne { doc, options: None }, write)
            .await
    }

    pub async fn insert_many(
        &self,
        docs: Vec<Document>,
        write: WriteOptions,
    ) -> Result<WriteOutcome<InsertManyResult>> {
        self.capture_errors(InsertMany { docs, options: None }, write)
            .await
    }

    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
        write: WriteOptions,
    ) -> Result<WriteOutcome<UpdateResult>> {
        let action = UpdateOne {
            filter,
            update: update.into(),
            options: None,
        };
        self.capture_errors(action, write).await
    }

    pub async fn update_many(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
        write: WriteOptions,
    ) -> Result<WriteOutcome<UpdateResult>> {
        let action = UpdateMany {
            filter,
            update: update.into(),
            options: None,
        };
        self.capture_errors(action, write).await
    }

    pub async fn replace_one(
        &self,
        filter: Document,
        replacement: Document,
        write: WriteOptions,
    ) -> Result<WriteOutcome<UpdateResult>> {
        let action = ReplaceOne {
            filter,
            replacement,
            options: None,
        };
        self.capture_errors(action, write).await
    }

    pub async fn delete_one(
        &self,
        filter: Document,
        write: WriteOptions,
    ) -> Result<WriteOutcome<DeleteResult>> {
        self.capture_errors(DeleteOne { filter, options: None }, write)
            .await
    }

    pub async fn delete_many(
        &self,
        filter: Document,
        write: WriteOptions,
    ) -> Result<WriteOutcome<DeleteResult>> {
        self.capture_errors(DeleteMany { filter, options: None }, write)
            .await
    }

    // Indexes and collection management

    /// Create one index per key group of `keys`, parsed with the index
    /// direction table.
    pub async fn create_index(
        &self,
        keys: &str,
        options: Option<IndexOptions>,
    ) -> Result<Vec<String>> {
        let specs = sort::parse_groups(keys, true)?;
        let mut names = Vec::with_capacity(specs.len());
        for spec in specs {
            let mut model = IndexModel::builder()
                .keys(spec.to_document())
                .options(options.clone())
                .build();
            self.apply_background(&mut model);
            names.push(self.run_for(CreateIndex { model, options: None }, false).await?);
        }
        Ok(names)
    }

    /// Create the given index declarations, or the schema's own ones when
    /// `declarations` is empty.
    pub async fn create_indexes(&self, declarations: &[IndexDeclaration]) -> Result<Vec<String>> {
        let declarations = if declarations.is_empty() {
            self.schema.indexes()
        } else {
            declarations
        };

        let mut models = Vec::new();
        for declaration in declarations {
            models.extend(declaration.to_models()?);
        }
        if models.is_empty() {
            return Ok(Vec::new());
        }
        for model in &mut models {
            self.apply_background(model);
        }

        self.run_for(CreateIndexes { models, options: None }, false)
            .await
    }

    /// Set the schema's background flag unless the index options already do.
    fn apply_background(&self, model: &mut IndexModel) {
        if let Some(background) = self.schema.background_index() {
            let options = model.options.get_or_insert_with(IndexOptions::default);
            if options.background.is_none() {
                options.background = Some(background);
            }
        }
    }

    pub async fn list_indexes(&self) -> Result<Vec<IndexModel>> {
        self.run_for(ListIndexes::default(), false).await
    }

    /// Index name -> index description (`key` plus options).
    pub async fn index_information(&self) -> Result<Document> {
        let mut info = Document::new();
        for model in self.list_indexes().await? {
            let name = model
                .options
                .as_ref()
                .and_then(|options| options.name.clone())
                .ok_or_else(|| MongormError::Internal("index without a name".to_string()))?;
            info.insert(name, bson::to_document(&model)?);
        }
        Ok(info)
    }

    pub async fn drop_index(&self, name: &str) -> Result<()> {
        let action = DropIndex {
            name: name.to_string(),
            options: None,
        };
        self.run_for(action, false).await
    }

    pub async fn drop_indexes(&self) -> Result<()> {
        self.run_for(DropIndexes::default(), false).await
    }

    pub async fn drop(&self) -> Result<()> {
        self.run_for(DropCollection::default(), false).await
    }

    /// Rename the collection. The schema keeps pointing at the old name.
    pub async fn rename(&self, new_name: &str) -> Result<()> {
        let to = ValidatedCollectionName::new(new_name)?.into_string();
        self.run_for(Rename { to, drop_target: false }, false)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::{Direction, SortSpec};

    async fn model(schema: Arc<Schema>) -> Model {
        let conn = Connection::new("mongodb://localhost:27017/testdb")
            .await
            .unwrap();
        conn.model(schema)
    }

    #[test]
    fn test_write_options_default_captures() {
        let write = WriteOptions::default();
        assert!(write.capture_errors);
        assert!(!write.no_session);
        assert!(!WriteOptions::propagate().capture_errors);
        assert!(WriteOptions::default().no_session().no_session);
    }

    #[test]
    fn test_write_outcome() {
        let done: WriteOutcome<u32> = WriteOutcome::Done(1);
        assert!(done.is_done());
        assert_eq!(done.clone().map(|n| n + 1), WriteOutcome::Done(2));
        assert_eq!(done.ok(), Some(1));

        let failed: WriteOutcome<u32> = WriteOutcome::Failed("E11000 duplicate key".into());
        assert_eq!(failed.error(), Some("E11000 duplicate key"));
        assert_eq!(failed.into_result(), Err("E11000 duplicate key".to_string()));
    }

    #[test]
    fn test_paginate_fills_limit_and_skip() {
        let args = FindArgs::default().paginate(PageArgs::new(3, 20));
        assert_eq!(args.limit, Some(20));
        assert_eq!(args.skip, Some(40));
        assert_eq!(args.page.page, 3);
    }

    #[test]
    fn test_paginate_keeps_explicit_values() {
        let args = FindArgs::default()
            .limit(5)
            .skip(1)
            .paginate(PageArgs::new(3, 20));
        assert_eq!(args.limit, Some(5));
        assert_eq!(args.skip, Some(1));
    }

    #[test]
    fn test_paginate_first_page_has_no_skip() {
        let args = FindArgs::default().paginate(PageArgs::new(1, 10));
        assert_eq!(args.limit, Some(10));
        assert_eq!(args.skip, None);

        let none = FindArgs::default().paginate(PageArgs::default());
        assert_eq!(none.limit, None);
    }

    #[test]
    fn test_paginate_caps_oversized_args() {
        let args = FindArgs::default().paginate(PageArgs::new(u64::MAX, 10));
        assert_eq!(args.limit, Some(10));
        assert_eq!(args.skip, Some(MAX_OFFSET));

        let manual = PageArgs {
            page: 1,
            per_page: u64::MAX,
            skip: u64::MAX,
        };
        let args = FindArgs::default().paginate(manual);
        assert_eq!(args.limit, Some(i64::MAX));
        assert_eq!(args.skip, Some(MAX_OFFSET));
    }

    #[test]
    fn test_paginate_request() {
        let request = vec![
            ("page".to_string(), "2".to_string()),
            ("per_page".to_string(), "25".to_string()),
        ];
        let args = FindArgs::default().paginate_request(request.as_slice());
        assert_eq!(args.limit, Some(25));
        assert_eq!(args.skip, Some(25));
    }

    #[test]
    fn test_find_options_parse_sort() {
        let options = FindArgs::default()
            .sort("created_at desc, name")
            .limit(3)
            .find_options()
            .unwrap();
        assert_eq!(options.sort, Some(doc! { "created_at": -1, "name": 1 }));
        assert_eq!(options.limit, Some(3));

        let keys = SortSpec::from(vec![("age", Direction::Descending)]);
        let options = FindArgs::default().sort(keys).find_options().unwrap();
        assert_eq!(options.sort, Some(doc! { "age": -1 }));
    }

    #[test]
    fn test_find_options_reject_bad_sort() {
        assert!(FindArgs::default().sort("a hashed").find_options().is_err());
        assert!(FindArgs::default().sort("a; b").find_options().is_err());
    }

    #[test]
    fn test_find_one_filter() {
        let oid = ObjectId::new();
        assert_eq!(
            FindOneFilter::from(oid.to_hex()).into_document(),
            doc! { "_id": oid }
        );
        assert_eq!(
            FindOneFilter::from(oid).into_document(),
            doc! { "_id": oid }
        );
        assert_eq!(
            FindOneFilter::from("slug").into_document(),
            doc! { "_id": "slug" }
        );
        assert_eq!(
            FindOneFilter::from(doc! { "email": "a@b.c" }).into_document(),
            doc! { "email": "a@b.c" }
        );
    }

    #[tokio::test]
    async fn test_collection_from_own_name() {
        let schema = Schema::builder("User").collection("users").build().unwrap();
        let users = model(schema).await;
        let coll = users.collection().unwrap();
        assert_eq!(coll.name(), "users");
        assert_eq!(coll.namespace().db, "testdb");
    }

    #[tokio::test]
    async fn test_collection_missing() {
        let base = Schema::builder("Base").collection("bases").build().unwrap();
        let child = Schema::builder("Child").extends(base).build().unwrap();
        let model = model(child).await;
        assert_eq!(
            model.collection().unwrap_err(),
            MongormError::MissingCollection("Child".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_collection_is_captured_for_writes() {
        let schema = Schema::builder("Abstract").build().unwrap();
        let model = model(schema).await;

        let outcome = model
            .insert_one(doc! { "a": 1 }, WriteOptions::default())
            .await
            .unwrap();
        assert!(!outcome.is_done());
        assert_eq!(outcome.error(), Some("Schema 'Abstract' has no collection"));

        let err = model
            .insert_one(doc! { "a": 1 }, WriteOptions::propagate())
            .await
            .unwrap_err();
        assert!(matches!(err, MongormError::MissingCollection(_)));
    }

    #[tokio::test]
    async fn test_get_uniq_spec_uses_schema_groups() {
        let schema = Schema::builder("User")
            .collection("users")
            .unique("email")
            .unique("tenant_id, username")
            .build()
            .unwrap();
        let users = model(schema).await;
        let candidate = doc! { "email": "a@b.c", "username": "ann" };

        let none: [&str; 0] = [];
        assert_eq!(
            users.get_uniq_spec(&none, &candidate),
            Some(doc! { "$or": [ { "email": "a@b.c" } ] })
        );
        assert_eq!(
            users.get_uniq_spec(&["username"], &candidate),
            Some(doc! { "$or": [ { "username": "ann" } ] })
        );
    }

    #[tokio::test]
    async fn test_is_unique_without_filter_skips_query() {
        // no field present, so nothing is sent to the server
        let schema = Schema::builder("User")
            .collection("users")
            .unique("email")
            .build()
            .unwrap();
        let users = model(schema).await;
        let none: [&str; 0] = [];
        let check = users
            .is_unique(&none, &doc! { "name": "x" }, None)
            .await
            .unwrap();
        assert_eq!(check, UniqueCheck::Unique);
    }

    #[tokio::test]
    async fn test_no_session_skips_transaction() {
        let schema = Schema::builder("Ledger")
            .collection("ledger")
            .transactions(true, true)
            .build()
            .unwrap();
        let ledger = model(schema).await;
        assert!(ledger.is_transactional(false));
        assert!(!ledger.is_transactional(true));

        let plain = model(Schema::builder("Plain").collection("plain").build().unwrap()).await;
        assert!(!plain.is_transactional(false));
    }

    #[tokio::test]
    async fn test_records_carry_timezone() {
        let schema = Schema::builder("Event")
            .collection("events")
            .timezone("Asia/Shanghai")
            .build()
            .unwrap();
        let events = model(schema).await;
        assert_eq!(events.get_tzinfo().unwrap(), Some(chrono_tz::Asia::Shanghai));
        let record = events.record(doc! { "a": 1 }).unwrap();
        assert_eq!(record.timezone(), Some(chrono_tz::Asia::Shanghai));
    }

    #[tokio::test]
    async fn test_apply_background() {
        let schema = Schema::builder("S")
            .collection("s")
            .background_index(true)
            .build()
            .unwrap();
        let model = model(schema).await;

        let mut plain = IndexModel::builder().keys(doc! { "a": 1 }).build();
        model.apply_background(&mut plain);
        assert_eq!(plain.options.and_then(|o| o.background), Some(true));

        let mut explicit_options = IndexOptions::default();
        explicit_options.background = Some(false);
        let mut explicit = IndexModel::builder()
            .keys(doc! { "a": 1 })
            .options(explicit_options)
            .build();
        model.apply_background(&mut explicit);
        assert_eq!(explicit.options.and_then(|o| o.background), Some(false));
    }

    #[tokio::test]
    async fn test_create_indexes_without_declarations_is_noop() {
        let schema = Schema::builder("S").collection("s").build().unwrap();
        let model = model(schema).await;
        assert!(model.create_indexes(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_index_rejects_unknown_direction() {
        let schema = Schema::builder("S").collection("s").build().unwrap();
        let model = model(schema).await;
        let err = model.create_index("a sideways", None).await.unwrap_err();
        assert!(matches!(err, MongormError::UnknownDirection { .. }));
    }

    #[tokio::test]
    async fn test_rename_validates_name() {
        let schema = Schema::builder("S").collection("s").build().unwrap();
        let model = model(schema).await;
        assert!(matches!(
            model.rename("system.users").await,
            Err(MongormError::Validation(_))
        ));
    }
}
