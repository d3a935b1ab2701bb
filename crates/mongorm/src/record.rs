//! Model records
//!
//! A [`Record`] is one stored document plus the schema it belongs to.
//! Reading a field the document does not hold returns the schema's nearest
//! declared default, without writing it into the document.

use crate::model::{Model, WriteOptions, WriteOutcome};
use crate::schema::Schema;
use crate::Result;
use bson::{doc, Bson, Document};
use chrono::DateTime;
use chrono_tz::Tz;
use mongodb::options::UpdateModifications;
use mongodb::results::{DeleteResult, InsertOneResult, UpdateResult};
use mongorm_common::MongormError;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

/// Options of [`Record::to_document`].
#[derive(Debug, Clone)]
pub struct ToDocumentOptions {
    /// Fill fields the record lacks from the schema defaults
    pub include_defaults: bool,
    /// Merged last, overriding stored values
    pub extras: Document,
    pub excludes: Vec<String>,
    /// When non-empty only these fields are kept and `excludes` is ignored
    pub onlys: Vec<String>,
}

impl Default for ToDocumentOptions {
    fn default() -> Self {
        Self {
            include_defaults: true,
            extras: Document::new(),
            excludes: Vec::new(),
            onlys: Vec::new(),
        }
    }
}

impl ToDocumentOptions {
    pub fn without_defaults() -> Self {
        Self {
            include_defaults: false,
            ..Self::default()
        }
    }

    pub fn extras(mut self, extras: Document) -> Self {
        self.extras = extras;
        self
    }

    pub fn exclude(mut self, field: impl Into<String>) -> Self {
        self.excludes.push(field.into());
        self
    }

    pub fn only(mut self, field: impl Into<String>) -> Self {
        self.onlys.push(field.into());
        self
    }
}

/// What [`Record::save`] did.
#[derive(Debug, Clone)]
pub enum Saved {
    Inserted(InsertOneResult),
    Updated(UpdateResult),
}

#[derive(Clone)]
pub struct Record {
    schema: Arc<Schema>,
    data: Document,
    tz: Option<Tz>,
}

impl Record {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::from_document(schema, Document::new())
    }

    pub fn from_document(schema: Arc<Schema>, data: Document) -> Self {
        Self {
            schema,
            data,
            tz: None,
        }
    }

    pub fn with_timezone(mut self, tz: Option<Tz>) -> Self {
        self.tz = tz;
        self
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn timezone(&self) -> Option<Tz> {
        self.tz
    }

    /// Stored fields only
    pub fn data(&self) -> &Document {
        &self.data
    }

    pub fn into_document(self) -> Document {
        self.data
    }

    pub fn id(&self) -> Option<&Bson> {
        self.data.get("_id")
    }

    /// Stored value, or the nearest schema default when the field is absent.
    /// A stored null is returned as is.
    pub fn get(&self, key: &str) -> Option<&Bson> {
        self.data
            .get(key)
            .or_else(|| self.schema.resolve_default(key))
    }

    /// [`Record::get`] decoded into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)
            .map(|value| bson::from_bson(value.clone()))
            .transpose()
            .map_err(Into::into)
    }

    /// Set a field and return its previous stored value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Bson>) -> Option<Bson> {
        self.data.insert(key, value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Bson> {
        self.data.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn to_document(&self, options: &ToDocumentOptions) -> Document {
        let mut doc = self.data.clone();
        if options.include_defaults {
            for (key, value) in self.schema.collect_all_defaults() {
                if !doc.contains_key(&key) {
                    doc.insert(key, value);
                }
            }
        }
        for (key, value) in &options.extras {
            doc.insert(key.clone(), value.clone());
        }

        if !options.onlys.is_empty() {
            doc.into_iter()
                .filter(|(key, _)| options.onlys.contains(key))
                .collect()
        } else {
            doc.into_iter()
                .filter(|(key, _)| !options.excludes.contains(key))
                .collect()
        }
    }

    /// Relaxed extended JSON of the record with defaults.
    pub fn to_json(&self) -> serde_json::Value {
        Bson::Document(self.to_document(&ToDocumentOptions::default())).into_relaxed_extjson()
    }

    /// Decode the record, defaults included, into `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(bson::from_document(self.to_document(&ToDocumentOptions::default()))?)
    }

    /// A datetime field in the record's timezone (UTC when it has none).
    pub fn datetime(&self, key: &str) -> Option<DateTime<Tz>> {
        match self.get(key) {
            Some(Bson::DateTime(dt)) => {
                Some(dt.to_chrono().with_timezone(&self.tz.unwrap_or(chrono_tz::UTC)))
            }
            _ => None,
        }
    }

    /// Persist the record.
    ///
    /// With an `_id` the stored document is updated with `update`, or with a
    /// `$set` of every stored field except `_id`. Without one the record is
    /// inserted with its defaults and takes the generated id.
    pub async fn save(
        &mut self,
        model: &Model,
        update: Option<UpdateModifications>,
        write: WriteOptions,
    ) -> Result<WriteOutcome<Saved>> {
        if let Some(id) = self.id().cloned() {
            let update = update.unwrap_or_else(|| {
                let mut fields = self.data.clone();
                fields.remove("_id");
                UpdateModifications::Document(doc! { "$set": fields })
            });
            let outcome = model.update_one(doc! { "_id": id }, update, write).await?;
            return Ok(outcome.map(Saved::Updated));
        }

        let outcome = model
            .insert_one(self.to_document(&ToDocumentOptions::default()), write)
            .await?;
        if let WriteOutcome::Done(result) = &outcome {
            self.data.insert("_id", result.inserted_id.clone());
        }
        Ok(outcome.map(Saved::Inserted))
    }

    /// Delete the stored document by `_id`.
    pub async fn destroy(
        &self,
        model: &Model,
        write: WriteOptions,
    ) -> Result<WriteOutcome<DeleteResult>> {
        let id = self
            .id()
            .cloned()
            .ok_or_else(|| MongormError::Validation("Record has no _id".to_string()))?;
        model.delete_one(doc! { "_id": id }, write).await
    }

    /// Entries of `doc` that differ from the stored values.
    ///
    /// `keys` restricts the comparison; when empty every key of `doc` is
    /// checked. Returns `None` if `_id` is among the checked keys.
    pub fn clean_for_dirty<S: AsRef<str>>(&self, doc: &Document, keys: &[S]) -> Option<Document> {
        let keys: Vec<&str> = if keys.is_empty() {
            doc.keys().map(String::as_str).collect()
        } else {
            keys.iter().map(AsRef::as_ref).collect()
        };

        let mut cleaned = Document::new();
        for key in keys {
            if key == "_id" {
                return None;
            }
            if let Some(value) = doc.get(key) {
                if self.data.get(key) != Some(value) {
                    cleaned.insert(key, value.clone());
                }
            }
        }
        Some(cleaned)
    }

    /// Entries of `new` that are absent from or different in `old`.
    pub fn get_fresh(new: &Document, old: &Document) -> Document {
        new.iter()
            .filter(|(key, value)| old.get(key.as_str()) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("schema", &self.schema.name())
            .field("data", &self.data)
            .field("tz", &self.tz)
            .finish()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.data)
    }
}

impl std::ops::Index<&str> for Record {
    type Output = Bson;

    /// Missing fields without a default index as null.
    fn index(&self, key: &str) -> &Bson {
        static NULL: Bson = Bson::Null;
        self.get(key).unwrap_or(&NULL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn schema() -> Arc<Schema> {
        let base = Schema::builder("Base")
            .default("status", "active")
            .default("score", 0)
            .build()
            .unwrap();
        Schema::builder("User")
            .extends(base)
            .collection("users")
            .default("role", "member")
            .build()
            .unwrap()
    }

    #[test]
    fn test_get_falls_back_to_default() {
        let record = Record::from_document(schema(), doc! { "name": "ann" });
        assert_eq!(record.get("name"), Some(&Bson::from("ann")));
        assert_eq!(record.get("status"), Some(&Bson::from("active")));
        assert_eq!(record.get("role"), Some(&Bson::from("member")));
        assert_eq!(record.get("missing"), None);
        assert_eq!(record["missing"], Bson::Null);
    }

    #[test]
    fn test_get_prefers_stored_null() {
        let record = Record::from_document(schema(), doc! { "status": Bson::Null });
        assert_eq!(record.get("status"), Some(&Bson::Null));
    }

    #[test]
    fn test_get_does_not_mutate() {
        let record = Record::new(schema());
        let _ = record.get("status");
        assert!(record.data().is_empty());
    }

    #[test]
    fn test_set_and_id() {
        let mut record = Record::new(schema());
        assert_eq!(record.id(), None);
        assert_eq!(record.set("_id", 7), None);
        assert_eq!(record.set("_id", 8), Some(Bson::Int32(7)));
        assert_eq!(record.id(), Some(&Bson::Int32(8)));
    }

    #[test]
    fn test_get_as() {
        let record = Record::from_document(schema(), doc! { "tags": ["a", "b"] });
        let tags: Option<Vec<String>> = record.get_as("tags").unwrap();
        assert_eq!(tags, Some(vec!["a".to_string(), "b".to_string()]));
        let score: Option<i32> = record.get_as("score").unwrap();
        assert_eq!(score, Some(0));
        assert!(record.get_as::<i32>("tags").is_err());
    }

    #[test]
    fn test_to_document_with_defaults() {
        let record = Record::from_document(schema(), doc! { "name": "ann", "status": "banned" });
        let doc = record.to_document(&ToDocumentOptions::default());
        assert_eq!(doc.get_str("status").unwrap(), "banned");
        assert_eq!(doc.get_str("role").unwrap(), "member");
        assert_eq!(doc.get_i32("score").unwrap(), 0);

        let bare = record.to_document(&ToDocumentOptions::without_defaults());
        assert_eq!(bare, doc! { "name": "ann", "status": "banned" });
    }

    #[test]
    fn test_to_document_extras_excludes_onlys() {
        let record = Record::from_document(schema(), doc! { "name": "ann", "secret": "x" });

        let options = ToDocumentOptions::without_defaults()
            .extras(doc! { "name": "bob", "extra": 1 })
            .exclude("secret");
        assert_eq!(
            record.to_document(&options),
            doc! { "name": "bob", "extra": 1 }
        );

        let options = ToDocumentOptions::default().only("name").only("role").exclude("name");
        assert_eq!(
            record.to_document(&options),
            doc! { "name": "ann", "role": "member" }
        );
    }

    #[test]
    fn test_to_json() {
        let record = Record::from_document(schema(), doc! { "name": "ann" });
        let json = record.to_json();
        assert_eq!(json["name"], "ann");
        assert_eq!(json["status"], "active");
    }

    #[test]
    fn test_deserialize() {
        #[derive(Debug, Deserialize)]
        struct User {
            name: String,
            status: String,
            score: i32,
        }

        let record = Record::from_document(schema(), doc! { "name": "ann" });
        let user: User = record.deserialize().unwrap();
        assert_eq!(user.name, "ann");
        assert_eq!(user.status, "active");
        assert_eq!(user.score, 0);
    }

    #[test]
    fn test_datetime_in_timezone() {
        let when = bson::DateTime::from_millis(0);
        let record = Record::from_document(schema(), doc! { "at": when, "n": 1 })
            .with_timezone(Some(chrono_tz::Asia::Shanghai));
        let local = record.datetime("at").unwrap();
        assert_eq!(local.to_rfc3339(), "1970-01-01T08:00:00+08:00");
        assert_eq!(record.datetime("n"), None);

        let utc = Record::from_document(schema(), doc! { "at": when });
        assert_eq!(utc.datetime("at").unwrap().to_rfc3339(), "1970-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_clean_for_dirty() {
        let record = Record::from_document(schema(), doc! { "a": 1, "b": 2 });
        let none: [&str; 0] = [];

        let cleaned = record
            .clean_for_dirty(&doc! { "a": 1, "b": 3, "c": 4 }, &none)
            .unwrap();
        assert_eq!(cleaned, doc! { "b": 3, "c": 4 });

        let only_a = record
            .clean_for_dirty(&doc! { "a": 5, "b": 3 }, &["a", "z"])
            .unwrap();
        assert_eq!(only_a, doc! { "a": 5 });

        assert_eq!(record.clean_for_dirty(&doc! { "_id": 1, "a": 2 }, &none), None);
    }

    #[test]
    fn test_get_fresh() {
        let fresh = Record::get_fresh(
            &doc! { "a": 1, "b": 2, "c": 3 },
            &doc! { "a": 1, "b": 5 },
        );
        assert_eq!(fresh, doc! { "b": 2, "c": 3 });
    }

    #[test]
    fn test_debug_shows_schema_name() {
        let record = Record::from_document(schema(), doc! { "a": 1 });
        let debug = format!("{:?}", record);
        assert!(debug.contains("User"));
    }
}
