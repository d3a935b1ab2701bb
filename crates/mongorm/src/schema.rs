//! Model schemas
//!
//! A [`Schema`] is the static description of a model: where it is stored,
//! which indexes and unique field groups it declares, and the default values
//! returned for fields a stored document does not carry. Schemas form an
//! explicit ancestry through [`SchemaBuilder::extends`].
//!
//! Two kinds of settings exist:
//!
//! - collection, indexes and unique field groups belong to the schema that
//!   declares them and are never inherited;
//! - database name, timezone, background-index and transaction flags are
//!   inherited, and the nearest declaring ancestor wins.
//!
//! Defaults are merged across the whole ancestry, see
//! [`Schema::collect_all_defaults`].

use crate::sort::{self, SortSpec};
use crate::validation::{ValidatedCollectionName, ValidatedFieldName};
use crate::Result;
use bson::{Bson, Document};
use chrono_tz::Tz;
use mongodb::options::IndexOptions;
use mongodb::IndexModel;
use mongorm_common::MongormError;
use std::iter;
use std::sync::Arc;

/// One declared index: a key string in the index grammar plus driver options.
#[derive(Debug, Clone)]
pub struct IndexDeclaration {
    pub keys: String,
    pub options: Option<IndexOptions>,
}

impl IndexDeclaration {
    pub fn new(keys: impl Into<String>) -> Self {
        Self {
            keys: keys.into(),
            options: None,
        }
    }

    pub fn with_options(keys: impl Into<String>, options: IndexOptions) -> Self {
        Self {
            keys: keys.into(),
            options: Some(options),
        }
    }

    pub fn key_specs(&self) -> Result<Vec<SortSpec>> {
        sort::parse_groups(&self.keys, true)
    }

    /// Driver index models, one per key group. Options are shared by all groups.
    pub fn to_models(&self) -> Result<Vec<IndexModel>> {
        Ok(self
            .key_specs()?
            .into_iter()
            .map(|spec| {
                IndexModel::builder()
                    .keys(spec.to_document())
                    .options(self.options.clone())
                    .build()
            })
            .collect())
    }
}

impl From<&str> for IndexDeclaration {
    fn from(keys: &str) -> Self {
        IndexDeclaration::new(keys)
    }
}

impl From<(&str, IndexOptions)> for IndexDeclaration {
    fn from((keys, options): (&str, IndexOptions)) -> Self {
        IndexDeclaration::with_options(keys, options)
    }
}

/// Immutable model schema. Build with [`Schema::builder`].
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    collection: Option<ValidatedCollectionName>,
    dbname: Option<String>,
    defaults: Document,
    indexes: Vec<IndexDeclaration>,
    unique_fields: Vec<String>,
    timezone: Option<String>,
    background_index: Option<bool>,
    support_transaction: Option<bool>,
    use_transaction: Option<bool>,
    parent: Option<Arc<Schema>>,
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<Schema>> {
        self.parent.as_ref()
    }

    /// This schema followed by its ancestors, most-derived first.
    pub fn ancestry(&self) -> impl Iterator<Item = &Schema> {
        iter::successors(Some(self), |schema| schema.parent.as_deref())
    }

    /// Own collection name. Not inherited.
    pub fn collection_name(&self) -> Option<&str> {
        self.collection.as_ref().map(ValidatedCollectionName::as_str)
    }

    /// Own collection name, or `MissingCollection`.
    pub fn require_collection(&self) -> Result<&str> {
        self.collection_name()
            .ok_or_else(|| MongormError::MissingCollection(self.name.clone()))
    }

    /// Own index declarations. Not inherited.
    pub fn indexes(&self) -> &[IndexDeclaration] {
        &self.indexes
    }

    /// Own unique field groups. Not inherited.
    pub fn unique_fields(&self) -> &[String] {
        &self.unique_fields
    }

    /// Defaults declared by this schema only.
    pub fn own_defaults(&self) -> &Document {
        &self.defaults
    }

    pub fn dbname(&self) -> Option<&str> {
        self.ancestry().find_map(|s| s.dbname.as_deref())
    }

    pub fn timezone_name(&self) -> Option<&str> {
        self.ancestry().find_map(|s| s.timezone.as_deref())
    }

    pub fn timezone(&self) -> Option<Tz> {
        // names are checked in build()
        self.timezone_name().and_then(|name| name.parse().ok())
    }

    pub fn background_index(&self) -> Option<bool> {
        self.ancestry().find_map(|s| s.background_index)
    }

    pub fn supports_transaction(&self) -> bool {
        self.ancestry()
            .find_map(|s| s.support_transaction)
            .unwrap_or(false)
    }

    pub fn use_transaction(&self) -> bool {
        self.ancestry()
            .find_map(|s| s.use_transaction)
            .unwrap_or(false)
    }

    /// Operations run inside a transaction only when both flags are set.
    pub fn uses_transactions(&self) -> bool {
        self.supports_transaction() && self.use_transaction()
    }

    /// Nearest declared default for `key`.
    ///
    /// Only each ancestor's own defaults are consulted; the first ancestor
    /// that declares the key wins.
    pub fn resolve_default(&self, key: &str) -> Option<&Bson> {
        self.ancestry().find_map(|s| s.defaults.get(key))
    }

    /// Every default across the ancestry. A descendant's value for a key
    /// overrides its ancestors', other ancestor keys are kept.
    pub fn collect_all_defaults(&self) -> Document {
        let mut all = Document::new();
        for schema in self.ancestry() {
            for (key, value) in &schema.defaults {
                if !all.contains_key(key) {
                    all.insert(key.clone(), value.clone());
                }
            }
        }
        all
    }
}

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| MongormError::Validation(format!("Unknown timezone: '{}'", name)))
}

/// Builder for [`Schema`].
///
/// ```ignore
/// let base = Schema::builder("Base")
///     .dbname("app")
///     .default("status", "active")
///     .build()?;
///
/// let user = Schema::builder("User")
///     .extends(base)
///     .collection("users")
///     .index("email")
///     .index("tenant_id, created_at desc")
///     .unique("email")
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    collection: Option<String>,
    dbname: Option<String>,
    defaults: Document,
    indexes: Vec<IndexDeclaration>,
    unique_fields: Vec<String>,
    timezone: Option<String>,
    background_index: Option<bool>,
    support_transaction: Option<bool>,
    use_transaction: Option<bool>,
    parent: Option<Arc<Schema>>,
}

impl SchemaBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: None,
            dbname: None,
            defaults: Document::new(),
            indexes: Vec::new(),
            unique_fields: Vec::new(),
            timezone: None,
            background_index: None,
            support_transaction: None,
            use_transaction: None,
            parent: None,
        }
    }

    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    pub fn dbname(mut self, name: impl Into<String>) -> Self {
        self.dbname = Some(name.into());
        self
    }

    pub fn default(mut self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    pub fn defaults(mut self, defaults: Document) -> Self {
        for (key, value) in defaults {
            self.defaults.insert(key, value);
        }
        self
    }

    pub fn index(mut self, keys: impl Into<String>) -> Self {
        self.indexes.push(IndexDeclaration::new(keys));
        self
    }

    pub fn index_with(mut self, keys: impl Into<String>, options: IndexOptions) -> Self {
        self.indexes.push(IndexDeclaration::with_options(keys, options));
        self
    }

    /// Add a unique field group, e.g. `"email"` or `"tenant_id, username"`.
    pub fn unique(mut self, fields: impl Into<String>) -> Self {
        self.unique_fields.push(fields.into());
        self
    }

    pub fn timezone(mut self, name: impl Into<String>) -> Self {
        self.timezone = Some(name.into());
        self
    }

    pub fn background_index(mut self, background: bool) -> Self {
        self.background_index = Some(background);
        self
    }

    pub fn transactions(mut self, support: bool, use_transaction: bool) -> Self {
        self.support_transaction = Some(support);
        self.use_transaction = Some(use_transaction);
        self
    }

    pub fn extends(mut self, parent: Arc<Schema>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Validate the declarations and freeze the schema.
    pub fn build(self) -> Result<Arc<Schema>> {
        let collection = self
            .collection
            .as_deref()
            .map(ValidatedCollectionName::new)
            .transpose()?;

        for key in self.defaults.keys() {
            ValidatedFieldName::new(key)?;
        }

        for group in &self.unique_fields {
            for field in crate::unique::group_fields(group) {
                ValidatedFieldName::new(field)?;
            }
        }

        for declaration in &self.indexes {
            declaration.key_specs()?;
        }

        if let Some(name) = &self.timezone {
            parse_timezone(name)?;
        }

        Ok(Arc::new(Schema {
            name: self.name,
            collection,
            dbname: self.dbname,
            defaults: self.defaults,
            indexes: self.indexes,
            unique_fields: self.unique_fields,
            timezone: self.timezone,
            background_index: self.background_index,
            support_transaction: self.support_transaction,
            use_transaction: self.use_transaction,
            parent: self.parent,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn three_levels() -> Arc<Schema> {
        let base = Schema::builder("Base")
            .default("a", 1)
            .default("shared", "base")
            .dbname("app")
            .timezone("UTC")
            .build()
            .unwrap();
        let middle = Schema::builder("Middle")
            .extends(base)
            .default("b", 2)
            .default("shared", "middle")
            .transactions(true, false)
            .build()
            .unwrap();
        Schema::builder("Leaf")
            .extends(middle)
            .collection("leaves")
            .default("c", 3)
            .build()
            .unwrap()
    }

    #[test]
    fn test_ancestry_order() {
        let leaf = three_levels();
        let names: Vec<&str> = leaf.ancestry().map(Schema::name).collect();
        assert_eq!(names, vec!["Leaf", "Middle", "Base"]);
    }

    #[test]
    fn test_resolve_default_from_parent() {
        let parent = Schema::builder("Parent")
            .default("status", "active")
            .build()
            .unwrap();
        let child = Schema::builder("Child")
            .extends(parent.clone())
            .build()
            .unwrap();
        assert_eq!(child.resolve_default("status"), Some(&Bson::from("active")));

        let overriding = Schema::builder("Overriding")
            .extends(parent)
            .default("status", "pending")
            .build()
            .unwrap();
        assert_eq!(
            overriding.resolve_default("status"),
            Some(&Bson::from("pending"))
        );
    }

    #[test]
    fn test_resolve_default_absent() {
        let leaf = three_levels();
        assert_eq!(leaf.resolve_default("missing"), None);
    }

    #[test]
    fn test_resolve_default_keeps_declared_null() {
        let schema = Schema::builder("S")
            .default("deleted_at", Bson::Null)
            .build()
            .unwrap();
        assert_eq!(schema.resolve_default("deleted_at"), Some(&Bson::Null));
    }

    #[test]
    fn test_collect_all_defaults() {
        let leaf = three_levels();
        let all = leaf.collect_all_defaults();
        assert_eq!(all.get_i32("a").unwrap(), 1);
        assert_eq!(all.get_i32("b").unwrap(), 2);
        assert_eq!(all.get_i32("c").unwrap(), 3);
        assert_eq!(all.get_str("shared").unwrap(), "middle");
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_collection_is_not_inherited() {
        let parent = Schema::builder("Parent")
            .collection("parents")
            .index("name")
            .unique("name")
            .build()
            .unwrap();
        let child = Schema::builder("Child").extends(parent).build().unwrap();

        assert_eq!(child.collection_name(), None);
        assert!(child.indexes().is_empty());
        assert!(child.unique_fields().is_empty());
        assert_eq!(
            child.require_collection(),
            Err(MongormError::MissingCollection("Child".to_string()))
        );
    }

    #[test]
    fn test_inherited_settings() {
        let leaf = three_levels();
        assert_eq!(leaf.dbname(), Some("app"));
        assert_eq!(leaf.timezone(), Some(chrono_tz::UTC));
        assert!(leaf.supports_transaction());
        assert!(!leaf.use_transaction());
        assert!(!leaf.uses_transactions());
        assert_eq!(leaf.background_index(), None);
    }

    #[test]
    fn test_nearest_ancestor_setting_wins() {
        let parent = Schema::builder("Parent")
            .transactions(true, true)
            .background_index(true)
            .build()
            .unwrap();
        let child = Schema::builder("Child")
            .extends(parent)
            .background_index(false)
            .build()
            .unwrap();
        assert!(child.uses_transactions());
        assert_eq!(child.background_index(), Some(false));
    }

    #[test]
    fn test_build_rejects_bad_declarations() {
        assert!(Schema::builder("S").collection("system.x").build().is_err());
        assert!(Schema::builder("S").default("$bad", 1).build().is_err());
        assert!(Schema::builder("S").unique("email, $bad").build().is_err());
        assert!(Schema::builder("S").index("a sideways").build().is_err());
        assert!(Schema::builder("S").timezone("Mars/Olympus").build().is_err());
    }

    #[test]
    fn test_index_declaration_models() {
        let declaration = IndexDeclaration::new("email; location geosphere");
        let models = declaration.to_models().unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].keys, doc! { "email": 1 });
        assert_eq!(models[1].keys, doc! { "location": "2dsphere" });
    }

    #[test]
    fn test_index_declaration_keeps_options() {
        let mut options = IndexOptions::default();
        options.unique = Some(true);
        let declaration: IndexDeclaration = ("email desc", options).into();
        let models = declaration.to_models().unwrap();
        assert_eq!(models[0].keys, doc! { "email": -1 });
        assert_eq!(models[0].options.as_ref().and_then(|o| o.unique), Some(true));
    }

    #[test]
    fn test_parse_timezone() {
        assert_eq!(
            parse_timezone("Asia/Shanghai").unwrap(),
            chrono_tz::Asia::Shanghai
        );
        assert!(matches!(
            parse_timezone("Nowhere/Town"),
            Err(MongormError::Validation(_))
        ));
    }
}
