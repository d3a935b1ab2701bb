//! Uniqueness filters over unique field groups

use bson::{doc, Bson, Document};

/// Outcome of a uniqueness check against the collection.
#[derive(Debug, Clone, PartialEq)]
pub enum UniqueCheck {
    Unique,
    /// The stored document that clashes with the candidate
    Conflict(Document),
}

impl UniqueCheck {
    pub fn is_unique(&self) -> bool {
        matches!(self, UniqueCheck::Unique)
    }

    pub fn conflict(&self) -> Option<&Document> {
        match self {
            UniqueCheck::Unique => None,
            UniqueCheck::Conflict(doc) => Some(doc),
        }
    }
}

/// Field names of one comma-separated group. A direction token after a
/// field name is ignored.
pub fn group_fields(group: &str) -> impl Iterator<Item = &str> {
    group
        .split(',')
        .filter_map(|item| item.split_whitespace().next())
}

/// Build `{"$or": [...]}` with one sub-filter per field group.
///
/// A group contributes only when the candidate holds every one of its
/// fields; the sub-filter then matches all of them. Other groups are
/// dropped, and `None` is returned when no group is left.
pub fn build_unique_filter<S: AsRef<str>>(
    field_groups: &[S],
    candidate: &Document,
) -> Option<Document> {
    let specs: Vec<Bson> = field_groups
        .iter()
        .filter_map(|group| {
            let spec: Document = group_fields(group.as_ref())
                .map(|field| {
                    let value = candidate.get(field)?;
                    Some((field.to_string(), value.clone()))
                })
                .collect::<Option<_>>()?;
            (!spec.is_empty()).then_some(Bson::Document(spec))
        })
        .collect();

    if specs.is_empty() {
        None
    } else {
        Some(doc! { "$or": specs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_group_with_missing_field() {
        let candidate = doc! { "email": "x@y.com", "tenant_id": "t1" };
        let filter = build_unique_filter(&["email", "username,tenant_id"], &candidate).unwrap();
        assert_eq!(filter, doc! { "$or": [ { "email": "x@y.com" } ] });
    }

    #[test]
    fn test_partial_group_alone_is_none() {
        let candidate = doc! { "tenant_id": "t1" };
        assert_eq!(build_unique_filter(&["tenant_id, username"], &candidate), None);
    }

    #[test]
    fn test_group_is_conjunction_of_its_fields() {
        let candidate = doc! { "username": "ann", "tenant_id": "t1" };
        let filter = build_unique_filter(&["email", "username, tenant_id"], &candidate).unwrap();
        assert_eq!(
            filter,
            doc! { "$or": [ { "username": "ann", "tenant_id": "t1" } ] }
        );
    }

    #[test]
    fn test_no_groups_is_none() {
        let groups: [&str; 0] = [];
        assert_eq!(build_unique_filter(&groups, &doc! { "a": 1 }), None);
    }

    #[test]
    fn test_no_present_fields_is_none() {
        assert_eq!(
            build_unique_filter(&["missing_field"], &doc! { "other": 1 }),
            None
        );
    }

    #[test]
    fn test_direction_tokens_ignored() {
        let filter = build_unique_filter(&["email desc"], &doc! { "email": "a@b.c" }).unwrap();
        assert_eq!(filter, doc! { "$or": [ { "email": "a@b.c" } ] });
    }

    #[test]
    fn test_null_value_counts_as_present() {
        let filter = build_unique_filter(&["email"], &doc! { "email": Bson::Null }).unwrap();
        assert_eq!(filter, doc! { "$or": [ { "email": Bson::Null } ] });
    }

    #[test]
    fn test_group_fields() {
        let fields: Vec<&str> = group_fields(" a , b desc,, c ").collect();
        assert_eq!(fields, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unique_check() {
        assert!(UniqueCheck::Unique.is_unique());
        let conflict = UniqueCheck::Conflict(doc! { "_id": 1 });
        assert!(!conflict.is_unique());
        assert_eq!(conflict.conflict(), Some(&doc! { "_id": 1 }));
    }
}
