use serde::Serialize;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::FromRow;
use uuid::Uuid;

use crate::database::repository::RepoError;

/// Server-assigned columns. Present on every entity, never writable through
/// create or update payloads.
pub const SYSTEM_COLUMNS: &[&str] = &["id", "created", "updated", "is_deleted"];

/// A many-to-many relation carried through a join table. Updates replace the
/// full membership set, never merge.
#[derive(Debug)]
pub struct RelationDef {
    pub name: &'static str,
    pub join_table: &'static str,
    pub local_key: &'static str,
    pub foreign_key: &'static str,
}

/// A persistable domain record. The column and relation sets declared here
/// bound what payloads may touch; everything else is rejected before SQL is
/// built.
pub trait Entity: for<'r> FromRow<'r, PgRow> + Serialize + Send + Unpin {
    const TABLE: &'static str;

    /// Writable scalar columns.
    const COLUMNS: &'static [&'static str];

    /// Fields eligible for substring search.
    const SEARCHABLE: &'static [&'static str] = &[];

    const RELATIONS: &'static [RelationDef] = &[];

    fn id(&self) -> Uuid;
}

/// Validated partial write: scalar field assignments plus optional full
/// relation replacements, checked against the entity's declared sets.
#[derive(Debug, Default)]
pub struct Patch {
    fields: Vec<(String, Value)>,
    relations: Vec<(&'static RelationDef, Vec<Uuid>)>,
}

impl Patch {
    /// Split a JSON object payload into scalar assignments and relation
    /// replacements. Null values mean "leave unchanged" and are dropped;
    /// unknown or server-assigned fields are rejected.
    pub fn parse<T: Entity>(payload: Value) -> Result<Patch, RepoError> {
        let Value::Object(map) = payload else {
            return Err(RepoError::InvalidValue {
                field: "payload".to_string(),
                detail: "expected a JSON object".to_string(),
            });
        };

        let mut patch = Patch::default();
        for (key, value) in map {
            if key == "related_objects" {
                patch.parse_relations::<T>(value)?;
                continue;
            }
            if SYSTEM_COLUMNS.contains(&key.as_str()) {
                return Err(RepoError::SystemField(key));
            }
            if !T::COLUMNS.contains(&key.as_str()) {
                return Err(RepoError::UnknownField(key));
            }
            if value.is_null() {
                continue;
            }
            patch.fields.push((key, value));
        }
        Ok(patch)
    }

    fn parse_relations<T: Entity>(&mut self, value: Value) -> Result<(), RepoError> {
        let Value::Object(map) = value else {
            return Err(RepoError::InvalidValue {
                field: "related_objects".to_string(),
                detail: "expected a map of relation name to id list".to_string(),
            });
        };

        for (name, ids) in map {
            let relation = T::RELATIONS
                .iter()
                .find(|r| r.name == name)
                .ok_or_else(|| RepoError::UnknownRelation(name.clone()))?;

            let Value::Array(items) = ids else {
                return Err(RepoError::InvalidValue {
                    field: name,
                    detail: "expected a list of ids".to_string(),
                });
            };

            let mut parsed = Vec::with_capacity(items.len());
            for item in items {
                let id = item
                    .as_str()
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .ok_or_else(|| RepoError::InvalidValue {
                        field: name.clone(),
                        detail: "relation ids must be uuids".to_string(),
                    })?;
                parsed.push(id);
            }
            self.relations.push((relation, parsed));
        }
        Ok(())
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn relations(&self) -> &[(&'static RelationDef, Vec<Uuid>)] {
        &self.relations
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.relations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::Event;
    use crate::models::user::User;
    use serde_json::json;

    #[test]
    fn parses_known_scalar_fields() {
        let patch = Patch::parse::<User>(json!({
            "email": "a@b.com",
            "is_verified": true,
        }))
        .unwrap();
        assert_eq!(patch.fields().len(), 2);
        assert!(patch.relations().is_empty());
    }

    #[test]
    fn rejects_unknown_field() {
        let err = Patch::parse::<User>(json!({ "favourite_colour": "red" })).unwrap_err();
        assert!(matches!(err, RepoError::UnknownField(f) if f == "favourite_colour"));
    }

    #[test]
    fn rejects_server_assigned_fields() {
        for field in ["id", "created", "updated", "is_deleted"] {
            let err = Patch::parse::<User>(json!({ field: "x" })).unwrap_err();
            assert!(matches!(err, RepoError::SystemField(_)), "field: {}", field);
        }
    }

    #[test]
    fn phone_number_is_a_writable_column() {
        let patch = Patch::parse::<User>(json!({ "phone_number": "+2348012345678" })).unwrap();
        assert_eq!(patch.fields().len(), 1);
    }

    #[test]
    fn null_values_are_dropped() {
        let patch = Patch::parse::<User>(json!({ "email": null })).unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn parses_declared_relation() {
        let id = Uuid::new_v4();
        let patch = Patch::parse::<Event>(json!({
            "name": "Rust Conf",
            "related_objects": { "tags": [id.to_string()] },
        }))
        .unwrap();
        assert_eq!(patch.relations().len(), 1);
        let (relation, ids) = &patch.relations()[0];
        assert_eq!(relation.join_table, "event_tag");
        assert_eq!(ids, &vec![id]);
    }

    #[test]
    fn rejects_undeclared_relation() {
        let err = Patch::parse::<User>(json!({
            "related_objects": { "tags": [] },
        }))
        .unwrap_err();
        assert!(matches!(err, RepoError::UnknownRelation(r) if r == "tags"));
    }

    #[test]
    fn rejects_non_uuid_relation_ids() {
        let err = Patch::parse::<Event>(json!({
            "related_objects": { "tags": ["not-a-uuid"] },
        }))
        .unwrap_err();
        assert!(matches!(err, RepoError::InvalidValue { .. }));
    }
}
