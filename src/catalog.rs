//! Model relationship catalog: per model, its singular and list relation fields.
//! Built once from the resolved model and shared read-only (`Arc<RelationCatalog>`).

use crate::config::{KeyHolder, RelationKind, ResolvedModel};
use std::collections::HashMap;

/// Foreign key backing a relation, with both column names resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignKey {
    pub holder: KeyHolder,
    /// Column on the holder side.
    pub column: String,
    /// Referenced column on the other side.
    pub references: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationField {
    pub name: String,
    pub target_model: String,
    pub is_unique: bool,
    /// Unique scalar fields of the target model.
    pub unique_field_names: Vec<String>,
    /// Identifier field of the target model.
    pub target_key: String,
    pub foreign_key: Option<ForeignKey>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelationCatalogEntry {
    pub singular: Vec<RelationField>,
    pub list: Vec<RelationField>,
}

impl RelationCatalogEntry {
    pub fn field(&self, name: &str) -> Option<(&RelationField, RelationKind)> {
        if let Some(f) = self.singular.iter().find(|f| f.name == name) {
            return Some((f, RelationKind::Singular));
        }
        self.list
            .iter()
            .find(|f| f.name == name)
            .map(|f| (f, RelationKind::List))
    }

    pub fn is_empty(&self) -> bool {
        self.singular.is_empty() && self.list.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct RelationCatalog {
    entries: HashMap<String, RelationCatalogEntry>,
}

impl RelationCatalog {
    pub fn from_model(model: &ResolvedModel) -> Self {
        let mut entries = HashMap::with_capacity(model.entities.len());
        for entity in &model.entities {
            let mut entry = RelationCatalogEntry::default();
            for rel in &entity.relations {
                // validated: every target exists
                let Some(target) = model.entity(&rel.target) else {
                    continue;
                };
                let foreign_key = rel.foreign_key.as_ref().map(|fk| ForeignKey {
                    holder: fk.holder,
                    column: fk.column.clone(),
                    references: fk.references.clone().unwrap_or_else(|| match fk.holder {
                        KeyHolder::Local => target.pk.clone(),
                        KeyHolder::Target => entity.pk.clone(),
                    }),
                });
                let field = RelationField {
                    name: rel.name.clone(),
                    target_model: target.name.clone(),
                    is_unique: rel.unique,
                    unique_field_names: target.unique_fields.clone(),
                    target_key: target.pk.clone(),
                    foreign_key,
                };
                match rel.kind {
                    RelationKind::Singular => entry.singular.push(field),
                    RelationKind::List => entry.list.push(field),
                }
            }
            entries.insert(entity.name.clone(), entry);
        }
        tracing::debug!(models = entries.len(), "relation catalog built");
        RelationCatalog { entries }
    }

    pub fn entry(&self, model: &str) -> Option<&RelationCatalogEntry> {
        self.entries.get(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, ModelConfig};
    use serde_json::json;

    #[test]
    fn annotates_targets_with_unique_fields_and_keys() {
        let models: Vec<ModelConfig> = serde_json::from_value(json!([
            {
                "name": "post",
                "relations": [
                    {"name": "tags", "target": "tag", "kind": "list",
                     "foreignKey": {"holder": "target", "column": "postId"}},
                    {"name": "category", "target": "category", "kind": "singular",
                     "foreignKey": {"holder": "local", "column": "categoryId"}}
                ]
            },
            {"name": "tag", "unique": ["name"], "fields": [{"name": "id", "type": "uuid"}, {"name": "name", "type": "text"}]},
            {"name": "category", "plural": "categories"}
        ]))
        .unwrap();
        let catalog = RelationCatalog::from_model(&resolve(&models).unwrap());
        let entry = catalog.entry("post").unwrap();

        let (tags, kind) = entry.field("tags").unwrap();
        assert_eq!(kind, RelationKind::List);
        assert_eq!(tags.unique_field_names, vec!["name".to_string()]);
        assert_eq!(tags.foreign_key.as_ref().unwrap().references, "id");

        let (category, kind) = entry.field("category").unwrap();
        assert_eq!(kind, RelationKind::Singular);
        assert_eq!(category.target_model, "category");
        assert!(catalog.entry("tag").unwrap().is_empty());
    }
}
