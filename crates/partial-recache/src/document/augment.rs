use super::{
    Definition, Document, Field, InlineFragment, Selection, ALIAS_ENTITYCACHE_ID, ALIAS_ENTITYCACHE_TYPENAME,
    TYPENAME_FIELD,
};
use crate::{alias::RESOLUTION_ALIAS_PREFIX, error::DocumentError};

const ID_FIELD_DIRECTIVE: &str = "idField";

/// Prepares a client document for caching: every nested selection set also selects
/// the entity typename and, when one can be found, the entity id under the two
/// cache aliases. `@idField` marks the id field explicitly and is removed, otherwise
/// a field listed in `id_fields` is used.
pub fn augment_document(document: &Document, id_fields: &[String]) -> Document {
    let definitions = document
        .definitions
        .iter()
        .map(|definition| match definition {
            Definition::Operation(operation) => {
                let mut operation = operation.clone();
                // the root is not an entity, only its children are augmented
                operation.selection_set = operation
                    .selection_set
                    .iter()
                    .map(|selection| augment_selection(selection, id_fields))
                    .collect();
                Definition::Operation(operation)
            }
            Definition::Fragment(fragment) => {
                let mut fragment = fragment.clone();
                fragment.selection_set = augment_selection_set(&fragment.selection_set, id_fields);
                Definition::Fragment(fragment)
            }
        })
        .collect();

    Document { definitions }
}

fn augment_selection(selection: &Selection, id_fields: &[String]) -> Selection {
    match selection {
        Selection::Field(field) if !field.selection_set.is_empty() => Selection::Field(Field {
            selection_set: augment_selection_set(&field.selection_set, id_fields),
            ..field.clone()
        }),
        Selection::InlineFragment(fragment) => Selection::InlineFragment(InlineFragment {
            type_condition: fragment.type_condition.clone(),
            directives: fragment.directives.clone(),
            selection_set: augment_selection_set(&fragment.selection_set, id_fields),
        }),
        other => other.clone(),
    }
}

fn augment_selection_set(selections: &[Selection], id_fields: &[String]) -> Vec<Selection> {
    let annotated = selections.iter().find_map(|selection| match selection {
        Selection::Field(field)
            if field
                .directives
                .iter()
                .any(|directive| directive.name == ID_FIELD_DIRECTIVE) =>
        {
            Some(field.name.clone())
        }
        _ => None,
    });
    let id_field = annotated.or_else(|| {
        selections.iter().find_map(|selection| match selection {
            Selection::Field(field) if field.alias.is_none() && id_fields.contains(&field.name) => {
                Some(field.name.clone())
            }
            _ => None,
        })
    });

    let mut augmented = selections
        .iter()
        .map(|selection| match augment_selection(selection, id_fields) {
            Selection::Field(mut field) => {
                field.directives.retain(|directive| directive.name != ID_FIELD_DIRECTIVE);
                Selection::Field(field)
            }
            other => other,
        })
        .collect::<Vec<_>>();

    let has_alias = |alias: &str| {
        selections
            .iter()
            .any(|selection| matches!(selection, Selection::Field(field) if field.alias.as_deref() == Some(alias)))
    };

    if !has_alias(ALIAS_ENTITYCACHE_TYPENAME) {
        augmented.push(Selection::Field(Field::aliased(ALIAS_ENTITYCACHE_TYPENAME, TYPENAME_FIELD)));
    }
    if let Some(id_field) = id_field {
        if !has_alias(ALIAS_ENTITYCACHE_ID) {
            augmented.push(Selection::Field(Field::aliased(ALIAS_ENTITYCACHE_ID, id_field)));
        }
    }

    augmented
}

/// Root fields may not use the alias prefix reserved for cache resolutions.
pub fn check_alias_conventions(document: &Document) -> Result<(), DocumentError> {
    for operation in document.operations() {
        for selection in &operation.selection_set {
            if let Selection::Field(Field { alias: Some(alias), .. }) = selection {
                if alias.starts_with(RESOLUTION_ALIAS_PREFIX) {
                    return Err(DocumentError::ReservedAlias(alias.clone()));
                }
            }
        }
    }
    Ok(())
}
