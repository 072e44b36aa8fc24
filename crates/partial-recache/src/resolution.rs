use recache_config::{IdType, ResolverConfig};

use crate::{
    alias,
    document::{Field, Selection},
    entity::Id,
};

/// Root field selections fetching `ids` through `resolver`, aliased so that their
/// results can be traced back to `coordinates`.
pub fn map_resolutions<'a>(
    resolver: &ResolverConfig,
    ids: impl IntoIterator<Item = &'a Id>,
    coordinates: &str,
    selection_set: &[Selection],
) -> Vec<Selection> {
    let literals = ids
        .into_iter()
        .filter_map(|id| {
            let literal = literal(resolver.id_type, id);
            if literal.is_none() {
                tracing::warn!("id {id} is not an int, it cannot be resolved through {}", resolver.root_field);
            }
            literal
        })
        .collect::<Vec<_>>();
    if literals.is_empty() {
        return Vec::new();
    }

    let field = |alias: String, value: String| {
        Selection::Field(Field {
            alias: Some(alias),
            name: resolver.root_field.clone(),
            arguments: format!("({}: {value})", resolver.id_arg),
            directives: Vec::new(),
            selection_set: selection_set.to_vec(),
        })
    };

    if resolver.batch {
        vec![field(
            alias::encode(coordinates, None),
            format!("[{}]", literals.join(", ")),
        )]
    } else {
        literals
            .into_iter()
            .enumerate()
            .map(|(index, value)| field(alias::encode(coordinates, Some(index)), value))
            .collect()
    }
}

fn literal(id_type: IdType, id: &Id) -> Option<String> {
    match id_type {
        IdType::String => Some(serde_json::Value::from(id.as_text().as_ref()).to_string()),
        IdType::Int => id.as_text().parse::<i64>().ok().map(|id| id.to_string()),
    }
}
