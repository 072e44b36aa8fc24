use serde_json::{Map, Value};

use crate::{
    document::{ALIAS_ENTITYCACHE_ID, ALIAS_ENTITYCACHE_TYPENAME},
    entity::{CollectedEntity, EntityRecord, Id, PathPart},
};

/// Every entity of a response along with the path it was found at, in
/// traversal order. Paths start at `Query`.
pub fn collect_entity_records(data: &Map<String, Value>) -> Vec<CollectedEntity> {
    let mut collected = Vec::new();
    let mut path = vec![PathPart::field("Query")];
    collect_object(data, &mut path, &mut collected);
    collected
}

fn collect_value(value: &Value, path: &mut Vec<PathPart>, collected: &mut Vec<CollectedEntity>) {
    match value {
        Value::Object(object) => collect_object(object, path, collected),
        Value::Array(items) => {
            let Some(last) = path.last().cloned() else {
                return;
            };
            for (index, item) in items.iter().enumerate() {
                if let Some(part) = path.last_mut() {
                    *part = PathPart::list(last.field.clone(), index, None);
                }
                collect_value(item, path, collected);
            }
            if let Some(part) = path.last_mut() {
                *part = last;
            }
        }
        _ => {}
    }
}

fn collect_object(object: &Map<String, Value>, path: &mut Vec<PathPart>, collected: &mut Vec<CollectedEntity>) {
    if let Some(Value::String(typename)) = object.get(ALIAS_ENTITYCACHE_TYPENAME) {
        let id = object.get(ALIAS_ENTITYCACHE_ID).and_then(Id::from_value);
        let mut entity_path = path.clone();
        if let Some(last) = entity_path.last_mut().filter(|part| part.is_list()) {
            last.id = id.clone();
        }
        collected.push(CollectedEntity {
            entity: EntityRecord::new(typename.as_str(), id),
            path: entity_path,
        });
    }

    for (key, value) in object {
        if !matches!(value, Value::Object(_) | Value::Array(_)) {
            continue;
        }
        path.push(PathPart::field(key.as_str()));
        collect_value(value, path, collected);
        path.pop();
    }
}
