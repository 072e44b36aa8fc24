//! Folding execution results into a cached response.

use serde_json::{Map, Value};

use crate::{
    alias,
    coordinates::SegmentCache,
    document::{ALIAS_ENTITYCACHE_ID, ALIAS_ENTITYCACHE_TYPENAME},
    entity::Id,
};

/// Merges `source` into `target`. Objects merge key by key, anything else in
/// `source` replaces what `target` holds, except for lists of entities which
/// are merged member by member, matching on the entity id.
pub fn deep_merge(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        match value {
            Value::Object(source) => match target.get_mut(&key) {
                Some(Value::Object(target)) => deep_merge(target, source),
                _ => {
                    let mut object = Map::new();
                    deep_merge(&mut object, source);
                    target.insert(key, Value::Object(object));
                }
            },
            Value::Array(items) => {
                let items = match target.get(&key) {
                    Some(Value::Array(existing)) if is_entity_list(existing) && is_entity_list(&items) => {
                        merge_entity_lists(existing, items)
                    }
                    _ => items,
                };
                target.insert(key, Value::Array(items));
            }
            value => {
                target.insert(key, value);
            }
        }
    }
}

fn merge_entity_lists(existing: &[Value], items: Vec<Value>) -> Vec<Value> {
    items
        .into_iter()
        .map(|item| {
            let item = match item {
                Value::Object(item) => item,
                item => return item,
            };
            let cached = existing.iter().find_map(|entity| match entity {
                Value::Object(entity) if entity_id(entity).is_some() && entity_id(entity) == entity_id(&item) => {
                    Some(entity)
                }
                _ => None,
            });
            match cached {
                Some(cached) => {
                    let mut merged = cached.clone();
                    deep_merge(&mut merged, item);
                    Value::Object(merged)
                }
                None => Value::Object(item),
            }
        })
        .collect()
}

/// An object carrying both entity aliases.
pub fn is_entity(value: &Value) -> bool {
    value.as_object().is_some_and(is_entity_object)
}

fn is_entity_object(object: &Map<String, Value>) -> bool {
    object.contains_key(ALIAS_ENTITYCACHE_TYPENAME) && object.contains_key(ALIAS_ENTITYCACHE_ID)
}

fn is_entity_list(items: &[Value]) -> bool {
    items.iter().all(is_entity)
}

fn entity_id(entity: &Map<String, Value>) -> Option<Id> {
    entity.get(ALIAS_ENTITYCACHE_ID).and_then(Id::from_value)
}

fn same_entity(a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
    a.get(ALIAS_ENTITYCACHE_TYPENAME) == b.get(ALIAS_ENTITYCACHE_TYPENAME)
        && entity_id(a).is_some()
        && entity_id(a) == entity_id(b)
}

/// Merges the result of a cache resolution into every matching entity found at
/// `path`, relative to the data root. `resolved` is a single entity or a list
/// of them for batched resolutions.
pub fn merge_link(data: &mut Map<String, Value>, path: &[String], resolved: &Value) {
    let resolved: Vec<&Map<String, Value>> = match resolved {
        Value::Array(items) if is_entity_list(items) => items.iter().filter_map(Value::as_object).collect(),
        Value::Object(entity) if is_entity(resolved) => vec![entity],
        _ => return,
    };

    let Some((first, rest)) = path.split_first() else {
        return;
    };
    if let Some(value) = data.get_mut(first) {
        inject(value, rest, &resolved);
    }
}

fn inject(value: &mut Value, path: &[String], resolved: &[&Map<String, Value>]) {
    match value {
        Value::Array(items) => {
            for item in items {
                inject(item, path, resolved);
            }
        }
        Value::Object(object) => match path.split_first() {
            Some((next, rest)) => {
                if let Some(value) = object.get_mut(next) {
                    inject(value, rest, resolved);
                }
            }
            None => {
                if !is_entity_object(object) {
                    return;
                }
                if let Some(source) = resolved.iter().find(|source| same_entity(object, source)) {
                    deep_merge(object, (*source).clone());
                }
            }
        },
        _ => {}
    }
}

/// Folds one result's data into `data`: plain keys are deep merged, resolution
/// aliases are merged into the entities at the coordinates they encode.
pub fn merge_result_data(data: &mut Map<String, Value>, next: Map<String, Value>) {
    let (resolutions, plain): (Vec<_>, Vec<_>) = next.into_iter().partition(|(key, _)| alias::is_resolution_alias(key));

    deep_merge(data, plain.into_iter().collect());

    // unbatched resolutions of one coordinate share its segments
    let mut segments = SegmentCache::default();
    for (key, value) in resolutions {
        if let Some(coordinates) = alias::decode(&key) {
            merge_link(data, &segments.get(&coordinates), &value);
        }
    }
}

/// Strips both entity aliases from every object.
pub fn strip_entity_aliases(value: &mut Value) {
    match value {
        Value::Object(object) => {
            object.retain(|key, _| key != ALIAS_ENTITYCACHE_TYPENAME && key != ALIAS_ENTITYCACHE_ID);
            object.values_mut().for_each(strip_entity_aliases);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_entity_aliases),
        _ => {}
    }
}
