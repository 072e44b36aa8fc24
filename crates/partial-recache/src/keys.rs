//! Keys under which entities, entity references and responses are stored.

use serde_json::Value;

use crate::{
    entity::{EntityRecord, Id, PathPart},
    error::StrategyError,
};

pub fn entity_key(entity: &EntityRecord) -> String {
    match &entity.id {
        Some(id) => format!("{}:{id}", entity.typename),
        None => entity.typename.clone(),
    }
}

pub fn parse_entity_key(key: &str) -> EntityRecord {
    match key.split_once(':') {
        Some((typename, id)) => EntityRecord::new(typename, Some(Id::String(id.to_string()))),
        None => EntityRecord::new(key, None),
    }
}

pub fn lazy_operation_key(cache_key: &str) -> String {
    format!("operation:{cache_key}")
}

/// An entity and the response path it was found at.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityReference {
    pub entity_key: String,
    pub path: Vec<PathPart>,
}

pub fn entity_reference_key(entity_key: &str, path: &[PathPart]) -> String {
    let mut key = format!("{entity_key}>");
    for (index, part) in path.iter().enumerate() {
        if index != 0 {
            key.push('.');
        }
        key.push_str(&part.field);
        if let Some(index) = part.index {
            key.push('@');
            key.push_str(&index.to_string());
        }
        if let Some(id) = &part.id {
            key.push('#');
            key.push_str(&id.to_value().to_string());
        }
    }
    key
}

pub fn parse_entity_reference_key(key: &str) -> Result<EntityReference, StrategyError> {
    let malformed = || StrategyError::MalformedReference(key.to_string());

    let (entity_key, mut rest) = key.split_once('>').ok_or_else(malformed)?;
    if entity_key.is_empty() || rest.is_empty() {
        return Err(malformed());
    }

    let mut path = Vec::new();
    loop {
        let end = rest.find(['@', '.']).unwrap_or(rest.len());
        let mut part = PathPart::field(&rest[..end]);
        rest = &rest[end..];

        if let Some(after) = rest.strip_prefix('@') {
            let digits = after.find(|c: char| !c.is_ascii_digit()).unwrap_or(after.len());
            part.index = Some(after[..digits].parse().map_err(|_| malformed())?);
            rest = &after[digits..];

            if let Some(after) = rest.strip_prefix('#') {
                if after.starts_with('"') {
                    // string ids are JSON and may themselves contain dots
                    let mut values = serde_json::Deserializer::from_str(after).into_iter::<Value>();
                    let id = values.next().ok_or_else(malformed)?.map_err(|_| malformed())?;
                    part.id = Some(Id::from_value(&id).ok_or_else(malformed)?);
                    rest = &after[values.byte_offset()..];
                } else {
                    let len = after
                        .find(|c: char| !(c.is_ascii_digit() || c == '-'))
                        .unwrap_or(after.len());
                    part.id = Some(Id::Int(after[..len].parse().map_err(|_| malformed())?));
                    rest = &after[len..];
                }
            }
        }

        path.push(part);

        match rest.strip_prefix('.') {
            Some(after) => rest = after,
            None if rest.is_empty() => break,
            None => return Err(malformed()),
        }
    }

    Ok(EntityReference {
        entity_key: entity_key.to_string(),
        path,
    })
}

/// The default key a response is cached under.
pub fn response_cache_key(document: &str, operation_name: Option<&str>, variables: &Value, session: Option<&str>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(document.as_bytes());
    hasher.update(b"|");
    hasher.update(operation_name.unwrap_or_default().as_bytes());
    hasher.update(b"|");
    hash_stable(&mut hasher, variables);
    hasher.update(b"|");
    hasher.update(session.unwrap_or_default().as_bytes());
    hasher.finalize().to_hex().to_string()
}

// Object keys are hashed in sorted order so that variable order does not matter.
fn hash_stable(hasher: &mut blake3::Hasher, value: &Value) {
    match value {
        Value::Object(object) => {
            let mut keys = object.keys().collect::<Vec<_>>();
            keys.sort();
            hasher.update(b"{");
            for key in keys {
                hasher.update(Value::from(key.as_str()).to_string().as_bytes());
                hasher.update(b":");
                hash_stable(hasher, &object[key]);
                hasher.update(b",");
            }
            hasher.update(b"}");
        }
        Value::Array(items) => {
            hasher.update(b"[");
            for item in items {
                hash_stable(hasher, item);
                hasher.update(b",");
            }
            hasher.update(b"]");
        }
        scalar => {
            hasher.update(scalar.to_string().as_bytes());
        }
    }
}
