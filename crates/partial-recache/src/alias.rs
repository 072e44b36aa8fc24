//! Aliases smuggling cache resolutions into a document.
//!
//! `Query.dashboard.latestUpdates` with index 0 becomes
//! `_ENTITY_dashboard_latestUpdates_0`. Decoding drops the index.
//!
//! Segments are joined with `_`, an underscore inside a field name is written
//! as `_00`. Names never start with a digit and indices never have a leading
//! zero, so neither can be mistaken for the other.

pub const RESOLUTION_ALIAS_PREFIX: &str = "_ENTITY_";

const ESCAPED_UNDERSCORE: &str = "_00";

pub fn encode(coordinates: &str, index: Option<usize>) -> String {
    let coordinates = coordinates.strip_prefix("Query.").unwrap_or(coordinates);
    let mut alias = String::from(RESOLUTION_ALIAS_PREFIX);
    for (position, segment) in coordinates.split('.').enumerate() {
        if position != 0 {
            alias.push('_');
        }
        alias.push_str(&segment.replace('_', ESCAPED_UNDERSCORE));
    }
    if let Some(index) = index {
        alias.push('_');
        alias.push_str(&index.to_string());
    }
    alias
}

pub fn is_resolution_alias(key: &str) -> bool {
    key.starts_with(RESOLUTION_ALIAS_PREFIX)
}

/// The coordinates an alias was built from, relative to the `Query` root.
pub fn decode(alias: &str) -> Option<String> {
    let encoded = alias.strip_prefix(RESOLUTION_ALIAS_PREFIX)?;
    let encoded = match encoded.rsplit_once('_') {
        Some((rest, index)) if is_index(index) => rest,
        _ => encoded,
    };

    let mut coordinates = String::with_capacity(encoded.len());
    let mut rest = encoded;
    while let Some(position) = rest.find('_') {
        coordinates.push_str(&rest[..position]);
        match rest[position..].strip_prefix(ESCAPED_UNDERSCORE) {
            Some(after) => {
                coordinates.push('_');
                rest = after;
            }
            None => {
                coordinates.push('.');
                rest = &rest[position + 1..];
            }
        }
    }
    coordinates.push_str(rest);

    Some(coordinates)
}

fn is_index(token: &str) -> bool {
    !token.is_empty()
        && token.bytes().all(|byte| byte.is_ascii_digit())
        && (token == "0" || !token.starts_with('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_coordinates() {
        assert_eq!(encode("Query.dashboard.latestUpdates", Some(0)), "_ENTITY_dashboard_latestUpdates_0");
        assert_eq!(encode("Query.listQuery.items", None), "_ENTITY_listQuery_items");
        assert_eq!(encode("Query.dashboard.latest_updates", Some(0)), "_ENTITY_dashboard_latest_00updates_0");
    }

    #[test]
    fn decoding_drops_the_index() {
        for coordinates in ["dashboard", "dashboard.topActivity.relatedUpdate", "someQuery.a.b"] {
            assert_eq!(decode(&encode(coordinates, None)).as_deref(), Some(coordinates));
            assert_eq!(decode(&encode(coordinates, Some(12))).as_deref(), Some(coordinates));
        }
        assert_eq!(decode("dashboard"), None);
    }

    #[test]
    fn underscored_names_round_trip() {
        let coordinates = [
            "dashboard.latest_updates",
            "dashboard._private",
            "trailing_.x",
            "a__b.c_",
            "item_1.x_0",
            "__typename_like",
        ];
        for coordinates in coordinates {
            for index in [None, Some(0), Some(1), Some(10)] {
                assert_eq!(
                    decode(&encode(coordinates, index)).as_deref(),
                    Some(coordinates),
                    "{coordinates} with {index:?}"
                );
            }
        }
    }
}
