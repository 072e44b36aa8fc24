//! Link stubs left in a result by the rewriter, and the follow-up queries
//! resolving them.

use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};

use crate::{
    alias,
    coordinates::CoordinateTracker,
    document::{Definition, Document, Operation, Selection, ALIAS_ENTITYCACHE_ID, ALIAS_ENTITYCACHE_TYPENAME},
    entity::{Id, KnownEntities},
    resolution::map_resolutions,
    rewrite::LinkSelections,
    tree::CacheResolvers,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStub {
    pub typename: String,
    pub id: Id,
}

/// An object of a result, told apart from a link stub.
#[derive(Debug)]
pub enum Subtree<'a> {
    Object(&'a Map<String, Value>),
    Link(LinkStub),
    /// Shaped like a stub but without a usable typename or id.
    Unresolvable,
}

impl<'a> Subtree<'a> {
    /// A stub is an object with exactly the two entity alias keys.
    pub fn of(object: &'a Map<String, Value>) -> Self {
        let is_stub = object.len() == 2
            && object.contains_key(ALIAS_ENTITYCACHE_TYPENAME)
            && object.contains_key(ALIAS_ENTITYCACHE_ID);
        if !is_stub {
            return Subtree::Object(object);
        }

        let typename = object.get(ALIAS_ENTITYCACHE_TYPENAME).and_then(Value::as_str);
        let id = object.get(ALIAS_ENTITYCACHE_ID).and_then(Id::from_value);
        match (typename, id) {
            (Some(typename), Some(id)) => Subtree::Link(LinkStub {
                typename: typename.to_string(),
                id,
            }),
            _ => Subtree::Unresolvable,
        }
    }
}

/// Stubs of one type found at one coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeLinkWithCoordinates {
    pub typename: String,
    pub coordinates: String,
    pub ids: IndexSet<Id>,
    /// What the stubs have to be resolved with.
    pub selection_set: Vec<Selection>,
}

/// Finds the stubs of a result that still need to be resolved. Entities are
/// only ever requested once across all the results a collector sees.
pub struct LinkCollector<'a> {
    link_selections: &'a LinkSelections,
    known_entities: KnownEntities,
    tracker: CoordinateTracker,
}

impl<'a> LinkCollector<'a> {
    pub fn new(link_selections: &'a LinkSelections, known_entities: KnownEntities) -> Self {
        LinkCollector {
            link_selections,
            known_entities,
            tracker: CoordinateTracker::default(),
        }
    }

    pub fn collect(&mut self, data: &Map<String, Value>) -> Vec<TypeLinkWithCoordinates> {
        let mut links = IndexMap::new();
        self.tracker.enter_root("Query");
        self.object(data, &mut links);
        links.into_values().collect()
    }

    fn object(&mut self, object: &Map<String, Value>, links: &mut IndexMap<(String, String), TypeLinkWithCoordinates>) {
        for (key, value) in object {
            // resolutions stand for the coordinates they were built from
            match alias::decode(key) {
                Some(coordinates) => self.tracker.enter_field(&coordinates),
                None => self.tracker.enter_field(key),
            }
            self.value(value, links);
            self.tracker.leave_field();
        }
    }

    fn value(&mut self, value: &Value, links: &mut IndexMap<(String, String), TypeLinkWithCoordinates>) {
        match value {
            Value::Object(object) => match Subtree::of(object) {
                Subtree::Object(object) => self.object(object, links),
                Subtree::Link(stub) => self.link(stub, links),
                Subtree::Unresolvable => {}
            },
            Value::Array(items) => {
                for item in items {
                    self.value(item, links);
                }
            }
            _ => {}
        }
    }

    fn link(&mut self, stub: LinkStub, links: &mut IndexMap<(String, String), TypeLinkWithCoordinates>) {
        let coordinates = self.tracker.current();
        let Some(selection_set) = self.link_selections.get(coordinates) else {
            tracing::warn!("no link selection recorded at {coordinates}, leaving {} unresolved", stub.typename);
            return;
        };

        if !self.known_entities.insert(&stub.typename, stub.id.clone()) {
            return;
        }

        links
            .entry((stub.typename.clone(), coordinates.to_string()))
            .or_insert_with(|| TypeLinkWithCoordinates {
                typename: stub.typename,
                coordinates: coordinates.to_string(),
                ids: IndexSet::new(),
                selection_set: selection_set.clone(),
            })
            .ids
            .insert(stub.id);
    }
}

pub fn link_query_name(operation_name: Option<&str>) -> String {
    match operation_name {
        Some(name) => format!("{name}__linkQuery"),
        None => String::from("_linkQuery"),
    }
}

/// One query resolving every link through the resolvers of their types, `None`
/// if no link has a resolver.
pub fn build_link_query(
    links: &[TypeLinkWithCoordinates],
    resolvers: &CacheResolvers,
    operation_name: Option<&str>,
) -> Option<Document> {
    let mut selections = Vec::new();
    for link in links {
        let Some(resolver) = resolvers.get(&link.typename) else {
            tracing::debug!("no resolver for {}, links at {} stay unresolved", link.typename, link.coordinates);
            continue;
        };
        selections.extend(map_resolutions(resolver, &link.ids, &link.coordinates, &link.selection_set));
    }

    if selections.is_empty() {
        return None;
    }

    Some(Document {
        definitions: vec![Definition::Operation(Operation::query(
            Some(link_query_name(operation_name)),
            selections,
        ))],
    })
}

#[cfg(test)]
mod tests {
    use recache_config::{IdType, ResolverConfig};
    use serde_json::json;

    use super::*;
    use crate::document::parse_selection_set;

    fn data(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(object) => object,
            _ => Map::new(),
        }
    }

    fn link_selections(coordinates: &[&str]) -> LinkSelections {
        coordinates
            .iter()
            .map(|coordinates| {
                let selection_set = parse_selection_set("{ __entityCacheId: id __entityCacheTypeName: __typename name }");
                (coordinates.to_string(), selection_set.unwrap())
            })
            .collect()
    }

    #[test]
    fn only_exact_stubs_are_links() {
        let stub = data(json!({"__entityCacheTypeName": "User", "__entityCacheId": 1}));
        assert!(matches!(Subtree::of(&stub), Subtree::Link(LinkStub { typename, id }) if typename == "User" && id == Id::from(1)));

        let entity = data(json!({"__entityCacheTypeName": "User", "__entityCacheId": 1, "name": "Jane"}));
        assert!(matches!(Subtree::of(&entity), Subtree::Object(_)));

        let broken = data(json!({"__entityCacheTypeName": "User", "__entityCacheId": null}));
        assert!(matches!(Subtree::of(&broken), Subtree::Unresolvable));
    }

    #[test]
    fn groups_links_by_type_and_coordinates() {
        let selections = link_selections(&["Query.feed.items", "Query.feed.items.author"]);
        let mut collector = LinkCollector::new(&selections, KnownEntities::default());

        let links = collector.collect(&data(json!({
            "feed": {
                "items": [
                    {"__entityCacheTypeName": "Post", "__entityCacheId": "1"},
                    {"__entityCacheTypeName": "Post", "__entityCacheId": "2"},
                    {"__entityCacheTypeName": "Video", "__entityCacheId": "3"},
                    {
                        "__entityCacheTypeName": "Post",
                        "__entityCacheId": "4",
                        "author": {"__entityCacheTypeName": "User", "__entityCacheId": "9"}
                    },
                    {"__entityCacheTypeName": "Post", "__entityCacheId": "1"}
                ],
                "pinned": {"__entityCacheTypeName": "Post", "__entityCacheId": "5"}
            }
        })));

        let summary = links
            .iter()
            .map(|link| {
                let ids = link.ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
                format!("{} at {}: {ids}", link.typename, link.coordinates)
            })
            .collect::<Vec<_>>();

        insta::assert_debug_snapshot!(summary, @r###"
        [
            "Post at Query.feed.items: 1,2",
            "Video at Query.feed.items: 3",
            "User at Query.feed.items.author: 9",
        ]
        "###);
    }

    #[test]
    fn known_entities_are_not_requested_again() {
        let selections = link_selections(&["Query.user", "Query.user.friend"]);
        let mut known = KnownEntities::default();
        known.insert("User", Id::from("1"));
        let mut collector = LinkCollector::new(&selections, known);

        let result = data(json!({"user": {"__entityCacheTypeName": "User", "__entityCacheId": 1}}));
        assert!(collector.collect(&result).is_empty());

        let result = data(json!({
            "_ENTITY_user_0": {
                "__entityCacheTypeName": "User",
                "__entityCacheId": 1,
                "friend": {"__entityCacheTypeName": "User", "__entityCacheId": 2}
            }
        }));
        let links = collector.collect(&result);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].coordinates, "Query.user.friend");

        // the friend is known from now on
        assert!(collector.collect(&result).is_empty());
    }

    #[test]
    fn builds_one_query_for_all_links() {
        let resolvers = CacheResolvers::from([(
            "Post".to_string(),
            ResolverConfig {
                root_field: "post".into(),
                id_arg: "id".into(),
                id_type: IdType::String,
                batch: false,
            },
        )]);
        let selection_set = parse_selection_set("{ __entityCacheId: id title }").unwrap();
        let links = [
            TypeLinkWithCoordinates {
                typename: "Post".into(),
                coordinates: "Query.feed.items".into(),
                ids: IndexSet::from([Id::from("1"), Id::from("2")]),
                selection_set: selection_set.clone(),
            },
            TypeLinkWithCoordinates {
                typename: "Video".into(),
                coordinates: "Query.feed.items".into(),
                ids: IndexSet::from([Id::from("3")]),
                selection_set,
            },
        ];

        let query = build_link_query(&links, &resolvers, Some("Feed")).unwrap();
        insta::assert_snapshot!(query, @r###"
        query Feed__linkQuery {
          _ENTITY_feed_items_0: post(id: "1") {
            __entityCacheId: id
            title
          }
          _ENTITY_feed_items_1: post(id: "2") {
            __entityCacheId: id
            title
          }
        }
        "###);

        assert_eq!(build_link_query(&links[1..], &resolvers, None), None);
        assert_eq!(link_query_name(None), "_linkQuery");
    }
}
