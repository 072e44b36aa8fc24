//! Rewrites a document into the smallest document re-fetching what the entity
//! tree marks as stale.
//!
//! The rewrite is a bottom-up transform: children are rewritten first, then the
//! selection set holding them is pruned to what its coordinates keep. Fields
//! at coordinates with a cache resolver are replaced by link stubs, the
//! entities behind them are fetched by root field resolutions appended to the
//! operation.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::{
    coordinates::CoordinateTracker,
    document::{
        inline_fragments, Definition, Document, Field, InlineFragment, Operation, Selection, ALIAS_ENTITYCACHE_ID,
        ALIAS_ENTITYCACHE_TYPENAME, TYPENAME_FIELD,
    },
    error::RewriteError,
    resolution::map_resolutions,
    tree::{EntityTree, KeepSelections},
};

/// The selection set a link stub at some coordinates has to be filled with.
pub type LinkSelections = IndexMap<String, Vec<Selection>>;

#[derive(Debug, Clone, PartialEq)]
pub struct PartialQuery {
    pub query: Document,
    pub link_selections: LinkSelections,
}

enum Transform {
    Keep,
    Replace(Selection),
    Delete,
}

/// Returns `None` when nothing needs to be fetched again.
pub fn partial_recache_query(document: &Document, tree: &EntityTree) -> Result<Option<PartialQuery>, RewriteError> {
    let inlined;
    let document = if document.definitions.len() > 1 {
        inlined = inline_fragments(document)?;
        &inlined
    } else {
        document
    };

    let mut rewriter = Rewriter {
        tree,
        tracker: CoordinateTracker::default(),
        keep: HashMap::new(),
        link_selections: IndexMap::new(),
        resolutions: Vec::new(),
    };

    let mut definitions = Vec::new();
    for operation in document.operations() {
        rewriter.tracker.enter_operation(operation.kind);
        let mut selection_set = rewriter.selection_set(&operation.selection_set)?;
        selection_set.append(&mut rewriter.resolutions);

        if selection_set.is_empty() {
            continue;
        }

        definitions.push(Definition::Operation(Operation {
            kind: operation.kind,
            name: operation.name.clone(),
            variable_definitions: operation.variable_definitions.clone(),
            directives: operation.directives.clone(),
            selection_set,
        }));
    }

    if definitions.is_empty() {
        return Ok(None);
    }

    Ok(Some(PartialQuery {
        query: Document { definitions },
        link_selections: rewriter.link_selections,
    }))
}

struct Rewriter<'a> {
    tree: &'a EntityTree,
    tracker: CoordinateTracker,
    keep: HashMap<String, KeepSelections>,
    link_selections: LinkSelections,
    // resolutions staged for the current operation
    resolutions: Vec<Selection>,
}

impl Rewriter<'_> {
    fn selection_set(&mut self, selections: &[Selection]) -> Result<Vec<Selection>, RewriteError> {
        let mut rewritten = Vec::with_capacity(selections.len());
        for selection in selections {
            match self.selection(selection)? {
                Transform::Keep => rewritten.push(selection.clone()),
                Transform::Replace(selection) => rewritten.push(selection),
                Transform::Delete => {}
            }
        }

        let keep = self.keep_selections();
        if let KeepSelections::Only(_) = keep {
            rewritten.retain(|selection| match selection {
                Selection::Field(field) => keep.keeps(field.response_key()),
                Selection::InlineFragment(_) | Selection::FragmentSpread(_) => true,
            });
        }

        Ok(rewritten)
    }

    fn keep_selections(&mut self) -> KeepSelections {
        let coordinates = self.tracker.current();
        if let Some(keep) = self.keep.get(coordinates) {
            return keep.clone();
        }
        let keep = self.tree.selections_to_keep(coordinates);
        self.keep.insert(coordinates.to_string(), keep.clone());
        keep
    }

    fn selection(&mut self, selection: &Selection) -> Result<Transform, RewriteError> {
        match selection {
            Selection::Field(field) if field.selection_set.is_empty() => Ok(Transform::Keep),
            Selection::Field(field) => {
                self.tracker.enter_field(field.response_key());
                let transform = self.field(field);
                self.tracker.leave_field();
                transform
            }
            Selection::InlineFragment(fragment) => {
                let selection_set = self.selection_set(&fragment.selection_set)?;
                if selection_set.is_empty() {
                    return Ok(Transform::Delete);
                }
                Ok(Transform::Replace(Selection::InlineFragment(InlineFragment {
                    type_condition: fragment.type_condition.clone(),
                    directives: fragment.directives.clone(),
                    selection_set,
                })))
            }
            Selection::FragmentSpread(_) => Ok(Transform::Keep),
        }
    }

    fn field(&mut self, field: &Field) -> Result<Transform, RewriteError> {
        let selection_set = self.selection_set(&field.selection_set)?;
        if selection_set.is_empty() {
            return Ok(Transform::Delete);
        }

        let coordinates = self.tracker.current();
        let node = self.tree.node(coordinates).filter(|node| {
            // an entity kept only for what is below it is fetched inline
            node.has_resolver() && (node.state.dirty || node.state.list || !node.state.required)
        });

        let Some(node) = node else {
            return Ok(Transform::Replace(Selection::Field(Field {
                alias: field.alias.clone(),
                name: field.name.clone(),
                arguments: field.arguments.clone(),
                directives: field.directives.clone(),
                selection_set,
            })));
        };

        let Some(id_field) = find_id_field(&selection_set) else {
            return Err(RewriteError::MissingIdSelection(coordinates.to_string()));
        };

        for (typename, ids) in &node.required_ids {
            if let Some(resolver) = node.resolvers.get(typename) {
                self.resolutions
                    .extend(map_resolutions(resolver, ids, coordinates, &selection_set));
            }
        }

        let stub = Field {
            alias: field.alias.clone(),
            name: field.name.clone(),
            arguments: field.arguments.clone(),
            directives: field.directives.clone(),
            selection_set: vec![
                Selection::Field(Field::aliased(ALIAS_ENTITYCACHE_TYPENAME, TYPENAME_FIELD)),
                Selection::Field(Field::aliased(ALIAS_ENTITYCACHE_ID, id_field)),
            ],
        };
        self.link_selections.insert(coordinates.to_string(), selection_set);

        Ok(Transform::Replace(Selection::Field(stub)))
    }
}

/// Name of the field aliased as the entity id, looking through inline fragments.
fn find_id_field(selections: &[Selection]) -> Option<String> {
    selections.iter().find_map(|selection| match selection {
        Selection::Field(field) if field.alias.as_deref() == Some(ALIAS_ENTITYCACHE_ID) => Some(field.name.clone()),
        Selection::InlineFragment(fragment) => find_id_field(&fragment.selection_set),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use recache_config::{IdType, ResolverConfig};

    use super::*;
    use crate::{
        document::{parse_document, print_selection_set},
        entity::EntityCacheResult,
        tree::CacheResolvers,
    };

    fn rewrite(document: &str, observations: &[EntityCacheResult], resolvers: &CacheResolvers) -> Option<PartialQuery> {
        let document = parse_document(document).unwrap();
        let tree = EntityTree::from_observations(observations, resolvers).unwrap();
        partial_recache_query(&document, &tree).unwrap()
    }

    fn resolver(typename: &str, root_field: &str, id_type: IdType, batch: bool) -> CacheResolvers {
        CacheResolvers::from([(
            typename.to_string(),
            ResolverConfig {
                root_field: root_field.into(),
                id_arg: "id".into(),
                id_type,
                batch,
            },
        )])
    }

    const DASHBOARD: &str = indoc! {r#"
        query FullQuery {
          dashboard {
            topActivity {
              __entityCacheId: id
              __entityCacheTypeName: __typename
              title
              description
            }
            latestUpdates {
              __entityCacheId: id
              __entityCacheTypeName: __typename
              date
              text
            }
            todoList {
              __entityCacheId: id
              __entityCacheTypeName: __typename
              label
            }
          }
          someCachedData {
            __entityCacheId: id
            __entityCacheTypeName: __typename
            name
          }
        }
    "#};

    #[test]
    fn keeps_only_the_path_to_an_invalidated_entity() {
        let observations = [
            EntityCacheResult::mock("Dashboard", "1", false, "Query.dashboard"),
            EntityCacheResult::mock("Activity", "2", true, "Query.dashboard.topActivity"),
            EntityCacheResult::mock("UpdateInfo", "1", false, "Query.dashboard.latestUpdates"),
            EntityCacheResult::mock("TodoItem", "1", false, "Query.dashboard.todoList"),
            EntityCacheResult::mock("Activity", "3", false, "Query.someCachedData"),
        ];

        let partial = rewrite(DASHBOARD, &observations, &CacheResolvers::new()).unwrap();

        insta::assert_snapshot!(partial.query, @r###"
        query FullQuery {
          dashboard {
            topActivity {
              __entityCacheId: id
              __entityCacheTypeName: __typename
              title
              description
            }
          }
        }
        "###);
        assert!(partial.link_selections.is_empty());
    }

    #[test]
    fn nothing_invalidated_is_a_noop() {
        let observations = [
            EntityCacheResult::mock("Dashboard", "1", false, "Query.dashboard"),
            EntityCacheResult::mock("Activity", "2", false, "Query.dashboard.topActivity"),
        ];

        assert_eq!(rewrite(DASHBOARD, &observations, &CacheResolvers::new()), None);
        assert_eq!(rewrite(DASHBOARD, &[], &CacheResolvers::new()), None);
    }

    #[test]
    fn keeps_full_selections_of_plain_objects_and_lists() {
        let document = indoc! {r#"
            query FullQuery {
              dashboard {
                activities {
                  author {
                    name
                  }
                  thisShouldBeIncluded
                }
                thisShouldBePruned
              }
            }
        "#};
        let observations = [
            EntityCacheResult::mock("Dashboard", "1", false, "Query.dashboard"),
            EntityCacheResult::mock("Activity", "1", false, "Query.dashboard.activities@0#1"),
            EntityCacheResult::mock("User", "1", true, "Query.dashboard.activities@0#1.author"),
        ];

        let partial = rewrite(document, &observations, &CacheResolvers::new()).unwrap();

        insta::assert_snapshot!(partial.query, @r###"
        query FullQuery {
          dashboard {
            activities {
              author {
                name
              }
              thisShouldBeIncluded
            }
          }
        }
        "###);
    }

    #[test]
    fn inlines_fragments_of_multi_definition_documents() {
        let document = indoc! {r#"
            fragment Activity on Activity {
              __entityCacheId: id
              __entityCacheTypeName: __typename
              title
              relatedUpdate {
                __entityCacheId: id
                __entityCacheTypeName: __typename
                date
                ...SystemUpdateInfo
              }
            }

            fragment SystemUpdateInfo on SystemUpdateInfo {
              version
            }

            query FullQuery {
              dashboard {
                topActivity {
                  ...Activity
                  someField
                }
                latestUpdates {
                  __entityCacheId: id
                  __entityCacheTypeName: __typename
                  ...SystemUpdateInfo
                }
              }
            }
        "#};
        let observations = [
            EntityCacheResult::mock("UpdateInfo", "2", true, "Query.dashboard.topActivity.relatedUpdate"),
            EntityCacheResult::mock("Dashboard", "1", false, "Query.dashboard"),
            EntityCacheResult::mock("Activity", "1", false, "Query.dashboard.topActivity"),
        ];

        let partial = rewrite(document, &observations, &CacheResolvers::new()).unwrap();

        insta::assert_snapshot!(partial.query, @r###"
        query FullQuery {
          dashboard {
            topActivity {
              ... on Activity {
                relatedUpdate {
                  __entityCacheId: id
                  __entityCacheTypeName: __typename
                  date
                  ... on SystemUpdateInfo {
                    version
                  }
                }
              }
            }
          }
        }
        "###);
    }

    const RESOLVED: &str = indoc! {r#"
        fragment Activity on Activity {
          __entityCacheId: id
          __entityCacheTypeName: __typename
          title
          relatedUpdate {
            ...UpdateInfo
          }
        }

        fragment UpdateInfo on UpdateInfo {
          __entityCacheId: id
          __entityCacheTypeName: __typename
          date
        }

        query FullQuery {
          dashboard {
            user {
              __entityCacheId: id
              __entityCacheTypeName: __typename
              name
            }
            topActivity {
              ...Activity
            }
            latestUpdates {
              ...UpdateInfo
              nonFragmentField
            }
            todoList {
              label
            }
          }
        }
    "#};

    #[test]
    fn replaces_entities_with_resolvers_by_links() {
        let observations = [
            EntityCacheResult::mock("UpdateInfo", "2", true, r#"Query.dashboard.latestUpdates@7#"2""#),
            EntityCacheResult::mock("UpdateInfo", "2", true, "Query.dashboard.topActivity.relatedUpdate"),
            EntityCacheResult::mock("User", "123", true, "Query.dashboard.user"),
            EntityCacheResult::mock("Dashboard", "1", false, "Query.dashboard"),
        ];
        let resolvers = resolver("UpdateInfo", "getUpdateInfo", IdType::Int, false);

        let partial = rewrite(RESOLVED, &observations, &resolvers).unwrap();

        insta::assert_snapshot!(partial.query, @r###"
        query FullQuery {
          dashboard {
            user {
              __entityCacheId: id
              __entityCacheTypeName: __typename
              name
            }
            latestUpdates {
              __entityCacheTypeName: __typename
              __entityCacheId: id
            }
          }
          _ENTITY_dashboard_topActivity_relatedUpdate_0: getUpdateInfo(id: 2) {
            ... on UpdateInfo {
              __entityCacheId: id
              __entityCacheTypeName: __typename
              date
            }
          }
          _ENTITY_dashboard_latestUpdates_0: getUpdateInfo(id: 2) {
            ... on UpdateInfo {
              __entityCacheId: id
              __entityCacheTypeName: __typename
              date
            }
            nonFragmentField
          }
        }
        "###);

        assert_eq!(
            partial.link_selections.keys().collect::<Vec<_>>(),
            ["Query.dashboard.topActivity.relatedUpdate", "Query.dashboard.latestUpdates"]
        );
        insta::assert_snapshot!(print_selection_set(&partial.link_selections["Query.dashboard.latestUpdates"]), @r###"
        {
          ... on UpdateInfo {
            __entityCacheId: id
            __entityCacheTypeName: __typename
            date
          }
          nonFragmentField
        }
        "###);
    }

    #[test]
    fn batches_resolutions() {
        let observations = [
            EntityCacheResult::mock("UpdateInfo", "2", true, r#"Query.dashboard.latestUpdates@2#"2""#),
            EntityCacheResult::mock("UpdateInfo", "3", true, r#"Query.dashboard.latestUpdates@3#"3""#),
            EntityCacheResult::mock("UpdateInfo", "4", false, r#"Query.dashboard.latestUpdates@4#"4""#),
            EntityCacheResult::mock("UpdateInfo", "2", true, "Query.dashboard.topActivity.relatedUpdate"),
            EntityCacheResult::mock("User", "123", true, "Query.dashboard.user"),
            EntityCacheResult::mock("Dashboard", "1", false, "Query.dashboard"),
        ];
        let resolvers = resolver("UpdateInfo", "getUpdateInfo", IdType::Int, true);

        let partial = rewrite(RESOLVED, &observations, &resolvers).unwrap();

        insta::assert_snapshot!(partial.query, @r###"
        query FullQuery {
          dashboard {
            user {
              __entityCacheId: id
              __entityCacheTypeName: __typename
              name
            }
            latestUpdates {
              __entityCacheTypeName: __typename
              __entityCacheId: id
            }
          }
          _ENTITY_dashboard_topActivity_relatedUpdate: getUpdateInfo(id: [2]) {
            ... on UpdateInfo {
              __entityCacheId: id
              __entityCacheTypeName: __typename
              date
            }
          }
          _ENTITY_dashboard_latestUpdates: getUpdateInfo(id: [2, 3]) {
            ... on UpdateInfo {
              __entityCacheId: id
              __entityCacheTypeName: __typename
              date
            }
            nonFragmentField
          }
        }
        "###);
    }

    #[test]
    fn invalidated_lists_keep_their_members_as_links() {
        let document = indoc! {r#"
            query MyQuery {
              listQuery {
                __entityCacheId: id
                __entityCacheTypeName: __typename
                name
                items {
                  __entityCacheId: id
                  __entityCacheTypeName: __typename
                  name
                }
              }
            }
        "#};
        let observations = [
            EntityCacheResult::mock("Activity", "1", true, "Query.listQuery"),
            EntityCacheResult::mock("TodoItem", "1", true, "Query.listQuery.items@0#1"),
            EntityCacheResult::mock("TodoItem", "2", false, "Query.listQuery.items@1#2"),
        ];
        let resolvers = resolver("TodoItem", "getRelatedEntity", IdType::String, false);

        let partial = rewrite(document, &observations, &resolvers).unwrap();

        insta::assert_snapshot!(partial.query, @r###"
        query MyQuery {
          listQuery {
            __entityCacheId: id
            __entityCacheTypeName: __typename
            name
            items {
              __entityCacheTypeName: __typename
              __entityCacheId: id
            }
          }
          _ENTITY_listQuery_items_0: getRelatedEntity(id: "1") {
            __entityCacheId: id
            __entityCacheTypeName: __typename
            name
          }
        }
        "###);
    }

    #[test]
    fn entities_below_a_dirty_branch_stay_in_the_document() {
        let document = indoc! {r#"
            fragment SomeObject on SomeObject {
              anotherObject {
                relatedEntity {
                  __entityCacheId: id
                  __entityCacheTypeName: __typename
                  name
                }
              }
            }

            query MyQuery {
              listQuery {
                __entityCacheId: id
                __entityCacheTypeName: __typename
                name
                items {
                  ...SomeObject
                }
              }
            }
        "#};
        let observations = [
            EntityCacheResult::mock("Activity", "1", true, "Query.listQuery"),
            EntityCacheResult::mock("TodoItem", "2", true, "Query.listQuery.items@0.anotherObject.relatedEntity"),
        ];
        let resolvers = resolver("TodoItem", "getRelatedEntity", IdType::String, false);

        let partial = rewrite(document, &observations, &resolvers).unwrap();

        insta::assert_snapshot!(partial.query, @r###"
        query MyQuery {
          listQuery {
            __entityCacheId: id
            __entityCacheTypeName: __typename
            name
            items {
              ... on SomeObject {
                anotherObject {
                  relatedEntity {
                    __entityCacheTypeName: __typename
                    __entityCacheId: id
                  }
                }
              }
            }
          }
          _ENTITY_listQuery_items_anotherObject_relatedEntity_0: getRelatedEntity(id: "2") {
            __entityCacheId: id
            __entityCacheTypeName: __typename
            name
          }
        }
        "###);
    }

    #[test]
    fn collects_link_selections_of_nested_resolvers() {
        let document = indoc! {r#"
            query Query {
              rootA {
                __entityCacheId: id
                b {
                  __entityCacheId: id
                  c {
                    __entityCacheId: id
                  }
                }
              }
            }
        "#};
        let observations = [
            EntityCacheResult::mock("A", "1", true, "Query.rootA"),
            EntityCacheResult::mock("B", "2", false, "Query.rootA.b"),
            EntityCacheResult::mock("C", "3", false, "Query.rootA.b.c"),
        ];
        let mut resolvers = resolver("A", "a", IdType::String, false);
        resolvers.extend(resolver("B", "b", IdType::String, false));
        resolvers.extend(resolver("C", "c", IdType::String, false));

        let partial = rewrite(document, &observations, &resolvers).unwrap();

        insta::assert_snapshot!(partial.query, @r###"
        query Query {
          _ENTITY_rootA_0: a(id: "1") {
            __entityCacheId: id
            b {
              __entityCacheTypeName: __typename
              __entityCacheId: id
            }
          }
        }
        "###);
        insta::assert_snapshot!(print_selection_set(&partial.link_selections["Query.rootA.b"]), @r###"
        {
          __entityCacheId: id
          c {
            __entityCacheTypeName: __typename
            __entityCacheId: id
          }
        }
        "###);
        assert!(partial.link_selections.contains_key("Query.rootA.b.c"));
    }

    #[test]
    fn links_need_an_id_selection() {
        let document = "query { user { name } }";
        let observations = [EntityCacheResult::mock("User", "1", true, "Query.user")];
        let resolvers = resolver("User", "user", IdType::String, false);

        let document = parse_document(document).unwrap();
        let tree = EntityTree::from_observations(&observations, &resolvers).unwrap();

        assert!(matches!(
            partial_recache_query(&document, &tree),
            Err(RewriteError::MissingIdSelection(coordinates)) if coordinates == "Query.user"
        ));
    }
}
