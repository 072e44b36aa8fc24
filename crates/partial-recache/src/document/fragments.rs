use std::collections::{HashMap, HashSet};

use super::{Definition, Document, Field, Fragment, InlineFragment, Operation, Selection};
use crate::error::DocumentError;

/// Replaces every fragment spread with an inline fragment carrying the fragment's
/// type condition and drops the fragment definitions.
pub fn inline_fragments(document: &Document) -> Result<Document, DocumentError> {
    let mut inliner = Inliner {
        fragments: document
            .fragments()
            .map(|fragment| (fragment.name.as_str(), fragment))
            .collect(),
        inlined: HashMap::new(),
        visiting: HashSet::new(),
    };

    let definitions = document
        .operations()
        .map(|operation| {
            Ok(Definition::Operation(Operation {
                kind: operation.kind,
                name: operation.name.clone(),
                variable_definitions: operation.variable_definitions.clone(),
                directives: operation.directives.clone(),
                selection_set: inliner.selection_set(&operation.selection_set)?,
            }))
        })
        .collect::<Result<_, DocumentError>>()?;

    Ok(Document { definitions })
}

struct Inliner<'a> {
    fragments: HashMap<&'a str, &'a Fragment>,
    // fragments used several times are only inlined once per document
    inlined: HashMap<&'a str, Vec<Selection>>,
    visiting: HashSet<&'a str>,
}

impl<'a> Inliner<'a> {
    fn selection_set(&mut self, selections: &[Selection]) -> Result<Vec<Selection>, DocumentError> {
        selections
            .iter()
            .map(|selection| {
                Ok(match selection {
                    Selection::Field(field) => Selection::Field(Field {
                        alias: field.alias.clone(),
                        name: field.name.clone(),
                        arguments: field.arguments.clone(),
                        directives: field.directives.clone(),
                        selection_set: self.selection_set(&field.selection_set)?,
                    }),
                    Selection::InlineFragment(fragment) => Selection::InlineFragment(InlineFragment {
                        type_condition: fragment.type_condition.clone(),
                        directives: fragment.directives.clone(),
                        selection_set: self.selection_set(&fragment.selection_set)?,
                    }),
                    Selection::FragmentSpread(spread) => {
                        let fragment = *self
                            .fragments
                            .get(spread.fragment_name.as_str())
                            .ok_or_else(|| DocumentError::UnknownFragment(spread.fragment_name.clone()))?;

                        Selection::InlineFragment(InlineFragment {
                            type_condition: Some(fragment.type_condition.clone()),
                            directives: spread.directives.clone(),
                            selection_set: self.fragment(fragment)?,
                        })
                    }
                })
            })
            .collect()
    }

    fn fragment(&mut self, fragment: &'a Fragment) -> Result<Vec<Selection>, DocumentError> {
        let name = fragment.name.as_str();
        if let Some(selections) = self.inlined.get(name) {
            return Ok(selections.clone());
        }
        if !self.visiting.insert(name) {
            return Err(DocumentError::FragmentCycle(fragment.name.clone()));
        }

        let selections = self.selection_set(&fragment.selection_set)?;

        self.visiting.remove(name);
        self.inlined.insert(name, selections.clone());
        Ok(selections)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::document::parse_document;

    #[test]
    fn inlines_nested_fragments() {
        let document = parse_document(indoc! {r#"
            query FullQuery {
              dashboard {
                ...DashboardFragment
              }
            }

            fragment DashboardFragment on Dashboard {
              id
              topActivity {
                ...ActivityFragment
              }
            }

            fragment ActivityFragment on Activity {
              id
              title
            }
        "#})
        .unwrap();

        let inlined = inline_fragments(&document).unwrap();

        insta::assert_snapshot!(inlined, @r###"
        query FullQuery {
          dashboard {
            ... on Dashboard {
              id
              topActivity {
                ... on Activity {
                  id
                  title
                }
              }
            }
          }
        }
        "###);
    }

    #[test]
    fn inlined_documents_reparse_to_the_same_selections() {
        let document = parse_document(indoc! {r#"
            query FullQuery {
              dashboard {
                ...DashboardFragment
              }
            }

            fragment DashboardFragment on Dashboard {
              todoList {
                ...TodoFragment
              }
            }

            fragment TodoFragment on TodoItem {
              id
            }
        "#})
        .unwrap();

        let by_hand = parse_document(indoc! {r#"
            query FullQuery {
              dashboard {
                ... on Dashboard {
                  todoList {
                    ... on TodoItem {
                      id
                    }
                  }
                }
              }
            }
        "#})
        .unwrap();

        let inlined = inline_fragments(&document).unwrap();
        let reparsed = parse_document(&inlined.to_string()).unwrap();

        assert_eq!(reparsed, by_hand);
    }

    #[test]
    fn unknown_and_cyclic_fragments_fail() {
        let document = parse_document("query { a { ...Missing } }").unwrap();
        assert!(matches!(
            inline_fragments(&document),
            Err(DocumentError::UnknownFragment(name)) if name == "Missing"
        ));

        let document = parse_document(indoc! {r#"
            query { a { ...A } }
            fragment A on T { b { ...B } }
            fragment B on T { a { ...A } }
        "#})
        .unwrap();
        assert!(matches!(inline_fragments(&document), Err(DocumentError::FragmentCycle(_))));
    }
}
