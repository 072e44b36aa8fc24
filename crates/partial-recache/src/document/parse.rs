use cynic_parser::{common::OperationType, executable as ast};

use super::{
    Definition, Directive, Document, Field, Fragment, FragmentSpread, InlineFragment, Operation, OperationKind,
    Selection,
};
use crate::error::DocumentError;

pub fn parse_document(source: &str) -> Result<Document, DocumentError> {
    let parsed = cynic_parser::parse_executable_document(source).map_err(|err| DocumentError::Parse(err.to_string()))?;

    let operations = parsed.operations().map(|operation| {
        Definition::Operation(Operation {
            kind: match operation.operation_type() {
                OperationType::Query => OperationKind::Query,
                OperationType::Mutation => OperationKind::Mutation,
                OperationType::Subscription => OperationKind::Subscription,
            },
            name: operation.name().map(str::to_string),
            variable_definitions: operation
                .variable_definitions()
                .map(|definition| definition.to_string())
                .collect(),
            directives: directives(operation.directives()),
            selection_set: selection_set(operation.selection_set()),
        })
    });

    let fragments = parsed.fragments().map(|fragment| {
        Definition::Fragment(Fragment {
            name: fragment.name().to_string(),
            type_condition: fragment.type_condition().to_string(),
            directives: directives(fragment.directives()),
            selection_set: selection_set(fragment.selection_set()),
        })
    });

    Ok(Document {
        definitions: operations.chain(fragments).collect(),
    })
}

/// Parses a bare selection set, e.g. `{ id name }`.
pub fn parse_selection_set(source: &str) -> Result<Vec<Selection>, DocumentError> {
    let document = parse_document(source)?;
    match document.definitions.into_iter().next() {
        Some(Definition::Operation(operation)) => Ok(operation.selection_set),
        _ => Err(DocumentError::Parse(format!("expected a selection set, got `{source}`"))),
    }
}

fn selection_set<'a>(selections: ast::iter::Iter<'a, ast::Selection<'a>>) -> Vec<Selection> {
    selections
        .map(|selection| match selection {
            ast::Selection::Field(field) => Selection::Field(Field {
                alias: field.alias().map(str::to_string),
                name: field.name().to_string(),
                arguments: field.arguments().to_string(),
                directives: directives(field.directives()),
                selection_set: selection_set(field.selection_set()),
            }),
            ast::Selection::InlineFragment(fragment) => Selection::InlineFragment(InlineFragment {
                type_condition: fragment.type_condition().map(str::to_string),
                directives: directives(fragment.directives()),
                selection_set: selection_set(fragment.selection_set()),
            }),
            ast::Selection::FragmentSpread(spread) => Selection::FragmentSpread(FragmentSpread {
                fragment_name: spread.fragment_name().to_string(),
                directives: directives(spread.directives()),
            }),
        })
        .collect()
}

fn directives<'a>(directives: ast::iter::Iter<'a, ast::Directive<'a>>) -> Vec<Directive> {
    directives
        .map(|directive| Directive {
            name: directive.name().to_string(),
            arguments: directive.arguments().to_string(),
        })
        .collect()
}
