//! An owned GraphQL executable document.
//!
//! The rewriting passes build new documents bottom-up, so unlike the parser's
//! read-only AST every node here owns its children. Arguments, variable
//! definitions and directive arguments are never inspected, they are kept as
//! the text the parser printed for them.

mod augment;
mod fragments;
mod parse;
mod print;

pub use augment::{augment_document, check_alias_conventions};
pub use fragments::inline_fragments;
pub use parse::{parse_document, parse_selection_set};
pub use print::print_selection_set;

pub const ALIAS_ENTITYCACHE_TYPENAME: &str = "__entityCacheTypeName";
pub const ALIAS_ENTITYCACHE_ID: &str = "__entityCacheId";
pub const TYPENAME_FIELD: &str = "__typename";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub definitions: Vec<Definition>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    Operation(Operation),
    Fragment(Fragment),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    /// The coordinate every field path of this kind of operation starts at.
    pub fn root_coordinate(self) -> &'static str {
        match self {
            OperationKind::Query => "Query",
            OperationKind::Mutation => "Mutation",
            OperationKind::Subscription => "Subscription",
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub variable_definitions: Vec<String>,
    pub directives: Vec<Directive>,
    pub selection_set: Vec<Selection>,
}

impl Operation {
    pub fn query(name: Option<String>, selection_set: Vec<Selection>) -> Self {
        Operation {
            kind: OperationKind::Query,
            name,
            variable_definitions: Vec::new(),
            directives: Vec::new(),
            selection_set,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub name: String,
    pub type_condition: String,
    pub directives: Vec<Directive>,
    pub selection_set: Vec<Selection>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Field(Field),
    InlineFragment(InlineFragment),
    FragmentSpread(FragmentSpread),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Field {
    pub alias: Option<String>,
    pub name: String,
    /// Printed argument list including the parentheses, empty when there are none.
    pub arguments: String,
    pub directives: Vec<Directive>,
    pub selection_set: Vec<Selection>,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Field {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn aliased(alias: impl Into<String>, name: impl Into<String>) -> Self {
        Field {
            alias: Some(alias.into()),
            name: name.into(),
            ..Default::default()
        }
    }

    /// The key this field will have in a response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InlineFragment {
    pub type_condition: Option<String>,
    pub directives: Vec<Directive>,
    pub selection_set: Vec<Selection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FragmentSpread {
    pub fragment_name: String,
    pub directives: Vec<Directive>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub name: String,
    pub arguments: String,
}

impl Document {
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.definitions.iter().filter_map(|definition| match definition {
            Definition::Operation(operation) => Some(operation),
            Definition::Fragment(_) => None,
        })
    }

    pub fn fragments(&self) -> impl Iterator<Item = &Fragment> {
        self.definitions.iter().filter_map(|definition| match definition {
            Definition::Fragment(fragment) => Some(fragment),
            Definition::Operation(_) => None,
        })
    }

    /// The operation to execute for an optional operation name.
    pub fn operation(&self, name: Option<&str>) -> Option<&Operation> {
        match name {
            Some(name) => self.operations().find(|operation| operation.name.as_deref() == Some(name)),
            None => self.operations().next(),
        }
    }

    /// True when the document only asks for schema introspection.
    pub fn is_introspection(&self) -> bool {
        let mut operations = self.operations().peekable();
        operations.peek().is_some()
            && operations.all(|operation| {
                !operation.selection_set.is_empty()
                    && operation.selection_set.iter().all(|selection| match selection {
                        Selection::Field(field) => field.name == "__schema" || field.name == "__type",
                        _ => false,
                    })
            })
    }
}
