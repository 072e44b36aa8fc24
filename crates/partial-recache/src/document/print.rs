use std::fmt;

use super::{Definition, Directive, Document, Fragment, Operation, OperationKind, Selection};

macro_rules! write_indent {
    ($f:expr, $level:expr) => {
        write!($f, "{:indent$}", "", indent = $level * 2)
    };
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, definition) in self.definitions.iter().enumerate() {
            if index != 0 {
                write!(f, "\n\n")?;
            }
            match definition {
                Definition::Operation(operation) => write!(f, "{operation}")?,
                Definition::Fragment(fragment) => write!(f, "{fragment}")?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shorthand = self.kind == OperationKind::Query
            && self.name.is_none()
            && self.variable_definitions.is_empty()
            && self.directives.is_empty();

        if shorthand {
            return write!(f, "{}", SelectionSet::new(&self.selection_set));
        }

        write!(f, "{}", self.kind.keyword())?;
        if let Some(name) = &self.name {
            write!(f, " {name}")?;
        }
        if !self.variable_definitions.is_empty() {
            if self.name.is_none() {
                write!(f, " ")?;
            }
            write!(f, "({})", self.variable_definitions.join(", "))?;
        }
        write!(
            f,
            "{} {}",
            Directives(&self.directives),
            SelectionSet::new(&self.selection_set)
        )
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fragment {} on {}{} {}",
            self.name,
            self.type_condition,
            Directives(&self.directives),
            SelectionSet::new(&self.selection_set)
        )
    }
}

/// Prints a selection set on its own, as stored for link selections.
pub fn print_selection_set(selections: &[Selection]) -> String {
    SelectionSet::new(selections).to_string()
}

struct SelectionSet<'a> {
    selections: &'a [Selection],
    indent_level: usize,
}

impl<'a> SelectionSet<'a> {
    fn new(selections: &'a [Selection]) -> Self {
        SelectionSet {
            selections,
            indent_level: 0,
        }
    }
}

impl fmt::Display for SelectionSet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.selections.is_empty() {
            return write!(f, "{{}}");
        }
        writeln!(f, "{{")?;
        for selection in self.selections {
            let selection = PrintedSelection {
                selection,
                indent_level: self.indent_level + 1,
            };
            writeln!(f, "{selection}")?;
        }
        write_indent!(f, self.indent_level)?;
        write!(f, "}}")
    }
}

struct PrintedSelection<'a> {
    selection: &'a Selection,
    indent_level: usize,
}

impl<'a> PrintedSelection<'a> {
    fn wrap_set(&self, selections: &'a [Selection]) -> SelectionSet<'a> {
        SelectionSet {
            selections,
            indent_level: self.indent_level,
        }
    }
}

impl fmt::Display for PrintedSelection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_indent!(f, self.indent_level)?;
        match self.selection {
            Selection::Field(field) => {
                if let Some(alias) = &field.alias {
                    write!(f, "{alias}: ")?;
                }
                write!(f, "{}{}{}", field.name, field.arguments, Directives(&field.directives))?;
                if !field.selection_set.is_empty() {
                    write!(f, " {}", self.wrap_set(&field.selection_set))?;
                }
                Ok(())
            }
            Selection::InlineFragment(fragment) => {
                write!(f, "...")?;
                if let Some(on_type) = &fragment.type_condition {
                    write!(f, " on {on_type}")?;
                }
                write!(
                    f,
                    "{} {}",
                    Directives(&fragment.directives),
                    self.wrap_set(&fragment.selection_set)
                )
            }
            Selection::FragmentSpread(spread) => {
                write!(f, "...{}{}", spread.fragment_name, Directives(&spread.directives))
            }
        }
    }
}

struct Directives<'a>(&'a [Directive]);

impl fmt::Display for Directives<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for directive in self.0 {
            write!(f, " @{}{}", directive.name, directive.arguments)?;
        }
        Ok(())
    }
}
