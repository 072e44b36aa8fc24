//! The entity tree: per coordinate state deciding which parts of a document
//! need to be fetched again.
//!
//! Nodes live in an arena and are addressed by their coordinates. The tree is
//! built from observations of entities in a previously cached response, each
//! telling whether the entity is invalidated.

use std::collections::{BTreeMap, HashMap};

use indexmap::{IndexMap, IndexSet};
use recache_config::ResolverConfig;

use crate::{
    entity::{EntityCacheResult, Id, PathPart},
    error::RewriteError,
};

pub type CacheResolvers = BTreeMap<String, ResolverConfig>;

const ROOT_COORDINATES: &str = "__root";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NodeState {
    /// The whole subtree must be fetched again.
    pub dirty: bool,
    pub invalidated: bool,
    /// The node must stay in the rewritten document.
    pub required: bool,
    pub list: bool,
}

#[derive(Debug)]
pub struct EntityTreeNode {
    pub coordinates: String,
    pub state: NodeState,
    /// Typename of the entity observed here, `None` for plain objects.
    pub typename: Option<String>,
    pub resolvers: IndexMap<String, ResolverConfig>,
    /// Ids to fetch through a resolver, per typename.
    pub required_ids: IndexMap<String, IndexSet<Id>>,
    children: IndexMap<String, NodeId>,
}

impl EntityTreeNode {
    fn new(coordinates: String, list: bool) -> Self {
        EntityTreeNode {
            coordinates,
            state: NodeState {
                list,
                ..Default::default()
            },
            typename: None,
            resolvers: IndexMap::new(),
            required_ids: IndexMap::new(),
            children: IndexMap::new(),
        }
    }

    pub fn is_entity(&self) -> bool {
        self.typename.is_some()
    }

    pub fn has_resolver(&self) -> bool {
        !self.resolvers.is_empty()
    }

    pub fn child_names(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }
}

/// Which selections of a selection set survive the rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeepSelections {
    All,
    /// Response keys to keep, anything else is pruned.
    Only(IndexSet<String>),
}

impl KeepSelections {
    pub fn keeps(&self, response_key: &str) -> bool {
        match self {
            KeepSelections::All => true,
            KeepSelections::Only(keys) => keys.contains(response_key),
        }
    }
}

pub struct EntityTree {
    nodes: Vec<EntityTreeNode>,
    by_coordinates: HashMap<String, NodeId>,
}

impl Default for EntityTree {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityTree {
    pub fn new() -> Self {
        let mut tree = EntityTree {
            nodes: vec![EntityTreeNode::new(ROOT_COORDINATES.to_string(), false)],
            by_coordinates: HashMap::from([(ROOT_COORDINATES.to_string(), NodeId(0))]),
        };
        tree.child(tree.root(), &PathPart::field("Query"));
        tree
    }

    pub fn from_observations<'a>(
        observations: impl IntoIterator<Item = &'a EntityCacheResult>,
        resolvers: &CacheResolvers,
    ) -> Result<Self, RewriteError> {
        let mut tree = EntityTree::new();
        for observation in observations {
            tree.build_node(observation, resolvers)?;
        }
        Ok(tree)
    }

    fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, coordinates: &str) -> Option<&EntityTreeNode> {
        self.by_coordinates.get(coordinates).map(|id| &self.nodes[id.0])
    }

    /// Adds one observation to the tree.
    pub fn build_node(&mut self, observation: &EntityCacheResult, resolvers: &CacheResolvers) -> Result<(), RewriteError> {
        if observation.path.is_empty() {
            return Err(RewriteError::EmptyPath);
        }
        self.build_step(self.root(), observation, resolvers, 0);
        Ok(())
    }

    fn build_step(&mut self, parent: NodeId, observation: &EntityCacheResult, resolvers: &CacheResolvers, depth: usize) {
        let part = &observation.path[depth];
        let is_terminal = depth + 1 == observation.path.len();
        let typename = &observation.entity.typename;
        let child = self.child(parent, part);

        if is_terminal {
            let node = &mut self.nodes[child.0];
            node.typename = Some(typename.clone());
            if let Some(resolver) = resolvers.get(typename) {
                node.resolvers.insert(typename.clone(), resolver.clone());
            }
            if observation.invalidated {
                node.state.invalidated = true;
                node.state.required = true;
                self.flag_branch_dirty(child);
            }
        }

        if self.nodes[parent.0].state.dirty {
            self.flag_branch_dirty(child);
        }

        if !is_terminal {
            self.build_step(child, observation, resolvers, depth + 1);
        }

        let node = &mut self.nodes[child.0];
        if !node.state.required {
            return;
        }
        let propagate = !node.has_resolver();

        let (required_typename, id) = if is_terminal {
            (typename, observation.entity.id.as_ref().filter(|_| observation.invalidated))
        } else if part.is_list() {
            // the list member, whose type is known once it was observed itself
            (node.typename.as_ref().unwrap_or(typename), part.id.as_ref())
        } else {
            (typename, None)
        };
        let ids = node.required_ids.entry(required_typename.clone()).or_default();
        if let Some(id) = id {
            ids.insert(id.clone());
        }

        if propagate {
            self.nodes[parent.0].state.required = true;
        }
    }

    fn child(&mut self, parent: NodeId, part: &PathPart) -> NodeId {
        if let Some(id) = self.nodes[parent.0].children.get(&part.field) {
            return *id;
        }

        let coordinates = match parent {
            NodeId(0) => part.field.clone(),
            _ => format!("{}.{}", self.nodes[parent.0].coordinates, part.field),
        };
        let id = NodeId(self.nodes.len());
        self.nodes.push(EntityTreeNode::new(coordinates.clone(), part.is_list()));
        self.by_coordinates.insert(coordinates, id);
        self.nodes[parent.0].children.insert(part.field.clone(), id);
        id
    }

    /// Marks a node and everything below it as dirty. Nodes with their own
    /// resolver start a new scope and stop the propagation unless they are
    /// invalidated themselves.
    fn flag_branch_dirty(&mut self, start: NodeId) {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let node = &mut self.nodes[id.0];
            if node.state.dirty || (node.has_resolver() && !node.state.invalidated) {
                continue;
            }
            node.state.dirty = true;
            stack.extend(node.children.values().copied());
        }
    }

    pub fn selections_to_keep(&self, coordinates: &str) -> KeepSelections {
        let Some(node) = self.node(coordinates) else {
            return KeepSelections::All;
        };
        let state = node.state;

        if state.dirty {
            KeepSelections::All
        } else if state.required && (state.list || !node.is_entity()) {
            KeepSelections::All
        } else if state.required {
            KeepSelections::Only(node.child_names().map(str::to_string).collect())
        } else if node.has_resolver() {
            KeepSelections::All
        } else {
            KeepSelections::Only(IndexSet::new())
        }
    }
}
