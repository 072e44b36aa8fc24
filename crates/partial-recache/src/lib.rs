//! Partial caching of GraphQL responses with entity level invalidation.
//!
//! Every cached response remembers which entities it contains and where they
//! were observed. Once some of those entities are invalidated, the next read
//! of the response does not start from scratch: the original query is
//! rewritten so that only the paths leading to stale entities are executed
//! again, and the fresh data is merged back into the cached response.
//!
//! A request goes through a few phases:
//!
//! 1. The query is augmented so that every entity exposes its typename and id
//!    under reserved aliases.
//! 2. The [`InvalidationStrategy`] decides what needs to be executed again,
//!    either from a plan computed at invalidation time (eager) or from the
//!    entity references recorded with the response (lazy).
//! 3. The partial query runs, followed by rounds of link queries for entities
//!    that can be fetched from a root resolver.
//! 4. The results are merged, stored with their entity references and
//!    returned to the caller.

mod alias;
mod collect;
mod coordinates;
mod document;
mod entity;
mod error;
mod execution;
mod format;
mod keys;
mod links;
mod merge;
mod processor;
mod resolution;
mod result;
mod rewrite;
mod runner;
mod strategy;
mod tree;

pub use self::{
    collect::collect_entity_records,
    coordinates::CoordinateTracker,
    document::{augment_document, parse_document, Document},
    entity::{CollectedEntity, EntityCacheResult, EntityRecord, Id, KnownEntities, PathPart},
    error::{DocumentError, RewriteError, RunnerError, StrategyError},
    execution::{ExecutionRequest, Executor},
    keys::{entity_key, response_cache_key},
    merge::strip_entity_aliases,
    result::{CacheMetadata, ExecutionResponse, CACHE_EXTENSION},
    rewrite::{partial_recache_query, LinkSelections, PartialQuery},
    runner::{CacheRequest, PartialCache},
    strategy::{EagerStrategy, InvalidationStrategy, LazyStrategy, PartialExecutionOpts, StoreRequest},
    tree::{CacheResolvers, EntityTree},
};
