pub mod store;

pub use store::{Mutation, Pipeline, Store, StoreError, StoreInner, StoreResult};
