//! Relation resolution engine and the operation tree it produces.

mod resolve;
mod tree;

pub use resolve::{RelationOp, RelationResolver, ACTION_TAG};
pub use tree::{DeleteMany, ListOps, Record, RelationWrite, SingleOp, UpdateOp, WriteData};
