//! Identity-bearing entity abstraction shared by every persisted record.

use std::fmt;
use std::hash::Hash;

/// A persisted record addressable by a stable identifier.
///
/// Identifiers are UUID v7 wrappers, so ordering by id is creation order.
pub trait Entity: Clone + Send + Sync + 'static {
    type Id: Clone + Eq + Ord + Hash + fmt::Display + Send + Sync + 'static;

    fn id(&self) -> &Self::Id;
}
