//! keytree Path - hierarchical view over a flat key namespace
//!
//! The backing store only knows flat keys. This crate infers directories
//! from separator-delimited prefixes and assembles the nested [`Node`] tree
//! the browsing UI renders. Everything here is synchronous and I/O free;
//! lease TTLs are resolved by the caller beforehand and passed in as a
//! [`LeaseTable`].

pub mod builder;
pub mod lease;
pub mod node;
pub mod path;

pub use builder::PathTreeBuilder;
pub use lease::LeaseTable;
pub use node::Node;
pub use path::KeyPath;
