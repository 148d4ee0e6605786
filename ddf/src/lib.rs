//! # DDF — Dynamic Dataflow
//!
//! A self-describing, tagged value tree with a stable binary
//! serialization, used to marshal a caller-supplied "custom object" into
//! a `ScriptedKeyStrategy` and, more generally, as an interprocess value
//! format.
//!
//! A [`Ddf`] is an arena of nodes addressed by [`NodeId`]. Trees are not
//! thread-safe: callers must serialize access to a given tree. Distinct
//! `Ddf` instances are independent and may be used concurrently from
//! different threads.
//!
//! ```
//! use ddf::Ddf;
//!
//! let mut tree = Ddf::new();
//! let root = tree.structure();
//! let answer = tree.integer(42);
//! tree.set_name(answer, "answer");
//! tree.add(root, answer).unwrap();
//!
//! let bytes = ddf::wire::encode(&tree, root);
//! let decoded = ddf::wire::decode(&mut tree, &bytes).unwrap();
//! assert!(tree.structural_eq(root, decoded));
//! ```

mod error;
mod tree;
pub mod wire;

pub use error::{DecodeError, TreeError};
pub use tree::{Ddf, NodeId, PointerId, Tag};
