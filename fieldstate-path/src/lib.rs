//! Path addressing for nested value trees
//!
//! `fieldstate-path` parses dotted/bracketed field names (`user.emails[0].address`)
//! and reads, writes, removes and tests values at those paths inside a single
//! `serde_json::Value` tree. Everything here is pure: no hidden state, no I/O.
//!
//! ```rust
//! use fieldstate_path::{get, set, Path};
//! use serde_json::json;
//!
//! let path: Path = "user.emails[0]".parse().unwrap();
//! let root = set(json!({}), &path, json!("a@b.c")).unwrap();
//! assert_eq!(get(&root, &path), Some(&json!("a@b.c")));
//! ```

pub mod error;
pub mod path;
pub mod tree;

pub use error::{PathError, Result};
pub use path::{ChildIndex, Path, Segment};
pub use tree::{get, get_mut, has, remove, remove_in, set, set_in, step};
