//! Path-to-metadata resolution engine for arcindex.
//!
//! Maps archive paths to catalogue records via an immutable prefix-tree
//! snapshot with an overlay point-lookup cache, derives stable document ids,
//! filters paths by prefix policy, and builds directory metadata documents.

pub mod catalogue;
pub mod doc_id;
pub mod filter;
pub mod metadata;
pub mod tree;

pub use catalogue::{CatalogueRecord, CatalogueSource, PathResolver, RefreshTimer, StaticCatalogue};
pub use doc_id::{drop_invalid_utf8, generate_id, generate_id_bytes};
pub use filter::{FilterPolicy, PathFilter};
pub use metadata::{DirMetadata, generate_path_metadata, read_readme};
pub use tree::PathTrie;
