//! geoflux-core: expression graph, operation catalog, and wire serialization
//!
//! This crate contains the pure computation-description logic of the Geoflux
//! client, with NO transport dependencies:
//! - Value and node types (the immutable expression graph)
//! - Operation signatures and the argument promotion gate
//! - The algorithm catalog, populated once from a fetcher
//! - Member binding (catalog namespaces exposed on domain types)
//! - Callback capture (native closures turned into function literals)
//! - Wire serialization with subtree deduplication
//!
//! The HTTP client, authentication, and the typed wrapper classes live in
//! sibling crates; they reach this one through [`catalog::CatalogFetcher`]
//! and the promotion hook in [`ops`].
//!
//! # Pipeline
//!
//! ```text
//! catalog fetch -> AlgorithmCatalog -> MemberTable::bind
//!                                            |
//! user code -> OpRef::invoke / capture -> ExprNode graph -> Serializer -> JSON
//! ```

pub mod bind;
pub mod capture;
pub mod catalog;
pub mod error;
pub mod node;
pub mod ops;
pub mod serializer;
pub mod signature;
pub mod value;

// Re-export commonly used types
pub use bind::{BoundMember, Member, MemberKind, MemberTable};
pub use capture::{count_function_literals, CapturedCallback};
pub use catalog::{AlgorithmCatalog, CatalogFetcher, FileCatalogSource, StaticCatalog};
pub use error::{ExprError, Result};
pub use node::ExprNode;
pub use ops::{
    clear_promoter, install_promoter, invoke_operation, promote, CatalogOperation, OpRef,
    PromoteFn,
};
pub use serializer::{Serializer, WireFormat};
pub use signature::{strip_generic, OperationSignature, ParameterSpec};
pub use value::Value;
