//! Purpose: Define the stable public Rust API boundary for strata.
//! Exports: Resolver types, archive reader, layout configuration, outcomes, and errors.
//! Role: Public, additive-only surface for hosts embedding the resolver.
//! Invariants: Hosts depend on this module rather than on `core` paths.

pub use crate::core::archive::{Archive, Layer};
pub use crate::core::error::{Error, ErrorKind, to_exit_code};
pub use crate::core::extract::{
    SkipReason, SubordinateOutcome, SubordinateStatus, declared_subordinates,
};
pub use crate::core::group::{GroupDescriptor, ProductInfo};
pub use crate::core::layout::Layout;
pub use crate::core::manifest::{Attributes, Manifest};
pub use crate::core::resolver::{LayeredResolver, ResolvedUnit, ResourceLocation, Resolver};
