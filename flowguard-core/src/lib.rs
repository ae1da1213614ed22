#![forbid(unsafe_code)]

mod error;
mod guard;
mod scope;
mod transform;
mod types;
mod verifier;
mod visit;

pub use error::TransformError;
pub use guard::{actual_category, build_guard, build_test, Site, SiteKind};
pub use scope::{NameAllocator, Scopes};
pub use transform::{transform_program, TransformOutput, TransformStats};
pub use types::{
    describe_tags, extract_types, is_unguardable, permits_nully, Annotations, NumericWidth,
    ShapeField, TypeTag,
};
pub use verifier::{verify, ConstantLookup, NoConstants, Verdict, Verifier};
