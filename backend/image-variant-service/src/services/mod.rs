/// Service layer
///
/// - Variants: tiered image variant generation for uploaded originals
pub mod variants;

pub use variants::VariantService;
