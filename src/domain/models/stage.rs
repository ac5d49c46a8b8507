//! Names of the transform pipeline stages eligible for mutation.
//!
//! Fixture dimension failures, feedback categories and drift recommendations
//! all resolve to names in this space so their signals can be summed.

pub const CONTENT_EXTRACTION: &str = "content_extraction";
pub const ARTIFACT_STRIPPING: &str = "artifact_stripping";
pub const ECHO_REMOVAL: &str = "echo_removal";
pub const STRUCTURE_REPAIR: &str = "structure_repair";
pub const LENGTH_LIMITING: &str = "length_limiting";
pub const NOISE_FILTERING: &str = "noise_filtering";
pub const PROMPT_INSTRUCTIONS: &str = "prompt_instructions";

/// All known stages in pipeline order.
pub const ALL: [&str; 7] = [
    CONTENT_EXTRACTION,
    ARTIFACT_STRIPPING,
    ECHO_REMOVAL,
    NOISE_FILTERING,
    STRUCTURE_REPAIR,
    LENGTH_LIMITING,
    PROMPT_INSTRUCTIONS,
];
