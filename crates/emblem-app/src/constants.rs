//! Cross-cutting application constants.

/// Plain-integer file holding the resume cursor inside the output directory.
pub const RESUME_STATE_FILE: &str = ".resume_state";

/// Catalog document name, both in the output directory and at the bucket root.
pub const CATALOG_FILE: &str = "icon_map.json";

/// Reserved catalog key appended once a run completes.
pub const SENTINEL_KEY: &str = "default";
pub const SENTINEL_URL: &str = "https://placehold.co/60x60/EFEFEF/CCC?text=?";
pub const SENTINEL_DESCRIPTION: &str = "Default placeholder icon";

/// Identifier used when the classifier suggestion sanitizes to nothing.
pub const FALLBACK_KEY: &str = "generic_icon";
pub const FALLBACK_DESCRIPTION: &str = "No description available.";

/// Placeholder recorded for items the classifier could not identify.
pub const UNIDENTIFIED_KEY: &str = "error_icon";
pub const UNIDENTIFIED_DESCRIPTION: &str = "Failed to identify.";

/// Placeholder recorded when quota errors outlast the retry budget.
pub const RATE_LIMITED_KEY: &str = "error_rate_limit";
pub const RATE_LIMITED_DESCRIPTION: &str = "Failed to identify due to rate limits.";

pub const ASSET_EXTENSION: &str = "png";
pub const ASSET_CONTENT_TYPE: &str = "image/png";
pub const CATALOG_CONTENT_TYPE: &str = "application/json";

/// Default Gemini model used for classification.
pub const DEFAULT_CLASSIFIER_MODEL: &str = "gemini-2.5-flash";
