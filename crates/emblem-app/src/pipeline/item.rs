use crate::constants::{
    RATE_LIMITED_DESCRIPTION, RATE_LIMITED_KEY, UNIDENTIFIED_DESCRIPTION, UNIDENTIFIED_KEY,
};

/// One unit of work drawn from the item source.
///
/// `index` is the position in the source sequence and the only thing the
/// resume cursor refers to, so sources must yield items in a stable order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub index: usize,
    /// Originating slide (1-based). Only used for logging.
    pub group_hint: usize,
    pub content_locator: Option<String>,
}

impl Item {
    pub fn new(index: usize, group_hint: usize, content_locator: Option<String>) -> Self {
        Self {
            index,
            group_hint,
            content_locator,
        }
    }
}

/// Classifier output for a single item, before deduplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub suggested_key: String,
    pub description: String,
}

impl ClassificationResult {
    pub fn new(suggested_key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            suggested_key: suggested_key.into(),
            description: description.into(),
        }
    }

    /// Placeholder for a terminal classifier failure.
    pub fn unidentified() -> Self {
        Self::new(UNIDENTIFIED_KEY, UNIDENTIFIED_DESCRIPTION)
    }

    /// Placeholder for quota errors that outlasted the retry budget.
    pub fn rate_limited() -> Self {
        Self::new(RATE_LIMITED_KEY, RATE_LIMITED_DESCRIPTION)
    }

    pub fn is_placeholder(&self) -> bool {
        self.suggested_key == UNIDENTIFIED_KEY || self.suggested_key == RATE_LIMITED_KEY
    }
}
