/// Keyword pattern matching for log lines
pub mod patterns;

/// Structured extraction of matched lines
pub mod extractor;

pub use extractor::ErrorExtractor;
pub use patterns::{PatternMatch, PatternSet};
