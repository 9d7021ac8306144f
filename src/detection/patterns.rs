use log::debug;
use regex::{Regex, RegexBuilder};

/// Ordered set of error keyword patterns
///
/// Each keyword is compiled as an independent, case-insensitive regular
/// expression searched anywhere in the line. Patterns are tested in the order
/// they were configured and the first one that matches wins, so a line that
/// contains several keywords reports only the earliest configured one. That
/// keeps one alert per line; do not change it to report every match.
#[derive(Debug, Clone)]
pub struct PatternSet {
    keywords: Vec<String>,
    patterns: Vec<Regex>,
}

/// Result of a successful classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternMatch<'a> {
    /// The configured keyword that matched
    pub keyword: &'a str,
    /// Position of the keyword in the configured order
    pub index: usize,
    /// Byte offset in the line where the match starts
    pub position: usize,
}

impl PatternSet {
    /// Compile a pattern set from keywords in priority order
    ///
    /// # Errors
    ///
    /// Returns the regex error for the first keyword that is not a valid
    /// pattern.
    pub fn new<I, S>(keywords: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keywords: Vec<String> = keywords.into_iter().map(Into::into).collect();
        let patterns = keywords
            .iter()
            .map(|keyword| RegexBuilder::new(keyword).case_insensitive(true).build())
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Compiled {} error patterns", patterns.len());
        Ok(Self { keywords, patterns })
    }

    /// Classify a line against the configured patterns
    ///
    /// Returns `None` when no pattern matches, including when the set is empty.
    pub fn classify(&self, line: &str) -> Option<PatternMatch<'_>> {
        self.patterns
            .iter()
            .zip(&self.keywords)
            .enumerate()
            .find_map(|(index, (pattern, keyword))| {
                pattern.find(line).map(|m| PatternMatch {
                    keyword: keyword.as_str(),
                    index,
                    position: m.start(),
                })
            })
    }

    /// Configured keywords in priority order
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
