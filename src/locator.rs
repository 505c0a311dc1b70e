//! Quote/text locator
//!
//! Anchors externally produced quotes (critique findings) back to byte
//! offsets in the live document. Strategies run in order and the first hit
//! wins:
//!
//! 1. exact match of the raw quote
//! 2. exact match of the trimmed quote
//! 3. first 20 characters of a longer trimmed quote
//! 4. approximate match over whitespace-normalized text, mapped back
//! 5. approximate match over the raw text
//!
//! An approximate step that fails internally (pattern too long, search too
//! large) falls through to the next strategy. Exhaustion yields `None`.

use crate::analysis::utils::text::floor_char_boundary;
use crate::config::LocatorSettings;
use crate::error::LocateError;
use serde::{Deserialize, Serialize};
use tracing::debug;

const PREFIX_CHARS: usize = 20;
const MAX_SEARCH_CELLS: usize = 40_000_000;

/// Half-open byte range in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Text with whitespace runs collapsed to one space, plus the original
/// byte offset of every normalized byte.
struct Normalized {
    text: String,
    origin: Vec<usize>,
}

impl Normalized {
    fn new(source: &str) -> Self {
        let mut text = String::with_capacity(source.len());
        let mut origin = Vec::with_capacity(source.len());
        let mut in_space = false;

        for (pos, c) in source.char_indices() {
            if c.is_whitespace() {
                if !in_space {
                    text.push(' ');
                    origin.push(pos);
                    in_space = true;
                }
                continue;
            }
            in_space = false;
            text.push(c);
            origin.extend(std::iter::repeat(pos).take(c.len_utf8()));
        }

        Self { text, origin }
    }

    /// Map a normalized range back to the original text
    fn to_original(&self, source: &str, range: TextRange) -> Option<TextRange> {
        let start = *self.origin.get(range.start)?;
        let last = *self.origin.get(range.end.checked_sub(1)?)?;
        let last_len = source[last..].chars().next()?.len_utf8();
        Some(TextRange::new(start, last + last_len))
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Typographic quotes and dashes compare equal to their ASCII forms
fn fold(c: char) -> char {
    match c {
        '‘' | '’' | '′' => '\'',
        '“' | '”' | '″' => '"',
        '–' | '—' => '-',
        _ => c.to_lowercase().next().unwrap_or(c),
    }
}

/// Configurable quote locator
#[derive(Debug, Clone, Default)]
pub struct QuoteLocator {
    settings: LocatorSettings,
}

impl QuoteLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: LocatorSettings) -> Self {
        Self { settings }
    }

    /// Locate `quote` in `full_text`
    pub fn find(&self, full_text: &str, quote: &str) -> Option<TextRange> {
        let trimmed = quote.trim();
        if full_text.trim().is_empty() || trimmed.is_empty() {
            return None;
        }

        if let Some(start) = full_text.find(quote) {
            return Some(TextRange::new(start, start + quote.len()));
        }

        if let Some(start) = full_text.find(trimmed) {
            return Some(TextRange::new(start, start + trimmed.len()));
        }

        if trimmed.chars().count() > PREFIX_CHARS {
            let prefix_end = trimmed
                .char_indices()
                .nth(PREFIX_CHARS)
                .map_or(trimmed.len(), |(i, _)| i);
            if let Some(start) = full_text.find(&trimmed[..prefix_end]) {
                let end = floor_char_boundary(full_text, start + trimmed.len());
                return Some(TextRange::new(start, end));
            }
        }

        match self.find_normalized(full_text, trimmed) {
            Ok(Some(range)) => return Some(range),
            Ok(None) => {}
            Err(e) => debug!("Normalized quote search skipped: {}", e),
        }

        match self.approximate(full_text, trimmed) {
            Ok(found) => found,
            Err(e) => {
                debug!("Approximate quote search skipped: {}", e);
                None
            }
        }
    }

    fn find_normalized(&self, full_text: &str, quote: &str) -> Result<Option<TextRange>, LocateError> {
        let normalized = Normalized::new(full_text);
        let pattern = collapse_whitespace(quote);

        let hit = match normalized.text.find(&pattern) {
            Some(start) => Some(TextRange::new(start, start + pattern.len())),
            None => self.approximate(&normalized.text, &pattern)?,
        };
        Ok(hit.and_then(|range| normalized.to_original(full_text, range)))
    }

    /// Lowest-edit-distance substring of `text` within the error budget.
    ///
    /// Semi-global edit distance over chars: the match may start and end
    /// anywhere in `text`; ties go to the earliest end.
    fn approximate(&self, text: &str, pattern: &str) -> Result<Option<TextRange>, LocateError> {
        let pat: Vec<char> = pattern.chars().map(fold).collect();
        let m = pat.len();
        if m == 0 {
            return Err(LocateError::EmptyPattern);
        }
        if m > self.settings.max_pattern_chars {
            return Err(LocateError::PatternTooLong {
                len: m,
                max: self.settings.max_pattern_chars,
            });
        }

        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let n = chars.len();
        if m.saturating_mul(n) > MAX_SEARCH_CELLS {
            return Err(LocateError::SearchBudgetExceeded);
        }

        let max_edits = (m as f64 * self.settings.max_error_ratio).ceil() as usize;

        // cost and alignment start (char index) per pattern prefix
        let mut prev: Vec<(usize, usize)> = (0..=m).map(|i| (i, 0)).collect();
        let mut cur: Vec<(usize, usize)> = vec![(0, 0); m + 1];
        let mut best: Option<(usize, usize, usize)> = None;

        for j in 1..=n {
            let tc = fold(chars[j - 1].1);
            cur[0] = (0, j);
            for i in 1..=m {
                let substitution = usize::from(pat[i - 1] != tc);
                let diag = (prev[i - 1].0 + substitution, prev[i - 1].1);
                let skip_pattern = (cur[i - 1].0 + 1, cur[i - 1].1);
                let skip_text = (prev[i].0 + 1, prev[i].1);

                let mut pick = diag;
                if skip_pattern.0 < pick.0 {
                    pick = skip_pattern;
                }
                if skip_text.0 < pick.0 {
                    pick = skip_text;
                }
                cur[i] = pick;
            }

            let (cost, start) = cur[m];
            if cost <= max_edits && start < j && best.map_or(true, |(c, _, _)| cost < c) {
                best = Some((cost, start, j));
            }
            std::mem::swap(&mut prev, &mut cur);
        }

        let Some((_, start, end)) = best else {
            return Ok(None);
        };

        let byte_start = chars[start].0;
        let byte_end = chars.get(end).map_or(text.len(), |(pos, _)| *pos);
        let candidate: String = text[byte_start..byte_end].chars().map(fold).collect();
        let expected: String = pat.iter().collect();
        let similarity = strsim::normalized_levenshtein(&candidate, &expected);
        if similarity + f64::EPSILON < 1.0 - self.settings.max_error_ratio {
            return Ok(None);
        }

        Ok(Some(TextRange::new(byte_start, byte_end)))
    }
}

/// Locate `quote` in `full_text` with default settings
pub fn find_quote_range(full_text: &str, quote: &str) -> Option<TextRange> {
    QuoteLocator::default().find(full_text, quote)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// One critique finding. `start_index`/`end_index` are filled in by
/// [`enrich_analysis_with_positions`] when the quote can be located.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Finding {
    pub issue: String,
    pub quote: Option<String>,
    pub suggestion: Option<String>,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingCategory {
    Plot,
    Character,
    Pacing,
    Setting,
    Prose,
    Dialogue,
}

impl FindingCategory {
    pub const ALL: [FindingCategory; 6] = [
        FindingCategory::Plot,
        FindingCategory::Character,
        FindingCategory::Pacing,
        FindingCategory::Setting,
        FindingCategory::Prose,
        FindingCategory::Dialogue,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FindingCategory::Plot => "plot",
            FindingCategory::Character => "character",
            FindingCategory::Pacing => "pacing",
            FindingCategory::Setting => "setting",
            FindingCategory::Prose => "prose",
            FindingCategory::Dialogue => "dialogue",
        }
    }
}

/// Externally produced chapter critique
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalAnalysis {
    pub summary: Option<String>,
    pub plot: Vec<Finding>,
    pub character: Vec<Finding>,
    pub pacing: Vec<Finding>,
    pub setting: Vec<Finding>,
    pub prose: Vec<Finding>,
    pub dialogue: Vec<Finding>,
}

impl ExternalAnalysis {
    pub fn findings(&self, category: FindingCategory) -> &[Finding] {
        match category {
            FindingCategory::Plot => &self.plot,
            FindingCategory::Character => &self.character,
            FindingCategory::Pacing => &self.pacing,
            FindingCategory::Setting => &self.setting,
            FindingCategory::Prose => &self.prose,
            FindingCategory::Dialogue => &self.dialogue,
        }
    }

    pub fn findings_mut(&mut self, category: FindingCategory) -> &mut Vec<Finding> {
        match category {
            FindingCategory::Plot => &mut self.plot,
            FindingCategory::Character => &mut self.character,
            FindingCategory::Pacing => &mut self.pacing,
            FindingCategory::Setting => &mut self.setting,
            FindingCategory::Prose => &mut self.prose,
            FindingCategory::Dialogue => &mut self.dialogue,
        }
    }
}

/// A located finding, ready to be rendered as a clickable highlight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickableIssue {
    pub category: FindingCategory,
    pub issue: String,
    pub quote: String,
    pub suggestion: Option<String>,
    pub severity: Severity,
    pub range: TextRange,
}

/// Copy of `result` with positions attached to every locatable finding.
/// Findings that cannot be located are kept without positions.
pub fn enrich_analysis_with_positions(result: &ExternalAnalysis, full_text: &str) -> ExternalAnalysis {
    let locator = QuoteLocator::default();
    let mut enriched = result.clone();

    for category in FindingCategory::ALL {
        for finding in enriched.findings_mut(category) {
            let Some(quote) = finding.quote.as_deref() else {
                continue;
            };
            if let Some(range) = locator.find(full_text, quote) {
                finding.start_index = Some(range.start);
                finding.end_index = Some(range.end);
            }
        }
    }

    enriched
}

/// All located findings across categories, in category order
pub fn extract_clickable_issues(result: &ExternalAnalysis, full_text: &str) -> Vec<ClickableIssue> {
    let locator = QuoteLocator::default();
    let mut issues = Vec::new();

    for category in FindingCategory::ALL {
        for finding in result.findings(category) {
            let Some(quote) = finding.quote.as_deref() else {
                continue;
            };
            let known = match (finding.start_index, finding.end_index) {
                (Some(start), Some(end))
                    if start < end
                        && end <= full_text.len()
                        && full_text.is_char_boundary(start)
                        && full_text.is_char_boundary(end) =>
                {
                    Some(TextRange::new(start, end))
                }
                _ => None,
            };
            let Some(range) = known.or_else(|| locator.find(full_text, quote)) else {
                continue;
            };

            issues.push(ClickableIssue {
                category,
                issue: finding.issue.clone(),
                quote: quote.to_string(),
                suggestion: finding.suggestion.clone(),
                severity: finding.severity,
                range,
            });
        }
    }

    issues
}
