use crate::document::{PageIndex, PageText};
use crate::models::Indicator;
use std::collections::HashSet;
use std::fmt;

pub const DEFAULT_MAX_PAGES: usize = 15;

const PAGE_DELIMITER: &str = "\n\n";

/// Search terms for one indicator: every word of its name plus every hint phrase.
/// Duplicates are dropped case-insensitively, first occurrence wins.
pub fn derive_keywords(indicator: &Indicator) -> Vec<String> {
    let mut seen = HashSet::new();

    indicator
        .name
        .split_whitespace()
        .map(str::to_string)
        .chain(indicator.hint_phrases())
        .filter(|keyword| seen.insert(keyword.to_lowercase()))
        .collect()
}

pub fn page_marker(number: usize) -> String {
    format!("--- PAGE {number} ---")
}

/// Pages picked for one query, held in reading order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextBlob {
    pages: Vec<PageText>,
}

impl ContextBlob {
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// One-based page numbers, ascending.
    pub fn page_numbers(&self) -> Vec<usize> {
        self.pages.iter().map(PageText::number).collect()
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ContextBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, page) in self.pages.iter().enumerate() {
            if position > 0 {
                f.write_str(PAGE_DELIMITER)?;
            }
            write!(f, "{}\n{}", page_marker(page.number()), page.text)?;
        }
        Ok(())
    }
}

/// Bounds how much of a document is sent to the model for one indicator.
#[derive(Debug, Clone, Copy)]
pub struct ContextSelector {
    max_pages: usize,
}

impl Default for ContextSelector {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAGES)
    }
}

impl ContextSelector {
    pub fn new(max_pages: usize) -> Self {
        Self { max_pages }
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// Picks the highest-scoring pages (ties go to the earlier page), then
    /// restores document order for presentation.
    pub fn select(&self, index: &PageIndex, keywords: &[String]) -> ContextBlob {
        let mut ranked = index.relevance(keywords).into_iter().collect::<Vec<_>>();
        ranked.sort_by(|(left_page, left_score), (right_page, right_score)| {
            right_score
                .cmp(left_score)
                .then_with(|| left_page.cmp(right_page))
        });
        ranked.truncate(self.max_pages);

        let mut chosen = ranked
            .into_iter()
            .map(|(page, _score)| page)
            .collect::<Vec<_>>();
        chosen.sort_unstable();

        let pages = chosen
            .into_iter()
            .filter_map(|page| {
                index.page_text(page).map(|text| PageText {
                    index: page,
                    text: text.to_string(),
                })
            })
            .collect();

        ContextBlob { pages }
    }

    pub fn context_for(&self, index: &PageIndex, indicator: &Indicator) -> ContextBlob {
        self.select(index, &derive_keywords(indicator))
    }
}
