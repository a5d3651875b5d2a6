use crate::error::DocumentError;
use lopdf::Document;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, warn};

/// Plain text of one page. `index` is zero-based; `number()` is what a reader sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub index: usize,
    pub text: String,
}

impl PageText {
    pub fn number(&self) -> usize {
        self.index + 1
    }
}

/// Per-page text of one open document. Dropped as soon as the document is done.
#[derive(Debug, Clone, Default)]
pub struct PageIndex {
    pages: Vec<PageText>,
}

impl PageIndex {
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pages = texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| PageText {
                index,
                text: text.into(),
            })
            .collect();

        Self { pages }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page_text(&self, index: usize) -> Option<&str> {
        self.pages.get(index).map(|page| page.text.as_str())
    }

    pub fn pages(&self) -> &[PageText] {
        &self.pages
    }

    /// Counts, per page, how many distinct keywords occur as case-insensitive substrings.
    /// Pages with no match are left out of the map.
    pub fn relevance(&self, keywords: &[String]) -> BTreeMap<usize, usize> {
        let lowered_keywords = keywords
            .iter()
            .map(|keyword| keyword.to_lowercase())
            .filter(|keyword| !keyword.is_empty())
            .collect::<BTreeSet<_>>();

        let mut scores = BTreeMap::new();
        if lowered_keywords.is_empty() {
            return scores;
        }

        for page in &self.pages {
            let lowered = page.text.to_lowercase();
            let score = lowered_keywords
                .iter()
                .filter(|keyword| lowered.contains(keyword.as_str()))
                .count();

            if score > 0 {
                scores.insert(page.index, score);
            }
        }

        scores
    }
}

/// Text-extraction primitive: turns a report file into per-page text.
pub trait DocumentSource {
    fn open(&self, path: &Path) -> Result<PageIndex, DocumentError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfSource;

impl DocumentSource for LopdfSource {
    fn open(&self, path: &Path) -> Result<PageIndex, DocumentError> {
        if !path.is_file() {
            return Err(DocumentError::NotFound(path.display().to_string()));
        }

        let document =
            Document::load(path).map_err(|error| DocumentError::PdfParse(error.to_string()))?;

        let mut texts = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            // One unreadable page must not shift the numbering of the rest.
            let text = match document.extract_text(&[page_no]) {
                Ok(text) => text,
                Err(error) => {
                    warn!(
                        path = %path.display(),
                        page = page_no,
                        error = %error,
                        "page text unreadable"
                    );
                    String::new()
                }
            };
            texts.push(text);
        }

        // A text-less report still opens; every indicator then sees an empty context.
        if texts.iter().all(|text| text.trim().is_empty()) {
            warn!(path = %path.display(), pages = texts.len(), "pdf has no extractable text");
        }

        debug!(path = %path.display(), pages = texts.len(), "document opened");
        Ok(PageIndex::from_texts(texts))
    }
}
