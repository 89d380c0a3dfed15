mod comments;
mod histograms;

use scraper::{ElementRef, Selector};
use thiserror::Error;

pub use comments::{parse_comment_snapshot, parse_load_more_marker};
pub use histograms::parse_histograms;

#[derive(Debug, Error)]
pub enum MarkupError {
    #[error("invalid selector `{0}`")]
    Selector(String),
}

/// Attribute and selector names of the comment widget.
#[derive(Debug, Clone)]
pub struct CommentMarkup {
    pub report_selector: String,
    pub id_attr: String,
    pub author_attr: String,
    pub time_attr: String,
    pub marker_attr: String,
    /// Substring identifying the load-more button by title, label or text.
    pub load_more_label: String,
}

impl Default for CommentMarkup {
    fn default() -> Self {
        Self {
            report_selector: "div.report".to_string(),
            id_attr: "data-text".to_string(),
            author_attr: "data-author".to_string(),
            time_attr: "data-tick".to_string(),
            marker_attr: "data-last".to_string(),
            load_more_label: "Показать".to_string(),
        }
    }
}

impl CommentMarkup {
    /// XPath of the load-more button, for scripts running inside the page.
    pub fn load_more_xpath(&self) -> String {
        let label = &self.load_more_label;
        format!(
            "//button[contains(@data-title, '{label}') or contains(@aria-label, '{label}') or contains(text(), '{label}')]"
        )
    }
}

fn parse_selector(raw: &str) -> Result<Selector, MarkupError> {
    Selector::parse(raw).map_err(|_| MarkupError::Selector(raw.to_string()))
}

fn extract_text(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<Vec<_>>().join(""))
}

fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}
