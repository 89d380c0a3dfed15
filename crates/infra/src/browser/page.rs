use std::time::Duration;

use harvest_core::domain::comments::Snapshot;
use harvest_core::harvest::{PageError, PageSource};
use harvest_core::types::source_key::SourceKey;
use serde::Deserialize;
use serde_json::json;
use thirtyfour::prelude::*;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::markup::{CommentMarkup, parse_comment_snapshot};

const FIND_AND_SCROLL_JS: &str = r#"
const button = document.evaluate(arguments[0], document, null,
    XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
if (!button) { return { found: false, marker: null }; }
button.scrollIntoView({ behavior: 'auto', block: 'center' });
return { found: true, marker: button.getAttribute(arguments[1]) };
"#;

const CLICK_JS: &str = r#"
const button = document.evaluate(arguments[0], document, null,
    XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
if (!button) { return false; }
button.click();
return true;
"#;

const PROGRESS_JS: &str = r#"
const root = document.querySelector(arguments[3]) || document;
const count = [...root.querySelectorAll('span[' + arguments[2] + ']')]
    .filter(span => span.getAttribute(arguments[2])).length;
const button = document.evaluate(arguments[0], document, null,
    XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
return { count: count, marker: button ? button.getAttribute(arguments[1]) : null };
"#;

#[derive(Debug, Deserialize)]
struct ButtonState {
    found: bool,
    marker: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Progress {
    count: usize,
    marker: Option<String>,
}

/// Comment widget of one source page, driven through the browser.
pub struct WidgetPage<'a> {
    driver: &'a WebDriver,
    source: SourceKey,
    markup: CommentMarkup,
    marker_before_click: Option<String>,
    poll_interval: Duration,
    scroll_pause: Duration,
}

impl<'a> WidgetPage<'a> {
    pub fn new(driver: &'a WebDriver, source: SourceKey) -> Self {
        Self {
            driver,
            source,
            markup: CommentMarkup::default(),
            marker_before_click: None,
            poll_interval: Duration::from_millis(500),
            scroll_pause: Duration::from_millis(150),
        }
    }

    pub fn with_markup(mut self, markup: CommentMarkup) -> Self {
        self.markup = markup;
        self
    }

    async fn progress(&self, xpath: &str) -> Result<Progress, WebDriverError> {
        let args = vec![
            json!(xpath),
            json!(self.markup.marker_attr),
            json!(self.markup.id_attr),
            json!(self.markup.report_selector),
        ];
        self.driver.execute(PROGRESS_JS, args).await?.convert()
    }
}

impl PageSource for WidgetPage<'_> {
    async fn snapshot(&mut self) -> Result<Snapshot, PageError> {
        let html = self
            .driver
            .source()
            .await
            .map_err(|err| PageError(err.to_string()))?;
        parse_comment_snapshot(&html, &self.markup).map_err(|err| PageError(err.to_string()))
    }

    async fn reveal_more(&mut self) -> bool {
        let xpath = self.markup.load_more_xpath();
        let args = vec![json!(xpath), json!(self.markup.marker_attr)];
        let state = match self.driver.execute(FIND_AND_SCROLL_JS, args).await {
            Ok(ret) => ret.convert::<ButtonState>(),
            Err(err) => Err(err),
        };
        let state = match state {
            Ok(state) => state,
            Err(err) => {
                warn!(source = %self.source, error = %err, "load more button lookup failed");
                return false;
            }
        };
        if !state.found {
            debug!(source = %self.source, "load more button not rendered");
            return false;
        }
        self.marker_before_click = state.marker;

        sleep(self.scroll_pause).await;
        match self.driver.execute(CLICK_JS, vec![json!(xpath)]).await {
            Ok(ret) => ret.convert::<bool>().unwrap_or(false),
            Err(err) => {
                warn!(source = %self.source, error = %err, "load more click failed");
                false
            }
        }
    }

    async fn await_progress(&mut self, baseline: usize, timeout: Duration) -> bool {
        let xpath = self.markup.load_more_xpath();
        let deadline = Instant::now() + timeout;
        loop {
            match self.progress(&xpath).await {
                Ok(progress) => {
                    let marker_moved = match (&self.marker_before_click, &progress.marker) {
                        (Some(before), Some(now)) => before != now,
                        _ => false,
                    };
                    if marker_moved || progress.count > baseline {
                        debug!(
                            source = %self.source,
                            count = progress.count,
                            baseline,
                            marker_moved,
                            "progress detected"
                        );
                        return true;
                    }
                }
                Err(err) => debug!(source = %self.source, error = %err, "progress probe failed"),
            }
            if Instant::now() + self.poll_interval > deadline {
                return false;
            }
            sleep(self.poll_interval).await;
        }
    }
}
