mod page;
mod widgets;

use thirtyfour::ChromiumLikeCapabilities;
use thirtyfour::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use crate::markup::MarkupError;

pub use page::WidgetPage;
pub use widgets::{chart_points, cloud_tags, extract_chart, extract_cloud, extract_histograms};

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("webdriver error: {0}")]
    WebDriver(#[from] WebDriverError),
    #[error("markup error: {0}")]
    Markup(#[from] MarkupError),
    #[error("unexpected script result: {0}")]
    Script(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub webdriver_url: String,
    pub headless: bool,
    pub window_size: (u32, u32),
}

impl BrowserSettings {
    pub fn new(webdriver_url: impl Into<String>) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
            headless: true,
            window_size: (1920, 1080),
        }
    }
}

/// One Chrome session behind a WebDriver server, shared by every source of
/// a run and released with [`Browser::close`].
pub struct Browser {
    driver: WebDriver,
}

impl Browser {
    pub async fn launch(settings: &BrowserSettings) -> Result<Self, BrowserError> {
        let mut caps = DesiredCapabilities::chrome();
        if settings.headless {
            caps.add_arg("--headless=new")?;
        }
        caps.add_arg("--no-sandbox")?;
        caps.add_arg("--disable-dev-shm-usage")?;
        let (width, height) = settings.window_size;
        caps.add_arg(&format!("--window-size={width},{height}"))?;

        let driver = WebDriver::new(settings.webdriver_url.as_str(), caps).await?;
        info!(
            webdriver = %settings.webdriver_url,
            headless = settings.headless,
            "browser session started"
        );
        Ok(Self { driver })
    }

    pub fn driver(&self) -> &WebDriver {
        &self.driver
    }

    pub async fn open(&self, url: &str) -> Result<(), BrowserError> {
        debug!(url, "navigating");
        self.driver.goto(url).await?;
        Ok(())
    }

    pub async fn close(self) -> Result<(), BrowserError> {
        self.driver.quit().await?;
        info!("browser session closed");
        Ok(())
    }
}
