//! Browser page renderer using Playwright
//!
//! Each render opens a fresh page in one shared Chromium context, waits for
//! navigation, reads the rendered DOM and closes the page again. The browser
//! itself lives until [`PageRenderer::close`] is called when the run's
//! session is released.

use anyhow::{Context, Result};
use async_trait::async_trait;
use playwright::api::{Browser, BrowserContext};
use playwright::Playwright;
use std::path::PathBuf;
use tokio::sync::Mutex;

use crate::driver::traits::{PageRenderer, RenderedPage};

/// Browser renderer configuration
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub headless: bool,
    /// Explicit Chromium executable; otherwise a system browser is searched
    pub executable: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        let headless = std::env::var("LUMI_HEADLESS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);

        let executable = std::env::var("PLAYWRIGHT_CHROMIUM_EXECUTABLE_PATH")
            .ok()
            .map(PathBuf::from)
            .or_else(find_system_browser);

        Self {
            headless,
            executable,
        }
    }
}

struct BrowserSession {
    #[allow(dead_code)]
    playwright: Playwright,
    browser: Browser,
    context: BrowserContext,
}

/// Page renderer driving headless Chromium
pub struct BrowserPageRenderer {
    session: Mutex<Option<BrowserSession>>,
}

impl BrowserPageRenderer {
    /// Launch the browser
    pub async fn launch(config: BrowserConfig) -> Result<Self> {
        let playwright = Playwright::initialize()
            .await
            .context("Failed to initialize Playwright")?;

        let chromium = playwright.chromium();
        let mut launcher = chromium.launcher().headless(config.headless);

        if let Some(ref path) = config.executable {
            log::info!("Using browser executable: {}", path.display());
            launcher = launcher.executable(path);
        } else {
            log::info!("No browser executable found, using Playwright's default");
        }

        let args: Vec<String> = [
            "--no-sandbox",
            "--disable-setuid-sandbox",
            "--disable-dev-shm-usage",
            "--disable-gpu",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        launcher = launcher.args(&args);

        let browser = launcher.launch().await.context("Failed to launch Chromium")?;
        let context = browser
            .context_builder()
            .build()
            .await
            .context("Failed to create browser context")?;

        Ok(Self {
            session: Mutex::new(Some(BrowserSession {
                playwright,
                browser,
                context,
            })),
        })
    }
}

#[async_trait]
impl PageRenderer for BrowserPageRenderer {
    async fn render(&self, url: &str) -> Result<RenderedPage> {
        let page = {
            let guard = self.session.lock().await;
            let session = guard
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("Browser session already closed"))?;
            session.context.new_page().await?
        };

        let navigation = page
            .goto_builder(url)
            .goto()
            .await
            .context("Failed to navigate to URL");

        let rendered = match navigation {
            Ok(response) => {
                let status = response
                    .and_then(|r| r.status().ok())
                    .map(|s| s as u16)
                    .unwrap_or(200);
                page.content()
                    .await
                    .context("Failed to read page content")
                    .map(|content| RenderedPage { status, content })
            }
            Err(e) => Err(e),
        };

        // Close the page on every path before reporting
        if let Err(e) = page.close(None).await {
            log::warn!("Failed to close page {}: {}", url, e);
        }

        rendered
    }

    async fn close(&self) -> Result<()> {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            session
                .browser
                .close()
                .await
                .context("Failed to close browser")?;
        }
        Ok(())
    }
}

fn find_system_browser() -> Option<PathBuf> {
    let common_paths = [
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ];

    common_paths
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}
