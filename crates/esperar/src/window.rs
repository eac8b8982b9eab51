//! Window, tab and navigation handling.

use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::driver::{Strategy, WindowHandle};
use crate::element::{Element, Page};
use crate::node::{TICK, TIMEOUT};
use crate::result::{EsperarError, EsperarResult};

const NAVIGATION_RETRY_PAUSE: Duration = Duration::from_secs(1);
const READY_STATE_SCRIPT: &str = r#"return document.readyState == "complete";"#;
const MISSING_FRAME_SOURCE: &str = "<html><body>Frame did not exist</body></html>";

impl Element {
    /// URL of the page the session currently shows
    pub fn current_url(&self) -> EsperarResult<String> {
        self.session().driver().current_url()
    }

    /// Wait until the page title equals `title`
    pub fn has_title(&self, title: &str, timeout: Duration) -> EsperarResult<()> {
        let what = format!("page title '{title}'");
        self.inner.core.wait_until(
            || Ok((self.session().driver().title()? == title).then_some(())),
            Some(&what),
            TICK,
            timeout,
        )
    }

    /// Handle of the window the session started with
    pub fn initial_window(&self) -> EsperarResult<WindowHandle> {
        self.session()
            .driver()
            .window_handles()?
            .into_iter()
            .next()
            .ok_or_else(|| EsperarError::Driver {
                message: "no windows open".to_string(),
            })
    }

    /// Handle of the focused window
    pub fn current_window(&self) -> EsperarResult<WindowHandle> {
        self.session().driver().current_window()
    }

    /// Run `action`, wait for a window to appear that was not open
    /// before, switch to it and return its handle.
    pub fn open_window(
        &self,
        action: impl FnOnce() -> EsperarResult<()>,
        timeout: Duration,
    ) -> EsperarResult<WindowHandle> {
        let driver = self.session().driver();
        let before = driver.window_handles()?;
        action()?;
        self.inner.core.wait_until(
            || Ok((driver.window_handles()?.len() > before.len()).then_some(())),
            Some("a new window to open"),
            TICK,
            timeout,
        )?;
        let opened = driver
            .window_handles()?
            .into_iter()
            .find(|handle| !before.contains(handle))
            .ok_or_else(|| EsperarError::Driver {
                message: "newly opened window disappeared".to_string(),
            })?;
        driver.switch_to_window(&opened)?;
        info!(
            session = %self.session().name(),
            window = %opened,
            "switched to new window"
        );
        Ok(opened)
    }

    /// Focus a window by handle
    pub fn switch_to_window(&self, window: &WindowHandle) -> EsperarResult<()> {
        self.session().driver().switch_to_window(window)
    }

    /// Focus a window by position in the handle list
    pub fn switch_to_window_index(&self, index: usize) -> EsperarResult<()> {
        let handles = self.session().driver().window_handles()?;
        let window = handles.get(index).ok_or_else(|| EsperarError::Driver {
            message: format!("no window at index {index} ({} open)", handles.len()),
        })?;
        self.session().driver().switch_to_window(window)
    }
}

impl Page {
    /// Navigate the focused window to `url`, retrying once, and accept
    /// any alert the navigation leaves behind.
    pub fn load_url(&self, url: &str) -> EsperarResult<()> {
        self.set_url(url);
        info!(
            session = %self.session().name(),
            page = %self.description(),
            url,
            "load url"
        );
        self.navigate_with_retry(url)?;
        let _ = self.session().driver().accept_alert();
        Ok(())
    }

    /// Open a blank window, switch to it and load `url` there.
    pub fn open_url_in_new_window(&self, url: &str) -> EsperarResult<WindowHandle> {
        self.set_url(url);
        let opened = self.open_window(
            || {
                self.execute_script(r#"window.open("about:blank", "_blank");"#)?;
                Ok(())
            },
            TIMEOUT,
        )?;
        self.navigate_with_retry(url)?;
        let _ = self.session().driver().accept_alert();
        Ok(opened)
    }

    /// Reload the tab and wait until the document is completely loaded.
    pub fn refresh(&self, timeout: Duration) -> EsperarResult<()> {
        let driver = self.session().driver();
        if driver.refresh().is_err() {
            self.wait(NAVIGATION_RETRY_PAUSE);
            driver.refresh()?;
        }
        self.wait(NAVIGATION_RETRY_PAUSE);
        let _ = driver.accept_alert();
        self.inner.core.wait_until(
            || {
                let ready = self.inner.core.execute_script_once(READY_STATE_SCRIPT)?;
                if ready != Value::Bool(true) {
                    return Ok(None);
                }
                let html = driver.find_elements(Strategy::TagName, "html")?;
                Ok((!html.is_empty()).then_some(()))
            },
            Some("page completely loaded"),
            TICK,
            timeout,
        )?;
        info!(
            session = %self.session().name(),
            page = %self.description(),
            "reloaded tab"
        );
        Ok(())
    }

    /// Close the focused tab, retrying once
    pub fn close_tab(&self) -> EsperarResult<()> {
        let driver = self.session().driver();
        if driver.close_window().is_err() {
            self.wait(NAVIGATION_RETRY_PAUSE);
            driver.close_window()?;
        }
        let _ = driver.accept_alert();
        Ok(())
    }

    /// Serialized source of the top-level document plus every iframe's
    /// document. A frame that cannot be entered contributes a
    /// placeholder instead of failing the capture.
    pub fn page_sources(&self) -> EsperarResult<(String, Vec<String>)> {
        let driver = self.session().driver();
        driver.switch_to_default_content()?;
        let top = driver.page_source()?;
        let mut frames = Vec::new();
        let iframes = self.list_by_tag("iframe", "page iframes");
        if iframes.verify(Duration::from_secs(1)).is_ok() {
            for handle in iframes.handles() {
                driver.switch_to_default_content()?;
                let source = driver
                    .switch_to_frame(&*handle)
                    .and_then(|()| driver.page_source())
                    .unwrap_or_else(|_| MISSING_FRAME_SOURCE.to_string());
                frames.push(source);
            }
            driver.switch_to_default_content()?;
        }
        Ok((top, frames))
    }

    fn navigate_with_retry(&self, url: &str) -> EsperarResult<()> {
        let driver = self.session().driver();
        if let Err(first) = driver.navigate(url) {
            warn!(
                session = %self.session().name(),
                url,
                error = %first,
                "navigation failed, retrying"
            );
            self.wait(NAVIGATION_RETRY_PAUSE);
            driver.navigate(url).map_err(|err| EsperarError::Driver {
                message: format!(
                    "{}Error loading page [{} >> {}]: {}",
                    self.inner.core.log_prefix(),
                    self.description(),
                    url,
                    err
                ),
            })?;
        }
        Ok(())
    }
}
