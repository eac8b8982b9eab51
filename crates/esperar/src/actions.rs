//! Interactions with resolved elements.
//!
//! Every interaction runs inside a retry envelope: up to three attempts a
//! second apart, with registered recovery scripts run after the first
//! failure to clear overlays, and a precondition diagnosis when the last
//! attempt fails so the surfaced error names what was actually wrong.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::driver::{ElementHandle, Key};
use crate::element::Element;
use crate::node::TIMEOUT;
use crate::result::{EsperarError, EsperarResult};

const ACTION_ATTEMPTS: usize = 3;
const ACTION_RETRY_PAUSE: Duration = Duration::from_secs(1);
const SET_TEXT_ATTEMPTS: usize = 3;

impl Element {
    /// Click the element
    pub fn click(&self, timeout: Duration) -> EsperarResult<()> {
        self.verify(timeout)?;
        info!(
            session = %self.session().name(),
            element = %self.inner.core.display_name(),
            "click"
        );
        self.perform_action("click", |handle| handle.click())
    }

    /// Clear an input field
    pub fn clear(&self, timeout: Duration) -> EsperarResult<()> {
        self.verify(timeout)?;
        info!(
            session = %self.session().name(),
            element = %self.inner.core.display_name(),
            "clear"
        );
        self.perform_action("clear", |handle| handle.clear())
    }

    /// Type `text` into the element without clearing it first
    pub fn send_keys(&self, text: &str, timeout: Duration) -> EsperarResult<()> {
        self.verify(timeout)?;
        info!(
            session = %self.session().name(),
            element = %self.inner.core.display_name(),
            text,
            "send keys"
        );
        self.perform_action("send_keys", |handle| handle.send_keys(text))
    }

    /// Send a single named key or chord to the element
    pub fn send_key(&self, key: Key, timeout: Duration) -> EsperarResult<()> {
        self.verify(timeout)?;
        self.perform_action("send_key", |handle| handle.send_key(key))
    }

    /// Submit the enclosing form
    pub fn submit(&self, timeout: Duration) -> EsperarResult<()> {
        self.verify(timeout)?;
        info!(
            session = %self.session().name(),
            element = %self.inner.core.display_name(),
            "submit"
        );
        self.perform_action("submit", |handle| handle.submit())
    }

    /// Replace the field's content with `text` and confirm the value
    /// took, retrying the whole select-and-type sequence up to three
    /// times. The selection chord is platform-dependent.
    pub fn set_text(&self, text: &str, timeout: Duration) -> EsperarResult<()> {
        self.verify(timeout)?;
        info!(
            session = %self.session().name(),
            element = %self.inner.core.display_name(),
            text,
            "set text"
        );
        let mut attempts = 0;
        while attempts < SET_TEXT_ATTEMPTS && !self.value_matches(text) {
            self.perform_action("send_key", |handle| handle.send_key(Key::Home))?;
            if self.session().windows_platform() {
                self.perform_action("send_key", |handle| handle.send_key(Key::ControlA))?;
            } else {
                self.perform_action("send_key", |handle| handle.send_key(Key::ShiftEnd))?;
            }
            self.perform_action("send_keys", |handle| handle.send_keys(text))?;
            attempts += 1;
        }
        if self.value_matches(text) {
            Ok(())
        } else {
            Err(EsperarError::ActionFailed {
                action: "set_text".to_string(),
                description: self.description(),
                precondition: None,
            })
        }
    }

    /// [`Element::set_text`] followed by Return
    pub fn set_text_and_return(&self, text: &str, timeout: Duration) -> EsperarResult<()> {
        self.set_text(text, timeout)?;
        self.perform_action("send_key", |handle| handle.send_key(Key::Return))
    }

    /// Bring a checkbox to the `checked` state, clicking only when it
    /// differs. With `ignore_failure` the final state is not re-checked.
    pub fn set_checkbox(
        &self,
        checked: bool,
        ignore_failure: bool,
        timeout: Duration,
    ) -> EsperarResult<()> {
        if self.is_selected(timeout) != checked {
            self.click(TIMEOUT)?;
        }
        // Re-check with the caller's timeout; the state may settle late.
        if !ignore_failure && self.is_selected(timeout) != checked {
            return Err(EsperarError::ActionFailed {
                action: "set_checkbox".to_string(),
                description: self.description(),
                precondition: None,
            });
        }
        Ok(())
    }

    /// Scroll the element's own scroll container to its bottom
    pub fn page_bottom(&self) -> EsperarResult<()> {
        self.verify(TIMEOUT)?;
        let handle = self.handle().ok_or_else(|| self.unresolved("page_bottom"))?;
        self.session()
            .driver()
            .execute_script_on("arguments[0].scrollTo(0, arguments[0].scrollHeight);", &*handle)?;
        Ok(())
    }

    /// Scroll one page down with the element focused
    pub fn page_down(&self) -> EsperarResult<()> {
        self.verify(TIMEOUT)?;
        self.perform_action("send_key", |handle| handle.send_key(Key::PageDown))
    }

    /// Scroll one page up with the element focused
    pub fn page_up(&self) -> EsperarResult<()> {
        self.verify(TIMEOUT)?;
        self.perform_action("send_key", |handle| handle.send_key(Key::PageUp))
    }

    fn value_matches(&self, text: &str) -> bool {
        self.attribute("value").as_deref() == Some(text)
    }

    fn unresolved(&self, action: &str) -> EsperarError {
        EsperarError::Binding {
            description: format!(
                "{}Element {} is not resolved for {}",
                self.inner.core.log_prefix(),
                self.description(),
                action
            ),
        }
    }

    /// The retry envelope shared by all interactions.
    fn perform_action(
        &self,
        action: &str,
        act: impl Fn(&dyn ElementHandle) -> EsperarResult<()>,
    ) -> EsperarResult<()> {
        let mut attempt = 0;
        loop {
            let result = match self.handle() {
                Some(handle) => act(&*handle),
                None => Err(self.unresolved(action)),
            };
            let err = match result {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };
            warn!(
                session = %self.session().name(),
                element = %self.inner.core.display_name(),
                action,
                attempt,
                error = %err,
                "action attempt failed"
            );
            if attempt == 0 {
                self.run_recovery_scripts();
                let _ = self.verify(Duration::ZERO);
            }
            if attempt + 1 == ACTION_ATTEMPTS {
                return Err(self.diagnose(action, err));
            }
            self.inner.core.wait(ACTION_RETRY_PAUSE);
            attempt += 1;
        }
    }

    /// Run the session's recovery scripts in the top-level context. When
    /// the element lives inside a frame, re-enter it afterwards so the
    /// next attempt starts in the right context.
    fn run_recovery_scripts(&self) {
        let scripts = self.session().recovery_scripts();
        if scripts.is_empty() {
            return;
        }
        let frame = self.inner.core.parent_frame();
        for script in &scripts {
            if let Err(err) = self.inner.core.execute_script_once(script) {
                debug!(
                    session = %self.session().name(),
                    error = %err,
                    "recovery script failed"
                );
            }
        }
        if let Some(frame) = frame {
            let _ = frame.resolve_now();
        }
    }

    /// Name the violated precondition when an action gave up, or hand the
    /// original error back when the element looks fine.
    fn diagnose(&self, action: &str, original: EsperarError) -> EsperarError {
        let failed = |precondition: &str| EsperarError::ActionFailed {
            action: action.to_string(),
            description: self.description(),
            precondition: Some(precondition.to_string()),
        };
        if !self.exists(Duration::ZERO) {
            return failed("present");
        }
        let Some(handle) = self.handle() else {
            return failed("present");
        };
        if !handle.is_displayed().unwrap_or(false) {
            return failed("displayed");
        }
        if !handle.is_enabled().unwrap_or(false) {
            return failed("enabled");
        }
        original
    }
}
