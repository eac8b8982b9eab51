//! Driver capability boundary.
//!
//! Esperar never talks to a browser directly. Everything it needs from a
//! backend is captured by the [`Driver`] and [`ElementHandle`] traits, so
//! the engine stays insulated from protocol churn and can run against the
//! in-memory [`crate::mock`] driver in tests.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::result::EsperarResult;

/// Element location strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// CSS selector
    Css,
    /// XPath expression
    XPath,
    /// Class name
    ClassName,
    /// Tag name
    TagName,
}

impl Strategy {
    /// Strategy name as sent to a WebDriver backend
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Css => "css selector",
            Self::XPath => "xpath",
            Self::ClassName => "class name",
            Self::TagName => "tag name",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A strategy/query pair identifying elements in a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    /// How to interpret the query
    pub strategy: Strategy,
    /// The query string itself
    pub query: String,
}

impl Locator {
    /// Create a locator
    pub fn new(strategy: Strategy, query: impl Into<String>) -> Self {
        Self {
            strategy,
            query: query.into(),
        }
    }

    /// Create a CSS selector locator
    pub fn css(query: impl Into<String>) -> Self {
        Self::new(Strategy::Css, query)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy, self.query)
    }
}

/// Named keys sent to focused elements.
///
/// Covers the chords the interaction layer needs for whole-field text
/// replacement and page scrolling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// Move caret to start of field
    Home,
    /// Move caret to end of field
    End,
    /// Enter/Return
    Return,
    /// Scroll one page up
    PageUp,
    /// Scroll one page down
    PageDown,
    /// Ctrl+A select-all (Windows)
    ControlA,
    /// Shift+End select-to-end (everywhere else)
    ShiftEnd,
}

/// Opaque identifier of a browser window or tab
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowHandle(String);

impl WindowHandle {
    /// Wrap a backend window identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw backend identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A live reference to a single element in the current document context.
///
/// Handles can go stale at any moment; every probe returns a `Result` and
/// the engine treats handle failures as retryable.
pub trait ElementHandle {
    /// Find descendant elements matching a locator
    fn find_elements(
        &self,
        strategy: Strategy,
        query: &str,
    ) -> EsperarResult<Vec<Rc<dyn ElementHandle>>>;

    /// Whether the element is rendered and visible
    fn is_displayed(&self) -> EsperarResult<bool>;

    /// Whether the element accepts interaction
    fn is_enabled(&self) -> EsperarResult<bool>;

    /// Whether the element (checkbox, option) is selected
    fn is_selected(&self) -> EsperarResult<bool>;

    /// Visible text content
    fn text(&self) -> EsperarResult<String>;

    /// Attribute or property value, `None` when absent
    fn attribute(&self, name: &str) -> EsperarResult<Option<String>>;

    /// Click the element
    fn click(&self) -> EsperarResult<()>;

    /// Clear an input field
    fn clear(&self) -> EsperarResult<()>;

    /// Type a string into the element
    fn send_keys(&self, text: &str) -> EsperarResult<()>;

    /// Send a single named key or chord
    fn send_key(&self, key: Key) -> EsperarResult<()>;

    /// Submit the enclosing form
    fn submit(&self) -> EsperarResult<()>;
}

/// A browser session as seen by the engine: document queries, script
/// execution, context switching and window management.
pub trait Driver {
    /// Find elements in the current document context
    fn find_elements(
        &self,
        strategy: Strategy,
        query: &str,
    ) -> EsperarResult<Vec<Rc<dyn ElementHandle>>>;

    /// Execute JavaScript in the current context and return its value
    fn execute_script(&self, script: &str) -> EsperarResult<Value>;

    /// Execute JavaScript with an element bound as `arguments[0]`
    fn execute_script_on(&self, script: &str, element: &dyn ElementHandle)
        -> EsperarResult<Value>;

    /// Switch the document context into a frame element
    fn switch_to_frame(&self, frame: &dyn ElementHandle) -> EsperarResult<()>;

    /// Switch the document context back to the top-level document
    fn switch_to_default_content(&self) -> EsperarResult<()>;

    /// URL of the current page
    fn current_url(&self) -> EsperarResult<String>;

    /// Title of the current page
    fn title(&self) -> EsperarResult<String>;

    /// All open window handles, in creation order
    fn window_handles(&self) -> EsperarResult<Vec<WindowHandle>>;

    /// Handle of the focused window
    fn current_window(&self) -> EsperarResult<WindowHandle>;

    /// Focus a window
    fn switch_to_window(&self, window: &WindowHandle) -> EsperarResult<()>;

    /// Navigate the focused window to a URL
    fn navigate(&self, url: &str) -> EsperarResult<()>;

    /// Reload the focused window
    fn refresh(&self) -> EsperarResult<()>;

    /// Close the focused window
    fn close_window(&self) -> EsperarResult<()>;

    /// Accept a pending alert, if any
    fn accept_alert(&self) -> EsperarResult<()>;

    /// Serialized source of the current document context
    fn page_source(&self) -> EsperarResult<String>;

    /// Whether the browser runs on Windows (affects key chords)
    fn windows_platform(&self) -> bool;
}

struct SessionInner {
    driver: Box<dyn Driver>,
    name: String,
    recovery_scripts: RefCell<Vec<String>>,
}

/// A named handle to one browser session.
///
/// Cheap to clone; every page object created from a session shares the
/// same driver and recovery-script registry. A session, and everything
/// built on it, lives on a single thread.
#[derive(Clone)]
pub struct Session {
    inner: Rc<SessionInner>,
}

impl Session {
    /// Wrap a driver under a session name used to prefix diagnostics
    pub fn new(driver: Box<dyn Driver>, name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(SessionInner {
                driver,
                name: name.into(),
                recovery_scripts: RefCell::new(Vec::new()),
            }),
        }
    }

    /// The underlying driver
    #[must_use]
    pub fn driver(&self) -> &dyn Driver {
        &*self.inner.driver
    }

    /// Session name, e.g. `chrome-1`
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether the session's browser runs on Windows
    #[must_use]
    pub fn windows_platform(&self) -> bool {
        self.inner.driver.windows_platform()
    }

    /// Register JavaScript snippets run in the top-level context after a
    /// first failed interaction attempt, to dismiss overlays and similar
    /// obstructions. Replaces any previously registered set.
    pub fn register_recovery_scripts<I, S>(&self, scripts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.inner.recovery_scripts.borrow_mut() =
            scripts.into_iter().map(Into::into).collect();
    }

    pub(crate) fn recovery_scripts(&self) -> Vec<String> {
        self.inner.recovery_scripts.borrow().clone()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}
