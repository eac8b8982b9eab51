//! Single-element page objects and their resolution.
//!
//! An [`Element`] is a lazy, self-healing reference: construction records
//! how to find the element, and every interaction re-resolves it against
//! the live document. [`Page`], [`Iframe`] and [`Section`] are elements
//! with specialized resolution, usable as parents for scoping.

use std::fmt;
use std::ops::Deref;
use std::rc::Rc;
use std::time::Duration;

use serde_json::Value;

use crate::driver::{ElementHandle, Locator, Session, Strategy};
use crate::elements::Elements;
use crate::node::{Node, NodeCore, NodeKind, DEFAULT_ATTR_ID, TICK};
use crate::result::{EsperarError, EsperarResult};

pub(crate) struct ElementInner {
    pub(crate) core: NodeCore,
    pub(crate) kind: NodeKind,
    pub(crate) cached: std::cell::RefCell<Option<Rc<dyn ElementHandle>>>,
}

impl ElementInner {
    /// Whether the handle bound by a previous resolution still stands in
    /// for this element. With conditions attached they are re-evaluated;
    /// without, a visibility probe doubles as a liveness check.
    fn cached_valid(&self) -> bool {
        let Some(handle) = self.cached.borrow().clone() else {
            return false;
        };
        let conditions = self.core.conditions.borrow();
        if conditions.is_empty() {
            handle.is_displayed().is_ok()
        } else {
            conditions.evaluate_single(&*handle).unwrap_or(false)
        }
    }

    /// A node without a locator never queries; it must already hold a
    /// directly bound handle (a list-item snapshot).
    fn check_detached(&self) -> EsperarResult<()> {
        let Some(handle) = self.cached.borrow().clone() else {
            return Err(EsperarError::Binding {
                description: format!(
                    "{}Element {} has no locator and no bound element reference",
                    self.core.log_prefix(),
                    self.core.description()
                ),
            });
        };
        let conditions = self.core.conditions.borrow();
        let holds = if conditions.is_empty() {
            handle.is_displayed().map(|_| true)
        } else {
            conditions.evaluate_single(&*handle)
        };
        match holds {
            Ok(true) => Ok(()),
            Ok(false) => Err(EsperarError::NotFound {
                description: format!(
                    "{}Bound element {} no longer satisfies conditions {}",
                    self.core.log_prefix(),
                    self.core.description(),
                    conditions.description()
                ),
            }),
            Err(err) => Err(err),
        }
    }

    /// One resolution attempt: cache check, root via parent chain, query,
    /// condition filter, then exactly-one cardinality.
    fn resolve_element(&self) -> EsperarResult<()> {
        if self.core.locator.is_none() {
            return self.check_detached();
        }
        if self.cached_valid() {
            return Ok(());
        }
        *self.cached.borrow_mut() = None;
        let root = self.core.resolve_root()?;
        let candidates = self.core.query_candidates(root.as_ref())?;
        let conditions = self.core.conditions.borrow();
        let matched = if conditions.is_empty() {
            candidates
        } else {
            conditions.evaluate_list(&candidates)
        };
        match matched.len() {
            1 => {
                *self.cached.borrow_mut() = matched.into_iter().next();
                Ok(())
            }
            0 => Err(EsperarError::NotFound {
                description: format!(
                    "{}Could not find element {} satisfying conditions {}",
                    self.core.log_prefix(),
                    self.core.description(),
                    conditions.description()
                ),
            }),
            matches => Err(EsperarError::Ambiguous {
                description: format!(
                    "{}Multiple matches found for {}",
                    self.core.log_prefix(),
                    self.core.description()
                ),
                matches,
            }),
        }
    }
}

impl Node for ElementInner {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn resolve_now(&self) -> EsperarResult<()> {
        match self.kind {
            // A page is the top-level document: resolving it resets the
            // driver context and nothing else.
            NodeKind::Page => self.core.session.driver().switch_to_default_content(),
            // An iframe is found like any element, then entered, leaving
            // the driver context inside the frame for its children.
            NodeKind::Iframe => {
                self.core.session.driver().switch_to_default_content()?;
                self.resolve_element()?;
                let handle = self.cached.borrow().clone().ok_or_else(|| {
                    EsperarError::Binding {
                        description: format!(
                            "{}Iframe {} resolved without a bound handle",
                            self.core.log_prefix(),
                            self.core.description()
                        ),
                    }
                })?;
                self.core.session.driver().switch_to_frame(&*handle)
            }
            _ => self.resolve_element(),
        }
    }

    fn resolved_handle(&self) -> Option<Rc<dyn ElementHandle>> {
        match self.kind {
            NodeKind::Page | NodeKind::List => None,
            _ => self.cached.borrow().clone(),
        }
    }
}

/// Merge a child's CSS selector into its CSS parent's when legal,
/// re-parenting the child onto the grandparent. Iframe parents and
/// parents carrying conditions need live resolution of their own and are
/// never merged away.
pub(crate) fn child_parts(
    parent: &Rc<dyn Node>,
    locator: Locator,
) -> (Locator, Option<Rc<dyn Node>>) {
    if locator.strategy == Strategy::Css
        && parent.kind() != NodeKind::Iframe
        && parent.core().conditions.borrow().is_empty()
    {
        if let Some(parent_locator) = &parent.core().locator {
            if parent_locator.strategy == Strategy::Css {
                let merged =
                    Locator::css(format!("{} {}", parent_locator.query, locator.query));
                return (merged, parent.core().parent());
            }
        }
    }
    (locator, Some(Rc::clone(parent)))
}

/// A lazily resolved reference to exactly one element.
///
/// Cloning is cheap and clones share resolution state; use
/// [`Element::extend`] for an independent copy.
#[derive(Clone)]
pub struct Element {
    pub(crate) inner: Rc<ElementInner>,
}

impl Element {
    pub(crate) fn from_parts(
        session: Session,
        kind: NodeKind,
        locator: Option<Locator>,
        parent: Option<Rc<dyn Node>>,
        name: Option<String>,
    ) -> Self {
        Self {
            inner: Rc::new(ElementInner {
                core: NodeCore::new(session, locator, parent, name),
                kind,
                cached: std::cell::RefCell::new(None),
            }),
        }
    }

    pub(crate) fn as_node(&self) -> Rc<dyn Node> {
        Rc::<ElementInner>::clone(&self.inner)
    }

    pub(crate) fn bind_handle(&self, handle: Rc<dyn ElementHandle>) {
        *self.inner.cached.borrow_mut() = Some(handle);
    }

    /// The session this element belongs to
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.inner.core.session
    }

    /// Diagnostic identity, e.g. `[save: .toolbar .save]`
    #[must_use]
    pub fn description(&self) -> String {
        self.inner.core.description()
    }

    /// The name given at construction, if any
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.inner.core.name.as_deref()
    }

    /// The native handle bound by the last successful resolution
    #[must_use]
    pub fn handle(&self) -> Option<Rc<dyn ElementHandle>> {
        self.inner.cached.borrow().clone()
    }

    // ---- waiting -------------------------------------------------------

    /// Re-resolve until the element binds, or fail after `timeout`.
    pub fn verify(&self, timeout: Duration) -> EsperarResult<&Self> {
        let what = format!("element {}", self.description());
        self.inner
            .core
            .wait_until(
                || {
                    self.inner.resolve_now()?;
                    Ok(Some(()))
                },
                Some(&what),
                TICK,
                timeout,
            )
            .map_err(|err| match err {
                EsperarError::Timeout { .. } => err,
                err if err.is_retryable() => EsperarError::Timeout {
                    description: format!(
                        "{}Timeout waiting for: {}",
                        self.inner.core.log_prefix(),
                        err
                    ),
                },
                err => err,
            })?;
        Ok(self)
    }

    /// Whether the element can be bound within `timeout`. Never errors.
    #[must_use]
    pub fn exists(&self, timeout: Duration) -> bool {
        self.verify(timeout).is_ok()
    }

    /// Wait until the element can no longer be bound.
    pub fn gone(&self, timeout: Duration) -> EsperarResult<()> {
        let what = format!("element to be gone {}", self.description());
        self.inner.core.wait_until(
            || Ok((!self.exists(Duration::ZERO)).then_some(())),
            Some(&what),
            TICK,
            timeout,
        )
    }

    /// Block for roughly `duration`
    pub fn wait(&self, duration: Duration) {
        self.inner.core.wait(duration);
    }

    /// Poll an arbitrary condition with this element's wait engine.
    /// `Ok(None)` means "not yet"; retryable errors keep polling.
    pub fn wait_until<T>(
        &self,
        description: &str,
        timeout: Duration,
        condition: impl FnMut() -> EsperarResult<Option<T>>,
    ) -> EsperarResult<T> {
        self.inner
            .core
            .wait_until(condition, Some(description), TICK, timeout)
    }

    /// Execute JavaScript in the top-level document context, with retries
    pub fn execute_script(&self, script: &str) -> EsperarResult<Value> {
        self.inner.core.execute_script(script)
    }

    /// Reset the driver context to the top-level document
    pub fn switch_to_default(&self) -> EsperarResult<()> {
        self.session().driver().switch_to_default_content()
    }

    // ---- scoped copies -------------------------------------------------

    /// Independent copy sharing nothing mutable: same locator, parent,
    /// name, current conditions and bound handle, resolved on its own
    /// from here on.
    #[must_use]
    pub fn extend(&self) -> Element {
        let copy = Element::from_parts(
            self.inner.core.session.clone(),
            NodeKind::Element,
            self.inner.core.locator.clone(),
            self.inner.core.parent(),
            self.inner.core.name.clone(),
        );
        *copy.inner.core.conditions.borrow_mut() = self.inner.core.conditions.borrow().clone();
        *copy.inner.cached.borrow_mut() = self.inner.cached.borrow().clone();
        copy
    }

    /// Drop the parent link, re-rooting future resolutions at the whole
    /// document, or at the topmost ancestor (stopping at the first
    /// enclosing iframe) when `to_ancestor` is set.
    pub fn detach(&self, to_ancestor: bool) -> &Self {
        let new_parent = if to_ancestor {
            self.inner.core.top_ancestor()
        } else {
            None
        };
        *self.inner.core.parent.borrow_mut() = new_parent;
        self
    }

    // ---- attached conditions -------------------------------------------
    //
    // Builders mutate this node's condition set in place and return a
    // clone sharing its state, so they chain from `Page`, `Iframe` and
    // `Section` through deref as well.

    /// Require the element to be visible
    pub fn visible(&self) -> Element {
        self.inner.core.conditions.borrow_mut().visible();
        self.clone()
    }

    /// Require the element to be present but not visible
    pub fn invisible(&self) -> Element {
        self.inner.core.conditions.borrow_mut().invisible();
        self.clone()
    }

    /// Require the element to be enabled
    pub fn enabled(&self) -> Element {
        self.inner.core.conditions.borrow_mut().enabled();
        self.clone()
    }

    /// Require the element to be disabled
    pub fn disabled(&self) -> Element {
        self.inner.core.conditions.borrow_mut().disabled();
        self.clone()
    }

    /// Require the element to be visible and enabled
    pub fn clickable(&self) -> Element {
        self.inner.core.conditions.borrow_mut().clickable();
        self.clone()
    }

    /// Require the element to be selected
    pub fn selected(&self) -> Element {
        self.inner.core.conditions.borrow_mut().selected();
        self.clone()
    }

    /// Require the element not to be selected
    pub fn not_selected(&self) -> Element {
        self.inner.core.conditions.borrow_mut().not_selected();
        self.clone()
    }

    /// Require the element to be visible with text containing `text`
    pub fn with_text(&self, text: impl Into<String>) -> Element {
        self.inner.core.conditions.borrow_mut().text(text);
        self.clone()
    }

    // ---- child constructors ---------------------------------------------

    /// Child element by test-id attribute (`[data-test-id='...']`)
    #[must_use]
    pub fn element(&self, test_id: &str, name: &str) -> Element {
        self.element_by(
            Locator::css(format!("[{DEFAULT_ATTR_ID}='{test_id}']")),
            name,
        )
    }

    /// Child element by CSS selector
    #[must_use]
    pub fn element_by_selector(&self, query: &str, name: &str) -> Element {
        self.element_by(Locator::css(query), name)
    }

    /// Child element by XPath
    #[must_use]
    pub fn element_by_xpath(&self, query: &str, name: &str) -> Element {
        self.element_by(Locator::new(Strategy::XPath, query), name)
    }

    /// Child element by class name
    #[must_use]
    pub fn element_by_class(&self, class: &str, name: &str) -> Element {
        self.element_by(Locator::new(Strategy::ClassName, class), name)
    }

    fn element_by(&self, locator: Locator, name: &str) -> Element {
        let (locator, parent) = child_parts(&self.as_node(), locator);
        Element::from_parts(
            self.inner.core.session.clone(),
            NodeKind::Element,
            Some(locator),
            parent,
            Some(name.to_string()),
        )
    }

    /// Child list by test-id attribute
    #[must_use]
    pub fn list(&self, test_id: &str, name: &str) -> Elements {
        self.list_by(
            Locator::css(format!("[{DEFAULT_ATTR_ID}='{test_id}']")),
            name,
        )
    }

    /// Child list by CSS selector
    #[must_use]
    pub fn list_by_selector(&self, query: &str, name: &str) -> Elements {
        self.list_by(Locator::css(query), name)
    }

    /// Child list by XPath
    #[must_use]
    pub fn list_by_xpath(&self, query: &str, name: &str) -> Elements {
        self.list_by(Locator::new(Strategy::XPath, query), name)
    }

    /// Child list by class name
    #[must_use]
    pub fn list_by_class(&self, class: &str, name: &str) -> Elements {
        self.list_by(Locator::new(Strategy::ClassName, class), name)
    }

    /// Child list by tag name
    #[must_use]
    pub fn list_by_tag(&self, tag: &str, name: &str) -> Elements {
        self.list_by(Locator::new(Strategy::TagName, tag), name)
    }

    fn list_by(&self, locator: Locator, name: &str) -> Elements {
        let (locator, parent) = child_parts(&self.as_node(), locator);
        Elements::from_parts(
            self.inner.core.session.clone(),
            locator,
            parent,
            Some(name.to_string()),
        )
    }

    /// Child iframe by test-id attribute. Iframe selectors are never
    /// merged into the parent's: the frame element must be bound so the
    /// driver can switch into it.
    #[must_use]
    pub fn iframe(&self, test_id: &str, name: &str) -> Iframe {
        self.iframe_by(
            Locator::css(format!("[{DEFAULT_ATTR_ID}='{test_id}']")),
            name,
        )
    }

    /// Child iframe by CSS selector
    #[must_use]
    pub fn iframe_by_selector(&self, query: &str, name: &str) -> Iframe {
        self.iframe_by(Locator::css(query), name)
    }

    /// Child iframe by XPath
    #[must_use]
    pub fn iframe_by_xpath(&self, query: &str, name: &str) -> Iframe {
        self.iframe_by(Locator::new(Strategy::XPath, query), name)
    }

    fn iframe_by(&self, locator: Locator, name: &str) -> Iframe {
        Iframe {
            element: Element::from_parts(
                self.inner.core.session.clone(),
                NodeKind::Iframe,
                Some(locator),
                Some(self.as_node()),
                Some(name.to_string()),
            ),
        }
    }

    /// Child section by test-id attribute
    #[must_use]
    pub fn section(&self, test_id: &str, name: &str) -> Section {
        self.section_by(
            Locator::css(format!("[{DEFAULT_ATTR_ID}='{test_id}']")),
            name,
        )
    }

    /// Child section by CSS selector
    #[must_use]
    pub fn section_by_selector(&self, query: &str, name: &str) -> Section {
        self.section_by(Locator::css(query), name)
    }

    /// Child section by XPath
    #[must_use]
    pub fn section_by_xpath(&self, query: &str, name: &str) -> Section {
        self.section_by(Locator::new(Strategy::XPath, query), name)
    }

    fn section_by(&self, locator: Locator, name: &str) -> Section {
        let (locator, parent) = child_parts(&self.as_node(), locator);
        Section {
            element: Element::from_parts(
                self.inner.core.session.clone(),
                NodeKind::Section,
                Some(locator),
                parent,
                Some(name.to_string()),
            ),
        }
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Element({})", self.description())
    }
}

/// A whole browser page. Resolution resets the driver to the top-level
/// document; children with no other scope search the entire page.
#[derive(Clone, Debug)]
pub struct Page {
    element: Element,
    url: std::cell::RefCell<Option<String>>,
}

impl Page {
    /// Page object without loading anything
    #[must_use]
    pub fn attach(session: &Session, name: &str) -> Self {
        Self {
            element: Element::from_parts(
                session.clone(),
                NodeKind::Page,
                None,
                None,
                Some(name.to_string()),
            ),
            url: std::cell::RefCell::new(None),
        }
    }

    /// Load `url` in the current window and return its page object
    pub fn open(session: &Session, url: &str, name: &str) -> EsperarResult<Self> {
        let page = Self::attach(session, name);
        page.load_url(url)?;
        Ok(page)
    }

    /// Open `url` in a new window and return its page object, leaving the
    /// driver focused on the new window
    pub fn open_in_new_tab(session: &Session, url: &str, name: &str) -> EsperarResult<Self> {
        let page = Self::attach(session, name);
        page.open_url_in_new_window(url)?;
        Ok(page)
    }

    /// The URL this page object last loaded, if any
    #[must_use]
    pub fn url(&self) -> Option<String> {
        self.url.borrow().clone()
    }

    pub(crate) fn set_url(&self, url: &str) {
        *self.url.borrow_mut() = Some(url.to_string());
    }
}

impl Deref for Page {
    type Target = Element;

    fn deref(&self) -> &Element {
        &self.element
    }
}

/// An iframe. Resolution finds the frame element and switches the driver
/// context into it, so children resolve against the frame's document.
#[derive(Clone, Debug)]
pub struct Iframe {
    element: Element,
}

impl Deref for Iframe {
    type Target = Element;

    fn deref(&self) -> &Element {
        &self.element
    }
}

/// A container element used purely for scoping children.
#[derive(Clone, Debug)]
pub struct Section {
    element: Element,
}

impl Deref for Section {
    type Target = Element;

    fn deref(&self) -> &Element {
        &self.element
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDriver, MockElement};

    fn setup() -> (MockDriver, Session) {
        let driver = MockDriver::new();
        let session = Session::new(Box::new(driver.clone()), "chrome-1");
        (driver, session)
    }

    mod resolution_tests {
        use super::*;

        #[test]
        fn single_match_binds() {
            let (driver, session) = setup();
            let button = MockElement::new("button");
            driver.register(Strategy::Css, "[data-test-id='save']", &[button]);

            let page = Page::attach(&session, "home");
            let save = page.element("save", "save button");
            assert!(save.verify(Duration::ZERO).is_ok());
            assert!(save.handle().is_some());
        }

        #[test]
        fn zero_matches_surface_as_timeout() {
            let (_driver, session) = setup();
            let page = Page::attach(&session, "home");
            let missing = page.element("nope", "missing");

            let err = missing.verify(Duration::ZERO).unwrap_err();
            assert!(matches!(err, EsperarError::Timeout { .. }));
            assert!(err.to_string().contains("Could not find element"));
            assert!(!missing.exists(Duration::ZERO));
        }

        #[test]
        fn multiple_matches_abort_without_polling() {
            let (driver, session) = setup();
            driver.register(
                Strategy::Css,
                ".row",
                &[MockElement::new("div"), MockElement::new("div")],
            );

            let page = Page::attach(&session, "home");
            let row = page.element_by_selector(".row", "row");
            let started = std::time::Instant::now();
            let err = row.verify(Duration::from_secs(30)).unwrap_err();
            assert!(matches!(err, EsperarError::Ambiguous { matches: 2, .. }));
            assert!(started.elapsed() < Duration::from_secs(2));
        }

        #[test]
        fn conditions_narrow_an_ambiguous_query() {
            let (driver, session) = setup();
            let hidden = MockElement::new("button").displayed(false);
            let shown = MockElement::new("button").with_text("go");
            driver.register(Strategy::Css, ".btn", &[hidden, shown.clone()]);

            let page = Page::attach(&session, "home");
            let button = page.element_by_selector(".btn", "button").visible();
            button.verify(Duration::ZERO).unwrap();
            button.handle().unwrap().click().unwrap();
            assert_eq!(shown.click_count(), 1);
        }

        #[test]
        fn valid_cached_handle_is_reused() {
            let (driver, session) = setup();
            let first = MockElement::new("button");
            driver.register(Strategy::Css, ".btn", &[first.clone()]);

            let page = Page::attach(&session, "home");
            let button = page.element_by_selector(".btn", "button");
            button.verify(Duration::ZERO).unwrap();

            // Replace what the query would return; the live handle wins.
            driver.register(Strategy::Css, ".btn", &[MockElement::new("button")]);
            button.verify(Duration::ZERO).unwrap();
            button.handle().unwrap().click().unwrap();
            assert_eq!(first.click_count(), 1);
        }

        #[test]
        fn stale_cached_handle_is_requeried() {
            let (driver, session) = setup();
            let first = MockElement::new("button");
            driver.register(Strategy::Css, ".btn", &[first.clone()]);

            let page = Page::attach(&session, "home");
            let button = page.element_by_selector(".btn", "button");
            button.verify(Duration::ZERO).unwrap();

            first.set_stale(true);
            let second = MockElement::new("button");
            driver.register(Strategy::Css, ".btn", &[second.clone()]);
            button.verify(Duration::ZERO).unwrap();
            button.handle().unwrap().click().unwrap();
            assert_eq!(second.click_count(), 1);
        }

        #[test]
        fn gone_succeeds_when_nothing_matches() {
            let (driver, session) = setup();
            driver.register(Strategy::Css, ".toast", &[]);
            let page = Page::attach(&session, "home");
            let toast = page.element_by_selector(".toast", "toast");
            assert!(toast.gone(Duration::ZERO).is_ok());
        }

        #[test]
        fn gone_times_out_while_present() {
            let (driver, session) = setup();
            driver.register(Strategy::Css, ".toast", &[MockElement::new("div")]);
            let page = Page::attach(&session, "home");
            let toast = page.element_by_selector(".toast", "toast");
            let err = toast.gone(Duration::ZERO).unwrap_err();
            assert!(matches!(err, EsperarError::Timeout { .. }));
        }

        #[test]
        fn detached_node_without_handle_is_a_binding_error() {
            let (_driver, session) = setup();
            let orphan =
                Element::from_parts(session, NodeKind::Element, None, None, Some("orphan".into()));
            let err = orphan.verify(Duration::from_secs(30)).unwrap_err();
            assert!(matches!(err, EsperarError::Binding { .. }));
        }
    }

    mod scoping_tests {
        use super::*;

        #[test]
        fn css_under_css_combines_and_skips_the_parent() {
            let (driver, session) = setup();
            driver.register(
                Strategy::Css,
                ".form .save",
                &[MockElement::new("button")],
            );

            let page = Page::attach(&session, "home");
            let form = page.element_by_selector(".form", "form");
            let save = form.element_by_selector(".save", "save");
            // The parent query itself is never registered; combination
            // means it is never issued.
            assert!(save.verify(Duration::ZERO).is_ok());
        }

        #[test]
        fn conditioned_parent_is_resolved_live() {
            let (driver, session) = setup();
            let form = MockElement::new("form");
            let save = MockElement::new("button");
            form.register_child(Strategy::Css, ".save", &[save.clone()]);
            driver.register(Strategy::Css, ".form", &[form]);

            let page = Page::attach(&session, "home");
            let form_el = page.element_by_selector(".form", "form").visible();
            let save_el = form_el.element_by_selector(".save", "save");
            save_el.verify(Duration::ZERO).unwrap();
            save_el.handle().unwrap().click().unwrap();
            assert_eq!(save.click_count(), 1);
        }

        #[test]
        fn xpath_child_scopes_under_its_parent() {
            let (driver, session) = setup();
            let form = MockElement::new("form");
            form.register_child(Strategy::XPath, ".//button", &[MockElement::new("button")]);
            driver.register(Strategy::Css, ".form", &[form]);

            let page = Page::attach(&session, "home");
            let form_el = page.element_by_selector(".form", "form");
            let button = form_el.element_by_xpath(".//button", "button");
            assert!(button.verify(Duration::ZERO).is_ok());
        }

        #[test]
        fn iframe_child_searches_the_frame_document() {
            let (driver, session) = setup();
            let frame = MockElement::frame("login");
            driver.register(Strategy::Css, "[data-test-id='login-frame']", &[frame]);
            driver.register_in_frame(
                "login",
                Strategy::Css,
                ".user",
                &[MockElement::new("input")],
            );

            let page = Page::attach(&session, "home");
            let login = page.iframe("login-frame", "login frame");
            let user = login.element_by_selector(".user", "user field");
            assert!(user.verify(Duration::ZERO).is_ok());
            assert_eq!(driver.current_context().as_deref(), Some("login"));
            assert!(driver.frame_switches() >= 1);
        }

        #[test]
        fn iframe_selector_is_never_combined() {
            let (driver, session) = setup();
            let frame = MockElement::frame("widget");
            driver.register(Strategy::Css, ".host .frame", &[]);
            driver.register(Strategy::Css, ".frame", &[]);
            // The frame element must be findable on its own selector under
            // a resolved parent, not merged into a document-scope query.
            let host = MockElement::new("div");
            host.register_child(Strategy::Css, ".frame", &[frame]);
            driver.register(Strategy::Css, ".host", &[host]);

            let page = Page::attach(&session, "home");
            let host_el = page.element_by_selector(".host", "host").visible();
            let widget = host_el.iframe_by_selector(".frame", "widget");
            assert!(widget.verify(Duration::ZERO).is_ok());
        }

        #[test]
        fn detach_reroots_resolution() {
            let (driver, session) = setup();
            driver.register(Strategy::Css, ".kid", &[MockElement::new("div")]);

            let page = Page::attach(&session, "home");
            // Conditioned section prevents combination, so the child
            // depends on the (unregistered) section until detached.
            let section = page.section_by_selector(".sec", "section");
            section.visible();
            let kid = section.element_by_selector(".kid", "kid");
            assert!(!kid.exists(Duration::ZERO));

            kid.detach(false);
            assert!(kid.exists(Duration::ZERO));
        }

        #[test]
        fn detach_to_ancestor_stops_at_the_page() {
            let (driver, session) = setup();
            driver.register(Strategy::Css, ".kid", &[MockElement::new("div")]);

            let page = Page::attach(&session, "home");
            let outer = page.element_by_selector(".outer", "outer").visible();
            let inner = outer.element_by_selector(".inner", "inner").visible();
            let kid = inner.element_by_selector(".kid", "kid");
            assert!(!kid.exists(Duration::ZERO));

            // Walks past both conditioned ancestors up to the page node,
            // which searches the whole document.
            kid.detach(true);
            assert!(kid.exists(Duration::ZERO));
        }
    }

    mod copy_tests {
        use super::*;

        #[test]
        fn extend_gives_an_independent_condition_set() {
            let (driver, session) = setup();
            let button = MockElement::new("button").enabled(false);
            driver.register(Strategy::Css, ".btn", &[button]);

            let page = Page::attach(&session, "home");
            let original = page.element_by_selector(".btn", "button");
            let strict = original.extend().enabled();

            assert!(original.exists(Duration::ZERO));
            assert!(!strict.exists(Duration::ZERO));
            // The original is unaffected by the copy's extra condition.
            assert!(original.exists(Duration::ZERO));
        }

        #[test]
        fn clones_share_state_but_extend_does_not() {
            let (driver, session) = setup();
            let button = MockElement::new("button");
            driver.register(Strategy::Css, ".btn", &[button]);

            let page = Page::attach(&session, "home");
            let original = page.element_by_selector(".btn", "button");
            let cloned = original.clone();
            original.verify(Duration::ZERO).unwrap();
            assert!(cloned.handle().is_some());

            let extended = original.extend();
            assert!(extended.handle().is_some());
        }
    }

    mod description_tests {
        use super::*;

        #[test]
        fn shorthand_constructor_builds_test_id_selector() {
            let (_driver, session) = setup();
            let page = Page::attach(&session, "home");
            let el = page.element("save", "save button");
            assert_eq!(
                el.description(),
                "[save button: [data-test-id='save']]"
            );
        }
    }
}
