//! List page objects: all elements matching one locator.
//!
//! An [`Elements`] node resolves to the full current set of matches on
//! every attempt; nothing is cached across attempts. Search operations
//! over the list live in [`crate::list_presence`] and
//! [`crate::list_absence`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::driver::{ElementHandle, Locator, Session};
use crate::element::Element;
use crate::node::{Node, NodeCore, NodeKind, TICK};
use crate::result::{EsperarError, EsperarResult};

pub(crate) struct ElementsInner {
    pub(crate) core: NodeCore,
    pub(crate) cached: RefCell<Option<Vec<Rc<dyn ElementHandle>>>>,
}

impl Node for ElementsInner {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn kind(&self) -> NodeKind {
        NodeKind::List
    }

    fn resolve_now(&self) -> EsperarResult<()> {
        // Lists never reuse previous results; membership changes matter.
        *self.cached.borrow_mut() = None;
        let root = self.core.resolve_root()?;
        let candidates = self.core.query_candidates(root.as_ref())?;
        let conditions = self.core.conditions.borrow();
        let matched = if conditions.is_empty() {
            candidates
        } else {
            conditions.evaluate_list(&candidates)
        };
        if matched.is_empty() {
            return Err(EsperarError::NotFound {
                description: format!(
                    "{}Could not find any elements {} satisfying conditions {}",
                    self.core.log_prefix(),
                    self.core.description(),
                    conditions.description()
                ),
            });
        }
        *self.cached.borrow_mut() = Some(matched);
        Ok(())
    }

    fn resolved_handle(&self) -> Option<Rc<dyn ElementHandle>> {
        None
    }
}

/// A lazily resolved reference to every element matching one locator.
#[derive(Clone)]
pub struct Elements {
    pub(crate) inner: Rc<ElementsInner>,
}

impl Elements {
    pub(crate) fn from_parts(
        session: Session,
        locator: Locator,
        parent: Option<Rc<dyn Node>>,
        name: Option<String>,
    ) -> Self {
        Self {
            inner: Rc::new(ElementsInner {
                core: NodeCore::new(session, Some(locator), parent, name),
                cached: RefCell::new(None),
            }),
        }
    }

    pub(crate) fn as_node(&self) -> Rc<dyn Node> {
        Rc::<ElementsInner>::clone(&self.inner)
    }

    pub(crate) fn core(&self) -> &NodeCore {
        &self.inner.core
    }

    /// Diagnostic identity, e.g. `[rows: .table tr]`
    #[must_use]
    pub fn description(&self) -> String {
        self.inner.core.description()
    }

    /// The session this list belongs to
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.inner.core.session
    }

    pub(crate) fn resolve_within(&self, timeout: Duration) -> EsperarResult<()> {
        let what = format!("elements {}", self.description());
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
            })
    }

    /// Wait until at least one element matches.
    pub fn verify(&self, timeout: Duration) -> EsperarResult<&Self> {
        self.resolve_within(timeout)?;
        Ok(self)
    }

    /// Number of elements currently matching; `0` when resolution fails
    /// for any reason.
    #[must_use]
    pub fn size(&self) -> usize {
        if self.resolve_within(Duration::ZERO).is_err() {
            return 0;
        }
        self.inner.cached.borrow().as_ref().map_or(0, Vec::len)
    }

    /// Snapshot of the current matches as independent single elements;
    /// empty when nothing matches within `timeout`, like [`size`](Self::size).
    ///
    /// Each item holds a direct handle and never re-queries: a later
    /// change in list membership does not move an already-taken item.
    #[must_use]
    pub fn all(&self, timeout: Duration) -> Vec<Element> {
        if self.resolve_within(timeout).is_err() {
            return Vec::new();
        }
        let handles = self.inner.cached.borrow().clone().unwrap_or_default();
        let name = format!("{}: list item", self.inner.core.display_name());
        handles
            .into_iter()
            .map(|handle| self.snapshot_item(handle, name.clone()))
            .collect()
    }

    /// Detached single element bound to `handle`, parented to this list
    /// so frame recovery can walk the ancestor chain.
    pub(crate) fn snapshot_item(&self, handle: Rc<dyn ElementHandle>, name: String) -> Element {
        let item = Element::from_parts(
            self.inner.core.session.clone(),
            NodeKind::Element,
            None,
            Some(self.as_node()),
            Some(name),
        );
        item.bind_handle(handle);
        item
    }

    pub(crate) fn handles(&self) -> Vec<Rc<dyn ElementHandle>> {
        self.inner.cached.borrow().clone().unwrap_or_default()
    }

    /// Independent copy with its own conditions and resolution state
    #[must_use]
    pub fn extend(&self) -> Elements {
        let copy = Self {
            inner: Rc::new(ElementsInner {
                core: NodeCore::new(
                    self.inner.core.session.clone(),
                    self.inner.core.locator.clone(),
                    self.inner.core.parent(),
                    self.inner.core.name.clone(),
                ),
                cached: RefCell::new(self.inner.cached.borrow().clone()),
            }),
        };
        *copy.inner.core.conditions.borrow_mut() = self.inner.core.conditions.borrow().clone();
        copy
    }

    /// Drop the parent link; see [`Element::detach`]
    pub fn detach(&self, to_ancestor: bool) -> &Self {
        let new_parent = if to_ancestor {
            self.inner.core.top_ancestor()
        } else {
            None
        };
        *self.inner.core.parent.borrow_mut() = new_parent;
        self
    }

    // ---- attached conditions (filter list membership) --------------------

    /// Keep only visible elements
    pub fn visible(&self) -> Elements {
        self.inner.core.conditions.borrow_mut().visible();
        self.clone()
    }

    /// Keep only elements present but not visible
    pub fn invisible(&self) -> Elements {
        self.inner.core.conditions.borrow_mut().invisible();
        self.clone()
    }

    /// Keep only enabled elements
    pub fn enabled(&self) -> Elements {
        self.inner.core.conditions.borrow_mut().enabled();
        self.clone()
    }

    /// Keep only disabled elements
    pub fn disabled(&self) -> Elements {
        self.inner.core.conditions.borrow_mut().disabled();
        self.clone()
    }

    /// Keep only visible and enabled elements
    pub fn clickable(&self) -> Elements {
        self.inner.core.conditions.borrow_mut().clickable();
        self.clone()
    }

    /// Keep only selected elements
    pub fn selected(&self) -> Elements {
        self.inner.core.conditions.borrow_mut().selected();
        self.clone()
    }

    /// Keep only unselected elements
    pub fn not_selected(&self) -> Elements {
        self.inner.core.conditions.borrow_mut().not_selected();
        self.clone()
    }

    /// Keep only visible elements whose text contains `text`
    pub fn with_text(&self, text: impl Into<String>) -> Elements {
        self.inner.core.conditions.borrow_mut().text(text);
        self.clone()
    }
}

impl fmt::Debug for Elements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Elements({})", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Strategy;
    use crate::element::Page;
    use crate::mock::{MockDriver, MockElement};

    fn setup() -> (MockDriver, Session) {
        let driver = MockDriver::new();
        let session = Session::new(Box::new(driver.clone()), "chrome-1");
        (driver, session)
    }

    #[test]
    fn size_counts_current_matches() {
        let (driver, session) = setup();
        driver.register(
            Strategy::Css,
            ".row",
            &[MockElement::new("tr"), MockElement::new("tr")],
        );
        let page = Page::attach(&session, "home");
        let rows = page.list_by_selector(".row", "rows");
        assert_eq!(rows.size(), 2);

        driver.register(Strategy::Css, ".row", &[MockElement::new("tr")]);
        assert_eq!(rows.size(), 1);
    }

    #[test]
    fn size_is_zero_when_resolution_fails() {
        let (_driver, session) = setup();
        let page = Page::attach(&session, "home");
        let rows = page.list_by_selector(".row", "rows");
        assert_eq!(rows.size(), 0);
    }

    #[test]
    fn conditions_filter_membership() {
        let (driver, session) = setup();
        let shown = MockElement::new("li");
        let hidden = MockElement::new("li").displayed(false);
        driver.register(Strategy::Css, "li", &[shown, hidden]);

        let page = Page::attach(&session, "home");
        let items = page.list_by_selector("li", "items").visible();
        assert_eq!(items.size(), 1);
    }

    #[test]
    fn all_snapshots_do_not_follow_membership_changes() {
        let (driver, session) = setup();
        let first = MockElement::new("li").with_text("first");
        driver.register(Strategy::Css, "li", &[first.clone()]);

        let page = Page::attach(&session, "home");
        let items = page.list_by_selector("li", "items");
        let snapshot = items.all(Duration::ZERO);
        assert_eq!(snapshot.len(), 1);

        // The list grows afterwards; the snapshot keeps its one item and
        // the item keeps answering through its original handle.
        driver.register(
            Strategy::Css,
            "li",
            &[first, MockElement::new("li").with_text("second")],
        );
        assert_eq!(items.size(), 2);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].text(), "first");
    }

    #[test]
    fn all_is_empty_when_nothing_matches() {
        let (_driver, session) = setup();
        let page = Page::attach(&session, "home");
        let items = page.list_by_selector("li", "items");
        assert!(items.all(Duration::ZERO).is_empty());
    }

    #[test]
    fn lists_under_a_css_parent_combine_selectors() {
        let (driver, session) = setup();
        driver.register(
            Strategy::Css,
            ".table .row",
            &[MockElement::new("tr"), MockElement::new("tr")],
        );
        let page = Page::attach(&session, "home");
        let table = page.element_by_selector(".table", "table");
        let rows = table.list_by_selector(".row", "rows");
        assert_eq!(rows.size(), 2);
    }
}
