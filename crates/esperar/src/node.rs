//! Shared node state and the polling wait engine.
//!
//! Every page-object node (single element, list, page, iframe, section)
//! carries a [`NodeCore`] and implements the private [`Node`] trait, the
//! seam the resolver walks when a child needs its parent resolved first.
//! Links point upward only; parents never track their children.

use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use crate::condition::Conditions;
use crate::driver::{ElementHandle, Locator, Session};
use crate::result::{EsperarError, EsperarResult};

/// Default timeout for waits and verifications
pub const TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between wait-loop attempts
pub const TICK: Duration = Duration::from_millis(500);

/// Slack added to every deadline so an attempt started just before the
/// timeout still completes
pub(crate) const GRACE: Duration = Duration::from_millis(900);

/// Attribute queried by the shorthand constructors (`element`, `list`, ...)
pub const DEFAULT_ATTR_ID: &str = "data-test-id";

const SCRIPT_RETRIES: usize = 5;
const SCRIPT_RETRY_PAUSE: Duration = Duration::from_secs(2);

/// What kind of node this is; resolution behavior differs per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Page,
    Iframe,
    Section,
    Element,
    List,
}

/// The resolution seam. A parent is held as `Rc<dyn Node>` so a child can
/// resolve it without knowing its concrete type.
pub(crate) trait Node {
    fn core(&self) -> &NodeCore;
    fn kind(&self) -> NodeKind;

    /// One resolution attempt, no waiting. Errors are interpreted by the
    /// wait engine via [`EsperarError::is_retryable`].
    fn resolve_now(&self) -> EsperarResult<()>;

    /// The native element bound by the last successful resolution, if the
    /// node kind binds one (pages and lists do not).
    fn resolved_handle(&self) -> Option<Rc<dyn ElementHandle>>;
}

/// State common to all node kinds.
pub(crate) struct NodeCore {
    pub(crate) session: Session,
    pub(crate) locator: Option<Locator>,
    pub(crate) parent: RefCell<Option<Rc<dyn Node>>>,
    pub(crate) name: Option<String>,
    pub(crate) conditions: RefCell<Conditions>,
}

impl NodeCore {
    pub(crate) fn new(
        session: Session,
        locator: Option<Locator>,
        parent: Option<Rc<dyn Node>>,
        name: Option<String>,
    ) -> Self {
        Self {
            session,
            locator,
            parent: RefCell::new(parent),
            name,
            conditions: RefCell::new(Conditions::new()),
        }
    }

    pub(crate) fn parent(&self) -> Option<Rc<dyn Node>> {
        self.parent.borrow().clone()
    }

    /// Diagnostic identity: `[name: query]`, `[query]`, `[name]` or
    /// `[Unknown]` depending on what the node carries.
    pub(crate) fn description(&self) -> String {
        match (&self.name, &self.locator) {
            (Some(name), Some(locator)) => format!("[{name}: {}]", locator.query),
            (None, Some(locator)) => format!("[{}]", locator.query),
            (Some(name), None) => format!("[{name}]"),
            (None, None) => "[Unknown]".to_string(),
        }
    }

    /// Short identity for log lines: the name when present, else the query.
    pub(crate) fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.locator
            .as_ref()
            .map_or_else(|| "Unknown".to_string(), |locator| locator.query.clone())
    }

    /// Prefix carried by every surfaced error so interleaved sessions can
    /// be told apart.
    pub(crate) fn log_prefix(&self) -> String {
        format!("{} >> ", self.session.name())
    }

    /// Nearest enclosing frame node, walking the parent chain. Stops at
    /// the first iframe; a page boundary means top-level content.
    pub(crate) fn parent_frame(&self) -> Option<Rc<dyn Node>> {
        let parent = self.parent()?;
        match parent.kind() {
            NodeKind::Iframe => Some(parent),
            NodeKind::Page => None,
            _ => parent.core().parent_frame(),
        }
    }

    /// Topmost ancestor, or the first enclosing iframe when one exists.
    /// `None` when the node has no parent at all.
    pub(crate) fn top_ancestor(&self) -> Option<Rc<dyn Node>> {
        let mut ancestor = self.parent()?;
        loop {
            if ancestor.kind() == NodeKind::Iframe {
                return Some(ancestor);
            }
            match ancestor.core().parent() {
                Some(next) => ancestor = next,
                None => return Some(ancestor),
            }
        }
    }

    /// Establish the search root for one resolution attempt: resolve the
    /// parent when there is one (its failure fails this attempt), or reset
    /// the driver to the top-level document when there is none.
    pub(crate) fn resolve_root(&self) -> EsperarResult<Option<Rc<dyn ElementHandle>>> {
        match self.parent() {
            Some(parent) => {
                parent.resolve_now().map_err(|err| {
                    if err.is_retryable() {
                        EsperarError::NotFound {
                            description: format!(
                                "{}Could not locate parent {} of {}: {}",
                                self.log_prefix(),
                                parent.core().description(),
                                self.description(),
                                err
                            ),
                        }
                    } else {
                        err
                    }
                })?;
                Ok(parent.resolved_handle())
            }
            None => {
                self.session.driver().switch_to_default_content()?;
                Ok(None)
            }
        }
    }

    /// Query candidates below the established root. An iframe parent
    /// yields no scoping handle: after switching into the frame, the
    /// search covers that frame's whole document.
    pub(crate) fn query_candidates(
        &self,
        root: Option<&Rc<dyn ElementHandle>>,
    ) -> EsperarResult<Vec<Rc<dyn ElementHandle>>> {
        let Some(locator) = &self.locator else {
            return Ok(Vec::new());
        };
        let parent_is_iframe = self
            .parent()
            .is_some_and(|parent| parent.kind() == NodeKind::Iframe);
        match root {
            Some(root) if !parent_is_iframe => {
                root.find_elements(locator.strategy, &locator.query)
            }
            _ => self
                .session
                .driver()
                .find_elements(locator.strategy, &locator.query),
        }
    }

    /// Block for roughly `duration`, in wait-engine ticks.
    pub(crate) fn wait(&self, duration: Duration) {
        let target = Instant::now() + duration;
        // Cannot fail: the predicate never errors and the deadline always
        // outlives the target.
        let _ = self.wait_until(
            || Ok((Instant::now() >= target).then_some(())),
            None,
            TICK,
            duration + Duration::from_secs(2),
        );
    }

    /// Poll `condition` every `tick` until it yields a value or `timeout`
    /// (plus grace) elapses.
    ///
    /// `Ok(None)` means "not yet". A retryable error is remembered and
    /// re-raised if the wait exhausts the deadline; a fatal error aborts
    /// immediately. When the deadline passes without any recorded error, a
    /// `Timeout` built from `description` is returned.
    pub(crate) fn wait_until<T>(
        &self,
        mut condition: impl FnMut() -> EsperarResult<Option<T>>,
        description: Option<&str>,
        tick: Duration,
        timeout: Duration,
    ) -> EsperarResult<T> {
        let deadline = Instant::now() + timeout + GRACE;
        let mut last_error: Option<EsperarError> = None;
        loop {
            match condition() {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => last_error = None,
                Err(err) if err.is_retryable() => last_error = Some(err),
                Err(err) => return Err(err),
            }
            if Instant::now() > deadline {
                break;
            }
            thread::sleep(tick);
        }
        if let Some(err) = last_error {
            return Err(err);
        }
        let what = description.map_or_else(
            || "condition.".to_string(),
            |description| description.to_string(),
        );
        Err(EsperarError::Timeout {
            description: format!("{}Timeout waiting for: {}", self.log_prefix(), what),
        })
    }

    /// Run `condition` once, mapping any failure to `false`.
    pub(crate) fn try_or_false(&self, condition: impl FnOnce() -> EsperarResult<bool>) -> bool {
        condition().unwrap_or(false)
    }

    /// Execute JavaScript in the top-level document context, retrying up
    /// to five times with a two-second pause when the driver misbehaves.
    pub(crate) fn execute_script(&self, script: &str) -> EsperarResult<Value> {
        self.execute_script_inner(script, SCRIPT_RETRIES)
    }

    /// Execute JavaScript once, without the retry envelope.
    pub(crate) fn execute_script_once(&self, script: &str) -> EsperarResult<Value> {
        self.execute_script_inner(script, 0)
    }

    fn execute_script_inner(&self, script: &str, retries: usize) -> EsperarResult<Value> {
        debug!(
            session = %self.session.name(),
            script = %script.chars().take(80).collect::<String>(),
            "execute script"
        );
        let mut attempt = 0;
        loop {
            let result = self
                .session
                .driver()
                .switch_to_default_content()
                .and_then(|()| self.session.driver().execute_script(script));
            match result {
                Ok(value) => return Ok(value),
                Err(err) if attempt < retries => {
                    debug!(
                        session = %self.session.name(),
                        error = %err,
                        attempt,
                        "script failed, retrying"
                    );
                    attempt += 1;
                    self.wait(SCRIPT_RETRY_PAUSE);
                }
                Err(err) => return Err(err),
            }
        }
    }
}
