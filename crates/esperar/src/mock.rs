//! In-memory driver for tests.
//!
//! [`MockDriver`] and [`MockElement`] implement the driver boundary over a
//! scriptable fake DOM. There is no selector engine: tests register the
//! exact element lists a query should return, at document scope, inside a
//! named frame, or under a parent element. State is shared through `Rc`,
//! so a test can keep a handle and mutate visibility, text or staleness
//! while the engine polls.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::driver::{Driver, ElementHandle, Key, Strategy, WindowHandle};
use crate::result::{EsperarError, EsperarResult};

/// Attribute a frame element uses to name its inner document's query space
pub const FRAME_ID_ATTR: &str = "__frame_id";

/// Attribute holding the page source returned while switched into a frame
pub const FRAME_SOURCE_ATTR: &str = "__frame_source";

type QueryKey = (Strategy, String);

struct ElementData {
    tag: String,
    displayed: Cell<bool>,
    enabled: Cell<bool>,
    selected: Cell<bool>,
    stale: Cell<bool>,
    text: RefCell<String>,
    attributes: RefCell<HashMap<String, String>>,
    children: RefCell<HashMap<QueryKey, Vec<MockElement>>>,
    clicks: Cell<usize>,
    fail_clicks: Cell<usize>,
    reject_input: Cell<bool>,
    select_all_pending: Cell<bool>,
    typed: RefCell<Vec<String>>,
    keys_sent: RefCell<Vec<Key>>,
    clears: Cell<usize>,
    submits: Cell<usize>,
}

/// A fake DOM element. Clones share state.
#[derive(Clone)]
pub struct MockElement {
    data: Rc<ElementData>,
}

impl MockElement {
    /// New element with the given tag, displayed and enabled by default
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            data: Rc::new(ElementData {
                tag: tag.into(),
                displayed: Cell::new(true),
                enabled: Cell::new(true),
                selected: Cell::new(false),
                stale: Cell::new(false),
                text: RefCell::new(String::new()),
                attributes: RefCell::new(HashMap::new()),
                children: RefCell::new(HashMap::new()),
                clicks: Cell::new(0),
                fail_clicks: Cell::new(0),
                reject_input: Cell::new(false),
                select_all_pending: Cell::new(false),
                typed: RefCell::new(Vec::new()),
                keys_sent: RefCell::new(Vec::new()),
                clears: Cell::new(0),
                submits: Cell::new(0),
            }),
        }
    }

    /// New iframe element whose inner document answers queries registered
    /// under `frame_id` on the driver
    #[must_use]
    pub fn frame(frame_id: &str) -> Self {
        Self::new("iframe").with_attr(FRAME_ID_ATTR, frame_id)
    }

    /// Builder: initial visibility
    #[must_use]
    pub fn displayed(self, displayed: bool) -> Self {
        self.data.displayed.set(displayed);
        self
    }

    /// Builder: initial enabled state
    #[must_use]
    pub fn enabled(self, enabled: bool) -> Self {
        self.data.enabled.set(enabled);
        self
    }

    /// Builder: initial selected state
    #[must_use]
    pub fn selected(self, selected: bool) -> Self {
        self.data.selected.set(selected);
        self
    }

    /// Builder: initial visible text
    #[must_use]
    pub fn with_text(self, text: impl Into<String>) -> Self {
        *self.data.text.borrow_mut() = text.into();
        self
    }

    /// Builder: set an attribute
    #[must_use]
    pub fn with_attr(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.data
            .attributes
            .borrow_mut()
            .insert(name.into(), value.into());
        self
    }

    /// Change visibility while a test runs
    pub fn set_displayed(&self, displayed: bool) {
        self.data.displayed.set(displayed);
    }

    /// Change enabled state while a test runs
    pub fn set_enabled(&self, enabled: bool) {
        self.data.enabled.set(enabled);
    }

    /// Change selected state while a test runs
    pub fn set_selected(&self, selected: bool) {
        self.data.selected.set(selected);
    }

    /// Mark the element stale; every probe now fails with a driver error
    pub fn set_stale(&self, stale: bool) {
        self.data.stale.set(stale);
    }

    /// Change visible text while a test runs
    pub fn set_text(&self, text: impl Into<String>) {
        *self.data.text.borrow_mut() = text.into();
    }

    /// Set an attribute while a test runs
    pub fn set_attr(&self, name: impl Into<String>, value: impl Into<String>) {
        self.data
            .attributes
            .borrow_mut()
            .insert(name.into(), value.into());
    }

    /// Make the next `count` clicks fail with a driver error
    pub fn fail_next_clicks(&self, count: usize) {
        self.data.fail_clicks.set(count);
    }

    /// Make typed input silently not change the field value
    pub fn reject_input(&self, reject: bool) {
        self.data.reject_input.set(reject);
    }

    /// Register the result list for a scoped query under this element
    pub fn register_child(&self, strategy: Strategy, query: &str, elements: &[Self]) {
        self.data
            .children
            .borrow_mut()
            .insert((strategy, query.to_string()), elements.to_vec());
    }

    /// How many clicks landed
    #[must_use]
    pub fn click_count(&self) -> usize {
        self.data.clicks.get()
    }

    /// Every string typed into this element, in order
    #[must_use]
    pub fn typed(&self) -> Vec<String> {
        self.data.typed.borrow().clone()
    }

    /// Every named key sent, in order
    #[must_use]
    pub fn keys_sent(&self) -> Vec<Key> {
        self.data.keys_sent.borrow().clone()
    }

    /// Current field value (the `value` attribute)
    #[must_use]
    pub fn value(&self) -> String {
        self.data
            .attributes
            .borrow()
            .get("value")
            .cloned()
            .unwrap_or_default()
    }

    /// How many times the field was cleared
    #[must_use]
    pub fn clear_count(&self) -> usize {
        self.data.clears.get()
    }

    /// How many times the enclosing form was submitted
    #[must_use]
    pub fn submit_count(&self) -> usize {
        self.data.submits.get()
    }

    fn ensure_live(&self) -> EsperarResult<()> {
        if self.data.stale.get() {
            return Err(EsperarError::Driver {
                message: format!("stale element reference: <{}>", self.data.tag),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for MockElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockElement")
            .field("tag", &self.data.tag)
            .field("displayed", &self.data.displayed.get())
            .finish_non_exhaustive()
    }
}

impl ElementHandle for MockElement {
    fn find_elements(
        &self,
        strategy: Strategy,
        query: &str,
    ) -> EsperarResult<Vec<Rc<dyn ElementHandle>>> {
        self.ensure_live()?;
        let children = self.data.children.borrow();
        Ok(children
            .get(&(strategy, query.to_string()))
            .map(|found| {
                found
                    .iter()
                    .map(|el| Rc::new(el.clone()) as Rc<dyn ElementHandle>)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn is_displayed(&self) -> EsperarResult<bool> {
        self.ensure_live()?;
        Ok(self.data.displayed.get())
    }

    fn is_enabled(&self) -> EsperarResult<bool> {
        self.ensure_live()?;
        Ok(self.data.enabled.get())
    }

    fn is_selected(&self) -> EsperarResult<bool> {
        self.ensure_live()?;
        Ok(self.data.selected.get())
    }

    fn text(&self) -> EsperarResult<String> {
        self.ensure_live()?;
        Ok(self.data.text.borrow().clone())
    }

    fn attribute(&self, name: &str) -> EsperarResult<Option<String>> {
        self.ensure_live()?;
        Ok(self.data.attributes.borrow().get(name).cloned())
    }

    fn click(&self) -> EsperarResult<()> {
        self.ensure_live()?;
        let failures = self.data.fail_clicks.get();
        if failures > 0 {
            self.data.fail_clicks.set(failures - 1);
            return Err(EsperarError::Driver {
                message: "element click intercepted".to_string(),
            });
        }
        self.data.clicks.set(self.data.clicks.get() + 1);
        let is_checkbox = self
            .data
            .attributes
            .borrow()
            .get("type")
            .is_some_and(|t| t == "checkbox");
        if is_checkbox {
            self.data.selected.set(!self.data.selected.get());
        }
        Ok(())
    }

    fn clear(&self) -> EsperarResult<()> {
        self.ensure_live()?;
        self.data.clears.set(self.data.clears.get() + 1);
        self.data
            .attributes
            .borrow_mut()
            .insert("value".to_string(), String::new());
        Ok(())
    }

    fn send_keys(&self, text: &str) -> EsperarResult<()> {
        self.ensure_live()?;
        self.data.typed.borrow_mut().push(text.to_string());
        if !self.data.reject_input.get() {
            let mut attributes = self.data.attributes.borrow_mut();
            let value = attributes.entry("value".to_string()).or_default();
            if self.data.select_all_pending.get() {
                *value = text.to_string();
            } else {
                value.push_str(text);
            }
        }
        self.data.select_all_pending.set(false);
        Ok(())
    }

    fn send_key(&self, key: Key) -> EsperarResult<()> {
        self.ensure_live()?;
        self.data.keys_sent.borrow_mut().push(key);
        if matches!(key, Key::ControlA | Key::ShiftEnd) {
            self.data.select_all_pending.set(true);
        }
        Ok(())
    }

    fn submit(&self) -> EsperarResult<()> {
        self.ensure_live()?;
        self.data.submits.set(self.data.submits.get() + 1);
        Ok(())
    }
}

type ScriptHook = Box<dyn Fn()>;

struct DriverState {
    queries: RefCell<HashMap<QueryKey, Vec<MockElement>>>,
    frame_queries: RefCell<HashMap<(String, Strategy, String), Vec<MockElement>>>,
    context: RefCell<Option<String>>,
    default_switches: Cell<usize>,
    frame_switches: Cell<usize>,
    url: RefCell<String>,
    title: RefCell<String>,
    top_source: RefCell<String>,
    current_source: RefCell<String>,
    windows: RefCell<Vec<WindowHandle>>,
    current_window: RefCell<WindowHandle>,
    alert_pending: Cell<bool>,
    scripts: RefCell<Vec<String>>,
    script_stubs: RefCell<HashMap<String, Value>>,
    script_hooks: RefCell<HashMap<String, ScriptHook>>,
    fail_scripts: Cell<usize>,
    fail_navigations: Cell<usize>,
    fail_refreshes: Cell<usize>,
    navigations: RefCell<Vec<String>>,
    refreshes: Cell<usize>,
    windows_platform: Cell<bool>,
}

/// A fake browser session. Clones share state, so a test can hand a clone
/// to [`crate::Session`] and keep one for assertions.
#[derive(Clone)]
pub struct MockDriver {
    state: Rc<DriverState>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// New driver with one open window and an empty document
    #[must_use]
    pub fn new() -> Self {
        let initial = WindowHandle::new("w-0");
        Self {
            state: Rc::new(DriverState {
                queries: RefCell::new(HashMap::new()),
                frame_queries: RefCell::new(HashMap::new()),
                context: RefCell::new(None),
                default_switches: Cell::new(0),
                frame_switches: Cell::new(0),
                url: RefCell::new(String::new()),
                title: RefCell::new(String::new()),
                top_source: RefCell::new("<html></html>".to_string()),
                current_source: RefCell::new("<html></html>".to_string()),
                windows: RefCell::new(vec![initial.clone()]),
                current_window: RefCell::new(initial),
                alert_pending: Cell::new(false),
                scripts: RefCell::new(Vec::new()),
                script_stubs: RefCell::new(HashMap::new()),
                script_hooks: RefCell::new(HashMap::new()),
                fail_scripts: Cell::new(0),
                fail_navigations: Cell::new(0),
                fail_refreshes: Cell::new(0),
                navigations: RefCell::new(Vec::new()),
                refreshes: Cell::new(0),
                windows_platform: Cell::new(false),
            }),
        }
    }

    /// Register the result list for a document-scope query
    pub fn register(&self, strategy: Strategy, query: &str, elements: &[MockElement]) {
        self.state
            .queries
            .borrow_mut()
            .insert((strategy, query.to_string()), elements.to_vec());
    }

    /// Register the result list for a query inside the frame named
    /// `frame_id` (see [`MockElement::frame`])
    pub fn register_in_frame(
        &self,
        frame_id: &str,
        strategy: Strategy,
        query: &str,
        elements: &[MockElement],
    ) {
        self.state.frame_queries.borrow_mut().insert(
            (frame_id.to_string(), strategy, query.to_string()),
            elements.to_vec(),
        );
    }

    /// Set the current page title
    pub fn set_title(&self, title: impl Into<String>) {
        *self.state.title.borrow_mut() = title.into();
    }

    /// Set the current URL without recording a navigation
    pub fn set_url(&self, url: impl Into<String>) {
        *self.state.url.borrow_mut() = url.into();
    }

    /// Set the top-level document source
    pub fn set_source(&self, source: impl Into<String>) {
        let source = source.into();
        *self.state.top_source.borrow_mut() = source.clone();
        if self.state.context.borrow().is_none() {
            *self.state.current_source.borrow_mut() = source;
        }
    }

    /// Stub the value a script evaluates to
    pub fn stub_script(&self, script: &str, value: Value) {
        self.state
            .script_stubs
            .borrow_mut()
            .insert(script.to_string(), value);
    }

    /// Run a callback whenever an exact script executes
    pub fn on_script(&self, script: &str, hook: impl Fn() + 'static) {
        self.state
            .script_hooks
            .borrow_mut()
            .insert(script.to_string(), Box::new(hook));
    }

    /// Make the next `count` script executions fail
    pub fn fail_next_scripts(&self, count: usize) {
        self.state.fail_scripts.set(count);
    }

    /// Make the next `count` navigations fail
    pub fn fail_next_navigations(&self, count: usize) {
        self.state.fail_navigations.set(count);
    }

    /// Make the next `count` refreshes fail
    pub fn fail_next_refreshes(&self, count: usize) {
        self.state.fail_refreshes.set(count);
    }

    /// Open an additional window
    pub fn open_window(&self, id: &str) {
        self.state.windows.borrow_mut().push(WindowHandle::new(id));
    }

    /// Leave an alert pending; the next `accept_alert` consumes it
    pub fn set_alert_pending(&self, pending: bool) {
        self.state.alert_pending.set(pending);
    }

    /// Pretend the browser runs on Windows
    pub fn set_windows_platform(&self, windows: bool) {
        self.state.windows_platform.set(windows);
    }

    /// Every script executed, in order
    #[must_use]
    pub fn scripts_run(&self) -> Vec<String> {
        self.state.scripts.borrow().clone()
    }

    /// Every URL navigated to, in order
    #[must_use]
    pub fn navigations(&self) -> Vec<String> {
        self.state.navigations.borrow().clone()
    }

    /// How many times the page was reloaded
    #[must_use]
    pub fn refresh_count(&self) -> usize {
        self.state.refreshes.get()
    }

    /// How many times the context was reset to the top-level document
    #[must_use]
    pub fn default_content_switches(&self) -> usize {
        self.state.default_switches.get()
    }

    /// How many times the context entered a frame
    #[must_use]
    pub fn frame_switches(&self) -> usize {
        self.state.frame_switches.get()
    }

    /// The frame id currently switched into, if any
    #[must_use]
    pub fn current_context(&self) -> Option<String> {
        self.state.context.borrow().clone()
    }

    /// How many windows are open
    #[must_use]
    pub fn window_count(&self) -> usize {
        self.state.windows.borrow().len()
    }
}

impl std::fmt::Debug for MockDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDriver")
            .field("url", &self.state.url.borrow().clone())
            .field("context", &self.state.context.borrow().clone())
            .finish_non_exhaustive()
    }
}

impl Driver for MockDriver {
    fn find_elements(
        &self,
        strategy: Strategy,
        query: &str,
    ) -> EsperarResult<Vec<Rc<dyn ElementHandle>>> {
        let found = match self.state.context.borrow().as_deref() {
            Some(frame_id) => self
                .state
                .frame_queries
                .borrow()
                .get(&(frame_id.to_string(), strategy, query.to_string()))
                .cloned(),
            None => self
                .state
                .queries
                .borrow()
                .get(&(strategy, query.to_string()))
                .cloned(),
        };
        Ok(found
            .unwrap_or_default()
            .into_iter()
            .map(|el| Rc::new(el) as Rc<dyn ElementHandle>)
            .collect())
    }

    fn execute_script(&self, script: &str) -> EsperarResult<Value> {
        let failures = self.state.fail_scripts.get();
        if failures > 0 {
            self.state.fail_scripts.set(failures - 1);
            return Err(EsperarError::Script {
                message: "script execution rejected".to_string(),
            });
        }
        self.state.scripts.borrow_mut().push(script.to_string());
        if let Some(hook) = self.state.script_hooks.borrow().get(script) {
            hook();
        }
        Ok(self
            .state
            .script_stubs
            .borrow()
            .get(script)
            .cloned()
            .unwrap_or(Value::Null))
    }

    fn execute_script_on(
        &self,
        script: &str,
        element: &dyn ElementHandle,
    ) -> EsperarResult<Value> {
        // Probe the element so staleness surfaces as it would live
        element.is_displayed()?;
        self.execute_script(script)
    }

    fn switch_to_frame(&self, frame: &dyn ElementHandle) -> EsperarResult<()> {
        let frame_id = frame.attribute(FRAME_ID_ATTR)?.ok_or_else(|| {
            EsperarError::Driver {
                message: "no such frame".to_string(),
            }
        })?;
        let source = frame.attribute(FRAME_SOURCE_ATTR)?.unwrap_or_default();
        *self.state.context.borrow_mut() = Some(frame_id);
        *self.state.current_source.borrow_mut() = source;
        self.state
            .frame_switches
            .set(self.state.frame_switches.get() + 1);
        Ok(())
    }

    fn switch_to_default_content(&self) -> EsperarResult<()> {
        *self.state.context.borrow_mut() = None;
        *self.state.current_source.borrow_mut() = self.state.top_source.borrow().clone();
        self.state
            .default_switches
            .set(self.state.default_switches.get() + 1);
        Ok(())
    }

    fn current_url(&self) -> EsperarResult<String> {
        Ok(self.state.url.borrow().clone())
    }

    fn title(&self) -> EsperarResult<String> {
        Ok(self.state.title.borrow().clone())
    }

    fn window_handles(&self) -> EsperarResult<Vec<WindowHandle>> {
        Ok(self.state.windows.borrow().clone())
    }

    fn current_window(&self) -> EsperarResult<WindowHandle> {
        Ok(self.state.current_window.borrow().clone())
    }

    fn switch_to_window(&self, window: &WindowHandle) -> EsperarResult<()> {
        if !self.state.windows.borrow().contains(window) {
            return Err(EsperarError::Driver {
                message: format!("no such window: {window}"),
            });
        }
        *self.state.current_window.borrow_mut() = window.clone();
        Ok(())
    }

    fn navigate(&self, url: &str) -> EsperarResult<()> {
        let failures = self.state.fail_navigations.get();
        if failures > 0 {
            self.state.fail_navigations.set(failures - 1);
            return Err(EsperarError::Driver {
                message: "navigation failed".to_string(),
            });
        }
        *self.state.url.borrow_mut() = url.to_string();
        self.state.navigations.borrow_mut().push(url.to_string());
        Ok(())
    }

    fn refresh(&self) -> EsperarResult<()> {
        let failures = self.state.fail_refreshes.get();
        if failures > 0 {
            self.state.fail_refreshes.set(failures - 1);
            return Err(EsperarError::Driver {
                message: "refresh failed".to_string(),
            });
        }
        self.state.refreshes.set(self.state.refreshes.get() + 1);
        Ok(())
    }

    fn close_window(&self) -> EsperarResult<()> {
        let current = self.state.current_window.borrow().clone();
        let mut windows = self.state.windows.borrow_mut();
        windows.retain(|w| *w != current);
        if let Some(last) = windows.last() {
            *self.state.current_window.borrow_mut() = last.clone();
        }
        Ok(())
    }

    fn accept_alert(&self) -> EsperarResult<()> {
        if self.state.alert_pending.get() {
            self.state.alert_pending.set(false);
            Ok(())
        } else {
            Err(EsperarError::Driver {
                message: "no alert open".to_string(),
            })
        }
    }

    fn page_source(&self) -> EsperarResult<String> {
        Ok(self.state.current_source.borrow().clone())
    }

    fn windows_platform(&self) -> bool {
        self.state.windows_platform.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_queries_resolve() {
        let driver = MockDriver::new();
        let button = MockElement::new("button");
        driver.register(Strategy::Css, ".save", &[button]);
        assert_eq!(driver.find_elements(Strategy::Css, ".save").unwrap().len(), 1);
        assert!(driver.find_elements(Strategy::Css, ".other").unwrap().is_empty());
    }

    #[test]
    fn stale_elements_fail_every_probe() {
        let element = MockElement::new("div");
        element.set_stale(true);
        assert!(element.is_displayed().is_err());
        assert!(element.click().is_err());
        assert!(element.text().is_err());
    }

    #[test]
    fn frame_switch_changes_query_space_and_source() {
        let driver = MockDriver::new();
        driver.set_source("<html>top</html>");
        let frame = MockElement::frame("login")
            .with_attr(FRAME_SOURCE_ATTR, "<html>inner</html>");
        let field = MockElement::new("input");
        driver.register_in_frame("login", Strategy::Css, ".user", &[field]);

        driver.switch_to_frame(&frame).unwrap();
        assert_eq!(driver.current_context().as_deref(), Some("login"));
        assert_eq!(driver.page_source().unwrap(), "<html>inner</html>");
        assert_eq!(driver.find_elements(Strategy::Css, ".user").unwrap().len(), 1);

        driver.switch_to_default_content().unwrap();
        assert_eq!(driver.current_context(), None);
        assert_eq!(driver.page_source().unwrap(), "<html>top</html>");
        assert!(driver.find_elements(Strategy::Css, ".user").unwrap().is_empty());
    }

    #[test]
    fn select_all_then_type_replaces_value() {
        let field = MockElement::new("input").with_attr("value", "old");
        field.send_key(Key::Home).unwrap();
        field.send_key(Key::ControlA).unwrap();
        field.send_keys("new").unwrap();
        assert_eq!(field.value(), "new");

        field.send_keys("er").unwrap();
        assert_eq!(field.value(), "newer");
    }

    #[test]
    fn transient_click_failures_run_out() {
        let button = MockElement::new("button");
        button.fail_next_clicks(2);
        assert!(button.click().is_err());
        assert!(button.click().is_err());
        assert!(button.click().is_ok());
        assert_eq!(button.click_count(), 1);
    }

    #[test]
    fn checkbox_click_toggles_selection() {
        let checkbox = MockElement::new("input").with_attr("type", "checkbox");
        assert!(!checkbox.is_selected().unwrap());
        checkbox.click().unwrap();
        assert!(checkbox.is_selected().unwrap());
        checkbox.click().unwrap();
        assert!(!checkbox.is_selected().unwrap());
    }

    #[test]
    fn script_hooks_and_stubs_fire() {
        let driver = MockDriver::new();
        let observer = driver.clone();
        driver.on_script("window.open();", move || observer.open_window("w-1"));
        driver.stub_script("return 2;", Value::from(2));

        driver.execute_script("window.open();").unwrap();
        assert_eq!(driver.window_count(), 2);
        assert_eq!(driver.execute_script("return 2;").unwrap(), Value::from(2));
    }

    #[test]
    fn closing_a_window_refocuses_the_last_remaining() {
        let driver = MockDriver::new();
        driver.open_window("w-1");
        driver
            .switch_to_window(&WindowHandle::new("w-1"))
            .unwrap();
        driver.close_window().unwrap();
        assert_eq!(driver.window_count(), 1);
        assert_eq!(driver.current_window().unwrap(), WindowHandle::new("w-0"));
    }
}
