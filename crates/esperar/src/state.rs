//! State queries, text waits and page audits.

use std::collections::BTreeSet;
use std::time::Duration;

use regex::Regex;
use tracing::error;

use crate::element::Element;
use crate::node::{TICK, TIMEOUT};
use crate::result::{EsperarError, EsperarResult};

impl Element {
    // ---- boolean probes --------------------------------------------------

    /// Whether the element binds within `timeout` and is visible
    #[must_use]
    pub fn is_displayed(&self, timeout: Duration) -> bool {
        self.exists(timeout)
            && self
                .handle()
                .is_some_and(|handle| handle.is_displayed().unwrap_or(false))
    }

    /// [`Element::is_displayed`] without waiting
    #[must_use]
    pub fn is_displayed_now(&self) -> bool {
        self.is_displayed(Duration::ZERO)
    }

    /// Wait until the element is gone or no longer visible
    pub fn not_displayed(&self, timeout: Duration) -> EsperarResult<()> {
        let what = format!("element to disappear {}", self.description());
        self.inner.core.wait_until(
            || Ok((!self.is_displayed_now()).then_some(())),
            Some(&what),
            TICK,
            timeout,
        )
    }

    /// Whether the element binds within `timeout` and is enabled
    #[must_use]
    pub fn is_enabled(&self, timeout: Duration) -> bool {
        self.exists(timeout)
            && self
                .handle()
                .is_some_and(|handle| handle.is_enabled().unwrap_or(false))
    }

    /// Whether the element binds within `timeout` and is selected
    #[must_use]
    pub fn is_selected(&self, timeout: Duration) -> bool {
        self.exists(timeout)
            && self
                .handle()
                .is_some_and(|handle| handle.is_selected().unwrap_or(false))
    }

    /// Whether the element binds within `timeout`, visible and enabled
    #[must_use]
    pub fn is_clickable(&self, timeout: Duration) -> bool {
        self.exists(timeout)
            && self.handle().is_some_and(|handle| {
                handle.is_displayed().unwrap_or(false) && handle.is_enabled().unwrap_or(false)
            })
    }

    // ---- condition-scoped verifications -----------------------------------
    //
    // Each returns an independent copy carrying the extra condition, so
    // the original element's resolution behavior is untouched.

    /// Wait for the element to be visible
    pub fn verify_visible(&self, timeout: Duration) -> EsperarResult<Element> {
        let copy = self.extend().visible();
        copy.verify(timeout)?;
        Ok(copy)
    }

    /// Wait for the element to be present but not visible
    pub fn verify_invisible(&self, timeout: Duration) -> EsperarResult<Element> {
        let copy = self.extend().invisible();
        copy.verify(timeout)?;
        Ok(copy)
    }

    /// Wait for the element to be enabled
    pub fn verify_enabled(&self, timeout: Duration) -> EsperarResult<Element> {
        let copy = self.extend().enabled();
        copy.verify(timeout)?;
        Ok(copy)
    }

    /// Wait for the element to be disabled
    pub fn verify_disabled(&self, timeout: Duration) -> EsperarResult<Element> {
        let copy = self.extend().disabled();
        copy.verify(timeout)?;
        Ok(copy)
    }

    /// Wait for the element to be visible and enabled
    pub fn verify_clickable(&self, timeout: Duration) -> EsperarResult<Element> {
        let copy = self.extend().clickable();
        copy.verify(timeout)?;
        Ok(copy)
    }

    /// Wait for the element to be selected
    pub fn verify_selected(&self, timeout: Duration) -> EsperarResult<Element> {
        let copy = self.extend().selected();
        copy.verify(timeout)?;
        Ok(copy)
    }

    /// Wait for the element not to be selected
    pub fn verify_not_selected(&self, timeout: Duration) -> EsperarResult<Element> {
        let copy = self.extend().not_selected();
        copy.verify(timeout)?;
        Ok(copy)
    }

    /// Wait for the element to be visible with text containing `text`
    pub fn verify_with_text(&self, text: &str, timeout: Duration) -> EsperarResult<Element> {
        let copy = self.extend().with_text(text);
        copy.verify(timeout)?;
        Ok(copy)
    }

    // ---- text and attributes ----------------------------------------------

    /// Current text of the element, falling back through the `value`,
    /// `textContent`, `innerText` and `innerHTML` properties when the
    /// rendered text is empty. Empty when the element cannot be read.
    #[must_use]
    pub fn text(&self) -> String {
        if self.handle().is_none() && !self.exists(Duration::ZERO) {
            return String::new();
        }
        let Some(handle) = self.handle() else {
            return String::new();
        };
        let text = handle.text().unwrap_or_default();
        if !text.is_empty() {
            return text;
        }
        for property in ["value", "textContent", "innerText", "innerHTML"] {
            if let Some(value) = self.attribute(property) {
                if !value.is_empty() {
                    return value;
                }
            }
        }
        String::new()
    }

    /// Attribute or property of the bound handle; `None` when absent or
    /// when the element is not resolved
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<String> {
        let handle = self.handle()?;
        handle.attribute(name).ok().flatten()
    }

    /// Wait until `attribute` equals `value` exactly
    pub fn has_attribute_value(
        &self,
        attribute: &str,
        value: &str,
        timeout: Duration,
    ) -> EsperarResult<()> {
        self.verify(TIMEOUT)?;
        let mut last: Option<String> = None;
        self.inner
            .core
            .wait_until(
                || {
                    let observed = self.attribute(attribute);
                    last.clone_from(&observed);
                    Ok((observed.as_deref() == Some(value)).then_some(()))
                },
                None,
                TICK,
                timeout,
            )
            .map_err(|_| EsperarError::Timeout {
                description: format!(
                    "{}Timeout waiting for attribute '{}' of {} to be '{}', last seen {:?}",
                    self.inner.core.log_prefix(),
                    attribute,
                    self.description(),
                    value,
                    last
                ),
            })
    }

    /// Wait until the field value equals `value`
    pub fn value_is(&self, value: &str, timeout: Duration) -> EsperarResult<()> {
        self.has_attribute_value("value", value, timeout)
    }

    /// Wait until the element's text equals `expected`. Empty observed
    /// text counts as "not yet". The timeout message carries the last
    /// text actually seen.
    pub fn text_is(
        &self,
        expected: &str,
        ignore_case: bool,
        timeout: Duration,
    ) -> EsperarResult<()> {
        let want = if ignore_case {
            expected.to_lowercase()
        } else {
            expected.to_string()
        };
        let target = want.clone();
        self.wait_for_text(timeout, "be", &want, move |observed| {
            let observed = if ignore_case {
                observed.to_lowercase()
            } else {
                observed.to_string()
            };
            observed == target
        })
    }

    /// Wait until the element's text contains `expected`
    pub fn text_contains(
        &self,
        expected: &str,
        ignore_case: bool,
        timeout: Duration,
    ) -> EsperarResult<()> {
        let want = if ignore_case {
            expected.to_lowercase()
        } else {
            expected.to_string()
        };
        let target = want.clone();
        self.wait_for_text(timeout, "contain", &want, move |observed| {
            let observed = if ignore_case {
                observed.to_lowercase()
            } else {
                observed.to_string()
            };
            observed.contains(&target)
        })
    }

    /// Wait until the element's text starts with a match of `pattern`
    pub fn text_matches(&self, pattern: &str, timeout: Duration) -> EsperarResult<()> {
        let re = Regex::new(pattern).map_err(|err| EsperarError::Script {
            message: format!("invalid pattern '{pattern}': {err}"),
        })?;
        self.wait_for_text(timeout, "match", pattern, move |observed| {
            re.find(observed).is_some_and(|m| m.start() == 0)
        })
    }

    fn wait_for_text(
        &self,
        timeout: Duration,
        relation: &str,
        expected: &str,
        accept: impl Fn(&str) -> bool,
    ) -> EsperarResult<()> {
        self.verify(TIMEOUT)?;
        let mut last = String::from("(ELEMENT_TEXT_IS_EMPTY)");
        self.inner
            .core
            .wait_until(
                || {
                    let observed = self.text();
                    if observed.is_empty() {
                        return Ok(None);
                    }
                    last.clone_from(&observed);
                    Ok(accept(&observed).then_some(()))
                },
                None,
                TICK,
                timeout,
            )
            .map_err(|_| EsperarError::Timeout {
                description: format!(
                    "{}Timeout waiting for text of {} to {} '{}', last seen '{}'",
                    self.inner.core.log_prefix(),
                    self.description(),
                    relation,
                    expected,
                    last
                ),
            })
    }

    // ---- page-level audits --------------------------------------------------

    /// Wait until the browser URL ends with one of `suffixes`
    pub fn url_ends_with(&self, suffixes: &[&str], timeout: Duration) -> EsperarResult<()> {
        let what = format!("url ending with one of {suffixes:?}");
        self.inner.core.wait_until(
            || {
                let url = self.session().driver().current_url()?;
                Ok(suffixes
                    .iter()
                    .any(|suffix| url.ends_with(suffix))
                    .then_some(()))
            },
            Some(&what),
            TICK,
            timeout,
        )
    }

    /// Fetch every anchor's href on the page (deduplicated, minus those
    /// starting with a whitelist prefix) and fail when any responds with
    /// an error. Each link gets one retry.
    pub fn verify_all_links(&self, whitelist: &[&str], verify_ssl: bool) -> EsperarResult<()> {
        let links = self.list_by_tag("a", "page links");
        if links.verify(Duration::from_secs(1)).is_err() {
            // A page without links has nothing to audit.
            return Ok(());
        }
        let mut hrefs: BTreeSet<String> = BTreeSet::new();
        for handle in links.handles() {
            let Ok(Some(href)) = handle.attribute("href") else {
                continue;
            };
            if href.is_empty() || whitelist.iter().any(|prefix| href.starts_with(prefix)) {
                continue;
            }
            hrefs.insert(href);
        }
        if hrefs.is_empty() {
            return Ok(());
        }
        let client = reqwest::blocking::Client::builder()
            .danger_accept_invalid_certs(!verify_ssl)
            .build()
            .map_err(|err| EsperarError::Http {
                message: err.to_string(),
            })?;
        let mut broken: Vec<String> = Vec::new();
        for href in &hrefs {
            if let Some(problem) = check_link(&client, href) {
                error!(
                    session = %self.session().name(),
                    link = %href,
                    problem = %problem,
                    "broken link"
                );
                broken.push(format!("{href} ({problem})"));
            }
        }
        if broken.is_empty() {
            Ok(())
        } else {
            Err(EsperarError::Http {
                message: format!(
                    "broken links on {}: {}",
                    self.description(),
                    broken.join(", ")
                ),
            })
        }
    }
}

fn check_link(client: &reqwest::blocking::Client, href: &str) -> Option<String> {
    let mut last = String::new();
    for _ in 0..2 {
        match client.get(href).send() {
            Ok(response) if response.status().is_success() || response.status().is_redirection() => {
                return None;
            }
            Ok(response) => last = format!("status {}", response.status()),
            Err(err) => last = err.to_string(),
        }
    }
    Some(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{Session, Strategy};
    use crate::element::Page;
    use crate::mock::{MockDriver, MockElement};

    fn target(driver: &MockDriver, element: &MockElement) -> Element {
        driver.register(Strategy::Css, ".it", std::slice::from_ref(element));
        let session = Session::new(Box::new(driver.clone()), "chrome-1");
        Page::attach(&session, "home").element_by_selector(".it", "it")
    }

    mod probe_tests {
        use super::*;

        #[test]
        fn boolean_probes_reflect_element_state() {
            let driver = MockDriver::new();
            let element = MockElement::new("button").enabled(false);
            let it = target(&driver, &element);

            assert!(it.is_displayed(Duration::ZERO));
            assert!(!it.is_enabled(Duration::ZERO));
            assert!(!it.is_clickable(Duration::ZERO));
            assert!(!it.is_selected(Duration::ZERO));

            element.set_enabled(true);
            element.set_selected(true);
            assert!(it.is_clickable(Duration::ZERO));
            assert!(it.is_selected(Duration::ZERO));
        }

        #[test]
        fn probes_are_false_for_missing_elements() {
            let driver = MockDriver::new();
            let session = Session::new(Box::new(driver.clone()), "chrome-1");
            let missing = Page::attach(&session, "home").element_by_selector(".no", "no");
            assert!(!missing.is_displayed_now());
            assert!(!missing.is_enabled(Duration::ZERO));
        }

        #[test]
        fn not_displayed_accepts_a_hidden_element() {
            let driver = MockDriver::new();
            let element = MockElement::new("div").displayed(false);
            let it = target(&driver, &element);
            assert!(it.not_displayed(Duration::ZERO).is_ok());
        }

        #[test]
        fn not_displayed_times_out_while_visible() {
            let driver = MockDriver::new();
            let element = MockElement::new("div");
            let it = target(&driver, &element);
            let err = it.not_displayed(Duration::ZERO).unwrap_err();
            assert!(matches!(err, EsperarError::Timeout { .. }));
        }
    }

    mod verify_tests {
        use super::*;

        #[test]
        fn verify_visible_returns_a_copy_and_spares_the_original() {
            let driver = MockDriver::new();
            let element = MockElement::new("div").displayed(false);
            let it = target(&driver, &element);

            assert!(it.verify_visible(Duration::ZERO).is_err());
            // The original still resolves without the visibility demand.
            assert!(it.exists(Duration::ZERO));

            element.set_displayed(true);
            assert!(it.verify_visible(Duration::ZERO).is_ok());
        }

        #[test]
        fn verify_disabled_and_selected() {
            let driver = MockDriver::new();
            let element = MockElement::new("input").enabled(false).selected(true);
            let it = target(&driver, &element);
            assert!(it.verify_disabled(Duration::ZERO).is_ok());
            assert!(it.verify_selected(Duration::ZERO).is_ok());
            assert!(it.verify_not_selected(Duration::ZERO).is_err());
        }

        #[test]
        fn verify_with_text_requires_visible_text() {
            let driver = MockDriver::new();
            let element = MockElement::new("span").with_text("all done");
            let it = target(&driver, &element);
            assert!(it.verify_with_text("done", Duration::ZERO).is_ok());
            assert!(it.verify_with_text("pending", Duration::ZERO).is_err());
        }
    }

    mod text_tests {
        use super::*;

        #[test]
        fn text_falls_back_through_properties() {
            let driver = MockDriver::new();
            let element = MockElement::new("input").with_attr("value", "typed");
            let it = target(&driver, &element);
            assert_eq!(it.text(), "typed");

            element.set_text("rendered");
            assert_eq!(it.text(), "rendered");
        }

        #[test]
        fn text_prefers_value_over_inner_html() {
            let driver = MockDriver::new();
            let element = MockElement::new("input")
                .with_attr("innerHTML", "<b>markup</b>")
                .with_attr("value", "typed");
            let it = target(&driver, &element);
            assert_eq!(it.text(), "typed");
        }

        #[test]
        fn text_is_empty_for_missing_elements() {
            let driver = MockDriver::new();
            let session = Session::new(Box::new(driver.clone()), "chrome-1");
            let missing = Page::attach(&session, "home").element_by_selector(".no", "no");
            assert_eq!(missing.text(), "");
        }

        #[test]
        fn text_is_compares_exactly_and_case_insensitively() {
            let driver = MockDriver::new();
            let element = MockElement::new("span").with_text("Ready");
            let it = target(&driver, &element);

            assert!(it.text_is("Ready", false, Duration::ZERO).is_ok());
            assert!(it.text_is("ready", false, Duration::ZERO).is_err());
            assert!(it.text_is("ready", true, Duration::ZERO).is_ok());
        }

        #[test]
        fn text_timeout_reports_the_last_observed_text() {
            let driver = MockDriver::new();
            let element = MockElement::new("span").with_text("loading");
            let it = target(&driver, &element);

            let err = it.text_is("ready", false, Duration::ZERO).unwrap_err();
            let message = err.to_string();
            assert!(message.contains("'ready'"));
            assert!(message.contains("'loading'"));
        }

        #[test]
        fn text_contains_ignores_case_when_asked() {
            let driver = MockDriver::new();
            let element = MockElement::new("span").with_text("42 Items Left");
            let it = target(&driver, &element);

            assert!(it.text_contains("items", true, Duration::ZERO).is_ok());
            assert!(it.text_contains("items", false, Duration::ZERO).is_err());
            // The timeout message still reports the wanted needle.
            let err = it
                .text_contains("gone", true, Duration::ZERO)
                .unwrap_err();
            assert!(err.to_string().contains("'gone'"));
        }

        #[test]
        fn text_contains_and_matches() {
            let driver = MockDriver::new();
            let element = MockElement::new("span").with_text("42 items left");
            let it = target(&driver, &element);

            assert!(it.text_contains("items", false, Duration::ZERO).is_ok());
            assert!(it.text_matches(r"\d+ items", Duration::ZERO).is_ok());
            // Anchored: a match later in the text does not count.
            assert!(it.text_matches(r"items", Duration::ZERO).is_err());
        }

        #[test]
        fn invalid_patterns_fail_fast() {
            let driver = MockDriver::new();
            let element = MockElement::new("span").with_text("x");
            let it = target(&driver, &element);
            let err = it.text_matches("(unclosed", Duration::ZERO).unwrap_err();
            assert!(matches!(err, EsperarError::Script { .. }));
        }
    }

    mod attribute_tests {
        use super::*;

        #[test]
        fn attribute_reads_through_the_bound_handle() {
            let driver = MockDriver::new();
            let element = MockElement::new("a").with_attr("href", "/docs");
            let it = target(&driver, &element);
            it.verify(Duration::ZERO).unwrap();
            assert_eq!(it.attribute("href").as_deref(), Some("/docs"));
            assert_eq!(it.attribute("missing"), None);
        }

        #[test]
        fn has_attribute_value_waits_for_exact_equality() {
            let driver = MockDriver::new();
            let element = MockElement::new("div").with_attr("data-state", "ready");
            let it = target(&driver, &element);

            assert!(it
                .has_attribute_value("data-state", "ready", Duration::ZERO)
                .is_ok());
            let err = it
                .has_attribute_value("data-state", "busy", Duration::ZERO)
                .unwrap_err();
            assert!(err.to_string().contains("ready"));
        }

        #[test]
        fn value_is_checks_the_value_attribute() {
            let driver = MockDriver::new();
            let element = MockElement::new("input").with_attr("value", "hello");
            let it = target(&driver, &element);
            assert!(it.value_is("hello", Duration::ZERO).is_ok());
        }
    }

    mod page_audit_tests {
        use super::*;

        #[test]
        fn url_ends_with_any_suffix() {
            let driver = MockDriver::new();
            driver.set_url("https://example.test/app/dashboard");
            let session = Session::new(Box::new(driver.clone()), "chrome-1");
            let page = Page::attach(&session, "home");

            assert!(page
                .url_ends_with(&["/dashboard", "/login"], Duration::ZERO)
                .is_ok());
            assert!(page
                .url_ends_with(&["/settings"], Duration::ZERO)
                .is_err());
        }

        #[test]
        fn link_audit_passes_with_no_anchors() {
            let driver = MockDriver::new();
            let session = Session::new(Box::new(driver.clone()), "chrome-1");
            let page = Page::attach(&session, "home");
            assert!(page.verify_all_links(&[], true).is_ok());
        }

        #[test]
        fn link_audit_skips_whitelisted_and_empty_hrefs() {
            let driver = MockDriver::new();
            let anchors = [
                MockElement::new("a").with_attr("href", "mailto:someone@example.test"),
                MockElement::new("a").with_attr("href", ""),
                MockElement::new("a"),
            ];
            driver.register(Strategy::TagName, "a", &anchors);
            let session = Session::new(Box::new(driver.clone()), "chrome-1");
            let page = Page::attach(&session, "home");
            assert!(page.verify_all_links(&["mailto:"], true).is_ok());
        }
    }
}
