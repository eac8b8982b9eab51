//! Search for elements inside a list.
//!
//! Singular searches demand exactly one match per attempt; zero or many
//! both count as "not yet" and keep polling, so a list that briefly shows
//! duplicates while re-rendering settles instead of failing. Plural
//! searches accept one or more.

use std::rc::Rc;

use std::time::Duration;

use crate::condition::TextMatch;
use crate::driver::{ElementHandle, Strategy};
use crate::element::Element;
use crate::elements::Elements;
use crate::node::{Node, TICK};
use crate::result::{EsperarError, EsperarResult};

pub(crate) type ItemPredicate = Box<dyn Fn(&dyn ElementHandle) -> EsperarResult<bool>>;

/// Predicate comparing an element's text under a matching mode. Probe
/// errors propagate and fail the whole attempt.
pub(crate) fn text_predicate(mode: TextMatch, expected: &str) -> ItemPredicate {
    let expected = expected.to_string();
    Box::new(move |el| Ok(mode.matches(&expected, &el.text()?)))
}

/// Predicate requiring an attribute to equal a value exactly; a missing
/// attribute never matches.
pub(crate) fn attr_predicate(attribute: &str, value: &str) -> ItemPredicate {
    let attribute = attribute.to_string();
    let value = value.to_string();
    Box::new(move |el| Ok(el.attribute(&attribute)?.as_deref() == Some(value.as_str())))
}

/// Narrow a predicate to items that also have a descendant at
/// `relative_xpath`. A failing descendant query counts as no match.
fn and_relative(predicate: ItemPredicate, relative_xpath: &str) -> ItemPredicate {
    let relative_xpath = relative_xpath.to_string();
    Box::new(move |el| {
        if !predicate(el)? {
            return Ok(false);
        }
        Ok(el
            .find_elements(Strategy::XPath, &relative_xpath)
            .map(|found| !found.is_empty())
            .unwrap_or(false))
    })
}

impl Elements {
    /// The one element whose text equals `text`
    pub fn element_with_text(&self, text: &str, timeout: Duration) -> EsperarResult<Element> {
        self.one_matching(
            text_predicate(TextMatch::Exact, text),
            &format!("element with text '{text}'"),
            timeout,
        )
    }

    /// The one element whose text contains `text`
    pub fn element_with_text_containing(
        &self,
        text: &str,
        timeout: Duration,
    ) -> EsperarResult<Element> {
        self.one_matching(
            text_predicate(TextMatch::Substring, text),
            &format!("element with text containing '{text}'"),
            timeout,
        )
    }

    /// The one element whose text starts with a match of `pattern`
    pub fn element_with_text_matching(
        &self,
        pattern: &str,
        timeout: Duration,
    ) -> EsperarResult<Element> {
        self.one_matching(
            text_predicate(TextMatch::Pattern, pattern),
            &format!("element with text matching '{pattern}'"),
            timeout,
        )
    }

    /// The one element whose `attribute` equals `value`
    pub fn element_with_attr(
        &self,
        attribute: &str,
        value: &str,
        timeout: Duration,
    ) -> EsperarResult<Element> {
        self.one_matching(
            attr_predicate(attribute, value),
            &format!("element with {attribute}='{value}'"),
            timeout,
        )
    }

    /// All elements whose text equals `text` (at least one)
    pub fn elements_with_text(
        &self,
        text: &str,
        timeout: Duration,
    ) -> EsperarResult<Vec<Element>> {
        self.many_matching(
            text_predicate(TextMatch::Exact, text),
            &format!("elements with text '{text}'"),
            timeout,
        )
    }

    /// All elements whose text contains `text` (at least one)
    pub fn elements_with_text_containing(
        &self,
        text: &str,
        timeout: Duration,
    ) -> EsperarResult<Vec<Element>> {
        self.many_matching(
            text_predicate(TextMatch::Substring, text),
            &format!("elements with text containing '{text}'"),
            timeout,
        )
    }

    /// All elements whose text starts with a match of `pattern`
    /// (at least one)
    pub fn elements_with_text_matching(
        &self,
        pattern: &str,
        timeout: Duration,
    ) -> EsperarResult<Vec<Element>> {
        self.many_matching(
            text_predicate(TextMatch::Pattern, pattern),
            &format!("elements with text matching '{pattern}'"),
            timeout,
        )
    }

    /// The one element whose text equals `text` and which has a
    /// descendant at `relative_xpath`
    pub fn element_with_text_and_relative(
        &self,
        text: &str,
        relative_xpath: &str,
        timeout: Duration,
    ) -> EsperarResult<Element> {
        self.one_relative(
            text_predicate(TextMatch::Exact, text),
            relative_xpath,
            &format!("element with text '{text}' and relative '{relative_xpath}'"),
            timeout,
        )
    }

    /// The one element whose text contains `text` and which has a
    /// descendant at `relative_xpath`
    pub fn element_with_text_containing_and_relative(
        &self,
        text: &str,
        relative_xpath: &str,
        timeout: Duration,
    ) -> EsperarResult<Element> {
        self.one_relative(
            text_predicate(TextMatch::Substring, text),
            relative_xpath,
            &format!("element with text containing '{text}' and relative '{relative_xpath}'"),
            timeout,
        )
    }

    /// The one element whose text starts with a match of `pattern` and
    /// which has a descendant at `relative_xpath`
    pub fn element_with_text_matching_and_relative(
        &self,
        pattern: &str,
        relative_xpath: &str,
        timeout: Duration,
    ) -> EsperarResult<Element> {
        self.one_relative(
            text_predicate(TextMatch::Pattern, pattern),
            relative_xpath,
            &format!("element with text matching '{pattern}' and relative '{relative_xpath}'"),
            timeout,
        )
    }

    /// The one element whose `attribute` equals `value` and which has a
    /// descendant at `relative_xpath`
    pub fn element_with_attr_and_relative(
        &self,
        attribute: &str,
        value: &str,
        relative_xpath: &str,
        timeout: Duration,
    ) -> EsperarResult<Element> {
        self.one_relative(
            attr_predicate(attribute, value),
            relative_xpath,
            &format!("element with {attribute}='{value}' and relative '{relative_xpath}'"),
            timeout,
        )
    }

    fn one_matching(
        &self,
        predicate: ItemPredicate,
        what: &str,
        timeout: Duration,
    ) -> EsperarResult<Element> {
        let mut found = self.find_in_list(&predicate, false, what, timeout)?;
        found.pop().ok_or_else(|| EsperarError::NotFound {
            description: format!(
                "{}Failed to locate {} on {}",
                self.core().log_prefix(),
                what,
                self.description()
            ),
        })
    }

    fn many_matching(
        &self,
        predicate: ItemPredicate,
        what: &str,
        timeout: Duration,
    ) -> EsperarResult<Vec<Element>> {
        self.find_in_list(&predicate, true, what, timeout)
    }

    /// The relative XPath narrows which item matches; the item itself is
    /// what comes back.
    fn one_relative(
        &self,
        predicate: ItemPredicate,
        relative_xpath: &str,
        what: &str,
        timeout: Duration,
    ) -> EsperarResult<Element> {
        self.one_matching(and_relative(predicate, relative_xpath), what, timeout)
    }

    /// Core search loop: resolve the list, apply the predicate to every
    /// member, and accept the attempt when exactly one matches (or at
    /// least one, for plural searches). Results come back as detached
    /// single elements bound to the matched handles.
    fn find_in_list(
        &self,
        predicate: &ItemPredicate,
        multiple: bool,
        what: &str,
        timeout: Duration,
    ) -> EsperarResult<Vec<Element>> {
        let description = format!("{} in {}", what, self.description());
        let matched = self
            .core()
            .wait_until(
                || {
                    self.inner.resolve_now()?;
                    let mut matched: Vec<Rc<dyn ElementHandle>> = Vec::new();
                    for handle in self.handles() {
                        if predicate(&*handle)? {
                            matched.push(handle);
                        }
                    }
                    let accept = match matched.len() {
                        1 => true,
                        n => n > 1 && multiple,
                    };
                    Ok(accept.then_some(matched))
                },
                Some(&description),
                TICK,
                timeout,
            )
            .map_err(|err| match err {
                EsperarError::Timeout { .. } => err,
                err if err.is_retryable() => EsperarError::NotFound {
                    description: format!(
                        "{}Failed to locate {} with error: {}",
                        self.core().log_prefix(),
                        description,
                        err
                    ),
                },
                err => err,
            })?;
        let name = format!("{}:list item", self.core().display_name());
        Ok(matched
            .into_iter()
            .map(|handle| self.snapshot_item(handle, name.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Session;
    use crate::element::Page;
    use crate::mock::{MockDriver, MockElement};

    fn setup() -> (MockDriver, Session) {
        let driver = MockDriver::new();
        let session = Session::new(Box::new(driver.clone()), "chrome-1");
        (driver, session)
    }

    fn rows(driver: &MockDriver, texts: &[&str]) -> Vec<MockElement> {
        let elements: Vec<MockElement> = texts
            .iter()
            .map(|text| MockElement::new("tr").with_text(*text))
            .collect();
        driver.register(Strategy::Css, ".row", &elements);
        elements
    }

    fn row_list(session: &Session) -> Elements {
        Page::attach(session, "home").list_by_selector(".row", "rows")
    }

    mod singular_tests {
        use super::*;

        #[test]
        fn finds_the_unique_text_match() {
            let (driver, session) = setup();
            let elements = rows(&driver, &["alpha", "beta", "gamma"]);
            let list = row_list(&session);

            let item = list.element_with_text("beta", Duration::ZERO).unwrap();
            item.handle().unwrap().click().unwrap();
            assert_eq!(elements[1].click_count(), 1);
        }

        #[test]
        fn exact_match_does_not_accept_substrings() {
            let (driver, session) = setup();
            rows(&driver, &["beta max", "gamma"]);
            let list = row_list(&session);
            assert!(list.element_with_text("beta", Duration::ZERO).is_err());
            assert!(list
                .element_with_text_containing("beta", Duration::ZERO)
                .is_ok());
        }

        #[test]
        fn duplicate_matches_poll_instead_of_binding() {
            let (driver, session) = setup();
            rows(&driver, &["dup", "dup"]);
            let list = row_list(&session);

            let err = list.element_with_text("dup", Duration::ZERO).unwrap_err();
            assert!(matches!(err, EsperarError::Timeout { .. }));
        }

        #[test]
        fn pattern_matches_anchor_at_the_start() {
            let (driver, session) = setup();
            rows(&driver, &["42 items", "about 42 items"]);
            let list = row_list(&session);

            let item = list
                .element_with_text_matching(r"\d+ items", Duration::ZERO)
                .unwrap();
            assert_eq!(item.text(), "42 items");
        }

        #[test]
        fn attr_search_requires_exact_value() {
            let (driver, session) = setup();
            let tagged = MockElement::new("tr").with_attr("data-state", "active");
            let other = MockElement::new("tr").with_attr("data-state", "inactive");
            driver.register(Strategy::Css, ".row", &[tagged.clone(), other]);
            let list = row_list(&session);

            let item = list
                .element_with_attr("data-state", "active", Duration::ZERO)
                .unwrap();
            item.handle().unwrap().click().unwrap();
            assert_eq!(tagged.click_count(), 1);
        }

        #[test]
        fn empty_list_times_out() {
            let (_driver, session) = setup();
            let list = row_list(&session);
            let err = list.element_with_text("any", Duration::ZERO).unwrap_err();
            assert!(matches!(
                err,
                EsperarError::Timeout { .. } | EsperarError::NotFound { .. }
            ));
        }
    }

    mod plural_tests {
        use super::*;

        #[test]
        fn returns_every_match() {
            let (driver, session) = setup();
            rows(&driver, &["keep", "drop", "keep"]);
            let list = row_list(&session);

            let found = list.elements_with_text("keep", Duration::ZERO).unwrap();
            assert_eq!(found.len(), 2);
        }

        #[test]
        fn single_match_is_also_accepted() {
            let (driver, session) = setup();
            rows(&driver, &["only", "other"]);
            let list = row_list(&session);

            let found = list
                .elements_with_text_containing("only", Duration::ZERO)
                .unwrap();
            assert_eq!(found.len(), 1);
        }
    }

    mod relative_tests {
        use super::*;

        #[test]
        fn returns_the_matched_item_not_its_descendant() {
            let (driver, session) = setup();
            let button = MockElement::new("button").with_text("edit");
            let target = MockElement::new("tr").with_text("carol");
            target.register_child(Strategy::XPath, ".//button", &[button.clone()]);
            let other = MockElement::new("tr").with_text("dave");
            driver.register(Strategy::Css, ".row", &[target.clone(), other]);
            let list = row_list(&session);

            let found = list
                .element_with_text_and_relative("carol", ".//button", Duration::ZERO)
                .unwrap();
            // The descendant only gates the match; the click lands on the row.
            found.handle().unwrap().click().unwrap();
            assert_eq!(target.click_count(), 1);
            assert_eq!(button.click_count(), 0);
        }

        #[test]
        fn item_without_the_descendant_does_not_match() {
            let (driver, session) = setup();
            rows(&driver, &["carol"]);
            let list = row_list(&session);

            let err = list
                .element_with_text_and_relative("carol", ".//button", Duration::ZERO)
                .unwrap_err();
            assert!(matches!(err, EsperarError::Timeout { .. }));
        }

        #[test]
        fn attr_and_relative_pairs_both_requirements() {
            let (driver, session) = setup();
            let button = MockElement::new("button");
            let target = MockElement::new("tr").with_attr("data-id", "7");
            target.register_child(Strategy::XPath, ".//button", &[button]);
            let bare = MockElement::new("tr").with_attr("data-id", "8");
            driver.register(Strategy::Css, ".row", &[target.clone(), bare]);
            let list = row_list(&session);

            let found = list
                .element_with_attr_and_relative("data-id", "7", ".//button", Duration::ZERO)
                .unwrap();
            found.handle().unwrap().click().unwrap();
            assert_eq!(target.click_count(), 1);
            assert!(list
                .element_with_attr_and_relative("data-id", "8", ".//button", Duration::ZERO)
                .is_err());
        }
    }
}
