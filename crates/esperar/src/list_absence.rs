//! Wait for the absence of elements inside a list.
//!
//! Absence is judged against the raw, unfiltered query: conditions
//! attached to the list narrow presence searches, but something merely
//! hidden still counts as present here. When the query itself cannot be
//! run (page mid-navigation, parent missing), nothing can match, so the
//! attempt vacuously succeeds.

use std::time::Duration;

use crate::condition::TextMatch;
use crate::elements::Elements;
use crate::list_presence::{attr_predicate, text_predicate, ItemPredicate};
use crate::node::TICK;
use crate::result::EsperarResult;

impl Elements {
    /// Wait until no element's text equals `text`
    pub fn no_element_with_text(&self, text: &str, timeout: Duration) -> EsperarResult<()> {
        self.none_in_list(
            &text_predicate(TextMatch::Exact, text),
            &format!("element with text '{text}'"),
            timeout,
        )
    }

    /// Wait until no element's text contains `text`
    pub fn no_element_with_text_containing(
        &self,
        text: &str,
        timeout: Duration,
    ) -> EsperarResult<()> {
        self.none_in_list(
            &text_predicate(TextMatch::Substring, text),
            &format!("element with text containing '{text}'"),
            timeout,
        )
    }

    /// Wait until no element's text starts with a match of `pattern`
    pub fn no_element_with_text_matching(
        &self,
        pattern: &str,
        timeout: Duration,
    ) -> EsperarResult<()> {
        self.none_in_list(
            &text_predicate(TextMatch::Pattern, pattern),
            &format!("element with text matching '{pattern}'"),
            timeout,
        )
    }

    /// Wait until no element's `attribute` equals `value`
    pub fn no_element_with_attr(
        &self,
        attribute: &str,
        value: &str,
        timeout: Duration,
    ) -> EsperarResult<()> {
        self.none_in_list(
            &attr_predicate(attribute, value),
            &format!("element with {attribute}='{value}'"),
            timeout,
        )
    }

    fn none_in_list(
        &self,
        predicate: &ItemPredicate,
        what: &str,
        timeout: Duration,
    ) -> EsperarResult<()> {
        let description = format!("absence of {} in {}", what, self.description());
        self.core().wait_until(
            || Ok(self.none_match(predicate).then_some(())),
            Some(&description),
            TICK,
            timeout,
        )
    }

    /// One absence probe over the raw query. Any failure, in the query or
    /// in a predicate, means nothing demonstrably matches.
    fn none_match(&self, predicate: &ItemPredicate) -> bool {
        let probe = || -> EsperarResult<bool> {
            let root = self.core().resolve_root()?;
            let handles = self.core().query_candidates(root.as_ref())?;
            for handle in handles {
                if predicate(&*handle)? {
                    return Ok(false);
                }
            }
            Ok(true)
        };
        probe().unwrap_or(true)
    }
}
