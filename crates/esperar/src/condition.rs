//! Element conditions and text matching.
//!
//! A [`Conditions`] set is attached to a node and narrows which candidate
//! elements count as a match during resolution. All attached conditions
//! must hold (logical AND).

use std::fmt;
use std::rc::Rc;

use regex::Regex;

use crate::driver::ElementHandle;
use crate::result::EsperarResult;

type Predicate = Rc<dyn Fn(&dyn ElementHandle) -> EsperarResult<bool>>;

/// An ordered, AND-combined set of element conditions.
///
/// Copies are value-semantic: extending a scoped copy of an element never
/// mutates the conditions of the original.
#[derive(Clone, Default)]
pub struct Conditions {
    predicates: Vec<Predicate>,
    tags: Vec<String>,
}

impl Conditions {
    /// Empty condition set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(
        &mut self,
        tag: impl Into<String>,
        predicate: impl Fn(&dyn ElementHandle) -> EsperarResult<bool> + 'static,
    ) -> &mut Self {
        self.predicates.push(Rc::new(predicate));
        self.tags.push(tag.into());
        self
    }

    /// Element must be rendered and visible
    pub fn visible(&mut self) -> &mut Self {
        self.push("VISIBLE", |el| el.is_displayed())
    }

    /// Element must be present but not visible
    pub fn invisible(&mut self) -> &mut Self {
        self.push("INVISIBLE", |el| Ok(!el.is_displayed()?))
    }

    /// Element must accept interaction
    pub fn enabled(&mut self) -> &mut Self {
        self.push("ENABLED", |el| el.is_enabled())
    }

    /// Element must reject interaction
    pub fn disabled(&mut self) -> &mut Self {
        self.push("DISABLED", |el| Ok(!el.is_enabled()?))
    }

    /// Element must be both visible and enabled
    pub fn clickable(&mut self) -> &mut Self {
        self.push("CLICKABLE", |el| Ok(el.is_displayed()? && el.is_enabled()?))
    }

    /// Element must be selected (checkbox, option)
    pub fn selected(&mut self) -> &mut Self {
        self.push("SELECTED", |el| el.is_selected())
    }

    /// Element must not be selected
    pub fn not_selected(&mut self) -> &mut Self {
        self.push("NOT_SELECTED", |el| Ok(!el.is_selected()?))
    }

    /// Element must be visible and its text must contain `text`
    pub fn text(&mut self, text: impl Into<String>) -> &mut Self {
        let needle = text.into();
        let tag = format!("TEXT:'{needle}'");
        self.push(tag, move |el| {
            Ok(el.is_displayed()? && el.text()?.contains(&needle))
        })
    }

    /// Whether no conditions are attached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Number of attached conditions
    #[must_use]
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Evaluate against a single element. Probe errors propagate to the
    /// caller (a stale handle fails the whole attempt, not the condition).
    pub fn evaluate_single(&self, element: &dyn ElementHandle) -> EsperarResult<bool> {
        for predicate in &self.predicates {
            if !predicate(element)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Filter a candidate list down to the elements satisfying every
    /// condition. Candidates whose probes error are excluded rather than
    /// failing the attempt.
    #[must_use]
    pub fn evaluate_list(
        &self,
        elements: &[Rc<dyn ElementHandle>],
    ) -> Vec<Rc<dyn ElementHandle>> {
        elements
            .iter()
            .filter(|el| self.evaluate_single(&***el).unwrap_or(false))
            .cloned()
            .collect()
    }

    /// Human-readable summary used in diagnostics, e.g. `[VISIBLE ENABLED]`
    #[must_use]
    pub fn description(&self) -> String {
        format!("[{}]", self.tags.join(" "))
    }
}

impl fmt::Debug for Conditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Conditions({})", self.description())
    }
}

/// How expected text is compared against observed text.
///
/// `Pattern` anchors at the start of the observed text: the regex must
/// match a prefix, not merely occur somewhere inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMatch {
    /// Observed text equals the expected text
    Exact,
    /// Observed text contains the expected text
    Substring,
    /// Expected text is a regex matching at the start of the observed text
    Pattern,
}

impl TextMatch {
    /// Compare `expected` against `actual` under this matching mode.
    ///
    /// An invalid `Pattern` regex matches nothing.
    #[must_use]
    pub fn matches(self, expected: &str, actual: &str) -> bool {
        match self {
            Self::Exact => actual == expected,
            Self::Substring => actual.contains(expected),
            Self::Pattern => Regex::new(expected)
                .ok()
                .and_then(|re| re.find(actual))
                .is_some_and(|m| m.start() == 0),
        }
    }
}
