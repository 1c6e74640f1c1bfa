//! Selectors, post-filters and the locator collaborator.
//!
//! A [`Selector`] is a declarative locator expression ([`By`]) plus an ordered
//! list of [`Filter`]s applied to whatever the raw search returned. Anything
//! that can run a search implements [`SearchContext`]: drivers search the
//! whole page, elements search their own subtree.
//!
//! [`ElementLocator`] binds a search context to a selector. It is a pure
//! function of page state: calling it twice may legitimately return a
//! different number of handles.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::handle::Handle;
use crate::result::{FluentError, FluentResult};

/// Locator expression kind
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum By {
    /// CSS selector (e.g., "button.primary")
    Css(String),
    /// XPath expression
    XPath(String),
    /// Element id attribute
    Id(String),
    /// Element name attribute
    Name(String),
    /// Single class name
    ClassName(String),
    /// Tag name
    TagName(String),
    /// Exact link text
    LinkText(String),
}

impl By {
    /// Create a CSS locator
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Create an XPath locator
    #[must_use]
    pub fn xpath(expression: impl Into<String>) -> Self {
        Self::XPath(expression.into())
    }

    /// Create an id locator
    #[must_use]
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    /// Create a name locator
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Create a class-name locator
    #[must_use]
    pub fn class_name(class: impl Into<String>) -> Self {
        Self::ClassName(class.into())
    }

    /// Create a tag-name locator
    #[must_use]
    pub fn tag_name(tag: impl Into<String>) -> Self {
        Self::TagName(tag.into())
    }

    /// Create a link-text locator
    #[must_use]
    pub fn link_text(text: impl Into<String>) -> Self {
        Self::LinkText(text.into())
    }

    /// Raw expression without the kind prefix
    #[must_use]
    pub fn expression(&self) -> &str {
        match self {
            Self::Css(s)
            | Self::XPath(s)
            | Self::Id(s)
            | Self::Name(s)
            | Self::ClassName(s)
            | Self::TagName(s)
            | Self::LinkText(s) => s,
        }
    }
}

impl fmt::Display for By {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Css(_) => "css",
            Self::XPath(_) => "xpath",
            Self::Id(_) => "id",
            Self::Name(_) => "name",
            Self::ClassName(_) => "class",
            Self::TagName(_) => "tag",
            Self::LinkText(_) => "link",
        };
        write!(f, "{kind}={}", self.expression())
    }
}

/// What a [`Filter`] inspects on each candidate element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterTarget {
    /// Visible text
    Text,
    /// Raw text content (including hidden text)
    TextContent,
    /// `id` attribute
    Id,
    /// `name` attribute
    Name,
    /// `class` attribute, matched against each class token
    Class,
    /// `value` property
    Value,
    /// Arbitrary attribute
    Attribute(String),
}

impl fmt::Display for FilterTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::TextContent => write!(f, "textContent"),
            Self::Id => write!(f, "id"),
            Self::Name => write!(f, "name"),
            Self::Class => write!(f, "class"),
            Self::Value => write!(f, "value"),
            Self::Attribute(name) => write!(f, "{name}"),
        }
    }
}

/// Comparison applied by a [`Filter`]
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Exact equality
    Equals(String),
    /// Substring
    Contains(String),
    /// Prefix
    StartsWith(String),
    /// Suffix
    EndsWith(String),
    /// Substring must be absent
    NotContains(String),
    /// Regular expression search
    Matches(Regex),
}

impl Matcher {
    /// Build a regex matcher
    pub fn regex(pattern: &str) -> FluentResult<Self> {
        Regex::new(pattern)
            .map(Self::Matches)
            .map_err(|e| FluentError::InvalidSelector {
                selector: pattern.to_string(),
                message: e.to_string(),
            })
    }

    /// Test a candidate value
    #[must_use]
    pub fn is_match(&self, value: &str) -> bool {
        match self {
            Self::Equals(expected) => value == expected,
            Self::Contains(needle) => value.contains(needle.as_str()),
            Self::StartsWith(prefix) => value.starts_with(prefix.as_str()),
            Self::EndsWith(suffix) => value.ends_with(suffix.as_str()),
            Self::NotContains(needle) => !value.contains(needle.as_str()),
            Self::Matches(re) => re.is_match(value),
        }
    }
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Equals(a), Self::Equals(b))
            | (Self::Contains(a), Self::Contains(b))
            | (Self::StartsWith(a), Self::StartsWith(b))
            | (Self::EndsWith(a), Self::EndsWith(b))
            | (Self::NotContains(a), Self::NotContains(b)) => a == b,
            (Self::Matches(a), Self::Matches(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(v) => write!(f, "= {v:?}"),
            Self::Contains(v) => write!(f, "contains {v:?}"),
            Self::StartsWith(v) => write!(f, "starts with {v:?}"),
            Self::EndsWith(v) => write!(f, "ends with {v:?}"),
            Self::NotContains(v) => write!(f, "not contains {v:?}"),
            Self::Matches(re) => write!(f, "matches /{}/", re.as_str()),
        }
    }
}

/// A post-filter applied to raw search results
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    target: FilterTarget,
    matcher: Matcher,
}

impl Filter {
    /// Create a filter from its parts
    #[must_use]
    pub const fn new(target: FilterTarget, matcher: Matcher) -> Self {
        Self { target, matcher }
    }

    /// Filter on visible text equal to `text`
    #[must_use]
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(FilterTarget::Text, Matcher::Equals(text.into()))
    }

    /// Filter on id equal to `id`
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self::new(FilterTarget::Id, Matcher::Equals(id.into()))
    }

    /// Filter on name equal to `name`
    #[must_use]
    pub fn with_name(name: impl Into<String>) -> Self {
        Self::new(FilterTarget::Name, Matcher::Equals(name.into()))
    }

    /// Filter on a class token equal to `class`
    #[must_use]
    pub fn with_class(class: impl Into<String>) -> Self {
        Self::new(FilterTarget::Class, Matcher::Equals(class.into()))
    }

    /// Filter on value equal to `value`
    #[must_use]
    pub fn with_value(value: impl Into<String>) -> Self {
        Self::new(FilterTarget::Value, Matcher::Equals(value.into()))
    }

    /// Filter on an arbitrary attribute equal to `value`
    #[must_use]
    pub fn with_attribute(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(
            FilterTarget::Attribute(name.into()),
            Matcher::Equals(value.into()),
        )
    }

    /// Replace the matcher with a substring match
    #[must_use]
    pub fn containing(mut self, needle: impl Into<String>) -> Self {
        self.matcher = Matcher::Contains(needle.into());
        self
    }

    /// Replace the matcher with a prefix match
    #[must_use]
    pub fn starting_with(mut self, prefix: impl Into<String>) -> Self {
        self.matcher = Matcher::StartsWith(prefix.into());
        self
    }

    /// Replace the matcher with a suffix match
    #[must_use]
    pub fn ending_with(mut self, suffix: impl Into<String>) -> Self {
        self.matcher = Matcher::EndsWith(suffix.into());
        self
    }

    /// Replace the matcher with a negated substring match
    #[must_use]
    pub fn not_containing(mut self, needle: impl Into<String>) -> Self {
        self.matcher = Matcher::NotContains(needle.into());
        self
    }

    /// Replace the matcher with a regular expression
    pub fn matching(mut self, pattern: &str) -> FluentResult<Self> {
        self.matcher = Matcher::regex(pattern)?;
        Ok(self)
    }

    /// Inspected property
    #[must_use]
    pub const fn target(&self) -> &FilterTarget {
        &self.target
    }

    /// Comparison
    #[must_use]
    pub const fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Evaluate the filter against one element
    pub fn accepts(&self, element: &Handle) -> FluentResult<bool> {
        let value = match &self.target {
            FilterTarget::Text => Some(element.text()?),
            FilterTarget::TextContent => Some(element.text_content()?),
            FilterTarget::Id => element.attribute("id")?,
            FilterTarget::Name => element.attribute("name")?,
            FilterTarget::Value => element.value()?,
            FilterTarget::Attribute(name) => element.attribute(name)?,
            FilterTarget::Class => {
                let classes = element.attribute("class")?.unwrap_or_default();
                return Ok(classes
                    .split_whitespace()
                    .any(|class| self.matcher.is_match(class)));
            }
        };
        Ok(self.matcher.is_match(value.as_deref().unwrap_or("")))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {}]", self.target, self.matcher)
    }
}

/// Keep only the handles accepted by every filter, preserving order
pub fn apply_filters(handles: Vec<Handle>, filters: &[Filter]) -> FluentResult<Vec<Handle>> {
    if filters.is_empty() {
        return Ok(handles);
    }
    let mut kept = Vec::with_capacity(handles.len());
    for handle in handles {
        let mut accepted = true;
        for filter in filters {
            if !filter.accepts(&handle)? {
                accepted = false;
                break;
            }
        }
        if accepted {
            kept.push(handle);
        }
    }
    Ok(kept)
}

/// Locator expression plus ordered post-filters. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    by: By,
    filters: Vec<Filter>,
}

impl Selector {
    /// Create a selector without filters
    #[must_use]
    pub const fn new(by: By) -> Self {
        Self {
            by,
            filters: Vec::new(),
        }
    }

    /// Create a CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::new(By::css(selector))
    }

    /// Selector matching every descendant, used for filter-only searches
    #[must_use]
    pub fn any() -> Self {
        Self::css("*")
    }

    /// Append a post-filter
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Append several post-filters, keeping their order
    #[must_use]
    pub fn with_filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    /// Locator expression
    #[must_use]
    pub const fn by(&self) -> &By {
        &self.by
    }

    /// Post-filters in application order
    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.by)?;
        for filter in &self.filters {
            write!(f, " {filter}")?;
        }
        Ok(())
    }
}

impl From<By> for Selector {
    fn from(by: By) -> Self {
        Self::new(by)
    }
}

impl From<&str> for Selector {
    fn from(css: &str) -> Self {
        Self::css(css)
    }
}

impl From<String> for Selector {
    fn from(css: String) -> Self {
        Self::css(css)
    }
}

/// Anything a selector can be evaluated against: a page or an element subtree.
///
/// Implementations return raw matches of `selector.by()` in document order;
/// callers apply post-filters with [`apply_filters`].
pub trait SearchContext: Send + Sync + fmt::Debug {
    /// Raw matches of the locator expression, filters not yet applied
    fn find_raw(&self, by: &By) -> FluentResult<Vec<Handle>>;

    /// Matches of the full selector, filters applied
    fn find_elements(&self, selector: &Selector) -> FluentResult<Vec<Handle>> {
        apply_filters(self.find_raw(selector.by())?, selector.filters())
    }
}

/// Policy for a single-element resolution that matched several elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Use the first match in document order
    #[default]
    FirstMatch,
    /// Fail with `AmbiguousElement`
    Strict,
}

impl MatchPolicy {
    /// Parse from a configuration string
    ///
    /// # Errors
    ///
    /// `Config` for anything other than `first_match` or `strict`.
    pub fn parse(value: &str) -> FluentResult<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "first_match" | "first" => Ok(Self::FirstMatch),
            "strict" => Ok(Self::Strict),
            other => Err(FluentError::config(format!(
                "unknown match policy {other:?}, expected first_match or strict"
            ))),
        }
    }
}

/// A selector bound to the context it is evaluated in
#[derive(Debug, Clone)]
pub struct ElementLocator {
    context: Arc<dyn SearchContext>,
    selector: Selector,
}

impl ElementLocator {
    /// Bind `selector` to `context`
    #[must_use]
    pub fn new(context: Arc<dyn SearchContext>, selector: impl Into<Selector>) -> Self {
        Self {
            context,
            selector: selector.into(),
        }
    }

    /// Selector being located
    #[must_use]
    pub const fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Context the selector is evaluated in
    #[must_use]
    pub fn context(&self) -> &Arc<dyn SearchContext> {
        &self.context
    }

    /// Every current match, in document order
    pub fn find_elements(&self) -> FluentResult<Vec<Handle>> {
        self.context.find_elements(&self.selector)
    }

    /// Exactly one element according to `policy`
    pub fn find_element(&self, policy: MatchPolicy) -> FluentResult<Handle> {
        let mut found = self.find_elements()?;
        match (found.len(), policy) {
            (0, _) => Err(FluentError::not_found(self.selector.to_string())),
            (1, _) | (_, MatchPolicy::FirstMatch) => Ok(found.swap_remove(0)),
            (count, MatchPolicy::Strict) => Err(FluentError::AmbiguousElement {
                selector: self.selector.to_string(),
                count,
            }),
        }
    }
}
