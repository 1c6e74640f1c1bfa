//! Aggregate component lists.
//!
//! A [`FluentList`] is either a fixed set of components or a lazy search
//! fanned out over an ordered set of search contexts. Members are located on
//! first use and cached until [`FluentList::reset`], or until a cached member
//! turns out to be stale, in which case the search runs again. Each matched
//! handle is
//! wrapped in a [`LazyProxy`] and built through the session instantiator, so
//! list members are registered like any other component.
//!
//! Bulk operations check their preconditions on the whole list before
//! touching any member.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::component::{Component, ComponentInstantiator, ComponentType};
use crate::element::FluentElement;
use crate::handle::{ElementScope, Handle};
use crate::locator::{Filter, SearchContext, Selector};
use crate::proxy::LazyProxy;
use crate::result::{FluentError, FluentResult};

/// Where list members come from
#[derive(Debug, Clone)]
pub enum ListSource {
    /// Members were supplied up front
    Fixed,
    /// Members are the concatenated matches of `selector` in each context
    Search {
        /// Contexts searched, in order
        contexts: Vec<Arc<dyn SearchContext>>,
        /// Selector evaluated in each context
        selector: Selector,
    },
}

/// Ordered list of components of type `C`
pub struct FluentList<C> {
    source: ListSource,
    instantiator: Arc<dyn ComponentInstantiator>,
    members: Mutex<Option<Vec<Arc<C>>>>,
}

impl<C> fmt::Debug for FluentList<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loaded = lock(&self.members).as_ref().map(Vec::len);
        f.debug_struct("FluentList")
            .field("component_type", &std::any::type_name::<C>())
            .field("source", &self.source)
            .field("loaded", &loaded)
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn any_stale<C: Component>(members: &[Arc<C>]) -> FluentResult<bool> {
    for member in members {
        match member.element().tag_name() {
            Ok(_) => {}
            Err(err) if err.is_stale() => return Ok(true),
            Err(err) => return Err(err),
        }
    }
    Ok(false)
}

impl<C: Component> FluentList<C> {
    /// Lazy list over the matches of `selector` in every context
    #[must_use]
    pub fn search(
        instantiator: Arc<dyn ComponentInstantiator>,
        contexts: Vec<Arc<dyn SearchContext>>,
        selector: Selector,
    ) -> Self {
        Self {
            source: ListSource::Search { contexts, selector },
            instantiator,
            members: Mutex::new(None),
        }
    }

    /// List over components that already exist
    #[must_use]
    pub fn from_components(
        instantiator: Arc<dyn ComponentInstantiator>,
        components: Vec<Arc<C>>,
    ) -> Self {
        Self {
            source: ListSource::Fixed,
            instantiator,
            members: Mutex::new(Some(components)),
        }
    }

    /// List built by wrapping each handle as `C`
    ///
    /// # Errors
    ///
    /// `InvalidComponentType` when `C` cannot be built.
    pub fn from_elements(
        instantiator: Arc<dyn ComponentInstantiator>,
        handles: impl IntoIterator<Item = Handle>,
    ) -> FluentResult<Self> {
        let components = handles
            .into_iter()
            .map(|handle| instantiator.new_component::<C>(handle))
            .collect::<FluentResult<Vec<_>>>()?;
        Ok(Self::from_components(instantiator, components))
    }

    /// Component type of the members
    #[must_use]
    pub fn component_type(&self) -> ComponentType {
        ComponentType::of::<C>()
    }

    /// Member source
    #[must_use]
    pub const fn source(&self) -> &ListSource {
        &self.source
    }

    /// Instantiator members are built with
    #[must_use]
    pub const fn instantiator(&self) -> &Arc<dyn ComponentInstantiator> {
        &self.instantiator
    }

    fn load(&self) -> FluentResult<Vec<Arc<C>>> {
        let mut members = lock(&self.members);
        if let Some(loaded) = members.as_ref() {
            if matches!(self.source, ListSource::Fixed) || !any_stale(loaded)? {
                return Ok(loaded.clone());
            }
            debug!(cached = loaded.len(), "list members went stale, searching again");
        }
        let mut loaded = Vec::new();
        if let ListSource::Search { contexts, selector } = &self.source {
            for context in contexts {
                for handle in context.find_elements(selector)? {
                    let proxy = LazyProxy::for_element(handle);
                    loaded.push(self.instantiator.new_component::<C>(proxy)?);
                }
            }
            debug!(selector = %selector, contexts = contexts.len(), count = loaded.len(), "list searched");
        }
        *members = Some(loaded.clone());
        Ok(loaded)
    }

    fn require(&self, operation: &str) -> FluentResult<Vec<Arc<C>>> {
        let members = self.load()?;
        if members.is_empty() {
            return Err(FluentError::empty(operation));
        }
        Ok(members)
    }

    /// Members, searching if needed
    ///
    /// # Errors
    ///
    /// Search errors.
    pub fn members(&self) -> FluentResult<Vec<Arc<C>>> {
        self.load()
    }

    /// Iterate over the members, searching if needed
    ///
    /// # Errors
    ///
    /// Search errors.
    pub fn iter(&self) -> FluentResult<std::vec::IntoIter<Arc<C>>> {
        Ok(self.load()?.into_iter())
    }

    /// Number of members, searching if needed
    ///
    /// # Errors
    ///
    /// Search errors.
    pub fn len(&self) -> FluentResult<usize> {
        Ok(self.load()?.len())
    }

    /// Whether the list has no members, searching if needed
    ///
    /// # Errors
    ///
    /// Search errors.
    pub fn is_empty(&self) -> FluentResult<bool> {
        Ok(self.load()?.is_empty())
    }

    /// First member
    ///
    /// # Errors
    ///
    /// `EmptyCollection` on an empty list.
    pub fn first(&self) -> FluentResult<Arc<C>> {
        let members = self.require("first")?;
        Ok(Arc::clone(&members[0]))
    }

    /// Last member
    ///
    /// # Errors
    ///
    /// `EmptyCollection` on an empty list.
    pub fn last(&self) -> FluentResult<Arc<C>> {
        let mut members = self.require("last")?;
        members
            .pop()
            .ok_or_else(|| FluentError::empty("last"))
    }

    /// Member at `index`
    ///
    /// # Errors
    ///
    /// `EmptyCollection` on an empty list, `OutOfRange` past the end.
    pub fn index(&self, index: usize) -> FluentResult<Arc<C>> {
        let members = self.require("index")?;
        members.get(index).cloned().ok_or(FluentError::OutOfRange {
            index,
            available: members.len(),
            selector: None,
        })
    }

    pub(crate) fn position(&self, index: usize, selector: Option<&Selector>) -> FluentResult<Arc<C>> {
        let members = self.load()?;
        members.get(index).cloned().ok_or_else(|| FluentError::OutOfRange {
            index,
            available: members.len(),
            selector: selector.map(ToString::to_string),
        })
    }

    /// Click every enabled member
    ///
    /// # Errors
    ///
    /// `EmptyCollection` on an empty list, or the first driver error.
    pub fn click(&self) -> FluentResult<&Self> {
        self.for_each_enabled("click", |element| element.click().map(drop))
    }

    /// Submit every enabled member
    ///
    /// # Errors
    ///
    /// `EmptyCollection` on an empty list, or the first driver error.
    pub fn submit(&self) -> FluentResult<&Self> {
        self.for_each_enabled("submit", |element| element.submit().map(drop))
    }

    /// Clear every enabled member
    ///
    /// # Errors
    ///
    /// `EmptyCollection` on an empty list, or the first driver error.
    pub fn clear_all(&self) -> FluentResult<&Self> {
        self.for_each_enabled("clear", |element| element.clear().map(drop))
    }

    fn for_each_enabled(
        &self,
        operation: &str,
        action: impl Fn(&FluentElement) -> FluentResult<()>,
    ) -> FluentResult<&Self> {
        let members = self.require(operation)?;
        let mut acted = 0usize;
        for member in &members {
            let element = member.element();
            if element.is_enabled()? {
                action(element)?;
                acted += 1;
            }
        }
        debug!(operation, members = members.len(), acted, "list bulk operation");
        Ok(self)
    }

    /// Assign `values` across the displayed and enabled members, in order.
    ///
    /// The n-th eligible member receives `values[n]`; once `values` runs out
    /// every remaining eligible member receives the last value. An empty
    /// `values` does nothing.
    ///
    /// # Errors
    ///
    /// `EmptyCollection` on an empty list, `NoEligibleElement` when no member
    /// is both displayed and enabled, or the first driver error.
    pub fn write<S: AsRef<str>>(&self, values: &[S]) -> FluentResult<&Self> {
        let members = self.require("write")?;
        let Some(last) = values.last() else {
            return Ok(self);
        };
        let mut eligible = Vec::with_capacity(members.len());
        for member in &members {
            let element = member.element();
            if element.is_displayed()? && element.is_enabled()? {
                eligible.push(element);
            }
        }
        if eligible.is_empty() {
            return Err(FluentError::NoEligibleElement {
                operation: "set a new value".to_string(),
            });
        }
        for (position, element) in eligible.iter().enumerate() {
            let value = values.get(position).unwrap_or(last);
            let _ = element.write(value.as_ref())?;
        }
        debug!(members = members.len(), written = eligible.len(), values = values.len(), "list write");
        Ok(self)
    }

    fn project<T>(&self, f: impl Fn(&FluentElement) -> FluentResult<T>) -> FluentResult<Vec<T>> {
        self.load()?.iter().map(|member| f(member.element())).collect()
    }

    fn project_first<T>(
        &self,
        f: impl FnOnce(&FluentElement) -> FluentResult<T>,
    ) -> FluentResult<Option<T>> {
        match self.load()?.first() {
            Some(member) => f(member.element()).map(Some),
            None => Ok(None),
        }
    }

    /// `value` of every member
    ///
    /// # Errors
    ///
    /// Search or driver errors.
    pub fn values(&self) -> FluentResult<Vec<Option<String>>> {
        self.project(FluentElement::value)
    }

    /// `id` of every member
    ///
    /// # Errors
    ///
    /// Search or driver errors.
    pub fn ids(&self) -> FluentResult<Vec<Option<String>>> {
        self.project(FluentElement::id)
    }

    /// `name` of every member
    ///
    /// # Errors
    ///
    /// Search or driver errors.
    pub fn names(&self) -> FluentResult<Vec<Option<String>>> {
        self.project(FluentElement::name)
    }

    /// Tag name of every member
    ///
    /// # Errors
    ///
    /// Search or driver errors.
    pub fn tag_names(&self) -> FluentResult<Vec<String>> {
        self.project(FluentElement::tag_name)
    }

    /// Visible text of every member
    ///
    /// # Errors
    ///
    /// Search or driver errors.
    pub fn texts(&self) -> FluentResult<Vec<String>> {
        self.project(FluentElement::text)
    }

    /// Text content of every member
    ///
    /// # Errors
    ///
    /// Search or driver errors.
    pub fn text_contents(&self) -> FluentResult<Vec<String>> {
        self.project(FluentElement::text_content)
    }

    /// Attribute `name` of every member
    ///
    /// # Errors
    ///
    /// Search or driver errors.
    pub fn attributes(&self, name: &str) -> FluentResult<Vec<Option<String>>> {
        self.project(|element| element.attribute(name))
    }

    /// `value` of the first member; `None` for an empty list
    ///
    /// # Errors
    ///
    /// Search or driver errors.
    pub fn value(&self) -> FluentResult<Option<String>> {
        Ok(self.project_first(FluentElement::value)?.flatten())
    }

    /// `id` of the first member; `None` for an empty list
    ///
    /// # Errors
    ///
    /// Search or driver errors.
    pub fn id(&self) -> FluentResult<Option<String>> {
        Ok(self.project_first(FluentElement::id)?.flatten())
    }

    /// `name` of the first member; `None` for an empty list
    ///
    /// # Errors
    ///
    /// Search or driver errors.
    pub fn name(&self) -> FluentResult<Option<String>> {
        Ok(self.project_first(FluentElement::name)?.flatten())
    }

    /// Tag name of the first member; `None` for an empty list
    ///
    /// # Errors
    ///
    /// Search or driver errors.
    pub fn tag_name(&self) -> FluentResult<Option<String>> {
        self.project_first(FluentElement::tag_name)
    }

    /// Visible text of the first member; `None` for an empty list
    ///
    /// # Errors
    ///
    /// Search or driver errors.
    pub fn text(&self) -> FluentResult<Option<String>> {
        self.project_first(FluentElement::text)
    }

    /// Text content of the first member; `None` for an empty list
    ///
    /// # Errors
    ///
    /// Search or driver errors.
    pub fn text_content(&self) -> FluentResult<Option<String>> {
        self.project_first(FluentElement::text_content)
    }

    /// Attribute `name` of the first member; `None` for an empty list
    ///
    /// # Errors
    ///
    /// Search or driver errors.
    pub fn attribute(&self, name: &str) -> FluentResult<Option<String>> {
        Ok(self.project_first(|element| element.attribute(name))?.flatten())
    }

    /// Search `selector` inside every member, concatenating the matches in
    /// member order. The nested search itself runs on first use.
    ///
    /// # Errors
    ///
    /// Errors from locating this list's own members.
    pub fn find(&self, selector: impl Into<Selector>) -> FluentResult<FluentList<C>> {
        let contexts = self
            .load()?
            .iter()
            .map(|member| ElementScope::of(Arc::clone(member.element().handle())))
            .collect();
        Ok(FluentList::search(
            Arc::clone(&self.instantiator),
            contexts,
            selector.into(),
        ))
    }

    /// Match at `index` of [`FluentList::find`]
    ///
    /// # Errors
    ///
    /// `OutOfRange` naming the selector, or search errors.
    pub fn find_index(&self, selector: impl Into<Selector>, index: usize) -> FluentResult<Arc<C>> {
        let selector = selector.into();
        self.find(selector.clone())?.position(index, Some(&selector))
    }

    /// First match of [`FluentList::find`]
    ///
    /// # Errors
    ///
    /// `OutOfRange` when nothing matches, or search errors.
    pub fn find_first(&self, selector: impl Into<Selector>) -> FluentResult<Arc<C>> {
        self.find_index(selector, 0)
    }

    /// Descendants of every member accepted by all `filters`
    ///
    /// # Errors
    ///
    /// Errors from locating this list's own members.
    pub fn find_filtered(
        &self,
        filters: impl IntoIterator<Item = Filter>,
    ) -> FluentResult<FluentList<C>> {
        self.find(Selector::any().with_filters(filters))
    }

    /// Match at `index` of [`FluentList::find_filtered`]
    ///
    /// # Errors
    ///
    /// `OutOfRange` or search errors.
    pub fn find_filtered_index(
        &self,
        index: usize,
        filters: impl IntoIterator<Item = Filter>,
    ) -> FluentResult<Arc<C>> {
        self.find_filtered(filters)?.position(index, None)
    }

    /// Rebuild every member as `T`, keeping order
    ///
    /// # Errors
    ///
    /// `InvalidComponentType` when `T` cannot be built, or search errors.
    pub fn as_list<T: Component>(&self) -> FluentResult<FluentList<T>> {
        let components = self
            .load()?
            .iter()
            .map(|member| member.element().as_component::<T>())
            .collect::<FluentResult<Vec<_>>>()?;
        Ok(FluentList::from_components(
            Arc::clone(&self.instantiator),
            components,
        ))
    }

    /// Handles of every member
    ///
    /// # Errors
    ///
    /// Search errors.
    pub fn to_elements(&self) -> FluentResult<Vec<Handle>> {
        Ok(self
            .load()?
            .iter()
            .map(|member| Arc::clone(member.element().handle()))
            .collect())
    }

    /// Locate the members now
    ///
    /// # Errors
    ///
    /// `EmptyCollection` when nothing matches, or search errors.
    pub fn now(&self) -> FluentResult<&Self> {
        let _ = self.require("now")?;
        Ok(self)
    }

    /// Forget located members; the next access searches again.
    ///
    /// A fixed list resets each member's proxy instead.
    pub fn reset(&self) -> &Self {
        match self.source {
            ListSource::Search { .. } => *lock(&self.members) = None,
            ListSource::Fixed => {
                if let Some(members) = lock(&self.members).as_ref() {
                    for member in members {
                        let _ = member.element().reset();
                    }
                }
            }
        }
        self
    }

    /// Whether members have been located
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        lock(&self.members).is_some()
    }

    /// Whether at least one member exists, searching if needed
    ///
    /// # Errors
    ///
    /// Search errors.
    pub fn is_present(&self) -> FluentResult<bool> {
        Ok(!self.load()?.is_empty())
    }

    /// Drop every member without touching the page
    pub fn clear_list(&self) -> &Self {
        *lock(&self.members) = Some(Vec::new());
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::component::{ComponentContext, ComponentFactory, DefaultComponentInstantiator, FromHandleWithContext};
    use crate::config::FluentConfig;
    use crate::mock::{MockNode, MockPage};
    use proptest::prelude::*;

    fn instantiator(page: &Arc<MockPage>, factory: ComponentFactory) -> Arc<dyn ComponentInstantiator> {
        DefaultComponentInstantiator::standalone(page.clone(), factory, Arc::new(FluentConfig::default()))
    }

    fn root(page: &Arc<MockPage>) -> Arc<dyn SearchContext> {
        page.clone()
    }

    fn list(page: &Arc<MockPage>, css: &str) -> FluentList<FluentElement> {
        FluentList::search(instantiator(page, ComponentFactory::new()), vec![root(page)], css.into())
    }

    fn inputs(page: &Arc<MockPage>, count: usize) {
        for i in 0..count {
            page.append(MockNode::new("input").id(format!("in{i}")).class("field"));
        }
    }

    fn value(page: &MockPage, id: &str) -> Option<String> {
        page.value_of(page.node_id(id).unwrap())
    }

    #[derive(Debug)]
    struct Row {
        element: FluentElement,
    }

    impl FromHandleWithContext for Row {
        fn from_handle_with_context(handle: Handle, context: ComponentContext) -> FluentResult<Self> {
            Ok(Self {
                element: FluentElement::new(handle, context),
            })
        }
    }

    impl Component for Row {
        fn element(&self) -> &FluentElement {
            &self.element
        }
    }

    mod positional_tests {
        use super::*;

        #[test]
        fn test_empty_list_positional_access() {
            let page = MockPage::new();
            let empty = list(&page, "li");
            assert!(matches!(empty.first(), Err(FluentError::EmptyCollection { .. })));
            assert!(matches!(empty.last(), Err(FluentError::EmptyCollection { .. })));
            assert!(matches!(empty.index(0), Err(FluentError::EmptyCollection { .. })));
        }

        #[test]
        fn test_out_of_range() {
            let page = MockPage::new();
            inputs(&page, 2);
            let err = list(&page, "input").index(2).unwrap_err();
            assert!(matches!(err, FluentError::OutOfRange { index: 2, available: 2, selector: None }));
        }

        #[test]
        fn test_size_is_evaluated_lazily() {
            let page = MockPage::new();
            let fields = list(&page, "input");
            inputs(&page, 3);
            assert_eq!(fields.len().unwrap(), 3);
            assert!(fields.is_loaded());
        }

        #[test]
        fn test_reset_researches() {
            let page = MockPage::new();
            inputs(&page, 1);
            let fields = list(&page, "input");
            assert_eq!(fields.len().unwrap(), 1);
            page.append(MockNode::new("input"));
            assert_eq!(fields.len().unwrap(), 1);
            fields.reset();
            assert!(!fields.is_loaded());
            assert_eq!(fields.len().unwrap(), 2);
        }
    }

    mod staleness_tests {
        use super::*;

        fn items(page: &MockPage, texts: &[&str]) {
            for text in texts {
                page.append(MockNode::new("li").text(*text));
            }
        }

        #[test]
        fn test_stale_members_report_empty() {
            let page = MockPage::new();
            items(&page, &["a", "b"]);
            let list = list(&page, "li");
            assert_eq!(list.len().unwrap(), 2);

            page.navigate();
            assert_eq!(list.len().unwrap(), 0);
            assert!(matches!(list.first(), Err(FluentError::EmptyCollection { .. })));
            assert!(matches!(list.index(0), Err(FluentError::EmptyCollection { .. })));
            assert!(matches!(list.click(), Err(FluentError::EmptyCollection { .. })));
        }

        #[test]
        fn test_stale_members_are_replaced_by_new_matches() {
            let page = MockPage::new();
            items(&page, &["a", "b"]);
            let list = list(&page, "li");
            let before = list.first().unwrap();
            let searches = page.search_count();

            assert_eq!(list.texts().unwrap(), vec!["a", "b"]);
            assert_eq!(page.search_count(), searches);

            page.navigate();
            items(&page, &["x", "y", "z"]);
            assert_eq!(list.texts().unwrap(), vec!["x", "y", "z"]);
            assert!(!Arc::ptr_eq(&list.first().unwrap(), &before));
        }

        #[test]
        fn test_fixed_list_keeps_its_members() {
            let page = MockPage::new();
            let node = page.append(MockNode::new("li").text("a"));
            let fixed = FluentList::<FluentElement>::from_elements(
                instantiator(&page, ComponentFactory::new()),
                [page.handle(node).unwrap()],
            )
            .unwrap();

            page.navigate();
            assert_eq!(fixed.len().unwrap(), 1);
            assert!(fixed.click().unwrap_err().is_stale());
        }
    }

    mod bulk_tests {
        use super::*;

        #[test]
        fn test_click_skips_disabled() {
            let page = MockPage::new();
            page.append(MockNode::new("button").id("a"));
            page.append(MockNode::new("button").id("b").disabled());
            page.append(MockNode::new("button").id("c"));
            list(&page, "button").click().unwrap();
            assert_eq!(page.clicks(page.node_id("a").unwrap()), 1);
            assert_eq!(page.clicks(page.node_id("b").unwrap()), 0);
            assert_eq!(page.clicks(page.node_id("c").unwrap()), 1);
        }

        #[test]
        fn test_bulk_on_empty_list_fails() {
            let page = MockPage::new();
            let empty = list(&page, "button");
            assert!(matches!(empty.click(), Err(FluentError::EmptyCollection { .. })));
            assert!(matches!(empty.submit(), Err(FluentError::EmptyCollection { .. })));
            assert!(matches!(empty.clear_all(), Err(FluentError::EmptyCollection { .. })));
        }

        #[test]
        fn test_submit_and_clear() {
            let page = MockPage::new();
            page.append(MockNode::new("input").id("a").attr("value", "x"));
            let fields = list(&page, "input");
            fields.submit().unwrap().clear_all().unwrap();
            assert_eq!(page.submits(page.node_id("a").unwrap()), 1);
            assert_eq!(value(&page, "a").as_deref(), Some(""));
        }

        #[test]
        fn test_write_sticky_last_value() {
            let page = MockPage::new();
            inputs(&page, 4);
            list(&page, "input").write(&["a", "b"]).unwrap();
            assert_eq!(value(&page, "in0").as_deref(), Some("a"));
            assert_eq!(value(&page, "in1").as_deref(), Some("b"));
            assert_eq!(value(&page, "in2").as_deref(), Some("b"));
            assert_eq!(value(&page, "in3").as_deref(), Some("b"));
        }

        #[test]
        fn test_write_skips_hidden_and_disabled() {
            let page = MockPage::new();
            page.append(MockNode::new("input").id("hidden").hidden());
            page.append(MockNode::new("input").id("first"));
            page.append(MockNode::new("input").id("off").disabled());
            page.append(MockNode::new("input").id("second"));
            list(&page, "input").write(&["1", "2"]).unwrap();
            assert_eq!(value(&page, "hidden"), None);
            assert_eq!(value(&page, "off"), None);
            assert_eq!(value(&page, "first").as_deref(), Some("1"));
            assert_eq!(value(&page, "second").as_deref(), Some("2"));
        }

        #[test]
        fn test_write_empty_values_is_noop() {
            let page = MockPage::new();
            inputs(&page, 1);
            list(&page, "input").write::<&str>(&[]).unwrap();
            assert_eq!(value(&page, "in0"), None);
        }

        #[test]
        fn test_write_on_empty_list_fails_first() {
            let page = MockPage::new();
            assert!(matches!(
                list(&page, "input").write::<&str>(&[]),
                Err(FluentError::EmptyCollection { .. })
            ));
        }

        #[test]
        fn test_write_without_eligible_member() {
            let page = MockPage::new();
            page.append(MockNode::new("input").id("a").hidden());
            page.append(MockNode::new("input").id("b").disabled());
            let err = list(&page, "input").write(&["x"]).unwrap_err();
            assert_eq!(err.to_string(), "No element is displayed and enabled. Can't set a new value.");
        }
    }

    mod projection_tests {
        use super::*;

        fn page() -> Arc<MockPage> {
            let page = MockPage::new();
            page.append(MockNode::new("input").id("a").name("first").attr("value", "1"));
            page.append(MockNode::new("input").id("b").attr("value", "2").attr("data-x", "y"));
            page
        }

        #[test]
        fn test_projections() {
            let fields = list(&page(), "input");
            assert_eq!(fields.values().unwrap(), vec![Some("1".to_string()), Some("2".to_string())]);
            assert_eq!(fields.ids().unwrap(), vec![Some("a".to_string()), Some("b".to_string())]);
            assert_eq!(fields.names().unwrap(), vec![Some("first".to_string()), None]);
            assert_eq!(fields.tag_names().unwrap(), vec!["input", "input"]);
            assert_eq!(fields.attributes("data-x").unwrap(), vec![None, Some("y".to_string())]);
        }

        #[test]
        fn test_singular_forms_use_first_member() {
            let fields = list(&page(), "input");
            assert_eq!(fields.value().unwrap().as_deref(), Some("1"));
            assert_eq!(fields.id().unwrap().as_deref(), Some("a"));
            assert_eq!(fields.tag_name().unwrap().as_deref(), Some("input"));
        }

        #[test]
        fn test_singular_forms_on_empty_list() {
            let page = MockPage::new();
            let empty = list(&page, "input");
            assert_eq!(empty.value().unwrap(), None);
            assert_eq!(empty.text().unwrap(), None);
            assert_eq!(empty.attribute("x").unwrap(), None);
        }
    }

    mod find_tests {
        use super::*;

        fn page() -> Arc<MockPage> {
            let page = MockPage::new();
            page.append(
                MockNode::new("ul")
                    .child(MockNode::new("li").text("a1"))
                    .child(MockNode::new("li").text("a2")),
            );
            page.append(MockNode::new("ul"));
            page.append(MockNode::new("ul").child(MockNode::new("li").text("c1").class("last")));
            page
        }

        #[test]
        fn test_fan_out_preserves_order() {
            let lists = list(&page(), "ul");
            assert_eq!(lists.find("li").unwrap().texts().unwrap(), vec!["a1", "a2", "c1"]);
        }

        #[test]
        fn test_find_index_out_of_range() {
            let err = list(&page(), "ul").find_index("li", 3).unwrap_err();
            assert_eq!(
                err.to_string(),
                "No such element with position: 3. Number of elements available: 3. Selector: css=li."
            );
        }

        #[test]
        fn test_find_first() {
            assert_eq!(list(&page(), "ul").find_first("li").unwrap().element().text().unwrap(), "a1");
        }

        #[test]
        fn test_filtered_find() {
            let lists = list(&page(), "ul");
            assert_eq!(lists.find_filtered([Filter::with_class("last")]).unwrap().texts().unwrap(), vec!["c1"]);
            let err = lists.find_filtered_index(1, [Filter::with_class("last")]).unwrap_err();
            assert_eq!(err.to_string(), "No such element with position: 1. Number of elements available: 1.");
        }

        #[test]
        fn test_nested_find_is_lazy() {
            let page = page();
            let lists = list(&page, "ul");
            let _ = lists.len().unwrap();
            let before = page.search_count();
            let items = lists.find("li").unwrap();
            assert_eq!(page.search_count(), before);
            assert!(!items.is_loaded());
        }
    }

    mod conversion_tests {
        use super::*;

        #[test]
        fn test_as_list_keeps_order() {
            let page = MockPage::new();
            inputs(&page, 3);
            let factory = ComponentFactory::builder().component_with_context::<Row>().build();
            let fields = FluentList::<FluentElement>::search(
                instantiator(&page, factory),
                vec![root(&page)],
                "input".into(),
            );
            let rows = fields.as_list::<Row>().unwrap();
            assert_eq!(rows.ids().unwrap(), fields.ids().unwrap());
            assert_eq!(rows.component_type(), ComponentType::of::<Row>());
        }

        #[test]
        fn test_as_list_unregistered_type() {
            let page = MockPage::new();
            inputs(&page, 1);
            assert!(matches!(
                list(&page, "input").as_list::<Row>(),
                Err(FluentError::InvalidComponentType { .. })
            ));
        }

        #[test]
        fn test_from_and_to_elements() {
            let page = MockPage::new();
            inputs(&page, 2);
            let handles = vec![page.handle_by_id("in1").unwrap(), page.handle_by_id("in0").unwrap()];
            let fixed = FluentList::<FluentElement>::from_elements(
                instantiator(&page, ComponentFactory::new()),
                handles.clone(),
            )
            .unwrap();
            let back = fixed.to_elements().unwrap();
            assert!(crate::handle::same_handle(&back[0], &handles[0]));
            assert_eq!(fixed.ids().unwrap(), vec![Some("in1".to_string()), Some("in0".to_string())]);
        }

        #[test]
        fn test_now_present_and_clear_list() {
            let page = MockPage::new();
            let fields = list(&page, "input");
            assert!(matches!(fields.now(), Err(FluentError::EmptyCollection { .. })));
            assert!(!fields.is_present().unwrap());
            inputs(&page, 1);
            fields.reset();
            assert!(fields.now().unwrap().is_present().unwrap());
            fields.clear_list();
            assert!(fields.is_empty().unwrap());
            assert_eq!(page.clicks(page.node_id("in0").unwrap()), 0);
        }
    }

    proptest! {
        #[test]
        fn prop_positional_access_agrees(count in 1usize..8) {
            let page = MockPage::new();
            inputs(&page, count);
            let fields = list(&page, "input");
            prop_assert_eq!(fields.index(0).unwrap().id().unwrap(), fields.first().unwrap().id().unwrap());
            prop_assert_eq!(fields.index(count - 1).unwrap().id().unwrap(), fields.last().unwrap().id().unwrap());
            let is_out_of_range = matches!(fields.index(count), Err(FluentError::OutOfRange { .. }));
            prop_assert!(is_out_of_range);
        }

        #[test]
        fn prop_write_assigns_sticky_last(count in 1usize..8, values in proptest::collection::vec("[a-z]{1,4}", 1..6)) {
            let page = MockPage::new();
            inputs(&page, count);
            list(&page, "input").write(values.as_slice()).unwrap();
            for i in 0..count {
                let expected = values.get(i).unwrap_or(values.last().unwrap());
                prop_assert_eq!(value(&page, &format!("in{i}")), Some(expected.clone()));
            }
        }

        #[test]
        fn prop_fan_out_concatenates(children in proptest::collection::vec(0usize..4, 1..5)) {
            let page = MockPage::new();
            let mut expected = Vec::new();
            for (parent, &count) in children.iter().enumerate() {
                let mut node = MockNode::new("section");
                for child in 0..count {
                    let text = format!("{parent}-{child}");
                    expected.push(text.clone());
                    node = node.child(MockNode::new("p").text(text));
                }
                page.append(node);
            }
            let found = list(&page, "section").find("p").unwrap();
            prop_assert_eq!(found.texts().unwrap(), expected);
        }
    }
}
