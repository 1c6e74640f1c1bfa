//! The base component.
//!
//! [`FluentElement`] wraps one handle (usually a [`LazyProxy`]) together
//! with the session context. Every other component exposes one through
//! [`Component::element`].

use std::sync::Arc;

use crate::component::{Component, ComponentContext, FromHandleWithContext};
use crate::handle::{ElementScope, Handle};
use crate::list::FluentList;
use crate::locator::{ElementLocator, Filter, Selector};
use crate::proxy::LazyProxy;
use crate::result::FluentResult;

/// Element component with fluent operations
#[derive(Debug, Clone)]
pub struct FluentElement {
    handle: Handle,
    context: ComponentContext,
}

impl FromHandleWithContext for FluentElement {
    fn from_handle_with_context(handle: Handle, context: ComponentContext) -> FluentResult<Self> {
        Ok(Self::new(handle, context))
    }
}

impl Component for FluentElement {
    fn element(&self) -> &FluentElement {
        self
    }
}

impl FluentElement {
    /// Wrap `handle`
    #[must_use]
    pub const fn new(handle: Handle, context: ComponentContext) -> Self {
        Self { handle, context }
    }

    /// The wrapped handle
    #[must_use]
    pub const fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Session context
    #[must_use]
    pub const fn context(&self) -> &ComponentContext {
        &self.context
    }

    /// The lazy proxy behind the handle, if it is one
    #[must_use]
    pub fn proxy(&self) -> Option<Arc<LazyProxy>> {
        Arc::clone(&self.handle).as_proxy()
    }

    /// Click
    ///
    /// # Errors
    ///
    /// Resolution or driver errors.
    pub fn click(&self) -> FluentResult<&Self> {
        self.handle.click()?;
        Ok(self)
    }

    /// Submit the enclosing form
    ///
    /// # Errors
    ///
    /// Resolution or driver errors.
    pub fn submit(&self) -> FluentResult<&Self> {
        self.handle.submit()?;
        Ok(self)
    }

    /// Clear the value
    ///
    /// # Errors
    ///
    /// Resolution or driver errors.
    pub fn clear(&self) -> FluentResult<&Self> {
        self.handle.clear()?;
        Ok(self)
    }

    /// Replace the value with `text`
    ///
    /// # Errors
    ///
    /// Resolution or driver errors.
    pub fn write(&self, text: &str) -> FluentResult<&Self> {
        self.handle.clear()?;
        self.handle.send_keys(text)?;
        Ok(self)
    }

    /// Type `text` after the current value
    ///
    /// # Errors
    ///
    /// Resolution or driver errors.
    pub fn send_keys(&self, text: &str) -> FluentResult<&Self> {
        self.handle.send_keys(text)?;
        Ok(self)
    }

    /// Visible text
    ///
    /// # Errors
    ///
    /// Resolution or driver errors.
    pub fn text(&self) -> FluentResult<String> {
        self.handle.text()
    }

    /// Text content, hidden text included
    ///
    /// # Errors
    ///
    /// Resolution or driver errors.
    pub fn text_content(&self) -> FluentResult<String> {
        self.handle.text_content()
    }

    /// `value` property
    ///
    /// # Errors
    ///
    /// Resolution or driver errors.
    pub fn value(&self) -> FluentResult<Option<String>> {
        self.handle.value()
    }

    /// `id` attribute
    ///
    /// # Errors
    ///
    /// Resolution or driver errors.
    pub fn id(&self) -> FluentResult<Option<String>> {
        self.handle.id()
    }

    /// `name` attribute
    ///
    /// # Errors
    ///
    /// Resolution or driver errors.
    pub fn name(&self) -> FluentResult<Option<String>> {
        self.handle.name()
    }

    /// Any attribute
    ///
    /// # Errors
    ///
    /// Resolution or driver errors.
    pub fn attribute(&self, name: &str) -> FluentResult<Option<String>> {
        self.handle.attribute(name)
    }

    /// Tag name
    ///
    /// # Errors
    ///
    /// Resolution or driver errors.
    pub fn tag_name(&self) -> FluentResult<String> {
        self.handle.tag_name()
    }

    /// Whether the element accepts interaction
    ///
    /// # Errors
    ///
    /// Resolution or driver errors.
    pub fn is_enabled(&self) -> FluentResult<bool> {
        self.handle.is_enabled()
    }

    /// Whether the element is rendered
    ///
    /// # Errors
    ///
    /// Resolution or driver errors.
    pub fn is_displayed(&self) -> FluentResult<bool> {
        self.handle.is_displayed()
    }

    /// Whether the element is selected or checked
    ///
    /// # Errors
    ///
    /// Resolution or driver errors.
    pub fn is_selected(&self) -> FluentResult<bool> {
        self.handle.is_selected()
    }

    /// Resolve the underlying proxy now
    ///
    /// # Errors
    ///
    /// Resolution errors.
    pub fn now(&self) -> FluentResult<&Self> {
        if let Some(proxy) = self.proxy() {
            proxy.now()?;
        }
        Ok(self)
    }

    /// Forget the resolved handle; the next operation searches again
    pub fn reset(&self) -> &Self {
        if let Some(proxy) = self.proxy() {
            proxy.reset();
        }
        self
    }

    /// Whether the handle is resolved. Plain handles always are.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.proxy().map_or(true, |proxy| proxy.is_loaded())
    }

    /// Whether the element can currently be found
    ///
    /// # Errors
    ///
    /// Driver errors other than a failed match.
    pub fn is_present(&self) -> FluentResult<bool> {
        match self.proxy() {
            Some(proxy) => proxy.is_present(),
            None => match self.handle.tag_name() {
                Ok(_) => Ok(true),
                Err(err) if err.is_stale() || err.is_not_found() => Ok(false),
                Err(err) => Err(err),
            },
        }
    }

    /// Rebuild this element's handle as another component type
    ///
    /// # Errors
    ///
    /// `InvalidComponentType` when `T` cannot be built.
    pub fn as_component<T: Component>(&self) -> FluentResult<Arc<T>> {
        self.context
            .instantiator()
            .new_component::<T>(Arc::clone(&self.handle))
    }

    /// Lazily located descendant. Nothing is searched until it is used.
    ///
    /// # Errors
    ///
    /// `InvalidComponentType` only.
    pub fn el(&self, selector: impl Into<Selector>) -> FluentResult<Arc<FluentElement>> {
        self.el_as::<FluentElement>(selector)
    }

    /// Lazily located descendant built as `T`
    ///
    /// # Errors
    ///
    /// `InvalidComponentType` only.
    pub fn el_as<T: Component>(&self, selector: impl Into<Selector>) -> FluentResult<Arc<T>> {
        let locator = ElementLocator::new(ElementScope::of(Arc::clone(&self.handle)), selector);
        let proxy = LazyProxy::new(locator, self.context.config().match_policy);
        self.context.instantiator().new_component::<T>(proxy)
    }

    /// Every descendant matching `selector`, searched on first use
    #[must_use]
    pub fn find(&self, selector: impl Into<Selector>) -> FluentList<FluentElement> {
        self.find_as::<FluentElement>(selector)
    }

    /// Every descendant matching `selector`, built as `T`
    #[must_use]
    pub fn find_as<T: Component>(&self, selector: impl Into<Selector>) -> FluentList<T> {
        FluentList::search(
            Arc::clone(self.context.instantiator()),
            vec![ElementScope::of(Arc::clone(&self.handle))],
            selector.into(),
        )
    }

    /// Descendant at `index` among the matches of `selector`
    ///
    /// # Errors
    ///
    /// `OutOfRange` naming the selector, or search errors.
    pub fn find_index(
        &self,
        selector: impl Into<Selector>,
        index: usize,
    ) -> FluentResult<Arc<FluentElement>> {
        let selector = selector.into();
        self.find(selector.clone()).position(index, Some(&selector))
    }

    /// First descendant matching `selector`
    ///
    /// # Errors
    ///
    /// `OutOfRange` when nothing matches, or search errors.
    pub fn find_first(&self, selector: impl Into<Selector>) -> FluentResult<Arc<FluentElement>> {
        self.find_index(selector, 0)
    }

    /// Every descendant accepted by all `filters`
    #[must_use]
    pub fn find_filtered(&self, filters: impl IntoIterator<Item = Filter>) -> FluentList<FluentElement> {
        self.find(Selector::any().with_filters(filters))
    }
}
