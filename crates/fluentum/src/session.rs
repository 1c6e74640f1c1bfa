//! Entry point tying a driver, a configuration and a component registry.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::component::{Component, ComponentFactory, ComponentInstantiator};
use crate::config::FluentConfig;
use crate::element::FluentElement;
use crate::handle::{Driver, Handle};
use crate::list::FluentList;
use crate::locator::{ElementLocator, Selector};
use crate::proxy::LazyProxy;
use crate::registry::ComponentsManager;
use crate::result::FluentResult;

/// A browsing session.
///
/// Every element and list obtained from the session is built by its
/// [`ComponentsManager`], so components can be found again from their
/// handles. Dropping the session releases the registry.
///
/// # Example
///
/// ```
/// use fluentum::mock::{MockNode, MockPage};
/// use fluentum::FluentSession;
///
/// let page = MockPage::new();
/// page.append(MockNode::new("button").id("go").text("Go"));
///
/// let session = FluentSession::new(page.clone());
/// let button = session.el("#go").unwrap();
/// button.click().unwrap();
/// assert_eq!(page.clicks(page.node_id("go").unwrap()), 1);
/// ```
#[derive(Debug)]
pub struct FluentSession {
    id: Uuid,
    driver: Driver,
    config: Arc<FluentConfig>,
    components: Arc<ComponentsManager>,
}

impl FluentSession {
    /// Session with the default configuration and only [`FluentElement`] registered
    #[must_use]
    pub fn new(driver: Driver) -> Self {
        Self::with_config(driver, FluentConfig::default())
    }

    /// Session with `config`
    #[must_use]
    pub fn with_config(driver: Driver, config: FluentConfig) -> Self {
        Self::with_factory(driver, ComponentFactory::new(), config)
    }

    /// Session able to build the component types registered in `factory`
    #[must_use]
    pub fn with_factory(driver: Driver, factory: ComponentFactory, config: FluentConfig) -> Self {
        let config = Arc::new(config);
        let components = ComponentsManager::new(Arc::clone(&driver), factory, Arc::clone(&config));
        let id = Uuid::new_v4();
        info!(session = %id, policy = ?config.match_policy, "session started");
        Self {
            id,
            driver,
            config,
            components,
        }
    }

    /// Unique id, used to tell sessions apart in logs
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Root search context
    #[must_use]
    pub const fn driver(&self) -> &Driver {
        &self.driver
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &FluentConfig {
        &self.config
    }

    /// Component registry
    #[must_use]
    pub const fn components(&self) -> &Arc<ComponentsManager> {
        &self.components
    }

    fn instantiator(&self) -> Arc<dyn ComponentInstantiator> {
        let components: Arc<dyn ComponentInstantiator> = self.components.clone();
        components
    }

    /// Lazily located element. Nothing is searched until it is used.
    ///
    /// # Errors
    ///
    /// `InvalidComponentType` only.
    pub fn el(&self, selector: impl Into<Selector>) -> FluentResult<Arc<FluentElement>> {
        self.el_as::<FluentElement>(selector)
    }

    /// Lazily located element built as `T`
    ///
    /// # Errors
    ///
    /// `InvalidComponentType` when `T` is not registered.
    pub fn el_as<T: Component>(&self, selector: impl Into<Selector>) -> FluentResult<Arc<T>> {
        let locator = ElementLocator::new(Arc::clone(&self.driver), selector);
        let proxy = LazyProxy::new(locator, self.config.match_policy);
        self.components.new_component::<T>(proxy)
    }

    /// Every element matching `selector`, searched on first use
    #[must_use]
    pub fn find(&self, selector: impl Into<Selector>) -> FluentList<FluentElement> {
        self.find_as::<FluentElement>(selector)
    }

    /// Every element matching `selector`, built as `T`
    #[must_use]
    pub fn find_as<T: Component>(&self, selector: impl Into<Selector>) -> FluentList<T> {
        FluentList::search(
            self.instantiator(),
            vec![Arc::clone(&self.driver)],
            selector.into(),
        )
    }

    /// Element at `index` among the matches of `selector`
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

    /// First element matching `selector`
    ///
    /// # Errors
    ///
    /// `OutOfRange` when nothing matches, or search errors.
    pub fn find_first(&self, selector: impl Into<Selector>) -> FluentResult<Arc<FluentElement>> {
        self.find_index(selector, 0)
    }

    /// Wrap an existing handle as `T` and register it
    ///
    /// # Errors
    ///
    /// `InvalidComponentType` when `T` is not registered.
    pub fn new_component<T: Component>(&self, handle: Handle) -> FluentResult<Arc<T>> {
        self.components.new_component::<T>(handle)
    }

    /// Forget every registered component
    pub fn release(&self) {
        self.components.release();
        debug!(session = %self.id, "session released");
    }
}

impl Drop for FluentSession {
    fn drop(&mut self) {
        self.release();
    }
}
