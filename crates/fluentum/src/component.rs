//! Component types and their construction.
//!
//! A component is any `Send + Sync` value built around one element handle.
//! A type becomes a component type by implementing [`FromHandle`] or
//! [`FromHandleWithContext`] and being registered with a [`ComponentFactory`];
//! the factory is an explicit constructor table keyed by [`TypeId`].
//!
//! ```ignore
//! let factory = ComponentFactory::builder()
//!     .component::<Badge>()
//!     .component_with_context::<SearchBox>()
//!     .build();
//! ```

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use tracing::trace;

use crate::config::FluentConfig;
use crate::element::FluentElement;
use crate::handle::{Driver, Handle};
use crate::result::{FluentError, FluentResult};

/// Type-erased component instance
pub type AnyComponent = Arc<dyn Any + Send + Sync>;

/// Runtime identity of a component type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentType {
    id: TypeId,
    name: &'static str,
}

impl ComponentType {
    /// Identity of `T`
    #[must_use]
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Type id
    #[must_use]
    pub const fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Component constructed from a handle alone
pub trait FromHandle: Sized + Send + Sync + 'static {
    /// Build the component
    ///
    /// # Errors
    ///
    /// Any error; the instantiator reports it as `InvalidComponentType`.
    fn from_handle(handle: Handle) -> FluentResult<Self>;
}

/// Component constructed from a handle and the session context
pub trait FromHandleWithContext: Sized + Send + Sync + 'static {
    /// Build the component
    ///
    /// # Errors
    ///
    /// Any error; the instantiator reports it as `InvalidComponentType`.
    fn from_handle_with_context(handle: Handle, context: ComponentContext) -> FluentResult<Self>;
}

/// Everything a context-aware component may need
#[derive(Debug, Clone)]
pub struct ComponentContext {
    driver: Driver,
    instantiator: Arc<dyn ComponentInstantiator>,
    config: Arc<FluentConfig>,
}

impl ComponentContext {
    /// Assemble a context
    #[must_use]
    pub fn new(
        driver: Driver,
        instantiator: Arc<dyn ComponentInstantiator>,
        config: Arc<FluentConfig>,
    ) -> Self {
        Self {
            driver,
            instantiator,
            config,
        }
    }

    /// Root search context of the session
    #[must_use]
    pub const fn driver(&self) -> &Driver {
        &self.driver
    }

    /// Instantiator to build further components with
    #[must_use]
    pub const fn instantiator(&self) -> &Arc<dyn ComponentInstantiator> {
        &self.instantiator
    }

    /// Session configuration
    #[must_use]
    pub const fn config(&self) -> &Arc<FluentConfig> {
        &self.config
    }
}

/// A component: something that exposes the element it wraps
pub trait Component: Any + Send + Sync {
    /// The wrapped element
    fn element(&self) -> &FluentElement;
}

type HandleConstructor = fn(Handle) -> FluentResult<AnyComponent>;
type ContextConstructor = fn(Handle, ComponentContext) -> FluentResult<AnyComponent>;

fn construct_from_handle<T: FromHandle>(handle: Handle) -> FluentResult<AnyComponent> {
    Ok(Arc::new(T::from_handle(handle)?))
}

fn construct_with_context<T: FromHandleWithContext>(
    handle: Handle,
    context: ComponentContext,
) -> FluentResult<AnyComponent> {
    Ok(Arc::new(T::from_handle_with_context(handle, context)?))
}

#[derive(Debug, Clone, Copy)]
struct Constructors {
    name: &'static str,
    handle: Option<HandleConstructor>,
    context: Option<ContextConstructor>,
}

/// Constructor table for component types
#[derive(Debug, Clone)]
pub struct ComponentFactory {
    table: HashMap<TypeId, Constructors>,
}

impl Default for ComponentFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentFactory {
    /// Factory knowing only [`FluentElement`]
    #[must_use]
    pub fn new() -> Self {
        let mut factory = Self {
            table: HashMap::new(),
        };
        factory.register_with_context::<FluentElement>();
        factory
    }

    /// Start a builder
    #[must_use]
    pub fn builder() -> ComponentFactoryBuilder {
        ComponentFactoryBuilder {
            factory: Self::new(),
        }
    }

    fn entry<T: 'static>(&mut self) -> &mut Constructors {
        self.table.entry(TypeId::of::<T>()).or_insert(Constructors {
            name: type_name::<T>(),
            handle: None,
            context: None,
        })
    }

    /// Register `T` with the handle-only shape
    pub fn register<T: FromHandle>(&mut self) {
        self.entry::<T>().handle = Some(construct_from_handle::<T>);
    }

    /// Register `T` with the handle-and-context shape
    pub fn register_with_context<T: FromHandleWithContext>(&mut self) {
        self.entry::<T>().context = Some(construct_with_context::<T>);
    }

    /// Whether a constructor is registered for `component_type`
    #[must_use]
    pub fn is_component_type(&self, component_type: TypeId) -> bool {
        self.table
            .get(&component_type)
            .is_some_and(|c| c.handle.is_some() || c.context.is_some())
    }

    /// Number of registered types
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether no type is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Build a component, preferring the context shape.
    ///
    /// `context` is only called when the context shape is used.
    ///
    /// # Errors
    ///
    /// `InvalidComponentType` if `component_type` is not registered or its
    /// constructor fails.
    pub fn construct(
        &self,
        component_type: ComponentType,
        handle: Handle,
        context: impl FnOnce() -> FluentResult<ComponentContext>,
    ) -> FluentResult<AnyComponent> {
        let constructors = self.table.get(&component_type.id()).ok_or_else(|| {
            FluentError::invalid_component(
                component_type.name(),
                "type is not registered with the component factory",
            )
        })?;
        let built = match (constructors.context, constructors.handle) {
            (Some(with_context), _) => with_context(handle, context()?),
            (None, Some(from_handle)) => from_handle(handle),
            (None, None) => {
                return Err(FluentError::invalid_component(
                    constructors.name,
                    "no constructor registered",
                ))
            }
        };
        built.map_err(|e| match e {
            invalid @ FluentError::InvalidComponentType { .. } => invalid,
            other => FluentError::invalid_component(
                constructors.name,
                format!("constructor failed: {other}"),
            ),
        })
    }
}

/// Builder for [`ComponentFactory`]
#[derive(Debug, Clone)]
#[must_use]
pub struct ComponentFactoryBuilder {
    factory: ComponentFactory,
}

impl ComponentFactoryBuilder {
    /// Register `T` with the handle-only shape
    pub fn component<T: FromHandle>(mut self) -> Self {
        self.factory.register::<T>();
        self
    }

    /// Register `T` with the handle-and-context shape
    pub fn component_with_context<T: FromHandleWithContext>(mut self) -> Self {
        self.factory.register_with_context::<T>();
        self
    }

    /// Finish
    #[must_use]
    pub fn build(self) -> ComponentFactory {
        self.factory
    }
}

/// Builds component instances from handles
pub trait ComponentInstantiator: Send + Sync + fmt::Debug {
    /// Whether `component_type` can be built. Has no side effects.
    fn is_component_type(&self, component_type: TypeId) -> bool;

    /// Build a component of `component_type` wrapping `handle`
    ///
    /// # Errors
    ///
    /// `InvalidComponentType` when the type cannot be built.
    fn instantiate(&self, component_type: ComponentType, handle: Handle)
        -> FluentResult<AnyComponent>;
}

impl dyn ComponentInstantiator {
    /// Whether `T` can be built
    #[must_use]
    pub fn is_component<T: Any>(&self) -> bool {
        self.is_component_type(TypeId::of::<T>())
    }

    /// Build a `T` wrapping `handle`
    ///
    /// # Errors
    ///
    /// `InvalidComponentType` when `T` cannot be built.
    pub fn new_component<T: Any + Send + Sync>(&self, handle: Handle) -> FluentResult<Arc<T>> {
        let component_type = ComponentType::of::<T>();
        downcast_component(self.instantiate(component_type, handle)?, component_type)
    }
}

/// Recover the concrete type of a component built for `component_type`
///
/// # Errors
///
/// `InvalidComponentType` if the value is of another type.
pub fn downcast_component<T: Any + Send + Sync>(
    component: AnyComponent,
    component_type: ComponentType,
) -> FluentResult<Arc<T>> {
    component.downcast::<T>().map_err(|_| {
        FluentError::invalid_component(
            component_type.name(),
            format!("constructor produced a value other than {}", type_name::<T>()),
        )
    })
}

/// Instantiator backed by a [`ComponentFactory`]
#[derive(Debug)]
pub struct DefaultComponentInstantiator {
    factory: ComponentFactory,
    driver: Driver,
    config: Arc<FluentConfig>,
    accessor: Weak<dyn ComponentInstantiator>,
}

impl DefaultComponentInstantiator {
    /// Create an instantiator.
    ///
    /// Context-aware components receive `accessor` as their instantiator,
    /// usually the registry that owns this instantiator.
    #[must_use]
    pub fn new(
        driver: Driver,
        factory: ComponentFactory,
        config: Arc<FluentConfig>,
        accessor: Weak<dyn ComponentInstantiator>,
    ) -> Self {
        Self {
            factory,
            driver,
            config,
            accessor,
        }
    }

    /// Instantiator that hands itself to context-aware components
    #[must_use]
    pub fn standalone(
        driver: Driver,
        factory: ComponentFactory,
        config: Arc<FluentConfig>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let accessor: Weak<dyn ComponentInstantiator> = me.clone();
            Self::new(driver, factory, config, accessor)
        })
    }

    /// Constructor table in use
    #[must_use]
    pub const fn factory(&self) -> &ComponentFactory {
        &self.factory
    }

    fn context(&self) -> FluentResult<ComponentContext> {
        let instantiator = self.accessor.upgrade().ok_or_else(|| FluentError::InvalidState {
            message: "component instantiator is no longer alive".to_string(),
        })?;
        Ok(ComponentContext::new(
            Arc::clone(&self.driver),
            instantiator,
            Arc::clone(&self.config),
        ))
    }
}

impl ComponentInstantiator for DefaultComponentInstantiator {
    fn is_component_type(&self, component_type: TypeId) -> bool {
        self.factory.is_component_type(component_type)
    }

    fn instantiate(
        &self,
        component_type: ComponentType,
        handle: Handle,
    ) -> FluentResult<AnyComponent> {
        trace!(component = component_type.name(), "instantiating component");
        self.factory
            .construct(component_type, handle, || self.context())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::handle::same_handle;
    use crate::mock::{MockNode, MockPage};

    #[derive(Debug)]
    struct Badge {
        handle: Handle,
    }

    impl FromHandle for Badge {
        fn from_handle(handle: Handle) -> FluentResult<Self> {
            Ok(Self { handle })
        }
    }

    #[derive(Debug)]
    struct Both {
        with_context: bool,
    }

    impl FromHandle for Both {
        fn from_handle(_handle: Handle) -> FluentResult<Self> {
            Ok(Self {
                with_context: false,
            })
        }
    }

    impl FromHandleWithContext for Both {
        fn from_handle_with_context(_handle: Handle, _context: ComponentContext) -> FluentResult<Self> {
            Ok(Self { with_context: true })
        }
    }

    #[derive(Debug)]
    struct Refuses;

    impl FromHandle for Refuses {
        fn from_handle(_handle: Handle) -> FluentResult<Self> {
            Err(FluentError::driver("boom"))
        }
    }

    #[derive(Debug)]
    struct Unregistered;

    fn setup(factory: ComponentFactory) -> (Arc<MockPage>, Arc<dyn ComponentInstantiator>) {
        let page = MockPage::new();
        page.append(MockNode::new("span").id("badge").text("3"));
        let instantiator: Arc<dyn ComponentInstantiator> = DefaultComponentInstantiator::standalone(
            page.clone(),
            factory,
            Arc::new(FluentConfig::default()),
        );
        (page, instantiator)
    }

    mod factory_tests {
        use super::*;

        #[test]
        fn test_fluent_element_always_registered() {
            let factory = ComponentFactory::new();
            assert!(factory.is_component_type(TypeId::of::<FluentElement>()));
            assert_eq!(factory.len(), 1);
            assert!(!factory.is_empty());
        }

        #[test]
        fn test_builder_registers_types() {
            let factory = ComponentFactory::builder().component::<Badge>().build();
            assert!(factory.is_component_type(TypeId::of::<Badge>()));
            assert!(!factory.is_component_type(TypeId::of::<Unregistered>()));
        }

        #[test]
        fn test_type_name_display() {
            assert!(ComponentType::of::<Badge>().to_string().ends_with("Badge"));
        }
    }

    mod instantiate_tests {
        use super::*;

        #[test]
        fn test_handle_shape() {
            let (page, instantiator) = setup(ComponentFactory::builder().component::<Badge>().build());
            let handle = page.handle_by_id("badge").unwrap();
            let badge = instantiator.new_component::<Badge>(Arc::clone(&handle)).unwrap();
            assert!(same_handle(&badge.handle, &handle));
            assert!(instantiator.is_component::<Badge>());
        }

        #[test]
        fn test_context_shape_wins() {
            let (page, instantiator) = setup(
                ComponentFactory::builder()
                    .component::<Both>()
                    .component_with_context::<Both>()
                    .build(),
            );
            let both = instantiator
                .new_component::<Both>(page.handle_by_id("badge").unwrap())
                .unwrap();
            assert!(both.with_context);
        }

        #[test]
        fn test_unregistered_type() {
            let (page, instantiator) = setup(ComponentFactory::new());
            let err = instantiator
                .new_component::<Unregistered>(page.handle_by_id("badge").unwrap())
                .unwrap_err();
            assert!(matches!(err, FluentError::InvalidComponentType { ref type_name, .. } if type_name.ends_with("Unregistered")));
            assert!(!instantiator.is_component::<Unregistered>());
        }

        #[test]
        fn test_constructor_failure_is_invalid_component() {
            let (page, instantiator) = setup(ComponentFactory::builder().component::<Refuses>().build());
            let err = instantiator
                .new_component::<Refuses>(page.handle_by_id("badge").unwrap())
                .unwrap_err();
            assert!(matches!(err, FluentError::InvalidComponentType { ref reason, .. } if reason.contains("boom")));
        }

        #[test]
        fn test_context_carries_session() {
            let (page, instantiator) = setup(ComponentFactory::new());
            let element = instantiator
                .new_component::<FluentElement>(page.handle_by_id("badge").unwrap())
                .unwrap();
            assert_eq!(element.text().unwrap(), "3");
            assert_eq!(element.context().config().max_unwrap_depth, 32);
        }

        #[test]
        fn test_dropped_accessor_is_invalid_state() {
            let page = MockPage::new();
            page.append(MockNode::new("span").id("badge"));
            let orphan = DefaultComponentInstantiator::new(
                page.clone(),
                ComponentFactory::new(),
                Arc::new(FluentConfig::default()),
                Weak::<DefaultComponentInstantiator>::new(),
            );
            let err = orphan
                .instantiate(ComponentType::of::<FluentElement>(), page.handle_by_id("badge").unwrap())
                .unwrap_err();
            assert!(matches!(err, FluentError::InvalidState { .. }));
        }
    }
}
