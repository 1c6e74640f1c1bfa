//! Registry Demo - lazy elements surviving a page reload
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=fluentum=debug cargo run --example registry_demo -p fluentum
//! ```

#![allow(clippy::uninlined_format_args, clippy::unwrap_used)]

use std::sync::Arc;

use fluentum::mock::{MockNode, MockPage};
use fluentum::prelude::*;
use fluentum::{init_logging, ComponentContext, FromHandleWithContext};

#[derive(Debug)]
struct TodoItem {
    element: FluentElement,
}

impl FromHandleWithContext for TodoItem {
    fn from_handle_with_context(handle: Handle, context: ComponentContext) -> FluentResult<Self> {
        Ok(Self {
            element: FluentElement::new(handle, context),
        })
    }
}

impl Component for TodoItem {
    fn element(&self) -> &FluentElement {
        &self.element
    }
}

impl TodoItem {
    fn complete(&self) -> FluentResult<()> {
        self.element.el("input.toggle")?.click()?;
        Ok(())
    }
}

fn render(page: &MockPage, todos: &[&str]) {
    let list = page.append(MockNode::new("ul").id("todos"));
    for todo in todos {
        let item = MockNode::new("li")
            .class("todo")
            .text(*todo)
            .child(MockNode::new("input").class("toggle"));
        page.append_child(list, item).unwrap();
    }
}

fn main() -> FluentResult<()> {
    let config = FluentConfig::default().with_env_overrides()?;
    let _ = init_logging(&config.log_filter);

    println!("=== Fluentum Registry Demo ===\n");

    let page = MockPage::new();
    render(&page, &["write spec", "review"]);

    let factory = ComponentFactory::builder().component_with_context::<TodoItem>().build();
    let session = FluentSession::with_factory(page.clone(), factory, config);
    println!("session {}", session.id());

    let todos = session.find_as::<TodoItem>("li.todo");
    println!("todos: {:?}", todos.texts()?);
    todos.first()?.complete()?;

    let heading = session.el("#todos")?;
    heading.now()?;
    println!("registered components: {}", session.components().len());

    page.navigate();
    render(&page, &["write spec", "review", "ship"]);
    match heading.tag_name() {
        Err(err) if err.is_stale() => println!("stale after reload: {}", err),
        other => println!("unexpected: {:?}", other),
    }
    println!("relocated tag: {}", heading.tag_name()?);

    todos.reset();
    println!("todos after reload: {:?}", todos.texts()?);

    let raw = page.handle_by_id("todos").unwrap();
    let same = session.components().get_component_as::<FluentElement>(&raw);
    println!(
        "same component after relocation: {}",
        same.is_some_and(|c| Arc::ptr_eq(&c, &heading))
    );

    println!("\n=== Registry Demo Complete ===");
    Ok(())
}
