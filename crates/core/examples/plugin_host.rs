//! Example: a host context with a child context for plugins
//!
//! The root registers shared services and an event, then freezes. A child
//! loads two in-memory modules in dependency order, overrides one binding
//! and fires the event up through the tree.

use std::sync::Arc;

use komoinen_core::events::{EventBus, Handlers, Listener};
use komoinen_core::{
    BindableKind, Binding, BoxError, Context, DeclaredBinding, Event, Module, ModuleEntry,
    ModuleInfo, ModulesInitPost,
};

#[derive(Debug)]
struct Greeting(String);

#[derive(Debug)]
struct Announce {
    text: String,
    heard_by: Vec<&'static str>,
}

impl Event for Announce {}

struct Herald {
    name: &'static str,
}

impl Listener for Herald {
    fn handlers(&self, handlers: &mut Handlers<Self>) {
        handlers
            .on(|me: &Self, _: &EventBus, event: &mut Announce| {
                println!("[{}] {}", me.name, event.text);
                event.heard_by.push(me.name);
                Ok(())
            })
            .on(|me: &Self, _: &EventBus, event: &mut ModulesInitPost| {
                println!("[{}] modules ready in {}: {:?}", me.name, event.context, event.modules);
                Ok(())
            });
    }
}

struct PluginEntry;

impl ModuleEntry for PluginEntry {
    fn post_init(&self, module: &Module, context: &Context) -> Result<(), BoxError> {
        let greeting = context.resolve_default::<Greeting>()?;
        println!("{} sees greeting {:?}", module.key(), greeting.0);
        Ok(())
    }
}

fn main() -> komoinen_core::Result<()> {
    let mut root = Context::new("host");
    root.add_binding(
        Binding::builder::<Greeting, ()>()
            .overridable(true)
            .to_value(Greeting("hello from the host".to_string()))
            .build(),
    )?;
    root.register_event::<Announce>("announce")?;
    let host_herald = Arc::new(Herald { name: "host" });
    root.register_listener(&host_herald, None)?;
    root.freeze()?;

    let mut plugins = Context::with_parent("plugins", Arc::new(root));
    let plugin_herald = Arc::new(Herald { name: "plugins" });
    plugins.register_listener(&plugin_herald, None)?;
    plugins
        .code_registry_mut()?
        .register_entry("plugin::Entry", PluginEntry)
        .register_type::<Greeting>("Greeting")
        .register_supplier("plugin-greeting", || Greeting("hello from a plugin".to_string()));

    plugins.add_module(
        ModuleInfo::new("greeter", "1.0")
            .with_author("example")
            .depends_on("base", "1.0")
            .with_entry("plugin::Entry")
            .with_binding(DeclaredBinding::new(
                "Greeting",
                BindableKind::Singleton,
                "plugin-greeting",
            )),
    )?;
    plugins.add_module(ModuleInfo::new("base", "1.0").with_author("example"))?;
    plugins.freeze()?;

    let announced = plugins.fire_event(
        Announce {
            text: "plugins are up".to_string(),
            heard_by: Vec::new(),
        },
        true,
    )?;
    println!("heard by {:?}", announced.heard_by);
    println!("{:?}", plugins);
    Ok(())
}
