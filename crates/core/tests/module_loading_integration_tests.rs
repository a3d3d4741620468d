//! Integration tests for module discovery, ordering, loading and lifecycle.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use komoinen_core::events::{EventBus, Handlers, Listener};
use komoinen_core::modules::{ModuleData, ModuleSource};
use komoinen_core::{
    BindableKind, Binding, BoxError, Context, CoreError, DeclaredBinding, Module, ModuleEntry,
    ModuleError, ModuleInfo, ModulesInitMid, ModulesInitPost, ModulesInitPre, RuntimeConfig, Tag,
};
use tempfile::TempDir;
use zip::write::FileOptions;
use zip::ZipWriter;

/// Records every module lifecycle event it sees
#[derive(Default)]
struct LifecycleRecorder {
    log: Mutex<Vec<String>>,
}

impl LifecycleRecorder {
    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

impl Listener for LifecycleRecorder {
    fn handlers(&self, handlers: &mut Handlers<Self>) {
        handlers
            .on(|me: &Self, _: &EventBus, event: &mut ModulesInitPre| {
                me.record(format!("pre:{}", event.modules.join(",")));
                Ok(())
            })
            .on(|me: &Self, _: &EventBus, event: &mut ModulesInitMid| {
                me.record(format!("mid:{}", event.modules.len()));
                Ok(())
            })
            .on(|me: &Self, _: &EventBus, event: &mut ModulesInitPost| {
                me.record(format!("post:{}", event.modules.len()));
                Ok(())
            });
    }
}

fn module(name: &str, deps: &[&str]) -> ModuleInfo {
    deps.iter()
        .fold(ModuleInfo::new(name, "1.0").with_author("tests"), |info, dep| {
            info.depends_on(*dep, "1.0")
        })
}

fn failures_of(err: &CoreError) -> Vec<&ModuleError> {
    match err {
        CoreError::Module(err) => err.failures(),
        other => panic!("expected a module error, got {:?}", other),
    }
}

#[test]
fn test_modules_load_in_dependency_order() {
    let mut context = Context::new("root");
    let recorder = Arc::new(LifecycleRecorder::default());
    context.register_listener(&recorder, None).unwrap();

    context.add_module(module("C", &["B"])).unwrap();
    context.add_module(module("A", &[])).unwrap();
    context.add_module(module("B", &["A"])).unwrap();
    context.freeze().unwrap();

    let names: Vec<&str> = context.modules().iter().map(Module::name).collect();
    assert_eq!(names, vec!["A", "B", "C"]);
    assert_eq!(
        recorder.log(),
        vec!["pre:A-1.0,B-1.0,C-1.0", "mid:3", "post:3"]
    );
    assert!(matches!(context.module("B").unwrap().data(), ModuleData::Empty));
}

#[test]
fn test_cycle_fails_before_any_lifecycle_event() {
    let mut context = Context::new("root");
    let recorder = Arc::new(LifecycleRecorder::default());
    context.register_listener(&recorder, None).unwrap();

    context.add_module(module("A", &["B"])).unwrap();
    context.add_module(module("B", &["A"])).unwrap();

    let err = context.freeze().unwrap_err();
    let failures = failures_of(&err);
    assert_eq!(failures.len(), 1);
    match failures[0] {
        ModuleError::DependencyCycle { stuck, cycle } => {
            assert_eq!(stuck.len(), 2);
            assert_eq!(cycle.first(), cycle.last());
        }
        other => panic!("expected DependencyCycle, got {:?}", other),
    }

    assert!(recorder.log().is_empty());
    assert!(!context.is_frozen());
    assert!(context.modules().is_empty());
}

#[test]
fn test_missing_dependency_is_named() {
    let mut context = Context::new("root");
    context.add_module(module("A", &["Z"])).unwrap();

    let err = context.freeze().unwrap_err();
    match failures_of(&err)[0] {
        ModuleError::MissingDependency { module, dependency } => {
            assert_eq!(module, "A-1.0");
            assert_eq!(dependency, "Z-1.0");
        }
        other => panic!("expected MissingDependency, got {:?}", other),
    }
    assert!(err.to_string().contains("Z-1.0"));
}

#[test]
fn test_all_graph_problems_are_reported_together() {
    let mut context = Context::new("root");
    context.add_module(module("A", &["Z"])).unwrap();
    context.add_module(module("B", &["C"])).unwrap();
    context.add_module(module("C", &["B"])).unwrap();
    context.add_module(module("A", &[])).unwrap();

    let err = context.freeze().unwrap_err();
    let failures = failures_of(&err);
    assert_eq!(failures.len(), 3);
    assert!(failures
        .iter()
        .any(|f| matches!(f, ModuleError::DuplicateModule { .. })));
    assert!(failures
        .iter()
        .any(|f| matches!(f, ModuleError::MissingDependency { .. })));
    assert!(failures
        .iter()
        .any(|f| matches!(f, ModuleError::DependencyCycle { .. })));
}

#[test]
fn test_child_depends_on_module_loaded_by_parent() {
    let mut root = Context::new("root");
    root.add_module(module("base", &[])).unwrap();
    root.freeze().unwrap();
    let root = Arc::new(root);

    let mut child = Context::with_parent("plugins", Arc::clone(&root));
    child.add_module(module("plugin", &["base"])).unwrap();
    child.freeze().unwrap();

    let names: Vec<&str> = child.modules().iter().map(Module::name).collect();
    assert_eq!(names, vec!["plugin"]);
    assert!(child.module("base").is_none());
}

// Code-bearing modules

#[derive(Debug, PartialEq)]
struct Greeter {
    greeting: String,
}

struct GreetingEntry {
    calls: Arc<Mutex<Vec<String>>>,
}

impl ModuleEntry for GreetingEntry {
    fn pre_init(&self, info: &ModuleInfo) -> Result<(), BoxError> {
        self.calls.lock().unwrap().push(format!("pre_init:{}", info.name));
        Ok(())
    }

    fn post_init(&self, module: &Module, context: &Context) -> Result<(), BoxError> {
        let greeter = context.resolve::<Greeter, ()>("en", &(), false)?;
        self.calls
            .lock()
            .unwrap()
            .push(format!("post_init:{}:{}", module.name(), greeter.greeting));
        Ok(())
    }
}

fn greeting_context(calls: &Arc<Mutex<Vec<String>>>) -> Context {
    let mut context = Context::new("root");
    context
        .code_registry_mut()
        .unwrap()
        .register_entry(
            "greeting::Entry",
            GreetingEntry {
                calls: Arc::clone(calls),
            },
        )
        .register_type::<Greeter>("Greeter")
        .register_supplier("hello", || Greeter {
            greeting: "hello".to_string(),
        })
        .register_function("greet", |name: &String| Greeter {
            greeting: format!("hello {}", name),
        });
    context
}

#[test]
fn test_code_module_registers_bindings_and_runs_hooks() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut context = greeting_context(&calls);

    context
        .add_module(
            ModuleInfo::new("greeting", "1.0")
                .with_entry("greeting::Entry")
                .with_binding(
                    DeclaredBinding::new("Greeter", BindableKind::Singleton, "hello")
                        .tagged("en")
                        .allow_new(),
                )
                .with_binding(
                    DeclaredBinding::new("Greeter", BindableKind::Multiton, "greet")
                        .with_param("String")
                        .allow_new(),
                ),
        )
        .unwrap();
    context.freeze().unwrap();

    assert_eq!(
        *calls.lock().unwrap(),
        vec!["pre_init:greeting", "post_init:greeting:hello"]
    );

    let first = context
        .resolve::<Greeter, String>(Tag::Default, &"ada".to_string(), false)
        .unwrap();
    let second = context
        .resolve::<Greeter, String>(Tag::Default, &"ada".to_string(), false)
        .unwrap();
    assert_eq!(first.greeting, "hello ada");
    assert!(Arc::ptr_eq(&first, &second));

    let module = context.module("greeting").unwrap();
    assert!(module.data().entry().is_some());
}

#[test]
fn test_declared_binding_must_exist_unless_new() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut context = greeting_context(&calls);
    context
        .add_module(
            ModuleInfo::new("greeting", "1.0").with_binding(
                DeclaredBinding::new("Greeter", BindableKind::Singleton, "hello").tagged("en"),
            ),
        )
        .unwrap();

    let err = context.freeze().unwrap_err();
    assert!(matches!(
        failures_of(&err)[0],
        ModuleError::ModuleBindingRegistrationFailure { .. }
    ));
    assert!(!context.is_frozen());
}

#[test]
fn test_declared_binding_overrides_existing_overridable_binding() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut context = greeting_context(&calls);
    context
        .add_binding(
            Binding::builder::<Greeter, ()>()
                .tag("en")
                .overridable(true)
                .to_value(Greeter {
                    greeting: "placeholder".to_string(),
                })
                .build(),
        )
        .unwrap();
    context
        .add_module(
            ModuleInfo::new("greeting", "1.0").with_binding(
                DeclaredBinding::new("Greeter", BindableKind::Provider, "hello").tagged("en"),
            ),
        )
        .unwrap();
    context.freeze().unwrap();

    let greeter = context.resolve::<Greeter, ()>("en", &(), false).unwrap();
    assert_eq!(greeter.greeting, "hello");
}

#[test]
fn test_failed_freeze_rolls_back_partial_load() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut context = greeting_context(&calls);
    context
        .add_module(
            ModuleInfo::new("first", "1.0").with_binding(
                DeclaredBinding::new("Greeter", BindableKind::Singleton, "hello").allow_new(),
            ),
        )
        .unwrap();
    context
        .add_module(
            ModuleInfo::new("second", "1.0")
                .depends_on("first", "1.0")
                .with_entry("missing::Entry"),
        )
        .unwrap();

    let err = context.freeze().unwrap_err();
    assert!(matches!(
        failures_of(&err)[0],
        ModuleError::ModuleDataConstructionFailure { .. }
    ));
    assert!(context.modules().is_empty());
    assert!(context.bindings().is_empty());

    let retry = context.freeze().unwrap_err();
    assert!(retry.is_module());
}

// Directory and archive modules

fn write_directory_module(root: &Path) {
    let module_dir = root.join("icons");
    fs::create_dir_all(module_dir.join("res").join("ui")).unwrap();
    fs::write(
        module_dir.join("module.yaml"),
        "name: icons\nauthor: [Ada, Grace]\nversion: '1.0'\nassets: res\n",
    )
    .unwrap();
    fs::write(module_dir.join("res").join("ui").join("close.svg"), "<svg/>").unwrap();
    fs::write(
        module_dir.join("res").join("ui").join("close.svg.meta"),
        r#"{"size": 16}"#,
    )
    .unwrap();
}

fn write_archive_module(root: &Path) {
    let mut writer = ZipWriter::new(File::create(root.join("sounds.zip")).unwrap());
    let options = FileOptions::default();
    writer.start_file("module.json", options).unwrap();
    writer
        .write_all(
            br#"{"name": "sounds", "author": "Linus", "version": "2.0", "assets": "assets",
                 "dependencies": [{"name": "icons", "version": "1.0"}]}"#,
        )
        .unwrap();
    writer
        .start_file("assets/default/beep.txt", options)
        .unwrap();
    writer.write_all(b"beep").unwrap();
    writer.finish().unwrap();
}

#[test]
fn test_scanned_directory_and_archive_modules_serve_assets() {
    let root = TempDir::new().unwrap();
    write_directory_module(root.path());
    write_archive_module(root.path());

    let mut context = Context::new("root");
    context.add_module_path(root.path()).unwrap();
    context.freeze().unwrap();

    let names: Vec<&str> = context.modules().iter().map(Module::name).collect();
    assert_eq!(names, vec!["icons", "sounds"]);
    assert!(matches!(
        context.module("icons").unwrap().info().source,
        ModuleSource::Directory(_)
    ));
    assert!(matches!(
        context.module("sounds").unwrap().data(),
        ModuleData::Archive(_)
    ));

    let assets = context.assets();
    assert_eq!(assets.as_string("ui:close.svg").unwrap(), "<svg/>");
    assert_eq!(assets.metadata("ui:close.svg").unwrap()["size"], 16);
    assert_eq!(assets.as_bytes("beep.txt").unwrap(), b"beep");
    assert!(!assets.exists("ui:open.svg"));
}

#[test]
fn test_module_filter_excludes_modules() {
    let root = TempDir::new().unwrap();
    write_directory_module(root.path());
    write_archive_module(root.path());

    let mut context = Context::new("root");
    context.add_module_path(root.path()).unwrap();
    context
        .set_module_filter(|info: &ModuleInfo| info.name != "sounds")
        .unwrap();
    context.freeze().unwrap();

    assert_eq!(context.modules().len(), 1);
    assert!(context.module("sounds").is_none());
}

#[test]
fn test_child_assets_fall_back_to_parent() {
    let root_dir = TempDir::new().unwrap();
    write_directory_module(root_dir.path());

    let mut root = Context::new("root");
    root.add_module_path(root_dir.path().join("icons")).unwrap();
    root.freeze().unwrap();

    let mut child = Context::with_parent("child", Arc::new(root));
    child.freeze().unwrap();
    assert_eq!(child.assets().as_string("ui:close.svg").unwrap(), "<svg/>");
}

#[test]
fn test_module_registration_after_freeze_fails() {
    let mut context = Context::new("root");
    context.freeze().unwrap();

    assert!(context.add_module(module("late", &[])).unwrap_err().is_already_frozen());
    assert!(context.add_module_path("/tmp").unwrap_err().is_already_frozen());
    assert!(context.code_registry_mut().unwrap_err().is_already_frozen());
    assert!(context.freeze().unwrap_err().is_already_frozen());
}

#[test]
fn test_context_from_config_scans_configured_paths() {
    let root = TempDir::new().unwrap();
    write_directory_module(root.path());

    let config = RuntimeConfig::new().with_module_path(root.path());
    let mut context = Context::from_config(&config).unwrap();
    assert_eq!(context.name(), "root");
    context.freeze().unwrap();

    assert_eq!(context.modules().len(), 1);
    assert!(context.assets().exists("ui:close.svg"));
}
