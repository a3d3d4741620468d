//! Integration tests for event delivery across a context tree.

use std::sync::{Arc, Mutex};

use komoinen_core::events::{EventBus, Handlers, Listener, ListenerRegistrationEvent};
use komoinen_core::{Context, CoreError, Event, EventError};

#[derive(Debug)]
struct Deploy {
    target: String,
    visits: Vec<String>,
}

impl Event for Deploy {}

fn deploy(target: &str) -> Deploy {
    Deploy {
        target: target.to_string(),
        visits: Vec::new(),
    }
}

/// Appends its name to every deploy it sees
struct Stage {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl Stage {
    fn new(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            log: Arc::clone(log),
        })
    }
}

impl Listener for Stage {
    fn handlers(&self, handlers: &mut Handlers<Self>) {
        handlers.on(|me: &Self, _: &EventBus, event: &mut Deploy| {
            event.visits.push(me.name.to_string());
            me.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", me.name, event.target));
            Ok(())
        });
    }
}

/// Fails every deploy to the given target
struct Gate {
    blocked: &'static str,
}

impl Listener for Gate {
    fn handlers(&self, handlers: &mut Handlers<Self>) {
        handlers.on(|me: &Self, _: &EventBus, event: &mut Deploy| {
            if event.target == me.blocked {
                return Err(format!("{} is closed", event.target).into());
            }
            Ok(())
        });
    }
}

/// Counts listener registrations anywhere below it
#[derive(Default)]
struct RegistrationAudit {
    seen: Mutex<Vec<String>>,
}

impl Listener for RegistrationAudit {
    fn handlers(&self, handlers: &mut Handlers<Self>) {
        handlers.on(
            |me: &Self, _: &EventBus, event: &mut ListenerRegistrationEvent| {
                me.seen
                    .lock()
                    .unwrap()
                    .push(format!("{}:{}", event.context, event.handlers));
                Ok(())
            },
        );
    }
}

fn event_failure(err: CoreError) -> EventError {
    match err {
        CoreError::Event(err) => err,
        other => panic!("expected an event error, got {:?}", other),
    }
}

#[test]
fn test_parent_listeners_run_before_child_listeners() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut root = Context::new("root");
    root.register_event::<Deploy>("deploy").unwrap();
    let root_stage = Stage::new("root", &log);
    root.register_listener(&root_stage, None).unwrap();
    root.freeze().unwrap();

    let mut child = Context::with_parent("child", Arc::new(root));
    assert!(child.events().has_event::<Deploy>());
    let child_stage = Stage::new("child", &log);
    child.register_listener(&child_stage, None).unwrap();
    child.freeze().unwrap();

    let delivered = child.fire_event(deploy("staging"), true).unwrap();
    assert_eq!(delivered.visits, vec!["root", "child"]);

    let local = child.fire_event(deploy("dev"), false).unwrap();
    assert_eq!(local.visits, vec!["child"]);

    assert_eq!(
        *log.lock().unwrap(),
        vec!["root:staging", "child:staging", "child:dev"]
    );
}

#[test]
fn test_child_event_types_stay_local() {
    let mut root = Context::new("root");
    root.freeze().unwrap();
    let root = Arc::new(root);

    let mut child = Context::with_parent("child", Arc::clone(&root));
    child.register_event::<Deploy>("deploy").unwrap();
    assert!(!child.register_event::<Deploy>("deploy").unwrap());
    child.freeze().unwrap();

    assert!(!root.events().has_event::<Deploy>());
    assert!(matches!(
        root.fire_event(deploy("x"), true),
        Err(EventError::UnknownEventType { .. })
    ));

    // The root does not know the type, which is not an error when escalating
    let delivered = child.fire_event(deploy("x"), true).unwrap();
    assert!(delivered.visits.is_empty());
}

#[test]
fn test_veto_blocks_delivery_at_every_level() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut root = Context::new("root");
    root.register_event_with_veto::<Deploy, _>("deploy", |event: &Deploy| {
        event.target != "prod"
    })
    .unwrap();
    let stage = Stage::new("root", &log);
    root.register_listener(&stage, None).unwrap();
    root.freeze().unwrap();

    let mut child = Context::with_parent("child", Arc::new(root));
    let child_stage = Stage::new("child", &log);
    child.register_listener(&child_stage, None).unwrap();
    child.freeze().unwrap();

    let blocked = child.fire_event(deploy("prod"), true).unwrap();
    assert!(blocked.visits.is_empty());

    let delivered = child.fire_event(deploy("qa"), true).unwrap();
    assert_eq!(delivered.visits, vec!["root", "child"]);
}

#[test]
fn test_failures_from_all_levels_are_aggregated() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut root = Context::new("root");
    root.register_event::<Deploy>("deploy").unwrap();
    let root_gate = Arc::new(Gate { blocked: "prod" });
    root.register_listener(&root_gate, None).unwrap();
    root.freeze().unwrap();

    let mut child = Context::with_parent("child", Arc::new(root));
    let child_gate = Arc::new(Gate { blocked: "prod" });
    let stage = Stage::new("child", &log);
    child.register_listener(&child_gate, None).unwrap();
    child.register_listener(&stage, None).unwrap();
    child.freeze().unwrap();

    let err = child.fire_event(deploy("prod"), true).unwrap_err();
    let failures = err.failures();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].context, "root");
    assert_eq!(failures[1].context, "child");
    assert!(failures[0].message.contains("prod is closed"));

    // Failing listeners do not stop the rest
    assert_eq!(*log.lock().unwrap(), vec!["child:prod"]);
}

#[test]
fn test_registration_event_reaches_ancestors() {
    let audit = Arc::new(RegistrationAudit::default());

    let mut root = Context::new("root");
    root.register_event::<Deploy>("deploy").unwrap();
    root.register_listener(&audit, None).unwrap();
    root.freeze().unwrap();

    let mut child = Context::with_parent("child", Arc::new(root));
    let log = Arc::new(Mutex::new(Vec::new()));
    child
        .register_listener(&Stage::new("child", &log), None)
        .unwrap();

    // The audit is attached only after its own registration event fired
    let seen = audit.seen.lock().unwrap().clone();
    assert_eq!(seen, vec!["child:1"]);
}

#[test]
fn test_refused_registration_on_frozen_child_is_not_announced() {
    let audit = Arc::new(RegistrationAudit::default());

    let mut root = Context::new("root");
    root.register_listener(&audit, None).unwrap();
    root.freeze().unwrap();

    let mut child = Context::with_parent("child", Arc::new(root));
    child.freeze().unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let err = event_failure(
        child
            .register_listener(&Stage::new("late", &log), None)
            .unwrap_err(),
    );
    assert!(matches!(err, EventError::AlreadyFrozen { .. }));
    assert!(audit.seen.lock().unwrap().is_empty());
}

#[test]
fn test_registration_can_be_refused_by_an_ancestor() {
    struct Bouncer;

    impl Listener for Bouncer {
        fn handlers(&self, handlers: &mut Handlers<Self>) {
            handlers.on(
                |_: &Self, _: &EventBus, event: &mut ListenerRegistrationEvent| {
                    if event.context == "child" {
                        return Err("no listeners in child".into());
                    }
                    Ok(())
                },
            );
        }
    }

    let mut root = Context::new("root");
    root.register_event::<Deploy>("deploy").unwrap();
    root.register_listener(&Arc::new(Bouncer), None).unwrap();
    root.freeze().unwrap();

    let child = Context::with_parent("child", Arc::new(root));
    let log = Arc::new(Mutex::new(Vec::new()));
    let stage = Stage::new("child", &log);
    let err = event_failure(child.register_listener(&stage, None).unwrap_err());
    assert!(matches!(err, EventError::ListenerFailures { .. }));
    assert_eq!(child.events().event_type::<Deploy>().unwrap().listener_count(), 0);
}

#[test]
fn test_frozen_context_refuses_event_and_listener_registration() {
    let mut root = Context::new("root");
    root.register_event::<Deploy>("deploy").unwrap();
    root.freeze().unwrap();

    assert!(root
        .register_event::<Deploy>("deploy")
        .unwrap_err()
        .is_already_frozen());

    let log = Arc::new(Mutex::new(Vec::new()));
    let err = root
        .register_listener(&Stage::new("late", &log), None)
        .unwrap_err();
    assert!(err.is_already_frozen());
}

#[test]
fn test_dropped_listener_is_no_longer_called() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut root = Context::new("root");
    root.register_event::<Deploy>("deploy").unwrap();
    let stage = Stage::new("root", &log);
    root.register_listener(&stage, None).unwrap();
    root.freeze().unwrap();

    drop(stage);
    let delivered = root.fire_event(deploy("qa"), false).unwrap();
    assert!(delivered.visits.is_empty());
    assert_eq!(root.events().event_type::<Deploy>().unwrap().listener_count(), 0);
}
