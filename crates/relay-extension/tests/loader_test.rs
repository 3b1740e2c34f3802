//! Loader behavior against real discovery files:
//! - default extension and supported names
//! - comma aliases sharing one instance
//! - single build under concurrent access
//! - raw (un-wrapped) isolation
//! - ambiguous registration and aggregated not-found causes
//! - programmatic add/replace

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use common::TestSpace;
use relay_extension::{
    extension_point, Extension, ExtensionError, ExtensionScope, ProviderDescriptor,
};

pub trait Speaker: Extension + std::fmt::Debug {
    fn speak(&self) -> String;
}

extension_point! {
    dyn Speaker {
        name: "relay.test.loader.Speaker",
        scope: ExtensionScope::Framework,
        default: "plain",
    }
}

#[derive(Debug)]
struct PlainSpeaker;
impl Extension for PlainSpeaker {}
impl Speaker for PlainSpeaker {
    fn speak(&self) -> String {
        "plain".to_string()
    }
}

#[derive(Debug)]
struct LoudSpeaker;
impl Extension for LoudSpeaker {}
impl Speaker for LoudSpeaker {
    fn speak(&self) -> String {
        "LOUD".to_string()
    }
}

fn register_speakers(space: &TestSpace) -> Arc<AtomicUsize> {
    let plain_builds = Arc::new(AtomicUsize::new(0));
    let counter = plain_builds.clone();
    space.catalog.register::<dyn Speaker>(ProviderDescriptor::<dyn Speaker>::named(
        "demo::speak::PlainSpeaker",
        move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(PlainSpeaker) as Box<dyn Speaker>)
        },
    ));
    space.catalog.register::<dyn Speaker>(ProviderDescriptor::<dyn Speaker>::named(
        "demo::speak::LoudSpeaker",
        |_ctx| Ok(Box::new(LoudSpeaker) as Box<dyn Speaker>),
    ));
    plain_builds
}

#[test]
fn test_default_extension_and_supported_names() {
    let space = TestSpace::new();
    register_speakers(&space);
    space.write_spi(
        "relay.test.loader.Speaker",
        "plain=demo::speak::PlainSpeaker\nloud=demo::speak::LoudSpeaker\n",
    );

    let director = space.framework_director();
    let loader = director.loader::<dyn Speaker>().unwrap();

    let default = loader.get_default().unwrap().expect("default extension");
    assert_eq!(default.speak(), "plain");
    assert_eq!(loader.default_name().unwrap().as_deref(), Some("plain"));

    let names: Vec<String> = loader.supported_names().unwrap().into_iter().collect();
    assert_eq!(names, ["loud", "plain"]);

    // The literal name "true" resolves to the default extension.
    let by_true = loader.get("true").unwrap();
    assert!(Arc::ptr_eq(&default, &by_true));
}

#[test]
fn test_comma_alias_shares_one_instance() {
    let space = TestSpace::new();
    register_speakers(&space);
    space.write_spi(
        "relay.test.loader.Speaker",
        "alpha,a=demo::speak::PlainSpeaker\n",
    );

    let director = space.framework_director();
    let loader = director.loader::<dyn Speaker>().unwrap();

    let alpha = loader.get("alpha").unwrap();
    let a = loader.get("a").unwrap();
    assert!(Arc::ptr_eq(&alpha, &a));
    assert_eq!(loader.extension_name("demo::speak::PlainSpeaker").unwrap().as_deref(), Some("alpha"));
}

#[test]
fn test_concurrent_get_builds_once() {
    let space = TestSpace::new();
    let plain_builds = register_speakers(&space);
    space.write_spi(
        "relay.test.loader.Speaker",
        "plain=demo::speak::PlainSpeaker\n",
    );

    let director = space.framework_director();
    let loader = director.loader::<dyn Speaker>().unwrap();

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let mut instances = Vec::new();
    std::thread::scope(|scope| {
        let mut handles = Vec::new();
        for _ in 0..threads {
            let loader = loader.clone();
            let barrier = barrier.clone();
            handles.push(scope.spawn(move || {
                barrier.wait();
                loader.get("plain").unwrap()
            }));
        }
        for handle in handles {
            instances.push(handle.join().expect("worker thread"));
        }
    });

    assert_eq!(plain_builds.load(Ordering::SeqCst), 1);
    for instance in &instances {
        assert!(Arc::ptr_eq(instance, &instances[0]));
    }
}

#[test]
fn test_missing_name_lists_scan_causes() {
    let space = TestSpace::new();
    register_speakers(&space);
    space.write_spi(
        "relay.test.loader.Speaker",
        "plain=demo::speak::PlainSpeaker\nghost=demo::speak::GhostSpeaker\n",
    );

    let director = space.framework_director();
    let loader = director.loader::<dyn Speaker>().unwrap();

    let err = loader.get("ghost").unwrap_err();
    match &err {
        ExtensionError::NotFound { name, causes, .. } => {
            assert_eq!(name, "ghost");
            assert_eq!(causes.len(), 1);
            assert!(causes[0].contains("demo::speak::GhostSpeaker"));
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn test_duplicate_name_is_ambiguous() {
    let space = TestSpace::new();
    register_speakers(&space);
    space.write_spi(
        "relay.test.loader.Speaker",
        "y=demo::speak::PlainSpeaker\ny=demo::speak::LoudSpeaker\n",
    );

    let director = space.framework_director();
    let loader = director.loader::<dyn Speaker>().unwrap();

    let err = loader.get("y").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("demo::speak::PlainSpeaker"), "{message}");
    assert!(message.contains("demo::speak::LoudSpeaker"), "{message}");
}

#[test]
fn test_empty_name_rejected() {
    let space = TestSpace::new();
    let director = space.framework_director();
    let loader = director.loader::<dyn Speaker>().unwrap();

    assert!(matches!(
        loader.get("  "),
        Err(ExtensionError::InvalidArgument { .. })
    ));
}

#[test]
fn test_loaded_peeks_do_not_build() {
    let space = TestSpace::new();
    let plain_builds = register_speakers(&space);
    space.write_spi(
        "relay.test.loader.Speaker",
        "plain=demo::speak::PlainSpeaker\n",
    );

    let director = space.framework_director();
    let loader = director.loader::<dyn Speaker>().unwrap();

    assert!(loader.get_loaded("plain").is_none());
    assert!(loader.loaded_names().is_empty());
    assert_eq!(plain_builds.load(Ordering::SeqCst), 0);

    let built = loader.get("plain").unwrap();
    let peeked = loader.get_loaded("plain").expect("instance is loaded now");
    assert!(Arc::ptr_eq(&built, &peeked));
    assert_eq!(loader.loaded_names().len(), 1);
}

#[test]
fn test_programmatic_add_and_replace() {
    let space = TestSpace::new();
    register_speakers(&space);
    space.write_spi(
        "relay.test.loader.Speaker",
        "plain=demo::speak::PlainSpeaker\n",
    );

    let director = space.framework_director();
    let loader = director.loader::<dyn Speaker>().unwrap();

    loader
        .add(
            "loud",
            ProviderDescriptor::<dyn Speaker>::named("demo::speak::LoudSpeaker", |_ctx| {
                Ok(Box::new(LoudSpeaker) as Box<dyn Speaker>)
            }),
        )
        .unwrap();
    assert_eq!(loader.get("loud").unwrap().speak(), "LOUD");

    // Occupied name is rejected.
    let err = loader
        .add(
            "loud",
            ProviderDescriptor::<dyn Speaker>::named("demo::speak::Other", |_ctx| Ok(Box::new(LoudSpeaker) as Box<dyn Speaker>)),
        )
        .unwrap_err();
    assert!(matches!(err, ExtensionError::Ambiguous { .. }));

    // Replace swaps the provider and drops the cached instance.
    let before = loader.get("plain").unwrap();
    loader
        .replace(
            "plain",
            ProviderDescriptor::<dyn Speaker>::named("demo::speak::LoudSpeaker2", |_ctx| {
                Ok(Box::new(LoudSpeaker) as Box<dyn Speaker>)
            }),
        )
        .unwrap();
    let after = loader.get("plain").unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(after.speak(), "LOUD");

    // Replacing an unknown name fails.
    assert!(loader
        .replace(
            "absent",
            ProviderDescriptor::<dyn Speaker>::named("demo::speak::X", |_ctx| Ok(Box::new(LoudSpeaker) as Box<dyn Speaker>))
        )
        .is_err());
}

#[test]
fn test_get_or_default_falls_back() {
    let space = TestSpace::new();
    register_speakers(&space);
    space.write_spi(
        "relay.test.loader.Speaker",
        "plain=demo::speak::PlainSpeaker\n",
    );

    let director = space.framework_director();
    let loader = director.loader::<dyn Speaker>().unwrap();

    assert_eq!(loader.get_or_default("plain").unwrap().speak(), "plain");
    assert_eq!(loader.get_or_default("nope").unwrap().speak(), "plain");
}
