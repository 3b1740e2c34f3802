//! Wiring and post-processing:
//! - the `spi` injector serves the adaptive instance of a collaborator point
//! - wiring failures are swallowed; the instance still builds
//! - post-processors run before and after initialisation

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::TestSpace;
use relay_extension::{
    extension_point, Extension, ExtensionError, ExtensionPostProcessor, ExtensionScope,
    ProviderDescriptor, Result, WireContext,
};

pub trait Clock: Extension {
    fn now(&self) -> u64;
}

extension_point! {
    dyn Clock {
        name: "relay.test.inject.Clock",
        scope: ExtensionScope::Framework,
    }
}

struct FixedClock;
impl Extension for FixedClock {}
impl Clock for FixedClock {
    fn now(&self) -> u64 {
        42
    }
}

pub trait Reporter: Extension {
    fn timestamp(&self) -> Option<u64>;
}

extension_point! {
    dyn Reporter {
        name: "relay.test.inject.Reporter",
        scope: ExtensionScope::Framework,
    }
}

struct MainReporter {
    clock: Option<Arc<dyn Clock>>,
}

impl Extension for MainReporter {
    fn wire(&mut self, ctx: &WireContext) -> Result<()> {
        self.clock = ctx.instance::<dyn Clock>("clock");
        Ok(())
    }
}

impl Reporter for MainReporter {
    fn timestamp(&self) -> Option<u64> {
        self.clock.as_ref().map(|clock| clock.now())
    }
}

struct SulkyReporter;

impl Extension for SulkyReporter {
    fn wire(&mut self, _ctx: &WireContext) -> Result<()> {
        Err(ExtensionError::Internal("refusing to be wired".to_string()))
    }
}

impl Reporter for SulkyReporter {
    fn timestamp(&self) -> Option<u64> {
        None
    }
}

fn inject_space() -> TestSpace {
    let space = TestSpace::new();
    space.catalog.register::<dyn Clock>(ProviderDescriptor::<dyn Clock>::adaptive(
        "demo::clock::AdaptiveClock",
        |_ctx| Ok(Box::new(FixedClock) as Box<dyn Clock>),
    ));
    space.catalog.register::<dyn Reporter>(ProviderDescriptor::<dyn Reporter>::named(
        "demo::report::MainReporter",
        |_ctx| Ok(Box::new(MainReporter { clock: None }) as Box<dyn Reporter>),
    ));
    space.catalog.register::<dyn Reporter>(ProviderDescriptor::<dyn Reporter>::named(
        "demo::report::SulkyReporter",
        |_ctx| Ok(Box::new(SulkyReporter) as Box<dyn Reporter>),
    ));
    space.write_spi("relay.test.inject.Clock", "demo::clock::AdaptiveClock\n");
    space.write_spi(
        "relay.test.inject.Reporter",
        "main=demo::report::MainReporter\nsulky=demo::report::SulkyReporter\n",
    );
    space
}

#[test]
fn test_spi_injector_wires_adaptive_collaborator() {
    let space = inject_space();
    let director = space.framework_director();
    let loader = director.loader::<dyn Reporter>().unwrap();

    let reporter = loader.get("main").unwrap();
    assert_eq!(reporter.timestamp(), Some(42));

    // The injected reference is the collaborator's adaptive singleton.
    let clock = director.adaptive_extension::<dyn Clock>().unwrap();
    assert_eq!(clock.now(), 42);
}

#[test]
fn test_wiring_failure_is_swallowed() {
    let space = inject_space();
    let director = space.framework_director();
    let loader = director.loader::<dyn Reporter>().unwrap();

    let reporter = loader.get("sulky").unwrap();
    assert_eq!(reporter.timestamp(), None);
}

#[test]
fn test_post_processors_run_in_order() {
    struct CountingProcessor {
        before: AtomicUsize,
        after: AtomicUsize,
    }

    impl ExtensionPostProcessor for CountingProcessor {
        fn before_init(&self, _instance: &mut dyn Extension, _name: Option<&str>) -> Result<()> {
            self.before.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn after_init(&self, _instance: &mut dyn Extension, _name: Option<&str>) -> Result<()> {
            self.after.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let space = inject_space();
    let director = space.framework_director();
    let processor = Arc::new(CountingProcessor {
        before: AtomicUsize::new(0),
        after: AtomicUsize::new(0),
    });
    director.add_post_processor(processor.clone());

    let loader = director.loader::<dyn Reporter>().unwrap();
    loader.get("main").unwrap();

    // Hooks ran at least for the reporter itself; wiring may have built
    // injector instances through the same pipeline.
    assert!(processor.before.load(Ordering::SeqCst) >= 1);
    assert!(processor.after.load(Ordering::SeqCst) >= processor.before.load(Ordering::SeqCst));
}
