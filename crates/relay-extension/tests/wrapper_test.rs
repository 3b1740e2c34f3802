//! Wrapper layering:
//! - application order (lower `order` outermost)
//! - matches/mismatches filtering applied per extension name
//! - raw instances bypass the chain and live in their own cache

mod common;

use std::sync::Arc;

use common::TestSpace;
use relay_extension::{
    extension_point, Extension, ExtensionScope, ProviderDescriptor,
};

pub trait Channel: Extension {
    /// Outermost-first chain of layer labels, ending at the core.
    fn chain(&self) -> Vec<&'static str>;
}

extension_point! {
    dyn Channel {
        name: "relay.test.wrapper.Channel",
        scope: ExtensionScope::Framework,
    }
}

struct PlainChannel;
impl Extension for PlainChannel {}
impl Channel for PlainChannel {
    fn chain(&self) -> Vec<&'static str> {
        vec!["x"]
    }
}

struct TraceChannel {
    inner: Arc<dyn Channel>,
}
impl Extension for TraceChannel {}
impl Channel for TraceChannel {
    fn chain(&self) -> Vec<&'static str> {
        let mut chain = vec!["trace"];
        chain.extend(self.inner.chain());
        chain
    }
}

struct RetryChannel {
    inner: Arc<dyn Channel>,
}
impl Extension for RetryChannel {}
impl Channel for RetryChannel {
    fn chain(&self) -> Vec<&'static str> {
        let mut chain = vec!["retry"];
        chain.extend(self.inner.chain());
        chain
    }
}

fn register_base(space: &TestSpace) {
    space.catalog.register::<dyn Channel>(ProviderDescriptor::<dyn Channel>::named(
        "demo::chan::PlainChannel",
        |_ctx| Ok(Box::new(PlainChannel) as Box<dyn Channel>),
    ));
}

fn register_trace(space: &TestSpace, descriptor: ProviderDescriptor<dyn Channel>) {
    space.catalog.register::<dyn Channel>(descriptor);
}

fn trace_wrapper() -> ProviderDescriptor<dyn Channel> {
    ProviderDescriptor::wrapper("demo::chan::TraceChannel", |inner, _ctx| {
        Ok(Box::new(TraceChannel { inner }) as Box<dyn Channel>)
    })
    .with_order(1)
}

fn retry_wrapper() -> ProviderDescriptor<dyn Channel> {
    ProviderDescriptor::wrapper("demo::chan::RetryChannel", |inner, _ctx| {
        Ok(Box::new(RetryChannel { inner }) as Box<dyn Channel>)
    })
    .with_order(2)
}

const FILE: &str = "relay.test.wrapper.Channel";
const LINES: &str =
    "x=demo::chan::PlainChannel\ndemo::chan::TraceChannel\ndemo::chan::RetryChannel\n";

#[test]
fn test_lower_order_wraps_outermost() {
    let space = TestSpace::new();
    register_base(&space);
    register_trace(&space, trace_wrapper());
    space.catalog.register::<dyn Channel>(retry_wrapper());
    space.write_spi(FILE, LINES);

    let director = space.framework_director();
    let loader = director.loader::<dyn Channel>().unwrap();

    let wrapped = loader.get("x").unwrap();
    assert_eq!(wrapped.chain(), ["trace", "retry", "x"]);
}

#[test]
fn test_mismatch_filter_omits_wrapper() {
    let space = TestSpace::new();
    register_base(&space);
    register_trace(&space, trace_wrapper().with_mismatches(["x"]));
    space.catalog.register::<dyn Channel>(retry_wrapper());
    space.write_spi(FILE, LINES);

    let director = space.framework_director();
    let loader = director.loader::<dyn Channel>().unwrap();

    let wrapped = loader.get("x").unwrap();
    assert_eq!(wrapped.chain(), ["retry", "x"]);
}

#[test]
fn test_matches_filter_restricts_wrapper() {
    let space = TestSpace::new();
    register_base(&space);
    register_trace(&space, trace_wrapper().with_matches(["other"]));
    space.catalog.register::<dyn Channel>(retry_wrapper());
    space.write_spi(FILE, LINES);

    let director = space.framework_director();
    let loader = director.loader::<dyn Channel>().unwrap();

    let wrapped = loader.get("x").unwrap();
    assert_eq!(wrapped.chain(), ["retry", "x"]);
}

#[test]
fn test_raw_instance_bypasses_wrappers() {
    let space = TestSpace::new();
    register_base(&space);
    register_trace(&space, trace_wrapper());
    space.catalog.register::<dyn Channel>(retry_wrapper());
    space.write_spi(FILE, LINES);

    let director = space.framework_director();
    let loader = director.loader::<dyn Channel>().unwrap();

    // Build the raw instance first: the wrapped cell must stay empty.
    let raw = loader.get_with("x", false).unwrap();
    assert_eq!(raw.chain(), ["x"]);
    assert!(loader.get_loaded("x").is_none());

    let wrapped = loader.get("x").unwrap();
    assert_eq!(wrapped.chain(), ["trace", "retry", "x"]);
    assert!(!Arc::ptr_eq(&raw, &wrapped));

    // Both caches are populated independently now.
    let raw_again = loader.get_with("x", false).unwrap();
    assert!(Arc::ptr_eq(&raw, &raw_again));
}
