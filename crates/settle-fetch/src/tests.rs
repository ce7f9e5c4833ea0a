use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use anyhow::anyhow;
use settle_core::*;

use crate::*;

/// Hands out pending operations and keeps their resolvers for the test to settle.
#[derive(Default)]
struct ManualTransport {
    started: RefCell<Vec<String>>,
    resolvers: RefCell<HashMap<String, Resolver<String>>>,
}

impl ManualTransport {
    fn complete(&self, url: &str) {
        let resolver = self.resolvers.borrow_mut().remove(url);
        if let Some(r) = resolver {
            r.resolve(format!("body of {url}"));
        }
    }

    fn fail(&self, url: &str) {
        let resolver = self.resolvers.borrow_mut().remove(url);
        if let Some(r) = resolver {
            r.reject(OperationError::failed("connection reset"));
        }
    }
}

impl Transport for ManualTransport {
    type Response = String;

    fn start(&self, url: &str) -> Operation<String> {
        let (op, resolver) = Operation::pending();
        self.started.borrow_mut().push(url.to_string());
        self.resolvers.borrow_mut().insert(url.to_string(), resolver);
        op
    }
}

fn setup() -> (
    Rc<FnTarget>,
    Rc<Cell<u32>>,
    Rc<ManualTransport>,
    DataSource<Rc<ManualTransport>>,
) {
    let _ = env_logger::builder().is_test(true).try_init();
    let count = Rc::new(Cell::new(0));
    let c = count.clone();
    let comp = FnTarget::new(move || c.set(c.get() + 1));
    let root: Target = comp.clone();
    let transport = Rc::new(ManualTransport::default());
    let scheduler = RefreshScheduler::init(InitOptions::default());
    let source = DataSource::new(scheduler, transport.clone(), Some(&root));
    (comp, count, transport, source)
}

#[test]
fn test_fetch_refreshes_root_after_response() -> anyhow::Result<()> {
    let (_comp, count, transport, source) = setup();

    let op = source.fetch("/inbox").ok_or_else(|| anyhow!("fetch not started"))?;
    assert!(source.in_flight("/inbox"));
    assert_eq!(count.get(), 0);

    transport.complete("/inbox");
    assert!(op.is_settled());
    assert!(!source.in_flight("/inbox"));
    assert_eq!(count.get(), 1);
    Ok(())
}

#[test]
fn test_fetch_same_url_in_flight_is_refused() {
    let (_comp, count, transport, source) = setup();

    assert!(source.fetch("/inbox").is_some());
    assert!(source.fetch("/inbox").is_none());
    assert_eq!(transport.started.borrow().len(), 1);

    transport.complete("/inbox");
    assert_eq!(count.get(), 1);

    // free again once settled
    assert!(source.fetch("/inbox").is_some());
}

#[test]
fn test_fetch_empty_url_is_refused() {
    let (_comp, _count, transport, source) = setup();
    assert!(source.fetch("").is_none());
    assert!(transport.started.borrow().is_empty());
}

#[test]
fn test_different_urls_refresh_once_after_both() {
    let (_comp, count, transport, source) = setup();
    source.fetch("/inbox");
    source.fetch("/contacts");
    assert_eq!(source.in_flight_count(), 2);

    transport.complete("/contacts");
    assert_eq!(count.get(), 0);

    source.refresh();
    assert_eq!(count.get(), 0);

    transport.complete("/inbox");
    assert_eq!(count.get(), 1);
}

#[test]
fn test_callback_runs_before_refresh() {
    let (_comp, count, transport, source) = setup();
    let seen_at_refresh = Rc::new(Cell::new(u32::MAX));

    let still_in_flight = Rc::new(Cell::new(false));

    let s = seen_at_refresh.clone();
    let c = count.clone();
    let flag = still_in_flight.clone();
    let table = source.in_flight_table().clone();
    source.fetch_with("/inbox", move |outcome| {
        assert_eq!(outcome.as_deref(), Ok("body of /inbox"));
        s.set(c.get());
        flag.set(table.contains("/inbox"));
    });

    transport.complete("/inbox");
    assert_eq!(seen_at_refresh.get(), 0);
    assert!(still_in_flight.get());
    assert!(!source.in_flight("/inbox"));
    assert_eq!(count.get(), 1);
}

#[test]
fn test_shared_in_flight_suppresses_across_sources() {
    let (comp, count, transport, inbox) = setup();
    let root: Target = comp.clone();
    let sidebar = DataSource::with_in_flight(
        inbox.scheduler().clone(),
        transport.clone(),
        Some(&root),
        inbox.in_flight_table().clone(),
    );

    assert!(inbox.fetch("/inbox").is_some());
    assert!(sidebar.fetch("/inbox").is_none());
    assert!(sidebar.in_flight("/inbox"));
    assert_eq!(transport.started.borrow().len(), 1);

    transport.complete("/inbox");
    assert_eq!(count.get(), 1);
    assert!(sidebar.in_flight_table().is_empty());
    assert!(sidebar.fetch("/inbox").is_some());
}

#[test]
fn test_separate_sources_track_urls_independently() {
    let (_comp, _count, transport, inbox) = setup();
    let other = DataSource::new(inbox.scheduler().clone(), transport.clone(), None);

    assert!(inbox.fetch("/inbox").is_some());
    assert!(other.fetch("/inbox").is_some());
    assert_eq!(transport.started.borrow().len(), 2);
}

#[test]
fn test_failed_fetch_still_refreshes_and_frees_url() {
    let (_comp, count, transport, source) = setup();
    source.fetch("/inbox");

    transport.fail("/inbox");
    assert_eq!(count.get(), 1);
    assert!(!source.in_flight("/inbox"));
    assert_eq!(source.scheduler().stats().failed_operations, 1);
}

#[test]
fn test_unbound_source_refreshes_default_target() {
    let count = Rc::new(Cell::new(0));
    let c = count.clone();
    let comp = FnTarget::new(move || c.set(c.get() + 1));
    let root: Target = comp.clone();
    let scheduler = RefreshScheduler::init(InitOptions {
        default_target: Some(root),
    });
    let transport = Rc::new(ManualTransport::default());
    let source = DataSource::new(scheduler, transport.clone(), None);

    source.fetch("/inbox");
    transport.complete("/inbox");
    assert_eq!(count.get(), 1);
}

#[test]
fn test_dropped_root_is_never_refreshed() {
    let (comp, count, transport, source) = setup();
    drop(comp);

    source.fetch("/inbox");
    transport.complete("/inbox");
    source.refresh();
    assert_eq!(count.get(), 0);
}
