//! # Data sources
//!
//! A `DataSource` is what view code talks to when it needs remote data. It
//! is bound to a root target and a [`RefreshScheduler`], starts requests
//! through a [`Transport`], and makes sure the root is refreshed once the
//! requests it started have all come back.
//!
//! ```rust
//! use settle_core::*;
//! use settle_fetch::*;
//!
//! struct Echo;
//! impl Transport for Echo {
//!     type Response = String;
//!     fn start(&self, url: &str) -> Operation<String> {
//!         Operation::resolved(format!("body of {url}"))
//!     }
//! }
//!
//! let scheduler = RefreshScheduler::init(InitOptions::default());
//! let source = DataSource::new(scheduler, Echo, None);
//! assert!(source.fetch("/inbox").is_some());
//! ```

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::{Rc, Weak};

use settle_core::{Operation, Outcome, Refreshable, RefreshScheduler, Target};

/// Starts requests. The returned operation must eventually settle (or have
/// its resolver dropped) for the owning target to refresh again.
pub trait Transport {
    type Response: 'static;

    fn start(&self, url: &str) -> Operation<Self::Response>;
}

impl<T: Transport> Transport for Rc<T> {
    type Response = T::Response;

    fn start(&self, url: &str) -> Operation<Self::Response> {
        (**self).start(url)
    }
}

/// URLs with a request outstanding. Clones share one table, so data sources
/// built with the same `InFlight` never start the same URL twice.
#[derive(Clone, Default)]
pub struct InFlight(Rc<RefCell<HashSet<String>>>);

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.0.borrow().contains(url)
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    fn claim(&self, url: &str) -> bool {
        self.0.borrow_mut().insert(url.to_string())
    }
}

pub struct DataSource<Tr: Transport> {
    scheduler: RefreshScheduler,
    transport: Tr,
    root: Option<Weak<dyn Refreshable>>,
    in_flight: InFlight,
}

impl<Tr: Transport> DataSource<Tr> {
    /// `root` is held weakly; `None` refreshes the scheduler's default target.
    pub fn new(scheduler: RefreshScheduler, transport: Tr, root: Option<&Target>) -> Self {
        Self::with_in_flight(scheduler, transport, root, InFlight::new())
    }

    /// Like [`DataSource::new`], but suppresses duplicates across every source
    /// sharing `in_flight`.
    pub fn with_in_flight(
        scheduler: RefreshScheduler,
        transport: Tr,
        root: Option<&Target>,
        in_flight: InFlight,
    ) -> Self {
        Self {
            scheduler,
            transport,
            root: root.map(Rc::downgrade),
            in_flight,
        }
    }

    pub fn in_flight_table(&self) -> &InFlight {
        &self.in_flight
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    pub fn in_flight(&self, url: &str) -> bool {
        self.in_flight.contains(url)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Refreshes the root now, unless requests for it are still outstanding.
    pub fn refresh(&self) {
        match self.root_target() {
            Some(root) => self.scheduler.refresh(Some(&root)),
            None if self.root.is_none() => self.scheduler.refresh(None),
            None => log::trace!("data source root is gone; refresh skipped"),
        }
    }

    pub fn fetch(&self, url: &str) -> Option<Operation<Tr::Response>> {
        self.fetch_with(url, |_| {})
    }

    /// Starts a request for `url` unless one is already in flight. `callback`
    /// runs with the outcome while `url` still counts as in flight, before
    /// the root is considered for refresh.
    pub fn fetch_with(
        &self,
        url: &str,
        callback: impl FnOnce(&Outcome<Tr::Response>) + 'static,
    ) -> Option<Operation<Tr::Response>> {
        if url.is_empty() {
            log::debug!("fetch with empty url ignored");
            return None;
        }
        if !self.in_flight.claim(url) {
            log::debug!("fetch {url} already in flight");
            return None;
        }

        let op = self.transport.start(url);
        op.on_settle(callback);
        {
            let in_flight = Rc::downgrade(&self.in_flight.0);
            let url = url.to_string();
            op.on_settle(move |_| {
                if let Some(in_flight) = in_flight.upgrade() {
                    in_flight.borrow_mut().remove(&url);
                }
            });
        }

        match self.root_target() {
            Some(root) => self.scheduler.refresh_after(Some(&root), &op),
            None if self.root.is_none() => self.scheduler.refresh_after(None, &op),
            None => log::trace!("data source root is gone; {url} not tracked"),
        }
        Some(op)
    }

    fn root_target(&self) -> Option<Target> {
        self.root.as_ref()?.upgrade()
    }
}

#[cfg(test)]
mod tests;
