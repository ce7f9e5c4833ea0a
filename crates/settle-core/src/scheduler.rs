use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::clock::{Clock, SystemClock};
use crate::config::SchedulerConfig;
use crate::keyed::{KeyedOperationSet, TargetKey};
use crate::operation::Operation;
use crate::target::{Refreshable, Target};

/// Initialization for a [`RefreshScheduler`].
#[derive(Default)]
pub struct InitOptions {
    /// Refreshed when a request carries no explicit target.
    pub default_target: Option<Target>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub requests: u64,
    /// Evaluations skipped because the key still had outstanding operations.
    pub deferred: u64,
    pub fired: u64,
    pub no_target: u64,
    pub dead_target: u64,
    pub failed_operations: u64,
}

struct Inner {
    config: SchedulerConfig,
    clock: Box<dyn Clock>,
    pending: RefCell<KeyedOperationSet>,
    default_target: RefCell<Option<Target>>,
    stats: Cell<SchedulerStats>,
}

impl Inner {
    fn bump(&self, f: impl FnOnce(&mut SchedulerStats)) {
        let mut s = self.stats.get();
        f(&mut s);
        self.stats.set(s);
    }

    fn resolve(&self, key: &TargetKey<dyn Refreshable>) -> Option<Target> {
        match key {
            TargetKey::Fallback => self.default_target.borrow().clone(),
            TargetKey::Target { .. } => key.upgrade(),
        }
    }

    fn evaluate(&self, key: &TargetKey<dyn Refreshable>) {
        if self.pending.borrow().has(key) {
            log::trace!("{}: {:?} still pending; refresh deferred", self.config.name, key);
            self.bump(|s| s.deferred += 1);
            return;
        }

        let Some(target) = self.resolve(key) else {
            log::trace!("{}: nothing to refresh for {:?}", self.config.name, key);
            self.bump(|s| s.no_target += 1);
            return;
        };

        if !target.is_alive() {
            log::trace!("{}: {:?} is no longer alive", self.config.name, key);
            self.bump(|s| s.dead_target += 1);
            return;
        }

        self.bump(|s| s.fired += 1);
        target.refresh_now();
    }
}

/// Refreshes a target at most once after all of its outstanding operations
/// settle. Cloning yields another handle to the same scheduler.
#[derive(Clone)]
pub struct RefreshScheduler {
    inner: Rc<Inner>,
}

impl RefreshScheduler {
    pub fn init(options: InitOptions) -> Self {
        Self::with_config(SchedulerConfig::default(), options)
    }

    pub fn with_config(config: SchedulerConfig, options: InitOptions) -> Self {
        Self::with_clock(config, options, SystemClock)
    }

    pub fn with_clock(config: SchedulerConfig, options: InitOptions, clock: impl Clock) -> Self {
        Self {
            inner: Rc::new(Inner {
                config,
                clock: Box::new(clock),
                pending: RefCell::new(KeyedOperationSet::new()),
                default_target: RefCell::new(options.default_target),
                stats: Cell::new(SchedulerStats::default()),
            }),
        }
    }

    /// Replaces the default target. Outstanding operations are kept.
    pub fn reinitialize(&self, options: InitOptions) {
        *self.inner.default_target.borrow_mut() = options.default_target;
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> SchedulerStats {
        self.inner.stats.get()
    }

    pub fn has_pending(&self, target: Option<&Target>) -> bool {
        self.inner.pending.borrow().has(&TargetKey::of(target))
    }

    pub fn outstanding(&self, target: Option<&Target>) -> usize {
        self.inner.pending.borrow().outstanding(&TargetKey::of(target))
    }

    /// Requests a refresh of `target` (or the default target).
    ///
    /// With an operation, the request is tracked against the target and
    /// re-evaluated once that operation settles, whichever way it settles.
    /// Without one, it is evaluated now. Either way the refresh only fires
    /// when nothing is outstanding for the target any more.
    pub fn request_refresh<T: 'static>(
        &self,
        target: Option<&Target>,
        operation: Option<&Operation<T>>,
    ) {
        self.inner.bump(|s| s.requests += 1);
        let key = TargetKey::of(target);
        match operation {
            Some(op) => self.track(key, op),
            None => self.inner.evaluate(&key),
        }
    }

    pub fn refresh(&self, target: Option<&Target>) {
        self.request_refresh::<()>(target, None);
    }

    pub fn refresh_after<T: 'static>(&self, target: Option<&Target>, operation: &Operation<T>) {
        self.request_refresh(target, Some(operation));
    }

    fn track<T: 'static>(&self, key: TargetKey<dyn Refreshable>, op: &Operation<T>) {
        let id = op.id();
        let now = self.inner.clock.now();
        if !self.inner.pending.borrow_mut().add_at(&key, id, now) {
            log::trace!("{}: {} already tracked for {:?}", self.inner.config.name, id, key);
            return;
        }

        let scheduler = Rc::downgrade(&self.inner);
        op.on_settle(move |outcome| {
            let Some(inner) = scheduler.upgrade() else {
                return;
            };
            if let Err(err) = outcome {
                log::debug!("{}: {} settled with error: {}", inner.config.name, id, err);
                inner.bump(|s| s.failed_operations += 1);
            }
            inner.pending.borrow_mut().remove(&key, &id);
            inner.evaluate(&key);
        });
    }

    /// Reports keys that have been pending longer than the configured
    /// threshold. An operation that never settles suppresses refreshes for
    /// its key indefinitely; this is the only place that becomes visible.
    pub fn check_stalls(&self) -> usize {
        let Some(threshold) = self.inner.config.stall_after() else {
            return 0;
        };
        let stalls = self
            .inner
            .pending
            .borrow()
            .stalled(self.inner.clock.now(), threshold);
        for stall in &stalls {
            log::warn!(
                "{}: {:?} has {} outstanding operation(s), pending for {:?}",
                self.inner.config.name,
                stall.key,
                stall.outstanding,
                stall.pending_for
            );
        }
        stalls.len()
    }

    /// Drops bookkeeping for targets that have been destroyed.
    pub fn sweep(&self) -> usize {
        self.inner.pending.borrow_mut().sweep()
    }
}
