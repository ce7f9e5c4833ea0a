use std::cell::Cell;
use std::time::Duration;

use web_time::Instant;

/// Time source for stall bookkeeping. The scheduler uses `SystemClock`
/// unless a host injects something else.
pub trait Clock: 'static {
    fn now(&self) -> Instant;
}

pub struct SystemClock;
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A test clock you can drive deterministically.
#[derive(Clone)]
pub struct TestClock {
    t: Cell<Instant>,
}

impl TestClock {
    pub fn new(t: Instant) -> Self {
        Self { t: Cell::new(t) }
    }

    pub fn advance(&self, by: Duration) {
        self.t.set(self.t.get() + by);
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.t.get()
    }
}

impl<C: Clock> Clock for std::rc::Rc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}
