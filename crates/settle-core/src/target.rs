use std::cell::Cell;
use std::rc::Rc;

/// A UI component as the scheduler sees it.
pub trait Refreshable {
    /// Must reflect the current mount state.
    fn is_alive(&self) -> bool;
    /// Re-render synchronously. May be called redundantly.
    fn refresh_now(&self);
}

pub type Target = Rc<dyn Refreshable>;

/// `Refreshable` backed by a closure and a mount flag.
pub struct FnTarget {
    mounted: Cell<bool>,
    refresh: Box<dyn Fn()>,
}

impl FnTarget {
    pub fn new(refresh: impl Fn() + 'static) -> Rc<Self> {
        Rc::new(Self {
            mounted: Cell::new(true),
            refresh: Box::new(refresh),
        })
    }

    pub fn mount(&self) {
        self.mounted.set(true);
    }

    pub fn unmount(&self) {
        self.mounted.set(false);
    }
}

impl Refreshable for FnTarget {
    fn is_alive(&self) -> bool {
        self.mounted.get()
    }

    fn refresh_now(&self) {
        (self.refresh)()
    }
}
