//! Settle-once operation handles.
//!
//! An [`Operation`] is the scheduler's view of one outstanding unit of work:
//! it can be observed, never driven. The paired [`Resolver`] is handed to
//! whatever performs the work (a transport, a timer, a test) and settles the
//! operation exactly once.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::error::OperationError;

pub type Outcome<T> = Result<T, OperationError>;

/// Identity of an operation. Clones of one handle share it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(u64);

impl OperationId {
    fn next() -> Self {
        thread_local! {
            static NEXT_ID: Cell<u64> = const { Cell::new(1) };
        }
        NEXT_ID.with(|n| {
            let id = n.get();
            n.set(id + 1);
            OperationId(id)
        })
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

type Observer<T> = Box<dyn FnOnce(&Outcome<T>)>;

enum State<T> {
    Pending(Vec<Observer<T>>),
    Settled(Rc<Outcome<T>>),
}

struct Inner<T> {
    id: OperationId,
    state: RefCell<State<T>>,
}

pub struct Operation<T> {
    inner: Rc<Inner<T>>,
}

impl<T: 'static> Clone for Operation<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.inner.id)
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl<T: 'static> Operation<T> {
    /// Creates an unsettled operation together with the resolver that
    /// settles it.
    pub fn pending() -> (Self, Resolver<T>) {
        let op = Self {
            inner: Rc::new(Inner {
                id: OperationId::next(),
                state: RefCell::new(State::Pending(Vec::new())),
            }),
        };
        let resolver = Resolver {
            op: Some(op.clone()),
        };
        (op, resolver)
    }

    pub fn resolved(value: T) -> Self {
        let (op, resolver) = Self::pending();
        resolver.resolve(value);
        op
    }

    pub fn rejected(err: OperationError) -> Self {
        let (op, resolver) = Self::pending();
        resolver.reject(err);
        op
    }

    pub fn id(&self) -> OperationId {
        self.inner.id
    }

    pub fn is_settled(&self) -> bool {
        matches!(&*self.inner.state.borrow(), State::Settled(_))
    }

    /// Registers `f` to run once with the outcome. Runs immediately when the
    /// operation has already settled.
    pub fn on_settle(&self, f: impl FnOnce(&Outcome<T>) + 'static) {
        let settled = {
            let mut state = self.inner.state.borrow_mut();
            match &mut *state {
                State::Pending(observers) => {
                    observers.push(Box::new(f));
                    return;
                }
                State::Settled(outcome) => outcome.clone(),
            }
        };
        f(&settled);
    }

    fn settle(&self, outcome: Outcome<T>) {
        let outcome = Rc::new(outcome);
        let observers = {
            let mut state = self.inner.state.borrow_mut();
            match std::mem::replace(&mut *state, State::Settled(outcome.clone())) {
                State::Pending(observers) => observers,
                State::Settled(prev) => {
                    // Resolvers are consumed on settle; keep the first outcome.
                    *state = State::Settled(prev);
                    return;
                }
            }
        };
        // No borrow is held here, so observers may register more observers
        // or inspect the operation.
        for observer in observers {
            observer(&outcome);
        }
    }
}

/// Settles its [`Operation`] exactly once. Dropping it unsettled settles the
/// operation with [`OperationError::Abandoned`].
pub struct Resolver<T: 'static> {
    op: Option<Operation<T>>,
}

impl<T: 'static> Resolver<T> {
    pub fn id(&self) -> Option<OperationId> {
        self.op.as_ref().map(Operation::id)
    }

    pub fn resolve(self, value: T) {
        self.settle(Ok(value));
    }

    pub fn reject(self, err: OperationError) {
        self.settle(Err(err));
    }

    pub fn settle(mut self, outcome: Outcome<T>) {
        if let Some(op) = self.op.take() {
            op.settle(outcome);
        }
    }
}

impl<T: 'static> Drop for Resolver<T> {
    fn drop(&mut self) {
        if let Some(op) = self.op.take() {
            log::debug!("{} dropped without settling", op.id());
            op.settle(Err(OperationError::Abandoned));
        }
    }
}
