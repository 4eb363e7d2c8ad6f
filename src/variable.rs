use crate::value::Value;
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

static NEXT_VARIABLE_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, Hash, Ord, PartialOrd, Eq, PartialEq)]
pub struct VariableId(u64);

struct VariableInner {
    id: VariableId,
    name: String,
    value: RwLock<Value>,
}

/// Persistent mutable state. Creating or reading one inside
/// [`watch_variables`] is recorded by every active watch.
#[derive(Clone)]
pub struct Variable(Arc<VariableInner>);

impl Variable {
    pub fn new(name: impl Into<String>, initial: impl Into<Value>) -> Self {
        let id = VariableId(NEXT_VARIABLE_ID.fetch_add(1, Ordering::Relaxed));
        let variable = Self(Arc::new(VariableInner {
            id,
            name: name.into(),
            value: RwLock::new(initial.into()),
        }));
        record(|watch| watch.created.push(variable.clone()));
        variable
    }

    pub fn id(&self) -> VariableId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn read(&self) -> Value {
        record(|watch| {
            if !watch.accessed.iter().any(|x| x.id() == self.id()) {
                watch.accessed.push(self.clone());
            }
        });
        self.0
            .value
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn assign(&self, value: impl Into<Value>) {
        *self
            .0
            .value
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = value.into();
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Variable '{}' id={}>", self.0.name, self.0.id.0)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Variables created and read while a watch was active.
#[derive(Debug, Default)]
pub struct VariableWatch {
    created: Vec<Variable>,
    accessed: Vec<Variable>,
}

impl VariableWatch {
    pub fn created(&self) -> &[Variable] {
        &self.created
    }

    pub fn accessed(&self) -> &[Variable] {
        &self.accessed
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.accessed.is_empty()
    }
}

thread_local! {
    static ACTIVE_WATCHES: RefCell<Vec<VariableWatch>> = const { RefCell::new(Vec::new()) };
}

fn record(f: impl Fn(&mut VariableWatch)) {
    ACTIVE_WATCHES.with(|watches| {
        for watch in watches.borrow_mut().iter_mut() {
            f(watch);
        }
    });
}

// Pops its frame even if the watched closure panics.
struct WatchFrame;

impl WatchFrame {
    fn push() -> Self {
        ACTIVE_WATCHES.with(|watches| watches.borrow_mut().push(VariableWatch::default()));
        WatchFrame
    }

    fn finish(self) -> VariableWatch {
        std::mem::forget(self);
        ACTIVE_WATCHES
            .with(|watches| watches.borrow_mut().pop())
            .unwrap_or_default()
    }
}

impl Drop for WatchFrame {
    fn drop(&mut self) {
        ACTIVE_WATCHES.with(|watches| {
            watches.borrow_mut().pop();
        });
    }
}

/// Run `f`, recording every variable it creates or reads on this thread.
/// Watches nest; an inner call is also seen by all enclosing watches.
pub fn watch_variables<R>(f: impl FnOnce() -> R) -> (R, VariableWatch) {
    let frame = WatchFrame::push();
    let result = f();
    (result, frame.finish())
}
