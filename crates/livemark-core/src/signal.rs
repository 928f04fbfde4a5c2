//! Synchronous, single-threaded observer registration.
//!
//! A [`Signal`] owns an ordered list of listeners. [`Signal::emit`] calls every listener that was
//! registered when the emit started, in registration order. There is no global bus: whoever owns
//! the signal decides who may emit on it.

use std::cell::Cell;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Handle returned by [`Signal::subscribe`]; pass it back to [`Signal::unsubscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Listener<T> = Rc<RefCell<dyn FnMut(&T)>>;

struct Entry<T> {
    id: SubscriptionId,
    active: Rc<Cell<bool>>,
    listener: Listener<T>,
}

impl<T> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            active: Rc::clone(&self.active),
            listener: Rc::clone(&self.listener),
        }
    }
}

pub struct Signal<T> {
    name: &'static str,
    next_id: Cell<u64>,
    entries: RefCell<Vec<Entry<T>>>,
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.name)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new("signal")
    }
}

impl<T> Signal<T> {
    /// Creates a signal. `name` only shows up in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: Cell::new(1),
            entries: RefCell::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn subscribe(&self, listener: impl FnMut(&T) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        let listener: Listener<T> = Rc::new(RefCell::new(listener));
        self.entries.borrow_mut().push(Entry {
            id,
            active: Rc::new(Cell::new(true)),
            listener,
        });
        id
    }

    /// Removes a listener. Returns `false` if `id` was not (or no longer) registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let Some(idx) = entries.iter().position(|e| e.id == id) else {
            return false;
        };
        let entry = entries.remove(idx);
        entry.active.set(false);
        true
    }

    pub fn listener_count(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.entries.borrow_mut());
        for entry in drained {
            entry.active.set(false);
        }
    }

    /// Calls each listener registered at the time of the call, in registration order.
    ///
    /// Listeners may subscribe or unsubscribe (themselves or others) while the emit runs. New
    /// listeners wait for the next emit; removed ones are skipped if not yet reached. A listener
    /// that re-emits the same signal from inside its own callback is not re-entered.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Entry<T>> = self.entries.borrow().clone();
        tracing::trace!(signal = self.name, listeners = snapshot.len(), "emit");
        for entry in snapshot {
            if !entry.active.get() {
                continue;
            }
            let Ok(mut listener) = entry.listener.try_borrow_mut() else {
                tracing::debug!(signal = self.name, "skipping re-entrant listener");
                continue;
            };
            (&mut *listener)(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&'static str) -> Box<dyn FnMut(&u32)>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log2 = Rc::clone(&log);
        let make = move |tag: &'static str| -> Box<dyn FnMut(&u32)> {
            let log = Rc::clone(&log2);
            Box::new(move |v: &u32| log.borrow_mut().push(format!("{tag}{v}")))
        };
        (log, make)
    }

    #[test]
    fn emits_in_registration_order() {
        let signal = Signal::<u32>::new("test");
        let (log, make) = recorder();
        signal.subscribe(make("a"));
        signal.subscribe(make("b"));
        signal.subscribe(make("c"));

        signal.emit(&1);
        assert_eq!(*log.borrow(), vec!["a1", "b1", "c1"]);
    }

    #[test]
    fn unsubscribe_removes_only_that_listener() {
        let signal = Signal::<u32>::new("test");
        let (log, make) = recorder();
        let a = signal.subscribe(make("a"));
        signal.subscribe(make("b"));

        assert!(signal.unsubscribe(a));
        assert!(!signal.unsubscribe(a));
        signal.emit(&2);

        assert_eq!(*log.borrow(), vec!["b2"]);
        assert_eq!(signal.listener_count(), 1);
    }

    #[test]
    fn listener_added_during_emit_waits_for_next_emit() {
        let signal = Rc::new(Signal::<u32>::new("test"));
        let hits = Rc::new(Cell::new(0));

        let sig = Rc::clone(&signal);
        let hits2 = Rc::clone(&hits);
        signal.subscribe(move |_| {
            let hits3 = Rc::clone(&hits2);
            sig.subscribe(move |_| hits3.set(hits3.get() + 1));
        });

        signal.emit(&0);
        assert_eq!(hits.get(), 0);
        signal.emit(&0);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn listener_removed_during_emit_is_skipped() {
        let signal = Rc::new(Signal::<u32>::new("test"));
        let (log, make) = recorder();
        let victim = Rc::new(Cell::new(None));

        let sig = Rc::clone(&signal);
        let victim2 = Rc::clone(&victim);
        signal.subscribe(move |_| {
            if let Some(id) = victim2.get() {
                sig.unsubscribe(id);
            }
        });
        victim.set(Some(signal.subscribe(make("v"))));

        signal.emit(&3);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let signal = Signal::<u32>::new("test");
        let (log, make) = recorder();
        signal.subscribe(make("a"));
        signal.clear();
        signal.emit(&4);
        assert!(log.borrow().is_empty());
        assert_eq!(signal.listener_count(), 0);
    }
}
