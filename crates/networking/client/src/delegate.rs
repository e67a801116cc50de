use std::fmt;

use tracing::warn;

/// Identifies one listener registered on a [`MulticastDelegate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DelegateHandle(u64);

type Listener<A> = Box<dyn Fn(&A) + Send + Sync>;

/// Ordered list of listeners invoked with the same argument.
pub struct MulticastDelegate<A> {
    name: &'static str,
    warn_when_unbound: bool,
    next_handle: u64,
    listeners: Vec<(DelegateHandle, Listener<A>)>,
}

impl<A: fmt::Debug> MulticastDelegate<A> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            warn_when_unbound: true,
            next_handle: 1,
            listeners: Vec::new(),
        }
    }

    /// A delegate that stays quiet when broadcasting without listeners.
    pub fn silent(name: &'static str) -> Self {
        Self {
            warn_when_unbound: false,
            ..Self::new(name)
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn add(&mut self, listener: impl Fn(&A) + Send + Sync + 'static) -> DelegateHandle {
        let handle = DelegateHandle(self.next_handle);
        self.next_handle += 1;
        self.listeners.push((handle, Box::new(listener)));
        handle
    }

    /// Returns `false` if `handle` was not registered here.
    pub fn remove(&mut self, handle: DelegateHandle) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(registered, _)| *registered != handle);
        self.listeners.len() != before
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    pub fn is_bound(&self) -> bool {
        !self.listeners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Invokes every listener in registration order.
    ///
    /// Returns whether anyone was listening.
    pub fn broadcast(&self, arg: &A) -> bool {
        if self.listeners.is_empty() {
            if self.warn_when_unbound {
                warn!("Nothing bound to {}: {:?}", self.name, arg);
            }
            return false;
        }
        for (_, listener) in &self.listeners {
            listener(arg);
        }
        true
    }
}

impl<A> fmt::Debug for MulticastDelegate<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MulticastDelegate")
            .field("name", &self.name)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn listeners_run_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut delegate = MulticastDelegate::<u32>::new("OnTest");
        for tag in ["a", "b"] {
            let seen = seen.clone();
            delegate.add(move |value| seen.lock().unwrap().push(format!("{tag}{value}")));
        }

        assert!(delegate.broadcast(&7));
        assert_eq!(*seen.lock().unwrap(), vec!["a7", "b7"]);
    }

    #[test]
    fn removed_listener_is_not_called() {
        let calls = Arc::new(Mutex::new(0));
        let mut delegate = MulticastDelegate::<()>::new("OnTest");
        let handle = {
            let calls = calls.clone();
            delegate.add(move |_| *calls.lock().unwrap() += 1)
        };

        assert!(delegate.remove(handle));
        assert!(!delegate.remove(handle));
        assert!(!delegate.is_bound());
        assert!(!delegate.broadcast(&()));
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn handles_are_unique_after_clear() {
        let mut delegate = MulticastDelegate::<()>::silent("OnTest");
        let first = delegate.add(|_| {});
        delegate.clear();
        let second = delegate.add(|_| {});
        assert_ne!(first, second);
        assert_eq!(delegate.len(), 1);
    }
}
