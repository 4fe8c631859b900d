use std::rc::Rc;

use tracing::error;

use crate::storage::{BackingStore, AUTH_KEY};
use crate::subscribers::{SubscriptionId, Subscribers};

/// Persisted login flag. Stored as the string `"true"` or `"false"`; has no
/// expiry.
pub struct AuthFlag {
    backing: Rc<dyn BackingStore>,
    logged_in: bool,
    subscribers: Subscribers<bool>,
    write_failures: usize,
}

impl AuthFlag {
    /// Anything other than a stored `"true"` reads as logged out.
    pub fn load(backing: Rc<dyn BackingStore>) -> AuthFlag {
        let logged_in = match backing.read(AUTH_KEY) {
            Ok(value) => value.as_deref() == Some("true"),
            Err(e) => {
                error!("Error reading auth state: {e}");
                false
            }
        };
        AuthFlag {
            backing,
            logged_in,
            subscribers: Subscribers::new(),
            write_failures: 0,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    /// Writes of the flag that failed this session.
    pub fn write_failures(&self) -> usize {
        self.write_failures
    }

    pub fn login(&mut self) {
        self.set(true);
    }

    pub fn logout(&mut self) {
        self.set(false);
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&bool) + 'static) -> SubscriptionId {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    fn set(&mut self, logged_in: bool) {
        let changed = self.logged_in != logged_in;
        self.logged_in = logged_in;
        if let Err(e) = self.backing.write(AUTH_KEY, &logged_in.to_string()) {
            error!("Error saving auth state: {e}");
            self.write_failures += 1;
        }
        if changed {
            self.subscribers.notify(&self.logged_in);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::storage::MemoryStore;
    use std::cell::RefCell;

    struct ReadOnlyStore;

    impl BackingStore for ReadOnlyStore {
        fn read(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Ok(None)
        }

        fn write(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::InvalidUtf8("read-only".to_string()))
        }
    }

    #[test]
    fn test_defaults_to_logged_out() {
        let auth = AuthFlag::load(Rc::new(MemoryStore::new()));
        assert!(!auth.is_logged_in());

        let auth = AuthFlag::load(Rc::new(MemoryStore::with_entry(AUTH_KEY, "yes")));
        assert!(!auth.is_logged_in());
    }

    #[test]
    fn test_login_persists() {
        let backing: Rc<dyn BackingStore> = Rc::new(MemoryStore::new());
        let mut auth = AuthFlag::load(Rc::clone(&backing));
        auth.login();
        assert_eq!(backing.read(AUTH_KEY).unwrap().as_deref(), Some("true"));
        assert!(AuthFlag::load(Rc::clone(&backing)).is_logged_in());

        auth.logout();
        assert_eq!(backing.read(AUTH_KEY).unwrap().as_deref(), Some("false"));
        assert!(!AuthFlag::load(backing).is_logged_in());
    }

    #[test]
    fn test_notifies_on_change_only() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut auth = AuthFlag::load(Rc::new(MemoryStore::new()));
        let sink = Rc::clone(&seen);
        auth.subscribe(move |logged_in| sink.borrow_mut().push(*logged_in));

        auth.login();
        auth.login();
        auth.logout();
        assert_eq!(*seen.borrow(), vec![true, false]);
    }

    #[test]
    fn test_failed_write_is_counted() {
        let mut auth = AuthFlag::load(Rc::new(ReadOnlyStore));
        auth.login();
        assert!(auth.is_logged_in());
        auth.logout();
        assert_eq!(auth.write_failures(), 2);
    }
}
