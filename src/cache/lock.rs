use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Lock acquisition that survives a panic in another holder.
///
/// The cache, dialog queue and session state are only mutated through short
/// synchronous critical sections, so a poisoned guard still holds a coherent
/// value and is taken over instead of propagating the panic.
pub(crate) trait LockExt<T> {
    fn lock_or_recover(&self, owner: &'static str, op: &'static str) -> MutexGuard<'_, T>;
}

impl<T> LockExt<T> for Mutex<T> {
    fn lock_or_recover(&self, owner: &'static str, op: &'static str) -> MutexGuard<'_, T> {
        self.lock().unwrap_or_else(|poisoned| {
            warn!(
                op,
                owner,
                result = "poisoned_recovered",
                "Recovered from poisoned state lock"
            );
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn recovers_after_panic() {
        let lock = Mutex::new(1);
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.lock().expect("first lock");
            panic!("poison");
        }));
        assert!(lock.is_poisoned());
        *lock.lock_or_recover("test", "write") += 1;
        assert_eq!(*lock.lock_or_recover("test", "read"), 2);
    }
}
