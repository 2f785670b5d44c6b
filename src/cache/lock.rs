use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn_poisoned(target, op, "rwlock.read");
        poisoned.into_inner()
    })
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn_poisoned(target, op, "rwlock.write");
        poisoned.into_inner()
    })
}

fn warn_poisoned(target: &'static str, op: &'static str, lock_kind: &'static str) {
    warn!(
        op,
        target_module = target,
        lock_kind,
        result = "poisoned_recovered",
        hint = "cached entries written by the panicking thread may be partial",
        "Recovered from poisoned cache lock"
    );
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn poisoned_lock_is_recovered() {
        let lock = RwLock::new(1_u32);
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.write().expect("first write");
            panic!("poison the lock");
        }));
        assert!(lock.is_poisoned());

        *rw_write(&lock, "cache::lock::tests", "write") = 2;
        assert_eq!(*rw_read(&lock, "cache::lock::tests", "read"), 2);
    }
}
