// Modified from https://github.com/rust-lang/rust/blob/master/library/std/src/sys/sync/mutex/futex.rs
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{
    AtomicU32,
    Ordering::{Acquire, Relaxed, Release},
};

/// A futex-backed mutex owning the state it protects.
///
/// Unlike `std::sync::Mutex` there is no poisoning: a panicking holder
/// releases the lock normally when its guard is dropped.
pub struct Mutex<T> {
    futex: AtomicU32,
    value: UnsafeCell<T>,
}

// Safety: access to `value` is serialized by `futex`.
unsafe impl<T: Send> Sync for Mutex<T> {}

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1; // locked, no other threads waiting
const CONTENDED: u32 = 2; // locked, and other threads waiting (contended)

impl<T> Mutex<T> {
    #[inline]
    pub const fn new(value: T) -> Self {
        Self {
            futex: AtomicU32::new(UNLOCKED),
            value: UnsafeCell::new(value),
        }
    }

    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, T> {
        if self
            .futex
            .compare_exchange(UNLOCKED, LOCKED, Acquire, Relaxed)
            .is_err()
        {
            self.lock_contended();
        }
        MutexGuard { mutex: self }
    }

    #[cold]
    fn lock_contended(&self) {
        // Spin first to speed things up if the lock is released quickly.
        let mut state = self.spin();

        // If it's unlocked now, attempt to take the lock
        // without marking it as contended.
        if state == UNLOCKED {
            match self
                .futex
                .compare_exchange(UNLOCKED, LOCKED, Acquire, Relaxed)
            {
                Ok(_) => return, // Locked!
                Err(s) => state = s,
            }
        }

        loop {
            // Avoid an unnecessary write if it is already CONTENDED.
            if state != CONTENDED && self.futex.swap(CONTENDED, Acquire) == UNLOCKED {
                // We changed it from UNLOCKED to CONTENDED, so we just successfully locked it.
                return;
            }

            atomic_wait::wait(&self.futex, CONTENDED);

            state = self.spin();
        }
    }

    fn spin(&self) -> u32 {
        let mut spin = 100;
        loop {
            let state = self.futex.load(Relaxed);

            // We stop spinning when the mutex is UNLOCKED,
            // but also when it's CONTENDED.
            if state != LOCKED || spin == 0 {
                return state;
            }

            std::hint::spin_loop();
            spin -= 1;
        }
    }

    #[inline]
    fn unlock(&self) {
        if self.futex.swap(UNLOCKED, Release) == CONTENDED {
            // Waking one is enough here: the woken thread re-marks the mutex
            // CONTENDED, so the rest are woken in turn on later unlocks.
            atomic_wait::wake_one(&self.futex);
        }
    }
}

/// Proof that the owning [`Mutex`] is held. Unlocks on drop.
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.mutex.value.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

/// A condition variable paired with a futex [`Mutex`].
///
/// Waiters sleep on a generation counter that every notification bumps, so a
/// notification issued between the unlock and the sleep is never lost.
pub struct Condvar {
    counter: AtomicU32,
    waiters: AtomicU32,
}

impl Condvar {
    pub const fn new() -> Self {
        Self {
            counter: AtomicU32::new(0),
            waiters: AtomicU32::new(0),
        }
    }

    pub fn notify_all(&self) {
        if self.waiters.load(Relaxed) > 0 {
            self.counter.fetch_add(1, Relaxed);
            atomic_wait::wake_all(&self.counter);
        }
    }

    /// Releases the guard's mutex, sleeps until notified (or spuriously
    /// woken), then reacquires the mutex.
    ///
    /// Callers must recheck their predicate in a loop.
    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        // Registered while still holding the mutex, so a notifier that
        // changes the state after we unlock always sees us.
        self.waiters.fetch_add(1, Relaxed);
        let generation = self.counter.load(Relaxed);

        let mutex = guard.mutex;
        drop(guard);

        atomic_wait::wait(&self.counter, generation);

        self.waiters.fetch_sub(1, Relaxed);
        mutex.lock()
    }

    /// Waits while `condition` holds for the protected state.
    pub fn wait_while<'a, T, F>(
        &self,
        mut guard: MutexGuard<'a, T>,
        mut condition: F,
    ) -> MutexGuard<'a, T>
    where
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut *guard) {
            guard = self.wait(guard);
        }
        guard
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_futex() {
        let lock = Arc::new(Mutex::new(0usize));
        let current = Arc::new(AtomicU32::new(0));
        const N: usize = 8;
        const M: usize = 1 << 16;

        let mut tasks = vec![];
        for _ in 0..N {
            let lock = lock.clone();
            let current = current.clone();
            tasks.push(std::thread::spawn(move || {
                for _ in 0..M {
                    let mut guard = lock.lock();
                    assert_eq!(current.fetch_add(1, Acquire), 0);
                    *guard += 1;
                    current.fetch_sub(1, Acquire);
                }
            }));
        }
        for task in tasks {
            task.join().unwrap();
        }
        assert_eq!(*lock.lock(), N * M);
    }

    #[test]
    fn test_condvar_wait_while() {
        let mutex = Mutex::new(0u32);
        let condvar = Condvar::new();

        std::thread::scope(|s| {
            s.spawn(|| {
                std::thread::sleep(Duration::from_millis(50));
                *mutex.lock() = 123;
                condvar.notify_all();
            });

            let guard = condvar.wait_while(mutex.lock(), |v| *v < 100);
            assert_eq!(*guard, 123);
        });
    }

    #[test]
    fn test_condvar_notify_all() {
        const WAITERS: usize = 8;
        let mutex = Mutex::new(false);
        let condvar = Condvar::new();
        let woken = AtomicU32::new(0);

        std::thread::scope(|s| {
            for _ in 0..WAITERS {
                s.spawn(|| {
                    let _guard = condvar.wait_while(mutex.lock(), |ready| !*ready);
                    woken.fetch_add(1, Relaxed);
                });
            }

            std::thread::sleep(Duration::from_millis(50));
            *mutex.lock() = true;
            condvar.notify_all();
        });

        assert_eq!(woken.load(Relaxed), WAITERS as u32);
    }
}
