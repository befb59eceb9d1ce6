use crate::futex::{Condvar, Mutex};
use crate::{RegistryError, RegistryResult};
use std::borrow::Cow;
use std::fmt;
use std::sync::OnceLock;
use tracing::trace;

/// The conventional upper bound on a resource name, in bytes.
pub const MAX_NAME_LEN: usize = 21;

/// Admission policy between waiting readers and waiting writers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Readers are admitted whenever no writer is active. A steady stream of
    /// readers can starve writers.
    #[default]
    ReaderFirst,
    /// Once a writer is waiting, newly arriving readers queue behind it.
    WriterFirst,
}

/// Reader-writer bookkeeping, guarded by the node's private mutex.
///
/// `writer_active && readers > 0` is never observed.
#[derive(Debug, Default)]
struct RwState {
    writer_active: bool,
    readers: usize,
    waiting_writers: usize,
}

impl RwState {
    fn blocks_writer(&self) -> bool {
        self.writer_active || self.readers > 0
    }

    fn blocks_reader(&self, policy: Policy) -> bool {
        match policy {
            Policy::ReaderFirst => self.writer_active,
            Policy::WriterFirst => self.writer_active || self.waiting_writers > 0,
        }
    }
}

/// A per-resource reader-writer lock node.
///
/// Nodes are normally obtained from [`LockRegistry::resolve`](crate::LockRegistry::resolve)
/// and live as long as the registry. The protocol is not reentrant: calling
/// [`begin_write`](Self::begin_write) twice from one thread without an
/// intervening [`end_write`](Self::end_write) deadlocks, as does requesting a
/// read while holding the write side.
///
/// # Examples
/// ```
/// use rwnames::LockRegistry;
///
/// let registry = LockRegistry::with_capacity(16).unwrap();
/// let lock = registry.resolve("a.txt").unwrap();
///
/// assert_eq!(lock.begin_read(), 1);
/// assert_eq!(lock.begin_read(), 2);
/// assert_eq!(lock.end_read(), 1);
/// assert_eq!(lock.end_read(), 0);
///
/// lock.begin_write();
/// assert!(lock.is_writing());
/// lock.end_write();
/// ```
pub struct ResourceLock {
    name: Box<[u8]>,
    policy: Policy,
    state: Mutex<RwState>,
    changed: Condvar,
    /// Next node in the same bucket. Set once, under the registry's structural mutex.
    pub(crate) next: OnceLock<Box<ResourceLock>>,
}

pub(crate) fn validate_name(name: &[u8], max: usize) -> RegistryResult<()> {
    if name.is_empty() || name.len() > max {
        return Err(RegistryError::InvalidName {
            len: name.len(),
            max,
        });
    }
    Ok(())
}

impl ResourceLock {
    /// Creates a detached node for later [`LockRegistry::insert`](crate::LockRegistry::insert).
    ///
    /// Fails with [`RegistryError::InvalidName`] if `name` is empty or longer
    /// than [`MAX_NAME_LEN`] bytes. Names are never truncated.
    pub fn new(name: impl AsRef<[u8]>) -> RegistryResult<Self> {
        let name = name.as_ref();
        validate_name(name, MAX_NAME_LEN)?;
        Ok(Self::with_policy(name, Policy::default()))
    }

    pub(crate) fn with_policy(name: &[u8], policy: Policy) -> Self {
        Self {
            name: name.into(),
            policy,
            state: Mutex::new(RwState::default()),
            changed: Condvar::new(),
            next: OnceLock::new(),
        }
    }

    pub(crate) fn set_policy(&mut self, policy: Policy) {
        self.policy = policy;
    }

    /// The resource name this node guards.
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// The name, lossily decoded for display.
    pub fn name_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Number of readers currently admitted. A snapshot; may be stale on return.
    pub fn readers(&self) -> usize {
        self.state.lock().readers
    }

    /// Whether a writer is currently admitted. A snapshot; may be stale on return.
    pub fn is_writing(&self) -> bool {
        self.state.lock().writer_active
    }

    /// Blocks until no reader or writer is admitted, then admits the caller
    /// as the sole writer.
    pub fn begin_write(&self) {
        let mut state = self.state.lock();
        if state.blocks_writer() {
            trace!(
                name = %self.name_lossy(),
                readers = state.readers,
                "writer waiting"
            );
            state.waiting_writers += 1;
            state = self.changed.wait_while(state, |s| s.blocks_writer());
            state.waiting_writers -= 1;
        }
        state.writer_active = true;
    }

    /// Releases the write side and wakes every waiter.
    ///
    /// # Panics
    /// If no writer is admitted.
    pub fn end_write(&self) {
        let mut state = self.state.lock();
        assert!(
            state.writer_active,
            "end_write without a matching begin_write"
        );
        state.writer_active = false;
        // All of them: several queued readers may be admitted at once.
        self.changed.notify_all();
    }

    /// Blocks while a writer is admitted (or, under [`Policy::WriterFirst`],
    /// waiting), then admits the caller as a reader.
    ///
    /// Returns the reader count including the caller.
    pub fn begin_read(&self) -> usize {
        let policy = self.policy;
        let mut state = self.state.lock();
        if state.blocks_reader(policy) {
            trace!(
                name = %self.name_lossy(),
                waiting_writers = state.waiting_writers,
                "reader waiting"
            );
            state = self.changed.wait_while(state, |s| s.blocks_reader(policy));
        }
        state.readers += 1;
        state.readers
    }

    /// Releases one reader. When the last reader leaves, every waiter is woken.
    ///
    /// Returns the remaining reader count.
    ///
    /// # Panics
    /// If no reader is admitted.
    pub fn end_read(&self) -> usize {
        let mut state = self.state.lock();
        assert!(state.readers > 0, "end_read without a matching begin_read");
        state.readers -= 1;
        if state.readers == 0 {
            self.changed.notify_all();
        }
        state.readers
    }

    /// [`begin_read`](Self::begin_read) with the matching
    /// [`end_read`](Self::end_read) issued when the guard drops.
    pub fn read(&self) -> ReadGuard<'_> {
        let readers = self.begin_read();
        ReadGuard {
            lock: self,
            readers,
        }
    }

    /// [`begin_write`](Self::begin_write) with the matching
    /// [`end_write`](Self::end_write) issued when the guard drops.
    pub fn write(&self) -> WriteGuard<'_> {
        self.begin_write();
        WriteGuard { lock: self }
    }
}

impl fmt::Debug for ResourceLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ResourceLock")
            .field("name", &self.name_lossy())
            .field("policy", &self.policy)
            .field("writer_active", &state.writer_active)
            .field("readers", &state.readers)
            .field("waiting_writers", &state.waiting_writers)
            .finish()
    }
}

/// An RAII guard holding the read side of a [`ResourceLock`].
#[must_use = "the read side is released as soon as the guard is dropped"]
pub struct ReadGuard<'a> {
    lock: &'a ResourceLock,
    readers: usize,
}

impl ReadGuard<'_> {
    /// The reader count observed on admission, including this reader.
    pub fn readers_on_entry(&self) -> usize {
        self.readers
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.end_read();
    }
}

/// An RAII guard holding the write side of a [`ResourceLock`].
#[must_use = "the write side is released as soon as the guard is dropped"]
pub struct WriteGuard<'a> {
    lock: &'a ResourceLock,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.end_write();
    }
}
