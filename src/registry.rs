use crate::futex::Mutex;
use crate::resource_lock::validate_name;
use crate::{hash, Policy, RegistryError, RegistryResult, ResourceLock, MAX_NAME_LEN};
use std::sync::OnceLock;
use tracing::{debug, trace};

/// Bucket count of [`LockRegistry::new`] and the default registry.
pub const DEFAULT_CAPACITY: usize = 2048;

/// Construction parameters for a [`LockRegistry`].
///
/// The bucket count is fixed for the registry's lifetime; the table never
/// resizes and collisions are absorbed by chaining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    pub capacity: usize,
    pub max_name_len: usize,
    pub policy: Policy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            max_name_len: MAX_NAME_LEN,
            policy: Policy::default(),
        }
    }
}

impl RegistryConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_max_name_len(mut self, max_name_len: usize) -> Self {
        self.max_name_len = max_name_len;
        self
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }
}

/// A point-in-time view of how full a registry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub capacity: usize,
    pub nodes: usize,
    pub longest_chain: usize,
}

impl RegistryStats {
    /// Nodes per bucket.
    pub fn load_factor(&self) -> f64 {
        self.nodes as f64 / self.capacity as f64
    }
}

/// Bookkeeping guarded by the structural mutex.
#[derive(Debug, Default)]
struct Occupancy {
    nodes: usize,
    longest_chain: usize,
}

type Link = OnceLock<Box<ResourceLock>>;

/// Result of walking one bucket chain.
enum Probe<'a> {
    Found(&'a ResourceLock),
    /// The empty link at the end of the chain, and the chain length before it.
    Vacant(&'a Link, usize),
}

/// A fixed-capacity hash table mapping resource names to [`ResourceLock`]s.
///
/// Nodes are created on first resolution and never removed; a name maps to
/// the same node for the registry's whole lifetime. Handles borrow the
/// registry, so it can only be destroyed once every handle is gone.
///
/// # Examples
/// ```
/// use rwnames::LockRegistry;
///
/// let registry = LockRegistry::with_capacity(64).unwrap();
/// let a = registry.resolve("a.txt").unwrap();
/// let again = registry.resolve("a.txt").unwrap();
/// assert!(std::ptr::eq(a, again));
///
/// {
///     let _guard = a.write();
///     // exclusive access to "a.txt"
/// }
/// assert_eq!(registry.len(), 1);
/// ```
pub struct LockRegistry {
    config: RegistryConfig,
    buckets: Box<[Link]>,
    /// The structural mutex. Every chain append happens while it is held.
    occupancy: Mutex<Occupancy>,
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LockRegistry {
    /// Creates a registry with [`RegistryConfig::default`].
    pub fn new() -> Self {
        let config = RegistryConfig::default();
        let buckets = (0..config.capacity).map(|_| Link::new()).collect();
        Self::from_buckets(config, buckets)
    }

    /// Creates a registry with `capacity` buckets and default limits.
    ///
    /// # Errors
    /// [`RegistryError::InvalidCapacity`] for zero buckets,
    /// [`RegistryError::AllocationFailure`] if the bucket array cannot be allocated.
    pub fn with_capacity(capacity: usize) -> RegistryResult<Self> {
        Self::with_config(RegistryConfig::default().with_capacity(capacity))
    }

    /// Creates a registry from an explicit configuration.
    pub fn with_config(config: RegistryConfig) -> RegistryResult<Self> {
        if config.capacity == 0 {
            return Err(RegistryError::InvalidCapacity);
        }
        let mut buckets = Vec::new();
        buckets
            .try_reserve_exact(config.capacity)
            .map_err(|_| RegistryError::AllocationFailure {
                buckets: config.capacity,
            })?;
        buckets.resize_with(config.capacity, Link::new);
        Ok(Self::from_buckets(config, buckets.into_boxed_slice()))
    }

    fn from_buckets(config: RegistryConfig, buckets: Box<[Link]>) -> Self {
        debug!(
            capacity = config.capacity,
            max_name_len = config.max_name_len,
            policy = ?config.policy,
            "created lock registry"
        );
        Self {
            config,
            buckets,
            occupancy: Mutex::new(Occupancy::default()),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    pub fn len(&self) -> usize {
        self.occupancy.lock().nodes
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> RegistryStats {
        let occupancy = self.occupancy.lock();
        RegistryStats {
            capacity: self.buckets.len(),
            nodes: occupancy.nodes,
            longest_chain: occupancy.longest_chain,
        }
    }

    /// The bucket index `name` hashes to.
    pub fn bucket_of(&self, name: impl AsRef<[u8]>) -> usize {
        (hash(name.as_ref()) % self.buckets.len() as u64) as usize
    }

    /// Returns the lock for `name`, creating it on first use.
    ///
    /// Concurrent callers resolving the same unseen name all receive the same
    /// node. The structural mutex is released before returning, so blocking on
    /// the returned lock never holds up resolution of other names.
    ///
    /// # Errors
    /// [`RegistryError::InvalidName`] if `name` is empty or longer than the
    /// configured maximum.
    pub fn resolve(&self, name: impl AsRef<[u8]>) -> RegistryResult<&ResourceLock> {
        let name = name.as_ref();
        validate_name(name, self.config.max_name_len)?;

        let mut occupancy = self.occupancy.lock();
        match self.probe(name) {
            Probe::Found(node) => Ok(node),
            Probe::Vacant(link, depth) => {
                let node = ResourceLock::with_policy(name, self.config.policy);
                Ok(self.link(&mut occupancy, link, depth, node))
            }
        }
    }

    /// Returns the lock for `name` if it has already been created.
    ///
    /// Chains are append-only and every link is published through a
    /// `OnceLock`, so this walk does not take the structural mutex.
    pub fn get(&self, name: impl AsRef<[u8]>) -> Option<&ResourceLock> {
        match self.probe(name.as_ref()) {
            Probe::Found(node) => Some(node),
            Probe::Vacant(..) => None,
        }
    }

    /// Links a detached node into the registry.
    ///
    /// The node adopts the registry's [`Policy`].
    ///
    /// # Errors
    /// [`RegistryError::DuplicateName`] if a node with the same name already
    /// exists; the registry is left unchanged and the existing node keeps its
    /// identity. [`RegistryError::InvalidName`] if the node's name exceeds this
    /// registry's maximum.
    pub fn insert(&self, mut node: ResourceLock) -> RegistryResult<&ResourceLock> {
        validate_name(node.name(), self.config.max_name_len)?;
        node.set_policy(self.config.policy);

        let mut occupancy = self.occupancy.lock();
        match self.probe(node.name()) {
            Probe::Found(existing) => Err(RegistryError::DuplicateName(
                existing.name_lossy().into_owned(),
            )),
            Probe::Vacant(link, depth) => {
                trace!(name = %node.name_lossy(), "pre-registered resource");
                Ok(self.link(&mut occupancy, link, depth, node))
            }
        }
    }

    /// Creates the lock for `name` ahead of first use.
    ///
    /// # Errors
    /// As [`insert`](Self::insert).
    pub fn preregister(&self, name: impl AsRef<[u8]>) -> RegistryResult<&ResourceLock> {
        let name = name.as_ref();
        validate_name(name, self.config.max_name_len)?;
        self.insert(ResourceLock::with_policy(name, self.config.policy))
    }

    /// Frees every node. Equivalent to dropping the registry.
    pub fn destroy(self) {
        drop(self);
    }

    fn probe(&self, name: &[u8]) -> Probe<'_> {
        let mut link = &self.buckets[self.bucket_of(name)];
        let mut depth = 0;
        while let Some(node) = link.get() {
            if node.name() == name {
                return Probe::Found(node);
            }
            link = &node.next;
            depth += 1;
        }
        Probe::Vacant(link, depth)
    }

    /// Appends `node` at `link`. Requires the structural mutex, witnessed by `occupancy`.
    fn link<'a>(
        &'a self,
        occupancy: &mut Occupancy,
        link: &'a Link,
        depth: usize,
        node: ResourceLock,
    ) -> &'a ResourceLock {
        let node = link.get_or_init(|| Box::new(node));
        occupancy.nodes += 1;
        occupancy.longest_chain = occupancy.longest_chain.max(depth + 1);
        trace!(
            name = %node.name_lossy(),
            bucket = self.bucket_of(node.name()),
            depth,
            "created resource lock"
        );
        node
    }
}

impl Drop for LockRegistry {
    fn drop(&mut self) {
        debug!(
            nodes = self.occupancy.lock().nodes,
            "destroying lock registry"
        );
        // Unlink iteratively; recursive Box drops could overflow on long chains.
        for bucket in self.buckets.iter_mut() {
            let mut next = bucket.take();
            while let Some(mut node) = next {
                next = node.next.take();
            }
        }
    }
}

/// The process-wide registry, created with [`RegistryConfig::default`] on first use.
///
/// It is constructed exactly once, cannot be reconfigured and is never
/// destroyed. Prefer an explicit [`LockRegistry`] where one can be passed
/// around.
pub fn default_registry() -> &'static LockRegistry {
    static DEFAULT_REGISTRY: OnceLock<LockRegistry> = OnceLock::new();
    DEFAULT_REGISTRY.get_or_init(|| {
        debug!("initializing default lock registry");
        LockRegistry::new()
    })
}
