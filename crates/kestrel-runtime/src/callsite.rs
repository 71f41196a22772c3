//! Polymorphic inline caches for dynamic call sites
//!
//! Each site keeps an immutable snapshot of up to [`POLYMORPHIC_LIMIT`]
//! entries behind an epoch-managed pointer. Readers pin, load and scan the
//! snapshot without locking. Writers build a new snapshot and publish it
//! with compare-and-swap; the old one is reclaimed once no reader can still
//! see it.
//!
//! An entry is valid while the receiver's metaclass is the same object
//! and its [`ChainStamp`] is current: no class in the superclass chain has
//! changed version and the registry generation is unchanged. The stamp is
//! taken before resolving, so an entry installed concurrently with a change
//! is already stale and misses on the next lookup. Checking an entry reads
//! one atomic per class and allocates nothing.

use crate::metaclass::{MetaClass, MethodTarget};
use crate::overlay;
use crate::registry::{ChainStamp, MetaClassRegistry};
use crate::value::Value;
use crate::{RuntimeError, RuntimeResult};
use crossbeam::epoch::{self, Atomic, Guard, Owned};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Entries kept per site before the oldest is evicted
pub const POLYMORPHIC_LIMIT: usize = 8;

/// Publication attempts before an install is abandoned
const MAX_INSTALL_ATTEMPTS: usize = 4;

/// Runtime class of one argument; arrays are kept apart from their component
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ArgClass {
    Plain(Arc<str>),
    Array(Arc<str>),
}

impl ArgClass {
    fn of(arg: &Value) -> Self {
        match arg {
            Value::Array(array) => ArgClass::Array(Arc::from(array.component())),
            other => ArgClass::Plain(Arc::from(other.class_name())),
        }
    }

    fn describes(&self, arg: &Value) -> bool {
        match (self, arg) {
            (ArgClass::Array(component), Value::Array(array)) => &**component == array.component(),
            (ArgClass::Array(_), _) | (_, Value::Array(_)) => false,
            (ArgClass::Plain(class), other) => &**class == other.class_name(),
        }
    }
}

/// Argument count and runtime argument classes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArgShape(Box<[ArgClass]>);

impl ArgShape {
    /// Shape of `args`
    pub fn of(args: &[Value]) -> Self {
        ArgShape(args.iter().map(ArgClass::of).collect())
    }

    /// Whether `args` has exactly this shape, without allocating
    pub fn matches(&self, args: &[Value]) -> bool {
        self.0.len() == args.len() && self.0.iter().zip(args).all(|(class, arg)| class.describes(arg))
    }

    /// Number of arguments
    pub fn arity(&self) -> usize {
        self.0.len()
    }
}

struct CacheEntry {
    class: Arc<MetaClass>,
    static_receiver: bool,
    shape: ArgShape,
    stamp: ChainStamp,
    target: Arc<MethodTarget>,
}

impl CacheEntry {
    fn same_key(&self, other: &CacheEntry) -> bool {
        Arc::ptr_eq(&self.class, &other.class)
            && self.static_receiver == other.static_receiver
            && self.shape == other.shape
    }
}

#[derive(Default)]
struct CacheSnapshot {
    entries: Vec<Arc<CacheEntry>>,
}

/// Counters for one site or a whole table
#[derive(Debug, Default)]
pub struct SiteCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    overlay_bypasses: AtomicU64,
    failed_installs: AtomicU64,
}

impl SiteCounters {
    /// Lookups answered from the cache
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Lookups that had to resolve
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Lookups that skipped the cache because an overlay was active
    pub fn overlay_bypasses(&self) -> u64 {
        self.overlay_bypasses.load(Ordering::Relaxed)
    }

    /// Installs abandoned under contention
    pub fn failed_installs(&self) -> u64 {
        self.failed_installs.load(Ordering::Relaxed)
    }

    fn absorb(&self, other: &SiteCounters) {
        self.hits.fetch_add(other.hits(), Ordering::Relaxed);
        self.misses.fetch_add(other.misses(), Ordering::Relaxed);
        self.overlay_bypasses.fetch_add(other.overlay_bypasses(), Ordering::Relaxed);
        self.failed_installs.fetch_add(other.failed_installs(), Ordering::Relaxed);
    }
}

/// One dynamic call site
pub struct CallSite {
    name: String,
    arity: usize,
    cache: Atomic<CacheSnapshot>,
    counters: SiteCounters,
}

impl std::fmt::Debug for CallSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSite")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("entries", &self.entry_count())
            .finish()
    }
}

impl CallSite {
    /// Empty site calling `name` with `arity` arguments
    pub fn new(name: &str, arity: usize) -> Self {
        Self {
            name: name.to_string(),
            arity,
            cache: Atomic::null(),
            counters: SiteCounters::default(),
        }
    }

    /// Method name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Argument count the site was compiled with
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Hit and miss counters
    pub fn counters(&self) -> &SiteCounters {
        &self.counters
    }

    /// Number of cached entries
    pub fn entry_count(&self) -> usize {
        let guard = epoch::pin();
        let snapshot = self.cache.load(Ordering::Acquire, &guard);
        // SAFETY: the snapshot stays alive while `guard` is pinned.
        unsafe { snapshot.as_ref() }.map_or(0, |s| s.entries.len())
    }

    /// Target for calling this site's method on `receiver`
    pub fn resolve(
        &self,
        registry: &MetaClassRegistry,
        receiver: &Value,
        args: &[Value],
    ) -> RuntimeResult<Arc<MethodTarget>> {
        let (class, static_receiver) = receiver_class(registry, receiver, &self.name)?;
        if overlay::is_active() {
            self.counters.overlay_bypasses.fetch_add(1, Ordering::Relaxed);
            return resolve_in(registry, &class, static_receiver, &self.name, args);
        }

        let guard = epoch::pin();
        let snapshot = self.cache.load(Ordering::Acquire, &guard);
        // SAFETY: the snapshot stays alive while `guard` is pinned.
        if let Some(snapshot) = unsafe { snapshot.as_ref() } {
            let hit = snapshot.entries.iter().find(|entry| {
                Arc::ptr_eq(&entry.class, &class)
                    && entry.static_receiver == static_receiver
                    && entry.shape.matches(args)
                    && entry.stamp.is_current(registry)
            });
            if let Some(entry) = hit {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(&entry.target));
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        let stamp = registry.stamp(&class);
        let target = resolve_in(registry, &class, static_receiver, &self.name, args)?;
        self.install(
            CacheEntry {
                class,
                static_receiver,
                shape: ArgShape::of(args),
                stamp,
                target: Arc::clone(&target),
            },
            &guard,
        );
        Ok(target)
    }

    fn install(&self, entry: CacheEntry, guard: &Guard) {
        let entry = Arc::new(entry);
        let mut current = self.cache.load(Ordering::Acquire, guard);
        for _ in 0..MAX_INSTALL_ATTEMPTS {
            // SAFETY: `current` was loaded under `guard`.
            let mut entries = unsafe { current.as_ref() }
                .map(|s| s.entries.clone())
                .unwrap_or_default();
            entries.retain(|existing| !existing.same_key(&entry));
            if entries.len() >= POLYMORPHIC_LIMIT {
                entries.remove(0);
            }
            entries.push(Arc::clone(&entry));
            let count = entries.len();

            let next = Owned::new(CacheSnapshot { entries });
            match self
                .cache
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire, guard)
            {
                Ok(_) => {
                    if !current.is_null() {
                        // SAFETY: the old snapshot is unreachable from the
                        // site and is freed once every pinned reader is done.
                        unsafe { guard.defer_destroy(current) };
                    }
                    debug!(
                        site = %self.name,
                        class = %entry.class.name(),
                        entries = count,
                        "call site entry installed"
                    );
                    return;
                }
                Err(failure) => current = failure.current,
            }
        }
        self.counters.failed_installs.fetch_add(1, Ordering::Relaxed);
        trace!(site = %self.name, "call site install abandoned under contention");
    }

    /// Drop every cached entry
    pub fn invalidate(&self) {
        let guard = epoch::pin();
        let old = self.cache.swap(epoch::Shared::null(), Ordering::AcqRel, &guard);
        if !old.is_null() {
            // SAFETY: swapped out, so no new reader can reach it.
            unsafe { guard.defer_destroy(old) };
            debug!(site = %self.name, "call site invalidated");
        }
    }
}

impl Drop for CallSite {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no other thread can hold the snapshot.
        unsafe {
            let guard = epoch::unprotected();
            let snapshot = self.cache.load(Ordering::Relaxed, guard);
            if !snapshot.is_null() {
                drop(snapshot.into_owned());
            }
        }
    }
}

fn receiver_class(
    registry: &MetaClassRegistry,
    receiver: &Value,
    name: &str,
) -> RuntimeResult<(Arc<MetaClass>, bool)> {
    registry.class_of(receiver).map_err(|err| match err {
        RuntimeError::NullReceiver { .. } => RuntimeError::NullReceiver {
            member: format!("method {}()", name),
        },
        other => other,
    })
}

/// Resolve `name` on `receiver` without consulting any cache
pub fn resolve_uncached(
    registry: &MetaClassRegistry,
    receiver: &Value,
    name: &str,
    args: &[Value],
) -> RuntimeResult<Arc<MethodTarget>> {
    let (class, static_receiver) = receiver_class(registry, receiver, name)?;
    resolve_in(registry, &class, static_receiver, name, args)
}

/// Receiver's own methods, then overlays, then superclasses, then a
/// missing-method hook
fn resolve_in(
    registry: &MetaClassRegistry,
    class: &Arc<MetaClass>,
    static_receiver: bool,
    name: &str,
    args: &[Value],
) -> RuntimeResult<Arc<MethodTarget>> {
    if let Some(target) = class.select(registry, name, args, static_receiver) {
        return Ok(target);
    }
    if let Some(target) = overlay::find(registry, class, name, args, static_receiver) {
        return Ok(target);
    }
    let chain = registry.superclass_chain(class);
    for meta in chain.iter().skip(1) {
        if let Some(target) = meta.select(registry, name, args, static_receiver) {
            return Ok(target);
        }
    }
    if let Some(hook) = chain.iter().find_map(|meta| meta.missing_method()) {
        return Ok(Arc::new(MethodTarget::missing(name, hook)));
    }
    Err(RuntimeError::NoSuchMethod {
        receiver: class.name().to_string(),
        method: name.to_string(),
        args: args.iter().map(Value::type_name).collect::<Vec<_>>().join(", "),
    })
}

/// Identity of a call site: declaring class and site index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteId {
    /// Class whose constant pool declares the site
    pub class: String,
    /// Site index within that class
    pub index: u32,
}

/// Every call site of a program, created on first use
#[derive(Debug, Default)]
pub struct CallSiteTable {
    sites: DashMap<SiteId, Arc<CallSite>>,
}

impl CallSiteTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Site for `id`, created with `name` and `arity` on first use
    pub fn site(&self, id: SiteId, name: &str, arity: usize) -> Arc<CallSite> {
        Arc::clone(
            self.sites
                .entry(id)
                .or_insert_with(|| Arc::new(CallSite::new(name, arity)))
                .value(),
        )
    }

    /// Number of sites created so far
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// Whether no site has been used
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Drop the cached entries of every site
    pub fn invalidate_all(&self) {
        for site in self.sites.iter() {
            site.value().invalidate();
        }
    }

    /// Counters summed over every site
    pub fn totals(&self) -> SiteCounters {
        let totals = SiteCounters::default();
        for site in self.sites.iter() {
            totals.absorb(site.value().counters());
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ArrayValue, Instance};

    #[test]
    fn test_shape_distinguishes_argument_classes() {
        let ints = ArgShape::of(&[Value::Int(1)]);
        assert_eq!(ints, ArgShape::of(&[Value::Int(7)]));
        assert_ne!(ints, ArgShape::of(&[Value::Long(1)]));
        assert_ne!(ints, ArgShape::of(&[Value::Int(1), Value::Int(1)]));
        assert_ne!(ArgShape::of(&[]), ArgShape::of(&[Value::Null]));
    }

    #[test]
    fn test_array_shape_differs_from_component() {
        let array = Value::Array(Arc::new(ArrayValue::new("Integer", 2)));
        let shape = ArgShape::of(&[array.clone()]);
        assert_ne!(shape, ArgShape::of(&[Value::Int(1)]));
        assert!(shape.matches(&[array]));
        assert!(!shape.matches(&[Value::Int(1)]));
        assert!(!shape.matches(&[]));
        assert_eq!(shape.arity(), 1);
    }

    #[test]
    fn test_array_and_component_overloads_stay_apart() {
        let registry = MetaClassRegistry::with_builtins();
        let sink = MetaClass::new("Sink", Some("Object"));
        sink.add_method(MethodTarget::native("Sink", "take", &["Integer"], "String", |_, _, _| {
            Ok(Value::string("one"))
        }));
        sink.add_method(MethodTarget::native("Sink", "take", &["Integer[]"], "String", |_, _, _| {
            Ok(Value::string("many"))
        }));
        registry.register(Arc::new(sink));
        let receiver = Value::Object(Arc::new(Instance::new("Sink", Default::default())));

        let site = CallSite::new("take", 1);
        let single = site.resolve(&registry, &receiver, &[Value::Int(1)]).unwrap();
        let array = Value::Array(Arc::new(ArrayValue::new("Integer", 1)));
        let many = site.resolve(&registry, &receiver, &[array]).unwrap();
        assert!(!Arc::ptr_eq(&single, &many));
        assert_eq!(site.entry_count(), 2);
        assert_eq!(site.counters().hits(), 0);
    }

    #[test]
    fn test_second_lookup_hits() {
        let registry = MetaClassRegistry::with_builtins();
        let site = CallSite::new("size", 0);
        let receiver = Value::list(vec![Value::Int(1)]);
        let first = site.resolve(&registry, &receiver, &[]).unwrap();
        let second = site.resolve(&registry, &receiver, &[]).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(site.counters().misses(), 1);
        assert_eq!(site.counters().hits(), 1);
        assert_eq!(site.entry_count(), 1);
    }

    #[test]
    fn test_oldest_entry_is_evicted() {
        let registry = MetaClassRegistry::with_builtins();
        let site = CallSite::new("toString", 0);
        let receivers = [
            Value::Int(1),
            Value::Long(1),
            Value::Double(1.0),
            Value::Float(1.0),
            Value::Short(1),
            Value::Byte(1),
            Value::string("s"),
            Value::Char('c'),
            Value::Boolean(true),
        ];
        for receiver in &receivers {
            site.resolve(&registry, receiver, &[]).unwrap();
        }
        assert_eq!(site.entry_count(), POLYMORPHIC_LIMIT);
        site.resolve(&registry, &receivers[0], &[]).unwrap();
        assert_eq!(site.counters().hits(), 0);
        site.resolve(&registry, &receivers[8], &[]).unwrap();
        assert_eq!(site.counters().hits(), 1);
    }

    #[test]
    fn test_invalidate_clears_entries() {
        let registry = MetaClassRegistry::with_builtins();
        let site = CallSite::new("size", 0);
        site.resolve(&registry, &Value::string("abc"), &[]).unwrap();
        site.invalidate();
        assert_eq!(site.entry_count(), 0);
        site.resolve(&registry, &Value::string("abc"), &[]).unwrap();
        assert_eq!(site.counters().misses(), 2);
    }

    #[test]
    fn test_unknown_method_fails_without_install() {
        let registry = MetaClassRegistry::with_builtins();
        let site = CallSite::new("frobnicate", 1);
        let err = site.resolve(&registry, &Value::Int(1), &[Value::string("x")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "No signature of method: Integer.frobnicate() is applicable for argument types: (String)"
        );
        assert_eq!(site.entry_count(), 0);
        assert!(matches!(
            site.resolve(&registry, &Value::Null, &[Value::Int(1)]),
            Err(RuntimeError::NullReceiver { .. })
        ));
    }

    #[test]
    fn test_table_reuses_sites() {
        let table = CallSiteTable::new();
        let id = SiteId {
            class: "Main".into(),
            index: 3,
        };
        let a = table.site(id.clone(), "plus", 1);
        let b = table.site(id, "plus", 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(table.len(), 1);
    }
}
