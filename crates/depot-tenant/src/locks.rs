use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use depot_types::TenantId;

/// A registry of per-tenant mutexes, created lazily on first reference.
///
/// Acquisition order is always `tenant_mutex -> store_handle`. Callers
/// acquire a tenant's lock once per operation and call the stores directly
/// from inside that closure; none of them re-enter [`with_tenant_lock`] for
/// the same tenant, so there is no re-entrant case to guard against.
///
/// [`with_tenant_lock`]: TenantLocks::with_tenant_lock
#[derive(Default)]
pub struct TenantLocks {
    locks: RwLock<HashMap<TenantId, Arc<Mutex<()>>>>,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, tenant_id: &TenantId) -> Arc<Mutex<()>> {
        if let Some(existing) = self
            .locks
            .read()
            .expect("tenant lock registry poisoned")
            .get(tenant_id)
        {
            return existing.clone();
        }
        let mut write_guard = self.locks.write().expect("tenant lock registry poisoned");
        write_guard
            .entry(tenant_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Runs `f` with the named tenant's mutex held for the duration of the
    /// call. Blocks every other operation on the same tenant until `f`
    /// returns.
    pub fn with_tenant_lock<R>(&self, tenant_id: &TenantId, f: impl FnOnce() -> R) -> R {
        let mutex = self.handle(tenant_id);
        let _guard = mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;

    #[test]
    fn serializes_access_for_same_tenant() {
        let locks = Arc::new(TenantLocks::new());
        let counter = Arc::new(AtomicU32::new(0));
        let tenant = TenantId::new("t1");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let counter = counter.clone();
                let tenant = tenant.clone();
                thread::spawn(move || {
                    locks.with_tenant_lock(&tenant, || {
                        let before = counter.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(1));
                        assert_eq!(counter.load(Ordering::SeqCst), before + 1);
                    });
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }
}
