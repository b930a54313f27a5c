use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicBool, AtomicI64, Ordering},
    },
};

use {chatrelay_channels::ChannelHealthSnapshot, chatrelay_common::time::unix_now_ms};

/// Per-account runtime counters reported by `probe`.
///
/// Timestamps are milliseconds since the Unix epoch; 0 means "never".
#[derive(Debug, Default)]
pub struct AccountRuntime {
    running: AtomicBool,
    last_start_at: AtomicI64,
    last_stop_at: AtomicI64,
    last_inbound_at: AtomicI64,
    last_outbound_at: AtomicI64,
    last_error: Mutex<Option<String>>,
}

fn non_zero(value: &AtomicI64) -> Option<i64> {
    Some(value.load(Ordering::Relaxed)).filter(|v| *v != 0)
}

impl AccountRuntime {
    pub fn mark_started(&self) {
        self.running.store(true, Ordering::Relaxed);
        self.last_start_at.store(unix_now_ms(), Ordering::Relaxed);
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn mark_stopped(&self) {
        self.running.store(false, Ordering::Relaxed);
        self.last_stop_at.store(unix_now_ms(), Ordering::Relaxed);
    }

    pub fn record_inbound(&self) {
        self.last_inbound_at.store(unix_now_ms(), Ordering::Relaxed);
    }

    pub fn record_outbound(&self) {
        self.last_outbound_at.store(unix_now_ms(), Ordering::Relaxed);
    }

    pub fn record_error(&self, error: impl ToString) {
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(error.to_string());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, account_id: &str, configured: bool) -> ChannelHealthSnapshot {
        ChannelHealthSnapshot {
            account_id: account_id.to_string(),
            configured,
            running: self.is_running(),
            last_start_at: non_zero(&self.last_start_at),
            last_stop_at: non_zero(&self.last_stop_at),
            last_error: self
                .last_error
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
            last_inbound_at: non_zero(&self.last_inbound_at),
            last_outbound_at: non_zero(&self.last_outbound_at),
            details: None,
        }
    }
}

/// Runtime counters for every account touched since startup.
#[derive(Debug, Clone, Default)]
pub struct RuntimeRegistry {
    inner: Arc<RwLock<HashMap<String, Arc<AccountRuntime>>>>,
}

impl RuntimeRegistry {
    pub fn get_or_create(&self, account_id: &str) -> Arc<AccountRuntime> {
        {
            let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
            if let Some(runtime) = map.get(account_id) {
                return Arc::clone(runtime);
            }
        }
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(map.entry(account_id.to_string()).or_default())
    }

    pub fn get(&self, account_id: &str) -> Option<Arc<AccountRuntime>> {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.get(account_id).cloned()
    }
}
