use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use crate::datastore::{Core, compact_locked};

pub(crate) struct AutocompactionHandle {
    shutdown: Arc<AtomicBool>,
    notify: Arc<(Mutex<()>, Condvar)>,
    handle: Option<thread::JoinHandle<()>>,
}

impl AutocompactionHandle {
    pub(crate) fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.notify.1.notify_one();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AutocompactionHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn the periodic compaction thread. Each tick queues one compaction
/// through the executor; ticks before the store is loaded are skipped so
/// the thread never parks in the not-ready buffer.
pub(crate) fn spawn(core: Arc<Core>, interval: Duration) -> AutocompactionHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let notify = Arc::new((Mutex::new(()), Condvar::new()));
    let tick_flag = Arc::clone(&shutdown);
    let tick_notify = Arc::clone(&notify);
    let handle = thread::spawn(move || {
        loop {
            let (lock, cvar) = &*tick_notify;
            let guard = lock.lock().unwrap();
            let _ = cvar.wait_timeout(guard, interval).unwrap();
            if tick_flag.load(Ordering::Relaxed) {
                break;
            }
            if !core.executor.is_ready() {
                continue;
            }
            let _ = core.executor.submit(false, || {
                let mut state = core.state.lock().unwrap();
                compact_locked(&core, &mut state)
            });
        }
    });

    AutocompactionHandle {
        shutdown,
        notify,
        handle: Some(handle),
    }
}
