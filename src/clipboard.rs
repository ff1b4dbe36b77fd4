//! Clipboard snapshot service: the single access point to the OS clipboard.

use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use log::debug;

use crate::error::{AssistError, Result};
use crate::platform::ClipboardBackend;

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(5);

pub struct ClipboardService {
    backend: Arc<dyn ClipboardBackend>,
    lock: Mutex<()>,
    lock_timeout: Duration,
}

/// Exclusive access to the clipboard for the lifetime of the value.
/// Dropping it releases the lock on every exit path, including unwinding.
pub struct ClipboardScope<'a> {
    backend: &'a dyn ClipboardBackend,
    _guard: MutexGuard<'a, ()>,
}

impl ClipboardService {
    pub fn new(backend: Arc<dyn ClipboardBackend>, lock_timeout: Duration) -> Self {
        Self {
            backend,
            lock: Mutex::new(()),
            lock_timeout,
        }
    }

    /// Waits at most `lock_timeout` for exclusive access.
    pub fn scoped_acquire(&self) -> Result<ClipboardScope<'_>> {
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            match self.lock.try_lock() {
                Ok(guard) => return Ok(self.scope(guard)),
                // A panic inside a previous scope cannot leave the clipboard half-written.
                Err(TryLockError::Poisoned(poisoned)) => {
                    return Ok(self.scope(poisoned.into_inner()))
                }
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(AssistError::DeviceRead(format!(
                            "clipboard lock not acquired within {}ms",
                            self.lock_timeout.as_millis()
                        )));
                    }
                    std::thread::sleep(LOCK_RETRY_INTERVAL);
                }
            }
        }
    }

    fn scope<'a>(&'a self, guard: MutexGuard<'a, ()>) -> ClipboardScope<'a> {
        ClipboardScope {
            backend: self.backend.as_ref(),
            _guard: guard,
        }
    }

    pub fn read(&self) -> Option<String> {
        match self.scoped_acquire() {
            Ok(scope) => scope.read(),
            Err(e) => {
                debug!("clipboard read skipped: {e}");
                None
            }
        }
    }

    pub fn write(&self, text: &str) -> Result<()> {
        self.scoped_acquire()
            .map_err(|e| AssistError::ClipboardWrite(e.to_string()))?
            .write(text)
    }
}

impl ClipboardScope<'_> {
    /// Current clipboard text. Access failures read as absence.
    pub fn read(&self) -> Option<String> {
        match self.backend.read_text() {
            Ok(text) => text,
            Err(e) => {
                debug!("clipboard read failed: {e}");
                None
            }
        }
    }

    pub fn write(&self, text: &str) -> Result<()> {
        self.backend.write_text(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::MemoryClipboard;

    fn service(backend: Arc<MemoryClipboard>) -> ClipboardService {
        ClipboardService::new(backend, Duration::from_millis(20))
    }

    #[test]
    fn test_read_returns_text() {
        let clipboard = MemoryClipboard::with_text("hello");
        assert_eq!(service(clipboard).read().as_deref(), Some("hello"));
    }

    #[test]
    fn test_empty_clipboard_reads_as_none() {
        assert_eq!(service(MemoryClipboard::empty()).read(), None);
    }

    #[test]
    fn test_backend_failure_is_swallowed() {
        let clipboard = MemoryClipboard::with_text("hello");
        clipboard.fail_next_reads(1);
        let service = service(clipboard);

        assert_eq!(service.read(), None);
        assert_eq!(service.read().as_deref(), Some("hello"));
    }

    #[test]
    fn test_write_replaces_content() {
        let clipboard = MemoryClipboard::with_text("old");
        service(clipboard.clone()).write("new").unwrap();

        assert_eq!(clipboard.text().as_deref(), Some("new"));
        assert_eq!(clipboard.writes(), vec!["new".to_string()]);
    }

    #[test]
    fn test_acquire_times_out_while_held() {
        let service = service(MemoryClipboard::empty());
        let _held = service.scoped_acquire().unwrap();

        assert!(matches!(
            service.scoped_acquire(),
            Err(AssistError::DeviceRead(_))
        ));
        assert_eq!(service.read(), None);
        assert!(matches!(
            service.write("x"),
            Err(AssistError::ClipboardWrite(_))
        ));
    }

    #[test]
    fn test_lock_released_after_scope_drops() {
        let service = service(MemoryClipboard::with_text("a"));
        {
            let scope = service.scoped_acquire().unwrap();
            assert_eq!(scope.read().as_deref(), Some("a"));
        }
        assert!(service.scoped_acquire().is_ok());
    }

    #[test]
    fn test_lock_released_after_panic_in_scope() {
        let service = Arc::new(service(MemoryClipboard::with_text("a")));
        let cloned = Arc::clone(&service);
        let outcome = std::thread::spawn(move || {
            let _scope = cloned.scoped_acquire().unwrap();
            panic!("probe blew up");
        })
        .join();

        assert!(outcome.is_err());
        assert_eq!(service.read().as_deref(), Some("a"));
    }
}
