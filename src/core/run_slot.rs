//! 单任务槽位与协作式中止标志
//!
//! RunSlot 用一次 compare-and-swap 保证任意时刻至多一个研究任务；
//! AbortFlag 由异步侧写入、引擎线程轮询，二者都是无锁原子量，可跨 spawn_blocking 线程共享。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 单任务槽位：try_acquire 成功返回 RunGuard，guard 析构即释放
#[derive(Debug, Clone, Default)]
pub struct RunSlot {
    busy: Arc<AtomicBool>,
}

impl RunSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 原子地占用槽位；已被占用时返回 None，不改变任何状态
    pub fn try_acquire(&self) -> Option<RunGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// 槽位占用凭证；无论任务成功、失败还是 panic，drop 时都会释放
#[derive(Debug)]
pub struct RunGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// 协作式中止标志：置位后保持为 true，直到下一次成功启动时复位
#[derive(Debug, Clone, Default)]
pub struct AbortFlag {
    requested: Arc<AtomicBool>,
}

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.requested.store(false, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let slot = RunSlot::new();
        let guard = slot.try_acquire();
        assert!(guard.is_some());
        assert!(slot.is_busy());
        assert!(slot.try_acquire().is_none());

        drop(guard);
        assert!(!slot.is_busy());
        assert!(slot.try_acquire().is_some());
    }

    #[test]
    fn test_guard_released_on_panic() {
        let slot = RunSlot::new();
        let cloned = slot.clone();
        let handle = std::thread::spawn(move || {
            let _guard = cloned.try_acquire().unwrap();
            panic!("engine blew up");
        });
        assert!(handle.join().is_err());
        assert!(!slot.is_busy());
    }

    #[test]
    fn test_abort_flag_is_level_triggered() {
        let flag = AbortFlag::new();
        let seen_by_engine = flag.clone();
        assert!(!seen_by_engine.is_requested());
        flag.request();
        flag.request();
        assert!(seen_by_engine.is_requested());
        flag.reset();
        assert!(!seen_by_engine.is_requested());
    }
}
