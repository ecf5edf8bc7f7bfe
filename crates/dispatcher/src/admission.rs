//! 准入控制器
//!
//! 回答"现在是否还有空闲执行容量"，并暴露当前占用情况。
//! 自身不执行任何工作；不提供阻塞等待，调用方在下一轮调度中重新轮询。

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::debug;

pub struct AdmissionController {
    capacity: u32,
    active: AtomicU32,
}

impl AdmissionController {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            active: AtomicU32::new(0),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn active(&self) -> u32 {
        self.active.load(Ordering::SeqCst)
    }

    pub fn has_capacity(&self) -> bool {
        self.active() < self.capacity
    }

    pub fn available_slots(&self) -> u32 {
        self.capacity.saturating_sub(self.active())
    }

    /// 占用一个执行槽位；已满时返回 false，绝不超发
    pub fn try_acquire(&self) -> bool {
        let mut current = self.active.load(Ordering::SeqCst);
        loop {
            if current >= self.capacity {
                debug!("执行容量已满 ({}/{})", current, self.capacity);
                return false;
            }
            match self.active.compare_exchange(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// 释放一个执行槽位，从任意线程调用均安全
    pub fn release(&self) {
        let mut current = self.active.load(Ordering::SeqCst);
        loop {
            if current == 0 {
                debug!("准入计数已为0，忽略多余的release");
                return;
            }
            match self.active.compare_exchange(
                current,
                current - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_capacity_accounting() {
        let controller = AdmissionController::new(2);
        assert!(controller.has_capacity());
        assert_eq!(controller.available_slots(), 2);

        assert!(controller.try_acquire());
        assert!(controller.try_acquire());
        assert!(!controller.has_capacity());
        assert!(!controller.try_acquire());
        assert_eq!(controller.active(), 2);

        controller.release();
        assert_eq!(controller.available_slots(), 1);
        assert!(controller.try_acquire());
    }

    #[test]
    fn test_release_never_underflows() {
        let controller = AdmissionController::new(1);
        controller.release();
        assert_eq!(controller.active(), 0);
    }

    #[test]
    fn test_concurrent_acquire_respects_ceiling() {
        let controller = Arc::new(AdmissionController::new(8));
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let controller = Arc::clone(&controller);
                std::thread::spawn(move || controller.try_acquire())
            })
            .collect();
        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|granted| *granted)
            .count();
        assert_eq!(granted, 8);
        assert_eq!(controller.active(), 8);
        assert!(!controller.has_capacity());
    }
}
