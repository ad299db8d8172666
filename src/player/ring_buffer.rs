use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 单生产者/单消费者环形缓冲
///
/// head 只由生产者推进，tail 只由消费者推进，每个索引有且只有一个写者。
/// 槽位载荷必须在 head 推进之前写完、在 tail 推进之后不再被引用，
/// 除索引的发布顺序外不依赖任何其他同步手段。
/// 故意保留一个空槽：head == tail 表示空，(head + 1) % capacity == tail 表示满，
/// 不需要额外的计数器就能区分两种状态。
struct RingInner<T> {
    slots: Box<[UnsafeCell<T>]>,
    /// 下一个写入位置，仅生产者修改
    head: AtomicUsize,
    /// 下一个读取位置，仅消费者修改
    tail: AtomicUsize,
}

// 槽位访问由索引约定保证互斥：生产者只碰 head 指向的空闲槽，
// 消费者只碰 [tail, head) 区间内的已发布槽，两个区间不相交
unsafe impl<T: Send> Send for RingInner<T> {}
unsafe impl<T: Send> Sync for RingInner<T> {}

impl<T> RingInner<T> {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (head + self.capacity() - tail) % self.capacity()
    }
}

/// 创建一对生产者/消费者句柄
///
/// capacity 为槽位数，实际可同时容纳 capacity - 1 个元素。
/// 两个句柄都不可克隆，单写者约束由类型系统保证。
pub fn ring_buffer<T: Default>(capacity: usize) -> (RingProducer<T>, RingConsumer<T>) {
    assert!(capacity >= 2, "环形缓冲至少需要 2 个槽位");
    let slots: Box<[UnsafeCell<T>]> = (0..capacity).map(|_| UnsafeCell::new(T::default())).collect();
    let inner = Arc::new(RingInner {
        slots,
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
    });
    (
        RingProducer {
            inner: inner.clone(),
        },
        RingConsumer { inner },
    )
}

/// 生产者句柄
pub struct RingProducer<T> {
    inner: Arc<RingInner<T>>,
}

impl<T> RingProducer<T> {
    /// 尝试就地写入一个元素
    ///
    /// fill 直接在槽位上构造内容，同一槽位上一轮留下的堆分配得以复用。
    /// fill 返回 false 表示放弃本次写入（比如载荷分配失败），索引不推进，
    /// 该单元被丢弃。缓冲满时返回 false，调用方自行退避，绝不覆盖未读数据。
    pub fn try_push_with(&mut self, fill: impl FnOnce(&mut T) -> bool) -> bool {
        let head = self.inner.head.load(Ordering::Relaxed);
        let next = (head + 1) % self.inner.capacity();
        if next == self.inner.tail.load(Ordering::Acquire) {
            return false; // 满
        }
        // head 指向的槽位不在消费者可见区间内，生产者独占访问
        let slot = unsafe { &mut *self.inner.slots[head].get() };
        if !fill(slot) {
            return false;
        }
        self.inner.head.store(next, Ordering::Release);
        true
    }

    pub fn is_full(&self) -> bool {
        self.inner.len() + 1 == self.inner.capacity()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }
}

/// 消费者句柄
pub struct RingConsumer<T> {
    inner: Arc<RingInner<T>>,
}

impl<T> RingConsumer<T> {
    /// 读取队首起第 offset 个元素（不出队）
    pub fn peek_with<R>(&self, offset: usize, f: impl FnOnce(&T) -> R) -> Option<R> {
        let head = self.inner.head.load(Ordering::Acquire);
        let tail = self.inner.tail.load(Ordering::Relaxed);
        let cap = self.inner.capacity();
        let avail = (head + cap - tail) % cap;
        if offset >= avail {
            return None;
        }
        // [tail, head) 区间内的槽位已被生产者发布，此后只有消费者访问
        let slot = unsafe { &*self.inner.slots[(tail + offset) % cap].get() };
        Some(f(slot))
    }

    /// 出队一个元素
    ///
    /// f 对槽位载荷的访问在 tail 推进之前完成；f 返回后槽位即归还给生产者，
    /// 载荷留在槽位里等待下一轮复用。
    pub fn pop_with<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let head = self.inner.head.load(Ordering::Acquire);
        let tail = self.inner.tail.load(Ordering::Relaxed);
        if head == tail {
            return None; // 空
        }
        let slot = unsafe { &mut *self.inner.slots[tail].get() };
        let ret = f(slot);
        self.inner
            .tail
            .store((tail + 1) % self.inner.capacity(), Ordering::Release);
        Some(ret)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// 只读的占用量观察者，供会话生命周期查询，不参与消费
    pub fn watch(&self) -> RingWatcher<T> {
        RingWatcher {
            inner: self.inner.clone(),
        }
    }
}

/// 环形缓冲的只读观察者
///
/// 读到的占用量只作空/非空探测用，对另一侧来说是最终一致的
pub struct RingWatcher<T> {
    inner: Arc<RingInner<T>>,
}

impl<T> RingWatcher<T> {
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn push_value(producer: &mut RingProducer<u64>, v: u64) -> bool {
        producer.try_push_with(|slot| {
            *slot = v;
            true
        })
    }

    #[test]
    fn test_fifo_order() {
        let (mut tx, mut rx) = ring_buffer::<u64>(8);
        for v in 0..7 {
            assert!(push_value(&mut tx, v));
        }
        for v in 0..7 {
            assert_eq!(rx.pop_with(|slot| *slot), Some(v));
        }
        assert_eq!(rx.pop_with(|slot| *slot), None);
    }

    #[test]
    fn test_full_rejects_without_overwrite() {
        let (mut tx, mut rx) = ring_buffer::<u64>(4);
        // 容量 4 实际能装 3 个
        assert!(push_value(&mut tx, 10));
        assert!(push_value(&mut tx, 11));
        assert!(push_value(&mut tx, 12));
        assert!(tx.is_full());
        assert!(!push_value(&mut tx, 13));
        // 最老的未读元素保持原样
        assert_eq!(rx.peek_with(0, |slot| *slot), Some(10));
        assert_eq!(rx.pop_with(|slot| *slot), Some(10));
        // 腾出一格后又能写入
        assert!(push_value(&mut tx, 13));
        assert_eq!(rx.pop_with(|slot| *slot), Some(11));
    }

    #[test]
    fn test_fill_abort_drops_unit() {
        let (mut tx, rx) = ring_buffer::<u64>(4);
        assert!(!tx.try_push_with(|_| false));
        assert!(rx.is_empty());
    }

    #[test]
    fn test_peek_offsets() {
        let (mut tx, rx) = ring_buffer::<u64>(4);
        push_value(&mut tx, 1);
        push_value(&mut tx, 2);
        assert_eq!(rx.peek_with(0, |slot| *slot), Some(1));
        assert_eq!(rx.peek_with(1, |slot| *slot), Some(2));
        assert_eq!(rx.peek_with(2, |slot| *slot), None);
    }

    #[test]
    fn test_slot_storage_reused_across_wraparound() {
        let (mut tx, mut rx) = ring_buffer::<Vec<u8>>(4);
        for round in 0u8..10 {
            assert!(tx.try_push_with(|slot| {
                slot.clear();
                slot.extend_from_slice(&[round; 16]);
                true
            }));
            assert_eq!(rx.pop_with(|slot| slot[0]), Some(round));
        }
    }

    #[test]
    fn test_spsc_across_threads() {
        const N: u64 = 10_000;
        let (mut tx, mut rx) = ring_buffer::<u64>(32);
        let producer = thread::spawn(move || {
            for v in 0..N {
                while !tx.try_push_with(|slot| {
                    *slot = v;
                    true
                }) {
                    thread::yield_now();
                }
            }
        });
        let mut expected = 0;
        while expected < N {
            if let Some(v) = rx.pop_with(|slot| *slot) {
                assert_eq!(v, expected);
                expected += 1;
            } else {
                thread::yield_now();
            }
        }
        producer.join().unwrap();
        assert!(rx.is_empty());
    }

    #[test]
    fn test_watcher_tracks_occupancy() {
        let (mut tx, mut rx) = ring_buffer::<u64>(4);
        let watch = rx.watch();
        assert!(watch.is_empty());
        push_value(&mut tx, 1);
        push_value(&mut tx, 2);
        assert_eq!(watch.len(), 2);
        rx.pop_with(|_| ());
        assert_eq!(watch.len(), 1);
    }
}
