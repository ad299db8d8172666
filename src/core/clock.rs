use std::time::Instant;

/// 播放时钟 - 会话级单调时钟
///
/// 基准点在会话完成初始缓冲时设定一次，之后音视频同步全靠
/// 各帧携带的显示时刻与这个时钟比较，不靠缓冲索引对齐。
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    base_instant: Instant,
}

impl PlaybackClock {
    /// 以当前时刻为基准启动时钟
    pub fn start() -> Self {
        Self {
            base_instant: Instant::now(),
        }
    }

    /// 当前播放时间（毫秒，相对基准点）
    pub fn now_ms(&self) -> u64 {
        self.base_instant.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_monotonic() {
        let clock = PlaybackClock::start();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
