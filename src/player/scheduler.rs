use crate::core::{AudioChunk, VideoFrame};
use crate::player::ring_buffer::RingConsumer;
use crate::player::session::SharedState;
use log::debug;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

/// 视频呈现的输出端
///
/// 每次收到一帧紧凑平面 4:2:0 数据，缓冲长度为宽 x 高 x 3 / 2（偶数尺寸下）。
/// 帧引用只在本次调用内有效，输出端要把数据拷进自己的显示缓冲。
pub trait VideoSink {
    fn present(&mut self, frame: &VideoFrame);
}

/// 视频呈现调度 - 根据播放时钟决定本 tick 显示、跳过还是按兵不动
pub(crate) struct VideoScheduler {
    queue: RingConsumer<VideoFrame>,
    /// 期望帧间隔（毫秒），由协商到的帧率分数折算
    frame_interval_ms: u64,
}

impl VideoScheduler {
    pub fn new(queue: RingConsumer<VideoFrame>, frame_interval_ms: u64) -> Self {
        Self {
            queue,
            frame_interval_ms: frame_interval_ms.max(1),
        }
    }

    /// 在 now_ms 时刻驱动一次呈现，返回是否真的呈现了一帧
    ///
    /// 1. 队列空或队首帧还没到显示时刻：什么都不做，调用方应让出 CPU
    /// 2. 队首帧迟到达到一个帧间隔：向后追赶。只有后一帧也已到期才丢当前帧，
    ///    所以最后一个可用帧绝不会被跳过；追赶中队列见底时，呈现的就是
    ///    最后弹出的那一帧
    /// 3. 恰好呈现一帧并出队
    pub fn present_at(&mut self, now_ms: u64, sink: &mut dyn VideoSink) -> bool {
        let Some(due) = self.queue.peek_with(0, |f| f.presentation_time_ms) else {
            return false;
        };
        if due > now_ms {
            return false; // 未到时
        }
        if now_ms - due >= self.frame_interval_ms {
            let mut dropped = 0u32;
            while self
                .queue
                .peek_with(1, |f| f.presentation_time_ms)
                .is_some_and(|next| next <= now_ms)
            {
                self.queue.pop_with(|_| ());
                dropped += 1;
            }
            if dropped > 0 {
                debug!("⏩ 追帧丢弃 {} 帧", dropped);
            }
        }
        self.queue.pop_with(|frame| sink.present(frame)).is_some()
    }
}

/// 音频消费端 - 交给音频输出回调拉取
///
/// 严格 FIFO，不做时间戳门控：音频节奏由输出设备自己的采样时钟决定，
/// 顺序入队顺序出队即可
pub struct AudioFeed {
    queue: RingConsumer<AudioChunk>,
    shared: Arc<SharedState>,
}

impl AudioFeed {
    pub(crate) fn new(queue: RingConsumer<AudioChunk>, shared: Arc<SharedState>) -> Self {
        Self { queue, shared }
    }

    /// 取下一段就绪的 PCM
    ///
    /// 解码通常快于播放，缓冲暂空时允许短暂等待；但解码收尾或停止请求后
    /// 立即返回 None，绝不让输出端无限期阻塞。
    pub fn next_chunk(&mut self) -> Option<AudioChunk> {
        if !self.shared.has_audio.load(Ordering::Acquire)
            || self.shared.stop.load(Ordering::Acquire)
        {
            return None;
        }
        while self.queue.is_empty() {
            if self.shared.done.load(Ordering::Acquire)
                || self.shared.stop.load(Ordering::Acquire)
            {
                return None;
            }
            thread::yield_now();
        }
        self.queue.pop_with(|c| AudioChunk {
            samples: std::mem::take(&mut c.samples),
            volume: c.volume,
        })
    }
}
