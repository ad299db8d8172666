use crate::core::{PlaybackClock, PlayerConfig, PlayerError, Result, StreamInfo};
use crate::player::codec::{AudioDecoder, VideoDecoder};
use crate::player::producer::run_producer;
use crate::player::ring_buffer::{ring_buffer, RingWatcher};
use crate::player::scheduler::{AudioFeed, VideoScheduler, VideoSink};
use crate::core::{AudioChunk, VideoFrame};
use log::info;
use parking_lot::Mutex;
use std::io::{Read, Seek};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// 轮询间隔 - 启动等待与满环退避共用
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// 环形缓冲槽数上限，超过视为配置错误
const MAX_QUEUE_SIZE: usize = 65536;

// started 标志位：头协商完成 / 首个音频块 / 首帧视频已入队
pub(crate) const STARTED_HEADERS: u8 = 1;
pub(crate) const STARTED_AUDIO: u8 = 2;
pub(crate) const STARTED_VIDEO: u8 = 4;

/// 生产者与消费者共享的生命周期状态
///
/// 字段按单写者划分：started / done / has_* 只由解码线程写，
/// stop 只由会话持有方写，双方只读对方的字段。
pub(crate) struct SharedState {
    pub started: AtomicU8,
    /// 协作式停止请求，解码线程在工作单元之间轮询
    pub stop: AtomicBool,
    /// 解码线程已完全收尾
    pub done: AtomicBool,
    pub has_audio: AtomicBool,
    pub has_video: AtomicBool,
    error: Mutex<Option<PlayerError>>,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self {
            started: AtomicU8::new(0),
            stop: AtomicBool::new(false),
            done: AtomicBool::new(false),
            has_audio: AtomicBool::new(false),
            has_video: AtomicBool::new(false),
            error: Mutex::new(None),
        }
    }

    pub fn mark_started(&self, bit: u8) {
        self.started.fetch_or(bit, Ordering::Release);
    }

    /// 记录终止性解码错误，只保留第一个
    pub fn set_error(&self, e: PlayerError) {
        let mut slot = self.error.lock();
        if slot.is_none() {
            *slot = Some(e);
        }
    }

    pub fn take_error(&self) -> Option<PlayerError> {
        self.error.lock().take()
    }
}

/// 解码会话
///
/// start() 创建，stop() 拆除；一个会话只能播一遍，重播需要新建会话。
/// 停止顺序约定：先停掉还在拉取音频的输出端，再 stop 会话，
/// 缓冲随会话释放。顺序颠倒会让输出回调读到已拆除的缓冲。
pub struct Session {
    shared: Arc<SharedState>,
    info: StreamInfo,
    clock: PlaybackClock,
    video: VideoScheduler,
    audio: Option<AudioFeed>,
    audio_watch: RingWatcher<AudioChunk>,
    video_watch: RingWatcher<VideoFrame>,
    worker: Option<JoinHandle<()>>,
}

impl Session {
    /// 启动解码会话
    ///
    /// 拉起解码线程后阻塞等待：先等流识别完成，再等每个启用的流至少
    /// 缓冲到一个可消费单元（解码立即收尾时提前返回），最后设定播放
    /// 时钟基准。找不到任何可识别的流不算错误，返回的会话两个流标志
    /// 都是 false 且立即不再活跃。
    pub fn start<R, A, V>(
        source: R,
        audio_dec: A,
        video_dec: V,
        config: PlayerConfig,
    ) -> Result<Session>
    where
        R: Read + Seek + Send + 'static,
        A: AudioDecoder + 'static,
        V: VideoDecoder + 'static,
    {
        if config.audio_queue_size < 2
            || config.video_queue_size < 2
            || config.audio_queue_size > MAX_QUEUE_SIZE
            || config.video_queue_size > MAX_QUEUE_SIZE
        {
            return Err(PlayerError::Other(format!(
                "环形缓冲容量越界: audio={} video={}",
                config.audio_queue_size, config.video_queue_size
            )));
        }

        let shared = Arc::new(SharedState::new());
        let (audio_tx, audio_rx) = ring_buffer::<AudioChunk>(config.audio_queue_size);
        let (video_tx, video_rx) = ring_buffer::<VideoFrame>(config.video_queue_size);
        let (info_tx, info_rx) = crossbeam_channel::bounded::<StreamInfo>(1);
        let audio_watch = audio_rx.watch();
        let video_watch = video_rx.watch();

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("producer".into())
            .spawn(move || {
                run_producer(
                    source,
                    audio_dec,
                    video_dec,
                    audio_tx,
                    video_tx,
                    worker_shared,
                    info_tx,
                )
            })
            .map_err(|e| PlayerError::ThreadError(format!("无法创建解码线程: {}", e)))?;

        // 等待解码线程完成流识别
        while shared.started.load(Ordering::Acquire) & STARTED_HEADERS == 0 {
            if worker.is_finished() {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }
        let info = match info_rx.try_recv() {
            Ok(info) => info,
            Err(_) => {
                // 解码线程没能报告流信息，只可能是异常退出
                let _ = worker.join();
                return Err(shared.take_error().unwrap_or_else(|| {
                    PlayerError::ThreadError("解码线程未报告流信息".into())
                }));
            }
        };

        // 等待初始缓冲：每个启用的流至少产出一个单元
        let expected = STARTED_HEADERS
            | if info.has_audio { STARTED_AUDIO } else { 0 }
            | if info.has_video { STARTED_VIDEO } else { 0 };
        while !shared.done.load(Ordering::Acquire)
            && shared.started.load(Ordering::Acquire) != expected
        {
            thread::sleep(POLL_INTERVAL);
        }

        info!(
            "✅ 会话就绪: audio={} video={} {}x{}",
            info.has_audio, info.has_video, info.width, info.height
        );
        Ok(Session {
            shared: shared.clone(),
            info,
            clock: PlaybackClock::start(),
            video: VideoScheduler::new(video_rx, info.frame_interval_ms),
            audio: Some(AudioFeed::new(audio_rx, shared)),
            audio_watch,
            video_watch,
            worker: Some(worker),
        })
    }

    pub fn has_audio(&self) -> bool {
        self.info.has_audio
    }

    pub fn has_video(&self) -> bool {
        self.info.has_video
    }

    pub fn width(&self) -> u32 {
        self.info.width
    }

    pub fn height(&self) -> u32 {
        self.info.height
    }

    pub fn stream_info(&self) -> StreamInfo {
        self.info
    }

    /// 会话是否还有内容可播
    ///
    /// 解码收尾之后，只要任一缓冲里还有未送出的数据就仍算活跃
    pub fn is_active(&self) -> bool {
        !self.shared.stop.load(Ordering::Acquire)
            && (!self.shared.done.load(Ordering::Acquire)
                || !self.audio_watch.is_empty()
                || !self.video_watch.is_empty())
    }

    /// 解码线程是否已收尾（缓冲里可能还有待消费内容）
    pub fn decode_finished(&self) -> bool {
        self.shared.done.load(Ordering::Acquire)
    }

    /// 取走音频消费端，交给音频输出回调；只能取一次
    pub fn take_audio_feed(&mut self) -> Option<AudioFeed> {
        self.audio.take()
    }

    /// 以内部播放时钟驱动一次视频呈现
    pub fn video_tick(&mut self, sink: &mut dyn VideoSink) -> bool {
        let now = self.clock.now_ms();
        self.video_tick_at(now, sink)
    }

    /// 以显式时钟驱动一次视频呈现（毫秒，相对会话起点）
    pub fn video_tick_at(&mut self, now_ms: u64, sink: &mut dyn VideoSink) -> bool {
        if self.shared.stop.load(Ordering::Acquire) {
            return false;
        }
        self.video.present_at(now_ms, sink)
    }

    /// 取走终止性解码错误（解码线程因硬错误提前退出时有值）
    pub fn take_error(&self) -> Option<PlayerError> {
        self.shared.take_error()
    }

    /// 停止并拆除会话
    ///
    /// 置停止请求后阻塞到解码线程完全退出，缓冲随会话释放。
    /// 解码已自然收尾时同样安全，不会悬挂。
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        if let Some(handle) = self.worker.take() {
            info!("⏹ 正在停止解码会话...");
            let _ = handle.join();
            info!("🛑 解码会话已停止");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
