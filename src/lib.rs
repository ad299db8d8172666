// Ogg 视频播放引擎
//
// 一个后台解码线程（生产者）驱动外接的音视频解码器，把成品塞进两个
// 固定容量的单生产者/单消费者环形缓冲；宿主的渲染/音频回调作为消费者，
// 经呈现调度按时钟取帧、按 FIFO 取音频块。时长探测独立于播放管线，
// 只扫容器尾部。
//
// 典型用法（audio-output 特性启用时）：
//
//   let mut session = Session::start(file, vorbis, theora, PlayerConfig::default())?;
//   let mut output = AudioOutput::new(session.stream_info().sample_rate)?;
//   if let Some(feed) = session.take_audio_feed() { output.start(feed)?; }
//   while session.is_active() { session.video_tick(&mut texture); /* 渲染 */ }
//   output.stop();    // 先停输出端
//   session.stop();   // 再拆会话

pub mod core;
pub mod player;

pub use crate::core::{
    AudioChunk, AudioParams, PixelFormat, PlaybackClock, PlayerConfig, PlayerError, Result,
    StreamInfo, VideoFrame, VideoParams, MAX_VOLUME,
};
pub use player::codec::{AudioDecoder, PcmBlock, PictureRef, PlaneRef, VideoDecoder};
#[cfg(feature = "audio-output")]
pub use player::AudioOutput;
pub use player::{probe_duration_ms, AudioFeed, Session, VideoSink};
