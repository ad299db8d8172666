// 播放引擎核心模块

pub mod ring_buffer;
pub mod codec;       // 解码器边界接口
pub(crate) mod producer; // 解码线程（头协商 + 稳态循环）
pub mod session;
pub mod scheduler;
pub mod probe;
#[cfg(feature = "audio-output")]
pub mod audio_output;

#[cfg(test)]
pub(crate) mod testutil;

#[cfg(feature = "audio-output")]
pub use audio_output::AudioOutput;
pub use probe::{find_last_page, probe_duration_ms};
pub use ring_buffer::{ring_buffer, RingConsumer, RingProducer, RingWatcher};
pub use scheduler::{AudioFeed, VideoSink};
pub use session::Session;
