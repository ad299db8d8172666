use crate::core::{PlayerError, Result};
use crate::player::scheduler::AudioFeed;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig, SupportedStreamConfigRange};
use log::{debug, info, warn};

/// 音频输出 - 用 cpal 把会话的音频消费端接到输出设备
///
/// 拉取模型：设备回调向 AudioFeed 索要下一段就绪的 PCM。
/// 会话输出固定为交错 16 位双声道，这里按设备要求转成 f32 送出。
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
}

// cpal::Stream 本身不是 Send，但 AudioOutput 只在创建它的线程中使用，
// 不会跨线程传递
unsafe impl Send for AudioOutput {}

impl AudioOutput {
    /// 创建音频输出（采样率必须与流一致，引擎不做重采样）
    pub fn new(sample_rate: u32) -> Result<Self> {
        info!("初始化音频输出: {} Hz, 2 声道", sample_rate);

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::AudioError("无法找到音频输出设备".to_string()))?;

        debug!("使用音频设备: {}", device.name().unwrap_or_default());

        let config = StreamConfig {
            channels: 2,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let supported = device
            .supported_output_configs()
            .map_err(|e| PlayerError::AudioError(format!("无法获取支持的音频配置: {}", e)))?;
        let compatible = supported.into_iter().any(|s| Self::is_config_compatible(&config, &s));
        if !compatible {
            return Err(PlayerError::AudioError(format!(
                "音频设备不支持 {} Hz 双声道输出",
                sample_rate
            )));
        }

        Ok(Self {
            device,
            config,
            stream: None,
        })
    }

    /// 检查配置是否兼容
    fn is_config_compatible(config: &StreamConfig, supported: &SupportedStreamConfigRange) -> bool {
        let rate_in_range = config.sample_rate.0 >= supported.min_sample_rate().0
            && config.sample_rate.0 <= supported.max_sample_rate().0;

        let channels_match = config.channels == supported.channels();

        rate_in_range && channels_match
    }

    /// 开始播放，feed 移交给设备回调
    pub fn start(&mut self, mut feed: AudioFeed) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let mut pending: Vec<i16> = Vec::new();
        let mut offset = 0usize;

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for sample in data.iter_mut() {
                        if offset >= pending.len() {
                            match feed.next_chunk() {
                                Some(chunk) if !chunk.samples.is_empty() => {
                                    pending = chunk.samples;
                                    offset = 0;
                                }
                                _ => {
                                    *sample = 0.0;
                                    continue;
                                }
                            }
                        }
                        *sample = f32::from(pending[offset]) / 32768.0;
                        offset += 1;
                    }
                },
                move |err| {
                    warn!("⚠️ 音频流错误: {}", err);
                },
                None,
            )
            .map_err(|e| PlayerError::AudioError(format!("创建音频流失败: {}", e)))?;

        stream
            .play()
            .map_err(|e| PlayerError::AudioError(format!("启动音频流失败: {}", e)))?;

        self.stream = Some(stream);
        info!("🔊 音频输出已启动");

        Ok(())
    }

    /// 停止播放
    ///
    /// 必须在 Session::stop 之前调用，让输出回调先停止拉取
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!("音频输出已停止");
        }
    }

    /// 获取实际使用的音频配置
    pub fn get_config(&self) -> (u32, u16) {
        (self.config.sample_rate.0, self.config.channels)
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
