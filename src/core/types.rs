/// 像素格式（色度子采样布局）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 4:2:0 子采样，播放管线唯一支持的格式
    Yuv420,
    /// 4:2:2 子采样
    Yuv422,
    /// 4:4:4 全采样
    Yuv444,
    /// 其他 / 未知
    Other,
}

/// 最大音量（与 SDL mixer 的 MIX_MAX_VOLUME 取值一致，引擎不做运行时混音）
pub const MAX_VOLUME: u8 = 128;

/// 一段已解码的音频 - 交错 16 位有符号 PCM，固定双声道
#[derive(Debug, Default)]
pub struct AudioChunk {
    pub samples: Vec<i16>,
    pub volume: u8,
}

impl AudioChunk {
    /// 采样点总数（左右声道合计）
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// 一帧已解码的视频
///
/// 像素数据是紧凑的平面 4:2:0 布局：全分辨率 Y 平面，
/// 后接两个 1/4 分辨率的色度平面。缓冲在槽位首次使用时一次性分配，
/// 之后按槽位复用，会话期间不再扩缩。
#[derive(Debug, Default)]
pub struct VideoFrame {
    /// 显示时刻（毫秒，相对解码会话起点，单调递增）
    pub presentation_time_ms: u64,
    pub pixel_buffer: Vec<u8>,
}

/// 音频流参数（头协商完成后由解码器给出）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioParams {
    pub sample_rate: u32,
    /// 源声道数；输出一律折算为双声道（单声道复制到左右两路）
    pub channels: u16,
}

/// 视频流参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoParams {
    /// 编码帧尺寸（宏块对齐后的外框）
    pub frame_width: u32,
    pub frame_height: u32,
    /// 声明的可见画面矩形
    pub pic_width: u32,
    pub pic_height: u32,
    pub pic_x: u32,
    pub pic_y: u32,
    pub pixel_format: PixelFormat,
    /// 帧率分数 fps = fps_numerator / fps_denominator
    pub fps_numerator: u32,
    pub fps_denominator: u32,
    /// granule position 中关键帧计数占用的高位位数
    pub keyframe_granule_shift: u8,
    /// 编解码器版本 (major, minor, subminor)
    pub version: (u8, u8, u8),
}

impl VideoParams {
    /// 版本号不低于给定三元组（libtheora 的 TH_VERSION_CHECK 约定）
    pub fn version_at_least(&self, major: u8, minor: u8, subminor: u8) -> bool {
        self.version >= (major, minor, subminor)
    }

    /// granule position 分解为帧序数
    ///
    /// 高位是关键帧计数、低位是帧内偏移，3.2.1 之前的码流两者基准差一。
    /// 该修正项与参考解码器逐位一致，时长与显示时刻都依赖它，不要改动。
    pub fn granule_frame_index(&self, granulepos: i64) -> i64 {
        let shift = u32::from(self.keyframe_granule_shift);
        let iframe = granulepos >> shift;
        let pframe = granulepos - (iframe << shift);
        iframe + pframe - i64::from(self.version_at_least(3, 2, 1))
    }

    /// granule position 换算为显示时刻（毫秒，向下取整）
    pub fn granule_time_ms(&self, granulepos: u64) -> u64 {
        let frames = self.granule_frame_index(granulepos as i64);
        let num = i64::from(self.fps_numerator.max(1));
        let den = i64::from(self.fps_denominator);
        ((frames + 1) * 1000 * den / num).max(0) as u64
    }

    /// 期望帧间隔（毫秒）
    pub fn frame_interval_ms(&self) -> u64 {
        let num = u64::from(self.fps_numerator.max(1));
        (1000 * u64::from(self.fps_denominator) / num).max(1)
    }
}

/// 协商得到的流信息，会话启动后提供给宿主
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamInfo {
    pub has_audio: bool,
    pub has_video: bool,
    /// 可见画面尺寸（无视频流时为 0）
    pub width: u32,
    pub height: u32,
    /// 期望帧间隔（毫秒，无视频流时为 0）
    pub frame_interval_ms: u64,
    /// 音频采样率（无音频流时为 0）
    pub sample_rate: u32,
    /// 源声道数
    pub channels: u16,
}

/// 播放器配置
#[derive(Debug, Clone, Copy)]
pub struct PlayerConfig {
    /// 音频环形缓冲槽数
    pub audio_queue_size: usize,
    /// 视频环形缓冲槽数
    pub video_queue_size: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        // 溢出意味着丢数据而不是扩容，容量给得宽裕
        Self {
            audio_queue_size: 512,
            video_queue_size: 512,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(fps: (u32, u32), shift: u8, version: (u8, u8, u8)) -> VideoParams {
        VideoParams {
            frame_width: 320,
            frame_height: 240,
            pic_width: 320,
            pic_height: 240,
            pic_x: 0,
            pic_y: 0,
            pixel_format: PixelFormat::Yuv420,
            fps_numerator: fps.0,
            fps_denominator: fps.1,
            keyframe_granule_shift: shift,
            version,
        }
    }

    #[test]
    fn test_version_at_least() {
        let p = params((30, 1), 0, (3, 2, 1));
        assert!(p.version_at_least(3, 2, 1));
        assert!(p.version_at_least(3, 1, 9));
        assert!(!p.version_at_least(3, 2, 2));
        assert!(!p.version_at_least(4, 0, 0));
    }

    #[test]
    fn test_granule_time_new_version() {
        // 30fps、无关键帧位移：granule 即帧计数，3.2.1 起帧序数要减一
        let p = params((30, 1), 0, (3, 2, 1));
        assert_eq!(p.granule_time_ms(0), 0);
        assert_eq!(p.granule_time_ms(1), 33);
        assert_eq!(p.granule_time_ms(2), 66);
        assert_eq!(p.granule_time_ms(3), 100);
    }

    #[test]
    fn test_granule_time_old_version() {
        // 3.2.1 之前没有差一修正
        let p = params((30, 1), 0, (3, 2, 0));
        assert_eq!(p.granule_time_ms(0), 33);
        assert_eq!(p.granule_time_ms(1), 66);
    }

    #[test]
    fn test_granule_decompose_with_shift() {
        // granule = (iframe << shift) | pframe
        let p = params((25, 1), 6, (3, 2, 1));
        let gp = (10i64 << 6) | 5;
        assert_eq!(p.granule_frame_index(gp), 10 + 5 - 1);
    }

    #[test]
    fn test_frame_interval() {
        assert_eq!(params((30, 1), 0, (3, 2, 1)).frame_interval_ms(), 33);
        assert_eq!(params((25, 1), 0, (3, 2, 1)).frame_interval_ms(), 40);
        // 分子为 0 时按 1 兜底
        assert_eq!(params((0, 1), 0, (3, 2, 1)).frame_interval_ms(), 1000);
    }
}
