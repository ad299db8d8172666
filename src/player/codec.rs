use crate::core::{AudioParams, Result, VideoParams};

/// 解码器内部帧存储里的一个像素平面
#[derive(Debug, Clone, Copy)]
pub struct PlaneRef<'a> {
    pub data: &'a [u8],
    /// 行跨度（字节），可能大于可见宽度
    pub stride: usize,
}

/// 解码器输出的一帧原始图像
///
/// 三个平面借用自解码器的内部缓冲，在下一次 decode 之前有效
pub struct PictureRef<'a> {
    /// Y / Cb / Cr
    pub planes: [PlaneRef<'a>; 3],
    /// 解码器推算出的当前 granule position
    pub granulepos: u64,
}

/// 一段已解码的平面 PCM，每声道一个等长的 f32 序列
#[derive(Debug, Default)]
pub struct PcmBlock {
    pub channels: Vec<Vec<f32>>,
}

impl PcmBlock {
    /// 每声道的采样数
    pub fn samples(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }
}

/// 音频解码边界
///
/// 实现者包装一个具体的音频编解码库（如 Vorbis），引擎只通过这个接口驱动它。
/// 协议约定：恰好 3 个头包（标识、注释、配置表）之后才允许进入稳态解码。
pub trait AudioDecoder: Send {
    /// 喂入一个候选头包
    ///
    /// 返回 Ok(false) 表示这不是本编解码器的头包（流分类用），
    /// Ok(true) 表示已接收；硬错误返回 Err
    fn submit_header(&mut self, packet: &[u8]) -> Result<bool>;

    /// 头包全部接收后返回流参数，否则 None
    fn params(&self) -> Option<AudioParams>;

    /// 喂入一个压缩数据包
    fn feed(&mut self, packet: &[u8]) -> Result<()>;

    /// 取走当前待取的已解码采样，无则返回 None（调用方应继续喂包）
    fn drain(&mut self) -> Option<PcmBlock>;
}

/// 视频解码边界 - 一包进、至多一帧出
pub trait VideoDecoder: Send {
    /// 喂入一个候选头包，语义与音频侧一致
    fn submit_header(&mut self, packet: &[u8]) -> Result<bool>;

    /// 头包全部接收后返回流参数，否则 None
    fn params(&self) -> Option<VideoParams>;

    /// 解码一个压缩数据包
    ///
    /// page_granulepos 是该包所在容器页声明的 granule（只有页尾包携带），
    /// 供解码器校准内部的 granule 推算
    fn decode(&mut self, packet: &[u8], page_granulepos: Option<u64>)
        -> Result<Option<PictureRef<'_>>>;
}
