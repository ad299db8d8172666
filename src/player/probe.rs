use crate::core::{Result, VideoParams};
use crate::player::codec::{AudioDecoder, VideoDecoder};
use crate::player::producer::negotiate;
use log::debug;
use ogg::PacketReader;
use std::io::{Read, Seek, SeekFrom};

/// 尾部回扫窗口大小
const TAIL_WINDOW: u64 = 128 * 1024;
/// Ogg 页头的最小长度
const MIN_PAGE_HEADER: usize = 27;

/// 估算流的总时长（毫秒），不做完整解码
///
/// 只跑一遍头协商拿到速率元数据（解码载荷全部丢弃），然后读入文件
/// 最后 128 KiB（不足就整个读入），逐字节回扫最后一个属于已识别流的
/// 页边界，用页上声明的 granule position 折算毫秒。与实时解码管线
/// 完全无关，播放前后任何时刻都可以调用。
///
/// 找不到可识别的流、窗口里没有匹配的页、容器损坏，一律返回 0。
pub fn probe_duration_ms<R, A, V>(source: R, mut audio_dec: A, mut video_dec: V) -> u64
where
    R: Read + Seek,
    A: AudioDecoder,
    V: VideoDecoder,
{
    match probe_inner(source, &mut audio_dec, &mut video_dec) {
        Ok(ms) => ms,
        Err(e) => {
            debug!("时长探测失败: {}", e);
            0
        }
    }
}

fn probe_inner<R: Read + Seek>(
    mut source: R,
    audio_dec: &mut dyn AudioDecoder,
    video_dec: &mut dyn VideoDecoder,
) -> Result<u64> {
    let size = source.seek(SeekFrom::End(0))?;
    source.seek(SeekFrom::Start(0))?;

    let negotiated = {
        let mut reader = PacketReader::new(&mut source);
        negotiate(&mut reader, audio_dec, video_dec)?
    };
    if negotiated.audio.is_none() && negotiated.video.is_none() {
        return Ok(0);
    }

    // 读入尾部窗口，短文件整个读入
    let window_len = size.min(TAIL_WINDOW);
    source.seek(SeekFrom::End(-(window_len as i64)))?;
    let mut window = vec![0u8; window_len as usize];
    source.read_exact(&mut window)?;

    let mut serials = Vec::new();
    if let Some((serial, _)) = negotiated.audio {
        serials.push(serial);
    }
    if let Some((serial, _)) = negotiated.video {
        serials.push(serial);
    }
    let Some((serial, granule)) = find_last_page(&window, &serials) else {
        return Ok(0);
    };

    if let Some((_, params)) = negotiated.audio.filter(|(s, _)| *s == serial) {
        return Ok(audio_tail_ms(params.sample_rate, granule));
    }
    if let Some((_, params)) = negotiated.video.filter(|(s, _)| *s == serial) {
        return Ok(video_tail_ms(&params, granule));
    }
    Ok(0)
}

/// 在字节窗口里从后往前找最后一个属于给定流的 Ogg 页
///
/// 纯函数：不依赖文件、线程或解码状态，可独立测试。
/// 返回命中页的 (流序号, granule position)。
pub fn find_last_page(window: &[u8], serials: &[u32]) -> Option<(u32, i64)> {
    if window.len() < MIN_PAGE_HEADER {
        return None;
    }
    let mut pos = window.len() - MIN_PAGE_HEADER;
    loop {
        if &window[pos..pos + 4] == b"OggS" {
            let serial = u32::from_le_bytes([
                window[pos + 14],
                window[pos + 15],
                window[pos + 16],
                window[pos + 17],
            ]);
            if serials.contains(&serial) {
                let granule = i64::from_le_bytes([
                    window[pos + 6],
                    window[pos + 7],
                    window[pos + 8],
                    window[pos + 9],
                    window[pos + 10],
                    window[pos + 11],
                    window[pos + 12],
                    window[pos + 13],
                ]);
                return Some((serial, granule));
            }
        }
        if pos == 0 {
            return None;
        }
        pos -= 1;
    }
}

/// 音频尾页 granule -> 毫秒：采样数对采样率向上取整
fn audio_tail_ms(sample_rate: u32, granule: i64) -> u64 {
    let rate = i64::from(sample_rate.max(1));
    ((granule * 1000 + rate - 1) / rate).max(0) as u64
}

/// 视频尾页 granule -> 毫秒
///
/// 按关键帧位移分解出帧序数（含版本相关的差一修正），再对帧率向上取整
fn video_tail_ms(params: &VideoParams, granule: i64) -> u64 {
    let frames = params.granule_frame_index(granule);
    let num = i64::from(params.fps_numerator.max(1));
    let den = i64::from(params.fps_denominator);
    (((frames + 1) * 1000 * den + num - 1) / num).max(0) as u64
}
