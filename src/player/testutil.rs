// 测试辅助：合成解码器与合成 Ogg 流
//
// 合成格式约定：
// - 音频头包  b"SYNA" + 序号字节，序号 0 的头附带 rate(u32 LE) + channels(u8)
// - 音频数据包 b"AD" + 每声道采样数(u16 LE) + 采样值(f32 LE)
// - 音频毒包  b"AERR"，feed 时返回硬错误
// - 视频头包  b"SYNV" + 序号字节，序号 0 的头附带
//   w(u16) h(u16) fps_num(u32) fps_den(u32) fmt(u8) shift(u8)，全部 LE
// - 视频数据包 b"VD" + granule(u64 LE) + 平面填充字节(u8)

use crate::core::{AudioParams, PixelFormat, PlayerError, Result, VideoParams};
use crate::player::codec::{AudioDecoder, PcmBlock, PictureRef, PlaneRef, VideoDecoder};
use ogg::{PacketWriteEndInfo, PacketWriter};
use std::io::Cursor;

pub const AUDIO_SERIAL: u32 = 0x1001;
pub const VIDEO_SERIAL: u32 = 0x2002;

pub struct SynthAudioDecoder {
    headers: u8,
    rate: u32,
    channels: u8,
    pending: Option<PcmBlock>,
}

impl SynthAudioDecoder {
    pub fn new() -> Self {
        Self {
            headers: 0,
            rate: 0,
            channels: 0,
            pending: None,
        }
    }
}

impl AudioDecoder for SynthAudioDecoder {
    fn submit_header(&mut self, packet: &[u8]) -> Result<bool> {
        if packet.len() < 5 || &packet[..4] != b"SYNA" {
            return Ok(false);
        }
        if self.headers == 0 {
            if packet.len() < 10 {
                return Ok(false);
            }
            self.rate = u32::from_le_bytes([packet[5], packet[6], packet[7], packet[8]]);
            self.channels = packet[9];
        }
        self.headers += 1;
        Ok(true)
    }

    fn params(&self) -> Option<AudioParams> {
        (self.headers >= 3).then(|| AudioParams {
            sample_rate: self.rate,
            channels: u16::from(self.channels),
        })
    }

    fn feed(&mut self, packet: &[u8]) -> Result<()> {
        if packet.starts_with(b"AERR") {
            return Err(PlayerError::AudioDecodeError("合成硬错误".into()));
        }
        if packet.len() < 8 || &packet[..2] != b"AD" {
            return Ok(());
        }
        let count = u16::from_le_bytes([packet[2], packet[3]]) as usize;
        let value = f32::from_le_bytes([packet[4], packet[5], packet[6], packet[7]]);
        self.pending = Some(PcmBlock {
            channels: (0..self.channels.max(1))
                .map(|_| vec![value; count])
                .collect(),
        });
        Ok(())
    }

    fn drain(&mut self) -> Option<PcmBlock> {
        self.pending.take()
    }
}

pub struct SynthVideoDecoder {
    headers: u8,
    params: Option<VideoParams>,
    planes: Vec<u8>,
}

impl SynthVideoDecoder {
    pub fn new() -> Self {
        Self {
            headers: 0,
            params: None,
            planes: Vec::new(),
        }
    }
}

impl VideoDecoder for SynthVideoDecoder {
    fn submit_header(&mut self, packet: &[u8]) -> Result<bool> {
        if packet.len() < 5 || &packet[..4] != b"SYNV" {
            return Ok(false);
        }
        if self.headers == 0 {
            if packet.len() < 19 {
                return Ok(false);
            }
            let w = u32::from(u16::from_le_bytes([packet[5], packet[6]]));
            let h = u32::from(u16::from_le_bytes([packet[7], packet[8]]));
            let num = u32::from_le_bytes([packet[9], packet[10], packet[11], packet[12]]);
            let den = u32::from_le_bytes([packet[13], packet[14], packet[15], packet[16]]);
            let fmt = match packet[17] {
                0 => PixelFormat::Yuv420,
                2 => PixelFormat::Yuv422,
                3 => PixelFormat::Yuv444,
                _ => PixelFormat::Other,
            };
            self.params = Some(VideoParams {
                frame_width: w,
                frame_height: h,
                pic_width: w,
                pic_height: h,
                pic_x: 0,
                pic_y: 0,
                pixel_format: fmt,
                fps_numerator: num,
                fps_denominator: den,
                keyframe_granule_shift: packet[18],
                version: (3, 2, 1),
            });
        }
        self.headers += 1;
        Ok(true)
    }

    fn params(&self) -> Option<VideoParams> {
        (self.headers >= 3).then_some(self.params).flatten()
    }

    fn decode(
        &mut self,
        packet: &[u8],
        _page_granulepos: Option<u64>,
    ) -> Result<Option<PictureRef<'_>>> {
        if packet.len() < 11 || &packet[..2] != b"VD" {
            return Ok(None);
        }
        let params = self
            .params
            .ok_or_else(|| PlayerError::VideoDecodeError("头未就绪".into()))?;
        let granule = u64::from_le_bytes([
            packet[2], packet[3], packet[4], packet[5], packet[6], packet[7], packet[8], packet[9],
        ]);
        let fill = packet[10];
        let w = params.pic_width as usize;
        let h = params.pic_height as usize;
        let y_len = w * h;
        let c_len = (w / 2) * (h / 2);
        self.planes.clear();
        self.planes.resize(y_len + 2 * c_len, fill);
        Ok(Some(PictureRef {
            planes: [
                PlaneRef {
                    data: &self.planes[..y_len],
                    stride: w,
                },
                PlaneRef {
                    data: &self.planes[y_len..y_len + c_len],
                    stride: w / 2,
                },
                PlaneRef {
                    data: &self.planes[y_len + c_len..],
                    stride: w / 2,
                },
            ],
            granulepos: granule,
        }))
    }
}

pub fn audio_header_packets(rate: u32, channels: u8) -> Vec<Vec<u8>> {
    (0u8..3)
        .map(|i| {
            let mut pkt = b"SYNA".to_vec();
            pkt.push(i);
            pkt.extend_from_slice(&rate.to_le_bytes());
            pkt.push(channels);
            pkt
        })
        .collect()
}

pub fn audio_data_packet(count: u16, value: f32) -> Vec<u8> {
    let mut pkt = b"AD".to_vec();
    pkt.extend_from_slice(&count.to_le_bytes());
    pkt.extend_from_slice(&value.to_le_bytes());
    pkt
}

pub fn audio_error_packet() -> Vec<u8> {
    b"AERR".to_vec()
}

pub fn video_header_packets_full(
    w: u16,
    h: u16,
    fps: (u32, u32),
    fmt: u8,
    shift: u8,
) -> Vec<Vec<u8>> {
    (0u8..3)
        .map(|i| {
            let mut pkt = b"SYNV".to_vec();
            pkt.push(i);
            pkt.extend_from_slice(&w.to_le_bytes());
            pkt.extend_from_slice(&h.to_le_bytes());
            pkt.extend_from_slice(&fps.0.to_le_bytes());
            pkt.extend_from_slice(&fps.1.to_le_bytes());
            pkt.push(fmt);
            pkt.push(shift);
            pkt
        })
        .collect()
}

pub fn video_header_packets(w: u16, h: u16, fps: (u32, u32)) -> Vec<Vec<u8>> {
    video_header_packets_full(w, h, fps, 0, 0)
}

pub fn video_header_packets_with_format(
    w: u16,
    h: u16,
    fps: (u32, u32),
    fmt: u8,
) -> Vec<Vec<u8>> {
    video_header_packets_full(w, h, fps, fmt, 0)
}

pub fn video_data_packet(granule: u64, fill: u8) -> Vec<u8> {
    let mut pkt = b"VD".to_vec();
    pkt.extend_from_slice(&granule.to_le_bytes());
    pkt.push(fill);
    pkt
}

/// 把 (流序号, 包数据, granule, 分页方式) 列表写成一段完整的 Ogg 字节流
pub fn write_stream(packets: Vec<(u32, Vec<u8>, u64, PacketWriteEndInfo)>) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = PacketWriter::new(&mut cursor);
        for (serial, data, absgp, info) in packets {
            writer
                .write_packet(data, serial, info, absgp)
                .expect("写合成流失败");
        }
    }
    cursor.into_inner()
}
