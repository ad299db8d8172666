use crate::core::{
    AudioChunk, AudioParams, PixelFormat, Result, StreamInfo, VideoFrame, VideoParams, MAX_VOLUME,
};
use crate::player::codec::{AudioDecoder, PcmBlock, PictureRef, PlaneRef, VideoDecoder};
use crate::player::ring_buffer::RingProducer;
use crate::player::session::{
    SharedState, POLL_INTERVAL, STARTED_AUDIO, STARTED_HEADERS, STARTED_VIDEO,
};
use crossbeam_channel::Sender;
use log::{debug, error, info, warn};
use ogg::{Packet, PacketReader};
use std::collections::VecDeque;
use std::io::{Read, Seek, SeekFrom};
use std::process;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

/// 每个已识别流的协商进度
struct StreamClaim {
    serial: u32,
    /// 已接收的头包数，协议要求恰好 3 个（标识、注释、配置表）
    headers: u8,
}

/// 头协商结果
pub(crate) struct Negotiated {
    pub audio: Option<(u32, AudioParams)>,
    pub video: Option<(u32, VideoParams)>,
    /// 协商期间就到达的数据包，留给稳态循环
    pub pending_audio: VecDeque<Packet>,
    pub pending_video: VecDeque<Packet>,
}

enum Route {
    Audio,
    Video,
    Discard,
}

/// 头协商：识别音频/视频流并完成各自的 3 头包交换
///
/// 实时会话与时长探测共用同一套协商。每条流的第一个包交给两个解码器的
/// 头探测来分类，无法识别的流整条丢弃；识别出的流若不满足格式前置条件
/// （视频必须是 4:2:0、尺寸非零且各维小于 16384，音频至多双声道），
/// 在这里就被禁用。
pub(crate) fn negotiate<R: Read + Seek>(
    reader: &mut PacketReader<R>,
    audio_dec: &mut dyn AudioDecoder,
    video_dec: &mut dyn VideoDecoder,
) -> Result<Negotiated> {
    let mut audio: Option<StreamClaim> = None;
    let mut video: Option<StreamClaim> = None;
    let mut pending_audio = VecDeque::new();
    let mut pending_video = VecDeque::new();
    // BOS 页总在容器最前面，见到任何流的第二个包之后就不会再出现新流
    let mut discovery_open = true;

    loop {
        let audio_done = audio.as_ref().map(|c| c.headers >= 3).unwrap_or(true);
        let video_done = video.as_ref().map(|c| c.headers >= 3).unwrap_or(true);
        if !discovery_open && audio_done && video_done {
            break;
        }

        let Some(pkt) = reader.read_packet()? else {
            // 输入读尽，头没凑齐的流只能作废
            break;
        };
        let serial = pkt.stream_serial();

        if discovery_open && pkt.first_in_stream() {
            // 流的第一个包：先试视频再试音频，与参考实现的探测顺序一致
            if video.is_none() && video_dec.submit_header(&pkt.data)? {
                video = Some(StreamClaim { serial, headers: 1 });
            } else if audio.is_none() && audio_dec.submit_header(&pkt.data)? {
                audio = Some(StreamClaim { serial, headers: 1 });
            } else {
                debug!("{} 忽略无法识别的流 serial={:#x}", log_ctx(), serial);
            }
            continue;
        }
        discovery_open = false;

        let route = if video.as_ref().is_some_and(|c| c.serial == serial) {
            Route::Video
        } else if audio.as_ref().is_some_and(|c| c.serial == serial) {
            Route::Audio
        } else {
            Route::Discard
        };

        match route {
            Route::Video => {
                let mut disable = false;
                if let Some(claim) = video.as_mut() {
                    if claim.headers < 3 {
                        if video_dec.submit_header(&pkt.data)? {
                            claim.headers += 1;
                        } else {
                            disable = true;
                        }
                    } else {
                        pending_video.push_back(pkt);
                    }
                }
                if disable {
                    warn!("{} ⚠️ 视频流头包无效，禁用视频", log_ctx());
                    video = None;
                }
            }
            Route::Audio => {
                let mut disable = false;
                if let Some(claim) = audio.as_mut() {
                    if claim.headers < 3 {
                        if audio_dec.submit_header(&pkt.data)? {
                            claim.headers += 1;
                        } else {
                            disable = true;
                        }
                    } else {
                        pending_audio.push_back(pkt);
                    }
                }
                if disable {
                    warn!("{} ⚠️ 音频流头包无效，禁用音频", log_ctx());
                    audio = None;
                }
            }
            Route::Discard => {}
        }
    }

    // 格式前置条件：不满足就整条禁用，而不是报错中断
    let video_out = video
        .filter(|c| c.headers >= 3)
        .and_then(|c| video_dec.params().map(|p| (c.serial, p)))
        .filter(|(_, p)| {
            if p.pixel_format != PixelFormat::Yuv420 {
                warn!("{} ⚠️ 视频不是 4:2:0 采样（{:?}），禁用视频", log_ctx(), p.pixel_format);
                return false;
            }
            if p.pic_width == 0 || p.pic_height == 0 || p.pic_width >= 16384 || p.pic_height >= 16384
            {
                warn!(
                    "{} ⚠️ 视频画面尺寸越界 {}x{}，禁用视频",
                    log_ctx(),
                    p.pic_width,
                    p.pic_height
                );
                return false;
            }
            true
        });

    let audio_out = audio
        .filter(|c| c.headers >= 3)
        .and_then(|c| audio_dec.params().map(|p| (c.serial, p)))
        .filter(|(_, p)| {
            if p.channels > 2 {
                warn!("{} ⚠️ 暂不支持 {} 声道音频，禁用音频", log_ctx(), p.channels);
                return false;
            }
            true
        });

    Ok(Negotiated {
        audio: audio_out,
        video: video_out,
        pending_audio,
        pending_video,
    })
}

/// 只发送一次的流信息投递
struct InfoOnce {
    tx: Sender<StreamInfo>,
    sent: bool,
}

impl InfoOnce {
    fn send(&mut self, info: StreamInfo) {
        if !self.sent {
            let _ = self.tx.send(info);
            self.sent = true;
        }
    }
}

/// 解码线程入口
///
/// 无论解码正常收尾还是出错，退出前都会投递流信息、置 done 并补齐
/// started 标志位，保证 start() 的等待一定能结束。
pub(crate) fn run_producer<R, A, V>(
    source: R,
    mut audio_dec: A,
    mut video_dec: V,
    mut audio_tx: RingProducer<AudioChunk>,
    mut video_tx: RingProducer<VideoFrame>,
    shared: Arc<SharedState>,
    info_tx: Sender<StreamInfo>,
) where
    R: Read + Seek,
    A: AudioDecoder,
    V: VideoDecoder,
{
    info!("{} 🎬 解码线程启动", log_ctx());
    let mut info = InfoOnce {
        tx: info_tx,
        sent: false,
    };

    let result = decode_run(
        source,
        &mut audio_dec,
        &mut video_dec,
        &mut audio_tx,
        &mut video_tx,
        &shared,
        &mut info,
    );

    // 稳态退出后先释放编解码资源，再宣告完成
    drop(audio_dec);
    drop(video_dec);

    if let Err(e) = result {
        error!("{} ❌ 解码线程异常终止: {}", log_ctx(), e);
        shared.set_error(e);
    }
    info.send(StreamInfo::default());
    shared.done.store(true, Ordering::Release);
    shared.mark_started(STARTED_HEADERS);
    info!("{} 🛑 解码线程退出", log_ctx());
}

fn decode_run<R: Read + Seek>(
    mut source: R,
    audio_dec: &mut dyn AudioDecoder,
    video_dec: &mut dyn VideoDecoder,
    audio_tx: &mut RingProducer<AudioChunk>,
    video_tx: &mut RingProducer<VideoFrame>,
    shared: &SharedState,
    info: &mut InfoOnce,
) -> Result<()> {
    // 头探测可能需要把开头重新读一遍，进稳态前先回到流头
    source.seek(SeekFrom::Start(0))?;
    let mut reader = PacketReader::new(source);

    let Negotiated {
        audio,
        video,
        mut pending_audio,
        mut pending_video,
    } = negotiate(&mut reader, audio_dec, video_dec)?;

    let audio_serial = audio.map(|(s, _)| s);
    let video_serial = video.map(|(s, _)| s);
    let audio_params = audio.map(|(_, p)| p);
    let video_params = video.map(|(_, p)| p);
    if audio.is_none() {
        pending_audio.clear();
    }
    if video.is_none() {
        pending_video.clear();
    }

    let stream_info = StreamInfo {
        has_audio: audio.is_some(),
        has_video: video.is_some(),
        width: video_params.map(|p| p.pic_width).unwrap_or(0),
        height: video_params.map(|p| p.pic_height).unwrap_or(0),
        frame_interval_ms: video_params.map(|p| p.frame_interval_ms()).unwrap_or(0),
        sample_rate: audio_params.map(|p| p.sample_rate).unwrap_or(0),
        channels: audio_params.map(|p| p.channels).unwrap_or(0),
    };
    shared
        .has_audio
        .store(stream_info.has_audio, Ordering::Release);
    shared
        .has_video
        .store(stream_info.has_video, Ordering::Release);
    info.send(stream_info);
    shared.mark_started(STARTED_HEADERS);

    if audio.is_none() && video.is_none() {
        // 一个可识别的流都没有不算错误，会话直接以零产出收尾
        info!("{} 📄 未识别到音频或视频流，会话立即结束", log_ctx());
        return Ok(());
    }
    info!(
        "{} ✅ 头协商完成: audio={} video={} {}x{}",
        log_ctx(),
        stream_info.has_audio,
        stream_info.has_video,
        stream_info.width,
        stream_info.height
    );

    let has_audio = audio.is_some();
    let has_video = video.is_some();
    let frame_bytes = video_params.map(plane_bytes).unwrap_or(0);
    let mut audio_chunks: usize = 0;
    let mut video_frames: usize = 0;
    // 两个解码器都把手头的包吃完后才继续读容器数据
    let mut need_data = false;

    'outer: while !shared.stop.load(Ordering::Acquire) && (has_audio || has_video) {
        if need_data {
            need_data = false;
            match reader.read_packet()? {
                Some(pkt) => {
                    let serial = pkt.stream_serial();
                    if audio_serial == Some(serial) {
                        pending_audio.push_back(pkt);
                    } else if video_serial == Some(serial) {
                        pending_video.push_back(pkt);
                    }
                    // 其余流的包直接丢弃
                }
                None => {
                    info!("{} 📄 容器数据读尽", log_ctx());
                    break 'outer;
                }
            }
        }

        let mut progressed = false;

        // 音频：环不满就持续产出一个单元
        while has_audio && !shared.stop.load(Ordering::Relaxed) {
            if audio_tx.is_full() {
                break;
            }
            if let Some(block) = audio_dec.drain() {
                if push_audio(audio_tx, &block) {
                    audio_chunks += 1;
                    shared.mark_started(STARTED_AUDIO);
                    if audio_chunks <= 5 || audio_chunks % 500 == 0 {
                        debug!("{} 🔊 音频块 #{} 入队", log_ctx(), audio_chunks);
                    }
                }
                progressed = true;
            } else if let Some(pkt) = pending_audio.pop_front() {
                audio_dec.feed(&pkt.data)?;
                progressed = true;
            } else {
                need_data = true;
                break;
            }
        }

        // 视频：一包进、至多一帧出
        while has_video && !shared.stop.load(Ordering::Relaxed) {
            if video_tx.is_full() {
                break;
            }
            let Some(pkt) = pending_video.pop_front() else {
                need_data = true;
                break;
            };
            // 只有页尾包携带页声明的 granule
            let page_granule = pkt.last_in_page().then(|| pkt.absgp_page());
            if let Some(pic) = video_dec.decode(&pkt.data, page_granule)? {
                if let Some(p) = video_params.as_ref() {
                    if push_video(video_tx, &pic, p, frame_bytes) {
                        video_frames += 1;
                        shared.mark_started(STARTED_VIDEO);
                        if video_frames <= 5 || video_frames % 100 == 0 {
                            debug!("{} 📦 视频帧 #{} 入队", log_ctx(), video_frames);
                        }
                    }
                }
            }
            progressed = true;
        }

        // 两个环都满、又没有新数据要读：小睡等消费端腾出空间
        if !progressed && !need_data {
            thread::sleep(POLL_INTERVAL);
        }
    }

    info!(
        "{} 🛑 稳态解码结束（音频 {} 块，视频 {} 帧）",
        log_ctx(),
        audio_chunks,
        video_frames
    );
    Ok(())
}

/// 紧凑平面 4:2:0 的一帧字节数
fn plane_bytes(p: VideoParams) -> usize {
    let pw = p.pic_width as usize;
    let ph = p.pic_height as usize;
    pw * ph + 2 * ((pw / 2) * (ph / 2))
}

fn clamp_sample(v: f32) -> i16 {
    if v < -1.0 {
        i16::MIN
    } else if v > 1.0 {
        i16::MAX
    } else {
        (v * 32767.0) as i16
    }
}

/// 平面 f32 块转交错 16 位立体声后入队
///
/// 单声道直接复制到左右两路，不做其他声道映射。
/// 载荷分配失败时丢弃该单元，上游表现为一段播放空隙而非崩溃。
fn push_audio(ring: &mut RingProducer<AudioChunk>, block: &PcmBlock) -> bool {
    let n = block.samples();
    if n == 0 || block.channels.is_empty() {
        return false;
    }
    ring.try_push_with(|chunk| {
        chunk.volume = MAX_VOLUME;
        chunk.samples.clear();
        if chunk.samples.try_reserve_exact(n * 2).is_err() {
            warn!("⚠️ 音频块缓冲分配失败，丢弃该单元");
            return false;
        }
        if block.channels.len() == 1 {
            for &v in &block.channels[0] {
                let s = clamp_sample(v);
                chunk.samples.push(s);
                chunk.samples.push(s);
            }
        } else {
            for i in 0..n {
                for ch in &block.channels {
                    chunk.samples.push(clamp_sample(ch[i]));
                }
            }
        }
        true
    })
}

/// 解码器原生平面布局裁剪为紧凑平面 4:2:0 后入队
///
/// 按声明的画面矩形裁剪（不是宏块对齐的编码外框），裁剪起点按 2 对齐，
/// 色度平面取半分辨率偏移。槽位的像素缓冲首次使用时一次性分配，
/// 之后尺寸不再变化。
fn push_video(
    ring: &mut RingProducer<VideoFrame>,
    pic: &PictureRef<'_>,
    params: &VideoParams,
    frame_bytes: usize,
) -> bool {
    let pts = params.granule_time_ms(pic.granulepos);
    let pw = params.pic_width as usize;
    let ph = params.pic_height as usize;
    let cw = pw / 2;
    let ch = ph / 2;
    let px = (params.pic_x & !1) as usize;
    let py = (params.pic_y & !1) as usize;
    let cx = (params.pic_x / 2) as usize;
    let cy = (params.pic_y / 2) as usize;

    ring.try_push_with(|frame| {
        if frame.pixel_buffer.is_empty() {
            if frame.pixel_buffer.try_reserve_exact(frame_bytes).is_err() {
                warn!("⚠️ 视频帧缓冲分配失败，丢弃该帧");
                return false;
            }
            frame.pixel_buffer.resize(frame_bytes, 0);
        } else if frame.pixel_buffer.len() != frame_bytes {
            return false;
        }
        frame.presentation_time_ms = pts;

        let buf = frame.pixel_buffer.as_mut_slice();
        let mut off = 0;
        let ok = copy_plane(buf, &mut off, &pic.planes[0], px, py, pw, ph)
            && copy_plane(buf, &mut off, &pic.planes[1], cx, cy, cw, ch)
            && copy_plane(buf, &mut off, &pic.planes[2], cx, cy, cw, ch);
        if !ok {
            warn!("⚠️ 视频帧源平面越界，丢弃该帧");
        }
        ok
    })
}

fn copy_plane(
    dst: &mut [u8],
    off: &mut usize,
    plane: &PlaneRef<'_>,
    x: usize,
    y: usize,
    w: usize,
    h: usize,
) -> bool {
    for row in 0..h {
        let src = (y + row) * plane.stride + x;
        let Some(src_row) = plane.data.get(src..src + w) else {
            return false;
        };
        dst[*off..*off + w].copy_from_slice(src_row);
        *off += w;
    }
    true
}
