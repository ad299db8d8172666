use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Ogg 容器错误: {0}")]
    ContainerError(#[from] ogg::OggReadError),

    #[error("音频解码错误: {0}")]
    AudioDecodeError(String),

    #[error("视频解码错误: {0}")]
    VideoDecodeError(String),

    #[error("音频输出错误: {0}")]
    AudioError(String),

    #[error("解码线程错误: {0}")]
    ThreadError(String),

    #[error("其他错误: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PlayerError>;
