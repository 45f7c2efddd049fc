use core::fmt;

use spin::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 空名、过长的名字或越界的偏移
    InvalidArgument,
    NotFound,
    AlreadyExists,
    IsADirectory,
    NotADirectory,
    DirectoryNotEmpty,
    OutOfMemory,
    /// 没有足够大的连续区段
    OutOfSpace,
    DeviceIo,
    /// 请求越过了卷的末尾
    OutsideVolume,
    /// 描述块的魔数不对
    BadMagic,
    /// 目录块头部损坏或声明的大小不符
    Corruption,
    /// 目录链过长或出现环
    CycleDetected,
    DoubleFree,
    DoubleAllocate,
    /// 截断长度超过了预留空间
    TruncateBeyondReservation,
    NotMounted,
}

impl Error {
    pub fn description(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid argument",
            Self::NotFound => "no such file or directory",
            Self::AlreadyExists => "file exists",
            Self::IsADirectory => "is a directory",
            Self::NotADirectory => "not a directory",
            Self::DirectoryNotEmpty => "directory not empty",
            Self::OutOfMemory => "out of memory",
            Self::OutOfSpace => "no space left on volume",
            Self::DeviceIo => "device I/O error",
            Self::OutsideVolume => "access outside of volume",
            Self::BadMagic => "not a recognised volume",
            Self::Corruption => "broken directory structure",
            Self::CycleDetected => "directory chain cycle detected",
            Self::DoubleFree => "extent already free",
            Self::DoubleAllocate => "extent already in use",
            Self::TruncateBeyondReservation => "truncate beyond reserved length",
            Self::NotMounted => "no filesystem mounted at path",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// 最近一次失败的原因，供诊断信息使用
static LAST_ERROR: Mutex<Option<Error>> = Mutex::new(None);

pub fn set_last_error(err: Error) {
    *LAST_ERROR.lock() = Some(err);
}

pub fn last_error() -> Option<Error> {
    *LAST_ERROR.lock()
}

pub fn clear_last_error() {
    *LAST_ERROR.lock() = None;
}

/// 失败时记录错误码，结果原样返回
pub fn record<T>(result: Result<T, Error>) -> Result<T, Error> {
    if let Err(err) = &result {
        set_last_error(*err);
    }
    result
}
