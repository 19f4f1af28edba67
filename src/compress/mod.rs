//! 归档压缩：把一组文件打包为单个容器文件

pub mod zip_bundle;

use std::io;
use std::path::{Path, PathBuf};

pub use zip_bundle::ZipCompressor;

/// 打包结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bundle {
    /// 写入完成后容器文件的实际大小
    pub size_bytes: u64,
    /// 实际打包进去的文件；打开时已消失的文件不在其中
    pub included: Vec<PathBuf>,
}

/// 压缩器
pub trait Compressor: Send + Sync {
    /// 把 `paths` 打包写入 `dest`；单个源文件消失时跳过，不中断整批
    fn bundle(&self, paths: &[PathBuf], dest: &Path) -> io::Result<Bundle>;

    /// 容器文件扩展名
    fn extension(&self) -> &'static str;
}
