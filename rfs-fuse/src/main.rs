mod block_file;
mod cli;

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use block_cache::Cached;
use block_dev::{BlockDevice, SECTOR_SIZE};
use clap::Parser;
use retrofs::{MountOptions, RetroFs, SectorId};
use typed_bytesize::ByteSizeIec;

pub use self::{block_file::BlockFile, cli::Cli};

fn main() -> io::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    println!("source={:?}\nout_dir={:?}", cli.source, cli.out_dir);

    let disk_size = ByteSizeIec::mib(cli.size_mib).0;
    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(cli.out_dir.join("fs.img"))?;
    fd.set_len(disk_size)?;

    let block_file = BlockFile::new(fd)?;
    let block_dev: Arc<dyn BlockDevice> = if cli.cache {
        let cached = Cached::new(block_file)
            .map_err(|err| io::Error::other(format!("sector cache: {err:?}")))?;
        Arc::new(cached)
    } else {
        Arc::new(block_file)
    };

    let created = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs());
    let sectors = disk_size / SECTOR_SIZE as u64;
    let fs = RetroFs::format(block_dev, 0, sectors, created, MountOptions::default())
        .map_err(fs_error)?;

    mirror(&fs, &cli.source, fs.root())?;

    println!("/");
    list(&fs, fs.root(), 1)?;
    println!("free: {} bytes", fs.get_free_space());

    Ok(())
}

/// 把宿主机目录逐层复制进镜像
fn mirror(fs: &RetroFs, host: &Path, dir: SectorId) -> io::Result<()> {
    let mut entries = fs::read_dir(host)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            log::warn!("skipping non UTF-8 name {:?}", entry.file_name());
            continue;
        };
        let ty = entry.file_type()?;
        if ty.is_dir() {
            let sub = fs.create_directory(dir, &name).map_err(fs_error)?;
            mirror(fs, &entry.path(), sub)?;
        } else if ty.is_file() {
            let data = fs::read(entry.path())?;
            log::info!("file={name:?} size={}", data.len());
            fs.create_file(dir, &name, data.len() as u64)
                .map_err(fs_error)?;
            let mut inode = fs.open(dir, &name).map_err(fs_error)?;
            fs.write_file(&mut inode, 0, &data).map_err(fs_error)?;
        }
    }

    Ok(())
}

fn list(fs: &RetroFs, dir: SectorId, depth: usize) -> io::Result<()> {
    for inode in fs.list(dir).map_err(fs_error)? {
        let indent = "  ".repeat(depth);
        if inode.is_dir() {
            println!("{indent}{}/", inode.name());
            list(fs, inode.start(), depth + 1)?;
        } else {
            println!("{indent}{} ({} bytes)", inode.name(), inode.size());
        }
    }
    Ok(())
}

fn fs_error(err: vfs::Error) -> io::Error {
    io::Error::other(err.to_string())
}
