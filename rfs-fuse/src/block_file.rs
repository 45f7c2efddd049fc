use std::cell::RefCell;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use block_dev::{BlockDevice, Error, SECTOR_SIZE};
use send_wrapper::SendWrapper;

/// 把宿主机上的镜像文件当作块设备
#[derive(Debug)]
pub struct BlockFile {
    inner: SendWrapper<RefCell<File>>,
    sectors: u64,
}

impl BlockFile {
    pub fn new(fd: File) -> io::Result<Self> {
        let sectors = fd.metadata()?.len() / SECTOR_SIZE as u64;
        Ok(Self {
            inner: SendWrapper::new(RefCell::new(fd)),
            sectors,
        })
    }
}

impl BlockDevice for BlockFile {
    fn num_sectors(&self) -> u64 {
        self.sectors
    }

    fn read_block(&self, sector: u64, buf: &mut [u8]) -> Result<(), Error> {
        block_dev::check_request(self, sector, buf.len())?;
        let mut file = self.inner.borrow_mut();
        file.seek(SeekFrom::Start(sector * SECTOR_SIZE as u64))
            .and_then(|_| file.read_exact(buf))
            .map_err(|err| io_error("read", sector, err))
    }

    fn write_block(&self, sector: u64, buf: &[u8]) -> Result<(), Error> {
        block_dev::check_request(self, sector, buf.len())?;
        let mut file = self.inner.borrow_mut();
        file.seek(SeekFrom::Start(sector * SECTOR_SIZE as u64))
            .and_then(|_| file.write_all(buf))
            .map_err(|err| io_error("write", sector, err))
    }
}

fn io_error(op: &str, sector: u64, err: io::Error) -> Error {
    log::error!("image {op} at sector {sector} failed: {err}");
    Error::Io
}
