//! 磁盘上的数据结构
//!
//! 所有结构都是`repr(C, packed)`的，对齐为1，因此可以直接在扇区缓冲区上按偏移解释。
//! 整数字段按小端序存放，只能经由访问方法读写，大端主机上也能得到正确的值。

mod desc;
mod dir;

use core::{mem, ptr, slice};

pub use self::{
    desc::DescriptionBlock,
    dir::{DirEntry, DirHeader, EntryFlag},
};

/// 可以与磁盘字节直接互转的结构
///
/// # Safety
///
/// 实现者必须是对齐为1、任意位模式都合法的`Copy`类型。
pub unsafe trait OnDisk: Copy + Sized {
    fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts((self as *const Self).cast(), mem::size_of::<Self>()) }
    }

    fn read_from(bytes: &[u8]) -> Self {
        assert!(bytes.len() >= mem::size_of::<Self>());
        unsafe { ptr::read_unaligned(bytes.as_ptr().cast()) }
    }

    fn view(bytes: &[u8]) -> &Self {
        assert!(bytes.len() >= mem::size_of::<Self>());
        unsafe { &*bytes.as_ptr().cast() }
    }

    fn view_mut(bytes: &mut [u8]) -> &mut Self {
        assert!(bytes.len() >= mem::size_of::<Self>());
        unsafe { &mut *bytes.as_mut_ptr().cast() }
    }
}

unsafe impl OnDisk for DescriptionBlock {}
unsafe impl OnDisk for DirHeader {}
unsafe impl OnDisk for DirEntry {}

/// 把名字复制进定长的NUL结尾字段，超出部分截断
fn copy_name(dst: &mut [u8], name: &[u8]) {
    let n = name.len().min(dst.len() - 1);
    dst.fill(0);
    dst[..n].copy_from_slice(&name[..n]);
}

/// 定长名字字段中NUL之前的部分
fn name_of(field: &[u8]) -> &[u8] {
    let len = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..len]
}
