//! RetroFS：基于区段的原生文件系统
//!
//! 卷的0号扇区是描述块，紧随其后的是根目录块，空闲位图位于卷尾。
//! 每个文件或目录块都占用一段连续的扇区（区段），文件超出预留空间时
//! 整体搬迁到更大的新区段，而不是原地扩展。

#![no_std]

extern crate alloc;

pub mod config;
mod control;
mod directory;
mod disk;
mod fsmap;
mod inode;
pub mod layout;
mod mount;
mod partition;
mod sector;
mod unlink;

pub use self::{
    config::{MountOptions, ReservationPolicy},
    control::RetroFs,
    directory::Location,
    disk::Disk,
    inode::Inode,
    mount::attach,
    sector::SectorId,
};
