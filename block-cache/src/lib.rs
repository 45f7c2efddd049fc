//! 块设备共享的扇区缓存

#![no_std]

extern crate alloc;

mod cache;
mod cached;
mod lru;

pub use self::{
    cache::{CacheError, SectorCache},
    cached::Cached,
};
