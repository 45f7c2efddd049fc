#![no_std]

extern crate alloc;

mod dirent;
mod error;
mod fs;
mod mount;

pub use self::{
    dirent::{DirEntry, DirEntryType},
    error::{clear_last_error, last_error, record, set_last_error, Error},
    fs::FileSystem,
    mount::MountTable,
};
