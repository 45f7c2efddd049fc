use std::mem;

use retrofs::layout::{DescriptionBlock, DirEntry, DirHeader};

#[test]
fn volume() {
    assert_eq!(512, mem::size_of::<DescriptionBlock>());
    assert_eq!(256, mem::size_of::<DirHeader>());
    assert_eq!(256, mem::size_of::<DirEntry>());
    assert_eq!(1, mem::align_of::<DirEntry>());
}
