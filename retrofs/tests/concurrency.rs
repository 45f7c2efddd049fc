mod common;

use std::collections::BTreeSet;
use std::thread;

use common::FREE_SECTORS;

const THREADS: usize = 4;
const FILES_PER_THREAD: usize = 40;
const ALLOCS_PER_THREAD: u64 = 25;

#[test]
fn allocations_and_creates_from_many_threads() {
    let (_, fs) = common::exact();
    let root = fs.root();

    let (allocated, created) = thread::scope(|s| {
        let allocators: Vec<_> = (0..THREADS)
            .map(|t| {
                let fs = &fs;
                s.spawn(move || {
                    (0..ALLOCS_PER_THREAD)
                        .map(|i| {
                            let len = 1 + (i + t as u64) % 7;
                            (fs.allocate(len).unwrap().get(), len)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let creators: Vec<_> = (0..THREADS)
            .map(|t| {
                let fs = &fs;
                s.spawn(move || {
                    (0..FILES_PER_THREAD)
                        .map(|i| {
                            let name = format!("t{t}-{i}");
                            fs.create_file(root, &name, 1000).unwrap();
                            name
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let allocated: Vec<_> = allocators
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let created: Vec<_> = creators.into_iter().flat_map(|h| h.join().unwrap()).collect();
        (allocated, created)
    });

    // 160个目录项放不进一个块，链上多出的块也占用区段
    let listed = fs.list(root).unwrap();
    assert_eq!(THREADS * FILES_PER_THREAD, listed.len());
    let names: BTreeSet<_> = listed.iter().map(|i| i.name().to_owned()).collect();
    let expected: BTreeSet<_> = created.into_iter().collect();
    assert_eq!(expected, names);

    let blocks: BTreeSet<_> = listed
        .iter()
        .map(|i| fs.locate_entry(root, i.name()).unwrap().block)
        .filter(|&block| block != root)
        .collect();
    assert!(!blocks.is_empty());

    let mut extents = allocated;
    extents.extend(listed.iter().map(|i| (i.start().get(), i.reserved())));
    extents.extend(blocks.iter().map(|b| (b.get(), 64)));
    extents.sort_unstable();
    for pair in extents.windows(2) {
        let ((a, a_len), (b, _)) = (pair[0], pair[1]);
        assert!(a + a_len <= b, "{a}+{a_len} overlaps {b}");
    }
    for &(start, len) in &extents {
        assert!(fs.is_used((start + len - 1).into()).unwrap());
    }

    let used: u64 = extents.iter().map(|&(_, len)| len).sum();
    assert_eq!((FREE_SECTORS - used) * 512, fs.get_free_space());
}
