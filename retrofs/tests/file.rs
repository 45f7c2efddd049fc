mod common;

use vfs::Error;

use common::{pattern, FREE_SECTORS};

#[test]
fn write_past_reservation_moves_file() {
    let (_, fs) = common::exact();
    let root = fs.root();
    let old = fs.create_file(root, "grow.bin", 100).unwrap();
    assert_eq!((FREE_SECTORS - 1) * 512, fs.get_free_space());

    let mut file = fs.open(root, "grow.bin").unwrap();
    assert_eq!(1, file.reserved());
    fs.write_file(&mut file, 0, &[b'A'; 100]).unwrap();

    let data = pattern(500);
    fs.write_file(&mut file, 1500, &data).unwrap();
    assert_eq!(2000, file.size());
    assert!(file.reserved() >= 4);
    assert_ne!(old, file.start());
    assert!(!fs.is_used(old).unwrap());
    assert_eq!((FREE_SECTORS - file.reserved()) * 512, fs.get_free_space());

    let file = fs.open(root, "GROW.BIN").unwrap();
    assert_eq!(2000, file.size());
    let mut buf = vec![0xEE; 2000];
    fs.read_file(&file, 0, &mut buf).unwrap();
    assert_eq!([b'A'; 100], buf[..100]);
    assert!(buf[100..1500].iter().all(|&b| b == 0));
    assert_eq!(data, buf[1500..]);
}

#[test]
fn partial_sectors_are_merged() {
    let (_, fs) = common::exact();
    let root = fs.root();
    fs.create_file(root, "rmw", 2048).unwrap();
    let mut file = fs.open(root, "rmw").unwrap();

    let mut expected = vec![0x5A; 2048];
    fs.write_file(&mut file, 0, &expected).unwrap();

    let head_and_tail = pattern(700);
    fs.write_file(&mut file, 300, &head_and_tail).unwrap();
    expected[300..1000].copy_from_slice(&head_and_tail);

    let spanning = vec![0xC3; 1500];
    fs.write_file(&mut file, 100, &spanning).unwrap();
    expected[100..1600].copy_from_slice(&spanning);

    assert_eq!(2048, file.size());
    assert_eq!(4, file.reserved());

    let mut buf = vec![0; 2048];
    fs.read_file(&file, 0, &mut buf).unwrap();
    assert_eq!(expected, buf);

    let mut middle = vec![0; 777];
    fs.read_file(&file, 333, &mut middle).unwrap();
    assert_eq!(expected[333..1110], middle[..]);
}

#[test]
fn large_write_is_batched() {
    let (_, fs) = common::exact();
    let root = fs.root();
    fs.create_file(root, "big", 0).unwrap();
    let mut file = fs.open(root, "big").unwrap();

    let data = pattern(200 * 512);
    fs.write_file(&mut file, 10, &data).unwrap();
    assert_eq!(data.len() as u64 + 10, file.size());
    assert_eq!(201, file.reserved());

    let mut buf = vec![0; data.len()];
    fs.read_file(&file, 10, &mut buf).unwrap();
    assert_eq!(data, buf);
}

#[test]
fn reads_stay_inside_file() {
    let (_, fs) = common::exact();
    let root = fs.root();
    fs.create_file(root, "short", 100).unwrap();
    let file = fs.open(root, "short").unwrap();

    let mut buf = [0u8; 64];
    assert_eq!(Ok(()), fs.read_file(&file, 0, &mut []));
    assert_eq!(Ok(()), fs.read_file(&file, 36, &mut buf));
    assert_eq!(Err(Error::InvalidArgument), fs.read_file(&file, 37, &mut buf));
    assert_eq!(Err(Error::InvalidArgument), fs.read_file(&file, 100, &mut buf[..1]));
    assert_eq!(Err(Error::InvalidArgument), fs.read_file(&file, u64::MAX, &mut buf));

    let sub = fs.create_directory(root, "dir").unwrap();
    let mut dir = fs.open(root, "dir").unwrap();
    assert_eq!(sub, dir.start());
    assert_eq!(Err(Error::IsADirectory), fs.read_file(&dir, 0, &mut buf));
    assert_eq!(Err(Error::IsADirectory), fs.write_file(&mut dir, 0, &buf));
    assert_eq!(Err(Error::IsADirectory), fs.truncate_file(&mut dir, 0));
    assert!(fs.list(sub).unwrap().is_empty());
}

#[test]
fn empty_write_changes_nothing() {
    let (_, fs) = common::exact();
    let root = fs.root();
    fs.create_file(root, "empty", 0).unwrap();
    let mut file = fs.open(root, "empty").unwrap();
    let free = fs.get_free_space();

    fs.write_file(&mut file, 1 << 30, &[]).unwrap();
    assert_eq!(0, fs.open(root, "empty").unwrap().size());
    assert_eq!(free, fs.get_free_space());
}

#[test]
fn failed_extend_keeps_file() {
    let (_, fs) = common::exact();
    let root = fs.root();
    fs.create_file(root, "keep", 10).unwrap();
    let mut file = fs.open(root, "keep").unwrap();
    fs.write_file(&mut file, 0, b"0123456789").unwrap();
    let free = fs.get_free_space();

    assert_eq!(
        Err(Error::OutOfSpace),
        fs.write_file(&mut file, 64 << 20, b"x")
    );
    assert_eq!(free, fs.get_free_space());

    let file = fs.open(root, "keep").unwrap();
    assert_eq!(10, file.size());
    let mut buf = [0u8; 10];
    fs.read_file(&file, 0, &mut buf).unwrap();
    assert_eq!(b"0123456789", &buf);
}

#[test]
fn explicit_extend() {
    let (_, fs) = common::exact();
    let root = fs.root();
    fs.create_file(root, "pre", 3).unwrap();
    let mut file = fs.open(root, "pre").unwrap();
    fs.write_file(&mut file, 0, b"abc").unwrap();

    fs.extend_and_move(&mut file, 10_000).unwrap();
    assert_eq!(20, file.reserved());
    assert_eq!(3, file.size());

    // 已经足够大时什么也不做
    let start = file.start();
    fs.extend_and_move(&mut file, 512).unwrap();
    assert_eq!(start, file.start());

    let reopened = fs.open(root, "pre").unwrap();
    assert_eq!(file, reopened);
    let mut buf = [0u8; 3];
    fs.read_file(&reopened, 0, &mut buf).unwrap();
    assert_eq!(b"abc", &buf);
}

#[test]
fn truncate_within_reservation() {
    let (_, fs) = common::exact();
    let root = fs.root();
    fs.create_file(root, "t", 100).unwrap();
    let mut file = fs.open(root, "t").unwrap();

    fs.truncate_file(&mut file, 512).unwrap();
    assert_eq!(512, fs.open(root, "t").unwrap().size());
    assert_eq!(
        Err(Error::TruncateBeyondReservation),
        fs.truncate_file(&mut file, 513)
    );
    assert_eq!(512, file.size());

    fs.truncate_file(&mut file, 10).unwrap();
    assert_eq!(10, file.size());
    let mut buf = [0u8; 11];
    assert_eq!(Err(Error::InvalidArgument), fs.read_file(&file, 0, &mut buf));
}

#[test]
fn reservation_follows_extension() {
    let (_, fs) = common::defaults();
    let root = fs.root();
    fs.create_file(root, "photo.JPG", 0).unwrap();
    fs.create_file(root, "readme.txt", 0).unwrap();
    fs.create_file(root, "big.txt", 200 * 1024).unwrap();

    assert_eq!(8192, fs.open(root, "photo.jpg").unwrap().reserved());
    assert_eq!(256, fs.open(root, "readme.txt").unwrap().reserved());
    let big = fs.open(root, "big.txt").unwrap();
    assert_eq!(400, big.reserved());
    assert_eq!(200 * 1024, big.size());

    assert_eq!(
        (FREE_SECTORS - 8192 - 256 - 400) * 512,
        fs.get_free_space()
    );
}

#[test]
fn create_without_space_rolls_back() {
    let (_, fs) = common::exact();
    let root = fs.root();
    let free = fs.get_free_space();
    assert_eq!(
        Err(Error::OutOfSpace),
        fs.create_file(root, "huge", free + 1)
    );
    assert_eq!(free, fs.get_free_space());
    assert_eq!(Err(Error::NotFound), fs.open(root, "huge"));
}

#[test]
fn stale_handle_reads_moved_file() {
    let (_, fs) = common::exact();
    let root = fs.root();
    fs.create_file(root, "a", 100).unwrap();
    let mut file = fs.open(root, "a").unwrap();
    fs.write_file(&mut file, 0, &[b'A'; 100]).unwrap();
    let stale = file.clone();

    fs.write_file(&mut file, 1500, &[b'a'; 500]).unwrap();
    assert_ne!(stale.start(), file.start());

    // 首次适配把旧区段分给了b
    let b = fs.create_file(root, "b", 512).unwrap();
    assert_eq!(stale.start(), b);
    let mut other = fs.open(root, "b").unwrap();
    fs.write_file(&mut other, 0, &[b'B'; 512]).unwrap();

    let mut buf = [0; 100];
    fs.read_file(&stale, 0, &mut buf).unwrap();
    assert_eq!([b'A'; 100], buf);

    // 长度也以磁盘为准
    let mut tail = [0; 500];
    fs.read_file(&stale, 1500, &mut tail).unwrap();
    assert_eq!([b'a'; 500], tail);
}
