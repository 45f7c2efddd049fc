//! Constants used in RetroFS

/// 逻辑扇区大小，也是设备必须提供的物理扇区大小
pub const SECTOR_SIZE: usize = 512;

/// 名字字段的长度，包括结尾的NUL
pub const MAX_NAME: usize = 128;

/// 一个目录块占用的扇区数
pub const DIR_BLOCK_SECTORS: u64 = 64;
/// 一个目录块的字节数
pub const DIR_BLOCK_BYTES: usize = DIR_BLOCK_SECTORS as usize * SECTOR_SIZE;
/// 每个目录块中的目录项个数，第一个半扇区是块头
pub const ENTRIES_PER_BLOCK: usize = DIR_BLOCK_BYTES / (SECTOR_SIZE / 2) - 1;

/// 批量读写（空闲位图、清零、数据拷贝）的扇区数，64 KiB
pub const MAP_CHUNK_SECTORS: u64 = 128;

/// 遍历目录链时最多访问的块数
pub const WALK_LIMIT: u32 = 1 << 16;

/// 每个L1组的扇区数，恰好对应一个L0位图扇区
pub const L1_GROUP_SECTORS: u64 = (SECTOR_SIZE * 8) as u64;
/// 每个L2超级组包含的L1组数
pub const L2_GROUPS_PER_SUPER: u64 = 1024;

/// 描述块魔数，小端序下为"RetroFS1"
pub const RFS_ID: u64 = 0x3153_466f_7274_6552;

/// GPT分区类型，4DEC1156-FEC8-4495-854B-20D888E21AF0
pub const GPT_TYPE_GUID: u128 = 0x4DEC_1156_FEC8_4495_854B_20D8_88E2_1AF0;

/// 描述块加根目录块
pub const RESERVED_SECTORS: u64 = 1 + DIR_BLOCK_SECTORS;

/// 新文件的预留空间策略
#[derive(Debug, Clone, Copy)]
pub struct ReservationPolicy {
    /// 未知扩展名的预留字节数
    pub default_bytes: u64,
    /// 按扩展名（不区分大小写）指定的预留字节数
    pub by_extension: &'static [(&'static str, u64)],
}

const KIB: u64 = 1024;

static IMAGE_RESERVATIONS: [(&str, u64); 8] = [
    ("jpeg", 4096 * KIB),
    ("jpg", 4096 * KIB),
    ("png", 4096 * KIB),
    ("gif", 4096 * KIB),
    ("bmp", 4096 * KIB),
    ("webp", 4096 * KIB),
    ("tif", 4096 * KIB),
    ("tiff", 4096 * KIB),
];

impl Default for ReservationPolicy {
    fn default() -> Self {
        Self {
            default_bytes: 128 * KIB,
            by_extension: &IMAGE_RESERVATIONS,
        }
    }
}

impl ReservationPolicy {
    /// 不做任何额外预留，只按请求大小分配
    pub const EXACT: Self = Self {
        default_bytes: 0,
        by_extension: &[],
    };

    pub fn for_name(&self, name: &str) -> u64 {
        name.rsplit_once('.')
            .filter(|(_, ext)| !ext.is_empty())
            .and_then(|(_, ext)| {
                self.by_extension
                    .iter()
                    .find(|(known, _)| known.eq_ignore_ascii_case(ext))
            })
            .map_or(self.default_bytes, |&(_, bytes)| bytes)
    }
}

/// 挂载与格式化选项
#[derive(Debug, Clone, Copy, Default)]
pub struct MountOptions {
    pub reservation: ReservationPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservation_by_extension() {
        let policy = ReservationPolicy::default();
        assert_eq!(4096 * KIB, policy.for_name("HOLIDAY.JPG"));
        assert_eq!(4096 * KIB, policy.for_name("scan.tiff"));
        assert_eq!(128 * KIB, policy.for_name("readme.txt"));
        assert_eq!(128 * KIB, policy.for_name("Makefile"));
        assert_eq!(128 * KIB, policy.for_name("trailing."));
        assert_eq!(0, ReservationPolicy::EXACT.for_name("a.png"));
    }

    #[test]
    fn geometry() {
        assert_eq!(127, ENTRIES_PER_BLOCK);
        assert_eq!(4096, L1_GROUP_SECTORS);
        assert_eq!(RFS_ID.to_le_bytes(), *b"RetroFS1");
    }
}
