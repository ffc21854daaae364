//! Command Descriptor Block builders

pub fn test_unit_ready() -> Vec<u8> {
    vec![0x00, 0, 0, 0, 0, 0]
}

pub fn request_sense(alloc_len: u8) -> Vec<u8> {
    vec![0x03, 0, 0, 0, alloc_len, 0]
}

pub fn inquiry(alloc_len: u16) -> Vec<u8> {
    let len = alloc_len.to_be_bytes();
    vec![0x12, 0, 0, len[0], len[1], 0]
}

pub fn inquiry_vpd(page_code: u8, alloc_len: u16) -> Vec<u8> {
    let len = alloc_len.to_be_bytes();
    vec![0x12, 0x01, page_code, len[0], len[1], 0]
}

pub fn mode_sense_6(alloc_len: u8) -> Vec<u8> {
    vec![0x1A, 0, 0x3F, 0, alloc_len, 0]
}

pub fn mode_sense_10(alloc_len: u16) -> Vec<u8> {
    let len = alloc_len.to_be_bytes();
    vec![0x5A, 0, 0x3F, 0, 0, 0, 0, len[0], len[1], 0]
}

pub fn prevent_allow_medium_removal(prevent: bool) -> Vec<u8> {
    vec![0x1E, 0, 0, 0, prevent as u8, 0]
}

pub fn start_stop_unit(start: bool) -> Vec<u8> {
    vec![0x1B, 0, 0, 0, start as u8, 0]
}

pub fn read_format_capacities(alloc_len: u16) -> Vec<u8> {
    let len = alloc_len.to_be_bytes();
    vec![0x23, 0, 0, 0, 0, 0, 0, len[0], len[1], 0]
}

pub fn read_capacity_10() -> Vec<u8> {
    vec![0x25, 0, 0, 0, 0, 0, 0, 0, 0, 0]
}

pub fn read_capacity_16(alloc_len: u32) -> Vec<u8> {
    let mut cb = vec![0u8; 16];
    cb[0] = 0x9E;
    cb[1] = 0x10;
    cb[10..14].copy_from_slice(&alloc_len.to_be_bytes());
    cb
}

pub fn report_luns(alloc_len: u32) -> Vec<u8> {
    let mut cb = vec![0u8; 12];
    cb[0] = 0xA0;
    cb[6..10].copy_from_slice(&alloc_len.to_be_bytes());
    cb
}

fn rw10(opcode: u8, lba: u32, blocks: u16) -> Vec<u8> {
    let lba = lba.to_be_bytes();
    let len = blocks.to_be_bytes();
    vec![
        opcode, 0, lba[0], lba[1], lba[2], lba[3], 0, len[0], len[1], 0,
    ]
}

pub fn read_10(lba: u32, blocks: u16) -> Vec<u8> {
    rw10(0x28, lba, blocks)
}

pub fn write_10(lba: u32, blocks: u16) -> Vec<u8> {
    rw10(0x2A, lba, blocks)
}

pub fn verify_10(lba: u32, blocks: u16) -> Vec<u8> {
    rw10(0x2F, lba, blocks)
}

pub fn synchronize_cache_10() -> Vec<u8> {
    vec![0x35, 0, 0, 0, 0, 0, 0, 0, 0, 0]
}
