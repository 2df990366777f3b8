//! The bitmap allocator shared by the inode bitmap and the sector bitmap.
//!
//! Bits are numbered MSB-first within each byte, matching the on-disk layout
//! both bitmaps use: bit index ↔ inode/sector number arithmetic stays
//! identical to the disk format. The allocator keeps no state across calls;
//! every mutation is a read-modify-write of exactly one sector, so an abort
//! between calls never leaves more than one sector inconsistent. This mirrors
//! `mkfs::ext2::fill_bitmap`'s own read-then-write-a-contiguous-range
//! structure, generalized to per-bit scan/set/clear.

use crate::device::BlockDevice;
use crate::error::{Errno, Result};
use crate::layout::SECTOR_SIZE;

/// Writes `sector_count` consecutive sectors starting at `start_sector` so
/// that the first `k` bits (MSB-first within each byte) are `1` and the rest
/// are `0`.
pub fn init(dev: &mut dyn BlockDevice, start_sector: usize, sector_count: usize, k: usize) -> Result<()> {
    let total_bits = sector_count * SECTOR_SIZE * 8;
    let k = k.min(total_bits);

    let mut remaining = k;
    for s in 0..sector_count {
        let mut buf = [0u8; SECTOR_SIZE];
        let bits_in_sector = SECTOR_SIZE * 8;
        let set_here = remaining.min(bits_in_sector);

        let full_bytes = set_here / 8;
        let leftover_bits = set_here % 8;
        buf[..full_bytes].fill(0xFF);
        if leftover_bits > 0 {
            // MSB-first: the top `leftover_bits` bits of this byte are set.
            buf[full_bytes] = !(0xFFu8 >> leftover_bits);
        }

        dev.write_sector(start_sector + s, &buf)?;
        remaining = remaining.saturating_sub(set_here);
    }
    Ok(())
}

/// Scans for the first clear bit within the first `total_bits` bits of the
/// bitmap spanning `sector_count` sectors starting at `start_sector`, sets it,
/// writes the owning sector back, and returns its global bit index.
///
/// Returns `-1` if no free bit exists within `total_bits`.
pub fn first_unused(
    dev: &mut dyn BlockDevice,
    start_sector: usize,
    sector_count: usize,
    total_bits: usize,
) -> Result<i64> {
    for s in 0..sector_count {
        let mut buf = [0u8; SECTOR_SIZE];
        dev.read_sector(start_sector + s, &mut buf)?;

        for (byte_idx, byte) in buf.iter_mut().enumerate() {
            let sector_bit_base = s * SECTOR_SIZE * 8;
            let byte_bit_base = sector_bit_base + byte_idx * 8;
            if byte_bit_base >= total_bits {
                return Ok(-1);
            }
            if *byte == 0xFF {
                continue;
            }

            for bit in 0..8 {
                let global_index = byte_bit_base + bit;
                if global_index >= total_bits {
                    return Ok(-1);
                }
                let mask = 0x80u8 >> bit;
                if *byte & mask == 0 {
                    *byte |= mask;
                    dev.write_sector(start_sector + s, &buf)?;
                    return Ok(global_index as i64);
                }
            }
        }
    }
    Ok(-1)
}

/// Clears bit `bit_index` within the bitmap spanning `sector_count` sectors
/// starting at `start_sector`.
pub fn reset(
    dev: &mut dyn BlockDevice,
    start_sector: usize,
    sector_count: usize,
    bit_index: usize,
) -> Result<()> {
    let bits_in_sector = SECTOR_SIZE * 8;
    let sector = bit_index / bits_in_sector;
    if sector >= sector_count {
        return Err(Errno::General);
    }
    let bit_in_sector = bit_index % bits_in_sector;
    let byte_within_sector = bit_in_sector / 8;
    let bit_within_byte = bit_in_sector % 8;

    let mut buf = [0u8; SECTOR_SIZE];
    dev.read_sector(start_sector + sector, &mut buf)?;
    buf[byte_within_sector] &= !(0x80u8 >> bit_within_byte);
    dev.write_sector(start_sector + sector, &buf)?;
    Ok(())
}
