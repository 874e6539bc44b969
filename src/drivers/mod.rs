// Chip-level drivers that back the kernel traits on this board.

pub mod storage;
