/// Byte that terminates every frame on the stream.
pub const FRAME_DELIMITER: u8 = b'\n';

/// Maximum length of one frame in bytes, excluding the delimiter.
///
/// A full message is well under 512 bytes; anything larger is treated as
/// garbage rather than buffered without bound.
pub const MAX_FRAME_LEN: usize = 4 * 1024;

/// Initial capacity of a receive buffer.
pub const RX_BUFFER_SIZE: usize = 8 * 1024;

/// Number of cells on the board.
pub const BOARD_CELLS: usize = 9;

/// Board side length.
pub const BOARD_SIDE: usize = 3;
