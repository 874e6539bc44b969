// SNTPv4 client packets (RFC 4330), seconds resolution only.

pub const PACKET_LEN: usize = 48;
pub const NTP_PORT: u16 = 123;
pub const SERVER: &str = "pool.ntp.org";

// 1900-01-01 to 1970-01-01
const UNIX_OFFSET: u32 = 2_208_988_800;

const MODE_CLIENT: u8 = 3;
const MODE_SERVER: u8 = 4;
const VERSION: u8 = 4;

pub fn request() -> [u8; PACKET_LEN] {
    let mut pkt = [0u8; PACKET_LEN];
    pkt[0] = (VERSION << 3) | MODE_CLIENT;
    pkt
}

/// Transmit timestamp of a server reply as Unix seconds. Rejects short
/// packets, non-server modes and kiss-o'-death (stratum 0).
pub fn parse_reply(pkt: &[u8]) -> Option<u32> {
    if pkt.len() < PACKET_LEN {
        return None;
    }
    if pkt[0] & 0x07 != MODE_SERVER || pkt[1] == 0 {
        return None;
    }
    let secs = u32::from_be_bytes([pkt[40], pkt[41], pkt[42], pkt[43]]);
    // era 0 ends in 2036; anything before 1970 is bogus here
    secs.checked_sub(UNIX_OFFSET)
}
