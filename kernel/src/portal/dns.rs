// Captive DNS: every A/IN question resolves to the access point.
// Other types get NOERROR with no answer so clients fall back to A.

pub const DNS_PORT: u16 = 53;

const HEADER_LEN: usize = 12;
const TYPE_A: u16 = 1;
const CLASS_IN: u16 = 1;
const TTL_SECS: u32 = 60;

const FLAG_QR: u16 = 0x8000;
const FLAG_AA: u16 = 0x0400;
const FLAG_RD: u16 = 0x0100;
const FLAG_RA: u16 = 0x0080;
const OPCODE_MASK: u16 = 0x7800;

#[inline]
fn be16(b: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([b[at], b[at + 1]])
}

/// End offset of the first question (name + type + class), if sane.
fn question_end(query: &[u8]) -> Option<usize> {
    let mut pos = HEADER_LEN;
    loop {
        let len = *query.get(pos)? as usize;
        if len == 0 {
            pos += 1;
            break;
        }
        // compression pointers are not valid in a lone question
        if len & 0xC0 != 0 {
            return None;
        }
        pos += 1 + len;
    }
    let end = pos + 4;
    (end <= query.len()).then_some(end)
}

/// Builds the reply to `query` in `out`; `None` for anything that is
/// not a standard query we can answer.
pub fn answer(query: &[u8], ip: [u8; 4], out: &mut [u8]) -> Option<usize> {
    if query.len() < HEADER_LEN {
        return None;
    }
    let flags = be16(query, 2);
    if flags & FLAG_QR != 0 || flags & OPCODE_MASK != 0 || be16(query, 4) == 0 {
        return None;
    }
    let q_end = question_end(query)?;
    let qtype = be16(query, q_end - 4);
    let qclass = be16(query, q_end - 2);
    let with_answer = qtype == TYPE_A && qclass == CLASS_IN;

    let reply_len = q_end + if with_answer { 16 } else { 0 };
    if out.len() < reply_len {
        return None;
    }

    out[..q_end].copy_from_slice(&query[..q_end]);
    let reply_flags = FLAG_QR | FLAG_AA | FLAG_RA | (flags & FLAG_RD);
    out[2..4].copy_from_slice(&reply_flags.to_be_bytes());
    out[4..6].copy_from_slice(&1u16.to_be_bytes());
    out[6..8].copy_from_slice(&(with_answer as u16).to_be_bytes());
    out[8..12].fill(0);

    if with_answer {
        let a = &mut out[q_end..reply_len];
        a[0..2].copy_from_slice(&0xC00Cu16.to_be_bytes()); // name -> question
        a[2..4].copy_from_slice(&TYPE_A.to_be_bytes());
        a[4..6].copy_from_slice(&CLASS_IN.to_be_bytes());
        a[6..10].copy_from_slice(&TTL_SECS.to_be_bytes());
        a[10..12].copy_from_slice(&4u16.to_be_bytes());
        a[12..16].copy_from_slice(&ip);
    }
    Some(reply_len)
}
