// Minimal DHCPv4 server for the setup access point
//
// Hands out 192.168.4.2 onward, one lease per client MAC, with the AP
// as router and DNS server so the captive DNS catches every lookup.
// Leases never expire; the portal lives for one boot at most.

pub const SERVER_PORT: u16 = 67;
pub const CLIENT_PORT: u16 = 68;

const POOL: usize = 8;
const FIRST_HOST: u8 = 2;
const LEASE_SECS: u32 = 7200;

const OP_REQUEST: u8 = 1;
const OP_REPLY: u8 = 2;
const MAGIC: [u8; 4] = [99, 130, 83, 99];
const OPTIONS_AT: usize = 240;
/// BOOTP minimum message size.
const MIN_REPLY: usize = 300;

const OPT_PAD: u8 = 0;
const OPT_SUBNET: u8 = 1;
const OPT_ROUTER: u8 = 3;
const OPT_DNS: u8 = 6;
const OPT_REQUESTED_IP: u8 = 50;
const OPT_LEASE: u8 = 51;
const OPT_MSG_TYPE: u8 = 53;
const OPT_SERVER_ID: u8 = 54;
const OPT_END: u8 = 255;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Ack = 5,
    Nak = 6,
    Release = 7,
}

impl MessageType {
    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => Self::Discover,
            2 => Self::Offer,
            3 => Self::Request,
            5 => Self::Ack,
            6 => Self::Nak,
            7 => Self::Release,
            _ => return None,
        })
    }
}

fn option(pkt: &[u8], code: u8) -> Option<&[u8]> {
    let mut i = OPTIONS_AT;
    while i < pkt.len() {
        match pkt[i] {
            OPT_PAD => i += 1,
            OPT_END => return None,
            c => {
                let len = *pkt.get(i + 1)? as usize;
                let data = pkt.get(i + 2..i + 2 + len)?;
                if c == code {
                    return Some(data);
                }
                i += 2 + len;
            }
        }
    }
    None
}

pub struct DhcpServer {
    server: [u8; 4],
    leases: [Option<[u8; 6]>; POOL],
}

impl DhcpServer {
    pub const fn new(server: [u8; 4]) -> Self {
        Self {
            server,
            leases: [None; POOL],
        }
    }

    fn addr(&self, slot: usize) -> [u8; 4] {
        let [a, b, c, _] = self.server;
        [a, b, c, FIRST_HOST + slot as u8]
    }

    fn lease_for(&mut self, mac: [u8; 6]) -> Option<usize> {
        if let Some(i) = self.leases.iter().position(|l| *l == Some(mac)) {
            return Some(i);
        }
        let free = self.leases.iter().position(Option::is_none)?;
        self.leases[free] = Some(mac);
        Some(free)
    }

    /// Processes one client datagram; returns the reply length in
    /// `out` (to be broadcast to port 68) or `None` to stay silent.
    pub fn handle(&mut self, req: &[u8], out: &mut [u8]) -> Option<usize> {
        if req.len() < OPTIONS_AT || req[0] != OP_REQUEST || req[236..240] != MAGIC {
            return None;
        }
        let kind = MessageType::from_u8(*option(req, OPT_MSG_TYPE)?.first()?)?;
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&req[28..34]);

        let (reply, yiaddr) = match kind {
            MessageType::Discover => {
                let slot = self.lease_for(mac)?;
                (MessageType::Offer, self.addr(slot))
            }
            MessageType::Request => {
                if let Some(id) = option(req, OPT_SERVER_ID)
                    && id != self.server
                {
                    // client picked another server
                    return None;
                }
                let slot = self.lease_for(mac)?;
                let ours = self.addr(slot);
                let wanted = match option(req, OPT_REQUESTED_IP) {
                    Some(ip) if ip.len() == 4 => [ip[0], ip[1], ip[2], ip[3]],
                    _ => [req[12], req[13], req[14], req[15]],
                };
                if wanted == ours || wanted == [0; 4] {
                    (MessageType::Ack, ours)
                } else {
                    (MessageType::Nak, [0; 4])
                }
            }
            MessageType::Release => {
                if let Some(l) = self.leases.iter_mut().find(|l| **l == Some(mac)) {
                    *l = None;
                }
                return None;
            }
            _ => return None,
        };
        self.build(req, reply, yiaddr, out)
    }

    fn build(&self, req: &[u8], kind: MessageType, yiaddr: [u8; 4], out: &mut [u8]) -> Option<usize> {
        if out.len() < MIN_REPLY {
            return None;
        }
        out[..MIN_REPLY].fill(0);
        out[0] = OP_REPLY;
        out[1] = 1;
        out[2] = 6;
        out[4..8].copy_from_slice(&req[4..8]); // xid
        out[10..12].copy_from_slice(&req[10..12]); // flags
        out[16..20].copy_from_slice(&yiaddr);
        out[20..24].copy_from_slice(&self.server);
        out[24..28].copy_from_slice(&req[24..28]); // giaddr
        out[28..44].copy_from_slice(&req[28..44]); // chaddr
        out[236..240].copy_from_slice(&MAGIC);

        let mut i = OPTIONS_AT;
        let mut put = |code: u8, data: &[u8]| {
            out[i] = code;
            out[i + 1] = data.len() as u8;
            out[i + 2..i + 2 + data.len()].copy_from_slice(data);
            i += 2 + data.len();
        };
        put(OPT_MSG_TYPE, &[kind as u8]);
        put(OPT_SERVER_ID, &self.server);
        if kind != MessageType::Nak {
            put(OPT_LEASE, &LEASE_SECS.to_be_bytes());
            put(OPT_SUBNET, &[255, 255, 255, 0]);
            put(OPT_ROUTER, &self.server);
            put(OPT_DNS, &self.server);
        }
        out[i] = OPT_END;
        Some(MIN_REPLY.max(i + 1))
    }
}
