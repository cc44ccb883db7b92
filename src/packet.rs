use std::fmt;
use std::str::FromStr;

use crate::error::MalformedReply;
use crate::parse::Reader;

/// Engine dialect spoken by the server.
///
/// Both dialects accept the same requests; they differ in how oversized
/// replies are split across datagrams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Half-Life 1 engine (Counter-Strike 1.6 and friends).
    #[default]
    GoldSrc,
    Source,
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "goldsrc" | "hl1" => Ok(Protocol::GoldSrc),
            "source" => Ok(Protocol::Source),
            other => Err(format!("unknown protocol {other:?}")),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::GoldSrc => f.write_str("goldsrc"),
            Protocol::Source => f.write_str("source"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketHeader {
    Single,
    Split,
}

impl TryFrom<i32> for PacketHeader {
    type Error = MalformedReply;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(PacketHeader::Single),
            -2 => Ok(PacketHeader::Split),
            n => Err(MalformedReply::UnknownHeader(n)),
        }
    }
}

impl PacketHeader {
    pub fn to_le_bytes(self) -> [u8; 4] {
        let value: i32 = match self {
            PacketHeader::Single => -1,
            PacketHeader::Split => -2,
        };
        value.to_le_bytes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// A2S_INFO request -- https://developer.valvesoftware.com/wiki/Server_queries#A2S_INFO
    InfoRequest,
    /// A2S_PLAYER request -- https://developer.valvesoftware.com/wiki/Server_queries#A2S_PLAYER
    PlayerRequest,
    /// S2C_CHALLENGE
    ///
    /// The server wants the request repeated with the 4-byte token it sent.
    Challenge,
    /// A2S_INFO reply in the Source layout, which modern GoldSrc servers send too.
    InfoResponse,
    /// Obsolete GoldSrc A2S_INFO reply.
    GoldSrcInfoResponse,
    /// A2S_PLAYER reply.
    PlayerResponse,
}

impl TryFrom<u8> for PacketType {
    type Error = MalformedReply;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x54 => Ok(PacketType::InfoRequest),
            0x55 => Ok(PacketType::PlayerRequest),
            0x41 => Ok(PacketType::Challenge),
            0x49 => Ok(PacketType::InfoResponse),
            0x6d => Ok(PacketType::GoldSrcInfoResponse),
            0x44 => Ok(PacketType::PlayerResponse),
            n => Err(MalformedReply::UnknownType(n)),
        }
    }
}

impl PacketType {
    pub fn to_byte(self) -> u8 {
        match self {
            PacketType::InfoRequest => 0x54,
            PacketType::PlayerRequest => 0x55,
            PacketType::Challenge => 0x41,
            PacketType::InfoResponse => 0x49,
            PacketType::GoldSrcInfoResponse => 0x6d,
            PacketType::PlayerResponse => 0x44,
        }
    }
}

/// Replies are at most 1400 bytes plus IP/UDP headers; leave some headroom
/// for servers that don't respect that.
pub const MAX_DATAGRAM: usize = 2048;

/// Shortest datagram that can hold any valid reply.
pub const MIN_REPLY_LEN: usize = 6;

pub const INFO_PAYLOAD: &str = "Source Engine Query";

/// Challenge value that asks the server to hand out a real one.
pub const NO_CHALLENGE: [u8; 4] = [0xff; 4];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPacket {
    packet_type: PacketType,
    body: Option<&'static str>,
    challenge: Option<[u8; 4]>,
}

impl RequestPacket {
    /// A2S_INFO, optionally answering a challenge.
    pub fn info(challenge: Option<[u8; 4]>) -> Self {
        RequestPacket {
            packet_type: PacketType::InfoRequest,
            body: Some(INFO_PAYLOAD),
            challenge,
        }
    }

    /// A2S_PLAYER. Pass [`NO_CHALLENGE`] to obtain a challenge first.
    pub fn players(challenge: [u8; 4]) -> Self {
        RequestPacket {
            packet_type: PacketType::PlayerRequest,
            body: None,
            challenge: Some(challenge),
        }
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    /// Serializes the request: header, type, NUL-terminated body, challenge.
    pub fn pack(&self) -> Vec<u8> {
        let mut payload: Vec<u8> = Vec::with_capacity(29);
        payload.extend_from_slice(&PacketHeader::Single.to_le_bytes());
        payload.push(self.packet_type.to_byte());
        if let Some(body) = self.body {
            payload.extend_from_slice(body.as_bytes());
            payload.push(0);
        }
        if let Some(challenge) = &self.challenge {
            payload.extend_from_slice(challenge);
        }
        payload
    }
}

/// One piece of a reply too large for a single datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub id: i32,
    pub index: u8,
    pub total: u8,
    pub payload: Vec<u8>,
}

/// A received datagram before reassembly.
#[derive(Debug, PartialEq, Eq)]
pub enum Datagram<'a> {
    Single(&'a [u8]),
    Fragment(Fragment),
}

impl<'a> Datagram<'a> {
    /// Classify a raw datagram, decoding the split header if there is one.
    pub fn parse(data: &'a [u8], protocol: Protocol) -> Result<Self, MalformedReply> {
        let mut reader: Reader<'a> = Reader::new(data);
        let header: PacketHeader = reader.i32()?.try_into()?;
        if header == PacketHeader::Single {
            return Ok(Datagram::Single(data));
        }

        // split header, which differs between engines
        let id: i32 = reader.i32()?;
        let (index, total) = match protocol {
            Protocol::GoldSrc => {
                // high nibble is the index, low nibble the total
                let packed: u8 = reader.u8()?;
                (packed >> 4, packed & 0x0f)
            }
            Protocol::Source => {
                if (id as u32) & 0x8000_0000 != 0 {
                    return Err(MalformedReply::Compressed);
                }
                let total: u8 = reader.u8()?;
                let index: u8 = reader.u8()?;
                // maximum fragment size, not needed to reassemble
                reader.skip(2)?;
                (index, total)
            }
        };
        if total == 0 || index >= total {
            return Err(MalformedReply::BadFragment);
        }

        Ok(Datagram::Fragment(Fragment {
            id,
            index,
            total,
            payload: reader.rest().to_vec(),
        }))
    }
}

/// Collects the fragments of one split reply.
#[derive(Debug, Default)]
pub struct Reassembly {
    id: Option<i32>,
    parts: Vec<Option<Vec<u8>>>,
}

impl Reassembly {
    /// Add a fragment; returns the joined payload once every piece is in.
    ///
    /// A fragment carrying a different id discards whatever was pending.
    pub fn push(&mut self, fragment: Fragment) -> Result<Option<Vec<u8>>, MalformedReply> {
        if self.id != Some(fragment.id) {
            if let Some(old) = self.id {
                log::trace!("dropping incomplete split reply {old:#x}");
            }
            self.id = Some(fragment.id);
            self.parts = vec![None; usize::from(fragment.total)];
        } else if self.parts.len() != usize::from(fragment.total) {
            return Err(MalformedReply::BadFragment);
        }

        let slot: &mut Option<Vec<u8>> = self
            .parts
            .get_mut(usize::from(fragment.index))
            .ok_or(MalformedReply::BadFragment)?;
        *slot = Some(fragment.payload);

        if self.parts.iter().any(Option::is_none) {
            return Ok(None);
        }
        // all pieces in, in index order
        let joined: Vec<u8> = self.parts.drain(..).flatten().flatten().collect();
        self.id = None;
        Ok(Some(joined))
    }
}

/// A complete single-header reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePacket {
    packet_type: PacketType,
    body: Vec<u8>,
}

impl ResponsePacket {
    /// Split a complete reply into its type and body.
    pub fn unpack(payload: &[u8]) -> Result<Self, MalformedReply> {
        if payload.len() < MIN_REPLY_LEN {
            return Err(MalformedReply::Truncated {
                offset: payload.len(),
                needed: MIN_REPLY_LEN - payload.len(),
            });
        }

        let mut reader: Reader<'_> = Reader::new(payload);
        let header: PacketHeader = reader.i32()?.try_into()?;
        if header != PacketHeader::Single {
            return Err(MalformedReply::UnknownHeader(-2));
        }
        let packet_type: PacketType = reader.u8()?.try_into()?;

        Ok(ResponsePacket {
            packet_type,
            body: reader.rest().to_vec(),
        })
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    /// Everything after the type byte.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The token carried by an S2C_CHALLENGE reply.
    pub fn challenge(&self) -> Result<[u8; 4], MalformedReply> {
        let mut reader = Reader::new(&self.body);
        let mut token = [0u8; 4];
        token.copy_from_slice(reader.bytes(4)?);
        Ok(token)
    }

    /// Fail unless this reply has the type the caller asked for.
    pub fn expect_type(self, expected: PacketType) -> Result<Self, MalformedReply> {
        if self.packet_type == expected {
            Ok(self)
        } else {
            Err(MalformedReply::UnexpectedType {
                expected: expected.to_byte(),
                found: self.packet_type.to_byte(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_request_is_the_fixed_25_bytes() {
        let packed = RequestPacket::info(None).pack();
        assert_eq!(packed.len(), 25);
        assert_eq!(&packed[..5], &[0xff, 0xff, 0xff, 0xff, 0x54]);
        assert_eq!(&packed[5..24], b"Source Engine Query");
        assert_eq!(packed[24], 0);
    }

    #[test]
    fn challenged_info_request_appends_token() {
        let packed = RequestPacket::info(Some([1, 2, 3, 4])).pack();
        assert_eq!(packed.len(), 29);
        assert_eq!(&packed[25..], &[1, 2, 3, 4]);
    }

    #[test]
    fn player_request_has_no_body() {
        let packed = RequestPacket::players(NO_CHALLENGE).pack();
        assert_eq!(packed, vec![0xff, 0xff, 0xff, 0xff, 0x55, 0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn unpacks_challenge() {
        let packet = ResponsePacket::unpack(&[0xff, 0xff, 0xff, 0xff, 0x41, 9, 8, 7, 6]).unwrap();
        assert_eq!(packet.packet_type(), PacketType::Challenge);
        assert_eq!(packet.challenge().unwrap(), [9, 8, 7, 6]);
    }

    #[test]
    fn short_challenge_is_malformed() {
        let packet = ResponsePacket::unpack(&[0xff, 0xff, 0xff, 0xff, 0x41, 9]).unwrap();
        assert!(matches!(
            packet.challenge(),
            Err(MalformedReply::Truncated { .. })
        ));
    }

    #[test]
    fn rejects_tiny_datagrams() {
        for len in 0..MIN_REPLY_LEN {
            let data = vec![0xff; len];
            assert!(matches!(
                ResponsePacket::unpack(&data),
                Err(MalformedReply::Truncated { .. })
            ));
        }
    }

    #[test]
    fn rejects_unknown_header_and_type() {
        assert_eq!(
            ResponsePacket::unpack(&[1, 0, 0, 0, 0x49, 0]),
            Err(MalformedReply::UnknownHeader(1))
        );
        assert_eq!(
            ResponsePacket::unpack(&[0xff, 0xff, 0xff, 0xff, 0x7a, 0]),
            Err(MalformedReply::UnknownType(0x7a))
        );
    }

    #[test]
    fn expect_reports_mismatch() {
        let packet = ResponsePacket::unpack(&[0xff, 0xff, 0xff, 0xff, 0x44, 0]).unwrap();
        assert_eq!(
            packet.expect_type(PacketType::InfoResponse),
            Err(MalformedReply::UnexpectedType {
                expected: 0x49,
                found: 0x44
            })
        );
    }

    fn goldsrc_fragment(id: i32, index: u8, total: u8, payload: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&PacketHeader::Split.to_le_bytes());
        data.extend_from_slice(&id.to_le_bytes());
        data.push((index << 4) | total);
        data.extend_from_slice(payload);
        data
    }

    #[test]
    fn reassembles_goldsrc_fragments_out_of_order() {
        let second = goldsrc_fragment(7, 1, 2, b"world");
        let first = goldsrc_fragment(7, 0, 2, b"hello ");
        let mut reassembly = Reassembly::default();

        let Datagram::Fragment(fragment) = Datagram::parse(&second, Protocol::GoldSrc).unwrap() else {
            panic!("expected a fragment");
        };
        assert_eq!(reassembly.push(fragment).unwrap(), None);

        let Datagram::Fragment(fragment) = Datagram::parse(&first, Protocol::GoldSrc).unwrap() else {
            panic!("expected a fragment");
        };
        assert_eq!(reassembly.push(fragment).unwrap(), Some(b"hello world".to_vec()));
    }

    #[test]
    fn parses_source_fragment_header() {
        let mut data = Vec::new();
        data.extend_from_slice(&PacketHeader::Split.to_le_bytes());
        data.extend_from_slice(&42i32.to_le_bytes());
        data.extend_from_slice(&[3, 1]);
        data.extend_from_slice(&1248u16.to_le_bytes());
        data.extend_from_slice(b"abc");

        assert_eq!(
            Datagram::parse(&data, Protocol::Source).unwrap(),
            Datagram::Fragment(Fragment {
                id: 42,
                index: 1,
                total: 3,
                payload: b"abc".to_vec(),
            })
        );
    }

    #[test]
    fn rejects_compressed_source_fragments() {
        let mut data = Vec::new();
        data.extend_from_slice(&PacketHeader::Split.to_le_bytes());
        data.extend_from_slice(&(0x8000_0001u32 as i32).to_le_bytes());
        data.extend_from_slice(&[2, 0, 0xe0, 0x04]);
        assert_eq!(
            Datagram::parse(&data, Protocol::Source),
            Err(MalformedReply::Compressed)
        );
    }

    #[test]
    fn rejects_fragment_index_out_of_range() {
        let data = goldsrc_fragment(1, 3, 2, b"x");
        assert_eq!(
            Datagram::parse(&data, Protocol::GoldSrc),
            Err(MalformedReply::BadFragment)
        );
    }

    #[test]
    fn inconsistent_totals_are_rejected() {
        let mut reassembly = Reassembly::default();
        let fragment = |index, total| Fragment {
            id: 5,
            index,
            total,
            payload: vec![index],
        };
        assert_eq!(reassembly.push(fragment(0, 3)).unwrap(), None);
        assert_eq!(reassembly.push(fragment(1, 2)), Err(MalformedReply::BadFragment));
    }

    #[test]
    fn protocol_names_round_trip_through_from_str() {
        assert_eq!("GoldSrc".parse::<Protocol>().unwrap(), Protocol::GoldSrc);
        assert_eq!("source".parse::<Protocol>().unwrap(), Protocol::Source);
        assert!("quake".parse::<Protocol>().is_err());
    }
}
