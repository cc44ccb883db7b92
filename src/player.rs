use std::time::Duration;

use crate::error::MalformedReply;
use crate::packet::{PacketType, ResponsePacket};
use crate::parse::Reader;

/// One entry of an A2S_PLAYER reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    pub name: String,
    /// Kills, or whatever the mod reports as score
    pub score: i32,
    /// Time on the server, in whole seconds
    pub connected_secs: u32,
}

impl PlayerRecord {
    pub fn connected(&self) -> Duration {
        Duration::from_secs(u64::from(self.connected_secs))
    }

    /// Parse an A2S_PLAYER reply into players, in the order the server sent them.
    ///
    /// Servers routinely announce more players than they list (connecting
    /// clients, hidden bots), so a short list is accepted. An entry that is
    /// cut off halfway is not.
    pub fn parse_list(packet: &ResponsePacket) -> Result<Vec<PlayerRecord>, MalformedReply> {
        if packet.packet_type() != PacketType::PlayerResponse {
            return Err(MalformedReply::UnexpectedType {
                expected: PacketType::PlayerResponse.to_byte(),
                found: packet.packet_type().to_byte(),
            });
        }

        let mut reader = Reader::new(packet.body());
        let announced = reader.u8()?;
        let mut players = Vec::with_capacity(usize::from(announced));

        while players.len() < usize::from(announced) && !reader.is_empty() {
            let _index = reader.u8()?;
            let name = reader.cstring()?;
            let score = reader.i32()?;
            // float seconds; `as` saturates and maps NaN to 0
            let connected_secs = reader.f32()? as u32;
            players.push(PlayerRecord {
                name,
                score,
                connected_secs,
            });
        }

        if players.len() < usize::from(announced) {
            log::trace!("server announced {announced} players but listed {}", players.len());
        }
        Ok(players)
    }
}
