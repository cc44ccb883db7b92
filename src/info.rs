use std::str::FromStr;

use crate::error::MalformedReply;
use crate::packet::{PacketType, ResponsePacket};
use crate::parse::Reader;
use crate::player::PlayerRecord;

/// Status of a server as obtained by [`query`](crate::query::query).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatus {
    /// Always `true` for a status built from a reply; a server that did not
    /// answer yields an error instead.
    pub online: bool,
    /// Server hostname
    pub name: String,
    /// Current map
    pub map: String,
    /// Current players, as reported in the info reply
    pub player_count: u8,
    /// Player slots, when the reply carries them
    pub max_players: Option<u8>,
    /// Player list, filled only when players were requested
    pub players: Vec<PlayerRecord>,
    /// Remaining info fields, absent for the compact layout
    pub details: Option<ServerDetails>,
}

/// The rest of a full A2S_INFO reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDetails {
    /// A2S_INFO protocol version
    pub protocol: u8,
    /// Location of server files
    pub folder: String,
    /// Name of game
    pub game: String,
    /// Steam app id; 0 for the obsolete GoldSrc reply
    pub app_id: u16,
    /// Current bots
    pub bots: u8,
    pub server_type: ServerType,
    pub environment: Environment,
    /// Is the server password protected?
    pub password_protected: bool,
    /// Is the server VAC enabled?
    pub vac_enabled: bool,
    /// Game version
    pub version: Option<String>,
    /// Game port, from the extra data block
    pub game_port: Option<u16>,
    /// Server Steam id, from the extra data block
    pub steam_id: Option<u64>,
    /// Tags, from the extra data block
    pub keywords: Option<String>,
    /// `ip:port` the server reports for itself (obsolete GoldSrc reply only)
    pub game_address: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerType {
    Dedicated,
    /// Non-dedicated
    Listen,
    /// SourceTV relay
    Proxy,
    Unknown(char),
}

impl From<char> for ServerType {
    fn from(c: char) -> Self {
        match c.to_ascii_lowercase() {
            'd' => ServerType::Dedicated,
            'l' => ServerType::Listen,
            'p' => ServerType::Proxy,
            _ => ServerType::Unknown(c),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Linux,
    Windows,
    Mac,
    Unknown(char),
}

impl From<char> for Environment {
    fn from(c: char) -> Self {
        match c.to_ascii_lowercase() {
            'l' => Environment::Linux,
            'w' => Environment::Windows,
            'm' | 'o' => Environment::Mac,
            _ => Environment::Unknown(c),
        }
    }
}

/// How to read an A2S_INFO (`0x49`) reply body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InfoLayout {
    /// Try [`InfoLayout::Full`]; fall back to [`InfoLayout::Compact`] only
    /// when the body is exactly name, map and player count.
    #[default]
    Auto,
    /// Protocol byte at offset 5, then every documented field.
    Full,
    /// Name at offset 5, map, player count. Anything after is ignored.
    Compact,
}

impl FromStr for InfoLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(InfoLayout::Auto),
            "full" => Ok(InfoLayout::Full),
            "compact" => Ok(InfoLayout::Compact),
            other => Err(format!("unknown layout {other:?}")),
        }
    }
}

/// App id of The Ship, whose reply carries three extra bytes.
const THE_SHIP_APP_ID: u16 = 2400;

// extra data flags
const EDF_PORT: u8 = 0x80;
const EDF_STEAM_ID: u8 = 0x10;
const EDF_SOURCE_TV: u8 = 0x40;
const EDF_KEYWORDS: u8 = 0x20;
const EDF_GAME_ID: u8 = 0x01;

impl ServerStatus {
    /// Parse an A2S_INFO reply.
    pub fn parse(packet: &ResponsePacket, layout: InfoLayout) -> Result<ServerStatus, MalformedReply> {
        match packet.packet_type() {
            PacketType::InfoResponse => match layout {
                InfoLayout::Full => Self::parse_full(packet.body()),
                InfoLayout::Compact => Self::parse_compact(packet.body(), false),
                // only a body that is exactly name, map and count is taken as
                // compact; anything longer is a damaged full reply
                InfoLayout::Auto => Self::parse_full(packet.body()).or_else(|err| {
                    log::trace!("full info layout rejected ({err}), trying compact");
                    Self::parse_compact(packet.body(), true).map_err(|_| err)
                }),
            },
            PacketType::GoldSrcInfoResponse => Self::parse_goldsrc(packet.body()),
            other => Err(MalformedReply::UnexpectedType {
                expected: PacketType::InfoResponse.to_byte(),
                found: other.to_byte(),
            }),
        }
    }

    /// With `exact`, trailing bytes after the player count are rejected.
    fn parse_compact(body: &[u8], exact: bool) -> Result<ServerStatus, MalformedReply> {
        let mut reader = Reader::new(body);
        let name = reader.cstring()?;
        let map = reader.cstring()?;
        let player_count = reader.u8()?;
        if exact && !reader.is_empty() {
            return Err(MalformedReply::TrailingBytes {
                offset: reader.position(),
            });
        }

        Ok(ServerStatus {
            online: true,
            name,
            map,
            player_count,
            max_players: None,
            players: Vec::new(),
            details: None,
        })
    }

    fn parse_full(body: &[u8]) -> Result<ServerStatus, MalformedReply> {
        let mut reader = Reader::new(body);
        let protocol = reader.u8()?;
        let name = reader.cstring()?;
        let map = reader.cstring()?;
        let folder = reader.cstring()?;
        let game = reader.cstring()?;
        let app_id = reader.u16()?;
        let player_count = reader.u8()?;
        let max_players = reader.u8()?;
        let bots = reader.u8()?;
        let server_type = reader.ascii()?.into();
        let environment = reader.ascii()?.into();
        let password_protected = reader.bool()?;
        let vac_enabled = reader.bool()?;

        // mode, witnesses, duration
        if app_id == THE_SHIP_APP_ID {
            reader.skip(3)?;
        }

        let mut details = ServerDetails {
            protocol,
            folder,
            game,
            app_id,
            bots,
            server_type,
            environment,
            password_protected,
            vac_enabled,
            version: None,
            game_port: None,
            steam_id: None,
            keywords: None,
            game_address: None,
        };

        // everything past this point is optional; keep what parses
        if let Err(err) = Self::parse_extra(&mut reader, &mut details) {
            log::trace!("ignoring damaged optional info fields: {err}");
        }

        Ok(ServerStatus {
            online: true,
            name,
            map,
            player_count,
            max_players: Some(max_players),
            players: Vec::new(),
            details: Some(details),
        })
    }

    /// Version string and the extra data block that follow the VAC flag.
    fn parse_extra(reader: &mut Reader<'_>, details: &mut ServerDetails) -> Result<(), MalformedReply> {
        if reader.is_empty() {
            return Ok(());
        }
        details.version = Some(reader.cstring()?);

        if reader.is_empty() {
            return Ok(());
        }
        let edf: u8 = reader.u8()?;
        if edf & EDF_PORT != 0 {
            details.game_port = Some(reader.u16()?);
        }
        if edf & EDF_STEAM_ID != 0 {
            details.steam_id = Some(reader.u64()?);
        }
        if edf & EDF_SOURCE_TV != 0 {
            reader.u16()?;
            reader.cstring()?;
        }
        if edf & EDF_KEYWORDS != 0 {
            details.keywords = Some(reader.cstring()?);
        }
        if edf & EDF_GAME_ID != 0 {
            reader.u64()?;
        }
        Ok(())
    }

    fn parse_goldsrc(body: &[u8]) -> Result<ServerStatus, MalformedReply> {
        let mut reader = Reader::new(body);
        let game_address = reader.cstring()?;
        let name = reader.cstring()?;
        let map = reader.cstring()?;
        let folder = reader.cstring()?;
        let game = reader.cstring()?;
        let player_count = reader.u8()?;
        let max_players = reader.u8()?;
        let protocol = reader.u8()?;
        let server_type = reader.ascii()?.into();
        let environment = reader.ascii()?.into();
        let password_protected = reader.bool()?;

        // mod block: link, download link, NUL, version, size, type, dll
        if reader.bool()? {
            reader.cstring()?;
            reader.cstring()?;
            reader.skip(1)?;
            reader.skip(4 + 4 + 1 + 1)?;
        }
        let vac_enabled = reader.bool()?;
        let bots = reader.u8()?;

        Ok(ServerStatus {
            online: true,
            name,
            map,
            player_count,
            max_players: Some(max_players),
            players: Vec::new(),
            details: Some(ServerDetails {
                protocol,
                folder,
                game,
                app_id: 0,
                bots,
                server_type,
                environment,
                password_protected,
                vac_enabled,
                version: None,
                game_port: None,
                steam_id: None,
                keywords: None,
                game_address: Some(game_address),
            }),
        })
    }
}
