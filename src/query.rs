use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::address::ServerAddress;
use crate::error::{MalformedReply, QueryError, TransportError};
use crate::info::{InfoLayout, ServerStatus};
use crate::packet::{
    Datagram, PacketType, Protocol, Reassembly, RequestPacket, ResponsePacket, MAX_DATAGRAM,
    NO_CHALLENGE,
};
use crate::player::PlayerRecord;

/// Used when the caller doesn't pick a timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Everything needed for one call to [`execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub address: ServerAddress,
    /// Deadline for the whole call, from resolving the host to the last reply.
    pub timeout: Duration,
    pub protocol: Protocol,
    /// Also fetch the player list with A2S_PLAYER.
    pub players: bool,
    pub layout: InfoLayout,
}

impl QueryRequest {
    pub fn new(address: ServerAddress) -> Self {
        QueryRequest {
            address,
            timeout: DEFAULT_TIMEOUT,
            protocol: Protocol::default(),
            players: false,
            layout: InfoLayout::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_players(mut self, players: bool) -> Self {
        self.players = players;
        self
    }

    pub fn with_layout(mut self, layout: InfoLayout) -> Self {
        self.layout = layout;
        self
    }
}

/// Query `address` with A2S_INFO.
///
/// The returned status has an empty player list; `player_count` carries the
/// number the server reported. Use [`execute`] with
/// [`QueryRequest::with_players`] to fetch the list as well.
///
/// Example usage:
/// ```no_run
/// # async fn run() -> Result<(), hlquery::error::QueryError> {
/// use std::time::Duration;
/// use hlquery::{address::ServerAddress, query::query};
///
/// let address = ServerAddress::new("46.174.55.32", 27015);
/// let status = query(&address, Duration::from_secs(3)).await?;
/// println!("{} on {} ({} players)", status.name, status.map, status.player_count);
/// # Ok(())
/// # }
/// ```
pub async fn query(address: &ServerAddress, timeout_dur: Duration) -> Result<ServerStatus, QueryError> {
    execute(&QueryRequest::new(address.clone()).with_timeout(timeout_dur)).await
}

/// Query `address` with A2S_PLAYER only, going through the challenge handshake.
///
/// Split replies are decoded as GoldSrc; use [`execute_players`] for Source
/// servers.
pub async fn query_players(
    address: &ServerAddress,
    timeout_dur: Duration,
) -> Result<Vec<PlayerRecord>, QueryError> {
    execute_players(&QueryRequest::new(address.clone()).with_timeout(timeout_dur)).await
}

/// Fetch only the player list, honouring the request's timeout and protocol.
/// `players` and `layout` are ignored.
pub async fn execute_players(request: &QueryRequest) -> Result<Vec<PlayerRecord>, QueryError> {
    with_deadline(request.timeout, async {
        let exchange: Exchange = Exchange::open(&request.address, request.protocol).await?;
        let packet: ResponsePacket = exchange.step(Step::Players).await?;
        Ok::<_, QueryError>(PlayerRecord::parse_list(&packet)?)
    })
    .await
}

/// Run a configured query.
///
/// The socket is opened for this call only and closed on every exit path,
/// including when the returned future is dropped.
pub async fn execute(request: &QueryRequest) -> Result<ServerStatus, QueryError> {
    with_deadline(request.timeout, async {
        log::debug!("querying {} ({})", request.address, request.protocol);
        let exchange: Exchange = Exchange::open(&request.address, request.protocol).await?;

        // server info
        let packet: ResponsePacket = exchange.step(Step::Info).await?;
        let mut status: ServerStatus = ServerStatus::parse(&packet, request.layout)?;

        // player list, over the same socket
        if request.players {
            let packet: ResponsePacket = exchange.step(Step::Players).await?;
            status.players = PlayerRecord::parse_list(&packet)?;
        }

        log::debug!(
            "{} answered: {:?} on {} ({} players)",
            request.address,
            status.name,
            status.map,
            status.player_count
        );
        Ok::<_, QueryError>(status)
    })
    .await
}

/// Like [`execute`], but gives up with [`QueryError::Cancelled`] as soon as
/// `cancel` completes.
pub async fn execute_with_cancel<F>(request: &QueryRequest, cancel: F) -> Result<ServerStatus, QueryError>
where
    F: Future<Output = ()>,
{
    tokio::select! {
        result = execute(request) => result,
        () = cancel => {
            log::debug!("query to {} cancelled", request.address);
            Err(QueryError::Cancelled)
        }
    }
}

async fn with_deadline<T, F>(timeout_dur: Duration, fut: F) -> Result<T, QueryError>
where
    F: Future<Output = Result<T, QueryError>>,
{
    timeout(timeout_dur, fut)
        .await
        .map_err(|_| QueryError::Timeout(timeout_dur))?
}

/// One request/reply pair of the protocol, with its challenge retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Info,
    Players,
}

impl Step {
    fn request(self, challenge: Option<[u8; 4]>) -> RequestPacket {
        match self {
            Step::Info => RequestPacket::info(challenge),
            Step::Players => RequestPacket::players(challenge.unwrap_or(NO_CHALLENGE)),
        }
    }

    fn expected(self) -> PacketType {
        match self {
            Step::Info => PacketType::InfoResponse,
            Step::Players => PacketType::PlayerResponse,
        }
    }

    /// Replies belonging to an earlier step that may still be in flight,
    /// e.g. servers that answer A2S_INFO with both reply formats.
    fn is_stale(self, packet_type: PacketType) -> bool {
        match self {
            Step::Info => false,
            Step::Players => matches!(
                packet_type,
                PacketType::InfoResponse | PacketType::GoldSrcInfoResponse
            ),
        }
    }
}

/// A socket dedicated to one server for the length of one call.
struct Exchange {
    sock: UdpSocket,
    target: SocketAddr,
    protocol: Protocol,
}

impl Exchange {
    async fn open(address: &ServerAddress, protocol: Protocol) -> Result<Self, QueryError> {
        let target: SocketAddr = address.resolve().await?;

        // any port will do, on the wildcard address of the target's family
        let local: SocketAddr = match target {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        // left unconnected so ICMP errors can't cut the wait short
        let sock: UdpSocket = UdpSocket::bind(local)
            .await
            .map_err(TransportError::Bind)?;
        log::trace!("bound {:?} for {target}", sock.local_addr());

        Ok(Exchange {
            sock,
            target,
            protocol,
        })
    }

    async fn step(&self, step: Step) -> Result<ResponsePacket, QueryError> {
        // sending initial packet
        let packet: ResponsePacket = self.send_recv(step.request(None), step).await?;
        if packet.packet_type() != PacketType::Challenge {
            return Ok(packet);
        }

        // absolving challenge
        let challenge: [u8; 4] = packet.challenge()?;
        log::trace!("{} challenged {step:?} with {challenge:02x?}", self.target);
        let packet: ResponsePacket = self.send_recv(step.request(Some(challenge)), step).await?;

        // only one challenge per step
        if packet.packet_type() == PacketType::Challenge {
            return Err(MalformedReply::UnexpectedType {
                expected: step.expected().to_byte(),
                found: PacketType::Challenge.to_byte(),
            }
            .into());
        }
        Ok(packet)
    }

    async fn send_recv(&self, packet: RequestPacket, step: Step) -> Result<ResponsePacket, QueryError> {
        // sending
        let payload: Vec<u8> = packet.pack();
        log::trace!("-> {} {:02x?}", self.target, payload);
        self.sock
            .send_to(&payload, self.target)
            .await
            .map_err(TransportError::Send)?;

        // receiving, past anything left over from the previous step
        loop {
            let packet: ResponsePacket = self.recv().await?;
            if step.is_stale(packet.packet_type()) {
                log::trace!("ignoring late {:?} from {}", packet.packet_type(), self.target);
                continue;
            }
            return Ok(packet);
        }
    }

    /// Wait for the next complete reply from the target, reassembling split
    /// replies and skipping datagrams from anyone else.
    async fn recv(&self) -> Result<ResponsePacket, QueryError> {
        let mut resp_buf: [u8; MAX_DATAGRAM] = [0u8; MAX_DATAGRAM];
        let mut reassembly: Reassembly = Reassembly::default();

        loop {
            let (len, from): (usize, SocketAddr) = match self.sock.recv_from(&mut resp_buf).await {
                Ok(received) => received,
                Err(err) if is_icmp_error(&err) => {
                    log::trace!("ignoring {err} while waiting for {}", self.target);
                    continue;
                }
                Err(err) => return Err(TransportError::Receive(err).into()),
            };
            if from != self.target {
                log::trace!("ignoring {len} byte(s) from stray peer {from}");
                continue;
            }

            let data: &[u8] = &resp_buf[..len];
            log::trace!("<- {from} {data:02x?}");
            match Datagram::parse(data, self.protocol)? {
                Datagram::Single(payload) => return Ok(ResponsePacket::unpack(payload)?),
                // split reply, wait for the rest
                Datagram::Fragment(fragment) => {
                    if let Some(payload) = reassembly.push(fragment)? {
                        return Ok(ResponsePacket::unpack(&payload)?);
                    }
                }
            }
        }
    }
}

/// Port-unreachable and friends, which some platforms surface on the next
/// receive even for unconnected sockets.
fn is_icmp_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset
    )
}
