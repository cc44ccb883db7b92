#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hlquery::address::ServerAddress;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

pub const INFO_REQUEST: &[u8] = b"\xff\xff\xff\xffTSource Engine Query\0";
pub const TOKEN: [u8; 4] = [0x0a, 0x0b, 0x0c, 0x0d];

/// A fake game server on an ephemeral localhost port. Each request is passed
/// to the handler, and every datagram it returns is sent back to the sender.
pub struct MockServer {
    pub addr: SocketAddr,
    requests: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl MockServer {
    pub async fn spawn<F>(handler: F) -> MockServer
    where
        F: Fn(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    {
        let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = sock.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = requests.clone();

        let task = tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            loop {
                let Ok((len, from)) = sock.recv_from(&mut buf).await else {
                    continue;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                for reply in handler(&buf[..len]) {
                    let _ = sock.send_to(&reply, from).await;
                }
            }
        });

        MockServer {
            addr,
            requests,
            task,
        }
    }

    pub fn address(&self) -> ServerAddress {
        ServerAddress::from(self.addr)
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn single(packet_type: u8, body: &[u8]) -> Vec<u8> {
    let mut data = vec![0xff, 0xff, 0xff, 0xff, packet_type];
    data.extend_from_slice(body);
    data
}

/// `FF FF FF FF 49 "TestServer\0" "de_dust2\0" 05`
pub fn compact_info() -> Vec<u8> {
    single(0x49, b"TestServer\0de_dust2\0\x05")
}

pub fn full_info(name: &str, players: u8, max: u8) -> Vec<u8> {
    let mut body = vec![48];
    body.extend_from_slice(name.as_bytes());
    body.extend_from_slice(b"\0de_nuke\0cstrike\0Counter-Strike\0");
    body.extend_from_slice(&10u16.to_le_bytes());
    body.extend_from_slice(&[players, max, 0, b'd', b'l', 0, 1]);
    body.extend_from_slice(b"1.1.2.7/Stdio\0");
    single(0x49, &body)
}

pub fn player_body(players: &[(&str, i32, f32)]) -> Vec<u8> {
    let mut body = vec![players.len() as u8];
    for (index, (name, score, secs)) in players.iter().enumerate() {
        body.push(index as u8);
        body.extend_from_slice(name.as_bytes());
        body.push(0);
        body.extend_from_slice(&score.to_le_bytes());
        body.extend_from_slice(&secs.to_le_bytes());
    }
    body
}

pub fn challenge() -> Vec<u8> {
    single(0x41, &TOKEN)
}

/// Split `payload` (a complete single-header reply) into GoldSrc fragments.
pub fn goldsrc_fragments(id: i32, payload: &[u8], chunk: usize) -> Vec<Vec<u8>> {
    let chunks: Vec<&[u8]> = payload.chunks(chunk).collect();
    let total = chunks.len() as u8;
    chunks
        .iter()
        .enumerate()
        .map(|(index, part)| {
            let mut data = vec![0xfe, 0xff, 0xff, 0xff];
            data.extend_from_slice(&id.to_le_bytes());
            data.push(((index as u8) << 4) | total);
            data.extend_from_slice(part);
            data
        })
        .collect()
}

/// Split `payload` into Source fragments (uncompressed).
pub fn source_fragments(id: i32, payload: &[u8], chunk: usize) -> Vec<Vec<u8>> {
    let chunks: Vec<&[u8]> = payload.chunks(chunk).collect();
    let total = chunks.len() as u8;
    chunks
        .iter()
        .enumerate()
        .map(|(index, part)| {
            let mut data = vec![0xfe, 0xff, 0xff, 0xff];
            data.extend_from_slice(&id.to_le_bytes());
            data.push(total);
            data.push(index as u8);
            data.extend_from_slice(&(chunk as u16).to_le_bytes());
            data.extend_from_slice(part);
            data
        })
        .collect()
}
