//! Pure Rust async client for the [GoldSrc/Source server query protocol](https://developer.valvesoftware.com/wiki/Server_queries).
//!
//! One call, one socket: [`query::query`] sends A2S_INFO and returns a
//! [`ServerStatus`](info::ServerStatus) or a typed [`QueryError`](error::QueryError).
//! [`query::execute`] adds the A2S_PLAYER handshake and the other knobs of
//! [`QueryRequest`](query::QueryRequest).
pub mod address;
pub mod cache;
pub mod error;
pub mod info;
pub mod packet;
pub mod player;
pub mod query;
mod parse;

pub use address::ServerAddress;
pub use error::QueryError;
pub use info::ServerStatus;
pub use player::PlayerRecord;
pub use query::{
    execute, execute_players, execute_with_cancel, query, query_players, QueryRequest,
};
