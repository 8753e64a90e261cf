#![doc = include_str!("../README.md")]

// Public modules
mod common;

pub mod lookup;
pub mod routing_table;

pub use crate::common::{
    Distance, GetValueRequest, GetValueResponse, Id, InvalidIdSize, Message, PeerId, PeerInfo,
    PeerInfoWithDistance, ID_SIZE, MAX_BUCKET_INDEX,
};
pub use crate::lookup::{
    Config, FoundValueHandler, GetValueLookup, LookupError, LookupId, LookupPool, PeerFailure,
    ResponseHandler, SessionId, State, Ticks, Transport, TransportError,
};
pub use crate::routing_table::{KBucketsTable, RoutingEvent, RoutingTable, RoutingTableError};
pub use bytes::Bytes;
