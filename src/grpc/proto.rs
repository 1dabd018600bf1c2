//! Handshake envelope messages
//!
//! Field tags follow `arrow.flight.protocol.HandshakeRequest` and
//! `HandshakeResponse`, so these decode whatever a Flight client sends.

/// The request a client sends on the handshake stream
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HandshakeRequest {
    /// A defined protocol version
    #[prost(uint64, tag = "1")]
    pub protocol_version: u64,
    /// Arbitrary auth/handshake info
    #[prost(bytes = "bytes", tag = "2")]
    pub payload: ::prost::bytes::Bytes,
}

/// The response a server sends on the handshake stream
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HandshakeResponse {
    /// A defined protocol version
    #[prost(uint64, tag = "1")]
    pub protocol_version: u64,
    /// Arbitrary auth/handshake info
    #[prost(bytes = "bytes", tag = "2")]
    pub payload: ::prost::bytes::Bytes,
}
