use crate::{ConnectionState, InternalPacket};
use anyhow::Result;
use bytes::BytesMut;

/// Trait for version-specific protocol adapters. The adapter owns the opcode
/// table per phase: decoding consults (state, id), encoding picks the id for
/// the variant in the given state.
pub trait ProtocolAdapter: Send + Sync {
    /// The protocol version number this adapter handles.
    fn protocol_version(&self) -> i32;

    /// Decode a raw packet from wire format into an InternalPacket.
    fn decode_packet(
        &self,
        state: ConnectionState,
        id: i32,
        data: &mut BytesMut,
    ) -> Result<InternalPacket>;

    /// Encode an InternalPacket into wire format bytes (packet id prefix
    /// included).
    fn encode_packet(&self, state: ConnectionState, packet: &InternalPacket) -> Result<BytesMut>;

    /// The registry data packets emitted during the Configuration phase, in
    /// the order the client must receive them.
    fn registry_data(&self) -> Vec<InternalPacket>;
}
