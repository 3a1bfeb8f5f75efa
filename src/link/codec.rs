//! Payload transform hooks
//!
//! Every payload passes through a [`PayloadCodec`] on its way to and from
//! the broker. The default [`PassthroughCodec`] returns bytes unchanged;
//! deployments that need encryption or compression on the wire plug in
//! their own implementation without touching the transport.

use crate::error::Result;

/// Encode outbound and decode inbound payload bytes
pub trait PayloadCodec: Send {
    /// Transform a payload before it is handed to the transport
    fn encode(&self, payload: &[u8]) -> Result<Vec<u8>>;

    /// Transform a payload received from the transport
    fn decode(&self, payload: &[u8]) -> Result<Vec<u8>>;
}

/// Identity codec, the default
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughCodec;

impl PayloadCodec for PassthroughCodec {
    fn encode(&self, payload: &[u8]) -> Result<Vec<u8>> {
        Ok(payload.to_vec())
    }

    fn decode(&self, payload: &[u8]) -> Result<Vec<u8>> {
        Ok(payload.to_vec())
    }
}
