use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::error::Result;
use crate::runtime::packet::Packet;

/// Combines LengthDelimitedCodec (stream framing) with the bincode packet encoding.
pub struct PacketCodec {
    codec: LengthDelimitedCodec,
}

impl PacketCodec {
    pub fn new() -> Self {
        Self { codec: LengthDelimitedCodec::new() }
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> std::result::Result<(), Self::Error> {
        let bytes = item.encode().map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.codec.encode(Bytes::from(bytes), dst)
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> std::result::Result<Option<Self::Item>, Self::Error> {
        match self.codec.decode(src)? {
            Some(frame) => {
                let packet = Packet::decode(&frame).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Some(packet))
            }
            None => Ok(None),
        }
    }
}

/// Writes `packets` as length-delimited frames and flushes.
pub async fn write_packets<W, I>(writer: W, packets: I) -> Result<()>
where
    W: AsyncWrite + Unpin,
    I: IntoIterator<Item = Packet>,
{
    let mut framed = FramedWrite::new(writer, PacketCodec::new());
    for packet in packets {
        framed.feed(packet).await?;
    }
    framed.flush().await?;
    Ok(())
}

/// Reads frames until the stream ends.
pub async fn read_packets<R: AsyncRead + Unpin>(reader: R) -> Result<Vec<Packet>> {
    let mut framed = FramedRead::new(reader, PacketCodec::new());
    let mut packets = Vec::new();
    while let Some(packet) = framed.next().await {
        packets.push(packet?);
    }
    Ok(packets)
}
