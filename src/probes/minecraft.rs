//! Minecraft Java edition status query (Server List Ping).
//!
//! The exchange is a handshake packet announcing the status state, an empty
//! status request, and a single JSON status response. Every packet is framed
//! as `VarInt length | VarInt packet id | payload`.
use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use reqwest::Url;
use serde::Deserialize;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::{Probe, ProbeError, ProbeReport, host_and_port, parse_address};

pub const DEFAULT_PORT: u16 = 25565;

/// Protocol version sent in the handshake; -1 is what clients send when only
/// querying status.
const STATUS_PROTOCOL_VERSION: i32 = -1;
const NEXT_STATE_STATUS: i32 = 1;
const PACKET_HANDSHAKE: i32 = 0x00;
const PACKET_STATUS: i32 = 0x00;
const MAX_RESPONSE_LEN: usize = 1 << 20;

#[derive(Debug, Default, Clone)]
pub struct MinecraftProbe;

impl MinecraftProbe {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    version: Option<VersionInfo>,
    players: Option<PlayersInfo>,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PlayersInfo {
    max: i64,
    online: i64,
}

#[async_trait]
impl Probe for MinecraftProbe {
    async fn probe(&self, address: &str) -> Result<ProbeReport, ProbeError> {
        let url = parse_address(address)?;
        let (host, port) = host_and_port(&url, Some(DEFAULT_PORT))?;

        let start_time = Instant::now();
        let mut stream = TcpStream::connect((host.as_str(), port)).await?;
        stream.write_all(&handshake_frame(&host, port)).await?;
        stream.write_all(&status_request_frame()).await?;
        stream.flush().await?;

        let payload = read_frame(&mut stream).await?;
        let latency = start_time.elapsed();
        let status = parse_status(payload)?;

        let mut report = ProbeReport::up().with_latency(latency);
        if let Some(players) = status.players {
            report = report
                .with_meta("players_online", players.online)
                .with_meta("players_max", players.max);
        }
        if let Some(version) = status.version {
            report = report.with_meta("version", version.name);
        }
        Ok(report)
    }

    fn supports(&self, url: &Url) -> bool {
        url.host_str().is_some()
    }
}

fn put_varint(buf: &mut BytesMut, value: i32) {
    let mut value = value as u32;
    loop {
        if value & !0x7F == 0 {
            buf.put_u8(value as u8);
            return;
        }
        buf.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
}

fn get_varint(buf: &mut Bytes) -> Result<i32, ProbeError> {
    let mut value: u32 = 0;
    for i in 0..5 {
        if !buf.has_remaining() {
            return Err(ProbeError::Protocol("truncated VarInt".to_string()));
        }
        let byte = buf.get_u8();
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(ProbeError::Protocol("VarInt longer than 5 bytes".to_string()))
}

async fn read_varint<R: AsyncRead + Unpin>(reader: &mut R) -> Result<i32, ProbeError> {
    let mut value: u32 = 0;
    for i in 0..5 {
        let byte = reader.read_u8().await?;
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(ProbeError::Protocol("VarInt longer than 5 bytes".to_string()))
}

fn frame(packet_id: i32, payload: &[u8]) -> Bytes {
    let mut body = BytesMut::with_capacity(payload.len() + 5);
    put_varint(&mut body, packet_id);
    body.put_slice(payload);

    let mut framed = BytesMut::with_capacity(body.len() + 5);
    put_varint(&mut framed, body.len() as i32);
    framed.put_slice(&body);
    framed.freeze()
}

fn handshake_frame(host: &str, port: u16) -> Bytes {
    let mut payload = BytesMut::new();
    put_varint(&mut payload, STATUS_PROTOCOL_VERSION);
    put_varint(&mut payload, host.len() as i32);
    payload.put_slice(host.as_bytes());
    payload.put_u16(port);
    put_varint(&mut payload, NEXT_STATE_STATUS);
    frame(PACKET_HANDSHAKE, &payload)
}

fn status_request_frame() -> Bytes {
    frame(PACKET_STATUS, &[])
}

/// Reads one length-prefixed frame and returns its body (packet id included).
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Bytes, ProbeError> {
    let len = read_varint(reader).await?;
    let len = usize::try_from(len)
        .ok()
        .filter(|len| (1..=MAX_RESPONSE_LEN).contains(len))
        .ok_or_else(|| ProbeError::Protocol(format!("invalid frame length {len}")))?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Bytes::from(body))
}

fn parse_status(mut body: Bytes) -> Result<StatusResponse, ProbeError> {
    let packet_id = get_varint(&mut body)?;
    if packet_id != PACKET_STATUS {
        return Err(ProbeError::Protocol(format!(
            "unexpected packet id {packet_id:#04x}"
        )));
    }
    let json_len = usize::try_from(get_varint(&mut body)?)
        .map_err(|_| ProbeError::Protocol("negative string length".to_string()))?;
    if json_len > body.remaining() {
        return Err(ProbeError::Protocol("truncated status JSON".to_string()));
    }
    let json = body.split_to(json_len);
    serde_json::from_slice(&json)
        .map_err(|e| ProbeError::Protocol(format!("malformed status JSON: {e}")))
}
