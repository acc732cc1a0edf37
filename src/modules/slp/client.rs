// src/modules/slp/client.rs

// Server List Ping: the status protocol Minecraft clients use before
// connecting. Modern servers speak a varint-framed packet carrying a JSON
// status document; pre-1.7 servers answer a 0xFE probe with a UTF-16BE kick
// string. Only the status handshake is implemented, never login.

use crate::common::log::{log, LogLevel};
use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

// Any protocol number a server recognizes works for a status request; 47
// (1.8) is the conventional probe value.
const HANDSHAKE_PROTOCOL: i32 = 47;
const STATE_STATUS: i32 = 1;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Deserialize)]
pub struct StatusPayload {
    pub version: VersionPayload,
    #[serde(default)]
    pub players: PlayersPayload,
    #[serde(default, deserialize_with = "deserialize_description")]
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionPayload {
    #[serde(default)]
    pub protocol: i32,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayersPayload {
    #[serde(default)]
    pub max: i32,
    #[serde(default)]
    pub online: i32,
    #[serde(default)]
    pub sample: Vec<PlayerSample>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerSample {
    #[serde(default)]
    pub name: String,
}

// The MOTD is either a bare string or a chat component object.
fn deserialize_description<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Object(obj) => obj
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .to_string(),
        _ => String::new(),
    })
}

#[derive(Debug, Clone, Default)]
pub struct LegacyStatus {
    pub motd: String,
    pub players_online: i32,
    pub max_players: i32,
    pub game_version: String,
}

// --- Varint framing ---

pub fn write_varint(buf: &mut Vec<u8>, value: i32) {
    let mut raw = value as u32;
    loop {
        if raw < 0x80 {
            buf.push(raw as u8);
            return;
        }
        buf.push((raw as u8 & 0x7F) | 0x80);
        raw >>= 7;
    }
}

pub fn read_varint(data: &[u8], offset: &mut usize) -> Option<i32> {
    let mut result: u32 = 0;
    let mut shift = 0;
    loop {
        let byte = *data.get(*offset)?;
        *offset += 1;
        result |= ((byte & 0x7F) as u32) << shift;
        if byte & 0x80 == 0 {
            return Some(result as i32);
        }
        shift += 7;
        if shift >= 35 {
            return None;
        }
    }
}

fn write_string(buf: &mut Vec<u8>, value: &str) {
    write_varint(buf, value.len() as i32);
    buf.extend_from_slice(value.as_bytes());
}

// Length-prefixed packet: varint(len(id + payload)), varint(id), payload.
fn frame_packet(id: i32, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(payload.len() + 2);
    write_varint(&mut body, id);
    body.extend_from_slice(payload);

    let mut packet = Vec::with_capacity(body.len() + 2);
    write_varint(&mut packet, body.len() as i32);
    packet.extend_from_slice(&body);
    packet
}

async fn read_exact_timed(stream: &mut TcpStream, buf: &mut [u8]) -> Option<()> {
    timeout(READ_TIMEOUT, stream.read_exact(buf)).await.ok()?.ok()?;
    Some(())
}

async fn read_varint_stream(stream: &mut TcpStream) -> Option<i32> {
    let mut result: u32 = 0;
    let mut shift = 0;
    loop {
        let mut byte = [0u8; 1];
        read_exact_timed(stream, &mut byte).await?;
        result |= ((byte[0] & 0x7F) as u32) << shift;
        if byte[0] & 0x80 == 0 {
            return Some(result as i32);
        }
        shift += 7;
        if shift >= 35 {
            return None;
        }
    }
}

// --- Modern protocol ---

pub async fn status_modern(host: &str, port: u16) -> Option<StatusPayload> {
    let mut stream = timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port)))
        .await
        .ok()?
        .ok()?;

    // Handshake: protocol version, server address, port, next state.
    let mut payload = Vec::new();
    write_varint(&mut payload, HANDSHAKE_PROTOCOL);
    write_string(&mut payload, host);
    payload.extend_from_slice(&port.to_be_bytes());
    write_varint(&mut payload, STATE_STATUS);
    stream.write_all(&frame_packet(0x00, &payload)).await.ok()?;

    // Status request: empty packet 0x00.
    stream.write_all(&frame_packet(0x00, &[])).await.ok()?;
    stream.flush().await.ok()?;

    // Response: varint frame, packet id 0x00, varint-prefixed JSON string.
    let frame_len = read_varint_stream(&mut stream).await?;
    if frame_len <= 0 || frame_len > 1 << 21 {
        return None;
    }
    let mut frame = vec![0u8; frame_len as usize];
    read_exact_timed(&mut stream, &mut frame).await?;

    let mut offset = 0;
    let packet_id = read_varint(&frame, &mut offset)?;
    if packet_id != 0x00 {
        log(LogLevel::Debug, &format!("▪ SLP unexpected packet 0x{:02x}", packet_id));
        return None;
    }
    let json_len = read_varint(&frame, &mut offset)? as usize;
    let json = frame.get(offset..offset + json_len)?;

    serde_json::from_slice(json).ok()
}

// --- Legacy (1.6 and earlier) ---

pub async fn status_legacy(host: &str, port: u16) -> Option<LegacyStatus> {
    let mut stream = timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port)))
        .await
        .ok()?
        .ok()?;

    stream.write_all(&[0xFE, 0x01]).await.ok()?;
    stream.flush().await.ok()?;

    let mut buffer = vec![0u8; 2048];
    let n = timeout(READ_TIMEOUT, stream.read(&mut buffer)).await.ok()?.ok()?;
    if n < 4 || buffer[0] != 0xFF {
        return None;
    }

    // Bytes 1-2 are the UTF-16 length; decode the rest as UTF-16BE.
    let units: Vec<u16> = buffer[3..n]
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    let payload = String::from_utf16_lossy(&units);

    Some(parse_legacy_payload(&payload))
}

// Two legacy layouts: the 1.4+ "§1\0proto\0version\0motd\0online\0max" form
// and the pre-1.4 "motd§online§max" form (here null-delimited after decode).
pub fn parse_legacy_payload(payload: &str) -> LegacyStatus {
    let fields: Vec<&str> = payload.split('\0').collect();

    if payload.starts_with('§') && fields.len() >= 6 {
        LegacyStatus {
            game_version: fields[2].to_string(),
            motd: fields[3].to_string(),
            players_online: fields[4].parse().unwrap_or(0),
            max_players: fields[5].parse().unwrap_or(0),
        }
    } else {
        LegacyStatus {
            motd: fields.first().unwrap_or(&"").to_string(),
            players_online: fields.get(1).and_then(|f| f.parse().ok()).unwrap_or(0),
            max_players: fields.get(2).and_then(|f| f.parse().ok()).unwrap_or(0),
            game_version: String::new(),
        }
    }
}

// Modern first, legacy as the fallback for ancient servers.
pub async fn player_counts(host: &str, port: u16) -> Option<(i32, i32, Vec<PlayerSample>)> {
    if let Some(status) = status_modern(host, port).await {
        return Some((status.players.online, status.players.max, status.players.sample));
    }
    status_legacy(host, port)
        .await
        .map(|legacy| (legacy.players_online, legacy.max_players, Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_round_trip() {
        for value in [0, 1, 127, 128, 255, 300, 25565, 2097151, i32::MAX] {
            let mut buf = Vec::new();
            write_varint(&mut buf, value);
            let mut offset = 0;
            assert_eq!(read_varint(&buf, &mut offset), Some(value));
            assert_eq!(offset, buf.len());
        }
    }

    #[test]
    fn varint_known_encodings() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 128);
        assert_eq!(buf, vec![0x80, 0x01]);

        buf.clear();
        write_varint(&mut buf, 25565);
        assert_eq!(buf, vec![0xDD, 0xC7, 0x01]);
    }

    #[test]
    fn frame_wraps_id_and_payload() {
        let packet = frame_packet(0x00, &[0xAB, 0xCD]);
        // len=3 (id byte + 2 payload bytes), id=0, payload
        assert_eq!(packet, vec![0x03, 0x00, 0xAB, 0xCD]);
    }

    #[test]
    fn status_json_description_forms() {
        let plain: StatusPayload = serde_json::from_str(
            r#"{"version":{"name":"Paper 1.21.1","protocol":767},
                "players":{"max":20,"online":3,"sample":[{"name":"Steve","id":"00000000-0000-0000-0000-000000000000"}]},
                "description":"A Minecraft Server"}"#,
        )
        .unwrap();
        assert_eq!(plain.description, "A Minecraft Server");
        assert_eq!(plain.players.online, 3);
        assert_eq!(plain.players.sample[0].name, "Steve");

        let object: StatusPayload = serde_json::from_str(
            r#"{"version":{"name":"Forge","protocol":763},
                "players":{"max":40,"online":0},
                "description":{"text":"All the Mods"}}"#,
        )
        .unwrap();
        assert_eq!(object.description, "All the Mods");
    }

    #[test]
    fn legacy_payload_both_layouts() {
        let modern = "§1\u{0}127\u{0}1.6.4\u{0}A Legacy Server\u{0}5\u{0}20";
        let parsed = parse_legacy_payload(modern);
        assert_eq!(parsed.game_version, "1.6.4");
        assert_eq!(parsed.motd, "A Legacy Server");
        assert_eq!(parsed.players_online, 5);
        assert_eq!(parsed.max_players, 20);

        let ancient = "Old Server\u{0}2\u{0}8";
        let parsed = parse_legacy_payload(ancient);
        assert_eq!(parsed.motd, "Old Server");
        assert_eq!(parsed.players_online, 2);
        assert_eq!(parsed.max_players, 8);
    }
}
