//! Room topology and zone lookups for the voice pipeline.
//!
//! Rooms are declared in a YAML file mapping each room to its Wyoming
//! output target and microphones. Privacy and DND zones come from the
//! environment-style zone configuration. Validation is strict: a missing
//! or out-of-range port fails the load, because a half-configured room
//! would otherwise surface as silent routing failures at 2am.

use crate::config::ZoneConfig;
use crate::error::{HalcyonError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::TcpStream;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// One microphone attached to a room.
#[derive(Debug, Clone)]
pub struct Mic {
    /// Unique microphone identifier.
    pub id: String,
    /// Audio device identifier (e.g. `hw:2,0`).
    pub device: String,
}

/// One configured room.
#[derive(Debug, Clone)]
pub struct Room {
    /// Room identifier.
    pub id: String,
    /// Wyoming output host.
    pub wyoming_host: String,
    /// Wyoming output port.
    pub wyoming_port: u16,
    /// Microphones in this room.
    pub mics: Vec<Mic>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    rooms: Vec<RawRoom>,
}

#[derive(Debug, Deserialize)]
struct RawRoom {
    id: Option<String>,
    wyoming_host: Option<String>,
    wyoming_port: Option<i64>,
    #[serde(default)]
    mics: Vec<RawMic>,
}

#[derive(Debug, Deserialize)]
struct RawMic {
    id: Option<String>,
    #[serde(default)]
    device: String,
}

/// Room configuration and lookup services.
#[derive(Debug)]
pub struct RoomRegistry {
    rooms: Vec<Room>,
    index: HashMap<String, usize>,
    mic_to_room: HashMap<String, String>,
    zones: ZoneConfig,
}

impl RoomRegistry {
    /// Load the registry from the path in `ROOMS_CONFIG_PATH`, with zone
    /// sets from the environment as well.
    pub fn load_from_env() -> Result<Self> {
        let path = std::env::var("ROOMS_CONFIG_PATH")
            .map_err(|_| HalcyonError::Config("ROOMS_CONFIG_PATH is not set".into()))?;
        Self::load(Path::new(&path), ZoneConfig::from_env())
    }

    /// Load the registry from a YAML file.
    pub fn load(path: &Path, zones: ZoneConfig) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            HalcyonError::Config(format!("cannot read rooms config {}: {err}", path.display()))
        })?;
        Self::from_yaml_str(&raw, zones)
    }

    /// Parse the registry from YAML text.
    pub fn from_yaml_str(yaml: &str, zones: ZoneConfig) -> Result<Self> {
        let raw: RawConfig = serde_yaml::from_str(yaml)
            .map_err(|err| HalcyonError::Config(format!("invalid rooms config: {err}")))?;

        let mut rooms = Vec::new();
        let mut index = HashMap::new();
        let mut mic_to_room = HashMap::new();

        for raw_room in raw.rooms {
            let id = raw_room
                .id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| {
                    HalcyonError::Config("room id must be a non-empty string".into())
                })?
                .to_owned();

            let port = raw_room.wyoming_port.ok_or_else(|| {
                HalcyonError::Config(format!("room '{id}' missing wyoming_port"))
            })?;
            if !(1..=65535).contains(&port) {
                return Err(HalcyonError::Config(format!(
                    "room '{id}' has invalid wyoming_port: {port} out of range"
                )));
            }

            let mut mics = Vec::new();
            for raw_mic in raw_room.mics {
                let mic_id = raw_mic
                    .id
                    .as_deref()
                    .map(str::trim)
                    .filter(|mic| !mic.is_empty())
                    .ok_or_else(|| {
                        HalcyonError::Config(format!(
                            "room '{id}' has a mic without a non-empty id"
                        ))
                    })?
                    .to_owned();
                mic_to_room.insert(mic_id.clone(), id.clone());
                mics.push(Mic {
                    id: mic_id,
                    device: raw_mic.device,
                });
            }

            let room = Room {
                id: id.clone(),
                wyoming_host: raw_room
                    .wyoming_host
                    .unwrap_or_else(|| "127.0.0.1".to_owned()),
                wyoming_port: port as u16,
                mics,
            };
            index.insert(id, rooms.len());
            rooms.push(room);
        }

        let registry = Self {
            rooms,
            index,
            mic_to_room,
            zones,
        };
        registry.probe_wyoming_targets();
        info!("room registry loaded {} rooms", registry.rooms.len());
        Ok(registry)
    }

    /// Best-effort TCP reachability check of Wyoming targets. Targets may
    /// legitimately come up after us, so failures only log.
    fn probe_wyoming_targets(&self) {
        for room in &self.rooms {
            let addr = format!("{}:{}", room.wyoming_host, room.wyoming_port);
            match addr.parse::<std::net::SocketAddr>() {
                Ok(sock_addr) => {
                    if TcpStream::connect_timeout(&sock_addr, Duration::from_millis(500)).is_err() {
                        debug!("wyoming target {addr} for room '{}' unreachable", room.id);
                    }
                }
                Err(_) => debug!("skipping reachability probe for {addr}"),
            }
        }
    }

    /// Room configuration by id.
    #[must_use]
    pub fn get_room(&self, room_id: &str) -> Option<&Room> {
        self.index.get(room_id).map(|idx| &self.rooms[*idx])
    }

    /// All configured rooms, in declaration order.
    #[must_use]
    pub fn list_rooms(&self) -> &[Room] {
        &self.rooms
    }

    /// Room id hosting the given microphone.
    #[must_use]
    pub fn get_room_for_mic(&self, mic_id: &str) -> Option<&str> {
        self.mic_to_room.get(mic_id).map(String::as_str)
    }

    /// Wyoming output target `(host, port)` for a room.
    pub fn get_output_target(&self, room_id: &str) -> Result<(String, u16)> {
        let room = self
            .get_room(room_id)
            .ok_or_else(|| HalcyonError::RoomNotFound(room_id.to_owned()))?;
        Ok((room.wyoming_host.clone(), room.wyoming_port))
    }

    /// Whether a room denies all speech output.
    #[must_use]
    pub fn is_privacy_zone(&self, room_id: &str) -> bool {
        self.zones.privacy_zones.contains(room_id)
    }

    /// Whether a room denies speech except SCARLET announcements.
    #[must_use]
    pub fn is_dnd_zone(&self, room_id: &str) -> bool {
        self.zones.dnd_zones.contains(room_id)
    }

    /// Configured default room, falling back to the first declared one.
    #[must_use]
    pub fn get_default_room(&self) -> Option<&str> {
        if let Some(default) = &self.zones.default_room
            && self.index.contains_key(default)
        {
            return Some(default);
        }
        self.rooms.first().map(|room| room.id.as_str())
    }
}
