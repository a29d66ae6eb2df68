use anyhow::{bail, Result};
use bytes::{Buf, BufMut, BytesMut};
use chisel_data::RegistrySnapshot;
use chisel_protocol_core::*;

use crate::registries;

/// Protocol adapter for Minecraft Java Edition protocol 773 (1.21.9).
pub struct V773Adapter {
    snapshot: RegistrySnapshot,
}

impl V773Adapter {
    pub fn new() -> Self {
        Self {
            snapshot: RegistrySnapshot::builtin(),
        }
    }

    pub fn snapshot(&self) -> &RegistrySnapshot {
        &self.snapshot
    }
}

impl Default for V773Adapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolAdapter for V773Adapter {
    fn protocol_version(&self) -> i32 {
        773
    }

    fn decode_packet(
        &self,
        state: ConnectionState,
        id: i32,
        data: &mut BytesMut,
    ) -> Result<InternalPacket> {
        match state {
            ConnectionState::Handshaking => decode_handshaking(id, data),
            ConnectionState::Login => decode_login(id, data),
            ConnectionState::Configuration => decode_configuration(id, data),
            ConnectionState::Play => decode_play(id, data),
        }
    }

    fn encode_packet(&self, state: ConnectionState, packet: &InternalPacket) -> Result<BytesMut> {
        match state {
            ConnectionState::Login => encode_login(packet),
            ConnectionState::Configuration => encode_configuration(packet),
            ConnectionState::Play => encode_play(packet),
            ConnectionState::Handshaking => {
                bail!("nothing is encoded in the Handshaking state")
            }
        }
    }

    fn registry_data(&self) -> Vec<InternalPacket> {
        registries::build_registry_packets(&self.snapshot)
    }
}

// === Packet ID constants (protocol 773) ===

// Login clientbound
const LOGIN_SUCCESS: i32 = 0x02;

// Configuration serverbound
const CONFIG_SB_CLIENT_INFORMATION: i32 = 0x00;
const CONFIG_SB_PLUGIN_MESSAGE: i32 = 0x02;
const CONFIG_SB_FINISH_ACK: i32 = 0x03;
const CONFIG_SB_KNOWN_PACKS: i32 = 0x07;

// Configuration clientbound
const CONFIG_FINISH: i32 = 0x03;
const CONFIG_REGISTRY_DATA: i32 = 0x07;
const CONFIG_KNOWN_PACKS: i32 = 0x0E;

// Play clientbound
const PLAY_SPAWN_ENTITY: i32 = 0x01;
const PLAY_ENTITY_ANIMATION: i32 = 0x02;
const PLAY_ACK_BLOCK_CHANGE: i32 = 0x04;
const PLAY_SET_BLOCK_DESTROY_STAGE: i32 = 0x05;
const PLAY_BLOCK_UPDATE: i32 = 0x08;
const PLAY_SET_CONTAINER_CONTENT: i32 = 0x12;
const PLAY_SET_CONTAINER_SLOT: i32 = 0x14;
const PLAY_TELEPORT_ENTITY: i32 = 0x1F;
const PLAY_GAME_EVENT: i32 = 0x22;
const PLAY_KEEP_ALIVE: i32 = 0x26;
const PLAY_CHUNK_DATA: i32 = 0x27;
const PLAY_WORLD_EVENT: i32 = 0x28;
const PLAY_LOGIN: i32 = 0x2B;
const PLAY_UPDATE_ENTITY_POSITION: i32 = 0x2E;
const PLAY_UPDATE_ENTITY_POSITION_AND_ROTATION: i32 = 0x2F;
const PLAY_UPDATE_ENTITY_ROTATION: i32 = 0x31;
const PLAY_PLAYER_INFO_REMOVE: i32 = 0x3F;
const PLAY_PLAYER_INFO_UPDATE: i32 = 0x40;
const PLAY_SYNC_PLAYER_POS: i32 = 0x41;
const PLAY_REMOVE_ENTITIES: i32 = 0x46;
const PLAY_SET_HEAD_ROTATION: i32 = 0x4C;
const PLAY_SET_CENTER_CHUNK: i32 = 0x57;
const PLAY_SET_HELD_ITEM: i32 = 0x62;
const PLAY_UPDATE_TIME: i32 = 0x6A;

// Play serverbound
const PLAY_SB_CLICK_CONTAINER_BUTTON: i32 = 0x0E;
const PLAY_SB_CLICK_CONTAINER: i32 = 0x0F;
const PLAY_SB_CLOSE_CONTAINER: i32 = 0x11;
const PLAY_SB_KEEP_ALIVE: i32 = 0x1A;
const PLAY_SB_SET_PLAYER_POSITION: i32 = 0x1D;
const PLAY_SB_SET_PLAYER_POSITION_AND_ROTATION: i32 = 0x1E;
const PLAY_SB_SET_PLAYER_ROTATION: i32 = 0x1F;
const PLAY_SB_PLAYER_ACTION: i32 = 0x28;
const PLAY_SB_SET_HELD_ITEM: i32 = 0x34;
const PLAY_SB_SET_CREATIVE_MODE_SLOT: i32 = 0x36;
const PLAY_SB_SWING_ARM: i32 = 0x3C;
const PLAY_SB_USE_ITEM_ON: i32 = 0x3E;

// === Decode functions ===

fn get_u8(data: &mut BytesMut) -> Result<u8> {
    if !data.has_remaining() {
        bail!(CodecError::TruncatedField);
    }
    Ok(data.get_u8())
}

fn get_bool(data: &mut BytesMut) -> Result<bool> {
    Ok(get_u8(data)? != 0)
}

fn need(data: &BytesMut, n: usize) -> Result<()> {
    if data.remaining() < n {
        bail!(CodecError::TruncatedField);
    }
    Ok(())
}

fn decode_handshaking(id: i32, data: &mut BytesMut) -> Result<InternalPacket> {
    match id {
        0x00 => {
            let protocol_version = read_varint(data)?;
            let server_address = read_string(data, 255)?;
            need(data, 2)?;
            let server_port = data.get_u16();
            let intent = read_varint(data)?;
            Ok(InternalPacket::Handshake {
                protocol_version,
                server_address,
                server_port,
                intent,
            })
        }
        _ => Ok(unknown(id, data)),
    }
}

fn decode_login(id: i32, data: &mut BytesMut) -> Result<InternalPacket> {
    match id {
        0x00 => {
            let name = read_string(data, 16)?;
            let uuid = read_uuid(data)?;
            Ok(InternalPacket::LoginStart { name, uuid })
        }
        0x03 => Ok(InternalPacket::LoginAcknowledged),
        _ => Ok(unknown(id, data)),
    }
}

fn decode_configuration(id: i32, data: &mut BytesMut) -> Result<InternalPacket> {
    match id {
        CONFIG_SB_CLIENT_INFORMATION => decode_client_information(data),
        CONFIG_SB_PLUGIN_MESSAGE => {
            let channel = read_string(data, 32767)?;
            let remaining = data.split_to(data.len()).to_vec();
            Ok(InternalPacket::PluginMessage {
                channel,
                data: remaining,
            })
        }
        CONFIG_SB_FINISH_ACK => Ok(InternalPacket::FinishConfigurationAck),
        CONFIG_SB_KNOWN_PACKS => {
            let count = read_varint(data)? as usize;
            let mut packs = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                let namespace = read_string(data, 32767)?;
                let id = read_string(data, 32767)?;
                let version = read_string(data, 32767)?;
                packs.push(KnownPack {
                    namespace,
                    id,
                    version,
                });
            }
            Ok(InternalPacket::KnownPacksResponse { packs })
        }
        _ => Ok(unknown(id, data)),
    }
}

fn decode_client_information(data: &mut BytesMut) -> Result<InternalPacket> {
    let locale = read_string(data, 16)?;
    need(data, 1)?;
    let view_distance = data.get_i8();
    let chat_mode = read_varint(data)?;
    let chat_colors = get_bool(data)?;
    let skin_parts = get_u8(data)?;
    let main_hand = read_varint(data)?;
    let text_filtering = get_bool(data)?;
    let allow_listing = get_bool(data)?;
    Ok(InternalPacket::ClientInformation {
        locale,
        view_distance,
        chat_mode,
        chat_colors,
        skin_parts,
        main_hand,
        text_filtering,
        allow_listing,
    })
}

fn decode_play(id: i32, data: &mut BytesMut) -> Result<InternalPacket> {
    match id {
        PLAY_SB_KEEP_ALIVE => {
            need(data, 8)?;
            Ok(InternalPacket::KeepAliveServerbound { id: data.get_i64() })
        }
        PLAY_SB_SET_PLAYER_POSITION => {
            need(data, 25)?;
            let x = data.get_f64();
            let y = data.get_f64();
            let z = data.get_f64();
            let flags = data.get_u8();
            Ok(InternalPacket::SetPlayerPosition {
                x,
                y,
                z,
                on_ground: flags & 0x01 != 0,
            })
        }
        PLAY_SB_SET_PLAYER_POSITION_AND_ROTATION => {
            need(data, 33)?;
            let x = data.get_f64();
            let y = data.get_f64();
            let z = data.get_f64();
            let yaw = data.get_f32();
            let pitch = data.get_f32();
            let flags = data.get_u8();
            Ok(InternalPacket::SetPlayerPositionAndRotation {
                x,
                y,
                z,
                yaw,
                pitch,
                on_ground: flags & 0x01 != 0,
            })
        }
        PLAY_SB_SET_PLAYER_ROTATION => {
            need(data, 9)?;
            let yaw = data.get_f32();
            let pitch = data.get_f32();
            let flags = data.get_u8();
            Ok(InternalPacket::SetPlayerRotation {
                yaw,
                pitch,
                on_ground: flags & 0x01 != 0,
            })
        }
        PLAY_SB_PLAYER_ACTION => {
            let status = read_varint(data)?;
            let position = read_position(data)?;
            let face = get_u8(data)?;
            let sequence = read_varint(data)?;
            Ok(InternalPacket::PlayerAction {
                status,
                position,
                face,
                sequence,
            })
        }
        PLAY_SB_USE_ITEM_ON => {
            let hand = read_varint(data)?;
            let position = read_position(data)?;
            let face = read_varint(data)? as u8;
            need(data, 12)?;
            let cursor_x = data.get_f32();
            let cursor_y = data.get_f32();
            let cursor_z = data.get_f32();
            let inside_block = get_bool(data)?;
            let world_border_hit = get_bool(data)?;
            let sequence = read_varint(data)?;
            Ok(InternalPacket::UseItemOn {
                hand,
                position,
                face,
                cursor_x,
                cursor_y,
                cursor_z,
                inside_block,
                world_border_hit,
                sequence,
            })
        }
        PLAY_SB_SWING_ARM => {
            let hand = read_varint(data)?;
            Ok(InternalPacket::SwingArm { hand })
        }
        PLAY_SB_SET_HELD_ITEM => {
            need(data, 2)?;
            Ok(InternalPacket::SetHeldItemServerbound {
                slot: data.get_i16(),
            })
        }
        PLAY_SB_SET_CREATIVE_MODE_SLOT => {
            need(data, 2)?;
            let slot = data.get_i16();
            let item = read_slot(data)?;
            Ok(InternalPacket::SetCreativeModeSlot { slot, item })
        }
        PLAY_SB_CLICK_CONTAINER => {
            let window_id = read_varint(data)?;
            let state_id = read_varint(data)?;
            need(data, 3)?;
            let slot = data.get_i16();
            let button = data.get_i8();
            let mode = read_varint(data)?;
            let changed_count = read_varint(data)?.max(0) as usize;
            let mut changed_slots = Vec::with_capacity(changed_count.min(128));
            for _ in 0..changed_count {
                need(data, 2)?;
                let changed_slot = data.get_i16();
                let item = read_slot(data)?;
                changed_slots.push((changed_slot, item));
            }
            let carried_item = read_slot(data)?;
            Ok(InternalPacket::ClickContainer {
                window_id,
                state_id,
                slot,
                button,
                mode,
                changed_slots,
                carried_item,
            })
        }
        PLAY_SB_CLICK_CONTAINER_BUTTON => {
            let window_id = read_varint(data)?;
            let button = read_varint(data)?;
            Ok(InternalPacket::ClickContainerButton { window_id, button })
        }
        PLAY_SB_CLOSE_CONTAINER => {
            let window_id = read_varint(data)?;
            Ok(InternalPacket::CloseContainer { window_id })
        }
        _ => Ok(unknown(id, data)),
    }
}

fn unknown(id: i32, data: &mut BytesMut) -> InternalPacket {
    InternalPacket::Unknown {
        packet_id: id,
        data: data.to_vec(),
    }
}

// === Encode functions ===

fn encode_login(packet: &InternalPacket) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    match packet {
        InternalPacket::LoginSuccess { profile } => {
            write_varint(&mut buf, LOGIN_SUCCESS);
            write_uuid(&mut buf, &profile.uuid);
            write_string(&mut buf, &profile.name);
            write_varint(&mut buf, profile.properties.len() as i32);
            for prop in &profile.properties {
                write_string(&mut buf, &prop.name);
                write_string(&mut buf, &prop.value);
                if let Some(ref sig) = prop.signature {
                    buf.put_u8(1);
                    write_string(&mut buf, sig);
                } else {
                    buf.put_u8(0);
                }
            }
        }
        _ => bail!("cannot encode {:?} in Login state", std::mem::discriminant(packet)),
    }
    Ok(buf)
}

fn encode_configuration(packet: &InternalPacket) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    match packet {
        InternalPacket::KnownPacksRequest { packs } => {
            write_varint(&mut buf, CONFIG_KNOWN_PACKS);
            write_varint(&mut buf, packs.len() as i32);
            for pack in packs {
                write_string(&mut buf, &pack.namespace);
                write_string(&mut buf, &pack.id);
                write_string(&mut buf, &pack.version);
            }
        }
        InternalPacket::RegistryData {
            registry_id,
            entries,
        } => {
            write_varint(&mut buf, CONFIG_REGISTRY_DATA);
            write_string(&mut buf, registry_id);
            write_varint(&mut buf, entries.len() as i32);
            for entry in entries {
                write_string(&mut buf, &entry.id);
                if let Some(ref nbt_data) = entry.data {
                    buf.put_u8(1);
                    nbt_data.write_root_network(&mut buf);
                } else {
                    buf.put_u8(0);
                }
            }
        }
        InternalPacket::FinishConfiguration => {
            write_varint(&mut buf, CONFIG_FINISH);
        }
        _ => bail!(
            "cannot encode {:?} in Configuration state",
            std::mem::discriminant(packet)
        ),
    }
    Ok(buf)
}

fn encode_play(packet: &InternalPacket) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    match packet {
        InternalPacket::JoinGame {
            entity_id,
            is_hardcore,
            dimension_names,
            max_players,
            view_distance,
            simulation_distance,
            reduced_debug_info,
            enable_respawn_screen,
            do_limited_crafting,
            dimension_type,
            dimension_name,
            hashed_seed,
            game_mode,
            previous_game_mode,
            is_debug,
            is_flat,
            portal_cooldown,
            sea_level,
            enforces_secure_chat,
        } => {
            write_varint(&mut buf, PLAY_LOGIN);
            buf.put_i32(*entity_id);
            buf.put_u8(*is_hardcore as u8);
            write_varint(&mut buf, dimension_names.len() as i32);
            for dim in dimension_names {
                write_string(&mut buf, dim);
            }
            write_varint(&mut buf, *max_players);
            write_varint(&mut buf, *view_distance);
            write_varint(&mut buf, *simulation_distance);
            buf.put_u8(*reduced_debug_info as u8);
            buf.put_u8(*enable_respawn_screen as u8);
            buf.put_u8(*do_limited_crafting as u8);
            write_varint(&mut buf, *dimension_type);
            write_string(&mut buf, dimension_name);
            buf.put_i64(*hashed_seed);
            buf.put_u8(game_mode.id());
            buf.put_i8(*previous_game_mode);
            buf.put_u8(*is_debug as u8);
            buf.put_u8(*is_flat as u8);
            buf.put_u8(0); // no death location
            write_varint(&mut buf, *portal_cooldown);
            write_varint(&mut buf, *sea_level);
            buf.put_u8(*enforces_secure_chat as u8);
        }
        InternalPacket::SynchronizePlayerPosition {
            teleport_id,
            position,
            velocity,
            yaw,
            pitch,
            flags,
        } => {
            write_varint(&mut buf, PLAY_SYNC_PLAYER_POS);
            write_varint(&mut buf, *teleport_id);
            buf.put_f64(position.x);
            buf.put_f64(position.y);
            buf.put_f64(position.z);
            buf.put_f64(velocity.x);
            buf.put_f64(velocity.y);
            buf.put_f64(velocity.z);
            buf.put_f32(*yaw);
            buf.put_f32(*pitch);
            buf.put_i32(*flags);
        }
        InternalPacket::SetCenterChunk { chunk_x, chunk_z } => {
            write_varint(&mut buf, PLAY_SET_CENTER_CHUNK);
            write_varint(&mut buf, *chunk_x);
            write_varint(&mut buf, *chunk_z);
        }
        InternalPacket::ChunkDataAndUpdateLight {
            chunk_x,
            chunk_z,
            heightmaps,
            data,
            light_data,
        } => {
            write_varint(&mut buf, PLAY_CHUNK_DATA);
            buf.put_i32(*chunk_x);
            buf.put_i32(*chunk_z);
            write_varint(&mut buf, heightmaps.len() as i32);
            for (kind, longs) in heightmaps {
                write_varint(&mut buf, *kind);
                write_varint(&mut buf, longs.len() as i32);
                for long in longs {
                    buf.put_i64(*long);
                }
            }
            write_varint(&mut buf, data.len() as i32);
            buf.extend_from_slice(data);
            write_varint(&mut buf, 0); // block entities
            encode_light_data(&mut buf, light_data);
        }
        InternalPacket::KeepAliveClientbound { id } => {
            write_varint(&mut buf, PLAY_KEEP_ALIVE);
            buf.put_i64(*id);
        }
        InternalPacket::GameEvent { event, value } => {
            write_varint(&mut buf, PLAY_GAME_EVENT);
            buf.put_u8(*event);
            buf.put_f32(*value);
        }
        InternalPacket::UpdateTime {
            world_age,
            time_of_day,
            time_advances,
        } => {
            write_varint(&mut buf, PLAY_UPDATE_TIME);
            buf.put_i64(*world_age);
            buf.put_i64(*time_of_day);
            buf.put_u8(*time_advances as u8);
        }
        InternalPacket::PlayerInfoUpdate { actions, players } => {
            write_varint(&mut buf, PLAY_PLAYER_INFO_UPDATE);
            buf.put_u8(*actions);
            write_varint(&mut buf, players.len() as i32);
            for entry in players {
                write_uuid(&mut buf, &entry.uuid);
                if actions & player_info_actions::ADD_PLAYER != 0 {
                    write_string(&mut buf, entry.name.as_deref().unwrap_or(""));
                    write_varint(&mut buf, entry.properties.len() as i32);
                    for (name, value, signature) in &entry.properties {
                        write_string(&mut buf, name);
                        write_string(&mut buf, value);
                        if let Some(sig) = signature {
                            buf.put_u8(1);
                            write_string(&mut buf, sig);
                        } else {
                            buf.put_u8(0);
                        }
                    }
                }
                if actions & player_info_actions::INITIALIZE_CHAT != 0 {
                    buf.put_u8(0); // no chat session
                }
                if actions & player_info_actions::UPDATE_GAME_MODE != 0 {
                    write_varint(&mut buf, entry.game_mode.unwrap_or(0));
                }
                if actions & player_info_actions::UPDATE_LISTED != 0 {
                    buf.put_u8(entry.listed.unwrap_or(true) as u8);
                }
                if actions & player_info_actions::UPDATE_LATENCY != 0 {
                    write_varint(&mut buf, entry.ping.unwrap_or(0));
                }
                if actions & player_info_actions::UPDATE_DISPLAY_NAME != 0 {
                    match &entry.display_name {
                        Some(component) => {
                            buf.put_u8(1);
                            chisel_nbt::NbtValue::text_component(component.text.clone())
                                .write_root_network(&mut buf);
                        }
                        None => buf.put_u8(0),
                    }
                }
            }
        }
        InternalPacket::PlayerInfoRemove { uuids } => {
            write_varint(&mut buf, PLAY_PLAYER_INFO_REMOVE);
            write_varint(&mut buf, uuids.len() as i32);
            for uuid in uuids {
                write_uuid(&mut buf, uuid);
            }
        }
        InternalPacket::SpawnEntity {
            entity_id,
            entity_uuid,
            entity_type,
            x,
            y,
            z,
            pitch,
            yaw,
            head_yaw,
            data,
            velocity,
        } => {
            write_varint(&mut buf, PLAY_SPAWN_ENTITY);
            write_varint(&mut buf, *entity_id);
            write_uuid(&mut buf, entity_uuid);
            write_varint(&mut buf, *entity_type);
            buf.put_f64(*x);
            buf.put_f64(*y);
            buf.put_f64(*z);
            buf.put_u8(*pitch);
            buf.put_u8(*yaw);
            buf.put_u8(*head_yaw);
            write_varint(&mut buf, *data);
            write_lpvec3(&mut buf, velocity.x, velocity.y, velocity.z);
        }
        InternalPacket::RemoveEntities { entity_ids } => {
            write_varint(&mut buf, PLAY_REMOVE_ENTITIES);
            write_varint(&mut buf, entity_ids.len() as i32);
            for id in entity_ids {
                write_varint(&mut buf, *id);
            }
        }
        InternalPacket::UpdateEntityPosition {
            entity_id,
            delta_x,
            delta_y,
            delta_z,
            on_ground,
        } => {
            write_varint(&mut buf, PLAY_UPDATE_ENTITY_POSITION);
            write_varint(&mut buf, *entity_id);
            buf.put_i16(*delta_x);
            buf.put_i16(*delta_y);
            buf.put_i16(*delta_z);
            buf.put_u8(*on_ground as u8);
        }
        InternalPacket::UpdateEntityPositionAndRotation {
            entity_id,
            delta_x,
            delta_y,
            delta_z,
            yaw,
            pitch,
            on_ground,
        } => {
            write_varint(&mut buf, PLAY_UPDATE_ENTITY_POSITION_AND_ROTATION);
            write_varint(&mut buf, *entity_id);
            buf.put_i16(*delta_x);
            buf.put_i16(*delta_y);
            buf.put_i16(*delta_z);
            buf.put_u8(*yaw);
            buf.put_u8(*pitch);
            buf.put_u8(*on_ground as u8);
        }
        InternalPacket::UpdateEntityRotation {
            entity_id,
            yaw,
            pitch,
            on_ground,
        } => {
            write_varint(&mut buf, PLAY_UPDATE_ENTITY_ROTATION);
            write_varint(&mut buf, *entity_id);
            buf.put_u8(*yaw);
            buf.put_u8(*pitch);
            buf.put_u8(*on_ground as u8);
        }
        InternalPacket::SetHeadRotation {
            entity_id,
            head_yaw,
        } => {
            write_varint(&mut buf, PLAY_SET_HEAD_ROTATION);
            write_varint(&mut buf, *entity_id);
            buf.put_u8(*head_yaw);
        }
        InternalPacket::TeleportEntity {
            entity_id,
            position,
            velocity,
            yaw,
            pitch,
            on_ground,
        } => {
            write_varint(&mut buf, PLAY_TELEPORT_ENTITY);
            write_varint(&mut buf, *entity_id);
            buf.put_f64(position.x);
            buf.put_f64(position.y);
            buf.put_f64(position.z);
            buf.put_f64(velocity.x);
            buf.put_f64(velocity.y);
            buf.put_f64(velocity.z);
            buf.put_f32(*yaw);
            buf.put_f32(*pitch);
            buf.put_u8(*on_ground as u8);
        }
        InternalPacket::BlockUpdate { position, block_id } => {
            write_varint(&mut buf, PLAY_BLOCK_UPDATE);
            write_position(&mut buf, position);
            write_varint(&mut buf, *block_id);
        }
        InternalPacket::SetBlockDestroyStage {
            entity_id,
            position,
            destroy_stage,
        } => {
            write_varint(&mut buf, PLAY_SET_BLOCK_DESTROY_STAGE);
            write_varint(&mut buf, *entity_id);
            write_position(&mut buf, position);
            buf.put_i8(*destroy_stage);
        }
        InternalPacket::WorldEvent {
            event,
            position,
            data,
            global,
        } => {
            write_varint(&mut buf, PLAY_WORLD_EVENT);
            buf.put_i32(*event);
            write_position(&mut buf, position);
            buf.put_i32(*data);
            buf.put_u8(*global as u8);
        }
        InternalPacket::EntityAnimation {
            entity_id,
            animation,
        } => {
            write_varint(&mut buf, PLAY_ENTITY_ANIMATION);
            write_varint(&mut buf, *entity_id);
            buf.put_u8(*animation);
        }
        InternalPacket::AcknowledgeBlockChange { sequence } => {
            write_varint(&mut buf, PLAY_ACK_BLOCK_CHANGE);
            write_varint(&mut buf, *sequence);
        }
        InternalPacket::SetContainerContent {
            window_id,
            state_id,
            slots,
            carried_item,
        } => {
            write_varint(&mut buf, PLAY_SET_CONTAINER_CONTENT);
            write_varint(&mut buf, *window_id);
            write_varint(&mut buf, *state_id);
            write_varint(&mut buf, slots.len() as i32);
            for slot in slots {
                write_slot(&mut buf, slot);
            }
            write_slot(&mut buf, carried_item);
        }
        InternalPacket::SetContainerSlot {
            window_id,
            state_id,
            slot,
            item,
        } => {
            write_varint(&mut buf, PLAY_SET_CONTAINER_SLOT);
            write_varint(&mut buf, *window_id);
            write_varint(&mut buf, *state_id);
            buf.put_i16(*slot);
            write_slot(&mut buf, item);
        }
        InternalPacket::SetHeldItemClientbound { slot } => {
            write_varint(&mut buf, PLAY_SET_HELD_ITEM);
            write_varint(&mut buf, *slot as i32);
        }
        _ => bail!("cannot encode {:?} in Play state", std::mem::discriminant(packet)),
    }
    Ok(buf)
}

fn encode_light_data(buf: &mut BytesMut, light: &ChunkLightData) {
    write_bitset(buf, &light.sky_light_mask);
    write_bitset(buf, &light.block_light_mask);
    write_bitset(buf, &light.empty_sky_light_mask);
    write_bitset(buf, &light.empty_block_light_mask);
    write_varint(buf, light.sky_light_arrays.len() as i32);
    for arr in &light.sky_light_arrays {
        write_varint(buf, arr.len() as i32);
        buf.extend_from_slice(arr);
    }
    write_varint(buf, light.block_light_arrays.len() as i32);
    for arr in &light.block_light_arrays {
        write_varint(buf, arr.len() as i32);
        buf.extend_from_slice(arr);
    }
}
