use std::sync::Arc;

use anyhow::Result;
use chisel_data::blocks;
use chisel_protocol_core::{
    read_varint, Connection, ConnectionReader, ConnectionState, InternalPacket, KnownPack,
    ProtocolAdapter,
};
use chisel_protocol_v773::V773Adapter;
use chisel_types::{BlockPos, GameMode, GameProfile, Vec3d};
use chisel_world::Entity;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::keepalive::KeepAlive;
use crate::player::{ClientInfo, Player};
use crate::state::{ConnectionHandle, ServerState};
use crate::streamer::{view_square, ChunkStreamer};

/// Players enter the world here, one block above the flat surface.
const SPAWN_POSITION: Vec3d = Vec3d {
    x: 0.0,
    y: 65.0,
    z: 0.0,
};

/// Drive a single client connection through handshake, login, configuration
/// and play.
pub async fn handle_connection(stream: TcpStream, state: Arc<ServerState>) {
    let peer = match stream.peer_addr() {
        Ok(addr) => addr.to_string(),
        Err(_) => "unknown".into(),
    };
    let conn = Connection::new(stream);
    let adapter = Arc::new(V773Adapter::new());

    if let Err(e) = handle_connection_inner(conn, adapter, &state, &peer).await {
        debug!("Connection {} ended: {}", peer, e);
    }
}

async fn handle_connection_inner(
    mut conn: Connection,
    adapter: Arc<V773Adapter>,
    state: &Arc<ServerState>,
    peer: &str,
) -> Result<()> {
    // === Handshake ===
    let (id, mut data) = conn.read_packet().await?;
    let packet = adapter.decode_packet(ConnectionState::Handshaking, id, &mut data)?;

    let intent = match packet {
        InternalPacket::Handshake {
            protocol_version,
            intent,
            ..
        } => {
            debug!("Handshake from {}: protocol={}, intent={}", peer, protocol_version, intent);
            if protocol_version != adapter.protocol_version() {
                warn!(
                    "Client {} speaks protocol {}, server speaks {}",
                    peer,
                    protocol_version,
                    adapter.protocol_version()
                );
            }
            intent
        }
        _ => return Err(anyhow::anyhow!("expected handshake packet")),
    };

    match ConnectionState::from_handshake_intent(intent) {
        Some(ConnectionState::Login) => {
            let profile = handle_login(&mut conn, &adapter).await?;
            let client_info = handle_configuration(&mut conn, &adapter).await?;
            handle_play(conn, adapter, state, profile, client_info).await
        }
        _ => {
            // Intent 1 (status) is not served by this core.
            info!("Dropping {} with unsupported handshake intent {}", peer, intent);
            Ok(())
        }
    }
}

async fn handle_login(conn: &mut Connection, adapter: &V773Adapter) -> Result<GameProfile> {
    let (id, mut data) = conn.read_packet().await?;
    let packet = adapter.decode_packet(ConnectionState::Login, id, &mut data)?;

    let (name, uuid) = match packet {
        InternalPacket::LoginStart { name, uuid } => {
            info!("Login Start from {} ({})", name, uuid);
            (name, uuid)
        }
        _ => return Err(anyhow::anyhow!("expected Login Start")),
    };

    // Offline mode: the client-supplied UUID is taken as-is, no encryption
    // exchange and no compression negotiation.
    let profile = GameProfile {
        uuid,
        name,
        properties: Vec::new(),
    };
    send_packet(conn, adapter, ConnectionState::Login, &InternalPacket::LoginSuccess {
        profile: profile.clone(),
    })
    .await?;

    let (id, mut data) = conn.read_packet().await?;
    match adapter.decode_packet(ConnectionState::Login, id, &mut data)? {
        InternalPacket::LoginAcknowledged => {
            debug!("Login acknowledged by {}", profile.name);
        }
        _ => return Err(anyhow::anyhow!("expected Login Acknowledged")),
    }

    Ok(profile)
}

async fn handle_configuration(
    conn: &mut Connection,
    adapter: &V773Adapter,
) -> Result<Option<ClientInfo>> {
    send_packet(conn, adapter, ConnectionState::Configuration, &InternalPacket::KnownPacksRequest {
        packs: vec![KnownPack {
            namespace: "minecraft".into(),
            id: "core".into(),
            version: "1.21.9".into(),
        }],
    })
    .await?;

    for registry_packet in adapter.registry_data() {
        send_packet(conn, adapter, ConnectionState::Configuration, &registry_packet).await?;
    }

    send_packet(conn, adapter, ConnectionState::Configuration, &InternalPacket::FinishConfiguration)
        .await?;

    // Client Information, Plugin Message and Known Packs are recorded but do
    // not gate the transition; only the finish ack does.
    let mut client_info = None;
    loop {
        let (id, mut data) = conn.read_packet().await?;
        match adapter.decode_packet(ConnectionState::Configuration, id, &mut data)? {
            InternalPacket::FinishConfigurationAck => {
                debug!("Configuration finished");
                return Ok(client_info);
            }
            InternalPacket::ClientInformation {
                locale,
                view_distance,
                chat_mode,
                chat_colors,
                skin_parts,
                main_hand,
                text_filtering,
                allow_listing,
            } => {
                debug!("Client info: locale={}, view_distance={}", locale, view_distance);
                client_info = Some(ClientInfo {
                    locale,
                    view_distance,
                    chat_mode,
                    chat_colors,
                    skin_parts,
                    main_hand,
                    text_filtering,
                    allow_listing,
                });
            }
            InternalPacket::PluginMessage { channel, .. } => {
                debug!("Plugin message on {}", channel);
            }
            InternalPacket::KnownPacksResponse { packs } => {
                debug!("Client knows {} packs", packs.len());
            }
            InternalPacket::Unknown { packet_id, .. } => {
                debug!("Ignoring configuration packet 0x{:02X}", packet_id);
            }
            other => {
                debug!("Ignoring configuration packet {:?}", std::mem::discriminant(&other));
            }
        }
    }
}

async fn handle_play(
    conn: Connection,
    adapter: Arc<V773Adapter>,
    state: &Arc<ServerState>,
    profile: GameProfile,
    client_info: Option<ClientInfo>,
) -> Result<()> {
    let entity_id = state.world.allocate_player_id();
    info!("{} entering play state (eid={})", profile.name, entity_id);

    let player = Arc::new(Player::new(entity_id, profile.clone(), SPAWN_POSITION));
    *player.client_info.lock() = client_info;

    // Split the connection: this task keeps reading, the writer task owns the
    // sink and drains the outbound queue in enqueue order.
    let (mut reader, mut writer) = conn.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<InternalPacket>();

    let writer_adapter = adapter.clone();
    let writer_name = profile.name.clone();
    let writer_task = tokio::spawn(async move {
        while let Some(packet) = rx.recv().await {
            match writer_adapter.encode_packet(ConnectionState::Play, &packet) {
                Ok(mut encoded) => {
                    let id = match read_varint(&mut encoded) {
                        Ok(id) => id,
                        Err(_) => continue,
                    };
                    if writer.write_packet(id, &encoded).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{}: failed to encode outbound packet: {}", writer_name, e);
                }
            }
        }
    });

    let handle = ConnectionHandle {
        entity_id,
        uuid: profile.uuid,
        name: profile.name.clone(),
        sender: tx,
        player: player.clone(),
    };

    state.world.add_entity(Entity {
        id: entity_id,
        uuid: profile.uuid,
        entity_type: chisel_data::entity_types::PLAYER,
        position: SPAWN_POSITION,
        yaw: 0.0,
        pitch: 0.0,
        head_yaw: 0.0,
        velocity: Vec3d::ZERO,
    });

    let result = run_play(&mut reader, &adapter, state, &handle).await;

    // Epilogue: drop the player from every shared structure, then cancel the
    // per-connection tasks. The writer ends once every sender clone is gone.
    state.unregister_connection(entity_id);
    let remaining = state.connections_snapshot();
    state.visibility.player_disconnected(&remaining, &handle);
    state.world.remove_entity(entity_id);
    info!("{} disconnected", profile.name);

    drop(handle);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(2), writer_task).await;

    result
}

async fn run_play(
    reader: &mut ConnectionReader,
    adapter: &Arc<V773Adapter>,
    state: &Arc<ServerState>,
    handle: &ConnectionHandle,
) -> Result<()> {
    let view_distance = state.config.view_distance as i32;
    let dimension_type = adapter
        .snapshot()
        .protocol_id("minecraft:dimension_type", "minecraft:overworld")
        .unwrap_or(0);

    handle.send(InternalPacket::JoinGame {
        entity_id: handle.entity_id,
        is_hardcore: false,
        dimension_names: vec!["minecraft:overworld".into()],
        max_players: state.config.max_players as i32,
        view_distance,
        simulation_distance: view_distance,
        reduced_debug_info: false,
        enable_respawn_screen: true,
        do_limited_crafting: false,
        dimension_type,
        dimension_name: "minecraft:overworld".into(),
        hashed_seed: 0,
        game_mode: GameMode::Creative,
        previous_game_mode: -1,
        is_debug: false,
        is_flat: true,
        portal_cooldown: 0,
        sea_level: 63,
        enforces_secure_chat: false,
    });

    handle.send(InternalPacket::SynchronizePlayerPosition {
        teleport_id: 1,
        position: SPAWN_POSITION,
        velocity: Vec3d::ZERO,
        yaw: 0.0,
        pitch: 0.0,
        flags: 0,
    });

    let (world_age, time_of_day) = state.world.time();
    handle.send(InternalPacket::UpdateTime {
        world_age,
        time_of_day,
        time_advances: true,
    });

    // Game event 13: start waiting for level chunks.
    handle.send(InternalPacket::GameEvent {
        event: 13,
        value: 0.0,
    });

    let spawn_center = SPAWN_POSITION.chunk_pos();
    handle.send(InternalPacket::SetCenterChunk {
        chunk_x: spawn_center.x,
        chunk_z: spawn_center.z,
    });

    // Spawn batch: the 3x3 square ships before anything else references the
    // world, then the full view square replaces it (debounced install skips
    // the nine columns already loaded).
    let streamer = ChunkStreamer::start(
        state.world.clone(),
        handle.clone(),
        state.config.chunk_workers,
    );
    let spawn_batch = view_square(spawn_center, 1);
    streamer.desire_now(spawn_batch.clone(), spawn_center);
    if !streamer.wait_for_loaded(&spawn_batch).await {
        warn!("{}: spawn batch incomplete after wait", handle.name);
    }
    streamer.update_desired(view_square(spawn_center, view_distance));

    // Inventory sync for the fresh player.
    {
        let inventory = handle.player.inventory.lock();
        handle.send(InternalPacket::SetContainerContent {
            window_id: 0,
            state_id: inventory.state_id,
            slots: inventory.to_slot_vec(),
            carried_item: None,
        });
    }
    handle.send(InternalPacket::SetHeldItemClientbound { slot: 0 });

    let keep_alive = KeepAlive::start(handle.clone());

    // Only now is the player visible to the rest of the server: the spawn
    // batch precedes both broadcast registration and the join announcement.
    state.register_connection(handle.clone());
    let snapshot = state.connections_snapshot();
    state.visibility.player_joined(&snapshot, handle);

    let result = play_loop(reader, adapter, state, handle, &streamer, &keep_alive).await;

    keep_alive.stop().await;
    streamer.shutdown().await;
    result
}

async fn play_loop(
    reader: &mut ConnectionReader,
    adapter: &Arc<V773Adapter>,
    state: &Arc<ServerState>,
    handle: &ConnectionHandle,
    streamer: &ChunkStreamer,
    keep_alive: &KeepAlive,
) -> Result<()> {
    loop {
        let (id, mut data) = reader.read_packet().await?;
        let packet = adapter.decode_packet(ConnectionState::Play, id, &mut data)?;

        match packet {
            InternalPacket::KeepAliveServerbound { id } => {
                keep_alive.handle_response(&handle.name, id);
            }
            InternalPacket::SetPlayerPosition { x, y, z, on_ground } => {
                apply_move(state, handle, streamer, Some(Vec3d::new(x, y, z)), None, on_ground);
            }
            InternalPacket::SetPlayerPositionAndRotation {
                x,
                y,
                z,
                yaw,
                pitch,
                on_ground,
            } => {
                apply_move(
                    state,
                    handle,
                    streamer,
                    Some(Vec3d::new(x, y, z)),
                    Some((yaw, pitch)),
                    on_ground,
                );
            }
            InternalPacket::SetPlayerRotation { yaw, pitch, on_ground } => {
                apply_move(state, handle, streamer, None, Some((yaw, pitch)), on_ground);
            }
            InternalPacket::PlayerAction {
                status,
                position,
                sequence,
                ..
            } => {
                handle_player_action(state, handle, status, position, sequence);
            }
            InternalPacket::UseItemOn {
                position,
                face,
                sequence,
                ..
            } => {
                handle_use_item_on(state, handle, position, face, sequence);
            }
            InternalPacket::SwingArm { hand } => {
                let animation = if hand == 1 { 3 } else { 0 };
                let snapshot = state.connections_snapshot();
                state.visibility.broadcast_to_viewers_of(
                    &snapshot,
                    handle.entity_id,
                    &InternalPacket::EntityAnimation {
                        entity_id: handle.entity_id,
                        animation,
                    },
                );
            }
            InternalPacket::SetHeldItemServerbound { slot } => {
                if (0..=8).contains(&slot) {
                    *handle.player.held_slot.lock() = slot as u8;
                } else {
                    debug!("{}: held slot {} out of range", handle.name, slot);
                }
            }
            InternalPacket::SetCreativeModeSlot { slot, item } => {
                if slot >= 0 {
                    handle.player.inventory.lock().set_slot(slot as usize, item);
                }
            }
            InternalPacket::ClickContainer {
                window_id,
                changed_slots,
                ..
            } => {
                // Only the player inventory window is served.
                if window_id == 0 {
                    let mut inventory = handle.player.inventory.lock();
                    for (slot, item) in changed_slots {
                        if slot >= 0 {
                            inventory.set_slot(slot as usize, item);
                        }
                    }
                }
            }
            InternalPacket::ClickContainerButton { window_id, button } => {
                debug!("{}: container {} button {}", handle.name, window_id, button);
            }
            InternalPacket::CloseContainer { window_id } => {
                debug!("{}: closed container {}", handle.name, window_id);
            }
            InternalPacket::ClientInformation {
                locale,
                view_distance,
                chat_mode,
                chat_colors,
                skin_parts,
                main_hand,
                text_filtering,
                allow_listing,
            } => {
                *handle.player.client_info.lock() = Some(ClientInfo {
                    locale,
                    view_distance,
                    chat_mode,
                    chat_colors,
                    skin_parts,
                    main_hand,
                    text_filtering,
                    allow_listing,
                });
            }
            InternalPacket::PluginMessage { channel, .. } => {
                debug!("{}: plugin message on {}", handle.name, channel);
            }
            InternalPacket::Unknown { packet_id, .. } => {
                debug!("{}: unhandled play opcode 0x{:02X}", handle.name, packet_id);
            }
            other => {
                debug!("{}: ignoring {:?}", handle.name, std::mem::discriminant(&other));
            }
        }
    }
}

fn apply_move(
    state: &Arc<ServerState>,
    handle: &ConnectionHandle,
    streamer: &ChunkStreamer,
    new_position: Option<Vec3d>,
    new_rotation: Option<(f32, f32)>,
    on_ground: bool,
) {
    let old_chunk;
    let pose;
    {
        let mut guard = handle.player.pose.write();
        old_chunk = guard.position.chunk_pos();
        if let Some(position) = new_position {
            guard.position = position;
        }
        if let Some((yaw, pitch)) = new_rotation {
            guard.yaw = yaw;
            guard.pitch = pitch;
            guard.head_yaw = yaw;
        }
        guard.on_ground = on_ground;
        pose = *guard;
    }
    state
        .world
        .update_entity_pose(handle.entity_id, pose.position, pose.yaw, pose.pitch, pose.head_yaw);

    let snapshot = state.connections_snapshot();
    if new_position.is_some() {
        state.visibility.player_moved(&snapshot, handle);

        let new_chunk = pose.position.chunk_pos();
        if new_chunk != old_chunk {
            handle.send(InternalPacket::SetCenterChunk {
                chunk_x: new_chunk.x,
                chunk_z: new_chunk.z,
            });
            let view_distance = state.config.view_distance as i32;
            streamer.update_desired(view_square(new_chunk, view_distance));
        }
    } else {
        state.visibility.player_rotated(&snapshot, handle);
    }
}

fn handle_player_action(
    state: &Arc<ServerState>,
    handle: &ConnectionHandle,
    status: i32,
    position: BlockPos,
    sequence: i32,
) {
    let snapshot = state.connections_snapshot();
    match status {
        // Started digging: show the breaking overlay to everyone watching.
        0 => {
            state.visibility.broadcast_to_viewers_of(
                &snapshot,
                handle.entity_id,
                &InternalPacket::SetBlockDestroyStage {
                    entity_id: handle.entity_id,
                    position,
                    destroy_stage: 0,
                },
            );
        }
        // Cancelled digging: clear the overlay.
        1 => {
            state.visibility.broadcast_to_viewers_of(
                &snapshot,
                handle.entity_id,
                &InternalPacket::SetBlockDestroyStage {
                    entity_id: handle.entity_id,
                    position,
                    destroy_stage: 10,
                },
            );
        }
        // Finished digging: the block becomes air everywhere.
        2 => {
            let old_block = state.world.store().set_block(&position, blocks::AIR);
            let update = InternalPacket::BlockUpdate {
                position,
                block_id: blocks::AIR,
            };
            handle.send(update.clone());
            state
                .visibility
                .broadcast_to_viewers_of(&snapshot, handle.entity_id, &update);
            state.visibility.broadcast_to_viewers_of(
                &snapshot,
                handle.entity_id,
                &InternalPacket::WorldEvent {
                    event: 2001,
                    position,
                    data: old_block,
                    global: false,
                },
            );
            state.visibility.broadcast_to_viewers_of(
                &snapshot,
                handle.entity_id,
                &InternalPacket::SetBlockDestroyStage {
                    entity_id: handle.entity_id,
                    position,
                    destroy_stage: 10,
                },
            );
        }
        other => {
            debug!("{}: player action {} not consumed", handle.name, other);
        }
    }
    handle.send(InternalPacket::AcknowledgeBlockChange { sequence });
}

fn handle_use_item_on(
    state: &Arc<ServerState>,
    handle: &ConnectionHandle,
    position: BlockPos,
    face: u8,
    sequence: i32,
) {
    if let Some(item) = handle.player.held_item() {
        if let Some(block_id) = chisel_data::block_for_item(item.item_id) {
            let target = offset_by_face(&position, face);
            state.world.store().set_block(&target, block_id);
            let update = InternalPacket::BlockUpdate {
                position: target,
                block_id,
            };
            handle.send(update.clone());
            let snapshot = state.connections_snapshot();
            state
                .visibility
                .broadcast_to_viewers_of(&snapshot, handle.entity_id, &update);
        }
    }
    handle.send(InternalPacket::AcknowledgeBlockChange { sequence });
}

/// Offset a block position by the clicked face.
/// Face: 0=bottom, 1=top, 2=north, 3=south, 4=west, 5=east.
fn offset_by_face(pos: &BlockPos, face: u8) -> BlockPos {
    match face {
        0 => BlockPos::new(pos.x, pos.y - 1, pos.z),
        1 => BlockPos::new(pos.x, pos.y + 1, pos.z),
        2 => BlockPos::new(pos.x, pos.y, pos.z - 1),
        3 => BlockPos::new(pos.x, pos.y, pos.z + 1),
        4 => BlockPos::new(pos.x - 1, pos.y, pos.z),
        5 => BlockPos::new(pos.x + 1, pos.y, pos.z),
        _ => *pos,
    }
}

/// Encode and send on the still-sequential (pre-split) connection.
async fn send_packet(
    conn: &mut Connection,
    adapter: &V773Adapter,
    state: ConnectionState,
    packet: &InternalPacket,
) -> Result<()> {
    let mut encoded = adapter.encode_packet(state, packet)?;
    // The encoded form is VarInt packet id followed by the payload; the
    // connection frames them separately.
    let packet_id = read_varint(&mut encoded)?;
    conn.write_packet(packet_id, &encoded).await
}
