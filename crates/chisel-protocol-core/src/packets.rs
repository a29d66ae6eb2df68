use chisel_nbt::NbtValue;
use chisel_types::{BlockPos, GameMode, GameProfile, ItemStack, TextComponent, Vec3d};
use uuid::Uuid;

/// Version-independent internal packet representation.
/// The protocol adapter converts between wire format and these, one variant
/// per (phase, opcode) the core handles.
#[derive(Debug, Clone)]
pub enum InternalPacket {
    // === Handshaking (serverbound) ===
    Handshake {
        protocol_version: i32,
        server_address: String,
        server_port: u16,
        intent: i32,
    },

    // === Login (serverbound) ===
    LoginStart {
        name: String,
        uuid: Uuid,
    },
    LoginAcknowledged,

    // === Login (clientbound) ===
    LoginSuccess {
        profile: GameProfile,
    },

    // === Configuration (serverbound) ===
    ClientInformation {
        locale: String,
        view_distance: i8,
        chat_mode: i32,
        chat_colors: bool,
        skin_parts: u8,
        main_hand: i32,
        text_filtering: bool,
        allow_listing: bool,
    },
    PluginMessage {
        channel: String,
        data: Vec<u8>,
    },
    FinishConfigurationAck,
    KnownPacksResponse {
        packs: Vec<KnownPack>,
    },

    // === Configuration (clientbound) ===
    KnownPacksRequest {
        packs: Vec<KnownPack>,
    },
    RegistryData {
        registry_id: String,
        entries: Vec<RegistryEntry>,
    },
    FinishConfiguration,

    // === Play (clientbound) ===
    JoinGame {
        entity_id: i32,
        is_hardcore: bool,
        dimension_names: Vec<String>,
        max_players: i32,
        view_distance: i32,
        simulation_distance: i32,
        reduced_debug_info: bool,
        enable_respawn_screen: bool,
        do_limited_crafting: bool,
        dimension_type: i32,
        dimension_name: String,
        hashed_seed: i64,
        game_mode: GameMode,
        previous_game_mode: i8,
        is_debug: bool,
        is_flat: bool,
        portal_cooldown: i32,
        sea_level: i32,
        enforces_secure_chat: bool,
    },
    SynchronizePlayerPosition {
        teleport_id: i32,
        position: Vec3d,
        velocity: Vec3d,
        yaw: f32,
        pitch: f32,
        flags: i32,
    },
    SetCenterChunk {
        chunk_x: i32,
        chunk_z: i32,
    },
    ChunkDataAndUpdateLight {
        chunk_x: i32,
        chunk_z: i32,
        /// (heightmap type id, packed 9-bit long array) pairs.
        heightmaps: Vec<(i32, Vec<i64>)>,
        data: Vec<u8>,
        light_data: ChunkLightData,
    },
    KeepAliveClientbound {
        id: i64,
    },
    GameEvent {
        event: u8,
        value: f32,
    },
    UpdateTime {
        world_age: i64,
        time_of_day: i64,
        time_advances: bool,
    },

    /// Tab-list update, bitmask-driven: only fields named by `actions` are
    /// present per entry.
    PlayerInfoUpdate {
        actions: u8,
        players: Vec<PlayerInfoEntry>,
    },
    PlayerInfoRemove {
        uuids: Vec<Uuid>,
    },

    SpawnEntity {
        entity_id: i32,
        entity_uuid: Uuid,
        entity_type: i32,
        x: f64,
        y: f64,
        z: f64,
        pitch: u8,
        yaw: u8,
        head_yaw: u8,
        data: i32,
        velocity: Vec3d,
    },
    RemoveEntities {
        entity_ids: Vec<i32>,
    },

    /// Relative move in 1/4096ths of a block; at most ~8 blocks per axis.
    UpdateEntityPosition {
        entity_id: i32,
        delta_x: i16,
        delta_y: i16,
        delta_z: i16,
        on_ground: bool,
    },
    UpdateEntityPositionAndRotation {
        entity_id: i32,
        delta_x: i16,
        delta_y: i16,
        delta_z: i16,
        yaw: u8,
        pitch: u8,
        on_ground: bool,
    },
    UpdateEntityRotation {
        entity_id: i32,
        yaw: u8,
        pitch: u8,
        on_ground: bool,
    },
    SetHeadRotation {
        entity_id: i32,
        head_yaw: u8,
    },
    /// Absolute position sync, used when deltas no longer fit 16 bits.
    TeleportEntity {
        entity_id: i32,
        position: Vec3d,
        velocity: Vec3d,
        yaw: f32,
        pitch: f32,
        on_ground: bool,
    },

    BlockUpdate {
        position: BlockPos,
        block_id: i32,
    },
    SetBlockDestroyStage {
        entity_id: i32,
        position: BlockPos,
        /// 0-9 are breaking overlays, anything else removes the overlay.
        destroy_stage: i8,
    },
    WorldEvent {
        event: i32,
        position: BlockPos,
        data: i32,
        global: bool,
    },
    EntityAnimation {
        entity_id: i32,
        animation: u8,
    },
    AcknowledgeBlockChange {
        sequence: i32,
    },

    SetContainerContent {
        window_id: i32,
        state_id: i32,
        slots: Vec<Option<ItemStack>>,
        carried_item: Option<ItemStack>,
    },
    SetContainerSlot {
        window_id: i32,
        state_id: i32,
        slot: i16,
        item: Option<ItemStack>,
    },
    SetHeldItemClientbound {
        slot: i8,
    },

    // === Play (serverbound) ===
    KeepAliveServerbound {
        id: i64,
    },
    SetPlayerPosition {
        x: f64,
        y: f64,
        z: f64,
        on_ground: bool,
    },
    SetPlayerPositionAndRotation {
        x: f64,
        y: f64,
        z: f64,
        yaw: f32,
        pitch: f32,
        on_ground: bool,
    },
    SetPlayerRotation {
        yaw: f32,
        pitch: f32,
        on_ground: bool,
    },
    PlayerAction {
        status: i32,
        position: BlockPos,
        face: u8,
        sequence: i32,
    },
    UseItemOn {
        hand: i32,
        position: BlockPos,
        face: u8,
        cursor_x: f32,
        cursor_y: f32,
        cursor_z: f32,
        inside_block: bool,
        world_border_hit: bool,
        sequence: i32,
    },
    SwingArm {
        hand: i32,
    },
    SetHeldItemServerbound {
        slot: i16,
    },
    SetCreativeModeSlot {
        slot: i16,
        item: Option<ItemStack>,
    },
    ClickContainer {
        window_id: i32,
        state_id: i32,
        slot: i16,
        button: i8,
        mode: i32,
        changed_slots: Vec<(i16, Option<ItemStack>)>,
        carried_item: Option<ItemStack>,
    },
    ClickContainerButton {
        window_id: i32,
        button: i32,
    },
    CloseContainer {
        window_id: i32,
    },

    /// Unknown / unhandled packet — raw bytes preserved for the log.
    Unknown {
        packet_id: i32,
        data: Vec<u8>,
    },
}

/// Player Info Update action bitmask flags.
pub mod player_info_actions {
    pub const ADD_PLAYER: u8 = 0x01;
    pub const INITIALIZE_CHAT: u8 = 0x02;
    pub const UPDATE_GAME_MODE: u8 = 0x04;
    pub const UPDATE_LISTED: u8 = 0x08;
    pub const UPDATE_LATENCY: u8 = 0x10;
    pub const UPDATE_DISPLAY_NAME: u8 = 0x20;
}

/// A single player entry in a PlayerInfoUpdate packet.
#[derive(Debug, Clone)]
pub struct PlayerInfoEntry {
    pub uuid: Uuid,
    /// Present when ADD_PLAYER action is set.
    pub name: Option<String>,
    /// Properties (name, value, signature) — present with ADD_PLAYER.
    pub properties: Vec<(String, String, Option<String>)>,
    /// Present when UPDATE_GAME_MODE action is set.
    pub game_mode: Option<i32>,
    /// Present when UPDATE_LISTED action is set.
    pub listed: Option<bool>,
    /// Present when UPDATE_LATENCY action is set.
    pub ping: Option<i32>,
    /// Present when UPDATE_DISPLAY_NAME action is set.
    pub display_name: Option<TextComponent>,
}

#[derive(Debug, Clone)]
pub struct KnownPack {
    pub namespace: String,
    pub id: String,
    pub version: String,
}

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub id: String,
    pub data: Option<NbtValue>,
}

/// Light section masks and nibble arrays for a chunk packet. Masks cover the
/// 24 sections plus one sentinel edge below and above.
#[derive(Debug, Clone, Default)]
pub struct ChunkLightData {
    pub sky_light_mask: Vec<i64>,
    pub block_light_mask: Vec<i64>,
    pub empty_sky_light_mask: Vec<i64>,
    pub empty_block_light_mask: Vec<i64>,
    pub sky_light_arrays: Vec<Vec<u8>>,
    pub block_light_arrays: Vec<Vec<u8>>,
}
