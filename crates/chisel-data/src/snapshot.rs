use chisel_nbt::{nbt_compound, NbtValue};

/// One entry of a registry: identifier plus the optional NBT body shipped in
/// Registry Data.
#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub id: String,
    pub nbt: Option<NbtValue>,
}

#[derive(Debug, Clone)]
pub struct RegistryDef {
    pub id: String,
    pub entries: Vec<SnapshotEntry>,
}

/// The ordered registry snapshot the configuration phase publishes. Entry
/// order defines each entry's numeric protocol id.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    registries: Vec<RegistryDef>,
}

impl RegistrySnapshot {
    /// The registries a protocol-773 client requires before Finish
    /// Configuration, in the order they are sent.
    pub fn builtin() -> Self {
        Self {
            registries: vec![
                dimension_type(),
                cat_variant(),
                chicken_variant(),
                cow_variant(),
                frog_variant(),
                painting_variant(),
                pig_variant(),
                wolf_variant(),
                wolf_sound_variant(),
                biome(),
                damage_type(),
            ],
        }
    }

    pub fn registries(&self) -> &[RegistryDef] {
        &self.registries
    }

    pub fn entries(&self, registry_id: &str) -> Option<&[SnapshotEntry]> {
        self.registries
            .iter()
            .find(|r| r.id == registry_id)
            .map(|r| r.entries.as_slice())
    }

    /// Numeric protocol id of an entry: its position in the ordered list.
    pub fn protocol_id(&self, registry_id: &str, entry_id: &str) -> Option<i32> {
        self.entries(registry_id)?
            .iter()
            .position(|e| e.id == entry_id)
            .map(|i| i as i32)
    }
}

fn entry(id: &str, nbt: NbtValue) -> SnapshotEntry {
    SnapshotEntry {
        id: id.into(),
        nbt: Some(nbt),
    }
}

fn dimension_type() -> RegistryDef {
    RegistryDef {
        id: "minecraft:dimension_type".into(),
        entries: vec![entry(
            "minecraft:overworld",
            nbt_compound! {
                "has_skylight" => NbtValue::Byte(1),
                "has_ceiling" => NbtValue::Byte(0),
                "ultrawarm" => NbtValue::Byte(0),
                "natural" => NbtValue::Byte(1),
                "coordinate_scale" => NbtValue::Double(1.0),
                "bed_works" => NbtValue::Byte(1),
                "respawn_anchor_works" => NbtValue::Byte(0),
                "min_y" => NbtValue::Int(-64),
                "height" => NbtValue::Int(384),
                "logical_height" => NbtValue::Int(384),
                "infiniburn" => NbtValue::String("#minecraft:infiniburn_overworld".into()),
                "effects" => NbtValue::String("minecraft:overworld".into()),
                "ambient_light" => NbtValue::Float(0.0),
                "piglin_safe" => NbtValue::Byte(0),
                "has_raids" => NbtValue::Byte(1),
                "monster_spawn_light_level" => NbtValue::Int(0),
                "monster_spawn_block_light_limit" => NbtValue::Int(0)
            },
        )],
    }
}

fn cat_variant() -> RegistryDef {
    RegistryDef {
        id: "minecraft:cat_variant".into(),
        entries: vec![entry(
            "minecraft:black",
            nbt_compound! {
                "asset_id" => NbtValue::String("minecraft:entity/cat/black".into())
            },
        )],
    }
}

fn chicken_variant() -> RegistryDef {
    RegistryDef {
        id: "minecraft:chicken_variant".into(),
        entries: vec![entry(
            "minecraft:temperate",
            nbt_compound! {
                "asset_id" => NbtValue::String("minecraft:entity/chicken/temperate_chicken".into())
            },
        )],
    }
}

fn cow_variant() -> RegistryDef {
    RegistryDef {
        id: "minecraft:cow_variant".into(),
        entries: vec![entry(
            "minecraft:temperate",
            nbt_compound! {
                "asset_id" => NbtValue::String("minecraft:entity/cow/temperate_cow".into())
            },
        )],
    }
}

fn frog_variant() -> RegistryDef {
    RegistryDef {
        id: "minecraft:frog_variant".into(),
        entries: vec![entry(
            "minecraft:temperate",
            nbt_compound! {
                "asset_id" => NbtValue::String("minecraft:entity/frog/temperate_frog".into())
            },
        )],
    }
}

fn painting_variant() -> RegistryDef {
    RegistryDef {
        id: "minecraft:painting_variant".into(),
        entries: vec![entry(
            "minecraft:kebab",
            nbt_compound! {
                "asset_id" => NbtValue::String("minecraft:kebab".into()),
                "width" => NbtValue::Int(1),
                "height" => NbtValue::Int(1)
            },
        )],
    }
}

fn pig_variant() -> RegistryDef {
    RegistryDef {
        id: "minecraft:pig_variant".into(),
        entries: vec![entry(
            "minecraft:temperate",
            nbt_compound! {
                "asset_id" => NbtValue::String("minecraft:entity/pig/temperate_pig".into())
            },
        )],
    }
}

fn wolf_variant() -> RegistryDef {
    RegistryDef {
        id: "minecraft:wolf_variant".into(),
        entries: vec![entry(
            "minecraft:pale",
            nbt_compound! {
                "assets" => nbt_compound! {
                    "wild" => NbtValue::String("minecraft:entity/wolf/wolf".into()),
                    "tame" => NbtValue::String("minecraft:entity/wolf/wolf_tame".into()),
                    "angry" => NbtValue::String("minecraft:entity/wolf/wolf_angry".into())
                }
            },
        )],
    }
}

fn wolf_sound_variant() -> RegistryDef {
    RegistryDef {
        id: "minecraft:wolf_sound_variant".into(),
        entries: vec![entry(
            "minecraft:classic",
            nbt_compound! {
                "ambient_sound" => NbtValue::String("minecraft:entity.wolf.ambient".into()),
                "death_sound" => NbtValue::String("minecraft:entity.wolf.death".into()),
                "growl_sound" => NbtValue::String("minecraft:entity.wolf.growl".into()),
                "hurt_sound" => NbtValue::String("minecraft:entity.wolf.hurt".into()),
                "pant_sound" => NbtValue::String("minecraft:entity.wolf.pant".into()),
                "whine_sound" => NbtValue::String("minecraft:entity.wolf.whine".into())
            },
        )],
    }
}

fn biome() -> RegistryDef {
    RegistryDef {
        id: "minecraft:worldgen/biome".into(),
        entries: vec![entry(
            "minecraft:plains",
            nbt_compound! {
                "has_precipitation" => NbtValue::Byte(1),
                "temperature" => NbtValue::Float(0.8),
                "downfall" => NbtValue::Float(0.4),
                "effects" => nbt_compound! {
                    "fog_color" => NbtValue::Int(12638463),
                    "water_color" => NbtValue::Int(4159204),
                    "water_fog_color" => NbtValue::Int(329011),
                    "sky_color" => NbtValue::Int(7907327),
                    "mood_sound" => nbt_compound! {
                        "sound" => NbtValue::String("minecraft:ambient.cave".into()),
                        "tick_delay" => NbtValue::Int(6000),
                        "offset" => NbtValue::Double(2.0),
                        "block_search_extent" => NbtValue::Int(8)
                    }
                }
            },
        )],
    }
}

fn damage_entry(id: &str, message_id: &str) -> SnapshotEntry {
    entry(
        id,
        nbt_compound! {
            "message_id" => NbtValue::String(message_id.into()),
            "scaling" => NbtValue::String("when_caused_by_living_non_player".into()),
            "exhaustion" => NbtValue::Float(0.0)
        },
    )
}

fn damage_type() -> RegistryDef {
    RegistryDef {
        id: "minecraft:damage_type".into(),
        entries: vec![
            damage_entry("minecraft:generic", "generic"),
            damage_entry("minecraft:generic_kill", "genericKill"),
            damage_entry("minecraft:in_fire", "inFire"),
            damage_entry("minecraft:on_fire", "onFire"),
            damage_entry("minecraft:lava", "lava"),
            damage_entry("minecraft:drown", "drown"),
            damage_entry("minecraft:starve", "starve"),
            damage_entry("minecraft:fall", "fall"),
            damage_entry("minecraft:out_of_world", "outOfWorld"),
            damage_entry("minecraft:player_attack", "player"),
            damage_entry("minecraft:mob_attack", "mob"),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_order() {
        let snapshot = RegistrySnapshot::builtin();
        let ids: Vec<&str> = snapshot.registries().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "minecraft:dimension_type",
                "minecraft:cat_variant",
                "minecraft:chicken_variant",
                "minecraft:cow_variant",
                "minecraft:frog_variant",
                "minecraft:painting_variant",
                "minecraft:pig_variant",
                "minecraft:wolf_variant",
                "minecraft:wolf_sound_variant",
                "minecraft:worldgen/biome",
                "minecraft:damage_type",
            ]
        );
    }

    #[test]
    fn test_protocol_ids_follow_entry_order() {
        let snapshot = RegistrySnapshot::builtin();
        assert_eq!(
            snapshot.protocol_id("minecraft:dimension_type", "minecraft:overworld"),
            Some(0)
        );
        assert_eq!(
            snapshot.protocol_id("minecraft:damage_type", "minecraft:generic_kill"),
            Some(1)
        );
        assert_eq!(snapshot.protocol_id("minecraft:damage_type", "minecraft:nope"), None);
        assert_eq!(snapshot.protocol_id("minecraft:unknown", "minecraft:x"), None);
    }

    #[test]
    fn test_every_registry_has_entries() {
        let snapshot = RegistrySnapshot::builtin();
        for registry in snapshot.registries() {
            assert!(
                !registry.entries.is_empty(),
                "registry {} must not be empty",
                registry.id
            );
        }
    }
}
