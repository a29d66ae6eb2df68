use chisel_data::RegistrySnapshot;
use chisel_protocol_core::{InternalPacket, RegistryEntry};

/// Build the Registry Data packets for the Configuration state, one packet
/// per registry, in snapshot order.
pub fn build_registry_packets(snapshot: &RegistrySnapshot) -> Vec<InternalPacket> {
    snapshot
        .registries()
        .iter()
        .map(|registry| InternalPacket::RegistryData {
            registry_id: registry.id.clone(),
            entries: registry
                .entries
                .iter()
                .map(|entry| RegistryEntry {
                    id: entry.id.clone(),
                    data: entry.nbt.clone(),
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_survive_translation() {
        let snapshot = RegistrySnapshot::builtin();
        let packets = build_registry_packets(&snapshot);
        for (packet, registry) in packets.iter().zip(snapshot.registries()) {
            match packet {
                InternalPacket::RegistryData {
                    registry_id,
                    entries,
                } => {
                    assert_eq!(registry_id, &registry.id);
                    assert_eq!(entries.len(), registry.entries.len());
                }
                other => panic!("expected RegistryData, got {:?}", other),
            }
        }
    }
}
