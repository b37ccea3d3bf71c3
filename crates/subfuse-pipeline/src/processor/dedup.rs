//! Semantic deduplication over canonical records
//!
//! Order-stable: the surviving representative keeps the position of the
//! key's first occurrence, and on a score tie the earliest observation
//! wins. Metadata from dropped duplicates is merged into the survivor
//! without overwriting its existing keys.

use std::collections::HashMap;

use subfuse_core::{DedupStrategy, VpnConfig};

/// Group configurations by their dedup key
pub fn find_duplicates(
    configs: &[VpnConfig],
    strategy: DedupStrategy,
) -> HashMap<String, Vec<VpnConfig>> {
    let mut groups: HashMap<String, Vec<VpnConfig>> = HashMap::new();
    for config in configs {
        groups
            .entry(config.dedup_key(strategy))
            .or_default()
            .push(config.clone());
    }
    groups
}

/// Keep one representative per key: highest quality score, earliest
/// observation on ties
pub fn deduplicate(configs: Vec<VpnConfig>, strategy: DedupStrategy) -> Vec<VpnConfig> {
    let mut kept: Vec<VpnConfig> = Vec::with_capacity(configs.len());
    let mut position: HashMap<String, usize> = HashMap::new();

    for config in configs {
        let key = config.dedup_key(strategy);
        match position.get(&key) {
            None => {
                position.insert(key, kept.len());
                kept.push(config);
            }
            Some(&index) => {
                let survivor = &mut kept[index];
                if config.quality_score > survivor.quality_score {
                    let mut replacement = config;
                    merge_metadata(&mut replacement, survivor);
                    *survivor = replacement;
                } else {
                    merge_metadata(survivor, &config);
                }
            }
        }
    }
    kept
}

fn merge_metadata(survivor: &mut VpnConfig, dropped: &VpnConfig) {
    for (key, value) in &dropped.metadata {
        survivor
            .metadata
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subfuse_core::Protocol;

    fn node(server: &str, port: u16, score: f64) -> VpnConfig {
        let mut config = VpnConfig::new(Protocol::Vmess, server, port);
        config.uuid = Some("u".into());
        config.quality_score = score;
        config
    }

    #[test]
    fn test_first_occurrence_wins_on_tie() {
        let mut first = node("a.example.com", 443, 0.5);
        first.source_url = "https://one.example/sub".into();
        let mut second = node("a.example.com", 443, 0.5);
        second.source_url = "https://two.example/sub".into();

        let result = deduplicate(vec![first, second], DedupStrategy::ServerPort);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].source_url, "https://one.example/sub");
    }

    #[test]
    fn test_higher_score_replaces_in_place() {
        let low = node("a.example.com", 443, 0.2);
        let other = node("b.example.com", 443, 0.9);
        let high = node("a.example.com", 443, 0.8);

        let result = deduplicate(vec![low, other, high], DedupStrategy::ServerPort);
        assert_eq!(result.len(), 2);
        // The survivor keeps the first occurrence's position.
        assert_eq!(result[0].server, "a.example.com");
        assert!((result[0].quality_score - 0.8).abs() < f64::EPSILON);
        assert_eq!(result[1].server, "b.example.com");
    }

    #[test]
    fn test_metadata_merged_from_dropped() {
        let mut first = node("a.example.com", 443, 0.5);
        first.metadata.insert("geo".into(), "de".into());
        let mut second = node("a.example.com", 443, 0.1);
        second.metadata.insert("aead_support".into(), true.into());
        second.metadata.insert("geo".into(), "fr".into());

        let result = deduplicate(vec![first, second], DedupStrategy::ServerPort);
        assert_eq!(result[0].metadata["aead_support"], true);
        // Existing keys are not overwritten.
        assert_eq!(result[0].metadata["geo"], "de");
    }

    #[test]
    fn test_idempotence_all_strategies() {
        let configs = vec![
            node("a.example.com", 443, 0.5),
            node("a.example.com", 443, 0.7),
            node("a.example.com", 8443, 0.3),
            node("b.example.com", 443, 0.9),
        ];
        for strategy in [
            DedupStrategy::Exact,
            DedupStrategy::ServerPort,
            DedupStrategy::ServerProtocol,
            DedupStrategy::ContentHash,
        ] {
            let once = deduplicate(configs.clone(), strategy);
            let twice = deduplicate(once.clone(), strategy);
            assert_eq!(once.len(), twice.len(), "strategy {:?}", strategy);
            for (a, b) in once.iter().zip(twice.iter()) {
                assert!(a.same_endpoint(b));
            }
        }
    }

    #[test]
    fn test_find_duplicates_groups() {
        let configs = vec![
            node("a.example.com", 443, 0.5),
            node("a.example.com", 443, 0.7),
            node("b.example.com", 443, 0.9),
        ];
        let groups = find_duplicates(&configs, DedupStrategy::ServerPort);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["a.example.com:443"].len(), 2);
        assert_eq!(groups["b.example.com:443"].len(), 1);
    }

    #[test]
    fn test_server_protocol_strategy() {
        let same_server_other_port = vec![
            node("a.example.com", 443, 0.5),
            node("a.example.com", 8443, 0.5),
        ];
        let result = deduplicate(same_server_other_port, DedupStrategy::ServerProtocol);
        assert_eq!(result.len(), 1);
    }
}
