//! Initial quality scoring
//!
//! The starting score blends the source's reputation with the protocol's
//! rank; parser annotations add fixed bonuses (AEAD ciphers, TLS).

use subfuse_core::VpnConfig;

/// Weight of the source's reputation in the base score
const REPUTATION_SHARE: f64 = 0.5;

/// Weight of the protocol rank in the base score
const PROTOCOL_SHARE: f64 = 0.35;

/// Bonus for AEAD cipher support
const AEAD_BONUS: f64 = 0.1;

/// Bonus for TLS transport
const TLS_BONUS: f64 = 0.05;

/// Compute the initial score for a freshly parsed record
pub fn initial_score(config: &VpnConfig, source_reputation: f64) -> f64 {
    let mut score = REPUTATION_SHARE * source_reputation.clamp(0.0, 1.0)
        + PROTOCOL_SHARE * config.protocol.rank();

    if config
        .metadata
        .get("aead_support")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
    {
        score += AEAD_BONUS;
    }
    if config.tls {
        score += TLS_BONUS;
    }
    score.clamp(0.0, 1.0)
}

/// Apply the initial score to a batch in place
pub fn score_batch(configs: &mut [VpnConfig], source_reputation: f64) {
    for config in configs.iter_mut() {
        config.quality_score = initial_score(config, source_reputation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subfuse_core::Protocol;

    #[test]
    fn test_vless_outranks_legacy_ss() {
        let vless = VpnConfig::new(Protocol::Vless, "h", 443);
        let ssr = VpnConfig::new(Protocol::Shadowsocksr, "h", 443);
        assert!(initial_score(&vless, 0.5) > initial_score(&ssr, 0.5));
    }

    #[test]
    fn test_tls_and_aead_bonuses() {
        let mut plain = VpnConfig::new(Protocol::Shadowsocks, "h", 8388);
        let base = initial_score(&plain, 0.5);

        plain.metadata.insert("aead_support".into(), true.into());
        let with_aead = initial_score(&plain, 0.5);
        assert!((with_aead - base - 0.1).abs() < 1e-9);

        plain.tls = true;
        let with_both = initial_score(&plain, 0.5);
        assert!((with_both - base - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_score_clamped() {
        let mut config = VpnConfig::new(Protocol::Vless, "h", 443);
        config.tls = true;
        config.metadata.insert("aead_support".into(), true.into());
        assert!(initial_score(&config, 1.0) <= 1.0);
        assert!(initial_score(&config, -3.0) >= 0.0);
    }

    #[test]
    fn test_reputation_raises_score() {
        let config = VpnConfig::new(Protocol::Trojan, "h", 443);
        assert!(initial_score(&config, 0.9) > initial_score(&config, 0.1));
    }
}
