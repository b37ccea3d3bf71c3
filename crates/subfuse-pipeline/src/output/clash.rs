//! Clash YAML emission
//!
//! Produces a document with `proxies`, `proxy-groups` (an `⚡ Auto-Select`
//! group listing every proxy), and `rules`.

use serde_yaml::{Mapping, Value};

use subfuse_core::{Protocol, VpnConfig};

use crate::error::PipelineResult;

/// Name of the automatic selection group
pub const AUTO_SELECT_GROUP: &str = "⚡ Auto-Select";

/// Render the configurations as a Clash YAML document
pub fn render(configs: &[VpnConfig]) -> PipelineResult<Vec<u8>> {
    let mut names: Vec<String> = Vec::with_capacity(configs.len());
    let mut proxies: Vec<Value> = Vec::with_capacity(configs.len());

    for config in configs {
        let name = unique_name(&mut names, config.display_name());
        proxies.push(proxy_entry(config, &name));
    }

    let mut group = Mapping::new();
    group.insert("name".into(), AUTO_SELECT_GROUP.into());
    group.insert("type".into(), "url-test".into());
    group.insert("url".into(), "https://www.gstatic.com/generate_204".into());
    group.insert("interval".into(), 300.into());
    group.insert(
        "proxies".into(),
        Value::Sequence(names.iter().map(|n| Value::from(n.as_str())).collect()),
    );

    let mut doc = Mapping::new();
    doc.insert(
        "proxies".into(),
        Value::Sequence(proxies),
    );
    doc.insert(
        "proxy-groups".into(),
        Value::Sequence(vec![Value::Mapping(group)]),
    );
    doc.insert(
        "rules".into(),
        Value::Sequence(vec![format!("MATCH,{}", AUTO_SELECT_GROUP).into()]),
    );

    Ok(serde_yaml::to_string(&Value::Mapping(doc))?.into_bytes())
}

fn unique_name(taken: &mut Vec<String>, candidate: String) -> String {
    let name = if taken.contains(&candidate) {
        format!("{} #{}", candidate, taken.len() + 1)
    } else {
        candidate
    };
    taken.push(name.clone());
    name
}

fn proxy_entry(config: &VpnConfig, name: &str) -> Value {
    let mut map = Mapping::new();
    map.insert("name".into(), name.into());
    map.insert("server".into(), config.server.as_str().into());
    map.insert("port".into(), config.port.into());

    match config.protocol {
        Protocol::Vmess => {
            map.insert("type".into(), "vmess".into());
            map.insert("uuid".into(), config.uuid.clone().unwrap_or_default().into());
            map.insert(
                "alterId".into(),
                config
                    .metadata
                    .get("aid")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0)
                    .into(),
            );
            map.insert(
                "cipher".into(),
                config
                    .encryption
                    .clone()
                    .unwrap_or_else(|| "auto".into())
                    .into(),
            );
            insert_transport(&mut map, config);
        }
        Protocol::Vless => {
            map.insert("type".into(), "vless".into());
            map.insert("uuid".into(), config.uuid.clone().unwrap_or_default().into());
            if let Some(flow) = &config.flow {
                map.insert("flow".into(), flow.as_str().into());
            }
            insert_transport(&mut map, config);
        }
        Protocol::Trojan => {
            map.insert("type".into(), "trojan".into());
            map.insert(
                "password".into(),
                config.password.clone().unwrap_or_default().into(),
            );
            if let Some(sni) = &config.sni {
                map.insert("sni".into(), sni.as_str().into());
            }
        }
        Protocol::Shadowsocks | Protocol::Ss2022 => {
            map.insert("type".into(), "ss".into());
            map.insert(
                "cipher".into(),
                config.encryption.clone().unwrap_or_default().into(),
            );
            map.insert(
                "password".into(),
                config.password.clone().unwrap_or_default().into(),
            );
        }
        Protocol::Shadowsocksr => {
            map.insert("type".into(), "ssr".into());
            map.insert(
                "cipher".into(),
                config.encryption.clone().unwrap_or_default().into(),
            );
            map.insert(
                "password".into(),
                config.password.clone().unwrap_or_default().into(),
            );
            if let Some(protocol) = config.metadata.get("ssr_protocol").and_then(|v| v.as_str()) {
                map.insert("protocol".into(), protocol.into());
            }
            if let Some(obfs) = config.metadata.get("obfs").and_then(|v| v.as_str()) {
                map.insert("obfs".into(), obfs.into());
            }
        }
        Protocol::Hysteria2 => {
            map.insert("type".into(), "hysteria2".into());
            map.insert(
                "password".into(),
                config
                    .password
                    .clone()
                    .or_else(|| config.uuid.clone())
                    .unwrap_or_default()
                    .into(),
            );
            if let Some(sni) = &config.sni {
                map.insert("sni".into(), sni.as_str().into());
            }
        }
        Protocol::Tuic => {
            map.insert("type".into(), "tuic".into());
            map.insert("uuid".into(), config.uuid.clone().unwrap_or_default().into());
            map.insert(
                "password".into(),
                config.password.clone().unwrap_or_default().into(),
            );
        }
        Protocol::Http => {
            map.insert("type".into(), "http".into());
            insert_credentials(&mut map, config);
        }
        Protocol::Socks5 => {
            map.insert("type".into(), "socks5".into());
            insert_credentials(&mut map, config);
        }
    }

    if config.tls && !matches!(config.protocol, Protocol::Trojan | Protocol::Hysteria2) {
        map.insert("tls".into(), true.into());
        if let Some(sni) = &config.sni {
            map.insert("servername".into(), sni.as_str().into());
        }
    }

    Value::Mapping(map)
}

fn insert_transport(map: &mut Mapping, config: &VpnConfig) {
    if let Some(network) = &config.network {
        if network != "tcp" {
            map.insert("network".into(), network.as_str().into());
            if network == "ws" {
                let mut ws = Mapping::new();
                if let Some(path) = &config.path {
                    ws.insert("path".into(), path.as_str().into());
                }
                map.insert("ws-opts".into(), Value::Mapping(ws));
            }
        }
    }
}

fn insert_credentials(map: &mut Mapping, config: &VpnConfig) {
    if let Some(user) = &config.user_id {
        map.insert("username".into(), user.as_str().into());
    }
    if let Some(password) = &config.password {
        map.insert("password".into(), password.as_str().into());
    }
}
