//! sing-box JSON emission: one outbound object per configuration

use serde_json::{json, Map, Value};

use subfuse_core::{Protocol, VpnConfig};

use crate::error::PipelineResult;

/// Render the configurations as a sing-box outbound document
pub fn render(configs: &[VpnConfig]) -> PipelineResult<Vec<u8>> {
    let outbounds: Vec<Value> = configs.iter().enumerate().map(outbound).collect();
    let doc = json!({ "outbounds": outbounds });
    Ok(serde_json::to_vec_pretty(&doc)?)
}

fn outbound((index, config): (usize, &VpnConfig)) -> Value {
    let mut out = Map::new();
    out.insert("tag".into(), tag(config, index).into());
    out.insert("server".into(), config.server.clone().into());
    out.insert("server_port".into(), config.port.into());

    match config.protocol {
        Protocol::Vmess => {
            out.insert("type".into(), "vmess".into());
            out.insert("uuid".into(), config.uuid.clone().unwrap_or_default().into());
            out.insert(
                "security".into(),
                config
                    .encryption
                    .clone()
                    .unwrap_or_else(|| "auto".into())
                    .into(),
            );
            out.insert(
                "alter_id".into(),
                config
                    .metadata
                    .get("aid")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0)
                    .into(),
            );
            insert_tls(&mut out, config);
            insert_transport(&mut out, config);
        }
        Protocol::Vless => {
            out.insert("type".into(), "vless".into());
            out.insert("uuid".into(), config.uuid.clone().unwrap_or_default().into());
            if let Some(flow) = &config.flow {
                out.insert("flow".into(), flow.clone().into());
            }
            insert_tls(&mut out, config);
            insert_transport(&mut out, config);
        }
        Protocol::Trojan => {
            out.insert("type".into(), "trojan".into());
            out.insert(
                "password".into(),
                config.password.clone().unwrap_or_default().into(),
            );
            insert_tls(&mut out, config);
        }
        Protocol::Shadowsocks | Protocol::Ss2022 => {
            out.insert("type".into(), "shadowsocks".into());
            out.insert(
                "method".into(),
                config.encryption.clone().unwrap_or_default().into(),
            );
            out.insert(
                "password".into(),
                config.password.clone().unwrap_or_default().into(),
            );
        }
        Protocol::Shadowsocksr => {
            out.insert("type".into(), "shadowsocksr".into());
            out.insert(
                "method".into(),
                config.encryption.clone().unwrap_or_default().into(),
            );
            out.insert(
                "password".into(),
                config.password.clone().unwrap_or_default().into(),
            );
            if let Some(protocol) = config.metadata.get("ssr_protocol") {
                out.insert("protocol".into(), protocol.clone());
            }
            if let Some(obfs) = config.metadata.get("obfs") {
                out.insert("obfs".into(), obfs.clone());
            }
        }
        Protocol::Hysteria2 => {
            out.insert("type".into(), "hysteria2".into());
            out.insert(
                "password".into(),
                config
                    .password
                    .clone()
                    .or_else(|| config.uuid.clone())
                    .unwrap_or_default()
                    .into(),
            );
            insert_tls(&mut out, config);
        }
        Protocol::Tuic => {
            out.insert("type".into(), "tuic".into());
            out.insert("uuid".into(), config.uuid.clone().unwrap_or_default().into());
            out.insert(
                "password".into(),
                config.password.clone().unwrap_or_default().into(),
            );
            if let Some(cc) = config.metadata.get("congestion_control") {
                out.insert("congestion_control".into(), cc.clone());
            }
            insert_tls(&mut out, config);
        }
        Protocol::Http => {
            out.insert("type".into(), "http".into());
            insert_credentials(&mut out, config);
        }
        Protocol::Socks5 => {
            out.insert("type".into(), "socks".into());
            out.insert("version".into(), "5".into());
            insert_credentials(&mut out, config);
        }
    }

    Value::Object(out)
}

fn tag(config: &VpnConfig, index: usize) -> String {
    match &config.name {
        Some(name) => format!("{}-{}", name, index),
        None => format!("{}-{}", config.protocol, index),
    }
}

fn insert_tls(out: &mut Map<String, Value>, config: &VpnConfig) {
    if !config.tls {
        return;
    }
    let mut tls = Map::new();
    tls.insert("enabled".into(), true.into());
    if let Some(sni) = &config.sni {
        tls.insert("server_name".into(), sni.clone().into());
    }
    if let Some(alpn) = &config.alpn {
        let list: Vec<Value> = alpn.split(',').map(|a| a.trim().into()).collect();
        tls.insert("alpn".into(), list.into());
    }
    out.insert("tls".into(), Value::Object(tls));
}

fn insert_transport(out: &mut Map<String, Value>, config: &VpnConfig) {
    let Some(network) = &config.network else { return };
    if network == "tcp" {
        return;
    }
    let mut transport = Map::new();
    transport.insert("type".into(), network.clone().into());
    if let Some(path) = &config.path {
        transport.insert("path".into(), path.clone().into());
    }
    out.insert("transport".into(), Value::Object(transport));
}

fn insert_credentials(out: &mut Map<String, Value>, config: &VpnConfig) {
    if let Some(user) = &config.user_id {
        out.insert("username".into(), user.clone().into());
    }
    if let Some(password) = &config.password {
        out.insert("password".into(), password.clone().into());
    }
}
