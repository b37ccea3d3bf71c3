//! Output formatters
//!
//! Each format maps the canonical records to bytes and writes them under
//! the output directory. Unknown format names fail fast before any file is
//! touched; writes go through a temp file and rename.

pub mod clash;
pub mod singbox;

pub use clash::AUTO_SELECT_GROUP;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

use subfuse_core::VpnConfig;

use crate::error::{PipelineError, PipelineResult};

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One canonical URI per line
    Raw,
    /// Base64 of the raw file
    Base64,
    /// Tabular summary
    Csv,
    /// Clash YAML
    Clash,
    /// sing-box outbound JSON
    SingBox,
    /// Full canonical-model dump
    Json,
}

impl OutputFormat {
    /// Output file name under the output directory
    pub fn file_name(&self) -> &'static str {
        match self {
            OutputFormat::Raw => "subscription_raw.txt",
            OutputFormat::Base64 => "subscription_base64.txt",
            OutputFormat::Csv => "configurations.csv",
            OutputFormat::Clash => "clash.yaml",
            OutputFormat::SingBox => "singbox.json",
            OutputFormat::Json => "configurations.json",
        }
    }

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Raw => "raw",
            OutputFormat::Base64 => "base64",
            OutputFormat::Csv => "csv",
            OutputFormat::Clash => "clash",
            OutputFormat::SingBox => "singbox",
            OutputFormat::Json => "json",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(OutputFormat::Raw),
            "base64" => Ok(OutputFormat::Base64),
            "csv" => Ok(OutputFormat::Csv),
            "clash" => Ok(OutputFormat::Clash),
            "singbox" | "sing-box" => Ok(OutputFormat::SingBox),
            "json" => Ok(OutputFormat::Json),
            _ => Err(()),
        }
    }
}

/// Resolve format names, rejecting the whole request if any are unknown
pub fn parse_formats(names: &[String]) -> PipelineResult<Vec<OutputFormat>> {
    let mut formats = Vec::with_capacity(names.len());
    let mut unknown = Vec::new();
    for name in names {
        match name.parse() {
            Ok(format) => {
                if !formats.contains(&format) {
                    formats.push(format);
                }
            }
            Err(()) => unknown.push(name.clone()),
        }
    }
    if !unknown.is_empty() {
        return Err(PipelineError::UnsupportedFormats(unknown));
    }
    Ok(formats)
}

/// Writes configurations under an output directory
pub struct OutputManager {
    output_dir: PathBuf,
}

impl OutputManager {
    /// Create a manager targeting the given directory
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Render one format to bytes
    pub fn render(&self, configs: &[VpnConfig], format: OutputFormat) -> PipelineResult<Vec<u8>> {
        match format {
            OutputFormat::Raw => Ok(render_raw(configs)),
            OutputFormat::Base64 => Ok(BASE64.encode(render_raw(configs)).into_bytes()),
            OutputFormat::Csv => render_csv(configs),
            OutputFormat::Clash => clash::render(configs),
            OutputFormat::SingBox => singbox::render(configs),
            OutputFormat::Json => Ok(serde_json::to_vec_pretty(configs)?),
        }
    }

    /// Write one format; returns the file path
    pub async fn write_one(
        &self,
        configs: &[VpnConfig],
        format: OutputFormat,
    ) -> PipelineResult<PathBuf> {
        fs::create_dir_all(&self.output_dir).await?;
        let bytes = self.render(configs, format)?;
        let path = self.output_dir.join(format.file_name());

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &path).await?;

        info!(format = %format, path = %path.display(), bytes = bytes.len(), "output written");
        Ok(path)
    }

    /// Write several formats; returns a map of format to path
    pub async fn write_all(
        &self,
        configs: &[VpnConfig],
        formats: &[OutputFormat],
    ) -> PipelineResult<HashMap<OutputFormat, PathBuf>> {
        let mut paths = HashMap::with_capacity(formats.len());
        for format in formats {
            let path = self.write_one(configs, *format).await?;
            paths.insert(*format, path);
        }
        Ok(paths)
    }
}

fn render_raw(configs: &[VpnConfig]) -> Vec<u8> {
    let mut out = String::new();
    for config in configs {
        out.push_str(&config.canonical_uri());
        out.push('\n');
    }
    out.into_bytes()
}

fn render_csv(configs: &[VpnConfig]) -> PipelineResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "name",
        "protocol",
        "server",
        "port",
        "quality_score",
        "source_url",
    ])?;
    for config in configs {
        writer.write_record([
            config.display_name(),
            config.protocol.to_string(),
            config.server.clone(),
            config.port.to_string(),
            format!("{:.3}", config.quality_score),
            config.source_url.clone(),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| PipelineError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
}
