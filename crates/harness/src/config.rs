//! Harness configuration management

use anyhow::{Context, Result, anyhow};
use discovery::SessionPolicy;
use protocol::{ControlSetup, ProbeSpec, TransferKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub policy: PolicySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub report: ReportSettings,
    /// Declarative catalog; used when no `--catalog` is given
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub probes: Vec<CatalogEntry>,
}

/// Which device to open and how to claim it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Vendor ID as a hex string (e.g. "0x2541")
    pub vendor_id: String,
    /// Product ID as a hex string (e.g. "0xfa03")
    pub product_id: String,
    /// Interface to claim
    #[serde(default)]
    pub interface: u8,
    /// Detach an active kernel driver before claiming (best effort)
    #[serde(default = "DeviceSettings::default_detach")]
    pub detach_kernel_driver: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            vendor_id: "0x2541".to_string(),
            product_id: "0xfa03".to_string(),
            interface: 0,
            detach_kernel_driver: Self::default_detach(),
        }
    }
}

impl DeviceSettings {
    fn default_detach() -> bool {
        true
    }

    pub fn vendor_id(&self) -> Result<u16> {
        parse_hex_id(&self.vendor_id, "vendor_id")
    }

    pub fn product_id(&self) -> Result<u16> {
        parse_hex_id(&self.product_id, "product_id")
    }
}

/// Session pacing and retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySettings {
    /// Delay between probes (e.g. "100ms"); unset means the catalog's own pacing
    #[serde(
        default,
        with = "duration_serde::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub inter_probe_delay: Option<Duration>,
    /// Retries after a timeout or transport error
    #[serde(default = "PolicySettings::default_retry_count")]
    pub retry_count: u32,
    /// Wait before each retry
    #[serde(default = "PolicySettings::default_retry_backoff", with = "duration_serde")]
    pub retry_backoff: Duration,
    /// Bound on every transfer
    #[serde(
        default = "PolicySettings::default_transfer_timeout",
        with = "duration_serde"
    )]
    pub transfer_timeout: Duration,
    /// Count zero-byte answers as timeouts
    #[serde(default = "PolicySettings::default_treat_empty")]
    pub treat_empty_as_failure: bool,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            inter_probe_delay: None,
            retry_count: Self::default_retry_count(),
            retry_backoff: Self::default_retry_backoff(),
            transfer_timeout: Self::default_transfer_timeout(),
            treat_empty_as_failure: Self::default_treat_empty(),
        }
    }
}

impl PolicySettings {
    fn default_retry_count() -> u32 {
        SessionPolicy::default().retry_count
    }

    fn default_retry_backoff() -> Duration {
        SessionPolicy::default().retry_backoff
    }

    fn default_transfer_timeout() -> Duration {
        SessionPolicy::default().transfer_timeout
    }

    fn default_treat_empty() -> bool {
        SessionPolicy::default().treat_empty_as_failure
    }

    /// Session policy, falling back to `catalog_delay` when no delay is configured
    pub fn session_policy(&self, catalog_delay: Duration) -> SessionPolicy {
        SessionPolicy {
            inter_probe_delay: self.inter_probe_delay.unwrap_or(catalog_delay),
            retry_count: self.retry_count,
            retry_backoff: self.retry_backoff,
            transfer_timeout: self.transfer_timeout,
            treat_empty_as_failure: self.treat_empty_as_failure,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Report output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSettings {
    /// Write the JSON report here (tilde is expanded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_path: Option<String>,
    /// Bytes of each payload shown on the console
    #[serde(default = "ReportSettings::default_preview_bytes")]
    pub preview_bytes: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            json_path: None,
            preview_bytes: Self::default_preview_bytes(),
        }
    }
}

impl ReportSettings {
    fn default_preview_bytes() -> usize {
        64
    }

    pub fn json_path(&self) -> Option<PathBuf> {
        self.json_path
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
    }
}

/// Probe kind as written in a catalog file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Control,
    Bulk,
    Interrupt,
    WriteThenRead,
}

/// One `[[probes]]` table
///
/// # Example Configuration
/// ```toml
/// [[probes]]
/// label = "Init"
/// kind = "bulk"
/// payload = "EA 01 00 00 00 00 01 EA"
/// out_endpoint = 0x01
/// in_endpoint = 0x82
/// expected_length = 64
///
/// [[probes]]
/// label = "Status"
/// kind = "control"
/// request_type = 0xC0
/// request = 0x06
/// expected_length = 64
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub label: String,
    pub kind: EntryKind,
    /// Hex bytes, separated by spaces or commas
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_endpoint: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_endpoint: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_type: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_kind: Option<TransferKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_endpoint: Option<u8>,
}

impl CatalogEntry {
    /// Convert to a probe specification
    pub fn to_spec(&self) -> Result<ProbeSpec> {
        let payload = parse_hex_bytes(&self.payload)
            .with_context(|| format!("Invalid payload in probe '{}'", self.label))?;

        let spec = match self.kind {
            EntryKind::Control => ProbeSpec::control(self.label.clone(), self.setup()?),
            EntryKind::Bulk => ProbeSpec::bulk(self.label.clone()),
            EntryKind::Interrupt => ProbeSpec::interrupt(self.label.clone()),
            EntryKind::WriteThenRead => ProbeSpec::write_then_read(
                self.label.clone(),
                self.setup()?,
                self.read_kind.unwrap_or(TransferKind::Bulk),
                self.read_endpoint,
            ),
        };

        let mut spec = spec.with_payload(payload);
        spec.expected_length = self.expected_length;
        if let Some(endpoint) = self.out_endpoint {
            spec = spec.with_out_endpoint(endpoint);
        }
        if let Some(endpoint) = self.in_endpoint {
            spec = spec.with_in_endpoint(endpoint);
        }
        Ok(spec)
    }

    fn setup(&self) -> Result<ControlSetup> {
        let request_type = self
            .request_type
            .ok_or_else(|| anyhow!("Probe '{}' is missing request_type", self.label))?;
        let request = self
            .request
            .ok_or_else(|| anyhow!("Probe '{}' is missing request", self.label))?;
        Ok(ControlSetup::new(
            request_type,
            request,
            self.value.unwrap_or(0),
            self.index.unwrap_or(0),
        ))
    }
}

impl ProbeConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/usb-probe/probe.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: ProbeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usb-probe").join("probe.toml")
        } else {
            PathBuf::from(".config/usb-probe/probe.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        validate_log_level(&self.logging.level)?;

        self.device.vendor_id()?;
        self.device.product_id()?;

        if self.policy.transfer_timeout.is_zero() {
            return Err(anyhow!("transfer_timeout must be greater than 0"));
        }

        if self.report.preview_bytes == 0 {
            return Err(anyhow!("preview_bytes must be greater than 0"));
        }

        for entry in &self.probes {
            entry.to_spec()?;
        }

        Ok(())
    }
}

/// Reject anything but the five tracing levels
pub fn validate_log_level(level: &str) -> Result<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&level) {
        return Err(anyhow!(
            "Invalid log level '{}', must be one of: {}",
            level,
            valid_levels.join(", ")
        ));
    }
    Ok(())
}

/// Parse a `0x`-prefixed 16-bit hex ID (VID or PID)
pub fn parse_hex_id(id: &str, name: &str) -> Result<u16> {
    let hex_part = id
        .strip_prefix("0x")
        .or_else(|| id.strip_prefix("0X"))
        .ok_or_else(|| {
            anyhow!(
                "Invalid {} '{}', must start with '0x' (e.g., '0x1234')",
                name,
                id
            )
        })?;

    if hex_part.is_empty() || hex_part.len() > 4 {
        return Err(anyhow!(
            "Invalid {} '{}', hex part must be 1-4 digits",
            name,
            id
        ));
    }

    u16::from_str_radix(hex_part, 16)
        .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))
}

/// Parse hex bytes such as "EA 01 00 EA", "0xEA,0x01" or "EA0100EA"
pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();

    for token in s.split(|c: char| c.is_whitespace() || c == ',') {
        let token = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        if token.is_empty() {
            continue;
        }
        if token.len() % 2 != 0 && token.len() > 1 {
            return Err(anyhow!("Odd number of hex digits in '{}'", token));
        }

        let digits = token.as_bytes();
        for pair in digits.chunks(2) {
            let pair = std::str::from_utf8(pair)
                .map_err(|_| anyhow!("Invalid hex byte in '{}'", token))?;
            let byte = u8::from_str_radix(pair, 16)
                .map_err(|_| anyhow!("Invalid hex byte '{}'", pair))?;
            bytes.push(byte);
        }
    }

    Ok(bytes)
}

/// Custom serde module for Duration
///
/// Accepts strings like "250ms", "1s", "1m30s"; a bare number means seconds.
pub mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        format_duration(*duration).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::{format_duration, parse_duration};
        use serde::{Deserialize, Deserializer, Serialize, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => format_duration(*d).serialize(serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let opt: Option<String> = Option::deserialize(deserializer)?;
            match opt {
                Some(s) => parse_duration(&s)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }

    /// Parse a duration string like "500ms", "1s", "1m30s"
    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim().to_lowercase();
        if s.is_empty() {
            return Err("Empty duration".to_string());
        }

        let mut total = Duration::ZERO;
        let mut current_num = String::new();
        let mut chars = s.chars().peekable();

        while let Some(c) = chars.next() {
            if c.is_ascii_digit() {
                current_num.push(c);
                continue;
            }
            if current_num.is_empty() {
                return Err(format!("Invalid duration format: {}", s));
            }
            let num: u64 = current_num
                .parse()
                .map_err(|_| format!("Invalid number in duration: {}", current_num))?;
            current_num.clear();

            let part = match c {
                'h' => Duration::from_secs(num.saturating_mul(3600)),
                'm' if chars.peek() == Some(&'s') => {
                    chars.next();
                    Duration::from_millis(num)
                }
                'm' => Duration::from_secs(num.saturating_mul(60)),
                's' => Duration::from_secs(num),
                _ => return Err(format!("Invalid duration unit: {}", c)),
            };
            total = add_duration(total, part, &s)?;
        }

        // Handle case where string ends with a number (assume seconds)
        if !current_num.is_empty() {
            let num: u64 = current_num
                .parse()
                .map_err(|_| format!("Invalid number in duration: {}", current_num))?;
            total = add_duration(total, Duration::from_secs(num), &s)?;
        }

        Ok(total)
    }

    fn add_duration(total: Duration, part: Duration, s: &str) -> Result<Duration, String> {
        total
            .checked_add(part)
            .ok_or_else(|| format!("Duration overflow: {}", s))
    }

    pub fn format_duration(d: Duration) -> String {
        if d.subsec_nanos() != 0 {
            return format!("{}ms", d.as_millis());
        }

        let secs = d.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        let mut result = String::new();
        if hours > 0 {
            result.push_str(&format!("{}h", hours));
        }
        if mins > 0 {
            result.push_str(&format!("{}m", mins));
        }
        if secs > 0 || result.is_empty() {
            result.push_str(&format!("{}s", secs));
        }
        result
    }
}
