//! Printer Device Model

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What kind of tickets a printer receives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterRole {
    /// Customer receipt at the till
    Receipt,
    /// Kitchen ticket
    Kitchen,
    /// Order-runner copy
    Order,
}

impl std::fmt::Display for PrinterRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Receipt => f.write_str("receipt"),
            Self::Kitchen => f.write_str("kitchen"),
            Self::Order => f.write_str("order"),
        }
    }
}

/// Paper width class
///
/// Governs the character-per-line budget used by the job compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaperWidth {
    #[serde(rename = "58mm")]
    Mm58,
    #[default]
    #[serde(rename = "80mm")]
    Mm80,
}

impl PaperWidth {
    /// Characters per line in the printer's default font
    ///
    /// - 58mm paper: 32 characters
    /// - 80mm paper: 48 characters
    pub const fn chars_per_line(self) -> usize {
        match self {
            Self::Mm58 => 32,
            Self::Mm80 => 48,
        }
    }
}

impl std::fmt::Display for PaperWidth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mm58 => f.write_str("58mm"),
            Self::Mm80 => f.write_str("80mm"),
        }
    }
}

/// Text encoding expected by the printer firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Charset {
    /// Text bytes are sent verbatim
    #[default]
    Utf8,
    /// Chinese printers: text is transcoded to GBK
    Gbk,
}

/// How the application reaches a printer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PrinterTransport {
    /// WebSocket to an ESP32 bridge with the printer wired to it.
    ///
    /// Missing host/port fall back to the bridge defaults in `PrinterConfig`.
    Bridge {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
    },
    /// Direct Bluetooth LE link to the printer
    Wireless {
        device_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        device_name: Option<String>,
    },
}

impl PrinterTransport {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bridge { .. } => "bridge",
            Self::Wireless { .. } => "wireless",
        }
    }
}

/// Configured printer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterDevice {
    pub id: String,
    pub name: String,
    /// One device may serve several roles
    pub roles: Vec<PrinterRole>,
    pub transport: PrinterTransport,
    #[serde(default)]
    pub paper_width: PaperWidth,
    #[serde(default = "default_copies")]
    pub copies: u32,
    /// Inactive devices are skipped by the dispatcher and never connected
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub charset: Charset,
}

fn default_copies() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceValidationError {
    #[error("Device id is empty")]
    EmptyId,

    #[error("Device {0} has no roles")]
    NoRoles(String),

    #[error("Device {0} has copy count 0")]
    ZeroCopies(String),

    #[error("Device {0} has an empty wireless device id")]
    EmptyWirelessId(String),
}

impl PrinterDevice {
    /// Create an active single-copy device with a fresh id
    pub fn new(name: impl Into<String>, roles: Vec<PrinterRole>, transport: PrinterTransport) -> Self {
        Self {
            id: crate::util::new_device_id(),
            name: name.into(),
            roles,
            transport,
            paper_width: PaperWidth::default(),
            copies: 1,
            active: true,
            charset: Charset::default(),
        }
    }

    pub fn with_paper_width(mut self, paper_width: PaperWidth) -> Self {
        self.paper_width = paper_width;
        self
    }

    pub fn with_copies(mut self, copies: u32) -> Self {
        self.copies = copies;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    /// Whether this device should receive tickets for `role`
    pub fn serves(&self, role: PrinterRole) -> bool {
        self.roles.contains(&role)
    }

    /// Copy count, never below one
    pub fn effective_copies(&self) -> u32 {
        self.copies.max(1)
    }

    /// Reject records the configuration UI must not save
    ///
    /// A bridge without a host is allowed here: it may be resolved from
    /// the bridge defaults at connect time.
    pub fn validate(&self) -> Result<(), DeviceValidationError> {
        if self.id.trim().is_empty() {
            return Err(DeviceValidationError::EmptyId);
        }
        if self.roles.is_empty() {
            return Err(DeviceValidationError::NoRoles(self.id.clone()));
        }
        if self.copies == 0 {
            return Err(DeviceValidationError::ZeroCopies(self.id.clone()));
        }
        if let PrinterTransport::Wireless { device_id, .. } = &self.transport
            && device_id.trim().is_empty()
        {
            return Err(DeviceValidationError::EmptyWirelessId(self.id.clone()));
        }
        Ok(())
    }
}
