//! Discovery table: the text catalogue of devices and operations.
//!
//! ```text
//! 3
//! #1:CONTROL:GET_VERSION:GET_DISCOVERY_TABLE:...:
//! #2:MATH:ADD:SUBTRACT::
//! EOC
//! ```
//!
//! The first line is the padded row width. Operation position in a row is
//! the operation id. Rows are padded with empty fields so they render as
//! a fixed-size matrix.

use std::fmt::Write as _;

use crate::error::{Error, Result};

/// End-of-catalogue marker.
pub const END_OF_CATALOGUE: &str = "EOC";

/// The marker as a whole line. Tags may contain the marker text, rows
/// always start with `#`, so only the terminator line matches.
pub const END_OF_CATALOGUE_LINE: &str = "\nEOC\n";

/// Derive the wire tag of a device from its class name.
///
/// An underscore goes before every upper-case letter except the first,
/// then everything is upper-cased: `DevMem` becomes `DEV_MEM`.
pub fn device_tag(name: &str) -> String {
    let mut tag = String::with_capacity(name.len() + 4);
    for (idx, c) in name.chars().enumerate() {
        if idx > 0 && c.is_ascii_uppercase() {
            tag.push('_');
        }
        tag.push(c.to_ascii_uppercase());
    }
    tag
}

/// One catalogue row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub id: u16,
    pub name: String,
    pub operations: Vec<String>,
}

impl DeviceEntry {
    pub fn new(id: u16, name: impl Into<String>, operations: Vec<String>) -> Self {
        Self {
            id,
            name: name.into(),
            operations,
        }
    }

    /// Parse a `#<id>:<NAME>:<op0>:...:` line. Empty fields are padding.
    pub fn parse_line(line: &str) -> Result<Self> {
        let line = line.trim();
        let body = line
            .strip_prefix('#')
            .ok_or_else(|| Error::MalformedDiscovery(format!("missing '#' in {:?}", line)))?;

        let mut tokens = body.split(':');
        let id = tokens
            .next()
            .and_then(|tok| tok.trim().parse::<u16>().ok())
            .ok_or_else(|| Error::MalformedDiscovery(format!("invalid device id in {:?}", line)))?;
        let name = tokens
            .next()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::MalformedDiscovery(format!("missing device name in {:?}", line)))?;

        let operations = tokens
            .map(str::trim)
            .filter(|op| !op.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self::new(id, name, operations))
    }

    /// Operation id of `operation`, `None` if the device does not have it.
    pub fn get_op_ref(&self, operation: &str) -> Option<u16> {
        self.operations
            .iter()
            .position(|op| op == operation)
            .and_then(|idx| u16::try_from(idx).ok())
    }

    /// Render the row padded to `width` operation fields.
    pub fn render_line(&self, width: usize) -> String {
        let mut line = format!("#{}:{}:", self.id, self.name);
        for op in &self.operations {
            line.push_str(op);
            line.push(':');
        }
        for _ in self.operations.len()..width {
            line.push(':');
        }
        line
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiscoveryTable {
    max_op_num: usize,
    devices: Vec<DeviceEntry>,
}

impl DiscoveryTable {
    pub fn new(devices: Vec<DeviceEntry>) -> Self {
        let max_op_num = devices
            .iter()
            .map(|dev| dev.operations.len())
            .max()
            .unwrap_or(0);
        Self {
            max_op_num,
            devices,
        }
    }

    /// Parse the text sent by the server up to and including `EOC`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut max_op_num = None;
        let mut devices = Vec::new();
        let mut terminated = false;

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if line == END_OF_CATALOGUE {
                terminated = true;
                break;
            }
            if line.starts_with('#') {
                devices.push(DeviceEntry::parse_line(line)?);
            } else if max_op_num.is_none() && devices.is_empty() {
                max_op_num = Some(line.parse::<usize>().map_err(|_| {
                    Error::MalformedDiscovery(format!("invalid row width {:?}", line))
                })?);
            } else {
                return Err(Error::MalformedDiscovery(format!(
                    "unexpected line {:?}",
                    line
                )));
            }
        }

        if !terminated {
            return Err(Error::MalformedDiscovery(
                "missing end-of-catalogue marker".to_string(),
            ));
        }

        let mut table = Self::new(devices);
        if let Some(width) = max_op_num {
            table.max_op_num = table.max_op_num.max(width);
        }
        Ok(table)
    }

    /// Text form, terminated by `EOC\n`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.max_op_num);
        for dev in &self.devices {
            let _ = writeln!(out, "{}", dev.render_line(self.max_op_num));
        }
        out.push_str(END_OF_CATALOGUE);
        out.push('\n');
        out
    }

    /// Look a device up by wire tag or by class name.
    pub fn device(&self, name: &str) -> Option<&DeviceEntry> {
        let tag = device_tag(name);
        self.devices
            .iter()
            .find(|dev| dev.name == name)
            .or_else(|| self.devices.iter().find(|dev| dev.name == tag))
    }

    pub fn device_by_id(&self, id: u16) -> Option<&DeviceEntry> {
        self.devices.iter().find(|dev| dev.id == id)
    }

    pub fn devices(&self) -> &[DeviceEntry] {
        &self.devices
    }

    pub fn max_op_num(&self) -> usize {
        self.max_op_num
    }

    pub fn set_min_width(&mut self, width: usize) {
        self.max_op_num = self.max_op_num.max(width);
    }
}
