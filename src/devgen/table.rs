//! Device/operation table builder.
//!
//! Numbering is a pure function of the ordered device list: the control
//! device is always 1, the others follow from 2 in input order.

use std::collections::HashSet;

use super::annotations::{extract_pragmas, DEFAULT_NAMESPACE};
use super::descriptor::{describe_class, DeviceDescriptor, IoType};
use super::error::{GenError, GenResult};
use super::header::parse_header;
use crate::protocol::discovery::{DeviceEntry, DiscoveryTable};
use crate::protocol::signature::{ArgSignature, Catalogue, DeviceSignature, FunctionSignature};
use crate::protocol::{CONTROL_DEVICE_ID, FIRST_DEVICE_ID};

/// Declaration of the built-in control device.
pub const CONTROL_DECLARATION: &str = "class Control {
  public:
    const char* get_version();
    const char* get_discovery_table();
    const char* get_stats();
    const char* get_dev_status();
    const char* get_running_sessions();
    void subscribe_broadcast(uint32_t channel);
    void broadcast_ping();
};
";

pub fn control_descriptor() -> GenResult<DeviceDescriptor> {
    let classes = parse_header(CONTROL_DECLARATION, "<control>")?;
    let pragmas = extract_pragmas(CONTROL_DECLARATION, DEFAULT_NAMESPACE);
    let class = classes.first().ok_or_else(|| GenError::Parse {
        origin: "<control>".to_string(),
        line: 1,
        reason: "missing control class".to_string(),
    })?;
    let mut control = describe_class(class, &pragmas)?;
    control.id = CONTROL_DEVICE_ID;
    Ok(control)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTable {
    /// Control device first, then the generated devices in id order
    devices: Vec<DeviceDescriptor>,
}

impl DeviceTable {
    pub fn build(mut devices: Vec<DeviceDescriptor>) -> GenResult<Self> {
        let control = control_descriptor()?;

        let mut names = HashSet::new();
        names.insert(control.tag.clone());
        for (idx, dev) in devices.iter_mut().enumerate() {
            if !names.insert(dev.tag.clone()) {
                return Err(GenError::DuplicateDevice(dev.name.clone()));
            }
            dev.id = u16::try_from(idx)
                .ok()
                .and_then(|idx| idx.checked_add(FIRST_DEVICE_ID))
                .ok_or_else(|| GenError::Config("too many devices".to_string()))?;
        }

        let mut all = Vec::with_capacity(devices.len() + 1);
        all.push(control);
        all.extend(devices);
        Ok(Self { devices: all })
    }

    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    /// Generated devices only.
    pub fn user_devices(&self) -> &[DeviceDescriptor] {
        &self.devices[1..]
    }

    pub fn device(&self, id: u16) -> Option<&DeviceDescriptor> {
        self.devices.iter().find(|d| d.id == id)
    }

    /// Row width of the padded name matrix.
    pub fn max_op_num(&self) -> usize {
        self.devices
            .iter()
            .map(|d| d.operations.len())
            .max()
            .unwrap_or(0)
    }

    /// Operation tags per device, padded with empty names.
    pub fn name_matrix(&self) -> Vec<(u16, String, Vec<String>)> {
        let width = self.max_op_num();
        self.devices
            .iter()
            .map(|d| {
                let mut ops: Vec<String> = d.operations.iter().map(|op| op.tag.clone()).collect();
                ops.resize(width, String::new());
                (d.id, d.tag.clone(), ops)
            })
            .collect()
    }

    pub fn discovery(&self) -> DiscoveryTable {
        let entries = self
            .devices
            .iter()
            .map(|d| {
                DeviceEntry::new(
                    d.id,
                    d.tag.clone(),
                    d.operations.iter().map(|op| op.tag.clone()).collect(),
                )
            })
            .collect();
        DiscoveryTable::new(entries)
    }

    pub fn catalogue(&self) -> Catalogue {
        let devices = self
            .devices
            .iter()
            .map(|d| DeviceSignature {
                class: d.name.clone(),
                tag: d.tag.clone(),
                id: d.id,
                functions: d
                    .operations
                    .iter()
                    .map(|op| FunctionSignature {
                        name: op.name.clone(),
                        id: op.id,
                        ret_type: op.return_type.clone(),
                        io_type: op.io_type.to_string(),
                        returns: op.returns.shape(op.io_type == IoType::ReadArray),
                        args: op
                            .arguments
                            .iter()
                            .map(|a| ArgSignature {
                                name: a.name.clone(),
                                ty: a.ty.clone(),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();
        Catalogue::new(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devgen::parse_source;

    fn devices() -> Vec<DeviceDescriptor> {
        parse_source(
            "class Math { public: uint32_t add(uint32_t a, uint32_t b); uint32_t sub(uint32_t a, uint32_t b); };
             class DevMem { public: uint32_t read(uint32_t off); };",
            "t.hpp",
            DEFAULT_NAMESPACE,
        )
        .unwrap()
    }

    #[test]
    fn test_control_device() {
        let control = control_descriptor().unwrap();
        assert_eq!(control.id, 1);
        assert_eq!(control.tag, "CONTROL");
        let names: Vec<&str> = control.operations.iter().map(|op| op.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "get_version",
                "get_discovery_table",
                "get_stats",
                "get_dev_status",
                "get_running_sessions",
                "subscribe_broadcast",
                "broadcast_ping"
            ]
        );
    }

    #[test]
    fn test_ids_follow_input_order() {
        let table = DeviceTable::build(devices()).unwrap();
        let ids: Vec<(u16, &str)> = table.devices().iter().map(|d| (d.id, d.tag.as_str())).collect();
        assert_eq!(ids, vec![(1, "CONTROL"), (2, "MATH"), (3, "DEV_MEM")]);
    }

    #[test]
    fn test_padded_discovery() {
        let table = DeviceTable::build(devices()).unwrap();
        assert_eq!(table.max_op_num(), 7);
        let text = table.discovery().render();
        assert!(text.starts_with("7\n#1:CONTROL:GET_VERSION:"));
        assert!(text.contains("\n#2:MATH:ADD:SUB::::::\n"));
        assert!(text.contains("\n#3:DEV_MEM:READ:::::::\n"));

        let matrix = table.name_matrix();
        assert!(matrix.iter().all(|(_, _, ops)| ops.len() == 7));

        let parsed = DiscoveryTable::parse(&text).unwrap();
        let math = parsed.device("Math").unwrap();
        assert_eq!(math.get_op_ref("SUB"), Some(1));
    }

    #[test]
    fn test_duplicate_device() {
        let mut devs = devices();
        devs.push(devs[0].clone());
        assert!(matches!(
            DeviceTable::build(devs),
            Err(GenError::DuplicateDevice(name)) if name == "Math"
        ));
    }

    #[test]
    fn test_catalogue() {
        let table = DeviceTable::build(devices()).unwrap();
        let cat = table.catalogue();
        let add = cat.find("Math", "add").unwrap();
        assert_eq!(add.io_type, "READ");
        assert_eq!(add.args.len(), 2);
        assert_eq!(cat.find("CONTROL", "get_version").unwrap().io_type, "READ_CSTR");
    }
}
