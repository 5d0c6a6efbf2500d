//! Device registry of a running server.

use std::fmt::Write as _;
use std::sync::{Mutex, MutexGuard};

use super::Device;
use crate::devgen::annotations::DEFAULT_NAMESPACE;
use crate::devgen::{layout, parse_source, DeviceDescriptor, DeviceTable, GenError, OperationLayout};
use crate::error::{Error, Result};
use crate::protocol::CONTROL_DEVICE_ID;

/// A device with its parsed descriptor and precomputed layouts.
pub struct RegisteredDevice {
    descriptor: DeviceDescriptor,
    layouts: Vec<OperationLayout>,
    device: Option<Mutex<Box<dyn Device>>>,
}

impl RegisteredDevice {
    fn new(descriptor: DeviceDescriptor, device: Option<Box<dyn Device>>) -> Self {
        let layouts = descriptor
            .operations
            .iter()
            .map(|op| layout(&op.arguments))
            .collect();
        Self {
            descriptor,
            layouts,
            device: device.map(Mutex::new),
        }
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn layout(&self, operation_id: u16) -> Option<&OperationLayout> {
        self.layouts.get(operation_id as usize)
    }

    /// Exclusive access to the device state; `None` for the control device.
    pub fn lock(&self) -> Option<MutexGuard<'_, Box<dyn Device>>> {
        // A panicking operation must not take the device down for every session
        self.device
            .as_ref()
            .map(|m| m.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    pub fn is_failed(&self) -> bool {
        self.lock().map(|dev| dev.is_failed()).unwrap_or(false)
    }
}

pub struct DeviceManager {
    table: DeviceTable,
    devices: Vec<RegisteredDevice>,
    discovery: String,
    catalogue: String,
}

impl DeviceManager {
    /// Parse every device declaration and number the devices from 2 in
    /// the given order.
    pub fn new(devices: Vec<Box<dyn Device>>) -> Result<Self> {
        let mut descriptors = Vec::with_capacity(devices.len());
        for (idx, dev) in devices.iter().enumerate() {
            let origin = format!("<device {}>", idx);
            let mut parsed = parse_source(dev.declaration(), &origin, DEFAULT_NAMESPACE)?;
            if parsed.len() != 1 {
                return Err(Error::Declaration(GenError::Parse {
                    origin,
                    line: 1,
                    reason: format!("expected one class declaration, found {}", parsed.len()),
                }));
            }
            descriptors.push(parsed.remove(0));
        }

        let table = DeviceTable::build(descriptors)?;
        let discovery = table.discovery().render();
        let catalogue = table.catalogue().to_json()?;

        let mut registered = Vec::with_capacity(table.devices().len());
        registered.push(RegisteredDevice::new(table.devices()[0].clone(), None));
        for (descriptor, device) in table.user_devices().iter().zip(devices) {
            log::info!(
                "device #{} {} with {} operations",
                descriptor.id,
                descriptor.tag,
                descriptor.operations.len()
            );
            registered.push(RegisteredDevice::new(descriptor.clone(), Some(device)));
        }

        Ok(Self {
            table,
            devices: registered,
            discovery,
            catalogue,
        })
    }

    pub fn table(&self) -> &DeviceTable {
        &self.table
    }

    pub fn device(&self, id: u16) -> Option<&RegisteredDevice> {
        self.devices.iter().find(|d| d.descriptor.id == id)
    }

    pub fn control(&self) -> Option<&RegisteredDevice> {
        self.device(CONTROL_DEVICE_ID)
    }

    pub fn devices(&self) -> &[RegisteredDevice] {
        &self.devices
    }

    /// Discovery text, terminated by `EOC`.
    pub fn discovery_text(&self) -> &str {
        &self.discovery
    }

    pub fn catalogue_json(&self) -> &str {
        &self.catalogue
    }

    /// `<id>:<TAG>:<OK|FAIL>` per device, ended by `EODS`.
    pub fn status_text(&self) -> String {
        let mut out = String::new();
        for dev in &self.devices {
            let state = if dev.is_failed() { "FAIL" } else { "OK" };
            let _ = writeln!(out, "{}:{}:{}", dev.descriptor.id, dev.descriptor.tag, state);
        }
        out.push_str("EODS");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Arguments, Reply};
    use crate::devgen::OperationDescriptor;

    struct Probe {
        failed: bool,
    }

    impl Device for Probe {
        fn declaration(&self) -> &str {
            "class Probe {
  public:
    uint32_t read(uint32_t addr);
    #pragma devlink is_failed
    bool is_failed();
};"
        }

        fn execute(&mut self, _op: &OperationDescriptor, args: &Arguments) -> Result<Reply> {
            Ok(Reply::scalar(args.get::<u32>("addr")?))
        }

        fn is_failed(&self) -> bool {
            self.failed
        }
    }

    struct Broken;

    impl Device for Broken {
        fn declaration(&self) -> &str {
            "class Broken { public: void f(long x); };"
        }

        fn execute(&mut self, _op: &OperationDescriptor, _args: &Arguments) -> Result<Reply> {
            Ok(Reply::None)
        }
    }

    #[test]
    fn test_registry() {
        let manager = DeviceManager::new(vec![Box::new(Probe { failed: false }), Box::new(Probe { failed: true })]);
        // Same class twice
        assert!(matches!(manager, Err(Error::Declaration(GenError::DuplicateDevice(_)))));

        let manager = DeviceManager::new(vec![Box::new(Probe { failed: true })]).unwrap();
        assert!(manager.control().is_some());
        let probe = manager.device(2).unwrap();
        assert_eq!(probe.descriptor().tag, "PROBE");
        assert_eq!(probe.layout(0).unwrap().payload_size, 4);
        assert!(manager.discovery_text().contains("#2:PROBE:READ:"));
        assert!(manager.discovery_text().ends_with("EOC\n"));
        assert_eq!(
            manager.status_text(),
            "1:CONTROL:OK\n2:PROBE:FAIL\nEODS"
        );
    }

    #[test]
    fn test_rejected_declaration() {
        let err = DeviceManager::new(vec![Box::new(Broken)]).err().unwrap();
        assert!(err.to_string().contains("Broken::f"));
    }
}
