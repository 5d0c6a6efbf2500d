//! Built-in control device (id 1).

use super::{Arguments, Reply};
use crate::devgen::OperationDescriptor;
use crate::error::{Error, Result};
use crate::protocol::codec::{Format, Scalar};
use crate::protocol::{control_ops, PING_EVENT, SERVER_CHANNEL};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Server state the control operations read and act on.
pub trait ControlContext {
    fn discovery_text(&self) -> &str;

    /// `UPTIME:<s>` then one line per listener, ended by `EOKS`
    fn stats_text(&self) -> String;

    /// Device health lines, ended by `EODS`
    fn dev_status_text(&self) -> String;

    /// One line per session, ended by `EORS`
    fn sessions_text(&self) -> String;

    fn subscribe(&self, session_id: u64, channel: u32);

    /// Send `payload` to every session subscribed to `channel`.
    fn broadcast(&self, channel: u32, payload: &[u8]);
}

/// Broadcast event payload: `(channel, event)` as big-endian u32.
pub fn event_payload(channel: u32, event: u32) -> Result<Vec<u8>> {
    let format: Format = "II".parse()?;
    format.pack(&[Scalar::U32(channel), Scalar::U32(event)])
}

pub fn execute(
    op: &OperationDescriptor,
    args: &Arguments,
    session_id: u64,
    ctx: &dyn ControlContext,
) -> Result<Reply> {
    let reply = match op.id {
        control_ops::GET_VERSION => Reply::string(VERSION),
        control_ops::GET_DISCOVERY_TABLE => Reply::string(ctx.discovery_text()),
        control_ops::GET_STATS => Reply::string(ctx.stats_text()),
        control_ops::GET_DEV_STATUS => Reply::string(ctx.dev_status_text()),
        control_ops::GET_RUNNING_SESSIONS => Reply::string(ctx.sessions_text()),
        control_ops::SUBSCRIBE_BROADCAST => {
            let channel = args.get::<u32>("channel")?;
            ctx.subscribe(session_id, channel);
            log::info!("session {} subscribed to channel {}", session_id, channel);
            Reply::None
        }
        control_ops::BROADCAST_PING => {
            ctx.broadcast(SERVER_CHANNEL, &event_payload(SERVER_CHANNEL, PING_EVENT)?);
            Reply::None
        }
        _ => {
            return Err(Error::UnknownCommand {
                device_id: crate::protocol::CONTROL_DEVICE_ID,
                operation_id: op.id,
            })
        }
    };
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Value;
    use crate::devgen::table::control_descriptor;
    use std::sync::Mutex;

    #[derive(Default)]
    struct State {
        subscriptions: Mutex<Vec<(u64, u32)>>,
        broadcasts: Mutex<Vec<(u32, Vec<u8>)>>,
    }

    impl ControlContext for State {
        fn discovery_text(&self) -> &str {
            "1\n#1:CONTROL:GET_VERSION:\nEOC\n"
        }

        fn stats_text(&self) -> String {
            "UPTIME:1\nEOKS".to_string()
        }

        fn dev_status_text(&self) -> String {
            "1:CONTROL:OK\nEODS".to_string()
        }

        fn sessions_text(&self) -> String {
            "EORS".to_string()
        }

        fn subscribe(&self, session_id: u64, channel: u32) {
            self.subscriptions.lock().unwrap().push((session_id, channel));
        }

        fn broadcast(&self, channel: u32, payload: &[u8]) {
            self.broadcasts.lock().unwrap().push((channel, payload.to_vec()));
        }
    }

    #[test]
    fn test_control_operations() {
        let control = control_descriptor().unwrap();
        let state = State::default();
        let run = |name: &str, args: &Arguments| {
            execute(control.operation_by_name(name).unwrap(), args, 7, &state).unwrap()
        };
        let none = Arguments::new();

        assert_eq!(run("get_version", &none), Reply::string(VERSION));
        assert_eq!(run("get_stats", &none), Reply::string("UPTIME:1\nEOKS"));

        let mut args = Arguments::new();
        args.push("channel", Value::Scalar(Scalar::U32(0)));
        assert_eq!(run("subscribe_broadcast", &args), Reply::None);
        assert_eq!(*state.subscriptions.lock().unwrap(), vec![(7, 0)]);

        assert_eq!(run("broadcast_ping", &none), Reply::None);
        assert_eq!(
            *state.broadcasts.lock().unwrap(),
            vec![(0, vec![0, 0, 0, 0, 0, 0, 0, 0])]
        );
    }
}
