//! Notification registration and event records.
//!
//! Each of the ten [`NotificationKind`]s is subscribed to independently:
//! the client sends a register/deregister record naming the kind, and
//! thereafter the server pushes one event record per state change of that
//! kind. Event payloads are a single `u32`/`f32` value plus, for
//! node-identifying kinds, a node index -- wide enough for every kind
//! without a per-kind wire shape.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::record::NotificationKind;

/// Sent as the payload of a `RegisterNotification` / `DeregisterNotification` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationRegistration {
    pub kind: NotificationKind,
}

impl NotificationRegistration {
    #[must_use]
    pub fn encode(&self) -> Bytes {
        Bytes::copy_from_slice(&[self.kind as u8])
    }

    #[must_use]
    pub fn decode(payload: &Bytes) -> Option<Self> {
        let byte = *payload.first()?;
        Some(Self {
            kind: NotificationKind::from_wire(byte)?,
        })
    }
}

/// A pushed notification event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    /// Node index the event concerns, for node-identifying kinds; zero
    /// for kinds with no associated node (e.g. `ActiveStreamCounts`).
    pub node_index: u32,
    /// Kind-specific payload: a volume/gain scalar, a mute flag as 0.0 /
    /// 1.0, or a stream count, depending on `kind`.
    pub value: f32,
}

impl NotificationEvent {
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(9);
        out.put_u8(self.kind as u8);
        out.put_u32_le(self.node_index);
        out.put_u32_le(self.value.to_bits());
        out.freeze()
    }

    #[must_use]
    pub fn decode(payload: &Bytes) -> Option<Self> {
        let mut buf = payload.clone();
        if buf.remaining() < 9 {
            return None;
        }
        let kind = NotificationKind::from_wire(buf.get_u8())?;
        let node_index = buf.get_u32_le();
        let value = f32::from_bits(buf.get_u32_le());
        Some(Self {
            kind,
            node_index,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_round_trips() {
        let reg = NotificationRegistration {
            kind: NotificationKind::OutputMute,
        };
        let decoded = NotificationRegistration::decode(&reg.encode()).unwrap();
        assert_eq!(decoded.kind, NotificationKind::OutputMute);
    }

    #[test]
    fn event_round_trips() {
        let event = NotificationEvent {
            kind: NotificationKind::ActiveNode,
            node_index: 3,
            value: 0.75,
        };
        let decoded = NotificationEvent::decode(&event.encode()).unwrap();
        assert_eq!(decoded.kind, NotificationKind::ActiveNode);
        assert_eq!(decoded.node_index, 3);
        assert!((decoded.value - 0.75).abs() < f32::EPSILON);
    }
}
