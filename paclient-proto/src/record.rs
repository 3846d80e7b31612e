//! Tag ids and shared enums for the control-socket wire records.

/// Which way audio flows on a stream.
///
/// `Unified` covers a full-duplex stream where the audio worker exposes
/// both a read base and a write base to the user callback; it is distinct
/// from the half-duplex `Playback`/`Capture` pair and from the
/// server-mixed `LoopbackCapture` device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    Playback = 0,
    Capture = 1,
    LoopbackCapture = 2,
    Unified = 3,
}

impl Direction {
    #[must_use]
    pub const fn from_wire(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Playback),
            1 => Some(Self::Capture),
            2 => Some(Self::LoopbackCapture),
            3 => Some(Self::Unified),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_readable(self) -> bool {
        matches!(self, Self::Capture | Self::LoopbackCapture | Self::Unified)
    }

    #[must_use]
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::Playback | Self::Unified)
    }
}

/// Kind of stream, as understood by the server's routing/mixing graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StreamType {
    Normal = 0,
    Hotword = 1,
    FlexibleLoopback = 2,
}

/// Identifies which logical application category a stream belongs to, used
/// by volume grouping and by `active-stream counts` notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ClientType {
    Media = 0,
    Communication = 1,
    Assistant = 2,
    System = 3,
}

/// PCM sample layout carried in the connect request's audio format field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SampleFormat {
    S16Le = 0,
    S32Le = 1,
    F32Le = 2,
}

impl SampleFormat {
    #[must_use]
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::S16Le => 2,
            Self::S32Le | Self::F32Le => 4,
        }
    }
}

/// Sentinel meaning "let the server pick a device" in the target-device
/// field of a stream-connect request.
pub const NO_DEVICE: u32 = u32::MAX;

/// A stream is flagged with any combination of these at creation time.
pub mod stream_flags {
    /// Accept callback deliveries larger than the configured threshold,
    /// up to the full buffer, instead of being capped at the threshold.
    pub const BULK_AUDIO_OK: u32 = 1 << 0;
    /// Start the stream already muted.
    pub const START_MUTED: u32 = 1 << 1;
    /// Do not auto-resume after a server-side device change.
    pub const NO_AUTO_RESUME: u32 = 1 << 2;
}

/// Echo-cancellation / noise-suppression toggles carried as an opaque
/// bitmask; the server owns their semantics, the client only forwards it.
pub mod effects_flags {
    pub const ECHO_CANCEL: u32 = 1 << 0;
    pub const NOISE_SUPPRESSION: u32 = 1 << 1;
    pub const AUTOMATIC_GAIN_CONTROL: u32 = 1 << 2;
}

/// Record tag carried as the first byte after the length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordTag {
    // Client -> server
    Stop = 0x01,
    AddStream = 0x02,
    RemoveStream = 0x03,
    SetStreamVolume = 0x04,
    SetAecRef = 0x05,
    ServerConnect = 0x06,
    ServerConnectAsync = 0x07,
    RegisterNotification = 0x08,
    DeregisterNotification = 0x09,

    // Server -> client
    Connected = 0x80,
    StreamConnected = 0x81,
    DebugInfoReady = 0x82,
    AtlogFdReady = 0x83,
    GetHotwordModelsReady = 0x84,
    RequestFloopReady = 0x85,
    Notification = 0x86,
}

impl RecordTag {
    #[must_use]
    pub const fn from_wire(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(Self::Stop),
            0x02 => Some(Self::AddStream),
            0x03 => Some(Self::RemoveStream),
            0x04 => Some(Self::SetStreamVolume),
            0x05 => Some(Self::SetAecRef),
            0x06 => Some(Self::ServerConnect),
            0x07 => Some(Self::ServerConnectAsync),
            0x08 => Some(Self::RegisterNotification),
            0x09 => Some(Self::DeregisterNotification),
            0x80 => Some(Self::Connected),
            0x81 => Some(Self::StreamConnected),
            0x82 => Some(Self::DebugInfoReady),
            0x83 => Some(Self::AtlogFdReady),
            0x84 => Some(Self::GetHotwordModelsReady),
            0x85 => Some(Self::RequestFloopReady),
            0x86 => Some(Self::Notification),
            _ => None,
        }
    }
}

/// The ten notification kinds a client may subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NotificationKind {
    OutputVolume = 0,
    OutputMute = 1,
    CaptureGain = 2,
    CaptureMute = 3,
    Nodes = 4,
    ActiveNode = 5,
    OutputNodeVolume = 6,
    NodeSwap = 7,
    InputNodeGain = 8,
    ActiveStreamCounts = 9,
}

impl NotificationKind {
    pub const ALL: [Self; 10] = [
        Self::OutputVolume,
        Self::OutputMute,
        Self::CaptureGain,
        Self::CaptureMute,
        Self::Nodes,
        Self::ActiveNode,
        Self::OutputNodeVolume,
        Self::NodeSwap,
        Self::InputNodeGain,
        Self::ActiveStreamCounts,
    ];

    #[must_use]
    pub const fn from_wire(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::OutputVolume),
            1 => Some(Self::OutputMute),
            2 => Some(Self::CaptureGain),
            3 => Some(Self::CaptureMute),
            4 => Some(Self::Nodes),
            5 => Some(Self::ActiveNode),
            6 => Some(Self::OutputNodeVolume),
            7 => Some(Self::NodeSwap),
            8 => Some(Self::InputNodeGain),
            9 => Some(Self::ActiveStreamCounts),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_readable_writable_split() {
        assert!(Direction::Capture.is_readable());
        assert!(!Direction::Capture.is_writable());
        assert!(Direction::Playback.is_writable());
        assert!(!Direction::Playback.is_readable());
        assert!(Direction::Unified.is_readable());
        assert!(Direction::Unified.is_writable());
    }

    #[test]
    fn record_tag_wire_round_trip() {
        for tag in [RecordTag::Stop, RecordTag::Connected, RecordTag::Notification] {
            let byte = tag as u8;
            assert_eq!(RecordTag::from_wire(byte), Some(tag));
        }
    }

    #[test]
    fn notification_kind_all_covers_ten() {
        assert_eq!(NotificationKind::ALL.len(), 10);
        for kind in NotificationKind::ALL {
            assert_eq!(NotificationKind::from_wire(kind as u8), Some(kind));
        }
    }
}
