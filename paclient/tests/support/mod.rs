//! A minimal audio-server double: enough of the wire protocol for the
//! control worker's handshake, stream-connect, and notification paths to
//! exercise real sockets and real shared memory end to end.

use std::ffi::CString;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;

use bytes::{Buf, Bytes};
use paclient_core::fds::{recv_with_fds, send_with_fds};
use paclient_core::shm::{MappedRegion, RingHeader};
use paclient_proto::audio_control::{AudioControlRecord, AUDIO_CONTROL_RECORD_SIZE};
use paclient_proto::codec::{encode_record, WireDecoder};
use paclient_proto::command::Command as WireCommand;
use paclient_proto::record::RecordTag;
use paclient_proto::stream_connect::StreamConnectedReply;

pub struct MockServer {
    listener: UnixListener,
    pub socket_path: PathBuf,
}

impl MockServer {
    /// Bind a fresh listening socket under `dir`, named like the real
    /// server's runtime-directory socket.
    pub fn bind(dir: &std::path::Path) -> Self {
        let socket_path = dir.join("audio-server.socket");
        let listener = UnixListener::bind(&socket_path).expect("bind mock server socket");
        Self { listener, socket_path }
    }

    /// Accept one connection and immediately send `Connected` with a
    /// freshly allocated server-state region as its aux fd.
    pub fn accept_and_handshake(&self, client_id: u32) -> ConnectedSession {
        let (stream, _addr) = self.listener.accept().expect("accept client connection");
        let state_fd = anon_shm_fd(64 * 1024);

        let mut payload = bytes::BytesMut::new();
        bytes::BufMut::put_u32_le(&mut payload, client_id);
        let record = encode_record(RecordTag::Connected as u8, &payload.freeze());
        send_with_fds(&stream, &record, &[state_fd.as_raw_fd()]).expect("send Connected");

        ConnectedSession {
            stream,
            decoder: WireDecoder::new(),
        }
    }
}

/// A connection from the server's point of view, after the handshake.
pub struct ConnectedSession {
    stream: UnixStream,
    decoder: WireDecoder,
}

impl ConnectedSession {
    /// Block for the next fully decoded command, returning it along with
    /// any aux fds that arrived on the same read.
    pub fn recv_command(&mut self) -> (WireCommand, Vec<OwnedFd>) {
        let mut buf = [0u8; 64 * 1024];
        loop {
            let (n, fds) = recv_with_fds(&self.stream, &mut buf).expect("recv from client");
            assert!(n > 0, "client closed the connection unexpectedly");

            let mut src = paclient_core::buffer::SegmentedBuffer::new();
            src.push(Bytes::copy_from_slice(&buf[..n]));

            if let Some(record) = self.decoder.decode(&mut src).expect("decode client record") {
                let command = WireCommand::decode(record.tag, &record.payload).expect("decode command");
                return (command, fds);
            }
        }
    }

    /// Reply to an `AddStream` with a `StreamConnected` reply backed by a
    /// freshly allocated header+samples region, and map that same region
    /// on our own side so the test can drive the ring cursors the way the
    /// real server would (the client maps `header_fd` over the combined
    /// header+samples span, per the stream-connect reply contract).
    pub fn reply_stream_connected(&self, stream_id: u64, samples_len: u64) -> StreamRegion {
        let total = RingHeader::SIZE + samples_len as usize;
        let header_fd = anon_shm_fd(total);
        let samples_fd = anon_shm_fd(samples_len as usize);
        let region = MappedRegion::map(header_fd.as_raw_fd(), total, true).expect("map stream region");

        let reply = StreamConnectedReply {
            stream_id,
            samples_region_len: samples_len,
        };
        let record = encode_record(RecordTag::StreamConnected as u8, &reply.encode());
        send_with_fds(&self.stream, &record, &[header_fd.as_raw_fd(), samples_fd.as_raw_fd()])
            .expect("send StreamConnected");

        StreamRegion {
            _header_fd: header_fd,
            _samples_fd: samples_fd,
            region,
        }
    }

    pub fn push_notification(&self, event: paclient_proto::notify::NotificationEvent) {
        let record = encode_record(RecordTag::Notification as u8, &event.encode());
        send_with_fds(&self.stream, &record, &[]).expect("push notification");
    }

    pub fn raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

/// The server's own mapping of a stream's header+samples region, kept
/// alive alongside the fds that back it.
pub struct StreamRegion {
    _header_fd: OwnedFd,
    _samples_fd: OwnedFd,
    pub region: MappedRegion,
}

/// Write one audio-control record on `audio_fd` (the server-side end of a
/// stream's audio socketpair, the aux fd carried on that stream's
/// `AddStream` command) and block for the worker's reply.
pub fn drive_audio_control(audio_fd: &OwnedFd, record: AudioControlRecord) -> AudioControlRecord {
    let encoded = record.encode();
    let n = nix::unistd::write(audio_fd.as_raw_fd(), &encoded).expect("write audio control record");
    assert_eq!(n, encoded.len(), "short write on audio control record");

    let mut buf = [0u8; AUDIO_CONTROL_RECORD_SIZE];
    let n = nix::unistd::read(audio_fd.as_raw_fd(), &mut buf).expect("read audio control reply");
    assert_eq!(n, buf.len(), "short read on audio control reply");
    AudioControlRecord::decode(&buf).expect("decode audio control reply")
}

/// An anonymous, unlinked shared-memory file of `len` bytes, as the aux fds
/// carried by the real server's records would be.
pub fn anon_shm_fd(len: usize) -> OwnedFd {
    use std::os::fd::FromRawFd;
    let name = CString::new("paclient-mock-server").unwrap();
    let fd = unsafe { libc::memfd_create(name.as_ptr(), 0) };
    assert!(fd >= 0, "memfd_create failed: {}", std::io::Error::last_os_error());
    let ret = unsafe { libc::ftruncate(fd, len as libc::off_t) };
    assert_eq!(ret, 0, "ftruncate failed: {}", std::io::Error::last_os_error());
    unsafe { OwnedFd::from_raw_fd(fd) }
}
