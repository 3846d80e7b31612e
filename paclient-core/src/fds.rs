//! Auxiliary file-descriptor passing over the control socket.
//!
//! The server hands the client shared-memory and log-buffer descriptors as
//! `SCM_RIGHTS` ancillary data alongside an ordinary record payload. This
//! wraps the handful of `sendmsg`/`recvmsg` calls the control worker needs,
//! plus the `socketpair` used to build each stream's private audio
//! endpoint.

use std::io::{IoSlice, IoSliceMut};
use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd, RawFd};

use nix::sys::socket::{
    self, recvmsg, sendmsg, ControlMessage, ControlMessageOwned, MsgFlags, SockFlag, SockType,
};

use crate::error::{ClientError, Result};

/// Maximum number of descriptors carried by any single record (the widest
/// case is a stream-connect reply: header fd + samples fd).
pub const MAX_FDS_PER_MESSAGE: usize = 2;

/// Create a connected pair of `SOCK_SEQPACKET` descriptors for a stream's
/// audio control endpoint (client keeps one end, the other is handed to
/// the server in the stream-connect request).
pub fn audio_socketpair() -> Result<(OwnedFd, OwnedFd)> {
    socket::socketpair(
        socket::AddressFamily::Unix,
        SockType::SeqPacket,
        None,
        SockFlag::SOCK_CLOEXEC,
    )
    .map_err(|errno| ClientError::Io(std::io::Error::from_raw_os_error(errno as i32)))
}

/// Send `payload` on `fd`, attaching `fds` as `SCM_RIGHTS` ancillary data.
pub fn send_with_fds(fd: impl AsFd, payload: &[u8], fds: &[RawFd]) -> Result<usize> {
    let iov = [IoSlice::new(payload)];
    let sent = if fds.is_empty() {
        sendmsg::<()>(fd.as_fd().as_raw_fd(), &iov, &[], MsgFlags::empty(), None)
    } else {
        let cmsgs = [ControlMessage::ScmRights(fds)];
        sendmsg::<()>(fd.as_fd().as_raw_fd(), &iov, &cmsgs, MsgFlags::empty(), None)
    }
    .map_err(|errno| ClientError::Io(std::io::Error::from_raw_os_error(errno as i32)))?;
    Ok(sent)
}

/// Receive into `buf`, returning the byte count and any descriptors
/// carried as `SCM_RIGHTS` ancillary data.
pub fn recv_with_fds(fd: impl AsFd, buf: &mut [u8]) -> Result<(usize, Vec<OwnedFd>)> {
    let mut iov = [IoSliceMut::new(buf)];
    let mut cmsg_space = nix::cmsg_space!([RawFd; MAX_FDS_PER_MESSAGE]);

    let msg = recvmsg::<()>(
        fd.as_fd().as_raw_fd(),
        &mut iov,
        Some(&mut cmsg_space),
        MsgFlags::empty(),
    )
    .map_err(|errno| ClientError::Io(std::io::Error::from_raw_os_error(errno as i32)))?;

    let mut received_fds = Vec::new();
    for cmsg in msg.cmsgs() {
        if let ControlMessageOwned::ScmRights(raw_fds) = cmsg {
            for raw in raw_fds {
                // SAFETY: the kernel just handed us ownership of this
                // descriptor via SCM_RIGHTS; it is not owned elsewhere.
                received_fds.push(unsafe { OwnedFd::from_raw_fd(raw) });
            }
        }
    }

    Ok((msg.bytes, received_fds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socketpair_roundtrips_a_descriptor() {
        let (client_end, server_end) = audio_socketpair().unwrap();
        let (carrier_a, carrier_b) = audio_socketpair().unwrap();

        send_with_fds(&client_end, b"hello", &[std::os::fd::AsRawFd::as_raw_fd(&carrier_a)]).unwrap();
        drop(carrier_a);

        let mut buf = [0u8; 16];
        let (n, fds) = recv_with_fds(&server_end, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(fds.len(), 1);
        drop(carrier_b);
    }

    #[test]
    fn send_without_fds_carries_no_ancillary_data() {
        let (a, b) = audio_socketpair().unwrap();
        send_with_fds(&a, b"ping", &[]).unwrap();
        let mut buf = [0u8; 16];
        let (n, fds) = recv_with_fds(&b, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert!(fds.is_empty());
    }
}
