//! Session (C6): owns the TCP control socket, speaks `INIT`, `GET_DEVICES`,
//! `OPEN`, `CLOSE`, `CANCEL`, `EXIT`, and the interleaved `AUTHORIZE` dance.

use std::cell::{Cell, RefCell};
use std::io::Write as _;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, warn};

use crate::auth::{encode_password, split_resource};
use crate::credentials::{Credential, CredentialStore};
use crate::enums::RpcOp;
use crate::error::{Error, Status};
use crate::wire::{WireReader, WireWriter, PROTOCOL_VERSION};

/// Supplies credentials for a resource name the daemon demands during the
/// `AUTHORIZE` dance. [`CredentialStore`] is the stock implementation;
/// callers with an interactive prompt or a secrets manager can supply their
/// own.
pub trait PasswordProvider: Send + Sync {
    fn provide(&self, resource: &str) -> Option<Credential>;
}

impl PasswordProvider for CredentialStore {
    fn provide(&self, resource: &str) -> Option<Credential> {
        self.find_for_resource(resource).cloned()
    }
}

/// Reply payload shared by `GET_VALUE`/`SET_VALUE`/`SET_AUTO`, after the
/// authorize dance (if any) has been resolved.
#[derive(Debug, Clone)]
pub(crate) struct ControlOptionReply {
    pub info: crate::enums::WriteInfo,
    pub value_kind: crate::enums::ValueKind,
    pub value: Option<Vec<u8>>,
}

/// A device as listed by `GET_DEVICES`. Identity is `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub name: String,
    pub vendor: String,
    pub model: String,
    pub kind: String,
}

/// Owns the control socket for one `saned` connection.
///
/// Read/write access goes through `&TcpStream` (the standard library
/// implements `Read`/`Write` for it), so `Session` only needs a [`Mutex`] to
/// serialize the RPC sequence, never a `&mut self`. That mirrors the
/// teacher's synchronization story for its `Sane` handle, adapted from "the C
/// library must not be entered reentrantly" to "the wire protocol must not
/// be interleaved with itself".
pub struct Session {
    control: Mutex<TcpStream>,
    username: String,
    password_provider: RefCell<Option<Box<dyn PasswordProvider>>>,
    closed: std::sync::atomic::AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("username", &self.username).finish_non_exhaustive()
    }
}

impl Session {
    /// Connects to `addr`, clamping a non-zero sub-millisecond timeout up to
    /// 1 ms (and logging a warning), enables `TCP_NODELAY`, and performs
    /// `INIT` with the current OS username.
    pub fn connect(
        addr: impl ToSocketAddrs,
        timeout: Duration,
        password_provider: Option<Box<dyn PasswordProvider>>,
    ) -> Result<Self, Error> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::precondition("no socket address resolved"))?;
        let timeout = clamp_timeout(timeout);
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_nodelay(true)?;
        if !timeout.is_zero() {
            stream.set_read_timeout(Some(timeout))?;
            stream.set_write_timeout(Some(timeout))?;
        }

        let username = current_username();
        let session = Self {
            control: Mutex::new(stream),
            username,
            password_provider: RefCell::new(password_provider),
            closed: std::sync::atomic::AtomicBool::new(false),
        };
        session.init()?;
        Ok(session)
    }

    /// Installs (or clears) the credential source used by the `AUTHORIZE`
    /// dance from this point on; does not affect an authorization already
    /// in flight.
    pub fn set_password_provider(&self, provider: Option<Box<dyn PasswordProvider>>) {
        *self.password_provider.borrow_mut() = provider;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TcpStream> {
        self.control.lock().expect("poisoned control-socket mutex")
    }

    /// The daemon's address, used by the scan driver to open the data
    /// socket `START` hands back a port for.
    pub(crate) fn peer_addr(&self) -> Result<std::net::SocketAddr, Error> {
        Ok(self.lock().peer_addr()?)
    }

    fn init(&self) -> Result<(), Error> {
        let stream = self.lock();
        let mut writer = WireWriter::new(&*stream);
        writer.write_word(RpcOp::Init.to_word())?;
        writer.write_word(PROTOCOL_VERSION.to_word())?;
        writer.write_string(&self.username)?;
        writer.flush()?;

        let mut reader = WireReader::new(&*stream);
        let _status = reader.read_word()?;
        let _server_version = reader.read_word()?;
        debug!(username = %self.username, "INIT completed");
        Ok(())
    }

    /// `GET_DEVICES`: an array of device descriptors, `N+1` words long on
    /// the wire (the trailing word is the null-pointer terminator).
    pub fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, Error> {
        let stream = self.lock();
        let mut writer = WireWriter::new(&*stream);
        writer.write_word(RpcOp::GetDevices.to_word())?;
        writer.flush()?;

        let mut reader = WireReader::new(&*stream);
        Status::from_word(reader.read_word()?).into_result(RpcOp::GetDevices.name())?;

        let mut devices = Vec::new();
        while reader.read_pointer()? {
            devices.push(DeviceDescriptor {
                name: reader.read_string()?,
                vendor: reader.read_string()?,
                model: reader.read_string()?,
                kind: reader.read_string()?,
            });
        }
        Ok(devices)
    }

    /// `OPEN(name)`: returns the opaque device handle word, running the
    /// interleaved `AUTHORIZE` dance as many times as the daemon asks.
    pub fn open_device(&self, name: &str) -> Result<i32, Error> {
        let stream = self.lock();
        {
            let mut writer = WireWriter::new(&*stream);
            writer.write_word(RpcOp::Open.to_word())?;
            writer.write_string(name)?;
            writer.flush()?;
        }

        loop {
            let mut reader = WireReader::new(&*stream);
            let status = Status::from_word(reader.read_word()?);
            let handle = reader.read_word()?;
            let resource = reader.read_string()?;
            status.into_result(RpcOp::Open.name())?;
            if resource.is_empty() {
                return Ok(handle);
            }
            self.authorize(&stream, &resource)?;
        }
    }

    pub fn close_device(&self, handle: i32) -> Result<(), Error> {
        let stream = self.lock();
        let mut writer = WireWriter::new(&*stream);
        writer.write_word(RpcOp::Close.to_word())?;
        writer.write_word(handle)?;
        writer.flush()?;
        let mut reader = WireReader::new(&*stream);
        let _status = reader.read_word()?;
        Ok(())
    }

    pub fn cancel_device(&self, handle: i32) -> Result<(), Error> {
        let stream = self.lock();
        let mut writer = WireWriter::new(&*stream);
        writer.write_word(RpcOp::Cancel.to_word())?;
        writer.write_word(handle)?;
        writer.flush()?;
        let mut reader = WireReader::new(&*stream);
        Status::from_word(reader.read_word()?).into_result(RpcOp::Cancel.name())
    }

    /// `GET_OPTION_DESCRIPTORS(handle)`: one word `M`, then `M-1` descriptors.
    pub(crate) fn get_option_descriptors(
        &self,
        handle: i32,
    ) -> Result<Vec<crate::wire::WireOptionDescriptor>, Error> {
        let stream = self.lock();
        {
            let mut writer = WireWriter::new(&*stream);
            writer.write_word(RpcOp::GetOptionDescriptors.to_word())?;
            writer.write_word(handle)?;
            writer.flush()?;
        }
        let mut reader = WireReader::new(&*stream);
        let count = reader.read_word()?;
        if count <= 0 {
            return Ok(Vec::new());
        }
        let mut descriptors = Vec::with_capacity(count as usize - 1);
        for _ in 0..count - 1 {
            descriptors.push(reader.read_option_descriptor()?);
        }
        Ok(descriptors)
    }

    /// `CONTROL_OPTION`: shared by `GET_VALUE`/`SET_VALUE`/`SET_AUTO`. Runs
    /// the interleaved authorize dance transparently.
    pub(crate) fn control_option(
        &self,
        handle: i32,
        index: i32,
        action: crate::enums::ControlAction,
        value_kind: crate::enums::ValueKind,
        size: i32,
        element_count: i32,
        payload: &[u8],
    ) -> Result<ControlOptionReply, Error> {
        let stream = self.lock();
        {
            let mut writer = WireWriter::new(&*stream);
            writer.write_word(RpcOp::ControlOption.to_word())?;
            writer.write_word(handle)?;
            writer.write_word(index)?;
            writer.write_word(action.to_word())?;
            writer.write_word(value_kind.to_word())?;
            writer.write_word(size)?;
            writer.write_word(element_count)?;
            (&*stream).write_all(payload)?;
            writer.flush()?;
        }

        loop {
            let mut reader = WireReader::new(&*stream);
            let status = Status::from_word(reader.read_word()?);
            let info = crate::enums::WriteInfo::from_bits_retain(reader.read_word()? as u32);
            let reply_kind = crate::enums::ValueKind::from_word(reader.read_word()?);
            let value_size = reader.read_word()?;
            let has_value = reader.read_pointer()?;
            let value = if has_value {
                Some(reader.read_exact_bytes(value_size.max(0) as usize)?)
            } else {
                None
            };
            let resource = reader.read_string()?;
            status.into_result(RpcOp::ControlOption.name())?;
            if resource.is_empty() {
                return Ok(ControlOptionReply {
                    info,
                    value_kind: reply_kind,
                    value,
                });
            }
            self.authorize(&stream, &resource)?;
        }
    }

    /// `GET_PARAMETERS(handle)`.
    pub(crate) fn get_parameters(&self, handle: i32) -> Result<crate::wire::WireParameters, Error> {
        let stream = self.lock();
        {
            let mut writer = WireWriter::new(&*stream);
            writer.write_word(RpcOp::GetParameters.to_word())?;
            writer.write_word(handle)?;
            writer.flush()?;
        }
        let mut reader = WireReader::new(&*stream);
        Status::from_word(reader.read_word()?).into_result(RpcOp::GetParameters.name())?;
        reader.read_parameters()
    }

    /// `START(handle)`: returns the data-socket port and whether the
    /// daemon's byte order word indicates big-endian.
    pub(crate) fn start_scan(&self, handle: i32) -> Result<(u16, bool), Error> {
        let stream = self.lock();
        {
            let mut writer = WireWriter::new(&*stream);
            writer.write_word(RpcOp::Start.to_word())?;
            writer.write_word(handle)?;
            writer.flush()?;
        }
        loop {
            let mut reader = WireReader::new(&*stream);
            let status = Status::from_word(reader.read_word()?);
            let port = reader.read_word()?;
            let byte_order = reader.read_string()?;
            let resource = reader.read_string()?;
            status.into_result(RpcOp::Start.name())?;
            if resource.is_empty() {
                let big_endian = byte_order != "0x4321";
                return Ok((port as u16, big_endian));
            }
            self.authorize(&stream, &resource)?;
        }
    }

    /// Best-effort `EXIT`; the socket is always considered closed afterwards
    /// regardless of whether the request made it onto the wire. Safe to call
    /// more than once: only the first call talks to the daemon.
    pub fn close(&self) {
        if self.closed.swap(true, std::sync::atomic::Ordering::AcqRel) {
            return;
        }
        let stream = self.lock();
        let mut writer = WireWriter::new(&*stream);
        if let Err(err) = writer.write_word(RpcOp::Exit.to_word()).and_then(|()| writer.flush()) {
            debug!(%err, "EXIT request failed, closing socket anyway");
        }
        let _ = stream.shutdown(std::net::Shutdown::Both);
    }

    /// Performs one `AUTHORIZE(resource)` round-trip over the already-locked
    /// control socket. The daemon's reply to the interrupted RPC is re-read
    /// from the beginning by the caller's retry loop.
    fn authorize(&self, stream: &TcpStream, resource: &str) -> Result<(), Error> {
        let provider = self.password_provider.borrow();
        let Some(provider) = provider.as_deref() else {
            return Err(Error::auth(resource, "no password provider installed"));
        };
        let Some(credential) = provider.provide(resource) else {
            return Err(Error::auth(resource, "no credential available for this resource"));
        };
        let (_backend, salt) = split_resource(resource);
        let password = encode_password(&credential.password, salt);

        let mut writer = WireWriter::new(stream);
        writer.write_word(RpcOp::Authorize.to_word())?;
        writer.write_string(resource)?;
        writer.write_string(&credential.username)?;
        writer.write_string(&password)?;
        writer.flush()?;

        let mut reader = WireReader::new(stream);
        let _ack = reader.read_word()?;
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

fn clamp_timeout(timeout: Duration) -> Duration {
    if timeout.is_zero() {
        return timeout;
    }
    let clamped = Duration::from_millis(timeout.as_millis().max(1) as u64);
    if clamped != timeout {
        warn!(requested = ?timeout, clamped = ?clamped, "timeout rounds to 0ms, clamping to 1ms");
    }
    clamped
}

fn current_username() -> String {
    for var in ["USER", "LOGNAME"] {
        if let Ok(name) = std::env::var(var) {
            if !name.is_empty() {
                return name;
            }
        }
    }
    warn!("could not determine OS username, sending an empty INIT username");
    String::new()
}

/// Abstracts over how a caller holds a [`Session`] so that a device handle
/// can reach back into the session that opened it without committing to one
/// ownership model, mirroring the teacher's `WithSane`.
pub trait WithSession {
    fn with_session<R>(&self, cb: impl FnOnce(&Session) -> R) -> R;
}

impl WithSession for Session {
    fn with_session<R>(&self, cb: impl FnOnce(&Session) -> R) -> R {
        cb(self)
    }
}

impl<T: WithSession> WithSession for &T {
    fn with_session<R>(&self, cb: impl FnOnce(&Session) -> R) -> R {
        (**self).with_session(cb)
    }
}

impl<T: WithSession> WithSession for Box<T> {
    fn with_session<R>(&self, cb: impl FnOnce(&Session) -> R) -> R {
        (**self).with_session(cb)
    }
}

impl<T: WithSession> WithSession for std::rc::Rc<T> {
    fn with_session<R>(&self, cb: impl FnOnce(&Session) -> R) -> R {
        (**self).with_session(cb)
    }
}

impl<T: WithSession> WithSession for std::sync::Arc<T> {
    fn with_session<R>(&self, cb: impl FnOnce(&Session) -> R) -> R {
        (**self).with_session(cb)
    }
}

impl<T: WithSession> WithSession for std::sync::Mutex<T> {
    fn with_session<R>(&self, cb: impl FnOnce(&Session) -> R) -> R {
        self.lock().expect("poisoned Mutex").with_session(cb)
    }
}

impl<T: WithSession> WithSession for std::sync::MutexGuard<'_, T> {
    fn with_session<R>(&self, cb: impl FnOnce(&Session) -> R) -> R {
        (**self).with_session(cb)
    }
}

#[cfg(feature = "parking_lot")]
impl<T: WithSession> WithSession for parking_lot::Mutex<T> {
    fn with_session<R>(&self, cb: impl FnOnce(&Session) -> R) -> R {
        self.lock().with_session(cb)
    }
}

#[cfg(feature = "parking_lot")]
impl<T: WithSession> WithSession for parking_lot::MutexGuard<'_, T> {
    fn with_session<R>(&self, cb: impl FnOnce(&Session) -> R) -> R {
        (**self).with_session(cb)
    }
}

/// `Session` is !Sync for the same reason the teacher's `Sane<A>` is: access
/// must be serialized even though the handle itself can cross threads.
#[allow(dead_code)]
struct SessionMarker(Cell<()>);

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    fn spawn_init_only_server() -> (thread::JoinHandle<()>, std::net::SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut op = [0u8; 4];
            socket.read_exact(&mut op).unwrap();
            let mut version = [0u8; 4];
            socket.read_exact(&mut version).unwrap();
            let mut len = [0u8; 4];
            socket.read_exact(&mut len).unwrap();
            let n = u32::from_be_bytes(len) as usize;
            let mut name = vec![0u8; n];
            socket.read_exact(&mut name).unwrap();
            // status GOOD, server version echo
            socket.write_all(&0i32.to_be_bytes()).unwrap();
            socket.write_all(&PROTOCOL_VERSION.to_word().to_be_bytes()).unwrap();
        });
        (handle, addr)
    }

    #[test]
    fn connect_performs_init_handshake() {
        let (handle, addr) = spawn_init_only_server();
        let session = Session::connect(addr, Duration::from_secs(1), None).unwrap();
        drop(session);
        handle.join().unwrap();
    }

    #[test]
    fn clamp_timeout_rounds_sub_millisecond_up() {
        assert_eq!(clamp_timeout(Duration::from_micros(1)), Duration::from_millis(1));
        assert_eq!(clamp_timeout(Duration::ZERO), Duration::ZERO);
        assert_eq!(clamp_timeout(Duration::from_millis(5)), Duration::from_millis(5));
    }
}
