//! Device handle (C7 host type): the option engine and scan acquisition,
//! scoped to one device opened on a [`Session`].

pub mod options;
pub mod scan;

use std::cell::{Cell, RefCell};

use crate::enums::{Capabilities, ControlAction, ValueKind};
use crate::error::Error;
use crate::session::{Session, WithSession};
use crate::wire::{Fixed, WireParameters};

pub use options::{OptionConstraint, OptionDescriptor, OptionGroup};
pub use scan::{Image, RateLimitedScanListener, ScanListener};

/// An open device: wraps the handle word the daemon issued on `OPEN` and
/// caches its option descriptors until invalidated by `RELOAD_OPTIONS`.
///
/// Generic over `S: WithSession` the same way the teacher's `DeviceHandle<S:
/// WithSane>` is, so a device can independently decide how it reaches back
/// into the session that opened it.
pub struct Device<S: WithSession> {
    session: S,
    handle: i32,
    options: RefCell<options::OptionCache>,
    closed: Cell<bool>,
}

impl<S: WithSession> Device<S> {
    pub(crate) fn new(session: S, handle: i32) -> Self {
        Self {
            session,
            handle,
            options: RefCell::new(options::OptionCache::default()),
            closed: Cell::new(false),
        }
    }

    pub fn handle(&self) -> i32 {
        self.handle
    }

    /// `CLOSE(handle)`. Idempotent in the sense that it will not talk to the
    /// daemon twice, but a second call reports a precondition violation.
    pub fn close(&self) -> Result<(), Error> {
        if self.closed.replace(true) {
            return Err(Error::precondition("device is already closed"));
        }
        self.session.with_session(|s| s.close_device(self.handle))
    }

    /// `CANCEL(handle)`. A no-op from the caller's perspective when no
    /// acquisition is in progress.
    pub fn cancel(&self) -> Result<(), Error> {
        self.session.with_session(|s| s.cancel_device(self.handle))
    }

    pub fn get_parameters(&self) -> Result<WireParameters, Error> {
        self.session.with_session(|s| s.get_parameters(self.handle))
    }

    pub fn list_options(&self) -> Result<Vec<OptionDescriptor>, Error> {
        self.options.borrow_mut().ensure_loaded(&self.session, self.handle)?;
        Ok(self.options.borrow().descriptors().to_vec())
    }

    pub fn option_groups(&self) -> Result<Vec<OptionGroup>, Error> {
        self.options.borrow_mut().ensure_loaded(&self.session, self.handle)?;
        Ok(self.options.borrow().groups().to_vec())
    }

    pub fn option(&self, name: &str) -> Result<OptionDescriptor, Error> {
        self.options.borrow_mut().ensure_loaded(&self.session, self.handle)?;
        self.options
            .borrow()
            .by_name(name)
            .cloned()
            .ok_or_else(|| Error::precondition(format!("no such option {name:?}")))
    }

    fn readable_singleton(&self, descriptor: &OptionDescriptor, kind: ValueKind) -> Result<(), Error> {
        options::require(descriptor.value_kind == kind, format!("option {:?} is not {kind:?}", descriptor.name))?;
        options::require(descriptor.element_count() == 1, "option is not a singleton value")?;
        options::require(
            descriptor.capabilities.contains(Capabilities::SOFT_DETECT),
            "option is not soft-detectable",
        )?;
        options::require(
            !descriptor.capabilities.contains(Capabilities::INACTIVE),
            "option is inactive",
        )
    }

    fn writable(&self, descriptor: &OptionDescriptor) -> Result<(), Error> {
        options::require(
            descriptor.capabilities.contains(Capabilities::SOFT_SELECT),
            format!("option {:?} is not soft-selectable", descriptor.name),
        )?;
        options::require(
            !descriptor.capabilities.contains(Capabilities::INACTIVE),
            "option is inactive",
        )
    }

    fn get_value_bytes(&self, descriptor: &OptionDescriptor) -> Result<Vec<u8>, Error> {
        let zeros = vec![0u8; descriptor.size.max(0) as usize];
        let reply = self.session.with_session(|s| {
            s.control_option(
                self.handle,
                descriptor.index,
                ControlAction::GetValue,
                descriptor.value_kind,
                descriptor.size,
                descriptor.element_count(),
                &zeros,
            )
        })?;
        reply
            .value
            .ok_or_else(|| Error::protocol("GET_VALUE reply carried no value"))
    }

    fn set_value_bytes(
        &self,
        descriptor: &OptionDescriptor,
        payload: &[u8],
    ) -> Result<(Vec<u8>, crate::enums::WriteInfo), Error> {
        self.writable(descriptor)?;
        let reply = self.session.with_session(|s| {
            s.control_option(
                self.handle,
                descriptor.index,
                ControlAction::SetValue,
                descriptor.value_kind,
                descriptor.size,
                descriptor.element_count(),
                payload,
            )
        })?;
        options::apply_write_info(&mut self.options.borrow_mut(), reply.info, &self.session, self.handle)?;
        let value = reply
            .value
            .ok_or_else(|| Error::protocol("SET_VALUE reply carried no value"))?;
        Ok((value, reply.info))
    }

    pub fn read_bool(&self, name: &str) -> Result<bool, Error> {
        let descriptor = self.option(name)?;
        self.readable_singleton(&descriptor, ValueKind::Bool)?;
        let bytes = self.get_value_bytes(&descriptor)?;
        Ok(word_from_bytes(&bytes)? != 0)
    }

    pub fn write_bool(&self, name: &str, value: bool) -> Result<bool, Error> {
        let descriptor = self.option(name)?;
        options::require(descriptor.value_kind == ValueKind::Bool, "option is not BOOLEAN")?;
        let payload = (value as i32).to_be_bytes();
        let (echoed, _info) = self.set_value_bytes(&descriptor, &payload)?;
        Ok(word_from_bytes(&echoed)? != 0)
    }

    pub fn read_int(&self, name: &str) -> Result<i32, Error> {
        let descriptor = self.option(name)?;
        self.readable_singleton(&descriptor, ValueKind::Int)?;
        let bytes = self.get_value_bytes(&descriptor)?;
        word_from_bytes(&bytes)
    }

    pub fn write_int(&self, name: &str, value: i32) -> Result<i32, Error> {
        let descriptor = self.option(name)?;
        options::require(descriptor.value_kind == ValueKind::Int, "option is not INT")?;
        let (echoed, _info) = self.set_value_bytes(&descriptor, &value.to_be_bytes())?;
        word_from_bytes(&echoed)
    }

    pub fn read_int_array(&self, name: &str) -> Result<Vec<i32>, Error> {
        let descriptor = self.option(name)?;
        options::require(descriptor.value_kind == ValueKind::Int, "option is not INT")?;
        let bytes = self.get_value_bytes(&descriptor)?;
        words_from_bytes(&bytes)
    }

    pub fn write_int_array(&self, name: &str, values: &[i32]) -> Result<Vec<i32>, Error> {
        let descriptor = self.option(name)?;
        options::require(descriptor.value_kind == ValueKind::Int, "option is not INT")?;
        let payload: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        let (echoed, _info) = self.set_value_bytes(&descriptor, &payload)?;
        words_from_bytes(&echoed)
    }

    pub fn read_fixed(&self, name: &str) -> Result<Fixed, Error> {
        let descriptor = self.option(name)?;
        self.readable_singleton(&descriptor, ValueKind::Fixed)?;
        let bytes = self.get_value_bytes(&descriptor)?;
        Ok(Fixed::from_bits(word_from_bytes(&bytes)?))
    }

    pub fn write_fixed(&self, name: &str, value: f64) -> Result<Fixed, Error> {
        let descriptor = self.option(name)?;
        options::require(descriptor.value_kind == ValueKind::Fixed, "option is not FIXED")?;
        let fixed = Fixed::new(value)?;
        let (echoed, _info) = self.set_value_bytes(&descriptor, &fixed.to_bits().to_be_bytes())?;
        Ok(Fixed::from_bits(word_from_bytes(&echoed)?))
    }

    pub fn read_fixed_array(&self, name: &str) -> Result<Vec<Fixed>, Error> {
        let descriptor = self.option(name)?;
        options::require(descriptor.value_kind == ValueKind::Fixed, "option is not FIXED")?;
        let bytes = self.get_value_bytes(&descriptor)?;
        Ok(words_from_bytes(&bytes)?.into_iter().map(Fixed::from_bits).collect())
    }

    pub fn write_fixed_array(&self, name: &str, values: &[f64]) -> Result<Vec<Fixed>, Error> {
        let descriptor = self.option(name)?;
        options::require(descriptor.value_kind == ValueKind::Fixed, "option is not FIXED")?;
        let fixed_values: Vec<Fixed> = values.iter().map(|&v| Fixed::new(v)).collect::<Result<_, _>>()?;
        let payload: Vec<u8> = fixed_values.iter().flat_map(|f| f.to_bits().to_be_bytes()).collect();
        let (echoed, _info) = self.set_value_bytes(&descriptor, &payload)?;
        Ok(words_from_bytes(&echoed)?.into_iter().map(Fixed::from_bits).collect())
    }

    pub fn read_string(&self, name: &str) -> Result<String, Error> {
        let descriptor = self.option(name)?;
        options::require(descriptor.value_kind == ValueKind::String, "option is not STRING")?;
        let bytes = self.get_value_bytes(&descriptor)?;
        Ok(latin1_until_nul(&bytes))
    }

    pub fn write_string(&self, name: &str, value: &str) -> Result<String, Error> {
        let descriptor = self.option(name)?;
        options::require(descriptor.value_kind == ValueKind::String, "option is not STRING")?;
        options::require(
            (value.len() as i32) < descriptor.size,
            format!("string of {} bytes does not fit in a {}-byte option", value.len(), descriptor.size),
        )?;
        let mut payload = crate::wire::codec::string_to_latin1(value)?;
        payload.push(0);
        payload.resize(descriptor.size.max(0) as usize, 0);
        let (echoed, info) = self.set_value_bytes(&descriptor, &payload)?;
        let result = latin1_until_nul(&echoed);
        if result != value && !info.contains(crate::enums::WriteInfo::INEXACT) {
            return Err(Error::protocol(format!(
                "daemon echoed {result:?} for written value {value:?} without setting INEXACT"
            )));
        }
        Ok(result)
    }

    pub fn press_button(&self, name: &str) -> Result<(), Error> {
        let descriptor = self.option(name)?;
        options::require(descriptor.value_kind == ValueKind::Button, "option is not BUTTON")?;
        self.writable(&descriptor)?;
        let reply = self.session.with_session(|s| {
            s.control_option(
                self.handle,
                descriptor.index,
                ControlAction::SetValue,
                ValueKind::Button,
                0,
                0,
                &[],
            )
        })?;
        options::apply_write_info(&mut self.options.borrow_mut(), reply.info, &self.session, self.handle)
    }

    pub fn set_auto(&self, name: &str) -> Result<(), Error> {
        let descriptor = self.option(name)?;
        self.writable(&descriptor)?;
        let reply = self.session.with_session(|s| {
            s.control_option(
                self.handle,
                descriptor.index,
                ControlAction::SetAuto,
                descriptor.value_kind,
                descriptor.size,
                descriptor.element_count(),
                &[],
            )
        })?;
        options::apply_write_info(&mut self.options.borrow_mut(), reply.info, &self.session, self.handle)
    }

    /// `acquireImage`: drives a full scan (C10), collecting frames into an
    /// [`Image`] via the frame reader (C8) and image assembler (C9).
    pub fn acquire_image(&self, listener: Option<&mut dyn ScanListener>) -> Result<Image, Error> {
        scan::driver::acquire_image(&self.session, self.handle, listener)
    }
}

impl<S: WithSession> Drop for Device<S> {
    fn drop(&mut self) {
        if !self.closed.replace(true) {
            let _ = self.session.with_session(|s| s.close_device(self.handle));
        }
    }
}

impl Session {
    /// Opens `name` and wraps the returned handle in a [`Device`] that
    /// borrows this session.
    pub fn device(&self, name: &str) -> Result<Device<&Session>, Error> {
        let handle = self.open_device(name)?;
        Ok(Device::new(self, handle))
    }

    /// Same as [`Session::device`] but taking ownership (or shared
    /// ownership) of the session, for callers who want a `Device` that
    /// outlives the borrow of `&Session`.
    pub fn device_with<S: WithSession>(session: S, name: &str) -> Result<Device<S>, Error> {
        let handle = session.with_session(|s| s.open_device(name))?;
        Ok(Device::new(session, handle))
    }
}

fn word_from_bytes(bytes: &[u8]) -> Result<i32, Error> {
    let array: [u8; 4] = bytes
        .get(..4)
        .ok_or_else(|| Error::protocol("value shorter than one word"))?
        .try_into()
        .expect("slice of length 4");
    Ok(i32::from_be_bytes(array))
}

fn words_from_bytes(bytes: &[u8]) -> Result<Vec<i32>, Error> {
    if bytes.len() % 4 != 0 {
        return Err(Error::protocol("array value length is not a multiple of 4"));
    }
    Ok(bytes.chunks_exact(4).map(|c| i32::from_be_bytes(c.try_into().unwrap())).collect())
}

fn latin1_until_nul(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    crate::wire::codec::latin1_to_string(&bytes[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_from_bytes_rejects_short_slices() {
        assert!(word_from_bytes(&[1, 2]).is_err());
        assert_eq!(word_from_bytes(&[0, 0, 0, 7]).unwrap(), 7);
    }

    #[test]
    fn words_from_bytes_rejects_unaligned_length() {
        assert!(words_from_bytes(&[0, 0, 0]).is_err());
        assert_eq!(words_from_bytes(&[0, 0, 0, 1, 0, 0, 0, 2]).unwrap(), vec![1, 2]);
    }

    #[test]
    fn latin1_until_nul_truncates() {
        assert_eq!(latin1_until_nul(b"abc\0def"), "abc");
    }
}
