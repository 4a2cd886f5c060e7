//! Windows registry backend
//!
//! Thin `KeyStore` over the Win32 registry and event APIs. Notifications are
//! requested with `REG_NOTIFY_THREAD_AGNOSTIC` so a watcher may arm from the
//! owning thread and re-arm from its worker without the registration dying
//! with either thread.

use crate::error::{Result, StoreError};
use crate::guard::RawHandle;
use crate::store::{Access, KeyStore};
use crate::target::{normalize_key_path, NotifyFilter, RootKey};
use crate::value::Value;
use std::ptr;
use windows_sys::Win32::Foundation::{
    CloseHandle, GetLastError, ERROR_FILE_NOT_FOUND, ERROR_KEY_DELETED, ERROR_MORE_DATA,
    ERROR_SUCCESS, FALSE, HANDLE, WAIT_FAILED, WAIT_OBJECT_0, WIN32_ERROR,
};
use windows_sys::Win32::System::Registry::{
    RegCloseKey, RegCreateKeyExW, RegDeleteValueW, RegGetValueW, RegNotifyChangeKeyValue,
    RegOpenKeyExW, RegSetValueExW, HKEY, HKEY_CLASSES_ROOT, HKEY_CURRENT_CONFIG,
    HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, HKEY_USERS, KEY_ALL_ACCESS, KEY_READ, KEY_WRITE,
    REG_BINARY, REG_DWORD, REG_NOTIFY_THREAD_AGNOSTIC, REG_OPTION_NON_VOLATILE, REG_QWORD,
    REG_SAM_FLAGS, REG_SZ, REG_VALUE_TYPE, RRF_RT_ANY,
};
use windows_sys::Win32::System::Threading::{
    CreateEventW, ResetEvent, SetEvent, WaitForMultipleObjects, INFINITE,
};

/// Opened registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WinKey(HKEY);

impl RawHandle for WinKey {
    const INVALID: Self = WinKey(0);
}

/// Auto-reset Win32 event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WinEvent(HANDLE);

impl RawHandle for WinEvent {
    const INVALID: Self = WinEvent(0);
}

/// The live Windows registry
#[derive(Debug, Default)]
pub struct WindowsStore;

impl WindowsStore {
    pub fn new() -> Self {
        Self
    }
}

fn root_hkey(root: RootKey) -> HKEY {
    match root {
        RootKey::ClassesRoot => HKEY_CLASSES_ROOT,
        RootKey::CurrentUser => HKEY_CURRENT_USER,
        RootKey::LocalMachine => HKEY_LOCAL_MACHINE,
        RootKey::Users => HKEY_USERS,
        RootKey::CurrentConfig => HKEY_CURRENT_CONFIG,
    }
}

fn sam(access: Access) -> REG_SAM_FLAGS {
    match access {
        Access::Read => KEY_READ,
        Access::Write => KEY_WRITE,
        Access::All => KEY_ALL_ACCESS,
    }
}

/// NUL-terminated UTF-16
fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn check(op: &'static str, status: WIN32_ERROR, path: impl FnOnce() -> String) -> Result<()> {
    match status {
        ERROR_SUCCESS => Ok(()),
        ERROR_FILE_NOT_FOUND => Err(StoreError::NotFound { path: path() }),
        ERROR_KEY_DELETED => Err(StoreError::KeyDeleted),
        code => Err(StoreError::Os { op, code }),
    }
}

fn decode(ty: REG_VALUE_TYPE, data: &[u8]) -> Result<Value> {
    match ty {
        REG_SZ => {
            let units: Vec<u16> = data
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .take_while(|&unit| unit != 0)
                .collect();
            Ok(Value::String(String::from_utf16_lossy(&units)))
        }
        REG_DWORD if data.len() >= 4 => Ok(Value::U32(u32::from_le_bytes([data[0], data[1], data[2], data[3]]))),
        REG_QWORD if data.len() >= 8 => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&data[..8]);
            Ok(Value::U64(u64::from_le_bytes(bytes)))
        }
        REG_BINARY => Ok(Value::Binary(data.to_vec())),
        _ => Err(StoreError::InvalidParameter("unsupported value type")),
    }
}

impl KeyStore for WindowsStore {
    type Key = WinKey;
    type Event = WinEvent;

    fn open_key(&self, root: RootKey, path: &str, access: Access) -> Result<WinKey> {
        let path = normalize_key_path(path);
        let subkey = wide(&path);
        let mut key: HKEY = 0;
        let status = unsafe { RegOpenKeyExW(root_hkey(root), subkey.as_ptr(), 0, sam(access), &mut key) };
        check("RegOpenKeyExW", status, || format!("{}\\{}", root, path))?;
        Ok(WinKey(key))
    }

    fn create_key(&self, root: RootKey, path: &str) -> Result<WinKey> {
        let path = normalize_key_path(path);
        let subkey = wide(&path);
        let mut key: HKEY = 0;
        let status = unsafe {
            RegCreateKeyExW(
                root_hkey(root),
                subkey.as_ptr(),
                0,
                ptr::null(),
                REG_OPTION_NON_VOLATILE,
                KEY_ALL_ACCESS,
                ptr::null(),
                &mut key,
                ptr::null_mut(),
            )
        };
        check("RegCreateKeyExW", status, || format!("{}\\{}", root, path))?;
        Ok(WinKey(key))
    }

    fn close_key(&self, key: WinKey) {
        unsafe {
            RegCloseKey(key.0);
        }
    }

    fn query_value(&self, key: WinKey, name: &str) -> Result<Option<Value>> {
        let value_name = wide(name);
        let mut ty: REG_VALUE_TYPE = 0;
        let mut size: u32 = 0;

        let status = unsafe {
            RegGetValueW(key.0, ptr::null(), value_name.as_ptr(), RRF_RT_ANY, &mut ty, ptr::null_mut(), &mut size)
        };
        if status == ERROR_FILE_NOT_FOUND {
            return Ok(None);
        }
        check("RegGetValueW", status, || name.to_string())?;

        // The value may grow between the size query and the read
        loop {
            let mut data = vec![0u8; size as usize];
            let status = unsafe {
                RegGetValueW(
                    key.0,
                    ptr::null(),
                    value_name.as_ptr(),
                    RRF_RT_ANY,
                    &mut ty,
                    data.as_mut_ptr().cast(),
                    &mut size,
                )
            };
            match status {
                ERROR_MORE_DATA => continue,
                ERROR_FILE_NOT_FOUND => return Ok(None),
                _ => check("RegGetValueW", status, || name.to_string())?,
            }
            data.truncate(size as usize);
            return decode(ty, &data).map(Some);
        }
    }

    fn set_value(&self, key: WinKey, name: &str, value: &Value) -> Result<()> {
        let value_name = wide(name);
        let (ty, data): (REG_VALUE_TYPE, Vec<u8>) = match value {
            Value::String(s) => (REG_SZ, wide(s).iter().flat_map(|unit| unit.to_le_bytes()).collect()),
            Value::U32(v) => (REG_DWORD, v.to_le_bytes().to_vec()),
            Value::U64(v) => (REG_QWORD, v.to_le_bytes().to_vec()),
            Value::Binary(b) => (REG_BINARY, b.clone()),
        };
        let status = unsafe {
            RegSetValueExW(key.0, value_name.as_ptr(), 0, ty, data.as_ptr(), data.len() as u32)
        };
        check("RegSetValueExW", status, || name.to_string())
    }

    fn delete_value(&self, key: WinKey, name: &str) -> Result<()> {
        let value_name = wide(name);
        let status = unsafe { RegDeleteValueW(key.0, value_name.as_ptr()) };
        check("RegDeleteValueW", status, || name.to_string())
    }

    fn create_event(&self) -> Result<WinEvent> {
        let event = unsafe { CreateEventW(ptr::null(), FALSE, FALSE, ptr::null()) };
        if event == 0 {
            let code = unsafe { GetLastError() };
            return Err(StoreError::Os { op: "CreateEventW", code });
        }
        Ok(WinEvent(event))
    }

    fn close_event(&self, event: WinEvent) {
        unsafe {
            CloseHandle(event.0);
        }
    }

    fn set_event(&self, event: WinEvent) -> Result<()> {
        if unsafe { SetEvent(event.0) } == 0 {
            let code = unsafe { GetLastError() };
            return Err(StoreError::Os { op: "SetEvent", code });
        }
        Ok(())
    }

    fn reset_event(&self, event: WinEvent) -> Result<()> {
        if unsafe { ResetEvent(event.0) } == 0 {
            let code = unsafe { GetLastError() };
            return Err(StoreError::Os { op: "ResetEvent", code });
        }
        Ok(())
    }

    fn notify_change(
        &self,
        key: WinKey,
        watch_subtree: bool,
        filter: NotifyFilter,
        event: WinEvent,
    ) -> Result<()> {
        if filter.is_empty() {
            return Err(StoreError::InvalidParameter("empty notify filter"));
        }
        let status = unsafe {
            RegNotifyChangeKeyValue(
                key.0,
                watch_subtree as i32,
                filter.bits() | REG_NOTIFY_THREAD_AGNOSTIC,
                event.0,
                1,
            )
        };
        check("RegNotifyChangeKeyValue", status, String::new)
    }

    fn wait_any(&self, events: &[WinEvent]) -> Result<usize> {
        if events.is_empty() {
            return Err(StoreError::InvalidParameter("no events to wait on"));
        }
        let handles: Vec<HANDLE> = events.iter().map(|event| event.0).collect();
        let count = handles.len() as u32;
        let status = unsafe { WaitForMultipleObjects(count, handles.as_ptr(), FALSE, INFINITE) };

        if status >= WAIT_OBJECT_0 && status < WAIT_OBJECT_0 + count {
            return Ok((status - WAIT_OBJECT_0) as usize);
        }
        let code = if status == WAIT_FAILED { unsafe { GetLastError() } } else { status };
        Err(StoreError::Os { op: "WaitForMultipleObjects", code })
    }
}
