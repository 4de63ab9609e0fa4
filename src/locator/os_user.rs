use std::io;
use std::path::PathBuf;

use super::UserLookup;
use crate::platform::UserId;
use crate::{AppError, AppResult};

/// Looks accounts up in the host's user database: the passwd database on
/// Unix (numeric uid) and the profile list in the registry on Windows (SID).
#[derive(Debug, Clone, Copy, Default)]
pub struct OsUserLookup;

impl UserLookup for OsUserLookup {
    fn home_dir(&self, user: &UserId) -> AppResult<PathBuf> {
        let found = lookup_home(user.as_str()).map_err(|err| {
            AppError::from(err)
                .with_context("operation", "os_user_lookup")
                .with_context("user", user.to_string())
        })?;
        found.ok_or_else(|| {
            AppError::new("USER/UNKNOWN", "No such user account.").with_context("user", user.to_string())
        })
    }
}

#[cfg(unix)]
fn lookup_home(id: &str) -> io::Result<Option<PathBuf>> {
    use std::ffi::{CStr, OsStr};
    use std::os::unix::ffi::OsStrExt;

    let uid: libc::uid_t = id
        .trim()
        .parse()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "user id is not a numeric uid"))?;

    // SAFETY: sysconf has no preconditions.
    let suggested = unsafe { libc::sysconf(libc::_SC_GETPW_R_SIZE_MAX) };
    let mut buf_len = if suggested > 0 { suggested as usize } else { 1024 };

    loop {
        let mut buf = vec![0 as libc::c_char; buf_len];
        // SAFETY: passwd is plain old data; getpwuid_r fills it in.
        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        // SAFETY: every pointer refers to live, correctly sized storage.
        let rc = unsafe { libc::getpwuid_r(uid, &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result) };

        if rc == libc::ERANGE && buf_len < (1 << 20) {
            buf_len *= 2;
            continue;
        }
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }
        if result.is_null() {
            return Ok(None);
        }
        if pwd.pw_dir.is_null() {
            return Ok(Some(PathBuf::new()));
        }
        // SAFETY: pw_dir points into `buf`, which outlives this borrow.
        let dir = unsafe { CStr::from_ptr(pwd.pw_dir) };
        return Ok(Some(PathBuf::from(OsStr::from_bytes(dir.to_bytes()))));
    }
}

#[cfg(windows)]
fn lookup_home(sid: &str) -> io::Result<Option<PathBuf>> {
    use std::ffi::{OsStr, OsString};
    use std::os::windows::ffi::{OsStrExt, OsStringExt};
    use std::ptr;

    use windows_sys::Win32::Foundation::{ERROR_FILE_NOT_FOUND, ERROR_SUCCESS};
    use windows_sys::Win32::System::Registry::{RegGetValueW, HKEY_LOCAL_MACHINE, RRF_RT_REG_SZ};

    fn wide(s: &str) -> Vec<u16> {
        OsStr::new(s).encode_wide().chain(Some(0)).collect()
    }

    if sid.is_empty() || sid.contains('\\') {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "invalid SID"));
    }
    let subkey = wide(&format!(
        r"SOFTWARE\Microsoft\Windows NT\CurrentVersion\ProfileList\{sid}"
    ));
    let value = wide("ProfileImagePath");

    let mut len_bytes: u32 = 0;
    // SAFETY: size query; data pointer is null and length is a valid out-param.
    let rc = unsafe {
        RegGetValueW(
            HKEY_LOCAL_MACHINE,
            subkey.as_ptr(),
            value.as_ptr(),
            RRF_RT_REG_SZ,
            ptr::null_mut(),
            ptr::null_mut(),
            &mut len_bytes,
        )
    };
    if rc == ERROR_FILE_NOT_FOUND {
        return Ok(None);
    }
    if rc != ERROR_SUCCESS {
        return Err(io::Error::from_raw_os_error(rc as i32));
    }

    let mut buf = vec![0u16; (len_bytes as usize / 2) + 1];
    let mut len_bytes = (buf.len() * 2) as u32;
    // SAFETY: buf holds len_bytes bytes of writable storage.
    let rc = unsafe {
        RegGetValueW(
            HKEY_LOCAL_MACHINE,
            subkey.as_ptr(),
            value.as_ptr(),
            RRF_RT_REG_SZ,
            ptr::null_mut(),
            buf.as_mut_ptr().cast(),
            &mut len_bytes,
        )
    };
    if rc == ERROR_FILE_NOT_FOUND {
        return Ok(None);
    }
    if rc != ERROR_SUCCESS {
        return Err(io::Error::from_raw_os_error(rc as i32));
    }

    let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    Ok(Some(PathBuf::from(OsString::from_wide(&buf[..end]))))
}

#[cfg(not(any(unix, windows)))]
fn lookup_home(_id: &str) -> io::Result<Option<PathBuf>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "user lookup is not supported on this platform",
    ))
}
