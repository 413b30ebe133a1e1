use crate::error::launch::LaunchError;
use crate::{FLEXLOGGER_EXE_NAME, FLEXLOGGER_REGISTRY_KEY_PATH};

use common::ErrorLocation;

use std::io::Result as IoResult;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use log::{debug, trace};
use regex::Regex;

pub const CURRENT_VERSION_SUBKEY: &str = "CurrentVersion";
pub const INSTALL_PATH_VALUE: &str = "Path";
const EXECUTABLE_EXTENSION: &str = "exe";
const MAJOR_MINOR_PATTERN: &str = r"^(\d+)\.(\d+)";

static MAJOR_MINOR_REGEX: OnceLock<Regex> = OnceLock::new();

pub(crate) fn get_major_minor_regex() -> &'static Regex {
    MAJOR_MINOR_REGEX.get_or_init(|| Regex::new(MAJOR_MINOR_PATTERN).expect("valid regex pattern"))
}

/// Read access to the installed-software registry entries for FlexLogger.
pub trait InstallRegistry: Send + Sync {
    /// Names of the subkeys under the FlexLogger product key.
    fn version_subkeys(&self) -> IoResult<Vec<String>>;

    /// The install directory recorded in the given subkey.
    fn install_directory(&self, subkey: &str) -> IoResult<PathBuf>;
}

/// Pick the literal `CurrentVersion` subkey, if present.
pub fn current_version_subkey<S: AsRef<str>>(names: &[S]) -> Option<&str> {
    names
        .iter()
        .map(|name| name.as_ref())
        .find(|name| *name == CURRENT_VERSION_SUBKEY)
}

/// Pick the subkey whose leading `major.minor` is numerically greatest.
///
/// Names without a leading `major.minor` are ignored. Returns `None` when no name
/// qualifies.
pub fn latest_subkey_name<S: AsRef<str>>(names: &[S]) -> Option<String> {
    let re = get_major_minor_regex();

    names
        .iter()
        .map(|name| name.as_ref())
        .filter_map(|name| {
            let caps = re.captures(name)?;
            let major = caps.get(1)?.as_str().parse::<u64>().ok()?;
            let minor = caps.get(2)?.as_str().parse::<u64>().ok()?;
            Some((major, minor, name))
        })
        .max()
        .map(|(_, _, name)| name.to_string())
}

/// Pick the subkey to launch: `CurrentVersion` first, then the latest numbered version.
pub fn select_version_subkey<S: AsRef<str>>(names: &[S]) -> Option<String> {
    current_version_subkey(names)
        .map(str::to_string)
        .or_else(|| latest_subkey_name(names))
}

fn is_executable_path(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case(EXECUTABLE_EXTENSION))
        .unwrap_or(false)
}

/// Resolve the FlexLogger executable to launch.
///
/// An explicit path naming a directory gets `FlexLogger.exe` appended. Without an
/// explicit path the latest installed version is looked up in the registry.
///
/// # Errors
///
/// Returns [`LaunchError::Resolution`] if the registry has no usable FlexLogger entry.
#[track_caller]
pub fn resolve_executable_path(
    explicit_path: Option<&Path>,
    registry: &dyn InstallRegistry,
) -> Result<PathBuf, LaunchError> {
    if let Some(path) = explicit_path {
        if is_executable_path(path) {
            return Ok(path.to_path_buf());
        }
        return Ok(path.join(FLEXLOGGER_EXE_NAME));
    }

    debug!("No explicit path - resolving latest installed FlexLogger");

    let names = registry
        .version_subkeys()
        .map_err(|e| LaunchError::Resolution {
            message: format!(
                "Could not determine latest installed path of FlexLogger: {FLEXLOGGER_REGISTRY_KEY_PATH}: {e}"
            ),
            location: ErrorLocation::from(Location::caller()),
        })?;

    trace!("Found FlexLogger registry subkeys: {names:?}");

    let subkey = select_version_subkey(&names).ok_or_else(|| LaunchError::Resolution {
        message: "Could not determine latest installed path of FlexLogger: no version subkeys"
            .to_string(),
        location: ErrorLocation::from(Location::caller()),
    })?;

    let directory = registry
        .install_directory(&subkey)
        .map_err(|e| LaunchError::Resolution {
            message: format!(
                "Could not read the install path of FlexLogger version '{subkey}': {e}"
            ),
            location: ErrorLocation::from(Location::caller()),
        })?;

    let path = directory.join(FLEXLOGGER_EXE_NAME);
    debug!("Resolved FlexLogger {subkey} at {}", path.display());
    Ok(path)
}

#[cfg(windows)]
mod native {
    use super::{INSTALL_PATH_VALUE, InstallRegistry};
    use crate::FLEXLOGGER_REGISTRY_KEY_PATH;

    use std::io::Result as IoResult;
    use std::path::PathBuf;

    use winreg::RegKey;
    use winreg::enums::HKEY_LOCAL_MACHINE;

    /// `HKEY_LOCAL_MACHINE\SOFTWARE\National Instruments\FlexLogger`.
    #[derive(Debug, Default)]
    pub struct WindowsRegistry;

    impl WindowsRegistry {
        fn product_key(&self) -> IoResult<RegKey> {
            RegKey::predef(HKEY_LOCAL_MACHINE).open_subkey(FLEXLOGGER_REGISTRY_KEY_PATH)
        }
    }

    impl InstallRegistry for WindowsRegistry {
        fn version_subkeys(&self) -> IoResult<Vec<String>> {
            self.product_key()?.enum_keys().collect()
        }

        fn install_directory(&self, subkey: &str) -> IoResult<PathBuf> {
            let version_key = self.product_key()?.open_subkey(subkey)?;
            let path: String = version_key.get_value(INSTALL_PATH_VALUE)?;
            Ok(PathBuf::from(path))
        }
    }
}

#[cfg(not(windows))]
mod native {
    use super::InstallRegistry;

    use std::io::{Error as IoError, ErrorKind, Result as IoResult};
    use std::path::PathBuf;

    /// FlexLogger is only installed on Windows; every lookup fails.
    #[derive(Debug, Default)]
    pub struct UnsupportedRegistry;

    fn unsupported() -> IoError {
        IoError::new(
            ErrorKind::Unsupported,
            "the Windows registry is not available on this platform",
        )
    }

    impl InstallRegistry for UnsupportedRegistry {
        fn version_subkeys(&self) -> IoResult<Vec<String>> {
            Err(unsupported())
        }

        fn install_directory(&self, _subkey: &str) -> IoResult<PathBuf> {
            Err(unsupported())
        }
    }
}

#[cfg(windows)]
pub type NativeRegistry = native::WindowsRegistry;

#[cfg(not(windows))]
pub type NativeRegistry = native::UnsupportedRegistry;
