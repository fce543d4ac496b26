//! Supported driver database.
//!
//! An optional YAML file lists the minimum driver version known to expose
//! usable VF statistics:
//!
//! ```yaml
//! drivers:
//!   - name: ice
//!     version: 1.9.11
//!   - name: mlx5_core
//!     version: 5.15.0
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::{self, Deserializer};
use serde::Deserialize;
use tracing::{debug, info};

use crate::collector::traits::FileSystem;

const DRIVER_LINK: &str = "driver";
const MODULE_VERSION_FILE: &str = "module/version";

/// Driver name and version, as listed in the database or found on a device.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DriverInfo {
    pub name: String,
    #[serde(deserialize_with = "version_string")]
    pub version: String,
}

/// Accepts unquoted versions such as `2.1`, which YAML reads as numbers.
fn version_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!("invalid driver version: {:?}", other))),
    }
}

#[derive(Debug, Deserialize)]
struct DriverList {
    #[serde(default)]
    drivers: Vec<DriverInfo>,
}

/// Error type for loading the driver database.
#[derive(Debug)]
pub enum DriverDbError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(String),
}

impl fmt::Display for DriverDbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverDbError::Io { path, source } => {
                write!(f, "failed to read driver database {}: {}", path.display(), source)
            }
            DriverDbError::Parse(msg) => write!(f, "failed to parse driver database: {}", msg),
        }
    }
}

impl std::error::Error for DriverDbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DriverDbError::Io { source, .. } => Some(source),
            DriverDbError::Parse(_) => None,
        }
    }
}

/// Minimum driver versions allowed to contribute PFs.
///
/// `None` means no database was configured and every driver is accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupportedDrivers {
    drivers: Option<Vec<DriverInfo>>,
}

impl SupportedDrivers {
    /// Accepts every driver.
    pub fn allow_all() -> Self {
        Self { drivers: None }
    }

    pub fn from_list(drivers: Vec<DriverInfo>) -> Self {
        Self {
            drivers: Some(drivers),
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self, DriverDbError> {
        let list: DriverList =
            serde_yaml::from_str(content).map_err(|e| DriverDbError::Parse(e.to_string()))?;
        Ok(Self::from_list(list.drivers))
    }

    pub fn from_path(path: &Path) -> Result<Self, DriverDbError> {
        let content = std::fs::read_to_string(path).map_err(|source| DriverDbError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self::from_yaml(&content)?;
        info!(path = %path.display(), drivers = db.len(), "loaded supported driver database");
        Ok(db)
    }

    /// Number of listed drivers; zero when every driver is accepted.
    pub fn len(&self) -> usize {
        self.drivers.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn allows_all(&self) -> bool {
        self.drivers.is_none()
    }

    /// Returns `true` when `driver` is listed with a version lower than or
    /// equal to its own.
    pub fn is_supported(&self, driver: &DriverInfo) -> bool {
        let Some(drivers) = &self.drivers else {
            return true;
        };
        let Some(actual) = parse_version(&driver.version) else {
            return false;
        };
        drivers
            .iter()
            .filter(|d| d.name == driver.name)
            .filter_map(|d| parse_version(&d.version))
            .any(|minimum| compare_versions(&actual, &minimum) != Ordering::Less)
    }

    /// Decides whether the PF at `addr` may be exported.
    ///
    /// PFs whose driver cannot be identified are kept. The version comes from
    /// `driver/module/version`, which only out-of-tree modules provide: PFs bound
    /// to in-tree drivers have no version there and are never filtered.
    pub fn is_pf_supported<F: FileSystem>(&self, fs: &F, pci_root: &Path, addr: &str) -> bool {
        if self.allows_all() {
            return true;
        }
        let Some(driver) = driver_info(fs, pci_root, addr) else {
            debug!(device = %addr, "driver info unavailable, keeping device");
            return true;
        };
        if self.is_supported(&driver) {
            return true;
        }
        info!(device = %addr, driver = %driver.name, version = %driver.version,
            "driver not supported, excluding device");
        false
    }
}

/// Reads the bound driver's name and module version of a PCI device.
pub fn driver_info<F: FileSystem>(fs: &F, pci_root: &Path, addr: &str) -> Option<DriverInfo> {
    let driver_link = pci_root.join(addr).join(DRIVER_LINK);
    let target = fs.read_link(&driver_link).ok()?;
    let name = target.file_name()?.to_str()?.to_string();
    let version = fs
        .read_to_string(&driver_link.join(MODULE_VERSION_FILE))
        .ok()?
        .trim()
        .to_string();
    if version.is_empty() {
        return None;
    }
    Some(DriverInfo { name, version })
}

/// Parses a dotted numeric version. Underscores are removed, a leading `v` is
/// allowed, and anything after `-` or `+` is ignored.
fn parse_version(version: &str) -> Option<Vec<u64>> {
    let cleaned = version.trim().replace('_', "");
    let cleaned = cleaned.strip_prefix('v').unwrap_or(&cleaned);
    let core = cleaned.split(['-', '+']).next()?;
    if core.is_empty() {
        return None;
    }
    core.split('.').map(|part| part.parse::<u64>().ok()).collect()
}

fn compare_versions(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}
