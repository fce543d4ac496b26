//! Virtual function resolution from `virtfn*` symlinks.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, warn};

use super::SriovError;
use crate::collector::traits::FileSystem;

const VIRTFN_PREFIX: &str = "virtfn";

/// One VF of a physical function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFunction {
    /// VF index on the PF, the numeric suffix of `virtfnN`.
    pub id: u32,
    /// PCI address of the VF, the basename of the link target.
    pub pci_address: String,
}

/// Maps each VF index of `pf` to the VF's PCI address.
///
/// Entries that are not symlinks or whose suffix is not a number are skipped
/// with a warning. No VF at all is reported as `NoVirtualFunctions`.
pub fn resolve_vfs<F: FileSystem>(
    fs: &F,
    pci_root: &Path,
    pf: &str,
) -> Result<BTreeMap<u32, String>, SriovError> {
    let pf_dir = pci_root.join(pf);
    let entries = match fs.glob_prefix(&pf_dir, VIRTFN_PREFIX) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(pf = %pf, error = %e, "could not list virtual functions");
            Vec::new()
        }
    };

    let mut vfs = BTreeMap::new();
    for entry in entries {
        if let Some(vf) = virtual_function(fs, &entry) {
            vfs.insert(vf.id, vf.pci_address);
        }
    }

    if vfs.is_empty() {
        return Err(SriovError::NoVirtualFunctions(pf.to_string()));
    }
    Ok(vfs)
}

fn virtual_function<F: FileSystem>(fs: &F, entry: &Path) -> Option<VirtualFunction> {
    let name = entry.file_name()?.to_str()?;

    if !fs.is_symlink(entry) {
        warn!(path = %entry.display(), "virtual function path is not a symlink");
        return None;
    }

    let Ok(id) = name[VIRTFN_PREFIX.len()..].parse::<u32>() else {
        warn!(path = %entry.display(), "unable to parse virtual function index");
        return None;
    };

    let target = match fs.read_link(entry) {
        Ok(target) => target,
        Err(e) => {
            warn!(path = %entry.display(), error = %e, "unable to read virtual function link");
            return None;
        }
    };
    let pci_address = target.file_name()?.to_str()?.to_string();

    Some(VirtualFunction { id, pci_address })
}
