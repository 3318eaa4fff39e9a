use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::Result;

/// Replace `path` with `bytes` through a sibling temp file and a rename,
/// so readers never observe a half-written file.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}
